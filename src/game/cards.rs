//! 卡牌定义与牌库：构建、洗牌、发牌。

use std::fmt;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::CardSpec;
use super::state::PlayerId;

/// 全局唯一的卡牌标识，由对局内的计数器分配。
pub type CardId = u32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CardKind {
    Value,
    Effect,
}

/// 效果牌名称。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EffectName {
    Mais,
    Menos,
    Sobe,
    Desce,
    Pula,
    Reversus,
    ReversusTotal,
    NecroX,
    NecroXInvertido,
    /// 一次性卡牌：立即抽两张效果牌，之后带冷却回到手牌。
    CartaDaVersatrix,
}

/// 每名玩家的两个效果槽。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EffectAxis {
    Score,
    Movement,
}

impl EffectName {
    /// 该效果落在哪个槽位；Reversus 系列和一次性卡牌没有固定槽位。
    pub fn axis(self) -> Option<EffectAxis> {
        match self {
            EffectName::Mais | EffectName::Menos | EffectName::NecroX | EffectName::NecroXInvertido => {
                Some(EffectAxis::Score)
            }
            EffectName::Sobe | EffectName::Desce | EffectName::Pula => Some(EffectAxis::Movement),
            EffectName::Reversus | EffectName::ReversusTotal | EffectName::CartaDaVersatrix => None,
        }
    }

    /// 固定反转表。Pula 没有反转结果（被反转时视为"无移动效果"）。
    pub fn inverse(self) -> Option<EffectName> {
        match self {
            EffectName::Mais => Some(EffectName::Menos),
            EffectName::Menos => Some(EffectName::Mais),
            EffectName::Sobe => Some(EffectName::Desce),
            EffectName::Desce => Some(EffectName::Sobe),
            EffectName::NecroX => Some(EffectName::NecroXInvertido),
            EffectName::NecroXInvertido => Some(EffectName::NecroX),
            _ => None,
        }
    }

    pub fn is_basic(self) -> bool {
        matches!(
            self,
            EffectName::Mais | EffectName::Menos | EffectName::Sobe | EffectName::Desce
        )
    }

    pub fn is_negative(self) -> bool {
        matches!(self, EffectName::Menos | EffectName::Desce)
    }

    pub fn is_one_shot(self) -> bool {
        matches!(self, EffectName::CartaDaVersatrix)
    }

    /// 能被 Reversus 个人锁定的效果。
    pub fn is_lockable(self) -> bool {
        self.is_basic()
    }

    pub fn display_name(self) -> &'static str {
        match self {
            EffectName::Mais => "Mais",
            EffectName::Menos => "Menos",
            EffectName::Sobe => "Sobe",
            EffectName::Desce => "Desce",
            EffectName::Pula => "Pula",
            EffectName::Reversus => "Reversus",
            EffectName::ReversusTotal => "Reversus Total",
            EffectName::NecroX => "NECRO X",
            EffectName::NecroXInvertido => "NECRO X Invertido",
            EffectName::CartaDaVersatrix => "Carta da Versatrix",
        }
    }
}

impl fmt::Display for EffectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Pile {
    Value,
    Effect,
}

impl From<CardKind> for Pile {
    fn from(kind: CardKind) -> Self {
        match kind {
            CardKind::Value => Pile::Value,
            CardKind::Effect => Pile::Effect,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{pile:?} pile is exhausted")]
pub struct DeckExhausted {
    pub pile: Pile,
}

/// 卡牌实例。数值牌创建后不可变；效果牌在出牌区时会被写入锁定、槽位等信息。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub id: CardId,
    pub kind: CardKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<EffectName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i32>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_effect: Option<EffectName>,
    #[serde(default)]
    pub cooldown: u8,
    /// 在出牌区时占据的槽位。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<EffectAxis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PlayerId>,
}

impl Card {
    pub fn value(id: CardId, value: i32) -> Self {
        Self {
            id,
            kind: CardKind::Value,
            name: None,
            value: Some(value),
            locked: false,
            locked_effect: None,
            cooldown: 0,
            slot: None,
            target: None,
        }
    }

    pub fn effect(id: CardId, name: EffectName) -> Self {
        Self {
            id,
            kind: CardKind::Effect,
            name: Some(name),
            value: None,
            locked: false,
            locked_effect: None,
            cooldown: 0,
            slot: None,
            target: None,
        }
    }

    pub fn is_value(&self) -> bool {
        self.kind == CardKind::Value
    }

    pub fn is_effect(&self) -> bool {
        self.kind == CardKind::Effect
    }

    pub fn numeric_value(&self) -> i32 {
        self.value.unwrap_or(0)
    }

    pub fn is_one_shot(&self) -> bool {
        self.name.map(EffectName::is_one_shot).unwrap_or(false)
    }

    /// 实际生效的效果名：被锁定的牌以锁定效果为准。
    pub fn applied_effect(&self) -> Option<EffectName> {
        if self.locked {
            self.locked_effect.or(self.name)
        } else {
            self.name
        }
    }

    pub fn lock_to(&mut self, effect: EffectName) {
        self.locked = true;
        self.locked_effect = Some(effect);
    }

    /// 离开出牌区时清掉对局内写入的临时信息。
    pub fn reset_play_marks(&mut self) {
        self.locked = false;
        self.locked_effect = None;
        self.slot = None;
        self.target = None;
    }
}

/// 抽牌堆与弃牌堆都按数值/效果分成两叠，末尾为顶部。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Piles {
    #[serde(default)]
    pub value: Vec<Card>,
    #[serde(default)]
    pub effect: Vec<Card>,
}

impl Piles {
    pub fn get(&self, pile: Pile) -> &Vec<Card> {
        match pile {
            Pile::Value => &self.value,
            Pile::Effect => &self.effect,
        }
    }

    pub fn get_mut(&mut self, pile: Pile) -> &mut Vec<Card> {
        match pile {
            Pile::Value => &mut self.value,
            Pile::Effect => &mut self.effect,
        }
    }

    /// 按卡牌种类放入对应的一叠。
    pub fn put(&mut self, mut card: Card) {
        card.reset_play_marks();
        self.get_mut(card.kind.into()).push(card);
    }

    pub fn put_all(&mut self, cards: impl IntoIterator<Item = Card>) {
        for card in cards {
            self.put(card);
        }
    }

    pub fn deal(&mut self, pile: Pile) -> Result<Card, DeckExhausted> {
        self.get_mut(pile).pop().ok_or(DeckExhausted { pile })
    }

    pub fn len(&self) -> usize {
        self.value.len() + self.effect.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Card> {
        self.value.iter().chain(self.effect.iter())
    }
}

/// 可序列化的随机源：`(seed, draws)` 决定下一次洗牌，快照恢复后结果一致。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeckRng {
    pub seed: u64,
    #[serde(default)]
    pub draws: u64,
}

impl DeckRng {
    pub fn new(seed: u64) -> Self {
        Self { seed, draws: 0 }
    }

    pub fn next_rng(&mut self) -> SmallRng {
        let mixed = self.seed ^ self.draws.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        self.draws += 1;
        SmallRng::seed_from_u64(mixed)
    }
}

/// 按 `(spec, count)` 展开成扁平序列，`next_id` 为对局内的发号器。
pub fn build_deck(specs: &[CardSpec], next_id: &mut CardId) -> Vec<Card> {
    let total: usize = specs.iter().map(|spec| spec.count() as usize).sum();
    let mut cards = Vec::with_capacity(total);
    for spec in specs {
        for _ in 0..spec.count() {
            let id = *next_id;
            *next_id += 1;
            let card = match spec {
                CardSpec::Value { value, .. } => Card::value(id, *value),
                CardSpec::Effect { name, .. } => Card::effect(id, *name),
            };
            cards.push(card);
        }
    }
    cards
}

/// Fisher–Yates 均匀洗牌。
pub fn shuffle_deck(cards: &mut [Card], rng: &mut DeckRng) {
    let mut small = rng.next_rng();
    cards.shuffle(&mut small);
}
