//! 对局规则配置（胜利格数、手牌下限、牌库构成等）。

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::cards::EffectName;

pub const WINNING_POSITION: u8 = 10;
pub const MIN_VALUE_CARDS_IN_HAND: usize = 3;
pub const MIN_EFFECT_CARDS_IN_HAND: usize = 2;
pub const DEFAULT_PATH_COUNT: u8 = 6;
pub const ONE_SHOT_COOLDOWN_ROUNDS: u8 = 3;

/// 牌库配置中的一行：某种卡牌及其数量。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind")]
pub enum CardSpec {
    Value { value: i32, count: u16 },
    Effect { name: EffectName, count: u16 },
}

impl CardSpec {
    pub fn count(&self) -> u16 {
        match self {
            CardSpec::Value { count, .. } | CardSpec::Effect { count, .. } => *count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RulesConfig {
    pub winning_position: u8,
    pub min_value_cards: usize,
    pub min_effect_cards: usize,
    pub path_count: u8,
    pub one_shot_cooldown: u8,
    /// 抽牌堆耗尽时是否把弃牌堆洗回去。默认关闭。
    pub recycle_discard: bool,
    pub value_deck: Vec<CardSpec>,
    pub effect_deck: Vec<CardSpec>,
}

impl RulesConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_recycle_discard(mut self, recycle: bool) -> Self {
        self.recycle_discard = recycle;
        self
    }

    /// 位置限制在 `[1, winning_position]`。
    pub fn clamp_position(&self, position: i32) -> u8 {
        position.clamp(1, self.winning_position as i32) as u8
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        DEFAULT_RULES.clone()
    }
}

pub static DEFAULT_RULES: Lazy<RulesConfig> = Lazy::new(|| RulesConfig {
    winning_position: WINNING_POSITION,
    min_value_cards: MIN_VALUE_CARDS_IN_HAND,
    min_effect_cards: MIN_EFFECT_CARDS_IN_HAND,
    path_count: DEFAULT_PATH_COUNT,
    one_shot_cooldown: ONE_SHOT_COOLDOWN_ROUNDS,
    recycle_discard: false,
    value_deck: vec![
        CardSpec::Value { value: 2, count: 12 },
        CardSpec::Value { value: 4, count: 10 },
        CardSpec::Value { value: 6, count: 8 },
        CardSpec::Value { value: 8, count: 6 },
        CardSpec::Value { value: 10, count: 4 },
    ],
    effect_deck: vec![
        CardSpec::Effect { name: EffectName::Mais, count: 4 },
        CardSpec::Effect { name: EffectName::Menos, count: 4 },
        CardSpec::Effect { name: EffectName::Sobe, count: 4 },
        CardSpec::Effect { name: EffectName::Desce, count: 4 },
        CardSpec::Effect { name: EffectName::Pula, count: 4 },
        CardSpec::Effect { name: EffectName::Reversus, count: 4 },
        CardSpec::Effect { name: EffectName::ReversusTotal, count: 1 },
    ],
});
