use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::cards::{
    build_deck, shuffle_deck, Card, CardId, DeckExhausted, DeckRng, EffectAxis, EffectName, Pile,
    Piles,
};
use super::config::RulesConfig;
use super::modes::{LadderProgress, ModeDescriptor, TournamentScore};

/// 玩家标识。
pub type PlayerId = u8;
/// 队伍标识。
pub type TeamId = u8;
/// 棋盘路径标识。
pub type PathId = u8;

/// 每名玩家的得分槽和移动槽。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectSlots {
    #[serde(default)]
    pub score: Option<EffectName>,
    #[serde(default)]
    pub movement: Option<EffectName>,
}

impl EffectSlots {
    pub fn get(&self, axis: EffectAxis) -> Option<EffectName> {
        match axis {
            EffectAxis::Score => self.score,
            EffectAxis::Movement => self.movement,
        }
    }

    pub fn set(&mut self, axis: EffectAxis, effect: Option<EffectName>) {
        match axis {
            EffectAxis::Score => self.score = effect,
            EffectAxis::Movement => self.movement = effect,
        }
    }

    pub fn clear(&mut self) {
        self.score = None;
        self.movement = None;
    }
}

/// 场地效果：由外部剧情能力施加，每回合开始时清空。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FieldEffectKind {
    /// 休息牌数值强制为 10。
    RestoMaior,
    /// 休息牌数值强制为 2。
    RestoMenor,
    SuperExposto,
    Imunidade,
    Parada,
    Desafio,
    Castigo,
    Impulso,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

impl FieldEffectKind {
    pub fn default_polarity(self) -> Polarity {
        match self {
            FieldEffectKind::RestoMaior
            | FieldEffectKind::Imunidade
            | FieldEffectKind::Desafio
            | FieldEffectKind::Impulso => Polarity::Positive,
            FieldEffectKind::RestoMenor
            | FieldEffectKind::SuperExposto
            | FieldEffectKind::Parada
            | FieldEffectKind::Castigo => Polarity::Negative,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FieldEffect {
    pub kind: FieldEffectKind,
    pub applies_to: PlayerId,
    pub polarity: Polarity,
}

impl FieldEffect {
    pub fn new(kind: FieldEffectKind, applies_to: PlayerId) -> Self {
        Self {
            kind,
            applies_to,
            polarity: kind.default_polarity(),
        }
    }
}

/// 建局时的玩家描述。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerSetup {
    pub id: PlayerId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamId>,
}

impl PlayerSetup {
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            team: None,
        }
    }

    pub fn on_team(mut self, team: TeamId) -> Self {
        self.team = Some(team);
        self
    }
}

/// 玩家状态：手牌、出牌区、效果槽、棋盘位置等。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamId>,
    #[serde(default)]
    pub hand: Vec<Card>,
    /// 休息牌，参与 Mais/Menos 的计分。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_card: Option<Card>,
    /// 本回合最后打出的数值牌，下回合开始时成为新的休息牌。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_rest: Option<CardId>,
    #[serde(default)]
    pub played_values: Vec<Card>,
    #[serde(default)]
    pub played_effects: Vec<Card>,
    #[serde(default)]
    pub effects: EffectSlots,
    pub position: u8,
    pub path_id: PathId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pula_target_path: Option<PathId>,
    #[serde(default)]
    pub score: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hearts: Option<u8>,
    #[serde(default)]
    pub eliminated: bool,
    #[serde(default)]
    pub played_value_this_turn: bool,
    #[serde(default)]
    pub played_effect_this_turn: bool,
    #[serde(default)]
    pub stars: u32,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, path_id: PathId) -> Self {
        Self {
            id,
            name: name.into(),
            team: None,
            hand: Vec::new(),
            rest_card: None,
            next_rest: None,
            played_values: Vec::new(),
            played_effects: Vec::new(),
            effects: EffectSlots::default(),
            position: 1,
            path_id,
            pula_target_path: None,
            score: 0,
            hearts: None,
            eliminated: false,
            played_value_this_turn: false,
            played_effect_this_turn: false,
            stars: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.eliminated
    }

    pub fn find_card_in_hand_index(&self, card_id: CardId) -> Option<usize> {
        self.hand.iter().position(|card| card.id == card_id)
    }

    pub fn card_in_hand(&self, card_id: CardId) -> Option<&Card> {
        self.hand.iter().find(|card| card.id == card_id)
    }

    pub fn remove_card_from_hand(&mut self, card_id: CardId) -> Option<Card> {
        let idx = self.find_card_in_hand_index(card_id)?;
        Some(self.hand.remove(idx))
    }

    pub fn value_cards_in_hand(&self) -> usize {
        self.hand.iter().filter(|card| card.is_value()).count()
    }

    /// 一次性卡牌不计入效果牌下限。
    pub fn effect_cards_in_hand(&self) -> usize {
        self.hand
            .iter()
            .filter(|card| card.is_effect() && !card.is_one_shot())
            .count()
    }

    pub fn played_any_card_this_turn(&self) -> bool {
        self.played_value_this_turn || self.played_effect_this_turn
    }

    /// 占据某个槽位的出牌区卡牌。
    pub fn slot_occupant(&self, axis: EffectAxis) -> Option<&Card> {
        self.played_effects
            .iter()
            .find(|card| card.slot == Some(axis))
    }

    pub fn is_slot_locked(&self, axis: EffectAxis) -> bool {
        self.slot_occupant(axis).map(|card| card.locked).unwrap_or(false)
    }

    pub fn take_slot_occupant(&mut self, axis: EffectAxis) -> Option<Card> {
        let idx = self
            .played_effects
            .iter()
            .position(|card| card.slot == Some(axis))?;
        Some(self.played_effects.remove(idx))
    }

    /// 取出当前的休息牌；若本回合已有候补休息牌，以候补为准，旧休息牌一并返回以便弃掉。
    pub fn take_final_rest(&mut self) -> (Option<Card>, Option<Card>) {
        let candidate = self.next_rest.take().and_then(|card_id| {
            let idx = self
                .played_values
                .iter()
                .position(|card| card.id == card_id)?;
            Some(self.played_values.remove(idx))
        });
        match candidate {
            Some(card) => (Some(card), self.rest_card.take()),
            None => (self.rest_card.take(), None),
        }
    }

    /// 扣一颗心，返回剩余数量；归零时标记淘汰。
    pub fn lose_heart(&mut self) -> u8 {
        let remaining = self.hearts.unwrap_or(0).saturating_sub(1);
        self.hearts = Some(remaining);
        if remaining == 0 {
            self.eliminated = true;
        }
        remaining
    }

    pub fn reset_turn_flags(&mut self) {
        self.played_value_this_turn = false;
        self.played_effect_this_turn = false;
    }
}

/// 游戏阶段。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GamePhase {
    Setup,
    Drawing,
    Playing,
    Resolution,
    GameOver,
}

impl Default for GamePhase {
    fn default() -> Self {
        Self::Setup
    }
}

/// Pula 打出后等待施放者选择目标路径。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingPula {
    pub caster: PlayerId,
    pub target: PlayerId,
    pub card_id: CardId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FizzleReason {
    LockedSlot,
    Immune,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrawnCard {
    pub player_id: PlayerId,
    pub card_id: CardId,
    pub value: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerScore {
    pub player_id: PlayerId,
    pub score: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EndReason {
    PositionReached,
    HeartsDepleted,
    LastStanding,
    TimerExpired,
    SeriesDecided,
    SeriesDrawn,
    LadderCleared,
    LadderFailed,
}

/// 对局结果；`winners` 为空表示平局。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchOutcome {
    pub winners: Vec<PlayerId>,
    pub reason: EndReason,
}

impl MatchOutcome {
    pub fn new(winners: Vec<PlayerId>, reason: EndReason) -> Self {
        Self { winners, reason }
    }

    pub fn is_draw(&self) -> bool {
        self.winners.is_empty()
    }

    pub fn winner(&self) -> Option<PlayerId> {
        self.winners.first().copied()
    }
}

/// 游戏事件流（叙述通道，仅供日志/音效/界面使用）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    InitialDraw {
        draws: Vec<DrawnCard>,
    },
    InitialDrawTied {
        value: i32,
    },
    StartingPlayerChosen {
        player_id: PlayerId,
    },
    RoundStarted {
        turn: u32,
        starting_player: PlayerId,
    },
    HandRefillShort {
        player_id: PlayerId,
        pile: Pile,
    },
    ValueCardPlayed {
        player_id: PlayerId,
        card_id: CardId,
        value: i32,
    },
    EffectApplied {
        caster: PlayerId,
        target: PlayerId,
        card_id: CardId,
        effect: EffectName,
        #[serde(skip_serializing_if = "Option::is_none")]
        axis: Option<EffectAxis>,
        #[serde(default)]
        inverted: bool,
    },
    EffectFizzled {
        caster: PlayerId,
        target: PlayerId,
        card_id: CardId,
        reason: FizzleReason,
    },
    CardReplaced {
        player_id: PlayerId,
        card_id: CardId,
    },
    SlotReversed {
        caster: PlayerId,
        target: PlayerId,
        axis: EffectAxis,
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<EffectName>,
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<EffectName>,
    },
    ReversusTotalActivated {
        caster: PlayerId,
        inverted: Vec<PlayerId>,
    },
    SlotLocked {
        caster: PlayerId,
        target: PlayerId,
        axis: EffectAxis,
        effect: EffectName,
    },
    OneShotResolved {
        player_id: PlayerId,
        card_id: CardId,
        drawn: Vec<CardId>,
        cooldown: u8,
    },
    PulaDestinationSelected {
        caster: PlayerId,
        target: PlayerId,
        path_id: PathId,
    },
    FieldEffectApplied {
        effect: FieldEffect,
    },
    StarsAwarded {
        player_id: PlayerId,
        total: u32,
    },
    TurnPassed {
        player_id: PlayerId,
        consecutive_passes: u32,
    },
    TurnAdvanced {
        player_id: PlayerId,
    },
    RoundResolved {
        scores: Vec<PlayerScore>,
        winners: Vec<PlayerId>,
    },
    PawnMoved {
        player_id: PlayerId,
        from: u8,
        to: u8,
    },
    PathChanged {
        player_id: PlayerId,
        from: PathId,
        to: PathId,
    },
    HeartLost {
        #[serde(skip_serializing_if = "Option::is_none")]
        player_id: Option<PlayerId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        team: Option<TeamId>,
        remaining: u8,
    },
    PlayerEliminated {
        player_id: PlayerId,
    },
    TournamentRoundScored {
        #[serde(skip_serializing_if = "Option::is_none")]
        winner: Option<PlayerId>,
        score: TournamentScore,
    },
    LadderAdvanced {
        level: u32,
        opponent: String,
    },
    MatchEnded {
        outcome: MatchOutcome,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    InvalidPlayerIndex { player_id: PlayerId },
    DuplicateCardId { card_id: CardId },
    PositionOutOfRange { player_id: PlayerId, value: u8 },
    SlotOverfilled { player_id: PlayerId, axis: EffectAxis },
}

/// 游戏整体状态。可完整序列化，快照即可恢复对局。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    /// 按出手顺序排列。
    #[serde(default)]
    pub players: Vec<Player>,
    pub mode: ModeDescriptor,
    #[serde(default)]
    pub rules: RulesConfig,
    pub current_player: PlayerId,
    pub turn: u32,
    pub phase: GamePhase,
    #[serde(default)]
    pub decks: Piles,
    #[serde(default)]
    pub discard: Piles,
    #[serde(default)]
    pub consecutive_passes: u32,
    #[serde(default)]
    pub reversus_total_active: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_effects: Vec<FieldEffect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_pula: Option<PendingPula>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub team_hearts: BTreeMap<TeamId, u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ladder: Option<LadderProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament: Option<TournamentScore>,
    #[serde(default)]
    pub elapsed_seconds: u64,
    pub rng: DeckRng,
    pub next_card_id: CardId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<MatchOutcome>,
}

impl GameState {
    /// 按模式建局：构建并洗好两副牌，分配路径，按模式发放生命与进度记录。
    pub fn new(setups: Vec<PlayerSetup>, mode: ModeDescriptor, rules: RulesConfig, seed: u64) -> Self {
        let policy = mode.policy();
        let starting_hearts = policy.starting_hearts();
        let path_count = rules.path_count.max(1);

        let players: Vec<Player> = setups
            .into_iter()
            .enumerate()
            .map(|(idx, setup)| {
                let mut player = Player::new(setup.id, setup.name, idx as PathId % path_count);
                player.team = setup.team;
                if policy.uses_team_hearts() {
                    player.hearts = None;
                } else {
                    player.hearts = starting_hearts;
                }
                player
            })
            .collect();

        let mut team_hearts = BTreeMap::new();
        if policy.uses_team_hearts() {
            for team in players.iter().filter_map(|player| player.team) {
                team_hearts.insert(team, starting_hearts.unwrap_or(1));
            }
        }

        let current_player = players.first().map(|player| player.id).unwrap_or(0);
        let tournament = policy.tournament_seed(&players);

        let mut state = Self {
            players,
            mode,
            rules,
            current_player,
            turn: 1,
            phase: GamePhase::Setup,
            decks: Piles::default(),
            discard: Piles::default(),
            consecutive_passes: 0,
            reversus_total_active: false,
            field_effects: Vec::new(),
            pending_pula: None,
            team_hearts,
            ladder: None,
            tournament,
            elapsed_seconds: 0,
            rng: DeckRng::new(seed),
            next_card_id: 1,
            event_log: Vec::new(),
            outcome: None,
        };
        state.rebuild_decks();
        state
    }

    /// 天梯模式需要进度；`ladder.queue` 只包含当前对手之后的对手。
    pub fn with_ladder(mut self, ladder: LadderProgress) -> Self {
        self.ladder = Some(ladder);
        self
    }

    pub fn with_phase(mut self, phase: GamePhase) -> Self {
        self.phase = phase;
        self
    }

    /// 丢弃现有牌库并按配置重新构建、洗牌。
    pub fn rebuild_decks(&mut self) {
        let mut value = build_deck(&self.rules.value_deck, &mut self.next_card_id);
        let mut effect = build_deck(&self.rules.effect_deck, &mut self.next_card_id);
        shuffle_deck(&mut value, &mut self.rng);
        shuffle_deck(&mut effect, &mut self.rng);
        self.decks = Piles { value, effect };
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    /// 写入事件日志，同时追加到本次命令的返回列表。
    pub fn emit(&mut self, events: &mut Vec<GameEvent>, event: GameEvent) {
        self.record_event(event.clone());
        events.push(event);
    }

    pub fn get_player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|player| player.id == id)
    }

    pub fn get_player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.id == id)
    }

    pub fn player_index(&self, id: PlayerId) -> Option<usize> {
        self.players.iter().position(|player| player.id == id)
    }

    pub fn active_player_ids(&self) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|player| player.is_active())
            .map(|player| player.id)
            .collect()
    }

    pub fn active_player_count(&self) -> usize {
        self.players.iter().filter(|player| player.is_active()).count()
    }

    pub fn team_members(&self, team: TeamId) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|player| player.team == Some(team))
            .map(|player| player.id)
            .collect()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn has_field_effect(&self, player_id: PlayerId, kind: FieldEffectKind) -> bool {
        self.field_effects
            .iter()
            .any(|effect| effect.applies_to == player_id && effect.kind == kind)
    }

    /// 当前被活跃玩家占据的路径。
    pub fn occupied_paths(&self) -> HashSet<PathId> {
        self.players
            .iter()
            .filter(|player| player.is_active())
            .map(|player| player.path_id)
            .collect()
    }

    pub fn free_paths(&self) -> Vec<PathId> {
        let occupied = self.occupied_paths();
        (0..self.rules.path_count)
            .filter(|path| !occupied.contains(path))
            .collect()
    }

    /// 从抽牌堆发一张牌。抽牌堆为空且允许回收时，先把同类弃牌洗回。
    pub fn deal(&mut self, pile: Pile) -> Result<Card, DeckExhausted> {
        if self.decks.get(pile).is_empty() && self.rules.recycle_discard {
            let mut recycled = std::mem::take(self.discard.get_mut(pile));
            if !recycled.is_empty() {
                shuffle_deck(&mut recycled, &mut self.rng);
                tracing::debug!(?pile, cards = recycled.len(), "recycled discard pile");
                *self.decks.get_mut(pile) = recycled;
            }
        }
        self.decks.deal(pile)
    }

    /// 记录对局结果；已有结果时保持不变并返回原结果。
    pub fn declare_outcome(&mut self, outcome: MatchOutcome) -> (MatchOutcome, bool) {
        if let Some(existing) = &self.outcome {
            return (existing.clone(), false);
        }
        self.phase = GamePhase::GameOver;
        self.outcome = Some(outcome.clone());
        self.record_event(GameEvent::MatchEnded {
            outcome: outcome.clone(),
        });
        (outcome, true)
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        if !self.players.iter().any(|p| p.id == self.current_player) {
            return Err(IntegrityError::InvalidPlayerIndex {
                player_id: self.current_player,
            });
        }

        let mut seen = HashSet::new();
        for card in self.decks.iter().chain(self.discard.iter()) {
            if !seen.insert(card.id) {
                return Err(IntegrityError::DuplicateCardId { card_id: card.id });
            }
        }

        for player in &self.players {
            if player.position < 1 || player.position > self.rules.winning_position {
                return Err(IntegrityError::PositionOutOfRange {
                    player_id: player.id,
                    value: player.position,
                });
            }
            for axis in [EffectAxis::Score, EffectAxis::Movement] {
                let occupants = player
                    .played_effects
                    .iter()
                    .filter(|card| card.slot == Some(axis))
                    .count();
                if occupants > 1 {
                    return Err(IntegrityError::SlotOverfilled {
                        player_id: player.id,
                        axis,
                    });
                }
            }
            for card in player
                .hand
                .iter()
                .chain(player.rest_card.iter())
                .chain(player.played_values.iter())
                .chain(player.played_effects.iter())
            {
                if !seen.insert(card.id) {
                    return Err(IntegrityError::DuplicateCardId { card_id: card.id });
                }
            }
        }

        Ok(())
    }

    /// 两人单挑的示例对局，已完成先手抽牌并进入出牌阶段。
    pub fn sample() -> Self {
        let setups = vec![PlayerSetup::new(0, "Jogador"), PlayerSetup::new(1, "Oponente")];
        let mut state = GameState::new(setups, ModeDescriptor::Solo, RulesConfig::default(), 2024);
        let mut engine = super::rules::RuleEngine::new();
        if let Err(error) = engine.start_match(&mut state) {
            tracing::warn!(%error, "sample match failed to start");
        }
        state
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            players: Vec::new(),
            mode: ModeDescriptor::Solo,
            rules: RulesConfig::default(),
            current_player: 0,
            turn: 1,
            phase: GamePhase::default(),
            decks: Piles::default(),
            discard: Piles::default(),
            consecutive_passes: 0,
            reversus_total_active: false,
            field_effects: Vec::new(),
            pending_pula: None,
            team_hearts: BTreeMap::new(),
            ladder: None,
            tournament: None,
            elapsed_seconds: 0,
            rng: DeckRng::new(0),
            next_card_id: 1,
            event_log: Vec::new(),
            outcome: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::cards::CardKind;

    fn two_player_state() -> GameState {
        GameState::new(
            vec![PlayerSetup::new(0, "A"), PlayerSetup::new(1, "B")],
            ModeDescriptor::Solo,
            RulesConfig::default(),
            11,
        )
    }

    #[test]
    fn new_match_builds_full_decks_and_distinct_paths() {
        let state = two_player_state();
        assert_eq!(state.decks.value.len(), 40);
        assert_eq!(state.decks.effect.len(), 25);
        assert_eq!(state.phase, GamePhase::Setup);
        assert_ne!(state.players[0].path_id, state.players[1].path_id);
        assert!(state.players.iter().all(|player| player.position == 1));
        state.integrity_check().expect("fresh state should be consistent");
    }

    #[test]
    fn integrity_check_flags_duplicate_cards() {
        let mut state = two_player_state();
        let card = state.decks.value.last().cloned().expect("deck has cards");
        state.players[0].hand.push(card.clone());
        assert_eq!(
            state.integrity_check(),
            Err(IntegrityError::DuplicateCardId { card_id: card.id })
        );
    }

    #[test]
    fn deal_recycles_discard_only_when_enabled() {
        let mut state = two_player_state();
        let drained: Vec<Card> = state.decks.value.drain(..).collect();
        state.discard.put_all(drained);
        assert!(state.deal(Pile::Value).is_err(), "recycling is off by default");

        state.rules = state.rules.clone().with_recycle_discard(true);
        let card = state.deal(Pile::Value).expect("discard should be recycled");
        assert_eq!(card.kind, CardKind::Value);
        assert!(state.discard.value.is_empty());
        assert_eq!(state.decks.value.len(), 39);
    }

    #[test]
    fn sample_state_is_ready_to_play() {
        let state = GameState::sample();
        assert_eq!(state.phase, GamePhase::Playing);
        assert!(state.players.iter().all(|player| player.rest_card.is_some()));
        assert_eq!(state.integrity_check(), Ok(()));
    }

    #[test]
    fn declaring_outcome_twice_keeps_first_result() {
        let mut state = two_player_state();
        let (_, first) = state.declare_outcome(MatchOutcome::new(vec![0], EndReason::PositionReached));
        let (kept, second) = state.declare_outcome(MatchOutcome::new(vec![1], EndReason::TimerExpired));
        assert!(first);
        assert!(!second);
        assert_eq!(kept.winner(), Some(0));
        let endings = state
            .event_log
            .iter()
            .filter(|event| matches!(event, GameEvent::MatchEnded { .. }))
            .count();
        assert_eq!(endings, 1);
    }

    #[test]
    fn take_final_rest_prefers_latest_value_play() {
        let mut player = Player::new(0, "A", 0);
        player.rest_card = Some(Card::value(1, 4));
        player.played_values.push(Card::value(2, 8));
        player.next_rest = Some(2);
        let (rest, stale) = player.take_final_rest();
        assert_eq!(rest.map(|card| card.id), Some(2));
        assert_eq!(stale.map(|card| card.id), Some(1));
        assert!(player.played_values.is_empty());
    }

    #[test]
    fn losing_last_heart_eliminates_player() {
        let mut player = Player::new(0, "A", 0);
        player.hearts = Some(1);
        assert_eq!(player.lose_heart(), 0);
        assert!(player.eliminated);
    }
}
