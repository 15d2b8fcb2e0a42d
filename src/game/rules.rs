use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{
    cards::{Card, DeckExhausted, Pile},
    effects::{EffectContext, EffectResolver},
    legal::{self, GameAction, PlayEffectCard, PlayValueCard},
    scoring,
    state::{
        DrawnCard, FieldEffect, GameEvent, GamePhase, GameState, IntegrityError, MatchOutcome,
        PathId, PlayerId,
    },
};

/// 先手抽牌连续平局的上限，超过后由平局者中出手顺序最靠前的玩家先手。
const MAX_INITIAL_DRAW_ATTEMPTS: u32 = 64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IllegalReason {
    WrongPhase,
    MatchFinished,
    NotPlayerTurn,
    CardNotInHand,
    WrongCardKind,
    ValueAlreadyPlayed,
    ValueLimitReached,
    EffectAlreadyPlayed,
    CardOnCooldown,
    MustPlayValueCard,
    NoPendingPula,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TargetIssue {
    MissingTarget,
    UnknownPlayer,
    Eliminated,
    MissingReversalAxis,
    LockNotAllowed,
    UnknownPath,
    PathOccupied,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum RuleError {
    #[error("illegal action: {reason:?}")]
    IllegalAction { reason: IllegalReason },
    #[error("invalid target: {reason:?}")]
    InvalidTarget { reason: TargetIssue },
    #[error("{pile:?} pile is exhausted")]
    DeckExhausted { pile: Pile },
    #[error("no eligible player can take the next turn")]
    NoEligiblePlayer,
    #[error("player {player_id} not found")]
    PlayerNotFound { player_id: PlayerId },
    #[error("state integrity violated: {error:?}")]
    IntegrityViolation { error: IntegrityError },
}

impl From<DeckExhausted> for RuleError {
    fn from(error: DeckExhausted) -> Self {
        RuleError::DeckExhausted { pile: error.pile }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<MatchOutcome>,
}

impl RuleResolution {
    pub fn new(state: GameState, mut events: Vec<GameEvent>) -> Self {
        let outcome = state.outcome.clone();
        if let Some(ref outcome) = outcome {
            let has_event = events
                .iter()
                .any(|event| matches!(event, GameEvent::MatchEnded { .. }));
            if !has_event {
                events.push(GameEvent::MatchEnded {
                    outcome: outcome.clone(),
                });
            }
        }

        Self {
            state,
            events,
            outcome,
        }
    }
}

#[derive(Default)]
pub struct RuleEngine {
    effects: EffectResolver,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            effects: EffectResolver::new(),
        }
    }

    fn ensure_integrity(state: &GameState) -> Result<(), RuleError> {
        state
            .integrity_check()
            .map_err(|error| RuleError::IntegrityViolation { error })
    }

    fn refresh_scores(state: &mut GameState) {
        let variant = state.mode.policy().scoring();
        scoring::refresh_live_scores(state, variant);
    }

    /// 开局：先手抽牌（部分模式跳过），然后开始第一回合。
    pub fn start_match(&mut self, state: &mut GameState) -> Result<Vec<GameEvent>, RuleError> {
        if state.is_finished() {
            return Err(RuleError::IllegalAction {
                reason: IllegalReason::MatchFinished,
            });
        }
        if !matches!(state.phase, GamePhase::Setup | GamePhase::Drawing) {
            return Err(RuleError::IllegalAction {
                reason: IllegalReason::WrongPhase,
            });
        }
        let first_active = state
            .active_player_ids()
            .first()
            .copied()
            .ok_or(RuleError::NoEligiblePlayer)?;

        let mut events = Vec::new();
        let policy = state.mode.policy();
        let starter = if policy.skips_initial_draw() {
            first_active
        } else {
            self.run_initial_draw(state, &mut events)?
        };

        state.current_player = starter;
        state.emit(
            &mut events,
            GameEvent::StartingPlayerChosen { player_id: starter },
        );
        info!(starter, mode = ?state.mode, "match started");
        self.start_round(state, starter, true, &mut events);
        Self::refresh_scores(state);
        Ok(events)
    }

    /// 每名玩家亮一张数值牌，最大者先手；最高两张相同则全部弃掉重抽。
    fn run_initial_draw(
        &mut self,
        state: &mut GameState,
        events: &mut Vec<GameEvent>,
    ) -> Result<PlayerId, RuleError> {
        state.phase = GamePhase::Drawing;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let mut draws: Vec<(PlayerId, Card)> = Vec::new();
            for player_id in state.active_player_ids() {
                match state.deal(Pile::Value) {
                    Ok(card) => draws.push((player_id, card)),
                    Err(exhausted) => {
                        warn!(%exhausted, "initial draw aborted");
                        state.discard.put_all(draws.into_iter().map(|(_, card)| card));
                        return Err(exhausted.into());
                    }
                }
            }

            state.emit(
                events,
                GameEvent::InitialDraw {
                    draws: draws
                        .iter()
                        .map(|(player_id, card)| DrawnCard {
                            player_id: *player_id,
                            card_id: card.id,
                            value: card.numeric_value(),
                        })
                        .collect(),
                },
            );

            let mut values: Vec<i32> = draws.iter().map(|(_, card)| card.numeric_value()).collect();
            values.sort_unstable_by(|a, b| b.cmp(a));
            let top = values.first().copied().unwrap_or(0);
            let decided = values.len() < 2 || values[0] > values[1];

            if decided || attempts >= MAX_INITIAL_DRAW_ATTEMPTS {
                let starter = draws
                    .iter()
                    .find(|(_, card)| card.numeric_value() == top)
                    .map(|(player_id, _)| *player_id)
                    .ok_or(RuleError::NoEligiblePlayer)?;
                for (player_id, card) in draws {
                    let old = state
                        .get_player_mut(player_id)
                        .and_then(|player| player.rest_card.replace(card));
                    if let Some(old) = old {
                        state.discard.put(old);
                    }
                }
                return Ok(starter);
            }

            debug!(value = top, "initial draw tied, redrawing");
            state.emit(events, GameEvent::InitialDrawTied { value: top });
            state.discard.put_all(draws.into_iter().map(|(_, card)| card));
        }
    }

    /// 清理上一回合并开始新回合。首回合（含天梯换关）不增加回合数、不推进冷却。
    fn start_round(
        &mut self,
        state: &mut GameState,
        starter: PlayerId,
        first_round: bool,
        events: &mut Vec<GameEvent>,
    ) {
        if !first_round {
            state.turn += 1;
        }

        for player in state.players.iter_mut() {
            let (rest, stale) = player.take_final_rest();
            player.rest_card = rest;
            if let Some(stale) = stale {
                state.discard.put(stale);
            }
            state.discard.put_all(player.played_values.drain(..));
            state.discard.put_all(player.played_effects.drain(..));
            player.effects.clear();
            player.pula_target_path = None;
            player.reset_turn_flags();
            if !first_round {
                for card in player.hand.iter_mut() {
                    card.cooldown = card.cooldown.saturating_sub(1);
                }
            }
        }

        state.reversus_total_active = false;
        state.consecutive_passes = 0;
        state.field_effects.clear();
        state.pending_pula = None;

        for player_id in state.active_player_ids() {
            self.refill_hand(state, player_id, events);
        }

        state.phase = GamePhase::Playing;
        state.current_player = starter;
        let turn = state.turn;
        state.emit(
            events,
            GameEvent::RoundStarted {
                turn,
                starting_player: starter,
            },
        );
    }

    /// 补牌到下限；某一叠抽空时该玩家的这一叠停止补牌，其余流程照常。
    fn refill_hand(&mut self, state: &mut GameState, player_id: PlayerId, events: &mut Vec<GameEvent>) {
        let (value_missing, effect_missing) = match state.get_player(player_id) {
            Some(player) => (
                state.rules.min_value_cards.saturating_sub(player.value_cards_in_hand()),
                state.rules.min_effect_cards.saturating_sub(player.effect_cards_in_hand()),
            ),
            None => return,
        };

        for (pile, missing) in [(Pile::Value, value_missing), (Pile::Effect, effect_missing)] {
            for _ in 0..missing {
                match state.deal(pile) {
                    Ok(card) => {
                        if let Some(player) = state.get_player_mut(player_id) {
                            player.hand.push(card);
                        }
                    }
                    Err(exhausted) => {
                        warn!(player_id, %exhausted, "hand refill stopped early");
                        state.emit(events, GameEvent::HandRefillShort { player_id, pile });
                        break;
                    }
                }
            }
        }
    }

    pub fn play_value_card(
        &mut self,
        state: &mut GameState,
        action: PlayValueCard,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_integrity(state)?;
        legal::validate_value_play(state, &action)?;

        let player = state
            .get_player_mut(action.player_id)
            .ok_or(RuleError::PlayerNotFound {
                player_id: action.player_id,
            })?;
        let card = player
            .remove_card_from_hand(action.card_id)
            .ok_or(RuleError::IllegalAction {
                reason: IllegalReason::CardNotInHand,
            })?;
        let value = card.numeric_value();
        player.next_rest = Some(card.id);
        player.played_values.push(card);
        player.played_value_this_turn = true;
        state.consecutive_passes = 0;

        let mut events = Vec::new();
        state.emit(
            &mut events,
            GameEvent::ValueCardPlayed {
                player_id: action.player_id,
                card_id: action.card_id,
                value,
            },
        );
        debug!(player_id = action.player_id, value, "value card played");
        Self::refresh_scores(state);
        Ok(events)
    }

    pub fn play_effect_card(
        &mut self,
        state: &mut GameState,
        action: PlayEffectCard,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_integrity(state)?;
        let (target, plan) = legal::validate_effect_play(state, &action)?;

        let player = state
            .get_player_mut(action.player_id)
            .ok_or(RuleError::PlayerNotFound {
                player_id: action.player_id,
            })?;
        let card = player
            .remove_card_from_hand(action.card_id)
            .ok_or(RuleError::IllegalAction {
                reason: IllegalReason::CardNotInHand,
            })?;
        player.played_effect_this_turn = true;
        state.consecutive_passes = 0;

        debug!(
            caster = action.player_id,
            target,
            card_id = action.card_id,
            ?plan,
            "effect card played"
        );
        let ctx = EffectContext::new(action.player_id, action.card_id).with_target(target);
        let resolution = self.effects.resolve(state, &ctx, card, plan);
        Self::refresh_scores(state);
        Ok(resolution.events)
    }

    /// 结束回合。本回合没有出过牌才计为一次连续跳过。
    pub fn pass_turn(
        &mut self,
        state: &mut GameState,
        player_id: PlayerId,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_integrity(state)?;
        legal::validate_pass(state, player_id)?;

        let played = state
            .get_player(player_id)
            .map(|player| player.played_any_card_this_turn())
            .unwrap_or(false);
        if !played {
            state.consecutive_passes += 1;
        }
        if let Some(player) = state.get_player_mut(player_id) {
            player.reset_turn_flags();
        }

        let mut events = Vec::new();
        let consecutive_passes = state.consecutive_passes;
        state.emit(
            &mut events,
            GameEvent::TurnPassed {
                player_id,
                consecutive_passes,
            },
        );
        self.advance_turn(state, &mut events);
        Self::refresh_scores(state);
        Ok(events)
    }

    pub fn select_pula_destination(
        &mut self,
        state: &mut GameState,
        player_id: PlayerId,
        path_id: PathId,
    ) -> Result<Vec<GameEvent>, RuleError> {
        let pending = legal::validate_pula_selection(state, player_id, path_id)?;
        if let Some(target) = state.get_player_mut(pending.target) {
            target.pula_target_path = Some(path_id);
        }
        state.pending_pula = None;

        let mut events = Vec::new();
        state.emit(
            &mut events,
            GameEvent::PulaDestinationSelected {
                caster: player_id,
                target: pending.target,
                path_id,
            },
        );
        Ok(events)
    }

    /// 外部剧情能力施加的场地效果，持续到下一回合开始。
    pub fn apply_field_effect(
        &mut self,
        state: &mut GameState,
        effect: FieldEffect,
    ) -> Result<Vec<GameEvent>, RuleError> {
        if state.is_finished() {
            return Err(RuleError::IllegalAction {
                reason: IllegalReason::MatchFinished,
            });
        }
        let target = state
            .get_player(effect.applies_to)
            .ok_or(RuleError::PlayerNotFound {
                player_id: effect.applies_to,
            })?;
        if target.eliminated {
            return Err(RuleError::InvalidTarget {
                reason: TargetIssue::Eliminated,
            });
        }

        let mut events = Vec::new();
        if !state.field_effects.contains(&effect) {
            state.field_effects.push(effect);
            state.emit(&mut events, GameEvent::FieldEffectApplied { effect });
        }
        Self::refresh_scores(state);
        Ok(events)
    }

    /// 星星只用于双人同时到达终点时的判定。
    pub fn award_stars(
        &mut self,
        state: &mut GameState,
        player_id: PlayerId,
        stars: u32,
    ) -> Result<Vec<GameEvent>, RuleError> {
        if state.is_finished() {
            return Err(RuleError::IllegalAction {
                reason: IllegalReason::MatchFinished,
            });
        }
        let player = state
            .get_player_mut(player_id)
            .ok_or(RuleError::PlayerNotFound { player_id })?;
        player.stars = player.stars.saturating_add(stars);
        let total = player.stars;

        let mut events = Vec::new();
        state.emit(&mut events, GameEvent::StarsAwarded { player_id, total });
        Ok(events)
    }

    /// 推进对局时钟。对局结束后的计时直接忽略。
    pub fn tick_clock(
        &mut self,
        state: &mut GameState,
        elapsed_secs: u64,
    ) -> Result<Vec<GameEvent>, RuleError> {
        let mut events = Vec::new();
        if state.is_finished() {
            debug!("clock tick ignored after match end");
            return Ok(events);
        }

        state.elapsed_seconds = state.elapsed_seconds.saturating_add(elapsed_secs);
        let policy = state.mode.policy();
        let Some(limit) = policy.time_limit_secs() else {
            return Ok(events);
        };
        if state.elapsed_seconds >= limit {
            if let Some(outcome) = policy.on_timeout(state) {
                info!(elapsed = state.elapsed_seconds, limit, "match timer expired");
                Self::finish(state, outcome, &mut events);
            }
        }
        Ok(events)
    }

    /// 胜负判定；对局已结束时不产生任何变化。
    pub fn check_match_end(&mut self, state: &mut GameState) -> Result<Vec<GameEvent>, RuleError> {
        let mut events = Vec::new();
        if state.is_finished() {
            return Ok(events);
        }
        if let Some(outcome) = state.mode.policy().check_end(state) {
            Self::finish(state, outcome, &mut events);
        }
        Ok(events)
    }

    pub fn apply_action(
        &mut self,
        state: &mut GameState,
        action: GameAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        match action {
            GameAction::PlayValue(play) => self.play_value_card(state, play),
            GameAction::PlayEffect(play) => self.play_effect_card(state, play),
            GameAction::SelectPulaDestination { player_id, path_id } => {
                self.select_pula_destination(state, player_id, path_id)
            }
            GameAction::Pass { player_id } => self.pass_turn(state, player_id),
        }
    }

    /// 在副本上执行动作，原状态不变。
    pub fn simulate(&mut self, state: &GameState, action: GameAction) -> Result<RuleResolution, RuleError> {
        let mut next_state = state.clone();
        let events = self.apply_action(&mut next_state, action)?;
        Ok(RuleResolution::new(next_state, events))
    }

    fn finish(state: &mut GameState, outcome: MatchOutcome, events: &mut Vec<GameEvent>) {
        let (outcome, fresh) = state.declare_outcome(outcome);
        if fresh {
            info!(winners = ?outcome.winners, reason = ?outcome.reason, "match ended");
            events.push(GameEvent::MatchEnded { outcome });
        }
    }

    /// 出手顺序中下一个未淘汰的玩家，最多扫描两圈。
    fn next_active_after(state: &GameState, player_id: PlayerId) -> Result<PlayerId, RuleError> {
        let count = state.players.len();
        if count == 0 {
            return Err(RuleError::NoEligiblePlayer);
        }
        let start = state.player_index(player_id).unwrap_or(0);
        (1..=count * 2)
            .map(|step| &state.players[(start + step) % count])
            .find(|player| player.is_active())
            .map(|player| player.id)
            .ok_or(RuleError::NoEligiblePlayer)
    }

    fn advance_turn(&mut self, state: &mut GameState, events: &mut Vec<GameEvent>) {
        if state.consecutive_passes as usize >= state.active_player_count() {
            self.resolve_round(state, events);
            return;
        }

        match Self::next_active_after(state, state.current_player) {
            Ok(next) => {
                state.current_player = next;
                if let Some(player) = state.get_player_mut(next) {
                    player.reset_turn_flags();
                }
                state.emit(events, GameEvent::TurnAdvanced { player_id: next });
            }
            Err(error) => {
                warn!(%error, "forcing round end");
                self.resolve_round(state, events);
            }
        }
    }

    /// 回合结算：计分 → 移动 → 模式增量 → 胜负判定 → 下一回合或换关。
    fn resolve_round(&mut self, state: &mut GameState, events: &mut Vec<GameEvent>) {
        state.phase = GamePhase::Resolution;
        let policy = state.mode.policy();

        let round = scoring::score_round(state, policy.scoring(), policy.team_ties());
        for entry in &round.scores {
            if let Some(player) = state.get_player_mut(entry.player_id) {
                player.score = entry.score;
            }
        }
        info!(turn = state.turn, winners = ?round.winners, "round resolved");
        state.emit(
            events,
            GameEvent::RoundResolved {
                scores: round.scores.clone(),
                winners: round.winners.clone(),
            },
        );

        if policy.moves_pawns() {
            for event in scoring::apply_movement(state, &round.winners) {
                state.emit(events, event);
            }
        }
        for event in policy.after_round(state, &round) {
            state.emit(events, event);
        }

        if let Some(outcome) = policy.check_end(state) {
            Self::finish(state, outcome, events);
            return;
        }

        if policy.next_stage(state) {
            self.advance_ladder(state, events);
            return;
        }

        let starter = round
            .winners
            .iter()
            .copied()
            .find(|id| state.get_player(*id).map(|p| p.is_active()).unwrap_or(false))
            .or_else(|| {
                state
                    .get_player(state.current_player)
                    .filter(|player| player.is_active())
                    .map(|player| player.id)
            })
            .or_else(|| Self::next_active_after(state, state.current_player).ok());

        match starter {
            Some(starter) => self.start_round(state, starter, false, events),
            None => {
                warn!("no active player left to start the next round");
                if let Some(outcome) = policy.check_end(state) {
                    Self::finish(state, outcome, events);
                }
            }
        }
    }

    /// 天梯换关：跑者保留手牌和最终休息牌，新对手继承上一名对手的休息牌、空手、一颗心。
    fn advance_ladder(&mut self, state: &mut GameState, events: &mut Vec<GameEvent>) {
        let Some(ladder) = state.ladder.as_mut() else {
            return;
        };
        let Some(next) = ladder.queue.pop_front() else {
            return;
        };
        let (runner_id, opponent_id, level) = (ladder.runner, ladder.opponent, ladder.level);

        if let Some(runner) = state.get_player_mut(runner_id) {
            let (rest, _) = runner.take_final_rest();
            runner.rest_card = rest;
            runner.played_values.clear();
            runner.played_effects.clear();
            runner.position = 1;
            runner.hearts = Some(1);
            runner.eliminated = false;
        }
        if let Some(opponent) = state.get_player_mut(opponent_id) {
            let (rest, _) = opponent.take_final_rest();
            opponent.rest_card = rest;
            opponent.name = next.name.clone();
            opponent.hand.clear();
            opponent.played_values.clear();
            opponent.played_effects.clear();
            opponent.position = 1;
            opponent.hearts = Some(1);
            opponent.eliminated = false;
        }

        state.discard = Default::default();
        state.rebuild_decks();
        info!(level, opponent = %next.name, "ladder advanced");
        state.emit(
            events,
            GameEvent::LadderAdvanced {
                level,
                opponent: next.name,
            },
        );
        self.start_round(state, runner_id, true, events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::cards::{EffectAxis, EffectName};
    use crate::game::config::RulesConfig;
    use crate::game::modes::{BossVariant, LadderOpponent, LadderProgress, ModeDescriptor};
    use crate::game::state::{EndReason, PlayerSetup};

    fn duel(mode: ModeDescriptor) -> GameState {
        GameState::new(
            vec![PlayerSetup::new(0, "A"), PlayerSetup::new(1, "B")],
            mode,
            RulesConfig::default(),
            99,
        )
    }

    /// 已进入出牌阶段、手牌可控的对局。
    fn setup_state(mode: ModeDescriptor) -> GameState {
        let mut state = duel(mode).with_phase(GamePhase::Playing);
        state.current_player = 0;
        state.players[0].hand = vec![Card::value(900, 6), Card::effect(901, EffectName::Mais)];
        state.players[1].hand = vec![Card::value(910, 2), Card::effect(911, EffectName::Sobe)];
        state.players[0].rest_card = Some(Card::value(902, 5));
        state.players[1].rest_card = Some(Card::value(912, 4));
        state
    }

    fn pass_all(engine: &mut RuleEngine, state: &mut GameState) -> Vec<GameEvent> {
        let mut events = Vec::new();
        while state.phase == GamePhase::Playing && state.consecutive_passes == 0 {
            let current = state.current_player;
            events.extend(engine.pass_turn(state, current).expect("pass should be legal"));
        }
        while state.phase == GamePhase::Playing && state.consecutive_passes > 0 {
            let current = state.current_player;
            events.extend(engine.pass_turn(state, current).expect("pass should be legal"));
        }
        events
    }

    #[test]
    fn next_active_after_skips_eliminated_and_fails_when_none_left() {
        let mut state = setup_state(ModeDescriptor::Solo);
        state.players[1].eliminated = true;
        assert_eq!(RuleEngine::next_active_after(&state, 0), Ok(0));

        state.players[0].eliminated = true;
        assert_eq!(
            RuleEngine::next_active_after(&state, 0),
            Err(RuleError::NoEligiblePlayer)
        );

        state.players.clear();
        assert_eq!(
            RuleEngine::next_active_after(&state, 0),
            Err(RuleError::NoEligiblePlayer)
        );
    }

    #[test]
    fn advance_turn_without_active_players_resolves_round() {
        let mut engine = RuleEngine::new();
        let mut state = setup_state(ModeDescriptor::Solo);
        for player in &mut state.players {
            player.eliminated = true;
        }
        let mut events = Vec::new();
        engine.advance_turn(&mut state, &mut events);

        assert_ne!(state.phase, GamePhase::Playing);
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::RoundResolved { .. })));
        assert!(!events
            .iter()
            .any(|event| matches!(event, GameEvent::TurnAdvanced { .. })));
    }

    #[test]
    fn start_match_draws_starter_and_fills_hands() {
        let mut engine = RuleEngine::new();
        let mut state = duel(ModeDescriptor::Solo);
        let events = engine.start_match(&mut state).expect("match should start");

        assert_eq!(state.phase, GamePhase::Playing);
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::StartingPlayerChosen { .. })));
        for player in &state.players {
            assert!(player.rest_card.is_some(), "drawn card becomes rest card");
            assert_eq!(player.value_cards_in_hand(), 3);
            assert_eq!(player.effect_cards_in_hand(), 2);
        }
        let starter = state.current_player;
        let starter_rest = state
            .get_player(starter)
            .and_then(|player| player.rest_card.as_ref())
            .map(|card| card.numeric_value())
            .unwrap_or_default();
        assert!(state
            .players
            .iter()
            .all(|player| player.rest_card.as_ref().map(|c| c.numeric_value()).unwrap_or(0) <= starter_rest));
        state.integrity_check().expect("cards should be conserved");
    }

    #[test]
    fn start_match_reports_exhausted_value_deck() {
        let mut engine = RuleEngine::new();
        let mut state = duel(ModeDescriptor::Solo);
        state.decks.value.truncate(1);
        let result = engine.start_match(&mut state);
        assert_eq!(result, Err(RuleError::DeckExhausted { pile: Pile::Value }));
        assert_eq!(state.discard.value.len(), 1, "partial draw is discarded");
    }

    #[test]
    fn skipping_boss_variants_start_with_first_player() {
        let mut engine = RuleEngine::new();
        let mut state = duel(ModeDescriptor::StoryBoss {
            boss: BossVariant::StarDuel {
                challenger: 0,
                defender: 1,
            },
        });
        let events = engine.start_match(&mut state).expect("match should start");
        assert_eq!(state.current_player, 0);
        assert!(!events
            .iter()
            .any(|event| matches!(event, GameEvent::InitialDraw { .. })));
    }

    #[test]
    fn playing_card_out_of_turn_leaves_state_unchanged() {
        let mut engine = RuleEngine::new();
        let mut state = setup_state(ModeDescriptor::Solo);
        let before = state.clone();
        let result = engine.play_value_card(
            &mut state,
            PlayValueCard {
                player_id: 1,
                card_id: 910,
            },
        );
        assert_eq!(
            result,
            Err(RuleError::IllegalAction {
                reason: IllegalReason::NotPlayerTurn
            })
        );
        assert_eq!(state, before);
    }

    #[test]
    fn mais_scores_rest_value_at_round_end() {
        let mut engine = RuleEngine::new();
        let mut state = setup_state(ModeDescriptor::Solo);
        state.players[0].hand = vec![Card::effect(901, EffectName::Mais)];
        state.players[1].hand.clear();

        engine
            .play_effect_card(&mut state, PlayEffectCard::new(0, 901).with_target(0))
            .expect("mais should be playable");
        let events = pass_all(&mut engine, &mut state);

        let scores = events
            .iter()
            .find_map(|event| match event {
                GameEvent::RoundResolved { scores, .. } => Some(scores.clone()),
                _ => None,
            })
            .expect("round should resolve");
        let a = scores
            .iter()
            .find(|entry| entry.player_id == 0)
            .expect("player 0 scored");
        assert_eq!(a.score, 5);
        assert_eq!(state.get_player(0).map(|p| p.position), Some(2));
    }

    #[test]
    fn round_ends_after_every_active_player_passes() {
        let mut engine = RuleEngine::new();
        let mut state = setup_state(ModeDescriptor::Solo);
        state.players[0].hand = vec![Card::value(900, 6)];
        state.players[1].hand = vec![Card::value(910, 2)];

        engine
            .play_value_card(
                &mut state,
                PlayValueCard {
                    player_id: 0,
                    card_id: 900,
                },
            )
            .expect("value play");
        engine.pass_turn(&mut state, 0).expect("end turn after playing");
        assert_eq!(state.consecutive_passes, 0, "ending a turn with a play is not a pass");

        engine.pass_turn(&mut state, 1).expect("pass");
        assert_eq!(state.phase, GamePhase::Playing);
        let events = engine.pass_turn(&mut state, 0).expect("pass");
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::RoundResolved { .. })));

        assert_eq!(state.turn, 2);
        assert_eq!(state.current_player, 0, "round winner starts next round");
        let rest = state.players[0].rest_card.as_ref().map(|card| card.id);
        assert_eq!(rest, Some(900), "last value play becomes the rest card");
        assert!(state.discard.value.iter().any(|card| card.id == 902));
    }

    #[test]
    fn solo_double_finish_does_not_end_match() {
        let mut engine = RuleEngine::new();
        let mut state = setup_state(ModeDescriptor::Solo);
        state.players[0].hand.clear();
        state.players[1].hand.clear();
        state.players[0].position = 9;
        state.players[1].position = 9;
        state.players[0].effects.movement = Some(EffectName::Sobe);
        state.players[1].effects.movement = Some(EffectName::Sobe);

        pass_all(&mut engine, &mut state);
        assert!(state.players.iter().all(|player| player.position == 10));
        assert!(state.outcome.is_none());
        assert_eq!(state.phase, GamePhase::Playing);

        let events = engine.check_match_end(&mut state).expect("check succeeds");
        assert!(events.is_empty());
    }

    #[test]
    fn heart_timer_expiry_is_a_loss() {
        let mut engine = RuleEngine::new();
        let mode = ModeDescriptor::StoryBoss {
            boss: BossVariant::TeamHearts {
                hearts: 10,
                time_limit_secs: 900,
                timeout_loser: 0,
            },
        };
        let mut state = GameState::new(
            vec![
                PlayerSetup::new(0, "A").on_team(0),
                PlayerSetup::new(1, "B").on_team(1),
            ],
            mode,
            RulesConfig::default(),
            1,
        );
        engine.start_match(&mut state).expect("match should start");

        assert!(engine.tick_clock(&mut state, 600).expect("tick").is_empty());
        let events = engine.tick_clock(&mut state, 300).expect("tick");
        let outcome = state.outcome.clone().expect("timer should end match");
        assert_eq!(outcome.reason, EndReason::TimerExpired);
        assert_eq!(outcome.winners, vec![1]);
        assert_eq!(events.len(), 1);

        let late = engine.tick_clock(&mut state, 60).expect("late tick");
        assert!(late.is_empty(), "ticks after the end are ignored");
    }

    #[test]
    fn end_check_is_idempotent_after_game_over() {
        let mut engine = RuleEngine::new();
        let mut state = setup_state(ModeDescriptor::Solo);
        state.players[0].position = 10;
        let first = engine.check_match_end(&mut state).expect("check");
        assert_eq!(first.len(), 1);
        assert_eq!(state.phase, GamePhase::GameOver);

        let snapshot = state.clone();
        let second = engine.check_match_end(&mut state).expect("check again");
        assert!(second.is_empty());
        assert_eq!(state, snapshot);
    }

    #[test]
    fn empty_value_deck_stops_refill_without_failing() {
        let mut engine = RuleEngine::new();
        let mut state = setup_state(ModeDescriptor::Solo);
        state.players[0].hand.clear();
        state.players[1].hand.clear();
        state.decks.value.clear();

        let events = pass_all(&mut engine, &mut state);
        assert_eq!(state.phase, GamePhase::Playing);
        assert!(events.iter().any(|event| matches!(
            event,
            GameEvent::HandRefillShort {
                pile: Pile::Value,
                ..
            }
        )));
        assert!(state.players.iter().all(|player| player.value_cards_in_hand() == 0));
        assert!(state.players.iter().all(|player| player.effect_cards_in_hand() == 2));
    }

    #[test]
    fn locked_slot_fizzle_consumes_reversus() {
        let mut engine = RuleEngine::new();
        let mut state = setup_state(ModeDescriptor::Solo);
        state.players[0].hand = vec![
            Card::effect(920, EffectName::ReversusTotal),
            Card::effect(921, EffectName::Reversus),
        ];
        engine
            .play_effect_card(
                &mut state,
                PlayEffectCard::new(0, 920)
                    .with_target(1)
                    .with_lock(EffectName::Menos),
            )
            .expect("lock is legal");
        state.players[0].played_effect_this_turn = false;

        let events = engine
            .play_effect_card(
                &mut state,
                PlayEffectCard::new(0, 921)
                    .with_target(1)
                    .with_axis(EffectAxis::Score),
            )
            .expect("reversus play is legal even if it fizzles");
        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::EffectFizzled { .. })));
        assert_eq!(state.players[1].effects.score, Some(EffectName::Menos));
        assert!(state.players[0].card_in_hand(921).is_none());
        assert!(state.discard.effect.iter().any(|card| card.id == 921));
    }

    #[test]
    fn pula_destination_is_applied_at_resolution() {
        let mut engine = RuleEngine::new();
        let mut state = setup_state(ModeDescriptor::Solo);
        state.players[0].hand = vec![Card::effect(930, EffectName::Pula)];
        state.players[1].hand.clear();

        engine
            .play_effect_card(&mut state, PlayEffectCard::new(0, 930).with_target(0))
            .expect("pula is legal");
        let path = state.free_paths()[0];
        assert_eq!(
            engine.select_pula_destination(&mut state, 1, path),
            Err(RuleError::IllegalAction {
                reason: IllegalReason::NotPlayerTurn
            })
        );
        engine
            .select_pula_destination(&mut state, 0, path)
            .expect("caster picks a free path");
        assert_eq!(state.players[0].path_id, 0, "path changes only at resolution");

        pass_all(&mut engine, &mut state);
        assert_eq!(state.players[0].path_id, path);
    }

    #[test]
    fn tournament_match_reports_series_winner() {
        let mut engine = RuleEngine::new();
        let mut state = setup_state(ModeDescriptor::Tournament { rounds: 3 });
        state.tournament = Some(crate::game::modes::TournamentScore::new(0, 1));
        if let Some(score) = state.tournament.as_mut() {
            score.wins = [1, 0];
        }
        state.players[0].hand = vec![Card::value(940, 10)];
        state.players[1].hand = vec![Card::value(941, 2)];

        engine
            .play_value_card(
                &mut state,
                PlayValueCard {
                    player_id: 0,
                    card_id: 940,
                },
            )
            .expect("value play");
        engine.pass_turn(&mut state, 0).expect("end turn");
        engine
            .play_value_card(
                &mut state,
                PlayValueCard {
                    player_id: 1,
                    card_id: 941,
                },
            )
            .expect("value play");
        engine.pass_turn(&mut state, 1).expect("end turn");
        pass_all(&mut engine, &mut state);

        let outcome = state.outcome.clone().expect("series decided");
        assert_eq!(outcome.winners, vec![0]);
        assert_eq!(outcome.reason, EndReason::SeriesDecided);
        assert!(state.players.iter().all(|player| player.position == 1));
    }

    #[test]
    fn ladder_advances_to_next_opponent() {
        let mut engine = RuleEngine::new();
        let mode = ModeDescriptor::InfiniteLadder {
            time_limit_secs: 1800,
        };
        let mut state = setup_state(mode).with_ladder(LadderProgress::new(
            0,
            1,
            vec![LadderOpponent::new("Contravox")],
        ));
        for player in state.players.iter_mut() {
            player.hearts = Some(1);
        }
        state.players[0].hand = vec![Card::value(950, 8), Card::effect(951, EffectName::Desce)];
        state.players[1].hand.clear();

        engine
            .play_value_card(
                &mut state,
                PlayValueCard {
                    player_id: 0,
                    card_id: 950,
                },
            )
            .expect("value play");
        let events = pass_all(&mut engine, &mut state);

        assert!(events
            .iter()
            .any(|event| matches!(event, GameEvent::LadderAdvanced { .. })));
        assert!(state.outcome.is_none());
        let ladder = state.ladder.clone().expect("ladder progress kept");
        assert_eq!(ladder.level, 2);
        assert!(ladder.queue.is_empty());

        let runner = &state.players[0];
        assert!(runner.card_in_hand(951).is_some(), "runner keeps hand");
        assert_eq!(runner.rest_card.as_ref().map(|card| card.id), Some(950));
        let opponent = &state.players[1];
        assert_eq!(opponent.name, "Contravox");
        assert_eq!(opponent.rest_card.as_ref().map(|card| card.id), Some(912));
        assert_eq!(opponent.hearts, Some(1));
        assert!(!opponent.eliminated);
        assert_eq!(state.turn, 1);
        assert_eq!(state.phase, GamePhase::Playing);
        state.integrity_check().expect("rebuilt decks hold no duplicates");
    }

    #[test]
    fn snapshot_round_trip_replays_identically() {
        let mut engine = RuleEngine::new();
        let mut live = duel(ModeDescriptor::Solo);
        engine.start_match(&mut live).expect("match should start");

        let json = serde_json::to_string(&live).expect("serialize");
        let mut restored: GameState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, live);

        let mut script = |state: &mut GameState| -> Vec<GameEvent> {
            let mut events = Vec::new();
            for _ in 0..12 {
                let player = state.current_player;
                let Some(action) = legal::legal_actions(state, player).into_iter().next() else {
                    break;
                };
                events.extend(engine.apply_action(state, action).expect("legal action applies"));
            }
            events
        };
        let first = script(&mut live);
        let second = script(&mut restored);
        assert_eq!(first, second);
        assert_eq!(live, restored);
    }
}
