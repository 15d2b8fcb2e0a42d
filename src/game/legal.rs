//! 合法出牌校验，以及供 AI 使用的合法动作枚举。

use serde::{Deserialize, Serialize};

use super::cards::{CardId, EffectAxis, EffectName};
use super::effects::EffectPlan;
use super::rules::{IllegalReason, RuleError, TargetIssue};
use super::state::{GamePhase, GameState, PathId, PendingPula, Player, PlayerId};

/// 每回合最多打出的数值牌数量。
pub const MAX_VALUE_PLAYS_PER_ROUND: usize = 2;

const LOCKABLE_EFFECTS: [EffectName; 4] = [
    EffectName::Mais,
    EffectName::Menos,
    EffectName::Sobe,
    EffectName::Desce,
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayValueCard {
    pub player_id: PlayerId,
    pub card_id: CardId,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectOptions {
    /// 仅 Reversus Total：改为锁定目标的某个槽位。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub individual_lock: Option<EffectName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pula_path: Option<PathId>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayEffectCard {
    pub player_id: PlayerId,
    pub card_id: CardId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversal_axis: Option<EffectAxis>,
    #[serde(default)]
    pub options: EffectOptions,
}

impl PlayEffectCard {
    pub fn new(player_id: PlayerId, card_id: CardId) -> Self {
        Self {
            player_id,
            card_id,
            target_id: None,
            reversal_axis: None,
            options: EffectOptions::default(),
        }
    }

    pub fn with_target(mut self, target_id: PlayerId) -> Self {
        self.target_id = Some(target_id);
        self
    }

    pub fn with_axis(mut self, axis: EffectAxis) -> Self {
        self.reversal_axis = Some(axis);
        self
    }

    pub fn with_lock(mut self, effect: EffectName) -> Self {
        self.options.individual_lock = Some(effect);
        self
    }

    pub fn with_path(mut self, path: PathId) -> Self {
        self.options.pula_path = Some(path);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameAction {
    PlayValue(PlayValueCard),
    PlayEffect(PlayEffectCard),
    SelectPulaDestination { player_id: PlayerId, path_id: PathId },
    Pass { player_id: PlayerId },
}

impl GameAction {
    pub fn player_id(&self) -> PlayerId {
        match self {
            GameAction::PlayValue(action) => action.player_id,
            GameAction::PlayEffect(action) => action.player_id,
            GameAction::SelectPulaDestination { player_id, .. } | GameAction::Pass { player_id } => {
                *player_id
            }
        }
    }
}

fn illegal(reason: IllegalReason) -> RuleError {
    RuleError::IllegalAction { reason }
}

fn invalid_target(reason: TargetIssue) -> RuleError {
    RuleError::InvalidTarget { reason }
}

pub fn ensure_playing(state: &GameState) -> Result<(), RuleError> {
    if state.is_finished() || state.phase == GamePhase::GameOver {
        return Err(illegal(IllegalReason::MatchFinished));
    }
    if state.phase != GamePhase::Playing {
        return Err(illegal(IllegalReason::WrongPhase));
    }
    Ok(())
}

pub fn ensure_turn_owner(state: &GameState, player_id: PlayerId) -> Result<&Player, RuleError> {
    let player = state
        .get_player(player_id)
        .ok_or(RuleError::PlayerNotFound { player_id })?;
    if state.current_player != player_id || player.eliminated {
        return Err(illegal(IllegalReason::NotPlayerTurn));
    }
    Ok(player)
}

fn resolve_target(state: &GameState, target_id: Option<PlayerId>) -> Result<PlayerId, RuleError> {
    let target_id = target_id.ok_or_else(|| invalid_target(TargetIssue::MissingTarget))?;
    let target = state
        .get_player(target_id)
        .ok_or_else(|| invalid_target(TargetIssue::UnknownPlayer))?;
    if target.eliminated {
        return Err(invalid_target(TargetIssue::Eliminated));
    }
    Ok(target_id)
}

/// 路径必须存在，且没有被其他活跃玩家占据。
pub fn validate_pula_path(state: &GameState, path: PathId) -> Result<(), RuleError> {
    if path >= state.rules.path_count {
        return Err(invalid_target(TargetIssue::UnknownPath));
    }
    if state.occupied_paths().contains(&path) {
        return Err(invalid_target(TargetIssue::PathOccupied));
    }
    Ok(())
}

pub fn validate_value_play(state: &GameState, action: &PlayValueCard) -> Result<(), RuleError> {
    ensure_playing(state)?;
    let player = ensure_turn_owner(state, action.player_id)?;
    let card = player
        .card_in_hand(action.card_id)
        .ok_or_else(|| illegal(IllegalReason::CardNotInHand))?;
    if !card.is_value() {
        return Err(illegal(IllegalReason::WrongCardKind));
    }
    if player.played_value_this_turn {
        return Err(illegal(IllegalReason::ValueAlreadyPlayed));
    }
    if player.played_values.len() >= MAX_VALUE_PLAYS_PER_ROUND {
        return Err(illegal(IllegalReason::ValueLimitReached));
    }
    Ok(())
}

/// 校验并给出结算目标与出牌意图。
pub fn validate_effect_play(
    state: &GameState,
    action: &PlayEffectCard,
) -> Result<(PlayerId, EffectPlan), RuleError> {
    ensure_playing(state)?;
    let player = ensure_turn_owner(state, action.player_id)?;
    let card = player
        .card_in_hand(action.card_id)
        .ok_or_else(|| illegal(IllegalReason::CardNotInHand))?;
    let name = match (card.is_effect(), card.name) {
        (true, Some(name)) => name,
        _ => return Err(illegal(IllegalReason::WrongCardKind)),
    };
    if card.cooldown > 0 {
        return Err(illegal(IllegalReason::CardOnCooldown));
    }
    if player.played_effect_this_turn {
        return Err(illegal(IllegalReason::EffectAlreadyPlayed));
    }
    if action.options.individual_lock.is_some() && name != EffectName::ReversusTotal {
        return Err(invalid_target(TargetIssue::LockNotAllowed));
    }

    match name {
        EffectName::CartaDaVersatrix => Ok((action.player_id, EffectPlan::OneShot)),
        EffectName::ReversusTotal => match action.options.individual_lock {
            Some(effect) if effect.is_lockable() => {
                let target = resolve_target(state, action.target_id)?;
                Ok((target, EffectPlan::Lock { effect }))
            }
            Some(_) => Err(invalid_target(TargetIssue::LockNotAllowed)),
            None => Ok((action.player_id, EffectPlan::ReversusTotal)),
        },
        EffectName::Reversus => {
            let axis = action
                .reversal_axis
                .ok_or_else(|| invalid_target(TargetIssue::MissingReversalAxis))?;
            let target = resolve_target(state, action.target_id)?;
            Ok((target, EffectPlan::Reverse { axis }))
        }
        EffectName::Pula => {
            let target = resolve_target(state, action.target_id)?;
            if let Some(path) = action.options.pula_path {
                validate_pula_path(state, path)?;
            }
            Ok((
                target,
                EffectPlan::Pula {
                    path: action.options.pula_path,
                },
            ))
        }
        effect => {
            let target = resolve_target(state, action.target_id)?;
            Ok((target, EffectPlan::Basic { effect }))
        }
    }
}

/// 手里还有两张以上数值牌且本轮未出数值牌时不能结束回合。
pub fn validate_pass(state: &GameState, player_id: PlayerId) -> Result<(), RuleError> {
    ensure_playing(state)?;
    let player = ensure_turn_owner(state, player_id)?;
    let can_still_play_value = player.played_values.len() < MAX_VALUE_PLAYS_PER_ROUND;
    if can_still_play_value && player.value_cards_in_hand() > 1 && !player.played_value_this_turn {
        return Err(illegal(IllegalReason::MustPlayValueCard));
    }
    Ok(())
}

pub fn validate_pula_selection(
    state: &GameState,
    player_id: PlayerId,
    path: PathId,
) -> Result<PendingPula, RuleError> {
    ensure_playing(state)?;
    ensure_turn_owner(state, player_id)?;
    let pending = state
        .pending_pula
        .filter(|pending| pending.caster == player_id)
        .ok_or_else(|| illegal(IllegalReason::NoPendingPula))?;
    validate_pula_path(state, path)?;
    Ok(pending)
}

pub fn is_legal(state: &GameState, action: &GameAction) -> bool {
    match action {
        GameAction::PlayValue(play) => validate_value_play(state, play).is_ok(),
        GameAction::PlayEffect(play) => validate_effect_play(state, play).is_ok(),
        GameAction::SelectPulaDestination { player_id, path_id } => {
            validate_pula_selection(state, *player_id, *path_id).is_ok()
        }
        GameAction::Pass { player_id } => validate_pass(state, *player_id).is_ok(),
    }
}

fn effect_candidates(
    state: &GameState,
    player_id: PlayerId,
    card_id: CardId,
    name: EffectName,
) -> Vec<PlayEffectCard> {
    let base = PlayEffectCard::new(player_id, card_id);
    let targets = state.active_player_ids();
    let mut candidates = Vec::new();

    match name {
        EffectName::CartaDaVersatrix => candidates.push(base),
        EffectName::ReversusTotal => {
            candidates.push(base);
            for target in &targets {
                for effect in LOCKABLE_EFFECTS {
                    candidates.push(base.with_target(*target).with_lock(effect));
                }
            }
        }
        EffectName::Reversus => {
            for target in &targets {
                for axis in [EffectAxis::Score, EffectAxis::Movement] {
                    candidates.push(base.with_target(*target).with_axis(axis));
                }
            }
        }
        EffectName::Pula => {
            let free = state.free_paths();
            for target in &targets {
                if free.is_empty() {
                    candidates.push(base.with_target(*target));
                }
                for path in &free {
                    candidates.push(base.with_target(*target).with_path(*path));
                }
            }
        }
        _ => {
            for target in &targets {
                candidates.push(base.with_target(*target));
            }
        }
    }
    candidates
}

/// 当前玩家此刻所有合法动作；每一项都能通过对应的校验函数。
pub fn legal_actions(state: &GameState, player_id: PlayerId) -> Vec<GameAction> {
    let Ok(player) = ensure_playing(state).and_then(|_| ensure_turn_owner(state, player_id)) else {
        return Vec::new();
    };

    let mut actions = Vec::new();

    let awaiting_pula = state
        .pending_pula
        .map(|pending| pending.caster == player_id)
        .unwrap_or(false);
    if awaiting_pula {
        for path_id in state.free_paths() {
            actions.push(GameAction::SelectPulaDestination { player_id, path_id });
        }
    }

    for card in &player.hand {
        if card.is_value() {
            let play = PlayValueCard {
                player_id,
                card_id: card.id,
            };
            if validate_value_play(state, &play).is_ok() {
                actions.push(GameAction::PlayValue(play));
            }
        } else if let Some(name) = card.name {
            for play in effect_candidates(state, player_id, card.id, name) {
                if validate_effect_play(state, &play).is_ok() {
                    actions.push(GameAction::PlayEffect(play));
                }
            }
        }
    }

    if validate_pass(state, player_id).is_ok() {
        actions.push(GameAction::Pass { player_id });
    }
    actions
}
