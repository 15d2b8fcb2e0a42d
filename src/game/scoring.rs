//! 回合结算：计分、判定胜者、移动棋子。

use serde::{Deserialize, Serialize};

use super::cards::EffectName;
use super::state::{FieldEffectKind, GameEvent, GameState, Player, PlayerId, PlayerScore};

const NECRO_X_BONUS: i32 = 10;
const RESTO_MAIOR_VALUE: i32 = 10;
const RESTO_MENOR_VALUE: i32 = 2;
const TOURNAMENT_MOVEMENT_BONUS: i32 = 5;

/// 计分方式。锦标赛只看打出的数值牌和移动槽。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScoringVariant {
    Standard,
    Tournament,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundOutcome {
    pub scores: Vec<PlayerScore>,
    /// 为空表示本回合没有胜者。
    pub winners: Vec<PlayerId>,
}

impl RoundOutcome {
    pub fn score_of(&self, player_id: PlayerId) -> Option<i32> {
        self.scores
            .iter()
            .find(|entry| entry.player_id == player_id)
            .map(|entry| entry.score)
    }

    pub fn is_winner(&self, player_id: PlayerId) -> bool {
        self.winners.contains(&player_id)
    }

    pub fn single_winner(&self) -> Option<PlayerId> {
        match self.winners.as_slice() {
            [winner] => Some(*winner),
            _ => None,
        }
    }
}

pub fn field_modifier(state: &GameState, player_id: PlayerId) -> i32 {
    if state.has_field_effect(player_id, FieldEffectKind::SuperExposto) {
        2
    } else {
        1
    }
}

/// 休息牌数值，可被场地效果强制改写。
pub fn rest_value(state: &GameState, player: &Player) -> i32 {
    if state.has_field_effect(player.id, FieldEffectKind::RestoMaior) {
        RESTO_MAIOR_VALUE
    } else if state.has_field_effect(player.id, FieldEffectKind::RestoMenor) {
        RESTO_MENOR_VALUE
    } else {
        player
            .rest_card
            .as_ref()
            .map(|card| card.numeric_value())
            .unwrap_or(0)
    }
}

pub fn score_player(state: &GameState, player: &Player, variant: ScoringVariant) -> i32 {
    let played: i32 = player
        .played_values
        .iter()
        .map(|card| card.numeric_value())
        .sum();

    match variant {
        ScoringVariant::Standard => {
            let modifier = field_modifier(state, player.id);
            let rest = rest_value(state, player);
            let bonus = match player.effects.score {
                Some(EffectName::Mais) => rest * modifier,
                Some(EffectName::Menos) => -rest * modifier,
                Some(EffectName::NecroX) => NECRO_X_BONUS,
                Some(EffectName::NecroXInvertido) => -NECRO_X_BONUS,
                _ => 0,
            };
            played + bonus
        }
        ScoringVariant::Tournament => {
            let bonus = match player.effects.movement {
                Some(EffectName::Sobe) => TOURNAMENT_MOVEMENT_BONUS,
                Some(EffectName::Desce) => -TOURNAMENT_MOVEMENT_BONUS,
                _ => 0,
            };
            played + bonus
        }
    }
}

/// 同步每名玩家的实时分数，供界面和 AI 读取。
pub fn refresh_live_scores(state: &mut GameState, variant: ScoringVariant) {
    let scores: Vec<(usize, i32)> = state
        .players
        .iter()
        .enumerate()
        .map(|(idx, player)| (idx, score_player(state, player, variant)))
        .collect();
    for (idx, score) in scores {
        state.players[idx].score = score;
    }
}

/// 最高分者获胜。并列时：组队模式下全为同一队伍算该队获胜，否则无人获胜。
pub fn round_winners(state: &GameState, scores: &[PlayerScore], team_ties: bool) -> Vec<PlayerId> {
    let Some(best) = scores.iter().map(|entry| entry.score).max() else {
        return Vec::new();
    };
    let tied: Vec<PlayerId> = scores
        .iter()
        .filter(|entry| entry.score == best)
        .map(|entry| entry.player_id)
        .collect();

    if tied.len() == 1 {
        return tied;
    }
    if !team_ties {
        return Vec::new();
    }

    let teams: Vec<_> = tied
        .iter()
        .map(|id| state.get_player(*id).and_then(|player| player.team))
        .collect();
    match teams.first() {
        Some(Some(first)) if teams.iter().all(|team| *team == Some(*first)) => tied,
        _ => Vec::new(),
    }
}

pub fn score_round(state: &GameState, variant: ScoringVariant, team_ties: bool) -> RoundOutcome {
    let scores: Vec<PlayerScore> = state
        .players
        .iter()
        .filter(|player| player.is_active())
        .map(|player| PlayerScore {
            player_id: player.id,
            score: score_player(state, player, variant),
        })
        .collect();
    let winners = round_winners(state, &scores, team_ties);
    RoundOutcome { scores, winners }
}

/// 单个玩家本回合的位移（不含 Pula 的换路）。
pub fn movement_delta(state: &GameState, player: &Player, winners: &[PlayerId]) -> i32 {
    let mut delta = 0;
    if winners.contains(&player.id) {
        delta = if state.has_field_effect(player.id, FieldEffectKind::Parada) {
            0
        } else if state.has_field_effect(player.id, FieldEffectKind::Desafio)
            && player.effects.score != Some(EffectName::Mais)
            && player.effects.movement != Some(EffectName::Sobe)
        {
            3
        } else {
            1
        };
    } else if !winners.is_empty() {
        if state.has_field_effect(player.id, FieldEffectKind::Castigo) {
            delta -= 3;
        }
        if state.has_field_effect(player.id, FieldEffectKind::Impulso) {
            delta += 1;
        }
    }

    match player.effects.movement {
        Some(EffectName::Sobe) => delta += 1,
        Some(EffectName::Desce) => delta -= field_modifier(state, player.id),
        _ => {}
    }
    delta
}

/// 结算所有活跃玩家的移动，返回产生的事件（调用方负责记录）。
pub fn apply_movement(state: &mut GameState, winners: &[PlayerId]) -> Vec<GameEvent> {
    let mut events = Vec::new();
    let ids = state.active_player_ids();

    for player_id in ids {
        let Some(idx) = state.player_index(player_id) else {
            continue;
        };

        if state.players[idx].effects.movement == Some(EffectName::Pula) {
            if let Some(path) = state.players[idx].pula_target_path {
                let taken = state
                    .players
                    .iter()
                    .any(|other| other.id != player_id && other.is_active() && other.path_id == path);
                let from = state.players[idx].path_id;
                if taken || path >= state.rules.path_count {
                    tracing::debug!(player_id, path, "pula destination no longer free");
                } else if from != path {
                    state.players[idx].path_id = path;
                    events.push(GameEvent::PathChanged {
                        player_id,
                        from,
                        to: path,
                    });
                }
            }
        }

        let delta = movement_delta(state, &state.players[idx], winners);
        let from = state.players[idx].position;
        let to = state.rules.clamp_position(from as i32 + delta);
        if to != from {
            state.players[idx].position = to;
            events.push(GameEvent::PawnMoved { player_id, from, to });
        }
    }

    events
}
