use std::cmp::Reverse;
use std::str::FromStr;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::game::{
    legal_actions, BossVariant, EffectAxis, EffectName, GameAction, GameState, ModeDescriptor,
    PathId, PlayEffectCard, Player, PlayerId, RuleEngine, RuleResolution,
};

const REQUIRED_VALUE_SCORE: f64 = 200.0;
const PULA_DESTINATION_SCORE: f64 = 150.0;
const REVERSUS_TOTAL_SCORE: f64 = 100.0;
const NULLIFY_LEADER_SCORE: f64 = 85.0;
const REPOSITION_LEADER_SCORE: f64 = 75.0;
const ATTACK_LEADER_SCORE: f64 = 70.0;
const SELF_DEFENCE_SCORE: f64 = 60.0;
const SELF_BUFF_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiDifficulty {
    Easy,
    Normal,
    Hard,
}

impl FromStr for AiDifficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(AiDifficulty::Easy),
            "normal" | "medium" => Ok(AiDifficulty::Normal),
            "hard" | "expert" => Ok(AiDifficulty::Hard),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub difficulty: AiDifficulty,
    /// 候选打分的随机扰动幅度，只用于打破同分。
    pub randomness: f64,
}

impl AiConfig {
    pub fn from_difficulty(difficulty: AiDifficulty) -> Self {
        let randomness = match difficulty {
            AiDifficulty::Easy => 2.0,
            AiDifficulty::Normal => 0.5,
            AiDifficulty::Hard => 0.0,
        };
        Self {
            difficulty,
            randomness,
        }
    }

    /// 按对局推断难度：天梯按层数，特殊 Boss 战为困难，其余为简单。
    pub fn for_state(state: &GameState) -> Self {
        let difficulty = match (state.mode, state.ladder.as_ref()) {
            (ModeDescriptor::InfiniteLadder { .. }, Some(ladder)) if ladder.level > 20 => {
                AiDifficulty::Hard
            }
            (ModeDescriptor::InfiniteLadder { .. }, Some(ladder)) if ladder.level > 10 => {
                AiDifficulty::Normal
            }
            (ModeDescriptor::StoryBoss { boss }, _) if boss != BossVariant::Standard => {
                AiDifficulty::Hard
            }
            _ => AiDifficulty::Easy,
        };
        Self::from_difficulty(difficulty)
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig::from_difficulty(AiDifficulty::Easy)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MoveReason {
    RequiredValue,
    PulaDestination,
    TotalChaos,
    NullifyLeader,
    SelfDefence,
    RepositionLeader,
    AttackLeader,
    SelfBuff,
    EndTurn,
    Fallback,
    Idle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiDecision {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<GameAction>,
    pub evaluation: f64,
    pub reason: MoveReason,
    pub candidates: usize,
    pub difficulty: AiDifficulty,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<RuleResolution>,
}

/// 选中的效果牌出法，与 `legal_actions` 中的候选逐项比对。
#[derive(Debug, Clone, Copy)]
struct EffectChoice {
    card_id: u32,
    target: Option<PlayerId>,
    axis: Option<EffectAxis>,
    path: Option<PathId>,
    score: f64,
    reason: MoveReason,
}

impl EffectChoice {
    fn matches(&self, play: &PlayEffectCard) -> bool {
        play.card_id == self.card_id
            && play.target_id == self.target
            && play.reversal_axis == self.axis
            && play.options.pula_path == self.path
            && play.options.individual_lock.is_none()
    }
}

/// 一次决策的局面解读：必须打出的数值牌、最佳效果牌、Pula 落点。
struct TurnPlan {
    value_pick: Option<u32>,
    effect_pick: Option<EffectChoice>,
    pula_path: Option<PathId>,
}

impl TurnPlan {
    fn new(state: &GameState, me: &Player, difficulty: AiDifficulty) -> Self {
        Self {
            value_pick: pick_value_card(me, difficulty),
            effect_pick: pick_effect_card(state, me, difficulty),
            pula_path: state.free_paths().first().copied(),
        }
    }

    fn score(&self, action: &GameAction) -> Option<(f64, MoveReason)> {
        match action {
            GameAction::SelectPulaDestination { path_id, .. } => (self.pula_path == Some(*path_id))
                .then_some((PULA_DESTINATION_SCORE, MoveReason::PulaDestination)),
            GameAction::PlayValue(play) => (self.value_pick == Some(play.card_id))
                .then_some((REQUIRED_VALUE_SCORE, MoveReason::RequiredValue)),
            GameAction::PlayEffect(play) => self
                .effect_pick
                .filter(|choice| choice.matches(play))
                .map(|choice| (choice.score, choice.reason)),
            GameAction::Pass { .. } => Some((0.0, MoveReason::EndTurn)),
        }
    }
}

/// 手里有两张以上数值牌且本回合还没出时才出：默认出最小的，困难难度三张以上出中位数。
fn pick_value_card(me: &Player, difficulty: AiDifficulty) -> Option<u32> {
    if me.played_value_this_turn {
        return None;
    }
    let mut values: Vec<(i32, u32)> = me
        .hand
        .iter()
        .filter(|card| card.is_value())
        .map(|card| (card.numeric_value(), card.id))
        .collect();
    if values.len() < 2 {
        return None;
    }
    values.sort_unstable();
    let idx = if difficulty == AiDifficulty::Hard && values.len() >= 3 {
        values.len() / 2
    } else {
        0
    };
    values.get(idx).map(|(_, id)| *id)
}

fn pick_effect_card(state: &GameState, me: &Player, difficulty: AiDifficulty) -> Option<EffectChoice> {
    if me.played_effect_this_turn {
        return None;
    }

    // 困难难度会识别 Reversus Total 下的反转，把增益与减益对调。
    let inverted = difficulty == AiDifficulty::Hard && state.reversus_total_active;
    let (buff_score, buff_move, debuff_score, debuff_move) = if inverted {
        (EffectName::Menos, EffectName::Desce, EffectName::Mais, EffectName::Sobe)
    } else {
        (EffectName::Mais, EffectName::Sobe, EffectName::Menos, EffectName::Desce)
    };
    let advantaged = |player: &Player| {
        player.effects.score == Some(buff_score) || player.effects.movement == Some(buff_move)
    };
    let hurting = |player: &Player| {
        player.effects.score == Some(debuff_score) || player.effects.movement == Some(debuff_move)
    };

    let leader = state
        .players
        .iter()
        .filter(|player| player.id != me.id && player.is_active())
        .filter(|player| me.team.is_none() || player.team != me.team)
        .min_by_key(|player| Reverse(player.score));
    let free_path = state.free_paths().first().copied();

    let mut best: Option<EffectChoice> = None;
    for card in me.hand.iter().filter(|card| card.is_effect() && card.cooldown == 0) {
        let Some(name) = card.name else {
            continue;
        };
        let mut choice = |target: Option<PlayerId>,
                          axis: Option<EffectAxis>,
                          path: Option<PathId>,
                          score: f64,
                          reason: MoveReason| {
            if best.map(|current| score > current.score).unwrap_or(true) {
                best = Some(EffectChoice {
                    card_id: card.id,
                    target,
                    axis,
                    path,
                    score,
                    reason,
                });
            }
        };

        match name {
            EffectName::ReversusTotal => {
                choice(None, None, None, REVERSUS_TOTAL_SCORE, MoveReason::TotalChaos)
            }
            EffectName::Reversus => {
                if let Some(leader) = leader.filter(|leader| advantaged(leader)) {
                    let axis = if leader.effects.score == Some(buff_score) {
                        EffectAxis::Score
                    } else {
                        EffectAxis::Movement
                    };
                    choice(
                        Some(leader.id),
                        Some(axis),
                        None,
                        NULLIFY_LEADER_SCORE,
                        MoveReason::NullifyLeader,
                    );
                } else if hurting(me) {
                    let axis = if me.effects.score == Some(debuff_score) {
                        EffectAxis::Score
                    } else {
                        EffectAxis::Movement
                    };
                    choice(
                        Some(me.id),
                        Some(axis),
                        None,
                        SELF_DEFENCE_SCORE,
                        MoveReason::SelfDefence,
                    );
                }
            }
            EffectName::Pula => {
                if let (Some(leader), Some(path)) = (leader, free_path) {
                    choice(
                        Some(leader.id),
                        None,
                        Some(path),
                        REPOSITION_LEADER_SCORE,
                        MoveReason::RepositionLeader,
                    );
                }
            }
            effect if effect == debuff_score || effect == debuff_move => {
                if let Some(leader) = leader {
                    choice(
                        Some(leader.id),
                        None,
                        None,
                        ATTACK_LEADER_SCORE,
                        MoveReason::AttackLeader,
                    );
                }
            }
            effect if effect == buff_score || effect == buff_move => {
                choice(Some(me.id), None, None, SELF_BUFF_SCORE, MoveReason::SelfBuff)
            }
            _ => {}
        }
    }
    best
}

pub struct AiAgent {
    config: AiConfig,
    rng: SmallRng,
}

impl AiAgent {
    pub fn new(config: AiConfig) -> Self {
        Self {
            config,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(config: AiConfig, seed: u64) -> Self {
        Self {
            config,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// 返回一步动作；给出的动作一定来自 `legal_actions`。
    pub fn decide_action(&mut self, state: &GameState, player_id: PlayerId) -> AiDecision {
        let difficulty = self.config.difficulty;
        let actions = legal_actions(state, player_id);
        let Some(me) = state.get_player(player_id).filter(|_| !actions.is_empty()) else {
            return AiDecision {
                action: None,
                evaluation: evaluate(state, player_id),
                reason: MoveReason::Idle,
                candidates: 0,
                difficulty,
                resolution: None,
            };
        };

        let plan = TurnPlan::new(state, me, difficulty);
        let mut best: Option<(f64, f64, GameAction, MoveReason)> = None;
        for action in &actions {
            let Some((score, reason)) = plan.score(action) else {
                continue;
            };
            let comparison = score + self.random_noise();
            if best
                .as_ref()
                .map(|(_, current, _, _)| comparison > *current)
                .unwrap_or(true)
            {
                best = Some((score, comparison, *action, reason));
            }
        }

        let (score, action, reason) = match best {
            Some((score, _, action, reason)) => (score, action, reason),
            None => (0.0, actions[0], MoveReason::Fallback),
        };
        debug!(player_id, ?action, ?reason, score, "ai picked action");

        let resolution = RuleEngine::new().simulate(state, action).ok();
        let evaluation = resolution
            .as_ref()
            .map(|resolution| evaluate(&resolution.state, player_id))
            .unwrap_or(score);

        AiDecision {
            action: Some(action),
            evaluation,
            reason,
            candidates: actions.len(),
            difficulty,
            resolution,
        }
    }

    fn random_noise(&mut self) -> f64 {
        if self.config.randomness <= 0.0 {
            0.0
        } else {
            (self.rng.gen::<f64>() - 0.5) * 2.0 * self.config.randomness
        }
    }
}

/// 局面评估：位置领先权重最高，其次是实时分数与生命。
fn evaluate(state: &GameState, player_id: PlayerId) -> f64 {
    if let Some(outcome) = &state.outcome {
        return if outcome.winners.contains(&player_id) {
            1_000_000.0
        } else {
            -1_000_000.0
        };
    }

    let Some(player) = state.get_player(player_id) else {
        return -1_000_000.0;
    };
    let rivals = state
        .players
        .iter()
        .filter(|other| other.id != player_id && other.is_active());
    let (best_position, best_score, best_hearts) = rivals.fold((0i32, i32::MIN, 0i32), |acc, other| {
        (
            acc.0.max(other.position as i32),
            acc.1.max(other.score),
            acc.2.max(other.hearts.unwrap_or(0) as i32),
        )
    });
    let best_score = if best_score == i32::MIN { 0 } else { best_score };

    (player.position as i32 - best_position) as f64 * 10.0
        + (player.score - best_score) as f64
        + (player.hearts.unwrap_or(0) as i32 - best_hearts) as f64 * 5.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{
        Card, EndReason, GamePhase, LadderProgress, MatchOutcome, PlayerSetup, RulesConfig,
    };

    fn duel() -> GameState {
        let mut state = GameState::new(
            vec![PlayerSetup::new(0, "Bot"), PlayerSetup::new(1, "Rival")],
            ModeDescriptor::Solo,
            RulesConfig::default(),
            11,
        )
        .with_phase(GamePhase::Playing);
        state.current_player = 0;
        for player in state.players.iter_mut() {
            player.hand.clear();
        }
        state
    }

    fn agent(difficulty: AiDifficulty) -> AiAgent {
        AiAgent::with_seed(AiConfig::from_difficulty(difficulty), 5)
    }

    fn effect_play(decision: &AiDecision) -> PlayEffectCard {
        match decision.action {
            Some(GameAction::PlayEffect(play)) => play,
            other => panic!("expected an effect play, got {other:?}"),
        }
    }

    #[test]
    fn ai_handles_finished_game() {
        let mut state = GameState::sample();
        state.declare_outcome(MatchOutcome::new(vec![0], EndReason::PositionReached));
        let decision = agent(AiDifficulty::Easy).decide_action(&state, 0);
        assert!(decision.action.is_none());
        assert_eq!(decision.reason, MoveReason::Idle);
        assert!(decision.evaluation > 0.0);
    }

    #[test]
    fn value_choice_depends_on_difficulty() {
        let mut state = duel();
        state.players[0].hand = vec![Card::value(1, 8), Card::value(2, 2), Card::value(3, 6)];

        let easy = agent(AiDifficulty::Easy).decide_action(&state, 0);
        assert_eq!(easy.reason, MoveReason::RequiredValue);
        assert!(matches!(easy.action, Some(GameAction::PlayValue(play)) if play.card_id == 2));

        let hard = agent(AiDifficulty::Hard).decide_action(&state, 0);
        assert!(matches!(hard.action, Some(GameAction::PlayValue(play)) if play.card_id == 3));
    }

    #[test]
    fn reversus_total_outranks_other_effects() {
        let mut state = duel();
        state.players[0].hand = vec![
            Card::effect(1, EffectName::Mais),
            Card::effect(2, EffectName::ReversusTotal),
        ];
        let decision = agent(AiDifficulty::Normal).decide_action(&state, 0);
        let play = effect_play(&decision);
        assert_eq!(play.card_id, 2);
        assert!(play.options.individual_lock.is_none());
        assert_eq!(decision.reason, MoveReason::TotalChaos);
    }

    #[test]
    fn reversus_targets_advantaged_leader() {
        let mut state = duel();
        state.players[0].hand = vec![Card::effect(1, EffectName::Reversus)];
        state.players[1].effects.score = Some(EffectName::Mais);
        state.players[1].score = 7;

        let decision = agent(AiDifficulty::Easy).decide_action(&state, 0);
        let play = effect_play(&decision);
        assert_eq!(play.target_id, Some(1));
        assert_eq!(play.reversal_axis, Some(EffectAxis::Score));
        assert!(decision.resolution.is_some(), "decision carries a simulated resolution");
    }

    #[test]
    fn pula_sends_leader_to_first_free_path() {
        let mut state = duel();
        state.players[0].hand = vec![Card::effect(1, EffectName::Pula)];
        let decision = agent(AiDifficulty::Easy).decide_action(&state, 0);
        let play = effect_play(&decision);
        assert_eq!(play.target_id, Some(1));
        assert_eq!(play.options.pula_path, state.free_paths().first().copied());
        assert_eq!(decision.reason, MoveReason::RepositionLeader);
    }

    #[test]
    fn hard_ai_flips_buffs_under_reversus_total() {
        let mut state = duel();
        state.players[0].hand = vec![
            Card::effect(1, EffectName::Mais),
            Card::effect(2, EffectName::Menos),
        ];

        let easy = agent(AiDifficulty::Easy).decide_action(&state, 0);
        let play = effect_play(&easy);
        assert_eq!((play.card_id, play.target_id), (2, Some(1)));

        state.reversus_total_active = true;
        let hard = agent(AiDifficulty::Hard).decide_action(&state, 0);
        let play = effect_play(&hard);
        assert_eq!((play.card_id, play.target_id), (1, Some(1)));
        assert_eq!(hard.reason, MoveReason::AttackLeader);
    }

    #[test]
    fn passes_when_nothing_useful_remains() {
        let mut state = duel();
        state.players[0].hand = vec![Card::value(1, 4)];
        let decision = agent(AiDifficulty::Easy).decide_action(&state, 0);
        assert_eq!(decision.action, Some(GameAction::Pass { player_id: 0 }));
        assert_eq!(decision.reason, MoveReason::EndTurn);
    }

    #[test]
    fn self_played_match_only_uses_legal_actions() {
        let mut state = GameState::new(
            vec![PlayerSetup::new(0, "Bot A"), PlayerSetup::new(1, "Bot B")],
            ModeDescriptor::Solo,
            RulesConfig::default(),
            77,
        );
        let mut engine = RuleEngine::new();
        engine.start_match(&mut state).expect("match should start");
        let mut agents = [agent(AiDifficulty::Easy), agent(AiDifficulty::Hard)];

        for _ in 0..300 {
            if state.is_finished() {
                break;
            }
            let actor = state.current_player;
            let decision = agents[actor as usize].decide_action(&state, actor);
            let action = decision.action.expect("active player always has a move");
            assert!(legal_actions(&state, actor).contains(&action));
            engine
                .apply_action(&mut state, action)
                .expect("ai action should apply");
            state.integrity_check().expect("cards stay conserved");
        }
    }

    #[test]
    fn difficulty_follows_ladder_level_and_boss() {
        let mut state = GameState::new(
            vec![PlayerSetup::new(0, "Runner"), PlayerSetup::new(1, "Rival")],
            ModeDescriptor::InfiniteLadder {
                time_limit_secs: 600,
            },
            RulesConfig::default(),
            3,
        )
        .with_ladder(LadderProgress::new(0, 1, Vec::new()));
        assert_eq!(AiConfig::for_state(&state).difficulty, AiDifficulty::Easy);
        if let Some(ladder) = state.ladder.as_mut() {
            ladder.level = 15;
        }
        assert_eq!(AiConfig::for_state(&state).difficulty, AiDifficulty::Normal);
        if let Some(ladder) = state.ladder.as_mut() {
            ladder.level = 21;
        }
        assert_eq!(AiConfig::for_state(&state).difficulty, AiDifficulty::Hard);

        state.mode = ModeDescriptor::StoryBoss {
            boss: BossVariant::HeartDuel { hearts: 3 },
        };
        assert_eq!(AiConfig::for_state(&state).difficulty, AiDifficulty::Hard);
        assert_eq!("medium".parse::<AiDifficulty>(), Ok(AiDifficulty::Normal));
        assert!("legendary".parse::<AiDifficulty>().is_err());
    }
}
