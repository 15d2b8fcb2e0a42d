//! 对局模式：同一套回合/效果引擎，按模式替换胜负判定与计分方式。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::scoring::{RoundOutcome, ScoringVariant};
use super::state::{
    EndReason, GameEvent, GameState, MatchOutcome, Player, PlayerId, TeamId,
};

/// 剧情首领的变体。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "variant")]
pub enum BossVariant {
    Standard,
    /// 双方同时到达终点时比较星星数，完全相同时防守方获胜。
    StarDuel {
        challenger: PlayerId,
        defender: PlayerId,
    },
    HeartDuel {
        hearts: u8,
    },
    /// 每回合得分最低者扣心。
    LowestScore {
        hearts: u8,
    },
    TeamHearts {
        hearts: u8,
        time_limit_secs: u64,
        timeout_loser: TeamId,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ModeDescriptor {
    Solo,
    Teams,
    StoryBoss { boss: BossVariant },
    InfiniteLadder { time_limit_secs: u64 },
    Tournament { rounds: u8 },
}

impl Default for ModeDescriptor {
    fn default() -> Self {
        ModeDescriptor::Solo
    }
}

impl ModeDescriptor {
    pub fn policy(&self) -> Box<dyn MatchPolicy> {
        match *self {
            ModeDescriptor::Solo => Box::new(PositionRace { team_ties: false }),
            ModeDescriptor::Teams => Box::new(PositionRace { team_ties: true }),
            ModeDescriptor::StoryBoss { boss } => match boss {
                BossVariant::Standard => Box::new(PositionRace { team_ties: false }),
                BossVariant::StarDuel {
                    challenger,
                    defender,
                } => Box::new(StarDuel {
                    challenger,
                    defender,
                }),
                BossVariant::HeartDuel { hearts } => Box::new(HeartDuel { hearts }),
                BossVariant::LowestScore { hearts } => Box::new(LowestScore { hearts }),
                BossVariant::TeamHearts {
                    hearts,
                    time_limit_secs,
                    timeout_loser,
                } => Box::new(TeamHearts {
                    hearts,
                    time_limit_secs,
                    timeout_loser,
                }),
            },
            ModeDescriptor::InfiniteLadder { time_limit_secs } => {
                Box::new(Ladder { time_limit_secs })
            }
            ModeDescriptor::Tournament { rounds } => Box::new(TournamentSeries { rounds }),
        }
    }
}

/// 天梯中尚未挑战的对手。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LadderOpponent {
    pub name: String,
}

impl LadderOpponent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LadderProgress {
    pub runner: PlayerId,
    /// 当前对手占用的玩家位。
    pub opponent: PlayerId,
    pub level: u32,
    /// 当前对手之后的对手队列。
    #[serde(default)]
    pub queue: VecDeque<LadderOpponent>,
}

impl LadderProgress {
    pub fn new(runner: PlayerId, opponent: PlayerId, queue: Vec<LadderOpponent>) -> Self {
        Self {
            runner,
            opponent,
            level: 1,
            queue: queue.into(),
        }
    }
}

/// 锦标赛单场比分。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TournamentScore {
    pub players: [PlayerId; 2],
    pub wins: [u8; 2],
    pub draws: u8,
}

impl TournamentScore {
    pub fn new(first: PlayerId, second: PlayerId) -> Self {
        Self {
            players: [first, second],
            wins: [0, 0],
            draws: 0,
        }
    }

    pub fn record(&mut self, winner: Option<PlayerId>) {
        match winner.and_then(|id| self.players.iter().position(|p| *p == id)) {
            Some(idx) => self.wins[idx] += 1,
            None => self.draws += 1,
        }
    }

    pub fn rounds_played(&self) -> u8 {
        self.wins[0] + self.wins[1] + self.draws
    }
}

/// 模式策略：引擎在固定的节点调用，模式只描述差异部分。
pub trait MatchPolicy {
    fn scoring(&self) -> ScoringVariant {
        ScoringVariant::Standard
    }

    fn moves_pawns(&self) -> bool {
        true
    }

    fn team_ties(&self) -> bool {
        false
    }

    fn skips_initial_draw(&self) -> bool {
        false
    }

    fn starting_hearts(&self) -> Option<u8> {
        None
    }

    fn uses_team_hearts(&self) -> bool {
        false
    }

    fn time_limit_secs(&self) -> Option<u64> {
        None
    }

    fn tournament_seed(&self, _players: &[Player]) -> Option<TournamentScore> {
        None
    }

    /// 回合结算、移动之后的模式增量（扣心、比分），返回的事件由调用方记录。
    fn after_round(&self, _state: &mut GameState, _round: &RoundOutcome) -> Vec<GameEvent> {
        Vec::new()
    }

    fn check_end(&self, state: &GameState) -> Option<MatchOutcome>;

    fn on_timeout(&self, _state: &GameState) -> Option<MatchOutcome> {
        None
    }

    /// 本场未结束但需要切换到下一关。
    fn next_stage(&self, _state: &GameState) -> bool {
        false
    }
}

fn finishers(state: &GameState) -> Vec<PlayerId> {
    state
        .players
        .iter()
        .filter(|player| player.is_active() && player.position >= state.rules.winning_position)
        .map(|player| player.id)
        .collect()
}

fn expand_to_team(state: &GameState, player_id: PlayerId) -> Vec<PlayerId> {
    match state.get_player(player_id).and_then(|player| player.team) {
        Some(team) => state.team_members(team),
        None => vec![player_id],
    }
}

/// 胜者以外的活跃玩家各扣一颗心。
fn punish_non_winners(state: &mut GameState, round: &RoundOutcome) -> Vec<GameEvent> {
    let losers: Vec<PlayerId> = state
        .active_player_ids()
        .into_iter()
        .filter(|id| !round.is_winner(*id))
        .collect();
    take_hearts(state, &losers)
}

fn take_hearts(state: &mut GameState, losers: &[PlayerId]) -> Vec<GameEvent> {
    let mut events = Vec::new();
    for player_id in losers {
        let Some(player) = state.get_player_mut(*player_id) else {
            continue;
        };
        let remaining = player.lose_heart();
        events.push(GameEvent::HeartLost {
            player_id: Some(*player_id),
            team: None,
            remaining,
        });
        if remaining == 0 {
            tracing::info!(player_id = *player_id, "player eliminated");
            events.push(GameEvent::PlayerEliminated {
                player_id: *player_id,
            });
        }
    }
    events
}

fn last_standing(state: &GameState) -> Option<MatchOutcome> {
    let active = state.active_player_ids();
    match active.len() {
        0 => Some(MatchOutcome::new(Vec::new(), EndReason::HeartsDepleted)),
        1 => Some(MatchOutcome::new(active, EndReason::LastStanding)),
        _ => None,
    }
}

/// 默认的位置竞速。
#[derive(Debug, Clone, Copy)]
pub struct PositionRace {
    pub team_ties: bool,
}

impl MatchPolicy for PositionRace {
    fn team_ties(&self) -> bool {
        self.team_ties
    }

    fn check_end(&self, state: &GameState) -> Option<MatchOutcome> {
        let finished = finishers(state);
        match finished.as_slice() {
            [] => None,
            [single] => {
                let winners = if self.team_ties {
                    expand_to_team(state, *single)
                } else {
                    finished.clone()
                };
                Some(MatchOutcome::new(winners, EndReason::PositionReached))
            }
            [first, rest @ ..] => {
                if !self.team_ties {
                    return None;
                }
                let team = state.get_player(*first).and_then(|player| player.team)?;
                let same_team = rest
                    .iter()
                    .all(|id| state.get_player(*id).and_then(|player| player.team) == Some(team));
                if same_team {
                    Some(MatchOutcome::new(
                        state.team_members(team),
                        EndReason::PositionReached,
                    ))
                } else {
                    None
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StarDuel {
    pub challenger: PlayerId,
    pub defender: PlayerId,
}

impl MatchPolicy for StarDuel {
    fn skips_initial_draw(&self) -> bool {
        true
    }

    fn check_end(&self, state: &GameState) -> Option<MatchOutcome> {
        let finished = finishers(state);
        if finished.contains(&self.challenger) && finished.contains(&self.defender) {
            let stars = |id: PlayerId| state.get_player(id).map(|player| player.stars).unwrap_or(0);
            let winner = if stars(self.challenger) > stars(self.defender) {
                self.challenger
            } else {
                self.defender
            };
            return Some(MatchOutcome::new(vec![winner], EndReason::PositionReached));
        }
        PositionRace { team_ties: false }.check_end(state)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HeartDuel {
    pub hearts: u8,
}

impl MatchPolicy for HeartDuel {
    fn moves_pawns(&self) -> bool {
        false
    }

    fn starting_hearts(&self) -> Option<u8> {
        Some(self.hearts)
    }

    fn after_round(&self, state: &mut GameState, round: &RoundOutcome) -> Vec<GameEvent> {
        if round.winners.is_empty() {
            return Vec::new();
        }
        punish_non_winners(state, round)
    }

    fn check_end(&self, state: &GameState) -> Option<MatchOutcome> {
        last_standing(state)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LowestScore {
    pub hearts: u8,
}

impl MatchPolicy for LowestScore {
    fn moves_pawns(&self) -> bool {
        false
    }

    fn starting_hearts(&self) -> Option<u8> {
        Some(self.hearts)
    }

    fn after_round(&self, state: &mut GameState, round: &RoundOutcome) -> Vec<GameEvent> {
        if round.scores.len() < 2 {
            return Vec::new();
        }
        let Some(lowest) = round.scores.iter().map(|entry| entry.score).min() else {
            return Vec::new();
        };
        let losers: Vec<PlayerId> = round
            .scores
            .iter()
            .filter(|entry| entry.score == lowest)
            .map(|entry| entry.player_id)
            .collect();
        take_hearts(state, &losers)
    }

    fn check_end(&self, state: &GameState) -> Option<MatchOutcome> {
        last_standing(state)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TeamHearts {
    pub hearts: u8,
    pub time_limit_secs: u64,
    pub timeout_loser: TeamId,
}

impl MatchPolicy for TeamHearts {
    fn team_ties(&self) -> bool {
        true
    }

    fn skips_initial_draw(&self) -> bool {
        true
    }

    fn starting_hearts(&self) -> Option<u8> {
        Some(self.hearts)
    }

    fn uses_team_hearts(&self) -> bool {
        true
    }

    fn time_limit_secs(&self) -> Option<u64> {
        Some(self.time_limit_secs)
    }

    fn after_round(&self, state: &mut GameState, round: &RoundOutcome) -> Vec<GameEvent> {
        let Some(winning_team) = round
            .winners
            .first()
            .and_then(|id| state.get_player(*id))
            .and_then(|player| player.team)
        else {
            return Vec::new();
        };

        let mut events = Vec::new();
        let losing: Vec<TeamId> = state
            .team_hearts
            .keys()
            .copied()
            .filter(|team| *team != winning_team)
            .collect();
        for team in losing {
            let remaining = match state.team_hearts.get_mut(&team) {
                Some(hearts) => {
                    *hearts = hearts.saturating_sub(1);
                    *hearts
                }
                None => continue,
            };
            events.push(GameEvent::HeartLost {
                player_id: None,
                team: Some(team),
                remaining,
            });
            if remaining == 0 {
                for member in state.team_members(team) {
                    if let Some(player) = state.get_player_mut(member) {
                        player.eliminated = true;
                    }
                    events.push(GameEvent::PlayerEliminated { player_id: member });
                }
            }
        }
        events
    }

    fn check_end(&self, state: &GameState) -> Option<MatchOutcome> {
        let depleted = state.team_hearts.values().any(|hearts| *hearts == 0);
        if !depleted {
            return None;
        }
        let winners: Vec<PlayerId> = state
            .team_hearts
            .iter()
            .filter(|(_, hearts)| **hearts > 0)
            .flat_map(|(team, _)| state.team_members(*team))
            .collect();
        Some(MatchOutcome::new(winners, EndReason::HeartsDepleted))
    }

    fn on_timeout(&self, state: &GameState) -> Option<MatchOutcome> {
        let winners: Vec<PlayerId> = state
            .players
            .iter()
            .filter(|player| player.team != Some(self.timeout_loser))
            .map(|player| player.id)
            .collect();
        Some(MatchOutcome::new(winners, EndReason::TimerExpired))
    }
}

/// 无尽天梯：单颗心的连续对决。
#[derive(Debug, Clone, Copy)]
pub struct Ladder {
    pub time_limit_secs: u64,
}

impl MatchPolicy for Ladder {
    fn moves_pawns(&self) -> bool {
        false
    }

    fn starting_hearts(&self) -> Option<u8> {
        Some(1)
    }

    fn time_limit_secs(&self) -> Option<u64> {
        Some(self.time_limit_secs)
    }

    fn after_round(&self, state: &mut GameState, round: &RoundOutcome) -> Vec<GameEvent> {
        if round.winners.is_empty() {
            return Vec::new();
        }
        let events = punish_non_winners(state, round);
        let opponent_down = state
            .ladder
            .as_ref()
            .and_then(|ladder| state.get_player(ladder.opponent))
            .map(|player| player.eliminated)
            .unwrap_or(false);
        if opponent_down {
            if let Some(ladder) = state.ladder.as_mut() {
                ladder.level += 1;
            }
        }
        events
    }

    fn check_end(&self, state: &GameState) -> Option<MatchOutcome> {
        let ladder = state.ladder.as_ref()?;
        let eliminated =
            |id: PlayerId| state.get_player(id).map(|player| player.eliminated).unwrap_or(true);
        if eliminated(ladder.runner) {
            return Some(MatchOutcome::new(vec![ladder.opponent], EndReason::LadderFailed));
        }
        if eliminated(ladder.opponent) && ladder.queue.is_empty() {
            return Some(MatchOutcome::new(vec![ladder.runner], EndReason::LadderCleared));
        }
        None
    }

    fn on_timeout(&self, state: &GameState) -> Option<MatchOutcome> {
        let ladder = state.ladder.as_ref()?;
        Some(MatchOutcome::new(vec![ladder.opponent], EndReason::TimerExpired))
    }

    fn next_stage(&self, state: &GameState) -> bool {
        state
            .ladder
            .as_ref()
            .map(|ladder| {
                !ladder.queue.is_empty()
                    && state
                        .get_player(ladder.opponent)
                        .map(|player| player.eliminated)
                        .unwrap_or(false)
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TournamentSeries {
    pub rounds: u8,
}

impl MatchPolicy for TournamentSeries {
    fn scoring(&self) -> ScoringVariant {
        ScoringVariant::Tournament
    }

    fn moves_pawns(&self) -> bool {
        false
    }

    fn tournament_seed(&self, players: &[Player]) -> Option<TournamentScore> {
        match players {
            [first, second, ..] => Some(TournamentScore::new(first.id, second.id)),
            _ => None,
        }
    }

    fn after_round(&self, state: &mut GameState, round: &RoundOutcome) -> Vec<GameEvent> {
        let winner = round.single_winner();
        match state.tournament.as_mut() {
            Some(score) => {
                score.record(winner);
                vec![GameEvent::TournamentRoundScored {
                    winner,
                    score: *score,
                }]
            }
            None => Vec::new(),
        }
    }

    fn check_end(&self, state: &GameState) -> Option<MatchOutcome> {
        let score = state.tournament.as_ref()?;
        let majority = self.rounds / 2 + 1;
        for idx in 0..2 {
            if score.wins[idx] >= majority {
                return Some(MatchOutcome::new(
                    vec![score.players[idx]],
                    EndReason::SeriesDecided,
                ));
            }
        }
        if score.rounds_played() < self.rounds {
            return None;
        }
        let outcome = match score.wins[0].cmp(&score.wins[1]) {
            std::cmp::Ordering::Greater => {
                MatchOutcome::new(vec![score.players[0]], EndReason::SeriesDecided)
            }
            std::cmp::Ordering::Less => {
                MatchOutcome::new(vec![score.players[1]], EndReason::SeriesDecided)
            }
            std::cmp::Ordering::Equal => MatchOutcome::new(Vec::new(), EndReason::SeriesDrawn),
        };
        Some(outcome)
    }
}
