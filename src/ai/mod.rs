//! AI 对手模块：基于合法动作集合的启发式出牌。

pub mod heuristic;

pub use heuristic::{AiAgent, AiConfig, AiDecision, AiDifficulty, MoveReason};
