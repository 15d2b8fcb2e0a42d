//! 游戏核心逻辑模块（牌组、效果结算、计分移动、模式生命周期、规则引擎）。

pub mod cards;
pub mod config;
pub mod effects;
pub mod legal;
pub mod modes;
pub mod rules;
pub mod scoring;
pub mod state;

pub use cards::{
    Card,
    CardId,
    CardKind,
    DeckRng,
    EffectAxis,
    EffectName,
    Pile,
};
pub use config::{RulesConfig, DEFAULT_RULES};
pub use effects::{EffectContext, EffectPlan, EffectResolution, EffectResolver};
pub use legal::{
    is_legal,
    legal_actions,
    EffectOptions,
    GameAction,
    PlayEffectCard,
    PlayValueCard,
};
pub use modes::{
    BossVariant,
    LadderOpponent,
    LadderProgress,
    MatchPolicy,
    ModeDescriptor,
    TournamentScore,
};
pub use rules::{IllegalReason, RuleEngine, RuleError, RuleResolution, TargetIssue};
pub use scoring::{RoundOutcome, ScoringVariant};
pub use state::{
    EndReason,
    FieldEffect,
    FieldEffectKind,
    GameEvent,
    GamePhase,
    GameState,
    IntegrityError,
    MatchOutcome,
    PathId,
    Player,
    PlayerId,
    PlayerSetup,
    TeamId,
};
