pub mod ai;
pub mod game;

use gloo_timers::future::TimeoutFuture;
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, to_value};
use std::str::FromStr;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{AiAgent, AiConfig, AiDecision, AiDifficulty, MoveReason};
pub use game::{
    legal_actions, Card, CardId, EffectAxis, EffectName, FieldEffect, GameAction, GameEvent,
    GamePhase, GameState, IntegrityError, LadderProgress, MatchOutcome, ModeDescriptor,
    PlayEffectCard, PlayValueCard, Player, PlayerId, PlayerSetup, RuleEngine, RuleError,
    RuleResolution, RulesConfig,
};

#[cfg(all(feature = "wee_alloc", target_arch = "wasm32"))]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
    web_sys::console::log_1(&format!("reversus_core {} loaded", env!("CARGO_PKG_VERSION")).into());
}

/// 新对局的建局参数。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSetup {
    pub players: Vec<PlayerSetup>,
    #[serde(default)]
    pub mode: ModeDescriptor,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ladder: Option<LadderProgress>,
}

impl MatchSetup {
    pub fn into_state(self) -> GameState {
        let state = GameState::new(self.players, self.mode, self.rules, self.seed);
        match self.ladder {
            Some(ladder) => state.with_ladder(ladder),
            None => state,
        }
    }
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn make_resolution_json(resolution: RuleResolution) -> Result<String, JsValue> {
    serde_json::to_string(&resolution).map_err(serde_to_js_error)
}

fn resolution_from_events(state: &GameState, events: Vec<GameEvent>) -> RuleResolution {
    RuleResolution::new(state.clone(), events)
}

fn execute_with_engine<F>(state: &mut GameState, action: F) -> Result<Vec<GameEvent>, JsValue>
where
    F: FnOnce(&mut RuleEngine, &mut GameState) -> Result<Vec<GameEvent>, RuleError>,
{
    let mut engine = RuleEngine::new();
    action(&mut engine, state).map_err(to_js_error)
}

/// 未指定难度时按对局推断。
fn ai_config(state: &GameState, difficulty: Option<&str>) -> AiConfig {
    difficulty
        .and_then(|value| AiDifficulty::from_str(value).ok())
        .map(AiConfig::from_difficulty)
        .unwrap_or_else(|| AiConfig::for_state(state))
}

#[derive(Serialize)]
struct AiMoveResponse {
    decision: AiDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<RuleResolution>,
}

#[wasm_bindgen]
pub struct GameEngine {
    state: GameState,
}

#[wasm_bindgen]
impl GameEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(initial_state_json: Option<String>) -> Result<GameEngine, JsValue> {
        let state = if let Some(json) = initial_state_json {
            serde_json::from_str(&json).map_err(serde_to_js_error)?
        } else {
            GameState::sample()
        };
        Ok(GameEngine { state })
    }

    /// 按建局参数创建对局，尚未开局抽牌。
    #[wasm_bindgen(js_name = "fromSetup")]
    pub fn from_setup(setup_json: &str) -> Result<GameEngine, JsValue> {
        let setup: MatchSetup = serde_json::from_str(setup_json).map_err(serde_to_js_error)?;
        Ok(GameEngine {
            state: setup.into_state(),
        })
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state).map_err(serde_to_js_error)
    }

    pub fn set_state_json(&mut self, json: &str) -> Result<(), JsValue> {
        let state: GameState = serde_json::from_str(json).map_err(serde_to_js_error)?;
        self.state = state;
        Ok(())
    }

    pub fn start_match(&mut self) -> Result<String, JsValue> {
        let events = execute_with_engine(&mut self.state, |engine, state| engine.start_match(state))?;
        make_resolution_json(resolution_from_events(&self.state, events))
    }

    pub fn play_value_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: PlayValueCard = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        let events = execute_with_engine(&mut self.state, |engine, state| {
            engine.play_value_card(state, action)
        })?;
        make_resolution_json(resolution_from_events(&self.state, events))
    }

    pub fn play_effect_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: PlayEffectCard = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        let events = execute_with_engine(&mut self.state, |engine, state| {
            engine.play_effect_card(state, action)
        })?;
        make_resolution_json(resolution_from_events(&self.state, events))
    }

    pub fn action_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: GameAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        let resolution = self.apply_game_action(action)?;
        make_resolution_json(resolution)
    }

    pub fn pass_turn(&mut self, player_id: u8) -> Result<String, JsValue> {
        let events = execute_with_engine(&mut self.state, |engine, state| {
            engine.pass_turn(state, player_id)
        })?;
        make_resolution_json(resolution_from_events(&self.state, events))
    }

    pub fn select_pula_destination(&mut self, player_id: u8, path_id: u8) -> Result<String, JsValue> {
        let events = execute_with_engine(&mut self.state, |engine, state| {
            engine.select_pula_destination(state, player_id, path_id)
        })?;
        make_resolution_json(resolution_from_events(&self.state, events))
    }

    pub fn apply_field_effect_json(&mut self, effect_json: &str) -> Result<String, JsValue> {
        let effect: FieldEffect = serde_json::from_str(effect_json).map_err(serde_to_js_error)?;
        let events = execute_with_engine(&mut self.state, |engine, state| {
            engine.apply_field_effect(state, effect)
        })?;
        make_resolution_json(resolution_from_events(&self.state, events))
    }

    pub fn award_stars(&mut self, player_id: u8, stars: u32) -> Result<String, JsValue> {
        let events = execute_with_engine(&mut self.state, |engine, state| {
            engine.award_stars(state, player_id, stars)
        })?;
        make_resolution_json(resolution_from_events(&self.state, events))
    }

    pub fn tick_clock(&mut self, elapsed_secs: u32) -> Result<String, JsValue> {
        let events = execute_with_engine(&mut self.state, |engine, state| {
            engine.tick_clock(state, u64::from(elapsed_secs))
        })?;
        make_resolution_json(resolution_from_events(&self.state, events))
    }

    pub fn check_match_end(&mut self) -> Result<String, JsValue> {
        let events =
            execute_with_engine(&mut self.state, |engine, state| engine.check_match_end(state))?;
        make_resolution_json(resolution_from_events(&self.state, events))
    }

    pub fn legal_actions_json(&self, player_id: u8) -> Result<String, JsValue> {
        serde_json::to_string(&legal_actions(&self.state, player_id)).map_err(serde_to_js_error)
    }

    pub fn apply_ai_move(&mut self, player_id: u8, difficulty: Option<String>) -> Result<String, JsValue> {
        let config = ai_config(&self.state, difficulty.as_deref());

        // 先克隆状态用于 AI 决策
        let state_for_ai = self.state.clone();
        let mut agent = AiAgent::new(config);
        let decision = agent.decide_action(&state_for_ai, player_id);

        let applied = match decision.action {
            Some(action) => Some(self.apply_game_action(action)?),
            None => None,
        };

        let response = AiMoveResponse { decision, applied };
        serde_json::to_string(&response).map_err(serde_to_js_error)
    }

    /// 延迟后给出 AI 决策，不修改引擎状态；前端再把动作经由 `action_json` 提交。
    pub fn think_ai(&self, player_id: u8, difficulty: Option<String>, delay_ms: Option<u32>) -> Promise {
        let state = self.state.clone();
        let config = ai_config(&state, difficulty.as_deref());
        let delay = delay_ms.unwrap_or(0);

        future_to_promise(async move {
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            let mut agent = AiAgent::new(config);
            let decision = agent.decide_action(&state, player_id);
            let json = serde_json::to_string(&decision).map_err(serde_to_js_error)?;
            Ok(JsValue::from_str(&json))
        })
    }

    fn apply_game_action(&mut self, action: GameAction) -> Result<RuleResolution, JsValue> {
        let events = execute_with_engine(&mut self.state, |engine, state| {
            engine.apply_action(state, action)
        })?;
        Ok(resolution_from_events(&self.state, events))
    }
}

/// 返回一个示例游戏状态，方便前端调试或初始化。
#[wasm_bindgen(js_name = "createGameState")]
pub fn create_game_state() -> Result<JsValue, JsValue> {
    to_value(&GameState::sample()).map_err(JsValue::from)
}

/// 将传入的游戏状态进行深拷贝后返回。
#[wasm_bindgen(js_name = "cloneGameState")]
pub fn clone_game_state(state: JsValue) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    let cloned = state.clone();
    to_value(&cloned).map_err(JsValue::from)
}

/// 对传入状态执行一个动作，返回新状态与事件。
#[wasm_bindgen(js_name = "applyAction")]
pub fn apply_action(state: JsValue, action: JsValue) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    let action: GameAction = from_value(action).map_err(JsValue::from)?;
    let mut engine = RuleEngine::new();
    match engine.simulate(&state, action) {
        Ok(resolution) => to_value(&resolution).map_err(JsValue::from),
        Err(error) => Err(to_js_error(error)),
    }
}

#[wasm_bindgen(js_name = "legalActions")]
pub fn legal_actions_for(state: JsValue, player_id: u8) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    to_value(&legal_actions(&state, player_id)).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "checkMatchEnd")]
pub fn check_match_end(state: JsValue) -> Result<JsValue, JsValue> {
    let mut state: GameState = from_value(state).map_err(JsValue::from)?;
    let mut engine = RuleEngine::new();
    match engine.check_match_end(&mut state) {
        Ok(events) => to_value(&RuleResolution::new(state, events)).map_err(JsValue::from),
        Err(error) => Err(to_js_error(error)),
    }
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
    Ok(())
}

#[wasm_bindgen(js_name = "computeAiMove")]
pub fn compute_ai_move(
    state: JsValue,
    player_id: u8,
    difficulty: Option<String>,
) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    let mut agent = AiAgent::new(ai_config(&state, difficulty.as_deref()));
    let decision = agent.decide_action(&state, player_id);
    to_value(&decision).map_err(JsValue::from)
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
