use serde::{Deserialize, Serialize};

use super::cards::{Card, CardId, EffectAxis, EffectName, Pile};
use super::state::{
    FieldEffectKind, FizzleReason, GameEvent, GameState, PathId, PendingPula, PlayerId,
};

/// 一次性卡牌立即抽取的效果牌数量。
const ONE_SHOT_DRAWS: u8 = 2;

/// 经过合法性校验后的出牌意图。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum EffectPlan {
    /// Mais / Menos / Sobe / Desce / NECRO X。
    Basic { effect: EffectName },
    Pula {
        #[serde(default)]
        path: Option<PathId>,
    },
    Reverse { axis: EffectAxis },
    /// 全场反转。
    ReversusTotal,
    /// Reversus Total 的个人锁定用法。
    Lock { effect: EffectName },
    OneShot,
}

impl EffectPlan {
    /// 打出后在出牌区占据的槽位。
    pub fn zone_axis(&self) -> Option<EffectAxis> {
        match self {
            EffectPlan::Basic { effect } | EffectPlan::Lock { effect } => effect.axis(),
            EffectPlan::Pula { .. } => Some(EffectAxis::Movement),
            EffectPlan::Reverse { axis } => Some(*axis),
            EffectPlan::ReversusTotal | EffectPlan::OneShot => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectContext {
    pub caster: PlayerId,
    pub target: PlayerId,
    pub card_id: CardId,
}

impl EffectContext {
    pub fn new(caster: PlayerId, card_id: CardId) -> Self {
        Self {
            caster,
            target: caster,
            card_id,
        }
    }

    pub fn with_target(mut self, target: PlayerId) -> Self {
        self.target = target;
        self
    }
}

#[derive(Default, Debug, Clone)]
pub struct EffectResolution {
    pub events: Vec<GameEvent>,
    pub fizzled: Option<FizzleReason>,
}

/// 效果结算器。顺序固定：离手 → 出牌区占位/失效检查 → 改写槽位 → 附带结算。
#[derive(Default, Debug, Clone)]
pub struct EffectResolver;

impl EffectResolver {
    pub fn new() -> Self {
        Self
    }

    /// `card` 已由调用方从手牌中取出。
    pub fn resolve(
        &self,
        state: &mut GameState,
        ctx: &EffectContext,
        card: Card,
        plan: EffectPlan,
    ) -> EffectResolution {
        let mut resolution = EffectResolution::default();

        if plan == EffectPlan::OneShot {
            self.resolve_one_shot(state, ctx, card, &mut resolution);
            return resolution;
        }

        if let EffectPlan::Basic { effect } = plan {
            let (applied, _) = Self::transform(state, effect);
            if applied.is_negative() && state.has_field_effect(ctx.target, FieldEffectKind::Imunidade)
            {
                state.discard.put(card);
                Self::fizzle(state, ctx, FizzleReason::Immune, &mut resolution);
                return resolution;
            }
        }

        let zone_owner = match plan {
            EffectPlan::ReversusTotal => ctx.caster,
            _ => ctx.target,
        };
        let axis = plan.zone_axis();

        if let Some(axis) = axis {
            let locked = state
                .get_player(zone_owner)
                .map(|player| player.is_slot_locked(axis))
                .unwrap_or(false);
            if locked {
                state.discard.put(card);
                Self::fizzle(state, ctx, FizzleReason::LockedSlot, &mut resolution);
                return resolution;
            }

            let replaced = state
                .get_player_mut(zone_owner)
                .and_then(|player| player.take_slot_occupant(axis));
            if let Some(old) = replaced {
                let card_id = old.id;
                state.discard.put(old);
                state.emit(
                    &mut resolution.events,
                    GameEvent::CardReplaced {
                        player_id: zone_owner,
                        card_id,
                    },
                );
            }
        }

        let mut card = card;
        card.slot = axis;
        card.target = Some(ctx.target);

        match plan {
            EffectPlan::Basic { effect } => self.apply_basic(state, ctx, effect, &mut resolution),
            EffectPlan::Pula { path } => self.apply_pula(state, ctx, path, &mut resolution),
            EffectPlan::Reverse { axis } => self.apply_reverse(state, ctx, axis, &mut resolution),
            EffectPlan::Lock { effect } => {
                card.lock_to(effect);
                self.apply_lock(state, ctx, effect, &mut resolution);
            }
            EffectPlan::ReversusTotal => self.apply_reversus_total(state, ctx, &mut resolution),
            EffectPlan::OneShot => {}
        }

        match state.get_player_mut(zone_owner) {
            Some(player) => player.played_effects.push(card),
            None => state.discard.put(card),
        }
        resolution
    }

    /// 全场反转生效时，新打出的基础效果先取反。
    fn transform(state: &GameState, effect: EffectName) -> (EffectName, bool) {
        if !state.reversus_total_active {
            return (effect, false);
        }
        match effect.inverse() {
            Some(inverse) => (inverse, true),
            None => (effect, false),
        }
    }

    fn fizzle(
        state: &mut GameState,
        ctx: &EffectContext,
        reason: FizzleReason,
        resolution: &mut EffectResolution,
    ) {
        tracing::info!(
            caster = ctx.caster,
            target = ctx.target,
            card_id = ctx.card_id,
            ?reason,
            "effect fizzled"
        );
        state.emit(
            &mut resolution.events,
            GameEvent::EffectFizzled {
                caster: ctx.caster,
                target: ctx.target,
                card_id: ctx.card_id,
                reason,
            },
        );
        resolution.fizzled = Some(reason);
    }

    fn apply_basic(
        &self,
        state: &mut GameState,
        ctx: &EffectContext,
        effect: EffectName,
        resolution: &mut EffectResolution,
    ) {
        let (applied, inverted) = Self::transform(state, effect);
        let axis = applied.axis();
        if let (Some(axis), Some(target)) = (axis, state.get_player_mut(ctx.target)) {
            target.effects.set(axis, Some(applied));
            if axis == EffectAxis::Movement {
                target.pula_target_path = None;
            }
        }
        state.emit(
            &mut resolution.events,
            GameEvent::EffectApplied {
                caster: ctx.caster,
                target: ctx.target,
                card_id: ctx.card_id,
                effect: applied,
                axis,
                inverted,
            },
        );
    }

    fn apply_pula(
        &self,
        state: &mut GameState,
        ctx: &EffectContext,
        path: Option<PathId>,
        resolution: &mut EffectResolution,
    ) {
        let nullified = state.reversus_total_active;
        if let Some(target) = state.get_player_mut(ctx.target) {
            if nullified {
                target.effects.movement = None;
                target.pula_target_path = None;
            } else {
                target.effects.movement = Some(EffectName::Pula);
                target.pula_target_path = path;
            }
        }

        state.pending_pula = if !nullified && path.is_none() {
            Some(PendingPula {
                caster: ctx.caster,
                target: ctx.target,
                card_id: ctx.card_id,
            })
        } else {
            state.pending_pula.filter(|pending| pending.target != ctx.target)
        };

        state.emit(
            &mut resolution.events,
            GameEvent::EffectApplied {
                caster: ctx.caster,
                target: ctx.target,
                card_id: ctx.card_id,
                effect: EffectName::Pula,
                axis: Some(EffectAxis::Movement),
                inverted: nullified,
            },
        );
    }

    fn apply_reverse(
        &self,
        state: &mut GameState,
        ctx: &EffectContext,
        axis: EffectAxis,
        resolution: &mut EffectResolution,
    ) {
        let Some(target) = state.get_player_mut(ctx.target) else {
            return;
        };
        let from = target.effects.get(axis);
        let to = from.and_then(EffectName::inverse);
        target.effects.set(axis, to);
        if from == Some(EffectName::Pula) {
            target.pula_target_path = None;
            state.pending_pula = state
                .pending_pula
                .filter(|pending| pending.target != ctx.target);
        }

        state.emit(
            &mut resolution.events,
            GameEvent::SlotReversed {
                caster: ctx.caster,
                target: ctx.target,
                axis,
                from,
                to,
            },
        );
        state.emit(
            &mut resolution.events,
            GameEvent::EffectApplied {
                caster: ctx.caster,
                target: ctx.target,
                card_id: ctx.card_id,
                effect: EffectName::Reversus,
                axis: Some(axis),
                inverted: false,
            },
        );
    }

    fn apply_lock(
        &self,
        state: &mut GameState,
        ctx: &EffectContext,
        effect: EffectName,
        resolution: &mut EffectResolution,
    ) {
        let Some(axis) = effect.axis() else {
            return;
        };
        if let Some(target) = state.get_player_mut(ctx.target) {
            target.effects.set(axis, Some(effect));
            if axis == EffectAxis::Movement {
                target.pula_target_path = None;
            }
        }
        state.emit(
            &mut resolution.events,
            GameEvent::SlotLocked {
                caster: ctx.caster,
                target: ctx.target,
                axis,
                effect,
            },
        );
    }

    /// 立即反转所有未锁定的槽位；移动槽中的 Pula 保持不变。
    fn apply_reversus_total(
        &self,
        state: &mut GameState,
        ctx: &EffectContext,
        resolution: &mut EffectResolution,
    ) {
        state.reversus_total_active = true;

        let mut inverted = Vec::new();
        for player in state.players.iter_mut() {
            let mut touched = false;
            for axis in [EffectAxis::Score, EffectAxis::Movement] {
                if player.is_slot_locked(axis) {
                    continue;
                }
                let next = match player.effects.get(axis) {
                    Some(EffectName::Pula) | None => continue,
                    Some(current) => current.inverse(),
                };
                if next.is_some() {
                    player.effects.set(axis, next);
                    touched = true;
                }
            }
            if touched {
                inverted.push(player.id);
            }
        }

        tracing::info!(caster = ctx.caster, players = inverted.len(), "reversus total activated");
        state.emit(
            &mut resolution.events,
            GameEvent::ReversusTotalActivated {
                caster: ctx.caster,
                inverted,
            },
        );
    }

    fn resolve_one_shot(
        &self,
        state: &mut GameState,
        ctx: &EffectContext,
        mut card: Card,
        resolution: &mut EffectResolution,
    ) {
        let mut drawn = Vec::new();
        for _ in 0..ONE_SHOT_DRAWS {
            match state.deal(Pile::Effect) {
                Ok(drawn_card) => drawn.push(drawn_card),
                Err(exhausted) => {
                    tracing::warn!(player_id = ctx.caster, %exhausted, "one-shot draw stopped early");
                    state.emit(
                        &mut resolution.events,
                        GameEvent::HandRefillShort {
                            player_id: ctx.caster,
                            pile: exhausted.pile,
                        },
                    );
                    break;
                }
            }
        }

        card.cooldown = state.rules.one_shot_cooldown;
        let cooldown = card.cooldown;
        let drawn_ids: Vec<CardId> = drawn.iter().map(|drawn_card| drawn_card.id).collect();
        match state.get_player_mut(ctx.caster) {
            Some(player) => {
                player.hand.extend(drawn);
                player.hand.push(card);
            }
            None => {
                state.discard.put_all(drawn);
                state.discard.put(card);
            }
        }

        state.emit(
            &mut resolution.events,
            GameEvent::OneShotResolved {
                player_id: ctx.caster,
                card_id: ctx.card_id,
                drawn: drawn_ids,
                cooldown,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::RulesConfig;
    use crate::game::modes::ModeDescriptor;
    use crate::game::state::{FieldEffect, PlayerSetup};

    fn duel() -> GameState {
        GameState::new(
            vec![PlayerSetup::new(0, "A"), PlayerSetup::new(1, "B")],
            ModeDescriptor::Solo,
            RulesConfig::default(),
            17,
        )
    }

    fn play(
        state: &mut GameState,
        caster: PlayerId,
        target: PlayerId,
        card: Card,
        plan: EffectPlan,
    ) -> EffectResolution {
        let ctx = EffectContext::new(caster, card.id).with_target(target);
        EffectResolver::new().resolve(state, &ctx, card, plan)
    }

    fn basic(effect: EffectName) -> EffectPlan {
        EffectPlan::Basic { effect }
    }

    #[test]
    fn replaced_occupant_goes_to_discard() {
        let mut state = duel();
        play(&mut state, 0, 1, Card::effect(900, EffectName::Mais), basic(EffectName::Mais));
        let resolution = play(
            &mut state,
            0,
            1,
            Card::effect(901, EffectName::Menos),
            basic(EffectName::Menos),
        );

        assert!(resolution.fizzled.is_none());
        let target = &state.players[1];
        assert_eq!(target.effects.score, Some(EffectName::Menos));
        assert_eq!(target.played_effects.len(), 1);
        assert_eq!(target.played_effects[0].id, 901);
        assert!(state.discard.effect.iter().any(|card| card.id == 900));
        state.integrity_check().expect("no card in two places");
    }

    #[test]
    fn reversus_on_locked_slot_fizzles_and_is_consumed() {
        let mut state = duel();
        play(
            &mut state,
            1,
            0,
            Card::effect(900, EffectName::ReversusTotal),
            EffectPlan::Lock {
                effect: EffectName::Menos,
            },
        );
        assert!(state.players[0].is_slot_locked(EffectAxis::Score));

        let resolution = play(
            &mut state,
            1,
            0,
            Card::effect(901, EffectName::Reversus),
            EffectPlan::Reverse {
                axis: EffectAxis::Score,
            },
        );

        assert_eq!(resolution.fizzled, Some(FizzleReason::LockedSlot));
        assert_eq!(state.players[0].effects.score, Some(EffectName::Menos));
        assert!(state.discard.effect.iter().any(|card| card.id == 901));
        assert!(resolution.events.iter().any(|event| matches!(
            event,
            GameEvent::EffectFizzled {
                reason: FizzleReason::LockedSlot,
                ..
            }
        )));
    }

    #[test]
    fn reversus_total_flips_active_effects_and_later_plays() {
        let mut state = duel();
        play(&mut state, 0, 0, Card::effect(900, EffectName::Sobe), basic(EffectName::Sobe));
        play(&mut state, 0, 0, Card::effect(901, EffectName::ReversusTotal), EffectPlan::ReversusTotal);

        assert!(state.reversus_total_active);
        assert_eq!(state.players[0].effects.movement, Some(EffectName::Desce));

        let resolution = play(&mut state, 1, 1, Card::effect(902, EffectName::Mais), basic(EffectName::Mais));
        assert_eq!(state.players[1].effects.score, Some(EffectName::Menos));
        assert!(resolution.events.iter().any(|event| matches!(
            event,
            GameEvent::EffectApplied { inverted: true, .. }
        )));
    }

    #[test]
    fn reversus_total_skips_locked_slots_and_pula() {
        let mut state = duel();
        play(
            &mut state,
            1,
            0,
            Card::effect(900, EffectName::ReversusTotal),
            EffectPlan::Lock {
                effect: EffectName::Mais,
            },
        );
        play(&mut state, 1, 1, Card::effect(901, EffectName::Pula), EffectPlan::Pula { path: Some(3) });
        play(&mut state, 0, 0, Card::effect(902, EffectName::ReversusTotal), EffectPlan::ReversusTotal);

        assert_eq!(state.players[0].effects.score, Some(EffectName::Mais));
        assert_eq!(state.players[1].effects.movement, Some(EffectName::Pula));
    }

    #[test]
    fn pula_under_reversus_total_leaves_path_untouched() {
        let mut state = duel();
        state.reversus_total_active = true;
        let start_path = state.players[1].path_id;
        let destination = (start_path + 1) % state.rules.path_count;
        let start_position = state.players[1].position;

        let resolution = play(
            &mut state,
            0,
            1,
            Card::effect(900, EffectName::Pula),
            EffectPlan::Pula {
                path: Some(destination),
            },
        );

        assert_eq!(resolution.fizzled, None);
        assert_eq!(state.players[1].effects.movement, None);
        assert_eq!(state.players[1].pula_target_path, None);
        assert!(state.pending_pula.is_none());
        assert!(resolution.events.iter().any(|event| matches!(
            event,
            GameEvent::EffectApplied {
                effect: EffectName::Pula,
                inverted: true,
                ..
            }
        )));

        let events = crate::game::scoring::apply_movement(&mut state, &[1]);
        assert_eq!(state.players[1].path_id, start_path);
        assert_eq!(state.players[1].position, start_position + 1);
        assert!(!events
            .iter()
            .any(|event| matches!(event, GameEvent::PathChanged { .. })));
    }

    #[test]
    fn reversus_clears_pula() {
        let mut state = duel();
        play(&mut state, 1, 1, Card::effect(900, EffectName::Pula), EffectPlan::Pula { path: None });
        assert_eq!(state.pending_pula.map(|pending| pending.caster), Some(1));

        play(
            &mut state,
            0,
            1,
            Card::effect(901, EffectName::Reversus),
            EffectPlan::Reverse {
                axis: EffectAxis::Movement,
            },
        );
        assert_eq!(state.players[1].effects.movement, None);
        assert!(state.pending_pula.is_none());
    }

    #[test]
    fn immune_target_ignores_negative_effects() {
        let mut state = duel();
        state
            .field_effects
            .push(FieldEffect::new(FieldEffectKind::Imunidade, 1));
        let resolution = play(&mut state, 0, 1, Card::effect(900, EffectName::Desce), basic(EffectName::Desce));

        assert_eq!(resolution.fizzled, Some(FizzleReason::Immune));
        assert_eq!(state.players[1].effects.movement, None);
        assert!(state.players[1].played_effects.is_empty());
    }

    #[test]
    fn one_shot_draws_and_returns_with_cooldown() {
        let mut state = duel();
        let deck_before = state.decks.effect.len();
        play(
            &mut state,
            0,
            0,
            Card::effect(900, EffectName::CartaDaVersatrix),
            EffectPlan::OneShot,
        );

        let player = &state.players[0];
        assert_eq!(player.hand.len(), 3);
        let card = player.card_in_hand(900).expect("one-shot returns to hand");
        assert_eq!(card.cooldown, state.rules.one_shot_cooldown);
        assert_eq!(player.effect_cards_in_hand(), 2);
        assert_eq!(state.decks.effect.len(), deck_before - 2);
        assert!(player.played_effects.is_empty());
    }
}
