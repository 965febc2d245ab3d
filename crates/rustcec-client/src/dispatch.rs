//! Owns the running actions and routes events to them.
//!
//! Every inbound message is offered to every running action in the order
//! they were added, whether or not an earlier one consumed it.

use crate::action::{ActionContext, Effect, FeatureAction, RequestToken, TokenSource};
use crate::cache::MessageCache;
use crate::local_device::LocalDevice;
use rustcec_core::types::LogicalAddress;
use rustcec_core::CecMessage;
use rustcec_link::SendResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(u64);

/// Controller state lent to actions while they run.
pub struct ActionEnv<'a> {
    pub local: &'a LocalDevice,
    pub cache: &'a MessageCache,
    pub tokens: &'a mut TokenSource,
}

impl ActionEnv<'_> {
    fn context(&mut self) -> ActionContext<'_> {
        ActionContext::new(self.local, self.cache, self.tokens)
    }
}

/// Effects tagged with the action that produced them.
pub type TaggedEffects = Vec<(ActionId, Effect)>;

#[derive(Default)]
pub struct Dispatcher {
    next_id: u64,
    actions: Vec<(ActionId, Box<dyn FeatureAction>)>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Registers `action` and runs its `start`.
    pub fn add_and_start(
        &mut self,
        mut action: Box<dyn FeatureAction>,
        env: &mut ActionEnv<'_>,
    ) -> (ActionId, Vec<Effect>) {
        self.next_id += 1;
        let id = ActionId(self.next_id);
        log::debug!("starting {} as {id:?}", action.name());
        let mut ctx = env.context();
        action.start(&mut ctx);
        let effects = ctx.into_effects();
        self.actions.push((id, action));
        (id, effects)
    }

    /// Offers `message` to every running action. Returns whether any of them
    /// consumed it.
    pub fn dispatch(
        &mut self,
        message: &CecMessage,
        env: &mut ActionEnv<'_>,
    ) -> (bool, TaggedEffects) {
        let mut handled = false;
        let mut effects = Vec::new();
        for (id, action) in &mut self.actions {
            if action.is_finished() {
                continue;
            }
            let mut ctx = env.context();
            handled |= action.process_command(&mut ctx, message);
            effects.extend(ctx.into_effects().into_iter().map(|e| (*id, e)));
        }
        (handled, effects)
    }

    pub fn timer_fired(
        &mut self,
        id: ActionId,
        token: RequestToken,
        env: &mut ActionEnv<'_>,
    ) -> Vec<Effect> {
        self.with_action(id, env, |action, ctx| action.handle_timer_event(ctx, token))
    }

    pub fn send_completed(
        &mut self,
        id: ActionId,
        token: RequestToken,
        result: SendResult,
        env: &mut ActionEnv<'_>,
    ) -> Vec<Effect> {
        self.with_action(id, env, |action, ctx| {
            action.handle_send_result(ctx, token, result)
        })
    }

    pub fn poll_completed(
        &mut self,
        id: ActionId,
        token: RequestToken,
        acked: &[LogicalAddress],
        env: &mut ActionEnv<'_>,
    ) -> Vec<Effect> {
        self.with_action(id, env, |action, ctx| {
            action.handle_poll_result(ctx, token, acked)
        })
    }

    /// Cancels every running action whose name satisfies `matches`.
    pub fn finish_where(
        &mut self,
        matches: impl Fn(&str) -> bool,
        env: &mut ActionEnv<'_>,
    ) -> TaggedEffects {
        let mut effects = Vec::new();
        for (id, action) in &mut self.actions {
            if action.is_finished() || !matches(action.name()) {
                continue;
            }
            log::debug!("cancelling {} ({id:?})", action.name());
            let mut ctx = env.context();
            action.finish(&mut ctx);
            effects.extend(ctx.into_effects().into_iter().map(|e| (*id, e)));
        }
        effects
    }

    /// Drops finished actions and returns their ids.
    pub fn prune_finished(&mut self) -> Vec<ActionId> {
        let mut removed = Vec::new();
        self.actions.retain(|(id, action)| {
            if action.is_finished() {
                removed.push(*id);
                false
            } else {
                true
            }
        });
        removed
    }

    /// Whether any running action wants unrelated messages held back.
    pub fn is_deferring(&self) -> bool {
        self.actions
            .iter()
            .any(|(_, action)| !action.is_finished() && action.defers_local_processing())
    }

    fn with_action(
        &mut self,
        id: ActionId,
        env: &mut ActionEnv<'_>,
        f: impl FnOnce(&mut dyn FeatureAction, &mut ActionContext<'_>),
    ) -> Vec<Effect> {
        let Some((_, action)) = self.actions.iter_mut().find(|(candidate, _)| *candidate == id)
        else {
            return Vec::new();
        };
        if action.is_finished() {
            return Vec::new();
        }
        let mut ctx = env.context();
        f(action.as_mut(), &mut ctx);
        ctx.into_effects()
    }
}
