use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use events::Event;
use handoff_core::{Role, RoleRegistry, RunState, Stage};
use tracing::{debug, info};

use crate::config::CoordinatorConfig;
use crate::emitter::OrderedEventEmitter;
use crate::error::{OrchestratorError, Result};
use crate::invoker::Dispatcher;
use crate::state_machine::StageMachine;

/// Cooperative cancellation flag shared between a run and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Shared services every stage handler works with.
pub struct CoordinatorContext {
    pub registry: RoleRegistry,
    pub dispatcher: Dispatcher,
    pub config: CoordinatorConfig,
    pub emitter: Option<OrderedEventEmitter>,
    pub cancel: CancelHandle,
}

impl CoordinatorContext {
    pub fn role(&self, role_id: &str) -> Result<&Role> {
        Ok(self.registry.get(role_id)?)
    }

    pub fn transition(&self, state: &mut RunState, to: Stage) -> Result<()> {
        let from = state.stage;
        info!(
            run_id = %state.id,
            from = %from,
            to = %to,
            "Run stage transition"
        );

        StageMachine::validate_transition(&from, &to)?;
        if from == Stage::Clarifying && !state.pending_questions.is_empty() {
            return Err(OrchestratorError::ClarificationIncomplete {
                questions: state.pending_questions.clone(),
            });
        }
        state.stage = to;

        self.emit_event(Event::StageChanged {
            run_id: state.id,
            from_stage: from.as_str().to_string(),
            to_stage: to.as_str().to_string(),
        });

        debug!(run_id = %state.id, stage = %to, "Stage transition completed");
        Ok(())
    }

    pub fn emit_event(&self, event: Event) {
        if let Some(ref emitter) = self.emitter {
            emitter.emit(event);
        }
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(OrchestratorError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::ScriptedInvoker;
    use events::EventBus;

    fn context(bus: Option<EventBus>) -> CoordinatorContext {
        let config = CoordinatorConfig::default();
        let emitter = bus.map(OrderedEventEmitter::new);
        CoordinatorContext {
            registry: RoleRegistry::standard(),
            dispatcher: Dispatcher::new(Arc::new(ScriptedInvoker::new()), config.clone()),
            config,
            emitter,
            cancel: CancelHandle::default(),
        }
    }

    #[tokio::test]
    async fn test_transition_emits_stage_change() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let ctx = context(Some(bus));
        let mut state = RunState::new("req");

        ctx.transition(&mut state, Stage::Planning).unwrap();
        assert_eq!(state.stage, Stage::Planning);

        match rx.recv().await.unwrap().event {
            Event::StageChanged {
                from_stage,
                to_stage,
                ..
            } => {
                assert_eq!(from_stage, "clarifying");
                assert_eq!(to_stage, "planning");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_clarification_gate() {
        let ctx = context(None);
        let mut state = RunState::new("req");
        state.pending_questions.push("Which page?".to_string());

        let err = ctx.transition(&mut state, Stage::Planning).unwrap_err();
        assert!(matches!(err, OrchestratorError::ClarificationIncomplete { .. }));
        assert_eq!(state.stage, Stage::Clarifying);
    }

    #[test]
    fn test_invalid_transition_leaves_stage() {
        let ctx = context(None);
        let mut state = RunState::new("req");
        assert!(ctx.transition(&mut state, Stage::Done).is_err());
        assert_eq!(state.stage, Stage::Clarifying);
    }

    #[test]
    fn test_cancel_handle_shared() {
        let handle = CancelHandle::default();
        let clone = handle.clone();
        clone.cancel();
        assert!(handle.is_cancelled());
        handle.reset();
        assert!(!clone.is_cancelled());
    }
}
