use std::sync::Arc;

use events::{Event, EventBus};
use handoff_core::{ReviewFinding, RoleRegistry, RunState, Stage};
use tracing::{error, info};

use crate::config::CoordinatorConfig;
use crate::context::{CancelHandle, CoordinatorContext};
use crate::emitter::OrderedEventEmitter;
use crate::error::{OrchestratorError, Result};
use crate::invoker::{Dispatcher, ExternalRoleInvoker};
use crate::report::ReportFormatter;
use crate::stages::{handler_for, StageOutcome};

/// Where a call into the coordinator left the run.
#[derive(Debug)]
pub enum RunOutcome {
    /// The planner needs answers; call [`DelegationCoordinator::reply`].
    NeedsClarification { questions: Vec<String> },
    /// Blockers without a reproduction; call
    /// [`DelegationCoordinator::accept_findings`].
    AwaitingAcceptance { blockers: Vec<ReviewFinding> },
    Completed { report: String },
    /// The run stopped for good. The report covers everything done so far.
    Halted {
        error: OrchestratorError,
        report: String,
    },
}

impl RunOutcome {
    pub fn report(&self) -> Option<&str> {
        match self {
            Self::Completed { report } | Self::Halted { report, .. } => Some(report),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Drives a delegation run from the user's request to the final report.
///
/// The coordinator owns no run state of its own: callers hold the
/// [`RunState`] and hand it back on every call, which lets a run pause for
/// user input and pick up again later.
pub struct DelegationCoordinator {
    ctx: CoordinatorContext,
}

impl DelegationCoordinator {
    pub fn new(
        registry: RoleRegistry,
        invoker: Arc<dyn ExternalRoleInvoker>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            ctx: CoordinatorContext {
                registry,
                dispatcher: Dispatcher::new(invoker, config.clone()),
                config,
                emitter: None,
                cancel: CancelHandle::default(),
            },
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        let emitter = OrderedEventEmitter::new(bus);
        self.ctx.dispatcher = self.ctx.dispatcher.with_emitter(emitter.clone());
        self.ctx.emitter = Some(emitter);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.ctx.cancel.clone()
    }

    pub fn registry(&self) -> &RoleRegistry {
        &self.ctx.registry
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.ctx.config
    }

    /// Create the state for a new request. Nothing is invoked yet.
    pub fn start(&self, request: impl Into<String>) -> RunState {
        let state = RunState::new(request);
        info!(run_id = %state.id, "Delegation run started");
        self.ctx.emit_event(Event::RunStarted {
            run_id: state.id,
            request: state.request.clone(),
        });
        state
    }

    /// Start a run and drive it as far as it goes without user input.
    pub async fn run(&self, request: impl Into<String>) -> (RunState, RunOutcome) {
        let mut state = self.start(request);
        let outcome = self.drive(&mut state).await;
        (state, outcome)
    }

    /// Continue a paused run.
    pub async fn resume(&self, state: &mut RunState) -> Result<RunOutcome> {
        Self::ensure_open(state)?;
        Ok(self.drive(state).await)
    }

    /// Answer the planner's questions and continue.
    pub async fn reply(&self, state: &mut RunState, answer: impl Into<String>) -> Result<RunOutcome> {
        Self::ensure_open(state)?;
        if state.stage != Stage::Clarifying {
            return Err(OrchestratorError::UnexpectedInput {
                stage: state.stage.as_str().to_string(),
                input: "an answer",
            });
        }

        state.conversation.push(answer.into());
        state.pending_questions.clear();
        Ok(self.drive(state).await)
    }

    /// Accept blocker findings the debugger cannot act on, then continue.
    pub async fn accept_findings(
        &self,
        state: &mut RunState,
        finding_ids: &[String],
    ) -> Result<RunOutcome> {
        Self::ensure_open(state)?;
        if !state.awaiting_acceptance {
            return Err(OrchestratorError::UnexpectedInput {
                stage: state.stage.as_str().to_string(),
                input: "finding acceptance",
            });
        }
        if let Some(unknown) = finding_ids
            .iter()
            .find(|id| !state.findings.iter().any(|f| &f.id == *id))
        {
            return Err(OrchestratorError::FindingNotFound(unknown.clone()));
        }

        info!(run_id = %state.id, findings = ?finding_ids, "Findings accepted");
        state.accepted_findings.extend(finding_ids.iter().cloned());
        Ok(self.drive(state).await)
    }

    fn ensure_open(state: &RunState) -> Result<()> {
        if let Some(ref reason) = state.halted {
            return Err(OrchestratorError::RunHalted {
                run_id: state.id,
                reason: reason.clone(),
            });
        }
        if state.is_done() {
            return Err(OrchestratorError::RunFinished(state.id));
        }
        Ok(())
    }

    async fn drive(&self, state: &mut RunState) -> RunOutcome {
        loop {
            let Some(handler) = handler_for(state.stage) else {
                info!(run_id = %state.id, "Delegation run completed");
                self.ctx.emit_event(Event::RunFinished {
                    run_id: state.id,
                    success: true,
                    reason: None,
                });
                return RunOutcome::Completed {
                    report: ReportFormatter::render(state),
                };
            };

            if let Err(e) = self.ctx.check_cancelled() {
                return self.halt(state, e);
            }

            match handler.handle(&self.ctx, state).await {
                Ok(StageOutcome::Advanced) => continue,
                Ok(StageOutcome::NeedsClarification(questions)) => {
                    return RunOutcome::NeedsClarification { questions }
                }
                Ok(StageOutcome::AwaitingAcceptance(blockers)) => {
                    return RunOutcome::AwaitingAcceptance { blockers }
                }
                Err(e) => return self.halt(state, e),
            }
        }
    }

    fn halt(&self, state: &mut RunState, error: OrchestratorError) -> RunOutcome {
        error!(
            run_id = %state.id,
            stage = %state.stage,
            error = %error,
            "Delegation run halted"
        );
        state.halted = Some(error.to_string());
        self.ctx.emit_event(Event::RunFinished {
            run_id: state.id,
            success: false,
            reason: Some(error.to_string()),
        });
        RunOutcome::Halted {
            report: ReportFormatter::render(state),
            error,
        }
    }
}
