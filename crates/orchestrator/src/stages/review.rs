use async_trait::async_trait;
use events::Event;
use handoff_core::{Action, ReviewFinding, Role, RunState, Stage};
use tracing::info;

use super::{StageHandler, StageOutcome};
use crate::context::CoordinatorContext;
use crate::error::{OrchestratorError, Result};
use crate::invoker::{RoleContext, RoleResult};
use crate::repro::is_reproducible;

/// Has the reviewer look over every artifact and routes what it finds.
///
/// Blockers with a reproduction go to the debugger. Blockers without one are
/// put in front of the user; once accepted the run re-evaluates the same
/// findings without asking the reviewer again.
pub struct ReviewStage;

impl ReviewStage {
    async fn collect_findings(ctx: &CoordinatorContext, state: &RunState) -> Result<Vec<ReviewFinding>> {
        let reviewer = ctx.role(Role::REVIEWER)?;
        let context = RoleContext::for_run(state, Action::Review)
            .with_artifacts(state.outputs.values().cloned().collect())
            .with_findings(state.findings.clone())
            .briefed();

        match ctx.dispatcher.dispatch(reviewer, &context).await? {
            RoleResult::Findings { findings } => Ok(findings),
            // A plain completion is a clean review.
            RoleResult::Completion { .. } => Ok(Vec::new()),
            other => Err(OrchestratorError::UnexpectedResult {
                role: reviewer.id.clone(),
                action: Action::Review.as_str().to_string(),
                got: other.kind().to_string(),
            }),
        }
    }
}

#[async_trait]
impl StageHandler for ReviewStage {
    fn stage(&self) -> Stage {
        Stage::Reviewing
    }

    async fn handle(&self, ctx: &CoordinatorContext, state: &mut RunState) -> Result<StageOutcome> {
        if !state.awaiting_acceptance {
            let findings = Self::collect_findings(ctx, state).await?;
            let blockers = findings.iter().filter(|f| f.is_blocker()).count();
            info!(
                run_id = %state.id,
                total = findings.len(),
                blockers,
                "Review findings reported"
            );
            ctx.emit_event(Event::FindingsReported {
                run_id: state.id,
                total: findings.len(),
                blockers,
            });
            state.findings = findings;
        }
        state.awaiting_acceptance = false;

        let blockers: Vec<ReviewFinding> = state.unresolved_blockers().into_iter().cloned().collect();
        if blockers.is_empty() {
            ctx.transition(state, Stage::Done)?;
            return Ok(StageOutcome::Advanced);
        }

        if blockers.iter().any(is_reproducible) {
            ctx.transition(state, Stage::Debugging)?;
            return Ok(StageOutcome::Advanced);
        }

        info!(
            run_id = %state.id,
            blockers = blockers.len(),
            "Blockers need user acceptance"
        );
        state.awaiting_acceptance = true;
        Ok(StageOutcome::AwaitingAcceptance(blockers))
    }
}
