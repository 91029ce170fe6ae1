use async_trait::async_trait;
use events::Event;
use handoff_core::{Action, Role, RunState, Stage};
use tracing::info;

use super::{StageHandler, StageOutcome};
use crate::context::CoordinatorContext;
use crate::error::{OrchestratorError, Result};
use crate::invoker::{RoleContext, RoleResult};

/// Asks the planner whether the request is clear enough to plan.
pub struct ClarifyStage;

#[async_trait]
impl StageHandler for ClarifyStage {
    fn stage(&self) -> Stage {
        Stage::Clarifying
    }

    async fn handle(&self, ctx: &CoordinatorContext, state: &mut RunState) -> Result<StageOutcome> {
        let planner = ctx.role(Role::PLANNER)?;
        let context = RoleContext::for_run(state, Action::Clarify)
            .with_sentinel(ctx.config.clarification_sentinel.clone())
            .briefed();

        let questions = match ctx.dispatcher.dispatch(planner, &context).await? {
            RoleResult::Completion { summary, .. }
                if ctx.config.is_clarification_complete(&summary) =>
            {
                info!(run_id = %state.id, "Clarification complete");
                state.pending_questions.clear();
                ctx.transition(state, Stage::Planning)?;
                return Ok(StageOutcome::Advanced);
            }
            // Anything short of the sentinel goes back to the user as is.
            RoleResult::Completion { summary, .. } => vec![summary],
            RoleResult::ClarificationNeeded { questions } => questions,
            other => {
                return Err(OrchestratorError::UnexpectedResult {
                    role: planner.id.clone(),
                    action: Action::Clarify.as_str().to_string(),
                    got: other.kind().to_string(),
                })
            }
        };

        info!(
            run_id = %state.id,
            questions = questions.len(),
            "Planner needs clarification"
        );
        state.pending_questions = questions.clone();
        ctx.emit_event(Event::QuestionsRaised {
            run_id: state.id,
            questions: questions.clone(),
        });
        Ok(StageOutcome::NeedsClarification(questions))
    }
}
