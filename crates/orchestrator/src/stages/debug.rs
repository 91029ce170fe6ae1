use async_trait::async_trait;
use handoff_core::{normalize_path, Action, DebugFix, ReviewFinding, Role, RunState, Stage};
use tracing::{info, warn};

use super::{StageHandler, StageOutcome};
use crate::context::CoordinatorContext;
use crate::error::{OrchestratorError, Result};
use crate::invoker::{RoleContext, RoleResult};
use crate::repro::is_reproducible;

/// Sends reproducible blockers to the debugger. A fix always goes back to
/// review; it is never taken as proof on its own.
pub struct DebugStage;

#[async_trait]
impl StageHandler for DebugStage {
    fn stage(&self) -> Stage {
        Stage::Debugging
    }

    async fn handle(&self, ctx: &CoordinatorContext, state: &mut RunState) -> Result<StageOutcome> {
        if state.review_cycles >= ctx.config.max_review_cycles {
            warn!(
                run_id = %state.id,
                cycles = state.review_cycles,
                "Debug cycle limit reached"
            );
            return Err(OrchestratorError::UnresolvedBlockers {
                count: state.unresolved_blockers().len(),
                cycles: state.review_cycles,
            });
        }

        let blockers: Vec<ReviewFinding> = state
            .unresolved_blockers()
            .into_iter()
            .filter(|f| is_reproducible(f))
            .cloned()
            .collect();
        let finding_ids: Vec<String> = blockers.iter().map(|f| f.id.clone()).collect();

        state.review_cycles += 1;
        info!(
            run_id = %state.id,
            cycle = state.review_cycles,
            findings = ?finding_ids,
            "Dispatching debugger"
        );

        let debugger = ctx.role(Role::DEBUGGER)?;
        let context = RoleContext::for_run(state, Action::Debug)
            .with_artifacts(state.outputs.values().cloned().collect())
            .with_findings(blockers)
            .briefed();

        match ctx.dispatcher.dispatch(debugger, &context).await? {
            RoleResult::Completion {
                summary,
                files_changed,
            } => {
                state.debug_fixes.push(DebugFix {
                    finding_ids,
                    summary,
                    files_changed: files_changed.iter().map(|f| normalize_path(f)).collect(),
                });
                ctx.transition(state, Stage::Reviewing)?;
                Ok(StageOutcome::Advanced)
            }
            RoleResult::EscalationRequired { reason, .. } => {
                Err(OrchestratorError::EscalationRequired {
                    item_id: finding_ids.join(", "),
                    role: debugger.id.clone(),
                    reason,
                })
            }
            other => Err(OrchestratorError::UnexpectedResult {
                role: debugger.id.clone(),
                action: Action::Debug.as_str().to_string(),
                got: other.kind().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use handoff_core::FindingSeverity;

    use crate::config::CoordinatorConfig;
    use crate::invoker::ScriptedInvoker;
    use crate::stages::test_support;

    fn debugging_state() -> RunState {
        let mut state = RunState::new("Add dark mode");
        state.stage = Stage::Debugging;
        state.findings = vec![
            ReviewFinding::new("F1", FindingSeverity::Blocker, "crash")
                .with_reproduction("npm test -- Toggle"),
            ReviewFinding::new("F2", FindingSeverity::Blocker, "looks off"),
        ];
        state
    }

    #[tokio::test]
    async fn test_fix_returns_to_review() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .respond(Role::DEBUGGER, RoleResult::completion("guarded theme", &["src/Toggle.tsx"])),
        );
        let ctx = test_support::context(invoker.clone(), CoordinatorConfig::default());
        let mut state = debugging_state();

        DebugStage.handle(&ctx, &mut state).await.unwrap();

        assert_eq!(state.stage, Stage::Reviewing);
        assert_eq!(state.review_cycles, 1);
        assert_eq!(state.debug_fixes[0].finding_ids, vec!["F1"]);
        assert_eq!(invoker.calls()[0].action, Action::Debug);
    }

    #[tokio::test]
    async fn test_cycle_limit_halts() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let config = CoordinatorConfig::default().with_max_review_cycles(1);
        let ctx = test_support::context(invoker.clone(), config);
        let mut state = debugging_state();
        state.review_cycles = 1;

        let err = DebugStage.handle(&ctx, &mut state).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "2 blocker finding(s) unresolved after 1 debug cycle(s)"
        );
        assert!(invoker.calls().is_empty());
    }
}
