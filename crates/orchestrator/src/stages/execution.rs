use async_trait::async_trait;
use events::Event;
use futures::future::join_all;
use handoff_core::{
    normalize_path, Action, ContextSnapshot, EscalationEntry, RunState, Stage, WorkItem,
    WorkOutput,
};
use tracing::{error, info, warn};

use super::{StageHandler, StageOutcome};
use crate::context::CoordinatorContext;
use crate::error::{OrchestratorError, Result};
use crate::invoker::{RoleContext, RoleResult};

/// Runs the plan phase by phase.
///
/// Items of one phase are dispatched together and joined before anything is
/// written back to the run, so no item ever observes a sibling's output.
pub struct ExecutionStage;

/// Owned inputs for one item; nothing borrowed from the run.
struct ItemJob {
    item: WorkItem,
    base: RoleContext,
    plan_outline: String,
}

struct ItemOutcome {
    item_id: String,
    escalations: Vec<EscalationEntry>,
    result: Result<WorkOutput>,
}

impl ExecutionStage {
    async fn execute_item(ctx: &CoordinatorContext, job: ItemJob) -> ItemOutcome {
        let ItemJob {
            item,
            base,
            plan_outline,
        } = job;
        let mut escalations = Vec::new();
        let result = Self::run_with_escalation(ctx, &item, base, &plan_outline, &mut escalations).await;

        ItemOutcome {
            item_id: item.id,
            escalations,
            result,
        }
    }

    async fn run_with_escalation(
        ctx: &CoordinatorContext,
        item: &WorkItem,
        base: RoleContext,
        plan_outline: &str,
        escalations: &mut Vec<EscalationEntry>,
    ) -> Result<WorkOutput> {
        let mut role_id = item.role.clone();
        let mut prior_output = None;

        loop {
            let role = ctx.role(&role_id)?;
            let context = base
                .clone()
                .with_task(item)
                .with_prior_output(prior_output.clone())
                .with_escalation_trail(escalations.clone())
                .briefed();

            match ctx.dispatcher.dispatch(role, &context).await? {
                RoleResult::Completion {
                    summary,
                    files_changed,
                } => {
                    return Ok(WorkOutput {
                        item_id: item.id.clone(),
                        role: role_id,
                        summary,
                        files_changed: files_changed.iter().map(|f| normalize_path(f)).collect(),
                    })
                }
                RoleResult::EscalationRequired {
                    reason,
                    partial_output,
                } => {
                    let depth = escalations.len() as u32;
                    let target = match role.escalates_to {
                        Some(ref target) if depth < ctx.config.max_escalation_depth => target.clone(),
                        _ => {
                            return Err(OrchestratorError::EscalationRequired {
                                item_id: item.id.clone(),
                                role: role_id,
                                reason,
                            })
                        }
                    };

                    info!(
                        item_id = %item.id,
                        from = %role_id,
                        to = %target,
                        "Escalating work item"
                    );
                    escalations.push(EscalationEntry {
                        item_id: item.id.clone(),
                        from_role: role_id,
                        to_role: target.clone(),
                        reason: reason.clone(),
                        snapshot: ContextSnapshot {
                            task: item.clone(),
                            plan_outline: plan_outline.to_string(),
                            partial_output: partial_output.clone(),
                            failure_reason: reason,
                        },
                    });
                    prior_output = partial_output;
                    role_id = target;
                }
                other => {
                    return Err(OrchestratorError::UnexpectedResult {
                        role: role_id,
                        action: Action::Implement.as_str().to_string(),
                        got: other.kind().to_string(),
                    })
                }
            }
        }
    }
}

#[async_trait]
impl StageHandler for ExecutionStage {
    fn stage(&self) -> Stage {
        Stage::Executing
    }

    async fn handle(&self, ctx: &CoordinatorContext, state: &mut RunState) -> Result<StageOutcome> {
        let plan = state
            .plan
            .clone()
            .ok_or(OrchestratorError::PlanMissing(state.id))?;
        let plan_outline = plan.outline();

        for phase in &plan.phases {
            let jobs: Vec<ItemJob> = phase
                .items
                .iter()
                .filter(|item| !state.is_completed(&item.id))
                .map(|item| ItemJob {
                    item: item.clone(),
                    base: RoleContext::for_run(state, Action::Implement),
                    plan_outline: plan_outline.clone(),
                })
                .collect();
            if jobs.is_empty() {
                continue;
            }

            ctx.check_cancelled()?;

            let item_ids: Vec<String> = jobs.iter().map(|j| j.item.id.clone()).collect();
            info!(
                run_id = %state.id,
                phase = phase.number,
                items = ?item_ids,
                "Starting phase"
            );
            ctx.emit_event(Event::PhaseStarted {
                run_id: state.id,
                phase: phase.number,
                item_ids,
            });

            let outcomes = join_all(jobs.into_iter().map(|job| Self::execute_item(ctx, job))).await;

            let mut first_error = None;
            let mut failed = 0;
            for outcome in outcomes {
                for entry in outcome.escalations {
                    ctx.emit_event(Event::EscalationRecorded {
                        run_id: state.id,
                        item_id: entry.item_id.clone(),
                        from_role: entry.from_role.clone(),
                        to_role: entry.to_role.clone(),
                        reason: entry.reason.clone(),
                    });
                    state.escalations.push(entry);
                }

                match outcome.result {
                    Ok(output) => {
                        ctx.emit_event(Event::WorkItemCompleted {
                            run_id: state.id,
                            item_id: output.item_id.clone(),
                            role: output.role.clone(),
                        });
                        state.failures.remove(&outcome.item_id);
                        state.outputs.insert(outcome.item_id, output);
                    }
                    Err(e) => {
                        error!(
                            run_id = %state.id,
                            item_id = %outcome.item_id,
                            error = %e,
                            "Work item failed"
                        );
                        failed += 1;
                        ctx.emit_event(Event::WorkItemFailed {
                            run_id: state.id,
                            item_id: outcome.item_id.clone(),
                            reason: e.to_string(),
                        });
                        state.failures.insert(outcome.item_id, e.to_string());
                        first_error.get_or_insert(e);
                    }
                }
            }

            ctx.emit_event(Event::PhaseCompleted {
                run_id: state.id,
                phase: phase.number,
                failed,
            });

            if let Some(e) = first_error {
                warn!(run_id = %state.id, phase = phase.number, failed, "Phase failed");
                return Err(e);
            }
        }

        ctx.transition(state, Stage::Reviewing)?;
        Ok(StageOutcome::Advanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use handoff_core::Role;
    use tokio::time::Instant;

    use crate::config::CoordinatorConfig;
    use crate::invoker::ScriptedInvoker;
    use crate::planner::FileOwnershipPlanner;
    use crate::stages::test_support;

    fn executing_state(items: &[WorkItem]) -> RunState {
        let mut state = RunState::new("Add dark mode");
        state.stage = Stage::Executing;
        state.plan = Some(FileOwnershipPlanner::plan(items).unwrap());
        state
    }

    #[tokio::test]
    async fn test_parallel_phase_completes() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .respond(Role::CODER_JR, RoleResult::completion("a done", &["a.ts"]))
                .respond(Role::DESIGNER, RoleResult::completion("b done", &["./b.css"])),
        );
        let ctx = test_support::context(invoker, CoordinatorConfig::default());
        let mut state = executing_state(&[
            WorkItem::new("A", "a", Role::CODER_JR).with_files(["a.ts"]),
            WorkItem::new("B", "b", Role::DESIGNER).with_files(["b.css"]),
        ]);

        let outcome = ExecutionStage.handle(&ctx, &mut state).await.unwrap();

        assert_eq!(outcome, StageOutcome::Advanced);
        assert_eq!(state.stage, Stage::Reviewing);
        assert_eq!(state.completed_ids(), vec!["A", "B"]);
        assert_eq!(state.outputs["B"].files_changed, vec!["b.css"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_items_run_concurrently() {
        let delay = Duration::from_millis(500);
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .respond(Role::CODER_JR, RoleResult::completion("a done", &["a.ts"]))
                .respond(Role::DESIGNER, RoleResult::completion("b done", &["b.css"]))
                .with_delay(Role::CODER_JR, delay)
                .with_delay(Role::DESIGNER, delay),
        );
        let ctx = test_support::context(invoker.clone(), CoordinatorConfig::default());
        let mut state = executing_state(&[
            WorkItem::new("A", "a", Role::CODER_JR).with_files(["a.ts"]),
            WorkItem::new("B", "b", Role::DESIGNER).with_files(["b.css"]),
        ]);

        let start = Instant::now();
        ExecutionStage.handle(&ctx, &mut state).await.unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= delay && elapsed < delay * 2, "took {elapsed:?}");
        let calls = invoker.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].started_at, calls[1].started_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_phase_waits_for_every_sibling() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .respond(Role::CODER_JR, RoleResult::completion("a done", &["a.ts"]))
                .respond(Role::DESIGNER, RoleResult::completion("b done", &["b.css"]))
                .respond(Role::CODER_SR, RoleResult::completion("c done", &["c.ts"]))
                .with_delay(Role::CODER_JR, Duration::from_millis(100))
                .with_delay(Role::DESIGNER, Duration::from_millis(400)),
        );
        let ctx = test_support::context(invoker.clone(), CoordinatorConfig::default());
        let mut state = executing_state(&[
            WorkItem::new("A", "a", Role::CODER_JR).with_files(["a.ts"]),
            WorkItem::new("B", "b", Role::DESIGNER).with_files(["b.css"]),
            WorkItem::new("C", "c", Role::CODER_SR)
                .with_files(["c.ts"])
                .depending_on(["A"]),
        ]);

        ExecutionStage.handle(&ctx, &mut state).await.unwrap();

        let calls = invoker.calls();
        let started = |id: &str| {
            calls
                .iter()
                .find(|c| c.task_id() == Some(id))
                .map(|c| c.started_at)
                .unwrap()
        };
        // C only depends on A, but still waits for the slower B.
        assert!(started("C") >= started("B") + Duration::from_millis(400));
        assert_eq!(state.completed_ids(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_escalation_stops_at_top_role() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .respond(
                    Role::CODER_JR,
                    RoleResult::EscalationRequired {
                        reason: "too complex".to_string(),
                        partial_output: None,
                    },
                )
                .respond(
                    Role::CODER_SR,
                    RoleResult::EscalationRequired {
                        reason: "needs a human".to_string(),
                        partial_output: None,
                    },
                ),
        );
        let ctx = test_support::context(invoker, CoordinatorConfig::default());
        let mut state =
            executing_state(&[WorkItem::new("A", "a", Role::CODER_JR).with_files(["a.ts"])]);

        let err = ExecutionStage.handle(&ctx, &mut state).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Escalation required for A: coder-sr cannot continue (needs a human)"
        );
        assert_eq!(state.escalations.len(), 1);
        assert!(state.failures.contains_key("A"));
        assert_eq!(state.stage, Stage::Executing);
    }

    #[tokio::test]
    async fn test_escalation_depth_zero_refuses() {
        let invoker = Arc::new(ScriptedInvoker::new().respond(
            Role::CODER_JR,
            RoleResult::EscalationRequired {
                reason: "too complex".to_string(),
                partial_output: None,
            },
        ));
        let config = CoordinatorConfig::default().with_max_escalation_depth(0);
        let ctx = test_support::context(invoker.clone(), config);
        let mut state =
            executing_state(&[WorkItem::new("A", "a", Role::CODER_JR).with_files(["a.ts"])]);

        assert!(ExecutionStage.handle(&ctx, &mut state).await.is_err());
        assert!(state.escalations.is_empty());
        assert_eq!(invoker.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_item_lets_siblings_finish_and_stops_next_phase() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .respond(Role::CODER_JR, RoleResult::error("crashed"))
                .respond(Role::CODER_JR, RoleResult::error("crashed again"))
                .respond(Role::DESIGNER, RoleResult::completion("styled", &["b.css"])),
        );
        let ctx = test_support::context(invoker.clone(), CoordinatorConfig::default());
        let mut state = executing_state(&[
            WorkItem::new("A", "a", Role::CODER_JR).with_files(["a.ts"]),
            WorkItem::new("B", "b", Role::DESIGNER).with_files(["b.css"]),
            WorkItem::new("C", "c", Role::CODER_SR)
                .with_files(["c.ts"])
                .depending_on(["A"]),
        ]);

        let err = ExecutionStage.handle(&ctx, &mut state).await.unwrap_err();

        assert_eq!(err.to_string(), "Role coder-jr failed: crashed again");
        assert!(state.is_completed("B"));
        assert!(!state.is_completed("C"));
        assert!(invoker.calls().iter().all(|c| c.role != Role::CODER_SR));
    }

    #[tokio::test]
    async fn test_completed_items_skipped_on_rerun() {
        let invoker = Arc::new(
            ScriptedInvoker::new().respond(Role::CODER_SR, RoleResult::completion("c", &["c.ts"])),
        );
        let ctx = test_support::context(invoker.clone(), CoordinatorConfig::default());
        let mut state = executing_state(&[
            WorkItem::new("A", "a", Role::CODER_JR).with_files(["a.ts"]),
            WorkItem::new("C", "c", Role::CODER_SR).with_files(["c.ts"]).depending_on(["A"]),
        ]);
        state.outputs.insert(
            "A".to_string(),
            WorkOutput {
                item_id: "A".to_string(),
                role: Role::CODER_JR.to_string(),
                summary: "a".to_string(),
                files_changed: vec!["a.ts".to_string()],
            },
        );

        ExecutionStage.handle(&ctx, &mut state).await.unwrap();
        assert_eq!(invoker.calls().len(), 1);
        assert_eq!(state.stage, Stage::Reviewing);
    }

    #[tokio::test]
    async fn test_cancelled_before_phase() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let ctx = test_support::context(invoker.clone(), CoordinatorConfig::default());
        ctx.cancel.cancel();
        let mut state =
            executing_state(&[WorkItem::new("A", "a", Role::CODER_JR).with_files(["a.ts"])]);

        let err = ExecutionStage.handle(&ctx, &mut state).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Cancelled));
        assert!(invoker.calls().is_empty());
    }
}
