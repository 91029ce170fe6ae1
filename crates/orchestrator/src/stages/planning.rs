use async_trait::async_trait;
use events::Event;
use handoff_core::{Action, ExecutionPlan, Role, RunState, Stage, WorkItem};
use tracing::{info, warn};

use super::{StageHandler, StageOutcome};
use crate::context::CoordinatorContext;
use crate::error::{OrchestratorError, PlanningError, Result};
use crate::invoker::{RoleContext, RoleResult};
use crate::planner::FileOwnershipPlanner;

/// Asks the planner for work items and orders them into phases.
///
/// A rejected plan is sent back to the planner as feedback until the
/// configured number of replans is used up.
pub struct PlanningStage;

impl PlanningStage {
    fn build_plan(ctx: &CoordinatorContext, items: &[WorkItem]) -> std::result::Result<ExecutionPlan, PlanningError> {
        if items.is_empty() {
            return Err(PlanningError::new("plan contains no work items"));
        }

        for item in items {
            let role = ctx.registry.get(&item.role).map_err(|_| PlanningError {
                reason: format!("unknown role {} for {}", item.role, item.id),
                items: vec![item.id.clone()],
            })?;
            if !role.permits(Action::Implement) {
                return Err(PlanningError {
                    reason: format!("role {} cannot implement {}", role.id, item.id),
                    items: vec![item.id.clone()],
                });
            }
        }

        FileOwnershipPlanner::plan(items)
    }

    fn feedback(error: &PlanningError) -> String {
        if error.items.is_empty() {
            error.to_string()
        } else {
            format!("{} (items: {})", error, error.items.join(", "))
        }
    }
}

#[async_trait]
impl StageHandler for PlanningStage {
    fn stage(&self) -> Stage {
        Stage::Planning
    }

    async fn handle(&self, ctx: &CoordinatorContext, state: &mut RunState) -> Result<StageOutcome> {
        let planner = ctx.role(Role::PLANNER)?;
        let mut feedback = None;

        loop {
            let context = RoleContext::for_run(state, Action::Plan)
                .with_available_roles(ctx.registry.roles())
                .with_feedback(feedback.take())
                .briefed();

            let items = match ctx.dispatcher.dispatch(planner, &context).await? {
                RoleResult::Plan { items } => items,
                other => {
                    return Err(OrchestratorError::UnexpectedResult {
                        role: planner.id.clone(),
                        action: Action::Plan.as_str().to_string(),
                        got: other.kind().to_string(),
                    })
                }
            };

            match Self::build_plan(ctx, &items) {
                Ok(plan) => {
                    info!(
                        run_id = %state.id,
                        phases = plan.total_phases(),
                        items = plan.total_items(),
                        "Execution plan created"
                    );
                    ctx.emit_event(Event::PlanCreated {
                        run_id: state.id,
                        phases: plan.total_phases(),
                        items: plan.total_items(),
                    });
                    state.plan = Some(plan);
                    ctx.transition(state, Stage::Executing)?;
                    return Ok(StageOutcome::Advanced);
                }
                Err(error) if state.replans < ctx.config.max_replans => {
                    state.replans += 1;
                    warn!(
                        run_id = %state.id,
                        replan = state.replans,
                        error = %error,
                        "Plan rejected, asking planner again"
                    );
                    feedback = Some(Self::feedback(&error));
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::CoordinatorConfig;
    use crate::invoker::ScriptedInvoker;
    use crate::stages::test_support;

    fn planning_state() -> RunState {
        let mut state = RunState::new("Add dark mode");
        state.stage = Stage::Planning;
        state
    }

    fn plan(items: Vec<WorkItem>) -> RoleResult {
        RoleResult::Plan { items }
    }

    #[tokio::test]
    async fn test_plan_stored_and_stage_advanced() {
        let invoker = Arc::new(ScriptedInvoker::new().respond(
            Role::PLANNER,
            plan(vec![
                WorkItem::new("A", "a", Role::CODER_JR).with_files(["a.ts"]),
                WorkItem::new("B", "b", Role::DESIGNER).with_files(["b.css"]),
            ]),
        ));
        let ctx = test_support::context(invoker, CoordinatorConfig::default());
        let mut state = planning_state();

        let outcome = PlanningStage.handle(&ctx, &mut state).await.unwrap();

        assert_eq!(outcome, StageOutcome::Advanced);
        assert_eq!(state.stage, Stage::Executing);
        let plan = state.plan.unwrap();
        assert_eq!(plan.total_phases(), 1);
        assert_eq!(plan.phases[0].item_ids(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_planner_told_registered_roles() {
        let invoker = Arc::new(ScriptedInvoker::new().respond(
            Role::PLANNER,
            plan(vec![WorkItem::new("A", "a", Role::CODER_JR).with_files(["a.ts"])]),
        ));
        let ctx = test_support::context(invoker.clone(), CoordinatorConfig::default());
        let mut state = planning_state();

        PlanningStage.handle(&ctx, &mut state).await.unwrap();

        let calls = invoker.calls();
        assert_eq!(calls[0].context.available_roles, ctx.registry.roles());
        for role in ctx.registry.roles() {
            assert!(calls[0].context.brief.contains(&format!("- {}: ", role.id)));
        }
    }

    #[tokio::test]
    async fn test_replan_with_feedback() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .respond(
                    Role::PLANNER,
                    plan(vec![WorkItem::new("A", "a", Role::CODER_JR).depending_on(["A"])]),
                )
                .respond(
                    Role::PLANNER,
                    plan(vec![WorkItem::new("A", "a", Role::CODER_JR)]),
                ),
        );
        let ctx = test_support::context(invoker.clone(), CoordinatorConfig::default());
        let mut state = planning_state();

        PlanningStage.handle(&ctx, &mut state).await.unwrap();

        assert_eq!(state.replans, 1);
        assert_eq!(state.stage, Stage::Executing);
        assert_eq!(invoker.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_role_exhausts_replans() {
        let bad = || plan(vec![WorkItem::new("A", "a", "wizard")]);
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .respond(Role::PLANNER, bad())
                .respond(Role::PLANNER, bad()),
        );
        let config = CoordinatorConfig::default().with_max_replans(1);
        let ctx = test_support::context(invoker, config);
        let mut state = planning_state();

        let err = PlanningStage.handle(&ctx, &mut state).await.unwrap_err();

        assert_eq!(err.to_string(), "Planning failed: unknown role wizard for A");
        assert_eq!(state.stage, Stage::Planning);
        assert!(state.plan.is_none());
    }

    #[tokio::test]
    async fn test_role_without_write_permission_rejected() {
        let invoker = Arc::new(ScriptedInvoker::new().respond(
            Role::PLANNER,
            plan(vec![WorkItem::new("A", "a", Role::REVIEWER)]),
        ));
        let config = CoordinatorConfig::default().with_max_replans(0);
        let ctx = test_support::context(invoker, config);
        let mut state = planning_state();

        let err = PlanningStage.handle(&ctx, &mut state).await.unwrap_err();
        assert!(err.to_string().contains("role reviewer cannot implement A"));
    }

    #[tokio::test]
    async fn test_cycle_is_unsatisfiable() {
        let invoker = Arc::new(ScriptedInvoker::new().respond(
            Role::PLANNER,
            plan(vec![
                WorkItem::new("A", "a", Role::CODER_JR).depending_on(["B"]),
                WorkItem::new("B", "b", Role::CODER_JR).depending_on(["A"]),
            ]),
        ));
        let config = CoordinatorConfig::default().with_max_replans(0);
        let ctx = test_support::context(invoker, config);
        let mut state = planning_state();

        match PlanningStage.handle(&ctx, &mut state).await.unwrap_err() {
            OrchestratorError::Planning(error) => {
                assert!(error.is_unsatisfiable());
                assert_eq!(error.items, vec!["A", "B"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
