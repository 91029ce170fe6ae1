//! Stage handlers driving a run through its lifecycle.
//!
//! Each handler owns exactly one [`Stage`] and is the only code that moves a
//! run out of it:
//!
//! - [`ClarifyStage`] - gathers answers until the planner emits the sentinel
//! - [`PlanningStage`] - turns the planner's work items into phases
//! - [`ExecutionStage`] - fans each phase out to the assigned roles
//! - [`ReviewStage`] - collects findings and routes blockers
//! - [`DebugStage`] - hands reproducible blockers to the debugger

mod clarify;
mod debug;
mod execution;
mod planning;
mod review;

pub use clarify::ClarifyStage;
pub use debug::DebugStage;
pub use execution::ExecutionStage;
pub use planning::PlanningStage;
pub use review::ReviewStage;

use async_trait::async_trait;
use handoff_core::{ReviewFinding, RunState, Stage};

use crate::context::CoordinatorContext;
use crate::error::Result;

/// What a handler left the run waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage moved on; keep driving.
    Advanced,
    NeedsClarification(Vec<String>),
    AwaitingAcceptance(Vec<ReviewFinding>),
}

#[async_trait]
pub trait StageHandler: Send + Sync {
    fn stage(&self) -> Stage;

    async fn handle(&self, ctx: &CoordinatorContext, state: &mut RunState) -> Result<StageOutcome>;
}

/// Handler for `stage`; `Done` has none.
pub fn handler_for(stage: Stage) -> Option<Box<dyn StageHandler>> {
    match stage {
        Stage::Clarifying => Some(Box::new(ClarifyStage)),
        Stage::Planning => Some(Box::new(PlanningStage)),
        Stage::Executing => Some(Box::new(ExecutionStage)),
        Stage::Reviewing => Some(Box::new(ReviewStage)),
        Stage::Debugging => Some(Box::new(DebugStage)),
        Stage::Done => None,
    }
}
