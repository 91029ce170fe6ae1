pub mod config;
pub mod context;
pub mod coordinator;
pub mod emitter;
pub mod error;
pub mod invoker;
pub mod planner;
pub mod prompts;
pub mod report;
pub mod repro;
pub mod stages;
pub mod state_machine;

pub use config::CoordinatorConfig;
pub use context::CancelHandle;
pub use coordinator::{DelegationCoordinator, RunOutcome};
pub use emitter::OrderedEventEmitter;
pub use error::{OrchestratorError, PlanningError, Result};
pub use invoker::{
    Dispatcher, ExternalRoleInvoker, RoleContext, RoleResult, ScriptedCall, ScriptedInvoker,
};
pub use planner::FileOwnershipPlanner;
pub use report::ReportFormatter;
pub use state_machine::StageMachine;
