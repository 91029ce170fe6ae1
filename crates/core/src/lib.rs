//! Domain model shared by the delegation coordinator and its front ends.

pub mod domain;
pub mod error;

pub use domain::finding::{FindingSeverity, ReviewFinding};
pub use domain::role::{Action, Permission, Role, RoleRegistry};
pub use domain::run::{
    ContextSnapshot, DebugFix, EscalationEntry, RunState, Stage, WorkOutput,
};
pub use domain::work::{normalize_path, ExecutionPlan, Phase, WorkItem};
pub use error::{CoreError, Result};
