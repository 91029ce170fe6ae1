use handoff_core::CoreError;
use thiserror::Error;
use uuid::Uuid;

/// Reason the planner used for self-dependencies and dependency cycles.
pub const UNSATISFIABLE: &str = "unsatisfiable constraints";

/// Work items whose files or dependencies cannot be ordered into phases.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Planning failed: {reason}")]
pub struct PlanningError {
    pub reason: String,
    /// Work items involved, in input order.
    pub items: Vec<String>,
}

impl PlanningError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            items: Vec::new(),
        }
    }

    pub fn unsatisfiable(items: Vec<String>) -> Self {
        Self {
            reason: UNSATISFIABLE.to_string(),
            items,
        }
    }

    pub fn is_unsatisfiable(&self) -> bool {
        self.reason == UNSATISFIABLE
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid stage transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Clarification incomplete: {} question(s) outstanding", .questions.len())]
    ClarificationIncomplete { questions: Vec<String> },

    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error("Role {role} failed: {reason}")]
    RoleInvocation { role: String, reason: String },

    #[error("Role {role} timed out after {duration_ms}ms")]
    InvocationTimeout { role: String, duration_ms: u64 },

    #[error("Escalation required for {item_id}: {role} cannot continue ({reason})")]
    EscalationRequired {
        item_id: String,
        role: String,
        reason: String,
    },

    #[error("Permission violation by {role}: {detail}")]
    PermissionViolation { role: String, detail: String },

    #[error("Role {role} returned {got} while asked to {action}")]
    UnexpectedResult {
        role: String,
        action: String,
        got: String,
    },

    #[error("{count} blocker finding(s) unresolved after {cycles} debug cycle(s)")]
    UnresolvedBlockers { count: usize, cycles: u32 },

    #[error("Execution plan missing for run {0}")]
    PlanMissing(Uuid),

    #[error("Run cancelled by user")]
    Cancelled,

    #[error("Run {0} already finished")]
    RunFinished(Uuid),

    #[error("Run {run_id} halted: {reason}")]
    RunHalted { run_id: Uuid, reason: String },

    #[error("Run in stage {stage} is not waiting for {input}")]
    UnexpectedInput { stage: String, input: &'static str },

    #[error("Finding not found: {0}")]
    FindingNotFound(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl OrchestratorError {
    /// Create a role invocation failed error.
    pub fn role_failed(role: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RoleInvocation {
            role: role.into(),
            reason: reason.into(),
        }
    }

    /// Create a permission violation error.
    pub fn permission_violation(role: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::PermissionViolation {
            role: role.into(),
            detail: detail.into(),
        }
    }

    /// Whether another attempt with the same context may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RoleInvocation { .. } | Self::InvocationTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planning_error_display() {
        let error = PlanningError::unsatisfiable(vec!["A".to_string(), "B".to_string()]);
        assert!(error.is_unsatisfiable());
        assert_eq!(error.to_string(), "Planning failed: unsatisfiable constraints");

        let wrapped: OrchestratorError = error.into();
        assert_eq!(
            wrapped.to_string(),
            "Planning failed: unsatisfiable constraints"
        );
    }

    #[test]
    fn test_clarification_incomplete_counts_questions() {
        let error = OrchestratorError::ClarificationIncomplete {
            questions: vec!["Which page?".to_string(), "Which color?".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Clarification incomplete: 2 question(s) outstanding"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(OrchestratorError::role_failed("coder-jr", "boom").is_retryable());
        assert!(OrchestratorError::InvocationTimeout {
            role: "reviewer".to_string(),
            duration_ms: 10,
        }
        .is_retryable());
        assert!(!OrchestratorError::permission_violation("reviewer", "wrote a.ts").is_retryable());
        assert!(!OrchestratorError::Cancelled.is_retryable());
    }
}
