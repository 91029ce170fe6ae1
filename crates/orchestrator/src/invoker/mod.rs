//! Boundary to the external capability that performs each role's work.
//!
//! The coordinator never reasons about code itself. It hands a [`RoleContext`]
//! to an [`ExternalRoleInvoker`] and interprets the [`RoleResult`] it gets
//! back. [`Dispatcher`] wraps the invoker with permission checks, timeouts
//! and the retry policy; [`ScriptedInvoker`] is a deterministic stand-in.

mod dispatch;
mod scripted;

pub use dispatch::Dispatcher;
pub use scripted::{ScriptedCall, ScriptedInvoker};

use async_trait::async_trait;
use handoff_core::{
    Action, EscalationEntry, ExecutionPlan, ReviewFinding, Role, RunState, WorkItem, WorkOutput,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::prompts::RolePrompts;

/// Performs a role's work. Implementations may call a hosted model, a human,
/// or a script; the coordinator assumes nothing about latency or determinism.
#[async_trait]
pub trait ExternalRoleInvoker: Send + Sync {
    async fn invoke(&self, role: &Role, context: &RoleContext) -> RoleResult;
}

/// Everything a role is told about the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleContext {
    pub run_id: Uuid,
    pub action: Action,
    pub request: String,
    pub conversation: Vec<String>,
    pub task: Option<WorkItem>,
    pub file_scope: Vec<String>,
    pub plan_outline: Option<String>,
    /// Partial output left by a lower role before escalating.
    pub prior_output: Option<String>,
    /// Why the previous attempt at this action was rejected.
    pub feedback: Option<String>,
    pub artifacts: Vec<WorkOutput>,
    pub findings: Vec<ReviewFinding>,
    pub escalation_trail: Vec<EscalationEntry>,
    /// Line that ends clarification.
    pub sentinel: Option<String>,
    /// Roles a plan may assign work to.
    pub available_roles: Vec<Role>,
    /// Natural-language instructions rendered from the fields above.
    pub brief: String,
}

impl RoleContext {
    pub fn new(run_id: Uuid, action: Action, request: impl Into<String>) -> Self {
        Self {
            run_id,
            action,
            request: request.into(),
            conversation: Vec::new(),
            task: None,
            file_scope: Vec::new(),
            plan_outline: None,
            prior_output: None,
            feedback: None,
            artifacts: Vec::new(),
            findings: Vec::new(),
            escalation_trail: Vec::new(),
            sentinel: None,
            available_roles: Vec::new(),
            brief: String::new(),
        }
    }

    /// Context seeded with the request and conversation of a run.
    pub fn for_run(state: &RunState, action: Action) -> Self {
        let mut context = Self::new(state.id, action, state.request.clone());
        context.conversation = state.conversation.clone();
        context.plan_outline = state.plan.as_ref().map(ExecutionPlan::outline);
        context
    }

    pub fn with_task(mut self, task: &WorkItem) -> Self {
        self.file_scope = task.normalized_files();
        self.task = Some(task.clone());
        self
    }

    pub fn with_plan_outline(mut self, outline: impl Into<String>) -> Self {
        self.plan_outline = Some(outline.into());
        self
    }

    pub fn with_prior_output(mut self, output: Option<String>) -> Self {
        self.prior_output = output;
        self
    }

    pub fn with_feedback(mut self, feedback: Option<String>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn with_artifacts(mut self, artifacts: Vec<WorkOutput>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_findings(mut self, findings: Vec<ReviewFinding>) -> Self {
        self.findings = findings;
        self
    }

    pub fn with_escalation_trail(mut self, trail: Vec<EscalationEntry>) -> Self {
        self.escalation_trail = trail;
        self
    }

    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = Some(sentinel.into());
        self
    }

    pub fn with_available_roles(mut self, roles: &[Role]) -> Self {
        self.available_roles = roles.to_vec();
        self
    }

    /// Render the brief; call once every other field is set.
    pub fn briefed(mut self) -> Self {
        self.brief = RolePrompts::brief(&self);
        self
    }
}

/// What a role reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoleResult {
    ClarificationNeeded {
        questions: Vec<String>,
    },
    Plan {
        items: Vec<WorkItem>,
    },
    Findings {
        findings: Vec<ReviewFinding>,
    },
    Completion {
        summary: String,
        #[serde(default)]
        files_changed: Vec<String>,
    },
    /// The work exceeds what the role is declared capable of.
    EscalationRequired {
        reason: String,
        #[serde(default)]
        partial_output: Option<String>,
    },
    /// Hard failure of the capability itself.
    Error {
        reason: String,
    },
}

impl RoleResult {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClarificationNeeded { .. } => "clarification_needed",
            Self::Plan { .. } => "plan",
            Self::Findings { .. } => "findings",
            Self::Completion { .. } => "completion",
            Self::EscalationRequired { .. } => "escalation_required",
            Self::Error { .. } => "error",
        }
    }

    pub fn completion(summary: impl Into<String>, files_changed: &[&str]) -> Self {
        Self::Completion {
            summary: summary.into(),
            files_changed: files_changed.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    /// Result variants a role may answer `action` with.
    pub fn expected_for(action: Action) -> &'static [&'static str] {
        match action {
            Action::Clarify => &["clarification_needed", "completion"],
            Action::Plan => &["plan"],
            Action::Implement => &["completion", "escalation_required"],
            Action::Review => &["findings", "completion"],
            Action::Debug => &["completion", "escalation_required"],
        }
    }
}
