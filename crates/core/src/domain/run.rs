use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::finding::ReviewFinding;
use super::work::{ExecutionPlan, WorkItem};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Clarifying,
    Planning,
    Executing,
    Reviewing,
    Debugging,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clarifying => "clarifying",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Reviewing => "reviewing",
            Self::Debugging => "debugging",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a role reported back for a completed work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOutput {
    pub item_id: String,
    /// Role that finished the item (the escalated one, if any).
    pub role: String,
    pub summary: String,
    pub files_changed: Vec<String>,
}

/// Everything an escalated role needs to continue instead of restarting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub task: WorkItem,
    pub plan_outline: String,
    pub partial_output: Option<String>,
    pub failure_reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationEntry {
    pub item_id: String,
    pub from_role: String,
    pub to_role: String,
    pub reason: String,
    pub snapshot: ContextSnapshot,
}

/// A fix reported by the debugger role for one or more blocker findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugFix {
    pub finding_ids: Vec<String>,
    pub summary: String,
    pub files_changed: Vec<String>,
}

/// The single mutable object of a delegation run.
///
/// Only the coordinator mutates it. Collections are ordered so the same state
/// always renders the same report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub id: Uuid,
    pub request: String,
    /// User answers received while clarifying, oldest first.
    pub conversation: Vec<String>,
    pub stage: Stage,
    pub pending_questions: Vec<String>,
    pub plan: Option<ExecutionPlan>,
    pub outputs: BTreeMap<String, WorkOutput>,
    pub failures: BTreeMap<String, String>,
    pub findings: Vec<ReviewFinding>,
    pub accepted_findings: BTreeSet<String>,
    pub escalations: Vec<EscalationEntry>,
    pub debug_fixes: Vec<DebugFix>,
    pub review_cycles: u32,
    pub replans: u32,
    /// Unreproducible blockers were reported and wait on the user.
    #[serde(default)]
    pub awaiting_acceptance: bool,
    pub halted: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request: request.into(),
            conversation: Vec::new(),
            stage: Stage::default(),
            pending_questions: Vec::new(),
            plan: None,
            outputs: BTreeMap::new(),
            failures: BTreeMap::new(),
            findings: Vec::new(),
            accepted_findings: BTreeSet::new(),
            escalations: Vec::new(),
            debug_fixes: Vec::new(),
            review_cycles: 0,
            replans: 0,
            awaiting_acceptance: false,
            halted: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn is_completed(&self, item_id: &str) -> bool {
        self.outputs.contains_key(item_id)
    }

    pub fn completed_ids(&self) -> Vec<String> {
        self.outputs.keys().cloned().collect()
    }

    /// Every file touched so far, by work items and debug fixes.
    pub fn changed_files(&self) -> BTreeSet<String> {
        self.outputs
            .values()
            .flat_map(|o| o.files_changed.iter())
            .chain(self.debug_fixes.iter().flat_map(|f| f.files_changed.iter()))
            .cloned()
            .collect()
    }

    /// Blocker findings the user has not accepted.
    pub fn unresolved_blockers(&self) -> Vec<&ReviewFinding> {
        self.findings
            .iter()
            .filter(|f| f.is_blocker() && !self.accepted_findings.contains(&f.id))
            .collect()
    }
}
