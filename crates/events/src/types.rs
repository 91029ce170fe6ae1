//! Event types for the delegation event system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// Position of the event within its emitter, starting at 0
    pub sequence: u64,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(event: Event) -> Self {
        Self::sequenced(event, 0)
    }

    /// Create an envelope carrying an explicit sequence number
    pub fn sequenced(event: Event, sequence: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            timestamp: Utc::now(),
            event,
        }
    }
}

/// All possible events of a delegation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Run lifecycle
    /// A new run was created for a user request
    #[serde(rename = "run.started")]
    RunStarted { run_id: Uuid, request: String },

    /// The run moved to another stage
    #[serde(rename = "run.stage_changed")]
    StageChanged {
        run_id: Uuid,
        from_stage: String,
        to_stage: String,
    },

    /// The run reached Done or halted
    #[serde(rename = "run.finished")]
    RunFinished {
        run_id: Uuid,
        success: bool,
        reason: Option<String>,
    },

    // Clarification and planning
    /// The planner asked the user for more information
    #[serde(rename = "clarify.questions")]
    QuestionsRaised { run_id: Uuid, questions: Vec<String> },

    /// An execution plan was derived from the planner's work items
    #[serde(rename = "plan.created")]
    PlanCreated {
        run_id: Uuid,
        phases: usize,
        items: usize,
    },

    // Execution
    /// A phase started; its items are dispatched concurrently
    #[serde(rename = "phase.started")]
    PhaseStarted {
        run_id: Uuid,
        phase: u32,
        item_ids: Vec<String>,
    },

    /// Every item of a phase resolved
    #[serde(rename = "phase.completed")]
    PhaseCompleted {
        run_id: Uuid,
        phase: u32,
        failed: usize,
    },

    /// A work item was completed by a role
    #[serde(rename = "item.completed")]
    WorkItemCompleted {
        run_id: Uuid,
        item_id: String,
        role: String,
    },

    /// A work item could not be completed
    #[serde(rename = "item.failed")]
    WorkItemFailed {
        run_id: Uuid,
        item_id: String,
        reason: String,
    },

    /// A work item was handed to a higher-capability role
    #[serde(rename = "item.escalated")]
    EscalationRecorded {
        run_id: Uuid,
        item_id: String,
        from_role: String,
        to_role: String,
        reason: String,
    },

    // Role invocation
    /// A role invocation failed hard and is being retried
    #[serde(rename = "role.retried")]
    InvocationRetried {
        run_id: Uuid,
        role: String,
        attempt: u32,
        reason: String,
    },

    /// A role reported a side effect outside its permission set
    #[serde(rename = "role.permission_violation")]
    PermissionViolation {
        run_id: Uuid,
        role: String,
        detail: String,
    },

    // Review
    /// The reviewer reported findings
    #[serde(rename = "review.findings")]
    FindingsReported {
        run_id: Uuid,
        total: usize,
        blockers: usize,
    },
}

impl Event {
    /// Get the run ID associated with this event
    pub fn run_id(&self) -> Uuid {
        match self {
            Event::RunStarted { run_id, .. }
            | Event::StageChanged { run_id, .. }
            | Event::RunFinished { run_id, .. }
            | Event::QuestionsRaised { run_id, .. }
            | Event::PlanCreated { run_id, .. }
            | Event::PhaseStarted { run_id, .. }
            | Event::PhaseCompleted { run_id, .. }
            | Event::WorkItemCompleted { run_id, .. }
            | Event::WorkItemFailed { run_id, .. }
            | Event::EscalationRecorded { run_id, .. }
            | Event::InvocationRetried { run_id, .. }
            | Event::PermissionViolation { run_id, .. }
            | Event::FindingsReported { run_id, .. } => *run_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_envelope_creation() {
        let event = Event::RunStarted {
            run_id: Uuid::new_v4(),
            request: "Add login".to_string(),
        };
        let envelope = EventEnvelope::new(event);

        assert!(!envelope.id.is_nil());
        assert_eq!(envelope.sequence, 0);
        assert!(envelope.timestamp <= Utc::now());
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::StageChanged {
            run_id: Uuid::new_v4(),
            from_stage: "clarifying".to_string(),
            to_stage: "planning".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("run.stage_changed"));
        assert!(json.contains("from_stage"));
        assert!(json.contains("to_stage"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"item.completed","run_id":"550e8400-e29b-41d4-a716-446655440000","item_id":"T1","role":"coder-jr"}"#;
        let event: Event = serde_json::from_str(json).unwrap();

        match event {
            Event::WorkItemCompleted { item_id, role, .. } => {
                assert_eq!(item_id, "T1");
                assert_eq!(role, "coder-jr");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_run_id() {
        let run_id = Uuid::new_v4();

        let event = Event::EscalationRecorded {
            run_id,
            item_id: "T2".to_string(),
            from_role: "coder-jr".to_string(),
            to_role: "coder-sr".to_string(),
            reason: "needs a new module".to_string(),
        };
        assert_eq!(event.run_id(), run_id);
    }
}
