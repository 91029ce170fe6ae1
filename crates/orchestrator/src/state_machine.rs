use handoff_core::Stage;

use crate::error::{OrchestratorError, Result};

pub struct StageMachine;

impl StageMachine {
    pub fn validate_transition(from: &Stage, to: &Stage) -> Result<()> {
        let allowed = Self::allowed_transitions(from);

        if allowed.contains(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: &Stage) -> Vec<Stage> {
        match from {
            Stage::Clarifying => vec![Stage::Planning],
            Stage::Planning => vec![Stage::Executing],
            Stage::Executing => vec![Stage::Reviewing],
            Stage::Reviewing => vec![Stage::Debugging, Stage::Done],
            // A debug fix is always re-reviewed.
            Stage::Debugging => vec![Stage::Reviewing],
            Stage::Done => vec![],
        }
    }

    pub fn can_transition(from: &Stage, to: &Stage) -> bool {
        Self::validate_transition(from, to).is_ok()
    }
}
