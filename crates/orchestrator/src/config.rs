use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Line the planner emits once it has everything it needs.
pub const DEFAULT_CLARIFICATION_SENTINEL: &str = "CLARIFICATION_COMPLETE";

/// Explicit bounds for a delegation run.
///
/// None of these are implied by the roles themselves; each run picks them
/// deliberately, falling back to the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub clarification_sentinel: String,
    /// Attempts per role invocation, the first one included.
    pub max_invocation_attempts: u32,
    pub invocation_timeout_ms: Option<u64>,
    /// Times a single work item may be handed to a higher role.
    pub max_escalation_depth: u32,
    /// Debug rounds allowed before unresolved blockers halt the run.
    pub max_review_cycles: u32,
    /// Planner retries after an unsatisfiable plan.
    pub max_replans: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            clarification_sentinel: DEFAULT_CLARIFICATION_SENTINEL.to_string(),
            max_invocation_attempts: 2,
            invocation_timeout_ms: None,
            max_escalation_depth: 2,
            max_review_cycles: 3,
            max_replans: 2,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.clarification_sentinel = sentinel.into();
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_invocation_attempts = attempts;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.invocation_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_max_escalation_depth(mut self, depth: u32) -> Self {
        self.max_escalation_depth = depth;
        self
    }

    pub fn with_max_review_cycles(mut self, cycles: u32) -> Self {
        self.max_review_cycles = cycles;
        self
    }

    pub fn with_max_replans(mut self, replans: u32) -> Self {
        self.max_replans = replans;
        self
    }

    /// Attempts per invocation, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_invocation_attempts.max(1)
    }

    pub fn invocation_timeout(&self) -> Option<Duration> {
        self.invocation_timeout_ms.map(Duration::from_millis)
    }

    /// Whether `output` carries the completion sentinel on a line of its own.
    pub fn is_clarification_complete(&self, output: &str) -> bool {
        output
            .lines()
            .any(|line| line.trim() == self.clarification_sentinel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.clarification_sentinel, "CLARIFICATION_COMPLETE");
        assert_eq!(config.attempts(), 2);
        assert!(config.invocation_timeout().is_none());
        assert_eq!(config.max_escalation_depth, 2);
    }

    #[test]
    fn test_config_builder() {
        let config = CoordinatorConfig::default()
            .with_sentinel("READY")
            .with_max_attempts(0)
            .with_timeout_ms(1500)
            .with_max_review_cycles(5);

        assert_eq!(config.attempts(), 1);
        assert_eq!(config.invocation_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.max_review_cycles, 5);
        assert!(config.is_clarification_complete("ok\nREADY\n"));
    }

    #[test]
    fn test_sentinel_must_be_exact_line() {
        let config = CoordinatorConfig::default();
        assert!(config.is_clarification_complete("  CLARIFICATION_COMPLETE  "));
        assert!(!config.is_clarification_complete("clarification_complete"));
        assert!(!config.is_clarification_complete("Is CLARIFICATION_COMPLETE yet?"));
        assert!(!config.is_clarification_complete("What color should the button be?"));
    }

    #[test]
    fn test_config_partial_deserialize() {
        let config: CoordinatorConfig =
            serde_json::from_str(r#"{"max_replans": 0, "invocation_timeout_ms": 30000}"#).unwrap();
        assert_eq!(config.max_replans, 0);
        assert_eq!(config.invocation_timeout_ms, Some(30000));
        assert_eq!(config.clarification_sentinel, DEFAULT_CLARIFICATION_SENTINEL);
    }
}
