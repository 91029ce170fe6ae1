use serde::{Deserialize, Serialize};

/// Severity level of a review finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    Blocker,
    Warning,
    Suggestion,
    Positive,
}

impl FindingSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocker => "blocker",
            Self::Warning => "warning",
            Self::Suggestion => "suggestion",
            Self::Positive => "positive",
        }
    }
}

/// A single finding reported by the reviewer role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFinding {
    pub id: String,
    pub severity: FindingSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub message: String,
    /// Stack trace, failing command or steps that reproduce the problem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reproduction: Option<String>,
}

impl ReviewFinding {
    pub fn new(id: impl Into<String>, severity: FindingSeverity, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            severity,
            file: None,
            message: message.into(),
            reproduction: None,
        }
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_reproduction(mut self, reproduction: impl Into<String>) -> Self {
        self.reproduction = Some(reproduction.into());
        self
    }

    pub fn is_blocker(&self) -> bool {
        self.severity == FindingSeverity::Blocker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_serialized_names() {
        for severity in [
            FindingSeverity::Blocker,
            FindingSeverity::Warning,
            FindingSeverity::Suggestion,
            FindingSeverity::Positive,
        ] {
            let json = serde_json::to_string(&severity).unwrap();
            assert_eq!(json, format!("\"{}\"", severity.as_str()));
        }
        assert!(serde_json::from_str::<FindingSeverity>("\"error\"").is_err());
    }

    #[test]
    fn test_finding_deserialize() {
        let finding: ReviewFinding = serde_json::from_str(
            r#"{"id":"F1","severity":"blocker","file":"a.ts","message":"crash"}"#,
        )
        .unwrap();
        assert!(finding.is_blocker());
        assert_eq!(finding.file.as_deref(), Some("a.ts"));
        assert!(finding.reproduction.is_none());
    }
}
