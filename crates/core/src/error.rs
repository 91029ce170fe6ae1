use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("Duplicate role id: {0}")]
    DuplicateRole(String),

    #[error("Role {role} escalates to unknown role {target}")]
    UnknownEscalationTarget { role: String, target: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CoreError::RoleNotFound("coder-xl".to_string());
        assert!(error.to_string().contains("coder-xl"));

        let error = CoreError::UnknownEscalationTarget {
            role: "coder-jr".to_string(),
            target: "coder-xl".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Role coder-jr escalates to unknown role coder-xl"
        );
    }
}
