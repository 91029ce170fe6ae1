use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A side effect a role is allowed to perform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadFiles,
    WriteFiles,
    RunCommands,
    AskQuestions,
    ProposePlan,
    ReportFindings,
    ImplementFixes,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadFiles => "read_files",
            Self::WriteFiles => "write_files",
            Self::RunCommands => "run_commands",
            Self::AskQuestions => "ask_questions",
            Self::ProposePlan => "propose_plan",
            Self::ReportFindings => "report_findings",
            Self::ImplementFixes => "implement_fixes",
        }
    }
}

/// What the coordinator is asking a role to do.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Clarify,
    Plan,
    Implement,
    Review,
    Debug,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clarify => "clarify",
            Self::Plan => "plan",
            Self::Implement => "implement",
            Self::Review => "review",
            Self::Debug => "debug",
        }
    }

    /// Permissions a role must hold before the action is dispatched to it.
    pub fn required_permissions(&self) -> &'static [Permission] {
        match self {
            Self::Clarify => &[Permission::AskQuestions],
            Self::Plan => &[Permission::ProposePlan],
            Self::Implement => &[Permission::WriteFiles],
            Self::Review => &[Permission::ReportFindings],
            Self::Debug => &[Permission::ImplementFixes, Permission::WriteFiles],
        }
    }
}

/// A named responsibility boundary with a declared permission set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub can_write_code: bool,
    #[serde(default)]
    pub can_block_completion: bool,
    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
    /// Higher-capability role that takes over when this one escalates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalates_to: Option<String>,
}

impl Role {
    pub const PLANNER: &'static str = "planner";
    pub const CODER_JR: &'static str = "coder-jr";
    pub const CODER_SR: &'static str = "coder-sr";
    pub const DESIGNER: &'static str = "designer";
    pub const REVIEWER: &'static str = "reviewer";
    pub const DEBUGGER: &'static str = "debugger";

    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            can_write_code: false,
            can_block_completion: false,
            permissions: BTreeSet::new(),
            escalates_to: None,
        }
    }

    pub fn with_permissions(mut self, permissions: &[Permission]) -> Self {
        self.permissions.extend(permissions.iter().copied());
        self.can_write_code = self.permissions.contains(&Permission::WriteFiles);
        self
    }

    pub fn blocking(mut self) -> Self {
        self.can_block_completion = true;
        self
    }

    pub fn escalating_to(mut self, target: impl Into<String>) -> Self {
        self.escalates_to = Some(target.into());
        self
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn missing_permissions(&self, action: Action) -> Vec<Permission> {
        action
            .required_permissions()
            .iter()
            .copied()
            .filter(|p| !self.has(*p))
            .collect()
    }

    pub fn permits(&self, action: Action) -> bool {
        self.missing_permissions(action).is_empty()
    }
}

/// Static table of roles. Read-only once built.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    roles: Vec<Role>,
    index: HashMap<String, usize>,
}

impl RoleRegistry {
    pub fn new(roles: Vec<Role>) -> Result<Self> {
        let mut index = HashMap::with_capacity(roles.len());
        for (i, role) in roles.iter().enumerate() {
            if index.insert(role.id.clone(), i).is_some() {
                return Err(CoreError::DuplicateRole(role.id.clone()));
            }
        }

        let registry = Self { roles, index };
        registry.validate_escalations()?;
        Ok(registry)
    }

    /// The six roles every run can rely on.
    pub fn standard() -> Self {
        let roles = Self::standard_roles();
        let index = roles
            .iter()
            .enumerate()
            .map(|(i, role)| (role.id.clone(), i))
            .collect();
        Self { roles, index }
    }

    /// Standard roles plus `extra`; an extra role with a standard id replaces it.
    pub fn extend_standard(extra: Vec<Role>) -> Result<Self> {
        let mut roles = Self::standard_roles();
        for role in extra {
            match roles.iter_mut().find(|r| r.id == role.id) {
                Some(existing) => *existing = role,
                None => roles.push(role),
            }
        }
        Self::new(roles)
    }

    fn standard_roles() -> Vec<Role> {
        use Permission::*;

        vec![
            Role::new(Role::PLANNER, "Clarifies the request and produces the work plan")
                .with_permissions(&[ReadFiles, AskQuestions, ProposePlan]),
            Role::new(Role::CODER_JR, "Simple, well-scoped fixes")
                .with_permissions(&[ReadFiles, WriteFiles, RunCommands])
                .escalating_to(Role::CODER_SR),
            Role::new(Role::CODER_SR, "Complex or architectural implementation work")
                .with_permissions(&[ReadFiles, WriteFiles, RunCommands]),
            Role::new(Role::DESIGNER, "User interface and styling work")
                .with_permissions(&[ReadFiles, WriteFiles])
                .escalating_to(Role::CODER_SR),
            Role::new(Role::REVIEWER, "Reviews produced artifacts, never edits them")
                .with_permissions(&[ReadFiles, RunCommands, ReportFindings])
                .blocking(),
            Role::new(Role::DEBUGGER, "Reproduces and fixes blocker findings")
                .with_permissions(&[ReadFiles, WriteFiles, RunCommands, ImplementFixes]),
        ]
    }

    fn validate_escalations(&self) -> Result<()> {
        for role in &self.roles {
            let mut seen = HashSet::new();
            seen.insert(role.id.as_str());
            let mut current = role;
            while let Some(target) = current.escalates_to.as_deref() {
                let next = self.get(target).map_err(|_| CoreError::UnknownEscalationTarget {
                    role: current.id.clone(),
                    target: target.to_string(),
                })?;
                if !seen.insert(next.id.as_str()) {
                    return Err(CoreError::Validation(format!(
                        "escalation chain starting at {} loops back to {}",
                        role.id, next.id
                    )));
                }
                current = next;
            }
        }
        Ok(())
    }

    pub fn get(&self, role_id: &str) -> Result<&Role> {
        self.index
            .get(role_id)
            .map(|&i| &self.roles[i])
            .ok_or_else(|| CoreError::RoleNotFound(role_id.to_string()))
    }

    pub fn contains(&self, role_id: &str) -> bool {
        self.index.contains_key(role_id)
    }

    /// The role that takes over when `role` escalates, if any.
    pub fn escalation_target(&self, role: &Role) -> Option<&Role> {
        role.escalates_to
            .as_deref()
            .and_then(|id| self.get(id).ok())
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}

impl Default for RoleRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_lookup() {
        let registry = RoleRegistry::standard();
        assert_eq!(registry.roles().len(), 6);

        let planner = registry.get(Role::PLANNER).unwrap();
        assert!(!planner.can_write_code);
        assert!(planner.permits(Action::Clarify));
        assert!(planner.permits(Action::Plan));
        assert!(!planner.permits(Action::Implement));

        let reviewer = registry.get(Role::REVIEWER).unwrap();
        assert!(reviewer.can_block_completion);
        assert!(!reviewer.has(Permission::WriteFiles));
    }

    #[test]
    fn test_standard_table_passes_validation() {
        assert!(RoleRegistry::new(RoleRegistry::standard_roles()).is_ok());
    }

    #[test]
    fn test_get_unknown_role() {
        let registry = RoleRegistry::standard();
        assert_eq!(
            registry.get("oracle"),
            Err(CoreError::RoleNotFound("oracle".to_string()))
        );
    }

    #[test]
    fn test_duplicate_role_rejected() {
        let roles = vec![
            Role::new("a", "first"),
            Role::new("b", "second"),
            Role::new("a", "again"),
        ];
        assert_eq!(
            RoleRegistry::new(roles).unwrap_err(),
            CoreError::DuplicateRole("a".to_string())
        );
    }

    #[test]
    fn test_unknown_escalation_target_rejected() {
        let roles = vec![Role::new("a", "").escalating_to("missing")];
        assert!(matches!(
            RoleRegistry::new(roles),
            Err(CoreError::UnknownEscalationTarget { .. })
        ));
    }

    #[test]
    fn test_escalation_loop_rejected() {
        let roles = vec![
            Role::new("a", "").escalating_to("b"),
            Role::new("b", "").escalating_to("a"),
        ];
        assert!(matches!(
            RoleRegistry::new(roles),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_escalation_target() {
        let registry = RoleRegistry::standard();
        let jr = registry.get(Role::CODER_JR).unwrap();
        let sr = registry.escalation_target(jr).unwrap();
        assert_eq!(sr.id, Role::CODER_SR);
        assert!(registry.escalation_target(sr).is_none());
    }

    #[test]
    fn test_missing_permissions_for_debug() {
        let role = Role::new("fixer", "").with_permissions(&[Permission::WriteFiles]);
        assert_eq!(
            role.missing_permissions(Action::Debug),
            vec![Permission::ImplementFixes]
        );
    }

    #[test]
    fn test_extend_standard_overrides_and_adds() {
        let custom = Role::new(Role::DESIGNER, "Read-only design advice")
            .with_permissions(&[Permission::ReadFiles]);
        let extra = Role::new("docs-writer", "").with_permissions(&[Permission::WriteFiles]);

        let registry = RoleRegistry::extend_standard(vec![custom, extra]).unwrap();
        assert_eq!(registry.roles().len(), 7);
        assert!(!registry.get(Role::DESIGNER).unwrap().can_write_code);
        assert!(registry.contains("docs-writer"));
    }
}
