use std::sync::Arc;

use events::Event;
use handoff_core::{normalize_path, Action, Permission, Role};
use tracing::{debug, warn};

use super::{ExternalRoleInvoker, RoleContext, RoleResult};
use crate::config::CoordinatorConfig;
use crate::emitter::OrderedEventEmitter;
use crate::error::{OrchestratorError, Result};

/// Sends work to the external invoker and vets what comes back.
///
/// Permissions are checked before the call and again against the result, so
/// a role can neither be asked nor allowed to act outside its declared set.
/// Hard failures and timeouts are retried up to the configured attempts.
#[derive(Clone)]
pub struct Dispatcher {
    invoker: Arc<dyn ExternalRoleInvoker>,
    config: CoordinatorConfig,
    emitter: Option<OrderedEventEmitter>,
}

impl Dispatcher {
    pub fn new(invoker: Arc<dyn ExternalRoleInvoker>, config: CoordinatorConfig) -> Self {
        Self {
            invoker,
            config,
            emitter: None,
        }
    }

    pub fn with_emitter(mut self, emitter: OrderedEventEmitter) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub async fn dispatch(&self, role: &Role, context: &RoleContext) -> Result<RoleResult> {
        let action = context.action;

        let missing = role.missing_permissions(action);
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(Permission::as_str).collect();
            return Err(self.violation(
                context,
                role,
                format!("cannot {} without {}", action.as_str(), names.join(", ")),
            ));
        }

        let result = self.invoke_with_retry(role, context).await?;
        self.check_result_permissions(role, context, &result)?;
        Self::check_result_shape(role, action, &result)?;

        debug!(
            role = %role.id,
            action = %action.as_str(),
            result = %result.kind(),
            "Role invocation accepted"
        );
        Ok(result)
    }

    async fn invoke_with_retry(&self, role: &Role, context: &RoleContext) -> Result<RoleResult> {
        let attempts = self.config.attempts();
        let mut attempt = 1;

        loop {
            let error = match self.invoke_once(role, context).await {
                Ok(RoleResult::Error { reason }) => OrchestratorError::role_failed(&role.id, reason),
                Ok(result) => return Ok(result),
                Err(e) => e,
            };

            if attempt >= attempts || !error.is_retryable() {
                return Err(error);
            }

            warn!(
                role = %role.id,
                attempt = attempt,
                error = %error,
                "Role invocation failed, retrying"
            );
            if let Some(ref emitter) = self.emitter {
                emitter.emit(Event::InvocationRetried {
                    run_id: context.run_id,
                    role: role.id.clone(),
                    attempt,
                    reason: error.to_string(),
                });
            }
            attempt += 1;
        }
    }

    async fn invoke_once(&self, role: &Role, context: &RoleContext) -> Result<RoleResult> {
        match self.config.invocation_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, self.invoker.invoke(role, context))
                .await
                .map_err(|_| OrchestratorError::InvocationTimeout {
                    role: role.id.clone(),
                    duration_ms: timeout.as_millis() as u64,
                }),
            None => Ok(self.invoker.invoke(role, context).await),
        }
    }

    fn check_result_permissions(
        &self,
        role: &Role,
        context: &RoleContext,
        result: &RoleResult,
    ) -> Result<()> {
        let needed = match result {
            RoleResult::ClarificationNeeded { .. } => Some(Permission::AskQuestions),
            RoleResult::Plan { .. } => Some(Permission::ProposePlan),
            RoleResult::Findings { .. } => Some(Permission::ReportFindings),
            RoleResult::Completion { files_changed, .. } if !files_changed.is_empty() => {
                Some(Permission::WriteFiles)
            }
            _ => None,
        };
        if let Some(permission) = needed {
            if !role.has(permission) {
                return Err(self.violation(
                    context,
                    role,
                    format!("returned {} without {}", result.kind(), permission.as_str()),
                ));
            }
        }

        // Implementers stay inside the files their work item owns.
        if let (Action::Implement, RoleResult::Completion { files_changed, .. }) =
            (context.action, result)
        {
            if let Some(ref task) = context.task {
                let outside: Vec<String> = files_changed
                    .iter()
                    .filter(|f| !task.owns_file(f))
                    .map(|f| normalize_path(f))
                    .collect();
                if !outside.is_empty() {
                    return Err(self.violation(
                        context,
                        role,
                        format!("{} changed files outside its scope: {}", task.id, outside.join(", ")),
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_result_shape(role: &Role, action: Action, result: &RoleResult) -> Result<()> {
        if RoleResult::expected_for(action).contains(&result.kind()) {
            Ok(())
        } else {
            Err(OrchestratorError::UnexpectedResult {
                role: role.id.clone(),
                action: action.as_str().to_string(),
                got: result.kind().to_string(),
            })
        }
    }

    fn violation(&self, context: &RoleContext, role: &Role, detail: String) -> OrchestratorError {
        warn!(role = %role.id, detail = %detail, "Permission violation");
        if let Some(ref emitter) = self.emitter {
            emitter.emit(Event::PermissionViolation {
                run_id: context.run_id,
                role: role.id.clone(),
                detail: detail.clone(),
            });
        }
        OrchestratorError::permission_violation(&role.id, detail)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
