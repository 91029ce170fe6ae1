use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use handoff_core::{Action, Role};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::debug;

use super::{ExternalRoleInvoker, RoleContext, RoleResult};

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCall {
    pub role: String,
    pub action: Action,
    pub context: RoleContext,
    pub started_at: Instant,
}

impl ScriptedCall {
    pub fn task_id(&self) -> Option<&str> {
        self.context.task.as_ref().map(|t| t.id.as_str())
    }
}

/// Replays canned results per role, in order.
///
/// Used by tests and by the `replay` command. A role whose queue has run dry
/// answers with an error result.
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    queues: Mutex<HashMap<String, VecDeque<RoleResult>>>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<ScriptedCall>>,
}

#[derive(Deserialize)]
struct Script {
    #[serde(default)]
    responses: HashMap<String, Vec<RoleResult>>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `{"responses": {"<role>": [<result>, ...]}}`.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let script: Script = serde_json::from_str(json)?;
        let queues = script
            .responses
            .into_iter()
            .map(|(role, results)| (role, VecDeque::from(results)))
            .collect();
        Ok(Self {
            queues: Mutex::new(queues),
            ..Self::default()
        })
    }

    pub fn respond(self, role: impl Into<String>, result: RoleResult) -> Self {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(role.into())
            .or_default()
            .push_back(result);
        self
    }

    /// Delay every answer from `role`.
    pub fn with_delay(mut self, role: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(role.into(), delay);
        self
    }

    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Results not yet consumed, per role.
    pub fn remaining(&self, role: &str) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(role)
            .map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl ExternalRoleInvoker for ScriptedInvoker {
    async fn invoke(&self, role: &Role, context: &RoleContext) -> RoleResult {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ScriptedCall {
                role: role.id.clone(),
                action: context.action,
                context: context.clone(),
                started_at: Instant::now(),
            });

        if let Some(delay) = self.delays.get(&role.id) {
            tokio::time::sleep(*delay).await;
        }

        let next = self
            .queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&role.id)
            .and_then(VecDeque::pop_front);

        match next {
            Some(result) => {
                debug!(role = %role.id, result = %result.kind(), "Replaying scripted result");
                result
            }
            None => RoleResult::error(format!("no scripted result left for {}", role.id)),
        }
    }
}
