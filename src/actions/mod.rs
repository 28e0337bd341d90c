//! Recovery action plugin boundary
//!
//! Actions declare the node kinds and failure types they can handle and are
//! resolved into a fixed dispatch table at startup. All built-ins shell out
//! through the shared command runner, which owns timeout enforcement and
//! output capture.

pub mod command;
pub mod orchestrator;
pub mod script;
pub mod service_restart;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ActionsConfig;
use crate::domain::{ActionKind, FailureType, NodeDescriptor, NodeKind};
use crate::error::ActionError;

pub use command::{run_command, CommandOutput, CommandSpec};
pub use orchestrator::OrchestratorAction;
pub use script::ScriptAction;
pub use service_restart::ServiceRestartAction;

/// What an action reports after running.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    /// Whether the action itself completed successfully
    pub success: bool,
    pub exit_status: Option<i32>,
    /// Captured stdout/stderr or structured diagnostic
    pub detail: String,
}

/// One concrete recovery capability.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RecoveryAction: Send + Sync {
    fn kind(&self) -> ActionKind;

    /// Node kinds this action can recover.
    fn supports(&self, kind: NodeKind) -> bool;

    /// Failure types this action is worth attempting for.
    fn supported_failure_types(&self) -> Vec<FailureType>;

    /// Run the action against the node. An `Err` means the action could not
    /// be invoked at all; it still consumes a retry attempt.
    async fn run(
        &self,
        node: &NodeDescriptor,
        failure_type: FailureType,
    ) -> Result<ActionOutcome, ActionError>;
}

/// Fixed action dispatch table, built once at startup from configuration.
pub struct ActionRegistry {
    actions: HashMap<ActionKind, Arc<dyn RecoveryAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Build the registry from the actions section of the configuration.
    /// Orchestrator and script actions are only present when configured.
    pub fn from_config(cfg: &ActionsConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ServiceRestartAction::new(
            cfg.restart_command.clone(),
        )));
        if let Some(template) = &cfg.orchestrator_command {
            registry.register(Arc::new(OrchestratorAction::new(template.clone())));
        }
        if let Some(path) = &cfg.script_path {
            registry.register(Arc::new(ScriptAction::new(path.clone())));
        }
        registry
    }

    /// Register an action, replacing any existing one of the same kind.
    pub fn register(&mut self, action: Arc<dyn RecoveryAction>) {
        self.actions.insert(action.kind(), action);
    }

    pub fn get(&self, kind: ActionKind) -> Option<Arc<dyn RecoveryAction>> {
        self.actions.get(&kind).cloned()
    }

    /// Whether the node has at least one registered action for its kind.
    pub fn has_applicable(&self, node: &NodeDescriptor) -> bool {
        node.action_kinds
            .iter()
            .filter_map(|kind| self.get(*kind))
            .any(|action| action.supports(node.kind))
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
