//! External orchestration action
//!
//! Delegates recovery to the cluster's orchestration tooling (replace the
//! instance, reschedule the unit) via a configured command template.

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use crate::domain::{ActionKind, FailureType, NodeDescriptor, NodeKind};
use crate::error::ActionError;

use super::command::{render_template, run_command, CommandSpec};
use super::{ActionOutcome, RecoveryAction};

/// Orchestration commands (reprovisioning, rescheduling) get longer to run
/// than a plain service restart.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

pub struct OrchestratorAction {
    template: String,
}

impl OrchestratorAction {
    pub fn new(template: String) -> Self {
        Self { template }
    }
}

#[async_trait]
impl RecoveryAction for OrchestratorAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Orchestrator
    }

    fn supports(&self, _kind: NodeKind) -> bool {
        true
    }

    fn supported_failure_types(&self) -> Vec<FailureType> {
        vec![
            FailureType::Connectivity,
            FailureType::ProtocolError,
            FailureType::Timeout,
        ]
    }

    async fn run(
        &self,
        node: &NodeDescriptor,
        failure_type: FailureType,
    ) -> Result<ActionOutcome, ActionError> {
        let line = render_template(&self.template, node);
        info!(node_id = %node.node_id, %failure_type, command = %line, "invoking orchestrator");

        let spec = CommandSpec::parse(&line, COMMAND_TIMEOUT)?;
        let output = run_command(&spec).await?;
        Ok(ActionOutcome {
            success: output.succeeded(),
            exit_status: output.exit_status,
            detail: output.detail(),
        })
    }
}
