//! Service restart action
//!
//! Renders the configured restart template against the node (default
//! `ssh {host} systemctl restart {service}`) and runs it through the
//! shared command runner.

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use crate::domain::{ActionKind, FailureType, NodeDescriptor, NodeKind};
use crate::error::ActionError;

use super::command::{render_template, run_command, CommandSpec};
use super::{ActionOutcome, RecoveryAction};

/// Hard ceiling for a single restart invocation. The executor applies the
/// configured action timeout on top; this bounds the child process itself.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ServiceRestartAction {
    template: String,
}

impl ServiceRestartAction {
    pub fn new(template: String) -> Self {
        Self { template }
    }
}

#[async_trait]
impl RecoveryAction for ServiceRestartAction {
    fn kind(&self) -> ActionKind {
        ActionKind::ServiceRestart
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
        info!(node_id = %node.node_id, %failure_type, command = %line, "restarting service");

        let spec = CommandSpec::parse(&line, COMMAND_TIMEOUT)?;
        let output = run_command(&spec).await?;
        Ok(ActionOutcome {
            success: output.succeeded(),
            exit_status: output.exit_status,
            detail: output.detail(),
        })
    }
}
