//! Operator-supplied recovery script
//!
//! Runs a configured script with the node's identity and the failure
//! classification as arguments, so one script can branch per scenario.

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use crate::domain::{ActionKind, FailureType, NodeDescriptor, NodeKind};
use crate::error::ActionError;

use super::command::{run_command, CommandSpec};
use super::{ActionOutcome, RecoveryAction};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

pub struct ScriptAction {
    path: String,
}

impl ScriptAction {
    pub fn new(path: String) -> Self {
        Self { path }
    }
}

#[async_trait]
impl RecoveryAction for ScriptAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Script
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
        info!(node_id = %node.node_id, %failure_type, script = %self.path, "running recovery script");

        let spec = CommandSpec {
            program: self.path.clone(),
            args: vec![
                node.node_id.clone(),
                node.address.host.clone(),
                node.address.port.to_string(),
                failure_type.to_string(),
            ],
            timeout: COMMAND_TIMEOUT,
        };
        let output = run_command(&spec).await?;
        Ok(ActionOutcome {
            success: output.succeeded(),
            exit_status: output.exit_status,
            detail: output.detail(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeAddress;

    #[tokio::test]
    async fn missing_script_is_an_invocation_error() {
        let action = ScriptAction::new("/nonexistent/recover.sh".to_string());
        let node = NodeDescriptor {
            node_id: "zk-3".to_string(),
            kind: NodeKind::CoordinationNode,
            address: NodeAddress {
                host: "127.0.0.1".to_string(),
                port: 2181,
                admin_port: None,
            },
            probe_kinds: vec![],
            action_kinds: vec![ActionKind::Script],
            retry_policy: None,
        };
        let err = action.run(&node, FailureType::Connectivity).await.unwrap_err();
        assert!(matches!(err, ActionError::Spawn { .. }));
    }
}
