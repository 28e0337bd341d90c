//! Recovery action executor
//!
//! Runs a chosen action under a hard deadline and always comes back with a
//! fully populated attempt record, whatever the action did. The executor
//! also remembers whether the action was actually invoked: an action that
//! never started skips validation, but still consumes the attempt.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;

use crate::actions::RecoveryAction;
use crate::domain::{FailureType, NodeDescriptor, RecoveryAttempt};

/// Attempt record plus whether the action ran at all.
#[derive(Debug, Clone)]
pub struct ExecutedAttempt {
    pub attempt: RecoveryAttempt,
    /// False when the action could not be invoked (spawn failure,
    /// misconfiguration); true for anything that actually started,
    /// including runs killed on timeout.
    pub invoked: bool,
}

pub struct ActionExecutor {
    timeout: Duration,
}

impl ActionExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Execute one recovery attempt. Never errors and never outlives the
    /// configured deadline by more than the cancellation itself.
    pub async fn execute(
        &self,
        node: &NodeDescriptor,
        action: Arc<dyn RecoveryAction>,
        attempt_number: u32,
        failure_type: FailureType,
    ) -> ExecutedAttempt {
        let started_at = Utc::now();
        let action_kind = action.kind();

        let (success, exit_status, detail, invoked) =
            match tokio::time::timeout(self.timeout, action.run(node, failure_type)).await {
                Ok(Ok(outcome)) => (
                    outcome.success,
                    outcome.exit_status,
                    outcome.detail,
                    true,
                ),
                Ok(Err(err)) => {
                    error!(
                        node_id = %node.node_id,
                        action = %action_kind,
                        "action could not be invoked: {err}"
                    );
                    (false, None, format!("invocation failed: {err}"), false)
                }
                Err(_) => {
                    warn!(
                        node_id = %node.node_id,
                        action = %action_kind,
                        timeout_secs = self.timeout.as_secs(),
                        "action timed out; terminated"
                    );
                    (
                        false,
                        None,
                        format!("timed out after {}s; terminated", self.timeout.as_secs()),
                        true,
                    )
                }
            };

        ExecutedAttempt {
            attempt: RecoveryAttempt {
                id: Uuid::new_v4(),
                node_id: node.node_id.clone(),
                action_kind,
                attempt_number,
                started_at,
                ended_at: Utc::now(),
                exit_status,
                success,
                detail,
            },
            invoked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionOutcome, MockRecoveryAction};
    use crate::domain::{ActionKind, NodeAddress, NodeKind};
    use crate::error::ActionError;

    fn node() -> NodeDescriptor {
        NodeDescriptor {
            node_id: "kafka-1".to_string(),
            kind: NodeKind::Broker,
            address: NodeAddress {
                host: "127.0.0.1".to_string(),
                port: 9092,
                admin_port: None,
            },
            probe_kinds: vec![],
            action_kinds: vec![ActionKind::ServiceRestart],
            retry_policy: None,
        }
    }

    #[tokio::test]
    async fn successful_action_yields_successful_attempt() {
        let mut action = MockRecoveryAction::new();
        action
            .expect_kind()
            .return_const(ActionKind::ServiceRestart);
        action.expect_run().returning(|_, _| {
            Ok(ActionOutcome {
                success: true,
                exit_status: Some(0),
                detail: "restarted".to_string(),
            })
        });

        let executor = ActionExecutor::new(Duration::from_secs(60));
        let executed = executor
            .execute(&node(), Arc::new(action), 1, FailureType::Connectivity)
            .await;

        assert!(executed.invoked);
        assert!(executed.attempt.success);
        assert_eq!(executed.attempt.attempt_number, 1);
        assert_eq!(executed.attempt.exit_status, Some(0));
    }

    #[tokio::test]
    async fn invocation_error_is_marked_not_invoked() {
        let mut action = MockRecoveryAction::new();
        action
            .expect_kind()
            .return_const(ActionKind::ServiceRestart);
        action.expect_run().returning(|_, _| {
            Err(ActionError::Misconfigured("no template".to_string()))
        });

        let executor = ActionExecutor::new(Duration::from_secs(60));
        let executed = executor
            .execute(&node(), Arc::new(action), 2, FailureType::Timeout)
            .await;

        assert!(!executed.invoked);
        assert!(!executed.attempt.success);
        assert!(executed.attempt.detail.contains("invocation failed"));
    }

    /// Hand-written stub: an action that never finishes.
    struct HangingAction;

    #[async_trait::async_trait]
    impl RecoveryAction for HangingAction {
        fn kind(&self) -> ActionKind {
            ActionKind::ServiceRestart
        }

        fn supports(&self, _kind: NodeKind) -> bool {
            true
        }

        fn supported_failure_types(&self) -> Vec<FailureType> {
            vec![FailureType::Connectivity]
        }

        async fn run(
            &self,
            _node: &NodeDescriptor,
            _failure_type: FailureType,
        ) -> Result<ActionOutcome, ActionError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_action_is_cut_off_at_the_deadline() {
        let action = HangingAction;
        let executor = ActionExecutor::new(Duration::from_secs(60));
        let started = tokio::time::Instant::now();
        let executed = executor
            .execute(&node(), Arc::new(action), 1, FailureType::Connectivity)
            .await;

        assert!(started.elapsed() >= Duration::from_secs(60));
        assert!(executed.invoked);
        assert!(!executed.attempt.success);
        assert!(executed.attempt.detail.contains("timed out"));
    }
}
