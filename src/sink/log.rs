//! Structured-log sink
//!
//! The always-on audit trail: every event is logged with its payload so
//! intermediate retries stay auditable without raising alarms.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::domain::MonitorEvent;

use super::EventSink;

pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, event: &MonitorEvent) {
        match event {
            MonitorEvent::NodeFailed(e) => {
                warn!(
                    node_id = %e.node_id,
                    failure_type = %e.failure_type,
                    consecutive_failures = e.consecutive_failures,
                    reason = e.reason.as_deref().unwrap_or("unknown"),
                    "node failed"
                );
            }
            MonitorEvent::NodeRecovered(e) => {
                info!(
                    node_id = %e.node_id,
                    probe = %e.probe_kind,
                    latency_ms = e.latency_ms,
                    "node recovered"
                );
            }
            MonitorEvent::RecoveryOutcome(e) => {
                if e.success {
                    info!(
                        node_id = %e.node_id,
                        action = %e.attempt.action_kind,
                        attempt = e.attempt.attempt_number,
                        "recovery validated"
                    );
                } else {
                    warn!(
                        node_id = %e.node_id,
                        action = %e.attempt.action_kind,
                        attempt = e.attempt.attempt_number,
                        detail = %e.attempt.detail,
                        "recovery attempt failed"
                    );
                }
            }
            MonitorEvent::Escalation(e) => {
                error!(
                    node_id = %e.node_id,
                    attempts = e.attempts,
                    reason = %e.reason,
                    "ESCALATION: automated recovery exhausted"
                );
            }
        }
    }
}
