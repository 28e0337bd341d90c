//! Events handed to the sink boundary
//!
//! Value objects only: the engine never retains them past emission.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::health::FailureType;
use super::node::{NodeKind, ProbeKind};
use super::recovery::RecoveryAttempt;

/// A node crossed the failure threshold.
#[derive(Debug, Clone, Serialize)]
pub struct FailureEvent {
    pub node_id: String,
    pub kind: NodeKind,
    pub failure_type: FailureType,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub observed_at: DateTime<Utc>,
}

/// A previously unhealthy node was observed healthy again.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveredEvent {
    pub node_id: String,
    pub kind: NodeKind,
    pub probe_kind: ProbeKind,
    pub latency_ms: u64,
    pub observed_at: DateTime<Utc>,
}

/// Result of one recovery attempt, after validation.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryOutcomeEvent {
    pub node_id: String,
    /// Whether the post-action validation check found the node healthy
    pub success: bool,
    pub attempt: RecoveryAttempt,
    pub at: DateTime<Utc>,
}

/// Automated recovery exhausted; operator attention required.
#[derive(Debug, Clone, Serialize)]
pub struct EscalationEvent {
    pub node_id: String,
    pub kind: NodeKind,
    pub attempts: u32,
    pub reason: String,
    /// Full attempt history for the notification payload
    pub history: Vec<RecoveryAttempt>,
    pub at: DateTime<Utc>,
}

/// Envelope delivered to every registered sink.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    NodeFailed(FailureEvent),
    NodeRecovered(RecoveredEvent),
    RecoveryOutcome(RecoveryOutcomeEvent),
    Escalation(EscalationEvent),
}

impl MonitorEvent {
    pub fn node_id(&self) -> &str {
        match self {
            MonitorEvent::NodeFailed(e) => &e.node_id,
            MonitorEvent::NodeRecovered(e) => &e.node_id,
            MonitorEvent::RecoveryOutcome(e) => &e.node_id,
            MonitorEvent::Escalation(e) => &e.node_id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MonitorEvent::NodeFailed(_) => "node_failed",
            MonitorEvent::NodeRecovered(_) => "node_recovered",
            MonitorEvent::RecoveryOutcome(_) => "recovery_outcome",
            MonitorEvent::Escalation(_) => "escalation",
        }
    }

    pub fn is_escalation(&self) -> bool {
        matches!(self, MonitorEvent::Escalation(_))
    }

    /// Dedup key for sink-side rate limiting.
    pub fn rate_key(&self) -> String {
        format!("{}:{}", self.label(), self.node_id())
    }
}
