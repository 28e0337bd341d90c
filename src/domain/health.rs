//! Health observation model
//!
//! A `HealthStatus` is produced fresh on every probe pass and never mutated.
//! The per-node `HealthRecord` holds the consecutive-failure counter and is
//! written only by the aggregator (single-writer invariant).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::node::{NodeKind, ProbeKind};
use super::recovery::Phase;

/// Coarse classification of a failed observation, used to select a
/// compatible recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    /// Could not reach the node at all (refused, unreachable, reset)
    Connectivity,
    /// Reached the node but the protocol exchange was malformed or rejected
    ProtocolError,
    /// Probe did not complete within its deadline
    Timeout,
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureType::Connectivity => write!(f, "connectivity"),
            FailureType::ProtocolError => write!(f, "protocol_error"),
            FailureType::Timeout => write!(f, "timeout"),
        }
    }
}

/// Result of one probe pass over a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub node_id: String,
    pub healthy: bool,
    pub observed_at: DateTime<Utc>,
    pub latency_ms: u64,
    /// Probe that produced the verdict: the first to succeed, or the first
    /// to report an error when every probe failed.
    pub probe_kind: ProbeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_type: Option<FailureType>,
}

/// Per-node failure counter, owned exclusively by the aggregator.
#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub node_id: String,
    pub consecutive_failures: u32,
    pub last_status: Option<HealthStatus>,
}

impl HealthRecord {
    pub fn new(node_id: String) -> Self {
        Self {
            node_id,
            consecutive_failures: 0,
            last_status: None,
        }
    }
}

/// Health-state edge emitted by the aggregator and consumed, in arrival
/// order, by the node's recovery state machine.
#[derive(Debug, Clone)]
pub enum HealthTransition {
    /// Consecutive failures first reached the failure threshold.
    Failed {
        status: HealthStatus,
        failure_type: FailureType,
        consecutive_failures: u32,
    },
    /// Failures observed but still below the threshold. Internal only,
    /// never surfaced as a failure event.
    Degraded {
        status: HealthStatus,
        consecutive_failures: u32,
    },
    /// Healthy observation after one or more failures.
    Recovered { status: HealthStatus },
}

/// Point-in-time view of one node, fed to the status endpoint and the
/// one-shot `check` command.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub node_id: String,
    pub kind: NodeKind,
    pub phase: Phase,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub attempt_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_observed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_in_secs: Option<u64>,
}

impl NodeSnapshot {
    pub fn new(node_id: String, kind: NodeKind) -> Self {
        Self {
            node_id,
            kind,
            phase: Phase::Healthy,
            healthy: true,
            consecutive_failures: 0,
            attempt_count: 0,
            last_observed_at: None,
            last_error: None,
            next_retry_in_secs: None,
        }
    }
}

/// Node-id-indexed snapshot arena. Per-entry locking only, so one node's
/// update never contends with another's.
pub type SnapshotMap = Arc<DashMap<String, NodeSnapshot>>;
