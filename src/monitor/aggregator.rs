//! Health aggregator
//!
//! Runs every applicable probe for a node concurrently and combines the
//! verdicts: the first success wins and short-circuits the rest; if all
//! probes fail, the node is unhealthy with the error of the probe that
//! reported first. Owns the per-node consecutive-failure counters
//! (single-writer: nothing else mutates a `HealthRecord`).

use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::{
    FailureType, HealthRecord, HealthStatus, HealthTransition, NodeDescriptor, NodeSnapshot,
    ProbeKind, SnapshotMap,
};
use crate::error::ProbeError;
use crate::probes::ProbeRegistry;

pub struct HealthAggregator {
    registry: Arc<ProbeRegistry>,
    records: DashMap<String, HealthRecord>,
    snapshots: SnapshotMap,
    probe_timeout: Duration,
    failure_threshold: u32,
}

impl HealthAggregator {
    pub fn new(
        registry: Arc<ProbeRegistry>,
        snapshots: SnapshotMap,
        probe_timeout: Duration,
        failure_threshold: u32,
    ) -> Self {
        Self {
            registry,
            records: DashMap::new(),
            snapshots,
            probe_timeout,
            failure_threshold,
        }
    }

    /// Regular-cycle observation: probe the node, fold the result into its
    /// health record, and return the transition if a state edge occurred.
    pub async fn observe(&self, node: &NodeDescriptor) -> Option<HealthTransition> {
        let status = self.probe_node(node).await;
        self.fold(node, status)
    }

    /// Out-of-band validation check after a recovery action. Success resets
    /// the failure counter (a verified-healthy transition); failure leaves
    /// the record untouched so the regular cycle keeps sole ownership of
    /// failure accounting.
    pub async fn verify(&self, node: &NodeDescriptor) -> HealthStatus {
        let status = self.probe_node(node).await;
        if status.healthy {
            if let Some(mut record) = self.records.get_mut(&node.node_id) {
                record.consecutive_failures = 0;
                record.last_status = Some(status.clone());
            }
            self.update_snapshot(&status, 0);
        }
        status
    }

    /// Run all applicable probes concurrently under the per-probe deadline.
    pub async fn probe_node(&self, node: &NodeDescriptor) -> HealthStatus {
        let probes = self.registry.applicable(node);
        let observed_at = Utc::now();

        let mut checks = FuturesUnordered::new();
        for probe in probes {
            let kind = probe.kind();
            let timeout = self.probe_timeout;
            checks.push(async move {
                let started = tokio::time::Instant::now();
                let verdict = match tokio::time::timeout(timeout, probe.check(node)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProbeError::Timeout(timeout)),
                };
                (kind, started.elapsed(), verdict)
            });
        }

        let mut first_error: Option<(ProbeKind, Duration, ProbeError)> = None;
        while let Some((kind, latency, verdict)) = checks.next().await {
            match verdict {
                Ok(()) => {
                    // First success short-circuits the remaining probes.
                    return HealthStatus {
                        node_id: node.node_id.clone(),
                        healthy: true,
                        observed_at,
                        latency_ms: latency.as_millis() as u64,
                        probe_kind: kind,
                        error: None,
                        failure_type: None,
                    };
                }
                Err(err) => {
                    debug!(node_id = %node.node_id, probe = %kind, "probe failed: {err}");
                    if first_error.is_none() {
                        first_error = Some((kind, latency, err));
                    }
                }
            }
        }

        match first_error {
            Some((kind, latency, err)) => HealthStatus {
                node_id: node.node_id.clone(),
                healthy: false,
                observed_at,
                latency_ms: latency.as_millis() as u64,
                probe_kind: kind,
                error: Some(err.to_string()),
                failure_type: Some(err.failure_type()),
            },
            // Startup validation guarantees at least one applicable probe;
            // reaching this is a topology bug, treated as unhealthy.
            None => {
                warn!(node_id = %node.node_id, "no applicable probes ran");
                HealthStatus {
                    node_id: node.node_id.clone(),
                    healthy: false,
                    observed_at,
                    latency_ms: 0,
                    probe_kind: node.probe_kinds.first().copied().unwrap_or(ProbeKind::Tcp),
                    error: Some("no applicable probes".to_string()),
                    failure_type: Some(FailureType::Connectivity),
                }
            }
        }
    }

    fn fold(&self, node: &NodeDescriptor, status: HealthStatus) -> Option<HealthTransition> {
        let mut record = self
            .records
            .entry(node.node_id.clone())
            .or_insert_with(|| HealthRecord::new(node.node_id.clone()));

        let transition = if status.healthy {
            let was_unhealthy = record.consecutive_failures > 0;
            record.consecutive_failures = 0;
            record.last_status = Some(status.clone());
            was_unhealthy.then(|| HealthTransition::Recovered {
                status: status.clone(),
            })
        } else {
            record.consecutive_failures += 1;
            record.last_status = Some(status.clone());
            let failures = record.consecutive_failures;
            let failure_type = status.failure_type.unwrap_or(FailureType::Connectivity);
            if failures == self.failure_threshold {
                Some(HealthTransition::Failed {
                    status: status.clone(),
                    failure_type,
                    consecutive_failures: failures,
                })
            } else if failures < self.failure_threshold {
                Some(HealthTransition::Degraded {
                    status: status.clone(),
                    consecutive_failures: failures,
                })
            } else {
                // Already past the threshold; the state machine is working
                // on it.
                None
            }
        };
        let failures = record.consecutive_failures;
        drop(record);

        self.update_snapshot(&status, failures);
        transition
    }

    fn update_snapshot(&self, status: &HealthStatus, consecutive_failures: u32) {
        if let Some(mut snapshot) = self.snapshots.get_mut(&status.node_id) {
            snapshot.healthy = status.healthy;
            snapshot.consecutive_failures = consecutive_failures;
            snapshot.last_observed_at = Some(status.observed_at);
            snapshot.last_error = status.error.clone();
        }
    }

    /// Seed a snapshot entry for a node (cold start assumes healthy).
    pub fn register_node(&self, node: &NodeDescriptor) {
        self.snapshots
            .entry(node.node_id.clone())
            .or_insert_with(|| NodeSnapshot::new(node.node_id.clone(), node.kind));
    }

    pub fn consecutive_failures(&self, node_id: &str) -> u32 {
        self.records
            .get(node_id)
            .map(|r| r.consecutive_failures)
            .unwrap_or(0)
    }
}
