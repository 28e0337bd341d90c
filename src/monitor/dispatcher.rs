//! Health dispatcher
//!
//! Drives the fixed-interval check cycle. Every node is checked in its own
//! task, optionally bounded by a global semaphore; the per-probe deadline
//! inside the aggregator guarantees a hung node can never stall the cycle
//! past one probe-timeout.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::domain::{
    FailureEvent, HealthTransition, MonitorEvent, NodeDescriptor, RecoveredEvent,
};
use crate::monitor::HealthAggregator;
use crate::recovery::CascadeGuard;
use crate::sink::EventBus;

pub struct HealthDispatcher {
    nodes: Vec<Arc<NodeDescriptor>>,
    aggregator: Arc<HealthAggregator>,
    guard: Arc<CascadeGuard>,
    bus: Arc<EventBus>,
    /// Per-node FIFO routes into the recovery state machines
    routes: HashMap<String, mpsc::Sender<HealthTransition>>,
    limit: Option<Arc<Semaphore>>,
    interval: Duration,
}

impl HealthDispatcher {
    pub fn new(
        nodes: Vec<Arc<NodeDescriptor>>,
        aggregator: Arc<HealthAggregator>,
        guard: Arc<CascadeGuard>,
        bus: Arc<EventBus>,
        routes: HashMap<String, mpsc::Sender<HealthTransition>>,
        max_concurrent_checks: usize,
        interval: Duration,
    ) -> Self {
        let limit = match max_concurrent_checks {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        Self {
            nodes,
            aggregator,
            guard,
            bus,
            routes,
            limit,
            interval,
        }
    }

    /// Run check cycles until shutdown. A cycle that outlives the interval
    /// delays the next tick instead of overlapping it, preserving per-node
    /// transition ordering.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            nodes = self.nodes.len(),
            interval_secs = self.interval.as_secs(),
            "health dispatcher started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("health dispatcher stopped");
    }

    /// One full check cycle over the node set.
    pub async fn run_cycle(&self) {
        let started = tokio::time::Instant::now();
        let mut tasks = JoinSet::new();

        for node in &self.nodes {
            let node = node.clone();
            let aggregator = self.aggregator.clone();
            let guard = self.guard.clone();
            let bus = self.bus.clone();
            let route = self.routes.get(&node.node_id).cloned();
            let limit = self.limit.clone();

            tasks.spawn(async move {
                let _permit = match limit {
                    Some(semaphore) => match semaphore.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return,
                    },
                    None => None,
                };

                let Some(transition) = aggregator.observe(&node).await else {
                    return;
                };

                match &transition {
                    HealthTransition::Failed {
                        status,
                        failure_type,
                        consecutive_failures,
                    } => {
                        guard.record_failure(&node.node_id);
                        bus.emit(MonitorEvent::NodeFailed(FailureEvent {
                            node_id: node.node_id.clone(),
                            kind: node.kind,
                            failure_type: *failure_type,
                            consecutive_failures: *consecutive_failures,
                            reason: status.error.clone(),
                            observed_at: status.observed_at,
                        }))
                        .await;
                    }
                    HealthTransition::Recovered { status } => {
                        bus.emit(MonitorEvent::NodeRecovered(RecoveredEvent {
                            node_id: node.node_id.clone(),
                            kind: node.kind,
                            probe_kind: status.probe_kind,
                            latency_ms: status.latency_ms,
                            observed_at: status.observed_at,
                        }))
                        .await;
                    }
                    // Below-threshold failures stay internal.
                    HealthTransition::Degraded { .. } => {}
                }

                if let Some(tx) = route {
                    if tx.send(transition).await.is_err() {
                        error!(node_id = %node.node_id, "recovery actor gone; transition dropped");
                    }
                }
            });
        }

        while tasks.join_next().await.is_some() {}
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            at = %Utc::now(),
            "check cycle complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CascadeConfig;
    use crate::domain::{NodeAddress, NodeKind, ProbeKind, SnapshotMap};
    use crate::error::ProbeError;
    use crate::probes::{Probe, ProbeRegistry};
    use async_trait::async_trait;
    use dashmap::DashMap;

    /// One probe instance serving two node ids: one hangs forever, the
    /// other answers immediately.
    struct SplitProbe;

    #[async_trait]
    impl Probe for SplitProbe {
        fn kind(&self) -> ProbeKind {
            ProbeKind::Tcp
        }

        fn supports(&self, _kind: NodeKind) -> bool {
            true
        }

        async fn check(&self, node: &NodeDescriptor) -> Result<(), ProbeError> {
            if node.node_id == "hung" {
                std::future::pending().await
            } else {
                Ok(())
            }
        }
    }

    fn node(id: &str) -> Arc<NodeDescriptor> {
        Arc::new(NodeDescriptor {
            node_id: id.to_string(),
            kind: NodeKind::Broker,
            address: NodeAddress {
                host: "127.0.0.1".to_string(),
                port: 9092,
                admin_port: None,
            },
            probe_kinds: vec![ProbeKind::Tcp],
            action_kinds: vec![],
            retry_policy: None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn hung_probe_does_not_stall_the_cycle() {
        let mut registry = ProbeRegistry::new();
        registry.register(Arc::new(SplitProbe));
        let snapshots: SnapshotMap = Arc::new(DashMap::new());
        let aggregator = Arc::new(HealthAggregator::new(
            Arc::new(registry),
            snapshots.clone(),
            Duration::from_secs(15),
            1,
        ));
        let nodes = vec![node("hung"), node("ok-1"), node("ok-2")];
        for n in &nodes {
            aggregator.register_node(n);
        }
        let guard = Arc::new(CascadeGuard::new(&CascadeConfig::default(), nodes.len()));
        let bus = Arc::new(EventBus::new(vec![]));
        let mut events = bus.subscribe();

        let dispatcher = HealthDispatcher::new(
            nodes,
            aggregator,
            guard,
            bus.clone(),
            HashMap::new(),
            0,
            Duration::from_secs(30),
        );

        let cycle_start = tokio::time::Instant::now();
        dispatcher.run_cycle().await;
        // Bounded by the probe timeout, not by the hung probe.
        assert!(cycle_start.elapsed() <= Duration::from_secs(16));

        // Healthy nodes report no transitions; the hung node produced a
        // failure event.
        let event = events.try_recv().unwrap();
        assert_eq!(event.node_id(), "hung");
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn concurrency_limit_is_respected() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct GaugeProbe {
            current: Arc<AtomicUsize>,
            peak: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl Probe for GaugeProbe {
            fn kind(&self) -> ProbeKind {
                ProbeKind::Tcp
            }

            fn supports(&self, _kind: NodeKind) -> bool {
                true
            }

            async fn check(&self, _node: &NodeDescriptor) -> Result<(), ProbeError> {
                let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.current.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut registry = ProbeRegistry::new();
        registry.register(Arc::new(GaugeProbe {
            current: current.clone(),
            peak: peak.clone(),
        }));

        let snapshots: SnapshotMap = Arc::new(DashMap::new());
        let aggregator = Arc::new(HealthAggregator::new(
            Arc::new(registry),
            snapshots,
            Duration::from_secs(15),
            1,
        ));
        let nodes: Vec<_> = (0..8).map(|i| node(&format!("n{i}"))).collect();
        for n in &nodes {
            aggregator.register_node(n);
        }
        let guard = Arc::new(CascadeGuard::new(&CascadeConfig::default(), nodes.len()));
        let bus = Arc::new(EventBus::new(vec![]));

        let dispatcher = HealthDispatcher::new(
            nodes,
            aggregator,
            guard,
            bus,
            HashMap::new(),
            2,
            Duration::from_secs(30),
        );
        dispatcher.run_cycle().await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
