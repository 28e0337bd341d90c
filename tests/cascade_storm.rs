//! Mass-outage behavior: when more than half the cluster fails at once the
//! cascade guard must force conservative mode, and no two nodes may ever
//! be recovering at the same time.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use vigil::actions::{ActionOutcome, ActionRegistry, RecoveryAction};
use vigil::config::CascadeConfig;
use vigil::domain::{
    ActionKind, NodeAddress, NodeDescriptor, NodeKind, ProbeKind, RetryPolicy, SnapshotMap,
};
use vigil::error::{ActionError, ProbeError};
use vigil::monitor::{HealthAggregator, HealthDispatcher};
use vigil::probes::{Probe, ProbeRegistry};
use vigil::recovery::{spawn_node_actor, ActionExecutor, CascadeGuard, NodeContext};
use vigil::sink::EventBus;
use vigil::{FailureType, MonitorEvent};

/// Fails for the scripted node ids, healthy for the rest.
struct PartitionProbe {
    down: Vec<String>,
}

#[async_trait]
impl Probe for PartitionProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Tcp
    }

    fn supports(&self, _kind: NodeKind) -> bool {
        true
    }

    async fn check(&self, node: &NodeDescriptor) -> Result<(), ProbeError> {
        if self.down.contains(&node.node_id) {
            Err(ProbeError::Connectivity("unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Never heals; tracks how many invocations overlap in time.
struct GaugedAction {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl RecoveryAction for GaugedAction {
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
        _node: &NodeDescriptor,
        _failure_type: FailureType,
    ) -> Result<ActionOutcome, ActionError> {
        let running = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(2)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(ActionOutcome {
            success: true,
            exit_status: Some(0),
            detail: "restarted".to_string(),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn majority_failure_serializes_recovery() {
    const TOTAL_NODES: usize = 10;
    const DOWN_NODES: usize = 6;

    let down: Vec<String> = (0..DOWN_NODES).map(|i| format!("kafka-{i}")).collect();
    let mut probes = ProbeRegistry::new();
    probes.register(Arc::new(PartitionProbe { down: down.clone() }));

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut actions = ActionRegistry::new();
    actions.register(Arc::new(GaugedAction {
        current: current.clone(),
        peak: peak.clone(),
    }));
    let actions = Arc::new(actions);

    let nodes: Vec<Arc<NodeDescriptor>> = (0..TOTAL_NODES)
        .map(|i| {
            Arc::new(NodeDescriptor {
                node_id: format!("kafka-{i}"),
                kind: NodeKind::Broker,
                address: NodeAddress {
                    host: format!("10.0.0.{i}"),
                    port: 9092,
                    admin_port: None,
                },
                probe_kinds: vec![ProbeKind::Tcp],
                action_kinds: vec![ActionKind::ServiceRestart],
                retry_policy: None,
            })
        })
        .collect();

    let snapshots: SnapshotMap = Arc::new(dashmap::DashMap::new());
    let aggregator = Arc::new(HealthAggregator::new(
        Arc::new(probes),
        snapshots.clone(),
        Duration::from_secs(15),
        1,
    ));
    let cascade_cfg = CascadeConfig {
        window_secs: 300,
        failure_fraction: 0.5,
        inter_recovery_delay_secs: 1,
    };
    let guard = Arc::new(CascadeGuard::new(&cascade_cfg, TOTAL_NODES));
    let bus = Arc::new(EventBus::new(vec![]));
    let mut events = bus.subscribe();
    let (shutdown_tx, _) = watch::channel(false);

    let mut routes = HashMap::new();
    for node in &nodes {
        aggregator.register_node(node);
        let (tx, _handle) = spawn_node_actor(
            NodeContext {
                node: node.clone(),
                policy: RetryPolicy {
                    max_attempts: 2,
                    initial_delay_secs: 10,
                    backoff_multiplier: 2.0,
                    max_delay_secs: 300,
                },
                settle_delay: Duration::from_secs(10),
                backoff_jitter: false,
                aggregator: aggregator.clone(),
                executor: Arc::new(ActionExecutor::new(Duration::from_secs(60))),
                actions: actions.clone(),
                guard: guard.clone(),
                bus: bus.clone(),
                snapshots: snapshots.clone(),
            },
            shutdown_tx.subscribe(),
        );
        routes.insert(node.node_id.clone(), tx);
    }

    let dispatcher = HealthDispatcher::new(
        nodes,
        aggregator,
        guard.clone(),
        bus.clone(),
        routes,
        0,
        Duration::from_secs(30),
    );
    dispatcher.run_cycle().await;

    // All six threshold crossings land in the window before any recovery
    // permit is granted, so the guard must already be conservative.
    assert!(guard.is_conservative());
    assert_eq!(guard.failing_in_window(), DOWN_NODES);

    // Let every node walk its full ladder: 6 nodes x 2 attempts, then 6
    // escalations.
    let mut outcomes = 0;
    let mut escalations = 0;
    while escalations < DOWN_NODES {
        let event = tokio::time::timeout(Duration::from_secs(7200), events.recv())
            .await
            .expect("timed out waiting for storm to drain")
            .expect("event bus closed");
        match event {
            MonitorEvent::RecoveryOutcome(_) => outcomes += 1,
            MonitorEvent::Escalation(_) => escalations += 1,
            MonitorEvent::NodeFailed(_) => {}
            MonitorEvent::NodeRecovered(_) => panic!("no node should recover"),
        }
    }
    assert_eq!(outcomes, DOWN_NODES * 2);

    // The core property: conservative mode never let two recoveries
    // overlap.
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(current.load(Ordering::SeqCst), 0);
}
