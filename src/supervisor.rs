//! Supervisor wiring
//!
//! Builds the registries and the shared components from configuration,
//! fail-fast validates the topology, spawns one recovery actor per node
//! plus the dispatcher and status server, and coordinates shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::actions::ActionRegistry;
use crate::config::AppConfig;
use crate::coordination::shutdown::DEFAULT_GRACE_PERIOD;
use crate::coordination::ShutdownController;
use crate::domain::{NodeDescriptor, SnapshotMap};
use crate::error::{Result, VigilError};
use crate::monitor::{HealthAggregator, HealthDispatcher};
use crate::probes::ProbeRegistry;
use crate::recovery::{spawn_node_actor, ActionExecutor, CascadeGuard, NodeContext};
use crate::services::{StatusServer, StatusState};
use crate::sink::{EventBus, EventSink, LogSink, WebhookSink};

/// Build descriptors from config, rejecting duplicates and empty sets.
pub fn build_nodes(cfg: &AppConfig) -> Result<Vec<Arc<NodeDescriptor>>> {
    if cfg.nodes.is_empty() {
        return Err(VigilError::Topology(
            "no nodes configured; nothing to supervise".to_string(),
        ));
    }
    let mut seen = std::collections::HashSet::new();
    let mut nodes = Vec::with_capacity(cfg.nodes.len());
    for entry in &cfg.nodes {
        if !seen.insert(entry.id.clone()) {
            return Err(VigilError::Topology(format!(
                "duplicate node id `{}`",
                entry.id
            )));
        }
        nodes.push(Arc::new(entry.to_descriptor()));
    }
    Ok(nodes)
}

/// Fail-fast topology validation: every node needs at least one probe and
/// one recovery action applicable to its kind, or the supervisor refuses
/// to start rather than silently under-monitoring.
pub fn validate_topology(
    nodes: &[Arc<NodeDescriptor>],
    probes: &ProbeRegistry,
    actions: &ActionRegistry,
) -> Result<()> {
    for node in nodes {
        if probes.applicable(node).is_empty() {
            return Err(VigilError::Topology(format!(
                "node `{}` ({}) has no applicable probe",
                node.node_id, node.kind
            )));
        }
        if !actions.has_applicable(node) {
            return Err(VigilError::Topology(format!(
                "node `{}` ({}) has no applicable recovery action",
                node.node_id, node.kind
            )));
        }
    }
    Ok(())
}

fn build_sinks(cfg: &AppConfig) -> Result<Vec<Arc<dyn EventSink>>> {
    let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(LogSink::new())];
    if let Some(url) = &cfg.notify.webhook_url {
        info!(%url, "webhook notifications enabled");
        sinks.push(Arc::new(WebhookSink::new(
            url.clone(),
            std::time::Duration::from_secs(cfg.notify.rate_limit_secs),
        )?));
    }
    Ok(sinks)
}

/// Validate configuration and topology without running anything.
pub fn validate(cfg: &AppConfig) -> Result<()> {
    let nodes = build_nodes(cfg)?;
    let probes = ProbeRegistry::builtin();
    let actions = ActionRegistry::from_config(&cfg.actions);
    validate_topology(&nodes, &probes, &actions)
}

/// Run the supervision daemon until SIGINT/SIGTERM.
pub async fn run(cfg: AppConfig) -> Result<()> {
    let nodes = build_nodes(&cfg)?;
    let probes = Arc::new(ProbeRegistry::builtin());
    let actions = Arc::new(ActionRegistry::from_config(&cfg.actions));
    validate_topology(&nodes, &probes, &actions)?;

    let snapshots: SnapshotMap = Arc::new(dashmap::DashMap::new());
    let bus = Arc::new(EventBus::new(build_sinks(&cfg)?));
    let aggregator = Arc::new(HealthAggregator::new(
        probes,
        snapshots.clone(),
        cfg.monitor.probe_timeout(),
        cfg.monitor.failure_threshold,
    ));
    let guard = Arc::new(CascadeGuard::new(&cfg.cascade, nodes.len()));
    let executor = Arc::new(ActionExecutor::new(cfg.recovery.action_timeout()));
    let shutdown = ShutdownController::new();

    let mut tasks = JoinSet::new();
    let mut actor_handles = Vec::with_capacity(nodes.len());
    let mut routes = HashMap::new();
    for node in &nodes {
        aggregator.register_node(node);
        let policy = node
            .retry_policy
            .clone()
            .unwrap_or_else(|| cfg.recovery.retry.clone());
        let (tx, handle) = spawn_node_actor(
            NodeContext {
                node: node.clone(),
                policy,
                settle_delay: cfg.recovery.settle_delay(),
                backoff_jitter: cfg.recovery.backoff_jitter,
                aggregator: aggregator.clone(),
                executor: executor.clone(),
                actions: actions.clone(),
                guard: guard.clone(),
                bus: bus.clone(),
                snapshots: snapshots.clone(),
            },
            shutdown.subscribe(),
        );
        actor_handles.push(handle);
        routes.insert(node.node_id.clone(), tx);
    }

    let dispatcher = HealthDispatcher::new(
        nodes.clone(),
        aggregator,
        guard,
        bus,
        routes,
        cfg.monitor.max_concurrent_checks,
        cfg.monitor.interval(),
    );
    tasks.spawn(dispatcher.run(shutdown.subscribe()));

    if let Some(port) = cfg.status_port {
        let state = Arc::new(StatusState::new(snapshots.clone(), nodes.len()));
        let server = StatusServer::new(state, port);
        let rx = shutdown.subscribe();
        tasks.spawn(async move {
            if let Err(e) = server.run(rx).await {
                error!("status server exited: {e}");
            }
        });
    }

    info!(nodes = nodes.len(), "supervisor running");
    shutdown.listen_for_signals().await;

    // Bounded grace period for in-flight probes and actions, then abort.
    let drained = tokio::time::timeout(DEFAULT_GRACE_PERIOD, async {
        while tasks.join_next().await.is_some() {}
        for handle in actor_handles.iter_mut() {
            let _ = handle.await;
        }
    })
    .await;
    if drained.is_err() {
        warn!("grace period expired; aborting remaining tasks");
        tasks.abort_all();
        for handle in &actor_handles {
            handle.abort();
        }
    }
    info!("supervisor stopped");
    Ok(())
}

/// One-shot check cycle: probe every node once and print the verdicts.
pub async fn run_check(cfg: AppConfig) -> Result<()> {
    let nodes = build_nodes(&cfg)?;
    let probes = Arc::new(ProbeRegistry::builtin());
    let actions = ActionRegistry::from_config(&cfg.actions);
    validate_topology(&nodes, &probes, &actions)?;

    let snapshots: SnapshotMap = Arc::new(dashmap::DashMap::new());
    let aggregator = Arc::new(HealthAggregator::new(
        probes,
        snapshots,
        cfg.monitor.probe_timeout(),
        cfg.monitor.failure_threshold,
    ));

    let mut checks = JoinSet::new();
    for node in &nodes {
        aggregator.register_node(node);
        let aggregator = aggregator.clone();
        let node = node.clone();
        checks.spawn(async move { aggregator.probe_node(&node).await });
    }

    let mut statuses = Vec::new();
    while let Some(result) = checks.join_next().await {
        match result {
            Ok(status) => statuses.push(status),
            Err(e) => error!("check task failed: {e}"),
        }
    }
    statuses.sort_by(|a, b| a.node_id.cmp(&b.node_id));

    for status in &statuses {
        if status.healthy {
            println!(
                "{:<20} OK       {}ms via {}",
                status.node_id, status.latency_ms, status.probe_kind
            );
        } else {
            println!(
                "{:<20} FAILED   {}",
                status.node_id,
                status.error.as_deref().unwrap_or("unknown")
            );
        }
    }
    let unhealthy = statuses.iter().filter(|s| !s.healthy).count();
    println!(
        "\n{} nodes checked, {} healthy, {} failing",
        statuses.len(),
        statuses.len() - unhealthy,
        unhealthy
    );
    Ok(())
}
