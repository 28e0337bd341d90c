//! Probe plugin boundary
//!
//! Each probe implements one concrete health-check method. The registry is
//! resolved into a fixed dispatch table at startup; there is no dynamic
//! loading. Probes return a bare verdict; the aggregator owns timeouts,
//! latency measurement and failure accounting.

pub mod broker_api;
pub mod status_word;
pub mod tcp;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{NodeDescriptor, NodeKind, ProbeKind};
use crate::error::ProbeError;

pub use broker_api::BrokerApiProbe;
pub use status_word::StatusWordProbe;
pub use tcp::TcpProbe;

/// One concrete health-check capability.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Probe: Send + Sync {
    fn kind(&self) -> ProbeKind;

    /// Node kinds this probe knows how to check.
    fn supports(&self, kind: NodeKind) -> bool;

    /// Check the node once. The caller wraps this in a hard deadline, so
    /// implementations may block on I/O without their own timers.
    async fn check(&self, node: &NodeDescriptor) -> Result<(), ProbeError>;
}

/// Fixed probe dispatch table, built once at startup.
pub struct ProbeRegistry {
    probes: HashMap<ProbeKind, Arc<dyn Probe>>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self {
            probes: HashMap::new(),
        }
    }

    /// Registry with every built-in probe.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TcpProbe::new()));
        registry.register(Arc::new(BrokerApiProbe::new()));
        registry.register(Arc::new(StatusWordProbe::new()));
        registry
    }

    /// Register a probe, replacing any existing one of the same kind.
    pub fn register(&mut self, probe: Arc<dyn Probe>) {
        self.probes.insert(probe.kind(), probe);
    }

    pub fn get(&self, kind: ProbeKind) -> Option<Arc<dyn Probe>> {
        self.probes.get(&kind).cloned()
    }

    /// Probes applicable to a node: declared on the descriptor, present in
    /// the registry, and supporting the node's kind.
    pub fn applicable(&self, node: &NodeDescriptor) -> Vec<Arc<dyn Probe>> {
        node.probe_kinds
            .iter()
            .filter_map(|kind| self.get(*kind))
            .filter(|probe| probe.supports(node.kind))
            .collect()
    }
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
