//! Node topology model
//!
//! Descriptors are built once from configuration at startup and stay
//! immutable for the process lifetime. The engine only ever reads them.

use serde::{Deserialize, Serialize};

/// Role a supervised node plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Message broker node
    Broker,
    /// Coordination-service node (quorum member)
    CoordinationNode,
}

impl NodeKind {
    /// Service unit name used by restart command templates.
    pub fn service_unit(&self) -> &'static str {
        match self {
            NodeKind::Broker => "kafka",
            NodeKind::CoordinationNode => "zookeeper",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Broker => write!(f, "broker"),
            NodeKind::CoordinationNode => write!(f, "coordination_node"),
        }
    }
}

/// Health-check method identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// Plain TCP reachability of the service port
    Tcp,
    /// Broker management-protocol liveness (ApiVersions round trip)
    BrokerApi,
    /// Coordination-service four-letter status word (`ruok`)
    StatusWord,
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeKind::Tcp => write!(f, "tcp"),
            ProbeKind::BrokerApi => write!(f, "broker_api"),
            ProbeKind::StatusWord => write!(f, "status_word"),
        }
    }
}

/// Recovery action identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Restart the node's service unit
    ServiceRestart,
    /// Invoke the external orchestration command
    Orchestrator,
    /// Run an operator-supplied script
    Script,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::ServiceRestart => write!(f, "service_restart"),
            ActionKind::Orchestrator => write!(f, "orchestrator"),
            ActionKind::Script => write!(f, "script"),
        }
    }
}

/// Network endpoint of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    /// Primary service port (broker listener / coordination client port)
    pub port: u16,
    /// Administrative port where it differs from the service port
    #[serde(default)]
    pub admin_port: Option<u16>,
}

impl NodeAddress {
    /// Port used by administrative probes (status word queries).
    pub fn admin_port(&self) -> u16 {
        self.admin_port.unwrap_or(self.port)
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One supervised cluster node.
///
/// `probe_kinds` and `action_kinds` are ordered: probes all run per cycle,
/// actions are tried in declared preference order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub node_id: String,
    pub kind: NodeKind,
    pub address: NodeAddress,
    pub probe_kinds: Vec<ProbeKind>,
    pub action_kinds: Vec<ActionKind>,
    /// Per-node override of the global retry policy
    #[serde(default)]
    pub retry_policy: Option<super::recovery::RetryPolicy>,
}
