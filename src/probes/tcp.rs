//! TCP reachability probe
//!
//! Applies to every node kind: a node whose service port does not accept
//! connections is down regardless of protocol.

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::domain::{NodeDescriptor, NodeKind, ProbeKind};
use crate::error::ProbeError;

use super::Probe;

pub struct TcpProbe;

impl TcpProbe {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probe for TcpProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Tcp
    }

    fn supports(&self, _kind: NodeKind) -> bool {
        true
    }

    async fn check(&self, node: &NodeDescriptor) -> Result<(), ProbeError> {
        let addr = format!("{}:{}", node.address.host, node.address.port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| ProbeError::Connectivity(format!("{addr}: {e}")))?;
        drop(stream);
        debug!(node_id = %node.node_id, %addr, "tcp probe connected");
        Ok(())
    }
}
