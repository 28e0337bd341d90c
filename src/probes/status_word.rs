//! Coordination-service status-word probe
//!
//! Sends the four-letter `ruok` command on the admin port and expects
//! `imok`. The service closes the connection after answering, so the read
//! runs to EOF.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::domain::{NodeDescriptor, NodeKind, ProbeKind};
use crate::error::ProbeError;

use super::Probe;

const STATUS_COMMAND: &[u8] = b"ruok";
const EXPECTED_REPLY: &str = "imok";
/// Status replies are a handful of bytes; cap the read defensively.
const MAX_REPLY_BYTES: usize = 4096;

pub struct StatusWordProbe;

impl StatusWordProbe {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StatusWordProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probe for StatusWordProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::StatusWord
    }

    fn supports(&self, kind: NodeKind) -> bool {
        kind == NodeKind::CoordinationNode
    }

    async fn check(&self, node: &NodeDescriptor) -> Result<(), ProbeError> {
        let addr = format!("{}:{}", node.address.host, node.address.admin_port());
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| ProbeError::Connectivity(format!("{addr}: {e}")))?;

        stream
            .write_all(STATUS_COMMAND)
            .await
            .map_err(|e| ProbeError::Connectivity(format!("{addr}: write: {e}")))?;

        let mut reply = Vec::new();
        stream
            .take(MAX_REPLY_BYTES as u64)
            .read_to_end(&mut reply)
            .await
            .map_err(|e| ProbeError::Connectivity(format!("{addr}: read: {e}")))?;

        let reply = String::from_utf8_lossy(&reply);
        if reply.trim_start().starts_with(EXPECTED_REPLY) {
            debug!(node_id = %node.node_id, %addr, "status word ok");
            Ok(())
        } else {
            Err(ProbeError::Protocol(format!(
                "{addr}: expected `{EXPECTED_REPLY}`, got `{}`",
                reply.trim()
            )))
        }
    }
}
