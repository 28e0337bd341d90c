//! Broker management-protocol probe
//!
//! Goes one level deeper than TCP reachability: sends a minimal
//! ApiVersions request on the broker port and requires a well-formed,
//! correlated response. Catches brokers that accept connections but have a
//! wedged request plane.

use async_trait::async_trait;
use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::domain::{NodeDescriptor, NodeKind, ProbeKind};
use crate::error::ProbeError;

use super::Probe;

const API_VERSIONS_KEY: i16 = 18;
const CLIENT_ID: &str = "vigil";
/// Upper bound on an ApiVersions response; anything larger is garbage.
const MAX_RESPONSE_BYTES: i32 = 1 << 20;

pub struct BrokerApiProbe;

impl BrokerApiProbe {
    pub fn new() -> Self {
        Self
    }

    fn encode_request(correlation_id: i32) -> Vec<u8> {
        let mut payload = Vec::with_capacity(16 + CLIENT_ID.len());
        payload.extend_from_slice(&API_VERSIONS_KEY.to_be_bytes());
        payload.extend_from_slice(&0i16.to_be_bytes()); // api_version
        payload.extend_from_slice(&correlation_id.to_be_bytes());
        payload.extend_from_slice(&(CLIENT_ID.len() as i16).to_be_bytes());
        payload.extend_from_slice(CLIENT_ID.as_bytes());

        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.extend_from_slice(&(payload.len() as i32).to_be_bytes());
        frame.extend_from_slice(&payload);
        frame
    }
}

impl Default for BrokerApiProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probe for BrokerApiProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::BrokerApi
    }

    fn supports(&self, kind: NodeKind) -> bool {
        kind == NodeKind::Broker
    }

    async fn check(&self, node: &NodeDescriptor) -> Result<(), ProbeError> {
        let addr = format!("{}:{}", node.address.host, node.address.port);
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| ProbeError::Connectivity(format!("{addr}: {e}")))?;

        let correlation_id: i32 = rand::thread_rng().gen();
        let request = Self::encode_request(correlation_id);
        stream
            .write_all(&request)
            .await
            .map_err(|e| ProbeError::Connectivity(format!("{addr}: write: {e}")))?;

        let mut len_buf = [0u8; 4];
        stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| ProbeError::Connectivity(format!("{addr}: read: {e}")))?;
        let response_len = i32::from_be_bytes(len_buf);
        if !(4..=MAX_RESPONSE_BYTES).contains(&response_len) {
            return Err(ProbeError::Protocol(format!(
                "{addr}: implausible response length {response_len}"
            )));
        }

        let mut corr_buf = [0u8; 4];
        stream
            .read_exact(&mut corr_buf)
            .await
            .map_err(|e| ProbeError::Connectivity(format!("{addr}: read: {e}")))?;
        let echoed = i32::from_be_bytes(corr_buf);
        if echoed != correlation_id {
            return Err(ProbeError::Protocol(format!(
                "{addr}: correlation id mismatch (sent {correlation_id}, got {echoed})"
            )));
        }

        debug!(node_id = %node.node_id, %addr, "broker api probe correlated");
        Ok(())
    }
}
