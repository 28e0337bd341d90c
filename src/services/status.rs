//! Status HTTP server for 24/7 production monitoring
//!
//! Provides liveness and readiness probes for process supervision
//! (systemd/Kubernetes) and a JSON snapshot of every supervised node.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::domain::{NodeSnapshot, Phase, SnapshotMap};
use crate::error::Result;

/// Overall supervisor verdict derived from the node snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Shared state for the status server
pub struct StatusState {
    pub started_at: DateTime<Utc>,
    pub snapshots: SnapshotMap,
    pub total_nodes: usize,
}

impl StatusState {
    pub fn new(snapshots: SnapshotMap, total_nodes: usize) -> Self {
        Self {
            started_at: Utc::now(),
            snapshots,
            total_nodes,
        }
    }

    fn nodes(&self) -> Vec<NodeSnapshot> {
        let mut nodes: Vec<NodeSnapshot> =
            self.snapshots.iter().map(|r| r.value().clone()).collect();
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        nodes
    }

    /// Escalated nodes make the supervisor unhealthy; any other active
    /// failure episode degrades it.
    pub fn overall(&self) -> SupervisorHealth {
        let mut overall = SupervisorHealth::Healthy;
        for entry in self.snapshots.iter() {
            match entry.value().phase {
                Phase::Escalated => return SupervisorHealth::Unhealthy,
                Phase::Healthy => {}
                _ => overall = SupervisorHealth::Degraded,
            }
        }
        overall
    }
}

/// Full status response
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: SupervisorHealth,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub total_nodes: usize,
    pub nodes: Vec<NodeSnapshot>,
}

/// Status server
pub struct StatusServer {
    state: Arc<StatusState>,
    port: u16,
}

impl StatusServer {
    pub fn new(state: Arc<StatusState>, port: u16) -> Self {
        Self { state, port }
    }

    pub fn router(state: Arc<StatusState>) -> Router {
        Router::new()
            .route("/status", get(status_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Serve until shutdown is triggered.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let app = Self::router(Arc::clone(&self.state));
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting status server on {addr}");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| crate::VigilError::Internal(format!("status server error: {e}")))?;

        Ok(())
    }
}

/// Full node snapshot endpoint
async fn status_handler(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    let overall = state.overall();
    let response = StatusResponse {
        status: overall,
        timestamp: Utc::now(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds().max(0) as u64,
        total_nodes: state.total_nodes,
        nodes: state.nodes(),
    };
    let code = match overall {
        SupervisorHealth::Healthy | SupervisorHealth::Degraded => StatusCode::OK,
        SupervisorHealth::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(response))
}

/// Liveness probe - is the supervisor alive?
async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe - degraded still serves, escalated does not
async fn readiness_handler(State(state): State<Arc<StatusState>>) -> impl IntoResponse {
    match state.overall() {
        SupervisorHealth::Healthy | SupervisorHealth::Degraded => StatusCode::OK,
        SupervisorHealth::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeKind;
    use dashmap::DashMap;

    fn state_with(phases: Vec<(&str, Phase)>) -> Arc<StatusState> {
        let snapshots: SnapshotMap = Arc::new(DashMap::new());
        for (id, phase) in &phases {
            let mut snap = NodeSnapshot::new(id.to_string(), NodeKind::Broker);
            snap.phase = *phase;
            snap.healthy = *phase == Phase::Healthy;
            snapshots.insert(id.to_string(), snap);
        }
        Arc::new(StatusState::new(snapshots, phases.len()))
    }

    #[test]
    fn overall_rolls_up_worst_phase() {
        assert_eq!(
            state_with(vec![("a", Phase::Healthy), ("b", Phase::Healthy)]).overall(),
            SupervisorHealth::Healthy
        );
        assert_eq!(
            state_with(vec![("a", Phase::Healthy), ("b", Phase::AwaitingRetry)]).overall(),
            SupervisorHealth::Degraded
        );
        assert_eq!(
            state_with(vec![("a", Phase::Recovering), ("b", Phase::Escalated)]).overall(),
            SupervisorHealth::Unhealthy
        );
    }

    #[tokio::test]
    async fn readyz_reflects_escalation() {
        use tower::util::ServiceExt;

        let app = StatusServer::router(state_with(vec![("a", Phase::Healthy)]));
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/readyz")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let app = StatusServer::router(state_with(vec![("a", Phase::Escalated)]));
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/readyz")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn status_payload_lists_nodes_sorted() {
        use tower::util::ServiceExt;

        let app = StatusServer::router(state_with(vec![
            ("zk-1", Phase::Healthy),
            ("kafka-1", Phase::Failing),
        ]));
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/status")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "degraded");
        assert_eq!(parsed["nodes"][0]["node_id"], "kafka-1");
        assert_eq!(parsed["nodes"][1]["node_id"], "zk-1");
    }
}
