//! Event sink boundary
//!
//! The engine hands every event to the bus and moves on: delivery, retry
//! and rendering are entirely the sink's concern, and a misbehaving sink
//! never propagates into the engine.

pub mod log;
pub mod webhook;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::domain::MonitorEvent;

pub use log::LogSink;
pub use webhook::{RateGate, WebhookSink};

/// A consumer of monitoring events.
#[async_trait]
pub trait EventSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, event: &MonitorEvent);
}

/// Fan-out to registered sinks plus an in-process broadcast subscription
/// for anything that wants a live feed (status pages, tests).
pub struct EventBus {
    sinks: Vec<Arc<dyn EventSink>>,
    event_tx: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self { sinks, event_tx }
    }

    /// Subscribe to the live event feed.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_tx.subscribe()
    }

    /// Emit an event to every sink. Never fails; sink errors are the
    /// sink's problem to log.
    pub async fn emit(&self, event: MonitorEvent) {
        let _ = self.event_tx.send(event.clone());
        for sink in &self.sinks {
            sink.deliver(&event).await;
        }
    }
}
