//! Webhook notification sink
//!
//! Posts events as JSON to a configured endpoint. Duplicate notifications
//! for the same event key are rate limited to prevent alert storms;
//! escalations always go through.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::domain::MonitorEvent;
use crate::error::Result;

use super::EventSink;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-key rate limiter state.
#[derive(Debug)]
struct RateState {
    last_sent: Instant,
    suppressed_count: u32,
}

/// Suppresses repeats of the same key inside a rolling window.
pub struct RateGate {
    window: Duration,
    states: Mutex<HashMap<String, RateState>>,
}

impl RateGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// True when the key fired too recently and should be suppressed.
    pub fn should_suppress(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut states = match self.states.lock() {
            Ok(guard) => guard,
            // A poisoned map only loses suppression history; do not suppress.
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(state) = states.get_mut(key) {
            if now.duration_since(state.last_sent) < self.window {
                state.suppressed_count += 1;
                debug!(
                    key,
                    suppressed = state.suppressed_count,
                    "rate limiting notification"
                );
                return true;
            }
            state.last_sent = now;
            state.suppressed_count = 0;
        } else {
            states.insert(
                key.to_string(),
                RateState {
                    last_sent: now,
                    suppressed_count: 0,
                },
            );
        }
        false
    }
}

/// JSON webhook sink.
pub struct WebhookSink {
    client: Client,
    url: String,
    gate: RateGate,
}

impl WebhookSink {
    pub fn new(url: String, rate_limit: Duration) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url,
            gate: RateGate::new(rate_limit),
        })
    }

    /// Escalation is the one user-visible failure outcome; it is never
    /// rate limited.
    fn should_send(&self, event: &MonitorEvent) -> bool {
        event.is_escalation() || !self.gate.should_suppress(&event.rate_key())
    }
}

#[async_trait]
impl EventSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, event: &MonitorEvent) {
        if !self.should_send(event) {
            return;
        }

        match self.client.post(&self.url).json(event).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(event = event.label(), node_id = event.node_id(), "webhook delivered");
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                error!(event = event.label(), %status, %body, "webhook rejected");
            }
            Err(e) => {
                error!(event = event.label(), "webhook request failed: {e}");
            }
        }
    }
}
