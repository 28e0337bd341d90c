//! Cascade guard
//!
//! Watches the rate of near-simultaneous node failures. When a large
//! fraction of the cluster fails inside the sliding window the guard goes
//! conservative: recovery permits are granted one at a time cluster-wide
//! through a fair FIFO queue, with a mandatory delay between completions.
//! This is the one genuinely cluster-wide piece of shared state, so it
//! keeps its own lock and nothing else shares it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::CascadeConfig;
use crate::error::{Result, VigilError};

struct GuardInner {
    /// Most recent threshold-crossing per node
    failures: HashMap<String, Instant>,
    conservative: bool,
}

pub struct CascadeGuard {
    window: Duration,
    threshold_fraction: f64,
    inter_recovery_delay: Duration,
    total_nodes: usize,
    inner: Mutex<GuardInner>,
    /// Single recovery slot used while conservative; tokio semaphores queue
    /// waiters FIFO, which is exactly the required queue discipline.
    serial: Arc<Semaphore>,
}

impl CascadeGuard {
    pub fn new(cfg: &CascadeConfig, total_nodes: usize) -> Self {
        Self {
            window: cfg.window(),
            threshold_fraction: cfg.failure_fraction,
            inter_recovery_delay: cfg.inter_recovery_delay(),
            total_nodes,
            inner: Mutex::new(GuardInner {
                failures: HashMap::new(),
                conservative: false,
            }),
            serial: Arc::new(Semaphore::new(1)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GuardInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn refresh(&self, inner: &mut GuardInner, now: Instant) {
        inner
            .failures
            .retain(|_, at| now.duration_since(*at) < self.window);
        let failing = inner.failures.len();
        let conservative =
            (failing as f64) > self.threshold_fraction * self.total_nodes as f64;
        if conservative != inner.conservative {
            if conservative {
                warn!(
                    failing,
                    total = self.total_nodes,
                    "cascade detected; entering conservative recovery"
                );
            } else {
                info!(
                    failing,
                    total = self.total_nodes,
                    "failure rate subsided; leaving conservative recovery"
                );
            }
            inner.conservative = conservative;
        }
    }

    /// Record a node's threshold-crossing failure transition.
    pub fn record_failure(&self, node_id: &str) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.failures.insert(node_id.to_string(), now);
        self.refresh(&mut inner, now);
    }

    pub fn is_conservative(&self) -> bool {
        let now = Instant::now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);
        inner.conservative
    }

    /// Number of distinct nodes that failed within the current window.
    pub fn failing_in_window(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);
        inner.failures.len()
    }

    /// Gate a recovery attempt. In normal mode this returns immediately and
    /// imposes nothing; in conservative mode it waits for the single
    /// cluster-wide slot.
    pub async fn acquire(&self) -> Result<RecoveryPermit> {
        if !self.is_conservative() {
            return Ok(RecoveryPermit { slot: None });
        }
        let permit = self
            .serial
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| VigilError::Internal("cascade guard slot closed".to_string()))?;
        Ok(RecoveryPermit {
            slot: Some(SerialSlot {
                permit: Some(permit),
                serial: self.serial.clone(),
                delay: self.inter_recovery_delay,
            }),
        })
    }
}

struct SerialSlot {
    permit: Option<OwnedSemaphorePermit>,
    serial: Arc<Semaphore>,
    delay: Duration,
}

/// Held for the duration of one recovery attempt. Releasing a conservative
/// slot schedules the mandatory inter-recovery delay before the next grant.
pub struct RecoveryPermit {
    slot: Option<SerialSlot>,
}

impl Drop for RecoveryPermit {
    fn drop(&mut self) {
        let Some(mut slot) = self.slot.take() else {
            return;
        };
        let Some(permit) = slot.permit.take() else {
            return;
        };
        permit.forget();
        if slot.delay.is_zero() {
            slot.serial.add_permits(1);
            return;
        }
        let serial = slot.serial;
        let delay = slot.delay;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    serial.add_permits(1);
                });
            }
            // Dropped outside a runtime (process teardown): skip the delay
            // rather than lose the slot.
            Err(_) => serial.add_permits(1),
        }
    }
}
