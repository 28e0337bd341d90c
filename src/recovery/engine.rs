//! Per-node recovery state machine
//!
//! One actor task per node owns that node's `RecoveryState` exclusively and
//! consumes its health transitions strictly in arrival order. The recovery
//! sequence (gate, action, settle, validation) runs inline in the actor, so
//! a newer event is never processed before the transition it interrupted
//! finishes. Different nodes' actors are fully independent except for the
//! cascade guard's cluster-wide slot.

use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::actions::{ActionRegistry, RecoveryAction};
use crate::domain::recovery::select_action_kind;
use crate::domain::{
    EscalationEvent, FailureType, HealthTransition, MonitorEvent, NodeDescriptor, Phase,
    RecoveryOutcomeEvent, RecoveryState, RetryPolicy, SnapshotMap,
};
use crate::monitor::HealthAggregator;
use crate::recovery::{ActionExecutor, CascadeGuard};
use crate::sink::EventBus;

/// Everything a node's state machine needs, wired once at startup.
pub struct NodeContext {
    pub node: Arc<NodeDescriptor>,
    pub policy: RetryPolicy,
    pub settle_delay: Duration,
    pub backoff_jitter: bool,
    pub aggregator: Arc<HealthAggregator>,
    pub executor: Arc<ActionExecutor>,
    pub actions: Arc<ActionRegistry>,
    pub guard: Arc<CascadeGuard>,
    pub bus: Arc<EventBus>,
    pub snapshots: SnapshotMap,
}

/// Spawn the actor; returns the FIFO transition route into it.
pub fn spawn_node_actor(
    ctx: NodeContext,
    shutdown: watch::Receiver<bool>,
) -> (mpsc::Sender<HealthTransition>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(64);
    let machine = StateMachine::new(ctx);
    let handle = tokio::spawn(machine.run(rx, shutdown));
    (tx, handle)
}

struct StateMachine {
    ctx: NodeContext,
    state: RecoveryState,
    /// Classification of the current failure episode
    failure_type: FailureType,
}

impl StateMachine {
    fn new(ctx: NodeContext) -> Self {
        Self {
            ctx,
            state: RecoveryState::new(),
            failure_type: FailureType::Connectivity,
        }
    }

    fn node_id(&self) -> &str {
        &self.ctx.node.node_id
    }

    async fn run(
        mut self,
        mut rx: mpsc::Receiver<HealthTransition>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug!(node_id = %self.node_id(), "recovery actor started");
        loop {
            let deadline = self.state.next_eligible_at;
            let awaiting = self.state.phase == Phase::AwaitingRetry && deadline.is_some();

            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(transition) => self.on_transition(transition).await,
                    None => break,
                },
                _ = wait_until(deadline), if awaiting => self.on_retry_deadline().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(node_id = %self.node_id(), "recovery actor stopped");
    }

    async fn on_transition(&mut self, transition: HealthTransition) {
        match transition {
            HealthTransition::Failed { failure_type, .. } => match self.state.phase {
                Phase::Healthy | Phase::Degraded => {
                    self.failure_type = failure_type;
                    self.set_phase(Phase::Failing);
                    self.try_recover().await;
                }
                Phase::Failing | Phase::AwaitingRetry => {
                    // Episode already active; refresh the classification so
                    // the next attempt picks a compatible action.
                    self.failure_type = failure_type;
                }
                // Recovery is exhausted; only organic recovery resets.
                Phase::Escalated => {}
                // Unreachable: the recovery sequence runs inline, so no
                // transition is processed while Recovering.
                Phase::Recovering => {}
            },
            HealthTransition::Degraded { .. } => {
                if self.state.phase == Phase::Healthy {
                    self.set_phase(Phase::Degraded);
                }
            }
            HealthTransition::Recovered { .. } => {
                // The single override rule: a verified-healthy observation
                // wins from any phase, including Escalated.
                if self.state.phase != Phase::Healthy {
                    info!(
                        node_id = %self.node_id(),
                        from = %self.state.phase,
                        "organic recovery; resetting state machine"
                    );
                    self.state.reset();
                    self.update_snapshot();
                }
            }
        }
    }

    async fn on_retry_deadline(&mut self) {
        self.state.next_eligible_at = None;
        self.set_phase(Phase::Failing);
        self.try_recover().await;
    }

    /// The recovery gate and, when it opens, one full attempt:
    /// action, settle delay, validation, then verdict handling.
    async fn try_recover(&mut self) {
        if self.state.attempt_count >= self.ctx.policy.max_attempts {
            self.escalate("retry budget exhausted").await;
            return;
        }

        // Cluster-wide gate: waits in the FIFO queue while the cascade
        // guard is conservative.
        let permit = match self.ctx.guard.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(node_id = %self.node_id(), "recovery gate unavailable: {e}");
                return;
            }
        };

        let attempt_number = self.state.attempt_count + 1;
        let Some(action) = self.select_action(attempt_number) else {
            self.escalate("no compatible recovery action").await;
            return;
        };

        self.set_phase(Phase::Recovering);
        info!(
            node_id = %self.node_id(),
            action = %action.kind(),
            attempt = attempt_number,
            max_attempts = self.ctx.policy.max_attempts,
            failure_type = %self.failure_type,
            "dispatching recovery action"
        );

        let executed = self
            .ctx
            .executor
            .execute(&self.ctx.node, action, attempt_number, self.failure_type)
            .await;
        self.state.last_attempt_at = Some(executed.attempt.ended_at);
        self.state.history.push(executed.attempt.clone());

        // Validate only when the action actually ran; an action that never
        // started cannot have changed the node.
        let validated = if executed.invoked {
            tokio::time::sleep(self.ctx.settle_delay).await;
            self.ctx.aggregator.verify(&self.ctx.node).await.healthy
        } else {
            false
        };

        self.ctx
            .bus
            .emit(MonitorEvent::RecoveryOutcome(RecoveryOutcomeEvent {
                node_id: self.node_id().to_string(),
                success: validated,
                attempt: executed.attempt,
                at: Utc::now(),
            }))
            .await;

        if validated {
            info!(
                node_id = %self.node_id(),
                attempt = attempt_number,
                "recovery validated; node healthy"
            );
            self.state.reset();
            self.update_snapshot();
        } else {
            self.state.attempt_count = attempt_number;
            if attempt_number >= self.ctx.policy.max_attempts {
                self.escalate("automated recovery exhausted").await;
            } else {
                let delay = self.backoff_delay(attempt_number);
                warn!(
                    node_id = %self.node_id(),
                    attempt = attempt_number,
                    retry_in_secs = delay.as_secs(),
                    "recovery attempt failed; backing off"
                );
                self.state.next_eligible_at = Some(Instant::now() + delay);
                self.set_phase(Phase::AwaitingRetry);
            }
        }

        // Releasing the permit starts the inter-recovery delay when the
        // guard is conservative.
        drop(permit);
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = self.ctx.policy.delay_for_attempt(attempt);
        if self.ctx.backoff_jitter {
            let factor = rand::thread_rng().gen_range(0.9..=1.1);
            delay.mul_f64(factor)
        } else {
            delay
        }
    }

    fn select_action(&self, attempt_number: u32) -> Option<Arc<dyn RecoveryAction>> {
        let registry = &self.ctx.actions;
        let node_kind = self.ctx.node.kind;
        let failure_type = self.failure_type;
        let kind = select_action_kind(&self.ctx.node.action_kinds, attempt_number, |kind| {
            registry
                .get(kind)
                .map(|action| {
                    action.supports(node_kind)
                        && action.supported_failure_types().contains(&failure_type)
                })
                .unwrap_or(false)
        })?;
        registry.get(kind)
    }

    async fn escalate(&mut self, reason: &str) {
        self.set_phase(Phase::Escalated);
        self.state.next_eligible_at = None;
        error!(
            node_id = %self.node_id(),
            attempts = self.state.attempt_count,
            reason,
            "escalating to operators"
        );
        self.ctx
            .bus
            .emit(MonitorEvent::Escalation(EscalationEvent {
                node_id: self.node_id().to_string(),
                kind: self.ctx.node.kind,
                attempts: self.state.attempt_count,
                reason: reason.to_string(),
                history: self.state.history.clone(),
                at: Utc::now(),
            }))
            .await;
    }

    fn set_phase(&mut self, phase: Phase) {
        self.state.phase = phase;
        self.update_snapshot();
    }

    fn update_snapshot(&self) {
        if let Some(mut snapshot) = self.ctx.snapshots.get_mut(self.node_id()) {
            snapshot.phase = self.state.phase;
            snapshot.attempt_count = self.state.attempt_count;
            snapshot.next_retry_in_secs = self
                .state
                .next_eligible_at
                .map(|at| at.saturating_duration_since(Instant::now()).as_secs());
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
