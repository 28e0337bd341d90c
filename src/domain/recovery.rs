//! Recovery state model and retry arithmetic

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::node::ActionKind;

/// Phase of a node's recovery state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No active failure episode
    Healthy,
    /// Failures observed, still below the failure threshold
    Degraded,
    /// Threshold crossed, recovery not yet dispatched
    Failing,
    /// Recovery action dispatched, awaiting validation
    Recovering,
    /// Backoff delay in effect before the next attempt
    AwaitingRetry,
    /// Automated recovery exhausted; terminal until organic recovery
    Escalated,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Healthy => write!(f, "healthy"),
            Phase::Degraded => write!(f, "degraded"),
            Phase::Failing => write!(f, "failing"),
            Phase::Recovering => write!(f, "recovering"),
            Phase::AwaitingRetry => write!(f, "awaiting_retry"),
            Phase::Escalated => write!(f, "escalated"),
        }
    }
}

/// Bounded-retry policy with exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_secs() -> u64 {
    10
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_secs() -> u64 {
    300
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_secs: default_initial_delay_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay after attempt `k` (1-based):
    /// `min(initial * multiplier^(k-1), max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        let raw = self.initial_delay_secs as f64 * self.backoff_multiplier.powi(exp);
        let capped = raw.min(self.max_delay_secs as f64);
        Duration::from_secs_f64(capped)
    }
}

/// One recorded recovery attempt. Immutable once recorded; appended to the
/// per-node history in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub id: Uuid,
    pub node_id: String,
    pub action_kind: ActionKind,
    /// 1-based within the current failure episode
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
    /// Whether the action itself ran successfully. Validation of the node's
    /// health afterwards is reported separately on the outcome event.
    pub success: bool,
    /// Captured stdout/stderr or structured diagnostic
    pub detail: String,
}

/// Mutable recovery state, owned exclusively by the node's state machine.
#[derive(Debug)]
pub struct RecoveryState {
    pub phase: Phase,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Backoff deadline; engine-internal, measured on the tokio clock
    pub next_eligible_at: Option<tokio::time::Instant>,
    /// Append-only attempt history, retained across episodes for audit
    pub history: Vec<RecoveryAttempt>,
}

impl RecoveryState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Healthy,
            attempt_count: 0,
            last_attempt_at: None,
            next_eligible_at: None,
            history: Vec::new(),
        }
    }

    /// Reset counters on a verified-healthy transition. History is kept.
    pub fn reset(&mut self) {
        self.phase = Phase::Healthy;
        self.attempt_count = 0;
        self.next_eligible_at = None;
    }
}

impl Default for RecoveryState {
    fn default() -> Self {
        Self::new()
    }
}

/// Action choice for attempt `k` over an ordered preference list: start at
/// `(k-1) mod N` and fall through kinds the episode's failure type rules
/// out, without consuming an attempt.
pub fn select_action_kind(
    kinds: &[ActionKind],
    attempt: u32,
    compatible: impl Fn(ActionKind) -> bool,
) -> Option<ActionKind> {
    if kinds.is_empty() {
        return None;
    }
    let n = kinds.len();
    let start = (attempt.saturating_sub(1) as usize) % n;
    (0..n)
        .map(|offset| kinds[(start + offset) % n])
        .find(|kind| compatible(*kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::ActionKind::*;

    #[test]
    fn backoff_sequence_is_exact() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay_secs: 10,
            backoff_multiplier: 2.0,
            max_delay_secs: 300,
        };
        let delays: Vec<u64> = (1..=7)
            .map(|k| policy.delay_for_attempt(k).as_secs())
            .collect();
        assert_eq!(delays, vec![10, 20, 40, 80, 160, 300, 300]);
    }

    #[test]
    fn backoff_first_attempt_is_initial_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for_attempt(1),
            Duration::from_secs(policy.initial_delay_secs)
        );
    }

    #[test]
    fn action_selection_wraps_modulo_list_length() {
        let kinds = [ServiceRestart, Orchestrator, Script];
        let picked: Vec<ActionKind> = (1..=7)
            .filter_map(|k| select_action_kind(&kinds, k, |_| true))
            .collect();
        assert_eq!(
            picked,
            vec![
                ServiceRestart,
                Orchestrator,
                Script,
                ServiceRestart,
                Orchestrator,
                Script,
                ServiceRestart
            ]
        );
    }

    #[test]
    fn incompatible_actions_fall_through_in_order() {
        let kinds = [ServiceRestart, Orchestrator, Script];
        // First preference ruled out: attempt 1 falls through to the next.
        let picked = select_action_kind(&kinds, 1, |k| k != ServiceRestart);
        assert_eq!(picked, Some(Orchestrator));
        // Nothing compatible at all.
        let picked = select_action_kind(&kinds, 1, |_| false);
        assert_eq!(picked, None);
    }

    #[test]
    fn reset_keeps_history() {
        let mut state = RecoveryState::new();
        state.attempt_count = 3;
        state.phase = Phase::Escalated;
        state.history.push(RecoveryAttempt {
            id: Uuid::new_v4(),
            node_id: "kafka-1".to_string(),
            action_kind: ServiceRestart,
            attempt_number: 1,
            started_at: Utc::now(),
            ended_at: Utc::now(),
            exit_status: Some(0),
            success: true,
            detail: String::new(),
        });
        state.reset();
        assert_eq!(state.phase, Phase::Healthy);
        assert_eq!(state.attempt_count, 0);
        assert_eq!(state.history.len(), 1);
    }
}
