//! Core data model shared across the monitoring and recovery engines.

pub mod events;
pub mod health;
pub mod node;
pub mod recovery;

pub use events::{
    EscalationEvent, FailureEvent, MonitorEvent, RecoveredEvent, RecoveryOutcomeEvent,
};
pub use health::{
    FailureType, HealthRecord, HealthStatus, HealthTransition, NodeSnapshot, SnapshotMap,
};
pub use node::{ActionKind, NodeAddress, NodeDescriptor, NodeKind, ProbeKind};
pub use recovery::{Phase, RecoveryAttempt, RecoveryState, RetryPolicy};
