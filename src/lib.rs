pub mod actions;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod monitor;
pub mod probes;
pub mod recovery;
pub mod services;
pub mod sink;
pub mod supervisor;

pub use config::AppConfig;
pub use coordination::ShutdownController;
pub use domain::{
    ActionKind, EscalationEvent, FailureEvent, FailureType, HealthStatus, HealthTransition,
    MonitorEvent, NodeDescriptor, NodeKind, Phase, ProbeKind, RecoveryAttempt,
    RecoveryOutcomeEvent, RetryPolicy,
};
pub use error::{Result, VigilError};
pub use monitor::{HealthAggregator, HealthDispatcher};
pub use probes::{Probe, ProbeRegistry};
pub use recovery::{ActionExecutor, CascadeGuard, NodeContext};
pub use sink::{EventBus, EventSink, LogSink, WebhookSink};
