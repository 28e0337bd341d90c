use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::domain::{
    ActionKind, NodeAddress, NodeDescriptor, NodeKind, ProbeKind, RetryPolicy,
};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
    #[serde(default)]
    pub cascade: CascadeConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Status server port; server disabled when unset
    #[serde(default)]
    pub status_port: Option<u16>,
    /// Supervised cluster topology
    pub nodes: Vec<NodeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between health-check cycles (default: 30)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Hard deadline per probe invocation in seconds (default: 15)
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Consecutive failures before a node counts as failed (default: 1;
    /// raise to suppress flapping false positives)
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Cap on concurrently checked nodes; 0 means unbounded
    #[serde(default)]
    pub max_concurrent_checks: usize,
}

fn default_interval_secs() -> u64 {
    30
}

fn default_probe_timeout_secs() -> u64 {
    15
}

fn default_failure_threshold() -> u32 {
    1
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            failure_threshold: default_failure_threshold(),
            max_concurrent_checks: 0,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryConfig {
    /// Global retry policy; nodes may override it
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Seconds to let a recovery action take hold before validating
    /// (default: 10)
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,
    /// Hard deadline for one action execution in seconds (default: 60)
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,
    /// Apply ±10% jitter to backoff delays (default: false, keeping the
    /// backoff sequence exact)
    #[serde(default)]
    pub backoff_jitter: bool,
}

fn default_settle_delay_secs() -> u64 {
    10
}

fn default_action_timeout_secs() -> u64 {
    60
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            settle_delay_secs: default_settle_delay_secs(),
            action_timeout_secs: default_action_timeout_secs(),
            backoff_jitter: false,
        }
    }
}

impl RecoveryConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionsConfig {
    /// Restart command template; placeholders `{node_id}`, `{host}`,
    /// `{port}`, `{service}`, `{kind}`
    #[serde(default = "default_restart_command")]
    pub restart_command: String,
    /// Orchestration command template; the orchestrator action is only
    /// registered when set
    #[serde(default)]
    pub orchestrator_command: Option<String>,
    /// Recovery script path; the script action is only registered when set
    #[serde(default)]
    pub script_path: Option<String>,
}

fn default_restart_command() -> String {
    "ssh {host} systemctl restart {service}".to_string()
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            restart_command: default_restart_command(),
            orchestrator_command: None,
            script_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CascadeConfig {
    /// Sliding window over failure transitions in seconds (default: 300)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Fraction of the cluster failing within the window that triggers
    /// conservative mode (default: 0.5)
    #[serde(default = "default_failure_fraction")]
    pub failure_fraction: f64,
    /// Mandatory delay between recoveries while conservative, in seconds
    /// (default: 120)
    #[serde(default = "default_inter_recovery_delay_secs")]
    pub inter_recovery_delay_secs: u64,
}

fn default_window_secs() -> u64 {
    300
}

fn default_failure_fraction() -> f64 {
    0.5
}

fn default_inter_recovery_delay_secs() -> u64 {
    120
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            failure_fraction: default_failure_fraction(),
            inter_recovery_delay_secs: default_inter_recovery_delay_secs(),
        }
    }
}

impl CascadeConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn inter_recovery_delay(&self) -> Duration {
        Duration::from_secs(self.inter_recovery_delay_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Webhook endpoint for JSON event notifications
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Minimum interval between duplicate notifications (default: 60s)
    #[serde(default = "default_rate_limit_secs")]
    pub rate_limit_secs: u64,
}

fn default_rate_limit_secs() -> u64 {
    60
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            rate_limit_secs: default_rate_limit_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// One node in the topology file.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeEntry {
    pub id: String,
    pub kind: NodeKind,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub admin_port: Option<u16>,
    /// Probes to run, in order
    pub probes: Vec<ProbeKind>,
    /// Recovery actions, in preference order
    pub actions: Vec<ActionKind>,
    /// Per-node retry policy override
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

impl NodeEntry {
    pub fn to_descriptor(&self) -> NodeDescriptor {
        NodeDescriptor {
            node_id: self.id.clone(),
            kind: self.kind,
            address: NodeAddress {
                host: self.host.clone(),
                port: self.port,
                admin_port: self.admin_port,
            },
            probe_kinds: self.probes.clone(),
            action_kinds: self.actions.clone(),
            retry_policy: self.retry.clone(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("VIGIL_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Local overrides
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Environment variables: VIGIL__MONITOR__INTERVAL_SECS etc.
            .add_source(Environment::with_prefix("VIGIL").separator("__"));

        builder.build()?.try_deserialize()
    }

    /// Parse configuration from a TOML string. Used by tests and the
    /// `validate` command's stdin mode.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [[nodes]]
        id = "kafka-1"
        kind = "broker"
        host = "10.0.0.5"
        port = 9092
        probes = ["tcp", "broker_api"]
        actions = ["service_restart"]
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = AppConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(cfg.monitor.interval_secs, 30);
        assert_eq!(cfg.monitor.probe_timeout_secs, 15);
        assert_eq!(cfg.monitor.failure_threshold, 1);
        assert_eq!(cfg.recovery.retry.max_attempts, 3);
        assert_eq!(cfg.recovery.retry.initial_delay_secs, 10);
        assert_eq!(cfg.cascade.failure_fraction, 0.5);
        assert!(cfg.status_port.is_none());
        assert_eq!(cfg.nodes.len(), 1);
    }

    #[test]
    fn node_entry_builds_descriptor() {
        let cfg = AppConfig::from_toml_str(MINIMAL).unwrap();
        let node = cfg.nodes[0].to_descriptor();
        assert_eq!(node.node_id, "kafka-1");
        assert_eq!(node.kind, NodeKind::Broker);
        assert_eq!(node.address.port, 9092);
        assert_eq!(node.probe_kinds, vec![ProbeKind::Tcp, ProbeKind::BrokerApi]);
        assert_eq!(node.action_kinds, vec![ActionKind::ServiceRestart]);
        assert!(node.retry_policy.is_none());
    }

    #[test]
    fn per_node_retry_override_is_parsed() {
        let raw = r#"
            [recovery.retry]
            max_attempts = 5

            [[nodes]]
            id = "zk-1"
            kind = "coordination_node"
            host = "10.0.0.6"
            port = 2181
            admin_port = 8080
            probes = ["tcp", "status_word"]
            actions = ["service_restart", "script"]

            [nodes.retry]
            max_attempts = 2
            initial_delay_secs = 5
            backoff_multiplier = 3.0
            max_delay_secs = 60
        "#;
        let cfg = AppConfig::from_toml_str(raw).unwrap();
        assert_eq!(cfg.recovery.retry.max_attempts, 5);
        let node = cfg.nodes[0].to_descriptor();
        let policy = node.retry_policy.unwrap();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.initial_delay_secs, 5);
        assert_eq!(node.address.admin_port(), 8080);
    }

    #[test]
    fn missing_nodes_section_is_an_error() {
        assert!(AppConfig::from_toml_str("[monitor]\ninterval_secs = 10").is_err());
    }
}
