use thiserror::Error;

/// Main error type for the supervision daemon
#[derive(Error, Debug)]
pub enum VigilError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Topology error: {0}")]
    Topology(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Plugin boundary errors
    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Recovery action error: {0}")]
    Action(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for VigilError
pub type Result<T> = std::result::Result<T, VigilError>;

/// Errors a probe can report for one check invocation. Always local to
/// that invocation; never aborts the surrounding cycle.
#[derive(Error, Debug, Clone)]
pub enum ProbeError {
    #[error("connect failed: {0}")]
    Connectivity(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl ProbeError {
    pub fn failure_type(&self) -> crate::domain::FailureType {
        match self {
            ProbeError::Connectivity(_) => crate::domain::FailureType::Connectivity,
            ProbeError::Protocol(_) => crate::domain::FailureType::ProtocolError,
            ProbeError::Timeout(_) => crate::domain::FailureType::Timeout,
        }
    }
}

/// Errors from invoking a recovery action. A spawn failure means the action
/// never ran; it still consumes a retry attempt.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("action misconfigured: {0}")]
    Misconfigured(String),
}

impl From<ProbeError> for VigilError {
    fn from(err: ProbeError) -> Self {
        VigilError::Probe(err.to_string())
    }
}

impl From<ActionError> for VigilError {
    fn from(err: ActionError) -> Self {
        VigilError::Action(err.to_string())
    }
}
