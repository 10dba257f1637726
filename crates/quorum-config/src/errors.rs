use thiserror::Error;

/// Raised during orchestrator construction when configuration is invalid.
/// Never raised once coordination is underway.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("agent_weights names unknown agent id {0:?}")]
    UnknownWeightedAgent(String),
    #[error("agent_weights values must be positive")]
    NonPositiveWeight,
    #[error("max_duration_seconds must be positive")]
    InvalidDuration,
    #[error("max_attempts_per_round must be positive")]
    InvalidAttempts,
}
