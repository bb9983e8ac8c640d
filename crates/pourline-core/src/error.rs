use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("network error: {0}")]
    Network(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("beverage {0} has no valve mapping")]
    NoValve(String),

    #[error("quantity {quantity} needs a pour longer than the {limit_secs}s limit")]
    PourTooLong { quantity: i64, limit_secs: f64 },

    #[error("hardware unavailable: {0}")]
    HardwareUnavailable(String),

    #[error("actuation fault on pin {pin}: {reason}")]
    ActuationFault { pin: u32, reason: String },

    #[error("pin {0} is not a configured valve channel")]
    UnknownChannel(u32),

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// Errors the dispatcher answers with the backoff interval.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Protocol(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
