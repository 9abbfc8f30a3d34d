//! Error types for registry and routing operations.

use crate::kv::KvError;
use crate::transport::TransportError;
use crate::validation::ValidationError;
use thiserror::Error;

/// Main error type for subscription operations.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Invalid subscription: {0}")]
    Validation(#[from] ValidationError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Subscription store failure: {0}")]
    Store(#[from] KvError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SubscriptionError {
    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SubscriptionError::Validation(_) => "validation",
            SubscriptionError::BadRequest(_) => "bad_request",
            SubscriptionError::MissingHeader(_) => "missing_header",
            SubscriptionError::Transport(_) => "transport_failure",
            SubscriptionError::Store(_) => "store_failure",
            SubscriptionError::Serialization(_) => "serialization",
            SubscriptionError::Deserialization(_) => "deserialization",
            SubscriptionError::InvalidConfig(_) => "invalid_config",
            SubscriptionError::Io(_) => "io",
        }
    }
}

impl From<serde_json::Error> for SubscriptionError {
    fn from(e: serde_json::Error) -> Self {
        SubscriptionError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for SubscriptionError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        SubscriptionError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for SubscriptionError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        SubscriptionError::Deserialization(e.to_string())
    }
}

/// Result type for subscription operations.
pub type Result<T> = std::result::Result<T, SubscriptionError>;
