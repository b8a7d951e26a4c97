//! Shared error and result types

use thiserror::Error;

/// Errors produced by floodgate subsystems
#[derive(Debug, Error)]
pub enum FloodgateError {
    /// Queue transport (NATS / JetStream) failures
    #[error("Transport error: {0}")]
    Transport(String),

    /// Durable store (MongoDB) failures
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, FloodgateError>;
