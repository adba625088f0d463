//! Error types for coordlist

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Membership Errors ===
    #[error("Server not found: {0}")]
    NotFound(String),

    #[error("Server no longer up: {0}")]
    ServerNotUp(String),

    // === Durable Log Errors ===
    #[error("Durable log error: {0}")]
    DurableLog(String),

    #[error("Corrupted record: {0}")]
    Corrupted(String),

    // === Transport Errors ===
    #[error("RPC failed: {0}")]
    Rpc(String),

    // === Backup Selection Errors ===
    #[error("No coordinator configured, replication requirements can't be met")]
    NoCoordinator,

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Rpc(_))
    }
}

// Implement From for common error types
impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}
