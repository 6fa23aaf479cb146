//! Error types for the swap agent

use crate::swap::ChainKind;

use thiserror::Error;

/// Main error type for the swap agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown swap token: {token}")]
    UnknownToken { token: String },

    #[error("No swap family {family} configured (token {token})")]
    UnknownFamily { token: String, family: String },

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Submission to {chain} chain failed: {message}")]
    Submission { chain: ChainKind, message: String },

    #[error("Nonce error for {chain} chain: {message}")]
    Nonce { chain: ChainKind, message: String },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Chain connection error for {chain} chain: {message}")]
    ChainConnection { chain: ChainKind, message: String },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Event parsing error: {0}")]
    EventParsing(String),

    #[error("Swap {hash_key} not found")]
    SwapNotFound { hash_key: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Check if the caller may retry the action with a fresh nonce
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::Submission { .. }
                | AgentError::ChainConnection { .. }
                | AgentError::Timeout { .. }
                | AgentError::Nonce { .. }
        )
    }

    /// Errors that abort agent construction
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AgentError::Config(_) | AgentError::UnknownToken { .. } | AgentError::UnknownFamily { .. }
        )
    }
}

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_failures_are_retryable() {
        let err = AgentError::Submission {
            chain: ChainKind::Companion,
            message: "nonce too low".to_string(),
        };
        assert!(err.is_retryable());
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_precondition_and_encoding_are_not_retryable() {
        assert!(!AgentError::Precondition("no preimage".into()).is_retryable());
        assert!(!AgentError::Encoding("unknown function".into()).is_retryable());
        assert!(AgentError::UnknownToken { token: "DAI".into() }.is_configuration());
    }
}
