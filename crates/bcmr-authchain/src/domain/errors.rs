//! # Resolver Errors

use electrum_batch_client::ClientError;
use shared_types::{DecodeError, ErrorKind, StoreError};
use thiserror::Error;

/// Errors that can occur while resolving an authentication chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthChainError {
    /// Request to the electrum node failed.
    #[error("Electrum request failed: {0}")]
    Client(#[from] ClientError),

    /// Store read or write failed.
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    /// A fetched transaction could not be decoded.
    #[error("Failed to decode transaction {txid}: {source}")]
    Decode {
        /// Transaction id as requested
        txid: String,
        /// Decoder error
        source: DecodeError,
    },

    /// Node returned something other than what the method promises.
    #[error("Malformed response to {method}: {message}")]
    MalformedResponse {
        /// Method called
        method: String,
        /// Details
        message: String,
    },

    /// A chain link has no output #0 to follow.
    #[error("Transaction {0} has no output 0")]
    MissingZerothOutput(String),

    /// Stored memo violates its own invariants.
    #[error("Invalid authchain memo: {0}")]
    InvalidMemo(String),
}

impl AuthChainError {
    /// Map onto the shared error kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Client(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::Decode { .. } | Self::MissingZerothOutput(_) => ErrorKind::Validation,
            Self::MalformedResponse { .. } => ErrorKind::Data,
            Self::InvalidMemo(_) => ErrorKind::Invariant,
        }
    }

    pub(crate) fn malformed(method: &str, message: impl ToString) -> Self {
        Self::MalformedResponse {
            method: method.to_string(),
            message: message.to_string(),
        }
    }
}
