//! # Domain Errors
//!
//! Error types for the batch client. Errors are `Clone` because one
//! failure (a disconnect, an abort) is fanned out to many request items.

use shared_types::ErrorKind;
use thiserror::Error;

/// Batch client error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Node URL is not a usable WebSocket URL.
    #[error("Expecting electrum-node to be a valid websocket url, got: {0}")]
    InvalidUrl(String),

    /// No category registered under this name.
    #[error("Unknown category name: {0}")]
    UnknownCategory(String),

    /// A category with this name already exists.
    #[error("Batch sender category exists: {0}")]
    CategoryExists(String),

    /// Category parameters cannot admit any request.
    #[error("Invalid category parameters: {0}")]
    InvalidCategory(String),

    /// Transport is down or the request could not be delivered.
    #[error("Network error: {0}")]
    Network(String),

    /// Request was cancelled through its abort signal.
    #[error("Request aborted")]
    Aborted,

    /// Server answered with a JSON-RPC error.
    #[error("RPC error ({code}): {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// Server supplied message
        message: String,
    },

    /// Response could not be interpreted.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Client was shut down with `destroy()`.
    #[error("Client has been destroyed")]
    Destroyed,
}

impl ClientError {
    /// Map onto the shared error kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::InvalidUrl(_)
            | ClientError::UnknownCategory(_)
            | ClientError::CategoryExists(_)
            | ClientError::InvalidCategory(_)
            | ClientError::Destroyed => ErrorKind::Validation,
            ClientError::Network(_) => ErrorKind::Network,
            ClientError::Aborted => ErrorKind::Aborted,
            ClientError::Rpc { .. } | ClientError::MalformedResponse(_) => ErrorKind::Data,
        }
    }

    /// True for the benign abort outcome.
    pub fn is_aborted(&self) -> bool {
        matches!(self, ClientError::Aborted)
    }

    /// Error used when the node is not reachable.
    pub fn disconnected() -> Self {
        ClientError::Network("Unable to send request to a disconnected server".to_string())
    }
}
