//! # Registry Errors
//!
//! One failed fetch is delivered to every coalesced listener, so errors are
//! `Clone` and carry strings instead of boxed sources.

use bcmr_authchain::AuthChainError;
use shared_types::ErrorKind;
use thiserror::Error;

/// Token registry error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Token id is not a 32-byte hex hash.
    #[error("Invalid token id: {0}")]
    InvalidTokenId(String),

    /// No electrum client is connected.
    #[error("client is not available!")]
    ClientUnavailable,

    /// Authentication chain lookup failed.
    #[error("Authchain lookup failed: {0}")]
    AuthChain(#[from] AuthChainError),

    /// The chain carries no metadata pointer.
    #[error("No BCMR found!")]
    NoRecord,

    /// None of the pointer's URLs is an https URL.
    #[error("The bcmr has no https url!")]
    NoHttpsUrl,

    /// Download failed before a response arrived.
    #[error("Failed loading token BCMR from {url}: {message}")]
    Http {
        /// Requested URL
        url: String,
        /// Transport error
        message: String,
    },

    /// Server answered with a status other than 200.
    #[error("Failed loading token BCMR, Expecting 200 OK response from https request, url: {url} , got: {status}, output body: {excerpt}")]
    HttpStatus {
        /// Requested URL
        url: String,
        /// Status code
        status: u16,
        /// Start of the response body
        excerpt: String,
    },

    /// Document hash differs from the on-chain content hash.
    #[error("The content of http response does not match with the authenticated data (content_hash).")]
    HashMismatch,

    /// Document is not a registry.
    #[error("Failed to parse token BCMR: {0}")]
    InvalidDocument(String),

    /// Registry has no identities.
    #[error("Identity for the target token is not defined!")]
    NoIdentities,

    /// A snapshot names another token category.
    #[error("The input identity has one or more category that do not match with the target token_id.")]
    CategoryMismatch,

    /// No snapshot is dated at or before the requested time.
    #[error("The identity does not have a current identity, This error may be caused by having an incorrect time in your local machine.")]
    NoCurrentIdentity,

    /// The current snapshot describes no token.
    #[error("The current identity of the token has no token!")]
    MissingToken,
}

impl RegistryError {
    /// Map onto the shared error kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthChain(e) => e.kind(),
            Self::NoRecord => ErrorKind::NotFound,
            Self::ClientUnavailable | Self::Http { .. } | Self::HttpStatus { .. } => {
                ErrorKind::Network
            }
            Self::InvalidTokenId(_)
            | Self::NoHttpsUrl
            | Self::HashMismatch
            | Self::InvalidDocument(_)
            | Self::NoIdentities => ErrorKind::Validation,
            Self::CategoryMismatch | Self::NoCurrentIdentity | Self::MissingToken => {
                ErrorKind::Data
            }
        }
    }
}
