//! # Error Types
//!
//! Error kinds shared by every component, plus the errors raised by the
//! shared decoders and the store port.

use thiserror::Error;

/// Coarse classification every component error maps onto.
///
/// Lower layers only distinguish network from protocol failures; the
/// higher layers decide what is retried, swallowed or surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input or bad configuration. Never retried.
    Validation,
    /// Transport down or rate-limit exhaustion.
    Network,
    /// A legitimate "nothing there" outcome.
    NotFound,
    /// Early termination through an abort signal.
    Aborted,
    /// A document or record exists but has no usable content.
    Data,
    /// Programming error / unexpected state. Always fatal.
    Invariant,
}

/// Errors raised while decoding hex or transaction bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Input is not valid hex.
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// Decoded value has the wrong size.
    #[error("Invalid length: expected {expected}, got {got}")]
    InvalidLength {
        /// Expected byte length
        expected: usize,
        /// Actual byte length
        got: usize,
    },

    /// Ran out of bytes while reading a field.
    #[error("Unexpected end of data while reading {field} at offset {offset}")]
    UnexpectedEnd {
        /// Field being read
        field: &'static str,
        /// Byte offset of the read
        offset: usize,
    },

    /// Bytes left over after the locktime.
    #[error("Trailing bytes after transaction: {0}")]
    TrailingBytes(usize),

    /// Malformed token prefix on an output.
    #[error("Invalid token prefix: {0}")]
    InvalidTokenPrefix(String),
}

impl DecodeError {
    /// Map onto the shared error kinds.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Errors raised when a locking bytecode has no standard address form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Script is not P2PKH, P2SH20 or P2SH32.
    #[error("Locking bytecode is not a standard address: {0}")]
    NonStandard(String),
}

/// Storage operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// I/O error during read/write.
    #[error("Store I/O error: {message}")]
    IOError {
        /// Details
        message: String,
    },
    /// Record could not be encoded or decoded.
    #[error("Store serialization error: {message}")]
    SerializationError {
        /// Details
        message: String,
    },
    /// Store is not available (closed or never opened).
    #[error("Store unavailable")]
    Unavailable,
}

impl StoreError {
    /// Map onto the shared error kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SerializationError { .. } => ErrorKind::Data,
            _ => ErrorKind::Invariant,
        }
    }
}
