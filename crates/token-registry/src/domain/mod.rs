//! Domain layer: registry documents, identities and errors.

pub mod errors;
pub mod identity;
pub mod registry;

pub use errors::RegistryError;
pub use identity::{
    identity_from_snapshot, is_verified, native_bch_identity, rewrite_url, TokenIdentity,
};
pub use registry::{
    pull_identity_snapshot, validate_registry, IdentitySnapshot, Registry, TokenCategory,
};
