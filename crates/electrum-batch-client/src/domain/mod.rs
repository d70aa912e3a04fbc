//! Domain layer: request items, category queues, the rate window and errors.

pub mod entities;
pub mod errors;
pub mod rate_window;

pub use entities::{AbortGroup, BatchRequestItem, RejectFn, ResolveFn, ResponseFn};
pub(crate) use entities::{CategoryState, Effect, InternalItem};
pub use errors::ClientError;
pub use rate_window::{RateSample, RateWindow};
