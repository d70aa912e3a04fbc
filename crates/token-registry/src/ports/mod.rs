//! Ports layer: identity requests (inbound) and document download
//! (outbound).

pub mod inbound;
pub mod outbound;

pub use inbound::{
    ListenerLog, RecordingListener, RequestStatus, TokenIdentityListener, TokenIdentityLoader,
};
pub use outbound::{ContentFetcher, FetchResponse, MockContentFetcher};
