//! Ports layer: the client API (inbound) and the RPC transport (outbound).

pub mod inbound;
pub mod outbound;

pub use inbound::{ConnectionListener, ElectrumApi};
pub use outbound::{
    ConnectionStatus, MockResponder, MockTransport, Transport, TransportEvent, TransportEvents,
    WireRequest,
};
