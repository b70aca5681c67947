//! Call state machines (§4.5): four small machines cover the two roles
//! (reading a request / writing a response on the receiving side; writing a
//! request / reading a response on the initiating side) that every
//! connection needs, since either peer may initiate a call at any time.

pub mod inbound;
pub mod outbound;

pub use inbound::{InboundCall, InboundResponse};
pub use outbound::{OutboundCall, OutboundResponse};
