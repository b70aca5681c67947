//! Payload codecs for each frame type (§3, §6): Init, Call/CallCont, and Error.

pub mod call;
pub mod error_frame;
pub mod headers;
pub mod init;

pub use call::{CallContHeader, CallReqHeader, CallResHeader, ResponseCode};
pub use error_frame::ErrorPayload;
pub use init::InitPayload;
