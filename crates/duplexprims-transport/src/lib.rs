//! Message-oriented transport contract.
//!
//! Describes the capability surface duplexprims consumes from a full-duplex,
//! message-oriented connection (a WebSocket, typically):
//! - discrete send/receive of framed messages
//! - an explicit close handshake, with a half-close of the output side
//! - an observable connection state
//!
//! This is the lowest layer of duplexprims. Connecting, handshaking and the
//! transport's own state machine live with whoever implements
//! [`MessageTransport`]; everything else builds on top of the trait defined here.

pub mod close;
pub mod error;
pub mod traits;

#[cfg(feature = "testing")]
pub mod testing;

pub use close::{
    close_status_name, ENDPOINT_UNAVAILABLE, INTERNAL_SERVER_ERROR, INVALID_PAYLOAD_DATA,
    MESSAGE_TOO_BIG, NORMAL_CLOSURE, POLICY_VIOLATION, PROTOCOL_ERROR,
};
pub use error::{Result, TransportError};
pub use traits::{MessageKind, MessageTransport, Received, TransportState};
