//! Test doubles for code that consumes a [`MessageTransport`].
//!
//! - [`MockTransport`] replays scripted inbound messages and records every call
//!   made on it, for asserting exact call sequences.
//! - [`MemoryTransport`] is a connected in-memory pair that models the close
//!   handshake state machine, for end-to-end tests.
//!
//! [`MessageTransport`]: crate::MessageTransport

mod memory;
mod mock;

pub use memory::MemoryTransport;
pub use mock::{Call, MockReceive, MockTransport};
