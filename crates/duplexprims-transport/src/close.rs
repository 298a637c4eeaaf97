//! Close status codes.
//!
//! Codes 1000-2999 are reserved for protocol use.
//! Codes 4000-4999 are available for application-defined use.

/// The purpose for which the connection was established has been fulfilled.
pub const NORMAL_CLOSURE: u16 = 1000;

/// The endpoint is going away (server shutdown, page navigation).
pub const ENDPOINT_UNAVAILABLE: u16 = 1001;

/// The peer violated the message protocol.
pub const PROTOCOL_ERROR: u16 = 1002;

/// A message carried data inconsistent with its type.
pub const INVALID_PAYLOAD_DATA: u16 = 1007;

/// A message violated the endpoint's policy.
pub const POLICY_VIOLATION: u16 = 1008;

/// A message was too large to process.
pub const MESSAGE_TOO_BIG: u16 = 1009;

/// The endpoint hit an unexpected condition.
pub const INTERNAL_SERVER_ERROR: u16 = 1011;

/// First application-defined close status.
pub const APPLICATION_STATUS_START: u16 = 4000;

/// Returns a human-readable name for a close status.
pub fn close_status_name(status: u16) -> &'static str {
    match status {
        NORMAL_CLOSURE => "NORMAL_CLOSURE",
        ENDPOINT_UNAVAILABLE => "ENDPOINT_UNAVAILABLE",
        PROTOCOL_ERROR => "PROTOCOL_ERROR",
        INVALID_PAYLOAD_DATA => "INVALID_PAYLOAD_DATA",
        POLICY_VIOLATION => "POLICY_VIOLATION",
        MESSAGE_TOO_BIG => "MESSAGE_TOO_BIG",
        INTERNAL_SERVER_ERROR => "INTERNAL_SERVER_ERROR",
        1000..=2999 => "RESERVED",
        APPLICATION_STATUS_START..=4999 => "APPLICATION",
        _ => "UNKNOWN",
    }
}
