//! # Error Types
//!
//! Error handling for the client transport and session handshake.
//!
//! This module defines every failure the crate can surface, from a single
//! undecodable datagram up to a session-ending I/O or authentication failure.
//!
//! ## Error Categories
//! - **Per-datagram**: `MalformedPacket`, `UnknownCommand`, `CommandDecode`.
//!   The receive pipeline logs these and keeps going.
//! - **Send-side**: `CommandEncode`, `Io`, `NotConnected`.
//! - **Session-ending**: `Io` on receive, `Connect`, `HandshakeFailure`,
//!   `AccessDenied`, `ConnectionClosed`.
//!
//! ## Example Usage
//! ```rust
//! use minetest_protocol::core::packet::Packet;
//! use minetest_protocol::error::ProtocolError;
//! use tracing::warn;
//!
//! match Packet::from_bytes(&[0xde, 0xad, 0xbe, 0xef, 0x00]) {
//!     Ok(packet) => println!("{packet:?}"),
//!     Err(ProtocolError::MalformedPacket(reason)) => warn!(reason, "dropping datagram"),
//!     Err(e) => warn!(error = %e, "unexpected error"),
//! }
//! ```

use bytes::Bytes;
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Envelope validation errors
    pub const ERR_SHORT_ENVELOPE: &str = "datagram shorter than the packet envelope";
    pub const ERR_BAD_PROTOCOL_ID: &str = "protocol marker mismatch";
    pub const ERR_UNKNOWN_PACKET_TYPE: &str = "unknown packet type";
    pub const ERR_UNKNOWN_SUB_TYPE: &str = "unknown reliable sub-type";
    pub const ERR_UNKNOWN_CONTROL_TYPE: &str = "unknown control type";
    pub const ERR_TRUNCATED_CONTROL: &str = "truncated control body";
    pub const ERR_TRUNCATED_RELIABLE: &str = "truncated reliable header";
    pub const ERR_TRUNCATED_SPLIT: &str = "truncated split header";
    pub const ERR_TRUNCATED_COMMAND: &str = "payload shorter than a command id";
    pub const ERR_BAD_CHUNK_INDEX: &str = "split chunk index outside chunk count";

    /// Connection errors
    pub const ERR_ALREADY_STARTED: &str = "connection already started";

    /// Handshake errors
    pub const ERR_MISSING_SECRETS: &str = "server challenge received before SRP initiation";
}

/// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connect error: {0}")]
    Connect(String),

    #[error("Malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error("Unknown command 0x{id:04x} ({} payload bytes)", payload.len())]
    UnknownCommand { id: u16, payload: Bytes },

    #[error("Failed to decode {command}: {reason}")]
    CommandDecode {
        command: &'static str,
        reason: String,
    },

    #[error("Failed to encode {command}: {reason}")]
    CommandEncode {
        command: &'static str,
        reason: String,
    },

    #[error("Handshake failed: {0}")]
    HandshakeFailure(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Connection has not been started")]
    NotConnected,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether the receive pipeline may drop the offending datagram and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::MalformedPacket(_)
                | ProtocolError::UnknownCommand { .. }
                | ProtocolError::CommandDecode { .. }
        )
    }

    pub(crate) fn decode(command: &'static str, reason: impl Into<String>) -> Self {
        ProtocolError::CommandDecode {
            command,
            reason: reason.into(),
        }
    }

    pub(crate) fn encode(command: &'static str, reason: impl Into<String>) -> Self {
        ProtocolError::CommandEncode {
            command,
            reason: reason.into(),
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn per_datagram_errors_are_recoverable() {
        assert!(ProtocolError::MalformedPacket(constants::ERR_BAD_PROTOCOL_ID).is_recoverable());
        assert!(ProtocolError::UnknownCommand {
            id: 0x99,
            payload: Bytes::new()
        }
        .is_recoverable());
        assert!(ProtocolError::decode("Hello", "short").is_recoverable());
        assert!(!ProtocolError::HandshakeFailure("bad proof".into()).is_recoverable());
        assert!(!ProtocolError::Io(io::Error::other("gone")).is_recoverable());
    }

    #[test]
    fn unknown_command_message_shows_hex_id() {
        let err = ProtocolError::UnknownCommand {
            id: 0x4b,
            payload: Bytes::from_static(&[1, 2, 3]),
        };
        assert_eq!(err.to_string(), "Unknown command 0x004b (3 payload bytes)");
    }
}
