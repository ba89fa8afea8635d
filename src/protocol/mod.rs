//! # Protocol Layer
//!
//! Typed application commands and the session handshake built on them.
//!
//! ## Components
//! - **Command**: the encode/decode contract and payload primitives
//! - **Commands**: closed client and server command sets
//! - **Registry**: static id-to-decoder tables for inbound dispatch
//! - **Handshake**: peer id and SRP authentication state machine
//!
//! ## Handshake Flow
//! 1. Client sends peer init; server assigns a peer id
//! 2. After a settle delay the client sends `Init` with its player name
//! 3. Server greets with `Hello`, advertising its auth mechanisms
//! 4. Client sends `SrpBytesA` (existing account) or `FirstSrp` (new account)
//! 5. Server answers `SrpBytesSB`; client sends the proof `SrpBytesM`
//! 6. Server sends `AuthAccept`; client confirms with `Init2`

pub mod command;
pub mod commands;
pub mod handshake;
pub mod registry;

#[cfg(test)]
mod tests;
