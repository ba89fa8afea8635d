//! # Minetest Protocol
//!
//! Client-side transport and session handshake for the Minetest UDP
//! protocol.
//!
//! The crate is layered bottom-up:
//!
//! - [`core`]: the packet envelope codec, reliable sequence numbers and
//!   split-message reassembly
//! - [`protocol`]: typed client and server commands, the id registry and
//!   the SRP handshake state machine
//! - [`transport`]: the UDP connection engine with its receive and parse
//!   tasks and subscriber fan-out
//! - [`service`]: a [`Session`](service::session::Session) that wires a
//!   connection to its handshake
//!
//! SRP arithmetic is not part of this crate. Callers plug an implementation
//! in through [`SrpClient`](protocol::handshake::SrpClient).
//!
//! ## Example
//!
//! ```no_run
//! use minetest_protocol::config::NetworkConfig;
//! use minetest_protocol::protocol::handshake::SrpClient;
//! use minetest_protocol::service::session::Session;
//! use minetest_protocol::transport::fanout::Event;
//!
//! # async fn example<S: SrpClient>(srp: S) -> minetest_protocol::error::Result<()> {
//! let config = NetworkConfig::from_env()?;
//! minetest_protocol::init_logging(&config.logging)?;
//!
//! let mut session = Session::new(&config, srp);
//! let mut events = session.subscribe(256);
//! session.connect().await?;
//!
//! while let Some(Event::Command(command)) = events.recv().await {
//!     tracing::info!(command = command.name(), "Received");
//! }
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::core::packet::{Body, Control, Packet, PacketType, Payload, Reliable, SplitFragment};
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::commands::{ClientCommand, ServerCommand};
pub use crate::transport::connection::Connection;
pub use crate::transport::fanout::Event;
pub use crate::utils::logging::init_logging;
