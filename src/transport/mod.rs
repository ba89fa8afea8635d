//! # Transport Layer
//!
//! UDP connection engine and the subscriber fan-out it feeds.
//!
//! ## Components
//! - **Connection**: socket ownership, receive and parse tasks, acks, sends
//! - **Fanout**: lossy broadcast of decoded events to bounded queues

pub mod connection;
pub mod fanout;
