//! # Service Layer
//!
//! High-level session glue over the transport and protocol layers.

pub mod media;
pub mod session;
