//! # Core Protocol Components
//!
//! Stateless wire codec plus the two small pieces of per-connection state
//! that sit directly under it.
//!
//! ## Components
//! - **Packet**: byte-exact envelope encode/decode
//! - **Split**: fragment reassembly and segmentation of oversized payloads
//! - **Sequence**: outbound reliable sequence numbers
//!
//! ## Wire Format
//! ```text
//! [ProtocolId(4)] [PeerId(2)] [Channel(1)] [PacketType(1)] [Body...]
//! ```
//!
//! ## Safety
//! - Every length is checked before it is read
//! - Incomplete split assemblies are bounded in number and lifetime

pub mod packet;
pub mod sequence;
pub mod split;
