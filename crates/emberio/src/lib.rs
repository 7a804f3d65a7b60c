//! `emberio`: async framing for the ember wire protocol.
//!
//! Frames are ASCII payloads terminated by a single NUL byte (`\x00`); there
//! is no length prefix. A `\n` immediately before the NUL is tolerated and
//! stripped. Decoders return `bytes::Bytes` slices that reference the read
//! buffer, so parsing does not copy.

pub mod packet;

pub use packet::{PacketReader, PacketWriter};
