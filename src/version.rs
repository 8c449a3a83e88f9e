//! Format versioning constants for graph snapshots.
//!
//! The node stream layout is stable as long as type tags are stable. Bump
//! the version whenever the framing or the node protocol changes.

/// Current format version of the node stream and its envelope.
pub const GRAPH_FORMAT_VERSION: u16 = 1;

/// Magic bytes for plain snapshot envelopes.
pub const GRAPH_BINARY_MAGIC: [u8; 4] = *b"SGRF";

/// Magic bytes for HMAC-sealed snapshot envelopes.
pub const SEALED_BINARY_MAGIC: [u8; 4] = *b"SGRA";
