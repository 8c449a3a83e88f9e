//! Framing for snapshot bytes.
//!
//! Plain layout: `magic(4) | version u16 | crc32 u32 | payload_len u32 | payload`.
//! Sealed layout: `magic(4) | version u16 | inner_len u32 | hmac(32) | plain envelope`.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{corrupt, GraphError, GraphResult};
use crate::version::{GRAPH_BINARY_MAGIC, GRAPH_FORMAT_VERSION, SEALED_BINARY_MAGIC};

const HEADER_LEN: usize = 14;
const SEALED_HEADER_LEN: usize = 42;

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 over a whole snapshot, used to tell snapshots apart in logs.
pub type SnapshotId = [u8; 32];

pub fn snapshot_id(bytes: &[u8]) -> SnapshotId {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

pub fn snapshot_id_hex(bytes: &[u8]) -> String {
    let id = snapshot_id(bytes);
    let mut output = String::with_capacity(id.len() * 2);
    for byte in id {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

pub(crate) fn wrap(payload: &[u8]) -> GraphResult<Vec<u8>> {
    let checksum = crc32fast::hash(payload);
    let payload_len = u32::try_from(payload.len())
        .map_err(|_| GraphError::ResourceLimit("snapshot too large for envelope".to_string()))?;

    let mut output = Vec::with_capacity(HEADER_LEN + payload.len());
    output.extend_from_slice(&GRAPH_BINARY_MAGIC);
    output.extend_from_slice(&GRAPH_FORMAT_VERSION.to_le_bytes());
    output.extend_from_slice(&checksum.to_le_bytes());
    output.extend_from_slice(&payload_len.to_le_bytes());
    output.extend_from_slice(payload);
    Ok(output)
}

/// Validates the header and checksum and returns the payload.
pub(crate) fn unwrap(input: &[u8]) -> GraphResult<&[u8]> {
    if input.len() < HEADER_LEN {
        return Err(corrupt("snapshot smaller than its header"));
    }
    if input[0..4] != GRAPH_BINARY_MAGIC {
        return Err(corrupt("missing snapshot magic bytes"));
    }
    let version = u16::from_le_bytes([input[4], input[5]]);
    if version != GRAPH_FORMAT_VERSION {
        return Err(GraphError::IncompatibleVersion {
            found: version,
            expected: GRAPH_FORMAT_VERSION,
        });
    }
    let checksum = u32::from_le_bytes([input[6], input[7], input[8], input[9]]);
    let payload_len = u32::from_le_bytes([input[10], input[11], input[12], input[13]]) as usize;
    let payload = &input[HEADER_LEN..];
    if payload.len() != payload_len {
        return Err(corrupt(format!(
            "payload length mismatch: header says {payload_len}, found {}",
            payload.len()
        )));
    }
    if crc32fast::hash(payload) != checksum {
        return Err(corrupt("payload checksum mismatch"));
    }
    Ok(payload)
}

/// Wraps a snapshot with an HMAC-SHA256 tag so tampering is detected before
/// any decoding happens.
pub fn seal(snapshot: &[u8], key: &[u8]) -> GraphResult<Vec<u8>> {
    let tag = compute_hmac_sha256(key, snapshot)?;
    let inner_len = u32::try_from(snapshot.len())
        .map_err(|_| GraphError::ResourceLimit("snapshot too large for envelope".to_string()))?;

    let mut output = Vec::with_capacity(SEALED_HEADER_LEN + snapshot.len());
    output.extend_from_slice(&SEALED_BINARY_MAGIC);
    output.extend_from_slice(&GRAPH_FORMAT_VERSION.to_le_bytes());
    output.extend_from_slice(&inner_len.to_le_bytes());
    output.extend_from_slice(&tag);
    output.extend_from_slice(snapshot);
    Ok(output)
}

/// Verifies a sealed snapshot and returns the inner (plain) snapshot bytes.
pub fn unseal<'a>(input: &'a [u8], key: &[u8]) -> GraphResult<&'a [u8]> {
    if key.is_empty() {
        return Err(GraphError::Config("authentication key is empty".to_string()));
    }
    if input.len() < SEALED_HEADER_LEN {
        return Err(corrupt("sealed snapshot smaller than its header"));
    }
    if input[0..4] != SEALED_BINARY_MAGIC {
        return Err(corrupt("missing sealed snapshot magic bytes"));
    }
    let version = u16::from_le_bytes([input[4], input[5]]);
    if version != GRAPH_FORMAT_VERSION {
        return Err(GraphError::IncompatibleVersion {
            found: version,
            expected: GRAPH_FORMAT_VERSION,
        });
    }
    let inner_len = u32::from_le_bytes([input[6], input[7], input[8], input[9]]) as usize;
    let tag = &input[10..SEALED_HEADER_LEN];
    let inner = &input[SEALED_HEADER_LEN..];
    if inner.len() != inner_len {
        return Err(corrupt("sealed snapshot length mismatch"));
    }
    verify_hmac_sha256(key, inner, tag)?;
    Ok(inner)
}

fn compute_hmac_sha256(key: &[u8], payload: &[u8]) -> GraphResult<[u8; 32]> {
    if key.is_empty() {
        return Err(GraphError::Config("authentication key is empty".to_string()));
    }
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| GraphError::Config("authentication key is invalid".to_string()))?;
    mac.update(payload);
    let bytes = mac.finalize().into_bytes();
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes.as_slice());
    Ok(out)
}

fn verify_hmac_sha256(key: &[u8], payload: &[u8], tag: &[u8]) -> GraphResult<()> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| GraphError::Config("authentication key is invalid".to_string()))?;
    mac.update(payload);
    mac.verify_slice(tag)
        .map_err(|_| GraphError::AuthenticationFailed)
}

#[cfg(test)]
#[path = "tests/envelope_tests.rs"]
mod tests;
