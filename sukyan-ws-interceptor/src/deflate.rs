//! permessage-deflate (RFC 7692) payload codec for RSV1-marked frames.
//!
//! The extension strips the trailing `00 00 FF FF` sync-flush marker before
//! transmission and the receiver must re-append it before inflating.

use flate2::write::{DeflateDecoder, DeflateEncoder};
use flate2::Compression;
use std::io::Write;
use thiserror::Error;

const DEFLATE_TAIL: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

#[derive(Debug, Error)]
pub enum DeflateError {
    #[error("failed to inflate permessage-deflate payload: {0}")]
    Inflate(String),
    #[error("failed to deflate payload: {0}")]
    Deflate(String),
}

/// Decompresses an RSV1 frame payload. On failure the caller should log and
/// fall back to the original bytes per spec §8's boundary case -- this
/// function itself stays a pure `Result` so that policy lives at the call
/// site.
pub fn inflate(payload: &[u8]) -> Result<Vec<u8>, DeflateError> {
    let mut input = Vec::with_capacity(payload.len() + DEFLATE_TAIL.len());
    input.extend_from_slice(payload);
    input.extend_from_slice(&DEFLATE_TAIL);

    let mut decoder = DeflateDecoder::new(Vec::new());
    decoder
        .write_all(&input)
        .map_err(|e| DeflateError::Inflate(e.to_string()))?;
    decoder.finish().map_err(|e| DeflateError::Inflate(e.to_string()))
}

/// Compresses a payload for retransmission as an RSV1 frame, stripping the
/// sync-flush tail the decoder expects the receiver to re-add.
pub fn deflate(payload: &[u8]) -> Result<Vec<u8>, DeflateError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(payload)
        .map_err(|e| DeflateError::Deflate(e.to_string()))?;
    let mut compressed = encoder
        .finish()
        .map_err(|e| DeflateError::Deflate(e.to_string()))?;
    if compressed.ends_with(&DEFLATE_TAIL) {
        compressed.truncate(compressed.len() - DEFLATE_TAIL.len());
    }
    Ok(compressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_deflate_and_inflate() {
        let original = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let compressed = deflate(&original).expect("deflate should succeed");
        let restored = inflate(&compressed).expect("inflate should succeed");
        assert_eq!(restored, original);
    }

    #[test]
    fn garbage_input_fails_to_inflate() {
        let garbage = vec![0xFFu8; 16];
        assert!(inflate(&garbage).is_err());
    }
}
