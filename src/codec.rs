//! Payload codec for persisted issue records.
//!
//! The store keeps each raw issue as an opaque blob. The codec contract is
//! kept apart from the storage layer so either side can change on its own:
//! [`PayloadCodec::encode`] turns a [`RawIssue`] into bytes and
//! [`PayloadCodec::decode`] reverses it exactly.

use thiserror::Error;

use crate::models::RawIssue;

/// Default zstd level. Issue payloads are small and written once per sync,
/// so the default trade-off is fine.
pub const DEFAULT_LEVEL: i32 = zstd::DEFAULT_COMPRESSION_LEVEL;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("compression: {0}")]
    Compression(#[from] std::io::Error),
}

/// Encodes raw issue payloads for storage.
pub trait PayloadCodec: Send + Sync {
    fn encode(&self, payload: &RawIssue) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<RawIssue, CodecError>;
}

/// JSON serialization compressed with zstd.
#[derive(Debug, Clone, Copy)]
pub struct ZstdJsonCodec {
    level: i32,
}

impl ZstdJsonCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdJsonCodec {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL)
    }
}

impl PayloadCodec for ZstdJsonCodec {
    fn encode(&self, payload: &RawIssue) -> Result<Vec<u8>, CodecError> {
        let json = serde_json::to_vec(payload)?;
        Ok(zstd::encode_all(json.as_slice(), self.level)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<RawIssue, CodecError> {
        let json = zstd::decode_all(bytes)?;
        Ok(serde_json::from_slice(&json)?)
    }
}
