//! Partition payload encoding.

use bytes::Bytes;
use palisade_config::CodecKind;
use palisade_rbac::PartitionState;

use crate::error::{Result, SyncError};

/// Encodes and decodes partitions for the coordination store.
///
/// `postcard` is compact and the default; `json` keeps the stored blobs
/// readable with ordinary store tooling. Every instance sharing a store must
/// use the same codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionCodec {
    kind: CodecKind,
}

impl PartitionCodec {
    pub fn new(kind: CodecKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> CodecKind {
        self.kind
    }

    pub fn encode<S: PartitionState>(&self, state: &S) -> Result<Bytes> {
        let encoded = match self.kind {
            CodecKind::Postcard => postcard::to_allocvec(state).map_err(|e| e.to_string()),
            CodecKind::Json => serde_json::to_vec(state).map_err(|e| e.to_string()),
        };
        encoded.map(Bytes::from).map_err(|reason| SyncError::Codec {
            partition: S::KIND,
            reason,
        })
    }

    /// Decodes a partition. An empty payload is the empty partition.
    pub fn decode<S: PartitionState>(&self, data: &[u8]) -> Result<S> {
        if data.is_empty() {
            return Ok(S::default());
        }
        let decoded = match self.kind {
            CodecKind::Postcard => postcard::from_bytes(data).map_err(|e| e.to_string()),
            CodecKind::Json => serde_json::from_slice(data).map_err(|e| e.to_string()),
        };
        decoded.map_err(|reason| SyncError::Codec {
            partition: S::KIND,
            reason,
        })
    }
}

impl Default for PartitionCodec {
    fn default() -> Self {
        Self::new(CodecKind::Postcard)
    }
}
