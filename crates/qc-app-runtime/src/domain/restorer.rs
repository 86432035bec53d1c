//! # Snapshot Restorer
//!
//! Strictly sequential import state machine for one offered snapshot.
//!
//! ## Algorithm
//!
//! 1. Bound at offer time to `(height, format, chunk count)` and, when the
//!    offer carried them, the expected chunk checksums.
//! 2. Each chunk must be the next expected `(height, format, index)` and
//!    match its checksum. A mismatch is rejected without touching the chunks
//!    accepted so far, so the sender can retransmit.
//! 3. When the last chunk arrives all chunks are handed back for one atomic
//!    import.

use sha2::{Digest, Sha256};
use shared_types::Hash;
use thiserror::Error;

/// Upper bound on the chunk count of an offered snapshot.
pub const MAX_SNAPSHOT_CHUNKS: u32 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestoreError {
    #[error("Snapshot must have at least one chunk")]
    NoChunks,

    #[error("Snapshot has {chunks} chunks, limit is {max}")]
    TooManyChunks { chunks: u32, max: u32 },

    #[error("Offered {offered} chunk checksums for {chunks} chunks")]
    ChecksumCount { offered: usize, chunks: u32 },

    #[error("Expected chunk {expected_height}/{expected_format}/{expected_index}, got {height}/{format}/{index}")]
    UnexpectedChunk {
        expected_height: u64,
        expected_format: u32,
        expected_index: u32,
        height: u64,
        format: u32,
        index: u32,
    },

    #[error("Checksum mismatch for chunk {index}: expected {expected}, actual {actual}")]
    ChecksumMismatch {
        index: u32,
        expected: String,
        actual: String,
    },

    #[error("Restoration already complete")]
    Complete,
}

impl RestoreError {
    /// Errors after which the same restoration may continue.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RestoreError::UnexpectedChunk { .. } | RestoreError::ChecksumMismatch { .. }
        )
    }
}

/// Checksum of a snapshot chunk.
pub fn chunk_checksum(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// Result of accepting a chunk.
#[derive(Debug, PartialEq, Eq)]
pub enum ChunkProgress {
    /// More chunks expected; the next one has this index.
    Pending { next_index: u32 },
    /// All chunks received, in order.
    Complete(Vec<Vec<u8>>),
}

#[derive(Debug)]
pub struct SnapshotRestorer {
    height: u64,
    format: u32,
    total: u32,
    expected_checksums: Vec<Hash>,
    chunks: Vec<Vec<u8>>,
}

impl SnapshotRestorer {
    /// `expected_checksums` may be empty when the offer carried none.
    pub fn new(
        height: u64,
        format: u32,
        total: u32,
        expected_checksums: Vec<Hash>,
    ) -> Result<Self, RestoreError> {
        if total == 0 {
            return Err(RestoreError::NoChunks);
        }
        if total > MAX_SNAPSHOT_CHUNKS {
            return Err(RestoreError::TooManyChunks {
                chunks: total,
                max: MAX_SNAPSHOT_CHUNKS,
            });
        }
        if !expected_checksums.is_empty() && expected_checksums.len() != total as usize {
            return Err(RestoreError::ChecksumCount {
                offered: expected_checksums.len(),
                chunks: total,
            });
        }
        Ok(Self {
            height,
            format,
            total,
            expected_checksums,
            chunks: Vec::new(),
        })
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn format(&self) -> u32 {
        self.format
    }

    pub fn next_index(&self) -> u32 {
        self.chunks.len() as u32
    }

    pub fn accepted(&self) -> usize {
        self.chunks.len()
    }

    /// Verify that `(height, format, index)` is the next chunk.
    pub fn expects(&self, height: u64, format: u32, index: u32) -> Result<(), RestoreError> {
        if self.next_index() >= self.total {
            return Err(RestoreError::Complete);
        }
        if height != self.height || format != self.format || index != self.next_index() {
            return Err(RestoreError::UnexpectedChunk {
                expected_height: self.height,
                expected_format: self.format,
                expected_index: self.next_index(),
                height,
                format,
                index,
            });
        }
        Ok(())
    }

    /// Accept the next chunk after checking order and checksum.
    pub fn add(
        &mut self,
        height: u64,
        format: u32,
        index: u32,
        checksum: &[u8],
        data: Vec<u8>,
    ) -> Result<ChunkProgress, RestoreError> {
        self.expects(height, format, index)?;

        let actual = chunk_checksum(&data);
        let offered = self.expected_checksums.get(index as usize);
        if checksum != actual.as_slice() || offered.is_some_and(|expected| *expected != actual) {
            return Err(RestoreError::ChecksumMismatch {
                index,
                expected: hex::encode(checksum),
                actual: hex::encode(actual),
            });
        }

        self.chunks.push(data);
        if self.next_index() == self.total {
            return Ok(ChunkProgress::Complete(std::mem::take(&mut self.chunks)));
        }
        Ok(ChunkProgress::Pending {
            next_index: self.next_index(),
        })
    }
}
