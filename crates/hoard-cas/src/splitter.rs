//! Chunk boundary state machine.
//!
//! A [`Splitter`] consumes a byte stream in blocks of any size and cuts it
//! into chunks. After each byte it evaluates, in order:
//!
//! 1. the rolling checksum reports a split candidate **and** the pending
//!    chunk is longer than `min_blob_size`, or
//! 2. the pending chunk has reached `max_blob_size`.
//!
//! End of stream flushes whatever remains. Cut positions depend only on the
//! byte sequence, never on how the caller blocks its reads.

use bytes::Bytes;
use hoard_types::{BlobHash, ChunkPolicy};
use sha1::{Digest, Sha1};

use crate::rollsum::Rollsum;

/// A finalized chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cut {
    /// The chunk bytes.
    pub data: Bytes,
    /// Cumulative stream offset just past this chunk.
    pub end_offset: u64,
}

/// Content-defined chunk boundary detector with a whole-stream hash.
pub struct Splitter {
    policy: ChunkPolicy,
    rollsum: Rollsum,
    pending: Vec<u8>,
    full_hash: Sha1,
    offset: u64,
    cuts: u64,
}

impl Splitter {
    pub fn new(policy: ChunkPolicy) -> Self {
        Self {
            rollsum: Rollsum::new(policy.window_size),
            pending: Vec::with_capacity(policy.min_blob_size),
            full_hash: Sha1::new(),
            offset: 0,
            cuts: 0,
            policy,
        }
    }

    /// Consume bytes from `input` up to and including the first cut.
    ///
    /// Returns how many bytes were consumed and the chunk that ended there,
    /// if any. Callers loop until the whole block is consumed.
    pub fn scan(&mut self, input: &[u8]) -> (usize, Option<Cut>) {
        let min = self.policy.min_blob_size;
        let max = self.policy.max_blob_size;
        let pending = self.pending.len();

        for (i, &byte) in input.iter().enumerate() {
            self.rollsum.roll(byte);
            let len = pending + i + 1;
            if (self.rollsum.on_split() && len > min) || len >= max {
                self.pending.extend_from_slice(&input[..=i]);
                return (i + 1, Some(self.cut()));
            }
        }

        self.pending.extend_from_slice(input);
        (input.len(), None)
    }

    /// Flush the trailing chunk and return the hash of the whole stream.
    ///
    /// An empty trailing buffer is only emitted when the stream produced no
    /// chunk at all, so a zero-byte stream still yields one (empty) chunk.
    pub fn finish(mut self) -> (Option<Cut>, BlobHash) {
        let last = if !self.pending.is_empty() || self.cuts == 0 {
            Some(self.cut())
        } else {
            None
        };
        (last, BlobHash::from_hasher(self.full_hash))
    }

    /// Bytes finalized so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes buffered for the chunk in progress.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn cut(&mut self) -> Cut {
        let next = Vec::with_capacity(self.policy.min_blob_size);
        let data = Bytes::from(std::mem::replace(&mut self.pending, next));
        self.full_hash.update(&data);
        self.offset += data.len() as u64;
        self.cuts += 1;
        Cut {
            data,
            end_offset: self.offset,
        }
    }
}
