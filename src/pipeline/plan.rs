//! Chunk planning: partition a document's pages into engine-sized ranges.
//!
//! The plan is computed once per job, after the page ceiling has been
//! enforced, and is never adjusted while chunks are being processed.

use crate::config::OcrConfig;
use serde::Serialize;

/// One contiguous page range `[start, end)`, 0-based and half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkRange {
    /// 1-based position of this chunk in the plan.
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl ChunkRange {
    pub fn pages(&self) -> usize {
        self.end - self.start
    }
}

/// Ordered, gapless, non-overlapping partition of `[0, total_pages)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkPlan {
    total_pages: usize,
    chunk_size: usize,
    chunks: Vec<ChunkRange>,
}

impl ChunkPlan {
    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Effective chunk size after the adaptive adjustment.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[ChunkRange] {
        &self.chunks
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkRange> {
        self.chunks.iter()
    }
}

/// Thresholds that drive adaptive chunk sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    pub base_chunk_size: usize,
    pub large_file_bytes: u64,
    pub large_page_count: usize,
    pub reduced_chunk_size: usize,
}

impl ChunkPolicy {
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            base_chunk_size: config.pages_per_chunk,
            large_file_bytes: config.large_file_bytes,
            large_page_count: config.large_page_count,
            reduced_chunk_size: config.reduced_chunk_size,
        }
    }

    /// Chunk size to use for a document of this size.
    ///
    /// Large inputs (by bytes or by pages) are capped at
    /// `reduced_chunk_size`; the result is never larger than the base size.
    pub fn effective_chunk_size(&self, total_pages: usize, file_size_bytes: u64) -> usize {
        let base = self.base_chunk_size.max(1);
        let is_large =
            file_size_bytes > self.large_file_bytes || total_pages > self.large_page_count;
        if is_large {
            base.min(self.reduced_chunk_size.max(1))
        } else {
            base
        }
    }
}

/// Partition `total_pages` into chunks, adapting size to the document.
pub fn plan(total_pages: usize, file_size_bytes: u64, policy: &ChunkPolicy) -> ChunkPlan {
    let chunk_size = policy.effective_chunk_size(total_pages, file_size_bytes);
    partition(total_pages, chunk_size)
}

/// Fixed-size partition with the remainder in the last chunk.
pub fn partition(total_pages: usize, chunk_size: usize) -> ChunkPlan {
    let chunk_size = chunk_size.max(1);
    let chunks = (0..total_pages)
        .step_by(chunk_size)
        .enumerate()
        .map(|(i, start)| ChunkRange {
            index: i + 1,
            start,
            end: (start + chunk_size).min(total_pages),
        })
        .collect();

    ChunkPlan {
        total_pages,
        chunk_size,
        chunks,
    }
}
