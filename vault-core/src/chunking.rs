//! Fixed-size chunk arithmetic shared by both ends of a transfer.
//!
//! Every chunk but the last is exactly `chunk_size` bytes; the last carries
//! the remainder (or a full chunk when the size is an exact multiple). An
//! empty file has zero chunks.

use std::ops::Range;

use crate::error::{Result, VaultError};

/// 64 KiB, the client default.
pub const DEFAULT_CHUNK_SIZE: u32 = 64 * 1024;

/// Layout of one file cut into fixed-size chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPlan {
    pub size: u64,
    pub chunk_size: u32,
    pub total_chunks: u32,
}

impl ChunkPlan {
    pub fn new(size: u64, chunk_size: u32) -> Result<Self> {
        Ok(Self {
            size,
            chunk_size,
            total_chunks: total_chunks(size, chunk_size)?,
        })
    }

    /// Layout declared by a peer; `Validation` if its chunk count is not
    /// `ceil(size / chunk_size)`.
    pub fn declared(size: u64, chunk_size: u32, total_chunks: u32) -> Result<Self> {
        let plan = Self::new(size, chunk_size)?;
        if plan.total_chunks != total_chunks {
            return Err(VaultError::Validation(format!(
                "{total_chunks} chunks declared, {size} bytes in {chunk_size}-byte chunks needs {}",
                plan.total_chunks
            )));
        }
        Ok(plan)
    }

    /// `Validation` unless `index` is in range and `len` is exactly that
    /// chunk's length.
    pub fn check_chunk(&self, index: u32, len: usize) -> Result<()> {
        let span = self.span(index).ok_or_else(|| {
            VaultError::Validation(format!("chunk index {index} outside 0..{}", self.total_chunks))
        })?;
        let expected = span.end - span.start;
        if len as u64 != expected {
            return Err(VaultError::Validation(format!(
                "chunk {index} is {len} bytes, expected {expected}"
            )));
        }
        Ok(())
    }

    /// Byte range of chunk `index` within the file.
    pub fn span(&self, index: u32) -> Option<Range<u64>> {
        if index >= self.total_chunks {
            return None;
        }
        let start = chunk_offset(index, self.chunk_size);
        let end = (start + self.chunk_size as u64).min(self.size);
        Some(start..end)
    }

    pub fn is_last(&self, index: u32) -> bool {
        self.total_chunks > 0 && index == self.total_chunks - 1
    }

    /// `(index, span)` for every chunk in order.
    pub fn spans(&self) -> impl Iterator<Item = (u32, Range<u64>)> + '_ {
        (0..self.total_chunks).filter_map(move |i| self.span(i).map(|s| (i, s)))
    }
}

/// `ceil(size / chunk_size)`.
pub fn total_chunks(size: u64, chunk_size: u32) -> Result<u32> {
    if chunk_size == 0 {
        return Err(VaultError::Protocol("chunk size must be positive".into()));
    }
    let n = size.div_ceil(chunk_size as u64);
    u32::try_from(n).map_err(|_| VaultError::Validation(format!("{n} chunks exceeds the limit")))
}

/// Position of chunk `index` in the reassembled file.
pub fn chunk_offset(index: u32, chunk_size: u32) -> u64 {
    index as u64 * chunk_size as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_is_ceiling_and_last_carries_remainder() {
        for (size, cs) in [(1u64, 1u32), (10, 3), (9, 3), (65_536, 65_536), (65_537, 65_536), (7, 100)] {
            let plan = ChunkPlan::new(size, cs).unwrap();
            assert_eq!(plan.total_chunks as u64, size.div_ceil(cs as u64));
            let last = plan.span(plan.total_chunks - 1).unwrap();
            let expect = if size % cs as u64 == 0 { cs as u64 } else { size % cs as u64 };
            assert_eq!(last.end - last.start, expect);
            assert!(plan.is_last(plan.total_chunks - 1));
        }
    }

    #[test]
    fn spans_tile_the_file() {
        let plan = ChunkPlan::new(150_000, 65_536).unwrap();
        assert_eq!(plan.total_chunks, 3);
        let lens: Vec<u64> = plan.spans().map(|(_, r)| r.end - r.start).collect();
        assert_eq!(lens, vec![65_536, 65_536, 18_928]);
        let mut next = 0;
        for (i, r) in plan.spans() {
            assert_eq!(r.start, next);
            assert_eq!(r.start, chunk_offset(i, 65_536));
            next = r.end;
        }
        assert_eq!(next, 150_000);
        assert!(plan.span(3).is_none());
    }

    #[test]
    fn empty_file_has_no_chunks() {
        let plan = ChunkPlan::new(0, DEFAULT_CHUNK_SIZE).unwrap();
        assert_eq!(plan.total_chunks, 0);
        assert_eq!(plan.spans().count(), 0);
        assert!(!plan.is_last(0));
    }

    #[test]
    fn declared_count_must_match_layout() {
        assert_eq!(ChunkPlan::declared(20, 10, 2).unwrap().total_chunks, 2);
        assert!(matches!(ChunkPlan::declared(25, 10, 2), Err(VaultError::Validation(_))));
        assert!(matches!(ChunkPlan::declared(0, 10, 1), Err(VaultError::Validation(_))));
    }

    #[test]
    fn chunk_lengths_follow_layout() {
        let plan = ChunkPlan::new(20, 10).unwrap();
        plan.check_chunk(0, 10).unwrap();
        plan.check_chunk(1, 10).unwrap();
        assert!(plan.check_chunk(0, 15).is_err());
        assert!(plan.check_chunk(1, 5).is_err());
        assert!(plan.check_chunk(2, 0).is_err());

        let ragged = ChunkPlan::new(25, 10).unwrap();
        ragged.check_chunk(2, 5).unwrap();
        assert!(ragged.check_chunk(2, 10).is_err());
    }

    #[test]
    fn zero_chunk_size_is_a_protocol_error() {
        assert!(matches!(total_chunks(10, 0), Err(VaultError::Protocol(_))));
    }
}
