//! Streaming arena: capacity-bounded, lazily committed address spaces
//!
//! Four point spaces (three position tiers and color) are addressed by
//! global point index, the batch space by upload order. Physical memory is
//! committed page by page as data arrives and never released, so the
//! footprint is the high-water mark of loaded data.

pub mod page;
pub mod backend;
pub mod host;
pub mod gpu;

pub use backend::{ArenaBackend, ArenaSpace};
pub use host::HostBackend;
pub use gpu::GpuBackend;
pub use page::{CommitMap, page_aligned_range};

use std::ops::Range;

use crate::core::{Error, Result};
use crate::encode::{BatchRecord, BATCH_RECORD_SIZE};

/// The arena and its commit bookkeeping
pub struct StreamingArena<B: ArenaBackend> {
    backend: B,
    capacity_points: u64,
    capacity_batches: u64,
    page_size: u64,
    /// Shared by the four point spaces, which are always committed together
    point_pages: CommitMap,
    batch_pages: CommitMap,
}

impl<B: ArenaBackend> StreamingArena<B> {
    /// Reserve every address space on `backend`
    pub fn new(mut backend: B, capacity_points: u64, capacity_batches: u64, page_size: u64) -> Result<Self> {
        if page_size == 0 || page_size % 4 != 0 {
            return Err(Error::Arena(format!("invalid page size {}", page_size)));
        }
        for space in ArenaSpace::POINT_SPACES {
            backend.reserve(space, capacity_points * space.element_size(), page_size)?;
        }
        let batch_bytes = capacity_batches * BATCH_RECORD_SIZE as u64;
        backend.reserve(ArenaSpace::Batches, batch_bytes, page_size)?;

        log::info!(
            "Reserved streaming arena: {} points ({}MB per space), {} batches",
            capacity_points,
            capacity_points * 4 / 1024 / 1024,
            capacity_batches
        );

        Ok(Self {
            backend,
            capacity_points,
            capacity_batches,
            page_size,
            point_pages: CommitMap::for_capacity(capacity_points * 4, page_size),
            batch_pages: CommitMap::for_capacity(batch_bytes, page_size),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn capacity_points(&self) -> u64 {
        self.capacity_points
    }

    pub fn capacity_batches(&self) -> u64 {
        self.capacity_batches
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Committed pages of each point space
    pub fn committed_point_pages(&self) -> u64 {
        self.point_pages.committed()
    }

    pub fn committed_batch_pages(&self) -> u64 {
        self.batch_pages.committed()
    }

    /// Commit the pages covering points `[sparse_offset, sparse_offset + num_points)`
    /// in all four point spaces. Returns the number of newly committed pages.
    pub fn commit_points(&mut self, sparse_offset: u64, num_points: u64) -> Result<u64> {
        self.check_points(sparse_offset, num_points)?;
        let bytes = page_aligned_range(4 * sparse_offset, 4 * num_points, self.page_size, 4 * self.capacity_points);
        log::debug!(
            "commit points {}..{}: bytes {}..{}",
            sparse_offset,
            sparse_offset + num_points,
            bytes.start,
            bytes.end
        );

        let fresh = self.point_pages.commit(page::pages_of(&bytes, self.page_size));
        let limit = 4 * self.capacity_points;
        let mut count = 0;
        for run in &fresh {
            let run_bytes = self.page_bytes(run, limit);
            for space in ArenaSpace::POINT_SPACES {
                self.backend.commit(space, run_bytes.clone())?;
            }
            count += run.end - run.start;
        }
        Ok(count)
    }

    /// Commit the pages covering batch slots `[first_batch, first_batch + count)`
    pub fn commit_batches(&mut self, first_batch: u64, count: u64) -> Result<u64> {
        self.check_batches(first_batch, count)?;
        let limit = self.capacity_batches * BATCH_RECORD_SIZE as u64;
        let bytes = page_aligned_range(
            first_batch * BATCH_RECORD_SIZE as u64,
            count * BATCH_RECORD_SIZE as u64,
            self.page_size,
            limit,
        );

        let fresh = self.batch_pages.commit(page::pages_of(&bytes, self.page_size));
        let mut pages = 0;
        for run in &fresh {
            let run_bytes = self.page_bytes(run, limit);
            self.backend.commit(ArenaSpace::Batches, run_bytes)?;
            pages += run.end - run.start;
        }
        Ok(pages)
    }

    /// Write one word per point into a point space at `sparse_offset`
    pub fn write_points(&mut self, space: ArenaSpace, sparse_offset: u64, words: &[u32]) -> Result<()> {
        if space == ArenaSpace::Batches {
            return Err(Error::Arena("batch space is not addressed by point".into()));
        }
        self.check_points(sparse_offset, words.len() as u64)?;
        let bytes = 4 * sparse_offset..4 * (sparse_offset + words.len() as u64);
        if !self.point_pages.covers(page::pages_of(&bytes, self.page_size)) {
            return Err(Error::Arena(format!(
                "{}: points {}..{} are not committed",
                space.label(),
                sparse_offset,
                sparse_offset + words.len() as u64
            )));
        }
        self.backend.write(space, bytes.start, bytemuck::cast_slice(words))
    }

    /// Write batch records starting at slot `first_batch`
    pub fn write_batches(&mut self, first_batch: u64, records: &[BatchRecord]) -> Result<()> {
        self.check_batches(first_batch, records.len() as u64)?;
        let start = first_batch * BATCH_RECORD_SIZE as u64;
        let bytes = start..start + (records.len() * BATCH_RECORD_SIZE) as u64;
        if !self.batch_pages.covers(page::pages_of(&bytes, self.page_size)) {
            return Err(Error::Arena(format!(
                "batches {}..{} are not committed",
                first_batch,
                first_batch + records.len() as u64
            )));
        }
        self.backend.write(ArenaSpace::Batches, start, bytemuck::cast_slice(records))
    }

    fn page_bytes(&self, pages: &Range<u64>, limit: u64) -> Range<u64> {
        pages.start * self.page_size..(pages.end * self.page_size).min(limit)
    }

    fn check_points(&self, sparse_offset: u64, num_points: u64) -> Result<()> {
        if sparse_offset + num_points > self.capacity_points {
            return Err(Error::Capacity(format!(
                "points {}..{} exceed arena capacity {}",
                sparse_offset,
                sparse_offset + num_points,
                self.capacity_points
            )));
        }
        Ok(())
    }

    fn check_batches(&self, first_batch: u64, count: u64) -> Result<()> {
        if first_batch + count > self.capacity_batches {
            return Err(Error::Capacity(format!(
                "batches {}..{} exceed arena capacity {}",
                first_batch,
                first_batch + count,
                self.capacity_batches
            )));
        }
        Ok(())
    }
}

impl StreamingArena<HostBackend> {
    /// Arena in host memory
    pub fn host(capacity_points: u64, capacity_batches: u64, page_size: u64) -> Result<Self> {
        Self::new(HostBackend::new(), capacity_points, capacity_batches, page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> StreamingArena<HostBackend> {
        // 64-byte pages hold 16 points or one batch record
        StreamingArena::host(1000, 8, 64).expect("arena failed")
    }

    #[test]
    fn test_new_commits_nothing() {
        let arena = arena();
        assert_eq!(arena.backend().committed_bytes(), 0);
        assert_eq!(arena.committed_point_pages(), 0);
    }

    #[test]
    fn test_invalid_page_size() {
        assert!(StreamingArena::host(1000, 8, 6).is_err());
    }

    #[test]
    fn test_commit_points_covers_range() {
        let mut arena = arena();
        // points 10..30 -> bytes 40..120 -> pages 0..2
        assert_eq!(arena.commit_points(10, 20).expect("commit failed"), 2);
        for space in ArenaSpace::POINT_SPACES {
            assert_eq!(arena.backend().committed_pages(space), 2);
        }
        assert_eq!(arena.backend().committed_pages(ArenaSpace::Batches), 0);

        // overlapping range commits only the new page
        assert_eq!(arena.commit_points(25, 10).expect("commit failed"), 1);
        assert_eq!(arena.committed_point_pages(), 3);
    }

    #[test]
    fn test_commit_is_monotonic() {
        let mut arena = arena();
        arena.commit_points(0, 100).expect("commit failed");
        let before = arena.backend().committed_bytes();
        assert_eq!(arena.commit_points(0, 100).expect("commit failed"), 0);
        assert_eq!(arena.backend().committed_bytes(), before);
    }

    #[test]
    fn test_write_and_read_back() {
        let mut arena = arena();
        arena.commit_points(990, 10).expect("commit failed");
        let words: Vec<u32> = (0..10).collect();
        arena.write_points(ArenaSpace::High, 990, &words).expect("write failed");

        let read = arena.backend().read_words(ArenaSpace::High, 990, 10).expect("read failed");
        assert_eq!(read, words);
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut arena = arena();
        assert!(matches!(arena.commit_points(995, 10), Err(Error::Capacity(_))));
        assert!(matches!(arena.write_points(ArenaSpace::Low, 999, &[0, 0]), Err(Error::Capacity(_))));
        assert!(matches!(arena.commit_batches(7, 2), Err(Error::Capacity(_))));
    }

    #[test]
    fn test_write_without_commit_fails() {
        let mut arena = arena();
        assert!(matches!(arena.write_points(ArenaSpace::Low, 0, &[1]), Err(Error::Arena(_))));
    }

    #[test]
    fn test_write_past_committed_pages_fails() {
        let mut arena = arena();
        // page 0 holds points 0..16
        arena.commit_points(0, 16).expect("commit failed");
        let words = [7u32; 10];
        assert!(matches!(arena.write_points(ArenaSpace::Color, 10, &words), Err(Error::Arena(_))));
        // nothing reached the committed page
        let read = arena.backend().read_words(ArenaSpace::Color, 10, 6).expect("read failed");
        assert_eq!(read, vec![0; 6]);

        arena.write_points(ArenaSpace::Color, 6, &words).expect("write failed");
        assert!(arena.write_points(ArenaSpace::Color, 0, &[]).is_ok());

        arena.commit_batches(0, 1).expect("commit failed");
        let records = [BatchRecord::default(); 2];
        assert!(matches!(arena.write_batches(0, &records), Err(Error::Arena(_))));
        arena.write_batches(0, &records[..1]).expect("write failed");
    }

    #[test]
    fn test_batches_round_trip() {
        let mut arena = arena();
        assert_eq!(arena.commit_batches(2, 3).expect("commit failed"), 3);

        let records: Vec<BatchRecord> = (0..3)
            .map(|i| BatchRecord { num_points: 10 + i, first_point: 100 * i, ..Default::default() })
            .collect();
        arena.write_batches(2, &records).expect("write failed");

        assert_eq!(arena.backend().read_batch(3).expect("read failed"), records[1]);
        assert!(arena.write_points(ArenaSpace::Batches, 0, &[0]).is_err());
    }
}
