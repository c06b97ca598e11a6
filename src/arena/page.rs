//! Page-granular commit bookkeeping

use std::ops::Range;

/// Page-aligned byte range covering `[offset, offset + size)`, clamped to `limit`.
///
/// The start is rounded down and the end rounded up to `page_size`.
pub fn page_aligned_range(offset: u64, size: u64, page_size: u64, limit: u64) -> Range<u64> {
    let start = offset - offset % page_size;
    let end = (offset + size).div_ceil(page_size) * page_size;
    start.min(limit)..end.min(limit)
}

/// Page indices touched by a byte range
pub fn pages_of(bytes: &Range<u64>, page_size: u64) -> Range<u64> {
    if bytes.start >= bytes.end {
        return 0..0;
    }
    bytes.start / page_size..bytes.end.div_ceil(page_size)
}

/// One bit per page of an address space. Bits are only ever set.
#[derive(Clone, Debug)]
pub struct CommitMap {
    words: Vec<u64>,
    num_pages: u64,
    committed: u64,
}

impl CommitMap {
    pub fn new(num_pages: u64) -> Self {
        Self {
            words: vec![0; num_pages.div_ceil(64) as usize],
            num_pages,
            committed: 0,
        }
    }

    /// Map for an address space of `capacity_bytes`
    pub fn for_capacity(capacity_bytes: u64, page_size: u64) -> Self {
        Self::new(capacity_bytes.div_ceil(page_size))
    }

    /// Number of committed pages
    pub fn committed(&self) -> u64 {
        self.committed
    }

    pub fn is_committed(&self, page: u64) -> bool {
        page < self.num_pages && self.words[(page / 64) as usize] & (1 << (page % 64)) != 0
    }

    /// True if every page of the range is committed
    pub fn covers(&self, pages: Range<u64>) -> bool {
        pages.into_iter().all(|p| self.is_committed(p))
    }

    /// Mark `pages` committed and return the runs that were not committed before
    pub fn commit(&mut self, pages: Range<u64>) -> Vec<Range<u64>> {
        let end = pages.end.min(self.num_pages);
        let mut fresh: Vec<Range<u64>> = Vec::new();

        for page in pages.start..end {
            let word = &mut self.words[(page / 64) as usize];
            let bit = 1u64 << (page % 64);
            if *word & bit != 0 {
                continue;
            }
            *word |= bit;
            self.committed += 1;

            match fresh.last_mut() {
                Some(run) if run.end == page => run.end = page + 1,
                _ => fresh.push(page..page + 1),
            }
        }

        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_range_rounds_outward() {
        assert_eq!(page_aligned_range(0, 1, 64, 1 << 20), 0..64);
        assert_eq!(page_aligned_range(60, 8, 64, 1 << 20), 0..128);
        assert_eq!(page_aligned_range(64, 64, 64, 1 << 20), 64..128);
        assert_eq!(page_aligned_range(100, 200, 64, 1 << 20), 64..320);
    }

    #[test]
    fn test_aligned_range_clamps_to_limit() {
        assert_eq!(page_aligned_range(900, 100, 64, 1000), 896..1000);
    }

    #[test]
    fn test_pages_of() {
        assert_eq!(pages_of(&(0..64), 64), 0..1);
        assert_eq!(pages_of(&(64..129), 64), 1..3);
        assert_eq!(pages_of(&(5..5), 64), 0..0);
    }

    #[test]
    fn test_commit_returns_fresh_runs() {
        let mut map = CommitMap::new(200);
        assert_eq!(map.commit(10..20), vec![10..20]);
        assert_eq!(map.committed(), 10);

        // overlapping commit only yields the uncommitted parts
        assert_eq!(map.commit(5..25), vec![5..10, 20..25]);
        assert_eq!(map.committed(), 20);

        // re-commit is a no-op
        assert!(map.commit(5..25).is_empty());
        assert_eq!(map.committed(), 20);
    }

    #[test]
    fn test_commit_across_word_boundary() {
        let mut map = CommitMap::new(130);
        assert_eq!(map.commit(60..130), vec![60..130]);
        assert!(map.covers(60..130));
        assert!(!map.covers(59..61));
        assert!(!map.is_committed(130));
    }

    #[test]
    fn test_commit_clamped_to_size() {
        let mut map = CommitMap::for_capacity(1000, 64);
        assert_eq!(map.commit(14..40), vec![14..16]);
        assert_eq!(map.committed(), 2);
        assert!(!map.is_committed(16));
    }
}
