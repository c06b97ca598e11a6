//! Host-memory arena backend with sparse page allocation

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use crate::arena::backend::{ArenaBackend, ArenaSpace};
use crate::arena::page::pages_of;
use crate::core::{Error, Result};
use crate::encode::{BatchRecord, BATCH_RECORD_SIZE};

/// A reserved address space whose pages are allocated on commit
#[derive(Debug)]
struct SparseSpace {
    capacity: u64,
    page_size: u64,
    pages: BTreeMap<u64, Box<[u8]>>,
}

impl SparseSpace {
    fn check_bounds(&self, space: ArenaSpace, range: &Range<u64>) -> Result<()> {
        if range.start > range.end || range.end > self.capacity {
            return Err(Error::Arena(format!(
                "{}: range {}..{} outside capacity {}",
                space.label(), range.start, range.end, self.capacity
            )));
        }
        Ok(())
    }

    /// Visit each page-local slice of a byte range
    fn for_each_piece(
        &self,
        space: ArenaSpace,
        range: Range<u64>,
        mut f: impl FnMut(u64, Range<usize>, Range<usize>) -> Result<()>,
    ) -> Result<()> {
        let mut cursor = range.start;
        while cursor < range.end {
            let page = cursor / self.page_size;
            let page_start = page * self.page_size;
            let piece_end = (page_start + self.page_size).min(range.end);
            if !self.pages.contains_key(&page) {
                return Err(Error::Arena(format!(
                    "{}: page {} (byte {}) is not committed",
                    space.label(), page, cursor
                )));
            }
            let local = (cursor - page_start) as usize..(piece_end - page_start) as usize;
            let data = (cursor - range.start) as usize..(piece_end - range.start) as usize;
            f(page, local, data)?;
            cursor = piece_end;
        }
        Ok(())
    }
}

/// Arena backend in host memory.
///
/// Pages are allocated (zeroed) on commit and kept until the backend is
/// dropped. Gives the consumer side read access to everything committed.
#[derive(Debug, Default)]
pub struct HostBackend {
    spaces: HashMap<ArenaSpace, SparseSpace>,
    committed_bytes: u64,
}

impl HostBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn space(&self, space: ArenaSpace) -> Result<&SparseSpace> {
        self.spaces
            .get(&space)
            .ok_or_else(|| Error::Arena(format!("{} not reserved", space.label())))
    }

    /// Copy `len` bytes at `byte_offset` out of a space
    pub fn read(&self, space: ArenaSpace, byte_offset: u64, len: usize) -> Result<Vec<u8>> {
        let sparse = self.space(space)?;
        let range = byte_offset..byte_offset + len as u64;
        sparse.check_bounds(space, &range)?;

        let mut out = vec![0u8; len];
        sparse.for_each_piece(space, range, |page, local, data| {
            out[data].copy_from_slice(&sparse.pages[&page][local]);
            Ok(())
        })?;
        Ok(out)
    }

    /// Read `count` consecutive 4-byte words of a point space
    pub fn read_words(&self, space: ArenaSpace, first_point: u64, count: usize) -> Result<Vec<u32>> {
        let bytes = self.read(space, 4 * first_point, 4 * count)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect())
    }

    /// Read one batch metadata record
    pub fn read_batch(&self, batch_index: u64) -> Result<BatchRecord> {
        let bytes = self.read(
            ArenaSpace::Batches,
            batch_index * BATCH_RECORD_SIZE as u64,
            BATCH_RECORD_SIZE,
        )?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    /// Number of allocated pages in a space
    pub fn committed_pages(&self, space: ArenaSpace) -> usize {
        self.spaces.get(&space).map_or(0, |s| s.pages.len())
    }
}

impl ArenaBackend for HostBackend {
    fn reserve(&mut self, space: ArenaSpace, capacity_bytes: u64, page_size: u64) -> Result<()> {
        if self.spaces.contains_key(&space) {
            return Err(Error::Arena(format!("{} reserved twice", space.label())));
        }
        self.spaces.insert(space, SparseSpace {
            capacity: capacity_bytes,
            page_size,
            pages: BTreeMap::new(),
        });
        Ok(())
    }

    fn commit(&mut self, space: ArenaSpace, range: Range<u64>) -> Result<()> {
        let sparse = self
            .spaces
            .get_mut(&space)
            .ok_or_else(|| Error::Arena(format!("{} not reserved", space.label())))?;
        sparse.check_bounds(space, &range)?;

        let page_size = sparse.page_size;
        for page in pages_of(&range, page_size) {
            if !sparse.pages.contains_key(&page) {
                sparse.pages.insert(page, vec![0u8; page_size as usize].into_boxed_slice());
                self.committed_bytes += page_size;
            }
        }
        Ok(())
    }

    fn write(&mut self, space: ArenaSpace, byte_offset: u64, data: &[u8]) -> Result<()> {
        let range = byte_offset..byte_offset + data.len() as u64;
        let sparse = self
            .spaces
            .get(&space)
            .ok_or_else(|| Error::Arena(format!("{} not reserved", space.label())))?;
        sparse.check_bounds(space, &range)?;

        // validate the whole range before touching any page
        let mut pieces = Vec::new();
        sparse.for_each_piece(space, range, |page, local, src| {
            pieces.push((page, local, src));
            Ok(())
        })?;

        let sparse = self.spaces.get_mut(&space).ok_or_else(|| Error::Arena(format!("{} not reserved", space.label())))?;
        for (page, local, src) in pieces {
            if let Some(bytes) = sparse.pages.get_mut(&page) {
                bytes[local].copy_from_slice(&data[src]);
            }
        }
        Ok(())
    }

    fn committed_bytes(&self) -> u64 {
        self.committed_bytes
    }
}
