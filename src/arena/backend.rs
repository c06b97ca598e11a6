//! Physical backing for the arena's address spaces

use std::ops::Range;

use crate::core::Result;
use crate::encode::BATCH_RECORD_SIZE;

/// One address space of the streaming arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArenaSpace {
    /// Coarsest position tier, 4 bytes per point
    Low,
    Medium,
    /// Finest position tier
    High,
    /// Packed RGB, 4 bytes per point
    Color,
    /// Batch metadata, 64 bytes per batch
    Batches,
}

impl ArenaSpace {
    /// Spaces addressed by global point index
    pub const POINT_SPACES: [ArenaSpace; 4] = [
        ArenaSpace::Low,
        ArenaSpace::Medium,
        ArenaSpace::High,
        ArenaSpace::Color,
    ];

    pub const ALL: [ArenaSpace; 5] = [
        ArenaSpace::Low,
        ArenaSpace::Medium,
        ArenaSpace::High,
        ArenaSpace::Color,
        ArenaSpace::Batches,
    ];

    /// Bytes per addressed element
    pub const fn element_size(self) -> u64 {
        match self {
            ArenaSpace::Batches => BATCH_RECORD_SIZE as u64,
            _ => 4,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ArenaSpace::Low => "arena_xyz_low",
            ArenaSpace::Medium => "arena_xyz_medium",
            ArenaSpace::High => "arena_xyz_high",
            ArenaSpace::Color => "arena_colors",
            ArenaSpace::Batches => "arena_batches",
        }
    }
}

/// Storage that can reserve address spaces and commit physical memory
/// for page-aligned parts of them on demand.
///
/// Commits are never released. Writes must land in committed memory.
pub trait ArenaBackend: Send {
    /// Reserve an address space of `capacity_bytes`. No physical memory is committed.
    fn reserve(&mut self, space: ArenaSpace, capacity_bytes: u64, page_size: u64) -> Result<()>;

    /// Commit physical memory for a page-aligned byte range of `space`
    fn commit(&mut self, space: ArenaSpace, range: Range<u64>) -> Result<()>;

    /// Copy `data` into `space` at `byte_offset`
    fn write(&mut self, space: ArenaSpace, byte_offset: u64, data: &[u8]) -> Result<()>;

    /// Physical bytes committed across all spaces
    fn committed_bytes(&self) -> u64;
}
