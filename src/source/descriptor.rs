//! Per-file point-cloud descriptor

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::types::DVec3;
use crate::math::Aabb;
use crate::source::las::{self, LasHeader};

/// One registered input file.
///
/// Created once by the ingestion scheduler and shared for the lifetime of
/// the loader. Only the loaded-point counter changes after registration.
#[derive(Debug)]
pub struct PointCloudDescriptor {
    /// Index in submission order
    pub file_index: u32,
    pub path: PathBuf,
    pub header: LasHeader,
    /// First global point index occupied by this file
    pub sparse_offset: u64,
    /// Batches this file contributes once fully loaded
    pub num_batches: u64,
    points_loaded: AtomicU64,
}

impl PointCloudDescriptor {
    pub fn new(file_index: u32, path: PathBuf, header: LasHeader, sparse_offset: u64, num_batches: u64) -> Self {
        Self {
            file_index,
            path,
            header,
            sparse_offset,
            num_batches,
            points_loaded: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_points(&self) -> u64 {
        self.header.num_points
    }

    pub fn stride(&self) -> usize {
        self.header.stride as usize
    }

    pub fn scale(&self) -> DVec3 {
        self.header.scale
    }

    pub fn offset(&self) -> DVec3 {
        self.header.offset
    }

    /// World-space bounding box from the header
    pub fn bounds(&self) -> Aabb {
        self.header.bounds
    }

    /// Byte offset of the RGB triple within a record, if any
    pub fn color_offset(&self) -> Option<usize> {
        las::color_offset(self.header.format)
    }

    /// Global point range `[sparse_offset, sparse_offset + num_points)`
    pub fn sparse_range(&self) -> std::ops::Range<u64> {
        self.sparse_offset..self.sparse_offset + self.num_points()
    }

    /// Points of this file committed to the arena so far
    pub fn points_loaded(&self) -> u64 {
        self.points_loaded.load(Ordering::Acquire)
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.points_loaded() >= self.num_points()
    }

    /// Convert a stored integer coordinate to the file-local frame
    /// (world position translated so the header's box minimum is the origin)
    #[inline]
    pub fn to_local(&self, stored: [i32; 3]) -> DVec3 {
        let raw = DVec3::new(stored[0] as f64, stored[1] as f64, stored[2] as f64);
        raw * self.header.scale + self.header.offset - self.header.bounds.min
    }

    pub(crate) fn add_loaded(&self, points: u64) {
        self.points_loaded.fetch_add(points, Ordering::AcqRel);
    }
}
