//! Batch planning: fixed-size point runs with local bounding boxes

use bytemuck::{Pod, Zeroable};

use crate::math::Aabb;
use crate::source::PointCloudDescriptor;

/// Size of one batch metadata record in bytes
pub const BATCH_RECORD_SIZE: usize = 64;

/// Per-batch metadata as consumed by the renderer (64 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BatchRecord {
    /// Reserved for renderer-side state, always 0 on upload
    pub state: u32,
    /// Batch box minimum in the file-local frame
    pub min: [f32; 3],
    /// Batch box maximum in the file-local frame
    pub max: [f32; 3],
    pub num_points: u32,
    /// Global index of the batch's first point
    pub first_point: u32,
    pub file_index: u32,
    pub _padding: [u32; 6],
}

/// A contiguous run of points sharing one quantization frame
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    pub file_index: u32,
    /// First point, relative to the start of the file
    pub file_offset: u64,
    /// First point, relative to the start of the load chunk
    pub chunk_offset: u64,
    /// First point, global
    pub sparse_offset: u64,
    pub num_points: u64,
    /// Local bounding box, empty until measured
    pub bounds: Aabb,
}

impl Batch {
    /// GPU record. An unmeasured batch stores a zero box.
    pub fn to_record(&self) -> BatchRecord {
        let (min, max) = if self.bounds.is_empty() { Default::default() } else { self.bounds.to_f32() };
        BatchRecord {
            state: 0,
            min: min.to_array(),
            max: max.to_array(),
            num_points: self.num_points as u32,
            first_point: self.sparse_offset as u32,
            file_index: self.file_index,
            _padding: [0; 6],
        }
    }
}

/// Number of batches needed for `num_points` points
pub fn batch_count(num_points: u64, points_per_batch: u32) -> u64 {
    num_points.div_ceil(points_per_batch as u64)
}

/// Split `[first_point, first_point + num_points)` of one file into batches.
///
/// Only the last batch may be short. Bounds are left empty.
pub fn partition(
    file_index: u32,
    file_sparse_offset: u64,
    first_point: u64,
    num_points: u64,
    points_per_batch: u32,
) -> Vec<Batch> {
    let per_batch = points_per_batch as u64;
    let mut batches = Vec::with_capacity(batch_count(num_points, points_per_batch) as usize);
    let mut processed = 0;

    while processed < num_points {
        let count = per_batch.min(num_points - processed);
        batches.push(Batch {
            file_index,
            file_offset: first_point + processed,
            chunk_offset: processed,
            sparse_offset: file_sparse_offset + first_point + processed,
            num_points: count,
            bounds: Aabb::EMPTY,
        });
        processed += count;
    }

    batches
}

/// Stored integer coordinates at the start of a record
#[inline]
pub fn record_xyz(record: &[u8]) -> [i32; 3] {
    let read = |at: usize| i32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]]);
    [read(0), read(4), read(8)]
}

/// Compute a batch's box in the file-local frame from the chunk's records
pub fn measure(batch: &mut Batch, records: &[u8], desc: &PointCloudDescriptor) {
    let stride = desc.stride();
    let start = batch.chunk_offset as usize;
    let end = start + batch.num_points as usize;

    let mut bounds = Aabb::EMPTY;
    for index in start..end {
        let record = &records[index * stride..(index + 1) * stride];
        bounds.expand(desc.to_local(record_xyz(record)));
    }
    batch.bounds = bounds;
}

/// Partition a load chunk into batches and measure each batch's box.
///
/// `records` holds exactly the chunk's raw records.
pub fn plan_batches(
    desc: &PointCloudDescriptor,
    first_point: u64,
    num_points: u64,
    records: &[u8],
    points_per_batch: u32,
) -> Vec<Batch> {
    let mut batches = partition(desc.file_index, desc.sparse_offset, first_point, num_points, points_per_batch);
    for batch in &mut batches {
        measure(batch, records, desc);
    }
    batches
}
