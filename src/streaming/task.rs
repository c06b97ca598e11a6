//! Work units of the pipeline

use std::sync::Arc;

use crate::core::Error;
use crate::encode::{batch_count, EncodedChunk};
use crate::source::PointCloudDescriptor;

/// A pending chunk of one file to decode and encode
#[derive(Clone, Debug)]
pub struct LoadTask {
    pub file: Arc<PointCloudDescriptor>,
    /// First point, relative to the start of the file
    pub first_point: u64,
    pub num_points: u64,
}

impl LoadTask {
    /// Global index of the task's first point
    pub fn sparse_offset(&self) -> u64 {
        self.file.sparse_offset + self.first_point
    }
}

/// An encoded chunk ready to be committed to the arena
#[derive(Debug)]
pub struct UploadTask {
    pub file: Arc<PointCloudDescriptor>,
    pub sparse_offset: u64,
    pub num_points: u64,
    pub chunk: EncodedChunk,
}

impl UploadTask {
    pub fn num_batches(&self) -> u64 {
        self.chunk.num_batches() as u64
    }
}

/// Result of decoding one load task
#[derive(Debug)]
pub enum LoadOutcome {
    Ready(UploadTask),
    /// Decoding failed; the consumer skips the task without advancing counters
    Failed { task: LoadTask, error: Error },
}

/// Split a file into load tasks of at most `points_per_chunk` points
pub fn split_into_tasks(file: &Arc<PointCloudDescriptor>, points_per_chunk: u64) -> Vec<LoadTask> {
    let total = file.num_points();
    let mut tasks = Vec::with_capacity(total.div_ceil(points_per_chunk) as usize);
    let mut offset = 0;

    while offset < total {
        let count = points_per_chunk.min(total - offset);
        tasks.push(LoadTask {
            file: file.clone(),
            first_point: offset,
            num_points: count,
        });
        offset += count;
    }

    tasks
}

/// Batches a file of `num_points` points produces when split into chunks.
///
/// Batches never straddle chunks, so every chunk contributes its own short batch.
pub fn batches_for_points(num_points: u64, points_per_chunk: u64, points_per_batch: u32) -> u64 {
    let full_chunks = num_points / points_per_chunk;
    let remainder = num_points % points_per_chunk;
    full_chunks * batch_count(points_per_chunk, points_per_batch) + batch_count(remainder, points_per_batch)
}
