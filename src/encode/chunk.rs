//! Chunk encoding: raw records to tiered position, color and batch buffers

use crate::encode::batch::{plan_batches, record_xyz, BatchRecord};
use crate::encode::quantize::{encode_position, extract_color};
use crate::source::PointCloudDescriptor;

/// Encoded buffers of one load chunk, indexed by point within the chunk
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EncodedChunk {
    pub low: Vec<u32>,
    pub medium: Vec<u32>,
    pub high: Vec<u32>,
    pub colors: Vec<u32>,
    pub batches: Vec<BatchRecord>,
}

impl EncodedChunk {
    pub fn num_points(&self) -> usize {
        self.low.len()
    }

    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    /// Host bytes held by the buffers
    pub fn byte_size(&self) -> usize {
        4 * (self.low.len() + self.medium.len() + self.high.len() + self.colors.len())
            + std::mem::size_of_val(self.batches.as_slice())
    }
}

/// Encode `num_points` records starting at `first_point` of `desc`.
///
/// `records` must hold exactly those records.
pub fn encode_chunk(
    desc: &PointCloudDescriptor,
    first_point: u64,
    num_points: u64,
    records: &[u8],
    points_per_batch: u32,
    missing_color: u32,
) -> EncodedChunk {
    let stride = desc.stride();
    let color_offset = desc.color_offset();
    let count = num_points as usize;
    debug_assert_eq!(records.len(), count * stride);

    let batches = plan_batches(desc, first_point, num_points, records, points_per_batch);

    let mut chunk = EncodedChunk {
        low: vec![0; count],
        medium: vec![0; count],
        high: vec![0; count],
        colors: vec![0; count],
        batches: Vec::with_capacity(batches.len()),
    };

    for batch in &batches {
        let start = batch.chunk_offset as usize;
        let end = start + batch.num_points as usize;

        for index in start..end {
            let record = &records[index * stride..(index + 1) * stride];
            let q = encode_position(desc.to_local(record_xyz(record)), &batch.bounds);

            chunk.low[index] = q.low;
            chunk.medium[index] = q.medium;
            chunk.high[index] = q.high;
            chunk.colors[index] = extract_color(record, color_offset, missing_color);
        }

        chunk.batches.push(batch.to_record());
    }

    chunk
}
