//! Batch planning and quantization of raw point records

pub mod batch;
pub mod quantize;
pub mod chunk;

pub use batch::{Batch, BatchRecord, BATCH_RECORD_SIZE, batch_count, partition, plan_batches};
pub use quantize::{
    QuantizedPosition, Tier,
    encode_position, decode_position, decode_position_at, extract_color,
    STEPS_30BIT, MASK_10BIT,
};
pub use chunk::{EncodedChunk, encode_chunk};
