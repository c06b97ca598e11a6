//! Pointstream - streaming point-cloud ingestion into a sparse arena

pub mod core;
pub mod math;
pub mod source;
pub mod encode;
pub mod arena;
pub mod streaming;
pub mod frame;
