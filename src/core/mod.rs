//! Core types and utilities shared by the ingestion pipeline

pub mod types;
pub mod error;
pub mod logging;
pub mod config;

pub use types::*;
pub use error::Error;
pub use config::{LoaderConfig, QueueOrder};
