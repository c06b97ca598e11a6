//! Loader configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Hard sanity ceiling on the point count read from a file header.
pub const MAX_POINTS_PER_FILE: u64 = 1_000_000_000;

/// Pop policy shared by the load-task and upload-task queues.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOrder {
    /// Most recently pushed task first
    #[default]
    Lifo,
    /// Oldest task first
    Fifo,
}

/// Configuration for the point-cloud loader and its streaming arena
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Capacity of each point address space, in points
    pub capacity_points: u64,
    /// Capacity of the batch-metadata address space, in batches
    pub capacity_batches: u64,
    /// Maximum number of registered files
    pub max_files: u32,
    /// Point counts read from headers are clamped to this value
    pub max_points_per_file: u64,
    /// Points per batch (one quantization frame)
    pub points_per_batch: u32,
    /// Maximum points per load task
    pub points_per_chunk: u64,
    /// Physical commit granularity in bytes
    pub page_size: u64,
    /// Header-parse worker count, 0 selects the available parallelism
    pub header_threads: usize,
    /// Background loader sleep between polls
    pub poll_interval_ms: u64,
    /// Pop order of the task queues
    pub queue_order: QueueOrder,
    /// Packed color assigned to records whose format carries no RGB
    pub missing_color: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            capacity_points: 1_000_000_000,
            capacity_batches: 200_000,
            max_files: 65_536,
            max_points_per_file: MAX_POINTS_PER_FILE,
            points_per_batch: 10_240, // 80 points per thread, 128 threads per workgroup
            points_per_chunk: 1_000_000,
            page_size: 65_536,
            header_threads: 0,
            poll_interval_ms: 10,
            queue_order: QueueOrder::Lifo,
            missing_color: 0x00FF_FFFF,
        }
    }
}

impl LoaderConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: LoaderConfig = serde_json::from_str(&json)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check the invariants the pipeline relies on
    pub fn validate(&self) -> Result<()> {
        if self.points_per_batch == 0 {
            return Err(Error::Config("points_per_batch must be non-zero".into()));
        }
        if self.points_per_chunk < self.points_per_batch as u64 {
            return Err(Error::Config(format!(
                "points_per_chunk ({}) must be at least points_per_batch ({})",
                self.points_per_chunk, self.points_per_batch
            )));
        }
        if self.page_size == 0 || !self.page_size.is_power_of_two() || self.page_size % 4 != 0 {
            return Err(Error::Config(format!(
                "page_size ({}) must be a power of two and a multiple of 4",
                self.page_size
            )));
        }
        if self.capacity_points == 0 || self.capacity_points > u32::MAX as u64 {
            return Err(Error::Config(format!(
                "capacity_points ({}) must be in 1..={}",
                self.capacity_points,
                u32::MAX
            )));
        }
        if self.capacity_batches == 0 {
            return Err(Error::Config("capacity_batches must be non-zero".into()));
        }
        if self.max_points_per_file == 0 {
            return Err(Error::Config("max_points_per_file must be non-zero".into()));
        }
        Ok(())
    }

    /// Number of header-parse workers to spawn
    pub fn header_worker_count(&self) -> usize {
        if self.header_threads > 0 {
            self.header_threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
