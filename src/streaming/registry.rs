//! Registered files and the shared load counters

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::core::{Error, LoaderConfig, Result};
use crate::source::{LasHeader, PointCloudDescriptor};
use crate::streaming::task::batches_for_points;

/// Snapshot of the load counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub files: usize,
    pub points_registered: u64,
    pub batches_registered: u64,
    pub points_loaded: u64,
    pub batches_loaded: u64,
}

#[derive(Debug, Default)]
struct RegistryState {
    files: Vec<Arc<PointCloudDescriptor>>,
    points_registered: u64,
    batches_registered: u64,
    points_loaded: u64,
    batches_loaded: u64,
}

/// File list and counters behind one mutex.
///
/// Registration reserves a file's global point range and its batch slots up
/// front, so capacity is checked before any work is queued.
#[derive(Debug)]
pub struct Registry {
    state: Mutex<RegistryState>,
    max_files: usize,
    capacity_points: u64,
    capacity_batches: u64,
    points_per_chunk: u64,
    points_per_batch: u32,
}

impl Registry {
    pub fn new(config: &LoaderConfig) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            max_files: config.max_files as usize,
            capacity_points: config.capacity_points,
            capacity_batches: config.capacity_batches,
            points_per_chunk: config.points_per_chunk,
            points_per_batch: config.points_per_batch,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assign the next global point range to a parsed file and record it
    pub fn register(&self, file_index: u32, path: PathBuf, header: LasHeader) -> Result<Arc<PointCloudDescriptor>> {
        let num_points = header.num_points;
        let num_batches = batches_for_points(num_points, self.points_per_chunk, self.points_per_batch);

        let mut state = self.lock();
        if state.files.len() >= self.max_files {
            return Err(Error::Capacity(format!(
                "{}: file limit of {} reached",
                path.display(),
                self.max_files
            )));
        }
        if state.points_registered + num_points > self.capacity_points {
            return Err(Error::Capacity(format!(
                "{}: {} points do not fit ({} of {} registered)",
                path.display(),
                num_points,
                state.points_registered,
                self.capacity_points
            )));
        }
        if state.batches_registered + num_batches > self.capacity_batches {
            return Err(Error::Capacity(format!(
                "{}: {} batches do not fit ({} of {} registered)",
                path.display(),
                num_batches,
                state.batches_registered,
                self.capacity_batches
            )));
        }

        let sparse_offset = state.points_registered;
        let desc = Arc::new(PointCloudDescriptor::new(file_index, path, header, sparse_offset, num_batches));
        state.points_registered += num_points;
        state.batches_registered += num_batches;
        state.files.push(desc.clone());
        Ok(desc)
    }

    /// Advance the loaded counters after a chunk was committed
    pub(crate) fn record_commit(&self, file: &PointCloudDescriptor, points: u64, batches: u64) {
        let mut state = self.lock();
        state.points_loaded += points;
        state.batches_loaded += batches;
        file.add_loaded(points);
    }

    pub fn progress(&self) -> Progress {
        let state = self.lock();
        Progress {
            files: state.files.len(),
            points_registered: state.points_registered,
            batches_registered: state.batches_registered,
            points_loaded: state.points_loaded,
            batches_loaded: state.batches_loaded,
        }
    }

    pub fn points_loaded(&self) -> u64 {
        self.lock().points_loaded
    }

    pub fn batches_loaded(&self) -> u64 {
        self.lock().batches_loaded
    }

    /// Registered files in registration order
    pub fn files(&self) -> Vec<Arc<PointCloudDescriptor>> {
        self.lock().files.clone()
    }

    pub fn file(&self, file_index: u32) -> Option<Arc<PointCloudDescriptor>> {
        self.lock().files.iter().find(|f| f.file_index == file_index).cloned()
    }
}
