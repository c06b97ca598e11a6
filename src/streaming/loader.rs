//! Point-cloud loader: the public face of the streaming pipeline

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::arena::{ArenaBackend, HostBackend, StreamingArena};
use crate::core::{Error, LoaderConfig, Result};
use crate::source::PointCloudDescriptor;
use crate::streaming::background::BackgroundLoader;
use crate::streaming::queue::TaskQueue;
use crate::streaming::registry::{Progress, Registry};
use crate::streaming::scheduler::{self, IngestReport};
use crate::streaming::task::{LoadOutcome, LoadTask};
use crate::streaming::upload::{LoaderStats, ProcessOutcome, UploadConsumer};

/// Streams LAS files into a [`StreamingArena`].
///
/// `add` parses headers and queues load tasks, a background thread decodes
/// and encodes them, and `process` (called once per frame by the owner of
/// the arena) commits at most one encoded chunk.
pub struct PointCloudLoader<B: ArenaBackend = HostBackend> {
    config: LoaderConfig,
    registry: Arc<Registry>,
    load_queue: Arc<TaskQueue<LoadTask>>,
    upload_queue: Arc<TaskQueue<LoadOutcome>>,
    consumer: UploadConsumer,
    arena: StreamingArena<B>,
    background: BackgroundLoader,
    next_file_index: u32,
}

impl<B: ArenaBackend> PointCloudLoader<B> {
    /// Reserve the arena on `backend` and start the background thread
    pub fn new(config: LoaderConfig, backend: B) -> Result<Self> {
        config.validate()?;
        let arena = StreamingArena::new(backend, config.capacity_points, config.capacity_batches, config.page_size)?;

        let registry = Arc::new(Registry::new(&config));
        let load_queue = Arc::new(TaskQueue::new(config.queue_order));
        let upload_queue = Arc::new(TaskQueue::new(config.queue_order));
        let consumer = UploadConsumer::new(upload_queue.clone(), registry.clone());
        let background = BackgroundLoader::spawn(load_queue.clone(), upload_queue.clone(), config.clone())?;

        log::info!(
            "Point cloud loader ready: {:?} queues, {} points per batch, {} per task",
            config.queue_order,
            config.points_per_batch,
            config.points_per_chunk
        );

        Ok(Self {
            config,
            registry,
            load_queue,
            upload_queue,
            consumer,
            arena,
            background,
            next_file_index: 0,
        })
    }

    /// Register files and queue them for loading.
    ///
    /// Blocks until every header is parsed, then hands the accepted
    /// descriptors to `callback` before returning. File indices follow
    /// submission order; rejected files still consume an index.
    pub fn add<P, F>(&mut self, paths: impl IntoIterator<Item = P>, callback: F) -> Result<IngestReport>
    where
        P: AsRef<Path>,
        F: FnOnce(&[Arc<PointCloudDescriptor>]),
    {
        let mut submissions: Vec<(u32, PathBuf)> = Vec::new();
        for path in paths {
            let file_index = self.next_file_index;
            self.next_file_index = self.next_file_index.checked_add(1).ok_or_else(|| {
                Error::Capacity("file index space exhausted".into())
            })?;
            submissions.push((file_index, path.as_ref().to_path_buf()));
        }

        let report = scheduler::ingest(submissions, &self.config, &self.registry, &self.load_queue)?;
        log::info!(
            "Added {} files ({} points), rejected {}",
            report.accepted.len(),
            report.total_points(),
            report.rejected.len()
        );
        callback(&report.accepted);
        Ok(report)
    }

    /// Commit at most one encoded chunk. Call once per frame.
    pub fn process(&mut self) -> ProcessOutcome {
        self.consumer.process(&mut self.arena)
    }

    pub fn points_loaded(&self) -> u64 {
        self.registry.points_loaded()
    }

    pub fn batches_loaded(&self) -> u64 {
        self.registry.batches_loaded()
    }

    pub fn progress(&self) -> Progress {
        self.registry.progress()
    }

    /// Registered files in registration order
    pub fn files(&self) -> Vec<Arc<PointCloudDescriptor>> {
        self.registry.files()
    }

    pub fn stats(&self) -> LoaderStats {
        self.consumer.stats()
    }

    pub fn pending_load_tasks(&self) -> usize {
        self.load_queue.len()
    }

    pub fn pending_uploads(&self) -> usize {
        self.upload_queue.len()
    }

    /// True once every registered point is either loaded or dropped
    pub fn is_settled(&self) -> bool {
        let progress = self.progress();
        progress.points_loaded + self.stats().points_failed >= progress.points_registered
    }

    pub fn arena(&self) -> &StreamingArena<B> {
        &self.arena
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Stop the background thread. Queued work is abandoned.
    pub fn shutdown(&mut self) {
        if self.background.is_running() {
            log::info!(
                "Stopping loader: {} tasks decoded, {} load tasks and {} uploads pending",
                self.background.tasks_decoded(),
                self.pending_load_tasks(),
                self.pending_uploads()
            );
        }
        self.background.shutdown();
    }
}

impl PointCloudLoader<HostBackend> {
    /// Loader with a host-memory arena
    pub fn host(config: LoaderConfig) -> Result<Self> {
        Self::new(config, HostBackend::new())
    }
}
