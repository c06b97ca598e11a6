//! Frame-side consumer that commits encoded chunks to the arena

use std::sync::Arc;

use crate::arena::{ArenaBackend, ArenaSpace, StreamingArena};
use crate::core::Result;
use crate::streaming::queue::TaskQueue;
use crate::streaming::registry::Registry;
use crate::streaming::task::{LoadOutcome, UploadTask};

/// What one `process` call did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Nothing was waiting
    Idle,
    /// A chunk was committed and the counters advanced
    Committed { points: u64, batches: u64 },
    /// A failed or uncommittable task was dropped
    Skipped,
}

/// Consumer-side statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoaderStats {
    pub tasks_committed: u64,
    pub tasks_failed: u64,
    pub points_failed: u64,
    /// Pages newly committed in each point space
    pub point_pages_committed: u64,
    pub batch_pages_committed: u64,
}

/// Drains at most one upload task per call.
///
/// Only this consumer advances the loaded counters, so the batch slot of a
/// chunk is simply the current batch count.
pub struct UploadConsumer {
    upload_queue: Arc<TaskQueue<LoadOutcome>>,
    registry: Arc<Registry>,
    stats: LoaderStats,
}

impl UploadConsumer {
    pub fn new(upload_queue: Arc<TaskQueue<LoadOutcome>>, registry: Arc<Registry>) -> Self {
        Self {
            upload_queue,
            registry,
            stats: LoaderStats::default(),
        }
    }

    pub fn stats(&self) -> LoaderStats {
        self.stats
    }

    pub fn process<B: ArenaBackend>(&mut self, arena: &mut StreamingArena<B>) -> ProcessOutcome {
        let Some(outcome) = self.upload_queue.pop() else {
            return ProcessOutcome::Idle;
        };

        match outcome {
            LoadOutcome::Ready(task) => match self.commit(arena, &task) {
                Ok(()) => ProcessOutcome::Committed {
                    points: task.num_points,
                    batches: task.num_batches(),
                },
                Err(e) => {
                    log::warn!(
                        "Dropping points {}..{} of {}: {}",
                        task.sparse_offset,
                        task.sparse_offset + task.num_points,
                        task.file.path().display(),
                        e
                    );
                    self.record_failure(task.num_points);
                    ProcessOutcome::Skipped
                }
            },
            LoadOutcome::Failed { task, error } => {
                log::warn!(
                    "Skipping points {}..{} of {}: {}",
                    task.first_point,
                    task.first_point + task.num_points,
                    task.file.path().display(),
                    error
                );
                self.record_failure(task.num_points);
                ProcessOutcome::Skipped
            }
        }
    }

    fn commit<B: ArenaBackend>(&mut self, arena: &mut StreamingArena<B>, task: &UploadTask) -> Result<()> {
        let first_batch = self.registry.batches_loaded();
        let num_batches = task.num_batches();

        let point_pages = arena.commit_points(task.sparse_offset, task.num_points)?;
        let batch_pages = arena.commit_batches(first_batch, num_batches)?;

        arena.write_batches(first_batch, &task.chunk.batches)?;
        let chunk = &task.chunk;
        for (space, words) in [
            (ArenaSpace::Low, &chunk.low),
            (ArenaSpace::Medium, &chunk.medium),
            (ArenaSpace::High, &chunk.high),
            (ArenaSpace::Color, &chunk.colors),
        ] {
            arena.write_points(space, task.sparse_offset, words)?;
        }

        self.registry.record_commit(&task.file, task.num_points, num_batches);
        self.stats.tasks_committed += 1;
        self.stats.point_pages_committed += point_pages;
        self.stats.batch_pages_committed += batch_pages;

        log::debug!(
            "Committed {} points at {} and {} batches at {} ({} new pages)",
            task.num_points,
            task.sparse_offset,
            num_batches,
            first_batch,
            point_pages + batch_pages
        );
        Ok(())
    }

    fn record_failure(&mut self, points: u64) {
        self.stats.tasks_failed += 1;
        self.stats.points_failed += points;
    }
}
