//! Background decode thread

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::core::{Error, LoaderConfig, Result};
use crate::encode::encode_chunk;
use crate::source::read_records;
use crate::streaming::queue::TaskQueue;
use crate::streaming::task::{LoadOutcome, LoadTask, UploadTask};

/// Read and encode one load task. Errors are returned as a failed outcome.
pub fn decode_task(task: LoadTask, config: &LoaderConfig) -> LoadOutcome {
    let records = match read_records(&task.file, task.first_point, task.num_points) {
        Ok(records) => records,
        Err(error) => return LoadOutcome::Failed { task, error },
    };

    let chunk = encode_chunk(
        &task.file,
        task.first_point,
        task.num_points,
        &records,
        config.points_per_batch,
        config.missing_color,
    );

    LoadOutcome::Ready(UploadTask {
        sparse_offset: task.sparse_offset(),
        num_points: task.num_points,
        file: task.file,
        chunk,
    })
}

/// Single worker thread that drains the load queue into the upload queue.
///
/// The thread sleeps for the poll interval between attempts, so shutdown
/// waits at most one interval plus the task in flight.
pub struct BackgroundLoader {
    stop: Arc<AtomicBool>,
    decoded: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundLoader {
    pub fn spawn(
        load_queue: Arc<TaskQueue<LoadTask>>,
        upload_queue: Arc<TaskQueue<LoadOutcome>>,
        config: LoaderConfig,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let decoded = Arc::new(AtomicU64::new(0));

        let handle = {
            let stop = stop.clone();
            let decoded = decoded.clone();
            thread::Builder::new()
                .name("pointstream-loader".into())
                .spawn(move || run(&load_queue, &upload_queue, &config, &stop, &decoded))
                .map_err(|e| Error::Worker(format!("failed to spawn loader thread: {}", e)))?
        };

        Ok(Self {
            stop,
            decoded,
            handle: Some(handle),
        })
    }

    /// Tasks decoded so far, failed ones included
    pub fn tasks_decoded(&self) -> u64 {
        self.decoded.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and wait for it to exit
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Background loader thread panicked");
            } else {
                log::debug!("Background loader stopped");
            }
        }
    }
}

impl Drop for BackgroundLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    load_queue: &TaskQueue<LoadTask>,
    upload_queue: &TaskQueue<LoadOutcome>,
    config: &LoaderConfig,
    stop: &AtomicBool,
    decoded: &AtomicU64,
) {
    let interval = config.poll_interval();
    while !stop.load(Ordering::Acquire) {
        thread::sleep(interval);

        let Some(task) = load_queue.pop() else {
            continue;
        };
        log::trace!(
            "Decoding {} points {}..{}",
            task.file.path().display(),
            task.first_point,
            task.first_point + task.num_points
        );

        let outcome = decode_task(task, config);
        upload_queue.push(outcome);
        decoded.fetch_add(1, Ordering::AcqRel);
    }
}
