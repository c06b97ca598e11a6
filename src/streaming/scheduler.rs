//! Header parsing, registration and task scheduling for new files

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;

use crate::core::{Error, LoaderConfig, Result};
use crate::source::{LasHeader, PointCloudDescriptor};
use crate::streaming::queue::TaskQueue;
use crate::streaming::registry::Registry;
use crate::streaming::task::{split_into_tasks, LoadTask};

/// Outcome of one `add` call
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Registered files, in submission order
    pub accepted: Vec<Arc<PointCloudDescriptor>>,
    /// Files that could not be registered, with the reason
    pub rejected: Vec<(PathBuf, Error)>,
}

impl IngestReport {
    pub fn total_points(&self) -> u64 {
        self.accepted.iter().map(|f| f.num_points()).sum()
    }
}

/// Parse and register a set of files on a short-lived worker pool.
///
/// Each file is handled independently: parse the header without holding any
/// lock, register under the registry lock, then queue its load tasks under
/// the queue lock. A failure only affects its own file.
pub fn ingest(
    submissions: Vec<(u32, PathBuf)>,
    config: &LoaderConfig,
    registry: &Registry,
    load_queue: &TaskQueue<LoadTask>,
) -> Result<IngestReport> {
    if submissions.is_empty() {
        return Ok(IngestReport::default());
    }

    let threads = config.header_worker_count().min(submissions.len()).max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("pointstream-header-{}", i))
        .build()
        .map_err(|e| Error::Worker(e.to_string()))?;

    log::debug!("Parsing {} headers on {} threads", submissions.len(), threads);

    let results: Vec<(PathBuf, Result<Arc<PointCloudDescriptor>>)> = pool.install(|| {
        submissions
            .into_par_iter()
            .map(|(file_index, path)| {
                let result = ingest_file(file_index, &path, config, registry, load_queue);
                (path, result)
            })
            .collect()
    });

    let mut report = IngestReport::default();
    for (path, result) in results {
        match result {
            Ok(desc) => report.accepted.push(desc),
            Err(e) => {
                log::warn!("Skipping {}: {}", path.display(), e);
                report.rejected.push((path, e));
            }
        }
    }
    Ok(report)
}

fn ingest_file(
    file_index: u32,
    path: &Path,
    config: &LoaderConfig,
    registry: &Registry,
    load_queue: &TaskQueue<LoadTask>,
) -> Result<Arc<PointCloudDescriptor>> {
    let header = LasHeader::read(path, config.max_points_per_file)?;
    let desc = registry.register(file_index, path.to_path_buf(), header)?;

    let tasks = split_into_tasks(&desc, config.points_per_chunk);
    log::info!(
        "Registered {} as file {}: {} points at {}, {} tasks",
        path.display(),
        desc.file_index,
        desc.num_points(),
        desc.sparse_offset,
        tasks.len()
    );
    load_queue.extend(tasks);
    Ok(desc)
}
