//! Streaming ingestion pipeline
//!
//! Files are registered by a short-lived header pool, split into load
//! tasks, decoded on one background thread and committed to the arena by
//! the frame loop. The registry lock and the two queue locks are never held
//! at the same time.

pub mod queue;
pub mod task;
pub mod registry;
pub mod scheduler;
pub mod background;
pub mod upload;
pub mod loader;

pub use queue::TaskQueue;
pub use task::{LoadOutcome, LoadTask, UploadTask};
pub use registry::{Progress, Registry};
pub use scheduler::IngestReport;
pub use background::{BackgroundLoader, decode_task};
pub use upload::{LoaderStats, ProcessOutcome, UploadConsumer};
pub use loader::PointCloudLoader;
