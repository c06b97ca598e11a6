//! Pointstream - stream LAS files into a sparse point arena
//!
//! Usage: pointstream [OPTIONS] FILES...
//!
//! Options:
//!   --config <FILE>     Loader configuration (JSON)
//!   --capacity <N>      Arena capacity in points
//!   --fifo              Load tasks oldest first
//!   --gpu               Commit to a wgpu arena on a headless adapter
//!   --max-frames <N>    Stop after N frames even if loading is unfinished
//!   --save-config <FILE> Write the effective configuration as JSON

use std::path::PathBuf;
use std::time::{Duration, Instant};

use pointstream::arena::{ArenaBackend, GpuBackend, HostBackend};
use pointstream::arena::gpu::DEFAULT_SEGMENT_SIZE;
use pointstream::core::{logging, LoaderConfig, QueueOrder, Result};
use pointstream::frame::{FrameDriver, MethodRegistry, ProgressReport};
use pointstream::streaming::PointCloudLoader;

const FRAME_TIME: Duration = Duration::from_micros(16_667);

/// Flags that take a value; anything else not starting with `--` is a file
const VALUE_FLAGS: [&str; 4] = ["--config", "--capacity", "--max-frames", "--save-config"];

fn main() {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || has_flag(&args, "--help") {
        eprintln!("Usage: pointstream [--config FILE] [--capacity N] [--fifo] [--gpu] [--max-frames N] [--save-config FILE] FILES...");
        std::process::exit(if args.is_empty() { 2 } else { 0 });
    }

    if let Err(e) = run(&args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<()> {
    let mut config = match parse_str_arg(args, "--config") {
        Some(path) => LoaderConfig::load(&PathBuf::from(path))?,
        None => LoaderConfig::default(),
    };
    if let Some(capacity) = parse_u64_arg(args, "--capacity") {
        config.capacity_points = capacity;
    }
    if has_flag(args, "--fifo") {
        config.queue_order = QueueOrder::Fifo;
    }
    if let Some(path) = parse_str_arg(args, "--save-config") {
        config.validate()?;
        config.save(&PathBuf::from(&path))?;
        log::info!("Configuration written to {}", path);
    }
    let max_frames = parse_u64_arg(args, "--max-frames");
    let files = file_args(args);
    if files.is_empty() {
        log::warn!("No input files given");
        return Ok(());
    }

    if has_flag(args, "--gpu") {
        let backend = pollster::block_on(GpuBackend::headless(DEFAULT_SEGMENT_SIZE))?;
        stream(PointCloudLoader::new(config, backend)?, &files, max_frames)
    } else {
        stream(PointCloudLoader::new(config, HostBackend::new())?, &files, max_frames)
    }
}

fn stream<B: ArenaBackend>(loader: PointCloudLoader<B>, files: &[PathBuf], max_frames: Option<u64>) -> Result<()> {
    let mut driver = FrameDriver::new(loader, MethodRegistry::new());
    let methods = driver.methods_mut();
    methods.register(Box::new(ProgressReport::new(60)));
    log::info!("Frame methods: {:?}, running {:?}", methods.names(), methods.selected_name());

    let start = Instant::now();
    let report = driver.loader_mut().add(files, |accepted| {
        if let Some(first) = accepted.first() {
            let focus = first.bounds();
            log::info!(
                "Focus on {}: center {:?}, size {:?}",
                first.path().display(),
                focus.center(),
                focus.size()
            );
        }
    })?;
    log::info!(
        "Headers parsed in {:.1}ms: {} files, {} points",
        start.elapsed().as_secs_f64() * 1000.0,
        report.accepted.len(),
        report.total_points()
    );

    while !driver.loader().is_settled() {
        if max_frames.is_some_and(|max| driver.timer().frame_count() >= max) {
            log::warn!("Stopping after {} frames", driver.timer().frame_count());
            break;
        }
        let frame_start = Instant::now();
        driver.frame();
        if let Some(rest) = FRAME_TIME.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    let mut loader = driver.into_loader();
    loader.shutdown();
    let progress = loader.progress();
    let stats = loader.stats();
    let arena = loader.arena();
    log::info!(
        "Loaded {}/{} points, {} batches in {:.2}s ({} tasks failed)",
        progress.points_loaded,
        progress.points_registered,
        progress.batches_loaded,
        start.elapsed().as_secs_f64(),
        stats.tasks_failed
    );
    log::info!(
        "Arena: {} point pages and {} batch pages committed ({}MB)",
        arena.committed_point_pages(),
        arena.committed_batch_pages(),
        arena.backend().committed_bytes() / 1024 / 1024
    );
    Ok(())
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_u64_arg(args: &[String], flag: &str) -> Option<u64> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn file_args(args: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with("--") {
            files.push(PathBuf::from(arg));
        }
    }
    files
}
