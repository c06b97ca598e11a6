//! Per-frame driving of the loader and the active frame method

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::arena::ArenaBackend;
use crate::math::Aabb;
use crate::source::PointCloudDescriptor;
use crate::streaming::{PointCloudLoader, Progress, ProcessOutcome};

/// Tracks frame timing and calculates FPS
#[derive(Debug)]
pub struct FrameTimer {
    last_frame: Instant,
    delta: Duration,
    frame_count: u64,
    fps_timer: Instant,
    fps: f32,
    fps_frame_count: u32,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            last_frame: now,
            delta: Duration::ZERO,
            frame_count: 0,
            fps_timer: now,
            fps: 0.0,
            fps_frame_count: 0,
        }
    }

    /// Call once per frame to update timing
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    fn tick_at(&mut self, now: Instant) {
        self.delta = now - self.last_frame;
        self.last_frame = now;
        self.frame_count += 1;
        self.fps_frame_count += 1;

        // Update FPS every second
        let fps_elapsed = now - self.fps_timer;
        if fps_elapsed >= Duration::from_secs(1) {
            self.fps = self.fps_frame_count as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = 0;
            self.fps_timer = now;
        }
    }

    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// What a frame method sees each frame
#[derive(Clone, Debug)]
pub struct FrameContext {
    pub frame: u64,
    pub delta: Duration,
    /// Frames per second over the last full second, 0 before the first one
    pub fps: f32,
    pub outcome: ProcessOutcome,
    pub progress: Progress,
    pub files: Vec<Arc<PointCloudDescriptor>>,
}

impl FrameContext {
    /// Header box of the first registered file, the natural camera target
    pub fn focus_box(&self) -> Option<Aabb> {
        self.files.first().map(|f| f.bounds())
    }
}

/// A processing strategy run once per frame
pub trait FrameMethod {
    fn name(&self) -> &str;

    fn update(&mut self, ctx: &FrameContext);

    fn render(&mut self, ctx: &FrameContext);
}

/// Named frame methods with one explicitly selected
#[derive(Default)]
pub struct MethodRegistry {
    methods: Vec<Box<dyn FrameMethod>>,
    selected: Option<usize>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method. The first one added becomes the selection.
    pub fn register(&mut self, method: Box<dyn FrameMethod>) {
        self.methods.push(method);
        if self.selected.is_none() {
            self.selected = Some(0);
        }
    }

    /// Select a method by name. Returns false and keeps the current
    /// selection if no method has that name.
    pub fn select(&mut self, name: &str) -> bool {
        match self.methods.iter().position(|m| m.name() == name) {
            Some(index) => {
                self.selected = Some(index);
                log::info!("Frame method: {}", name);
                true
            }
            None => {
                log::warn!("Unknown frame method: {}", name);
                false
            }
        }
    }

    pub fn selected_name(&self) -> Option<&str> {
        self.selected.map(|i| self.methods[i].name())
    }

    pub fn names(&self) -> Vec<&str> {
        self.methods.iter().map(|m| m.name()).collect()
    }

    fn selected_mut(&mut self) -> Option<&mut (dyn FrameMethod + 'static)> {
        let index = self.selected?;
        Some(self.methods[index].as_mut())
    }
}

/// Owns the loader and runs one frame at a time: commit pending data,
/// then update and render the selected method.
pub struct FrameDriver<B: ArenaBackend> {
    loader: PointCloudLoader<B>,
    methods: MethodRegistry,
    timer: FrameTimer,
}

impl<B: ArenaBackend> FrameDriver<B> {
    pub fn new(loader: PointCloudLoader<B>, methods: MethodRegistry) -> Self {
        Self {
            loader,
            methods,
            timer: FrameTimer::new(),
        }
    }

    pub fn frame(&mut self) -> ProcessOutcome {
        self.timer.tick();
        let outcome = self.loader.process();

        let ctx = FrameContext {
            frame: self.timer.frame_count(),
            delta: self.timer.delta(),
            fps: self.timer.fps(),
            outcome,
            progress: self.loader.progress(),
            files: self.loader.files(),
        };
        if let Some(method) = self.methods.selected_mut() {
            method.update(&ctx);
            method.render(&ctx);
        }
        outcome
    }

    pub fn loader(&self) -> &PointCloudLoader<B> {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut PointCloudLoader<B> {
        &mut self.loader
    }

    pub fn methods_mut(&mut self) -> &mut MethodRegistry {
        &mut self.methods
    }

    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }

    pub fn into_loader(self) -> PointCloudLoader<B> {
        self.loader
    }
}

/// Logs load progress every `interval` frames and whenever a file finishes
pub struct ProgressReport {
    interval: u64,
    finished: usize,
    focus: Option<Aabb>,
}

impl ProgressReport {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            finished: 0,
            focus: None,
        }
    }

    /// Box of the first file, once known
    pub fn focus(&self) -> Option<Aabb> {
        self.focus
    }
}

impl FrameMethod for ProgressReport {
    fn name(&self) -> &str {
        "progress"
    }

    fn update(&mut self, ctx: &FrameContext) {
        if self.focus.is_none() {
            if let Some(focus) = ctx.focus_box() {
                log::info!("Focus: center {:?}, size {:?}", focus.center(), focus.size());
                self.focus = Some(focus);
            }
        }
    }

    fn render(&mut self, ctx: &FrameContext) {
        let finished = ctx.files.iter().filter(|f| f.is_fully_loaded()).count();
        if finished != self.finished {
            self.finished = finished;
            log::info!("{}/{} files loaded", finished, ctx.files.len());
        }
        if ctx.frame % self.interval == 0 {
            let p = &ctx.progress;
            log::info!(
                "Frame {} ({:.0} fps): {}/{} points, {}/{} batches",
                ctx.frame,
                ctx.fps,
                p.points_loaded,
                p.points_registered,
                p.batches_loaded,
                p.batches_registered
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DVec3;
    use crate::core::LoaderConfig;
    use crate::source::las::synthetic::{build_las, SyntheticPoint};
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    /// Records the frames and hook order it saw
    struct Recorder {
        name: &'static str,
        calls: Rc<RefCell<Vec<(&'static str, &'static str, u64)>>>,
    }

    impl FrameMethod for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn update(&mut self, ctx: &FrameContext) {
            self.calls.borrow_mut().push((self.name, "update", ctx.frame));
        }

        fn render(&mut self, ctx: &FrameContext) {
            self.calls.borrow_mut().push((self.name, "render", ctx.frame));
        }
    }

    fn recorders() -> (MethodRegistry, Rc<RefCell<Vec<(&'static str, &'static str, u64)>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut registry = MethodRegistry::new();
        for name in ["a", "b"] {
            registry.register(Box::new(Recorder { name, calls: calls.clone() }));
        }
        (registry, calls)
    }

    fn loader() -> PointCloudLoader {
        let config = LoaderConfig {
            capacity_points: 10_000,
            capacity_batches: 100,
            page_size: 256,
            points_per_batch: 8,
            points_per_chunk: 8,
            poll_interval_ms: 1,
            ..Default::default()
        };
        PointCloudLoader::host(config).expect("loader failed")
    }

    #[test]
    fn test_fps_updates_once_per_second() {
        let start = Instant::now();
        let mut timer = FrameTimer::starting_at(start);
        assert_eq!(timer.fps(), 0.0);

        for i in 1..=19 {
            timer.tick_at(start + Duration::from_millis(i * 50));
        }
        assert_eq!(timer.fps(), 0.0);
        assert_eq!(timer.delta(), Duration::from_millis(50));

        timer.tick_at(start + Duration::from_millis(1000));
        assert!((timer.fps() - 20.0).abs() < 1e-3);

        // Window restarts; a slower second replaces the value
        for i in 1..=10 {
            timer.tick_at(start + Duration::from_millis(1000 + i * 100));
        }
        assert!((timer.fps() - 10.0).abs() < 1e-3);
        assert_eq!(timer.frame_count(), 30);
    }

    #[test]
    fn test_frame_context_carries_fps() {
        let (methods, _) = recorders();
        let mut driver = FrameDriver::new(loader(), methods);
        driver.timer.fps = 42.0;
        driver.timer.fps_timer = Instant::now();

        struct Fps(Rc<RefCell<Vec<f32>>>);
        impl FrameMethod for Fps {
            fn name(&self) -> &str {
                "fps"
            }
            fn update(&mut self, _ctx: &FrameContext) {}
            fn render(&mut self, ctx: &FrameContext) {
                self.0.borrow_mut().push(ctx.fps);
            }
        }
        let seen = Rc::new(RefCell::new(Vec::new()));
        driver.methods_mut().register(Box::new(Fps(seen.clone())));
        driver.methods_mut().select("fps");
        driver.frame();
        assert_eq!(*seen.borrow(), vec![42.0]);
    }

    #[test]
    fn test_select_by_name() {
        let (mut registry, _) = recorders();
        assert_eq!(registry.selected_name(), Some("a"));
        assert!(registry.select("b"));
        assert_eq!(registry.selected_name(), Some("b"));
        assert!(!registry.select("missing"));
        assert_eq!(registry.selected_name(), Some("b"));
        assert_eq!(registry.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_registry_selects_nothing() {
        let mut registry = MethodRegistry::new();
        assert!(registry.selected_name().is_none());
        assert!(!registry.select("a"));
    }

    #[test]
    fn test_frame_runs_selected_method_only() {
        let (mut methods, calls) = recorders();
        methods.select("b");
        let mut driver = FrameDriver::new(loader(), methods);

        assert_eq!(driver.frame(), ProcessOutcome::Idle);
        driver.frame();

        assert_eq!(
            *calls.borrow(),
            vec![("b", "update", 1), ("b", "render", 1), ("b", "update", 2), ("b", "render", 2)]
        );
        assert_eq!(driver.timer().frame_count(), 2);
    }

    #[test]
    fn test_progress_report_finds_focus() {
        let dir = TempDir::new().expect("tempdir failed");
        let path = dir.path().join("a.las");
        let points = [
            SyntheticPoint { xyz: [0, 0, 0], rgb: [0; 3] },
            SyntheticPoint { xyz: [10, 20, 30], rgb: [0; 3] },
        ];
        let bytes = build_las(2, DVec3::ONE, DVec3::ZERO, &points, false).expect("build failed");
        std::fs::write(&path, bytes).expect("write failed");

        let mut methods = MethodRegistry::new();
        methods.register(Box::new(ProgressReport::new(1)));
        let mut driver = FrameDriver::new(loader(), methods);
        driver.loader_mut().add([&path], |_| {}).expect("add failed");

        let deadline = Instant::now() + Duration::from_secs(20);
        while !driver.loader().is_settled() && Instant::now() < deadline {
            driver.frame();
            std::thread::sleep(Duration::from_millis(1));
        }

        let loader = driver.into_loader();
        assert_eq!(loader.points_loaded(), 2);

        let ctx = FrameContext {
            frame: 1,
            delta: Duration::ZERO,
            fps: 0.0,
            outcome: ProcessOutcome::Idle,
            progress: loader.progress(),
            files: loader.files(),
        };
        let mut report = ProgressReport::new(1);
        assert!(report.focus().is_none());
        report.update(&ctx);
        report.render(&ctx);
        assert_eq!(report.focus().map(|b| b.max), Some(DVec3::new(10.0, 20.0, 30.0)));
    }
}
