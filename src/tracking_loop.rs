// src/tracking_loop.rs - background capture loop and its control surface
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Instant;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::capture::FrameSource;
use crate::config::LoopConfig;
use crate::engine::GestureEngine;
use crate::error::Result;
use crate::events::FrameReport;

const METRICS_WINDOW: usize = 30;

#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceMetrics {
    pub avg_fps: f32,
    pub avg_processing_time: f32,
    #[serde(skip)]
    frame_times: VecDeque<f32>,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            avg_fps: 0.0,
            avg_processing_time: 0.0,
            frame_times: VecDeque::with_capacity(METRICS_WINDOW),
        }
    }

    /// Records one frame's processing time in seconds.
    pub fn record(&mut self, elapsed: f32) {
        self.frame_times.push_front(elapsed);
        if self.frame_times.len() > METRICS_WINDOW {
            self.frame_times.pop_back();
        }

        self.avg_processing_time =
            self.frame_times.iter().sum::<f32>() / self.frame_times.len() as f32;
        self.avg_fps = if self.avg_processing_time > 0.0 {
            1.0 / self.avg_processing_time
        } else {
            0.0
        };
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub session_id: Uuid,
    pub running: bool,
    pub system_active: bool,
    pub started_at: Option<DateTime<Local>>,
    pub frames_processed: u64,
    pub metrics: PerformanceMetrics,
}

#[derive(Default)]
struct LoopStats {
    started_at: Option<DateTime<Local>>,
    frames_processed: u64,
    metrics: PerformanceMetrics,
}

fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        error!("{} lock poisoned, recovering", what);
        poisoned.into_inner()
    })
}

/// Owns one engine and drives it from a frame source on a worker thread.
pub struct TrackingService {
    engine: Arc<Mutex<GestureEngine>>,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<LoopStats>>,
    worker: Option<JoinHandle<()>>,
    config: LoopConfig,
}

impl TrackingService {
    pub fn new(engine: GestureEngine, config: LoopConfig) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Mutex::new(LoopStats::default())),
            worker: None,
            config,
        }
    }

    /// Starts the capture loop. Returns false when it is already running.
    ///
    /// Reports go to `updates`; the channel closes when the loop ends.
    pub fn start(
        &mut self,
        source: Box<dyn FrameSource>,
        updates: UnboundedSender<FrameReport>,
    ) -> bool {
        if self.is_running() {
            warn!("Tracking loop already running");
            return false;
        }
        // Reap a worker that ended on its own.
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }

        {
            let mut stats = lock_or_recover(&self.stats, "Loop stats");
            *stats = LoopStats {
                started_at: Some(Local::now()),
                frames_processed: 0,
                metrics: PerformanceMetrics::new(),
            };
        }

        self.running.store(true, Ordering::SeqCst);
        let worker = Worker {
            engine: Arc::clone(&self.engine),
            running: Arc::clone(&self.running),
            stats: Arc::clone(&self.stats),
            config: self.config.clone(),
        };
        let spawned = std::thread::Builder::new()
            .name("oktrix-capture".into())
            .spawn(move || worker.run(source, updates));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                info!("Tracking loop started");
                true
            }
            Err(e) => {
                error!("Failed to spawn capture thread: {}", e);
                self.running.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Stops the loop and waits for the worker to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("Capture thread panicked");
            }
            info!("Tracking loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_system_active(&self, active: bool) {
        lock_or_recover(&self.engine, "Engine").set_system_active(active);
    }

    pub fn reset(&self) {
        lock_or_recover(&self.engine, "Engine").reset();
    }

    pub fn status(&self) -> ServiceStatus {
        let (session_id, system_active) = {
            let engine = lock_or_recover(&self.engine, "Engine");
            (engine.session_id(), engine.is_active())
        };
        let stats = lock_or_recover(&self.stats, "Loop stats");
        ServiceStatus {
            session_id,
            running: self.is_running(),
            system_active,
            started_at: stats.started_at,
            frames_processed: stats.frames_processed,
            metrics: stats.metrics.clone(),
        }
    }

    /// Stops the loop and releases the landmark provider.
    pub fn shutdown(mut self) {
        self.stop();
        lock_or_recover(&self.engine, "Engine").release();
    }
}

impl Drop for TrackingService {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    engine: Arc<Mutex<GestureEngine>>,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<LoopStats>>,
    config: LoopConfig,
}

impl Worker {
    fn run(self, mut source: Box<dyn FrameSource>, updates: UnboundedSender<FrameReport>) {
        let _running = RunningGuard(Arc::clone(&self.running));
        let mut consecutive_failures = 0u32;

        while self.running.load(Ordering::SeqCst) {
            let step = catch_unwind(AssertUnwindSafe(|| -> Result<Option<(FrameReport, f32)>> {
                let Some(frame) = source.read_frame()? else {
                    return Ok(None);
                };
                let start = Instant::now();
                let report = lock_or_recover(&self.engine, "Engine").process_frame(&frame)?;
                Ok(Some((report, start.elapsed().as_secs_f32())))
            }));

            let (report, elapsed) = match step {
                Ok(Ok(Some(processed))) => processed,
                Ok(Ok(None)) => {
                    info!("Frame source exhausted");
                    break;
                }
                Ok(Err(e)) => {
                    warn!("Frame skipped: {}", e);
                    if self.note_failure(&mut consecutive_failures) {
                        break;
                    }
                    continue;
                }
                Err(panic) => {
                    error!("Frame processing panicked: {}", panic_message(&*panic));
                    if self.note_failure(&mut consecutive_failures) {
                        break;
                    }
                    continue;
                }
            };
            consecutive_failures = 0;

            let frames = {
                let mut stats = lock_or_recover(&self.stats, "Loop stats");
                stats.frames_processed += 1;
                stats.metrics.record(elapsed);
                if self.config.metrics_log_interval > 0
                    && stats.frames_processed % self.config.metrics_log_interval == 0
                {
                    info!(
                        frames = stats.frames_processed,
                        avg_fps = stats.metrics.avg_fps,
                        "Tracking metrics"
                    );
                }
                stats.frames_processed
            };

            if updates.send(report).is_err() {
                info!(frames, "Report receiver dropped, stopping capture");
                break;
            }
        }
    }

    /// Counts a failure. True when the optional failure limit is reached.
    fn note_failure(&self, consecutive_failures: &mut u32) -> bool {
        *consecutive_failures += 1;
        match self.config.max_consecutive_failures {
            Some(limit) if *consecutive_failures >= limit => {
                error!(
                    failures = *consecutive_failures,
                    "Too many consecutive frame failures, stopping capture"
                );
                true
            }
            _ => false,
        }
    }
}

/// Clears the running flag however the worker exits.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::runtime::Handle;
    use tokio::sync::mpsc;

    use super::*;
    use crate::capture::{BlankSource, Frame};
    use crate::config::{DispatchConfig, EngineConfig, EnvironmentConfig};
    use crate::dispatch::testing::RecordingExecutor;
    use crate::dispatch::Dispatcher;
    use crate::error::Error;
    use crate::landmarks::HandDetection;
    use crate::provider::{LandmarkProvider, RecordedLandmarkProvider};

    fn engine(provider: RecordedLandmarkProvider) -> GestureEngine {
        engine_with_provider(Box::new(provider))
    }

    struct FailingSource;

    /// Panics on one frame, reports no hand otherwise.
    struct PanickingProvider {
        panic_on: u64,
    }

    impl LandmarkProvider for PanickingProvider {
        fn detect(&mut self, frame: &Frame) -> Result<HandDetection> {
            if frame.index == self.panic_on {
                panic!("model crashed on frame {}", frame.index);
            }
            Ok(HandDetection::none())
        }
    }

    fn engine_with_provider(provider: Box<dyn LandmarkProvider>) -> GestureEngine {
        let dispatcher = Dispatcher::new(
            Arc::new(RecordingExecutor::default()),
            Handle::current(),
            &DispatchConfig::default(),
        );
        GestureEngine::new(
            EngineConfig::default(),
            EnvironmentConfig::default(),
            provider,
            dispatcher,
        )
        .unwrap()
    }

    impl FrameSource for FailingSource {
        fn read_frame(&mut self) -> Result<Option<Frame>> {
            Err(Error::Capture("camera unplugged".into()))
        }
    }

    #[test]
    fn metrics_average_over_window() {
        let mut metrics = PerformanceMetrics::new();
        for _ in 0..40 {
            metrics.record(0.1);
        }
        metrics.record(0.4);
        assert_eq!(metrics.frame_times.len(), METRICS_WINDOW);
        assert!((metrics.avg_processing_time - 0.11).abs() < 1e-4);
        assert!(metrics.avg_fps > 9.0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runs_until_source_is_exhausted() {
        let mut service = TrackingService::new(
            engine(RecordedLandmarkProvider::new(vec![None; 5])),
            LoopConfig::default(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(service.start(Box::new(BlankSource::new(Some(5), 30.0, 120)), tx));

        let mut reports = Vec::new();
        while let Some(report) = rx.recv().await {
            reports.push(report);
        }
        assert_eq!(reports.len(), 5);
        assert_eq!(reports[4].frame_index, 4);
        assert!(reports.iter().all(|r| !r.hand_detected));

        service.stop();
        let status = service.status();
        assert!(!status.running);
        assert_eq!(status.frames_processed, 5);
        assert!(status.started_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn gives_up_after_repeated_read_failures() {
        let config = LoopConfig {
            max_consecutive_failures: Some(3),
            ..LoopConfig::default()
        };
        let mut service = TrackingService::new(engine(RecordedLandmarkProvider::default()), config);
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(service.start(Box::new(FailingSource), tx));

        assert!(rx.recv().await.is_none());
        service.stop();
        assert_eq!(service.status().frames_processed, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_frame_is_skipped_and_loop_restarts() {
        let mut service = TrackingService::new(
            engine_with_provider(Box::new(PanickingProvider { panic_on: 2 })),
            LoopConfig::default(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(service.start(Box::new(BlankSource::new(Some(10), 30.0, 120)), tx));

        let mut indices = Vec::new();
        while let Some(report) = rx.recv().await {
            indices.push(report.frame_index);
        }
        assert_eq!(indices, vec![0, 1, 3, 4, 5, 6, 7, 8, 9]);
        assert!(!service.is_running());

        // The engine lock was poisoned by the panic; status and a fresh run
        // still work.
        assert_eq!(service.status().frames_processed, 9);
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(service.start(Box::new(BlankSource::new(Some(2), 30.0, 120)), tx));
        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
        service.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn read_failures_do_not_stop_the_loop_by_default() {
        struct FlakySource {
            reads: u64,
        }

        impl FrameSource for FlakySource {
            fn read_frame(&mut self) -> Result<Option<Frame>> {
                self.reads += 1;
                match self.reads {
                    1..=40 => Err(Error::Capture("dropped frame".into())),
                    41 => Ok(Some(Frame {
                        index: 0,
                        timestamp: 0.0,
                        image: image::DynamicImage::new_rgb8(2, 2),
                    })),
                    _ => Ok(None),
                }
            }
        }

        let mut service = TrackingService::new(
            engine(RecordedLandmarkProvider::default()),
            LoopConfig::default(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(service.start(Box::new(FlakySource { reads: 0 }), tx));

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
        service.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_halts_an_endless_source() {
        let mut service = TrackingService::new(
            engine(RecordedLandmarkProvider::default()),
            LoopConfig::default(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(service.start(Box::new(BlankSource::new(None, 30.0, 120).paced(true)), tx.clone()));
        assert!(!service.start(Box::new(BlankSource::new(Some(1), 30.0, 0)), tx));

        assert!(rx.recv().await.is_some());
        service.stop();
        assert!(!service.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn external_toggle_reaches_engine() {
        let service = TrackingService::new(
            engine(RecordedLandmarkProvider::default()),
            LoopConfig::default(),
        );
        service.set_system_active(true);
        assert!(service.status().system_active);
        service.set_system_active(false);
        assert!(!service.status().system_active);
    }
}
