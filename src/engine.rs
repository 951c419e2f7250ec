// src/engine.rs - per-frame gesture pipeline for one camera stream
use tracing::{debug, info};
use uuid::Uuid;

use crate::activation::ActivationGate;
use crate::capture::Frame;
use crate::classifier::GestureClassifier;
use crate::config::{EngineConfig, EnvironmentConfig};
use crate::dispatch::Dispatcher;
use crate::environment::EnvironmentMonitor;
use crate::error::Result;
use crate::events::{FrameReport, GestureEvent, GestureKind};
use crate::landmarks::{HandDetection, LandmarkSet};
use crate::motion::{Direction, MotionBuffer};
use crate::provider::LandmarkProvider;

/// All mutable state of one gesture session.
///
/// Each camera stream gets its own engine. Time is the frame timestamp in
/// seconds, so the engine never reads a clock itself.
pub struct GestureEngine {
    session_id: Uuid,
    config: EngineConfig,
    classifier: GestureClassifier,
    motion: MotionBuffer,
    gate: ActivationGate,
    hand_present_since: Option<f64>,
    last_gesture: Option<GestureKind>,
    last_gesture_time: Option<f64>,
    last_progress: f64,
    provider: Box<dyn LandmarkProvider>,
    environment: EnvironmentMonitor,
    dispatcher: Dispatcher,
}

impl GestureEngine {
    pub fn new(
        config: EngineConfig,
        environment: EnvironmentConfig,
        provider: Box<dyn LandmarkProvider>,
        dispatcher: Dispatcher,
    ) -> Result<Self> {
        config.validate()?;
        let session_id = Uuid::new_v4();
        info!(%session_id, "Gesture engine created");

        Ok(Self {
            session_id,
            classifier: GestureClassifier::new(config.classifier.clone()),
            motion: MotionBuffer::new(config.motion_buffer_size),
            gate: ActivationGate::new(config.hold_duration, config.hold_grace),
            hand_present_since: None,
            last_gesture: None,
            last_gesture_time: None,
            last_progress: 0.0,
            config,
            provider,
            environment: EnvironmentMonitor::new(environment),
            dispatcher,
        })
    }

    /// Runs the landmark provider on `frame`, then the gesture step.
    ///
    /// A provider error leaves the engine untouched.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameReport> {
        let detection = self.provider.detect(frame)?;
        let environment = self.environment.check(&frame.image);

        let mut report = self.step(&detection, frame.timestamp);
        report.frame_index = frame.index;
        report.environment = Some(environment);
        Ok(report)
    }

    /// Gesture step for one detection result at time `now` (seconds).
    pub fn step(&mut self, detection: &HandDetection, now: f64) -> FrameReport {
        let mut report = FrameReport {
            frame_index: 0,
            timestamp: now,
            hand_detected: false,
            system_active: self.gate.is_active(),
            current_gesture: None,
            activation_progress: 0.0,
            environment: None,
        };

        let Some(landmarks) = detection.hand_landmarks() else {
            if self.hand_present_since.take().is_some() {
                debug!(session_id = %self.session_id, "Hand lost");
            }
            self.gate.hand_lost();
            self.motion.clear();
            self.last_progress = 0.0;
            return report;
        };
        report.hand_detected = true;

        let since = *self.hand_present_since.get_or_insert(now);
        let warmup_passed = now - since >= self.config.warmup_delay;

        let ok_sign = self.classifier.is_ok_sign(Some(landmarks));
        if let Some(active) = self.gate.step(ok_sign, now) {
            self.motion.clear();
            // The toggle counts toward the cooldown like any other event.
            self.record_gesture(GestureKind::SystemToggle, now);
            report.system_active = active;
            report.current_gesture = Some(GestureEvent::new(GestureKind::SystemToggle));
            return self.finish(report, now);
        }

        if self.gate.is_active() && warmup_passed {
            if let Some(wrist) = landmarks.wrist_position() {
                self.motion.add(wrist);
            }
            report.current_gesture = self.detect_motion_gesture(landmarks, now);
        }

        self.finish(report, now)
    }

    fn detect_motion_gesture(
        &mut self,
        landmarks: &LandmarkSet,
        now: f64,
    ) -> Option<GestureEvent> {
        // Within the cooldown the buffer keeps filling so motion stays
        // continuous across the boundary.
        if self.in_cooldown(now) {
            return None;
        }
        if !self.motion.is_stable(self.config.min_stable_frames) {
            return None;
        }

        if self.classifier.is_hand_open(Some(landmarks)) {
            let swipe = self
                .motion
                .direction(self.config.swipe_threshold)
                .and_then(GestureKind::from_direction);
            if let Some(kind) = swipe {
                return Some(self.emit(GestureEvent::new(kind), now));
            }
        }

        if self.classifier.is_play_pause_gesture(Some(landmarks))
            && self.motion.direction(self.config.play_pause_threshold) == Some(Direction::Down)
        {
            let label = self.dispatcher.display_label();
            let event = GestureEvent::with_label(GestureKind::PlayPause, label.as_str());
            return Some(self.emit(event, now));
        }

        None
    }

    fn emit(&mut self, event: GestureEvent, now: f64) -> GestureEvent {
        self.record_gesture(event.kind, now);
        self.motion.clear();
        info!(
            session_id = %self.session_id,
            gesture = %event.kind,
            label = event.label.as_deref().unwrap_or(""),
            "Gesture detected"
        );
        self.dispatcher.dispatch(event.kind);
        event
    }

    fn record_gesture(&mut self, kind: GestureKind, now: f64) {
        self.last_gesture = Some(kind);
        self.last_gesture_time = Some(now);
    }

    fn in_cooldown(&self, now: f64) -> bool {
        self.last_gesture_time
            .map_or(false, |last| now - last < self.config.gesture_cooldown)
    }

    fn finish(&mut self, mut report: FrameReport, now: f64) -> FrameReport {
        self.last_progress = self.gate.progress(now);
        report.activation_progress = self.last_progress;
        report.system_active = self.gate.is_active();
        report
    }

    /// Hold progress toward the next toggle, as of the last processed frame.
    pub fn activation_progress(&self) -> f64 {
        self.last_progress
    }

    pub fn is_active(&self) -> bool {
        self.gate.is_active()
    }

    pub fn last_gesture(&self) -> Option<GestureKind> {
        self.last_gesture
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Clears hold, cooldown and motion state and deactivates the system.
    /// The hand-presence timer is kept, so warmup is not restarted.
    pub fn reset(&mut self) {
        self.gate.reset();
        self.last_gesture = None;
        self.last_gesture_time = None;
        self.last_progress = 0.0;
        self.motion.clear();
        debug!(session_id = %self.session_id, "Engine state reset");
    }

    /// External on/off switch. Switching off also resets.
    pub fn set_system_active(&mut self, active: bool) {
        self.gate.set_active(active);
        if !active {
            self.reset();
        }
        info!(
            session_id = %self.session_id,
            "System toggled: {}",
            if active { "ACTIVE" } else { "INACTIVE" }
        );
    }

    pub fn release(&mut self) {
        self.provider.release();
        info!(session_id = %self.session_id, "Landmark provider released");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::DynamicImage;
    use nalgebra::Vector3;
    use tokio::runtime::Handle;

    use super::*;
    use crate::classifier::fixtures::*;
    use crate::config::DispatchConfig;
    use crate::dispatch::testing::{wait_for_calls, RecordingExecutor};
    use crate::landmarks::LANDMARK_COUNT;
    use crate::provider::RecordedLandmarkProvider;

    fn engine_with(executor: Arc<RecordingExecutor>) -> GestureEngine {
        let dispatcher = Dispatcher::new(executor, Handle::current(), &DispatchConfig::default());
        GestureEngine::new(
            EngineConfig::default(),
            EnvironmentConfig::default(),
            Box::new(RecordedLandmarkProvider::default()),
            dispatcher,
        )
        .unwrap()
    }

    fn engine() -> GestureEngine {
        engine_with(Arc::new(RecordingExecutor::default()))
    }

    /// Active engine whose hand has been visible since t = 0.
    fn warmed_up_engine(executor: Arc<RecordingExecutor>) -> GestureEngine {
        let mut engine = engine_with(executor);
        engine.set_system_active(true);
        engine.step(&HandDetection::hand(open_hand((0.5, 0.5))), 0.0);
        engine
    }

    #[tokio::test]
    async fn hand_loss_resets_hold_and_motion() {
        let mut engine = engine();
        engine.step(&HandDetection::hand(ok_sign((0.5, 0.8))), 0.0);
        engine.step(&HandDetection::hand(ok_sign((0.5, 0.8))), 1.0);
        assert!(engine.activation_progress() > 0.3);

        let report = engine.step(&HandDetection::none(), 1.1);
        assert!(!report.hand_detected);
        assert_eq!(report.activation_progress, 0.0);
        assert!(engine.hand_present_since.is_none());
        assert!(engine.motion.is_empty());

        // Hold restarts from scratch.
        engine.step(&HandDetection::hand(ok_sign((0.5, 0.8))), 1.2);
        let report = engine.step(&HandDetection::hand(ok_sign((0.5, 0.8))), 3.5);
        assert!(report.current_gesture.is_none());
    }

    #[tokio::test]
    async fn hand_loss_clears_filled_motion_buffer() {
        let mut engine = warmed_up_engine(Arc::new(RecordingExecutor::default()));
        engine.step(&HandDetection::hand(open_hand((0.20, 0.5))), 1.0);
        engine.step(&HandDetection::hand(open_hand((0.25, 0.5))), 1.1);
        assert_eq!(engine.motion.len(), 2);

        engine.step(&HandDetection::none(), 1.2);
        assert!(engine.motion.is_empty());
    }

    #[tokio::test]
    async fn samples_before_hand_loss_never_complete_a_swipe() {
        let mut engine = warmed_up_engine(Arc::new(RecordingExecutor::default()));
        engine.step(&HandDetection::hand(open_hand((0.20, 0.5))), 1.0);
        engine.step(&HandDetection::hand(open_hand((0.25, 0.5))), 1.1);
        engine.step(&HandDetection::none(), 1.2);

        // Back at a different spot and held still well past the new warmup.
        let mut fired = Vec::new();
        for k in 0..10 {
            let now = 1.3 + k as f64 * 0.1;
            let report = engine.step(&HandDetection::hand(open_hand((0.4, 0.5))), now);
            fired.extend(report.current_gesture.map(|e| e.kind));
        }
        assert!(fired.is_empty());
        assert!(engine.motion.len() >= 3);
        assert_eq!(engine.motion.displacement().map(|d| d.x), Some(0.0));
    }

    #[tokio::test]
    async fn detected_flag_without_landmarks_counts_as_lost() {
        let mut engine = engine();
        let detection = HandDetection {
            detected: true,
            landmarks: None,
        };
        let report = engine.step(&detection, 0.0);
        assert!(!report.hand_detected);
    }

    #[tokio::test]
    async fn hold_toggle_is_not_dispatched() {
        let executor = Arc::new(RecordingExecutor::default());
        let mut engine = engine_with(executor.clone());
        engine.set_system_active(true);

        // Hold the OK sign while sliding the hand to the right.
        let mut toggles = 0;
        for i in 0..=31 {
            let t = i as f64 * 0.1;
            let x = 0.2 + i as f64 * 0.01;
            let report = engine.step(&HandDetection::hand(ok_sign((x, 0.8))), t);
            if let Some(event) = report.current_gesture {
                assert_eq!(event.kind, GestureKind::SystemToggle);
                assert!(!report.system_active);
                toggles += 1;
            }
        }
        assert_eq!(toggles, 1);
        assert!(!engine.is_active());
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn stationary_open_hand_emits_nothing() {
        let executor = Arc::new(RecordingExecutor::default());
        let mut engine = warmed_up_engine(executor.clone());
        for i in 0..10 {
            let t = 1.0 + i as f64 * 0.05;
            let x = 0.5 + if i % 2 == 0 { 0.01 } else { -0.01 };
            let report = engine.step(&HandDetection::hand(open_hand((x, 0.5))), t);
            assert!(report.current_gesture.is_none());
        }
    }

    #[tokio::test]
    async fn warmup_suppresses_fresh_hand() {
        let mut engine = engine();
        engine.set_system_active(true);
        for (i, x) in [0.1, 0.3, 0.5, 0.7].into_iter().enumerate() {
            let report = engine.step(&HandDetection::hand(open_hand((x, 0.5))), i as f64 * 0.1);
            assert!(report.current_gesture.is_none());
        }
        assert!(engine.motion.is_empty());
    }

    #[tokio::test]
    async fn inactive_system_ignores_swipes() {
        let mut engine = engine();
        engine.step(&HandDetection::hand(open_hand((0.1, 0.5))), 0.0);
        for (i, x) in [0.1, 0.3, 0.5, 0.7].into_iter().enumerate() {
            let report = engine.step(&HandDetection::hand(open_hand((x, 0.5))), 1.0 + i as f64 * 0.1);
            assert!(report.current_gesture.is_none());
            assert!(!report.system_active);
        }
    }

    #[tokio::test]
    async fn swipe_is_dispatched_once() {
        let executor = Arc::new(RecordingExecutor::default());
        let mut engine = warmed_up_engine(executor.clone());

        let mut fired = Vec::new();
        for (i, y) in [0.3, 0.38, 0.46, 0.54, 0.62].into_iter().enumerate() {
            let report = engine.step(&HandDetection::hand(open_hand((0.5, y))), 1.0 + i as f64 * 0.1);
            fired.extend(report.current_gesture.map(|e| e.kind));
        }
        assert_eq!(fired, vec![GestureKind::SwipeDown]);
        assert_eq!(engine.last_gesture(), Some(GestureKind::SwipeDown));

        wait_for_calls(&executor, 1).await;
        assert_eq!(executor.calls(), vec![GestureKind::SwipeDown]);
    }

    #[tokio::test]
    async fn play_pause_label_follows_executor_state() {
        let executor = Arc::new(RecordingExecutor::default());
        let mut engine = warmed_up_engine(executor.clone());

        let mut labels = Vec::new();
        for (start, count) in [(1.0, 3), (3.0, 3)] {
            for i in 0..count {
                let y = 0.4 + i as f64 * 0.04;
                let hand = HandDetection::hand(play_pause_pinch((0.5, y)));
                let report = engine.step(&hand, start + i as f64 * 0.1);
                if let Some(event) = report.current_gesture {
                    assert_eq!(event.kind, GestureKind::PlayPause);
                    labels.push(event.label.unwrap());
                }
            }
            wait_for_calls(&executor, labels.len()).await;
        }
        assert_eq!(labels, vec!["PLAY".to_string(), "PAUSE".to_string()]);
    }

    #[tokio::test]
    async fn reset_is_idempotent() {
        let mut engine = warmed_up_engine(Arc::new(RecordingExecutor::default()));
        engine.step(&HandDetection::hand(ok_sign((0.5, 0.8))), 1.0);
        engine.motion.add(nalgebra::Vector2::new(0.1, 0.1));

        engine.reset();
        let once = (
            engine.is_active(),
            engine.gate.state(),
            engine.last_gesture_time,
            engine.motion.len(),
            engine.activation_progress(),
        );
        engine.reset();
        let twice = (
            engine.is_active(),
            engine.gate.state(),
            engine.last_gesture_time,
            engine.motion.len(),
            engine.activation_progress(),
        );
        assert_eq!(once, twice);
        assert!(!once.0);
    }

    #[tokio::test]
    async fn deactivating_externally_resets_state() {
        let executor = Arc::new(RecordingExecutor::default());
        let mut engine = warmed_up_engine(executor);
        engine.step(&HandDetection::hand(open_hand((0.5, 0.5))), 1.0);
        assert_eq!(engine.motion.len(), 1);

        engine.set_system_active(false);
        assert!(!engine.is_active());
        assert!(engine.motion.is_empty());
    }

    #[tokio::test]
    async fn malformed_landmarks_do_not_panic() {
        let mut engine = warmed_up_engine(Arc::new(RecordingExecutor::default()));
        let sets = [
            LandmarkSet::default(),
            LandmarkSet::new(vec![Vector3::new(0.5, 0.5, 0.0); 3]),
            LandmarkSet::new(vec![Vector3::new(f64::NAN, 0.5, 0.0); LANDMARK_COUNT]),
        ];
        for (i, set) in sets.into_iter().enumerate() {
            let report = engine.step(&HandDetection::hand(set), 1.0 + i as f64 * 0.1);
            assert!(report.hand_detected);
            assert!(report.current_gesture.is_none());
        }
    }

    #[tokio::test]
    async fn process_frame_reports_environment() {
        let dispatcher = Dispatcher::new(
            Arc::new(RecordingExecutor::default()),
            Handle::current(),
            &DispatchConfig::default(),
        );
        let provider = RecordedLandmarkProvider::new(vec![Some(open_hand((0.5, 0.5)))]);
        let mut engine = GestureEngine::new(
            EngineConfig::default(),
            EnvironmentConfig::default(),
            Box::new(provider),
            dispatcher,
        )
        .unwrap();

        let frame = Frame {
            index: 0,
            timestamp: 0.0,
            image: DynamicImage::new_rgb8(4, 4),
        };
        let report = engine.process_frame(&frame).unwrap();
        assert!(report.hand_detected);
        let environment = report.environment.unwrap();
        assert_eq!(environment.quality, crate::environment::LightingQuality::Dark);

        engine.release();
        assert!(engine.process_frame(&frame).is_err());
    }
}
