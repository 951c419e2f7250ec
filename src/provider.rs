// src/provider.rs - landmark provider seam
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::capture::Frame;
use crate::error::{Error, Result};
use crate::landmarks::{HandDetection, LandmarkSet};

/// Extracts one hand's landmarks from a frame.
///
/// The pose model behind it is not part of this crate. Implementations must
/// return `landmarks: None` whenever `detected` is false.
pub trait LandmarkProvider: Send {
    fn detect(&mut self, frame: &Frame) -> Result<HandDetection>;

    /// Frees model resources. Called once when the engine is released.
    fn release(&mut self) {}
}

#[derive(Debug, Deserialize)]
struct LandmarkTrack {
    #[serde(default)]
    fps: Option<f64>,
    frames: Vec<Option<LandmarkSet>>,
}

/// Replays a landmark track recorded from a real provider.
///
/// Track format (JSON):
/// `{"fps": 30, "frames": [null, [[x, y, z], ...21 points], ...]}`,
/// where `null` marks a frame without a hand. Frames past the end of the
/// track have no hand.
#[derive(Debug, Default)]
pub struct RecordedLandmarkProvider {
    frames: Vec<Option<LandmarkSet>>,
    fps: Option<f64>,
    released: bool,
}

impl RecordedLandmarkProvider {
    pub fn new(frames: Vec<Option<LandmarkSet>>) -> Self {
        Self {
            frames,
            fps: None,
            released: false,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let track: LandmarkTrack = serde_json::from_str(raw)?;
        Ok(Self {
            frames: track.frames,
            fps: track.fps,
            released: false,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let provider = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            frames = provider.frames.len(),
            "Loaded landmark track"
        );
        Ok(provider)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame rate the track was recorded at, if it says.
    pub fn fps(&self) -> Option<f64> {
        self.fps
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl LandmarkProvider for RecordedLandmarkProvider {
    fn detect(&mut self, frame: &Frame) -> Result<HandDetection> {
        if self.released {
            return Err(Error::Provider("provider already released".into()));
        }
        let detection = match self.frames.get(frame.index as usize) {
            Some(Some(set)) => HandDetection::hand(set.clone()),
            _ => HandDetection::none(),
        };
        debug!(frame = frame.index, detected = detection.detected, "Replayed landmarks");
        Ok(detection)
    }

    fn release(&mut self) {
        self.released = true;
        self.frames.clear();
    }
}
