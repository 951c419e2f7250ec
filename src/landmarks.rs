// src/landmarks.rs
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

pub type Landmark = Vector3<f64>;

pub const LANDMARK_COUNT: usize = 21;

// MediaPipe hand landmark indices
pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_TIP: usize = 12;
pub const RING_TIP: usize = 16;
pub const PINKY_TIP: usize = 20;

pub const FINGERTIPS: [usize; 5] = [THUMB_TIP, INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];

/// One frame's hand skeleton, in provider order.
///
/// A well-formed set has exactly [`LANDMARK_COUNT`] points. Shorter sets can
/// come out of a misbehaving provider and are tolerated: lookups past the end
/// return `None`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<[f64; 3]>", into = "Vec<[f64; 3]>")]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn get(&self, index: usize) -> Option<Landmark> {
        self.points.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.points.len() >= LANDMARK_COUNT
    }

    /// Wrist projected onto the image plane. Non-finite coordinates are
    /// treated as missing.
    pub fn wrist_position(&self) -> Option<Vector2<f64>> {
        self.get(WRIST)
            .filter(|w| w.x.is_finite() && w.y.is_finite())
            .map(|w| Vector2::new(w.x, w.y))
    }
}

impl From<Vec<[f64; 3]>> for LandmarkSet {
    fn from(raw: Vec<[f64; 3]>) -> Self {
        Self::new(raw.into_iter().map(|[x, y, z]| Vector3::new(x, y, z)).collect())
    }
}

impl From<LandmarkSet> for Vec<[f64; 3]> {
    fn from(set: LandmarkSet) -> Self {
        set.points.iter().map(|p| [p.x, p.y, p.z]).collect()
    }
}

/// What the landmark provider saw in one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HandDetection {
    pub detected: bool,
    pub landmarks: Option<LandmarkSet>,
}

impl HandDetection {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn hand(landmarks: LandmarkSet) -> Self {
        Self {
            detected: true,
            landmarks: Some(landmarks),
        }
    }

    /// Landmarks only when the provider also reported a detection.
    pub fn hand_landmarks(&self) -> Option<&LandmarkSet> {
        if self.detected {
            self.landmarks.as_ref()
        } else {
            None
        }
    }
}
