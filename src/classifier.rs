// src/classifier.rs - single-frame hand shape checks
use crate::config::ClassifierConfig;
use crate::landmarks::{
    Landmark, LandmarkSet, FINGERTIPS, INDEX_MCP, INDEX_TIP, MIDDLE_TIP, PINKY_TIP, RING_TIP,
    THUMB_TIP, WRIST,
};

/// Euclidean distance between two landmarks. A missing point counts as
/// touching (distance 0).
pub fn landmark_distance(a: Option<Landmark>, b: Option<Landmark>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).norm(),
        _ => 0.0,
    }
}

fn usable(landmarks: Option<&LandmarkSet>) -> Option<&LandmarkSet> {
    landmarks.filter(|set| set.is_complete())
}

/// Stateless shape classifier for one frame of landmarks.
#[derive(Debug, Clone, Default)]
pub struct GestureClassifier {
    config: ClassifierConfig,
}

impl GestureClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Open palm: fingertips on average far from the wrist.
    pub fn is_hand_open(&self, landmarks: Option<&LandmarkSet>) -> bool {
        let Some(set) = usable(landmarks) else {
            return false;
        };
        let wrist = set.get(WRIST);
        let total: f64 = FINGERTIPS
            .iter()
            .map(|&tip| landmark_distance(wrist, set.get(tip)))
            .sum();
        total / FINGERTIPS.len() as f64 > self.config.open_hand_distance
    }

    /// Thumb and index tips pinched while at least one other finger stays
    /// extended, which separates an OK sign from a fist.
    pub fn is_ok_sign(&self, landmarks: Option<&LandmarkSet>) -> bool {
        let Some(set) = usable(landmarks) else {
            return false;
        };
        let pinch = landmark_distance(set.get(THUMB_TIP), set.get(INDEX_TIP));
        if pinch > self.config.ok_pinch_distance {
            return false;
        }

        let wrist = set.get(WRIST);
        [MIDDLE_TIP, RING_TIP, PINKY_TIP]
            .iter()
            .any(|&tip| landmark_distance(wrist, set.get(tip)) > self.config.ok_extension_distance)
    }

    /// Thumb tip resting on the index finger base.
    pub fn is_play_pause_gesture(&self, landmarks: Option<&LandmarkSet>) -> bool {
        let Some(set) = usable(landmarks) else {
            return false;
        };
        landmark_distance(set.get(THUMB_TIP), set.get(INDEX_MCP)) < self.config.play_pause_distance
    }
}
