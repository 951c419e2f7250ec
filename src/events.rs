// src/events.rs - gesture events and per-frame reports
use serde::{Deserialize, Serialize};

use crate::environment::EnvironmentQuality;
use crate::motion::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    SystemToggle,
    SwipeLeft,
    SwipeRight,
    SwipeUp,
    SwipeDown,
    PlayPause,
}

impl GestureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemToggle => "system_toggle",
            Self::SwipeLeft => "swipe_left",
            Self::SwipeRight => "swipe_right",
            Self::SwipeUp => "swipe_up",
            Self::SwipeDown => "swipe_down",
            Self::PlayPause => "play_pause",
        }
    }

    pub fn from_direction(direction: Direction) -> Option<Self> {
        match direction {
            Direction::Left => Some(Self::SwipeLeft),
            Direction::Right => Some(Self::SwipeRight),
            Direction::Up => Some(Self::SwipeUp),
            Direction::Down => Some(Self::SwipeDown),
            Direction::Stationary => None,
        }
    }

    /// Whether the gesture is forwarded to the command executor.
    pub fn is_media_command(&self) -> bool {
        !matches!(self, Self::SystemToggle)
    }
}

impl std::fmt::Display for GestureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlayPauseLabel {
    Play,
    Pause,
}

impl PlayPauseLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "PLAY",
            Self::Pause => "PAUSE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GestureEvent {
    pub kind: GestureKind,
    pub label: Option<String>,
}

impl GestureEvent {
    pub fn new(kind: GestureKind) -> Self {
        Self { kind, label: None }
    }

    pub fn with_label(kind: GestureKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: Some(label.into()),
        }
    }
}

/// Outcome of one processed frame, published to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame_index: u64,
    pub timestamp: f64,
    pub hand_detected: bool,
    pub system_active: bool,
    pub current_gesture: Option<GestureEvent>,
    pub activation_progress: f64,
    pub environment: Option<EnvironmentQuality>,
}
