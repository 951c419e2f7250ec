// src/lib.rs
pub mod activation;
pub mod capture;
pub mod classifier;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod environment;
pub mod error;
pub mod events;
pub mod landmarks;
pub mod media;
pub mod motion;
pub mod provider;
pub mod tracking_loop;

pub use config::AppConfig;
pub use dispatch::{CommandExecutor, Dispatcher};
pub use engine::GestureEngine;
pub use error::{Error, Result};
pub use events::{FrameReport, GestureEvent, GestureKind, PlayPauseLabel};
pub use landmarks::{HandDetection, LandmarkSet};
pub use provider::LandmarkProvider;
pub use tracking_loop::TrackingService;
