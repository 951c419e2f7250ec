// src/environment.rs - lighting check, advisory only
use image::DynamicImage;
use serde::Serialize;

use crate::config::EnvironmentConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LightingQuality {
    Dark,
    Good,
    Bright,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnvironmentQuality {
    pub quality: LightingQuality,
    pub brightness: u8,
}

#[derive(Debug, Clone, Default)]
pub struct EnvironmentMonitor {
    config: EnvironmentConfig,
}

impl EnvironmentMonitor {
    pub fn new(config: EnvironmentConfig) -> Self {
        Self { config }
    }

    /// Mean luma of the frame, classified against the dark/bright limits.
    pub fn check(&self, frame: &DynamicImage) -> EnvironmentQuality {
        let gray = frame.to_luma8();
        let pixels = gray.as_raw();
        let mean = if pixels.is_empty() {
            0.0
        } else {
            pixels.iter().map(|&p| p as f64).sum::<f64>() / pixels.len() as f64
        };

        let quality = if mean < self.config.dark_below as f64 {
            LightingQuality::Dark
        } else if mean > self.config.bright_above as f64 {
            LightingQuality::Bright
        } else {
            LightingQuality::Good
        };
        let brightness = mean as u8;

        EnvironmentQuality { quality, brightness }
    }
}
