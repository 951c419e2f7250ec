// src/capture.rs - frame sources feeding the tracking loop
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::{DynamicImage, Rgb, RgbImage};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    /// Seconds since the start of the stream.
    pub timestamp: f64,
    pub image: DynamicImage,
}

pub trait FrameSource: Send {
    /// Next frame, or `None` once the stream has ended.
    fn read_frame(&mut self) -> Result<Option<Frame>>;
}

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Frames from a directory of still images, in file name order.
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    current_frame: usize,
    fps: f64,
}

impl ImageSequenceSource {
    pub fn new(path: impl AsRef<Path>, fps: f64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.is_dir() {
            return Err(Error::Capture(format!(
                "Frame directory does not exist: {}",
                path.display()
            )));
        }
        if !(fps > 0.0) {
            return Err(Error::Capture(format!("Invalid frame rate: {}", fps)));
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&path)? {
            let file = entry?.path();
            let is_image = file
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                files.push(file);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(Error::Capture(format!("No image frames in {}", path.display())));
        }

        info!(dir = %path.display(), frames = files.len(), fps, "Opened image sequence");
        Ok(Self {
            files,
            current_frame: 0,
            fps,
        })
    }

    pub fn total_frames(&self) -> usize {
        self.files.len()
    }

}

impl FrameSource for ImageSequenceSource {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some(file) = self.files.get(self.current_frame) else {
            return Ok(None);
        };
        let index = self.current_frame as u64;
        self.current_frame += 1;

        let image = image::open(file).map_err(|e| {
            warn!(file = %file.display(), error = %e, "Failed to load frame");
            Error::Image(e)
        })?;
        debug!(index, file = %file.display(), "Loaded frame");

        Ok(Some(Frame {
            index,
            timestamp: index as f64 / self.fps,
            image,
        }))
    }
}

/// Uniform synthetic frames, for driving the engine from recorded landmarks
/// without any camera footage.
pub struct BlankSource {
    remaining: Option<u64>,
    next_index: u64,
    fps: f64,
    image: DynamicImage,
    paced: bool,
    started: Option<Instant>,
}

impl BlankSource {
    /// `frames = None` produces frames until the loop is stopped.
    pub fn new(frames: Option<u64>, fps: f64, brightness: u8) -> Self {
        let fps = if fps > 0.0 { fps } else { 30.0 };
        Self {
            remaining: frames,
            next_index: 0,
            fps,
            image: DynamicImage::ImageRgb8(RgbImage::from_pixel(
                64,
                48,
                Rgb([brightness, brightness, brightness]),
            )),
            paced: false,
            started: None,
        }
    }

    /// Sleep so frames come out at the nominal rate instead of as fast as
    /// the loop can pull them.
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }
}

impl FrameSource for BlankSource {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Ok(None);
            }
            *remaining -= 1;
        }

        let index = self.next_index;
        self.next_index += 1;
        let timestamp = index as f64 / self.fps;

        if self.paced {
            let started = *self.started.get_or_insert_with(Instant::now);
            let wait = Duration::try_from_secs_f64(timestamp)
                .ok()
                .and_then(|due| due.checked_sub(started.elapsed()));
            if let Some(wait) = wait {
                std::thread::sleep(wait);
            }
        }

        Ok(Some(Frame {
            index,
            timestamp,
            image: self.image.clone(),
        }))
    }
}
