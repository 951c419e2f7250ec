// src/motion.rs - wrist displacement over a short window
use std::collections::VecDeque;

use nalgebra::Vector2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Stationary,
    Left,
    Right,
    Up,
    Down,
}

/// Ring buffer of recent wrist positions.
///
/// Direction is the net displacement from the oldest to the newest sample,
/// so jitter in between does not matter.
#[derive(Debug, Clone)]
pub struct MotionBuffer {
    positions: VecDeque<Vector2<f64>>,
    capacity: usize,
}

impl MotionBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            positions: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn add(&mut self, position: Vector2<f64>) {
        self.positions.push_back(position);
        while self.positions.len() > self.capacity {
            self.positions.pop_front();
        }
    }

    /// Newest minus oldest, or `None` with fewer than two samples.
    pub fn displacement(&self) -> Option<Vector2<f64>> {
        if self.positions.len() < 2 {
            return None;
        }
        let start = self.positions.front()?;
        let end = self.positions.back()?;
        Some(end - start)
    }

    /// `None` means not enough samples yet, which is not the same as
    /// [`Direction::Stationary`].
    pub fn direction(&self, threshold: f64) -> Option<Direction> {
        let d = self.displacement()?;

        if d.norm() < threshold {
            return Some(Direction::Stationary);
        }

        // Image y grows downward; ties go to the vertical axis.
        let direction = if d.x.abs() > d.y.abs() {
            if d.x > 0.0 {
                Direction::Right
            } else {
                Direction::Left
            }
        } else if d.y > 0.0 {
            Direction::Down
        } else {
            Direction::Up
        };
        Some(direction)
    }

    pub fn is_stable(&self, min_frames: usize) -> bool {
        self.positions.len() >= min_frames
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
