// src/activation.rs - hold-to-toggle on a sustained OK sign
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HoldState {
    Idle,
    Holding { since: f64 },
}

#[derive(Debug, Clone)]
pub struct ActivationGate {
    state: HoldState,
    is_active: bool,
    hold_duration: f64,
    grace: f64,
}

impl ActivationGate {
    pub fn new(hold_duration: f64, grace: f64) -> Self {
        Self {
            state: HoldState::Idle,
            is_active: false,
            hold_duration,
            grace,
        }
    }

    /// Advances the hold with this frame's OK-sign reading. Returns the new
    /// activation flag when the hold completes and the system toggles.
    pub fn step(&mut self, ok_sign: bool, now: f64) -> Option<bool> {
        match (self.state, ok_sign) {
            (HoldState::Idle, true) => {
                debug!(now, "OK sign hold started");
                self.state = HoldState::Holding { since: now };
                None
            }
            (HoldState::Holding { since }, true) => {
                if now - since >= self.hold_duration {
                    self.is_active = !self.is_active;
                    self.state = HoldState::Idle;
                    info!(
                        active = self.is_active,
                        "System {}",
                        if self.is_active { "ACTIVATED" } else { "DEACTIVATED" }
                    );
                    Some(self.is_active)
                } else {
                    None
                }
            }
            (HoldState::Holding { since }, false) => {
                // The grace window counts from the start of the hold, not
                // from the last frame the OK sign was seen.
                if now - since > self.grace {
                    debug!(held_for = now - since, "OK sign hold dropped");
                    self.state = HoldState::Idle;
                }
                None
            }
            (HoldState::Idle, false) => None,
        }
    }

    pub fn hand_lost(&mut self) {
        self.state = HoldState::Idle;
    }

    /// Fraction of the hold completed at `now`, in `[0, 1]`.
    pub fn progress(&self, now: f64) -> f64 {
        match self.state {
            HoldState::Idle => 0.0,
            HoldState::Holding { since } => ((now - since) / self.hold_duration).clamp(0.0, 1.0),
        }
    }

    pub fn state(&self) -> HoldState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    pub fn reset(&mut self) {
        self.state = HoldState::Idle;
        self.is_active = false;
    }
}
