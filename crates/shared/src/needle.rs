//! Needle smoothing.
//!
//! Turns a jumpy raw target angle into a display angle that rotates along the
//! shortest arc, with a gain controlling convergence speed and an optional
//! per-update cap on angular velocity.

use crate::calc::{angular_difference, normalize_angle};

/// One smoothing step from `current` toward `target`, both in degrees.
///
/// The difference is taken along the short way round, clamped to
/// `±max_step` when `max_step > 0`, then scaled by `gain`.
pub fn step(current: f64, target: f64, max_step: f64, gain: f64) -> f64 {
    let mut diff = angular_difference(target, current);
    if max_step > 0.0 {
        diff = diff.clamp(-max_step, max_step);
    }
    normalize_angle(current + diff * gain)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeedleConfig {
    /// Fraction of the remaining difference covered per update, in (0, 1].
    pub gain: f64,
    /// Per-update cap in degrees; zero or negative disables it.
    pub max_step: f64,
}

impl NeedleConfig {
    /// Gains outside (0, 1] are clamped; a zero gain would freeze the needle.
    pub fn new(gain: f64, max_step: f64) -> Self {
        let gain = if gain.is_finite() {
            gain.clamp(f64::EPSILON, 1.0)
        } else {
            1.0
        };
        Self { gain, max_step }
    }
}

impl Default for NeedleConfig {
    fn default() -> Self {
        Self::new(0.25, 45.0)
    }
}

/// Owns the persistent display angle. Starts pointing at 0°.
#[derive(Debug, Clone)]
pub struct NeedleSmoother {
    config: NeedleConfig,
    angle: f64,
}

impl NeedleSmoother {
    pub fn new(config: NeedleConfig) -> Self {
        Self { config, angle: 0.0 }
    }

    /// Advance toward `target` and return the new display angle.
    pub fn update(&mut self, target: f64) -> f64 {
        self.angle = step(self.angle, target, self.config.max_step, self.config.gain);
        self.angle
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn config(&self) -> &NeedleConfig {
        &self.config
    }

    pub fn reset(&mut self) {
        self.angle = 0.0;
    }
}

impl Default for NeedleSmoother {
    fn default() -> Self {
        Self::new(NeedleConfig::default())
    }
}
