//! Targeting controller.
//!
//! Owns everything that changes over time: the last position fix and heading,
//! the selected target, and the needle. The host feeds it sensor events and
//! fetch completions in whatever order they arrive and renders the resulting
//! [`DisplayFrame`].
//!
//! State machine:
//! - `NoFix -> Nearest` on the first position fix, whatever its speed.
//! - `Nearest -> Directional` once a later speed sample exceeds
//!   [`ControllerConfig::directional_speed_kmh`].
//! - `Directional` is sticky unless [`ControllerConfig::revert_speed_kmh`] is set.

use crate::calc::{bearing_degrees, distance_km, mps_to_kmh, normalize_angle, relative_bearing};
use crate::models::{
    Candidate, ControllerState, DisplayFrame, GeoPoint, PositionFix, SelectionPolicy, TargetState,
};
use crate::needle::{NeedleConfig, NeedleSmoother};
use crate::select::{evaluate, Selection};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerConfig {
    /// Speed above which selection switches to the heading cone.
    pub directional_speed_kmh: f64,
    /// When set, a speed sample below this drops back to nearest selection.
    pub revert_speed_kmh: Option<f64>,
    /// Radius of each candidate search around the current position.
    pub search_radius_m: f64,
    /// Rotation applied to the needle so the wrap point sits where the dial wants it.
    pub dial_offset_deg: f64,
    pub needle: NeedleConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            directional_speed_kmh: 50.0,
            revert_speed_kmh: None,
            search_radius_m: 50_000.0,
            dial_offset_deg: 0.0,
            needle: NeedleConfig::default(),
        }
    }
}

/// A candidate search the host should run. Hand it back unchanged to
/// [`TargetingController::complete_fetch`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchRequest {
    pub seq: u64,
    pub origin: GeoPoint,
    pub radius_m: f64,
    pub heading: Option<f64>,
    pub policy: SelectionPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// A new target replaced the previous one.
    Applied(TargetState),
    /// A newer request already applied a target; this response was dropped.
    Stale,
    /// The fetch itself failed. Target unchanged.
    Failed(String),
    /// The service returned nothing. Target unchanged.
    NoCandidates,
    /// Candidates existed but none lay ahead. Target unchanged.
    NothingAhead,
}

pub struct TargetingController {
    config: ControllerConfig,
    state: ControllerState,
    position: Option<PositionFix>,
    heading: Option<f64>,
    target: Option<TargetState>,
    needle: NeedleSmoother,
    next_seq: u64,
    newest_applied: Option<u64>,
}

impl TargetingController {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            state: ControllerState::NoFix,
            position: None,
            heading: None,
            target: None,
            needle: NeedleSmoother::new(config.needle),
            next_seq: 0,
            newest_applied: None,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn position(&self) -> Option<&PositionFix> {
        self.position.as_ref()
    }

    pub fn heading(&self) -> Option<f64> {
        self.heading
    }

    pub fn target(&self) -> Option<&TargetState> {
        self.target.as_ref()
    }

    /// Record a position fix, advance the policy state machine and re-aim the needle.
    pub fn on_position(&mut self, fix: PositionFix) -> DisplayFrame {
        let speed_kmh = fix.speed_mps.map(mps_to_kmh);
        self.position = Some(fix);
        self.state = self.next_state(speed_kmh);
        self.refresh_needle();
        self.frame()
    }

    /// Record a compass heading and re-aim the needle at the last known target.
    ///
    /// Returns `None` when there is nothing to point at yet or the sample is not finite.
    pub fn on_heading(&mut self, heading: f64) -> Option<DisplayFrame> {
        if !heading.is_finite() {
            return None;
        }
        self.heading = Some(normalize_angle(heading));
        self.refresh_needle().then(|| self.frame())
    }

    /// Start a candidate search around the current position.
    ///
    /// `None` until the first fix. Directional selection is only requested once
    /// a heading is known and a previous target exists.
    pub fn begin_fetch(&mut self) -> Option<FetchRequest> {
        let origin = self.position?.point;
        let seq = self.next_seq;
        self.next_seq += 1;

        let policy = if self.state == ControllerState::Directional
            && self.heading.is_some()
            && self.target.is_some()
        {
            SelectionPolicy::Directional
        } else {
            SelectionPolicy::Nearest
        };

        Some(FetchRequest {
            seq,
            origin,
            radius_m: self.config.search_radius_m,
            heading: self.heading,
            policy,
        })
    }

    /// Resolve a search started by [`Self::begin_fetch`].
    ///
    /// Only [`FetchOutcome::Applied`] touches the target and needle. Responses
    /// older than the newest applied one are dropped. Failed, empty and
    /// nothing-ahead completions leave no target behind, so an older response
    /// that does select one may still land after them.
    pub fn complete_fetch<E: std::fmt::Display>(
        &mut self,
        request: FetchRequest,
        result: Result<Vec<Candidate>, E>,
    ) -> FetchOutcome {
        if self.newest_applied.is_some_and(|newest| request.seq < newest) {
            return FetchOutcome::Stale;
        }

        let candidates = match result {
            Ok(candidates) => candidates,
            Err(e) => return FetchOutcome::Failed(e.to_string()),
        };

        match evaluate(request.origin, request.heading, &candidates, request.policy) {
            Selection::Selected(candidate) => {
                let target = TargetState {
                    candidate: *candidate,
                    distance_km: distance_km(request.origin, candidate.point),
                    bearing: bearing_degrees(request.origin, candidate.point),
                };
                self.target = Some(target);
                self.newest_applied = Some(request.seq);
                self.refresh_needle();
                FetchOutcome::Applied(target)
            }
            Selection::NoCandidates => FetchOutcome::NoCandidates,
            Selection::NothingAhead => FetchOutcome::NothingAhead,
        }
    }

    /// Snapshot for the display sink.
    pub fn frame(&self) -> DisplayFrame {
        DisplayFrame {
            angle: self.needle.angle(),
            distance_km: self.target.map(|t| t.distance_km),
            state: self.state,
            speed_kmh: self.position.and_then(|p| p.speed_mps).map(mps_to_kmh),
            target_id: self.target.map(|t| t.candidate.id),
        }
    }

    /// One transition per sample: the first fix only leaves `NoFix`.
    fn next_state(&self, speed_kmh: Option<f64>) -> ControllerState {
        match (self.state, speed_kmh) {
            (ControllerState::NoFix, _) => ControllerState::Nearest,
            (ControllerState::Nearest, Some(v)) if v > self.config.directional_speed_kmh => {
                ControllerState::Directional
            }
            (ControllerState::Directional, Some(v))
                if self.config.revert_speed_kmh.is_some_and(|r| v < r) =>
            {
                ControllerState::Nearest
            }
            (state, _) => state,
        }
    }

    /// Feed the live bearing to the target into the needle. Without a heading the
    /// dial is north-up. Returns whether the needle was updated.
    fn refresh_needle(&mut self) -> bool {
        let (Some(position), Some(target)) = (self.position, self.target) else {
            return false;
        };
        let bearing = bearing_degrees(position.point, target.candidate.point);
        let raw = match self.heading {
            Some(heading) => relative_bearing(bearing, heading, self.config.dial_offset_deg),
            None => normalize_angle(bearing + self.config.dial_offset_deg),
        };
        self.needle.update(raw);
        true
    }
}

impl Default for TargetingController {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}
