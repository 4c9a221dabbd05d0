//! Target selection.
//!
//! Picks a single candidate from an unordered set, either the nearest one or
//! the one most closely aligned with the current heading.

use crate::calc::{angular_difference, bearing_degrees, distance_km};
use crate::models::{Candidate, GeoPoint, SelectionPolicy};

/// Half-angle of the cone in front of the vehicle that directional selection
/// considers. Deviations equal to this are still inside.
pub const DIRECTIONAL_CONE_DEG: f64 = 90.0;

/// Result of a selection pass, distinguishing the two ways of finding nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection<'a> {
    Selected(&'a Candidate),
    /// The candidate set was empty.
    NoCandidates,
    /// Candidates existed but none lay inside the heading cone.
    NothingAhead,
}

impl<'a> Selection<'a> {
    pub fn candidate(self) -> Option<&'a Candidate> {
        match self {
            Selection::Selected(c) => Some(c),
            Selection::NoCandidates | Selection::NothingAhead => None,
        }
    }
}

/// Select the best candidate under `policy`.
///
/// Directional selection without a heading behaves like [`SelectionPolicy::Nearest`].
pub fn select<'a>(
    origin: GeoPoint,
    heading: Option<f64>,
    candidates: &'a [Candidate],
    policy: SelectionPolicy,
) -> Option<&'a Candidate> {
    evaluate(origin, heading, candidates, policy).candidate()
}

/// Like [`select`] but reports why nothing was chosen.
pub fn evaluate<'a>(
    origin: GeoPoint,
    heading: Option<f64>,
    candidates: &'a [Candidate],
    policy: SelectionPolicy,
) -> Selection<'a> {
    if candidates.is_empty() {
        return Selection::NoCandidates;
    }

    match (policy, heading) {
        (SelectionPolicy::Directional, Some(heading)) => {
            match ahead_of(origin, heading, candidates) {
                Some(c) => Selection::Selected(c),
                None => Selection::NothingAhead,
            }
        }
        _ => match nearest(origin, candidates) {
            Some(c) => Selection::Selected(c),
            None => Selection::NoCandidates,
        },
    }
}

/// `min_by` keeps the first of equal elements, which gives first-seen tie breaking.
fn nearest(origin: GeoPoint, candidates: &[Candidate]) -> Option<&Candidate> {
    candidates
        .iter()
        .map(|c| (distance_km(origin, c.point), c))
        .min_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, c)| c)
}

fn ahead_of(origin: GeoPoint, heading: f64, candidates: &[Candidate]) -> Option<&Candidate> {
    candidates
        .iter()
        .map(|c| {
            let deviation = angular_difference(heading, bearing_degrees(origin, c.point)).abs();
            (deviation, c)
        })
        .filter(|(deviation, _)| *deviation <= DIRECTIONAL_CONE_DEG)
        .min_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, c)| c)
}
