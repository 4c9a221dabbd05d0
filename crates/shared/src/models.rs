use serde::{Deserialize, Serialize};

/// A WGS-84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// A point returned by the map-data service, eligible to become the target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: u64,
    pub point: GeoPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionPolicy {
    Directional,
    Nearest,
}

impl std::fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionPolicy::Directional => write!(f, "Directional"),
            SelectionPolicy::Nearest => write!(f, "Nearest"),
        }
    }
}

/// The currently selected candidate with distance and bearing measured from
/// the origin the fetch was scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetState {
    pub candidate: Candidate,
    pub distance_km: f64,
    pub bearing: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionFix {
    pub point: GeoPoint,
    /// Ground speed in m/s, when the position source reports one.
    pub speed_mps: Option<f64>,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControllerState {
    #[default]
    NoFix,
    Nearest,
    Directional,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::NoFix => write!(f, "NoFix"),
            ControllerState::Nearest => write!(f, "Nearest"),
            ControllerState::Directional => write!(f, "Directional"),
        }
    }
}

/// What the dial renders on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayFrame {
    /// Smoothed needle angle in degrees [0, 360).
    pub angle: f64,
    pub distance_km: Option<f64>,
    pub state: ControllerState,
    pub speed_kmh: Option<f64>,
    pub target_id: Option<u64>,
}
