use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use nolimit_shared::models::{DisplayFrame, GeoPoint, PositionFix};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::runtime::Handles;

/// A fix as posted by the browser's geolocation watcher.
#[derive(Debug, Deserialize)]
pub struct PositionInput {
    pub latitude: f64,
    pub longitude: f64,
    /// Metres per second.
    pub speed: Option<f64>,
    /// Milliseconds since the epoch; the receive time is used when absent.
    pub timestamp: Option<u64>,
}

impl PositionInput {
    fn validate(&self) -> Result<(), &'static str> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err("latitude out of range");
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err("longitude out of range");
        }
        Ok(())
    }

    fn into_fix(self) -> PositionFix {
        let timestamp_ms = self
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis().max(0) as u64);
        PositionFix {
            point: GeoPoint::new(self.latitude, self.longitude),
            // Negative or NaN speed means the source does not know
            speed_mps: self.speed.filter(|s| s.is_finite() && *s >= 0.0),
            timestamp_ms,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HeadingInput {
    /// Degrees clockwise from north.
    pub heading: f64,
}

async fn post_position(
    State(handles): State<Handles>,
    Json(input): Json<PositionInput>,
) -> Result<StatusCode, (StatusCode, &'static str)> {
    input
        .validate()
        .map_err(|msg| (StatusCode::UNPROCESSABLE_ENTITY, msg))?;
    handles
        .positions
        .send(input.into_fix())
        .await
        .map_err(|_| (StatusCode::SERVICE_UNAVAILABLE, "controller stopped"))?;
    Ok(StatusCode::ACCEPTED)
}

async fn post_heading(
    State(handles): State<Handles>,
    Json(input): Json<HeadingInput>,
) -> Result<StatusCode, (StatusCode, &'static str)> {
    if !input.heading.is_finite() {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, "heading must be finite"));
    }
    // Overwrites any sample the loop has not picked up yet
    handles
        .headings
        .send(Some(input.heading))
        .map_err(|_| (StatusCode::SERVICE_UNAVAILABLE, "controller stopped"))?;
    Ok(StatusCode::ACCEPTED)
}

async fn get_display(State(handles): State<Handles>) -> Json<DisplayFrame> {
    Json(*handles.display.borrow())
}

/// Build the full application router.
pub fn build_app(handles: Handles) -> Router {
    Router::new()
        .route("/position", post(post_position))
        .route("/heading", post(post_heading))
        .route("/display", get(get_display))
        .with_state(handles)
        .layer(CorsLayer::permissive())
}
