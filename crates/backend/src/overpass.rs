//! Candidate fetching from an Overpass API endpoint.

use std::time::Duration;

use async_trait::async_trait;
use nolimit_shared::models::{Candidate, GeoPoint};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Source of nearby candidates around a position.
#[async_trait]
pub trait CandidateFetcher: Send + Sync {
    async fn fetch(&self, origin: GeoPoint, radius_m: f64) -> Result<Vec<Candidate>, FetchError>;
}

// --- Overpass response types ---

#[derive(Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<Element>,
}

#[derive(Deserialize)]
struct Element {
    id: u64,
    /// Present on nodes.
    lat: Option<f64>,
    lon: Option<f64>,
    /// Present on ways and relations queried with `out center`.
    center: Option<LatLon>,
}

#[derive(Deserialize)]
struct LatLon {
    lat: f64,
    lon: f64,
}

impl Element {
    fn point(&self) -> Option<GeoPoint> {
        match (&self.center, self.lat, self.lon) {
            (Some(c), _, _) => Some(GeoPoint::new(c.lat, c.lon)),
            (None, Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }
}

/// Build the Overpass QL query for ways matching `filter` around `origin`.
pub fn build_query(filter: &str, origin: GeoPoint, radius_m: f64, timeout: Duration) -> String {
    format!(
        "[out:json][timeout:{}];\nway{}(around:{:.0},{},{});\nout center;",
        timeout.as_secs(),
        filter,
        radius_m,
        origin.lat,
        origin.lon
    )
}

/// Parse an Overpass JSON body. Elements without any coordinate are skipped.
pub fn parse_candidates(body: &str) -> Result<Vec<Candidate>, FetchError> {
    let resp: OverpassResponse = serde_json::from_str(body)?;
    Ok(resp
        .elements
        .iter()
        .filter_map(|e| e.point().map(|point| Candidate { id: e.id, point }))
        .collect())
}

pub struct OverpassFetcher {
    client: reqwest::Client,
    endpoint: String,
    filter: String,
    timeout: Duration,
}

/// Slack on top of the server-side query timeout before the client gives up.
const CLIENT_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

impl OverpassFetcher {
    pub fn new(endpoint: impl Into<String>, filter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            filter: filter.into(),
            timeout,
        }
    }
}

#[async_trait]
impl CandidateFetcher for OverpassFetcher {
    async fn fetch(&self, origin: GeoPoint, radius_m: f64) -> Result<Vec<Candidate>, FetchError> {
        let query = build_query(&self.filter, origin, radius_m, self.timeout);
        tracing::debug!(%origin, radius_m, "Querying Overpass");

        let resp = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout + CLIENT_TIMEOUT_SLACK)
            .body(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = resp.text().await?;
        parse_candidates(&body)
    }
}
