// src/error.rs
//
// Error taxonomy. Client errors come back from the external services,
// fault kinds are the recoverable per-tile / per-candidate failures the
// orchestrator absorbs, and RunError is the only thing that aborts a run.

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("missing credential: set {0}")]
    MissingCredential(String),
}

/// A grid the planner refuses to build.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    #[error("latitude {latitude} is outside the imagery range (max {max})")]
    LatitudeOutOfRange { latitude: f64, max: f64 },

    #[error("radius {radius_meters} m needs more than {max} tiles per side at zoom {zoom}")]
    TooManyTiles {
        radius_meters: f64,
        zoom: u8,
        max: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("no coordinates found for {address:?}")]
    GeocodeNotFound { address: String },

    #[error("geocoding {address:?} failed: {source}")]
    GeocodeFailed {
        address: String,
        #[source]
        source: ClientError,
    },

    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Recovered failures. Each one shrinks the result set instead of aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    TileFetchFailure,
    DetectionCallFailure,
    DetectionParseFailure,
    MalformedBoundingBox,
    VerificationCallFailure,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TileFetchFailure => "tile_fetch_failure",
            Self::DetectionCallFailure => "detection_call_failure",
            Self::DetectionParseFailure => "detection_parse_failure",
            Self::MalformedBoundingBox => "malformed_bounding_box",
            Self::VerificationCallFailure => "verification_call_failure",
        }
    }
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
