// src/lib.rs
//
// Pool finder: tile satellite imagery around a point, let a vision model
// flag candidate swimming pools, then re-check each candidate crop.

pub mod config;
pub mod detector;
pub mod error;
pub mod geodesy;
pub mod llm_client;
pub mod maps_client;
pub mod pipeline;
pub mod report;
pub mod tile_grid;
pub mod types;
pub mod usage;
pub mod verifier;

pub use config::Config;
pub use error::{ClientError, FaultKind, GridError, RunError};
pub use pipeline::{PoolFinder, RunReport};
pub use types::{BoundingBox, Candidate, GeoPoint, Tile, VerifiedPool};
