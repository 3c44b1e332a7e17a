// src/maps_client.rs
//
// Geocoding and satellite imagery, backed by the Google Maps web APIs.

use crate::config::{read_secret, MapsConfig};
use crate::error::ClientError;
use crate::types::GeoPoint;

use image::RgbImage;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Address -> coordinates. `Ok(None)` means the service found nothing.
pub trait Geocoder: Sync {
    fn geocode(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Option<GeoPoint>, ClientError>> + Send;
}

/// Fetches one square satellite tile centered on a point.
pub trait ImageryFetcher: Sync {
    fn fetch_tile(
        &self,
        center: GeoPoint,
        zoom: u8,
        pixel_size: u32,
        scale: u8,
    ) -> impl Future<Output = Result<RgbImage, ClientError>> + Send;
}

// ============================================================================
// GEOCODING RESPONSE
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct GeocodeResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<GeocodeResult>,
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeocodeResult {
    pub formatted_address: Option<String>,
    pub geometry: Geometry,
}

#[derive(Debug, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
}

#[derive(Debug, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl GeocodeResponse {
    /// First result's location, `None` for an empty answer.
    pub fn first_location(self) -> Result<Option<GeoPoint>, ClientError> {
        match self.status.as_str() {
            "OK" => Ok(self
                .results
                .into_iter()
                .next()
                .map(|r| GeoPoint::new(r.geometry.location.lat, r.geometry.location.lng))),
            "ZERO_RESULTS" => Ok(None),
            other => Err(ClientError::Decode(format!(
                "geocoder status {}: {}",
                other,
                self.error_message.unwrap_or_default()
            ))),
        }
    }
}

// ============================================================================
// CLIENT
// ============================================================================

#[derive(Clone)]
pub struct GoogleMapsClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleMapsClient {
    pub fn new(config: &MapsConfig, api_key: String) -> Result<Self, ClientError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_env(config: &MapsConfig) -> Result<Self, ClientError> {
        let api_key = read_secret(std::slice::from_ref(&config.api_key_env))
            .ok_or_else(|| ClientError::MissingCredential(config.api_key_env.clone()))?;
        Self::new(config, api_key)
    }
}

impl Geocoder for GoogleMapsClient {
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, ClientError> {
        let url = format!("{}/maps/api/geocode/json", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        let parsed: GeocodeResponse = response.json().await?;
        parsed.first_location()
    }
}

impl ImageryFetcher for GoogleMapsClient {
    async fn fetch_tile(
        &self,
        center: GeoPoint,
        zoom: u8,
        pixel_size: u32,
        scale: u8,
    ) -> Result<RgbImage, ClientError> {
        let url = format!("{}/maps/api/staticmap", self.base_url);
        let mut query = static_map_query(center, zoom, pixel_size, scale);
        query.push(("key", self.api_key.clone()));

        let response = self.http_client.get(&url).query(&query).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!("🛰️ Tile fetch at {} failed: {} {}", center, status, body);
            return Err(ClientError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        let image = image::load_from_memory(&bytes)?.to_rgb8();
        debug!(
            "🛰️ Tile at {} -> {}x{}",
            center,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

/// Static-map query parameters, without the key.
pub fn static_map_query(
    center: GeoPoint,
    zoom: u8,
    pixel_size: u32,
    scale: u8,
) -> Vec<(&'static str, String)> {
    vec![
        (
            "center",
            format!("{},{}", center.latitude, center.longitude),
        ),
        ("zoom", zoom.to_string()),
        ("size", format!("{}x{}", pixel_size, pixel_size)),
        ("maptype", "satellite".to_string()),
        ("scale", scale.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geocode_ok_takes_first_result() {
        let body = r#"{
            "status": "OK",
            "results": [
                {"formatted_address": "Beverly Hills, CA, USA", "geometry": {"location": {"lat": 34.0736, "lng": -118.4004}}},
                {"geometry": {"location": {"lat": 1.0, "lng": 2.0}}}
            ]
        }"#;
        let resp: GeocodeResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            resp.first_location().unwrap(),
            Some(GeoPoint::new(34.0736, -118.4004))
        );
    }

    #[test]
    fn test_geocode_zero_results_is_none() {
        let resp: GeocodeResponse =
            serde_json::from_str(r#"{"status": "ZERO_RESULTS", "results": []}"#).unwrap();
        assert_eq!(resp.first_location().unwrap(), None);
    }

    #[test]
    fn test_geocode_denied_is_error() {
        let resp: GeocodeResponse = serde_json::from_str(
            r#"{"status": "REQUEST_DENIED", "results": [], "error_message": "bad key"}"#,
        )
        .unwrap();
        let err = resp.first_location().unwrap_err();
        assert!(err.to_string().contains("REQUEST_DENIED"));
    }

    #[test]
    fn test_static_map_query() {
        let q = static_map_query(GeoPoint::new(34.0, -118.4), 20, 640, 2);
        assert!(q.contains(&("center", "34,-118.4".to_string())));
        assert!(q.contains(&("size", "640x640".to_string())));
        assert!(q.contains(&("maptype", "satellite".to_string())));
        assert!(q.contains(&("scale", "2".to_string())));
        assert!(q.contains(&("zoom", "20".to_string())));
    }
}
