// src/config.rs

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Upper bound on the search radius. The tile planner separately caps the
/// grid size, which also depends on zoom and latitude.
pub const MAX_RADIUS_METERS: f64 = 5_000.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub maps: MapsConfig,
    pub model: ModelConfig,
    pub pricing: PricingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub radius_meters: f64,
    pub zoom: u8,
    pub tile_pixel_size: u32,
    /// Static-map scale factor (1 or 2). Doubles resolution, not footprint.
    pub scale: u8,
    /// Max in-flight tasks per pass.
    pub concurrency: usize,
    /// Padding added on each side of a detection before cropping, as a
    /// fraction of the box's own width/height.
    pub crop_padding_ratio: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            radius_meters: 200.0,
            zoom: 20,
            tile_pixel_size: 640,
            scale: 2,
            concurrency: 5,
            crop_padding_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapsConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://maps.googleapis.com".to_string(),
            api_key_env: "GOOGLE_MAPS_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub base_url: String,
    /// Environment variables tried in order for the API key.
    pub api_key_envs: Vec<String>,
    pub timeout_secs: u64,
    pub jpeg_quality: u8,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gemini-3-pro-preview".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_envs: vec![
                "GOOGLE_AI_API_KEY".to_string(),
                "GEMINI_API_KEY".to_string(),
            ],
            timeout_secs: 120,
            jpeg_quality: 80,
        }
    }
}

/// USD per million tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            input_per_million: 0.30,
            output_per_million: 2.50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents).context("Invalid config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.search;
        if !s.radius_meters.is_finite()
            || s.radius_meters < 0.0
            || s.radius_meters > MAX_RADIUS_METERS
        {
            bail!(
                "search.radius_meters must be in 0..={}, got {}",
                MAX_RADIUS_METERS,
                s.radius_meters
            );
        }
        if s.zoom > 21 {
            bail!("search.zoom must be in 0..=21, got {}", s.zoom);
        }
        if s.tile_pixel_size == 0 {
            bail!("search.tile_pixel_size must be > 0");
        }
        if !matches!(s.scale, 1 | 2) {
            bail!("search.scale must be 1 or 2, got {}", s.scale);
        }
        if s.concurrency == 0 {
            bail!("search.concurrency must be > 0");
        }
        if !s.crop_padding_ratio.is_finite() || s.crop_padding_ratio < 0.0 {
            bail!(
                "search.crop_padding_ratio must be >= 0, got {}",
                s.crop_padding_ratio
            );
        }
        if self.model.api_key_envs.is_empty() {
            bail!("model.api_key_envs must name at least one variable");
        }
        Ok(())
    }
}

/// First non-empty environment variable among `names`.
pub fn read_secret(names: &[String]) -> Option<String> {
    names
        .iter()
        .filter_map(|n| std::env::var(n).ok())
        .find(|v| !v.trim().is_empty())
}
