// src/main.rs

use anyhow::{bail, Context, Result};
use clap::Parser;
use pool_finder::config::Config;
use pool_finder::detector::ModelDetector;
use pool_finder::llm_client::VisionModelClient;
use pool_finder::maps_client::GoogleMapsClient;
use pool_finder::pipeline::{PoolFinder, TracingSink};
use pool_finder::report::{render_table, JsonReport};
use pool_finder::tile_grid::MAX_LATITUDE;
use pool_finder::types::GeoPoint;
use pool_finder::verifier::ModelVerifier;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Find swimming pools around an address from satellite imagery.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Address or place name, e.g. "Beverly Hills, CA"
    #[arg(required_unless_present = "lat")]
    address: Option<String>,

    /// Search around these coordinates instead of geocoding an address
    #[arg(long, requires = "lng", allow_hyphen_values = true, value_parser = parse_latitude)]
    lat: Option<f64>,

    #[arg(long, requires = "lat", allow_hyphen_values = true, value_parser = parse_longitude)]
    lng: Option<f64>,

    /// Search radius in meters [default: search.radius_meters from config]
    #[arg(short, long)]
    radius: Option<f64>,

    /// Imagery zoom level [default: search.zoom from config]
    #[arg(short, long)]
    zoom: Option<u8>,

    /// YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a JSON report here
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn parse_latitude(s: &str) -> Result<f64, String> {
    parse_degrees(s, MAX_LATITUDE)
}

fn parse_longitude(s: &str) -> Result<f64, String> {
    parse_degrees(s, 180.0)
}

fn parse_degrees(s: &str, max: f64) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if !value.is_finite() || value.abs() > max {
        return Err(format!("must be within ±{}", max));
    }
    Ok(value)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(zoom) = args.zoom {
        config.search.zoom = zoom;
    }
    if let Some(radius) = args.radius {
        config.search.radius_meters = radius;
    }
    config.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pool_finder={}", config.logging.level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🏊 Pool Finder starting");
    info!(
        "Search: radius={} m, zoom={}, tile={}px x{}, concurrency={}",
        config.search.radius_meters,
        config.search.zoom,
        config.search.tile_pixel_size,
        config.search.scale,
        config.search.concurrency
    );

    let maps = GoogleMapsClient::from_env(&config.maps)
        .context("Google Maps client unavailable")?;
    let model = VisionModelClient::from_env(&config.model)
        .context("Vision model client unavailable")?;
    info!("✓ Clients ready (model: {})", model.model());

    let finder = PoolFinder::new(
        maps.clone(),
        maps,
        ModelDetector::new(&model),
        ModelVerifier::new(&model),
        config.search.clone(),
        config.pricing,
    );

    let mut sink = TracingSink::default();
    let radius = config.search.radius_meters;
    let result = match (&args.address, args.lat, args.lng) {
        (_, Some(lat), Some(lng)) => {
            finder
                .run_at(GeoPoint::new(lat, lng), radius, &mut sink)
                .await
        }
        (Some(address), _, _) => finder.run(address, radius, &mut sink).await,
        _ => bail!("give an address or both --lat and --lng"),
    };
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            error!("Analysis failed: {}", e);
            return Err(e.into());
        }
    };

    print!("{}", render_table(&report));

    if report.warning_count() > 0 {
        warn!(
            "⚠️ {} faults absorbed: {:?}",
            report.warning_count(),
            report.metrics.faults
        );
    }

    if let Some(path) = &args.output {
        JsonReport::from_run(&report).write_to(path)?;
        info!("📄 Report written to {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_ranges() {
        assert_eq!(parse_latitude("-33.86"), Ok(-33.86));
        assert!(parse_latitude("85.1").is_err());
        assert!(parse_latitude("-90").is_err());
        assert!(parse_latitude("NaN").is_err());
        assert!(parse_latitude("north").is_err());
        assert_eq!(parse_longitude("-180"), Ok(-180.0));
        assert!(parse_longitude("180.5").is_err());
    }
}
