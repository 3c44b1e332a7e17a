// src/report.rs
//
// Presentation output: a plain-text results table for the terminal and a
// JSON document with everything a map front end needs.

use crate::geodesy::geo_point_to_pixel;
use crate::pipeline::{MetricsSummary, RunReport};
use crate::types::{GeoPoint, VerifiedPool};
use crate::usage::UsageLedger;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub address: Option<&'a str>,
    pub center: GeoPoint,
    pub radius_meters: f64,
    pub grid: GridInfo,
    pub candidate_count: usize,
    pub pool_count: usize,
    pub warning_count: u64,
    pub pools: Vec<PoolEntry<'a>>,
    pub usage: UsageLedger,
    pub metrics: &'a MetricsSummary,
}

#[derive(Debug, Serialize)]
pub struct GridInfo {
    pub zoom: u8,
    pub scale: u8,
    pub tiles_per_side: usize,
    pub tile_count: usize,
    pub tile_size_meters: f64,
}

#[derive(Debug, Serialize)]
pub struct PoolEntry<'a> {
    #[serde(flatten)]
    pub pool: &'a VerifiedPool,
    /// Where the pool sits inside its tile at the fetched resolution.
    pub tile_pixel: (f64, f64),
}

impl<'a> JsonReport<'a> {
    pub fn from_run(report: &'a RunReport) -> Self {
        let plan = &report.plan;
        let side = plan.tile_pixel_size * u32::from(plan.scale);
        let effective_mpp = plan.meters_per_pixel / f64::from(plan.scale.max(1));

        let pools = report
            .pools
            .iter()
            .map(|pool| {
                let tile_center = plan
                    .tiles
                    .get(pool.tile_index)
                    .map(|t| t.center)
                    .unwrap_or(plan.center);
                PoolEntry {
                    pool,
                    tile_pixel: geo_point_to_pixel(
                        pool.location,
                        tile_center,
                        effective_mpp,
                        side,
                        side,
                    ),
                }
            })
            .collect();

        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            address: report.address.as_deref(),
            center: report.center,
            radius_meters: plan.radius_meters,
            grid: GridInfo {
                zoom: plan.zoom,
                scale: plan.scale,
                tiles_per_side: plan.tiles_per_side,
                tile_count: plan.len(),
                tile_size_meters: plan.tile_size_meters,
            },
            candidate_count: report.candidate_count,
            pool_count: report.pools.len(),
            warning_count: report.warning_count(),
            pools,
            usage: report.usage,
            metrics: &report.metrics,
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))
    }
}

/// Terminal table of verified pools plus a usage footer.
pub fn render_table(report: &RunReport) -> String {
    let mut out = String::new();
    if report.pools.is_empty() {
        let _ = writeln!(out, "No pools detected in this area.");
    } else {
        let _ = writeln!(out, "Detected {} pools", report.pools.len());
        let _ = writeln!(
            out,
            "{:>3}  {:>11}  {:>12}  {:>4}  {}",
            "#", "latitude", "longitude", "tile", "box [ymin, xmin, ymax, xmax]"
        );
        for (i, p) in report.pools.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:>3}  {:>11.6}  {:>12.6}  {:>4}  [{:.0}, {:.0}, {:.0}, {:.0}]",
                i + 1,
                p.location.latitude,
                p.location.longitude,
                p.tile_index,
                p.bbox.ymin(),
                p.bbox.xmin(),
                p.bbox.ymax(),
                p.bbox.xmax()
            );
        }
    }

    let u = &report.usage;
    let _ = writeln!(
        out,
        "Model usage: {} calls, {} input / {} output tokens, ${:.4}",
        u.calls, u.input_tokens, u.output_tokens, u.total_cost_usd
    );
    if report.warning_count() > 0 {
        let _ = writeln!(
            out,
            "Warning: {} failures were skipped during the run; results may be incomplete.",
            report.warning_count()
        );
    }
    out
}
