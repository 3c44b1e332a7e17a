// src/pipeline/orchestrator.rs
//
// Two-pass pool search over a tile grid.
//
//   Pass 1: one task per tile (fetch imagery, detect, cut candidate crops)
//   Pass 2: one task per candidate (verify the crop)
//
// Each pass runs at most `concurrency` tasks at once. Results are merged in
// submission order, never arrival order, so identical model decisions give
// identical output. Per-tile and per-candidate failures are counted and
// absorbed; only a failed geocode or an unplannable grid ends the run early.

use crate::config::{PricingConfig, SearchConfig};
use crate::detector::{DetectionOutcome, Detector};
use crate::error::{ClientError, FaultKind, RunError};
use crate::maps_client::{Geocoder, ImageryFetcher};
use crate::pipeline::candidates::candidates_from_tile;
use crate::pipeline::event_bus::{EventSink, PipelineEvent, ServiceCall};
use crate::pipeline::metrics::{timed, MetricsSummary, RunMetrics};
use crate::tile_grid::{plan_tile_grid, TileGridPlan};
use crate::types::{Candidate, GeoPoint, Tile, TileSpec, VerifiedPool};
use crate::usage::{ModelReply, TokenUsage, UsageLedger};
use crate::verifier::Verifier;

use futures::stream::{self, StreamExt};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum RunStage {
    Idle,
    Geocoding,
    TilingAndDetecting,
    Verifying,
    Done,
    Failed(String),
}

impl RunStage {
    pub fn can_advance_to(&self, next: &RunStage) -> bool {
        use RunStage::*;
        matches!(
            (self, next),
            (Idle, Geocoding)
                | (Idle, TilingAndDetecting)
                | (Geocoding, TilingAndDetecting)
                | (TilingAndDetecting, Verifying)
                | (Verifying, Done)
        ) || (matches!(next, Failed(_)) && !matches!(self, Done | Failed(_)))
    }
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Geocoding => f.write_str("geocoding"),
            Self::TilingAndDetecting => f.write_str("pass 1: detecting"),
            Self::Verifying => f.write_str("pass 2: verifying"),
            Self::Done => f.write_str("done"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Everything a finished run hands to the presentation layer.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub address: Option<String>,
    pub center: GeoPoint,
    pub plan: TileGridPlan,
    /// Pass-1 candidates, before verification.
    pub candidate_count: usize,
    pub pools: Vec<VerifiedPool>,
    pub usage: UsageLedger,
    pub metrics: MetricsSummary,
}

impl RunReport {
    pub fn warning_count(&self) -> u64 {
        self.metrics.warning_count
    }
}

/// What one Pass-1 task produced.
struct TileScan {
    spec: TileSpec,
    fetch: Result<(), ClientError>,
    fetch_elapsed: Duration,
    detect: Option<(Result<ModelReply<DetectionOutcome>, ClientError>, Duration)>,
    candidates: Vec<Candidate>,
    degenerate_crops: usize,
}

pub struct PoolFinder<G, F, D, V> {
    geocoder: G,
    fetcher: F,
    detector: D,
    verifier: V,
    settings: SearchConfig,
    pricing: PricingConfig,
}

impl<G, F, D, V> PoolFinder<G, F, D, V>
where
    G: Geocoder,
    F: ImageryFetcher,
    D: Detector,
    V: Verifier,
{
    pub fn new(
        geocoder: G,
        fetcher: F,
        detector: D,
        verifier: V,
        settings: SearchConfig,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            geocoder,
            fetcher,
            detector,
            verifier,
            settings,
            pricing,
        }
    }

    /// Geocode `address`, then search around it.
    pub async fn run(
        &self,
        address: &str,
        radius_meters: f64,
        sink: &mut dyn EventSink,
    ) -> Result<RunReport, RunError> {
        let mut stage = RunStage::Idle;
        advance(&mut stage, RunStage::Geocoding, sink);

        let (result, elapsed) = timed(self.geocoder.geocode(address)).await;
        sink.publish(PipelineEvent::CallTimed {
            call: ServiceCall::Geocode,
            elapsed,
            ok: result.is_ok(),
        });

        let center = match result {
            Ok(Some(point)) => point,
            Ok(None) => {
                advance(&mut stage, RunStage::Failed("no coordinates found".into()), sink);
                return Err(RunError::GeocodeNotFound {
                    address: address.to_string(),
                });
            }
            Err(e) => {
                error!("📍 Geocoding {:?} failed: {}", address, e);
                advance(&mut stage, RunStage::Failed(e.to_string()), sink);
                return Err(RunError::GeocodeFailed {
                    address: address.to_string(),
                    source: e,
                });
            }
        };
        info!("📍 {:?} -> {}", address, center);

        let mut report = self.search(center, radius_meters, stage, sink).await?;
        report.address = Some(address.to_string());
        Ok(report)
    }

    /// Search around known coordinates.
    pub async fn run_at(
        &self,
        center: GeoPoint,
        radius_meters: f64,
        sink: &mut dyn EventSink,
    ) -> Result<RunReport, RunError> {
        self.search(center, radius_meters, RunStage::Idle, sink).await
    }

    async fn search(
        &self,
        center: GeoPoint,
        radius_meters: f64,
        mut stage: RunStage,
        sink: &mut dyn EventSink,
    ) -> Result<RunReport, RunError> {
        let s = &self.settings;
        let plan = match plan_tile_grid(center, radius_meters, s.zoom, s.tile_pixel_size, s.scale)
        {
            Ok(plan) => plan,
            Err(e) => {
                error!("🗺️ Cannot plan grid around {}: {}", center, e);
                advance(&mut stage, RunStage::Failed(e.to_string()), sink);
                return Err(e.into());
            }
        };
        sink.publish(PipelineEvent::GridPlanned {
            tiles: plan.len(),
            tiles_per_side: plan.tiles_per_side,
            tile_size_meters: plan.tile_size_meters,
        });

        let mut metrics = RunMetrics::new();
        let mut usage = UsageLedger::default();
        metrics.tiles_planned = plan.len() as u64;

        advance(&mut stage, RunStage::TilingAndDetecting, sink);
        let candidates = self
            .detect_pass(&plan, &mut metrics, &mut usage, sink)
            .await;
        let candidate_count = candidates.len();
        metrics.candidates = candidate_count as u64;

        advance(&mut stage, RunStage::Verifying, sink);
        let pools = self
            .verify_pass(candidates, &mut metrics, &mut usage, sink)
            .await;

        advance(&mut stage, RunStage::Done, sink);
        sink.publish(PipelineEvent::Progress {
            stage: RunStage::Done,
            fraction: 1.0,
        });

        let metrics = metrics.summary();
        if metrics.warning_count > 0 {
            warn!(
                "⚠️ {} pools verified, {} faults absorbed along the way",
                pools.len(),
                metrics.warning_count
            );
        } else {
            info!("🏊 {} pools verified out of {} candidates", pools.len(), candidate_count);
        }

        Ok(RunReport {
            address: None,
            center,
            plan,
            candidate_count,
            pools,
            usage,
            metrics,
        })
    }

    // ------------------------------------------------------------------------
    // Pass 1
    // ------------------------------------------------------------------------

    async fn scan_tile(&self, spec: TileSpec) -> TileScan {
        let s = &self.settings;
        let (fetched, fetch_elapsed) = timed(self.fetcher.fetch_tile(
            spec.center,
            spec.zoom,
            s.tile_pixel_size,
            s.scale,
        ))
        .await;

        let image = match fetched {
            Ok(image) => image,
            Err(e) => {
                return TileScan {
                    spec,
                    fetch: Err(e),
                    fetch_elapsed,
                    detect: None,
                    candidates: Vec::new(),
                    degenerate_crops: 0,
                }
            }
        };

        let tile = Tile {
            spec,
            scale: s.scale,
            image,
        };
        let (mut detected, detect_elapsed) = timed(self.detector.detect(&tile.image)).await;

        let (candidates, degenerate_crops) = match &mut detected {
            Ok(reply) => candidates_from_tile(
                &tile,
                std::mem::take(&mut reply.value.boxes),
                s.crop_padding_ratio,
            ),
            Err(_) => (Vec::new(), 0),
        };

        TileScan {
            spec,
            fetch: Ok(()),
            fetch_elapsed,
            detect: Some((detected, detect_elapsed)),
            candidates,
            degenerate_crops,
        }
    }

    async fn detect_pass(
        &self,
        plan: &TileGridPlan,
        metrics: &mut RunMetrics,
        usage: &mut UsageLedger,
        sink: &mut dyn EventSink,
    ) -> Vec<Candidate> {
        let total = plan.len();
        let mut scans = std::pin::pin!(stream::iter(plan.tiles.iter().copied())
            .map(|spec| self.scan_tile(spec))
            .buffered(self.settings.concurrency));

        let mut candidates = Vec::new();
        let mut done = 0usize;
        while let Some(scan) = scans.next().await {
            done += 1;
            self.absorb_scan(scan, &mut candidates, metrics, usage, sink);
            sink.publish(PipelineEvent::Progress {
                stage: RunStage::TilingAndDetecting,
                fraction: done as f64 / total as f64 * 0.5,
            });
        }
        candidates
    }

    fn absorb_scan(
        &self,
        scan: TileScan,
        candidates: &mut Vec<Candidate>,
        metrics: &mut RunMetrics,
        usage: &mut UsageLedger,
        sink: &mut dyn EventSink,
    ) {
        let tile = scan.spec.index;
        metrics
            .fetch_timing
            .record(scan.fetch_elapsed, scan.fetch.is_ok());
        sink.publish(PipelineEvent::CallTimed {
            call: ServiceCall::FetchTile,
            elapsed: scan.fetch_elapsed,
            ok: scan.fetch.is_ok(),
        });

        if let Err(e) = scan.fetch {
            report_fault(
                FaultKind::TileFetchFailure,
                format!("tile {} at {}: {}", tile, scan.spec.center, e),
                metrics,
                sink,
            );
            return;
        }
        metrics.tiles_fetched += 1;

        let Some((detected, elapsed)) = scan.detect else {
            return;
        };
        metrics.detect_timing.record(elapsed, detected.is_ok());
        sink.publish(PipelineEvent::CallTimed {
            call: ServiceCall::Detect,
            elapsed,
            ok: detected.is_ok(),
        });

        let reply = match detected {
            Ok(reply) => reply,
            Err(e) => {
                report_fault(
                    FaultKind::DetectionCallFailure,
                    format!("tile {}: {}", tile, e),
                    metrics,
                    sink,
                );
                return;
            }
        };
        self.record_usage(ServiceCall::Detect, reply.usage, usage, sink);

        let outcome = reply.value;
        if outcome.parse_failed {
            report_fault(
                FaultKind::DetectionParseFailure,
                format!("tile {}: no box list in model answer", tile),
                metrics,
                sink,
            );
        }
        let malformed = outcome.rejected_entries + scan.degenerate_crops;
        if malformed > 0 {
            metrics.fault_n(FaultKind::MalformedBoundingBox, malformed as u64);
            sink.publish(PipelineEvent::Fault {
                kind: FaultKind::MalformedBoundingBox,
                detail: format!("tile {}: {} boxes skipped", tile, malformed),
            });
        }

        if !scan.candidates.is_empty() {
            info!("🔍 Tile {}: {} candidates", tile, scan.candidates.len());
        }
        candidates.extend(scan.candidates);
    }

    // ------------------------------------------------------------------------
    // Pass 2
    // ------------------------------------------------------------------------

    async fn verify_pass(
        &self,
        candidates: Vec<Candidate>,
        metrics: &mut RunMetrics,
        usage: &mut UsageLedger,
        sink: &mut dyn EventSink,
    ) -> Vec<VerifiedPool> {
        let total = candidates.len();
        if total == 0 {
            return Vec::new();
        }
        info!("🔎 Verifying {} candidates", total);

        let mut checks = std::pin::pin!(stream::iter(candidates)
            .map(|candidate| async move {
                let (verdict, elapsed) = timed(self.verifier.verify(&candidate.crop)).await;
                (candidate, verdict, elapsed)
            })
            .buffered(self.settings.concurrency));

        let mut pools = Vec::new();
        let mut done = 0usize;
        while let Some((candidate, verdict, elapsed)) = checks.next().await {
            done += 1;
            metrics.verify_timing.record(elapsed, verdict.is_ok());
            sink.publish(PipelineEvent::CallTimed {
                call: ServiceCall::Verify,
                elapsed,
                ok: verdict.is_ok(),
            });

            match verdict {
                Ok(reply) => {
                    self.record_usage(ServiceCall::Verify, reply.usage, usage, sink);
                    if reply.value {
                        metrics.verified += 1;
                        pools.push(VerifiedPool::from(candidate));
                    } else {
                        metrics.rejected += 1;
                    }
                }
                Err(e) => {
                    metrics.rejected += 1;
                    report_fault(
                        FaultKind::VerificationCallFailure,
                        format!(
                            "candidate at {} (tile {}): {}",
                            candidate.location, candidate.tile_index, e
                        ),
                        metrics,
                        sink,
                    );
                }
            }

            sink.publish(PipelineEvent::Progress {
                stage: RunStage::Verifying,
                fraction: 0.5 + done as f64 / total as f64 * 0.5,
            });
        }
        pools
    }

    fn record_usage(
        &self,
        call: ServiceCall,
        tokens: TokenUsage,
        usage: &mut UsageLedger,
        sink: &mut dyn EventSink,
    ) {
        let cost_usd = usage.record(tokens, &self.pricing);
        sink.publish(PipelineEvent::UsageReported {
            call,
            usage: tokens,
            cost_usd,
        });
    }
}

fn report_fault(
    kind: FaultKind,
    detail: String,
    metrics: &mut RunMetrics,
    sink: &mut dyn EventSink,
) {
    metrics.fault(kind);
    sink.publish(PipelineEvent::Fault { kind, detail });
}

fn advance(stage: &mut RunStage, next: RunStage, sink: &mut dyn EventSink) {
    debug_assert!(
        stage.can_advance_to(&next),
        "invalid stage transition {:?} -> {:?}",
        stage,
        next
    );
    *stage = next.clone();
    sink.publish(PipelineEvent::StageChanged(next));
}
