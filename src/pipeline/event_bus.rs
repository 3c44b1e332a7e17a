// src/pipeline/event_bus.rs
//
// Decoupled event system. The orchestrator publishes stage changes,
// progress, call timings, usage and absorbed faults; the presentation
// layer decides what to do with them.

use crate::error::FaultKind;
use crate::pipeline::orchestrator::RunStage;
use crate::usage::TokenUsage;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCall {
    Geocode,
    FetchTile,
    Detect,
    Verify,
}

impl ServiceCall {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Geocode => "geocode",
            Self::FetchTile => "fetch_tile",
            Self::Detect => "detect",
            Self::Verify => "verify",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    StageChanged(RunStage),

    GridPlanned {
        tiles: usize,
        tiles_per_side: usize,
        tile_size_meters: f64,
    },

    /// `fraction` runs 0.0..=1.0 over the whole run: Pass 1 fills the first
    /// half, Pass 2 the second.
    Progress {
        stage: RunStage,
        fraction: f64,
    },

    CallTimed {
        call: ServiceCall,
        elapsed: Duration,
        ok: bool,
    },

    UsageReported {
        call: ServiceCall,
        usage: TokenUsage,
        cost_usd: f64,
    },

    Fault {
        kind: FaultKind,
        detail: String,
    },
}

/// Anything that consumes pipeline events.
pub trait EventSink {
    fn publish(&mut self, event: PipelineEvent);
}

/// Bounded in-memory buffer, drained by the caller.
pub struct EventBus {
    events: VecDeque<PipelineEvent>,
    max_pending: usize,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending,
        }
    }

    pub fn drain(&mut self) -> Vec<PipelineEvent> {
        self.events.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.events.len()
    }
}

impl EventSink for EventBus {
    fn publish(&mut self, event: PipelineEvent) {
        if self.events.len() >= self.max_pending {
            warn!(
                "Event bus full ({} events), dropping oldest",
                self.max_pending
            );
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Writes every event to the log. Used by the CLI as its progress display.
#[derive(Debug, Default)]
pub struct TracingSink {
    last_percent: Option<u32>,
}

impl EventSink for TracingSink {
    fn publish(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::StageChanged(stage) => info!("▶ {}", stage),
            PipelineEvent::GridPlanned {
                tiles,
                tiles_per_side,
                tile_size_meters,
            } => info!(
                "🗺️ Grid: {}x{} = {} tiles, {:.1} m per tile",
                tiles_per_side, tiles_per_side, tiles, tile_size_meters
            ),
            PipelineEvent::Progress { stage, fraction } => {
                // one line per 10%
                let percent = (fraction * 100.0).round() as u32;
                if self.last_percent.map_or(true, |p| percent / 10 > p / 10) {
                    info!("⏳ {} {}%", stage, percent);
                    self.last_percent = Some(percent);
                }
            }
            PipelineEvent::CallTimed { call, elapsed, ok } => debug!(
                "⏱️ {} took {:.3}s ({})",
                call.as_str(),
                elapsed.as_secs_f64(),
                if ok { "ok" } else { "failed" }
            ),
            PipelineEvent::UsageReported {
                call,
                usage,
                cost_usd,
            } => debug!(
                "💰 {}: {} in / {} out tokens, ${:.5}",
                call.as_str(),
                usage.input_tokens,
                usage.output_tokens,
                cost_usd
            ),
            PipelineEvent::Fault { kind, detail } => warn!("⚠️ {}: {}", kind, detail),
        }
    }
}
