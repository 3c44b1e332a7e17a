// src/pipeline/mod.rs

pub mod candidates;
pub mod event_bus;
pub mod metrics;
pub mod orchestrator;

pub use event_bus::{EventBus, EventSink, PipelineEvent, ServiceCall, TracingSink};
pub use metrics::{MetricsSummary, RunMetrics};
pub use orchestrator::{PoolFinder, RunReport, RunStage};
