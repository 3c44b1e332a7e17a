// src/pipeline/metrics.rs
//
// Per-run counters and timings. Only the orchestrator writes them, after
// each task has finished, so plain integers are enough.

use crate::error::FaultKind;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Await `fut` and report how long it took.
pub async fn timed<F: Future>(fut: F) -> (F::Output, Duration) {
    let start = Instant::now();
    let out = fut.await;
    (out, start.elapsed())
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CallTiming {
    pub calls: u64,
    pub failures: u64,
    pub total: Duration,
    pub max: Duration,
}

impl CallTiming {
    pub fn record(&mut self, elapsed: Duration, ok: bool) {
        self.calls += 1;
        if !ok {
            self.failures += 1;
        }
        self.total += elapsed;
        self.max = self.max.max(elapsed);
    }

    pub fn avg_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total.as_secs_f64() * 1000.0 / self.calls as f64
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunMetrics {
    pub tiles_planned: u64,
    pub tiles_fetched: u64,
    pub candidates: u64,
    pub verified: u64,
    pub rejected: u64,
    pub faults: BTreeMap<FaultKind, u64>,
    pub fetch_timing: CallTiming,
    pub detect_timing: CallTiming,
    pub verify_timing: CallTiming,
    started_at: Option<Instant>,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn fault(&mut self, kind: FaultKind) {
        self.fault_n(kind, 1);
    }

    pub fn fault_n(&mut self, kind: FaultKind, n: u64) {
        if n > 0 {
            *self.faults.entry(kind).or_insert(0) += n;
        }
    }

    pub fn fault_count(&self, kind: FaultKind) -> u64 {
        self.faults.get(&kind).copied().unwrap_or(0)
    }

    /// Every absorbed fault, whatever its kind.
    pub fn warning_count(&self) -> u64 {
        self.faults.values().sum()
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            tiles_planned: self.tiles_planned,
            tiles_fetched: self.tiles_fetched,
            candidates: self.candidates,
            verified: self.verified,
            rejected: self.rejected,
            warning_count: self.warning_count(),
            faults: self
                .faults
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), *v))
                .collect(),
            avg_fetch_ms: self.fetch_timing.avg_ms(),
            avg_detect_ms: self.detect_timing.avg_ms(),
            avg_verify_ms: self.verify_timing.avg_ms(),
            elapsed_secs: self
                .started_at
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub tiles_planned: u64,
    pub tiles_fetched: u64,
    pub candidates: u64,
    pub verified: u64,
    pub rejected: u64,
    pub warning_count: u64,
    pub faults: BTreeMap<String, u64>,
    pub avg_fetch_ms: f64,
    pub avg_detect_ms: f64,
    pub avg_verify_ms: f64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_count_sums_all_kinds() {
        let mut m = RunMetrics::new();
        m.fault(FaultKind::TileFetchFailure);
        m.fault(FaultKind::TileFetchFailure);
        m.fault_n(FaultKind::MalformedBoundingBox, 3);
        m.fault_n(FaultKind::VerificationCallFailure, 0);
        assert_eq!(m.fault_count(FaultKind::TileFetchFailure), 2);
        assert_eq!(m.fault_count(FaultKind::VerificationCallFailure), 0);
        assert_eq!(m.warning_count(), 5);

        let s = m.summary();
        assert_eq!(s.warning_count, 5);
        assert_eq!(s.faults.get("malformed_bounding_box"), Some(&3));
        assert!(!s.faults.contains_key("verification_call_failure"));
    }

    #[test]
    fn test_call_timing_average() {
        let mut t = CallTiming::default();
        assert_eq!(t.avg_ms(), 0.0);
        t.record(Duration::from_millis(100), true);
        t.record(Duration::from_millis(300), false);
        assert_eq!(t.calls, 2);
        assert_eq!(t.failures, 1);
        assert_eq!(t.max, Duration::from_millis(300));
        assert!((t.avg_ms() - 200.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_measures_await() {
        let (value, elapsed) = timed(async {
            tokio::time::sleep(Duration::from_millis(250)).await;
            7
        })
        .await;
        assert_eq!(value, 7);
        assert!(elapsed >= Duration::from_millis(250));
    }
}
