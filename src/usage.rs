// src/usage.rs
//
// Token usage ledger. Each model call hands back its own TokenUsage; the
// orchestrator is the only writer of the ledger for a run.

use crate::config::PricingConfig;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

/// A model answer together with what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply<T> {
    pub value: T,
    pub usage: TokenUsage,
}

impl<T> ModelReply<T> {
    pub fn new(value: T, usage: TokenUsage) -> Self {
        Self { value, usage }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct UsageLedger {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub calls: u64,
    pub total_cost_usd: f64,
}

impl UsageLedger {
    pub fn record(&mut self, usage: TokenUsage, pricing: &PricingConfig) -> f64 {
        let cost = call_cost(usage, pricing);
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.calls += 1;
        self.total_cost_usd += cost;
        cost
    }
}

pub fn call_cost(usage: TokenUsage, pricing: &PricingConfig) -> f64 {
    usage.input_tokens as f64 / 1_000_000.0 * pricing.input_per_million
        + usage.output_tokens as f64 / 1_000_000.0 * pricing.output_per_million
}
