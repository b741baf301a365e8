//! Per-tool/per-persona latency aggregation with bounded memory.
//!
//! Grounded on `examples/original_source/simulator/core/metrics.py`: a fixed-size
//! reservoir sampler per bucket backs p50/p95/p99, so memory stays bounded even
//! across a run with millions of calls.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use tokio::sync::Mutex;

const DEFAULT_SAMPLE_SIZE: usize = 5000;

fn percentile(sorted_values: &[u64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    if sorted_values.len() == 1 {
        return sorted_values[0] as f64;
    }
    let rank = p * (sorted_values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted_values[lower] as f64;
    }
    let frac = rank - lower as f64;
    sorted_values[lower] as f64 + (sorted_values[upper] as f64 - sorted_values[lower] as f64) * frac
}

enum SamplerRng {
    Seeded(StdRng),
    Thread,
}

impl SamplerRng {
    fn index(&mut self, bound: usize) -> usize {
        match self {
            SamplerRng::Seeded(rng) => rng.random_range(0..bound),
            SamplerRng::Thread => rand::rng().random_range(0..bound),
        }
    }
}

struct ReservoirSampler {
    max_size: usize,
    values: Vec<u64>,
    seen: u64,
    rng: SamplerRng,
}

impl ReservoirSampler {
    fn new(max_size: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SamplerRng::Seeded(StdRng::seed_from_u64(seed)),
            None => SamplerRng::Thread,
        };
        Self { max_size, values: Vec::with_capacity(max_size.min(64)), seen: 0, rng }
    }

    fn add(&mut self, value: u64) {
        self.seen += 1;
        if self.values.len() < self.max_size {
            self.values.push(value);
            return;
        }
        let replace_at = self.rng.index(self.seen as usize);
        if replace_at < self.max_size {
            self.values[replace_at] = value;
        }
    }

    fn sorted_values(&self) -> Vec<u64> {
        let mut values = self.values.clone();
        values.sort_unstable();
        values
    }
}

#[derive(Default)]
struct LatencyAgg {
    count: u64,
    error_count: u64,
    sum_ms: u64,
    min_ms: u64,
    max_ms: u64,
    error_types: HashMap<String, u64>,
    sampler: Option<ReservoirSampler>,
}

impl LatencyAgg {
    fn record(&mut self, sample_size: usize, duration_ms: u64, success: bool, error_type: Option<&str>) {
        if self.sampler.is_none() {
            self.sampler = Some(ReservoirSampler::new(sample_size, None));
        }
        self.count += 1;
        self.sum_ms += duration_ms;
        self.min_ms = if self.count == 1 { duration_ms } else { self.min_ms.min(duration_ms) };
        self.max_ms = self.max_ms.max(duration_ms);
        if !success {
            self.error_count += 1;
            let key = error_type.unwrap_or("unknown").to_string();
            *self.error_types.entry(key).or_insert(0) += 1;
        }
        self.sampler.as_mut().unwrap().add(duration_ms);
    }

    fn report(&self) -> Value {
        let sorted = self.sampler.as_ref().map(|s| s.sorted_values()).unwrap_or_default();
        let mean_ms = if self.count > 0 { self.sum_ms as f64 / self.count as f64 } else { 0.0 };
        let error_rate_pct = if self.count > 0 { self.error_count as f64 / self.count as f64 * 100.0 } else { 0.0 };
        json!({
            "count": self.count,
            "error_count": self.error_count,
            "error_rate_pct": error_rate_pct,
            "error_types": self.error_types,
            "min_ms": self.min_ms,
            "max_ms": self.max_ms,
            "mean_ms": mean_ms,
            "p50_ms": percentile(&sorted, 0.50),
            "p95_ms": percentile(&sorted, 0.95),
            "p99_ms": percentile(&sorted, 0.99),
            "sample_size": sorted.len(),
        })
    }
}

/// Collects per-tool and per-tool-per-persona latency/error statistics while a
/// simulation run is in flight. Safe to share across consumer tasks behind an
/// `Arc`; internally serialized with a single `tokio::sync::Mutex` the same
/// way the distilled source guards its `asyncio.Lock`-protected aggregates.
pub struct MetricsCollector {
    sample_size: usize,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    overall: LatencyAgg,
    by_tool: HashMap<String, LatencyAgg>,
    by_tool_persona: HashMap<(String, String), LatencyAgg>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_sample_size(DEFAULT_SAMPLE_SIZE)
    }

    pub fn with_sample_size(sample_size: usize) -> Self {
        Self { sample_size, inner: Mutex::new(Inner::default()) }
    }

    pub async fn record(&self, tool_name: &str, duration_ms: u64, success: bool, persona: Option<&str>, error_type: Option<&str>) {
        let mut inner = self.inner.lock().await;
        inner.overall.record(self.sample_size, duration_ms, success, error_type);
        inner.by_tool.entry(tool_name.to_string()).or_default().record(self.sample_size, duration_ms, success, error_type);
        if let Some(persona) = persona {
            inner
                .by_tool_persona
                .entry((tool_name.to_string(), persona.to_string()))
                .or_default()
                .record(self.sample_size, duration_ms, success, error_type);
        }
    }

    pub async fn build_report(&self) -> Value {
        let inner = self.inner.lock().await;
        let by_tool: serde_json::Map<String, Value> =
            inner.by_tool.iter().map(|(name, agg)| (name.clone(), agg.report())).collect();
        let by_tool_persona: serde_json::Map<String, Value> = inner
            .by_tool_persona
            .iter()
            .map(|((tool, persona), agg)| (format!("{tool}::{persona}"), agg.report()))
            .collect();
        json!({
            "overall": inner.overall.report(),
            "by_tool": by_tool,
            "by_tool_persona": by_tool_persona,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_handles_empty_and_single() {
        assert_eq!(percentile(&[], 0.5), 0.0);
        assert_eq!(percentile(&[42], 0.99), 42.0);
    }

    #[test]
    fn percentile_interpolates() {
        let values = vec![10, 20, 30, 40];
        assert_eq!(percentile(&values, 0.0), 10.0);
        assert_eq!(percentile(&values, 1.0), 40.0);
    }

    #[tokio::test]
    async fn records_overall_and_per_tool_per_persona() {
        let collector = MetricsCollector::new();
        collector.record("get_content", 120, true, Some("apac"), None).await;
        collector.record("get_content", 800, false, Some("apac"), Some("network_timeout")).await;
        collector.record("get_structure", 50, true, None, None).await;

        let report = collector.build_report().await;
        assert_eq!(report["overall"]["count"], 3);
        assert_eq!(report["by_tool"]["get_content"]["count"], 2);
        assert_eq!(report["by_tool_persona"]["get_content::apac"]["error_count"], 1);
    }

    #[test]
    fn reservoir_sampler_bounds_memory() {
        let mut sampler = ReservoirSampler::new(10, Some(7));
        for i in 0..1000u64 {
            sampler.add(i);
        }
        assert_eq!(sampler.sorted_values().len(), 10);
    }
}
