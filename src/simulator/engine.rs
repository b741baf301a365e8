//! Top-level orchestration: build providers and consumers from a
//! `SimulationConfig`, run them to completion, and assemble a
//! `SimulationResult`.
//!
//! Grounded on `examples/original_source/simulator/core/engine.py`'s
//! `Simulator` class: validate config, pick a provider by mode, build one
//! consumer per flat count or per mix-file entry, spawn them, and stop on
//! whichever bound (request budget or duration) fires first.

use std::sync::Arc;
use std::time::Duration;

use super::consumer::{Consumer, ConsumerConfig, Counters, RequestBudget, StopSignal};
use super::metrics::MetricsCollector;
use super::mix::MixConfig;
use super::models::{Mode, SimulationConfig, SimulationResult};
use super::provider::{StaticUrlProvider, UrlListProvider, UrlProvider};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("record mode must be driven through the recorder, not the load engine")]
    RecordModeUnsupported,
    #[error("live/fixture mode requires either target_url or sites_file")]
    NoTarget,
    #[error(transparent)]
    Provider(#[from] super::provider::ProviderError),
    #[error(transparent)]
    Mix(#[from] super::mix::MixError),
    #[error("failed to build HTTP client for consumer {consumer_id}: {message}")]
    ConsumerBuild { consumer_id: u32, message: String },
}

pub struct Simulator {
    config: SimulationConfig,
    mix: Option<MixConfig>,
    metrics: Arc<MetricsCollector>,
}

impl Simulator {
    pub fn new(config: SimulationConfig, mix: Option<MixConfig>) -> Self {
        Self { config, mix, metrics: Arc::new(MetricsCollector::new()) }
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub async fn run(&self) -> Result<SimulationResult, EngineError> {
        if matches!(self.config.mode, Mode::Record) {
            return Err(EngineError::RecordModeUnsupported);
        }

        let provider = self.build_provider()?;
        let consumer_configs = self.build_consumer_configs();

        let stop = Arc::new(StopSignal::default());
        let budget = Arc::new(RequestBudget::new(self.config.total_requests));
        let counters = Arc::new(Counters::default());

        let started_at = std::time::Instant::now();

        let mut handles = Vec::with_capacity(consumer_configs.len());
        for consumer_config in consumer_configs {
            let consumer = Consumer::new(consumer_config.clone(), provider.clone(), self.metrics.clone())
                .map_err(|e| EngineError::ConsumerBuild { consumer_id: consumer_config.consumer_id, message: e.to_string() })?;
            let stop = stop.clone();
            let budget = budget.clone();
            let counters = counters.clone();
            handles.push(tokio::spawn(async move {
                consumer.run(stop, budget, counters).await;
            }));
        }

        if let Some(duration_seconds) = self.config.duration_seconds {
            let stop = stop.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs_f64(duration_seconds.max(0.0))).await;
                stop.set();
            });
        }

        for handle in handles {
            let _ = handle.await;
        }

        let ended_at = std::time::Instant::now();
        let (ok, err) = counters.snapshot();
        let metrics_report = self.metrics.build_report().await;

        tracing::info!(
            event = "sim.run_complete",
            mode = self.config.mode.as_str(),
            request_count = ok + err,
            error_count = err,
            duration_seconds = ended_at.saturating_duration_since(started_at).as_secs_f64(),
            "simulation run complete"
        );

        Ok(SimulationResult {
            started_at,
            ended_at,
            request_count: ok + err,
            error_count: err,
            metrics_report: Some(metrics_report),
        })
    }

    fn build_provider(&self) -> Result<Arc<dyn UrlProvider>, EngineError> {
        if let Some(target_url) = &self.config.target_url {
            return Ok(Arc::new(StaticUrlProvider::new(target_url.clone())));
        }
        match self.config.mode {
            Mode::Fixture => {
                // No in-process fixture HTTP server is stood up here (that's a
                // separate operator-run process); sites_file is the base URL
                // fixtures were recorded relative to.
                let urls = super::provider::build_fixture_urls(&self.config.sites_file, &self.config.sites_file)?;
                Ok(Arc::new(UrlListProvider::new(urls)?))
            }
            Mode::Live => Ok(Arc::new(super::provider::SiteProvider::load_from_file(&self.config.sites_file)?)),
            Mode::Record => Err(EngineError::RecordModeUnsupported),
        }
    }

    fn build_consumer_configs(&self) -> Vec<ConsumerConfig> {
        let mut configs = Vec::new();
        let mut next_id = 0u32;

        match &self.mix {
            Some(mix) => {
                for entry in &mix.entries {
                    for _ in 0..entry.count {
                        configs.push(ConsumerConfig {
                            consumer_id: next_id,
                            rate_per_sec: self.config.rate_per_consumer_per_sec,
                            timeout_seconds: self.config.timeout_seconds,
                            persona: Some(entry.name.clone()),
                        });
                        next_id += 1;
                    }
                }
            }
            None => {
                for _ in 0..self.config.consumers {
                    configs.push(ConsumerConfig {
                        consumer_id: next_id,
                        rate_per_sec: self.config.rate_per_consumer_per_sec,
                        timeout_seconds: self.config.timeout_seconds,
                        persona: None,
                    });
                    next_id += 1;
                }
            }
        }

        configs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> SimulationConfig {
        SimulationConfig {
            mode: Mode::Live,
            consumers: 3,
            rate_per_consumer_per_sec: 5.0,
            total_requests: Some(10),
            duration_seconds: None,
            mcp_url: None,
            sites_file: String::new(),
            target_url: Some("https://example.com".to_string()),
            timeout_seconds: 5.0,
        }
    }

    #[test]
    fn build_consumer_configs_uses_flat_count_without_mix() {
        let sim = Simulator::new(base_config(), None);
        let configs = sim.build_consumer_configs();
        assert_eq!(configs.len(), 3);
        assert!(configs.iter().all(|c| c.persona.is_none()));
    }

    #[test]
    fn build_consumer_configs_expands_mix_entries() {
        let mix = MixConfig {
            entries: vec![
                super::super::mix::MixEntry { name: "apac".to_string(), count: 2, token: None },
                super::super::mix::MixEntry { name: "public".to_string(), count: 1, token: None },
            ],
        };
        let sim = Simulator::new(base_config(), Some(mix));
        let configs = sim.build_consumer_configs();
        assert_eq!(configs.len(), 3);
        assert_eq!(configs.iter().filter(|c| c.persona.as_deref() == Some("apac")).count(), 2);
    }

    #[tokio::test]
    async fn record_mode_is_rejected_by_run() {
        let mut config = base_config();
        config.mode = Mode::Record;
        let sim = Simulator::new(config, None);
        let err = sim.run().await.unwrap_err();
        assert!(matches!(err, EngineError::RecordModeUnsupported));
    }

    #[tokio::test]
    async fn static_target_url_short_circuits_provider_selection() {
        let config = base_config();
        let sim = Simulator::new(config, None);
        let provider = sim.build_provider().unwrap();
        assert_eq!(provider.choose_url(), "https://example.com");
    }
}
