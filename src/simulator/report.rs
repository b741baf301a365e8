//! Assemble the JSON summary written by `dig-simulator run --output`.
//!
//! Grounded on `examples/original_source/simulator/api/report.py`'s
//! `build_simulation_report`.

use serde_json::{json, Value};

use super::models::{SimulationConfig, SimulationResult};

pub fn build_simulation_report(config: &SimulationConfig, result: &SimulationResult) -> Value {
    json!({
        "config": {
            "mode": config.mode.as_str(),
            "consumers": config.consumers,
            "rate_per_consumer_per_sec": config.rate_per_consumer_per_sec,
            "total_requests": config.total_requests,
            "duration_seconds": config.duration_seconds,
            "mcp_url": config.mcp_url,
            "sites_file": config.sites_file,
            "target_url": config.target_url,
            "timeout_seconds": config.timeout_seconds,
        },
        "result": {
            "request_count": result.request_count,
            "error_count": result.error_count,
            "duration_seconds": result.duration_seconds(),
            "throughput_rps": result.throughput_rps(),
        },
        "metrics": result.metrics_report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::models::Mode;

    #[test]
    fn report_carries_config_and_result_fields() {
        let config = SimulationConfig {
            mode: Mode::Live,
            consumers: 2,
            rate_per_consumer_per_sec: 1.0,
            total_requests: Some(10),
            duration_seconds: None,
            mcp_url: None,
            sites_file: "sites.json".to_string(),
            target_url: None,
            timeout_seconds: 30.0,
        };
        let result = SimulationResult {
            started_at: std::time::Instant::now(),
            ended_at: std::time::Instant::now(),
            request_count: 10,
            error_count: 1,
            metrics_report: Some(json!({"overall": {}})),
        };
        let report = build_simulation_report(&config, &result);
        assert_eq!(report["config"]["mode"], "live");
        assert_eq!(report["result"]["request_count"], 10);
    }
}
