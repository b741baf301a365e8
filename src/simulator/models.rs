//! Shared simulation types: run mode and the config/result pair threaded
//! between the CLI, the engine, and the report builder.

/// How the simulator sources target URLs and (if recording) where fetched
/// pages go. Grounded on `examples/original_source/simulator/core/models.py`'s
/// `Mode` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Hit real, live targets (from `sites_file` or `target_url`).
    Live,
    /// Serve target URLs from a local `HTMLFixtureServer` over recorded fixtures.
    Fixture,
    /// Fetch `sites_file` once, obfuscate, and write fixtures to disk; does
    /// not run a load simulation.
    Record,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Live => "live",
            Mode::Fixture => "fixture",
            Mode::Record => "record",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "live" => Some(Mode::Live),
            "fixture" => Some(Mode::Fixture),
            "record" => Some(Mode::Record),
            _ => None,
        }
    }
}

/// Parameters for a single simulation run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub mode: Mode,
    /// Flat consumer count, ignored when a mix file supplies its own.
    pub consumers: usize,
    pub rate_per_consumer_per_sec: f64,
    pub total_requests: Option<u64>,
    pub duration_seconds: Option<f64>,
    /// When set, consumers call MCP tools against this endpoint instead of
    /// issuing plain HTTP GETs.
    pub mcp_url: Option<String>,
    pub sites_file: String,
    pub target_url: Option<String>,
    pub timeout_seconds: f64,
}

/// Outcome of a completed simulation run.
#[derive(Debug)]
pub struct SimulationResult {
    pub started_at: std::time::Instant,
    pub ended_at: std::time::Instant,
    pub request_count: u64,
    pub error_count: u64,
    pub metrics_report: Option<serde_json::Value>,
}

impl SimulationResult {
    pub fn duration_seconds(&self) -> f64 {
        self.ended_at.saturating_duration_since(self.started_at).as_secs_f64()
    }

    pub fn throughput_rps(&self) -> f64 {
        let duration = self.duration_seconds();
        if duration <= 0.0 { 0.0 } else { self.request_count as f64 / duration }
    }
}
