//! Load generator, obfuscating fixture recorder, and consumer-mix modeling
//! for exercising the MCP/HTTP surface outside the production request path.
//!
//! Grounded entirely in `examples/original_source/simulator/`, a standalone
//! Python subsystem with no counterpart in `app/`. Nothing under
//! `src/simulator/` is reachable from the service binary (`dig-scraper`) or
//! `housekeeper`; it is wired up only by the `dig-simulator` binary.

pub mod consumer;
pub mod engine;
pub mod metrics;
pub mod mix;
pub mod models;
pub mod obfuscator;
pub mod provider;
pub mod recorder;
pub mod report;
pub mod timeparse;

pub use consumer::{Consumer, ConsumerConfig};
pub use engine::{EngineError, Simulator};
pub use metrics::MetricsCollector;
pub use mix::{load_mix_file, MixConfig, MixError};
pub use models::{Mode, SimulationConfig, SimulationResult};
pub use obfuscator::obfuscate;
pub use provider::{ProviderError, UrlProvider};
pub use recorder::{FixtureStore, Recorder, RecordResult};
pub use report::build_simulation_report;
pub use timeparse::{parse_duration_to_seconds, DurationParseError};
