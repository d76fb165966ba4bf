pub mod artifacts;
pub mod config;
pub mod dataset;
pub mod generator;

pub use artifacts::JsonArtifactStore;
pub use config::{GenerationConfig, Provider, RateLimitConfig, RetryConfig, ThrottleConfig};
pub use dataset::{DatasetSplit, TypeStats, filter_by_types, split_dataset};
pub use generator::{ChunkReport, ClientFactory, DatasetGenerator, GenerationSummary, RawResponse};

/// Install the global subscriber. `RUST_LOG` controls the filter (default
/// `info`); `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
