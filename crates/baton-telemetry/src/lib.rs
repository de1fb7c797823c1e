mod sinks;

pub use sinks::{MemorySink, TracingSink};

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "baton_engine" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit one JSON object per line instead of human-readable text.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TelemetryError> {
    let directives = filter_directives(config.log_level, &config.module_levels);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
    });
    let text_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| TelemetryError::Install(e.to_string()))
}

/// Parse a `module=level` override such as `baton_engine=debug`.
pub fn parse_module_level(directive: &str) -> Result<(String, Level), String> {
    let (module, level) = directive
        .split_once('=')
        .ok_or_else(|| format!("expected MODULE=LEVEL, got `{directive}`"))?;
    let module = module.trim();
    if module.is_empty() {
        return Err(format!("missing module name in `{directive}`"));
    }
    let level = Level::from_str(level.trim()).map_err(|e| format!("{e}: `{level}`"))?;
    Ok((module.to_string(), level))
}

/// `EnvFilter` directive string: the base level followed by `module=level` pairs.
fn filter_directives(base: Level, modules: &[(String, Level)]) -> String {
    let mut directives = base.to_string().to_lowercase();
    for (module, level) in modules {
        directives.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    directives
}
