//! Tracing setup.
//!
//! `RUST_LOG` wins when set; otherwise the configured filter applies, with
//! `-v`/`-vv` widening it for ad-hoc debugging.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

pub struct TelemetryConfig {
    pub verbose: u8,
    pub logging: LoggingConfig,
}

impl TelemetryConfig {
    pub fn new(verbose: u8, logging: LoggingConfig) -> Self {
        Self { verbose, logging }
    }

    fn filter(&self) -> EnvFilter {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
        let directive = match self.verbose {
            0 => self.logging.filter.clone(),
            1 => "assured=debug".to_string(),
            _ => "assured=trace".to_string(),
        };
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global subscriber. Idempotent: a second init (tests) is a
/// no-op.
pub fn init(config: TelemetryConfig) {
    let fmt = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = tracing_subscriber::registry()
        .with(config.filter())
        .with(fmt)
        .try_init();
}
