//! Tracing subscriber initialization.
//!
//! Filtering comes from `RUST_LOG` (default `info`). Output is JSON unless
//! `MEDSTOCK_LOG_FORMAT=pretty`.

use tracing_subscriber::EnvFilter;

pub const LOG_FORMAT_VAR: &str = "MEDSTOCK_LOG_FORMAT";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    /// Unknown values fall back to JSON.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" | "human" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }

    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_VAR)
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }
}

pub fn init() {
    init_with(LogFormat::from_env());
}

pub fn init_with(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    let _ = match format {
        LogFormat::Json => builder.json().with_target(false).try_init(),
        LogFormat::Pretty => builder.with_target(true).try_init(),
    };
}
