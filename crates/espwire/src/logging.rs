use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Crates whose events follow `--log-level`; everything else stays at warn or quieter.
const ENGINE_TARGETS: [&str; 4] = [
    "espwire",
    "espwire_transport",
    "espwire_frame",
    "espwire_client",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

fn targets(level: LogLevel) -> Targets {
    let engine = level.as_filter();
    ENGINE_TARGETS
        .iter()
        .fold(Targets::new(), |filter, target| filter.with_target(*target, engine))
        .with_default(engine.min(LevelFilter::WARN))
}

/// Install the stderr subscriber.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let registry = tracing_subscriber::registry();
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = registry.with(layer).with(targets(level)).try_init();
        }
        LogFormat::Json => {
            let _ = registry.with(layer.json()).with(targets(level)).try_init();
        }
    }
}
