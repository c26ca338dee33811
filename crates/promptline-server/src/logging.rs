//! Logging configuration and initialization.
//!
//! Filters come from `RUST_LOG` when set. Otherwise a preset chosen on the
//! command line provides the base directives and `--log target=level` flags
//! refine them. Short targets are expanded under `promptline::`.

use clap::Args;
use std::collections::BTreeMap;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: '{}'. Use 'text' or 'json'.", s)),
        }
    }
}

/// Logging preset levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPreset {
    /// Lifecycle events only
    #[default]
    Production,
    Verbose,
    /// Per-command detail, reader threads still at info
    Debug,
    /// Everything, including every PTY read
    Trace,
    /// Warnings and errors only
    Quiet,
}

impl LogPreset {
    fn directives(self) -> &'static [&'static str] {
        match self {
            LogPreset::Production => &[
                "promptline::startup=info",
                "promptline::api=info",
                "promptline::registry=info",
                "promptline::session=info",
                "promptline::process=info",
                "promptline::reader=warn",
                "promptline::reaper=info",
                "tower_http=warn",
            ],
            LogPreset::Verbose => &["promptline=info", "tower_http=info"],
            LogPreset::Debug => &[
                "promptline=debug",
                "promptline::reader=info",
                "tower_http=debug",
            ],
            LogPreset::Trace => &["promptline=trace", "tower_http=trace"],
            LogPreset::Quiet => &["promptline=warn", "tower_http=error"],
        }
    }
}

/// Logging flags shared by the server command line.
#[derive(Args, Debug, Clone, Default)]
pub struct LogArgs {
    /// Enable verbose logging (INFO level for all targets)
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable debug logging (DEBUG level, PTY reads excluded)
    #[arg(short, long)]
    pub debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long)]
    pub trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Set log level for specific targets (e.g., "session=debug" or "reader=trace").
    /// Can be specified multiple times. Targets are prefixed with "promptline::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    pub overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    pub format: LogFormat,
}

/// Resolved logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub preset: LogPreset,
    /// Full target name to level; later flags replace earlier ones.
    pub overrides: BTreeMap<String, Level>,
    pub format: LogFormat,
}

impl LogConfig {
    pub fn from_args(args: &LogArgs) -> Self {
        // Quiet beats everything, then the most detailed level given.
        let preset = if args.quiet {
            LogPreset::Quiet
        } else if args.trace {
            LogPreset::Trace
        } else if args.debug {
            LogPreset::Debug
        } else if args.verbose {
            LogPreset::Verbose
        } else {
            LogPreset::Production
        };

        let overrides = args
            .overrides
            .iter()
            .flat_map(|arg| arg.split(','))
            .filter_map(parse_override)
            .collect();

        Self {
            preset,
            overrides,
            format: args.format,
        }
    }

    /// Build an EnvFilter from this configuration.
    pub fn build_filter(&self) -> EnvFilter {
        if let Ok(env_filter) = EnvFilter::try_from_default_env() {
            return env_filter;
        }

        let directives: Vec<String> = self
            .preset
            .directives()
            .iter()
            .map(|d| d.to_string())
            .chain(
                self.overrides
                    .iter()
                    .map(|(target, level)| format!("{}={}", target, level_to_str(*level))),
            )
            .collect();

        EnvFilter::try_new(directives.join(",")).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Parse one `target=level` pair, expanding short targets.
fn parse_override(part: &str) -> Option<(String, Level)> {
    let (target, level) = part.split_once('=')?;
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    let level: Level = level.trim().parse().ok()?;

    let full_target = if target.starts_with("promptline") || target == "tower_http" {
        target.to_string()
    } else {
        format!("promptline::{}", target)
    };
    Some((full_target, level))
}

fn level_to_str(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

/// Initialize the tracing subscriber. Logs go to stderr.
pub fn init(config: &LogConfig) {
    let filter = config.build_filter();

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_thread_names(true),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .init();
        }
    }
}
