//! Logging arguments and tracing subscriber setup.

use std::{io, path::PathBuf};

use clap::{ArgAction, Args, ValueEnum};
use tracing::{Subscriber, level_filters::LevelFilter};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Layer, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
};

/// File name prefix of rolled log files.
const LOG_FILE_PREFIX: &str = "loadgen.log";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogFormat {
    /// Full format with timestamp, level, target and spans.
    #[default]
    Full,
    /// Compact format with minimal metadata.
    Compact,
    /// One JSON object per event.
    Json,
}

/// Log file rotation strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogRotation {
    /// Rotate every hour.
    Hourly,
    /// Rotate every day at midnight.
    #[default]
    Daily,
    /// Never rotate.
    Never,
}

/// Logging configuration arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
#[command(next_help_heading = "Logging")]
pub(crate) struct LogArgs {
    /// Increase logging verbosity (`-v` debug, `-vv` trace).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Log output format.
    #[arg(long = "log-format", env = "LOADGEN_LOG_FORMAT", default_value = "full", global = true)]
    pub format: LogFormat,

    /// Directory to additionally write rolled log files to.
    #[arg(long = "log-dir", env = "LOADGEN_LOG_DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    /// Log file rotation strategy, used with `--log-dir`.
    #[arg(long = "log-rotation", default_value = "daily", global = true)]
    pub log_rotation: LogRotation,
}

impl LogArgs {
    /// Maps the verbosity count to a level filter. The default is `INFO`.
    pub(crate) const fn level_filter(&self) -> LevelFilter {
        match self.verbosity {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// Installs the global subscriber.
    ///
    /// `RUST_LOG` overrides the verbosity flag. The returned guard flushes the
    /// file writer when dropped and must be kept alive for the whole process.
    pub(crate) fn init_tracing_subscriber(&self) -> eyre::Result<Option<WorkerGuard>> {
        let filter = EnvFilter::builder()
            .with_default_directive(self.level_filter().into())
            .from_env_lossy();

        let stdout_layer = build_layer(self.format, io::stdout, true);

        let (file_layer, guard) = match &self.log_dir {
            Some(dir) => {
                let rotation = match self.log_rotation {
                    LogRotation::Hourly => Rotation::HOURLY,
                    LogRotation::Daily => Rotation::DAILY,
                    LogRotation::Never => Rotation::NEVER,
                };
                let appender = RollingFileAppender::new(rotation, dir, LOG_FILE_PREFIX);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                (Some(build_layer(self.format, writer, false)), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| eyre::eyre!("Failed to initialize tracing subscriber: {e}"))?;
        Ok(guard)
    }
}

fn build_layer<S, W>(format: LogFormat, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + Send + Sync,
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let base = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(ansi);
    match format {
        LogFormat::Full => Box::new(base),
        LogFormat::Compact => Box::new(base.compact()),
        LogFormat::Json => Box::new(base.json()),
    }
}
