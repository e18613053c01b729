// Logging configuration for the Anubis companion server

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use super::settings::{LogRotation, LoggingSettings};

// Keep the guards alive for the lifetime of the program
static LOG_GUARD: OnceLock<Vec<WorkerGuard>> = OnceLock::new();

const CRATE_TARGET: &str = "anubis";

/// Levels resolved from the `[logging]` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLevels {
    pub default: LevelFilter,
    pub crate_level: LevelFilter,
    /// Settings values that were not a level and fell back to the default
    pub rejected: Vec<String>,
}

impl LogLevels {
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        let mut rejected = Vec::new();
        let mut parse = |value: &str, fallback: LevelFilter| match value.trim().parse::<LevelFilter>() {
            Ok(level) => level,
            Err(_) => {
                rejected.push(value.to_string());
                fallback
            }
        };
        let default = parse(&settings.level, LevelFilter::INFO);
        let crate_level = parse(&settings.crate_level, LevelFilter::DEBUG);
        Self {
            default,
            crate_level,
            rejected,
        }
    }

    fn crate_directive(&self) -> Option<Directive> {
        format!("{}={}", CRATE_TARGET, self.crate_level).parse().ok()
    }

    fn filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::builder()
            .with_default_directive(self.default.into())
            .from_env_lossy();
        if let Some(directive) = self.crate_directive() {
            filter = filter.add_directive(directive);
        }
        filter
    }
}

fn to_rotation(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Never => Rotation::NEVER,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
    }
}

/// Appender for `path`; rotated files get a date suffix after the file name
///
/// None when the path has no file name or the file cannot be created.
pub fn file_appender(path: &Path, rotation: LogRotation) -> Option<RollingFileAppender> {
    let parent = path.parent()?;
    let file_name = path.file_name()?.to_str()?;
    RollingFileAppender::builder()
        .rotation(to_rotation(rotation))
        .filename_prefix(file_name)
        .build(parent)
        .ok()
}

/// Initialize logging from the `[logging]` settings.
///
/// # Arguments
/// * `settings` - Console switch, levels and rotation
/// * `log_file_path` - If Some, logs will also be written to this file
pub fn init_logging(settings: &LoggingSettings, log_file_path: Option<PathBuf>) {
    let mut guards = Vec::new();
    let levels = LogLevels::from_settings(settings);

    let appender = log_file_path
        .as_deref()
        .and_then(|path| file_appender(path, settings.rotation));
    let file_unusable = log_file_path.is_some() && appender.is_none();
    let file_layer = appender.map(|appender| {
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(false)
    });

    let console_layer = if settings.console {
        let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
        guards.push(guard);

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_target(false),
        )
    } else {
        None
    };

    // try_init: a second call (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(levels.filter())
        .with(file_layer)
        .with(console_layer)
        .try_init();

    let _ = LOG_GUARD.set(guards);

    for value in &levels.rejected {
        warn!(value = %value, "[config] Unknown log level, using default");
    }
    if file_unusable {
        warn!("[config] Log file cannot be opened, file logging disabled");
    }
}
