//! Rolling file logs for the task board core.
//!
//! # Responsibility
//! - Start the `flexi_logger` backend once per process from a `LoggingConfig`.
//! - Keep log lines metadata-only: identities, counts and batch states.
//!
//! # Invariants
//! - Re-initializing with an equal config is a no-op; any other config is
//!   rejected with the active one.
//! - Panic payloads may quote titles or descriptions, so only their kind and
//!   length are logged.

use crate::config::LoggingConfig;
use flexi_logger::{
    Cleanup, Criterion, FileSpec, FlexiLoggerError, LogSpecification, Logger, LoggerHandle,
    Naming, WriteMode,
};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

const LOG_FILE_BASENAME: &str = "taskboard";

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();

struct LoggingState {
    config: LoggingConfig,
    _logger: LoggerHandle,
}

/// Errors from `init_logging`.
#[derive(Debug)]
pub enum LoggingError {
    /// `dir` is empty or relative.
    RelativeDir(PathBuf),
    CreateDir {
        dir: PathBuf,
        source: std::io::Error,
    },
    Backend(FlexiLoggerError),
    /// Logging already runs with a different config.
    AlreadyInitialized { active: Box<LoggingConfig> },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RelativeDir(dir) => {
                write!(f, "log dir must be an absolute path, got `{}`", dir.display())
            }
            Self::CreateDir { dir, source } => {
                write!(f, "failed to create log dir `{}`: {source}", dir.display())
            }
            Self::Backend(err) => write!(f, "failed to start logger: {err}"),
            Self::AlreadyInitialized { active } => write!(
                f,
                "logging already initialized at `{}` with level {:?}",
                active.dir.display(),
                active.level
            ),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDir { source, .. } => Some(source),
            Self::Backend(err) => Some(err),
            Self::RelativeDir(_) | Self::AlreadyInitialized { .. } => None,
        }
    }
}

/// Starts file logging.
///
/// # Errors
/// - `RelativeDir` when `config.dir` is not absolute.
/// - `CreateDir` / `Backend` when the directory or backend cannot be set up.
/// - `AlreadyInitialized` when logging runs with a different config.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    if !config.dir.is_absolute() {
        return Err(LoggingError::RelativeDir(config.dir.clone()));
    }

    let state = LOGGING_STATE.get_or_try_init(|| start(config))?;
    if state.config != *config {
        return Err(LoggingError::AlreadyInitialized {
            active: Box::new(state.config.clone()),
        });
    }
    Ok(())
}

fn start(config: &LoggingConfig) -> Result<LoggingState, LoggingError> {
    std::fs::create_dir_all(&config.dir).map_err(|source| LoggingError::CreateDir {
        dir: config.dir.clone(),
        source,
    })?;

    let logger = Logger::with(log_spec(config))
        .log_to_file(
            FileSpec::default()
                .directory(config.dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(config.max_file_bytes),
            Naming::Numbers,
            Cleanup::KeepLogFiles(config.keep_files),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(LoggingError::Backend)?;

    install_panic_hook();
    info!(
        "event=core_init module=core status=ok version={} level={:?} modules={} log_dir={}",
        env!("CARGO_PKG_VERSION"),
        config.level,
        config.modules.len(),
        config.dir.display()
    );

    Ok(LoggingState {
        config: config.clone(),
        _logger: logger,
    })
}

fn log_spec(config: &LoggingConfig) -> LogSpecification {
    let mut builder = LogSpecification::builder();
    builder.default(config.level.filter());
    for (module, level) in &config.modules {
        builder.module(module, level.filter());
    }
    builder.build()
}

/// Runs once, from inside the logging `OnceCell` initializer.
fn install_panic_hook() {
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        error!(
            "event=panic_captured module=core status=error location={location} {}",
            describe_payload(panic_info.payload())
        );
        previous_hook(panic_info);
    }));
}

fn describe_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("payload_kind=str payload_chars={}", message.chars().count())
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("payload_kind=string payload_chars={}", message.chars().count())
    } else {
        "payload_kind=opaque".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{describe_payload, init_logging, log_spec, LoggingError};
    use crate::config::{LogLevel, LoggingConfig};
    use log::LevelFilter;
    use std::any::Any;

    #[test]
    fn payload_description_never_carries_text() {
        let title: Box<dyn Any + Send> = Box::new(String::from("Secret launch plan"));
        let described = describe_payload(title.as_ref());
        assert_eq!(described, "payload_kind=string payload_chars=18");

        let opaque: Box<dyn Any + Send> = Box::new(7_u32);
        assert_eq!(describe_payload(opaque.as_ref()), "payload_kind=opaque");
    }

    #[test]
    fn module_overrides_become_filters() {
        let config = LoggingConfig::new("/tmp/taskboard")
            .with_level(LogLevel::Warn)
            .with_module("taskboard_core::dispatch", LogLevel::Trace);

        let spec = log_spec(&config);

        let filters: Vec<(Option<&str>, LevelFilter)> = spec
            .module_filters()
            .iter()
            .map(|filter| (filter.module_name.as_deref(), filter.level_filter))
            .collect();
        assert!(filters.contains(&(None, LevelFilter::Warn)));
        assert!(filters.contains(&(Some("taskboard_core::dispatch"), LevelFilter::Trace)));
    }

    #[test]
    fn relative_dir_is_rejected_before_starting() {
        let err = init_logging(&LoggingConfig::new("logs/dev")).unwrap_err();
        assert!(matches!(err, LoggingError::RelativeDir(_)));
    }

    #[test]
    fn init_is_idempotent_and_rejects_a_different_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig::new(dir.path()).with_level(LogLevel::Info);

        init_logging(&config).unwrap();
        init_logging(&config).unwrap();

        let err = init_logging(&config.clone().with_level(LogLevel::Debug)).unwrap_err();
        match err {
            LoggingError::AlreadyInitialized { active } => assert_eq!(*active, config),
            other => panic!("unexpected error: {other}"),
        }
    }
}
