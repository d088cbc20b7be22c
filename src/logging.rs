use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Configuration for the logging system
pub struct LogConfig {
    /// Directory where log files will be stored
    pub log_dir: PathBuf,
    /// Prefix for log file names
    pub file_prefix: String,
    /// Maximum number of log files to keep (rotation)
    pub max_files: usize,
    /// Whether to write logs to file
    pub log_to_file: bool,
    /// Log level filter string
    pub log_level: String,
    /// Emit stderr logs as JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        let log_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pdf-squeeze")
            .join("logs");

        Self {
            log_dir,
            file_prefix: "pdf-squeeze".to_string(),
            max_files: 5,
            log_to_file: false,
            log_level: "info".to_string(),
            json: false,
        }
    }
}

/// Initialize the logging system
///
/// Log targets:
/// - `compress` - batch lifecycle
/// - `compress::request` - upload body construction
/// - `compress::polling` / `compress::tracker` - per-job submission and polling
/// - `compress::simulated` - simulated progress timers
/// - `compress::reconcile` - mapping of results to files
/// - `api` - HTTP exchanges with the compression service
/// - `events` - event broadcasting
/// - `config` / `main` - startup
///
/// `RUST_LOG` overrides the configured level, e.g.
/// `RUST_LOG=compress=debug,api=trace`.
pub fn init_logging(config: LogConfig) -> Result<LogGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let worker_guard = if config.log_to_file {
        std::fs::create_dir_all(&config.log_dir).context("Failed to create log directory")?;

        let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix(&config.file_prefix)
            .filename_suffix("log")
            .max_log_files(config.max_files)
            .build(&config.log_dir)
            .context("Failed to create file appender")?;

        let (non_blocking_file, worker_guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = fmt::layer()
            .compact()
            .with_writer(non_blocking_file)
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(stderr_layer(config.json))
            .try_init()
            .context("Failed to install tracing subscriber")?;

        Some(worker_guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer(config.json))
            .try_init()
            .context("Failed to install tracing subscriber")?;

        None
    };

    tracing::debug!(
        target: "main",
        log_dir = %config.log_dir.display(),
        log_to_file = config.log_to_file,
        log_level = %config.log_level,
        "Logging system initialized"
    );

    Ok(LogGuard {
        _worker_guard: worker_guard,
    })
}

/// Progress output owns stdout, logs go to stderr
fn stderr_layer<S>(json: bool) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true)
            .with_ansi(true)
            .boxed()
    }
}

/// Guard that ensures file logs are flushed before exit; keep it alive for
/// the lifetime of the process
pub struct LogGuard {
    _worker_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}
