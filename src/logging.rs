// src/logging.rs
//
// `log` backend: every record goes to stderr prefixed with local
// `HH:MM:SS.mmm`, and is also appended to a log file once file logging
// has been started.

use log::{LevelFilter, Log, Metadata, Record};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Global log file handle. When `Some`, records are written to both stderr and this file.
static LOG_FILE: Mutex<Option<std::fs::File>> = Mutex::new(None);

static LOGGER: TimestampLogger = TimestampLogger;

struct TimestampLogger;

impl Log for TimestampLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let msg = format_record(record);
        eprintln!("{}", msg);
        if let Ok(mut guard) = LOG_FILE.lock() {
            if let Some(ref mut f) = *guard {
                let _ = writeln!(f, "{}", msg);
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut guard) = LOG_FILE.lock() {
            if let Some(ref mut f) = *guard {
                let _ = f.flush();
            }
        }
    }
}

fn format_record(record: &Record) -> String {
    format!(
        "{} {:<5} [{}] {}",
        chrono::Local::now().format("%H:%M:%S%.3f"),
        record.level(),
        short_target(record.target()),
        record.args()
    )
}

/// `scalelog_lib::sessions` -> `sessions`
fn short_target(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

/// Install the logger. Calling it again only changes the level.
pub fn init_logging(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_err() {
        log::debug!("Logger already installed");
    }
    log::set_max_level(level);
}

/// Parse a level name from settings or the command line.
pub fn parse_level(name: &str) -> Result<LevelFilter, String> {
    name.trim()
        .parse::<LevelFilter>()
        .map_err(|_| format!("Unknown log level '{}'", name))
}

/// Start teeing log output to a timestamped file in `log_dir`.
/// Also points a `scalelog.log` symlink at it (Unix only).
pub fn init_file_logging(log_dir: &Path) -> Result<PathBuf, String> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| format!("Failed to create log dir: {}", e))?;

    let filename = chrono::Local::now()
        .format("%Y%m%d-%H%M%S-scalelog.log")
        .to_string();
    let log_path = log_dir.join(&filename);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| format!("Failed to create log file: {}", e))?;

    // Windows symlinks require elevated privileges
    #[cfg(unix)]
    {
        let symlink_path = log_dir.join("scalelog.log");
        let _ = std::fs::remove_file(&symlink_path);
        if let Err(e) = std::os::unix::fs::symlink(&filename, &symlink_path) {
            log::warn!("Failed to create scalelog.log symlink: {}", e);
        }
    }

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }

    log::info!("File logging started: {}", log_path.display());
    Ok(log_path)
}

/// Stop file logging and close the log file.
pub fn stop_file_logging() {
    let stopped = match LOG_FILE.lock() {
        Ok(mut guard) => guard.take().is_some(),
        Err(_) => false,
    };
    if stopped {
        log::info!("File logging stopped");
    }
}
