// src/recording.rs
//
// Recording of timestamped readings to an append-only text log.
//
// Log format (imported by a spreadsheet using a decimal comma):
//
//   # debut : 2024-03-01 14:02:11.532907
//   # temps (s); masse (g)
//   1,00;50,00
//   2,00;50,25
//
// Data lines are "<elapsed s>;<mass g>", two decimals each, with every
// decimal point rendered as a comma.

use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

/// Header line recording when the capture started
pub const HEADER_START_PREFIX: &str = "# debut : ";
/// Header line naming the two columns
pub const HEADER_COLUMNS: &str = "# temps (s); masse (g)";

#[derive(Debug, Error)]
pub enum SinkFault {
    #[error("failed to open {sink}: {source}")]
    Open {
        sink: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write to {sink}: {source}")]
    Write {
        sink: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to close {sink}: {source}")]
    Close {
        sink: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RecordingFault {
    #[error("a recording is already running")]
    AlreadyActive,
    #[error(transparent)]
    Sink(#[from] SinkFault),
}

/// Opens the destination for a new recording.
pub trait SinkFactory: Send {
    fn open_sink(&self) -> io::Result<Box<dyn Write + Send>>;

    /// Human-readable name of the destination
    fn describe(&self) -> String;
}

/// Truncates and writes a file at a fixed path.
pub struct FileSinkFactory {
    path: PathBuf,
}

impl FileSinkFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSinkFactory { path: path.into() }
    }
}

impl SinkFactory for FileSinkFactory {
    fn open_sink(&self) -> io::Result<Box<dyn Write + Send>> {
        let file = File::create(&self.path)?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// An active recording. Exists only while recording; dropping it closes the sink.
pub struct RecordingSession {
    sink_name: String,
    sink: Box<dyn Write + Send>,
    started_at: Instant,
    lines_written: u64,
}

impl RecordingSession {
    /// Open a sink and write the two header lines immediately.
    pub fn start(
        factory: &dyn SinkFactory,
        started_at: Instant,
        started_wall: DateTime<Local>,
    ) -> Result<Self, SinkFault> {
        let sink_name = factory.describe();
        let sink = factory.open_sink().map_err(|source| SinkFault::Open {
            sink: sink_name.clone(),
            source,
        })?;

        let mut session = RecordingSession {
            sink_name,
            sink,
            started_at,
            lines_written: 0,
        };
        let header = format!(
            "{}{}{le}{}{le}",
            HEADER_START_PREFIX,
            started_wall.format("%Y-%m-%d %H:%M:%S%.6f"),
            HEADER_COLUMNS,
            le = LINE_ENDING
        );
        session.write_str(&header)?;

        log::info!("Recording to {}", session.sink_name);
        Ok(session)
    }

    pub fn sink_name(&self) -> &str {
        &self.sink_name
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// Time since start, computed fresh from `now`.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn append(&mut self, elapsed_seconds: f64, mass_grams: f64) -> Result<(), SinkFault> {
        let line = format_record_line(elapsed_seconds, mass_grams);
        self.write_str(&line)?;
        self.lines_written += 1;
        Ok(())
    }

    /// Flush and close the sink. Returns the number of data lines written.
    pub fn stop(mut self) -> Result<u64, SinkFault> {
        self.sink.flush().map_err(|source| SinkFault::Close {
            sink: self.sink_name.clone(),
            source,
        })?;
        log::info!(
            "Recording to {} stopped after {} lines",
            self.sink_name,
            self.lines_written
        );
        Ok(self.lines_written)
    }

    fn write_str(&mut self, text: &str) -> Result<(), SinkFault> {
        self.sink
            .write_all(text.as_bytes())
            .and_then(|_| self.sink.flush())
            .map_err(|source| SinkFault::Write {
                sink: self.sink_name.clone(),
                source,
            })
    }
}

/// Format one data line, terminator included.
pub fn format_record_line(elapsed_seconds: f64, mass_grams: f64) -> String {
    let line = format!("{:.2};{:.2}", elapsed_seconds, mass_grams).replace('.', ",");
    format!("{}{}", line, LINE_ENDING)
}
