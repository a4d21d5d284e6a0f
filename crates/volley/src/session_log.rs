//! Per-session CSV log
//!
//! One file per session under `sessions/`, one row per lifecycle step,
//! flushed after every row so a killed run still leaves usable logs.

use crate::result::VolleyResult;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// CSV header row
pub const COLUMNS: [&str; 7] = [
    "session_id",
    "worker_id",
    "iteration",
    "event",
    "timestamp",
    "input_line_number",
    "comment",
];

/// Identity of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionIds {
    /// Global session number
    pub session: u64,
    /// Worker running the session
    pub worker: usize,
    /// Iteration within the worker
    pub iteration: u64,
}

impl SessionIds {
    /// Log file path under an output directory
    #[must_use]
    pub fn log_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join("sessions").join(format!(
            "{}_{}_{}.csv",
            self.session, self.worker, self.iteration
        ))
    }
}

type RowSink = Box<dyn Write + Send + Sync>;

/// Writer for one session's CSV rows
pub struct SessionLog {
    ids: SessionIds,
    out: csv::Writer<RowSink>,
}

impl std::fmt::Debug for SessionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLog").field("ids", &self.ids).finish_non_exhaustive()
    }
}

impl SessionLog {
    /// Create the log file and write the preamble
    ///
    /// `description` is written as a leading `#` comment line.
    pub fn create(path: &Path, ids: SessionIds, description: &str) -> VolleyResult<Self> {
        let file = BufWriter::new(File::create(path)?);
        Self::from_writer(Box::new(file), ids, description)
    }

    /// Log that discards every row
    #[must_use]
    pub fn discard(ids: SessionIds) -> Self {
        Self {
            ids,
            out: row_writer(Box::new(io::sink())),
        }
    }

    /// Log over any writer
    pub fn from_writer(mut out: RowSink, ids: SessionIds, description: &str) -> VolleyResult<Self> {
        // The preamble is not a record, so it bypasses the CSV writer
        writeln!(out, "# {description}")?;
        let mut out = row_writer(out);
        out.write_record(COLUMNS)?;
        out.flush()?;
        Ok(Self { ids, out })
    }

    /// Session identity
    #[must_use]
    pub const fn ids(&self) -> SessionIds {
        self.ids
    }

    /// Write one row stamped with the current time
    pub fn row(&mut self, event: &str, line_number: usize, comment: &str) -> VolleyResult<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.out.write_record([
            self.ids.session.to_string().as_str(),
            self.ids.worker.to_string().as_str(),
            self.ids.iteration.to_string().as_str(),
            event,
            now.to_string().as_str(),
            line_number.to_string().as_str(),
            comment,
        ])?;
        self.out.flush()?;
        Ok(())
    }

    /// Terminal failure row carrying the error message
    pub fn fail(&mut self, line_number: usize, message: &str) -> VolleyResult<()> {
        self.row("PLAYBACK_FAIL", line_number, message)
    }
}

fn row_writer(out: RowSink) -> csv::Writer<RowSink> {
    csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out)
}
