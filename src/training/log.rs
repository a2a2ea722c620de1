//! Per-episode training log.
//!
//! Records are written as CSV, one row per episode, keyed by episode index.
//! Opening an existing log in append mode keeps its rows and header.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LogError;

const HEADER: &str = "episode,total_reward,steps,epsilon,final_kl";

/// Summary of one finished episode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub episode: u32,
    pub total_reward: f64,
    pub steps: u32,
    /// Exploration probability used during the episode.
    pub epsilon: f64,
    /// KL divergence of the estimate when the episode ended.
    pub final_kl: f64,
}

impl EpisodeRecord {
    fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.episode, self.total_reward, self.steps, self.epsilon, self.final_kl
        )
    }
}

impl fmt::Display for EpisodeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "episode {}: reward={:.3} steps={} epsilon={:.3} kl={:.4}",
            self.episode, self.total_reward, self.steps, self.epsilon, self.final_kl
        )
    }
}

/// Appendable CSV sink for [`EpisodeRecord`]s.
pub struct TrainingLog {
    path: PathBuf,
    writer: BufWriter<File>,
    rows: usize,
}

impl TrainingLog {
    /// Creates (or truncates) a log at `path` and writes the header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| io_error(&path, source))?;
        let mut log = Self {
            path,
            writer: BufWriter::new(file),
            rows: 0,
        };
        log.write_line(HEADER)?;
        Ok(log)
    }

    /// Opens `path` for appending; the header is written only if the file is
    /// new or empty.
    pub fn append(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| io_error(&path, source))?;
        let empty = file
            .metadata()
            .map_err(|source| io_error(&path, source))?
            .len()
            == 0;
        let mut log = Self {
            path,
            writer: BufWriter::new(file),
            rows: 0,
        };
        if empty {
            log.write_line(HEADER)?;
        }
        Ok(log)
    }

    /// Appends one row.
    pub fn record(&mut self, record: &EpisodeRecord) -> Result<(), LogError> {
        self.write_line(&record.csv_row())?;
        self.rows += 1;
        Ok(())
    }

    /// Flushes buffered rows to disk.
    pub fn flush(&mut self) -> Result<(), LogError> {
        self.writer
            .flush()
            .map_err(|source| io_error(&self.path, source))
    }

    /// Rows written through this handle.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, line: &str) -> Result<(), LogError> {
        writeln!(self.writer, "{line}").map_err(|source| io_error(&self.path, source))
    }
}

impl Drop for TrainingLog {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

fn io_error(path: &Path, source: std::io::Error) -> LogError {
    LogError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(episode: u32) -> EpisodeRecord {
        EpisodeRecord {
            episode,
            total_reward: -12.5,
            steps: 20,
            epsilon: 0.5,
            final_kl: 0.25,
        }
    }

    #[test]
    fn create_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        {
            let mut log = TrainingLog::create(&path).unwrap();
            log.record(&record(0)).unwrap();
            log.record(&record(1)).unwrap();
            assert_eq!(log.rows(), 2);
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "0,-12.5,20,0.5,0.25");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn append_keeps_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        {
            let mut log = TrainingLog::append(&path).unwrap();
            log.record(&record(0)).unwrap();
        }
        {
            let mut log = TrainingLog::append(&path).unwrap();
            log.record(&record(1)).unwrap();
            log.flush().unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().filter(|l| *l == HEADER).count(), 1);
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().last().unwrap().starts_with("1,"));
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no/such/dir/log.csv");
        assert!(matches!(
            TrainingLog::create(&path),
            Err(LogError::Io { .. })
        ));
    }
}
