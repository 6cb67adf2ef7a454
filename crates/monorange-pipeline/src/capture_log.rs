//! Append-only record of accepted calibration samples, one JSON object per
//! line.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::CaptureMethod;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureLogRecord {
    pub filename: String,
    pub timestamp: String,
    pub method: CaptureMethod,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl CaptureLogRecord {
    pub fn new(
        index: usize,
        taken_at: &NaiveDateTime,
        method: CaptureMethod,
        frame_width: u32,
        frame_height: u32,
    ) -> Self {
        Self {
            filename: sample_filename(index, taken_at),
            timestamp: taken_at.format(TIMESTAMP_FORMAT).to_string(),
            method,
            frame_width,
            frame_height,
        }
    }
}

/// `checker_007_20240315_142501.png`
pub fn sample_filename(index: usize, taken_at: &NaiveDateTime) -> String {
    format!("checker_{index:03}_{}.png", taken_at.format("%Y%m%d_%H%M%S"))
}

pub struct CaptureLog {
    path: PathBuf,
    file: File,
}

impl CaptureLog {
    /// Open for appending, creating the file and its parent directory if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening capture log {}", path.display()))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, record: &CaptureLogRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        writeln!(self.file, "{line}")
            .with_context(|| format!("writing to {}", self.path.display()))?;
        self.file.flush()?;
        Ok(())
    }

    /// Read back every record; blank lines are skipped.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<CaptureLogRecord>> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mut records = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line)
                .with_context(|| format!("{}:{}: malformed record", path.display(), lineno + 1))?;
            records.push(record);
        }
        Ok(records)
    }
}
