//! Operator-facing output
//!
//! Local runs print every message to the terminal. Prod runs append each
//! message as one stamped line to a per-day log file and prune files older
//! than the retention window first.

use chrono::{DateTime, Local};
use filetime::FileTime;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{RunMode, Settings};
use crate::error::Result;

const SECONDS_PER_DAY: i64 = 86_400;

/// Anything that can deliver an operator message
pub trait Emit: Send + Sync {
    fn emit(&self, message: &str) -> Result<()>;
}

/// Sink selected by the run mode
#[derive(Debug)]
pub enum OutputSink {
    Terminal,
    LogFile(DailyLog),
}

impl OutputSink {
    pub fn from_settings(settings: &Settings) -> Self {
        match settings.env.mode {
            RunMode::Local => OutputSink::Terminal,
            RunMode::Prod => OutputSink::LogFile(DailyLog::new(
                settings.rules.logs_path(),
                settings.env.retention_days,
            )),
        }
    }
}

impl Emit for OutputSink {
    fn emit(&self, message: &str) -> Result<()> {
        match self {
            OutputSink::Terminal => {
                println!("{}", message);
                Ok(())
            }
            OutputSink::LogFile(log) => {
                log.prune_old_files()?;
                log.append(message)
            }
        }
    }
}

/// Per-day log files under one directory
#[derive(Debug, Clone)]
pub struct DailyLog {
    dir: PathBuf,
    retention_days: u64,
}

impl DailyLog {
    pub fn new(dir: impl Into<PathBuf>, retention_days: u64) -> Self {
        Self {
            dir: dir.into(),
            retention_days,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Log file receiving messages written at `now`
    pub fn file_for(&self, now: DateTime<Local>) -> PathBuf {
        self.dir.join(format!("{}.log", now.format("%Y-%m-%d")))
    }

    /// Append one message as a single stamped line to today's file
    pub fn append(&self, message: &str) -> Result<()> {
        self.append_at(message, Local::now())
    }

    fn append_at(&self, message: &str, now: DateTime<Local>) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(now))?;

        writeln!(file, "{} {}", now.format("%H:%M:%S"), single_line(message))?;
        Ok(())
    }

    /// Delete `.log` files last modified before the retention window
    ///
    /// Today's file is never removed.
    pub fn prune_old_files(&self) -> Result<usize> {
        self.prune_at(Local::now())
    }

    fn prune_at(&self, now: DateTime<Local>) -> Result<usize> {
        if !self.dir.is_dir() {
            return Ok(0);
        }

        let retention = i64::try_from(self.retention_days)
            .unwrap_or(i64::MAX / SECONDS_PER_DAY)
            .saturating_mul(SECONDS_PER_DAY);
        let cutoff = now.timestamp().saturating_sub(retention);
        let current = self.file_for(now);
        let mut removed = 0;

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || path == current {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }

            let metadata = fs::metadata(&path)?;
            let modified = FileTime::from_last_modification_time(&metadata);
            if modified.unix_seconds() < cutoff {
                match fs::remove_file(&path) {
                    Ok(()) => {
                        debug!("Removed expired log file {}", path.display());
                        removed += 1;
                    }
                    Err(e) => warn!("Failed to remove expired log file {}: {}", path.display(), e),
                }
            }
        }

        Ok(removed)
    }
}

/// Log lines hold one message each
fn single_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Sink keeping messages in memory
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemorySink {
    messages: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

#[cfg(test)]
impl Emit for MemorySink {
    fn emit(&self, message: &str) -> Result<()> {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
        Ok(())
    }
}
