use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Short code attached to every entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tag {
    /// `T`: an action went through
    Trace,
    /// `R`: a fetched row
    Row,
    /// `W`
    Warning,
    /// `E`
    Error,
}

impl Tag {
    pub fn code(self) -> char {
        match self {
            Self::Trace => 'T',
            Self::Row => 'R',
            Self::Warning => 'W',
            Self::Error => 'E',
        }
    }

    pub fn level(self) -> Level {
        match self {
            Self::Trace | Self::Row => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error => Level::ERROR,
        }
    }

    /// Level name as written by [`FileSink`].
    pub fn level_name(self) -> &'static str {
        match self {
            Self::Trace | Self::Row => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Why an operation did not go through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    Connect,
    Ping,
    Execute,
    Close,
    Precondition,
}

#[derive(Clone, Debug)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub tag: Tag,
    pub user: String,
    pub database: String,
    pub text: String,
    pub failure: Option<Failure>,
}

impl LogEntry {
    pub fn new(tag: Tag, user: &str, database: &str, text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            tag,
            user: user.to_string(),
            database: database.to_string(),
            text: text.into(),
            failure: None,
        }
    }

    pub fn with_failure(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn level(&self) -> Level {
        self.tag.level()
    }

    /// `user~database@text`
    pub fn message(&self) -> String {
        format!("{}~{}@{}", self.user, self.database, self.text)
    }

    /// `user~database-T: text`, the console form.
    pub fn console_line(&self) -> String {
        format!("{}~{}-{}: {}", self.user, self.database, self.tag, self.text)
    }

    /// `2024-01-01 12:00:00 INFO   :user~database@text`
    pub fn file_line(&self) -> String {
        format!(
            "{} {:<7}:{}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.tag.level_name(),
            self.message()
        )
    }
}

pub trait LogSink: Send + Sync {
    fn record(&self, entry: &LogEntry);
}

/// Emits each entry as a `tracing` event at the level of its tag.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, entry: &LogEntry) {
        let message = entry.message();
        match entry.tag {
            Tag::Trace | Tag::Row => info!(
                user = %entry.user,
                database = %entry.database,
                tag = %entry.tag,
                "{}",
                message
            ),
            Tag::Warning => warn!(
                user = %entry.user,
                database = %entry.database,
                tag = %entry.tag,
                failure = ?entry.failure,
                "{}",
                message
            ),
            Tag::Error => error!(
                user = %entry.user,
                database = %entry.database,
                tag = %entry.tag,
                failure = ?entry.failure,
                "{}",
                message
            ),
        }
    }
}

/// Appends one line per entry to a file.
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("could not open log file {}", path.display()))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn record(&self, entry: &LogEntry) {
        if let Ok(mut file) = self.file.lock() {
            if let Err(e) = writeln!(file, "{}", entry.file_line()) {
                warn!(path = %self.path.display(), error = %e, "failed to write session log");
            }
        }
    }
}

/// Keeps every entry in memory.
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries().iter().map(LogEntry::message).collect()
    }

    pub fn last(&self) -> Option<LogEntry> {
        self.entries.lock().ok().and_then(|e| e.last().cloned())
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|e| e.text.contains(needle))
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl LogSink for MemorySink {
    fn record(&self, entry: &LogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
    }
}

/// `~/.sqlsession/logs/session.log`
pub fn default_log_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    Ok(home.join(".sqlsession").join("logs").join("session.log"))
}

/// Installs a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_map_to_levels() {
        assert_eq!(Tag::Trace.level(), Level::INFO);
        assert_eq!(Tag::Row.level(), Level::INFO);
        assert_eq!(Tag::Warning.level(), Level::WARN);
        assert_eq!(Tag::Error.level(), Level::ERROR);
    }

    #[test]
    fn entry_formats() {
        let entry = LogEntry::new(Tag::Warning, "root", "library", "The query condition is empty");
        assert_eq!(entry.message(), "root~library@The query condition is empty");
        assert_eq!(
            entry.console_line(),
            "root~library-W: The query condition is empty"
        );
        assert!(
            entry
                .file_line()
                .ends_with(" WARNING:root~library@The query condition is empty")
        );
    }

    #[test]
    fn file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("session.log");

        let sink = FileSink::open(&path).unwrap();
        sink.record(&LogEntry::new(Tag::Trace, "u", "d", "first"));
        sink.record(&LogEntry::new(Tag::Error, "u", "d", "second"));
        drop(sink);

        let sink = FileSink::open(&path).unwrap();
        sink.record(&LogEntry::new(Tag::Row, "u", "d", "third"));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with(" INFO   :u~d@first"));
        assert!(lines[1].ends_with(" ERROR  :u~d@second"));
        assert!(lines[2].ends_with(" INFO   :u~d@third"));
        // "YYYY-MM-DD HH:MM:SS " prefix
        assert_eq!(&lines[0][4..5], "-");
        assert_eq!(&lines[0][19..20], " ");
    }

    #[test]
    fn memory_sink_collects() {
        let sink = MemorySink::new();
        sink.record(&LogEntry::new(Tag::Error, "u", "d", "boom").with_failure(Failure::Execute));
        assert!(sink.contains("boom"));
        assert_eq!(sink.last().unwrap().failure, Some(Failure::Execute));
        sink.clear();
        assert!(sink.entries().is_empty());
    }
}
