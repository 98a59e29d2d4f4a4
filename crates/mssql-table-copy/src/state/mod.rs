//! Append-only progress log for resumable runs.
//!
//! Each line records one status change of one step:
//!
//! ```text
//! copy_data:target.orders: START @2024-05-01T10:00:00
//! copy_data:target.orders: SUCCESS @2024-05-01T10:12:41
//! ```
//!
//! The log is read once when opened and indexed into a latest-status map
//! plus the set of ids that ever reached `SUCCESS`. Lines are only ever
//! appended. Concurrent runs against the same file are not coordinated.

mod operation;

pub use operation::{filter_fingerprint, OperationId, OperationKind};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use tracing::{info, warn};

use crate::error::Result;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Status of a step in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressStatus {
    Start,
    Success,
    Error,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Start => "START",
            ProgressStatus::Success => "SUCCESS",
            ProgressStatus::Error => "ERROR",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "START" => Some(ProgressStatus::Start),
            "SUCCESS" => Some(ProgressStatus::Success),
            "ERROR" => Some(ProgressStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub id: String,
    pub status: ProgressStatus,
    pub timestamp: Option<NaiveDateTime>,
}

impl ProgressRecord {
    /// `"<id>: <STATUS> @<YYYY-MM-DDTHH:MM:SS>"`
    pub fn to_line(&self) -> String {
        match self.timestamp {
            Some(ts) => format!(
                "{}: {} @{}",
                self.id,
                self.status,
                ts.format(TIMESTAMP_FORMAT)
            ),
            None => format!("{}: {}", self.id, self.status),
        }
    }

    /// Parse a line; the timestamp suffix is optional.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end();
        let (body, timestamp) = match line.rsplit_once(" @") {
            Some((body, ts)) => (
                body,
                Some(NaiveDateTime::parse_from_str(ts.trim(), TIMESTAMP_FORMAT).ok()?),
            ),
            None => (line, None),
        };
        let (id, status) = body.rsplit_once(": ")?;
        Some(Self {
            id: id.to_string(),
            status: ProgressStatus::parse(status)?,
            timestamp,
        })
    }
}

/// Result of a tracked step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tracked<T> {
    /// The action ran and succeeded.
    Ran(T),
    /// A previous run already completed this step.
    Skipped,
}

impl<T> Tracked<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Tracked::Skipped)
    }
}

/// Idempotent step runner backed by the progress log.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    path: Option<PathBuf>,
    file: Option<File>,
    read_only: bool,
    latest: HashMap<String, ProgressStatus>,
    done: HashSet<String>,
}

impl ProgressTracker {
    /// Tracker that never skips and writes nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Index an existing log file. The file is created on the first append.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut tracker = Self {
            path: Some(path.clone()),
            ..Self::default()
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            for (lineno, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match ProgressRecord::parse(line) {
                    Some(record) => tracker.index(&record),
                    None => warn!(
                        "{}:{}: ignoring unreadable progress line {:?}",
                        path.display(),
                        lineno + 1,
                        line
                    ),
                }
            }
        }

        info!(
            "Progress log {}: {} completed steps",
            path.display(),
            tracker.done.len()
        );
        Ok(tracker)
    }

    /// Open `path` when given, otherwise a disabled tracker.
    pub fn from_option(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::open(p),
            None => Ok(Self::disabled()),
        }
    }

    /// Keep answering `is_done` but stop appending. Used for dry runs.
    #[must_use]
    pub fn into_read_only(mut self) -> Self {
        self.read_only = true;
        self.file = None;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    fn index(&mut self, record: &ProgressRecord) {
        self.latest.insert(record.id.clone(), record.status);
        if record.status == ProgressStatus::Success {
            self.done.insert(record.id.clone());
        }
    }

    /// True when any `SUCCESS` record exists for the id.
    pub fn is_done(&self, id: &OperationId) -> bool {
        self.done.contains(&id.to_string())
    }

    /// Most recent status recorded for the id.
    pub fn last_status(&self, id: &OperationId) -> Option<ProgressStatus> {
        self.latest.get(&id.to_string()).copied()
    }

    /// Append one record. No-op when disabled or read-only.
    pub fn record(&mut self, id: &OperationId, status: ProgressStatus) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        if self.file.is_none() {
            self.file = Some(OpenOptions::new().create(true).append(true).open(path)?);
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let record = ProgressRecord {
            id: id.to_string(),
            status,
            timestamp: Some(Local::now().naive_local()),
        };
        writeln!(file, "{}", record.to_line())?;
        file.flush()?;
        self.index(&record);
        Ok(())
    }

    /// Run `action` unless the step already succeeded.
    ///
    /// Records `START` before the action, then `SUCCESS` or `ERROR`. A
    /// completed step is skipped without writing anything.
    pub async fn run_once<T, F, Fut>(&mut self, id: &OperationId, action: F) -> Result<Tracked<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.is_done(id) {
            info!("Skipping {} (already completed)", id);
            return Ok(Tracked::Skipped);
        }

        self.record(id, ProgressStatus::Start)?;
        match action().await {
            Ok(value) => {
                self.record(id, ProgressStatus::Success)?;
                Ok(Tracked::Ran(value))
            }
            Err(e) => {
                if let Err(log_err) = self.record(id, ProgressStatus::Error) {
                    warn!("Failed to record ERROR for {}: {}", id, log_err);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CopyError;
    use tempfile::TempDir;

    fn id(kind: OperationKind) -> OperationId {
        OperationId::new(kind, "target", "orders")
    }

    #[test]
    fn test_record_line_format() {
        let record = ProgressRecord {
            id: "copy_data:target.orders".into(),
            status: ProgressStatus::Success,
            timestamp: NaiveDateTime::parse_from_str("2024-05-01T10:12:41", TIMESTAMP_FORMAT).ok(),
        };
        let line = record.to_line();
        assert_eq!(line, "copy_data:target.orders: SUCCESS @2024-05-01T10:12:41");
        assert_eq!(ProgressRecord::parse(&line), Some(record));
    }

    #[test]
    fn test_parse_tolerates_missing_timestamp_and_rejects_garbage() {
        let record = ProgressRecord::parse("create_table:t.o: START").unwrap();
        assert_eq!(record.id, "create_table:t.o");
        assert_eq!(record.status, ProgressStatus::Start);
        assert!(record.timestamp.is_none());
        assert!(ProgressRecord::parse("nonsense").is_none());
        assert!(ProgressRecord::parse("x: DONE @2024-05-01T10:12:41").is_none());
    }

    #[tokio::test]
    async fn test_run_once_records_start_and_success() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.log");
        let mut tracker = ProgressTracker::open(&path).unwrap();

        let result = tracker
            .run_once(&id(OperationKind::CopyData), || async { Ok(42) })
            .await
            .unwrap();
        assert_eq!(result, Tracked::Ran(42));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("copy_data:target.orders: START @"));
        assert!(lines[1].starts_with("copy_data:target.orders: SUCCESS @"));
    }

    #[tokio::test]
    async fn test_resume_skips_without_side_effects() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.log");
        std::fs::write(
            &path,
            "copy_data:target.orders: START @2024-05-01T10:00:00\n\
             copy_data:target.orders: SUCCESS @2024-05-01T10:12:41\n",
        )
        .unwrap();

        let mut tracker = ProgressTracker::open(&path).unwrap();
        let mut ran = false;
        let result = tracker
            .run_once(&id(OperationKind::CopyData), || {
                ran = true;
                async { Ok(()) }
            })
            .await
            .unwrap();

        assert!(result.is_skipped());
        assert!(!ran);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_failure_records_error_and_retries_next_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.log");

        {
            let mut tracker = ProgressTracker::open(&path).unwrap();
            let err = tracker
                .run_once(&id(OperationKind::CreateIndices), || async {
                    Err::<(), _>(CopyError::execution("create index", "duplicate"))
                })
                .await
                .unwrap_err();
            assert!(err.to_string().contains("duplicate"));
            assert_eq!(
                tracker.last_status(&id(OperationKind::CreateIndices)),
                Some(ProgressStatus::Error)
            );
        }

        let mut tracker = ProgressTracker::open(&path).unwrap();
        assert!(!tracker.is_done(&id(OperationKind::CreateIndices)));
        let result = tracker
            .run_once(&id(OperationKind::CreateIndices), || async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(result, Tracked::Ran(()));

        let content = std::fs::read_to_string(&path).unwrap();
        let statuses: Vec<ProgressStatus> = content
            .lines()
            .filter_map(ProgressRecord::parse)
            .map(|r| r.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                ProgressStatus::Start,
                ProgressStatus::Error,
                ProgressStatus::Start,
                ProgressStatus::Success
            ]
        );
    }

    #[tokio::test]
    async fn test_success_anywhere_marks_done() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.log");
        std::fs::write(
            &path,
            "copy_data:target.orders: SUCCESS @2024-05-01T10:12:41\n\
             copy_data:target.orders: START @2024-05-02T09:00:00\n\
             garbage line\n",
        )
        .unwrap();
        let tracker = ProgressTracker::open(&path).unwrap();
        assert!(tracker.is_done(&id(OperationKind::CopyData)));
        assert_eq!(
            tracker.last_status(&id(OperationKind::CopyData)),
            Some(ProgressStatus::Start)
        );
        assert!(!tracker.is_done(&id(OperationKind::CreateTable)));
    }

    #[tokio::test]
    async fn test_read_only_tracker_skips_but_never_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.log");
        std::fs::write(&path, "copy_data:target.orders: SUCCESS @2024-05-01T10:12:41\n").unwrap();

        let mut tracker = ProgressTracker::open(&path).unwrap().into_read_only();
        let skipped = tracker
            .run_once(&id(OperationKind::CopyData), || async { Ok(()) })
            .await
            .unwrap();
        assert!(skipped.is_skipped());
        let ran = tracker
            .run_once(&id(OperationKind::CreateIndices), || async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(ran, Tracked::Ran(()));
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[tokio::test]
    async fn test_read_only_tracker_never_creates_the_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.log");

        let mut tracker = ProgressTracker::open(&path).unwrap().into_read_only();
        tracker
            .run_once(&id(OperationKind::CopyData), || async { Ok(()) })
            .await
            .unwrap();

        assert!(tracker.is_enabled());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_log_is_created_on_first_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.log");

        let mut tracker = ProgressTracker::open(&path).unwrap();
        assert!(!path.exists());
        tracker
            .run_once(&id(OperationKind::CopyData), || async { Ok(()) })
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn test_disabled_tracker_always_runs() {
        let mut tracker = ProgressTracker::disabled();
        assert!(!tracker.is_enabled());
        for _ in 0..2 {
            let result = tracker
                .run_once(&id(OperationKind::CopyData), || async { Ok(1) })
                .await
                .unwrap();
            assert_eq!(result, Tracked::Ran(1));
        }
    }
}
