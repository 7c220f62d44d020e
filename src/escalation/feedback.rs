//! Persistence of per-query tier outcomes.
//!
//! The file log is a single JSON array, read in full and rewritten in full
//! on every append. Appends are serialised in-process by a mutex and across
//! processes by an exclusive `fs2` lock on the log file itself.
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static QUERY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique, time-ordered query id: `q-<unix millis>-<counter>`.
pub fn next_query_id() -> String {
    let n = QUERY_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("q-{}-{n}", Utc::now().timestamp_millis())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierOutcome {
    pub model: String,
    pub success: bool,
    pub duration_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Classifier signals, empty when the answer was accepted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFeedback {
    pub query_id: String,
    pub query_text: String,
    pub timestamp: DateTime<Utc>,
    pub fast: TierOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thorough: Option<TierOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reformulated: Option<TierOutcome>,
    pub escalated: bool,
    pub successful: bool,
    pub model_used: String,
    pub total_duration_ms: u64,
}

#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("feedback log io: {0}")]
    Io(#[from] std::io::Error),

    #[error("feedback log is not a JSON array: {0}")]
    Json(#[from] serde_json::Error),

    #[error("feedback log lock failed: {0}")]
    Lock(String),
}

pub trait FeedbackSink: Send + Sync {
    fn record(&self, feedback: &QueryFeedback) -> Result<(), FeedbackError>;
}

/// Keeps records in memory. Used by tests and when no log path is configured.
#[derive(Debug, Default)]
pub struct MemoryFeedbackSink {
    records: Mutex<Vec<QueryFeedback>>,
}

impl MemoryFeedbackSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<QueryFeedback> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl FeedbackSink for MemoryFeedbackSink {
    fn record(&self, feedback: &QueryFeedback) -> Result<(), FeedbackError> {
        self.records
            .lock()
            .map_err(|_| FeedbackError::Lock("memory sink poisoned".to_string()))?
            .push(feedback.clone());
        Ok(())
    }
}

#[derive(Debug)]
pub struct FileFeedbackSink {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileFeedbackSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records in the log; an absent or empty file yields none.
    pub fn load(&self) -> Result<Vec<QueryFeedback>, FeedbackError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => parse_log(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl FeedbackSink for FileFeedbackSink {
    fn record(&self, feedback: &QueryFeedback) -> Result<(), FeedbackError> {
        let _in_process = self
            .guard
            .lock()
            .map_err(|_| FeedbackError::Lock("feedback mutex poisoned".to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        file.lock_exclusive()
            .map_err(|e| FeedbackError::Lock(e.to_string()))?;

        let result = rewrite_with(&mut file, feedback);
        // Unlock errors are irrelevant once the fd is closed
        let _ = FileExt::unlock(&file);
        result
    }
}

fn rewrite_with(file: &mut File, feedback: &QueryFeedback) -> Result<(), FeedbackError> {
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    let mut records = parse_log(&text)?;
    records.push(feedback.clone());

    let data = serde_json::to_string_pretty(&records)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(data.as_bytes())?;
    file.sync_data()?;
    Ok(())
}

fn parse_log(text: &str) -> Result<Vec<QueryFeedback>, FeedbackError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn feedback(id: &str) -> QueryFeedback {
        QueryFeedback {
            query_id: id.to_string(),
            query_text: "find the Widget component".to_string(),
            timestamp: Utc::now(),
            fast: TierOutcome {
                model: "fast".to_string(),
                success: false,
                duration_ms: 12,
                signals: vec!["response reports no results".to_string()],
                ..TierOutcome::default()
            },
            thorough: Some(TierOutcome {
                model: "thorough".to_string(),
                success: true,
                ..TierOutcome::default()
            }),
            reformulated: None,
            escalated: true,
            successful: true,
            model_used: "thorough".to_string(),
            total_duration_ms: 40,
        }
    }

    #[test]
    fn test_query_ids_are_unique() {
        let a = next_query_id();
        let b = next_query_id();
        assert_ne!(a, b);
        assert!(a.starts_with("q-"));
    }

    #[test]
    fn test_file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileFeedbackSink::new(dir.path().join("logs/feedback.json"));
        assert!(sink.load().unwrap().is_empty());

        sink.record(&feedback("q-1")).unwrap();
        sink.record(&feedback("q-2")).unwrap();

        let records = sink.load().unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.query_id.as_str()).collect();
        assert_eq!(ids, vec!["q-1", "q-2"]);
        assert_eq!(records[0].thorough.as_ref().map(|t| t.success), Some(true));
    }

    #[test]
    fn test_file_sink_rejects_corrupt_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.json");
        fs::write(&path, "{not an array").unwrap();
        let sink = FileFeedbackSink::new(&path);
        assert!(matches!(sink.record(&feedback("q-1")), Err(FeedbackError::Json(_))));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{not an array");
    }

    #[test]
    fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(FileFeedbackSink::new(dir.path().join("feedback.json")));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || sink.record(&feedback(&format!("q-{i}"))).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(sink.load().unwrap().len(), 8);
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemoryFeedbackSink::new();
        sink.record(&feedback("q-9")).unwrap();
        assert_eq!(sink.records().len(), 1);
    }
}
