use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use crate::digest::ContentDigest;

/// Sync event sink. Default methods are no-ops so the hot path pays nothing
/// when logging is disabled.
pub trait Logger: Send + Sync {
    fn start(&self, _source: &Path, _bucket: &str) {}
    fn uploaded(&self, _key: &str, _digest: &ContentDigest) {}
    fn skipped(&self, _key: &str) {}
    fn failed(&self, _key: &str, _msg: &str) {}
    fn warn(&self, _context: &str, _msg: &str) {}
    fn done(&self, _uploaded: u64, _skipped: u64, _failed: u64, _seconds: f64) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

#[derive(Serialize)]
struct LogEntry<'a> {
    timestamp: String,
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a str>,
}

/// JSONL log file, one event object per line.
pub struct JsonlLogger {
    file: Mutex<File>,
}

impl JsonlLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn entry(&self, event: &str, key: Option<&str>, detail: Option<&str>) {
        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            event,
            key,
            detail,
        };
        if let Ok(mut f) = self.file.lock() {
            if serde_json::to_writer(&mut *f, &entry).is_ok() {
                let _ = writeln!(f);
            }
        }
    }
}

impl Logger for JsonlLogger {
    fn start(&self, source: &Path, bucket: &str) {
        let detail = format!("src={} bucket={}", source.display(), bucket);
        self.entry("start", None, Some(&detail));
    }
    fn uploaded(&self, key: &str, digest: &ContentDigest) {
        self.entry("uploaded", Some(key), Some(digest.as_str()));
    }
    fn skipped(&self, key: &str) {
        self.entry("skipped", Some(key), None);
    }
    fn failed(&self, key: &str, msg: &str) {
        self.entry("failed", Some(key), Some(msg));
    }
    fn warn(&self, context: &str, msg: &str) {
        let detail = format!("{context}: {msg}");
        self.entry("warn", None, Some(&detail));
    }
    fn done(&self, uploaded: u64, skipped: u64, failed: u64, seconds: f64) {
        let detail =
            format!("uploaded={uploaded} skipped={skipped} failed={failed} seconds={seconds:.3}");
        self.entry("done", None, Some(&detail));
    }
}
