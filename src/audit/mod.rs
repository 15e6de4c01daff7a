//! Append-only audit log. Every validated inbound frame and every outbound
//! frame is written as one JSON record per line, before the state mutation
//! it belongs to commits. A crash between the append and the commit leaves
//! the audit showing an extra attempt, never fewer than the commits.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fs::{create_dir_all, File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Request,
    Response,
}

/// One audit line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub log_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub source: String,
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,
    pub message: Value,
}

/// Append-only protocol audit log backed by a single file. Writes hold the
/// file lock for the append only, which keeps records ordered per
/// connection without a global ordering requirement.
pub struct AuditLog {
    file: Mutex<File>,
    path: PathBuf,
    written: AtomicU64,
}

impl AuditLog {
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            file: Mutex::new(file),
            path,
            written: AtomicU64::new(0),
        })
    }

    /// Appends one protocol frame. The stored copy has `auth_token` values
    /// redacted wherever they appear.
    pub fn record(
        &self,
        direction: Direction,
        source: impl Into<String>,
        destination: impl Into<String>,
        conversation_id: Option<Uuid>,
        message: &Value,
    ) -> io::Result<()> {
        let mut message = message.clone();
        redact_tokens(&mut message);

        let record = AuditRecord {
            log_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            direction,
            source: source.into(),
            destination: destination.into(),
            conversation_id,
            message,
        };
        self.append(&record)
    }

    /// Audits a request body that failed JSON parsing. The raw bytes are
    /// kept lossily so the record itself stays valid JSON.
    pub fn record_raw_body(&self, source: impl Into<String>, body: &[u8]) -> io::Result<()> {
        let record = AuditRecord {
            log_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            direction: Direction::Request,
            source: source.into(),
            destination: "unparsed".to_string(),
            conversation_id: None,
            message: Value::String(String::from_utf8_lossy(body).into_owned()),
        };
        self.append(&record)
    }

    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        let line = serde_json::to_string(record)?;
        let file = &mut *self.file.lock();
        writeln!(file, "{line}")?;
        file.flush()?;
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Number of records appended by this process
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record back from the file. The audit log is the
    /// authoritative message history after a restart; current state comes
    /// from the store.
    pub fn read_records(&self) -> io::Result<Vec<AuditRecord>> {
        let file = File::open(&self.path)?;
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            records.push(record);
        }
        Ok(records)
    }
}

/// Replaces every `auth_token` value in the tree with a redaction marker
fn redact_tokens(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if key == "auth_token" && !entry.is_null() {
                    *entry = Value::String("[REDACTED]".to_string());
                } else {
                    redact_tokens(entry);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_tokens(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::{AuditLog, Direction};
    use serde_json::json;

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("audit.log")).unwrap();

        let frame = json!({"params": {"envelope": {"sender": "player:alice"}}});
        log.record(Direction::Request, "player:alice", "league_manager", None, &frame)
            .unwrap();
        log.record(Direction::Response, "league_manager", "player:alice", None, &frame)
            .unwrap();

        let records = log.read_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(log.written(), 2);
        assert_eq!(records[0].direction, Direction::Request);
        assert_eq!(records[1].direction, Direction::Response);
    }

    #[test]
    fn test_tokens_redacted_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("audit.log")).unwrap();

        let frame = json!({
            "params": {
                "envelope": {"auth_token": "secret-token"},
                "payload": {"nested": [{"auth_token": "another"}]}
            }
        });
        log.record(Direction::Request, "referee:r1", "league_manager", None, &frame)
            .unwrap();

        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert!(!raw.contains("secret-token"));
        assert!(!raw.contains("another"));
        assert!(raw.contains("[REDACTED]"));
    }

    #[test]
    fn test_raw_body_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("audit.log")).unwrap();
        log.record_raw_body("unknown", b"not json {").unwrap();

        let records = log.read_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, serde_json::json!("not json {"));
    }
}
