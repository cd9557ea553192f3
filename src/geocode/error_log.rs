use crate::domain::model::{ErrorLogEntry, LOG_TIMESTAMP_FORMAT};
use crate::utils::error::Result;
use chrono::{Local, NaiveDateTime};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const RESPONSE_PREFIX: &str = "  API response: ";

/// Plain-text log of postal codes that could not be geocoded.
///
/// Concurrent resolutions share one instance; appends are serialized so two
/// entries never interleave.
#[derive(Debug)]
pub struct ErrorLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends an entry stamped with the current time. A write failure is
    /// reported through tracing and otherwise ignored.
    pub async fn record(&self, code: &str, reason: &str, raw_response: Option<&str>) {
        let entry = ErrorLogEntry {
            timestamp: Local::now(),
            code: code.to_string(),
            reason: reason.to_string(),
            raw_response: raw_response.map(str::to_string),
        };

        tracing::debug!("CEP {}: {}", code, reason);
        if let Err(e) = self.append(&entry).await {
            tracing::error!(
                "Failed to write error log {}: {}",
                self.path.display(),
                e
            );
        }
    }

    pub async fn append(&self, entry: &ErrorLogEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(entry.to_string().as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the log back. A missing file is an empty log; unrecognized lines are skipped.
    pub async fn entries(&self) -> Result<Vec<ErrorLogEntry>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(parse_entries(&content))
    }
}

fn parse_entries(content: &str) -> Vec<ErrorLogEntry> {
    let mut entries: Vec<ErrorLogEntry> = Vec::new();

    for line in content.lines() {
        if let Some(raw) = line.strip_prefix(RESPONSE_PREFIX) {
            if let Some(last) = entries.last_mut() {
                last.raw_response = Some(raw.to_string());
            }
            continue;
        }
        if let Some(entry) = parse_entry_line(line) {
            entries.push(entry);
        }
    }

    entries
}

fn parse_entry_line(line: &str) -> Option<ErrorLogEntry> {
    let rest = line.strip_prefix('[')?;
    let (timestamp, rest) = rest.split_once("] CEP: ")?;
    let (code, reason) = rest.split_once(" - Error: ")?;

    let timestamp = NaiveDateTime::parse_from_str(timestamp, LOG_TIMESTAMP_FORMAT)
        .ok()?
        .and_local_timezone(Local)
        .earliest()?;

    Some(ErrorLogEntry {
        timestamp,
        code: code.to_string(),
        reason: reason.to_string(),
        raw_response: None,
    })
}
