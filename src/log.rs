use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::metrics::MetricsSnapshot;
use crate::session::{Outcome, SessionReport};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Verified,
    Mismatch,
    Failed,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionLogEntry {
    pub timestamp: String,
    pub session_id: String,
    pub server: String,
    pub file: PathBuf,
    pub key: Option<String>,
    pub status: SessionStatus,
    pub server_md5: Option<String>,
    pub local_md5: Option<String>,
    pub error: Option<String>,
    pub metrics: MetricsSnapshot,
}

impl SessionLogEntry {
    pub fn from_report(report: &SessionReport) -> Self {
        let (status, server_md5, local_md5, error) = match &report.outcome {
            Outcome::Verified(v) => {
                let status = if v.matches() {
                    SessionStatus::Verified
                } else {
                    SessionStatus::Mismatch
                };
                (status, Some(v.server.clone()), Some(v.local.clone()), None)
            }
            Outcome::Failed { step, reason } => (
                SessionStatus::Failed,
                None,
                None,
                Some(format!("{} failed: {}", step, reason)),
            ),
        };
        SessionLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            session_id: uuid::Uuid::new_v4().to_string(),
            server: report.metrics.server.clone(),
            file: report.file.clone(),
            key: report.key.clone(),
            status,
            server_md5,
            local_md5,
            error,
            metrics: report.metrics.clone(),
        }
    }
}

/// Append-only JSON Lines record of finished sessions
pub struct SessionLog {
    log_file_path: PathBuf,
}

impl SessionLog {
    pub fn new(path: &Path) -> Self {
        SessionLog {
            log_file_path: path.to_path_buf(),
        }
    }

    /// Append one session as a single JSON line
    pub fn add_entry(&self, entry: &SessionLogEntry) -> Result<()> {
        if let Some(parent) = self.log_file_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)
            .context("Failed to open session log file")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Every recorded session, oldest first; a missing file is an empty log
    pub fn read_log(&self) -> Result<Vec<SessionLogEntry>> {
        if !self.log_file_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.log_file_path)
            .context("Failed to open session log file for reading")?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: SessionLogEntry = serde_json::from_str(&line)?;
            entries.push(entry);
        }
        Ok(entries)
    }
}
