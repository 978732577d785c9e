use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::metrics::MetricsSnapshot;
use crate::plan::UploadPlan;

pub trait Logger: Send + Sync {
    fn connected(&self, _peer: &str) {}
    fn login(&self, _identifier: &str) {}
    fn plan(&self, _file: &Path, _plan: &UploadPlan) {}
    fn block_sent(&self, _key: &str, _index: u64, _bytes: u64) {}
    fn error(&self, _step: &str, _msg: &str) {}
    fn verified(&self, _server: &str, _local: &str, _matches: bool) {}
    fn note(&self, _msg: &str) {}
    fn done(&self, _metrics: &MetricsSnapshot) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

fn format_plan(file: &Path, plan: &UploadPlan) -> String {
    format!(
        "PLAN file={} key={} block_size={} total_block={}",
        file.display(),
        plan.key,
        plan.block_size,
        plan.total_block
    )
}

fn format_done(m: &MetricsSnapshot) -> String {
    format!(
        "DONE file={} blocks={} bytes={} failures={} seconds={:.3} mbps={}",
        m.file_path,
        m.blocks_sent,
        m.bytes_sent,
        m.block_failures,
        m.total_seconds.unwrap_or(0.0),
        m.throughput_mbps
            .map(|t| format!("{t:.2}"))
            .unwrap_or_else(|| "-".into())
    )
}

/// Append-only text log with RFC 3339 timestamps
pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    /// Open `path` for appending, creating missing parent directories
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    // A poisoned lock drops the line; logging never fails a session
    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn connected(&self, peer: &str) {
        self.line(&format!("CONNECT peer={}", peer));
    }
    fn login(&self, identifier: &str) {
        self.line(&format!("LOGIN user={}", identifier));
    }
    fn plan(&self, file: &Path, plan: &UploadPlan) {
        self.line(&format_plan(file, plan));
    }
    fn block_sent(&self, key: &str, index: u64, bytes: u64) {
        self.line(&format!("BLOCK key={} index={} bytes={}", key, index, bytes));
    }
    fn error(&self, step: &str, msg: &str) {
        self.line(&format!("ERROR step={} msg={}", step, msg));
    }
    fn verified(&self, server: &str, local: &str, matches: bool) {
        self.line(&format!("VERIFY server={server} local={local} match={matches}"));
    }
    fn note(&self, msg: &str) {
        self.line(&format!("NOTE {}", msg));
    }
    fn done(&self, metrics: &MetricsSnapshot) {
        self.line(&format_done(metrics));
    }
}

/// Human-facing log lines on stderr; per-block lines are skipped
pub struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn connected(&self, peer: &str) {
        eprintln!("Connected to {}", peer);
    }
    fn login(&self, identifier: &str) {
        eprintln!("Logged in as {}", identifier);
    }
    fn plan(&self, file: &Path, plan: &UploadPlan) {
        eprintln!(
            "Upload plan for {}: key={}, block_size={}, total_block={}",
            file.display(),
            plan.key,
            plan.block_size,
            plan.total_block
        );
    }
    fn error(&self, step: &str, msg: &str) {
        eprintln!("{} failed: {}", step, msg);
    }
    fn verified(&self, server: &str, local: &str, matches: bool) {
        eprintln!("Local MD5:  {}", local);
        eprintln!("Server MD5: {}", server);
        if matches {
            eprintln!("Upload verified successfully!");
        } else {
            eprintln!("MD5 mismatch! Upload may be corrupted.");
        }
    }
    fn note(&self, msg: &str) {
        eprintln!("{}", msg);
    }
}

/// Fans every event out to several loggers
pub struct TeeLogger {
    sinks: Vec<Arc<dyn Logger>>,
}

impl TeeLogger {
    pub fn new(sinks: Vec<Arc<dyn Logger>>) -> Self {
        Self { sinks }
    }
}

impl Logger for TeeLogger {
    fn connected(&self, peer: &str) {
        self.sinks.iter().for_each(|s| s.connected(peer));
    }
    fn login(&self, identifier: &str) {
        self.sinks.iter().for_each(|s| s.login(identifier));
    }
    fn plan(&self, file: &Path, plan: &UploadPlan) {
        self.sinks.iter().for_each(|s| s.plan(file, plan));
    }
    fn block_sent(&self, key: &str, index: u64, bytes: u64) {
        self.sinks.iter().for_each(|s| s.block_sent(key, index, bytes));
    }
    fn error(&self, step: &str, msg: &str) {
        self.sinks.iter().for_each(|s| s.error(step, msg));
    }
    fn verified(&self, server: &str, local: &str, matches: bool) {
        self.sinks.iter().for_each(|s| s.verified(server, local, matches));
    }
    fn note(&self, msg: &str) {
        self.sinks.iter().for_each(|s| s.note(msg));
    }
    fn done(&self, metrics: &MetricsSnapshot) {
        self.sinks.iter().for_each(|s| s.done(metrics));
    }
}
