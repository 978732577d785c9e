//! Thread-safe session metrics

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::plan::UploadPlan;

/// Timed session phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Login,
    Plan,
    Upload,
    Verify,
}

/// Plain copy of the aggregate, safe to hand out and serialize
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub server: String,
    pub identifier: String,
    pub file_path: String,
    pub file_size_bytes: u64,
    pub block_size_bytes: Option<u64>,
    pub total_blocks: Option<u64>,
    pub blocks_sent: u64,
    pub bytes_sent: u64,
    pub block_failures: u64,
    pub connect_seconds: Option<f64>,
    pub login_seconds: Option<f64>,
    pub plan_seconds: Option<f64>,
    pub upload_seconds: Option<f64>,
    pub verify_seconds: Option<f64>,
    pub total_seconds: Option<f64>,
    /// MB/s over the upload phase (2^20 bytes per MB)
    pub throughput_mbps: Option<f64>,
}

impl MetricsSnapshot {
    pub fn file_size_mb(&self) -> f64 {
        self.file_size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Session-owned aggregate; workers write through `&Metrics`
#[derive(Debug, Default)]
pub struct Metrics {
    inner: Mutex<MetricsSnapshot>,
}

impl Metrics {
    pub fn new(server: &str, identifier: &str, file: &Path, file_size: u64) -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot {
                server: server.to_string(),
                identifier: identifier.to_string(),
                file_path: file.display().to_string(),
                file_size_bytes: file_size,
                ..Default::default()
            }),
        }
    }

    pub fn set_file_size(&self, bytes: u64) {
        self.inner.lock().file_size_bytes = bytes;
    }

    pub fn set_plan(&self, plan: &UploadPlan) {
        let mut m = self.inner.lock();
        m.block_size_bytes = Some(plan.block_size);
        m.total_blocks = Some(plan.total_block);
    }

    pub fn record_block(&self, bytes: u64) {
        let mut m = self.inner.lock();
        m.blocks_sent += 1;
        m.bytes_sent += bytes;
    }

    pub fn record_failure(&self) {
        self.inner.lock().block_failures += 1;
    }

    pub fn record_phase(&self, phase: Phase, elapsed: Duration) {
        let secs = Some(elapsed.as_secs_f64());
        let mut m = self.inner.lock();
        match phase {
            Phase::Connect => m.connect_seconds = secs,
            Phase::Login => m.login_seconds = secs,
            Phase::Plan => m.plan_seconds = secs,
            Phase::Upload => m.upload_seconds = secs,
            Phase::Verify => m.verify_seconds = secs,
        }
    }

    /// Stamp the total time and compute throughput; returns the final record
    pub fn finalize(&self, total: Duration) -> MetricsSnapshot {
        let mut m = self.inner.lock();
        m.total_seconds = Some(total.as_secs_f64());
        m.throughput_mbps = match m.upload_seconds {
            Some(secs) if secs > 0.0 => Some(m.file_size_mb() / secs),
            _ => None,
        };
        m.clone()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().clone()
    }
}
