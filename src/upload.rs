//! Block upload engine
//!
//! Single mode walks the blocks in order over the session connection and
//! stops at the first rejected block. Pooled mode runs W workers, each with
//! its own connection and file handle, pulling indices from one shared
//! `BlockPool`. The first failure anywhere aborts the pool; workers finish
//! their in-flight block and exit.

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::thread;

use crate::auth::Token;
use crate::conn::{Connection, Endpoint};
use crate::logger::Logger;
use crate::metrics::Metrics;
use crate::plan::UploadPlan;
use crate::progress::ProgressSink;
use crate::protocol::{field, request, Operation, ResourceType};
use crate::validate::Expectation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// One shared connection, strict index order
    Single,
    /// Independent connections drawing from a shared index pool
    Pooled { workers: usize },
}

impl ConnectionMode {
    /// W <= 1 is the sequential path
    pub fn from_workers(workers: usize) -> Self {
        if workers <= 1 {
            ConnectionMode::Single
        } else {
            ConnectionMode::Pooled { workers }
        }
    }
}

/// What to upload
#[derive(Clone, Copy)]
pub struct UploadJob<'a> {
    pub plan: &'a UploadPlan,
    pub token: &'a Token,
    pub path: &'a Path,
    pub file_size: u64,
}

/// Observers every worker reports to
#[derive(Clone, Copy)]
pub struct UploadContext<'a> {
    pub metrics: &'a Metrics,
    pub logger: &'a dyn Logger,
    pub progress: &'a dyn ProgressSink,
}

impl UploadContext<'_> {
    fn block_done(&self, key: &str, index: u64, bytes: u64) {
        self.metrics.record_block(bytes);
        self.logger.block_sent(key, index, bytes);
        self.progress.advance(1);
    }
}

struct PoolInner {
    next_index: u64,
    total: u64,
    aborted: bool,
    failure: Option<String>,
}

/// Shared cursor + one-shot abort flag behind a single lock
pub struct BlockPool {
    inner: Mutex<PoolInner>,
}

impl BlockPool {
    pub fn new(total: u64) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                next_index: 0,
                total,
                aborted: false,
                failure: None,
            }),
        }
    }

    /// Hand out the next unclaimed index, or None once exhausted or aborted
    pub fn claim_next(&self) -> Option<u64> {
        let mut p = self.inner.lock();
        if p.aborted || p.next_index >= p.total {
            return None;
        }
        let index = p.next_index;
        p.next_index += 1;
        Some(index)
    }

    /// Set the abort flag; only the first reason is kept
    pub fn abort(&self, reason: String) {
        let mut p = self.inner.lock();
        p.aborted = true;
        if p.failure.is_none() {
            p.failure = Some(reason);
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.lock().aborted
    }

    pub fn failure(&self) -> Option<String> {
        self.inner.lock().failure.clone()
    }
}

fn read_block(file: &mut File, buf: &mut Vec<u8>, len: u64) -> Result<()> {
    buf.resize(len as usize, 0);
    file.read_exact(buf)?;
    Ok(())
}

/// Send one UPLOAD request and check that the server acknowledged this exact block
pub fn send_block(conn: &mut Connection, job: &UploadJob<'_>, index: u64, data: &[u8]) -> Result<()> {
    let key = job.plan.key.as_str();
    let mut req = request(Operation::Upload, ResourceType::File);
    req.insert(field::TOKEN.into(), Value::from(job.token));
    req.insert(field::KEY.into(), Value::from(key));
    req.insert(field::BLOCK_INDEX.into(), Value::from(index));

    let reply = conn
        .exchange(&req, Some(data))
        .with_context(|| format!("UPLOAD block {}", index))?;
    Expectation::new(Operation::Upload, ResourceType::File)
        .require(&[field::KEY, field::BLOCK_INDEX])
        .matching(field::KEY, key)
        .matching(field::BLOCK_INDEX, index)
        .check_reply(&reply)
        .with_context(|| format!("UPLOAD block {} failed", index))?;
    Ok(())
}

/// Upload every block of the plan using the chosen mode
pub fn upload(
    conn: &mut Connection,
    endpoint: &Endpoint,
    job: &UploadJob<'_>,
    mode: ConnectionMode,
    ctx: &UploadContext<'_>,
) -> Result<()> {
    if job.plan.total_block == 0 {
        return Ok(());
    }
    match mode {
        ConnectionMode::Pooled { workers } if workers > 1 => upload_pooled(endpoint, job, workers, ctx),
        _ => upload_sequential(conn, job, ctx),
    }
}

/// Strict-order upload over one connection; fails fast
pub fn upload_sequential(conn: &mut Connection, job: &UploadJob<'_>, ctx: &UploadContext<'_>) -> Result<()> {
    let mut file = File::open(job.path).with_context(|| format!("open {}", job.path.display()))?;
    let mut buf = Vec::new();
    for index in 0..job.plan.total_block {
        let len = job.plan.block_len(index, job.file_size);
        read_block(&mut file, &mut buf, len)
            .with_context(|| format!("read block {} of {}", index, job.path.display()))?;
        if let Err(e) = send_block(conn, job, index, &buf) {
            ctx.metrics.record_failure();
            return Err(e);
        }
        ctx.block_done(&job.plan.key, index, len);
    }
    Ok(())
}

fn pooled_worker(endpoint: &Endpoint, job: &UploadJob<'_>, pool: &BlockPool, ctx: &UploadContext<'_>, id: usize) {
    let mut conn = match endpoint.connect() {
        Ok(c) => c,
        Err(e) => {
            let msg = format!("worker {} connection error: {:#}", id, e);
            ctx.logger.error("UPLOAD", &msg);
            pool.abort(msg);
            return;
        }
    };
    let mut file = match File::open(job.path) {
        Ok(f) => f,
        Err(e) => {
            let msg = format!("worker {} open {}: {}", id, job.path.display(), e);
            ctx.logger.error("UPLOAD", &msg);
            pool.abort(msg);
            conn.close();
            return;
        }
    };

    let mut buf = Vec::new();
    while let Some(index) = pool.claim_next() {
        let offset = job.plan.offset(index);
        let len = job.plan.block_len(index, job.file_size);
        let sent = file
            .seek(SeekFrom::Start(offset))
            .map_err(anyhow::Error::from)
            .and_then(|_| read_block(&mut file, &mut buf, len))
            .with_context(|| format!("read block {} of {}", index, job.path.display()))
            .and_then(|_| send_block(&mut conn, job, index, &buf));
        match sent {
            Ok(()) => ctx.block_done(&job.plan.key, index, len),
            Err(e) => {
                let msg = format!("{:#}", e);
                ctx.metrics.record_failure();
                ctx.logger.error("UPLOAD", &msg);
                pool.abort(msg);
                break;
            }
        }
    }
    conn.close();
}

/// Concurrent upload over `workers` dedicated connections
pub fn upload_pooled(endpoint: &Endpoint, job: &UploadJob<'_>, workers: usize, ctx: &UploadContext<'_>) -> Result<()> {
    let total = job.plan.total_block;
    let pool = BlockPool::new(total);
    // no point holding more connections than blocks
    let count = (workers as u64).min(total).max(1) as usize;

    thread::scope(|s| {
        for id in 0..count {
            let pool = &pool;
            s.spawn(move || pooled_worker(endpoint, job, pool, ctx, id));
        }
    });

    if pool.is_aborted() {
        bail!(
            "parallel upload aborted: {}",
            pool.failure().unwrap_or_else(|| "unknown error".into())
        );
    }
    Ok(())
}
