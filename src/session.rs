//! One file-transfer session: connect, log in, plan, upload, verify, close

use anyhow::{anyhow, Error};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::auth::login;
use crate::conn::Endpoint;
use crate::logger::Logger;
use crate::metrics::{Metrics, MetricsSnapshot, Phase};
use crate::plan::{basename, request_plan};
use crate::progress::ProgressSink;
use crate::upload::{upload, ConnectionMode, UploadContext, UploadJob};
use crate::verify::{verify, Verification};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Authenticated,
    Planned,
    Uploading,
    Verified,
    Failed,
    Closed,
}

/// Step a session failed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Open,
    Connect,
    Login,
    Save,
    Upload,
    Verify,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Open => "OPEN",
            Step::Connect => "CONNECT",
            Step::Login => "LOGIN",
            Step::Save => "SAVE",
            Step::Upload => "UPLOAD",
            Step::Verify => "GET",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Upload acknowledged and both digests collected; they may still differ
    Verified(Verification),
    Failed { step: Step, reason: String },
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub file: PathBuf,
    pub key: Option<String>,
    pub outcome: Outcome,
    /// Every state the session passed through, in order
    pub trail: Vec<SessionState>,
    pub metrics: MetricsSnapshot,
}

impl SessionReport {
    /// Verified with equal digests
    pub fn succeeded(&self) -> bool {
        matches!(&self.outcome, Outcome::Verified(v) if v.matches())
    }

    pub fn digests_match(&self) -> Option<bool> {
        match &self.outcome {
            Outcome::Verified(v) => Some(v.matches()),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<(Step, &str)> {
        match &self.outcome {
            Outcome::Failed { step, reason } => Some((*step, reason.as_str())),
            Outcome::Verified(_) => None,
        }
    }

    pub fn final_state(&self) -> SessionState {
        self.trail.last().copied().unwrap_or(SessionState::Disconnected)
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: Endpoint,
    pub identifier: String,
    pub block_workers: usize,
}

struct Failure {
    step: Step,
    error: Error,
}

fn at(step: Step) -> impl FnOnce(Error) -> Failure {
    move |error| Failure { step, error }
}

pub struct Session<'a> {
    config: &'a SessionConfig,
    logger: &'a dyn Logger,
    progress: &'a dyn ProgressSink,
    trail: Vec<SessionState>,
    key: Option<String>,
}

impl<'a> Session<'a> {
    pub fn new(config: &'a SessionConfig, logger: &'a dyn Logger, progress: &'a dyn ProgressSink) -> Self {
        Self {
            config,
            logger,
            progress,
            trail: vec![SessionState::Disconnected],
            key: None,
        }
    }

    fn enter(&mut self, state: SessionState) {
        self.trail.push(state);
    }

    /// Run the whole session. Never panics on protocol errors; the transport
    /// is released on every path before the report is built.
    pub fn run(mut self, path: &Path) -> SessionReport {
        let start = Instant::now();
        let metrics = Metrics::new(&self.config.endpoint.to_string(), &self.config.identifier, path, 0);

        let outcome = match self.drive(path, &metrics) {
            Ok(v) => {
                self.enter(SessionState::Verified);
                Outcome::Verified(v)
            }
            Err(Failure { step, error }) => {
                let reason = format!("{:#}", error);
                self.logger.error(step.as_str(), &reason);
                self.enter(SessionState::Failed);
                Outcome::Failed { step, reason }
            }
        };
        self.enter(SessionState::Closed);

        let snapshot = metrics.finalize(start.elapsed());
        self.logger.done(&snapshot);
        SessionReport {
            file: path.to_path_buf(),
            key: self.key,
            outcome,
            trail: self.trail,
            metrics: snapshot,
        }
    }

    fn drive(&mut self, path: &Path, metrics: &Metrics) -> Result<Verification, Failure> {
        let meta = std::fs::metadata(path)
            .map_err(|e| anyhow!("file '{}' does not exist or is unreadable: {}", path.display(), e))
            .map_err(at(Step::Open))?;
        if !meta.is_file() {
            return Err(at(Step::Open)(anyhow!("'{}' is not a regular file", path.display())));
        }
        let file_size = meta.len();
        metrics.set_file_size(file_size);

        let t = Instant::now();
        let mut conn = self.config.endpoint.connect().map_err(at(Step::Connect))?;
        metrics.record_phase(Phase::Connect, t.elapsed());
        self.logger.connected(conn.peer());
        self.enter(SessionState::Connected);

        let t = Instant::now();
        let token = login(&mut conn, &self.config.identifier).map_err(at(Step::Login))?;
        metrics.record_phase(Phase::Login, t.elapsed());
        self.logger.login(&self.config.identifier);
        self.enter(SessionState::Authenticated);

        let t = Instant::now();
        let plan = request_plan(&mut conn, &token, path, file_size).map_err(at(Step::Save))?;
        metrics.record_phase(Phase::Plan, t.elapsed());
        metrics.set_plan(&plan);
        self.logger.plan(path, &plan);
        if !plan.covers(file_size) {
            self.logger.note(&format!(
                "warning: plan {}x{} does not partition {} bytes exactly",
                plan.total_block, plan.block_size, file_size
            ));
        }
        self.key = Some(plan.key.clone());
        self.enter(SessionState::Planned);

        self.enter(SessionState::Uploading);
        let job = UploadJob {
            plan: &plan,
            token: &token,
            path,
            file_size,
        };
        let ctx = UploadContext {
            metrics,
            logger: self.logger,
            progress: self.progress,
        };
        let mode = ConnectionMode::from_workers(self.config.block_workers);
        self.progress.begin(&basename(path), plan.total_block);
        let t = Instant::now();
        let uploaded = upload(&mut conn, &self.config.endpoint, &job, mode, &ctx);
        metrics.record_phase(Phase::Upload, t.elapsed());
        self.progress.finish();
        uploaded.map_err(at(Step::Upload))?;

        let t = Instant::now();
        let v = verify(&mut conn, &token, &plan.key, path).map_err(at(Step::Verify))?;
        metrics.record_phase(Phase::Verify, t.elapsed());
        self.logger.verified(&v.server, &v.local, v.matches());

        conn.close();
        Ok(v)
    }
}

/// Run a session, retrying the whole session up to `retries` more times
/// when it fails. Digest mismatches are final.
pub fn upload_file(
    config: &SessionConfig,
    path: &Path,
    logger: &dyn Logger,
    progress: &dyn ProgressSink,
    retries: u32,
) -> SessionReport {
    let mut attempt = 0;
    loop {
        let report = Session::new(config, logger, progress).run(path);
        let retryable = matches!(
            report.failure(),
            Some((step, _)) if step != Step::Open
        );
        if !retryable || attempt >= retries {
            return report;
        }
        attempt += 1;
        logger.note(&format!(
            "retrying session for {} ({}/{})",
            path.display(),
            attempt,
            retries
        ));
    }
}
