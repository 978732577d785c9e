//! step-client - upload files to a STEP server
//!
//! One session per file: login, SAVE plan, block upload (sequential or
//! pooled), GET verification. A summary table closes multi-file runs.

use anyhow::{bail, Result};
use clap::Parser;
use std::sync::Arc;

use step_client::config::ClientConfig;
use step_client::log::{SessionLog, SessionLogEntry};
use step_client::logger::{ConsoleLogger, Logger, TeeLogger, TextLogger};
use step_client::metrics::MetricsSnapshot;
use step_client::progress::{BarProgress, NoProgress, ProgressSink};
use step_client::{upload_file, Args, Outcome, SessionReport};

fn main() -> Result<()> {
    // Set up Ctrl-C handler
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // Exit immediately with 130 (128 + SIGINT)
        std::process::exit(130);
    })
    .expect("Error setting Ctrl-C handler");

    let args = Args::parse();
    let cfg = ClientConfig::from_args(&args)?;

    // Choose loggers once
    let mut sinks: Vec<Arc<dyn Logger>> = Vec::new();
    if !cfg.quiet {
        sinks.push(Arc::new(ConsoleLogger));
    }
    if let Some(ref p) = cfg.log_file {
        match TextLogger::new(p) {
            Ok(l) => sinks.push(Arc::new(l)),
            Err(e) => eprintln!("warning: cannot open log file {}: {}", p.display(), e),
        }
    }
    let logger = TeeLogger::new(sinks);
    let progress: Box<dyn ProgressSink> = if cfg.progress {
        Box::new(BarProgress::new())
    } else {
        Box::new(NoProgress)
    };
    let session_log = cfg.json_log.as_deref().map(SessionLog::new);
    let session_cfg = cfg.session();

    if cfg.files.len() > 1 && !cfg.quiet {
        println!(
            "Starting multi-upload: files={}, block_workers={}",
            cfg.files.len(),
            cfg.block_workers
        );
    }

    let mut reports = Vec::with_capacity(cfg.files.len());
    for path in &cfg.files {
        logger.note(&format!("Uploading {} to {}", path.display(), cfg.endpoint));
        let report = upload_file(&session_cfg, path, &logger, progress.as_ref(), cfg.retries);
        print_result(&report);
        if let Some(log) = &session_log {
            if let Err(e) = log.add_entry(&SessionLogEntry::from_report(&report)) {
                eprintln!("warning: cannot write session log: {:#}", e);
            }
        }
        reports.push(report);
    }

    if reports.len() > 1 {
        print_summary(&reports);
    }

    let failed = reports.iter().filter(|r| !r.succeeded()).count();
    if failed > 0 {
        bail!("{} of {} uploads did not verify", failed, reports.len());
    }
    Ok(())
}

fn print_result(report: &SessionReport) {
    match &report.outcome {
        Outcome::Verified(v) if v.matches() => {
            println!("{}: verified (md5 {})", report.file.display(), v.local);
        }
        Outcome::Verified(v) => {
            println!(
                "{}: MD5 MISMATCH (local {}, server {})",
                report.file.display(),
                v.local,
                v.server
            );
        }
        Outcome::Failed { step, reason } => {
            println!("{}: {} failed: {}", report.file.display(), step, reason);
            let m = &report.metrics;
            println!(
                "  partial: {} blocks, {} bytes sent, {} block failures",
                m.blocks_sent, m.bytes_sent, m.block_failures
            );
        }
    }
}

fn fmt_opt(v: Option<f64>, prec: usize) -> String {
    v.map(|x| format!("{:.*}", prec, x)).unwrap_or_else(|| "-".into())
}

fn status_label(report: &SessionReport) -> &'static str {
    match report.digests_match() {
        Some(true) => "OK",
        Some(false) => "MISMATCH",
        None => "FAILED",
    }
}

fn print_summary(reports: &[SessionReport]) {
    let headers = ["File", "Size (MB)", "Upload Time (s)", "Throughput (MB/s)", "Status"];
    let widths = [
        reports
            .iter()
            .map(|r| r.file.display().to_string().len())
            .max()
            .unwrap_or(0)
            .max(20),
        12,
        16,
        18,
        10,
    ];
    let row = |cells: [String; 5]| -> String {
        cells
            .iter()
            .zip(widths.iter())
            .map(|(c, w)| format!("{:<w$}", c, w = *w))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    println!("\nSummary:");
    println!("{}", row(headers.map(String::from)));
    println!(
        "{}",
        widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-")
    );
    for r in reports {
        let m: &MetricsSnapshot = &r.metrics;
        println!(
            "{}",
            row([
                r.file.display().to_string(),
                format!("{:.2}", m.file_size_mb()),
                fmt_opt(m.upload_seconds, 3),
                fmt_opt(m.throughput_mbps, 2),
                status_label(r).to_string(),
            ])
        );
    }
}
