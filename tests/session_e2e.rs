mod common;

use anyhow::Result;
use std::collections::HashSet;

use common::{write_file, Behavior, MockServer};
use step_client::auth::login;
use step_client::conn::Endpoint;
use step_client::logger::NoopLogger;
use step_client::plan::request_plan;
use step_client::progress::NoProgress;
use step_client::{upload_file, Outcome, Session, SessionConfig, SessionState, Step};

fn behavior(block_size: u64) -> Behavior {
    Behavior {
        block_size,
        ..Default::default()
    }
}

fn config(server: &MockServer, workers: usize) -> SessionConfig {
    SessionConfig {
        endpoint: Endpoint::new("127.0.0.1", server.port),
        identifier: "ID2024".into(),
        block_workers: workers,
    }
}

#[test]
fn login_and_plan_for_ten_bytes() -> Result<()> {
    let server = MockServer::start(behavior(4));
    let dir = tempfile::tempdir()?;
    let path = write_file(dir.path(), "ten.bin", 10);

    let mut conn = Endpoint::new("127.0.0.1", server.port).connect()?;
    let token = login(&mut conn, "ID2024")?;
    assert!(!token.as_str().is_empty());

    let plan = request_plan(&mut conn, &token, &path, 10)?;
    assert_eq!(plan.key, "ten.bin");
    assert_eq!(plan.block_size, 4);
    assert_eq!(plan.total_block, 3);
    let sizes: Vec<u64> = (0..plan.total_block).map(|i| plan.block_len(i, 10)).collect();
    assert_eq!(sizes, vec![4, 4, 2]);
    Ok(())
}

#[test]
fn sequential_upload_verifies() -> Result<()> {
    let server = MockServer::start(behavior(4));
    let dir = tempfile::tempdir()?;
    let path = write_file(dir.path(), "ten.bin", 10);

    let cfg = config(&server, 1);
    let report = Session::new(&cfg, &NoopLogger, &NoProgress).run(&path);

    assert!(report.succeeded(), "outcome: {:?}", report.outcome);
    assert_eq!(
        report.trail,
        vec![
            SessionState::Disconnected,
            SessionState::Connected,
            SessionState::Authenticated,
            SessionState::Planned,
            SessionState::Uploading,
            SessionState::Verified,
            SessionState::Closed,
        ]
    );
    assert_eq!(server.received(), vec![0, 1, 2]);
    assert_eq!(server.stored("ten.bin"), std::fs::read(&path)?);
    assert_eq!(server.connections(), 1);

    let m = &report.metrics;
    assert_eq!(m.blocks_sent, 3);
    assert_eq!(m.bytes_sent, 10);
    assert_eq!(m.block_failures, 0);
    assert_eq!(m.total_blocks, Some(3));
    assert!(m.upload_seconds.is_some());
    assert!(m.verify_seconds.is_some());
    assert_eq!(report.key.as_deref(), Some("ten.bin"));
    Ok(())
}

#[test]
fn pooled_upload_sends_every_index_once() -> Result<()> {
    let server = MockServer::start(behavior(4));
    let dir = tempfile::tempdir()?;
    let path = write_file(dir.path(), "forty.bin", 38);

    let cfg = config(&server, 4);
    let report = Session::new(&cfg, &NoopLogger, &NoProgress).run(&path);
    assert!(report.succeeded(), "outcome: {:?}", report.outcome);

    let received = server.received();
    assert_eq!(received.len(), 10);
    let unique: HashSet<u64> = received.iter().copied().collect();
    assert_eq!(unique, (0..10).collect::<HashSet<_>>());
    assert_eq!(server.stored("forty.bin"), std::fs::read(&path)?);
    // session connection + one per worker
    assert_eq!(server.connections(), 5);
    assert_eq!(report.metrics.blocks_sent, 10);
    assert_eq!(report.metrics.bytes_sent, 38);
    Ok(())
}

#[test]
fn pooled_workers_capped_by_block_count() -> Result<()> {
    let server = MockServer::start(behavior(4));
    let dir = tempfile::tempdir()?;
    let path = write_file(dir.path(), "small.bin", 10);

    let cfg = config(&server, 8);
    let report = Session::new(&cfg, &NoopLogger, &NoProgress).run(&path);
    assert!(report.succeeded());
    assert_eq!(server.connections(), 1 + 3);
    Ok(())
}

#[test]
fn sequential_rejection_stops_at_failed_block() -> Result<()> {
    let server = MockServer::start(Behavior {
        block_size: 4,
        reject_block: Some(2),
        ..Default::default()
    });
    let dir = tempfile::tempdir()?;
    let path = write_file(dir.path(), "five.bin", 20);

    let cfg = config(&server, 1);
    let report = Session::new(&cfg, &NoopLogger, &NoProgress).run(&path);

    let (step, reason) = report.failure().expect("upload should fail");
    assert_eq!(step, Step::Upload);
    assert!(reason.contains("UPLOAD block 2 failed"), "reason: {}", reason);
    assert!(reason.contains("status 408 != 200: Block rejected"), "reason: {}", reason);
    assert_eq!(server.received(), vec![0, 1, 2]);
    assert_eq!(
        &report.trail[report.trail.len() - 2..],
        &[SessionState::Failed, SessionState::Closed]
    );
    assert!(!report.trail.contains(&SessionState::Verified));
    assert_eq!(report.metrics.blocks_sent, 2);
    assert_eq!(report.metrics.block_failures, 1);
    assert_eq!(report.metrics.verify_seconds, None);
    Ok(())
}

#[test]
fn pooled_rejection_aborts_all_workers() -> Result<()> {
    let server = MockServer::start(Behavior {
        block_size: 4,
        reject_block: Some(5),
        ..Default::default()
    });
    let dir = tempfile::tempdir()?;
    let path = write_file(dir.path(), "many.bin", 4 * 200);

    let cfg = config(&server, 3);
    let report = Session::new(&cfg, &NoopLogger, &NoProgress).run(&path);

    let (step, reason) = report.failure().expect("upload should fail");
    assert_eq!(step, Step::Upload);
    assert!(reason.contains("parallel upload aborted"), "reason: {}", reason);

    let received = server.received();
    let unique: HashSet<u64> = received.iter().copied().collect();
    assert_eq!(unique.len(), received.len(), "an index was sent twice");
    assert!(unique.contains(&5));
    assert!(received.len() < 200);
    assert_eq!(report.metrics.block_failures, 1);
    assert_eq!(report.metrics.blocks_sent as usize, received.len() - 1);
    Ok(())
}

#[test]
fn digest_mismatch_is_integrity_outcome() -> Result<()> {
    let server = MockServer::start(Behavior {
        block_size: 4,
        corrupt_digest: true,
        ..Default::default()
    });
    let dir = tempfile::tempdir()?;
    let path = write_file(dir.path(), "ten.bin", 10);

    let cfg = config(&server, 1);
    let report = Session::new(&cfg, &NoopLogger, &NoProgress).run(&path);

    assert!(matches!(report.outcome, Outcome::Verified(_)));
    assert_eq!(report.digests_match(), Some(false));
    assert!(!report.succeeded());
    assert!(report.trail.contains(&SessionState::Verified));
    assert_eq!(report.final_state(), SessionState::Closed);
    Ok(())
}

#[test]
fn empty_file_uploads_no_blocks() -> Result<()> {
    let server = MockServer::start(behavior(4));
    let dir = tempfile::tempdir()?;
    let path = write_file(dir.path(), "empty.bin", 0);

    for workers in [1, 4] {
        let cfg = config(&server, workers);
        let report = Session::new(&cfg, &NoopLogger, &NoProgress).run(&path);
        assert!(report.succeeded(), "outcome: {:?}", report.outcome);
        assert_eq!(report.metrics.blocks_sent, 0);
        assert_eq!(report.metrics.total_blocks, Some(0));
    }
    assert!(server.received().is_empty());
    // no worker connections for an empty plan
    assert_eq!(server.connections(), 2);
    Ok(())
}

#[test]
fn login_rejection_fails_session() -> Result<()> {
    let server = MockServer::start(Behavior {
        block_size: 4,
        reject_logins: usize::MAX,
        ..Default::default()
    });
    let dir = tempfile::tempdir()?;
    let path = write_file(dir.path(), "ten.bin", 10);

    let cfg = config(&server, 1);
    let report = Session::new(&cfg, &NoopLogger, &NoProgress).run(&path);
    let (step, reason) = report.failure().expect("login should fail");
    assert_eq!(step, Step::Login);
    assert!(reason.contains("status 401 != 200"), "reason: {}", reason);
    assert_eq!(
        report.trail,
        vec![
            SessionState::Disconnected,
            SessionState::Connected,
            SessionState::Failed,
            SessionState::Closed,
        ]
    );
    Ok(())
}

#[test]
fn peer_closing_mid_upload_is_reported() -> Result<()> {
    let server = MockServer::start(Behavior {
        block_size: 4,
        drop_on_block: Some(1),
        ..Default::default()
    });
    let dir = tempfile::tempdir()?;
    let path = write_file(dir.path(), "ten.bin", 10);

    let cfg = config(&server, 1);
    let report = Session::new(&cfg, &NoopLogger, &NoProgress).run(&path);
    let (step, reason) = report.failure().expect("upload should fail");
    assert_eq!(step, Step::Upload);
    assert!(reason.contains("no response from server"), "reason: {}", reason);
    assert_eq!(report.metrics.blocks_sent, 1);
    Ok(())
}

#[test]
fn whole_session_retry_recovers() -> Result<()> {
    let server = MockServer::start(Behavior {
        block_size: 4,
        reject_logins: 1,
        ..Default::default()
    });
    let dir = tempfile::tempdir()?;
    let path = write_file(dir.path(), "ten.bin", 10);

    let cfg = config(&server, 2);
    let report = upload_file(&cfg, &path, &NoopLogger, &NoProgress, 1);
    assert!(report.succeeded(), "outcome: {:?}", report.outcome);
    assert_eq!(server.state.lock().logins, 2);
    Ok(())
}

#[test]
fn server_block_size_above_read_cap_is_honoured() -> Result<()> {
    let block = 80 * 1024 * 1024;
    let size = step_client::protocol::MAX_FRAME_SIZE + 1;
    let server = MockServer::start(behavior(block));
    let dir = tempfile::tempdir()?;
    let path = write_file(dir.path(), "large.bin", size);

    let cfg = config(&server, 1);
    let report = Session::new(&cfg, &NoopLogger, &NoProgress).run(&path);

    assert!(report.succeeded(), "outcome: {:?}", report.outcome);
    assert_eq!(report.metrics.total_blocks, Some(1));
    assert_eq!(report.metrics.block_size_bytes, Some(block));
    assert_eq!(report.metrics.bytes_sent, size as u64);
    assert_eq!(server.received(), vec![0]);
    Ok(())
}

#[test]
fn worker_connect_failure_aborts_pool() -> Result<()> {
    let server = MockServer::start(Behavior {
        block_size: 4,
        max_connections: Some(1),
        ..Default::default()
    });
    let dir = tempfile::tempdir()?;
    let path = write_file(dir.path(), "ten.bin", 10);

    let cfg = config(&server, 3);
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let report = Session::new(&cfg, &NoopLogger, &NoProgress).run(&path);
        let _ = tx.send(report);
    });
    let report = rx
        .recv_timeout(std::time::Duration::from_secs(30))
        .expect("pooled upload did not finish");

    let (step, reason) = report.failure().expect("upload should fail");
    assert_eq!(step, Step::Upload);
    assert!(reason.contains("parallel upload aborted"), "reason: {}", reason);
    assert!(reason.contains("connection error"), "reason: {}", reason);
    assert!(server.received().is_empty());
    assert_eq!(server.connections(), 1);
    assert_eq!(report.final_state(), SessionState::Closed);
    Ok(())
}
