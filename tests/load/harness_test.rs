use std::sync::Arc;
use std::time::{Duration, Instant};

use fetch_probe::profiler::ProfileOutcome;
use fetch_probe::store::{DocumentStore, MemoryConnector, MemoryStore};
use fetch_probe::{Harness, ProbeError};

use super::support::{small_config, RecordingSampler};

fn lines(out: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(out).lines().map(str::to_string).collect()
}

/// Test: five documents, three concurrent reads, profile exported once.
#[tokio::test]
async fn test_end_to_end_small_run() {
    let cfg = small_config(5, 3);
    let profile_path = cfg.profile.output_path();
    let connector = MemoryConnector::new(Arc::new(MemoryStore::new()));
    let sampler = Arc::new(RecordingSampler::default());
    let mut out = Vec::new();

    let report = Harness::new(cfg.clone())
        .run(&connector, sampler.clone(), &mut out, std::future::pending())
        .await
        .expect("run should succeed");

    assert_eq!(report.fixture_documents, 5);
    assert_eq!(report.load.documents_per_request, vec![5, 5, 5]);
    assert_eq!(report.label, "fetch 5 docs 3 times in parallel (mongodb driver 3)");
    assert!(report.elapsed > Duration::ZERO);

    let printed = lines(&out);
    assert_eq!(printed.len(), 1, "exactly one timing line: {printed:?}");
    assert!(printed[0].starts_with(&format!("{}: ", report.label)));

    assert_eq!(sampler.starts(), 1);
    assert_eq!(sampler.exports(), 1);
    assert_eq!(report.profile, ProfileOutcome::Written(profile_path.clone()));
    assert_eq!(
        std::fs::read(&profile_path).unwrap(),
        format!("profile:{}", cfg.profile.label).into_bytes()
    );

    assert_eq!(connector.connects(), 1);
    assert_eq!(connector.closes(), 1);
    assert!(!connector.is_open());
    assert_eq!(connector.store().count("test").await.unwrap(), 5);

    let _ = std::fs::remove_dir_all(&cfg.profile.output_dir);
}

/// Test: a refused connection never touches the fixture but still closes.
#[tokio::test]
async fn test_connect_failure_skips_fixture_and_closes() {
    let cfg = small_config(5, 3);
    let connector = MemoryConnector::refusing(Arc::new(MemoryStore::new()));
    let sampler = Arc::new(RecordingSampler::default());
    let mut out = Vec::new();

    let err = Harness::new(cfg)
        .run(&connector, sampler.clone(), &mut out, std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(err, ProbeError::Connect(_)), "got {err:?}");
    assert_eq!(err.phase(), "connect");
    let calls = connector.store().calls();
    assert_eq!(calls.drops, 0);
    assert_eq!(calls.inserts, 0);
    assert_eq!(connector.closes(), 1);
    assert_eq!(sampler.starts(), 0);
    assert!(out.is_empty());
}

/// Test: one failing read fails the whole batch.
#[tokio::test]
async fn test_single_failed_read_fails_run() {
    let cfg = small_config(5, 3);
    let store = Arc::new(MemoryStore::new().failing_find(2));
    let connector = MemoryConnector::new(store.clone());
    let sampler = Arc::new(RecordingSampler::default());
    let mut out = Vec::new();

    let err = Harness::new(cfg.clone())
        .run(&connector, sampler.clone(), &mut out, std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(err, ProbeError::Load(_)), "got {err:?}");
    assert!(out.is_empty(), "no timing line on failure");
    assert_eq!(store.calls().finds, 3);
    assert_eq!(connector.closes(), 1);
    // The scheduled export still happens once.
    assert_eq!(sampler.exports(), 1);

    let _ = std::fs::remove_dir_all(&cfg.profile.output_dir);
}

/// Test: the timed span covers the slowest read, and concurrent reads are
/// measurably faster than running them back to back.
#[tokio::test]
async fn test_elapsed_bounds_concurrent_reads() {
    let latency = Duration::from_millis(100);
    let requests = 4;
    let cfg = small_config(5, requests);
    let store = Arc::new(MemoryStore::new().with_find_latency(latency));
    let connector = MemoryConnector::new(store.clone());
    let sampler = Arc::new(RecordingSampler::default());
    let mut out = Vec::new();

    let isolated = {
        let started = Instant::now();
        store.find_all("isolated").await.unwrap();
        started.elapsed()
    };

    let report = Harness::new(cfg.clone())
        .run(&connector, sampler, &mut out, std::future::pending())
        .await
        .unwrap();

    assert!(report.elapsed >= isolated, "{:?} < {:?}", report.elapsed, isolated);
    assert!(report.elapsed >= report.load.slowest);
    assert!(report.load.slowest >= latency);
    assert!(
        report.elapsed < latency * requests as u32,
        "reads looked sequential: {:?}",
        report.elapsed
    );

    let _ = std::fs::remove_dir_all(&cfg.profile.output_dir);
}

/// Test: a failed profile export is reported but does not fail the run.
#[tokio::test]
async fn test_export_failure_is_isolated() {
    let cfg = small_config(5, 3);
    let connector = MemoryConnector::new(Arc::new(MemoryStore::new()));
    let sampler = Arc::new(RecordingSampler::failing_export());
    let mut out = Vec::new();

    let report = Harness::new(cfg.clone())
        .run(&connector, sampler.clone(), &mut out, std::future::pending())
        .await
        .expect("export failure must not fail the run");

    assert_eq!(lines(&out).len(), 1);
    assert_eq!(sampler.exports(), 1);
    assert!(matches!(report.profile, ProfileOutcome::Failed(ref msg) if msg.contains("simulated")));
    assert!(!cfg.profile.output_path().exists());
}

/// Test: a shutdown while waiting abandons the profile instead of hanging.
#[tokio::test]
async fn test_shutdown_abandons_long_profile() {
    let mut cfg = small_config(5, 2);
    cfg.profile.duration_ms = 60_000;
    let connector = MemoryConnector::new(Arc::new(MemoryStore::new()));
    let sampler = Arc::new(RecordingSampler::default());
    let mut out = Vec::new();

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        Harness::new(cfg.clone()).run(&connector, sampler, &mut out, async {}),
    )
    .await
    .expect("run must not wait for the full profile")
    .unwrap();

    assert_eq!(report.profile, ProfileOutcome::Abandoned);
    assert_eq!(lines(&out).len(), 1);
    assert!(!cfg.profile.output_path().exists());
}
