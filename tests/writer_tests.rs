// Stats writer tests: merged updates reach SQLite, shutdown drains the channel

mod common;

use common::{ScriptedFetcher, descriptor, online, stats};
use mcstatus::registry::StaticRegistry;
use mcstatus::scheduler::{MonitorConfig, StatusMonitor};
use mcstatus::stats_repo::StatsRepo;
use mcstatus::writer::{StatsWriterConfig, spawn_stats_writer};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

async fn open_repo(dir: &TempDir) -> Arc<StatsRepo> {
    let path = dir.path().join("stats.db");
    let repo = StatsRepo::connect(path.to_str().unwrap(), 7).await.unwrap();
    repo.init().await.unwrap();
    Arc::new(repo)
}

async fn wait_for(counter: &AtomicU64, expected: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while counter.load(Ordering::SeqCst) < expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {expected} saved updates"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn writer_persists_merged_updates() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir).await;
    let fetcher = Arc::new(ScriptedFetcher::new(vec![
        Ok(stats(&[("a", online(4, 20))])),
        Ok(stats(&[("a", online(6, 20))])),
    ]));
    let registry = Arc::new(StaticRegistry::new(vec![descriptor("a")]));
    let monitor = StatusMonitor::new(fetcher, registry, MonitorConfig::default());

    let saved = Arc::new(AtomicU64::new(0));
    let shutdown = CancellationToken::new();
    let handle = spawn_stats_writer(
        monitor.handle().subscribe(),
        repo.clone(),
        StatsWriterConfig {
            prune_interval_secs: 3600,
        },
        saved.clone(),
        shutdown.clone(),
    );

    monitor.poll_once().await;
    monitor.poll_once().await;
    wait_for(&saved, 2).await;

    let latest = repo.load_latest().await.unwrap();
    assert_eq!(latest.get("a").unwrap().online_players, 6);
    assert_eq!(repo.get_history("a", 10).await.unwrap().len(), 2);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn writer_exits_when_monitor_is_dropped() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir).await;
    let fetcher = Arc::new(ScriptedFetcher::default());
    let registry = Arc::new(StaticRegistry::new(vec![]));
    let monitor = StatusMonitor::new(fetcher, registry, MonitorConfig::default());

    let handle = spawn_stats_writer(
        monitor.handle().subscribe(),
        repo,
        StatsWriterConfig {
            prune_interval_secs: 3600,
        },
        Arc::new(AtomicU64::new(0)),
        CancellationToken::new(),
    );
    drop(monitor);

    tokio::time::timeout(Duration::from_secs(3), handle)
        .await
        .expect("writer should stop once the channel closes")
        .unwrap();
}

#[tokio::test]
async fn writer_drains_pending_updates_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir).await;
    let fetcher = Arc::new(ScriptedFetcher::new(vec![Ok(stats(&[("a", online(2, 20))]))]));
    let registry = Arc::new(StaticRegistry::new(vec![descriptor("a")]));
    let monitor = StatusMonitor::new(fetcher, registry, MonitorConfig::default());
    let rx = monitor.handle().subscribe();

    // Merge before the writer runs, then cancel right away.
    monitor.poll_once().await;
    let saved = Arc::new(AtomicU64::new(0));
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let handle = spawn_stats_writer(
        rx,
        repo.clone(),
        StatsWriterConfig {
            prune_interval_secs: 3600,
        },
        saved.clone(),
        shutdown,
    );
    handle.await.unwrap();

    assert_eq!(saved.load(Ordering::SeqCst), 1);
    assert!(repo.load_latest().await.unwrap().contains("a"));
}

#[tokio::test]
async fn writer_shutdown_drain_continues_past_lag() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir).await;
    let fetcher = Arc::new(ScriptedFetcher::new(vec![
        Ok(stats(&[("a", online(1, 20))])),
        Ok(stats(&[("a", online(2, 20))])),
        Ok(stats(&[("a", online(3, 20))])),
    ]));
    let registry = Arc::new(StaticRegistry::new(vec![descriptor("a")]));
    let config = MonitorConfig {
        broadcast_capacity: 1,
        ..MonitorConfig::default()
    };
    let monitor = StatusMonitor::new(fetcher, registry, config);
    let rx = monitor.handle().subscribe();

    // Capacity 1: the first two updates are overwritten before the writer reads.
    monitor.poll_once().await;
    monitor.poll_once().await;
    monitor.poll_once().await;

    let saved = Arc::new(AtomicU64::new(0));
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let handle = spawn_stats_writer(
        rx,
        repo.clone(),
        StatsWriterConfig {
            prune_interval_secs: 3600,
        },
        saved.clone(),
        shutdown,
    );
    handle.await.unwrap();

    assert_eq!(saved.load(Ordering::SeqCst), 1);
    let latest = repo.load_latest().await.unwrap();
    assert_eq!(latest.get("a").unwrap().online_players, 3);
}
