// StatsRepo tests: connect, init, save, load_latest, history, prune

mod common;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use common::{online, stats};
use mcstatus::models::*;
use mcstatus::stats_repo::StatsRepo;
use tempfile::TempDir;

async fn open_repo(dir: &TempDir) -> StatsRepo {
    let path = dir.path().join("stats.db");
    let repo = StatsRepo::connect(path.to_str().unwrap(), 7).await.unwrap();
    repo.init().await.unwrap();
    repo
}

fn update_at(timestamp: chrono::DateTime<Utc>, entries: StatsMap) -> StatsUpdate {
    StatsUpdate {
        timestamp,
        stats: entries,
    }
}

#[tokio::test]
async fn stats_repo_connect_and_init() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir).await;
    // Second init is no-op (IF NOT EXISTS)
    repo.init().await.unwrap();
    assert!(repo.load_latest().await.unwrap().is_empty());
}

#[tokio::test]
async fn stats_repo_creates_parent_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("deeper").join("stats.db");
    let repo = StatsRepo::connect(path.to_str().unwrap(), 7).await.unwrap();
    repo.init().await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn stats_repo_save_and_load_latest() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir).await;

    let mut first = online(3, 20);
    first.player_list = vec!["alice".into()];
    repo.save_update(&update_at(Utc::now(), stats(&[("a", first), ("b", online(1, 10))])))
        .await
        .unwrap();
    repo.save_update(&update_at(Utc::now(), stats(&[("a", online(9, 20))])))
        .await
        .unwrap();

    let view = repo.load_latest().await.unwrap();
    assert_eq!(view.len(), 2);
    let a = view.get("a").unwrap();
    assert_eq!(a.online_players, 9);
    assert!(a.player_list.is_empty());
    assert_eq!(view.get("b").unwrap().online_players, 1);
}

#[tokio::test]
async fn stats_repo_save_empty_no_op() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir).await;
    repo.save_update(&update_at(Utc::now(), StatsMap::new()))
        .await
        .unwrap();
    assert!(repo.load_latest().await.unwrap().is_empty());
    assert!(repo.get_history("a", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn stats_repo_history_oldest_first_and_limited() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir).await;

    let base = Utc::now() - ChronoDuration::minutes(10);
    for i in 0..5u32 {
        let at = base + ChronoDuration::seconds(30 * i64::from(i));
        repo.save_update(&update_at(at, stats(&[("a", online(i, 20)), ("b", online(50, 60))])))
            .await
            .unwrap();
    }

    let history = repo.get_history("a", 10).await.unwrap();
    assert_eq!(history.len(), 5);
    let players: Vec<u32> = history.iter().map(|p| p.online_players).collect();
    assert_eq!(players, vec![0, 1, 2, 3, 4]);
    assert!(history.iter().all(|p| p.is_online && p.ping == 42));

    let limited = repo.get_history("a", 2).await.unwrap();
    let players: Vec<u32> = limited.iter().map(|p| p.online_players).collect();
    assert_eq!(players, vec![3, 4]);
    assert!(limited[0].timestamp < limited[1].timestamp);

    assert!(repo.get_history("unknown", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn stats_repo_history_range_buckets_the_whole_window() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir).await;
    let now = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();

    // 1200 rows, one a minute over the last 20 hours, plus one outside the day.
    let start = now - ChronoDuration::hours(20);
    for k in 0..1200i64 {
        let at = start + ChronoDuration::minutes(k);
        repo.save_update(&update_at(at, stats(&[("a", online(7, 20))])))
            .await
            .unwrap();
    }
    repo.save_update(&update_at(now - ChronoDuration::days(2), stats(&[("a", online(99, 20))])))
        .await
        .unwrap();

    let day = repo
        .get_history_range("a", HistoryRange::Day, now)
        .await
        .unwrap();
    assert_eq!(day.len(), 240);
    assert_eq!(day[0].timestamp, start);
    assert!(day.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    assert!(day.iter().all(|p| p.online_players == 7 && p.ping == 42 && p.is_online));

    // The week window reaches the older row; 30-minute buckets.
    let week = repo
        .get_history_range("a", HistoryRange::Week, now)
        .await
        .unwrap();
    assert_eq!(week.len(), 41);
    assert_eq!(week[0].online_players, 99);

    assert!(
        repo.get_history_range("unknown", HistoryRange::Month, now)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn stats_repo_history_range_averages_within_bucket() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir).await;
    let now = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
    let bucket = now - ChronoDuration::hours(1);

    let mut busy = online(2, 20);
    busy.ping = 40;
    let mut busier = online(6, 20);
    busier.ping = 60;
    let down = StatusSnapshot::offline(20, None);
    for (offset, snapshot) in [(0, busy), (60, busier), (120, down)] {
        let at = bucket + ChronoDuration::seconds(offset);
        repo.save_update(&update_at(at, stats(&[("a", snapshot)])))
            .await
            .unwrap();
    }

    let points = repo
        .get_history_range("a", HistoryRange::Day, now)
        .await
        .unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].timestamp, bucket);
    assert_eq!(points[0].online_players, 3);
    // Offline rows do not drag the latency average down.
    assert_eq!(points[0].ping, 50);
    assert!(points[0].is_online);

    let only_down = StatusSnapshot::offline(20, None);
    repo.save_update(&update_at(now - ChronoDuration::minutes(10), stats(&[("b", only_down)])))
        .await
        .unwrap();
    let points = repo
        .get_history_range("b", HistoryRange::Day, now)
        .await
        .unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].ping, 0);
    assert!(!points[0].is_online);
}

#[tokio::test]
async fn stats_repo_prune_old_data() {
    let dir = TempDir::new().unwrap();
    let repo = open_repo(&dir).await;

    let old = Utc::now() - ChronoDuration::days(8);
    repo.save_update(&update_at(old, stats(&[("a", online(1, 10))])))
        .await
        .unwrap();
    repo.save_update(&update_at(Utc::now(), stats(&[("a", online(2, 10))])))
        .await
        .unwrap();

    let removed = repo.prune_old_data().await.unwrap();
    assert_eq!(removed, 1);

    let history = repo.get_history("a", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].online_players, 2);
    // Latest snapshots are never pruned.
    assert!(repo.load_latest().await.unwrap().contains("a"));
}
