// Shared test helpers: descriptors, snapshots, and scripted status fetchers
#![allow(dead_code)]

use chrono::Utc;
use mcstatus::fetcher::{FetchFailed, StatusFetcher};
use mcstatus::models::*;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, Semaphore};

pub fn descriptor(id: &str) -> ServerDescriptor {
    ServerDescriptor::new(id, id.to_uppercase(), format!("{id}.example.com"))
}

pub fn online(players: u32, max: u32) -> StatusSnapshot {
    StatusSnapshot {
        is_online: true,
        online_players: players,
        max_players: max,
        ping: 42,
        version: Some("1.20.4".into()),
        motd: Some("Welcome".into()),
        player_list: vec![],
        last_update: Utc::now(),
    }
}

pub fn stats(entries: &[(&str, StatusSnapshot)]) -> StatsMap {
    entries
        .iter()
        .map(|(id, s)| (id.to_string(), s.clone()))
        .collect()
}

/// Answers each call with the next scripted result; fails once the script runs out.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<VecDeque<Result<StatsMap, FetchFailed>>>,
    requested: Mutex<Vec<Vec<String>>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(responses: Vec<Result<StatsMap, FetchFailed>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Ids sent on each call, in call order.
    pub fn requested(&self) -> Vec<Vec<String>> {
        self.requested.lock().unwrap().clone()
    }
}

impl StatusFetcher for ScriptedFetcher {
    async fn fetch(&self, servers: &[ServerDescriptor]) -> Result<StatsMap, FetchFailed> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .unwrap()
            .push(servers.iter().map(|s| s.id.clone()).collect());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(FetchFailed::Rejected(None)))
    }
}

/// Blocks every call until the test releases it, and tracks how many calls
/// overlap. `started` is notified as each call begins.
pub struct GatedFetcher {
    response: StatsMap,
    gate: Semaphore,
    pub started: Notify,
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
}

impl GatedFetcher {
    pub fn new(response: StatsMap) -> Self {
        Self {
            response,
            gate: Semaphore::new(0),
            started: Notify::new(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Lets `n` blocked (or future) calls complete.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl StatusFetcher for GatedFetcher {
    async fn fetch(&self, _servers: &[ServerDescriptor]) -> Result<StatsMap, FetchFailed> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.started.notify_one();

        self.gate.acquire().await.unwrap().forget();
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}
