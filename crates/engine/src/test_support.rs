// SPDX-License-Identifier: MIT

//! Scripted collaborators and a pre-wired account rig for engine tests.

use crate::backend::{BackendError, CraftBackend, CraftOutcome, Messenger};
use crate::config::SchedulerConfig;
use crate::handler::AccountHandler;
use crate::reporter::StatusReporter;
use async_trait::async_trait;
use packsmith_core::{
    EligibilityEntry, EligibilitySnapshot, FakeClock, GemPreference, GemTotals, ItemId,
};
use packsmith_storage::AccountStore;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

pub const ACCOUNT: &str = "alice";

/// Eligibility row that is immediately craftable.
pub fn entry(item: u32, price: u64) -> EligibilityEntry {
    EligibilityEntry {
        item: ItemId(item),
        name: format!("Pack {item}"),
        series: 1,
        price,
        unavailable: false,
        available_at_ms: None,
        tradable: true,
        marketable: true,
    }
}

/// Eligibility row cooling down until `available_at_ms`.
pub fn cooling_entry(item: u32, price: u64, available_at_ms: u64) -> EligibilityEntry {
    EligibilityEntry { unavailable: true, available_at_ms: Some(available_at_ms), ..entry(item, price) }
}

pub fn snapshot(gems: GemTotals, entries: Vec<EligibilityEntry>) -> EligibilitySnapshot {
    EligibilitySnapshot { gems, entries }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CraftCall {
    pub account: String,
    pub item: ItemId,
    pub series: u32,
    pub preference: GemPreference,
}

#[derive(Default)]
struct BackendInner {
    disconnected: bool,
    snapshot: EligibilitySnapshot,
    /// Upcoming fetches that should fail, consumed front to back.
    fetch_failures: u32,
    fetch_count: u32,
    /// Scripted craft results, consumed front to back; empty means
    /// unconditional success with no gem echo.
    craft_results: VecDeque<Result<CraftOutcome, BackendError>>,
    crafts: Vec<CraftCall>,
}

/// Scripted crafting service.
#[derive(Default)]
pub struct MockBackend {
    inner: Mutex<BackendInner>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.lock().disconnected = !connected;
    }

    pub fn set_snapshot(&self, snapshot: EligibilitySnapshot) {
        self.inner.lock().snapshot = snapshot;
    }

    pub fn set_gems(&self, gems: GemTotals) {
        self.inner.lock().snapshot.gems = gems;
    }

    /// Insert or replace one eligibility row.
    pub fn upsert_entry(&self, entry: EligibilityEntry) {
        let mut inner = self.inner.lock();
        inner.snapshot.entries.retain(|e| e.item != entry.item);
        inner.snapshot.entries.push(entry);
    }

    pub fn remove_entry(&self, item: ItemId) {
        self.inner.lock().snapshot.entries.retain(|e| e.item != item);
    }

    pub fn fail_next_fetches(&self, n: u32) {
        self.inner.lock().fetch_failures = n;
    }

    pub fn push_craft_result(&self, result: Result<CraftOutcome, BackendError>) {
        self.inner.lock().craft_results.push_back(result);
    }

    pub fn fetch_count(&self) -> u32 {
        self.inner.lock().fetch_count
    }

    pub fn crafts(&self) -> Vec<CraftCall> {
        self.inner.lock().crafts.clone()
    }
}

#[async_trait]
impl CraftBackend for MockBackend {
    fn is_connected(&self, _account: &str) -> bool {
        !self.inner.lock().disconnected
    }

    async fn fetch_eligibility(&self, _account: &str) -> Result<EligibilitySnapshot, BackendError> {
        let mut inner = self.inner.lock();
        inner.fetch_count += 1;
        if inner.fetch_failures > 0 {
            inner.fetch_failures -= 1;
            return Err(BackendError::Request("scripted fetch failure".into()));
        }
        Ok(inner.snapshot.clone())
    }

    async fn craft(
        &self,
        account: &str,
        item: ItemId,
        series: u32,
        preference: GemPreference,
    ) -> Result<CraftOutcome, BackendError> {
        let mut inner = self.inner.lock();
        inner.crafts.push(CraftCall { account: account.to_string(), item, series, preference });
        match inner.craft_results.pop_front() {
            Some(result) => result,
            None => Ok(CraftOutcome { success: true, gems: None }),
        }
    }
}

#[derive(Default)]
struct MessengerInner {
    unreachable: HashSet<String>,
    /// Upcoming sends that should fail, consumed front to back.
    send_failures: u32,
    sent: Vec<(String, String)>,
}

/// Scripted notification channel recording every delivered batch.
#[derive(Default)]
pub struct MockMessenger {
    inner: Mutex<MessengerInner>,
}

impl MockMessenger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_reachable(&self, source: &str, reachable: bool) {
        let mut inner = self.inner.lock();
        if reachable {
            inner.unreachable.remove(source);
        } else {
            inner.unreachable.insert(source.to_string());
        }
    }

    pub fn fail_next_sends(&self, n: u32) {
        self.inner.lock().send_failures = n;
    }

    /// Every `(source, text)` batch delivered so far.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.inner.lock().sent.clone()
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    fn can_reach(&self, source: &str) -> bool {
        !self.inner.lock().unreachable.contains(source)
    }

    async fn send(&self, source: &str, text: &str) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        if inner.send_failures > 0 {
            inner.send_failures -= 1;
            return Err(BackendError::Request("scripted send failure".into()));
        }
        inner.sent.push((source.to_string(), text.to_string()));
        Ok(())
    }
}

/// One account wired up end to end against the mocks. Cycles and flushes
/// are driven explicitly; no background tasks run.
pub struct Rig {
    pub clock: FakeClock,
    pub backend: Arc<MockBackend>,
    pub messenger: Arc<MockMessenger>,
    pub reporter: Arc<StatusReporter<FakeClock>>,
    pub store: Arc<AccountStore>,
    pub handler: Arc<AccountHandler<FakeClock>>,
    _dir: tempfile::TempDir,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = FakeClock::new();
        let backend = MockBackend::new();
        let messenger = MockMessenger::new();
        let reporter = Arc::new(StatusReporter::new(messenger.clone(), clock.clone()));
        let store = Arc::new(AccountStore::new(dir.path()));
        let handler = AccountHandler::new(
            ACCOUNT,
            0,
            Arc::new(config),
            backend.clone(),
            store.clone(),
            reporter.clone(),
            clock.clone(),
        );
        Self { clock, backend, messenger, reporter, store, handler, _dir: dir }
    }

    /// Rebuild the handler from what is currently on disk, as a restart
    /// would. The previous handler keeps running; tests drop it.
    pub fn restart(&self) -> Arc<AccountHandler<FakeClock>> {
        AccountHandler::new(
            ACCOUNT,
            0,
            Arc::new(SchedulerConfig::default()),
            self.backend.clone(),
            self.store.clone(),
            self.reporter.clone(),
            self.clock.clone(),
        )
    }

    /// Claim the pending deadline and run one cycle, as the loop task
    /// would.
    pub async fn cycle(&self) {
        self.handler.queue().claim_deadline();
        self.handler.queue().run_cycle().await;
    }

    /// Let fire-and-forget persistence tasks drain before inspecting disk.
    pub async fn settle(&self) {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        self.store.flush().await;
    }
}
