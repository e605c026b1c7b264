// SPDX-License-Identifier: MIT

//! Per-account wiring and the fleet-wide handler registry.
//!
//! An [`AccountHandler`] assembles one account's queue, job registry and
//! craft history, restores persisted jobs on construction, and owns the
//! background loop task. The [`HandlerRegistry`] maps account names to
//! handlers and hands out stagger positions as accounts join.

use crate::backend::CraftBackend;
use crate::config::SchedulerConfig;
use crate::job::CraftJob;
use crate::queue::CraftQueue;
use crate::registry::JobRegistry;
use crate::reporter::StatusReporter;
use packsmith_core::{Clock, CraftHistory, CraftKind, ItemId};
use packsmith_storage::AccountStore;
use parking_lot::{Mutex, RwLock};
use smol_str::SmolStr;
use std::collections::HashMap;
use std::sync::Arc;

pub struct AccountHandler<C: Clock> {
    account: String,
    config: Arc<SchedulerConfig>,
    queue: Arc<CraftQueue<C>>,
    registry: Arc<JobRegistry<C>>,
    reporter: Arc<StatusReporter<C>>,
    clock: C,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl<C: Clock> AccountHandler<C> {
    /// Build the handler and restore any persisted jobs. Restored jobs are
    /// submitted immediately; their boosters resolve on the first refresh.
    pub fn new(
        account: impl Into<String>,
        account_index: usize,
        config: Arc<SchedulerConfig>,
        backend: Arc<dyn CraftBackend>,
        store: Arc<AccountStore>,
        reporter: Arc<StatusReporter<C>>,
        clock: C,
    ) -> Arc<Self> {
        let account = account.into();
        let record = store.load_or_default(&account);
        let history = Arc::new(Mutex::new(CraftHistory::from_map(record.craft_history)));
        let queue = Arc::new(CraftQueue::new(
            account.clone(),
            backend,
            config.clone(),
            clock.clone(),
            config.stagger_delay_ms(account_index),
            history.clone(),
        ));
        let registry = Arc::new(JobRegistry::new(
            account.clone(),
            store,
            history,
            clock.clone(),
        ));
        queue.set_registry(Arc::downgrade(&registry));

        let handler = Arc::new(Self {
            account,
            config,
            queue,
            registry,
            reporter,
            clock,
            tasks: Mutex::new(Vec::new()),
        });
        for job in record.jobs {
            handler.spawn_job(job.kind, job.item_ids, job.report_to.map(SmolStr::new), true);
        }
        handler
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn queue(&self) -> &Arc<CraftQueue<C>> {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<JobRegistry<C>> {
        &self.registry
    }

    pub fn reporter(&self) -> &Arc<StatusReporter<C>> {
        &self.reporter
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    fn spawn_job(
        &self,
        kind: CraftKind,
        items: Vec<ItemId>,
        report_to: Option<SmolStr>,
        restored: bool,
    ) -> Option<Arc<CraftJob<C>>> {
        if items.is_empty() {
            return None;
        }
        let job = CraftJob::new(
            self.account.clone(),
            kind,
            items,
            report_to,
            restored,
            self.queue.clone(),
            self.reporter.clone(),
            self.clock.clone(),
        );
        job.set_registry(Arc::downgrade(&self.registry));
        self.registry.register(job.clone());
        tracing::info!(
            account = %self.account,
            job = %job.id(),
            kind = %kind,
            items = job.uncrafted_ids().len(),
            restored,
            "job created"
        );
        job.submit();
        Some(job)
    }

    /// Queue a one-time job for the given items.
    pub fn schedule(
        &self,
        items: Vec<ItemId>,
        report_to: Option<SmolStr>,
    ) -> Option<Arc<CraftJob<C>>> {
        let job = self.spawn_job(CraftKind::OneTime, items, report_to, false)?;
        self.registry.persist();
        Some(job)
    }

    /// Queue a permanent job: every item re-queues after each craft.
    pub fn schedule_permanent(
        &self,
        items: Vec<ItemId>,
        report_to: Option<SmolStr>,
    ) -> Option<Arc<CraftJob<C>>> {
        let job = self.spawn_job(CraftKind::Permanent, items, report_to, false)?;
        self.registry.persist();
        Some(job)
    }

    /// Start the background loop task. Idempotent callers should hold onto
    /// the handler rather than call twice.
    pub fn start(&self) {
        self.tasks.lock().push(self.queue.spawn_loop());
        if !self.registry.is_empty() {
            self.queue.trigger();
        }
    }

    /// External signal that the account's gem balance changed (a trade, a
    /// market sale). Worth a refresh only while a craft is blocked on gems.
    pub fn on_gems_changed(&self) {
        let usable = self.queue.gems().usable(self.config.allow_untradable);
        if self.registry.gems_needed() > usable {
            tracing::debug!(account = %self.account, "gem balance changed while short, refreshing");
            self.queue.request_refresh();
        }
    }

    /// Persist and wind down. Jobs stay registered so a later restart
    /// restores them; only the loop task stops.
    pub fn shutdown(&self) {
        self.registry.persist();
        self.queue.shutdown();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Fleet of account handlers, keyed by account name. Stagger positions are
/// assigned in insertion order and never reused within a process.
pub struct HandlerRegistry<C: Clock> {
    handlers: RwLock<HashMap<String, Arc<AccountHandler<C>>>>,
    next_index: Mutex<usize>,
}

impl<C: Clock> Default for HandlerRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> HandlerRegistry<C> {
    pub fn new() -> Self {
        Self { handlers: RwLock::new(HashMap::new()), next_index: Mutex::new(0) }
    }

    /// Get the handler for an account, creating (and starting) it on first
    /// use.
    pub fn get_or_create(
        &self,
        account: &str,
        config: Arc<SchedulerConfig>,
        backend: Arc<dyn CraftBackend>,
        store: Arc<AccountStore>,
        reporter: Arc<StatusReporter<C>>,
        clock: C,
    ) -> Arc<AccountHandler<C>> {
        if let Some(handler) = self.get(account) {
            return handler;
        }
        let index = {
            let mut next = self.next_index.lock();
            let index = *next;
            *next += 1;
            index
        };
        let handler =
            AccountHandler::new(account, index, config, backend, store, reporter, clock);
        handler.start();
        self.handlers.write().insert(account.to_string(), handler.clone());
        handler
    }

    pub fn get(&self, account: &str) -> Option<Arc<AccountHandler<C>>> {
        self.handlers.read().get(account).cloned()
    }

    /// Remove and shut down the handler for an account.
    pub fn remove(&self, account: &str) -> Option<Arc<AccountHandler<C>>> {
        let handler = self.handlers.write().remove(account)?;
        handler.shutdown();
        Some(handler)
    }

    pub fn accounts(&self) -> Vec<String> {
        let mut out: Vec<String> = self.handlers.read().keys().cloned().collect();
        out.sort();
        out
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Shut every handler down (process exit).
    pub fn shutdown_all(&self) {
        for handler in self.handlers.write().drain().map(|(_, h)| h) {
            handler.shutdown();
        }
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
