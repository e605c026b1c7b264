// SPDX-License-Identifier: MIT

//! Per-account job registry and persistence point.
//!
//! The registry owns the live jobs for one account, routes queue events to
//! them by id, and snapshots (jobs + craft history) to the account store
//! whenever anything worth keeping changes.

use crate::job::CraftJob;
use packsmith_core::{Clock, CraftHistory, CraftKind, ItemId, JobId};
use packsmith_storage::{AccountRecord, AccountStore, JobRecord};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct JobRegistry<C: Clock> {
    account: String,
    store: Arc<AccountStore>,
    history: Arc<Mutex<CraftHistory>>,
    clock: C,
    jobs: Mutex<Vec<Arc<CraftJob<C>>>>,
}

impl<C: Clock> JobRegistry<C> {
    pub fn new(
        account: impl Into<String>,
        store: Arc<AccountStore>,
        history: Arc<Mutex<CraftHistory>>,
        clock: C,
    ) -> Self {
        Self {
            account: account.into(),
            store,
            history,
            clock,
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn register(&self, job: Arc<CraftJob<C>>) {
        self.jobs.lock().push(job);
    }

    pub fn unregister(&self, id: &JobId) {
        self.jobs.lock().retain(|j| j.id() != id);
    }

    pub fn find(&self, id: &JobId) -> Option<Arc<CraftJob<C>>> {
        self.jobs.lock().iter().find(|j| j.id() == id).cloned()
    }

    /// Snapshot of the registered jobs. Callers work off the snapshot so no
    /// job method ever runs under the registry lock.
    pub fn jobs(&self) -> Vec<Arc<CraftJob<C>>> {
        self.jobs.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    pub fn jobs_of_kind(&self, kind: CraftKind) -> Vec<Arc<CraftJob<C>>> {
        self.jobs().into_iter().filter(|j| j.kind() == kind).collect()
    }

    /// Total ids still owed a craft across all jobs.
    pub fn total_remaining(&self) -> usize {
        self.jobs().iter().map(|j| j.uncrafted_ids().len()).sum()
    }

    /// Gems needed to craft everything currently priced, across all jobs.
    pub fn gems_needed(&self) -> u64 {
        self.jobs().iter().map(|j| j.gems_needed()).sum()
    }

    /// Soonest known craft deadline across all jobs.
    pub fn next_craft_at_ms(&self) -> Option<u64> {
        self.jobs().iter().filter_map(|j| j.next_craft_at_ms()).min()
    }

    /// A queue slot for `item` opened up; give it to the first job still
    /// waiting on that id.
    pub fn on_slot_freed(&self, item: ItemId) {
        for job in self.jobs() {
            if !job.is_stopped() && !job.is_finished() && job.has_unresolved(item) {
                job.resubmit(item);
                return;
            }
        }
    }

    /// Fan an unschedule request out to every job. Returns all removed ids.
    pub fn unschedule_all(
        &self,
        items: Option<&[ItemId]>,
        older_than_hours: Option<u64>,
    ) -> Vec<ItemId> {
        let mut removed = Vec::new();
        for job in self.jobs() {
            for item in job.unschedule(items, older_than_hours) {
                if !removed.contains(&item) {
                    removed.push(item);
                }
            }
        }
        removed
    }

    /// Stop every job (daemon shutdown or account removal).
    pub fn stop_all(&self) {
        for job in self.jobs() {
            job.stop();
        }
    }

    /// Snapshot jobs and craft history to disk, fire-and-forget.
    pub fn persist(&self) {
        let now = self.clock.epoch_ms();
        let craft_history = {
            let mut history = self.history.lock();
            history.prune(now);
            history.to_map()
        };
        let jobs: Vec<JobRecord> = self
            .jobs()
            .iter()
            .filter(|j| !j.is_finished() && !j.is_stopped())
            .map(|j| JobRecord {
                kind: j.kind(),
                item_ids: j.uncrafted_ids(),
                report_to: j.report_to().map(str::to_string),
            })
            .collect();
        self.store.save_async(&self.account, AccountRecord::new(craft_history, jobs));
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
