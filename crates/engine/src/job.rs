// SPDX-License-Identifier: MIT

//! One crafting request, as the user phrased it.
//!
//! A job remembers which item ids were asked for and walks them through the
//! queue: ids start *unresolved* (submitted, awaiting an eligibility
//! refresh), become *resolved* once a live booster is queued, and leave the
//! job when the booster is crafted or dropped. A one-time job finishes when
//! both lists empty out; a permanent job re-queues every crafted item and
//! never finishes on its own.

use crate::queue::CraftQueue;
use crate::registry::JobRegistry;
use crate::reporter::StatusReporter;
use packsmith_core::{
    format_eta_ms, Clock, CraftKind, ItemId, JobId, QueueEvent, RemovalReason, UnqueueableReason,
};
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::sync::{Arc, Weak};

struct JobState {
    /// Ids submitted to the queue but not yet resolved into boosters.
    unresolved: Vec<ItemId>,
    /// Ids with a live booster in the queue.
    resolved: Vec<ItemId>,
    crafted_count: u64,
    finished: bool,
    stopped: bool,
}

pub struct CraftJob<C: Clock> {
    id: JobId,
    account: String,
    kind: CraftKind,
    /// Reporting destination; falls back to the account itself.
    report_to: Option<SmolStr>,
    /// Restored from disk rather than freshly requested; per-item
    /// resolution chatter is demoted to debug logs.
    restored: bool,
    queue: Arc<CraftQueue<C>>,
    registry: Mutex<Weak<JobRegistry<C>>>,
    reporter: Arc<StatusReporter<C>>,
    clock: C,
    state: Mutex<JobState>,
}

impl<C: Clock> CraftJob<C> {
    pub fn new(
        account: impl Into<String>,
        kind: CraftKind,
        items: Vec<ItemId>,
        report_to: Option<SmolStr>,
        restored: bool,
        queue: Arc<CraftQueue<C>>,
        reporter: Arc<StatusReporter<C>>,
        clock: C,
    ) -> Arc<Self> {
        let mut unresolved = Vec::with_capacity(items.len());
        for item in items {
            if !unresolved.contains(&item) {
                unresolved.push(item);
            }
        }
        Arc::new(Self {
            id: JobId::new(),
            account: account.into(),
            kind,
            report_to,
            restored,
            queue,
            registry: Mutex::new(Weak::new()),
            reporter,
            clock,
            state: Mutex::new(JobState {
                unresolved,
                resolved: Vec::new(),
                crafted_count: 0,
                finished: false,
                stopped: false,
            }),
        })
    }

    pub fn set_registry(&self, registry: Weak<JobRegistry<C>>) {
        *self.registry.lock() = registry;
    }

    fn registry(&self) -> Option<Arc<JobRegistry<C>>> {
        self.registry.lock().upgrade()
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn kind(&self) -> CraftKind {
        self.kind
    }

    /// Source key status lines for this job are reported under.
    pub fn source(&self) -> &str {
        self.report_to.as_deref().unwrap_or(&self.account)
    }

    pub fn report_to(&self) -> Option<&str> {
        self.report_to.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    pub fn crafted_count(&self) -> u64 {
        self.state.lock().crafted_count
    }

    /// Ids still owed a craft, unresolved first.
    pub fn uncrafted_ids(&self) -> Vec<ItemId> {
        let st = self.state.lock();
        let mut out = st.unresolved.clone();
        out.extend_from_slice(&st.resolved);
        out
    }

    pub fn has_unresolved(&self, item: ItemId) -> bool {
        self.state.lock().unresolved.contains(&item)
    }

    /// Submit every unresolved id to the queue.
    pub fn submit(&self) {
        for item in self.state.lock().unresolved.clone() {
            self.queue.add_booster(item, &self.id);
        }
    }

    /// Retry one unresolved id, typically after the queue slot holding it
    /// freed up.
    pub fn resubmit(&self, item: ItemId) {
        let eligible = {
            let st = self.state.lock();
            !st.stopped && !st.finished && st.unresolved.contains(&item)
        };
        if eligible {
            self.queue.add_booster(item, &self.id);
        }
    }

    /// Gems still needed to craft everything left, priced off the live
    /// boosters (ids without one yet price at zero until resolution).
    pub fn gems_needed(&self) -> u64 {
        self.uncrafted_ids()
            .into_iter()
            .filter_map(|item| self.queue.booster_price(item))
            .sum()
    }

    /// Deadline of the soonest uncrafted id, where known.
    pub fn next_craft_at_ms(&self) -> Option<u64> {
        self.uncrafted_ids()
            .into_iter()
            .filter_map(|item| self.queue.booster_available_at(item))
            .min()
    }

    /// Deadline of the latest uncrafted id, where known. Estimates when the
    /// whole job will be done.
    pub fn last_craft_at_ms(&self) -> Option<u64> {
        self.uncrafted_ids()
            .into_iter()
            .filter_map(|item| self.queue.booster_available_at(item))
            .max()
    }

    // === Queue event handling ===

    /// React to a queue event for an item this job owns (or once asked
    /// for). Called by the queue with no queue lock held.
    pub fn handle_event(&self, event: &QueueEvent) {
        if self.state.lock().stopped {
            return;
        }
        match *event {
            QueueEvent::Queued { item } => self.on_queued(item),
            QueueEvent::Unqueueable { item, reason } => self.on_unqueueable(item, reason),
            QueueEvent::Dequeued { item, reason } => self.on_dequeued(item, reason),
        }
    }

    fn on_queued(&self, item: ItemId) {
        {
            let mut st = self.state.lock();
            if let Some(pos) = st.unresolved.iter().position(|&i| i == item) {
                st.unresolved.remove(pos);
                st.resolved.push(item);
            }
        }
        let eta = self
            .queue
            .booster_available_at(item)
            .map(|at| format_eta_ms(self.clock.epoch_ms(), at));
        if self.restored {
            tracing::debug!(account = %self.account, item = %item, "restored booster queued");
        } else {
            let line = match eta {
                Some(eta) => format!("Queued booster {item}, crafting {eta}."),
                None => format!("Queued booster {item}."),
            };
            self.report(line, false);
        }
        self.persist();
    }

    fn on_unqueueable(&self, item: ItemId, reason: UnqueueableReason) {
        if !reason.is_permanent() {
            // Slot collision: the id stays unresolved and is resubmitted
            // when the holding booster leaves the queue
            tracing::debug!(account = %self.account, item = %item, "item already queued, will retry");
            return;
        }
        {
            let mut st = self.state.lock();
            st.unresolved.retain(|&i| i != item);
        }
        self.report(format!("Booster {item} can't be queued: {reason}."), false);
        self.persist();
        self.check_finished();
    }

    fn on_dequeued(&self, item: ItemId, reason: RemovalReason) {
        match reason {
            RemovalReason::Crafted => {
                let crafted_so_far = {
                    let mut st = self.state.lock();
                    st.resolved.retain(|&i| i != item);
                    st.crafted_count += 1;
                    if self.kind.is_permanent() {
                        st.unresolved.push(item);
                    }
                    st.crafted_count
                };
                self.report(
                    format!("Crafted booster {item} ({crafted_so_far} so far)."),
                    false,
                );
                if self.kind.is_permanent() {
                    // Straight back into the queue for the next cooldown
                    self.queue.add_booster(item, &self.id);
                    self.persist();
                } else {
                    self.persist();
                    self.check_finished();
                }
            }
            RemovalReason::UnexpectedlyUncraftable | RemovalReason::CraftFailed => {
                {
                    let mut st = self.state.lock();
                    st.resolved.retain(|&i| i != item);
                }
                self.report(format!("Dropped booster {item}: {reason}."), false);
                self.persist();
                self.check_finished();
            }
            RemovalReason::RemovedByUser | RemovalReason::JobStopped => {
                {
                    let mut st = self.state.lock();
                    st.resolved.retain(|&i| i != item);
                }
                self.persist();
                self.check_finished();
            }
        }
    }

    /// Queue-side notification that the next craft is blocked on gems.
    /// Duplicate-suppressed so the backoff loop doesn't spam.
    pub fn on_insufficient_funds(&self, item: ItemId, price: u64, usable: u64) {
        self.report(
            format!("Not enough gems for booster {item}: need {price}, have {usable}."),
            true,
        );
    }

    // === Lifecycle ===

    /// Remove queued and pending items matching the filters. Both filters
    /// must match where given; with neither, everything goes. Returns the
    /// removed ids.
    pub fn unschedule(
        &self,
        items: Option<&[ItemId]>,
        older_than_hours: Option<u64>,
    ) -> Vec<ItemId> {
        let now = self.clock.epoch_ms();
        let matches = |item: ItemId, available_at: Option<u64>| -> bool {
            if let Some(wanted) = items {
                if !wanted.contains(&item) {
                    return false;
                }
            }
            if let Some(hours) = older_than_hours {
                match available_at {
                    Some(at) => {
                        if at <= now + hours * 3_600_000 {
                            return false;
                        }
                    }
                    None => return false,
                }
            }
            true
        };

        let (unresolved, resolved) = {
            let st = self.state.lock();
            (st.unresolved.clone(), st.resolved.clone())
        };
        let mut removed = Vec::new();
        for item in unresolved {
            // Deadline for a pending id comes from whichever booster holds
            // its slot right now, if any
            if matches(item, self.queue.booster_available_at(item)) {
                self.state.lock().unresolved.retain(|&i| i != item);
                self.queue.cancel_add(item, &self.id);
                removed.push(item);
            }
        }
        for item in resolved {
            if matches(item, self.queue.booster_available_at(item))
                && self.queue.remove_booster(item, RemovalReason::RemovedByUser, Some(&self.id))
            {
                removed.push(item);
            }
        }
        if !removed.is_empty() {
            self.persist();
            self.check_finished();
        }
        removed
    }

    /// Stop the job outright: drop pending ids, evict live boosters, leave
    /// the registry. Further queue events are ignored.
    pub fn stop(&self) {
        let (unresolved, resolved) = {
            let mut st = self.state.lock();
            if st.stopped {
                return;
            }
            st.stopped = true;
            (std::mem::take(&mut st.unresolved), std::mem::take(&mut st.resolved))
        };
        for item in unresolved {
            self.queue.cancel_add(item, &self.id);
        }
        for item in resolved {
            self.queue.remove_booster(item, RemovalReason::JobStopped, Some(&self.id));
        }
        tracing::info!(account = %self.account, job = %self.id, "job stopped");
        if let Some(registry) = self.registry() {
            registry.unregister(&self.id);
            registry.persist();
        }
    }

    /// One-time jobs finish when nothing is left to craft or resolve.
    fn check_finished(&self) {
        if self.kind.is_permanent() {
            return;
        }
        let crafted = {
            let mut st = self.state.lock();
            if st.finished || st.stopped || !st.unresolved.is_empty() || !st.resolved.is_empty() {
                return;
            }
            st.finished = true;
            st.crafted_count
        };
        let line = if crafted > 0 {
            format!("All done: crafted {crafted} booster(s).")
        } else {
            "Nothing left to craft.".to_string()
        };
        self.report(line, false);
        // A finished job no longer listens to queue events or persists
        if let Some(registry) = self.registry() {
            registry.unregister(&self.id);
            registry.persist();
        }
    }

    /// One-line summary for the status command.
    pub fn status_line(&self) -> String {
        let (pending, queued, crafted, finished) = {
            let st = self.state.lock();
            (st.unresolved.len(), st.resolved.len(), st.crafted_count, st.finished)
        };
        let label = if self.kind.is_permanent() { "permanent" } else { "one-time" };
        if finished {
            return format!("[{label}] finished, {crafted} crafted");
        }
        let mut line = format!("[{label}] {queued} queued, {pending} pending, {crafted} crafted");
        let gems = self.gems_needed();
        if gems > 0 {
            line.push_str(&format!(", {gems} gems needed"));
        }
        if let Some(at) = self.last_craft_at_ms() {
            let eta = format_eta_ms(self.clock.epoch_ms(), at);
            line.push_str(&format!(", last craft {eta}"));
        }
        line
    }

    fn report(&self, message: String, suppress_duplicates: bool) {
        self.reporter.report(self.source(), message, suppress_duplicates);
    }

    fn persist(&self) {
        if let Some(registry) = self.registry() {
            registry.persist();
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
