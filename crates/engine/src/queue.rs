// SPDX-License-Identifier: MIT

//! Per-account craft scheduler.
//!
//! The queue owns the live boosters, the gem totals, the refresh protocol
//! against the eligibility source and the single execution timer. All state
//! transitions happen inside one serialized cycle: concurrent triggers
//! (timer fire, new work, a funds-changed signal) coalesce onto the next
//! cycle instead of running in parallel, which is what makes the
//! at-most-once craft guarantee cheap to uphold.
//!
//! Refreshes are event-driven, not polled: a refresh only happens while at
//! least one waiter (an unresolved add, a failure verification, an explicit
//! retry request) is queued, and the whole waiter queue is drained on every
//! refresh — the one-shot subscription semantics without mutable event
//! subscriber lists.

use crate::backend::{CraftBackend, CraftOutcome};
use crate::config::SchedulerConfig;
use crate::registry::JobRegistry;
use packsmith_core::{
    Booster, Clock, CraftHistory, EligibilityEntry, EligibilitySnapshot, GemPreference, GemTotals,
    ItemId, JobId, QueueEvent, RemovalReason, UnqueueableReason,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;

/// Retry interval while the account is not connected.
const OFFLINE_RETRY_MS: u64 = 1_000;
/// How far the "available again" timestamp must advance between the two
/// verification snapshots before a reported craft failure is deemed to have
/// actually succeeded. Two hours comfortably clears daylight-saving shifts.
const VERIFY_ADVANCE_MS: u64 = 2 * 60 * 60 * 1000;

/// One-shot consumer of the next refresh. The whole list is drained every
/// time a refresh lands.
enum Waiter {
    /// Resolve an item id into a queued booster (or a rejection).
    Add { item: ItemId, job: JobId },
    /// Compare the item's fresh snapshot against `old` to classify an
    /// ambiguous craft failure. `parked_at_ms` is the verification baseline
    /// when the old entry carried no timestamp.
    Verify { item: ItemId, old: EligibilityEntry, parked_at_ms: u64 },
    /// No resolution needed; the waiter only forces the next cycle to
    /// refresh (funds retry, external funds-changed signal).
    Refresh,
}

struct QueueState {
    boosters: HashMap<ItemId, Booster>,
    gems: GemTotals,
    waiters: Vec<Waiter>,
    /// Items parked while a failure verification is pending; excluded from
    /// selection so a possibly-successful craft is never repeated.
    verifying: HashSet<ItemId>,
    /// Consecutive refresh/funds failures, drives the backoff multiplier.
    failures: u32,
}

/// The next booster the cycle would act on.
struct Selected {
    item: ItemId,
    job: JobId,
    available_at_ms: u64,
    price: u64,
    series: u32,
}

pub struct CraftQueue<C: Clock> {
    account: String,
    backend: Arc<dyn CraftBackend>,
    config: Arc<SchedulerConfig>,
    clock: C,
    /// Inter-account stagger applied to every deadline on this account.
    extra_delay_ms: u64,
    state: Mutex<QueueState>,
    history: Arc<Mutex<CraftHistory>>,
    registry: Mutex<Weak<JobRegistry<C>>>,
    /// Weight-1 gate: only one cycle runs at a time.
    cycle_lock: tokio::sync::Mutex<()>,
    /// Single pending-execution deadline, min-folded by `schedule_at`.
    deadline_ms: Mutex<Option<u64>>,
    wake: Notify,
    stopped: AtomicBool,
}

impl<C: Clock> CraftQueue<C> {
    pub fn new(
        account: impl Into<String>,
        backend: Arc<dyn CraftBackend>,
        config: Arc<SchedulerConfig>,
        clock: C,
        extra_delay_ms: u64,
        history: Arc<Mutex<CraftHistory>>,
    ) -> Self {
        Self {
            account: account.into(),
            backend,
            config,
            clock,
            extra_delay_ms,
            state: Mutex::new(QueueState {
                boosters: HashMap::new(),
                gems: GemTotals::default(),
                waiters: Vec::new(),
                verifying: HashSet::new(),
                failures: 0,
            }),
            history,
            registry: Mutex::new(Weak::new()),
            cycle_lock: tokio::sync::Mutex::new(()),
            deadline_ms: Mutex::new(None),
            wake: Notify::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Bind the job registry used for event delivery and cross-job lookups.
    pub fn set_registry(&self, registry: Weak<JobRegistry<C>>) {
        *self.registry.lock() = registry;
    }

    fn registry(&self) -> Option<Arc<JobRegistry<C>>> {
        self.registry.lock().upgrade()
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn extra_delay_ms(&self) -> u64 {
        self.extra_delay_ms
    }

    pub fn gems(&self) -> GemTotals {
        self.state.lock().gems
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().boosters.len()
    }

    pub fn has_booster(&self, item: ItemId) -> bool {
        self.state.lock().boosters.contains_key(&item)
    }

    pub fn booster_owner(&self, item: ItemId) -> Option<JobId> {
        self.state.lock().boosters.get(&item).map(|b| b.job.clone())
    }

    /// Price of the live booster for an item, whichever job owns it.
    /// Pricing is shared, so jobs use this for unresolved ids too.
    pub fn booster_price(&self, item: ItemId) -> Option<u64> {
        self.state.lock().boosters.get(&item).map(|b| b.entry.price)
    }

    /// Deadline of the live booster for an item, whichever job owns it.
    pub fn booster_available_at(&self, item: ItemId) -> Option<u64> {
        self.state.lock().boosters.get(&item).map(|b| b.available_at_ms(self.extra_delay_ms))
    }

    // === Add/remove contract ===

    /// Ask the queue to resolve an item id into a booster on the next
    /// refresh. Asynchronous: the outcome arrives as a queue event on the
    /// owning job. Duplicate pending requests for the same (item, job)
    /// coalesce.
    pub fn add_booster(&self, item: ItemId, job: &JobId) {
        {
            let mut st = self.state.lock();
            let duplicate = st.waiters.iter().any(
                |w| matches!(w, Waiter::Add { item: i, job: j } if *i == item && j == job),
            );
            if duplicate {
                return;
            }
            st.waiters.push(Waiter::Add { item, job: job.clone() });
        }
        self.trigger();
    }

    /// Withdraw a pending add before it resolves. Without this, a cancelled
    /// id would still turn into a live booster on the next refresh.
    pub fn cancel_add(&self, item: ItemId, job: &JobId) {
        self.state.lock().waiters.retain(
            |w| !matches!(w, Waiter::Add { item: i, job: j } if *i == item && j == job),
        );
    }

    /// Remove a live booster synchronously. With `owner` set, only removes
    /// a booster belonging to that job, so one job cannot evict another's
    /// item. Returns whether a booster was removed.
    pub fn remove_booster(
        &self,
        item: ItemId,
        reason: RemovalReason,
        owner: Option<&JobId>,
    ) -> bool {
        let removed = {
            let mut st = self.state.lock();
            let matches = st
                .boosters
                .get(&item)
                .is_some_and(|b| owner.map_or(true, |o| &b.job == o));
            if matches {
                st.verifying.remove(&item);
                st.boosters.remove(&item)
            } else {
                None
            }
        };
        let Some(booster) = removed else { return false };
        tracing::debug!(account = %self.account, item = %item, reason = %reason, "booster removed");
        self.deliver(vec![(booster.job, QueueEvent::Dequeued { item, reason })]);
        self.slot_freed(item);
        true
    }

    /// Force the next cycle to refresh even with no add/verify pending
    /// (used by the external funds-changed signal).
    pub fn request_refresh(&self) {
        self.state.lock().waiters.push(Waiter::Refresh);
        self.trigger();
    }

    // === Deadline slot ===

    /// Fold a deadline into the single pending slot: the slot only ever
    /// moves earlier, and the loop task re-reads it after every cycle.
    pub fn schedule_at(&self, at_ms: u64) {
        {
            let mut slot = self.deadline_ms.lock();
            match *slot {
                Some(current) if current <= at_ms => {}
                _ => *slot = Some(at_ms),
            }
        }
        self.wake.notify_one();
    }

    fn schedule_in(&self, delay_ms: u64) {
        self.schedule_at(self.clock.epoch_ms() + delay_ms);
    }

    /// Run a cycle as soon as possible.
    pub fn trigger(&self) {
        self.schedule_at(self.clock.epoch_ms());
    }

    pub fn deadline_ms(&self) -> Option<u64> {
        *self.deadline_ms.lock()
    }

    /// Take the pending deadline. The loop claims the slot right before a
    /// cycle so the cycle's own scheduling starts from a clean slate; a
    /// deadline claimed here is always followed by a cycle that re-derives
    /// whatever work it stood for.
    pub fn claim_deadline(&self) -> Option<u64> {
        self.deadline_ms.lock().take()
    }

    // === Execution cycle ===

    /// One serialized scheduler cycle. See the module docs for the protocol;
    /// tests drive this directly instead of going through the loop task.
    pub async fn run_cycle(&self) {
        let _guard = self.cycle_lock.lock().await;

        if !self.backend.is_connected(&self.account) {
            self.schedule_in(OFFLINE_RETRY_MS);
            return;
        }

        let refresh_wanted = !self.state.lock().waiters.is_empty();
        if refresh_wanted {
            match self.backend.fetch_eligibility(&self.account).await {
                Ok(snapshot) => self.apply_refresh(snapshot),
                Err(e) => {
                    let delay = self.next_backoff_ms();
                    tracing::warn!(
                        account = %self.account,
                        error = %e,
                        delay_ms = delay,
                        "eligibility refresh failed"
                    );
                    self.schedule_in(delay);
                    return;
                }
            }
        }

        let mut crafted_this_cycle = false;
        loop {
            let now = self.clock.epoch_ms();
            let Some(next) = self.select_next() else {
                // Queue idle: nothing craftable left
                self.state.lock().failures = 0;
                return;
            };

            if next.available_at_ms > now {
                let at = if crafted_this_cycle {
                    next.available_at_ms.max(now + self.config.min_craft_gap_ms())
                } else {
                    next.available_at_ms
                };
                self.schedule_at(at);
                return;
            }

            if crafted_this_cycle {
                // One craft per cycle keeps the request pipeline gentle
                self.schedule_at(now + self.config.min_craft_gap_ms());
                return;
            }

            let gems = self.state.lock().gems;
            let usable = gems.usable(self.config.allow_untradable);
            if next.price > usable {
                if let Some(registry) = self.registry() {
                    if let Some(job) = registry.find(&next.job) {
                        job.on_insufficient_funds(next.item, next.price, usable);
                    }
                }
                let delay = self.next_backoff_ms();
                {
                    // Retry once the next refresh shows fresh balances
                    self.state.lock().waiters.push(Waiter::Refresh);
                }
                tracing::debug!(
                    account = %self.account,
                    item = %next.item,
                    price = next.price,
                    usable,
                    "insufficient gems, backing off"
                );
                self.schedule_in(delay);
                return;
            }

            self.state.lock().failures = 0;
            let preference =
                GemPreference::for_price(gems, next.price, self.config.allow_untradable);
            match self.backend.craft(&self.account, next.item, next.series, preference).await {
                Ok(CraftOutcome { success: true, gems: fresh }) => {
                    self.finish_craft(next.item, fresh);
                    crafted_this_cycle = true;
                }
                Ok(CraftOutcome { success: false, .. }) | Err(_) => {
                    // Ambiguous: the service sometimes reports a failure for
                    // a craft that went through. Park the booster and let the
                    // next refresh decide.
                    tracing::warn!(
                        account = %self.account,
                        item = %next.item,
                        "craft reported failure, verifying against next refresh"
                    );
                    {
                        let mut st = self.state.lock();
                        if let Some(booster) = st.boosters.get(&next.item) {
                            let old = booster.entry.clone();
                            st.waiters.push(Waiter::Verify {
                                item: next.item,
                                old,
                                parked_at_ms: now,
                            });
                            st.verifying.insert(next.item);
                        }
                    }
                    self.trigger();
                    return;
                }
            }
        }
    }

    /// Record a successful craft: history entry, booster removal, event
    /// delivery, persistence.
    fn finish_craft(&self, item: ItemId, fresh_gems: Option<GemTotals>) {
        let now = self.clock.epoch_ms();
        let removed = {
            let mut st = self.state.lock();
            if let Some(gems) = fresh_gems {
                st.gems = gems;
            }
            if let Some(booster) = st.boosters.get_mut(&item) {
                booster.mark_crafted();
            }
            st.boosters.remove(&item)
        };
        self.history.lock().record(item, now, self.extra_delay_ms);
        tracing::info!(account = %self.account, item = %item, "crafted booster");
        if let Some(booster) = removed {
            self.deliver(vec![(
                booster.job,
                QueueEvent::Dequeued { item, reason: RemovalReason::Crafted },
            )]);
        }
        if let Some(registry) = self.registry() {
            registry.persist();
            registry.on_slot_freed(item);
        }
    }

    /// Apply a fresh eligibility snapshot: update balances, swap booster
    /// snapshots wholesale, evict vanished items, drain all waiters.
    fn apply_refresh(&self, snapshot: EligibilitySnapshot) {
        let now = self.clock.epoch_ms();
        let registry = self.registry();
        let mut events: Vec<(JobId, QueueEvent)> = Vec::new();
        let mut freed: Vec<ItemId> = Vec::new();

        {
            let mut st = self.state.lock();
            st.gems = snapshot.gems;

            let live: Vec<ItemId> = st.boosters.keys().copied().collect();
            for item in live {
                match snapshot.entry(item) {
                    Some(entry) => {
                        if let Some(booster) = st.boosters.get_mut(&item) {
                            booster.update_entry(entry.clone());
                        }
                    }
                    None if st.verifying.contains(&item) => {
                        // The pending verify waiter owns this decision
                    }
                    None => {
                        if let Some(booster) = st.boosters.remove(&item) {
                            events.push((
                                booster.job,
                                QueueEvent::Dequeued {
                                    item,
                                    reason: RemovalReason::UnexpectedlyUncraftable,
                                },
                            ));
                            freed.push(item);
                        }
                    }
                }
            }

            for waiter in std::mem::take(&mut st.waiters) {
                match waiter {
                    Waiter::Refresh => {}
                    Waiter::Add { item, job } => {
                        if st.boosters.contains_key(&item) {
                            events.push((
                                job,
                                QueueEvent::Unqueueable {
                                    item,
                                    reason: UnqueueableReason::AlreadyQueued,
                                },
                            ));
                            continue;
                        }
                        let Some(entry) = snapshot.entry(item) else {
                            events.push((
                                job,
                                QueueEvent::Unqueueable {
                                    item,
                                    reason: UnqueueableReason::Uncraftable,
                                },
                            ));
                            continue;
                        };
                        if self.filtered_by_policy(entry) {
                            events.push((
                                job,
                                QueueEvent::Unqueueable {
                                    item,
                                    reason: UnqueueableReason::Unmarketable,
                                },
                            ));
                            continue;
                        }
                        // Owning job may have stopped while the add was pending
                        let Some(owner) =
                            registry.as_ref().and_then(|r| r.find(&job))
                        else {
                            continue;
                        };
                        let prior = self.history.lock().get(item, now);
                        let booster =
                            Booster::new(job.clone(), owner.kind(), entry.clone(), now, prior);
                        st.boosters.insert(item, booster);
                        events.push((job, QueueEvent::Queued { item }));
                    }
                    Waiter::Verify { item, old, parked_at_ms } => {
                        st.verifying.remove(&item);
                        let Some(new) = snapshot.entry(item) else {
                            if let Some(booster) = st.boosters.remove(&item) {
                                events.push((
                                    booster.job,
                                    QueueEvent::Dequeued {
                                        item,
                                        reason: RemovalReason::UnexpectedlyUncraftable,
                                    },
                                ));
                                freed.push(item);
                            }
                            continue;
                        };
                        // The strict check compares the two reported
                        // timestamps. An item that was available when the
                        // craft was attempted carries none, so the park time
                        // stands in as the baseline, widening the rule: a
                        // fresh ~24h cooldown then still reads as an advance.
                        let baseline = old.available_at_ms.unwrap_or(parked_at_ms);
                        let advanced = new
                            .available_at_ms
                            .is_some_and(|n| n > baseline + VERIFY_ADVANCE_MS);
                        let reason = if advanced {
                            // Cooldown moved a day forward: the craft went
                            // through after all (or someone else crafted it)
                            if let Some(booster) = st.boosters.get_mut(&item) {
                                booster.mark_crafted();
                            }
                            tracing::info!(
                                account = %self.account,
                                item = %item,
                                "reported craft failure actually succeeded"
                            );
                            RemovalReason::Crafted
                        } else {
                            RemovalReason::CraftFailed
                        };
                        if let Some(booster) = st.boosters.remove(&item) {
                            events.push((booster.job, QueueEvent::Dequeued { item, reason }));
                            freed.push(item);
                        }
                    }
                }
            }
        }

        self.deliver(events);
        if let Some(registry) = registry {
            for item in freed {
                registry.on_slot_freed(item);
            }
        }
    }

    fn filtered_by_policy(&self, entry: &EligibilityEntry) -> bool {
        (!self.config.allow_unmarketable && !entry.marketable)
            || (!self.config.allow_untradable && !entry.tradable)
    }

    /// Un-crafted, non-verifying booster with the earliest deadline.
    fn select_next(&self) -> Option<Selected> {
        let st = self.state.lock();
        let mut best: Option<Selected> = None;
        for booster in st.boosters.values() {
            if booster.crafted() || st.verifying.contains(&booster.item) {
                continue;
            }
            let available_at_ms = booster.available_at_ms(self.extra_delay_ms);
            let better = best.as_ref().map_or(true, |b| available_at_ms < b.available_at_ms);
            if better {
                best = Some(Selected {
                    item: booster.item,
                    job: booster.job.clone(),
                    available_at_ms,
                    price: booster.entry.price,
                    series: booster.entry.series,
                });
            }
        }
        best
    }

    fn next_backoff_ms(&self) -> u64 {
        let mut st = self.state.lock();
        let delay = self.config.backoff_ms(st.failures);
        st.failures = st.failures.saturating_add(1);
        delay
    }

    /// Deliver queue events to their owning jobs. Called with no queue lock
    /// held: handlers may call straight back into the queue.
    fn deliver(&self, events: Vec<(JobId, QueueEvent)>) {
        let Some(registry) = self.registry() else { return };
        for (job_id, event) in events {
            tracing::debug!(account = %self.account, event = event.name(), item = %event.item(), "queue event");
            if let Some(job) = registry.find(&job_id) {
                job.handle_event(&event);
            }
        }
    }

    fn slot_freed(&self, item: ItemId) {
        if let Some(registry) = self.registry() {
            registry.on_slot_freed(item);
        }
    }

    // === Loop task ===

    /// Background timeline: sleeps until the pending deadline (or a wake)
    /// and runs cycles. One task per account; no ordering exists across
    /// accounts.
    pub fn spawn_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if queue.stopped.load(Ordering::Acquire) {
                    break;
                }
                match queue.deadline_ms() {
                    None => queue.wake.notified().await,
                    Some(at) => {
                        let now = queue.clock.epoch_ms();
                        if at > now {
                            let sleep = tokio::time::sleep(Duration::from_millis(at - now));
                            tokio::select! {
                                () = sleep => {}
                                () = queue.wake.notified() => continue,
                            }
                        }
                        queue.claim_deadline();
                        queue.run_cycle().await;
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
