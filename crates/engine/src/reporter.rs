// SPDX-License-Identifier: MIT

//! Debounced, multi-source status batcher.
//!
//! Any component may drop a status line for a source key at any time; the
//! reporter buffers per source and flushes a whole batch once a source has
//! been quiet for five seconds. This keeps a user from being flooded when a
//! batch of items resolves near-simultaneously.

use crate::backend::Messenger;
use packsmith_core::Clock;
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Quiet period after the last message before a flush.
const QUIET_PERIOD_MS: u64 = 5_000;
/// Retry interval when the destination is unreachable at flush time.
const UNREACHABLE_RETRY_MS: u64 = 60_000;

#[derive(Default)]
struct ReporterState {
    /// BTreeMap so flushes walk sources in stable sorted order.
    pending: BTreeMap<SmolStr, Vec<String>>,
    /// Most recently flushed batch per source, for duplicate suppression.
    last_flushed: HashMap<SmolStr, Vec<String>>,
    /// Single pending flush deadline, epoch ms.
    deadline_ms: Option<u64>,
}

pub struct StatusReporter<C: Clock> {
    messenger: Arc<dyn Messenger>,
    clock: C,
    state: Mutex<ReporterState>,
    wake: Notify,
    stopped: AtomicBool,
}

impl<C: Clock> StatusReporter<C> {
    pub fn new(messenger: Arc<dyn Messenger>, clock: C) -> Self {
        Self {
            messenger,
            clock,
            state: Mutex::new(ReporterState::default()),
            wake: Notify::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Buffer one status line for a source. Every call resets the source's
    /// quiet period. With `suppress_duplicates`, a line already sitting in
    /// the pending buffer or in the source's most recently flushed batch is
    /// silently dropped.
    pub fn report(&self, source: &str, message: impl Into<String>, suppress_duplicates: bool) {
        let message = message.into();
        {
            let mut state = self.state.lock();
            if suppress_duplicates {
                let pending_dup =
                    state.pending.get(source).is_some_and(|msgs| msgs.contains(&message));
                let flushed_dup =
                    state.last_flushed.get(source).is_some_and(|msgs| msgs.contains(&message));
                if pending_dup || flushed_dup {
                    return;
                }
            }
            state.pending.entry(SmolStr::new(source)).or_default().push(message);
            state.deadline_ms = Some(self.clock.epoch_ms() + QUIET_PERIOD_MS);
        }
        self.wake.notify_one();
    }

    /// Next flush deadline, if any batch is pending.
    pub fn deadline_ms(&self) -> Option<u64> {
        self.state.lock().deadline_ms
    }

    /// Flush every buffered source whose destination is reachable. Sources
    /// that cannot be reached keep their buffers and the flush is re-armed a
    /// minute out. Returns the number of messages sent.
    pub async fn flush(&self) -> usize {
        let batches: Vec<(SmolStr, Vec<String>)> = {
            let mut state = self.state.lock();
            state.deadline_ms = None;
            let sources: Vec<SmolStr> = state.pending.keys().cloned().collect();
            let mut out = Vec::new();
            for source in sources {
                if self.messenger.can_reach(&source) {
                    if let Some(msgs) = state.pending.remove(&source) {
                        out.push((source, msgs));
                    }
                } else {
                    tracing::debug!(source = %source, "destination unreachable, delaying flush");
                    state.deadline_ms = Some(self.clock.epoch_ms() + UNREACHABLE_RETRY_MS);
                }
            }
            out
        };

        let mut sent = 0;
        for (source, msgs) in batches {
            let text = msgs.join("\n");
            match self.messenger.send(&source, &text).await {
                Ok(()) => {
                    sent += 1;
                    self.state.lock().last_flushed.insert(source, msgs);
                }
                Err(e) => {
                    tracing::warn!(source = %source, error = %e, "failed to deliver status batch");
                    // Put the batch back so the next flush retries it
                    let mut state = self.state.lock();
                    let slot = state.pending.entry(source).or_default();
                    let mut restored = msgs;
                    restored.append(slot);
                    *slot = restored;
                    state.deadline_ms = Some(self.clock.epoch_ms() + UNREACHABLE_RETRY_MS);
                }
            }
        }
        sent
    }

    /// Background flusher: waits out the quiet period and flushes.
    pub fn spawn_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let reporter = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if reporter.stopped.load(Ordering::Acquire) {
                    break;
                }
                match reporter.deadline_ms() {
                    None => reporter.wake.notified().await,
                    Some(at) => {
                        let now = reporter.clock.epoch_ms();
                        if at > now {
                            let sleep = tokio::time::sleep(Duration::from_millis(at - now));
                            tokio::select! {
                                () = sleep => {}
                                () = reporter.wake.notified() => continue,
                            }
                        }
                        reporter.flush().await;
                    }
                }
            }
        })
    }

    /// Stop the background flusher after a final flush opportunity.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}

#[cfg(test)]
#[path = "reporter_tests.rs"]
mod tests;
