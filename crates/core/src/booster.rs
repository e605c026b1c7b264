// SPDX-License-Identifier: MIT

//! One queued craft attempt for one item.
//!
//! A booster is owned by exactly one job at a time and lives in the queue's
//! live set until it is crafted, removed by the user, or becomes
//! permanently ineligible. Its availability deadline is always derived from
//! the current eligibility snapshot plus the prior craft record — never
//! stored as authoritative state — so a refresh can only ever move it
//! toward the truth.

use crate::eligibility::EligibilityEntry;
use crate::history::{CraftRecord, COOLDOWN_MS};
use crate::id::JobId;
use crate::item::{CraftKind, ItemId};

const MINUTE_MS: u64 = 60 * 1000;

#[derive(Debug, Clone)]
pub struct Booster {
    /// Job this booster currently belongs to.
    pub job: JobId,
    pub item: ItemId,
    pub kind: CraftKind,
    /// Eligibility snapshot row, replaced wholesale on each refresh.
    pub entry: EligibilityEntry,
    pub created_at_ms: u64,
    /// Craft record from before this booster was queued, if the item was
    /// crafted within the last cooldown window.
    pub prior: Option<CraftRecord>,
    crafted: bool,
}

impl Booster {
    pub fn new(
        job: JobId,
        kind: CraftKind,
        entry: EligibilityEntry,
        created_at_ms: u64,
        prior: Option<CraftRecord>,
    ) -> Self {
        Self { item: entry.item, job, kind, entry, created_at_ms, prior, crafted: false }
    }

    pub fn crafted(&self) -> bool {
        self.crafted
    }

    /// Flip the crafted flag. Returns true only on the first call, so the
    /// caller can assert the at-most-once craft property.
    pub fn mark_crafted(&mut self) -> bool {
        !std::mem::replace(&mut self.crafted, true)
    }

    /// Replace the eligibility snapshot after a refresh.
    pub fn update_entry(&mut self, entry: EligibilityEntry) {
        debug_assert_eq!(entry.item, self.item);
        self.entry = entry;
    }

    /// Earliest time this booster may be crafted, epoch ms.
    ///
    /// The service reports "available again" with minute resolution only.
    /// When a prior craft record lands within a minute of that timestamp we
    /// trust our own record and compute the exact cooldown end; the delay
    /// already embedded in the record is subtracted from `extra_delay_ms`
    /// so a stagger delay never stacks across the window. Without a
    /// matching record the reported minute is rounded up, guaranteeing the
    /// cooldown has actually elapsed when the timer fires.
    pub fn available_at_ms(&self, extra_delay_ms: u64) -> u64 {
        if !self.entry.unavailable {
            return self.created_at_ms + extra_delay_ms;
        }
        let reported = match self.entry.available_at_ms {
            Some(ms) => ms,
            // Unavailable but no timestamp: the service is mid-update,
            // treat as ready and let the craft-time check sort it out.
            None => return self.created_at_ms + extra_delay_ms,
        };
        if let Some(rec) = self.prior {
            let exact = rec.crafted_at_ms + COOLDOWN_MS;
            if exact.abs_diff(reported) <= MINUTE_MS {
                return exact + extra_delay_ms.saturating_sub(rec.delay_ms);
            }
        }
        reported + MINUTE_MS + extra_delay_ms
    }

    /// Whether the booster is due at `now_ms` under the given stagger delay.
    pub fn is_due(&self, now_ms: u64, extra_delay_ms: u64) -> bool {
        !self.crafted && self.available_at_ms(extra_delay_ms) <= now_ms
    }
}

crate::builder! {
    pub struct BoosterBuilder => Booster {
        into {
            job: JobId = "job-test",
        }
        set {
            item: ItemId = ItemId(268500),
            kind: CraftKind = CraftKind::OneTime,
            entry: EligibilityEntry = EligibilityEntry {
                item: ItemId(268500),
                name: "Test Pack".to_string(),
                series: 1,
                price: 1000,
                unavailable: false,
                available_at_ms: None,
                tradable: true,
                marketable: true,
            },
            created_at_ms: u64 = 1_700_000_000_000,
        }
        option {
            prior: CraftRecord = None,
        }
        computed {
            crafted: bool = false,
        }
    }
}

#[cfg(test)]
#[path = "booster_tests.rs"]
mod tests;
