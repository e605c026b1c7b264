// SPDX-License-Identifier: MIT

//! Craft history: the per-account `item → last craft` map that keeps
//! cooldown deadlines accurate across restarts.
//!
//! Entries expire with the 24-hour cooldown itself. Expiry is lazy: a read
//! past the window purges the entry and reports it absent, so no sweeper
//! task is needed.

use crate::item::ItemId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The fixed per-item cooldown after a craft.
pub const COOLDOWN_MS: u64 = 24 * 60 * 60 * 1000;

/// Record of one successful craft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CraftRecord {
    /// When the craft was confirmed, epoch ms.
    pub crafted_at_ms: u64,
    /// Stagger delay that was applied to this craft. Persists through the
    /// cooldown window so it is never applied twice.
    #[serde(default)]
    pub delay_ms: u64,
}

impl CraftRecord {
    /// End of this record's cooldown window.
    pub fn cooldown_ends_ms(&self) -> u64 {
        self.crafted_at_ms + COOLDOWN_MS
    }
}

/// In-memory craft history for one account.
///
/// Persistence is layered on top (packsmith-storage); this type only owns
/// the map semantics: purge-on-read and max-delay merge on upsert.
#[derive(Debug, Clone, Default)]
pub struct CraftHistory {
    entries: HashMap<ItemId, CraftRecord>,
}

impl CraftHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(entries: HashMap<ItemId, CraftRecord>) -> Self {
        Self { entries }
    }

    /// Look up the record for an item. An entry whose cooldown has fully
    /// elapsed is treated as absent and purged.
    pub fn get(&mut self, item: ItemId, now_ms: u64) -> Option<CraftRecord> {
        match self.entries.get(&item) {
            Some(rec) if rec.cooldown_ends_ms() + rec.delay_ms >= now_ms => Some(*rec),
            Some(_) => {
                self.entries.remove(&item);
                None
            }
            None => None,
        }
    }

    /// Upsert a craft record. If an entry already exists the applied delay
    /// is merged with `max`: a stagger delay applied once holds for the
    /// whole cooldown window.
    pub fn record(&mut self, item: ItemId, crafted_at_ms: u64, delay_ms: u64) {
        let delay_ms = match self.entries.get(&item) {
            Some(old) => old.delay_ms.max(delay_ms),
            None => delay_ms,
        };
        self.entries.insert(item, CraftRecord { crafted_at_ms, delay_ms });
    }

    /// Drop every entry whose cooldown has elapsed. Called before saving so
    /// stale rows never hit disk.
    pub fn prune(&mut self, now_ms: u64) {
        self.entries.retain(|_, rec| rec.cooldown_ends_ms() + rec.delay_ms >= now_ms);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot the map for persistence.
    pub fn to_map(&self) -> HashMap<ItemId, CraftRecord> {
        self.entries.clone()
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
