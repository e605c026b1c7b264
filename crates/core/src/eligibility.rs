// SPDX-License-Identifier: MIT

//! Eligibility snapshots and gem balances.
//!
//! The external service supplies, per account, a table of craftable items
//! (price, series, availability) plus the account's gem balances. The table
//! is a point-in-time snapshot: each refresh replaces it wholesale, and a
//! booster's stored entry is swapped for the fresh one rather than patched.

use crate::item::ItemId;
use serde::{Deserialize, Serialize};

/// One row of the eligibility table: everything the scheduler knows about
/// crafting a single item for a single account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityEntry {
    pub item: ItemId,
    pub name: String,
    /// Catalog series (tier) the craft request must echo back.
    pub series: u32,
    /// Price in gems.
    pub price: u64,
    /// True while the item is cooling down.
    #[serde(default)]
    pub unavailable: bool,
    /// Service-reported end of cooldown, minute resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_at_ms: Option<u64>,
    /// Whether the crafted good can be traded away.
    #[serde(default)]
    pub tradable: bool,
    /// Whether the crafted good can be listed on the market.
    #[serde(default)]
    pub marketable: bool,
}

/// Per-account gem balances, split by tradability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GemTotals {
    pub total: u64,
    pub tradable: u64,
    pub untradable: u64,
}

impl GemTotals {
    pub fn new(tradable: u64, untradable: u64) -> Self {
        Self { total: tradable + untradable, tradable, untradable }
    }

    /// The balance a craft may spend under the given policy.
    pub fn usable(&self, allow_untradable: bool) -> u64 {
        if allow_untradable {
            self.total
        } else {
            self.tradable
        }
    }
}

/// Which gem pool a craft request should consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GemPreference {
    /// Spend tradable gems only.
    Tradable,
    /// Spend tradable first, topped up from untradable.
    Mixed,
}

impl GemPreference {
    /// Pick the preference for one craft, strictly greedy per item: the
    /// price of other queued boosters is not reserved against the balance.
    pub fn for_price(totals: GemTotals, price: u64, allow_untradable: bool) -> Self {
        if !allow_untradable {
            return GemPreference::Tradable;
        }
        if totals.untradable > 0 && totals.tradable < price {
            GemPreference::Mixed
        } else {
            GemPreference::Tradable
        }
    }
}

crate::simple_display! {
    GemPreference {
        Tradable => "tradable",
        Mixed => "mixed",
    }
}

/// Result of one eligibility refresh: balances plus the full table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EligibilitySnapshot {
    pub gems: GemTotals,
    pub entries: Vec<EligibilityEntry>,
}

impl EligibilitySnapshot {
    pub fn entry(&self, item: ItemId) -> Option<&EligibilityEntry> {
        self.entries.iter().find(|e| e.item == item)
    }
}

#[cfg(test)]
#[path = "eligibility_tests.rs"]
mod tests;
