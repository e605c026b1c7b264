// SPDX-License-Identifier: MIT

//! Catalog item identity and craft categories.

use serde::{Deserialize, Serialize};

/// Numeric catalog identifier of a craftable item.
///
/// The external service keys its eligibility table by these; user commands
/// pass them in as plain integers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ItemId(pub u32);

impl ItemId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ItemId {
    fn from(v: u32) -> Self {
        ItemId(v)
    }
}

impl std::str::FromStr for ItemId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(ItemId)
    }
}

/// Whether a scheduling request is a one-time batch or recurs forever.
///
/// A job and the boosters it owns share the same kind: a `Permanent` job's
/// crafted item goes straight back onto its unresolved list, so the job
/// never finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CraftKind {
    #[default]
    OneTime,
    Permanent,
}

impl CraftKind {
    pub fn is_permanent(self) -> bool {
        matches!(self, CraftKind::Permanent)
    }
}

crate::simple_display! {
    CraftKind {
        OneTime => "one-time",
        Permanent => "permanent",
    }
}
