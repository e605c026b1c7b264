// SPDX-License-Identifier: MIT

//! Shape of the persisted per-account record.

use packsmith_core::{CraftKind, CraftRecord, ItemId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current record schema version
pub const CURRENT_RECORD_VERSION: u32 = 1;

/// Serialized state of one still-active craft job: the ids it has not
/// finished crafting (unresolved and resolved-but-uncrafted alike collapse
/// back to plain ids — the queue re-resolves them on restore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(default)]
    pub kind: CraftKind,
    pub item_ids: Vec<ItemId>,
    /// Destination for status messages (chat/channel identifier owned by
    /// the messaging collaborator).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_to: Option<String>,
}

/// Everything persisted for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Schema version for migrations
    #[serde(rename = "v")]
    pub version: u32,
    #[serde(default)]
    pub craft_history: HashMap<ItemId, CraftRecord>,
    #[serde(default)]
    pub jobs: Vec<JobRecord>,
}

impl AccountRecord {
    pub fn new(craft_history: HashMap<ItemId, CraftRecord>, jobs: Vec<JobRecord>) -> Self {
        Self { version: CURRENT_RECORD_VERSION, craft_history, jobs }
    }
}

impl Default for AccountRecord {
    fn default() -> Self {
        Self::new(HashMap::new(), Vec::new())
    }
}
