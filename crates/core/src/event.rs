// SPDX-License-Identifier: MIT

//! Queue events delivered to the owning job.

use crate::item::ItemId;
use serde::{Deserialize, Serialize};

/// Why an item id could not be turned into a queued booster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnqueueableReason {
    /// Unknown to the eligibility table; dropped permanently.
    Uncraftable,
    /// Filtered by the tradability/marketability policy; dropped permanently.
    Unmarketable,
    /// Another booster already holds this item's slot. Not terminal —
    /// the caller should retry once that slot frees up.
    AlreadyQueued,
}

impl UnqueueableReason {
    /// Whether the id should be dropped from its job for good.
    pub fn is_permanent(self) -> bool {
        !matches!(self, UnqueueableReason::AlreadyQueued)
    }
}

crate::simple_display! {
    UnqueueableReason {
        Uncraftable => "not craftable",
        Unmarketable => "filtered by marketability policy",
        AlreadyQueued => "already queued",
    }
}

/// Why a live booster left the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    Crafted,
    RemovedByUser,
    /// The item vanished from the eligibility table mid-flight.
    UnexpectedlyUncraftable,
    /// The craft call failed and verification confirmed the failure as real.
    CraftFailed,
    JobStopped,
}

crate::simple_display! {
    RemovalReason {
        Crafted => "crafted",
        RemovedByUser => "removed by user",
        UnexpectedlyUncraftable => "no longer craftable",
        CraftFailed => "craft failed",
        JobStopped => "job stopped",
    }
}

/// Event delivered from the queue to the job owning the affected item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    /// The id resolved against the eligibility table and a booster was queued.
    Queued { item: ItemId },
    /// The id could not be queued.
    Unqueueable { item: ItemId, reason: UnqueueableReason },
    /// A live booster was removed from the queue.
    Dequeued { item: ItemId, reason: RemovalReason },
}

impl QueueEvent {
    pub fn item(&self) -> ItemId {
        match self {
            QueueEvent::Queued { item }
            | QueueEvent::Unqueueable { item, .. }
            | QueueEvent::Dequeued { item, .. } => *item,
        }
    }

    /// Event name for log spans
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::Queued { .. } => "queue:queued",
            QueueEvent::Unqueueable { .. } => "queue:unqueueable",
            QueueEvent::Dequeued { .. } => "queue:dequeued",
        }
    }
}
