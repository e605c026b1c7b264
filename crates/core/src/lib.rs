// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! packsmith-core: domain types and pure scheduling logic for the booster
//! crafting scheduler. No I/O lives here — everything is driven by a
//! [`Clock`] so the cooldown and deadline arithmetic is fully testable.

pub mod macros;

pub mod booster;
pub mod clock;
pub mod eligibility;
pub mod event;
pub mod history;
pub mod id;
pub mod item;
pub mod time_fmt;

pub use booster::Booster;
#[cfg(any(test, feature = "test-support"))]
pub use booster::BoosterBuilder;
pub use clock::{Clock, FakeClock, SystemClock};
pub use eligibility::{EligibilityEntry, EligibilitySnapshot, GemPreference, GemTotals};
pub use event::{QueueEvent, RemovalReason, UnqueueableReason};
pub use history::{CraftHistory, CraftRecord, COOLDOWN_MS};
pub use id::JobId;
pub use item::{CraftKind, ItemId};
pub use time_fmt::{format_duration_ms, format_eta_ms};
