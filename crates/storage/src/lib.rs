// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! packsmith-storage: durable per-account records.
//!
//! One JSON file per account holds the craft history and the still-active
//! job states, so a restart neither re-crafts an item inside its cooldown
//! window nor forgets what the user asked for. Saves are atomic
//! (write-to-temp then rename) with rotating `.bak` copies; callers fire
//! and forget.

mod record;
mod store;

pub use record::{AccountRecord, JobRecord, CURRENT_RECORD_VERSION};
pub use store::{AccountStore, StoreError};
