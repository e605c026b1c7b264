// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! packsmith-engine: the booster crafting scheduler.
//!
//! Per account, a [`CraftQueue`] owns the live set of queued boosters, the
//! event-driven eligibility refresh with capped backoff, and a single
//! serialized execution cycle. [`CraftJob`]s track what a user (or restored
//! configuration) asked for and react to queue events; the [`JobRegistry`]
//! aggregates across jobs; the [`AccountHandler`] ties one account's queue,
//! registry and policy together; the [`StatusReporter`] debounces
//! human-readable status lines across all accounts.

pub mod backend;
pub mod commands;
pub mod config;
pub mod handler;
pub mod job;
pub mod queue;
pub mod registry;
pub mod reporter;

#[cfg(test)]
pub(crate) mod test_support;

pub use backend::{BackendError, CraftBackend, CraftOutcome, Messenger};
pub use config::SchedulerConfig;
pub use handler::{AccountHandler, HandlerRegistry};
pub use job::CraftJob;
pub use queue::CraftQueue;
pub use registry::JobRegistry;
pub use reporter::StatusReporter;
