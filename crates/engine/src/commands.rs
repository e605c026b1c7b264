// SPDX-License-Identifier: MIT

//! Human-facing command layer.
//!
//! Thin wrappers that turn handler operations into the one-line replies a
//! chat front end sends back immediately. Anything slower than a lock
//! acquisition (resolution, crafting) reports later through the status
//! reporter instead.

use crate::handler::AccountHandler;
use packsmith_core::{format_eta_ms, Clock, CraftKind, ItemId};
use smol_str::SmolStr;
use std::fmt::Write as _;

/// Queue a one-time batch. Replies immediately; per-item outcomes follow
/// asynchronously once the ids resolve against the eligibility table.
pub fn schedule<C: Clock>(
    handler: &AccountHandler<C>,
    items: &[ItemId],
    report_to: Option<&str>,
) -> String {
    let job = handler.schedule(items.to_vec(), report_to.map(SmolStr::new));
    match job {
        None => "Nothing to queue.".to_string(),
        Some(job) => format!("Accepted {} booster(s) for crafting.", job.uncrafted_ids().len()),
    }
}

/// Queue a never-finishing batch: every item re-queues after each craft.
pub fn schedule_recurring<C: Clock>(
    handler: &AccountHandler<C>,
    items: &[ItemId],
    report_to: Option<&str>,
) -> String {
    let job = handler.schedule_permanent(items.to_vec(), report_to.map(SmolStr::new));
    match job {
        None => "Nothing to queue.".to_string(),
        Some(job) => format!(
            "Accepted {} booster(s) for permanent crafting.",
            job.uncrafted_ids().len()
        ),
    }
}

/// Remove queued boosters matching the filters (all of them with no
/// filters). Synchronous: the reply names what was removed.
pub fn unschedule<C: Clock>(
    handler: &AccountHandler<C>,
    items: Option<&[ItemId]>,
    older_than_hours: Option<u64>,
) -> String {
    let removed = handler.registry().unschedule_all(items, older_than_hours);
    if removed.is_empty() {
        return "Nothing matched, no boosters removed.".to_string();
    }
    let ids: Vec<String> = removed.iter().map(ToString::to_string).collect();
    format!("Removed {} booster(s): {}.", removed.len(), ids.join(", "))
}

/// One-line or per-job status summary for an account.
pub fn status<C: Clock>(handler: &AccountHandler<C>, short: bool) -> String {
    let registry = handler.registry();
    let jobs = registry.jobs();
    if jobs.is_empty() {
        return format!("{}: no boosters queued.", handler.account());
    }
    if short {
        let remaining = registry.total_remaining();
        let gems = registry.gems_needed();
        let mut line = format!(
            "{}: {remaining} booster(s) across {} job(s)",
            handler.account(),
            jobs.len()
        );
        if gems > 0 {
            let _ = write!(line, ", {gems} gems needed");
        }
        if let Some(at) = registry.next_craft_at_ms() {
            let _ = write!(line, ", next craft {}", format_eta_ms(handler.now_ms(), at));
        }
        line.push('.');
        return line;
    }
    let mut out = format!("{}:", handler.account());
    for job in jobs {
        let _ = write!(out, "\n  {}", job.status_line());
    }
    out
}

/// Gems still needed across every job, for the funds-changed integration.
pub fn gems_needed<C: Clock>(handler: &AccountHandler<C>) -> u64 {
    handler.registry().gems_needed()
}

/// Count of permanent jobs, used by front ends to warn before stop.
pub fn permanent_job_count<C: Clock>(handler: &AccountHandler<C>) -> usize {
    handler.registry().jobs_of_kind(CraftKind::Permanent).len()
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
