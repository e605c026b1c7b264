// SPDX-License-Identifier: MIT

use super::*;
use crate::test_support::{cooling_entry, snapshot, Rig};
use packsmith_core::GemTotals;

#[tokio::test]
async fn schedule_reports_the_accepted_count() {
    let rig = Rig::new();
    rig.backend.set_snapshot(snapshot(
        GemTotals::new(0, 0),
        vec![cooling_entry(100, 1_000, 1_900_000_000_000)],
    ));
    let reply = schedule(&rig.handler, &[ItemId(100), ItemId(200)], None);
    assert_eq!(reply, "Accepted 2 booster(s) for crafting.");

    let reply = schedule_recurring(&rig.handler, &[ItemId(100)], Some("ops"));
    assert_eq!(reply, "Accepted 1 booster(s) for permanent crafting.");
    assert_eq!(permanent_job_count(&rig.handler), 1);
}

#[tokio::test]
async fn schedule_with_no_items_declines() {
    let rig = Rig::new();
    assert_eq!(schedule(&rig.handler, &[], None), "Nothing to queue.");
    assert!(rig.handler.registry().jobs().is_empty());
}

#[tokio::test]
async fn unschedule_names_what_it_removed() {
    let rig = Rig::new();
    rig.backend.set_snapshot(snapshot(
        GemTotals::new(0, 0),
        vec![
            cooling_entry(100, 1_000, 1_900_000_000_000),
            cooling_entry(200, 1_000, 1_900_000_000_000),
        ],
    ));
    schedule(&rig.handler, &[ItemId(100), ItemId(200)], None);
    rig.cycle().await;

    let reply = unschedule(&rig.handler, Some(&[ItemId(100)]), None);
    assert_eq!(reply, "Removed 1 booster(s): 100.");

    let reply = unschedule(&rig.handler, Some(&[ItemId(999)]), None);
    assert_eq!(reply, "Nothing matched, no boosters removed.");
}

#[tokio::test]
async fn status_with_no_jobs_says_so() {
    let rig = Rig::new();
    assert_eq!(status(&rig.handler, true), "alice: no boosters queued.");
}

#[tokio::test]
async fn short_status_aggregates_the_account() {
    let rig = Rig::new();
    let t0 = rig.clock.epoch_ms();
    rig.backend.set_snapshot(snapshot(
        GemTotals::new(0, 0),
        vec![
            cooling_entry(100, 1_000, t0 + 3_600_000),
            cooling_entry(200, 500, t0 + 7_200_000),
        ],
    ));
    schedule(&rig.handler, &[ItemId(100)], None);
    schedule(&rig.handler, &[ItemId(200)], None);
    rig.cycle().await;

    let line = status(&rig.handler, true);
    assert!(line.starts_with("alice: 2 booster(s) across 2 job(s)"), "got: {line}");
    assert!(line.contains("1500 gems needed"), "got: {line}");
    assert!(line.contains("next craft in 1h 1m"), "got: {line}");
}

#[tokio::test]
async fn long_status_lists_each_job() {
    let rig = Rig::new();
    rig.backend.set_snapshot(snapshot(
        GemTotals::new(0, 0),
        vec![cooling_entry(100, 1_000, 1_900_000_000_000)],
    ));
    schedule(&rig.handler, &[ItemId(100)], None);
    schedule_recurring(&rig.handler, &[ItemId(200)], None);
    rig.cycle().await;

    let text = status(&rig.handler, false);
    assert!(text.starts_with("alice:\n"), "got: {text}");
    assert!(text.contains("[one-time]"), "got: {text}");
    assert!(text.contains("[permanent]"), "got: {text}");
}

#[tokio::test]
async fn gems_needed_sums_live_boosters() {
    let rig = Rig::new();
    rig.backend.set_snapshot(snapshot(
        GemTotals::new(0, 0),
        vec![cooling_entry(100, 1_250, 1_900_000_000_000)],
    ));
    schedule(&rig.handler, &[ItemId(100)], None);
    rig.cycle().await;
    assert_eq!(gems_needed(&rig.handler), 1_250);
}
