// SPDX-License-Identifier: MIT

use super::*;
use crate::test_support::{cooling_entry, entry, snapshot, Rig};
use packsmith_core::GemTotals;

const HOUR_MS: u64 = 3_600_000;

#[tokio::test]
async fn duplicate_ids_collapse_at_creation() {
    let rig = Rig::new();
    rig.backend.set_snapshot(snapshot(
        GemTotals::new(5_000, 0),
        vec![cooling_entry(100, 1_000, 1_900_000_000_000)],
    ));
    let job = rig
        .handler
        .schedule(vec![ItemId(100), ItemId(100), ItemId(100)], None)
        .unwrap();

    assert_eq!(job.uncrafted_ids(), vec![ItemId(100)]);
    rig.cycle().await;
    assert_eq!(rig.handler.queue().live_count(), 1);
}

#[tokio::test]
async fn unschedule_with_no_filters_removes_everything() {
    let rig = Rig::new();
    rig.backend.set_snapshot(snapshot(
        GemTotals::new(5_000, 0),
        vec![
            cooling_entry(100, 1_000, 1_900_000_000_000),
            cooling_entry(200, 1_000, 1_900_000_000_000),
        ],
    ));
    let job = rig.handler.schedule(vec![ItemId(100), ItemId(200)], None).unwrap();
    rig.cycle().await;

    let mut removed = job.unschedule(None, None);
    removed.sort();
    assert_eq!(removed, vec![ItemId(100), ItemId(200)]);
    assert_eq!(rig.handler.queue().live_count(), 0);
    assert!(job.is_finished());
}

#[tokio::test]
async fn unschedule_by_id_leaves_the_rest() {
    let rig = Rig::new();
    rig.backend.set_snapshot(snapshot(
        GemTotals::new(5_000, 0),
        vec![
            cooling_entry(100, 1_000, 1_900_000_000_000),
            cooling_entry(200, 1_000, 1_900_000_000_000),
        ],
    ));
    let job = rig.handler.schedule(vec![ItemId(100), ItemId(200)], None).unwrap();
    rig.cycle().await;

    assert_eq!(job.unschedule(Some(&[ItemId(100)]), None), vec![ItemId(100)]);
    assert_eq!(rig.handler.queue().live_count(), 1);
    assert!(!job.is_finished());
    assert_eq!(job.uncrafted_ids(), vec![ItemId(200)]);
}

#[tokio::test]
async fn unschedule_older_than_keeps_near_term_boosters() {
    let rig = Rig::new();
    let t0 = rig.clock.epoch_ms();
    rig.backend.set_snapshot(snapshot(
        GemTotals::new(5_000, 0),
        vec![
            cooling_entry(100, 1_000, t0 + HOUR_MS),
            cooling_entry(200, 1_000, t0 + 72 * HOUR_MS),
        ],
    ));
    let job = rig.handler.schedule(vec![ItemId(100), ItemId(200)], None).unwrap();
    rig.cycle().await;

    // Only item 200's deadline is beyond 48 hours out
    assert_eq!(job.unschedule(None, Some(48)), vec![ItemId(200)]);
    assert_eq!(rig.handler.queue().live_count(), 1);
    assert!(rig.handler.queue().has_booster(ItemId(100)));
}

#[tokio::test]
async fn unschedule_requires_all_given_filters_to_match() {
    let rig = Rig::new();
    let t0 = rig.clock.epoch_ms();
    rig.backend.set_snapshot(snapshot(
        GemTotals::new(5_000, 0),
        vec![
            cooling_entry(100, 1_000, t0 + HOUR_MS),
            cooling_entry(200, 1_000, t0 + 72 * HOUR_MS),
        ],
    ));
    let job = rig.handler.schedule(vec![ItemId(100), ItemId(200)], None).unwrap();
    rig.cycle().await;

    // Item 100 matches the id filter but not the age filter
    assert!(job.unschedule(Some(&[ItemId(100)]), Some(48)).is_empty());
    assert_eq!(rig.handler.queue().live_count(), 2);
}

#[tokio::test]
async fn unscheduling_a_pending_id_withdraws_it_before_resolution() {
    let rig = Rig::new();
    rig.backend.set_snapshot(snapshot(
        GemTotals::new(5_000, 0),
        vec![entry(100, 1_000), entry(200, 1_000)],
    ));
    let job = rig.handler.schedule(vec![ItemId(100), ItemId(200)], None).unwrap();

    // Cancel item 200 while both ids are still awaiting their first refresh
    assert_eq!(job.unschedule(Some(&[ItemId(200)]), None), vec![ItemId(200)]);
    rig.cycle().await;
    rig.cycle().await;

    let crafted: Vec<ItemId> = rig.backend.crafts().iter().map(|c| c.item).collect();
    assert_eq!(crafted, vec![ItemId(100)]);
    assert!(!rig.handler.queue().has_booster(ItemId(200)));
}

#[tokio::test]
async fn stopping_a_job_withdraws_its_pending_ids() {
    let rig = Rig::new();
    rig.backend.set_snapshot(snapshot(GemTotals::new(5_000, 0), vec![entry(100, 1_000)]));
    let job = rig.handler.schedule(vec![ItemId(100)], None).unwrap();

    job.stop();
    rig.cycle().await;
    assert!(rig.backend.crafts().is_empty());
    assert_eq!(rig.handler.queue().live_count(), 0);
}

#[tokio::test]
async fn stopped_job_evicts_boosters_and_ignores_later_events() {
    let rig = Rig::new();
    rig.backend.set_snapshot(snapshot(
        GemTotals::new(5_000, 0),
        vec![cooling_entry(100, 1_000, 1_900_000_000_000)],
    ));
    let job = rig.handler.schedule(vec![ItemId(100)], None).unwrap();
    rig.cycle().await;
    assert_eq!(rig.handler.queue().live_count(), 1);

    job.stop();
    assert!(job.is_stopped());
    assert_eq!(rig.handler.queue().live_count(), 0);
    assert!(job.uncrafted_ids().is_empty());
    assert!(rig.handler.registry().find(job.id()).is_none());

    // Late event for an id the job once held is a no-op
    job.handle_event(&QueueEvent::Queued { item: ItemId(100) });
    assert!(job.uncrafted_ids().is_empty());
}

#[tokio::test]
async fn report_destination_overrides_the_account_source() {
    let rig = Rig::new();
    rig.backend.set_snapshot(snapshot(GemTotals::new(5_000, 0), vec![entry(100, 1_000)]));
    let job = rig
        .handler
        .schedule(vec![ItemId(100)], Some(SmolStr::new("ops-channel")))
        .unwrap();
    assert_eq!(job.source(), "ops-channel");

    rig.cycle().await;
    rig.reporter.flush().await;
    let sent = rig.messenger.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "ops-channel");
}

#[tokio::test]
async fn restored_job_resolves_silently() {
    let rig = Rig::new();
    rig.backend.set_snapshot(snapshot(
        GemTotals::new(5_000, 0),
        vec![cooling_entry(100, 1_000, 1_900_000_000_000)],
    ));
    let job = CraftJob::new(
        crate::test_support::ACCOUNT,
        CraftKind::OneTime,
        vec![ItemId(100)],
        None,
        true,
        rig.handler.queue().clone(),
        rig.reporter.clone(),
        rig.clock.clone(),
    );
    job.set_registry(Arc::downgrade(rig.handler.registry()));
    rig.handler.registry().register(job.clone());
    job.submit();

    rig.cycle().await;
    assert!(!job.has_unresolved(ItemId(100)));
    // No "queued" chatter for restored work
    assert!(rig.reporter.deadline_ms().is_none());
    assert!(rig.messenger.sent().is_empty());
}

#[tokio::test]
async fn status_line_reflects_progress() {
    let rig = Rig::new();
    let t0 = rig.clock.epoch_ms();
    rig.backend.set_snapshot(snapshot(
        GemTotals::new(5_000, 0),
        vec![entry(100, 1_000), cooling_entry(200, 500, t0 + HOUR_MS)],
    ));
    let job = rig.handler.schedule(vec![ItemId(100), ItemId(200)], None).unwrap();
    rig.cycle().await;

    let line = job.status_line();
    assert!(line.starts_with("[one-time]"), "got: {line}");
    assert!(line.contains("1 queued"), "got: {line}");
    assert!(line.contains("1 crafted"), "got: {line}");
    assert!(line.contains("500 gems needed"), "got: {line}");
}

#[tokio::test]
async fn gems_needed_prices_off_live_boosters() {
    let rig = Rig::new();
    let t0 = rig.clock.epoch_ms();
    rig.backend.set_snapshot(snapshot(
        GemTotals::new(0, 0),
        vec![
            cooling_entry(100, 1_000, t0 + HOUR_MS),
            cooling_entry(200, 750, t0 + HOUR_MS),
        ],
    ));
    let job = rig.handler.schedule(vec![ItemId(100), ItemId(200)], None).unwrap();
    assert_eq!(job.gems_needed(), 0);

    rig.cycle().await;
    assert_eq!(job.gems_needed(), 1_750);
}
