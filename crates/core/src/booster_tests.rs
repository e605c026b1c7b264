// SPDX-License-Identifier: MIT

use super::*;
use crate::eligibility::EligibilityEntry;
use proptest::prelude::*;

const T0: u64 = 1_700_000_000_000;
const HOUR: u64 = 60 * 60 * 1000;
const MIN: u64 = 60 * 1000;

fn entry(unavailable: bool, available_at_ms: Option<u64>) -> EligibilityEntry {
    EligibilityEntry {
        item: ItemId(268500),
        name: "Test Pack".to_string(),
        series: 1,
        price: 1000,
        unavailable,
        available_at_ms,
        tradable: true,
        marketable: true,
    }
}

#[test]
fn available_item_is_due_at_creation() {
    let b = Booster::builder().entry(entry(false, None)).created_at_ms(T0).build();
    assert_eq!(b.available_at_ms(0), T0);
    assert!(b.is_due(T0, 0));
}

#[test]
fn available_item_honors_extra_delay() {
    let b = Booster::builder().entry(entry(false, None)).created_at_ms(T0).build();
    assert_eq!(b.available_at_ms(5_000), T0 + 5_000);
    assert!(!b.is_due(T0, 5_000));
    assert!(b.is_due(T0 + 5_000, 5_000));
}

#[test]
fn unavailable_without_record_rounds_reported_minute_up() {
    // Reported timestamp has minute resolution; without our own record the
    // real cooldown end may be up to a minute later.
    let reported = T0 + 3 * HOUR;
    let b = Booster::builder().entry(entry(true, Some(reported))).created_at_ms(T0).build();
    assert_eq!(b.available_at_ms(0), reported + MIN);
}

#[test]
fn matching_craft_record_gives_exact_deadline() {
    let crafted_at = T0 - 2 * HOUR;
    let exact = crafted_at + COOLDOWN_MS;
    // Service truncates to the minute below the exact deadline
    let reported = exact - (exact % MIN);
    let b = Booster::builder()
        .entry(entry(true, Some(reported)))
        .created_at_ms(T0)
        .prior(CraftRecord { crafted_at_ms: crafted_at, delay_ms: 0 })
        .build();
    assert_eq!(b.available_at_ms(0), exact);
}

#[test]
fn prior_delay_is_not_applied_twice() {
    let delay = 90_000;
    let crafted_at = T0 - 2 * HOUR;
    let exact = crafted_at + COOLDOWN_MS;
    let reported = exact - (exact % MIN);
    let b = Booster::builder()
        .entry(entry(true, Some(reported)))
        .created_at_ms(T0)
        .prior(CraftRecord { crafted_at_ms: crafted_at, delay_ms: delay })
        .build();
    // Same stagger delay requested again: already embedded in the record
    assert_eq!(b.available_at_ms(delay), exact);
    // A larger request applies only the difference
    assert_eq!(b.available_at_ms(delay + 30_000), exact + 30_000);
}

#[test]
fn mismatched_record_falls_back_to_reported_minute() {
    // Record is from a craft more than a minute away from the reported
    // timestamp (e.g. crafted by another actor since then)
    let reported = T0 + 20 * HOUR;
    let b = Booster::builder()
        .entry(entry(true, Some(reported)))
        .created_at_ms(T0)
        .prior(CraftRecord { crafted_at_ms: T0 - 10 * HOUR, delay_ms: 0 })
        .build();
    assert_eq!(b.available_at_ms(0), reported + MIN);
}

#[test]
fn unavailable_without_timestamp_treated_as_ready() {
    let b = Booster::builder().entry(entry(true, None)).created_at_ms(T0).build();
    assert_eq!(b.available_at_ms(0), T0);
}

#[test]
fn mark_crafted_transitions_once() {
    let mut b = Booster::builder().build();
    assert!(!b.crafted());
    assert!(b.mark_crafted());
    assert!(b.crafted());
    // Second call reports no transition and the flag never reverts
    assert!(!b.mark_crafted());
    assert!(b.crafted());
}

#[test]
fn crafted_booster_is_never_due() {
    let mut b = Booster::builder().entry(entry(false, None)).created_at_ms(T0).build();
    assert!(b.is_due(T0, 0));
    b.mark_crafted();
    assert!(!b.is_due(T0 + COOLDOWN_MS, 0));
}

#[test]
fn update_entry_replaces_snapshot_wholesale() {
    let mut b = Booster::builder().entry(entry(false, None)).created_at_ms(T0).build();
    let reported = T0 + 23 * HOUR;
    b.update_entry(entry(true, Some(reported)));
    assert_eq!(b.available_at_ms(0), reported + MIN);
}

proptest! {
    // Idempotence: with the snapshot and record fixed, the deadline is a
    // pure function of the extra delay.
    #[test]
    fn available_at_is_idempotent(
        unavailable in any::<bool>(),
        reported_min in 0u64..100_000,
        extra in 0u64..10_000_000,
        crafted_offset in 0u64..COOLDOWN_MS,
    ) {
        let reported = T0 + reported_min * MIN;
        let b = Booster::builder()
            .entry(entry(unavailable, Some(reported)))
            .created_at_ms(T0)
            .prior(CraftRecord { crafted_at_ms: T0 - crafted_offset, delay_ms: 0 })
            .build();
        prop_assert_eq!(b.available_at_ms(extra), b.available_at_ms(extra));
    }

    // The deadline never precedes the creation time for an available item.
    #[test]
    fn available_at_never_precedes_creation(extra in 0u64..10_000_000) {
        let b = Booster::builder().entry(entry(false, None)).created_at_ms(T0).build();
        prop_assert!(b.available_at_ms(extra) >= T0);
    }
}
