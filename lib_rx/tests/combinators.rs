//! Multi-source combinators.

mod common;

use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use common::{done_reason, local, record, values};
use lib_rx::{
    combine_latest_to_array, combine_latest_to_object, derived, init_stream, merge_flat, resolve_source,
    sync_to_array, sync_to_object, to_array, CombineLatestOptions, DerivedOptions, FinalValue, MergeFlatOptions,
    OnSourceDone, ResolveOptions, RxError, Stream, SyncOptions, ToArrayOptions,
};
use tokio::time::sleep;

fn sum(snapshot: &BTreeMap<String, Option<i32>>) -> i32 {
    snapshot.values().flatten().sum()
}

#[test]
fn test_combine_latest_breaks_on_first_done() {
    let a = init_stream::<i32>();
    let b = init_stream::<i32>();
    let combined = combine_latest_to_array(vec![a.as_stream(), b.as_stream()], CombineLatestOptions::default()).unwrap();
    let log = record(&combined);

    a.set(1).unwrap();
    b.set(2).unwrap();
    a.dispose("a finished");
    b.set(3).unwrap();

    assert_eq!(values(&log), vec![vec![Some(1), None], vec![Some(1), Some(2)]]);
    assert_eq!(done_reason(&log).as_deref(), Some("a finished"));
    assert_eq!(b.subscriber_count(), 0);
}

#[test]
fn test_combine_latest_allow_keeps_frozen_slot() {
    let a = init_stream::<i32>();
    let b = init_stream::<i32>();
    let options = CombineLatestOptions {
        on_source_done: OnSourceDone::Allow,
        ..Default::default()
    };
    let combined = combine_latest_to_object([("a", a.as_stream()), ("b", b.as_stream())], options).unwrap();
    let log = record(&combined);

    a.set(1).unwrap();
    a.dispose("a finished");
    b.set(3).unwrap();
    assert!(!combined.is_disposed());

    let last = values(&log).pop().unwrap();
    assert_eq!(last.get("a"), Some(&Some(1)));
    assert_eq!(last.get("b"), Some(&Some(3)));

    b.dispose("b finished");
    assert_eq!(done_reason(&log).as_deref(), Some("b finished"));
}

#[test]
fn test_combine_latest_needs_sources() {
    let none: Vec<Stream<i32>> = Vec::new();
    let err = combine_latest_to_array(none, CombineLatestOptions::default()).unwrap_err();
    assert!(matches!(err, RxError::MissingConfiguration(_)));
}

#[test]
fn test_named_combinators_reject_duplicate_names() {
    let a = init_stream::<i32>();
    let b = init_stream::<i32>();

    let err = combine_latest_to_object([("x", a.as_stream()), ("x", b.as_stream())], CombineLatestOptions::default())
        .unwrap_err();
    assert!(matches!(err, RxError::MissingConfiguration(_)));

    let err = derived(sum, [("x", a.as_stream()), ("x", b.as_stream())], DerivedOptions::default()).unwrap_err();
    assert!(matches!(err, RxError::MissingConfiguration(_)));

    let err = sync_to_object([("x", a.as_stream()), ("x", b.as_stream())], SyncOptions::default()).unwrap_err();
    assert!(matches!(err, RxError::MissingConfiguration(_)));
}

#[test]
fn test_derived_suppresses_identical_results() {
    let a = init_stream::<i32>();
    let b = init_stream::<i32>();
    let total = derived(sum, [("a", a.as_stream()), ("b", b.as_stream())], DerivedOptions::default()).unwrap();
    let log = record(&total);

    a.set(1).unwrap();
    a.set(1).unwrap();
    b.set(2).unwrap();
    a.set(3).unwrap();
    b.set(0).unwrap();

    assert_eq!(values(&log), vec![1, 3, 5, 3]);
}

#[test]
fn test_derived_with_custom_equality_and_without_suppression() {
    let a = init_stream::<i32>();

    let same_parity = DerivedOptions {
        eq: Some(Rc::new(|x: &i32, y: &i32| x % 2 == y % 2)),
        ..Default::default()
    };
    let by_parity = derived(sum, [("a", a.as_stream())], same_parity).unwrap();
    let parity_log = record(&by_parity);

    let everything = DerivedOptions {
        ignore_identical: false,
        ..Default::default()
    };
    let raw = derived(sum, [("a", a.as_stream())], everything).unwrap();
    let raw_log = record(&raw);

    for v in [1, 3, 4, 4, 7] {
        a.set(v).unwrap();
    }
    assert_eq!(values(&parity_log), vec![1, 4, 7]);
    assert_eq!(values(&raw_log), vec![1, 3, 4, 4, 7]);
}

#[test]
fn test_derived_outlives_single_source_done() {
    let a = init_stream::<i32>();
    let b = init_stream::<i32>();
    let total = derived(sum, [("a", a.as_stream()), ("b", b.as_stream())], DerivedOptions::default()).unwrap();
    let log = record(&total);

    a.set(1).unwrap();
    a.dispose("a gone");
    b.set(5).unwrap();
    assert_eq!(values(&log), vec![1, 6]);
    assert!(!total.is_disposed());

    b.dispose("b gone");
    assert!(total.is_disposed());
}

#[tokio::test(start_paused = true)]
async fn test_merge_flat_drains_every_source_then_completes() {
    local(async {
        let left = resolve_source(vec![1, 2, 3], &ResolveOptions::default()).unwrap();
        let right = resolve_source(vec![10, 20], &ResolveOptions::default()).unwrap();
        let merged = merge_flat(vec![left, right], MergeFlatOptions::default()).unwrap();
        let log = record(&merged);

        sleep(Duration::from_secs(1)).await;

        let seen = values(&log);
        assert_eq!(seen.len(), 5);
        let lefts: Vec<i32> = seen.iter().copied().filter(|v| *v < 10).collect();
        let rights: Vec<i32> = seen.iter().copied().filter(|v| *v >= 10).collect();
        assert_eq!(lefts, vec![1, 2, 3]);
        assert_eq!(rights, vec![10, 20]);
        assert_eq!(done_reason(&log).as_deref(), Some("all sources done"));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_merge_flat_to_array() {
    local(async {
        let merged = merge_flat(vec![vec!["x"], vec!["y", "z"]], MergeFlatOptions::default()).unwrap();
        let mut collected = to_array(merged, ToArrayOptions::default()).await.unwrap();
        collected.sort();
        assert_eq!(collected, vec!["x", "y", "z"]);
    })
    .await;
}

#[test]
fn test_merge_flat_rejects_bad_idle_range() {
    let a = init_stream::<i32>();
    let options = MergeFlatOptions {
        idle_min: Duration::from_millis(50),
        idle_max: Duration::from_millis(10),
        ..Default::default()
    };
    assert!(matches!(merge_flat([a.as_stream()], options), Err(RxError::MissingConfiguration(_))));
}

#[test]
fn test_sync_waits_for_every_source() {
    let a = init_stream::<i32>();
    let b = init_stream::<i32>();
    let synced = sync_to_array(vec![a.as_stream(), b.as_stream()], SyncOptions::default()).unwrap();
    let log = record(&synced);

    a.set(1).unwrap();
    a.set(2).unwrap();
    b.set(10).unwrap();
    b.set(11).unwrap();
    a.set(3).unwrap();

    assert_eq!(values(&log), vec![vec![Some(2), Some(10)], vec![Some(3), Some(11)]]);
}

#[tokio::test(start_paused = true)]
async fn test_sync_maximum_wait_releases_partial_round() {
    local(async {
        let a = init_stream::<i32>();
        let b = init_stream::<i32>();
        let options = SyncOptions {
            maximum_wait: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let synced = sync_to_object([("a", a.as_stream()), ("b", b.as_stream())], options).unwrap();
        let log = record(&synced);

        a.set(5).unwrap();
        sleep(Duration::from_millis(60)).await;

        let rounds = values(&log);
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].get("a"), Some(&Some(5)));
        assert_eq!(rounds[0].get("b"), Some(&None));
    })
    .await;
}

#[test]
fn test_sync_final_value_after_source_done() {
    for (final_value, expected) in [(FinalValue::Undefined, None), (FinalValue::Last, Some(1))] {
        let a = init_stream::<i32>();
        let b = init_stream::<i32>();
        let options = SyncOptions {
            on_source_done: OnSourceDone::Allow,
            final_value,
            ..Default::default()
        };
        let synced = sync_to_array(vec![a.as_stream(), b.as_stream()], options).unwrap();
        let log = record(&synced);

        a.set(1).unwrap();
        b.set(2).unwrap();
        a.dispose("a finished");
        b.set(3).unwrap();

        assert_eq!(values(&log), vec![vec![Some(1), Some(2)], vec![expected, Some(3)]]);
        assert!(!synced.is_disposed());

        b.dispose("b finished");
        assert!(synced.is_disposed());
    }
}

#[test]
fn test_sync_break_disposes_on_first_done() {
    let a = init_stream::<i32>();
    let b = init_stream::<i32>();
    let synced = sync_to_array(vec![a.as_stream(), b.as_stream()], SyncOptions::default()).unwrap();
    let log = record(&synced);

    a.set(1).unwrap();
    b.dispose("b finished");
    assert!(values(&log).is_empty());
    assert_eq!(done_reason(&log).as_deref(), Some("b finished"));
}
