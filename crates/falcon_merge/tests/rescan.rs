//! Rescans over a fully fetched merge index.
//!
//! Covers:
//! - a stream drained once is replayed from the fetched-row cache
//! - replays never ask the transport for pages
//! - rescans are refused while streaming or after the cache overflowed

mod common;

use std::sync::Arc;

use falcon_common::config::MergeConfig;
use falcon_common::types::{IndexId, NodeId};
use falcon_merge::{Cursor, MergeCoordinator, MergeStrategy, ResultPage, SearchBounds};

use common::*;

#[test]
fn test_rescan_replays_fetched_rows() {
    let transport = ScriptedTransport::new(&[
        (1, vec![vec![1, 4], vec![7]]),
        (2, vec![vec![2, 5]]),
        (3, vec![vec![3], vec![6]]),
    ]);
    let c = wired(&transport, |b| {
        b.strategy(MergeStrategy::sorted_by(vec![(0, true)]))
    });

    let first = c.drain().unwrap();
    transport.join();
    assert_eq!(ints(&first), vec![1, 2, 3, 4, 5, 6, 7]);
    let fetches = transport.fetches();
    let credits = c.metrics().credits_granted;

    for _ in 0..3 {
        let again = c.drain().unwrap();
        assert_eq!(again, first);
    }
    assert_eq!(transport.fetches(), fetches);
    assert_eq!(c.metrics().credits_granted, credits);
    assert_eq!(c.materialized_rows().unwrap().as_slice(), first.as_slice());
}

#[test]
fn test_fetched_cursor_opened_twice() {
    let rows = Arc::new(int_rows(&[5, 6, 7]));
    for _ in 0..2 {
        let mut cursor = MergeCoordinator::open_fetched(rows.clone(), None);
        let mut seen = Vec::new();
        while cursor.has_more().unwrap() {
            seen.push(cursor.next_row().unwrap());
        }
        assert_eq!(ints(&seen), vec![5, 6, 7]);
    }
}

#[test]
fn test_bounds_are_not_applied() {
    let c = MergeCoordinator::builder(ctx(2), IndexId(0), nodes(&[1]))
        .build()
        .unwrap();
    c.submit_page(ResultPage::rows(NodeId(1), int_rows(&[1, 2, 3]))).unwrap();
    c.submit_page(ResultPage::last(NodeId(1))).unwrap();

    let bounds = SearchBounds {
        lower: Some(int_row(2)),
        upper: Some(int_row(2)),
    };
    let mut cursor = c.open(Some(&bounds)).unwrap();
    let mut seen = Vec::new();
    while cursor.has_more().unwrap() {
        seen.push(cursor.next_row().unwrap());
    }
    assert_eq!(ints(&seen), vec![1, 2, 3]);

    let rows = c.materialized_rows().unwrap();
    let replay: Vec<_> = MergeCoordinator::open_fetched(rows, Some(&bounds)).collect();
    assert_eq!(ints(&replay), vec![1, 2, 3]);
}

#[test]
fn test_no_rescan_while_streaming() {
    let c = MergeCoordinator::builder(ctx(3), IndexId(0), nodes(&[1]))
        .build()
        .unwrap();
    c.submit_page(ResultPage::rows(NodeId(1), int_rows(&[1, 2]))).unwrap();

    let mut cursor = c.open(None).unwrap();
    assert!(cursor.has_more().unwrap());
    assert!(c.materialized_rows().is_none());

    let err = c.open(None).err().unwrap();
    assert!(err.is_internal_bug());
    assert!(err.to_string().contains("E-CURSOR-003"));
    assert!(err.to_string().contains("not been fully fetched"));
}

#[test]
fn test_cache_overflow_disables_rescan() {
    let config = MergeConfig {
        max_fetched_rows: 2,
        ..MergeConfig::default()
    };
    let c = MergeCoordinator::builder(ctx(4), IndexId(0), nodes(&[1]))
        .config(config)
        .build()
        .unwrap();
    c.submit_page(ResultPage::rows(NodeId(1), int_rows(&[1, 2, 3]))).unwrap();
    c.submit_page(ResultPage::last(NodeId(1))).unwrap();

    assert_eq!(ints(&c.drain().unwrap()), vec![1, 2, 3]);
    assert!(c.materialized_rows().is_none());
    let err = c.drain().unwrap_err();
    assert!(err.to_string().contains("max_fetched_rows=2"));
}

#[test]
fn test_cache_at_exact_limit_is_kept() {
    let config = MergeConfig {
        max_fetched_rows: 3,
        ..MergeConfig::default()
    };
    let c = MergeCoordinator::builder(ctx(5), IndexId(0), nodes(&[1, 2]))
        .config(config)
        .build()
        .unwrap();
    c.submit_page(ResultPage::rows(NodeId(1), int_rows(&[1, 2]))).unwrap();
    c.submit_page(ResultPage::rows(NodeId(2), int_rows(&[3]))).unwrap();
    c.submit_page(ResultPage::last(NodeId(1))).unwrap();
    c.submit_page(ResultPage::last(NodeId(2))).unwrap();

    let first = c.drain().unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(c.drain().unwrap(), first);
}

#[test]
fn test_config_loaded_from_toml() {
    let config = MergeConfig::from_toml_str(
        r#"
        [merge]
        max_pages_in_flight = 1
        max_fetched_rows = 1
        slow_wait_warn_ms = 0
        "#,
    )
    .unwrap();
    let c = MergeCoordinator::builder(ctx(6), IndexId(0), nodes(&[1]))
        .config(config)
        .build()
        .unwrap();
    c.submit_page(ResultPage::rows(NodeId(1), int_rows(&[1]))).unwrap();
    assert!(c
        .submit_page(ResultPage::rows(NodeId(1), int_rows(&[2])))
        .is_err());
    c.submit_page(ResultPage::last(NodeId(1))).unwrap();
    assert_eq!(ints(&c.drain().unwrap()), vec![1]);
    assert_eq!(
        c.materialized_rows().map(|rows| rows.len()),
        Some(1)
    );
}

#[test]
fn test_empty_stream_is_rescannable() {
    let c = MergeCoordinator::builder(ctx(7), IndexId(0), Vec::<NodeId>::new())
        .build()
        .unwrap();
    assert!(c.drain().unwrap().is_empty());
    assert_eq!(c.materialized_rows(), Some(Arc::new(Vec::new())));
    assert!(c.drain().unwrap().is_empty());
}
