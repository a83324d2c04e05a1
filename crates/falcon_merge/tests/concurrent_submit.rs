//! Producers racing each other and the consumer.
//!
//! Covers:
//! - a data page and the same source's last-marker submitted concurrently:
//!   the page is either yielded or rejected, never accepted and then lost
//! - the same race under both merge strategies
//! - a transport that submits the next page synchronously from the fetch
//!   callback, on the consumer thread

mod common;

use std::collections::{HashMap, VecDeque};
use std::sync::{mpsc, Arc, Barrier, OnceLock};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use falcon_common::datum::OwnedRow;
use falcon_common::types::{IndexId, NodeId, QueryId};
use falcon_merge::{MergeCoordinator, MergeStrategy, PageFetcher, ResultPage};

use common::*;

const ROUNDS: usize = 500;

fn race_rows_against_last(strategy: MergeStrategy) {
    for round in 0..ROUNDS {
        let c = MergeCoordinator::builder(ctx(21), IndexId(0), nodes(&[1]))
            .strategy(strategy.clone())
            .build()
            .unwrap();
        let start = Arc::new(Barrier::new(3));

        let rows = {
            let (c, start) = (c.clone(), start.clone());
            thread::spawn(move || {
                start.wait();
                c.submit_page(ResultPage::rows(NodeId(1), int_rows(&[7])))
            })
        };
        let last = {
            let (c, start) = (c.clone(), start.clone());
            thread::spawn(move || {
                start.wait();
                c.submit_page(ResultPage::last(NodeId(1)))
            })
        };
        let consumer = {
            let c = c.clone();
            thread::spawn(move || {
                start.wait();
                c.drain()
            })
        };

        let accepted = rows.join().unwrap();
        last.join().unwrap().unwrap();
        let drained = ints(&consumer.join().unwrap().unwrap());

        match accepted {
            Ok(()) => assert_eq!(drained, vec![7], "round {round}: accepted page lost"),
            Err(e) => {
                assert!(e.to_string().contains("E-MERGE-003"), "round {round}: {e}");
                assert!(drained.is_empty(), "round {round}: rejected page yielded");
            }
        }
        assert!(c.is_done());
    }
}

#[test]
fn test_unsorted_page_racing_last_marker_is_never_lost() {
    race_rows_against_last(MergeStrategy::Unsorted);
}

#[test]
fn test_sorted_page_racing_last_marker_is_never_lost() {
    race_rows_against_last(MergeStrategy::sorted_by(vec![(0, true)]));
}

/// Answers every fetch by submitting the next scripted page before returning.
struct InlineTransport {
    coordinator: OnceLock<MergeCoordinator>,
    scripts: Mutex<HashMap<NodeId, VecDeque<Vec<OwnedRow>>>>,
}

impl InlineTransport {
    fn new(scripts: &[(u64, Vec<Vec<i64>>)]) -> Arc<Self> {
        let scripts = scripts
            .iter()
            .map(|(n, pages)| (NodeId(*n), pages.iter().map(|p| int_rows(p)).collect()))
            .collect();
        Arc::new(Self {
            coordinator: OnceLock::new(),
            scripts: Mutex::new(scripts),
        })
    }

    fn next_page(&self, source: NodeId) -> ResultPage {
        let next = self
            .scripts
            .lock()
            .get_mut(&source)
            .and_then(|pages| pages.pop_front());
        match next {
            Some(rows) => ResultPage::rows(source, rows),
            None => ResultPage::last(source),
        }
    }
}

impl PageFetcher for InlineTransport {
    fn fetch_next_page(&self, _query_id: QueryId, _index_id: IndexId, source: NodeId) {
        let page = self.next_page(source);
        let coordinator = self.coordinator.get().expect("transport not started");
        coordinator.submit_page(page).expect("inline page rejected");
    }
}

fn drain_with_inline_fetcher(strategy: MergeStrategy) -> Vec<i64> {
    let transport = InlineTransport::new(&[
        (1, vec![vec![1, 4], vec![6], vec![]]),
        (2, vec![vec![2], vec![3, 5, 7]]),
    ]);
    let c = MergeCoordinator::builder(ctx(22), IndexId(0), nodes(&[1, 2]))
        .strategy(strategy)
        .fetcher(transport.clone())
        .build()
        .unwrap();
    assert!(transport.coordinator.set(c.clone()).is_ok());
    for source in [NodeId(1), NodeId(2)] {
        c.submit_page(transport.next_page(source)).unwrap();
    }

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(c.drain().map(|rows| ints(&rows)));
    });
    rx.recv_timeout(Duration::from_secs(5))
        .expect("consumer deadlocked on a synchronous fetch")
        .unwrap()
}

#[test]
fn test_unsorted_fetcher_may_submit_synchronously() {
    let mut got = drain_with_inline_fetcher(MergeStrategy::Unsorted);
    got.sort();
    assert_eq!(got, vec![1, 2, 3, 4, 5, 6, 7]);
}

#[test]
fn test_sorted_fetcher_may_submit_synchronously() {
    let got = drain_with_inline_fetcher(MergeStrategy::sorted_by(vec![(0, true)]));
    assert_eq!(got, vec![1, 2, 3, 4, 5, 6, 7]);
}
