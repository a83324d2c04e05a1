//! Shared fixtures for the merge integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use falcon_common::datum::{Datum, OwnedRow};
use falcon_common::request_context::QueryContext;
use falcon_common::types::{IndexId, NodeId, QueryId};
use falcon_merge::{MergeCoordinator, MergeCoordinatorBuilder, PageFetcher, ResultPage};

pub const LOCAL_NODE: NodeId = NodeId(100);

pub fn ctx(query: u64) -> QueryContext {
    QueryContext::with_ids(QueryId(query), LOCAL_NODE)
}

pub fn int_row(v: i64) -> OwnedRow {
    OwnedRow::new(vec![Datum::Int64(v)])
}

pub fn int_rows(values: &[i64]) -> Vec<OwnedRow> {
    values.iter().map(|&v| int_row(v)).collect()
}

pub fn ints(rows: &[OwnedRow]) -> Vec<i64> {
    rows.iter()
        .map(|r| r.get(0).and_then(Datum::as_i64).expect("int row"))
        .collect()
}

pub fn nodes(ids: &[u64]) -> Vec<NodeId> {
    ids.iter().map(|&n| NodeId(n)).collect()
}

/// Deterministic xorshift, for reproducible interleavings.
pub struct Rng(u64);

impl Rng {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    pub fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }
}

/// Split `values` into pages of 1..=max_page rows.
pub fn paginate(values: &[i64], max_page: u64, rng: &mut Rng) -> Vec<Vec<i64>> {
    let mut pages = Vec::new();
    let mut rest = values;
    while !rest.is_empty() {
        let n = (1 + rng.below(max_page) as usize).min(rest.len());
        pages.push(rest[..n].to_vec());
        rest = &rest[n..];
    }
    pages
}

/// In-process stand-in for the network: every source has a script of data
/// pages. The first page of each source is sent on `start`; every later page
/// (and finally the last-marker) is sent on a separate thread when the merge
/// index hands the credit back.
pub struct ScriptedTransport {
    coordinator: OnceLock<MergeCoordinator>,
    scripts: Mutex<HashMap<NodeId, VecDeque<Vec<OwnedRow>>>>,
    sources: Vec<NodeId>,
    fetches: AtomicUsize,
    senders: Mutex<Vec<JoinHandle<()>>>,
}

impl ScriptedTransport {
    pub fn new(scripts: &[(u64, Vec<Vec<i64>>)]) -> Arc<Self> {
        let sources = scripts.iter().map(|(n, _)| NodeId(*n)).collect();
        let scripts = scripts
            .iter()
            .map(|(n, pages)| {
                let pages = pages.iter().map(|p| int_rows(p)).collect();
                (NodeId(*n), pages)
            })
            .collect();
        Arc::new(Self {
            coordinator: OnceLock::new(),
            scripts: Mutex::new(scripts),
            sources,
            fetches: AtomicUsize::new(0),
            senders: Mutex::new(Vec::new()),
        })
    }

    pub fn sources(&self) -> Vec<NodeId> {
        self.sources.clone()
    }

    pub fn start(&self, coordinator: MergeCoordinator) {
        assert!(self.coordinator.set(coordinator).is_ok(), "started twice");
        for source in &self.sources {
            self.send_next(*source);
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn join(&self) {
        let handles: Vec<_> = self.senders.lock().drain(..).collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    fn send_next(&self, source: NodeId) {
        let page = match self
            .scripts
            .lock()
            .get_mut(&source)
            .and_then(|pages| pages.pop_front())
        {
            Some(rows) => ResultPage::rows(source, rows),
            None => ResultPage::last(source),
        };
        let coordinator = self.coordinator.get().expect("transport not started").clone();
        let handle = thread::spawn(move || {
            coordinator.submit_page(page).expect("scripted page rejected");
        });
        self.senders.lock().push(handle);
    }
}

impl PageFetcher for ScriptedTransport {
    fn fetch_next_page(&self, _query_id: QueryId, _index_id: IndexId, source: NodeId) {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.send_next(source);
    }
}

/// Build a merge index wired to `transport` and start the transport.
pub fn wired(
    transport: &Arc<ScriptedTransport>,
    builder: impl FnOnce(MergeCoordinatorBuilder) -> MergeCoordinatorBuilder,
) -> MergeCoordinator {
    let base = MergeCoordinator::builder(ctx(1), IndexId(0), transport.sources())
        .fetcher(transport.clone());
    let coordinator = builder(base).build().unwrap();
    transport.start(coordinator.clone());
    coordinator
}
