//! Merge coordinator: the reduce-side end of one distributed index scan.
//!
//! Producers (transport threads, one per inbound page) call
//! [`MergeCoordinator::submit_page`] concurrently; it never blocks. A single
//! consumer (the query executor) pulls rows through a cursor. The coordinator
//! owns the bookkeeping both sides share:
//!
//! - the fixed set of expected sources and which of them have completed,
//! - the terminal state: the first source failure or cancellation wins and is
//!   never replaced; once it is set no further row becomes visible and late
//!   pages are dropped,
//! - the merge buffers of the selected [`MergeStrategy`],
//! - credit grants to the transport ([`PageFetcher`]),
//! - the fetched-row cache used for rescans.
//!
//! Lock order is progress before buffer: a data page is checked against its
//! source's state and buffered under the progress lock, so it is either
//! visible before that source's last-marker completes it or rejected. The
//! consumer never takes the progress lock while holding a buffer lock. Every
//! flag a consumer waits on is published before the producer takes the
//! buffer lock to notify, so a wakeup cannot be lost.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};

use falcon_common::config::MergeConfig;
use falcon_common::datum::OwnedRow;
use falcon_common::error::{ClusterError, FalconError, FalconResult};
use falcon_common::request_context::QueryContext;
use falcon_common::types::{IndexId, NodeId, QueryId};

use crate::comparator::{RowComparator, SortKeyComparator};
use crate::cursor::{Cursor, FetchedCursor, SearchBounds, StreamingCursor};
use crate::fetcher::PageFetcher;
use crate::metrics::{MergeMetrics, MergeMetricsSnapshot};
use crate::page::{PageBody, ResultPage};
use crate::sorted::SortedMerge;
use crate::unsorted::UnsortedMerge;

/// How a merge index orders the rows it exposes.
#[derive(Clone)]
pub enum MergeStrategy {
    /// FIFO fan-in: rows in page arrival order, no order across sources.
    Unsorted,
    /// k-way merge of per-source sorted streams into one sorted stream.
    Sorted(Arc<dyn RowComparator>),
}

impl MergeStrategy {
    /// Sorted merge over `(col_idx, ascending)` sort keys.
    pub fn sorted_by(sort_columns: Vec<(usize, bool)>) -> Self {
        MergeStrategy::Sorted(Arc::new(SortKeyComparator::new(sort_columns)))
    }

    fn name(&self) -> &'static str {
        match self {
            MergeStrategy::Unsorted => "unsorted",
            MergeStrategy::Sorted(_) => "sorted",
        }
    }
}

impl fmt::Debug for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStrategy::Unsorted => f.write_str("Unsorted"),
            MergeStrategy::Sorted(_) => f.write_str("Sorted(<comparator>)"),
        }
    }
}

/// The failure captured by a merge index.
#[derive(Debug, Clone)]
pub struct SourceFailure {
    pub node: NodeId,
    pub cause: Arc<FalconError>,
}

impl SourceFailure {
    pub fn to_error(&self) -> FalconError {
        FalconError::Cluster(ClusterError::SourceFailed {
            node: self.node,
            cause: self.cause.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceState {
    Active,
    Completed,
    Failed,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceState::Active => f.write_str("active"),
            SourceState::Completed => f.write_str("completed"),
            SourceState::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone)]
enum Terminal {
    Failed(SourceFailure),
    Cancelled(String),
}

struct Progress {
    states: Vec<SourceState>,
    completed: usize,
    terminal: Option<Terminal>,
}

#[derive(Default)]
struct FetchedRows {
    rows: Vec<OwnedRow>,
    overflowed: bool,
    complete: Option<Arc<Vec<OwnedRow>>>,
}

pub(crate) enum Merge {
    Unsorted(UnsortedMerge),
    Sorted(SortedMerge),
}

impl Merge {
    /// Buffer a data page. `Err` carries the source's credit limit.
    fn push_rows(&self, pos: usize, rows: Vec<OwnedRow>) -> Result<(), usize> {
        match self {
            Merge::Unsorted(m) => m.push_rows(pos, rows),
            Merge::Sorted(m) => m.push_rows(pos, rows),
        }
    }

    fn finish_source(&self, pos: usize) {
        match self {
            Merge::Unsorted(m) => m.finish_source(),
            Merge::Sorted(m) => m.finish_source(pos),
        }
    }

    fn fail_source(&self) {
        match self {
            Merge::Unsorted(m) => m.fail_source(),
            Merge::Sorted(m) => m.wake_all(),
        }
    }

    fn wake_all(&self) {
        match self {
            Merge::Unsorted(m) => m.wake_all(),
            Merge::Sorted(m) => m.wake_all(),
        }
    }

    fn next_row(&self, shared: &CoordinatorShared) -> FalconResult<Option<OwnedRow>> {
        match self {
            Merge::Unsorted(m) => m.next_row(shared),
            Merge::Sorted(m) => m.next_row(shared),
        }
    }
}

pub(crate) struct CoordinatorShared {
    ctx: QueryContext,
    index_id: IndexId,
    /// Sorted by node id; a source's position is its index here.
    sources: Vec<NodeId>,
    positions: HashMap<NodeId, usize>,
    progress: Mutex<Progress>,
    interrupted: AtomicBool,
    done: AtomicBool,
    merge: Merge,
    fetcher: Option<Arc<dyn PageFetcher>>,
    config: MergeConfig,
    fetched: Mutex<FetchedRows>,
    streaming_opened: AtomicBool,
    metrics: MergeMetrics,
}

impl CoordinatorShared {
    pub(crate) fn source(&self, pos: usize) -> NodeId {
        self.sources[pos]
    }

    pub(crate) fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn debug_context(&self) -> String {
        format!(
            "{}, index_id={}",
            self.ctx.as_context_str(),
            self.index_id.0
        )
    }

    /// Internal bug raised on behalf of this index, logged once here.
    pub(crate) fn internal_bug(&self, code: &'static str, message: String) -> FalconError {
        let err = FalconError::internal_bug(code, message, self.debug_context());
        err.log_if_fatal();
        err
    }

    fn protocol_violation(&self, code: &'static str, message: String) -> FalconError {
        MergeMetrics::incr(&self.metrics.protocol_violations);
        self.internal_bug(code, message)
    }

    /// The error the consumer raises once the merge is interrupted.
    pub(crate) fn terminal_error(&self) -> FalconError {
        match &self.progress.lock().terminal {
            Some(Terminal::Failed(failure)) => failure.to_error(),
            Some(Terminal::Cancelled(reason)) => FalconError::QueryCanceled(format!(
                "{reason} ({})",
                self.debug_context()
            )),
            None => FalconError::internal_bug(
                "E-MERGE-005",
                "merge interrupted without a terminal state",
                self.debug_context(),
            ),
        }
    }

    fn submit(&self, page: ResultPage) -> FalconResult<()> {
        let source = page.source();
        if self.is_interrupted() {
            MergeMetrics::incr(&self.metrics.pages_dropped);
            tracing::debug!(
                query_id = self.ctx.query_id.0,
                index = self.index_id.0,
                source = source.0,
                "merge already terminated, page dropped"
            );
            return Ok(());
        }
        let Some(&pos) = self.positions.get(&source) else {
            return Err(self.protocol_violation(
                "E-MERGE-002",
                format!("page from {source}, which is not a source of this merge index"),
            ));
        };
        match page.into_body() {
            PageBody::Rows(rows) => self.accept_rows(pos, rows),
            PageBody::Last => self.accept_last(pos),
            PageBody::Fail(cause) => self.accept_failure(pos, cause),
        }
    }

    fn accept_rows(&self, pos: usize, rows: Vec<OwnedRow>) -> FalconResult<()> {
        let n = rows.len();
        {
            // Held across the push: a last-marker from the same source must
            // either see these rows buffered or make them a protocol error.
            let progress = self.progress.lock();
            if progress.terminal.is_some() {
                MergeMetrics::incr(&self.metrics.pages_dropped);
                return Ok(());
            }
            let state = progress.states[pos];
            if state != SourceState::Active {
                drop(progress);
                return Err(self.protocol_violation(
                    "E-MERGE-003",
                    format!("data page from {} after it {state}", self.source(pos)),
                ));
            }
            if let Err(limit) = self.merge.push_rows(pos, rows) {
                drop(progress);
                return Err(self.protocol_violation(
                    "E-MERGE-004",
                    format!(
                        "{} sent a page beyond its credit of {limit} undrained page(s)",
                        self.source(pos)
                    ),
                ));
            }
        }
        MergeMetrics::incr(&self.metrics.pages_received);
        MergeMetrics::add(&self.metrics.rows_received, n as u64);
        tracing::debug!(
            query_id = self.ctx.query_id.0,
            index = self.index_id.0,
            source = self.source(pos).0,
            rows = n,
            "data page buffered"
        );
        Ok(())
    }

    fn accept_last(&self, pos: usize) -> FalconResult<()> {
        let all_done = {
            let mut progress = self.progress.lock();
            if progress.terminal.is_some() {
                MergeMetrics::incr(&self.metrics.pages_dropped);
                return Ok(());
            }
            let state = progress.states[pos];
            match state {
                SourceState::Active => {}
                SourceState::Completed => {
                    // Retransmitted marker: consistent with what we know.
                    drop(progress);
                    MergeMetrics::incr(&self.metrics.duplicate_markers);
                    tracing::debug!(
                        query_id = self.ctx.query_id.0,
                        index = self.index_id.0,
                        source = self.source(pos).0,
                        "duplicate last-marker ignored"
                    );
                    return Ok(());
                }
                SourceState::Failed => {
                    drop(progress);
                    return Err(self.protocol_violation(
                        "E-MERGE-003",
                        format!("last-marker from {} after it failed", self.source(pos)),
                    ));
                }
            }
            progress.states[pos] = SourceState::Completed;
            progress.completed += 1;
            let all_done = progress.completed == progress.states.len();
            if all_done {
                self.done.store(true, Ordering::Release);
            }
            all_done
        };
        MergeMetrics::incr(&self.metrics.pages_received);
        MergeMetrics::incr(&self.metrics.last_markers);
        self.merge.finish_source(pos);
        if all_done {
            tracing::info!(
                query_id = self.ctx.query_id.0,
                index = self.index_id.0,
                sources = self.sources.len(),
                elapsed_ms = self.ctx.elapsed_ms(),
                "all merge sources completed"
            );
        } else {
            tracing::debug!(
                query_id = self.ctx.query_id.0,
                index = self.index_id.0,
                source = self.source(pos).0,
                "merge source completed"
            );
        }
        Ok(())
    }

    fn accept_failure(&self, pos: usize, cause: Arc<FalconError>) -> FalconResult<()> {
        let failure = {
            let mut progress = self.progress.lock();
            if progress.terminal.is_some() {
                drop(progress);
                MergeMetrics::incr(&self.metrics.duplicate_markers);
                tracing::debug!(
                    query_id = self.ctx.query_id.0,
                    index = self.index_id.0,
                    source = self.source(pos).0,
                    "fail-marker ignored, merge already terminated"
                );
                return Ok(());
            }
            if progress.states[pos] == SourceState::Completed {
                drop(progress);
                return Err(self.protocol_violation(
                    "E-MERGE-003",
                    format!("fail-marker from {} after it completed", self.source(pos)),
                ));
            }
            progress.states[pos] = SourceState::Failed;
            let failure = SourceFailure {
                node: self.source(pos),
                cause,
            };
            progress.terminal = Some(Terminal::Failed(failure.clone()));
            self.interrupted.store(true, Ordering::Release);
            failure
        };
        MergeMetrics::incr(&self.metrics.pages_received);
        MergeMetrics::incr(&self.metrics.fail_markers);
        tracing::warn!(
            query_id = self.ctx.query_id.0,
            index = self.index_id.0,
            source = failure.node.0,
            error = %failure.cause,
            "merge source failed, aborting merge"
        );
        self.merge.fail_source();
        Ok(())
    }

    pub(crate) fn cancel(&self, reason: String) -> bool {
        {
            let mut progress = self.progress.lock();
            if progress.terminal.is_some() {
                return false;
            }
            progress.terminal = Some(Terminal::Cancelled(reason.clone()));
            self.interrupted.store(true, Ordering::Release);
        }
        tracing::info!(
            query_id = self.ctx.query_id.0,
            index = self.index_id.0,
            reason = reason.as_str(),
            "merge cancelled"
        );
        self.merge.wake_all();
        true
    }

    fn source_state(&self, node: NodeId) -> Option<SourceState> {
        let pos = *self.positions.get(&node)?;
        Some(self.progress.lock().states[pos])
    }

    fn pending_sources(&self) -> Vec<NodeId> {
        let progress = self.progress.lock();
        progress
            .states
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == SourceState::Active)
            .map(|(pos, _)| self.sources[pos])
            .collect()
    }

    /// Hand one credit back to `pos` after the consumer took one of its pages.
    /// Must be called with no progress or buffer lock held. The caller may
    /// hold consumer-side state that no producer ever locks.
    pub(crate) fn grant_credit(&self, pos: usize) {
        let Some(fetcher) = &self.fetcher else {
            return;
        };
        if self.is_interrupted() || self.progress.lock().states[pos] != SourceState::Active {
            return;
        }
        MergeMetrics::incr(&self.metrics.credits_granted);
        tracing::trace!(
            query_id = self.ctx.query_id.0,
            index = self.index_id.0,
            source = self.source(pos).0,
            "requesting next page"
        );
        fetcher.fetch_next_page(self.ctx.query_id, self.index_id, self.source(pos));
    }

    /// Block the consumer on `ready` until notified. Callers re-check their
    /// condition in a loop. There is no deadline: a source that never
    /// completes or fails is only reported, every `slow_wait_warn_ms`.
    pub(crate) fn wait_for_pages<T>(
        &self,
        ready: &Condvar,
        guard: &mut MutexGuard<'_, T>,
        waiting_on: Option<NodeId>,
    ) {
        let start = Instant::now();
        MergeMetrics::incr(&self.metrics.consumer_waits);
        match self.config.slow_wait_threshold() {
            Some(threshold) => {
                if ready.wait_for(guard, threshold).timed_out() {
                    // Producers take the progress lock before buffer locks.
                    let pending = MutexGuard::unlocked(guard, || self.pending_sources());
                    tracing::warn!(
                        query_id = self.ctx.query_id.0,
                        index = self.index_id.0,
                        waiting_on = ?waiting_on,
                        pending = ?pending,
                        waited_ms = start.elapsed().as_millis() as u64,
                        "merge consumer still waiting for pages"
                    );
                }
            }
            None => ready.wait(guard),
        }
        MergeMetrics::add(
            &self.metrics.consumer_wait_us,
            start.elapsed().as_micros() as u64,
        );
    }

    pub(crate) fn note_order_violation(&self, pos: usize) {
        let seen = self
            .metrics
            .source_order_violations
            .fetch_add(1, Ordering::Relaxed);
        if seen == 0 {
            tracing::warn!(
                query_id = self.ctx.query_id.0,
                index = self.index_id.0,
                source = self.source(pos).0,
                "source rows are not sorted by the merge comparator; output order is undefined"
            );
        }
    }

    pub(crate) fn next_row(&self) -> FalconResult<Option<OwnedRow>> {
        let row = self.merge.next_row(self)?;
        match &row {
            Some(_) => MergeMetrics::incr(&self.metrics.rows_yielded),
            None => tracing::debug!(
                query_id = self.ctx.query_id.0,
                index = self.index_id.0,
                rows = self.metrics.rows_yielded.load(Ordering::Relaxed),
                "merge stream exhausted"
            ),
        }
        Ok(row)
    }

    pub(crate) fn record_fetched(&self, row: &OwnedRow) {
        let mut fetched = self.fetched.lock();
        if fetched.overflowed {
            return;
        }
        if fetched.rows.len() >= self.config.max_fetched_rows {
            fetched.overflowed = true;
            fetched.rows = Vec::new();
            tracing::debug!(
                query_id = self.ctx.query_id.0,
                index = self.index_id.0,
                limit = self.config.max_fetched_rows,
                "fetched-row cache limit reached, rescans disabled"
            );
            return;
        }
        fetched.rows.push(row.clone());
    }

    pub(crate) fn finish_fetched(&self) {
        let mut fetched = self.fetched.lock();
        if !fetched.overflowed && fetched.complete.is_none() {
            let rows = std::mem::take(&mut fetched.rows);
            fetched.complete = Some(Arc::new(rows));
        }
    }
}

/// Builder for a [`MergeCoordinator`].
pub struct MergeCoordinatorBuilder {
    ctx: QueryContext,
    index_id: IndexId,
    sources: Vec<NodeId>,
    strategy: MergeStrategy,
    config: MergeConfig,
    fetcher: Option<Arc<dyn PageFetcher>>,
}

impl MergeCoordinatorBuilder {
    pub fn strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Shorthand for `strategy(MergeStrategy::Sorted(comparator))`.
    pub fn sorted(self, comparator: Arc<dyn RowComparator>) -> Self {
        self.strategy(MergeStrategy::Sorted(comparator))
    }

    pub fn config(mut self, config: MergeConfig) -> Self {
        self.config = config;
        self
    }

    /// Transport hook for credit grants. Without one the transport paces
    /// sources on its own and only the credit limit is enforced.
    pub fn fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn build(self) -> FalconResult<MergeCoordinator> {
        self.config.validate()?;

        let mut sources = self.sources;
        sources.sort();
        sources.dedup();
        let positions = sources
            .iter()
            .enumerate()
            .map(|(pos, node)| (*node, pos))
            .collect();

        let strategy_name = self.strategy.name();
        let merge = match self.strategy {
            MergeStrategy::Unsorted => Merge::Unsorted(UnsortedMerge::new(
                sources.len(),
                self.config.max_pages_in_flight,
            )),
            MergeStrategy::Sorted(comparator) => {
                Merge::Sorted(SortedMerge::new(sources.len(), comparator))
            }
        };

        let shared = Arc::new(CoordinatorShared {
            progress: Mutex::new(Progress {
                states: vec![SourceState::Active; sources.len()],
                completed: 0,
                terminal: None,
            }),
            interrupted: AtomicBool::new(false),
            done: AtomicBool::new(sources.is_empty()),
            ctx: self.ctx,
            index_id: self.index_id,
            positions,
            sources,
            merge,
            fetcher: self.fetcher,
            config: self.config,
            fetched: Mutex::new(FetchedRows::default()),
            streaming_opened: AtomicBool::new(false),
            metrics: MergeMetrics::default(),
        });

        tracing::info!(
            query_id = shared.ctx.query_id.0,
            index = shared.index_id.0,
            sources = shared.sources.len(),
            strategy = strategy_name,
            "merge index created"
        );

        let weak = Arc::downgrade(&shared);
        shared.ctx.cancel_token().on_cancel(move |reason| {
            if let Some(shared) = weak.upgrade() {
                shared.cancel(reason.to_string());
            }
        });

        Ok(MergeCoordinator { shared })
    }
}

/// Handle to one merge index. Clones share the same index: hand one to the
/// transport for `submit_page` and keep one for the executor.
#[derive(Clone)]
pub struct MergeCoordinator {
    shared: Arc<CoordinatorShared>,
}

impl MergeCoordinator {
    /// Start building a merge index for `sources` within the query `ctx`.
    /// Cancelling `ctx` cancels the index.
    pub fn builder(
        ctx: QueryContext,
        index_id: IndexId,
        sources: impl IntoIterator<Item = NodeId>,
    ) -> MergeCoordinatorBuilder {
        MergeCoordinatorBuilder {
            ctx,
            index_id,
            sources: sources.into_iter().collect(),
            strategy: MergeStrategy::Unsorted,
            config: MergeConfig::default(),
            fetcher: None,
        }
    }

    pub fn query_id(&self) -> QueryId {
        self.shared.ctx.query_id
    }

    pub fn index_id(&self) -> IndexId {
        self.shared.index_id
    }

    /// Expected sources, in node id order.
    pub fn sources(&self) -> &[NodeId] {
        &self.shared.sources
    }

    pub fn has_source(&self, node: NodeId) -> bool {
        self.shared.positions.contains_key(&node)
    }

    /// True if the index is still live and `node` is a source that has
    /// neither completed nor failed.
    pub fn is_source_pending(&self, node: NodeId) -> bool {
        !self.shared.is_interrupted()
            && self.shared.source_state(node) == Some(SourceState::Active)
    }

    pub fn pending_sources(&self) -> Vec<NodeId> {
        self.shared.pending_sources()
    }

    pub fn is_sorted(&self) -> bool {
        matches!(self.shared.merge, Merge::Sorted(_))
    }

    /// Accept one page from the transport. Never blocks.
    ///
    /// Returns an internal-bug error for protocol violations: a page from an
    /// unknown source, data or a contradictory marker after the source
    /// completed or failed, or a page beyond the source's credit. Such a
    /// page is not applied. Duplicate last-markers are tolerated, and once the
    /// index has failed or been cancelled every page is silently dropped.
    pub fn submit_page(&self, page: ResultPage) -> FalconResult<()> {
        self.shared.submit(page)
    }

    /// Synthesize a fail-marker for `node`, e.g. when failure detection
    /// declares it unreachable.
    pub fn fail_source(&self, node: NodeId, cause: FalconError) -> FalconResult<()> {
        self.submit_page(ResultPage::fail(node, cause))
    }

    /// All sources completed and the index was neither failed nor cancelled.
    pub fn is_done(&self) -> bool {
        self.shared.is_done() && self.shared.progress.lock().terminal.is_none()
    }

    pub fn failure(&self) -> Option<SourceFailure> {
        match &self.shared.progress.lock().terminal {
            Some(Terminal::Failed(failure)) => Some(failure.clone()),
            _ => None,
        }
    }

    /// The captured source failure as the error a cursor raises. The failure
    /// stays captured; every call returns it again.
    pub fn take_failure(&self) -> Option<FalconError> {
        self.failure().map(|f| f.to_error())
    }

    /// Cancel the index: wakes a blocked cursor with a cancellation error and
    /// turns later `submit_page` calls into no-ops. Returns `false` if the
    /// index had already failed or been cancelled.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        self.shared.cancel(reason.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.shared.progress.lock().terminal,
            Some(Terminal::Cancelled(_))
        )
    }

    /// Open the single streaming cursor of this index. `bounds` are accepted
    /// for interface conformance and ignored: the remote sub-scans already
    /// applied the predicate.
    pub fn open_streaming(&self, _bounds: Option<&SearchBounds>) -> FalconResult<StreamingCursor> {
        if self.shared.streaming_opened.swap(true, Ordering::AcqRel) {
            return Err(self.shared.internal_bug(
                "E-CURSOR-002",
                "merge index already has a streaming cursor".into(),
            ));
        }
        Ok(StreamingCursor::new(self.shared.clone()))
    }

    /// Cursor over already materialized rows. Never touches the network.
    pub fn open_fetched(rows: Arc<Vec<OwnedRow>>, _bounds: Option<&SearchBounds>) -> FetchedCursor {
        FetchedCursor::new(rows)
    }

    /// Open a cursor for a scan of this index: the streaming cursor on the
    /// first scan, a fetched cursor over the cached rows on rescans.
    pub fn open(&self, bounds: Option<&SearchBounds>) -> FalconResult<Box<dyn Cursor>> {
        if let Some(rows) = self.materialized_rows() {
            return Ok(Box::new(Self::open_fetched(rows, bounds)));
        }
        if self.shared.streaming_opened.load(Ordering::Acquire) {
            let overflowed = self.shared.fetched.lock().overflowed;
            let reason = if overflowed {
                format!(
                    "stream exceeded max_fetched_rows={}",
                    self.shared.config.max_fetched_rows
                )
            } else {
                "stream has not been fully fetched".to_string()
            };
            return Err(self.shared.internal_bug(
                "E-CURSOR-003",
                format!("merge index cannot be rescanned: {reason}"),
            ));
        }
        Ok(Box::new(self.open_streaming(bounds)?))
    }

    /// Pull every remaining row through [`open`](Self::open).
    pub fn drain(&self) -> FalconResult<Vec<OwnedRow>> {
        let mut cursor = self.open(None)?;
        let mut rows = Vec::new();
        while cursor.has_more()? {
            rows.push(cursor.next_row()?);
        }
        Ok(rows)
    }

    /// Rows of a fully fetched stream, if it fit into the fetched-row cache.
    pub fn materialized_rows(&self) -> Option<Arc<Vec<OwnedRow>>> {
        self.shared.fetched.lock().complete.clone()
    }

    pub fn metrics(&self) -> MergeMetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

impl fmt::Debug for MergeCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeCoordinator")
            .field("query_id", &self.query_id())
            .field("index_id", &self.index_id())
            .field("sources", &self.shared.sources)
            .field("sorted", &self.is_sorted())
            .field("done", &self.shared.is_done())
            .field("interrupted", &self.shared.is_interrupted())
            .finish()
    }
}
