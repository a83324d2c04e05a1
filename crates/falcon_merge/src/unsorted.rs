//! Unsorted merge: FIFO fan-in of pages from all sources.
//!
//! Pages are queued in arrival order together with the markers, so a source's
//! rows come out in the order the source sent them. No order holds across
//! sources.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

use falcon_common::datum::OwnedRow;
use falcon_common::error::FalconResult;

use crate::coordinator::CoordinatorShared;

enum QueuedPage {
    Rows { pos: usize, rows: Vec<OwnedRow> },
    /// Completion and failure are recorded at submit time; their queue
    /// entries only make the consumer re-check whether the stream ended.
    Marker,
}

enum Dequeued {
    Page(QueuedPage),
    Exhausted,
    Interrupted,
}

pub(crate) struct UnsortedMerge {
    queue: Mutex<VecDeque<QueuedPage>>,
    ready: Condvar,
    /// Undrained data pages per source position.
    in_flight: Vec<AtomicUsize>,
    max_in_flight: usize,
    /// Rows of the page the consumer is currently draining.
    current: Mutex<std::vec::IntoIter<OwnedRow>>,
}

impl UnsortedMerge {
    pub(crate) fn new(sources: usize, max_in_flight: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            in_flight: (0..sources).map(|_| AtomicUsize::new(0)).collect(),
            max_in_flight,
            current: Mutex::new(Vec::new().into_iter()),
        }
    }

    pub(crate) fn push_rows(&self, pos: usize, rows: Vec<OwnedRow>) -> Result<(), usize> {
        let credit = &self.in_flight[pos];
        if credit.fetch_add(1, Ordering::AcqRel) >= self.max_in_flight {
            credit.fetch_sub(1, Ordering::AcqRel);
            return Err(self.max_in_flight);
        }
        self.enqueue(QueuedPage::Rows { pos, rows });
        Ok(())
    }

    pub(crate) fn finish_source(&self) {
        self.enqueue(QueuedPage::Marker);
    }

    pub(crate) fn fail_source(&self) {
        let mut queue = self.queue.lock();
        queue.push_back(QueuedPage::Marker);
        self.ready.notify_all();
    }

    pub(crate) fn wake_all(&self) {
        let _queue = self.queue.lock();
        self.ready.notify_all();
    }

    fn enqueue(&self, page: QueuedPage) {
        let mut queue = self.queue.lock();
        queue.push_back(page);
        self.ready.notify_one();
    }

    pub(crate) fn next_row(&self, shared: &CoordinatorShared) -> FalconResult<Option<OwnedRow>> {
        let mut current = self.current.lock();
        loop {
            if shared.is_interrupted() {
                *current = Vec::new().into_iter();
                self.queue.lock().clear();
                return Err(shared.terminal_error());
            }
            if let Some(row) = current.next() {
                return Ok(Some(row));
            }
            match self.dequeue(shared) {
                Dequeued::Page(QueuedPage::Rows { pos, rows }) => {
                    self.in_flight[pos].fetch_sub(1, Ordering::AcqRel);
                    shared.grant_credit(pos);
                    *current = rows.into_iter();
                }
                Dequeued::Page(QueuedPage::Marker) | Dequeued::Interrupted => {}
                Dequeued::Exhausted => return Ok(None),
            }
        }
    }

    fn dequeue(&self, shared: &CoordinatorShared) -> Dequeued {
        let mut queue = self.queue.lock();
        loop {
            if shared.is_interrupted() {
                return Dequeued::Interrupted;
            }
            if let Some(page) = queue.pop_front() {
                return Dequeued::Page(page);
            }
            if shared.is_done() {
                return Dequeued::Exhausted;
            }
            shared.wait_for_pages(&self.ready, &mut queue, None);
        }
    }
}
