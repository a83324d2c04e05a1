//! Sorted merge: k-way merge of per-source sorted streams.
//!
//! Each source has a one-page slot. The consumer keeps a min-heap holding the
//! head row of every source it currently has rows for. Before choosing the
//! next row it refills every source whose page ran dry, blocking until that
//! source delivers a page or completes: a row can only be emitted once every
//! source that may still hold a smaller one has been heard from.
//!
//! Ties between sources break by source position, which follows node id
//! order, so equal rows come out lowest node id first.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use falcon_common::datum::OwnedRow;
use falcon_common::error::FalconResult;

use crate::comparator::RowComparator;
use crate::coordinator::CoordinatorShared;

struct HeadRow {
    row: OwnedRow,
    pos: usize,
    comparator: Arc<dyn RowComparator>,
}

impl PartialEq for HeadRow {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeadRow {}

impl PartialOrd for HeadRow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeadRow {
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparator
            .compare(&self.row, &other.row)
            .then_with(|| self.pos.cmp(&other.pos))
    }
}

#[derive(Default)]
struct SlotState {
    pending: Option<Vec<OwnedRow>>,
    finished: bool,
}

struct SourceSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

enum SlotTake {
    Page(Vec<OwnedRow>),
    Finished,
    Interrupted,
}

/// Consumer-side merge state.
struct MergeFront {
    started: bool,
    heap: BinaryHeap<Reverse<HeadRow>>,
    /// Remaining rows of each source's current page, behind its head row.
    pages: Vec<std::vec::IntoIter<OwnedRow>>,
    /// Sources whose page ran dry and that must be heard from again.
    refill: Vec<usize>,
}

pub(crate) struct SortedMerge {
    comparator: Arc<dyn RowComparator>,
    slots: Vec<SourceSlot>,
    front: Mutex<MergeFront>,
}

impl SortedMerge {
    pub(crate) fn new(sources: usize, comparator: Arc<dyn RowComparator>) -> Self {
        Self {
            comparator,
            slots: (0..sources)
                .map(|_| SourceSlot {
                    state: Mutex::new(SlotState::default()),
                    ready: Condvar::new(),
                })
                .collect(),
            front: Mutex::new(MergeFront {
                started: false,
                heap: BinaryHeap::with_capacity(sources),
                pages: (0..sources).map(|_| Vec::new().into_iter()).collect(),
                refill: Vec::with_capacity(sources),
            }),
        }
    }

    /// A source holds at most one undrained page.
    pub(crate) fn push_rows(&self, pos: usize, rows: Vec<OwnedRow>) -> Result<(), usize> {
        let slot = &self.slots[pos];
        let mut state = slot.state.lock();
        if state.pending.is_some() {
            return Err(1);
        }
        state.pending = Some(rows);
        slot.ready.notify_one();
        Ok(())
    }

    pub(crate) fn finish_source(&self, pos: usize) {
        let slot = &self.slots[pos];
        let mut state = slot.state.lock();
        state.finished = true;
        slot.ready.notify_one();
    }

    pub(crate) fn wake_all(&self) {
        for slot in &self.slots {
            let _state = slot.state.lock();
            slot.ready.notify_all();
        }
    }

    fn head(&self, row: OwnedRow, pos: usize) -> HeadRow {
        HeadRow {
            row,
            pos,
            comparator: self.comparator.clone(),
        }
    }

    pub(crate) fn next_row(&self, shared: &CoordinatorShared) -> FalconResult<Option<OwnedRow>> {
        let mut front = self.front.lock();
        if !front.started {
            front.started = true;
            front.refill = (0..self.slots.len()).rev().collect();
        }

        while let Some(pos) = front.refill.pop() {
            match self.take_page(shared, pos) {
                SlotTake::Page(rows) => {
                    shared.grant_credit(pos);
                    let mut rows = rows.into_iter();
                    match rows.next() {
                        Some(row) => {
                            front.heap.push(Reverse(self.head(row, pos)));
                            front.pages[pos] = rows;
                        }
                        // Empty page: wait for the source's next one.
                        None => front.refill.push(pos),
                    }
                }
                SlotTake::Finished => {}
                SlotTake::Interrupted => {
                    self.discard(&mut front);
                    return Err(shared.terminal_error());
                }
            }
        }

        if shared.is_interrupted() {
            self.discard(&mut front);
            return Err(shared.terminal_error());
        }

        let Some(Reverse(head)) = front.heap.pop() else {
            return Ok(None);
        };
        let pos = head.pos;
        match front.pages[pos].next() {
            Some(next) => {
                if self.comparator.compare(&next, &head.row) == Ordering::Less {
                    shared.note_order_violation(pos);
                }
                front.heap.push(Reverse(self.head(next, pos)));
            }
            None => front.refill.push(pos),
        }
        Ok(Some(head.row))
    }

    fn take_page(&self, shared: &CoordinatorShared, pos: usize) -> SlotTake {
        let slot = &self.slots[pos];
        let mut state = slot.state.lock();
        loop {
            if shared.is_interrupted() {
                return SlotTake::Interrupted;
            }
            if let Some(rows) = state.pending.take() {
                return SlotTake::Page(rows);
            }
            if state.finished {
                return SlotTake::Finished;
            }
            shared.wait_for_pages(&slot.ready, &mut state, Some(shared.source(pos)));
        }
    }

    fn discard(&self, front: &mut MergeFront) {
        front.heap.clear();
        front.refill.clear();
        for page in front.pages.iter_mut() {
            *page = Vec::new().into_iter();
        }
        for slot in &self.slots {
            slot.state.lock().pending = None;
        }
    }
}
