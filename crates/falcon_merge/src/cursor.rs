//! Cursors over a merge index, as consumed by the query executor.

use std::sync::Arc;

use falcon_common::datum::OwnedRow;
use falcon_common::error::{FalconError, FalconResult};

use crate::coordinator::CoordinatorShared;

/// Key range requested by the executor for an index scan.
///
/// Merge cursors always yield the whole stream: the remote sub-scans have
/// already applied the predicate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchBounds {
    pub lower: Option<OwnedRow>,
    pub upper: Option<OwnedRow>,
}

/// Row cursor. `next_row` is only valid after `has_more` returned `true`.
pub trait Cursor: Send {
    /// Whether another row is available. May block until one arrives or the
    /// stream ends. Fails if the merge failed or was cancelled.
    fn has_more(&mut self) -> FalconResult<bool>;

    /// The row announced by the preceding `has_more`. Never blocks.
    fn next_row(&mut self) -> FalconResult<OwnedRow>;
}

/// The single cursor pulling rows off a live merge. Rows it yields are
/// recorded in the index's fetched-row cache for later rescans.
pub struct StreamingCursor {
    shared: Arc<CoordinatorShared>,
    peeked: Option<OwnedRow>,
    exhausted: bool,
    errored: bool,
}

impl StreamingCursor {
    pub(crate) fn new(shared: Arc<CoordinatorShared>) -> Self {
        Self {
            shared,
            peeked: None,
            exhausted: false,
            errored: false,
        }
    }
}

impl Cursor for StreamingCursor {
    fn has_more(&mut self) -> FalconResult<bool> {
        if self.peeked.is_some() {
            return Ok(true);
        }
        if self.exhausted {
            return Ok(false);
        }
        match self.shared.next_row()? {
            Some(row) => {
                self.shared.record_fetched(&row);
                self.peeked = Some(row);
                Ok(true)
            }
            None => {
                self.exhausted = true;
                self.shared.finish_fetched();
                Ok(false)
            }
        }
    }

    fn next_row(&mut self) -> FalconResult<OwnedRow> {
        match self.peeked.take() {
            Some(row) => Ok(row),
            None => Err(self.shared.internal_bug(
                "E-CURSOR-001",
                "next_row called without a preceding successful has_more".into(),
            )),
        }
    }
}

/// Yields rows until the stream ends, or a single error after which the
/// iterator is fused.
impl Iterator for StreamingCursor {
    type Item = FalconResult<OwnedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.errored {
            return None;
        }
        match self.has_more() {
            Ok(true) => Some(self.next_row()),
            Ok(false) => None,
            Err(e) => {
                self.errored = true;
                Some(Err(e))
            }
        }
    }
}

/// Cursor over an already materialized row set. Never blocks and never
/// requests pages.
#[derive(Debug, Clone)]
pub struct FetchedCursor {
    rows: Arc<Vec<OwnedRow>>,
    pos: usize,
}

impl FetchedCursor {
    pub fn new(rows: impl Into<Arc<Vec<OwnedRow>>>) -> Self {
        Self {
            rows: rows.into(),
            pos: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.rows.len() - self.pos
    }
}

impl Cursor for FetchedCursor {
    fn has_more(&mut self) -> FalconResult<bool> {
        Ok(self.pos < self.rows.len())
    }

    fn next_row(&mut self) -> FalconResult<OwnedRow> {
        let Some(row) = self.rows.get(self.pos) else {
            let err = FalconError::internal_bug(
                "E-CURSOR-001",
                "next_row called on an exhausted fetched cursor",
                format!("rows={}", self.rows.len()),
            );
            err.log_if_fatal();
            return Err(err);
        };
        self.pos += 1;
        Ok(row.clone())
    }
}

impl Iterator for FetchedCursor {
    type Item = OwnedRow;

    fn next(&mut self) -> Option<OwnedRow> {
        let row = self.rows.get(self.pos)?.clone();
        self.pos += 1;
        Some(row)
    }
}
