//! Result pages: the unit of transfer from a remote source to a merge index.

use std::sync::Arc;

use falcon_common::datum::OwnedRow;
use falcon_common::error::{FalconError, FalconResult};
use falcon_common::types::NodeId;

/// What a page carries. Exactly one of: a batch of rows, the source's
/// last-marker, or the source's fail-marker.
#[derive(Debug, Clone)]
pub enum PageBody {
    /// A batch of rows, in the order the source produced them. May be empty.
    Rows(Vec<OwnedRow>),
    /// The source has no more pages.
    Last,
    /// The source failed; no more pages will follow.
    Fail(Arc<FalconError>),
}

/// An immutable page received from one source.
#[derive(Debug, Clone)]
pub struct ResultPage {
    source: NodeId,
    body: PageBody,
}

impl ResultPage {
    pub fn rows(source: NodeId, rows: Vec<OwnedRow>) -> Self {
        Self {
            source,
            body: PageBody::Rows(rows),
        }
    }

    pub fn last(source: NodeId) -> Self {
        Self {
            source,
            body: PageBody::Last,
        }
    }

    /// Fail-marker for `source`. Also used locally to report an unreachable
    /// source without a network round-trip.
    pub fn fail(source: NodeId, cause: FalconError) -> Self {
        Self {
            source,
            body: PageBody::Fail(Arc::new(cause)),
        }
    }

    /// Build a page from decoded wire fields.
    ///
    /// A message that is more than one kind of page at once (rows together
    /// with a terminal flag, or both terminal flags) is a protocol violation
    /// by the sender and is reported as an internal bug.
    pub fn from_wire(
        source: NodeId,
        rows: Vec<OwnedRow>,
        is_last: bool,
        failure: Option<FalconError>,
    ) -> FalconResult<Self> {
        let body = match (rows.is_empty(), is_last, failure) {
            (_, false, None) => PageBody::Rows(rows),
            (true, true, None) => PageBody::Last,
            (true, false, Some(cause)) => PageBody::Fail(Arc::new(cause)),
            (_, _, failure) => {
                let err = FalconError::internal_bug(
                    "E-MERGE-001",
                    format!("malformed result page from {source}"),
                    format!(
                        "rows={}, is_last={}, is_fail={}",
                        rows.len(),
                        is_last,
                        failure.is_some()
                    ),
                );
                err.log_if_fatal();
                return Err(err);
            }
        };
        Ok(Self { source, body })
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn body(&self) -> &PageBody {
        &self.body
    }

    pub fn into_body(self) -> PageBody {
        self.body
    }

    pub fn is_last(&self) -> bool {
        matches!(self.body, PageBody::Last)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self.body, PageBody::Fail(_))
    }

    /// Number of rows carried; 0 for markers.
    pub fn row_count(&self) -> usize {
        match &self.body {
            PageBody::Rows(rows) => rows.len(),
            _ => 0,
        }
    }
}
