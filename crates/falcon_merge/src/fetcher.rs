//! Credit-based flow control between a merge index and the transport.
//!
//! A source may only have a bounded number of undrained data pages buffered
//! at the reduce side (one for a sorted merge, `max_pages_in_flight` for an
//! unsorted one). Each time the consumer takes one of a source's data pages
//! off the buffer, the merge index hands one credit back by asking the
//! transport for that source's next page. A source that sends beyond its
//! credit is a protocol violation.

use falcon_common::types::{IndexId, NodeId, QueryId};

/// Implemented by the transport: request the next page of `source`'s
/// sub-scan for the given merge index.
///
/// Called on the consumer thread. The consumer may still hold its own
/// cursor state, but never a lock that `submit_page` takes, so an
/// implementation may submit the page synchronously. It must not block for
/// the page to arrive.
pub trait PageFetcher: Send + Sync {
    fn fetch_next_page(&self, query_id: QueryId, index_id: IndexId, source: NodeId);
}
