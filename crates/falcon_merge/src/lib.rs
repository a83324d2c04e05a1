//! Reduce-side merge of distributed index scans.
//!
//! A distributed scan runs one sub-scan per data node. Each sub-scan streams
//! its rows back as [`ResultPage`]s, closed by a last-marker or a
//! fail-marker. A [`MergeCoordinator`] collects the pages of one scan and
//! presents them to the executor as a single cursor, either in arrival order
//! (unsorted) or as a k-way merge of the per-source sorted streams.

pub mod comparator;
pub mod coordinator;
pub mod cursor;
pub mod fetcher;
pub mod metrics;
pub mod page;
pub mod registry;
mod sorted;
mod unsorted;

pub use comparator::{RowComparator, SortKeyComparator};
pub use coordinator::{MergeCoordinator, MergeCoordinatorBuilder, MergeStrategy, SourceFailure};
pub use cursor::{Cursor, FetchedCursor, SearchBounds, StreamingCursor};
pub use fetcher::PageFetcher;
pub use metrics::MergeMetricsSnapshot;
pub use page::{PageBody, ResultPage};
pub use registry::MergeRegistry;
