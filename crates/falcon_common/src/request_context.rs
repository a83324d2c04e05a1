//! Per-query execution context.
//!
//! Every distributed query execution carries a `QueryContext` that is handed
//! to each component created for it (merge indexes, transport handlers).
//!
//! Fields:
//! - `query_id`: unique per query execution (monotonic)
//! - `local_node`: node the reduce side runs on
//! - `started_at`: when the execution was dispatched
//! - cancel token: shared cancellation signal for every blocking wait

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::types::{NodeId, QueryId};

/// Global monotonic query ID counter.
static GLOBAL_QUERY_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a new unique query ID.
pub fn next_query_id() -> QueryId {
    QueryId(GLOBAL_QUERY_ID.fetch_add(1, Ordering::Relaxed))
}

/// Per-query context propagated to every component serving the execution.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub query_id: QueryId,
    pub local_node: NodeId,
    pub started_at: Instant,
    cancel: CancelToken,
}

impl QueryContext {
    /// Create a context with a fresh query ID and a new cancel token.
    pub fn new(local_node: NodeId) -> Self {
        Self::with_ids(next_query_id(), local_node)
    }

    /// Create with explicit IDs (for testing and for re-attaching to a known query).
    pub fn with_ids(query_id: QueryId, local_node: NodeId) -> Self {
        Self {
            query_id,
            local_node,
            started_at: Instant::now(),
            cancel: CancelToken::new(),
        }
    }

    /// Share an existing cancel token (e.g. the session's).
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Cancel the query. Returns `false` if it was already cancelled.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        self.cancel.cancel(reason)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Start a statement-timeout watchdog: cancels the query with reason
    /// `"statement timeout"` unless it is cancelled for another reason first.
    pub fn cancel_after(&self, timeout: Duration) -> JoinHandle<()> {
        let token = self.cancel.clone();
        let query_id = self.query_id;
        std::thread::spawn(move || {
            if !token.wait_timeout(timeout) && token.cancel("statement timeout") {
                tracing::info!(
                    query_id = query_id.0,
                    timeout_ms = timeout.as_millis() as u64,
                    "statement timeout elapsed, query cancelled"
                );
            }
        })
    }

    /// Elapsed time since dispatch in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Format as a structured context string for log/error messages.
    /// Example: `"query_id=42, local_node=1"`
    pub fn as_context_str(&self) -> String {
        format!(
            "query_id={}, local_node={}",
            self.query_id.0, self.local_node.0
        )
    }
}
