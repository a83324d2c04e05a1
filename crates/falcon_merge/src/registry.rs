//! Node-wide registry of live merge indexes.
//!
//! The transport routes inbound pages by `(query, index)`; failure detection
//! and query teardown fan out over every index of a node or a query.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use falcon_common::error::{ClusterError, FalconError, FalconResult};
use falcon_common::types::{IndexId, NodeId, QueryId};

use crate::coordinator::MergeCoordinator;
use crate::page::ResultPage;

#[derive(Debug, Default)]
pub struct MergeRegistry {
    indexes: DashMap<(QueryId, IndexId), MergeCoordinator>,
}

impl MergeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, coordinator: MergeCoordinator) -> FalconResult<()> {
        let key = (coordinator.query_id(), coordinator.index_id());
        match self.indexes.entry(key) {
            Entry::Occupied(_) => {
                let err = FalconError::internal_bug(
                    "E-MERGE-006",
                    format!("merge index {} registered twice", key.1),
                    format!("query_id={}", key.0 .0),
                );
                err.log_if_fatal();
                Err(err)
            }
            Entry::Vacant(slot) => {
                slot.insert(coordinator);
                Ok(())
            }
        }
    }

    pub fn get(&self, query_id: QueryId, index_id: IndexId) -> Option<MergeCoordinator> {
        self.indexes
            .get(&(query_id, index_id))
            .map(|entry| entry.value().clone())
    }

    /// Deliver a page to its merge index. Pages for an index that is no
    /// longer registered belong to a finished query and are dropped.
    pub fn route(
        &self,
        query_id: QueryId,
        index_id: IndexId,
        page: ResultPage,
    ) -> FalconResult<()> {
        match self.get(query_id, index_id) {
            Some(coordinator) => coordinator.submit_page(page),
            None => {
                tracing::debug!(
                    query_id = query_id.0,
                    index = index_id.0,
                    source = page.source().0,
                    "page for unknown merge index dropped"
                );
                Ok(())
            }
        }
    }

    /// Fail every merge index still expecting pages from `node`. Returns the
    /// number of indexes affected.
    pub fn on_node_left(&self, node: NodeId) -> usize {
        // Collect first: submitting while iterating would hold shard locks.
        let affected: Vec<MergeCoordinator> = self
            .indexes
            .iter()
            .filter(|entry| entry.value().is_source_pending(node))
            .map(|entry| entry.value().clone())
            .collect();
        for coordinator in &affected {
            let cause = FalconError::Cluster(ClusterError::NodeLeft(node));
            if let Err(e) = coordinator.fail_source(node, cause) {
                tracing::warn!(
                    query_id = coordinator.query_id().0,
                    index = coordinator.index_id().0,
                    source = node.0,
                    error = %e,
                    "could not fail merge source"
                );
            }
        }
        if !affected.is_empty() {
            tracing::warn!(
                node = node.0,
                indexes = affected.len(),
                "node left, failed merge indexes waiting on it"
            );
        }
        affected.len()
    }

    /// Cancel every merge index of `query_id`. Returns how many were
    /// cancelled by this call.
    pub fn cancel_query(&self, query_id: QueryId, reason: &str) -> usize {
        let coordinators: Vec<MergeCoordinator> = self
            .indexes
            .iter()
            .filter(|entry| entry.key().0 == query_id)
            .map(|entry| entry.value().clone())
            .collect();
        coordinators.iter().filter(|c| c.cancel(reason)).count()
    }

    /// Drop every merge index of a finished query.
    pub fn deregister_query(&self, query_id: QueryId) -> usize {
        let keys: Vec<(QueryId, IndexId)> = self
            .indexes
            .iter()
            .filter(|entry| entry.key().0 == query_id)
            .map(|entry| *entry.key())
            .collect();
        keys.iter()
            .filter(|key| self.indexes.remove(key).is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}
