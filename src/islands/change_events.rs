//! Queues of graph changes recorded between island updates.
//!
//! The [`IslandManager`](super::IslandManager) entry points only record what changed.
//! The changes are applied to the islands in one go at the start of the next update,
//! and the queues are reset once the first pass is done.

use super::{EdgeId, NodeId};

/// Nodes and edges created, removed, connected or disconnected since the last island update.
#[derive(Clone, Debug, Default)]
pub struct ChangeEvents {
    pub(crate) created_nodes: Vec<NodeId>,
    pub(crate) deleted_nodes: Vec<NodeId>,
    pub(crate) created_edges: Vec<EdgeId>,
    pub(crate) deleted_edges: Vec<EdgeId>,
    pub(crate) joined_edges: Vec<EdgeId>,
    pub(crate) broken_edges: Vec<EdgeId>,
}

impl ChangeEvents {
    #[inline]
    pub(crate) fn record_node_created(&mut self, node: NodeId) {
        self.created_nodes.push(node);
    }

    #[inline]
    pub(crate) fn record_node_deleted(&mut self, node: NodeId) {
        self.deleted_nodes.push(node);
    }

    #[inline]
    pub(crate) fn record_edge_created(&mut self, edge: EdgeId) {
        self.created_edges.push(edge);
    }

    #[inline]
    pub(crate) fn record_edge_deleted(&mut self, edge: EdgeId) {
        self.deleted_edges.push(edge);
    }

    /// Records that an edge started connecting its nodes.
    ///
    /// The caller must only record this when the edge was not connected before,
    /// so that an edge appears at most once per transition.
    #[inline]
    pub(crate) fn record_edge_connected(&mut self, edge: EdgeId) {
        self.joined_edges.push(edge);
    }

    /// Records that an edge stopped connecting its nodes.
    #[inline]
    pub(crate) fn record_edge_disconnected(&mut self, edge: EdgeId) {
        self.broken_edges.push(edge);
    }

    /// Returns the nodes created since the last update.
    #[inline]
    pub fn created_nodes(&self) -> &[NodeId] {
        &self.created_nodes
    }

    /// Returns the nodes removed since the last update.
    #[inline]
    pub fn deleted_nodes(&self) -> &[NodeId] {
        &self.deleted_nodes
    }

    /// Returns the edges created since the last update.
    #[inline]
    pub fn created_edges(&self) -> &[EdgeId] {
        &self.created_edges
    }

    /// Returns the edges removed since the last update.
    #[inline]
    pub fn deleted_edges(&self) -> &[EdgeId] {
        &self.deleted_edges
    }

    /// Returns the edges that started connecting their nodes since the last update.
    #[inline]
    pub fn joined_edges(&self) -> &[EdgeId] {
        &self.joined_edges
    }

    /// Returns the edges that stopped connecting their nodes since the last update.
    #[inline]
    pub fn broken_edges(&self) -> &[EdgeId] {
        &self.broken_edges
    }

    /// Returns `true` if no changes are queued.
    pub fn is_empty(&self) -> bool {
        self.created_nodes.is_empty()
            && self.deleted_nodes.is_empty()
            && self.created_edges.is_empty()
            && self.deleted_edges.is_empty()
            && self.joined_edges.is_empty()
            && self.broken_edges.is_empty()
    }

    /// Clears all queues.
    pub fn reset(&mut self) {
        self.created_nodes.clear();
        self.deleted_nodes.clear();
        self.created_edges.clear();
        self.deleted_edges.clear();
        self.joined_edges.clear();
        self.broken_edges.clear();
    }

    /// Removes joined and broken events that cancel each other out.
    ///
    /// An edge that was connected and then disconnected (or the other way around)
    /// since the last update ends up in the state it started in, so neither event needs processing.
    /// Surviving events are also deduplicated.
    ///
    /// `counters` must have one zeroed entry per edge slot, and is left zeroed.
    pub(crate) fn cleanup_edge_events(&mut self, counters: &mut [i32]) {
        if self.joined_edges.is_empty() || self.broken_edges.is_empty() {
            return;
        }

        for edge in &self.broken_edges {
            counters[edge.index()] -= 1;
        }
        for edge in &self.joined_edges {
            counters[edge.index()] += 1;
        }

        // Keep the net-broken edges once.
        self.broken_edges.retain(|edge| {
            let counter = &mut counters[edge.index()];
            let keep = *counter < 0;
            if keep {
                *counter = 0;
            }
            keep
        });

        // Keep the net-joined edges once.
        self.joined_edges.retain(|edge| {
            let counter = &mut counters[edge.index()];
            let keep = *counter > 0;
            if keep {
                *counter = 0;
            }
            keep
        });

        // Zero the counters of the cancelled pairs.
        // Any edge that still has a nonzero counter was dropped from both lists.
        for counter in counters.iter_mut() {
            *counter = 0;
        }
    }
}
