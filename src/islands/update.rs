//! The island update: applying recorded changes, merging and splitting islands.
//!
//! The first pass runs in this order:
//!
//! 1. Size the work buffers. Running out of memory aborts the update here, before the graph is touched.
//! 2. Cancel out edges that were both connected and disconnected since the last update.
//! 3. Skip the rest if everything was asleep and nothing changed.
//! 4. Remove deleted nodes and broken edges from their islands, marking those islands as broken.
//! 5. Free islands that lost all of their nodes.
//! 6. Give each created node an island of its own.
//! 7. Merge the islands connected by joined edges, folding the smaller island into the larger one.
//! 8. Return deleted nodes and edges to their pools.
//! 9. Replace kinematic nodes with per-edge proxies.
//! 10. Split broken islands into connected components.
//! 11. Classify islands as sleeping or awake, and write the awake ones to the solver output.

use bevy::log::{debug, trace, warn};

use crate::{
    data_structures::slot_pool::{SlotPool, round_up_to_granularity},
    error::IslandError,
};

use super::{
    EdgeFlags, IslandId, IslandManager, IslandNode, Node, NodeFlags, NodeId,
    work_buffers::WorkBufferSizes,
};

/// The pass an island is processed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UpdatePass {
    First,
    Second,
}

impl IslandManager {
    /// Runs the first pass of the island update.
    ///
    /// Returns [`IslandError::UpdateInProgress`] if the previous update was not finished
    /// with [`free_buffers`](Self::free_buffers). If the work buffers cannot be allocated,
    /// the update is aborted before any island is changed, and the recorded changes
    /// stay queued for the next attempt.
    pub fn update_islands(&mut self) -> Result<(), IslandError> {
        if self.in_update {
            return Err(IslandError::UpdateInProgress);
        }

        self.output.clear();
        self.update_performed = false;
        self.second_pass_done = false;

        if let Err(error) = self.resize_arrays() {
            warn!("Island update aborted: {error}");
            return Err(error);
        }

        self.in_update = true;

        self.events
            .cleanup_edge_events(&mut self.buffers.edge_event_counters);

        if self.everything_asleep && !self.has_anything_changed {
            trace!("Skipping island update, everything is asleep");
            return Ok(());
        }

        self.update_performed = true;
        self.has_anything_changed = false;

        let created_nodes = self.events.created_nodes.len();
        let deleted_nodes = self.events.deleted_nodes.len();
        let joined_edges = self.events.joined_edges.len();
        let broken_edges = self.events.broken_edges.len();

        self.remove_deleted_nodes_from_islands();
        self.remove_broken_edges_from_islands();
        self.release_empty_islands();
        self.process_created_nodes();
        self.process_joined_edges();
        self.release_deleted_nodes_and_edges();

        if self.counts.kinematics > 0 {
            self.duplicate_kinematic_nodes();
        } else {
            self.counts.kinematic_proxies = 0;
        }

        self.split_broken_islands(UpdatePass::First);
        self.process_sleeping_islands(UpdatePass::First);

        self.events.reset();

        debug!(
            "Island update: {created_nodes} nodes created, {deleted_nodes} deleted, {joined_edges} edges joined, {broken_edges} broken, {} islands, {} awake, {} deferred to the second pass",
            self.islands.len(),
            self.output.solver_island_count(),
            self.output.second_pass_islands.len()
        );

        #[cfg(debug_assertions)]
        self.validate();

        Ok(())
    }

    /// Runs both passes of the island update back to back on the calling thread.
    ///
    /// The narrow phase does not get a chance to run between the passes, so islands
    /// deferred to the second pass are resolved without it.
    /// [`free_buffers`](Self::free_buffers) must still be called to finish the update.
    pub fn update_inline(&mut self) -> Result<(), IslandError> {
        self.update_islands()?;
        self.update_islands_second_pass()
    }

    /// Finishes the current update.
    ///
    /// Kinematic proxies are merged back into their source nodes, and whether everything
    /// is asleep is recorded so that the next update can be skipped if nothing changes.
    /// The [`IslandOutput`](super::output::IslandOutput) stays readable until the next update.
    ///
    /// Does nothing if no update is in progress.
    pub fn free_buffers(&mut self) {
        if !self.in_update {
            return;
        }

        if self.update_performed {
            if !self.buffers.kinematic_sources.is_empty() {
                self.merge_kinematic_proxies_back();
            }

            let unresolved = !self.second_pass_done && !self.output.second_pass_islands.is_empty();
            self.everything_asleep = self.output.solver_island_count() == 0 && !unresolved;
        }

        self.has_anything_changed |= !self.events.is_empty();
        self.in_update = false;
        self.buffers.release();

        #[cfg(debug_assertions)]
        self.validate();
    }

    /// Sizes the node pool and every work buffer for this update.
    pub(crate) fn resize_arrays(&mut self) -> Result<(), IslandError> {
        let kinematic_proxies = self.resize_for_kinematics()?;

        let node_slots =
            round_up_to_granularity(self.nodes.len() + kinematic_proxies).max(self.nodes.capacity());

        let sizes = WorkBufferSizes {
            node_slots,
            edge_slots: self.edges.capacity(),
            island_slots: node_slots.max(self.islands.capacity()),
            kinematic_proxies,
            kinematics: self.counts.kinematics as usize,
            bodies: self.counts.rigid_bodies as usize,
            articulations: self.articulation_roots.len(),
            contact_managers: self.counts.contact_manager_edges as usize,
            constraints: self.counts.constraint_edges as usize,
        };

        let requested_bytes = sizes.required_bytes();

        if let Some(budget) = self.config.work_buffer_budget
            && requested_bytes > budget
        {
            return Err(IslandError::OutOfMemory { requested_bytes });
        }

        let policy = self.buffer_policy();
        self.buffers.resize(&sizes, policy, &mut self.output)?;

        Ok(())
    }

    fn remove_deleted_nodes_from_islands(&mut self) {
        for &node in &self.events.deleted_nodes {
            if let Some(island_id) = self.islands.unlink_node(node, &mut self.nodes) {
                self.buffers
                    .broken_islands
                    .set_and_grow(island_id.index());
            }
        }
    }

    fn remove_broken_edges_from_islands(&mut self) {
        // Removed edges stop connecting their nodes.
        for &edge_id in &self.events.deleted_edges {
            self.edges[edge_id.0].flags.remove(EdgeFlags::CONNECTED);

            if let Some(island_id) = self.islands.unlink_edge(edge_id, &mut self.edges) {
                self.buffers
                    .broken_islands
                    .set_and_grow(island_id.index());
            }
        }

        for &edge_id in &self.events.broken_edges {
            if self.edges[edge_id.0].is_removed() {
                continue;
            }

            if let Some(island_id) = self.islands.unlink_edge(edge_id, &mut self.edges) {
                self.buffers
                    .broken_islands
                    .set_and_grow(island_id.index());
            }
        }
    }

    fn release_empty_islands(&mut self) {
        let mut scratch = core::mem::take(&mut self.buffers.island_scratch);
        scratch.clear();
        scratch.extend(
            self.buffers
                .broken_islands
                .iter_ones()
                .map(|index| IslandId(index as u32)),
        );

        for &island_id in &scratch {
            let Some(island) = self.islands.get(island_id) else {
                continue;
            };

            if island.node_count() > 0 {
                continue;
            }

            if island.edge_count() > 0 {
                warn!(
                    "Island {island_id:?} has {} edges but no nodes. The edges of removed nodes must be removed too.",
                    island.edge_count()
                );
                while let Some(edge_id) = self.islands.get(island_id).and_then(|i| i.edges.head) {
                    self.islands.unlink_edge(edge_id, &mut self.edges);
                }
            }

            self.islands.remove_island(island_id);
            self.buffers.broken_islands.unset(island_id.index());
        }

        self.buffers.island_scratch = scratch;
    }

    fn process_created_nodes(&mut self) {
        for &node_id in &self.events.created_nodes {
            let node = &mut self.nodes[node_id.0];
            node.flags.remove(NodeFlags::NEW);

            if node.is_deleted() || node.island_id().is_some() {
                continue;
            }

            let island_id = self.islands.create_island();
            self.islands.link_node(island_id, node_id, &mut self.nodes);
        }
    }

    fn process_joined_edges(&mut self) {
        let Self {
            nodes,
            edges,
            islands,
            buffers,
            events,
            ..
        } = self;

        for &edge_id in &events.joined_edges {
            let edge = &edges[edge_id.0];

            if edge.is_removed() || !edge.is_connected() || edge.island_id().is_some() {
                continue;
            }

            let mut target: Option<IslandId> = None;

            for node_id in edge.nodes() {
                let Some(island_id) = nodes[node_id.0].island_id() else {
                    debug_assert!(
                        nodes[node_id.0].is_deleted(),
                        "Node {node_id:?} of joined edge {edge_id:?} is not in an island"
                    );
                    continue;
                };

                target = Some(match target {
                    None => island_id,
                    Some(target) if target == island_id => target,
                    Some(target) => {
                        let broken = buffers.broken_islands.get(target.index())
                            || buffers.broken_islands.get(island_id.index());

                        let merged = islands.merge_islands(target, island_id, nodes, edges);

                        // The merged island inherits pending splits.
                        if broken {
                            buffers.broken_islands.unset(target.index());
                            buffers.broken_islands.unset(island_id.index());
                            buffers.broken_islands.set_and_grow(merged.index());
                        }

                        merged
                    }
                });
            }

            if let Some(island_id) = target {
                islands.link_edge(island_id, edge_id, edges);
            }
        }
    }

    fn release_deleted_nodes_and_edges(&mut self) {
        for &node_id in &self.events.deleted_nodes {
            if let Some(node) = self.nodes.free(node_id.0)
                && let Some(root) = node.articulation_root
            {
                self.articulation_roots.remove(root.0 as usize);
            }
        }

        for &edge_id in &self.events.deleted_edges {
            self.edges.free(edge_id.0);
        }
    }

    /// Splits every island marked as broken into its connected components.
    ///
    /// Connectivity is computed with union-find over the connected edges of the island.
    /// In the second pass, the resulting islands are marked as affected.
    pub(crate) fn split_broken_islands(&mut self, pass: UpdatePass) {
        let mut scratch = core::mem::take(&mut self.buffers.island_scratch);
        scratch.clear();
        scratch.extend(
            self.buffers
                .broken_islands
                .iter_ones()
                .map(|index| IslandId(index as u32)),
        );

        for &island_id in &scratch {
            if self.islands.contains(island_id) {
                self.split_island(island_id, pass);
            }
        }

        self.buffers.broken_islands.clear();
        self.buffers.island_scratch = scratch;
    }

    fn split_island(&mut self, island_id: IslandId, pass: UpdatePass) {
        let Self {
            nodes,
            edges,
            islands,
            buffers,
            ..
        } = self;

        let island = islands.remove_island(island_id);

        if pass == UpdatePass::Second {
            buffers.affected_islands.unset(island_id.index());
        }

        // Gather the nodes and edges, and unlink them.
        buffers.graph_nodes.clear();
        let mut cursor = island.nodes.head;
        while let Some(node_id) = cursor {
            let links = &mut nodes[node_id.0].island;
            cursor = links.next;
            *links = IslandNode::PLACEHOLDER;

            buffers.graph_parent[node_id.index()] = node_id.0;
            buffers.graph_size[node_id.index()] = 1;
            buffers.graph_nodes.push(node_id);
        }

        buffers.graph_edges.clear();
        let mut cursor = island.edges.head;
        while let Some(edge_id) = cursor {
            let links = &mut edges[edge_id.0].island;
            cursor = links.next;
            *links = IslandNode::PLACEHOLDER;

            buffers.graph_edges.push(edge_id);
        }

        // Only the gathered nodes are unlinked at this point.
        let gathered = |node: NodeId, nodes: &SlotPool<Node>| {
            nodes
                .get(node.0)
                .is_some_and(|node| node.island_id().is_none() && !node.is_deleted())
        };

        // Union the endpoints of every edge.
        for &edge_id in &buffers.graph_edges {
            let edge = &edges[edge_id.0];
            if let (Some(a), Some(b)) = (edge.node1, edge.node2)
                && gathered(a, nodes)
                && gathered(b, nodes)
            {
                union(&mut buffers.graph_parent, &mut buffers.graph_size, a, b);
            }
        }

        // Create an island per component.
        let mut island_count = 0;

        for &node_id in &buffers.graph_nodes {
            let root = find(&mut buffers.graph_parent, node_id.0);
            let mut component_island = buffers.root_islands[root as usize];

            if component_island == IslandId::PLACEHOLDER {
                component_island = islands.create_island();
                buffers.root_islands[root as usize] = component_island;
                island_count += 1;

                if pass == UpdatePass::Second {
                    buffers
                        .affected_islands
                        .set_and_grow(component_island.index());
                }
            }

            islands.link_node(component_island, node_id, nodes);
        }

        for &edge_id in &buffers.graph_edges {
            let component_island = edges[edge_id.0]
                .nodes()
                .into_iter()
                .find_map(|node| nodes.get(node.0).and_then(Node::island_id));

            if let Some(component_island) = component_island {
                islands.link_edge(component_island, edge_id, edges);
            }
        }

        // Reset the component lookup for the next island.
        for &node_id in &buffers.graph_nodes {
            buffers.root_islands[node_id.index()] = IslandId::PLACEHOLDER;
        }

        if island_count != 1 {
            trace!("Split island {island_id:?} into {island_count} islands");
        }
    }
}

/// Finds the root of the set containing `node`, halving the path along the way.
#[inline]
fn find(parent: &mut [u32], mut node: u32) -> u32 {
    while parent[node as usize] != node {
        let grandparent = parent[parent[node as usize] as usize];
        parent[node as usize] = grandparent;
        node = grandparent;
    }
    node
}

/// Merges the sets containing `a` and `b`, attaching the smaller set to the larger one.
#[inline]
fn union(parent: &mut [u32], size: &mut [u32], a: NodeId, b: NodeId) {
    let mut root_a = find(parent, a.0);
    let mut root_b = find(parent, b.0);

    if root_a == root_b {
        return;
    }

    if size[root_a as usize] < size[root_b as usize] {
        core::mem::swap(&mut root_a, &mut root_b);
    }

    parent[root_b as usize] = root_a;
    size[root_a as usize] += size[root_b as usize];
}
