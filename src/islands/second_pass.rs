//! The second pass of the island update.
//!
//! Islands that are woken up by the first pass can contain contact pairs that were asleep,
//! so the narrow phase has not created contact managers for them yet. Whether such an island
//! should be split can only be decided once the narrow phase has run for those pairs.
//! The first pass lists them in [`IslandOutput::second_pass_islands`], and the second pass
//! applies the edges broken in between, but only within those islands.
//!
//! [`IslandOutput::second_pass_islands`]: super::output::IslandOutput::second_pass_islands

use bevy::log::{debug, warn};

use crate::error::IslandError;

use super::{EdgeId, IslandManager, update::UpdatePass};

impl IslandManager {
    /// Runs the second pass of the island update.
    ///
    /// Edges disconnected since the first pass are removed from the islands deferred to the
    /// second pass, which are then split and classified again. Their awake parts are appended
    /// to the [`IslandOutput`](super::output::IslandOutput).
    ///
    /// Edges connected since the first pass, and edges disconnected in other islands,
    /// stay queued for the next update.
    ///
    /// Returns [`IslandError::SecondPassWithoutFirstPass`] if no update is in progress.
    /// Does nothing if the first pass was skipped or the second pass already ran.
    pub fn update_islands_second_pass(&mut self) -> Result<(), IslandError> {
        if !self.in_update {
            return Err(IslandError::SecondPassWithoutFirstPass);
        }

        if !self.update_performed || self.second_pass_done {
            return Ok(());
        }

        self.second_pass_done = true;

        debug_assert!(
            self.events.created_nodes.is_empty()
                && self.events.deleted_nodes.is_empty()
                && self.events.created_edges.is_empty()
                && self.events.deleted_edges.is_empty(),
            "Nodes and edges were added or removed during an island update"
        );

        // Joined edges are merged by the next update.
        let edges = &self.edges;
        self.events.joined_edges.retain(|edge_id| {
            let edge = &edges[edge_id.0];
            edge.is_connected() && edge.island_id().is_none()
        });

        for island_id in &self.output.second_pass_islands {
            self.buffers
                .affected_islands
                .set_and_grow(island_id.index());
        }

        let mut broken_edges = core::mem::take(&mut self.events.broken_edges);
        let mut deferred = 0;

        broken_edges.retain(|&edge_id| {
            let edge = &self.edges[edge_id.0];

            if edge.is_connected() {
                // Reconnected since.
                return false;
            }

            let Some(island_id) = edge.island_id() else {
                return false;
            };

            if !self.buffers.affected_islands.get(island_id.index()) {
                deferred += 1;
                return true;
            }

            self.detach_kinematic_proxies(edge_id);
            self.islands.unlink_edge(edge_id, &mut self.edges);
            self.buffers
                .broken_islands
                .set_and_grow(island_id.index());

            false
        });

        self.events.broken_edges = broken_edges;

        if deferred > 0 {
            warn!(
                "{deferred} edges were disconnected outside the islands of the second pass, and are deferred to the next update"
            );
        }

        self.split_broken_islands(UpdatePass::Second);
        self.process_sleeping_islands(UpdatePass::Second);

        debug!(
            "Second island pass: {} islands deferred, {} awake islands in total",
            self.output.second_pass_islands.len(),
            self.output.solver_island_count()
        );

        #[cfg(debug_assertions)]
        self.validate();

        Ok(())
    }

    /// Points a broken edge back at the source of its kinematic proxies, and removes the proxies from their island.
    fn detach_kinematic_proxies(&mut self, edge_id: EdgeId) {
        let endpoints = self.edges[edge_id.0].nodes();

        for proxy in endpoints {
            if !self.nodes[proxy.0].is_kinematic_proxy() {
                continue;
            }

            let source = self.buffers.proxy_source[proxy.index()];

            self.islands.unlink_node(proxy, &mut self.nodes);
            self.edges[edge_id.0].replace_node(proxy, source);
            self.buffers.proxy_edge[proxy.index()] = EdgeId::PLACEHOLDER;
        }
    }
}
