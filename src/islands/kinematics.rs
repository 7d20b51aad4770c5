//! Kinematic duplication.
//!
//! A kinematic body is moved externally, so it transmits motion to the bodies touching it,
//! but it must not tie those bodies together into one island. A kinematic conveyor belt
//! carrying a hundred separate boxes should produce a hundred islands, not one.
//!
//! During each update, every edge touching a kinematic node gets its own *proxy* node standing in
//! for the kinematic. The islands containing kinematic nodes are then split using the proxies,
//! so that islands only connected through a kinematic end up separate.
//!
//! Proxies only live until [`IslandManager::free_buffers`], which merges the islands of each kinematic's
//! proxies and links the kinematic node back into the result.
//!
//! [`IslandManager::free_buffers`]: super::IslandManager::free_buffers

use bevy::log::trace;

use crate::error::IslandError;

use super::{IslandId, IslandManager, Node, NodeFlags, NodeId};

impl IslandManager {
    /// Counts the kinematic proxies the next update may create,
    /// and grows the node pool so that they can be inserted without reallocating.
    ///
    /// This is an upper bound: every edge endpoint that is kinematic, for the edges
    /// of islands containing kinematic nodes and for the edges joined since the last update.
    pub(crate) fn resize_for_kinematics(&mut self) -> Result<usize, IslandError> {
        if self.counts.kinematics == 0 {
            return Ok(0);
        }

        let nodes = &self.nodes;
        let kinematic_endpoints = |edge: &super::Edge| {
            edge.nodes()
                .into_iter()
                .filter(|node| nodes.get(node.0).is_some_and(Node::is_kinematic))
                .count()
        };

        let mut count = 0;

        // Edges joined since the last update that are not in an island yet.
        for edge_id in &self.events.joined_edges {
            let edge = &self.edges[edge_id.0];
            if edge.is_connected() && !edge.is_removed() && edge.island_id().is_none() {
                count += kinematic_endpoints(edge);
            }
        }

        // Edges of the islands that contain kinematic nodes.
        let kinematic_islands = &mut self.buffers.kinematic_islands;
        kinematic_islands.clear();

        for index in self.kinematic_nodes.iter_ones() {
            let Some(node) = nodes.get(index as u32) else {
                continue;
            };
            let Some(island_id) = node.island_id() else {
                continue;
            };

            if kinematic_islands.get(island_id.index()) {
                continue;
            }
            kinematic_islands.set_and_grow(island_id.index());

            let island = self.islands.get(island_id).unwrap_or_else(|| {
                panic!("Kinematic node {index} is in island {island_id:?}, which does not exist")
            });
            for edge_id in island.edges.iter(&self.edges) {
                count += kinematic_endpoints(&self.edges[edge_id.0]);
            }
        }

        kinematic_islands.clear();

        self.nodes.try_grow(self.nodes.len() + count)?;

        Ok(count)
    }

    /// Replaces the kinematic endpoint of every island edge with a proxy node,
    /// and marks the islands containing kinematic nodes as broken so that they are split.
    pub(crate) fn duplicate_kinematic_nodes(&mut self) {
        let Self {
            nodes,
            edges,
            islands,
            buffers,
            kinematic_nodes,
            ..
        } = self;

        buffers.kinematic_sources.clear();
        buffers.kinematic_sources.extend(
            kinematic_nodes
                .iter_ones()
                .map(|index| NodeId(index as u32))
                .filter(|id| nodes.get(id.0).is_some_and(|node| !node.is_deleted())),
        );

        // Mark the islands to split.
        for source in &buffers.kinematic_sources {
            if let Some(island_id) = nodes[source.0].island_id() {
                buffers.broken_islands.set_and_grow(island_id.index());
                buffers.kinematic_islands.set_and_grow(island_id.index());
            }
        }

        buffers.island_scratch.clear();
        buffers
            .island_scratch
            .extend(buffers.kinematic_islands.iter_ones().map(|i| IslandId(i as u32)));

        for &island_id in &buffers.island_scratch {
            let Some(island) = islands.get(island_id) else {
                continue;
            };

            let mut cursor = island.edges.head;

            while let Some(edge_id) = cursor {
                cursor = edges[edge_id.0].island.next;

                let endpoints = edges[edge_id.0].nodes();

                for endpoint in endpoints {
                    let source = &nodes[endpoint.0];

                    if !source.is_kinematic() || source.is_kinematic_proxy() {
                        continue;
                    }

                    let flags = (source.flags
                        - NodeFlags::NEW
                        - NodeFlags::DELETED
                        - NodeFlags::IN_SLEEPING_ISLAND)
                        | NodeFlags::KINEMATIC_PROXY;
                    let proxy_node = Node::new(source.body, flags);

                    assert!(
                        nodes.len() < nodes.capacity(),
                        "No room was reserved for the kinematic proxies"
                    );
                    let (index, _) = nodes
                        .insert(proxy_node)
                        .unwrap_or_else(|_| panic!("Failed to insert a kinematic proxy"));
                    let proxy = NodeId(index);

                    buffers.proxy_source[proxy.index()] = endpoint;
                    buffers.proxy_edge[proxy.index()] = edge_id;
                    buffers.proxy_next[proxy.index()] = buffers.first_proxy[endpoint.index()];
                    buffers.first_proxy[endpoint.index()] = proxy;
                    buffers.proxies.push(proxy);

                    islands.link_node(island_id, proxy, nodes);
                    edges[edge_id.0].replace_node(endpoint, proxy);
                }
            }
        }

        buffers.kinematic_islands.clear();

        // Kinematic nodes that are represented by proxies leave their island.
        // The others, such as kinematic bodies touching nothing, stay where they are.
        for source in &buffers.kinematic_sources {
            if !buffers.first_proxy[source.index()].is_placeholder() {
                islands.unlink_node(*source, nodes);
            }
        }

        self.counts.kinematic_proxies = self.buffers.proxies.len() as u32;

        trace!(
            "Created {} kinematic proxies for {} kinematic nodes",
            self.buffers.proxies.len(),
            self.buffers.kinematic_sources.len()
        );
    }

    /// Removes the kinematic proxies, points their edges back at the source kinematic node,
    /// and links each source into the merged island of its proxies.
    pub(crate) fn merge_kinematic_proxies_back(&mut self) {
        let Self {
            nodes,
            edges,
            islands,
            buffers,
            ..
        } = self;

        for &source in &buffers.kinematic_sources {
            let first = buffers.first_proxy[source.index()];

            if first.is_placeholder() {
                continue;
            }

            // Merge the islands of all proxies. Each proxy reads its island after the previous merges,
            // so merged-away islands are never used.
            let mut target: Option<IslandId> = None;
            let mut proxy = first;

            while !proxy.is_placeholder() {
                if let Some(island_id) = nodes[proxy.0].island_id() {
                    target = Some(match target {
                        Some(target) => islands.merge_islands(target, island_id, nodes, edges),
                        None => island_id,
                    });
                }
                proxy = buffers.proxy_next[proxy.index()];
            }

            // Remove the proxies.
            let mut proxy = first;

            while !proxy.is_placeholder() {
                let next = buffers.proxy_next[proxy.index()];

                islands.unlink_node(proxy, nodes);

                let edge_id = buffers.proxy_edge[proxy.index()];
                if !edge_id.is_placeholder() {
                    edges[edge_id.0].replace_node(proxy, source);
                }

                nodes.free(proxy.0);
                buffers.proxy_next[proxy.index()] = NodeId::PLACEHOLDER;
                buffers.proxy_source[proxy.index()] = NodeId::PLACEHOLDER;
                buffers.proxy_edge[proxy.index()] = super::EdgeId::PLACEHOLDER;

                proxy = next;
            }

            buffers.first_proxy[source.index()] = NodeId::PLACEHOLDER;

            let island_id = target.unwrap_or_else(|| islands.create_island());
            islands.link_node(island_id, source, nodes);
        }

        buffers.proxies.clear();
    }
}
