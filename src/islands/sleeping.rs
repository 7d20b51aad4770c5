//! Sleep classification and the solver output.
//!
//! An island sleeps if every node in it is ready for sleeping. Sleeping islands are left
//! out of the solver output, while awake islands are flattened into the [`IslandOutput`] arrays.
//!
//! [`IslandOutput`]: super::output::IslandOutput

use super::{
    EdgeKind, IslandId, IslandManager, NodeFlags, NodeId,
    output::{IndexedConstraint, IndexedContactManager, IslandBody, SolverEndpoint},
    update::UpdatePass,
};

impl IslandManager {
    /// Classifies islands as sleeping or awake, and writes the awake islands to the solver output.
    ///
    /// The first pass processes every island. Awake islands with contact pairs that have no
    /// contact manager yet are deferred to the second pass, which only processes the islands
    /// marked as affected.
    pub(crate) fn process_sleeping_islands(&mut self, pass: UpdatePass) {
        let mut scratch = core::mem::take(&mut self.buffers.island_scratch);
        scratch.clear();

        match pass {
            UpdatePass::First => scratch.extend(
                self.islands
                    .live()
                    .iter_ones()
                    .map(|index| IslandId(index as u32)),
            ),
            UpdatePass::Second => scratch.extend(
                self.buffers
                    .affected_islands
                    .iter_ones()
                    .map(|index| IslandId(index as u32))
                    .filter(|&id| self.islands.contains(id)),
            ),
        }

        self.output.pop_sentinel();

        for &island_id in &scratch {
            if self.is_island_ready_for_sleeping(island_id) {
                self.put_island_to_sleep(island_id, pass);
            } else {
                self.write_awake_island(island_id, pass);
            }
        }

        self.output.push_sentinel();

        self.buffers.island_scratch = scratch;
    }

    fn is_island_ready_for_sleeping(&self, island_id: IslandId) -> bool {
        self.islands.get(island_id).is_some_and(|island| {
            island
                .nodes
                .iter(&self.nodes)
                .all(|node| self.nodes[node.0].is_ready_for_sleeping())
        })
    }

    /// Returns the body to report when the node changes its sleeping state.
    ///
    /// Kinematic bodies are driven externally, and articulations are reported once by their root link.
    fn island_body(&self, node_id: NodeId) -> Option<IslandBody> {
        let node = &self.nodes[node_id.0];

        if node.is_kinematic() {
            return None;
        }

        if node.is_articulation_link() {
            return node.articulation_root.map(|root| {
                IslandBody::Articulation(self.articulation_roots[root.0 as usize].articulation)
            });
        }

        Some(IslandBody::RigidBody(node.body))
    }

    fn put_island_to_sleep(&mut self, island_id: IslandId, pass: UpdatePass) {
        let Some(island) = self.islands.get(island_id) else {
            return;
        };

        let mut cursor = island.nodes.head;

        while let Some(node_id) = cursor {
            let node = &mut self.nodes[node_id.0];
            cursor = node.island.next;

            let was_sleeping = node.is_in_sleeping_island();
            node.flags.insert(NodeFlags::IN_SLEEPING_ISLAND);

            if (pass == UpdatePass::Second || !was_sleeping)
                && let Some(body) = self.island_body(node_id)
            {
                self.output.bodies_to_sleep.push(body);
            }
        }
    }

    #[inline]
    fn is_solver_dynamic(&self, node_id: Option<NodeId>) -> bool {
        node_id.is_some_and(|node| !self.nodes[node.0].is_kinematic())
    }

    /// Returns the solver endpoint of an edge end, registering kinematic bodies as they are first used.
    fn solver_endpoint(&mut self, node_id: Option<NodeId>) -> SolverEndpoint {
        let Some(node_id) = node_id else {
            return SolverEndpoint::World;
        };

        let node = &self.nodes[node_id.0];

        if node.is_kinematic() {
            let source = if node.is_kinematic_proxy() {
                self.buffers.proxy_source[node_id.index()]
            } else {
                node_id
            };

            let index = &mut self.buffers.solver_body_map[source.index()];
            if *index == u32::MAX {
                *index = self.output.kinematics.len() as u32;
                self.output.kinematics.push(self.nodes[source.0].body);
            }
            return SolverEndpoint::Kinematic(*index);
        }

        if node.is_articulation_link() {
            return SolverEndpoint::Articulation(node.body);
        }

        SolverEndpoint::Body(self.buffers.solver_body_map[node_id.index()])
    }

    fn write_awake_island(&mut self, island_id: IslandId, pass: UpdatePass) {
        let Some(island) = self.islands.get(island_id) else {
            return;
        };

        let mut start = self.output.next_indices(island_id);
        let node_head = island.nodes.head;
        let edge_head = island.edges.head;

        // Nodes
        let mut has_dynamic = false;
        let mut cursor = node_head;

        while let Some(node_id) = cursor {
            let node = &mut self.nodes[node_id.0];
            cursor = node.island.next;

            if node.is_in_sleeping_island() {
                node.flags.remove(NodeFlags::IN_SLEEPING_ISLAND);
                if let Some(body) = self.island_body(node_id) {
                    self.output.bodies_to_wake.push(body);
                }
            }

            let node = &self.nodes[node_id.0];

            if node.is_kinematic() {
                continue;
            }

            has_dynamic = true;

            if node.is_articulation_link() {
                if let Some(root) = node.articulation_root {
                    let root = &self.articulation_roots[root.0 as usize];
                    self.output.articulations.push(root.link);
                    self.output.articulation_owners.push(root.articulation);
                }
                continue;
            }

            self.buffers.solver_body_map[node_id.index()] = self.output.bodies.len() as u32;
            self.output.bodies.push(node.body);
        }

        // Edges
        let mut needs_second_pass = false;
        let mut cursor = edge_head;

        while let Some(edge_id) = cursor {
            let edge = &self.edges[edge_id.0];
            cursor = edge.island.next;

            // Articulations solve their own joints.
            if edge.kind == EdgeKind::ArticulationJoint {
                continue;
            }

            let (node1, node2) = (edge.node1, edge.node2);
            let (kind, payload_cm, payload_constraint) =
                (edge.kind, edge.contact_manager(), edge.constraint());

            if !self.is_solver_dynamic(node1) && !self.is_solver_dynamic(node2) {
                continue;
            }

            let endpoint1 = self.solver_endpoint(node1);
            let endpoint2 = self.solver_endpoint(node2);

            let handle = self.edge_handle(edge_id);

            match kind {
                EdgeKind::ContactManager => {
                    if node1.is_none() || node2.is_none() {
                        start.has_static_contact = true;
                    }

                    if let Some(contact_manager) = payload_cm {
                        self.output.contact_managers.push(IndexedContactManager {
                            contact_manager,
                            edge: handle,
                            endpoint1,
                            endpoint2,
                        });
                    } else if pass == UpdatePass::First {
                        // The pair was asleep, so the narrow phase has not produced a contact manager yet.
                        self.output.narrow_phase_edges.push(handle);
                        needs_second_pass = true;
                    }
                }
                EdgeKind::Constraint => {
                    if let Some(constraint) = payload_constraint {
                        self.output.constraints.push(IndexedConstraint {
                            constraint,
                            edge: handle,
                            endpoint1,
                            endpoint2,
                        });
                    }
                }
                EdgeKind::ArticulationJoint => {}
            }
        }

        if needs_second_pass {
            self.output.truncate_to(&start);
            self.output.second_pass_islands.push(island_id);
            return;
        }

        if !has_dynamic {
            // Kinematic bodies on their own are not solver work.
            self.output.truncate_to(&start);
            return;
        }

        self.output.island_indices.push(start);
    }
}
