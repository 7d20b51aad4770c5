use bevy::{log::warn, prelude::*};
use slab::Slab;

use crate::{
    config::IslandManagerConfig,
    data_structures::{
        bit_vec::BitVec,
        slot_pool::{SlotPool, round_up_to_granularity},
    },
    error::IslandError,
};

use super::{
    ArticulationRoot, ArticulationRootId, BodyKind, ContactManagerId, Edge, EdgeFlags, EdgeHandle,
    EdgeKind, EdgePayload, Island, IslandId, IslandPool, Node, NodeFlags, NodeHandle, NodeId,
    change_events::ChangeEvents,
    output::IslandOutput,
    work_buffers::{BufferPolicy, WorkBuffers},
};

/// The number of nodes and edges of each kind currently in the graph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Reflect)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct IslandCounts {
    /// The number of dynamic rigid body nodes.
    pub rigid_bodies: u32,
    /// The number of kinematic rigid body nodes.
    pub kinematics: u32,
    /// The number of articulation link nodes.
    pub articulation_links: u32,
    /// The number of contact manager edges.
    pub contact_manager_edges: u32,
    /// The number of constraint edges.
    pub constraint_edges: u32,
    /// The number of articulation joint edges.
    pub articulation_joint_edges: u32,
    /// The number of kinematic proxies created by the last update.
    pub kinematic_proxies: u32,
}

/// A resource that keeps track of simulation islands.
///
/// The manager owns a graph of [nodes](Node) (rigid bodies and articulation links)
/// and [edges](Edge) (contacts, constraints and articulation joints), and partitions
/// it into [islands](Island) that can be solved and put to sleep independently.
///
/// # Entry points
///
/// The physics world describes changes to the graph with opaque [`NodeHandle`]s and [`EdgeHandle`]s.
/// The entry points only record the changes. Islands are not updated until the next update.
///
/// A handle becomes invalid as soon as its node or edge is removed, and any later use of it
/// returns [`IslandError::InvalidNode`] or [`IslandError::InvalidEdge`].
///
/// # Update lifecycle
///
/// 1. [`update_islands`](Self::update_islands) applies the recorded changes, merges and splits islands,
///    and writes the awake islands to the [`IslandOutput`].
/// 2. Islands that are waking up may contain contact pairs without contact managers.
///    These are listed in [`IslandOutput::narrow_phase_edges`], and the narrow phase
///    can attach contact managers or disconnect the edges.
/// 3. [`update_islands_second_pass`](Self::update_islands_second_pass) resolves those islands.
/// 4. [`free_buffers`](Self::free_buffers) ends the update.
///
/// Nodes and edges cannot be added or removed between steps 1 and 4.
/// [`update_inline`](Self::update_inline) runs steps 1 and 3 back to back.
#[derive(Resource, Debug, Default)]
pub struct IslandManager {
    pub(crate) nodes: SlotPool<Node>,
    pub(crate) edges: SlotPool<Edge>,
    pub(crate) islands: IslandPool,
    pub(crate) articulation_roots: Slab<ArticulationRoot>,
    /// Kinematic nodes, indexed by node slot.
    pub(crate) kinematic_nodes: BitVec,
    pub(crate) events: ChangeEvents,
    pub(crate) buffers: WorkBuffers,
    pub(crate) output: IslandOutput,
    pub(crate) config: IslandManagerConfig,
    pub(crate) counts: IslandCounts,
    /// Set between the first pass and `free_buffers`.
    pub(crate) in_update: bool,
    /// Set if the current or last update did not short-circuit.
    pub(crate) update_performed: bool,
    pub(crate) second_pass_done: bool,
    pub(crate) has_anything_changed: bool,
    pub(crate) everything_asleep: bool,
}

impl IslandManager {
    /// Creates a new [`IslandManager`] with the given configuration.
    pub fn new(config: IslandManagerConfig) -> Self {
        let mut manager = Self::default();
        if let Err(error) = manager.pre_allocate(config.initial_body_capacity) {
            warn!(
                "Failed to reserve island capacity for {} bodies: {error}",
                config.initial_body_capacity
            );
        }
        manager.config = config;
        manager
    }

    /// Creates a new [`IslandManager`] with room for the given number of bodies.
    pub fn with_capacity(bodies: usize) -> Self {
        Self::new(IslandManagerConfig {
            initial_body_capacity: bodies,
            ..default()
        })
    }

    /// Reserves room for at least `bodies` nodes, and twice as many edges.
    ///
    /// The node capacity is rounded up to a multiple of 32.
    pub fn pre_allocate(&mut self, bodies: usize) -> Result<(), IslandError> {
        let node_capacity = round_up_to_granularity(bodies);
        self.nodes.try_grow(node_capacity)?;
        self.edges.try_grow(node_capacity * 2)?;
        self.islands.reserve(node_capacity);
        Ok(())
    }

    /// Returns the configuration of the manager.
    #[inline]
    pub fn config(&self) -> &IslandManagerConfig {
        &self.config
    }

    /// Replaces the configuration of the manager. Takes effect on the next update.
    #[inline]
    pub fn set_config(&mut self, config: IslandManagerConfig) {
        self.config = config;
    }

    #[inline]
    pub(crate) fn buffer_policy(&self) -> BufferPolicy {
        BufferPolicy::from(&self.config)
    }

    /// Returns the node with the given handle.
    #[inline]
    pub fn node(&self, handle: NodeHandle) -> Result<&Node, IslandError> {
        self.nodes
            .get_checked(handle.index, handle.generation)
            .ok_or(IslandError::InvalidNode(handle))
    }

    #[inline]
    fn node_mut(&mut self, handle: NodeHandle) -> Result<&mut Node, IslandError> {
        self.nodes
            .get_checked_mut(handle.index, handle.generation)
            .ok_or(IslandError::InvalidNode(handle))
    }

    /// Returns the edge with the given handle.
    #[inline]
    pub fn edge(&self, handle: EdgeHandle) -> Result<&Edge, IslandError> {
        self.edges
            .get_checked(handle.index, handle.generation)
            .ok_or(IslandError::InvalidEdge(handle))
    }

    #[inline]
    fn edge_mut(&mut self, handle: EdgeHandle) -> Result<&mut Edge, IslandError> {
        self.edges
            .get_checked_mut(handle.index, handle.generation)
            .ok_or(IslandError::InvalidEdge(handle))
    }

    #[inline]
    fn ensure_not_updating(&self) -> Result<(), IslandError> {
        if self.in_update {
            Err(IslandError::UpdateInProgress)
        } else {
            Ok(())
        }
    }

    /// Adds a rigid body node and returns its handle.
    pub fn add_node(
        &mut self,
        body: Entity,
        kind: BodyKind,
        ready_for_sleeping: bool,
    ) -> Result<NodeHandle, IslandError> {
        self.ensure_not_updating()?;

        let mut flags = NodeFlags::NEW;
        flags.set(NodeFlags::KINEMATIC, kind == BodyKind::Kinematic);
        flags.set(NodeFlags::READY_FOR_SLEEPING, ready_for_sleeping);

        let (index, generation) = self.nodes.insert(Node::new(body, flags))?;

        match kind {
            BodyKind::Dynamic => self.counts.rigid_bodies += 1,
            BodyKind::Kinematic => {
                self.counts.kinematics += 1;
                self.kinematic_nodes.set_and_grow(index as usize);
            }
        }

        self.events.record_node_created(NodeId(index));
        self.has_anything_changed = true;

        Ok(NodeHandle { index, generation })
    }

    /// Adds an articulation link node and returns its handle.
    pub fn add_articulation_link(
        &mut self,
        link: Entity,
        ready_for_sleeping: bool,
    ) -> Result<NodeHandle, IslandError> {
        self.ensure_not_updating()?;

        let mut flags = NodeFlags::NEW | NodeFlags::ARTICULATION_LINK;
        flags.set(NodeFlags::READY_FOR_SLEEPING, ready_for_sleeping);

        let (index, generation) = self.nodes.insert(Node::new(link, flags))?;
        self.counts.articulation_links += 1;

        self.events.record_node_created(NodeId(index));
        self.has_anything_changed = true;

        Ok(NodeHandle { index, generation })
    }

    /// Makes an articulation link node the root of the given articulation.
    ///
    /// Awake islands list their articulations by root link.
    pub fn set_articulation_root(
        &mut self,
        handle: NodeHandle,
        articulation: Entity,
    ) -> Result<(), IslandError> {
        let node = self
            .nodes
            .get_checked_mut(handle.index, handle.generation)
            .ok_or(IslandError::InvalidNode(handle))?;

        if !node.is_articulation_link() {
            return Err(IslandError::NotArticulationLink(handle));
        }

        let root = ArticulationRoot {
            link: node.body,
            articulation,
        };

        match node.articulation_root {
            Some(id) => self.articulation_roots[id.0 as usize] = root,
            None => {
                let id = self.articulation_roots.insert(root);
                node.articulation_root = Some(ArticulationRootId(id as u32));
            }
        }

        self.has_anything_changed = true;

        Ok(())
    }

    /// Replaces the link entity of an articulation link node.
    pub fn set_articulation_link(
        &mut self,
        handle: NodeHandle,
        link: Entity,
    ) -> Result<(), IslandError> {
        let node = self
            .nodes
            .get_checked_mut(handle.index, handle.generation)
            .ok_or(IslandError::InvalidNode(handle))?;

        if !node.is_articulation_link() {
            return Err(IslandError::NotArticulationLink(handle));
        }

        node.body = link;

        if let Some(id) = node.articulation_root {
            self.articulation_roots[id.0 as usize].link = link;
        }

        self.has_anything_changed = true;

        Ok(())
    }

    /// Removes a node. The handle is invalid afterwards.
    ///
    /// The edges of the node must be removed too, before the next update.
    pub fn remove_node(&mut self, handle: NodeHandle) -> Result<(), IslandError> {
        self.ensure_not_updating()?;

        let node = self
            .nodes
            .retire(handle.index, handle.generation)
            .ok_or(IslandError::InvalidNode(handle))?;

        debug_assert!(!node.is_deleted());
        node.flags.insert(NodeFlags::DELETED);

        if node.is_kinematic() {
            self.counts.kinematics -= 1;
            self.kinematic_nodes.unset(handle.index as usize);
        } else if node.is_articulation_link() {
            self.counts.articulation_links -= 1;
        } else {
            self.counts.rigid_bodies -= 1;
        }

        self.events.record_node_deleted(handle.id());
        self.has_anything_changed = true;

        Ok(())
    }

    /// Switches a rigid body node between dynamic and kinematic.
    ///
    /// Articulation links cannot be kinematic.
    pub fn set_kinematic(&mut self, handle: NodeHandle, kinematic: bool) -> Result<(), IslandError> {
        self.ensure_not_updating()?;

        let node = self.node_mut(handle)?;

        if node.is_articulation_link() {
            return Err(IslandError::ArticulatedKinematic(handle));
        }

        if node.is_kinematic() == kinematic {
            return Ok(());
        }

        node.flags.set(NodeFlags::KINEMATIC, kinematic);

        if kinematic {
            self.counts.rigid_bodies -= 1;
            self.counts.kinematics += 1;
            self.kinematic_nodes.set_and_grow(handle.index as usize);
        } else {
            self.counts.kinematics -= 1;
            self.counts.rigid_bodies += 1;
            self.kinematic_nodes.unset(handle.index as usize);
        }

        self.has_anything_changed = true;

        Ok(())
    }

    /// Sets whether the body of a node is below its sleep threshold.
    ///
    /// An island is put to sleep once every node in it is ready for sleeping.
    pub fn set_ready_for_sleeping(
        &mut self,
        handle: NodeHandle,
        ready: bool,
    ) -> Result<(), IslandError> {
        let node = self.node_mut(handle)?;

        if node.is_ready_for_sleeping() != ready {
            node.flags.set(NodeFlags::READY_FOR_SLEEPING, ready);
            self.has_anything_changed = true;
        }

        Ok(())
    }

    /// Adds an edge between two nodes and returns its handle. A missing node stands for the static world.
    ///
    /// The edge does not connect its nodes until [`set_edge_connected`](Self::set_edge_connected) is called.
    pub fn add_edge(
        &mut self,
        kind: EdgeKind,
        node1: Option<NodeHandle>,
        node2: Option<NodeHandle>,
    ) -> Result<EdgeHandle, IslandError> {
        self.ensure_not_updating()?;

        match (node1, node2) {
            (None, None) => return Err(IslandError::StaticEdge),
            (Some(a), Some(b)) if a == b => return Err(IslandError::SelfEdge(a)),
            _ => {}
        }

        for handle in node1.into_iter().chain(node2) {
            self.node(handle)?;
        }

        let edge = Edge::new(
            kind,
            node1.map(|handle| handle.id()),
            node2.map(|handle| handle.id()),
        );
        let (index, generation) = self.edges.insert(edge)?;

        match kind {
            EdgeKind::ContactManager => self.counts.contact_manager_edges += 1,
            EdgeKind::Constraint => self.counts.constraint_edges += 1,
            EdgeKind::ArticulationJoint => self.counts.articulation_joint_edges += 1,
        }

        self.events.record_edge_created(super::EdgeId(index));
        self.has_anything_changed = true;

        Ok(EdgeHandle { index, generation })
    }

    /// Attaches a narrow phase contact manager to a contact edge, or clears it with `None`.
    pub fn set_edge_contact_manager(
        &mut self,
        handle: EdgeHandle,
        contact_manager: Option<ContactManagerId>,
    ) -> Result<(), IslandError> {
        let edge = self.edge_mut(handle)?;

        if edge.kind != EdgeKind::ContactManager {
            return Err(IslandError::EdgeKindMismatch(handle));
        }

        edge.payload = contact_manager.map(EdgePayload::from);
        self.has_anything_changed = true;

        Ok(())
    }

    /// Attaches a constraint to a constraint edge.
    pub fn set_edge_constraint(
        &mut self,
        handle: EdgeHandle,
        constraint: Entity,
    ) -> Result<(), IslandError> {
        let edge = self.edge_mut(handle)?;

        if edge.kind != EdgeKind::Constraint {
            return Err(IslandError::EdgeKindMismatch(handle));
        }

        edge.payload = Some(EdgePayload::from(constraint));
        self.has_anything_changed = true;

        Ok(())
    }

    /// Attaches an articulation joint to an articulation joint edge.
    pub fn set_edge_articulation_joint(
        &mut self,
        handle: EdgeHandle,
        joint: Entity,
    ) -> Result<(), IslandError> {
        let edge = self.edge_mut(handle)?;

        if edge.kind != EdgeKind::ArticulationJoint {
            return Err(IslandError::EdgeKindMismatch(handle));
        }

        edge.articulation_joint = Some(joint);
        self.has_anything_changed = true;

        Ok(())
    }

    /// Makes an edge connect its nodes.
    ///
    /// Connecting an edge that is already connected does nothing.
    pub fn set_edge_connected(&mut self, handle: EdgeHandle) -> Result<(), IslandError> {
        let edge = self.edge_mut(handle)?;

        if !edge.is_connected() {
            edge.flags.insert(EdgeFlags::CONNECTED);
            self.events.record_edge_connected(handle.id());
        }

        self.has_anything_changed = true;

        Ok(())
    }

    /// Makes an edge stop connecting its nodes.
    ///
    /// Disconnecting an edge that is not connected does nothing.
    pub fn set_edge_unconnected(&mut self, handle: EdgeHandle) -> Result<(), IslandError> {
        let edge = self.edge_mut(handle)?;

        if edge.is_connected() {
            edge.flags.remove(EdgeFlags::CONNECTED);
            self.events.record_edge_disconnected(handle.id());
        }

        self.has_anything_changed = true;

        Ok(())
    }

    /// Removes an edge. The handle is invalid afterwards.
    pub fn remove_edge(&mut self, handle: EdgeHandle) -> Result<(), IslandError> {
        self.ensure_not_updating()?;

        let edge = self
            .edges
            .retire(handle.index, handle.generation)
            .ok_or(IslandError::InvalidEdge(handle))?;

        debug_assert!(!edge.is_removed());
        edge.flags.insert(EdgeFlags::REMOVED);

        match edge.kind {
            EdgeKind::ContactManager => self.counts.contact_manager_edges -= 1,
            EdgeKind::Constraint => self.counts.constraint_edges -= 1,
            EdgeKind::ArticulationJoint => self.counts.articulation_joint_edges -= 1,
        }

        self.events.record_edge_deleted(handle.id());
        self.has_anything_changed = true;

        Ok(())
    }

    /// Returns the island of a node, if it is in one.
    ///
    /// Nodes are assigned to islands by the next update after they are added.
    /// During an update, a kinematic node that touches other bodies is represented
    /// by its proxies, and has no island of its own.
    pub fn node_island(&self, handle: NodeHandle) -> Result<Option<IslandId>, IslandError> {
        self.node(handle).map(Node::island_id)
    }

    /// Returns the island of an edge, if it is in one.
    pub fn edge_island(&self, handle: EdgeHandle) -> Result<Option<IslandId>, IslandError> {
        self.edge(handle).map(Edge::island_id)
    }

    /// Returns the island with the given ID.
    #[inline]
    pub fn island(&self, id: IslandId) -> Option<&Island> {
        self.islands.get(id)
    }

    /// Returns the island pool.
    #[inline]
    pub fn islands(&self) -> &IslandPool {
        &self.islands
    }

    /// Returns the number of islands.
    #[inline]
    pub fn island_count(&self) -> usize {
        self.islands.len()
    }

    /// Returns the bodies of the nodes in an island, in list order.
    ///
    /// During an update, kinematic proxies report the body of their source.
    pub fn island_bodies(&self, id: IslandId) -> impl Iterator<Item = Entity> + '_ {
        self.islands
            .get(id)
            .into_iter()
            .flat_map(|island| island.nodes.iter(&self.nodes))
            .map(|node| self.nodes[node.0].body)
    }

    /// Returns the number of live nodes, not counting kinematic proxies.
    #[inline]
    pub fn node_count(&self) -> usize {
        let counts = &self.counts;
        (counts.rigid_bodies + counts.kinematics + counts.articulation_links) as usize
    }

    /// Returns the number of live edges.
    #[inline]
    pub fn edge_count(&self) -> usize {
        let counts = &self.counts;
        (counts.contact_manager_edges + counts.constraint_edges + counts.articulation_joint_edges)
            as usize
    }

    /// Returns the node and edge counts.
    #[inline]
    pub fn counts(&self) -> &IslandCounts {
        &self.counts
    }

    /// Returns `true` if every island was asleep after the last update.
    ///
    /// The next update is skipped entirely if nothing has changed since.
    #[inline]
    pub fn is_everything_asleep(&self) -> bool {
        self.everything_asleep
    }

    /// Returns `true` if the node is in an island that is sleeping.
    pub fn is_in_sleeping_island(&self, handle: NodeHandle) -> Result<bool, IslandError> {
        self.node(handle).map(Node::is_in_sleeping_island)
    }

    /// Returns the output of the last update.
    #[inline]
    pub fn output(&self) -> &IslandOutput {
        &self.output
    }

    /// Returns the changes recorded since the last update.
    #[inline]
    pub fn events(&self) -> &ChangeEvents {
        &self.events
    }

    /// Returns `true` between the first pass and [`free_buffers`](Self::free_buffers).
    #[inline]
    pub fn is_update_in_progress(&self) -> bool {
        self.in_update
    }

    /// Returns `true` if the current or last update processed the islands,
    /// and `false` if it was skipped because everything was asleep and nothing changed.
    #[inline]
    pub fn update_performed(&self) -> bool {
        self.update_performed
    }

    /// Returns the work buffers.
    #[inline]
    pub fn work_buffers(&self) -> &WorkBuffers {
        &self.buffers
    }

    /// Returns the contact managers that the narrow phase attached to the edges
    /// listed in [`IslandOutput::narrow_phase_edges`].
    pub fn woken_pair_contact_managers(
        &self,
    ) -> impl Iterator<Item = (EdgeHandle, ContactManagerId)> + '_ {
        self.output.narrow_phase_edges.iter().filter_map(|&handle| {
            let edge = self.edge(handle).ok()?;
            edge.contact_manager().map(|cm| (handle, cm))
        })
    }

    /// Removes the edges without a contact manager from [`IslandOutput::narrow_phase_edges`].
    ///
    /// Use this after the narrow phase, once pairs that turned out not to touch
    /// have had their contact managers cleared.
    pub fn remove_sleeping_pair_contact_managers(&mut self) {
        let edges = &self.edges;
        self.output.narrow_phase_edges.retain(|handle| {
            edges
                .get_checked(handle.index, handle.generation)
                .is_some_and(|edge| edge.contact_manager().is_some())
        });
    }

    /// Returns a handle for the edge in the given slot.
    #[inline]
    pub(crate) fn edge_handle(&self, id: super::EdgeId) -> EdgeHandle {
        EdgeHandle {
            index: id.0,
            generation: self.edges.generation(id.0).unwrap_or_default(),
        }
    }

    /// Checks the consistency of the islands, nodes and edges.
    ///
    /// # Panics
    ///
    /// Panics if an invariant is broken.
    pub fn validate(&self) {
        for island in self.islands.iter() {
            island.validate(&self.nodes, &self.edges);
            assert!(self.islands.live().get(island.id.index()));
        }

        assert_eq!(self.islands.live().count_ones(), self.islands.len());

        for (index, node) in self.nodes.iter() {
            if node.is_new() || node.is_deleted() {
                continue;
            }

            if self.in_update && !self.buffers.first_proxy.is_empty() {
                let has_proxies = !self.buffers.first_proxy[index as usize].is_placeholder();
                let detached_proxy = node.is_kinematic_proxy()
                    && self.buffers.proxy_edge[index as usize].is_placeholder();
                if has_proxies || detached_proxy {
                    continue;
                }
            }

            let island = node
                .island_id()
                .unwrap_or_else(|| panic!("Node {index} is not in an island"));
            assert!(
                self.islands.contains(island),
                "Node {index} is in island {island:?}, which does not exist"
            );
        }

        for (index, edge) in self.edges.iter() {
            if edge.is_removed() {
                continue;
            }

            assert!(
                edge.node1.is_some() || edge.node2.is_some(),
                "Edge {index} connects the static world to itself"
            );
        }
    }
}
