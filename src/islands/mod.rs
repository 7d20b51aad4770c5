//! Persistent simulation islands.
//!
//! An island is a maximal set of nodes (rigid bodies and articulation links) connected by
//! connected edges (contacts, constraints and articulation joints). Islands are the unit of
//! independent solver work, and the unit of sleeping: an island sleeps only if every body in it
//! is ready to sleep.
//!
//! Islands are retained across updates. Each node starts in its own island. When an edge is
//! connected between two islands, the smaller island is folded into the larger one.
//! When an edge is broken, its island is marked, and split using union-find over the remaining
//! connected edges during the next update.
//!
//! Kinematic bodies can touch many unrelated dynamic bodies. To keep them from joining those bodies
//! into one island, each kinematic node is replaced by a transient *proxy* per edge during an update,
//! and merged back into its source once the update is finished. See [`kinematics`].
//!
//! Nodes and edges are linked to their island using intrusive doubly linked lists, so that adding,
//! removing and merging are cheap. Each [`Island`] stores the head, tail and length of each list,
//! while each [`Node`] and [`Edge`] stores an [`IslandNode`] linking it to its neighbors.
//!
//! See [`IslandManager`] for the entry points and the update lifecycle.

pub mod change_events;
mod diagnostics;
mod edge;
pub mod kinematics;
mod manager;
mod node;
pub mod output;
mod plugin;
pub mod second_pass;
mod sleeping;
pub mod update;
pub mod work_buffers;

pub use edge::{
    ContactManagerId, Edge, EdgeFlags, EdgeHandle, EdgeId, EdgeKind, EdgePayload,
};
pub use diagnostics::IslandDiagnostics;
pub use manager::{IslandCounts, IslandManager};
pub use node::{
    ArticulationRoot, ArticulationRootId, BodyKind, Node, NodeFlags, NodeHandle, NodeId,
};
pub use plugin::{IslandPlugin, IslandSystems};

use core::fmt::Debug;

use bevy::log::trace;
use slab::Slab;

use crate::data_structures::{bit_vec::BitVec, slot_pool::SlotPool};

/// The index of an [`Island`] in the [`IslandPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct IslandId(pub u32);

impl IslandId {
    // 4_294_967_295 islands is probably enough :)
    /// A placeholder ID that does not refer to any island.
    pub const PLACEHOLDER: Self = Self(u32::MAX);

    /// Returns the ID as a `usize` for indexing.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A node in a linked list in an [`Island`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct IslandNode<Id> {
    /// The ID of the island that the item belongs to.
    pub(crate) island_id: IslandId,
    /// The ID of the previous item in the linked list.
    pub(crate) prev: Option<Id>,
    /// The ID of the next item in the linked list.
    pub(crate) next: Option<Id>,
}

impl<Id> IslandNode<Id> {
    /// A placeholder [`IslandNode`] that is not linked to any island.
    pub const PLACEHOLDER: Self = Self {
        island_id: IslandId::PLACEHOLDER,
        prev: None,
        next: None,
    };

    /// Returns the island the item belongs to, if any.
    #[inline]
    pub fn island_id(&self) -> Option<IslandId> {
        (self.island_id != IslandId::PLACEHOLDER).then_some(self.island_id)
    }
}

impl<Id> Default for IslandNode<Id> {
    fn default() -> Self {
        Self::PLACEHOLDER
    }
}

/// An item that can be linked into an [`IslandList`].
pub(crate) trait IslandMember {
    type Id: Copy + Eq + Debug;

    /// Returns the pool slot of the item with the given ID.
    fn slot(id: Self::Id) -> u32;

    fn links(&self) -> &IslandNode<Self::Id>;

    fn links_mut(&mut self) -> &mut IslandNode<Self::Id>;
}

/// The head, tail and length of an intrusive linked list of island members.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct IslandList<Id> {
    pub(crate) head: Option<Id>,
    pub(crate) tail: Option<Id>,
    pub(crate) count: u32,
}

impl<Id> Default for IslandList<Id> {
    fn default() -> Self {
        Self {
            head: None,
            tail: None,
            count: 0,
        }
    }
}

impl<Id: Copy + Eq + Debug> IslandList<Id> {
    /// Returns the number of items in the list.
    #[inline]
    pub const fn len(&self) -> u32 {
        self.count
    }

    /// Returns `true` if the list is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Links `id` to the back of the list, overwriting its previous links.
    pub(crate) fn push_back<T>(&mut self, island_id: IslandId, id: Id, pool: &mut SlotPool<T>)
    where
        T: IslandMember<Id = Id>,
    {
        if let Some(tail) = self.tail {
            let tail_links = pool[T::slot(tail)].links_mut();
            debug_assert!(tail_links.next.is_none());
            tail_links.next = Some(id);
        }

        *pool[T::slot(id)].links_mut() = IslandNode {
            island_id,
            prev: self.tail,
            next: None,
        };

        self.tail = Some(id);

        if self.head.is_none() {
            self.head = Some(id);
        }

        self.count += 1;
    }

    /// Unlinks `id` from the list and resets its links.
    pub(crate) fn remove<T>(&mut self, id: Id, pool: &mut SlotPool<T>)
    where
        T: IslandMember<Id = Id>,
    {
        let links = *pool[T::slot(id)].links();

        if let Some(prev) = links.prev {
            let prev_links = pool[T::slot(prev)].links_mut();
            debug_assert!(prev_links.next == Some(id));
            prev_links.next = links.next;
        } else {
            debug_assert!(self.head == Some(id));
            self.head = links.next;
        }

        if let Some(next) = links.next {
            let next_links = pool[T::slot(next)].links_mut();
            debug_assert!(next_links.prev == Some(id));
            next_links.prev = links.prev;
        } else {
            debug_assert!(self.tail == Some(id));
            self.tail = links.prev;
        }

        debug_assert!(self.count > 0);
        self.count -= 1;

        *pool[T::slot(id)].links_mut() = IslandNode::PLACEHOLDER;
    }

    /// Moves every item of `other` to the back of this list and assigns them to `island_id`.
    pub(crate) fn append<T>(&mut self, other: Self, island_id: IslandId, pool: &mut SlotPool<T>)
    where
        T: IslandMember<Id = Id>,
    {
        // 1. Remap the island IDs of the appended items.
        let mut cursor = other.head;
        while let Some(id) = cursor {
            let links = pool[T::slot(id)].links_mut();
            links.island_id = island_id;
            cursor = links.next;
        }

        // 2. Connect the lists.
        let (Some(tail), Some(head)) = (self.tail, other.head) else {
            if self.head.is_none() {
                *self = other;
            }
            return;
        };

        pool[T::slot(tail)].links_mut().next = Some(head);
        pool[T::slot(head)].links_mut().prev = Some(tail);

        self.tail = other.tail;
        self.count += other.count;
    }

    /// Returns an iterator over the IDs in the list.
    #[inline]
    pub(crate) fn iter<'a, T>(&self, pool: &'a SlotPool<T>) -> IslandListIter<'a, T>
    where
        T: IslandMember<Id = Id>,
    {
        IslandListIter {
            pool,
            cursor: self.head,
        }
    }

    /// Validates the structure of the list and the island IDs of its items.
    pub(crate) fn validate<T>(&self, island_id: IslandId, pool: &SlotPool<T>)
    where
        T: IslandMember<Id = Id>,
    {
        if self.head.is_none() {
            assert!(self.tail.is_none());
            assert_eq!(self.count, 0);
            return;
        }

        assert!(self.tail.is_some());
        assert!(self.count > 0);

        if self.count > 1 {
            assert_ne!(self.head, self.tail);
        }

        let mut count = 0;
        let mut prev = None;
        let mut cursor = self.head;

        while let Some(id) = cursor {
            let links = pool
                .get(T::slot(id))
                .unwrap_or_else(|| panic!("Island {island_id:?} links to a vacant slot {id:?}"))
                .links();
            assert_eq!(links.island_id, island_id);
            assert_eq!(links.prev, prev);

            count += 1;

            if count == self.count {
                assert_eq!(cursor, self.tail);
            }

            prev = cursor;
            cursor = links.next;
        }

        assert_eq!(count, self.count);
    }
}

/// An iterator over the IDs in an [`IslandList`].
pub(crate) struct IslandListIter<'a, T: IslandMember> {
    pool: &'a SlotPool<T>,
    cursor: Option<T::Id>,
}

impl<T: IslandMember> Iterator for IslandListIter<'_, T> {
    type Item = T::Id;

    #[inline]
    fn next(&mut self) -> Option<T::Id> {
        let id = self.cursor?;
        self.cursor = self.pool[T::slot(id)].links().next;
        Some(id)
    }
}

/// A simulation island: a connected component of nodes and the edges connecting them.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Island {
    pub(crate) id: IslandId,
    pub(crate) nodes: IslandList<NodeId>,
    pub(crate) edges: IslandList<EdgeId>,
}

impl Island {
    /// Creates a new empty [`Island`] with the given ID.
    #[inline]
    pub const fn new(id: IslandId) -> Self {
        Self {
            id,
            nodes: IslandList {
                head: None,
                tail: None,
                count: 0,
            },
            edges: IslandList {
                head: None,
                tail: None,
                count: 0,
            },
        }
    }

    /// Returns the island ID.
    #[inline]
    pub const fn id(&self) -> IslandId {
        self.id
    }

    /// Returns the number of nodes in the island.
    #[inline]
    pub const fn node_count(&self) -> u32 {
        self.nodes.count
    }

    /// Returns the number of edges in the island.
    #[inline]
    pub const fn edge_count(&self) -> u32 {
        self.edges.count
    }

    // TODO: Use errors rather than panics.
    /// Validates the node and edge lists of the island.
    pub fn validate(&self, nodes: &SlotPool<Node>, edges: &SlotPool<Edge>) {
        self.nodes.validate(self.id, nodes);
        self.edges.validate(self.id, edges);

        for node_id in self.nodes.iter(nodes) {
            assert!(
                !nodes[node_id.0].is_deleted(),
                "Island {:?} contains deleted node {node_id:?}",
                self.id
            );
        }

        for edge_id in self.edges.iter(edges) {
            let edge = &edges[edge_id.0];
            assert!(!edge.is_removed());
            assert!(
                edge.node1.is_some() || edge.node2.is_some(),
                "Edge {edge_id:?} connects the static world to itself"
            );
            for node_id in edge.nodes() {
                assert_eq!(
                    nodes[node_id.0].island.island_id, self.id,
                    "Edge {edge_id:?} in island {:?} has endpoint {node_id:?} in another island",
                    self.id
                );
            }
        }
    }
}

/// The pool of live [`Island`]s.
///
/// Islands are stored in a [`Slab`], and a bitmap mirrors which island slots are live.
#[derive(Clone, Debug, Default)]
pub struct IslandPool {
    islands: Slab<Island>,
    live: BitVec,
}

impl IslandPool {
    /// Reserves room for at least `capacity` islands in total.
    pub fn reserve(&mut self, capacity: usize) {
        self.islands
            .reserve(capacity.saturating_sub(self.islands.len()));
    }

    /// Returns the number of islands that can be stored without reallocating.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.islands.capacity()
    }

    /// Creates a new empty island and returns its ID.
    #[inline]
    pub fn create_island(&mut self) -> IslandId {
        let id = IslandId(self.islands.vacant_key() as u32);
        let key = self.islands.insert(Island::new(id));
        debug_assert_eq!(key, id.index());
        self.live.set_and_grow(id.index());
        id
    }

    /// Removes the island with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if the island does not exist.
    #[inline]
    pub fn remove_island(&mut self, id: IslandId) -> Island {
        self.live.unset(id.index());
        self.islands.remove(id.index())
    }

    /// Returns a reference to the island with the given ID.
    #[inline]
    pub fn get(&self, id: IslandId) -> Option<&Island> {
        self.islands.get(id.index())
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: IslandId) -> Option<&mut Island> {
        self.islands.get_mut(id.index())
    }

    #[inline]
    fn island_mut(&mut self, id: IslandId) -> &mut Island {
        self.islands
            .get_mut(id.index())
            .unwrap_or_else(|| panic!("Island {id:?} does not exist"))
    }

    /// Returns `true` if the island with the given ID exists.
    #[inline]
    pub fn contains(&self, id: IslandId) -> bool {
        self.islands.contains(id.index())
    }

    /// Returns an iterator over all islands.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Island> {
        self.islands.iter().map(|(_, island)| island)
    }

    /// Returns the bitmap of live island slots.
    #[inline]
    pub fn live(&self) -> &BitVec {
        &self.live
    }

    /// Returns the number of islands.
    #[inline]
    pub fn len(&self) -> usize {
        self.islands.len()
    }

    /// Returns `true` if there are no islands.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.islands.is_empty()
    }

    /// Links a node to the given island.
    pub(crate) fn link_node(&mut self, id: IslandId, node: NodeId, nodes: &mut SlotPool<Node>) {
        self.island_mut(id).nodes.push_back(id, node, nodes);
    }

    /// Unlinks a node from its island. Returns the island it was removed from.
    pub(crate) fn unlink_node(
        &mut self,
        node: NodeId,
        nodes: &mut SlotPool<Node>,
    ) -> Option<IslandId> {
        let id = nodes[node.0].island_id()?;
        self.island_mut(id).nodes.remove(node, nodes);
        Some(id)
    }

    /// Links an edge to the given island.
    pub(crate) fn link_edge(&mut self, id: IslandId, edge: EdgeId, edges: &mut SlotPool<Edge>) {
        self.island_mut(id).edges.push_back(id, edge, edges);
    }

    /// Unlinks an edge from its island. Returns the island it was removed from.
    pub(crate) fn unlink_edge(
        &mut self,
        edge: EdgeId,
        edges: &mut SlotPool<Edge>,
    ) -> Option<IslandId> {
        let id = edges[edge.0].island_id()?;
        self.island_mut(id).edges.remove(edge, edges);
        Some(id)
    }

    /// Merges two islands. Returns the ID of the resulting island.
    ///
    /// The nodes and edges of the island with fewer nodes are moved to the other island,
    /// and the emptied island is removed. On a tie, `id1` is kept.
    pub(crate) fn merge_islands(
        &mut self,
        id1: IslandId,
        id2: IslandId,
        nodes: &mut SlotPool<Node>,
        edges: &mut SlotPool<Edge>,
    ) -> IslandId {
        if id1 == id2 {
            // Merging an island with itself is a no-op.
            return id1;
        }

        // Keep the bigger island to reduce relinking.
        let count1 = self.island_mut(id1).node_count();
        let count2 = self.island_mut(id2).node_count();
        let (big_id, small_id) = if count1 >= count2 {
            (id1, id2)
        } else {
            (id2, id1)
        };

        let small = self.remove_island(small_id);
        let big = self.island_mut(big_id);
        big.nodes.append(small.nodes, big_id, nodes);
        big.edges.append(small.edges, big_id, edges);

        trace!("Merged island {small_id:?} into {big_id:?}");

        big_id
    }
}
