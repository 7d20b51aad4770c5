//! Edges of the island graph: contact managers, constraints and articulation joints.

use arrayvec::ArrayVec;
use bevy::prelude::*;
use derive_more::From;

use super::{IslandId, IslandMember, IslandNode, NodeId};

/// The index of an [`Edge`] in the edge pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeId(pub u32);

impl EdgeId {
    /// A placeholder ID that does not refer to any edge.
    pub const PLACEHOLDER: Self = Self(u32::MAX);

    /// Returns the ID as a `usize` for indexing.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns `true` if this is [`EdgeId::PLACEHOLDER`].
    #[inline]
    pub const fn is_placeholder(self) -> bool {
        self.0 == u32::MAX
    }
}

/// An opaque handle to an edge, returned by [`IslandManager::add_edge`].
///
/// The handle becomes invalid as soon as the edge is removed.
///
/// [`IslandManager::add_edge`]: super::IslandManager::add_edge
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl EdgeHandle {
    /// Returns the slot index of the edge.
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Returns the generation of the slot the handle was issued for.
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    #[inline]
    pub(crate) const fn id(&self) -> EdgeId {
        EdgeId(self.index)
    }
}

/// An identifier for a narrow phase contact manager, supplied by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, From)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ContactManagerId(pub u32);

/// The kind of interaction an [`Edge`] represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Reflect)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum EdgeKind {
    /// A pair of bodies handled by a narrow phase contact manager.
    ContactManager,
    /// A joint or other constraint between bodies.
    Constraint,
    /// A joint inside an articulation. Connects islands, but is solved by the articulation itself.
    ArticulationJoint,
}

/// The object an [`Edge`] stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, From)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum EdgePayload {
    /// A narrow phase contact manager.
    ContactManager(ContactManagerId),
    /// A constraint entity.
    Constraint(Entity),
}

/// Flags describing the state of an [`Edge`].
#[repr(transparent)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EdgeFlags(u8);

bitflags::bitflags! {
    impl EdgeFlags: u8 {
        /// Set if the edge currently connects its nodes.
        const CONNECTED = 1 << 0;
        /// Set if the edge was removed and is waiting to be reclaimed.
        const REMOVED = 1 << 1;
    }
}

/// An edge of the island graph between up to two nodes.
///
/// A missing node stands for the static world.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Edge {
    pub(crate) flags: EdgeFlags,
    pub(crate) kind: EdgeKind,
    pub(crate) node1: Option<NodeId>,
    pub(crate) node2: Option<NodeId>,
    pub(crate) island: IslandNode<EdgeId>,
    pub(crate) payload: Option<EdgePayload>,
    /// The joint entity for [`EdgeKind::ArticulationJoint`] edges.
    pub(crate) articulation_joint: Option<Entity>,
}

impl Edge {
    #[inline]
    pub(crate) const fn new(kind: EdgeKind, node1: Option<NodeId>, node2: Option<NodeId>) -> Self {
        Self {
            flags: EdgeFlags::empty(),
            kind,
            node1,
            node2,
            island: IslandNode::PLACEHOLDER,
            payload: None,
            articulation_joint: None,
        }
    }

    /// Returns the kind of the edge.
    #[inline]
    pub const fn kind(&self) -> EdgeKind {
        self.kind
    }

    /// Returns the flags of the edge.
    #[inline]
    pub const fn flags(&self) -> EdgeFlags {
        self.flags
    }

    /// Returns `true` if the edge currently connects its nodes.
    #[inline]
    pub const fn is_connected(&self) -> bool {
        self.flags.contains(EdgeFlags::CONNECTED)
    }

    #[inline]
    pub(crate) const fn is_removed(&self) -> bool {
        self.flags.contains(EdgeFlags::REMOVED)
    }

    /// Returns the island the edge belongs to, if any.
    #[inline]
    pub fn island_id(&self) -> Option<IslandId> {
        self.island.island_id()
    }

    /// Returns the contact manager attached to the edge, if any.
    #[inline]
    pub fn contact_manager(&self) -> Option<ContactManagerId> {
        match self.payload {
            Some(EdgePayload::ContactManager(id)) => Some(id),
            _ => None,
        }
    }

    /// Returns the constraint attached to the edge, if any.
    #[inline]
    pub fn constraint(&self) -> Option<Entity> {
        match self.payload {
            Some(EdgePayload::Constraint(entity)) => Some(entity),
            _ => None,
        }
    }

    /// Returns the present endpoints of the edge.
    #[inline]
    pub(crate) fn nodes(&self) -> ArrayVec<NodeId, 2> {
        self.node1.into_iter().chain(self.node2).collect()
    }

    /// Replaces the endpoint `from` with `to`.
    #[inline]
    pub(crate) fn replace_node(&mut self, from: NodeId, to: NodeId) {
        if self.node1 == Some(from) {
            self.node1 = Some(to);
        } else if self.node2 == Some(from) {
            self.node2 = Some(to);
        } else {
            debug_assert!(false, "Node {from:?} is not an endpoint of the edge");
        }
    }
}

impl IslandMember for Edge {
    type Id = EdgeId;

    #[inline]
    fn slot(id: EdgeId) -> u32 {
        id.0
    }

    #[inline]
    fn links(&self) -> &IslandNode<EdgeId> {
        &self.island
    }

    #[inline]
    fn links_mut(&mut self) -> &mut IslandNode<EdgeId> {
        &mut self.island
    }
}
