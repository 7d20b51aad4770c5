//! Nodes of the island graph: rigid bodies and articulation links.

use bevy::prelude::*;

use super::{IslandId, IslandMember, IslandNode};

/// The index of a [`Node`] in the node pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u32);

impl NodeId {
    /// A placeholder ID that does not refer to any node.
    pub const PLACEHOLDER: Self = Self(u32::MAX);

    /// Returns the ID as a `usize` for indexing.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns `true` if this is [`NodeId::PLACEHOLDER`].
    #[inline]
    pub const fn is_placeholder(self) -> bool {
        self.0 == u32::MAX
    }
}

/// An opaque handle to a node, returned by [`IslandManager::add_node`]
/// and [`IslandManager::add_articulation_link`].
///
/// The handle becomes invalid as soon as the node is removed, even though the node
/// is only reclaimed by the next island update.
///
/// [`IslandManager::add_node`]: super::IslandManager::add_node
/// [`IslandManager::add_articulation_link`]: super::IslandManager::add_articulation_link
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeHandle {
    /// Returns the slot index of the node.
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
    pub(crate) const fn id(&self) -> NodeId {
        NodeId(self.index)
    }
}

/// The kind of a rigid body node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum BodyKind {
    /// A body moved by the solver.
    #[default]
    Dynamic,
    /// A body driven externally. It can push dynamic bodies,
    /// but never connects their islands with each other.
    Kinematic,
}

/// Flags describing the kind and state of a [`Node`].
#[repr(transparent)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NodeFlags(u8);

bitflags::bitflags! {
    impl NodeFlags: u8 {
        /// Set if the node is a kinematic body.
        const KINEMATIC = 1 << 0;
        /// Set if the node is an articulation link. Mutually exclusive with `KINEMATIC`.
        const ARTICULATION_LINK = 1 << 1;
        /// Set if the node was removed and is waiting to be reclaimed.
        const DELETED = 1 << 2;
        /// Set if the node was added since the last island update.
        const NEW = 1 << 3;
        /// Set if the body is below its sleep threshold.
        const READY_FOR_SLEEPING = 1 << 4;
        /// Set if the node belongs to an island that was put to sleep.
        const IN_SLEEPING_ISLAND = 1 << 5;
        /// Set if the node is a per-update stand-in for a kinematic node.
        const KINEMATIC_PROXY = 1 << 6;
    }
}

/// The index of an [`ArticulationRoot`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ArticulationRootId(pub u32);

/// The root link of an articulation and the articulation that owns it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ArticulationRoot {
    /// The root link.
    pub link: Entity,
    /// The articulation the link belongs to.
    pub articulation: Entity,
}

/// A vertex of the island graph, representing one rigid body or articulation link.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    pub(crate) flags: NodeFlags,
    pub(crate) island: IslandNode<NodeId>,
    /// The rigid body or articulation link.
    pub(crate) body: Entity,
    pub(crate) articulation_root: Option<ArticulationRootId>,
}

impl Node {
    #[inline]
    pub(crate) const fn new(body: Entity, flags: NodeFlags) -> Self {
        Self {
            flags,
            island: IslandNode::PLACEHOLDER,
            body,
            articulation_root: None,
        }
    }

    /// Returns the rigid body or articulation link entity.
    #[inline]
    pub const fn body(&self) -> Entity {
        self.body
    }

    /// Returns the flags of the node.
    #[inline]
    pub const fn flags(&self) -> NodeFlags {
        self.flags
    }

    /// Returns the island the node belongs to, if any.
    #[inline]
    pub fn island_id(&self) -> Option<IslandId> {
        self.island.island_id()
    }

    /// Returns `true` if the node is kinematic, including kinematic proxies.
    #[inline]
    pub const fn is_kinematic(&self) -> bool {
        self.flags.contains(NodeFlags::KINEMATIC)
    }

    /// Returns `true` if the node is an articulation link.
    #[inline]
    pub const fn is_articulation_link(&self) -> bool {
        self.flags.contains(NodeFlags::ARTICULATION_LINK)
    }

    /// Returns `true` if the node is the root link of an articulation.
    #[inline]
    pub const fn is_articulation_root(&self) -> bool {
        self.articulation_root.is_some()
    }

    #[inline]
    pub(crate) const fn is_deleted(&self) -> bool {
        self.flags.contains(NodeFlags::DELETED)
    }

    #[inline]
    pub(crate) const fn is_new(&self) -> bool {
        self.flags.contains(NodeFlags::NEW)
    }

    #[inline]
    pub(crate) const fn is_kinematic_proxy(&self) -> bool {
        self.flags.contains(NodeFlags::KINEMATIC_PROXY)
    }

    /// Returns `true` if the body is below its sleep threshold.
    #[inline]
    pub const fn is_ready_for_sleeping(&self) -> bool {
        self.flags.contains(NodeFlags::READY_FOR_SLEEPING)
    }

    /// Returns `true` if the node belongs to an island that is currently sleeping.
    #[inline]
    pub const fn is_in_sleeping_island(&self) -> bool {
        self.flags.contains(NodeFlags::IN_SLEEPING_ISLAND)
    }
}

impl IslandMember for Node {
    type Id = NodeId;

    #[inline]
    fn slot(id: NodeId) -> u32 {
        id.0
    }

    #[inline]
    fn links(&self) -> &IslandNode<NodeId> {
        &self.island
    }

    #[inline]
    fn links_mut(&mut self) -> &mut IslandNode<NodeId> {
        &mut self.island
    }
}
