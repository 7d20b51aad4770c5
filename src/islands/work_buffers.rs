//! Scratch and output storage reused across island updates.
//!
//! Every array the island update needs is an owned `Vec` that is resized once per update
//! in [`IslandManager::update_islands`], before the graph is touched. Capacities follow a hysteresis
//! policy, so that a scene that stays roughly the same size never reallocates:
//!
//! - A buffer that is too small grows to the bytes it needs plus [`BufferPolicy::slack_bytes`].
//! - A buffer that uses less than half of its capacity shrinks to the bytes it needs,
//!   unless that is below [`BufferPolicy::shrink_floor_bytes`].
//!
//! All growth goes through `try_reserve`, so running out of memory aborts the update
//! with an error instead of aborting the process.
//!
//! [`IslandManager::update_islands`]: super::IslandManager::update_islands

use alloc::collections::TryReserveError;

use crate::{config::IslandManagerConfig, data_structures::bit_vec::BitVec};

use super::{
    EdgeId, IslandId, NodeId,
    output::{IndexedConstraint, IndexedContactManager, IslandBody, IslandIndices, IslandOutput},
};

/// The alignment in bytes that buffer sizes are rounded up to.
pub const BUFFER_ALIGNMENT: usize = 16;

/// Rounds `bytes` up to a multiple of [`BUFFER_ALIGNMENT`].
#[inline]
pub const fn align_buffer_bytes(bytes: usize) -> usize {
    bytes.next_multiple_of(BUFFER_ALIGNMENT)
}

/// Returns the aligned size in bytes of a buffer of `len` values of type `T`.
#[inline]
pub const fn buffer_bytes<T>(len: usize) -> usize {
    align_buffer_bytes(len * size_of::<T>())
}

/// The growth and shrinking policy for work buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferPolicy {
    /// The extra room in bytes given to a buffer whenever it grows.
    pub slack_bytes: usize,
    /// The size in bytes below which a buffer is never shrunk.
    pub shrink_floor_bytes: usize,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self::from(&IslandManagerConfig::default())
    }
}

impl From<&IslandManagerConfig> for BufferPolicy {
    fn from(config: &IslandManagerConfig) -> Self {
        Self {
            slack_bytes: config.buffer_slack_bytes,
            shrink_floor_bytes: config.buffer_shrink_floor_bytes,
        }
    }
}

/// Clears `buffer` and adjusts its capacity for `len` values according to `policy`.
pub fn fit_capacity<T>(
    buffer: &mut Vec<T>,
    len: usize,
    policy: BufferPolicy,
) -> Result<(), TryReserveError> {
    let value_size = size_of::<T>().max(1);
    let needed = buffer_bytes::<T>(len);
    let capacity = buffer.capacity() * value_size;

    buffer.clear();

    if needed > capacity {
        let target = (needed + policy.slack_bytes) / value_size;
        buffer.try_reserve_exact(target)?;
    } else if needed < capacity / 2 && needed >= policy.shrink_floor_bytes {
        buffer.shrink_to(needed.div_ceil(value_size));
    }

    Ok(())
}

/// Adjusts the capacity of `buffer` for `len` values and fills it with `len` copies of `fill`.
pub fn resize_buffer<T: Clone>(
    buffer: &mut Vec<T>,
    len: usize,
    fill: T,
    policy: BufferPolicy,
) -> Result<(), TryReserveError> {
    fit_capacity(buffer, len, policy)?;
    buffer.resize(len, fill);
    Ok(())
}

/// The element counts the work buffers of one update are sized for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkBufferSizes {
    /// The number of node slots, including room for kinematic proxies.
    pub node_slots: usize,
    /// The number of edge slots.
    pub edge_slots: usize,
    /// The maximum number of islands.
    pub island_slots: usize,
    /// The maximum number of kinematic proxies.
    pub kinematic_proxies: usize,
    /// The number of kinematic nodes.
    pub kinematics: usize,
    /// The number of dynamic rigid body nodes.
    pub bodies: usize,
    /// The number of articulation roots.
    pub articulations: usize,
    /// The number of contact manager edges.
    pub contact_managers: usize,
    /// The number of constraint edges.
    pub constraints: usize,
}

impl WorkBufferSizes {
    /// Returns the total size in bytes of the work buffers for these counts.
    pub fn required_bytes(&self) -> usize {
        let Self {
            node_slots,
            edge_slots,
            island_slots,
            kinematic_proxies,
            kinematics,
            bodies,
            articulations,
            contact_managers,
            constraints,
        } = *self;

        let island_bitmap = buffer_bytes::<u64>(island_slots.div_ceil(64));

        // Kinematic duplication
        buffer_bytes::<NodeId>(node_slots) * 3
            + buffer_bytes::<EdgeId>(node_slots)
            + buffer_bytes::<NodeId>(kinematic_proxies)
            + buffer_bytes::<NodeId>(kinematics)
            // Island splitting
            + buffer_bytes::<u32>(node_slots) * 2
            + buffer_bytes::<IslandId>(node_slots)
            + buffer_bytes::<NodeId>(node_slots)
            + buffer_bytes::<EdgeId>(edge_slots)
            + buffer_bytes::<IslandId>(island_slots)
            // Event cleanup and solver body lookup
            + buffer_bytes::<i32>(edge_slots)
            + buffer_bytes::<u32>(node_slots)
            // Broken, affected and kinematic island bitmaps
            + island_bitmap * 3
            // Solver output
            + buffer_bytes::<bevy::prelude::Entity>(bodies)
            + buffer_bytes::<bevy::prelude::Entity>(kinematics)
            + buffer_bytes::<bevy::prelude::Entity>(articulations) * 2
            + buffer_bytes::<IndexedContactManager>(contact_managers)
            + buffer_bytes::<IndexedConstraint>(constraints)
            + buffer_bytes::<IslandIndices>(island_slots + 1)
            + buffer_bytes::<IslandBody>(node_slots) * 2
            + buffer_bytes::<super::EdgeHandle>(contact_managers)
            + buffer_bytes::<IslandId>(island_slots)
    }
}

/// Scratch arrays for one island update.
///
/// Arrays indexed by node or edge slot are filled with placeholders at the start of each update.
#[derive(Clone, Debug, Default)]
pub struct WorkBuffers {
    /// The source kinematic of each proxy node, indexed by node slot.
    pub(crate) proxy_source: Vec<NodeId>,
    /// The edge each proxy node stands in for, indexed by node slot.
    pub(crate) proxy_edge: Vec<EdgeId>,
    /// The next proxy of the same source, indexed by node slot.
    pub(crate) proxy_next: Vec<NodeId>,
    /// The first proxy of each kinematic source, indexed by node slot.
    pub(crate) first_proxy: Vec<NodeId>,
    /// The proxies created in this update.
    pub(crate) proxies: Vec<NodeId>,
    /// The kinematic nodes that were duplicated in this update.
    pub(crate) kinematic_sources: Vec<NodeId>,

    /// Union-find parents, indexed by node slot.
    pub(crate) graph_parent: Vec<u32>,
    /// Union-find set sizes, indexed by node slot.
    pub(crate) graph_size: Vec<u32>,
    /// The island created for each union-find root, indexed by node slot.
    pub(crate) root_islands: Vec<IslandId>,
    /// The nodes of the island being split.
    pub(crate) graph_nodes: Vec<NodeId>,
    /// The edges of the island being split.
    pub(crate) graph_edges: Vec<EdgeId>,
    pub(crate) island_scratch: Vec<IslandId>,

    /// Joined and broken event counters, indexed by edge slot.
    pub(crate) edge_event_counters: Vec<i32>,
    /// The index of each awake node in the solver body or kinematic arrays, indexed by node slot.
    pub(crate) solver_body_map: Vec<u32>,

    /// Islands that lost an edge or node and need to be split.
    pub(crate) broken_islands: BitVec,
    /// Islands resolved by the second pass.
    pub(crate) affected_islands: BitVec,
    /// Islands containing kinematic nodes.
    pub(crate) kinematic_islands: BitVec,

    allocated_bytes: usize,
}

impl WorkBuffers {
    /// Resizes and resets every scratch array, and reserves room in the solver output.
    pub(crate) fn resize(
        &mut self,
        sizes: &WorkBufferSizes,
        policy: BufferPolicy,
        output: &mut IslandOutput,
    ) -> Result<(), TryReserveError> {
        let node_slots = sizes.node_slots;

        resize_buffer(
            &mut self.proxy_source,
            node_slots,
            NodeId::PLACEHOLDER,
            policy,
        )?;
        resize_buffer(
            &mut self.proxy_edge,
            node_slots,
            EdgeId::PLACEHOLDER,
            policy,
        )?;
        resize_buffer(
            &mut self.proxy_next,
            node_slots,
            NodeId::PLACEHOLDER,
            policy,
        )?;
        resize_buffer(
            &mut self.first_proxy,
            node_slots,
            NodeId::PLACEHOLDER,
            policy,
        )?;
        fit_capacity(&mut self.proxies, sizes.kinematic_proxies, policy)?;
        fit_capacity(&mut self.kinematic_sources, sizes.kinematics, policy)?;

        resize_buffer(&mut self.graph_parent, node_slots, 0, policy)?;
        resize_buffer(&mut self.graph_size, node_slots, 0, policy)?;
        resize_buffer(
            &mut self.root_islands,
            node_slots,
            IslandId::PLACEHOLDER,
            policy,
        )?;
        fit_capacity(&mut self.graph_nodes, node_slots, policy)?;
        fit_capacity(&mut self.graph_edges, sizes.edge_slots, policy)?;
        fit_capacity(&mut self.island_scratch, sizes.island_slots, policy)?;

        resize_buffer(
            &mut self.edge_event_counters,
            sizes.edge_slots,
            0,
            policy,
        )?;
        resize_buffer(&mut self.solver_body_map, node_slots, u32::MAX, policy)?;

        self.broken_islands
            .set_bit_count_and_clear(sizes.island_slots);
        self.affected_islands
            .set_bit_count_and_clear(sizes.island_slots);
        self.kinematic_islands
            .set_bit_count_and_clear(sizes.island_slots);

        fit_capacity(&mut output.bodies, sizes.bodies, policy)?;
        fit_capacity(&mut output.kinematics, sizes.kinematics, policy)?;
        fit_capacity(&mut output.articulations, sizes.articulations, policy)?;
        fit_capacity(
            &mut output.articulation_owners,
            sizes.articulations,
            policy,
        )?;
        fit_capacity(
            &mut output.contact_managers,
            sizes.contact_managers,
            policy,
        )?;
        fit_capacity(&mut output.constraints, sizes.constraints, policy)?;
        fit_capacity(&mut output.island_indices, sizes.island_slots + 1, policy)?;
        fit_capacity(&mut output.bodies_to_wake, node_slots, policy)?;
        fit_capacity(&mut output.bodies_to_sleep, node_slots, policy)?;
        fit_capacity(
            &mut output.narrow_phase_edges,
            sizes.contact_managers,
            policy,
        )?;
        fit_capacity(
            &mut output.second_pass_islands,
            sizes.island_slots,
            policy,
        )?;

        self.allocated_bytes = self.capacity_bytes() + output.capacity_bytes();

        Ok(())
    }

    /// Clears the per-update lists, keeping their capacity for the next update.
    pub(crate) fn release(&mut self) {
        self.proxies.clear();
        self.kinematic_sources.clear();
        self.graph_nodes.clear();
        self.graph_edges.clear();
        self.island_scratch.clear();
    }

    fn capacity_bytes(&self) -> usize {
        fn bytes<T>(buffer: &Vec<T>) -> usize {
            buffer.capacity() * size_of::<T>()
        }

        bytes(&self.proxy_source)
            + bytes(&self.proxy_edge)
            + bytes(&self.proxy_next)
            + bytes(&self.first_proxy)
            + bytes(&self.proxies)
            + bytes(&self.kinematic_sources)
            + bytes(&self.graph_parent)
            + bytes(&self.graph_size)
            + bytes(&self.root_islands)
            + bytes(&self.graph_nodes)
            + bytes(&self.graph_edges)
            + bytes(&self.island_scratch)
            + bytes(&self.edge_event_counters)
            + bytes(&self.solver_body_map)
            + (self.broken_islands.block_count()
                + self.affected_islands.block_count()
                + self.kinematic_islands.block_count())
                * size_of::<u64>()
    }

    /// Returns the number of bytes reserved by the work buffers and solver output after the last resize.
    #[inline]
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }
}
