//! Configuration for island management.

use bevy::prelude::*;

/// A resource for configuring the [`IslandManager`](crate::islands::IslandManager)
/// and the [`IslandPlugin`](crate::islands::IslandPlugin).
#[derive(Resource, Reflect, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", reflect(Serialize, Deserialize))]
#[reflect(Debug, Resource, PartialEq)]
pub struct IslandManagerConfig {
    /// The number of bodies to reserve node and edge capacity for when the manager is created.
    ///
    /// The node capacity is rounded up to a multiple of 32, and the edge capacity is twice the node capacity.
    ///
    /// Default: `0`
    pub initial_body_capacity: usize,

    /// The extra room in bytes given to a work buffer whenever it has to grow.
    ///
    /// A larger slack reduces how often buffers are reallocated as the scene grows.
    ///
    /// Default: `16384`
    pub buffer_slack_bytes: usize,

    /// The size in bytes below which work buffers are never shrunk.
    ///
    /// A buffer is shrunk only when the bytes it needs drop below half of its capacity,
    /// and stay at or above this floor.
    ///
    /// Default: `16384`
    pub buffer_shrink_floor_bytes: usize,

    /// The maximum total size in bytes of the work buffers for one update.
    ///
    /// If an update needs more, it is aborted with [`IslandError::OutOfMemory`],
    /// and the islands keep the state from the last completed update.
    ///
    /// Default: `None` (unbounded)
    ///
    /// [`IslandError::OutOfMemory`]: crate::error::IslandError::OutOfMemory
    pub work_buffer_budget: Option<usize>,

    /// If `true`, islands that need narrow phase results before they can be classified
    /// are resolved in a separate [`IslandSystems::SecondPass`] after the [`IslandSystems::NarrowPhase`].
    ///
    /// If `false`, the second pass runs right after the first pass, in the same system.
    ///
    /// Default: `true`
    ///
    /// [`IslandSystems::SecondPass`]: crate::islands::IslandSystems::SecondPass
    /// [`IslandSystems::NarrowPhase`]: crate::islands::IslandSystems::NarrowPhase
    pub second_pass: bool,
}

impl Default for IslandManagerConfig {
    fn default() -> Self {
        Self {
            initial_body_capacity: 0,
            buffer_slack_bytes: 16384,
            buffer_shrink_floor_bytes: 16384,
            work_buffer_budget: None,
            second_pass: true,
        }
    }
}
