//! Errors returned by the [`IslandManager`](crate::islands::IslandManager).

use alloc::collections::TryReserveError;

use thiserror::Error;

use crate::islands::{EdgeHandle, NodeHandle};

/// Error returned by the entry points and update methods of the [`IslandManager`].
///
/// Stale handles and misuse of the update lifecycle are reported as errors.
/// Broken internal invariants are bugs, and panic instead.
///
/// [`IslandManager`]: crate::islands::IslandManager
#[derive(Debug, Error)]
pub enum IslandError {
    /// The node handle does not refer to a live node.
    /// The node was removed, or the handle is from another manager.
    #[error("The node {0:?} does not exist")]
    InvalidNode(NodeHandle),
    /// The edge handle does not refer to a live edge.
    #[error("The edge {0:?} does not exist")]
    InvalidEdge(EdgeHandle),
    /// An edge was added with neither endpoint present, which would connect the static world to itself.
    #[error("An edge must have at least one node")]
    StaticEdge,
    /// An edge was added with the same node at both ends.
    #[error("An edge cannot connect the node {0:?} to itself")]
    SelfEdge(NodeHandle),
    /// An articulation link cannot be kinematic.
    #[error("The articulation link {0:?} cannot be made kinematic")]
    ArticulatedKinematic(NodeHandle),
    /// An articulation operation was used on a node that is not an articulation link.
    #[error("The node {0:?} is not an articulation link")]
    NotArticulationLink(NodeHandle),
    /// A payload was attached to an edge of the wrong kind.
    #[error("The edge {0:?} does not accept this kind of payload")]
    EdgeKindMismatch(EdgeHandle),
    /// Nodes and edges cannot be added or removed between the first pass and [`IslandManager::free_buffers`].
    ///
    /// [`IslandManager::free_buffers`]: crate::islands::IslandManager::free_buffers
    #[error("Nodes and edges cannot be added or removed while an island update is in progress")]
    UpdateInProgress,
    /// The second pass was requested without a preceding first pass.
    #[error("The second island pass requires a preceding first pass")]
    SecondPassWithoutFirstPass,
    /// The work buffers for the update exceed the configured budget.
    /// The update was aborted, and the islands kept their previous state.
    #[error("Island work buffers need {requested_bytes} bytes, which exceeds the budget")]
    OutOfMemory {
        /// The number of bytes the update needed.
        requested_bytes: usize,
    },
    /// Growing a pool or work buffer failed.
    /// The update was aborted, and the islands kept their previous state.
    #[error("Failed to allocate island storage: {0}")]
    AllocationFailed(#[from] TryReserveError),
}
