//! # Avian Islands
//!
//! **Avian Islands** is an incremental simulation island manager for rigid body physics
//! in the [Bevy game engine](https://bevyengine.org/).
//!
//! An *island* is a group of bodies that are connected to each other, directly or transitively,
//! through contacts, joints or articulations. Islands can be solved independently, and an island
//! can be put to sleep once every body in it has come to rest. This crate keeps track of the islands
//! as bodies and contacts come and go, without recomputing them from scratch every step.
//!
//! ## Features
//!
//! - Persistent islands that are merged and split incrementally
//! - Generation-checked handles for bodies and contacts
//! - Kinematic bodies that push dynamic bodies without joining their islands
//! - Articulations, listed once per island by their root link
//! - Sleeping and waking of whole islands
//! - A second pass for islands whose contacts need narrow phase results before they can be split
//! - Work buffers that are reused across steps, with an optional memory budget
//! - Timers and counters through Bevy's diagnostics
//!
//! ## Getting started
//!
//! Add the [`IslandPlugin`] to your app, and describe the physics world to the [`IslandManager`] resource:
//!
//! ```no_run
//! use avian_islands::prelude::*;
//! use bevy::prelude::*;
//!
//! fn main() {
//!     App::new()
//!         .add_plugins((MinimalPlugins, IslandPlugin::default()))
//!         .add_systems(Startup, setup)
//!         .run();
//! }
//!
//! fn setup(mut commands: Commands, mut manager: ResMut<IslandManager>) {
//!     let a = commands.spawn_empty().id();
//!     let b = commands.spawn_empty().id();
//!
//!     let node_a = manager.add_node(a, BodyKind::Dynamic, false).unwrap();
//!     let node_b = manager.add_node(b, BodyKind::Dynamic, false).unwrap();
//!
//!     // Connecting the edge merges the two islands on the next update.
//!     let contact = manager
//!         .add_edge(EdgeKind::ContactManager, Some(node_a), Some(node_b))
//!         .unwrap();
//!     manager.set_edge_contact_manager(contact, Some(ContactManagerId(0))).unwrap();
//!     manager.set_edge_connected(contact).unwrap();
//! }
//! ```
//!
//! Once the update in [`IslandSystems::Finalize`] is done, the awake islands can be read from
//! [`IslandManager::output`] and solved independently.
//!
//! ## Update lifecycle
//!
//! The manager can also be used without the plugin. An update consists of the following steps:
//!
//! 1. [`IslandManager::update_islands`] applies the changes recorded since the last update.
//! 2. The narrow phase runs for the pairs in [`IslandOutput::narrow_phase_edges`](islands::output::IslandOutput::narrow_phase_edges).
//! 3. [`IslandManager::update_islands_second_pass`] resolves the islands that waited for the narrow phase.
//! 4. [`IslandManager::free_buffers`] ends the update.
//!
//! See the [`islands`] module for how islands are maintained.
//!
//! [`IslandPlugin`]: islands::IslandPlugin
//! [`IslandManager`]: islands::IslandManager
//! [`IslandSystems::Finalize`]: islands::IslandSystems::Finalize
//! [`IslandManager::output`]: islands::IslandManager::output
//! [`IslandManager::update_islands`]: islands::IslandManager::update_islands
//! [`IslandManager::update_islands_second_pass`]: islands::IslandManager::update_islands_second_pass
//! [`IslandManager::free_buffers`]: islands::IslandManager::free_buffers

#![warn(missing_docs)]

extern crate alloc;

pub mod config;
pub mod data_structures;
pub mod diagnostics;
pub mod error;
pub mod islands;

#[cfg(test)]
mod tests;

/// Re-exports common types.
pub mod prelude {
    pub use crate::{
        config::IslandManagerConfig,
        diagnostics::{AppDiagnosticsExt, PhysicsDiagnostics},
        error::IslandError,
        islands::{
            BodyKind, ContactManagerId, EdgeHandle, EdgeKind, IslandCounts, IslandDiagnostics,
            IslandId, IslandManager, IslandPlugin, IslandSystems, NodeHandle,
            output::{
                IndexedConstraint, IndexedContactManager, IslandBody, IslandIndices, IslandOutput,
                SolverEndpoint, SolverIsland,
            },
        },
    };
}
