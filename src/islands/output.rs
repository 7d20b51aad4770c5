//! The per-update output of the island manager, consumed by the constraint solver
//! and the sleeping logic.
//!
//! Awake islands are flattened into shared arrays of bodies, articulations,
//! contact managers and constraints. [`IslandIndices`] gives the start of each island
//! in every array, followed by a sentinel entry holding the end of the last island,
//! so that island `i` spans from entry `i` to entry `i + 1`.

use core::ops::Range;

use bevy::prelude::*;

use super::{ContactManagerId, EdgeHandle, IslandId};

/// A body whose sleeping state changed during an island update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum IslandBody {
    /// A rigid body.
    RigidBody(Entity),
    /// An articulation, identified by the owner of its root link.
    Articulation(Entity),
}

/// One end of a solver interaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum SolverEndpoint {
    /// The static world.
    World,
    /// An awake dynamic body, as an index into [`IslandOutput::bodies`].
    Body(u32),
    /// A kinematic body, as an index into [`IslandOutput::kinematics`].
    Kinematic(u32),
    /// An articulation link.
    Articulation(Entity),
}

impl SolverEndpoint {
    /// Returns `true` if the solver moves this endpoint.
    #[inline]
    pub const fn is_dynamic(&self) -> bool {
        matches!(self, Self::Body(_) | Self::Articulation(_))
    }
}

/// A contact manager of an awake island, with its endpoints resolved for the solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexedContactManager {
    /// The narrow phase contact manager.
    pub contact_manager: ContactManagerId,
    /// The edge the contact manager is attached to.
    pub edge: EdgeHandle,
    /// The first body.
    pub endpoint1: SolverEndpoint,
    /// The second body.
    pub endpoint2: SolverEndpoint,
}

/// A constraint of an awake island, with its endpoints resolved for the solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexedConstraint {
    /// The constraint entity.
    pub constraint: Entity,
    /// The edge the constraint is attached to.
    pub edge: EdgeHandle,
    /// The first body.
    pub endpoint1: SolverEndpoint,
    /// The second body.
    pub endpoint2: SolverEndpoint,
}

/// The start of an awake island in each of the flattened solver arrays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IslandIndices {
    /// The island, or [`IslandId::PLACEHOLDER`] for the trailing sentinel.
    pub island: IslandId,
    /// The start of the island in [`IslandOutput::bodies`].
    pub bodies: u32,
    /// The start of the island in [`IslandOutput::articulations`].
    pub articulations: u32,
    /// The start of the island in [`IslandOutput::contact_managers`].
    pub contact_managers: u32,
    /// The start of the island in [`IslandOutput::constraints`].
    pub constraints: u32,
    /// `true` if a contact manager of the island touches the static world.
    pub has_static_contact: bool,
}

/// The slices of one awake island in the solver arrays.
#[derive(Clone, Copy, Debug)]
pub struct SolverIsland<'a> {
    /// The island.
    pub island: IslandId,
    /// The dynamic rigid bodies.
    pub bodies: &'a [Entity],
    /// The root links of the articulations.
    pub articulations: &'a [Entity],
    /// The owners of the articulations, in the same order as `articulations`.
    pub articulation_owners: &'a [Entity],
    /// The contact managers.
    pub contact_managers: &'a [IndexedContactManager],
    /// The constraints.
    pub constraints: &'a [IndexedConstraint],
    /// `true` if a contact manager of the island touches the static world.
    pub has_static_contact: bool,
}

/// The output of the last island update.
///
/// The output stays readable until the next call to [`IslandManager::update_islands`].
/// Note that island IDs refer to the islands as they were before [`IslandManager::free_buffers`]
/// merged kinematic proxies back to their source.
///
/// [`IslandManager::update_islands`]: super::IslandManager::update_islands
/// [`IslandManager::free_buffers`]: super::IslandManager::free_buffers
#[derive(Clone, Debug, Default)]
pub struct IslandOutput {
    pub(crate) bodies_to_wake: Vec<IslandBody>,
    pub(crate) bodies_to_sleep: Vec<IslandBody>,
    pub(crate) bodies: Vec<Entity>,
    pub(crate) kinematics: Vec<Entity>,
    pub(crate) articulations: Vec<Entity>,
    pub(crate) articulation_owners: Vec<Entity>,
    pub(crate) contact_managers: Vec<IndexedContactManager>,
    pub(crate) constraints: Vec<IndexedConstraint>,
    pub(crate) island_indices: Vec<IslandIndices>,
    pub(crate) narrow_phase_edges: Vec<EdgeHandle>,
    pub(crate) second_pass_islands: Vec<IslandId>,
}

impl IslandOutput {
    /// Returns the bodies that were woken up.
    ///
    /// The first pass only lists bodies that were asleep before the update.
    #[inline]
    pub fn bodies_to_wake(&self) -> &[IslandBody] {
        &self.bodies_to_wake
    }

    /// Returns the bodies that were put to sleep.
    ///
    /// The first pass only lists bodies that were awake before the update,
    /// while the second pass lists every body of the islands it puts to sleep.
    #[inline]
    pub fn bodies_to_sleep(&self) -> &[IslandBody] {
        &self.bodies_to_sleep
    }

    /// Returns the dynamic rigid bodies of all awake islands.
    #[inline]
    pub fn bodies(&self) -> &[Entity] {
        &self.bodies
    }

    /// Returns the kinematic bodies touching awake islands. Each kinematic body is listed once.
    #[inline]
    pub fn kinematics(&self) -> &[Entity] {
        &self.kinematics
    }

    /// Returns the articulation root links of all awake islands.
    #[inline]
    pub fn articulations(&self) -> &[Entity] {
        &self.articulations
    }

    /// Returns the owners of the articulations, in the same order as [`Self::articulations`].
    #[inline]
    pub fn articulation_owners(&self) -> &[Entity] {
        &self.articulation_owners
    }

    /// Returns the contact managers of all awake islands.
    #[inline]
    pub fn contact_managers(&self) -> &[IndexedContactManager] {
        &self.contact_managers
    }

    /// Returns the constraints of all awake islands.
    #[inline]
    pub fn constraints(&self) -> &[IndexedConstraint] {
        &self.constraints
    }

    /// Returns the island index table, including the trailing sentinel.
    #[inline]
    pub fn island_indices(&self) -> &[IslandIndices] {
        &self.island_indices
    }

    /// Returns the contact manager edges of waking islands that need narrow phase results
    /// before the second pass.
    #[inline]
    pub fn narrow_phase_edges(&self) -> &[EdgeHandle] {
        &self.narrow_phase_edges
    }

    /// Returns the islands that were deferred to the second pass.
    #[inline]
    pub fn second_pass_islands(&self) -> &[IslandId] {
        &self.second_pass_islands
    }

    /// Returns the number of awake islands in the solver arrays.
    #[inline]
    pub fn solver_island_count(&self) -> usize {
        self.island_indices.len().saturating_sub(1)
    }

    /// Returns an iterator over the awake islands in the solver arrays.
    pub fn solver_islands(&self) -> impl Iterator<Item = SolverIsland<'_>> {
        self.island_indices.windows(2).map(|window| {
            let [start, end] = window else {
                unreachable!("`windows(2)` yields pairs");
            };
            let range = |from: u32, to: u32| -> Range<usize> { from as usize..to as usize };
            SolverIsland {
                island: start.island,
                bodies: &self.bodies[range(start.bodies, end.bodies)],
                articulations: &self.articulations[range(start.articulations, end.articulations)],
                articulation_owners: &self.articulation_owners
                    [range(start.articulations, end.articulations)],
                contact_managers: &self.contact_managers
                    [range(start.contact_managers, end.contact_managers)],
                constraints: &self.constraints[range(start.constraints, end.constraints)],
                has_static_contact: start.has_static_contact,
            }
        })
    }

    /// Returns the current end of each solver array, as the start of the next island.
    #[inline]
    pub(crate) fn next_indices(&self, island: IslandId) -> IslandIndices {
        IslandIndices {
            island,
            bodies: self.bodies.len() as u32,
            articulations: self.articulations.len() as u32,
            contact_managers: self.contact_managers.len() as u32,
            constraints: self.constraints.len() as u32,
            has_static_contact: false,
        }
    }

    /// Drops everything written for an island after `start`.
    #[inline]
    pub(crate) fn truncate_to(&mut self, start: &IslandIndices) {
        self.bodies.truncate(start.bodies as usize);
        self.articulations.truncate(start.articulations as usize);
        self.articulation_owners
            .truncate(start.articulations as usize);
        self.contact_managers
            .truncate(start.contact_managers as usize);
        self.constraints.truncate(start.constraints as usize);
    }

    /// Removes the trailing sentinel from the island index table, if there is one.
    #[inline]
    pub(crate) fn pop_sentinel(&mut self) {
        if self
            .island_indices
            .last()
            .is_some_and(|indices| indices.island == IslandId::PLACEHOLDER)
        {
            self.island_indices.pop();
        }
    }

    /// Pushes the trailing sentinel to the island index table.
    #[inline]
    pub(crate) fn push_sentinel(&mut self) {
        let sentinel = self.next_indices(IslandId::PLACEHOLDER);
        self.island_indices.push(sentinel);
    }

    /// Clears every array.
    pub fn clear(&mut self) {
        self.bodies_to_wake.clear();
        self.bodies_to_sleep.clear();
        self.bodies.clear();
        self.kinematics.clear();
        self.articulations.clear();
        self.articulation_owners.clear();
        self.contact_managers.clear();
        self.constraints.clear();
        self.island_indices.clear();
        self.narrow_phase_edges.clear();
        self.second_pass_islands.clear();
    }

    pub(crate) fn capacity_bytes(&self) -> usize {
        fn bytes<T>(buffer: &Vec<T>) -> usize {
            buffer.capacity() * size_of::<T>()
        }

        bytes(&self.bodies_to_wake)
            + bytes(&self.bodies_to_sleep)
            + bytes(&self.bodies)
            + bytes(&self.kinematics)
            + bytes(&self.articulations)
            + bytes(&self.articulation_owners)
            + bytes(&self.contact_managers)
            + bytes(&self.constraints)
            + bytes(&self.island_indices)
            + bytes(&self.narrow_phase_edges)
            + bytes(&self.second_pass_islands)
    }
}
