use bevy::{
    diagnostic::DiagnosticPath,
    prelude::{ReflectResource, Resource},
    reflect::Reflect,
};
use core::time::Duration;

use crate::diagnostics::{PhysicsDiagnostics, impl_diagnostic_paths};

/// Diagnostics for island management.
#[derive(Resource, Debug, Default, Reflect)]
#[reflect(Resource, Debug)]
pub struct IslandDiagnostics {
    /// Time spent on the first pass of the island update.
    pub first_pass: Duration,
    /// Time spent on the second pass of the island update.
    pub second_pass: Duration,
    /// Time spent merging kinematic proxies back and releasing the work buffers.
    pub finalize: Duration,
    /// The number of islands.
    pub island_count: u32,
    /// The number of awake islands written to the solver output.
    pub awake_island_count: u32,
    /// The number of islands deferred to the second pass.
    pub second_pass_island_count: u32,
    /// The number of kinematic proxies created by the update.
    pub kinematic_proxy_count: u32,
    /// The number of bodies woken up by the update.
    pub bodies_woken: u32,
    /// The number of bodies put to sleep by the update.
    pub bodies_put_to_sleep: u32,
}

impl PhysicsDiagnostics for IslandDiagnostics {
    fn timer_paths(&self) -> Vec<(&'static DiagnosticPath, Duration)> {
        vec![
            (Self::FIRST_PASS, self.first_pass),
            (Self::SECOND_PASS, self.second_pass),
            (Self::FINALIZE, self.finalize),
        ]
    }

    fn counter_paths(&self) -> Vec<(&'static DiagnosticPath, u32)> {
        vec![
            (Self::ISLAND_COUNT, self.island_count),
            (Self::AWAKE_ISLAND_COUNT, self.awake_island_count),
            (Self::SECOND_PASS_ISLAND_COUNT, self.second_pass_island_count),
            (Self::KINEMATIC_PROXY_COUNT, self.kinematic_proxy_count),
            (Self::BODIES_WOKEN, self.bodies_woken),
            (Self::BODIES_PUT_TO_SLEEP, self.bodies_put_to_sleep),
        ]
    }
}

impl_diagnostic_paths! {
    impl IslandDiagnostics {
        FIRST_PASS: "avian_islands/first_pass",
        SECOND_PASS: "avian_islands/second_pass",
        FINALIZE: "avian_islands/finalize",
        ISLAND_COUNT: "avian_islands/island_count",
        AWAKE_ISLAND_COUNT: "avian_islands/awake_island_count",
        SECOND_PASS_ISLAND_COUNT: "avian_islands/second_pass_island_count",
        KINEMATIC_PROXY_COUNT: "avian_islands/kinematic_proxy_count",
        BODIES_WOKEN: "avian_islands/bodies_woken",
        BODIES_PUT_TO_SLEEP: "avian_islands/bodies_put_to_sleep",
    }
}
