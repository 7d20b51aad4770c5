use bevy::{
    ecs::{intern::Interned, schedule::ScheduleLabel},
    platform::time::Instant,
    prelude::*,
};

use crate::{config::IslandManagerConfig, diagnostics::AppDiagnosticsExt};

use super::{IslandDiagnostics, IslandManager};

/// A plugin that updates the [`IslandManager`] once per physics step.
///
/// The update is split into the system sets in [`IslandSystems`], which run in order.
/// Narrow phase systems that need to run between the two passes of the island update
/// should be added to [`IslandSystems::NarrowPhase`].
///
/// The [`IslandManagerConfig`] resource can be used to configure the manager.
/// Changes take effect on the next update.
pub struct IslandPlugin {
    schedule: Interned<dyn ScheduleLabel>,
}

impl IslandPlugin {
    /// Creates an [`IslandPlugin`] with the schedule that is used for running the island update.
    ///
    /// The default schedule is `FixedPostUpdate`.
    pub fn new(schedule: impl ScheduleLabel) -> Self {
        Self {
            schedule: schedule.intern(),
        }
    }
}

impl Default for IslandPlugin {
    fn default() -> Self {
        Self::new(FixedPostUpdate)
    }
}

/// System sets for the island update, in the order they run.
#[derive(SystemSet, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IslandSystems {
    /// Runs the first pass of the island update.
    FirstPass,
    /// Runs between the passes. Narrow phase systems can attach contact managers to the pairs
    /// listed in [`IslandOutput::narrow_phase_edges`](super::output::IslandOutput::narrow_phase_edges),
    /// or disconnect the pairs that are not touching.
    NarrowPhase,
    /// Runs the second pass of the island update, if the first pass did any work.
    SecondPass,
    /// Merges kinematic proxies back and ends the update.
    /// The solver output can be read by systems that run after this set.
    Finalize,
}

impl Plugin for IslandPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<IslandManagerConfig>();

        let config = app.world().resource::<IslandManagerConfig>().clone();
        app.insert_resource(IslandManager::new(config));

        app.register_type::<IslandManagerConfig>()
            .register_type::<IslandDiagnostics>();

        app.configure_sets(
            self.schedule,
            (
                IslandSystems::FirstPass,
                IslandSystems::NarrowPhase,
                IslandSystems::SecondPass,
                IslandSystems::Finalize,
            )
                .chain(),
        );

        app.add_systems(
            self.schedule,
            (
                update_islands_first_pass.in_set(IslandSystems::FirstPass),
                update_islands_second_pass
                    .run_if(second_pass_pending)
                    .in_set(IslandSystems::SecondPass),
                finalize_island_update.in_set(IslandSystems::Finalize),
            ),
        );
    }

    fn finish(&self, app: &mut App) {
        app.register_physics_diagnostics::<IslandDiagnostics>();
    }
}

fn update_islands_first_pass(
    mut manager: ResMut<IslandManager>,
    config: Res<IslandManagerConfig>,
    mut diagnostics: ResMut<IslandDiagnostics>,
) {
    let start = Instant::now();

    if config.is_changed() && manager.config() != &*config {
        manager.set_config(config.clone());
    }

    if let Err(error) = manager.update_islands() {
        error!("Failed to update islands: {error}");
    } else if !config.second_pass
        && let Err(error) = manager.update_islands_second_pass()
    {
        error!("Failed to run the second island pass: {error}");
    }

    diagnostics.first_pass = start.elapsed();
    diagnostics.second_pass_island_count = manager.output().second_pass_islands().len() as u32;
}

fn second_pass_pending(manager: Res<IslandManager>) -> bool {
    manager.is_update_in_progress() && manager.update_performed()
}

fn update_islands_second_pass(
    mut manager: ResMut<IslandManager>,
    mut diagnostics: ResMut<IslandDiagnostics>,
) {
    let start = Instant::now();

    if let Err(error) = manager.update_islands_second_pass() {
        error!("Failed to run the second island pass: {error}");
    }

    diagnostics.second_pass = start.elapsed();
}

fn finalize_island_update(
    mut manager: ResMut<IslandManager>,
    mut diagnostics: ResMut<IslandDiagnostics>,
) {
    let start = Instant::now();

    let kinematic_proxy_count = manager.counts().kinematic_proxies;

    manager.free_buffers();

    diagnostics.finalize = start.elapsed();

    let output = manager.output();
    diagnostics.island_count = manager.island_count() as u32;
    diagnostics.awake_island_count = output.solver_island_count() as u32;
    diagnostics.kinematic_proxy_count = kinematic_proxy_count;
    diagnostics.bodies_woken = output.bodies_to_wake().len() as u32;
    diagnostics.bodies_put_to_sleep = output.bodies_to_sleep().len() as u32;
}
