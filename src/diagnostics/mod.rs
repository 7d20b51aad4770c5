//! Diagnostics support for tooling and profiling.
//!
//! Each part of the crate that records timers or counters defines its own diagnostics resource,
//! implements [`PhysicsDiagnostics`] for it, and registers it with [`AppDiagnosticsExt::register_physics_diagnostics`].
//! The values are written to the resource by the systems being measured.
//!
//! If the `bevy_diagnostic` feature is enabled, the values are also written
//! to Bevy's [`DiagnosticsStore`](bevy::diagnostic::DiagnosticsStore) every frame.

mod path_macro;
pub(crate) use path_macro::impl_diagnostic_paths;

use core::time::Duration;

use bevy::{diagnostic::DiagnosticPath, prelude::*};

#[cfg(feature = "bevy_diagnostic")]
use bevy::diagnostic::{Diagnostic, Diagnostics, RegisterDiagnostic};

/// A trait for resources that hold physics timers and counters.
pub trait PhysicsDiagnostics: Default + Resource {
    /// Returns the paths and current values of the timers.
    fn timer_paths(&self) -> Vec<(&'static DiagnosticPath, Duration)> {
        Vec::new()
    }

    /// Returns the paths and current values of the counters.
    fn counter_paths(&self) -> Vec<(&'static DiagnosticPath, u32)> {
        Vec::new()
    }
}

/// An extension trait for registering [`PhysicsDiagnostics`] in an [`App`].
pub trait AppDiagnosticsExt {
    /// Initializes the diagnostics resource `T`.
    ///
    /// If the `bevy_diagnostic` feature is enabled, this also registers every timer and counter
    /// of `T` as a Bevy diagnostic, and adds a system writing their values to the store.
    fn register_physics_diagnostics<T: PhysicsDiagnostics>(&mut self) -> &mut Self;
}

impl AppDiagnosticsExt for App {
    fn register_physics_diagnostics<T: PhysicsDiagnostics>(&mut self) -> &mut Self {
        self.init_resource::<T>();

        #[cfg(feature = "bevy_diagnostic")]
        {
            let diagnostics = T::default();

            for (path, _) in diagnostics.timer_paths() {
                self.register_diagnostic(Diagnostic::new(path.clone()).with_suffix("ms"));
            }

            for (path, _) in diagnostics.counter_paths() {
                self.register_diagnostic(Diagnostic::new(path.clone()));
            }

            self.add_systems(Last, write_physics_diagnostics::<T>);
        }

        self
    }
}

/// Writes the timers and counters of `T` to the [`DiagnosticsStore`](bevy::diagnostic::DiagnosticsStore).
#[cfg(feature = "bevy_diagnostic")]
fn write_physics_diagnostics<T: PhysicsDiagnostics>(
    physics_diagnostics: Res<T>,
    mut diagnostics: Diagnostics,
) {
    for (path, duration) in physics_diagnostics.timer_paths() {
        diagnostics.add_measurement(path, || duration.as_secs_f64() * 1000.0);
    }

    for (path, count) in physics_diagnostics.counter_paths() {
        diagnostics.add_measurement(path, || count as f64);
    }
}
