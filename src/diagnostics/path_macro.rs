/// A macro to generate diagnostic paths as associated constants.
///
/// # Example
///
/// The macro can be used like this:
///
/// ```ignore
/// impl_diagnostic_paths! {
///     impl IslandDiagnostics {
///         FIRST_PASS: "avian_islands/first_pass",
///         ISLAND_COUNT: "avian_islands/island_count",
///         // ...
///     }
/// }
/// ```
///
/// It expands to:
///
/// ```ignore
/// impl IslandDiagnostics {
///     pub const FIRST_PASS: &'static DiagnosticPath = &DiagnosticPath::const_new("avian_islands/first_pass");
///     pub const ISLAND_COUNT: &'static DiagnosticPath = &DiagnosticPath::const_new("avian_islands/island_count");
///     // ...
/// }
/// ```
macro_rules! impl_diagnostic_paths {
    ($(#[$meta:meta])* impl $name:ident { $($path:ident: $path_str:expr,)* }) => {
        $(#[$meta])*
        #[expect(missing_docs)]
        impl $name {
            $(
                pub const $path: &'static bevy::diagnostic::DiagnosticPath = &bevy::diagnostic::DiagnosticPath::const_new($path_str);
            )*
        }
    };
}

pub(crate) use impl_diagnostic_paths;
