//! CPython backend.
//!
//! # Responsibility
//! - Implement [`staticpy_core::HostLifecycle`] and [`staticpy_core::HostRuntime`]
//!   on the CPython embedding API.
//! - Provide [`launch`], the whole-process entry point used by the launcher
//!   binary.

pub mod lifecycle;
pub mod loader_module;
pub mod object;
pub mod runtime;

pub use lifecycle::{CPythonLifecycle, ConfigStatus, PyConfigBox};
pub use object::{PyHandle, PythonError};
pub use pyo3::ffi;
pub use runtime::{CPythonRuntime, InitFn, ModuleDefPtr};

use log::error;
use staticpy_core::{
    init_logging, LaunchSettings, Launcher, StaticExtensionRegistry, BOOTSTRAP_FAILURE_EXIT_CODE,
};

/// Declares the `PyInit_*` symbols of statically linked extensions and a
/// `(name, init)` table for [`launch`].
///
/// ```ignore
/// staticpy_ffi::declare_static_extensions! {
///     pub static STATIC_EXTENSIONS = {
///         "mathx" => PyInit_mathx,
///         "pkg._speedups" => PyInit__speedups,
///     };
/// }
/// ```
#[macro_export]
macro_rules! declare_static_extensions {
    ($vis:vis static $table:ident = { $($name:literal => $init:ident),* $(,)? };) => {
        #[allow(non_snake_case)]
        extern "C" {
            $( fn $init() -> *mut $crate::cpython::ffi::PyObject; )*
        }

        $vis static $table: &[(&str, $crate::cpython::InitFn)] = &[
            $( ($name, $init as $crate::cpython::InitFn), )*
        ];
    };
}

/// Boots the interpreter with `table` registered and runs it to completion.
///
/// Returns the process exit status. Fatal configuration failures terminate
/// the process from inside the runtime.
pub fn launch(table: &[(&str, InitFn)]) -> i32 {
    let settings = match LaunchSettings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("fatal: {err}");
            return BOOTSTRAP_FAILURE_EXIT_CODE;
        }
    };
    if let Err(err) = init_logging(&settings.log_level, settings.log_dir.as_deref()) {
        eprintln!("warning: launcher logging disabled: {err}");
    }

    let registry = match StaticExtensionRegistry::from_table(table) {
        Ok(registry) => registry,
        Err(err) => {
            error!("event=registry_build module=ffi status=error error={err}");
            eprintln!("fatal: {err}");
            return BOOTSTRAP_FAILURE_EXIT_CODE;
        }
    };

    let args = std::env::args_os().collect::<Vec<_>>();
    Launcher::new(CPythonLifecycle, registry, settings).main(&args)
}
