//! Embedded-interpreter bootstrap and static extension loader.
//! Host-independent: every runtime interaction goes through the traits in
//! [`host`] and [`bootstrap`].

pub mod bootstrap;
pub mod host;
pub mod loader;
pub mod logging;
pub mod package_context;
pub mod registry;
pub mod settings;

pub use bootstrap::finder::{run_finder_hook, FinderError, SearchPath, SearchPathGuard};
pub use bootstrap::{
    ConfigFailure, ConfigResult, HostLifecycle, LaunchError, Launcher,
    BOOTSTRAP_FAILURE_EXIT_CODE,
};
pub use host::{HostRuntime, InitResult, ModuleSpec};
pub use loader::{LoaderError, StaticLoader};
pub use logging::{default_log_level, init_logging, logging_status};
pub use package_context::{with_package_context, PackageContextSlot};
pub use registry::{RegistryBuilder, RegistryError, StaticExtensionRegistry};
pub use settings::{
    LaunchSettings, SettingsError, ARCHIVE_MAIN_MODULE, ENV_FINDER_ARCHIVE, ENV_LOG_DIR,
    ENV_LOG_LEVEL, FINDER_ATTR, FINDER_MODULE, LOADER_MODULE_NAME, STDERR_LOG_LEVEL,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
