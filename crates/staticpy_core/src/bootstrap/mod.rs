//! Bootstrap launcher: configure, initialize and hand off to the runtime.
//!
//! # Responsibility
//! - Build the runtime configuration from process arguments.
//! - Register the static extension registry before initialization.
//! - Run the best-effort finder hook, then enter the runtime's main loop.
//!
//! # Invariants
//! - Configuration resources are released before any exit-coded or fatal
//!   outcome is acted upon, and before the main loop starts.
//! - Finder hook failures never abort bootstrap.

pub mod finder;

use crate::registry::StaticExtensionRegistry;
use crate::settings::{LaunchSettings, ARCHIVE_MAIN_MODULE, LOADER_MODULE_NAME};
use finder::{run_finder_hook, FinderError, SearchPath};
use log::{debug, error, info};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::ffi::{OsStr, OsString};
use std::io::Write;

/// Exit status for bootstrap failures the runtime cannot report itself:
/// invalid launcher settings, a bad extension table, loader registration.
pub const BOOTSTRAP_FAILURE_EXIT_CODE: i32 = 1;

/// Non-success outcome of one configuration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigFailure<S> {
    /// The runtime asked for the process to exit with this code.
    Exit(i32),
    /// Unexpected failure; reported through the runtime's fatal path.
    Fatal(S),
}

pub type ConfigResult<S> = Result<(), ConfigFailure<S>>;

/// Launcher-facing contract of the embedded host runtime.
pub trait HostLifecycle: SearchPath {
    /// Runtime configuration, released on drop.
    type Config;
    /// Configuration failure status without an exit code.
    type Status: Debug;
    /// Native extension init function pointer.
    type InitFn: Copy;
    /// Imported module handle.
    type Module;

    fn new_config(&self) -> Self::Config;

    /// Whether argv must be populated before ambient configuration is read.
    fn argv_before_read(&self) -> bool {
        true
    }

    fn set_program_name(&self, config: &mut Self::Config, program: &OsStr)
        -> ConfigResult<Self::Status>;

    /// Hands the raw process arguments to the runtime.
    fn set_argv(&self, config: &mut Self::Config, args: &[OsString])
        -> ConfigResult<Self::Status>;

    /// Reads ambient configuration (environment, configuration files).
    fn read_config(&self, config: &mut Self::Config) -> ConfigResult<Self::Status>;

    /// Designates the module run at startup instead of a script argument.
    fn set_run_module(&self, config: &mut Self::Config, module: &str)
        -> ConfigResult<Self::Status>;

    /// Adds the loader module to the runtime's native-module table.
    fn register_loader_module(
        &self,
        name: &'static str,
        registry: StaticExtensionRegistry<Self::InitFn>,
    ) -> Result<(), Self::Error>;

    fn initialize(&self, config: &Self::Config) -> ConfigResult<Self::Status>;

    fn import_module(&self, name: &str) -> Result<Self::Module, Self::Error>;

    /// Calls `module.attr()` with no arguments.
    fn call_attr(&self, module: &Self::Module, attr: &'static str)
        -> Result<(), FinderError<Self::Error>>;

    /// Runs the runtime's standard main loop and returns its exit status.
    fn run_main(&self) -> i32;

    /// Reports a fatal configuration status and terminates the process.
    fn exit_with_status(&self, status: Self::Status) -> !;
}

/// Launcher for one process.
pub struct Launcher<H: HostLifecycle> {
    host: H,
    registry: StaticExtensionRegistry<H::InitFn>,
    settings: LaunchSettings,
    diagnostics: Box<dyn Write>,
}

impl<H: HostLifecycle> Launcher<H> {
    pub fn new(
        host: H,
        registry: StaticExtensionRegistry<H::InitFn>,
        settings: LaunchSettings,
    ) -> Self {
        Self {
            host,
            registry,
            settings,
            diagnostics: Box::new(std::io::stderr()),
        }
    }

    /// Redirects user-facing diagnostics (stderr by default).
    pub fn with_diagnostics(mut self, diagnostics: Box<dyn Write>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Runs bootstrap and translates every outcome into a process exit code.
    ///
    /// Fatal configuration failures do not return.
    pub fn main(mut self, args: &[OsString]) -> i32 {
        match self.run(args) {
            Ok(code) => code,
            Err(LaunchError::Exit(code)) => code,
            Err(LaunchError::Fatal(status)) => self.host.exit_with_status(status),
            Err(err @ (LaunchError::Registration(_) | LaunchError::SearchPath(_))) => {
                let _ = writeln!(self.diagnostics, "fatal: {err}");
                BOOTSTRAP_FAILURE_EXIT_CODE
            }
        }
    }

    /// Configures and initializes the runtime, runs the finder hook, then
    /// runs the main loop.
    ///
    /// # Errors
    /// - `Exit` / `Fatal` for configuration or initialization failures.
    /// - `Registration` when the loader module cannot be registered.
    /// - `SearchPath` when archive mode cannot put the executable on the
    ///   initialized search path.
    pub fn run(&mut self, args: &[OsString]) -> Result<i32, LaunchError<H::Status, H::Error>> {
        let mut config = self.host.new_config();
        self.configure(&mut config, args)?;

        let registry = std::mem::replace(&mut self.registry, StaticExtensionRegistry::empty());
        let extension_count = registry.len();
        self.host
            .register_loader_module(LOADER_MODULE_NAME, registry)
            .map_err(LaunchError::Registration)?;
        debug!(
            "event=loader_register module=bootstrap status=ok name={LOADER_MODULE_NAME} extensions={extension_count}"
        );

        self.host.initialize(&config).map_err(launch_failure)?;
        info!("event=runtime_init module=bootstrap status=ok");

        if self.settings.archive_mode {
            self.expose_executable()?;
        }

        if let Err(err) = run_finder_hook(&self.host, self.settings.finder_archive.as_deref()) {
            // Bootstrap continues without the finder.
            debug!("event=finder_hook module=bootstrap status=skipped error={err}");
            let _ = writeln!(self.diagnostics, "warning: {err}");
        }

        drop(config);
        Ok(self.host.run_main())
    }

    fn configure(
        &self,
        config: &mut H::Config,
        args: &[OsString],
    ) -> Result<(), LaunchError<H::Status, H::Error>> {
        let program = args.first().map(OsString::as_os_str).unwrap_or_default();
        self.host
            .set_program_name(config, program)
            .map_err(launch_failure)?;

        if self.host.argv_before_read() {
            self.host.set_argv(config, args).map_err(launch_failure)?;
            self.host.read_config(config).map_err(launch_failure)?;
        } else {
            self.host.read_config(config).map_err(launch_failure)?;
            self.host.set_argv(config, args).map_err(launch_failure)?;
        }

        if self.settings.archive_mode {
            self.host
                .set_run_module(config, ARCHIVE_MAIN_MODULE)
                .map_err(launch_failure)?;
        }
        Ok(())
    }

    /// Appends the executable to the computed search path so the archive
    /// entry module resolves from it.
    fn expose_executable(&self) -> Result<(), LaunchError<H::Status, H::Error>> {
        let Some(executable) = self.settings.executable.as_deref() else {
            error!("event=archive_mode module=bootstrap status=error reason=no_executable");
            return Ok(());
        };
        self.host
            .append_search_path(executable)
            .map_err(LaunchError::SearchPath)?;
        debug!(
            "event=archive_mode module=bootstrap status=ok entry={}",
            executable.display()
        );
        Ok(())
    }
}

fn launch_failure<S, E>(failure: ConfigFailure<S>) -> LaunchError<S, E> {
    match failure {
        ConfigFailure::Exit(code) => LaunchError::Exit(code),
        ConfigFailure::Fatal(status) => LaunchError::Fatal(status),
    }
}

/// Bootstrap failures that stop the launcher before the main loop.
#[derive(Debug)]
pub enum LaunchError<S, E> {
    Exit(i32),
    Fatal(S),
    Registration(E),
    SearchPath(E),
}

impl<S: Debug, E: Display> Display for LaunchError<S, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exit(code) => write!(f, "runtime configuration requested exit with code {code}"),
            Self::Fatal(status) => write!(f, "runtime configuration failed: {status:?}"),
            Self::Registration(err) => {
                write!(f, "cannot register {LOADER_MODULE_NAME}: {err}")
            }
            Self::SearchPath(err) => {
                write!(f, "cannot add the executable to the search path: {err}")
            }
        }
    }
}

impl<S: Debug, E: Error + 'static> Error for LaunchError<S, E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registration(err) | Self::SearchPath(err) => Some(err),
            Self::Exit(_) | Self::Fatal(_) => None,
        }
    }
}
