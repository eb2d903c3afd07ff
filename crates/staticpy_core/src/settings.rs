//! Launcher settings gathered once at process start.
//!
//! # Responsibility
//! - Resolve ambient launcher configuration from the environment.
//! - Name the fixed modules and attributes the launcher and loader agree on.
//!
//! # Invariants
//! - The environment is read exactly once, before the runtime starts.
//! - Path variables are taken byte-for-byte; only an empty value is unset.
//! - The log level is trimmed; blank counts as unset.

use crate::logging::default_log_level;
use std::error::Error;
use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Reserved module name the loader operations are exposed under.
pub const LOADER_MODULE_NAME: &str = "_static_extension_utils";
/// External finder module imported after runtime initialization.
pub const FINDER_MODULE: &str = "static_extension_finder";
/// Zero-argument callable on [`FINDER_MODULE`].
pub const FINDER_ATTR: &str = "_initialize";
/// Entry-point module run at startup in archive-resident mode.
pub const ARCHIVE_MAIN_MODULE: &str = "__run_staticpy_main__";

/// Auxiliary archive prepended to the search path for the finder lookup.
pub const ENV_FINDER_ARCHIVE: &str = "STATICPY_FINDER_ARCHIVE";
/// Launcher log level (`trace|debug|info|warn|error`).
pub const ENV_LOG_LEVEL: &str = "STATICPY_LOG_LEVEL";
/// Absolute directory for rolling launcher logs.
pub const ENV_LOG_DIR: &str = "STATICPY_LOG_DIR";

/// Level used when logs go to stderr and no level is configured.
pub const STDERR_LOG_LEVEL: &str = "warn";

/// Resolved launcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    /// Executable doubles as an importable archive.
    pub archive_mode: bool,
    /// Path of the running executable; set in archive mode.
    pub executable: Option<PathBuf>,
    pub finder_archive: Option<PathBuf>,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

impl LaunchSettings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    /// - Returns an error when archive mode is compiled in and the running
    ///   executable cannot be located.
    pub fn from_env() -> Result<Self, SettingsError> {
        let archive_mode = cfg!(feature = "archive");
        let mut settings = Self::from_lookup(|key| std::env::var_os(key), archive_mode);
        if archive_mode {
            let executable = std::env::current_exe().map_err(SettingsError::CurrentExe)?;
            settings.executable = Some(executable);
        }
        Ok(settings)
    }

    /// Builds settings from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>, archive_mode: bool) -> Self {
        let path = |key: &str| {
            lookup(key)
                .filter(|raw| !raw.is_empty())
                .map(PathBuf::from)
        };
        let log_level = lookup(ENV_LOG_LEVEL).and_then(|raw| {
            let trimmed = raw.to_string_lossy().trim().to_string();
            (!trimmed.is_empty()).then_some(trimmed)
        });

        let log_dir = path(ENV_LOG_DIR);
        // stderr belongs to the interpreter; stay quiet there unless asked.
        let fallback_level = if log_dir.is_some() {
            default_log_level()
        } else {
            STDERR_LOG_LEVEL
        };

        Self {
            archive_mode,
            executable: None,
            finder_archive: path(ENV_FINDER_ARCHIVE),
            log_level: log_level.unwrap_or_else(|| fallback_level.to_string()),
            log_dir,
        }
    }

    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = Some(executable.into());
        self
    }
}

/// Settings resolution errors.
#[derive(Debug)]
pub enum SettingsError {
    CurrentExe(std::io::Error),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CurrentExe(err) => write!(f, "cannot locate the running executable: {err}"),
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CurrentExe(err) => Some(err),
        }
    }
}
