//! Best-effort finder hook run after runtime initialization.
//!
//! # Responsibility
//! - Import the external finder module and call its init attribute once.
//! - Expose an auxiliary archive on the search path for that import only.
//!
//! # Invariants
//! - The temporary search-path entry is removed on every exit path.
//! - Failures are returned to the launcher, which reports and ignores them.

use super::HostLifecycle;
use crate::settings::{FINDER_ATTR, FINDER_MODULE};
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Runtime module search path.
pub trait SearchPath {
    type Error: Display;

    /// Inserts `entry` at the front of the search path.
    fn prepend_search_path(&self, entry: &Path) -> Result<(), Self::Error>;

    /// Adds `entry` at the end of the search path.
    fn append_search_path(&self, entry: &Path) -> Result<(), Self::Error>;

    /// Removes the first occurrence of `entry` from the search path.
    fn remove_search_path(&self, entry: &Path) -> Result<(), Self::Error>;
}

/// Keeps one search-path entry in place until dropped.
pub struct SearchPathGuard<'a, H: SearchPath + ?Sized> {
    host: &'a H,
    entry: PathBuf,
}

impl<'a, H: SearchPath + ?Sized> SearchPathGuard<'a, H> {
    pub fn prepend(host: &'a H, entry: &Path) -> Result<Self, H::Error> {
        host.prepend_search_path(entry)?;
        Ok(Self {
            host,
            entry: entry.to_path_buf(),
        })
    }
}

impl<H: SearchPath + ?Sized> Drop for SearchPathGuard<'_, H> {
    fn drop(&mut self) {
        if let Err(err) = self.host.remove_search_path(&self.entry) {
            warn!(
                "event=search_path_restore module=bootstrap status=error entry={} error={}",
                self.entry.display(),
                err
            );
        }
    }
}

/// Imports the finder module and calls its init attribute.
///
/// `archive`, when set, is on the search path only while the finder module
/// is being located.
pub fn run_finder_hook<H: HostLifecycle + ?Sized>(
    host: &H,
    archive: Option<&Path>,
) -> Result<(), FinderError<H::Error>> {
    let module = {
        let _guard = archive
            .map(|entry| SearchPathGuard::prepend(host, entry))
            .transpose()
            .map_err(FinderError::SearchPath)?;
        host.import_module(FINDER_MODULE)
            .map_err(|source| FinderError::Import {
                module: FINDER_MODULE,
                source,
            })?
    };
    host.call_attr(&module, FINDER_ATTR)
}

/// Finder hook failures.
#[derive(Debug)]
pub enum FinderError<E> {
    SearchPath(E),
    Import { module: &'static str, source: E },
    MissingAttribute { attr: &'static str, source: E },
    NotCallable { attr: &'static str },
    CallFailed { attr: &'static str, source: E },
}

impl<E: Display> Display for FinderError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SearchPath(err) => write!(f, "cannot extend module search path: {err}"),
            Self::Import { module, source } => {
                write!(f, "finder module {module} unavailable: {source}")
            }
            Self::MissingAttribute { attr, source } => {
                write!(f, "finder attribute {attr} missing: {source}")
            }
            Self::NotCallable { attr } => write!(f, "finder attribute {attr} is not callable"),
            Self::CallFailed { attr, source } => write!(f, "finder {attr}() failed: {source}"),
        }
    }
}

impl<E: Error + 'static> Error for FinderError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SearchPath(source)
            | Self::Import { source, .. }
            | Self::MissingAttribute { source, .. }
            | Self::CallFailed { source, .. } => Some(source),
            Self::NotCallable { .. } => None,
        }
    }
}
