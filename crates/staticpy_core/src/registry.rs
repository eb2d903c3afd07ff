//! Static extension registry: extension name to native init function.
//!
//! # Responsibility
//! - Hold the build-time table of statically linked extension modules.
//! - Answer membership and lookup queries for the loader and the finder.
//!
//! # Invariants
//! - Names are dotted module names and unique within one registry.
//! - A built registry exposes no mutation; it is frozen for the process.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

static MODULE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("valid module name regex")
});

/// Immutable name→init-function table.
///
/// `F` is the host's native init function pointer type. Lookups hand out
/// copies of the pointer, never references into the table.
#[derive(Debug, Clone)]
pub struct StaticExtensionRegistry<F> {
    entries: BTreeMap<String, F>,
}

impl<F: Copy> StaticExtensionRegistry<F> {
    /// Registry with no extensions.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Builds a registry from the build-time `(name, init)` table.
    ///
    /// # Errors
    /// - Returns an error for the first invalid or duplicated name.
    pub fn from_table(table: &[(&str, F)]) -> Result<Self, RegistryError> {
        let mut builder = RegistryBuilder::new();
        for (name, init) in table {
            builder.insert(name, *init)?;
        }
        Ok(builder.build())
    }

    /// Returns the init function registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<F> {
        self.entries.get(name).copied()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Accumulates entries before the registry is frozen.
#[derive(Debug)]
pub struct RegistryBuilder<F> {
    entries: BTreeMap<String, F>,
}

impl<F: Copy> Default for RegistryBuilder<F> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<F: Copy> RegistryBuilder<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one extension entry.
    pub fn insert(&mut self, name: &str, init: F) -> Result<(), RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if !is_valid_module_name(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if self.entries.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        self.entries.insert(name.to_string(), init);
        Ok(())
    }

    pub fn build(self) -> StaticExtensionRegistry<F> {
        StaticExtensionRegistry {
            entries: self.entries,
        }
    }
}

/// Returns whether `name` follows the dotted module-name convention.
pub fn is_valid_module_name(name: &str) -> bool {
    MODULE_NAME_RE.is_match(name)
}

/// Registry construction errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    EmptyName,
    InvalidName(String),
    DuplicateName(String),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "static extension name must not be empty"),
            Self::InvalidName(value) => {
                write!(f, "static extension name is not a module name: {value}")
            }
            Self::DuplicateName(value) => {
                write!(f, "static extension already registered: {value}")
            }
        }
    }
}

impl Error for RegistryError {}
