//! Loader-facing contract of the embedded host runtime.
//!
//! # Responsibility
//! - Describe the runtime operations the static loader needs, and nothing
//!   else: spec reading, init invocation, module materialization and the
//!   extension cache.
//!
//! # Invariants
//! - `Object` handles own one runtime reference each and release it on drop.
//! - Every `Err` carries the runtime's pending error, already taken out of the
//!   runtime's error indicator.

use crate::package_context::PackageContextSlot;
use std::fmt::Display;

/// Fields of an import spec the loader reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    pub name: String,
    pub origin: Option<String>,
}

impl ModuleSpec {
    pub fn new(name: impl Into<String>, origin: Option<String>) -> Self {
        Self {
            name: name.into(),
            origin,
        }
    }
}

/// Classified value returned by a native init function.
#[derive(Debug)]
pub enum InitResult<M, D> {
    /// Multi-phase init: a definition to materialize against the spec.
    Definition(D),
    /// Single-phase init: a ready module object.
    Legacy(M),
}

/// Runtime operations backing the static extension loader.
pub trait HostRuntime: PackageContextSlot {
    /// Owned handle to a runtime value.
    type Object;
    /// Handle to a module definition.
    type Definition;
    /// Native extension init function pointer.
    type InitFn: Copy;
    /// Captured runtime error.
    type Error: Display;

    /// Reads `name` and `origin` from an import spec.
    fn read_spec(&self, spec: &Self::Object) -> Result<ModuleSpec, Self::Error>;

    /// Returns the extension object already cached under `name`, if any.
    fn find_cached_extension(&self, name: &str) -> Result<Option<Self::Object>, Self::Error>;

    /// Invokes `init` and classifies its result.
    ///
    /// `Err` means the init function signalled failure.
    fn call_init(
        &self,
        init: Self::InitFn,
    ) -> Result<InitResult<Self::Object, Self::Definition>, Self::Error>;

    /// Creates a module from a definition and the import spec.
    fn materialize(
        &self,
        definition: &Self::Definition,
        spec: &Self::Object,
    ) -> Result<Self::Object, Self::Error>;

    /// Sets the `__file__` attribute of a module.
    fn set_file_attr(&self, module: &Self::Object, origin: &str) -> Result<(), Self::Error>;

    /// Returns the definition attached to a module object.
    fn module_definition(&self, module: &Self::Object) -> Option<Self::Definition>;

    /// Stamps the definition's base-init slot.
    fn set_base_init(&self, definition: &Self::Definition, init: Self::InitFn);

    /// Records a single-phase module in the runtime's module cache.
    fn cache_extension(&self, name: &str, module: &Self::Object) -> Result<(), Self::Error>;

    /// Whether `value` is a module object.
    fn is_module(&self, value: &Self::Object) -> bool;

    /// Runs the definition's execution slots against the module.
    fn exec_definition(
        &self,
        module: &Self::Object,
        definition: &Self::Definition,
    ) -> Result<(), Self::Error>;

    /// Returns the text of a string value, `None` for any other type.
    fn text_value(&self, value: &Self::Object) -> Option<String>;
}
