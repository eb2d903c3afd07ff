//! Static extension loader operations.
//!
//! # Responsibility
//! - Implement `create_module`, `exec_module` and `get_source` for extensions
//!   linked into the executable, plus the `is_registered` membership query.
//! - Adapt single-phase and multi-phase init results into the host's module
//!   cache.
//!
//! # Invariants
//! - A name already present in the extension cache is never re-initialized.
//! - The package-context slot is restored before `create_module` returns,
//!   whatever the outcome.
//! - Import failures are returned to the caller, not logged as errors.

use crate::host::{HostRuntime, InitResult, ModuleSpec};
use crate::package_context::with_package_context;
use crate::registry::StaticExtensionRegistry;
use log::debug;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Loader bound to one host runtime and the process registry.
pub struct StaticLoader<'a, R: HostRuntime> {
    runtime: &'a R,
    registry: &'a StaticExtensionRegistry<R::InitFn>,
}

impl<'a, R: HostRuntime> StaticLoader<'a, R> {
    pub fn new(runtime: &'a R, registry: &'a StaticExtensionRegistry<R::InitFn>) -> Self {
        Self { runtime, registry }
    }

    /// Creates (or returns the cached) module for an import spec.
    ///
    /// # Errors
    /// - `UnknownModule` when the name is not in the registry.
    /// - `InitFailed` when the init function signals failure.
    /// - `MissingDefinition` when a single-phase module has no definition.
    /// - `Host` for runtime failures reading the spec, materializing or
    ///   caching the module.
    pub fn create_module(&self, spec: &R::Object) -> Result<R::Object, LoaderError<R::Error>> {
        let ModuleSpec { name, origin } = self.runtime.read_spec(spec).map_err(LoaderError::Host)?;

        if let Some(cached) = self
            .runtime
            .find_cached_extension(&name)
            .map_err(LoaderError::Host)?
        {
            debug!("event=create_module module=loader status=cache_hit name={name}");
            return Ok(cached);
        }

        let Some(init) = self.registry.lookup(&name) else {
            debug!("event=create_module module=loader status=unknown name={name}");
            return Err(LoaderError::UnknownModule(name));
        };

        let outcome = with_package_context(self.runtime, &name, || self.runtime.call_init(init));
        let init_result = match outcome {
            Ok(value) => value,
            Err(source) => {
                debug!("event=create_module module=loader status=init_failed name={name}");
                return Err(LoaderError::InitFailed { name, source });
            }
        };

        match init_result {
            InitResult::Definition(definition) => {
                debug!("event=create_module module=loader status=materialize name={name}");
                self.runtime
                    .materialize(&definition, spec)
                    .map_err(LoaderError::Host)
            }
            InitResult::Legacy(module) => {
                self.adopt_single_phase(&name, origin.as_deref(), module, init)
            }
        }
    }

    /// Executes a module's definition slots; no-op for anything else.
    pub fn exec_module(&self, module: &R::Object) -> Result<(), LoaderError<R::Error>> {
        if !self.runtime.is_module(module) {
            return Ok(());
        }
        let Some(definition) = self.runtime.module_definition(module) else {
            return Ok(());
        };
        self.runtime
            .exec_definition(module, &definition)
            .map_err(LoaderError::Host)
    }

    /// Statically linked extensions never carry source text.
    pub fn get_source(&self, _name: &R::Object) -> Option<String> {
        None
    }

    /// Reports registry membership of a name value.
    ///
    /// # Errors
    /// - `NotText` when `name` is not a string value.
    pub fn is_registered(&self, name: &R::Object) -> Result<bool, LoaderError<R::Error>> {
        let text = self.runtime.text_value(name).ok_or(LoaderError::NotText)?;
        Ok(self.registry.is_registered(&text))
    }

    /// Names of all statically linked extensions, sorted.
    pub fn registered_names(&self) -> Vec<String> {
        self.registry.names().map(str::to_string).collect()
    }

    fn adopt_single_phase(
        &self,
        name: &str,
        origin: Option<&str>,
        module: R::Object,
        init: R::InitFn,
    ) -> Result<R::Object, LoaderError<R::Error>> {
        if let Some(origin) = origin {
            if let Err(err) = self.runtime.set_file_attr(&module, origin) {
                debug!(
                    "event=create_module module=loader status=file_attr_skipped name={name} error={err}"
                );
            }
        }

        let Some(definition) = self.runtime.module_definition(&module) else {
            return Err(LoaderError::MissingDefinition(name.to_string()));
        };
        self.runtime.set_base_init(&definition, init);

        self.runtime
            .cache_extension(name, &module)
            .map_err(LoaderError::Host)?;
        debug!("event=create_module module=loader status=cached name={name}");
        Ok(module)
    }
}

/// Loader operation failures.
#[derive(Debug)]
pub enum LoaderError<E> {
    UnknownModule(String),
    InitFailed { name: String, source: E },
    MissingDefinition(String),
    NotText,
    Host(E),
}

impl<E> LoaderError<E> {
    /// Whether the host should surface this failure as an import error.
    pub fn is_import_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownModule(_) | Self::InitFailed { .. } | Self::MissingDefinition(_)
        )
    }
}

impl<E: Display> Display for LoaderError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownModule(name) => {
                write!(f, "module {name} is unknown to the static extension loader")
            }
            Self::InitFailed { name, source } => {
                write!(f, "initialization of static extension {name} failed: {source}")
            }
            Self::MissingDefinition(name) => {
                write!(f, "static extension {name} returned a module without a definition")
            }
            Self::NotText => write!(f, "static extension name must be a str"),
            Self::Host(err) => write!(f, "{err}"),
        }
    }
}

impl<E: Error + 'static> Error for LoaderError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InitFailed { source, .. } => Some(source),
            Self::Host(err) => Some(err),
            Self::UnknownModule(_) | Self::MissingDefinition(_) | Self::NotText => None,
        }
    }
}
