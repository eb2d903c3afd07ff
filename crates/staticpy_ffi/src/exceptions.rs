//! Loader error to interpreter exception mapping.

use staticpy_core::LoaderError;

/// Exception raised back into the interpreter for a loader failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    /// `ImportError` carrying the loader's message.
    ImportError,
    /// `TypeError` carrying the loader's message.
    TypeError,
    /// Re-raise the interpreter error captured by the host.
    Pending,
}

impl ExceptionKind {
    /// Interpreter-level exception class name.
    pub fn class_name(self) -> Option<&'static str> {
        match self {
            Self::ImportError => Some("ImportError"),
            Self::TypeError => Some("TypeError"),
            Self::Pending => None,
        }
    }
}

/// Picks the exception used to report `err`.
///
/// Init failures are surfaced as `ImportError` whose message embeds the
/// original error text; runtime failures outside the init call keep their
/// original exception.
pub fn exception_kind<E>(err: &LoaderError<E>) -> ExceptionKind {
    match err {
        LoaderError::UnknownModule(_)
        | LoaderError::InitFailed { .. }
        | LoaderError::MissingDefinition(_) => ExceptionKind::ImportError,
        LoaderError::NotText => ExceptionKind::TypeError,
        LoaderError::Host(_) => ExceptionKind::Pending,
    }
}
