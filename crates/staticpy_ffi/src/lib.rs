//! Host bindings for the static extension loader.
//!
//! # Responsibility
//! - Translate loader failures into the host's exception kinds.
//! - Provide the CPython implementation of the launcher and loader traits
//!   (`cpython` feature).
//!
//! # Invariants
//! - Functions exported to the interpreter must not panic across the C
//!   boundary.

pub mod exceptions;

#[cfg(feature = "cpython")]
pub mod cpython;

pub use exceptions::{exception_kind, ExceptionKind};
