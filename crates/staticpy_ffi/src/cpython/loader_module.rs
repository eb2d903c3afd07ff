//! The `_static_extension_utils` built-in module.
//!
//! # Responsibility
//! - Expose the static loader operations to the interpreter's import system.
//! - Own the process-wide extension registry installed at bootstrap.
//!
//! # Invariants
//! - The registry is installed at most once, before the interpreter starts.
//! - Every entry point returns a new reference, or null with an exception set.

use super::object::{new_text, PyHandle, PythonError};
use super::runtime::{CPythonRuntime, InitFn};
use crate::exceptions::{exception_kind, ExceptionKind};
use log::error;
use once_cell::sync::{Lazy, OnceCell};
use pyo3::ffi;
use staticpy_core::{LoaderError, StaticExtensionRegistry, StaticLoader};
use std::ffi::{c_long, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr::{self, addr_of_mut};

static LOADER_REGISTRY: OnceCell<StaticExtensionRegistry<InitFn>> = OnceCell::new();

pub(crate) fn install_registry(
    registry: StaticExtensionRegistry<InitFn>,
) -> Result<(), StaticExtensionRegistry<InitFn>> {
    LOADER_REGISTRY.set(registry)
}

fn registry() -> &'static StaticExtensionRegistry<InitFn> {
    static EMPTY: Lazy<StaticExtensionRegistry<InitFn>> =
        Lazy::new(StaticExtensionRegistry::empty);
    LOADER_REGISTRY.get().unwrap_or(&EMPTY)
}

const fn method(
    name: &'static CStr,
    meth: ffi::PyCFunction,
    flags: std::ffi::c_int,
    doc: &'static CStr,
) -> ffi::PyMethodDef {
    ffi::PyMethodDef {
        ml_name: name.as_ptr(),
        ml_meth: ffi::PyMethodDefPointer { PyCFunction: meth },
        ml_flags: flags,
        ml_doc: doc.as_ptr(),
    }
}

static mut LOADER_METHODS: [ffi::PyMethodDef; 6] = [
    method(
        c"create_module",
        create_module,
        ffi::METH_O,
        c"create_module(spec)\n--\n\nCreate the statically linked extension named by spec.",
    ),
    method(
        c"exec_module",
        exec_module,
        ffi::METH_O,
        c"exec_module(module)\n--\n\nRun the execution slots of a multi-phase module.",
    ),
    method(
        c"get_source",
        get_source,
        ffi::METH_O,
        c"get_source(name)\n--\n\nStatic extensions have no source; always None.",
    ),
    method(
        c"is_registered",
        is_registered,
        ffi::METH_O,
        c"is_registered(name)\n--\n\nWhether name is linked into this executable.",
    ),
    method(
        c"registered_names",
        registered_names,
        ffi::METH_NOARGS,
        c"registered_names()\n--\n\nSorted names of the linked extensions.",
    ),
    ffi::PyMethodDef::zeroed(),
];

static mut LOADER_MODULE_DEF: ffi::PyModuleDef = ffi::PyModuleDef {
    m_base: ffi::PyModuleDef_HEAD_INIT,
    m_name: c"_static_extension_utils".as_ptr(),
    m_doc: c"Loader for extension modules linked into the executable.".as_ptr(),
    m_size: -1,
    m_methods: ptr::null_mut(),
    m_slots: ptr::null_mut(),
    m_traverse: None,
    m_clear: None,
    m_free: None,
};

/// Init function registered in the interpreter's built-in module table.
#[no_mangle]
#[allow(non_snake_case)]
pub extern "C" fn PyInit__static_extension_utils() -> *mut ffi::PyObject {
    unsafe {
        let def = addr_of_mut!(LOADER_MODULE_DEF);
        (*def).m_methods = addr_of_mut!(LOADER_METHODS).cast();
        ffi::PyModule_Create(def)
    }
}

/// Runs one entry point, converting a panic into `SystemError`.
fn entry_point(
    body: impl FnOnce(StaticLoader<'_, CPythonRuntime>) -> *mut ffi::PyObject,
) -> *mut ffi::PyObject {
    // Entry points are only reachable from interpreter calls, under the GIL.
    let runtime = unsafe { CPythonRuntime::assume_gil() };
    let loader = StaticLoader::new(&runtime, registry());
    match catch_unwind(AssertUnwindSafe(|| body(loader))) {
        Ok(result) => result,
        Err(_) => {
            error!("event=loader_call module=ffi status=panic");
            unsafe {
                PythonError::raise(ffi::PyExc_SystemError, "static extension loader panicked")
                    .restore();
            }
            ptr::null_mut()
        }
    }
}

fn raise_loader_error(err: LoaderError<PythonError>) -> *mut ffi::PyObject {
    unsafe {
        match err {
            LoaderError::Host(source) => source.restore(),
            err => {
                let exception = match exception_kind(&err) {
                    ExceptionKind::TypeError => ffi::PyExc_TypeError,
                    ExceptionKind::ImportError | ExceptionKind::Pending => ffi::PyExc_ImportError,
                };
                PythonError::raise(exception, &err.to_string()).restore();
            }
        }
    }
    ptr::null_mut()
}

unsafe fn none() -> *mut ffi::PyObject {
    let none = ffi::Py_None();
    ffi::Py_INCREF(none);
    none
}

extern "C" fn create_module(
    _module: *mut ffi::PyObject,
    spec: *mut ffi::PyObject,
) -> *mut ffi::PyObject {
    entry_point(|loader| {
        let Some(spec) = (unsafe { PyHandle::from_borrowed(spec) }) else {
            return ptr::null_mut();
        };
        match loader.create_module(&spec) {
            Ok(module) => module.into_ptr(),
            Err(err) => raise_loader_error(err),
        }
    })
}

extern "C" fn exec_module(
    _module: *mut ffi::PyObject,
    target: *mut ffi::PyObject,
) -> *mut ffi::PyObject {
    entry_point(|loader| {
        let Some(target) = (unsafe { PyHandle::from_borrowed(target) }) else {
            return ptr::null_mut();
        };
        match loader.exec_module(&target) {
            Ok(()) => unsafe { none() },
            Err(err) => raise_loader_error(err),
        }
    })
}

extern "C" fn get_source(
    _module: *mut ffi::PyObject,
    name: *mut ffi::PyObject,
) -> *mut ffi::PyObject {
    entry_point(|loader| {
        let Some(name) = (unsafe { PyHandle::from_borrowed(name) }) else {
            return ptr::null_mut();
        };
        match loader.get_source(&name) {
            Some(source) => match unsafe { new_text(&source) } {
                Ok(source) => source.into_ptr(),
                Err(err) => raise_loader_error(LoaderError::Host(err)),
            },
            None => unsafe { none() },
        }
    })
}

extern "C" fn is_registered(
    _module: *mut ffi::PyObject,
    name: *mut ffi::PyObject,
) -> *mut ffi::PyObject {
    entry_point(|loader| {
        let Some(name) = (unsafe { PyHandle::from_borrowed(name) }) else {
            return ptr::null_mut();
        };
        match loader.is_registered(&name) {
            Ok(found) => unsafe { ffi::PyBool_FromLong(c_long::from(found)) },
            Err(err) => raise_loader_error(err),
        }
    })
}

extern "C" fn registered_names(
    _module: *mut ffi::PyObject,
    _args: *mut ffi::PyObject,
) -> *mut ffi::PyObject {
    entry_point(|loader| unsafe {
        let list = match PyHandle::owned_or_err(ffi::PyList_New(0)) {
            Ok(list) => list,
            Err(err) => return raise_loader_error(LoaderError::Host(err)),
        };
        for name in loader.registered_names() {
            let appended = new_text(&name).and_then(|name| {
                if ffi::PyList_Append(list.as_ptr(), name.as_ptr()) != 0 {
                    Err(PythonError::fetch())
                } else {
                    Ok(())
                }
            });
            if let Err(err) = appended {
                return raise_loader_error(LoaderError::Host(err));
            }
        }
        list.into_ptr()
    })
}
