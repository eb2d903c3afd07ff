//! Launcher-facing CPython operations: configuration, initialization and
//! the post-init search path.
//!
//! Methods that touch interpreter objects run after `initialize` on the main
//! thread, which holds the GIL from then on.

use super::loader_module::{install_registry, PyInit__static_extension_utils};
use super::object::{PyHandle, PythonError};
use super::runtime::InitFn;
use pyo3::ffi;
use staticpy_core::{
    ConfigFailure, ConfigResult, FinderError, HostLifecycle, SearchPath, StaticExtensionRegistry,
};
use std::ffi::{c_char, CStr, CString, OsStr, OsString};
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::ptr::{self, addr_of_mut};

/// CPython embedding API.
pub struct CPythonLifecycle;

/// Owned `PyConfig`, cleared on drop.
pub struct PyConfigBox(Box<ffi::PyConfig>);

impl PyConfigBox {
    fn as_mut_ptr(&mut self) -> *mut ffi::PyConfig {
        &mut *self.0
    }
}

impl Drop for PyConfigBox {
    fn drop(&mut self) {
        unsafe { ffi::PyConfig_Clear(&mut *self.0) }
    }
}

/// Failed `PyStatus` without an exit code.
pub struct ConfigStatus(ffi::PyStatus);

impl Debug for ConfigStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = |ptr: *const c_char| {
            if ptr.is_null() {
                None
            } else {
                Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
            }
        };
        f.debug_struct("ConfigStatus")
            .field("func", &text(self.0.func))
            .field("err_msg", &text(self.0.err_msg))
            .finish()
    }
}

fn check(status: ffi::PyStatus) -> ConfigResult<ConfigStatus> {
    unsafe {
        if ffi::PyStatus_Exception(status) == 0 {
            return Ok(());
        }
        if ffi::PyStatus_IsExit(status) != 0 {
            return Err(ConfigFailure::Exit(status.exitcode));
        }
    }
    Err(ConfigFailure::Fatal(ConfigStatus(status)))
}

fn config_error(message: &'static CStr) -> ConfigFailure<ConfigStatus> {
    ConfigFailure::Fatal(ConfigStatus(unsafe { ffi::PyStatus_Error(message.as_ptr()) }))
}

fn config_text(text: &str) -> Result<CString, ConfigFailure<ConfigStatus>> {
    CString::new(text).map_err(|_| config_error(c"configuration value contains a NUL byte"))
}

/// Raw bytes of an OS string as the runtime's byte-oriented setters take them.
#[cfg(unix)]
fn os_bytes(value: &OsStr) -> Option<CString> {
    use std::os::unix::ffi::OsStrExt;
    CString::new(value.as_bytes()).ok()
}

#[cfg(not(unix))]
fn os_bytes(value: &OsStr) -> Option<CString> {
    CString::new(value.to_string_lossy().into_owned()).ok()
}

fn config_bytes(value: &OsStr) -> Result<CString, ConfigFailure<ConfigStatus>> {
    os_bytes(value).ok_or_else(|| config_error(c"configuration value contains a NUL byte"))
}

/// Borrowed `sys.path`.
unsafe fn sys_path() -> Result<*mut ffi::PyObject, PythonError> {
    let path = ffi::PySys_GetObject(c"path".as_ptr());
    if path.is_null() {
        return Err(PythonError::raise(
            ffi::PyExc_RuntimeError,
            "sys.path is not available",
        ));
    }
    Ok(path)
}

unsafe fn path_entry(entry: &Path) -> Result<PyHandle, PythonError> {
    let Some(raw) = os_bytes(entry.as_os_str()) else {
        return Err(PythonError::raise(
            ffi::PyExc_ValueError,
            "search path entry contains a NUL byte",
        ));
    };
    PyHandle::owned_or_err(ffi::PyUnicode_DecodeFSDefault(raw.as_ptr()))
}

impl SearchPath for CPythonLifecycle {
    type Error = PythonError;

    fn prepend_search_path(&self, entry: &Path) -> Result<(), PythonError> {
        unsafe {
            let path = sys_path()?;
            let entry = path_entry(entry)?;
            if ffi::PyList_Insert(path, 0, entry.as_ptr()) != 0 {
                return Err(PythonError::fetch());
            }
            Ok(())
        }
    }

    fn append_search_path(&self, entry: &Path) -> Result<(), PythonError> {
        unsafe {
            let path = sys_path()?;
            let entry = path_entry(entry)?;
            if ffi::PyList_Append(path, entry.as_ptr()) != 0 {
                return Err(PythonError::fetch());
            }
            Ok(())
        }
    }

    fn remove_search_path(&self, entry: &Path) -> Result<(), PythonError> {
        unsafe {
            let path = sys_path()?;
            let entry = path_entry(entry)?;
            let index = ffi::PySequence_Index(path, entry.as_ptr());
            if index < 0 || ffi::PySequence_DelItem(path, index) != 0 {
                return Err(PythonError::fetch());
            }
            Ok(())
        }
    }
}

impl HostLifecycle for CPythonLifecycle {
    type Config = PyConfigBox;
    type Status = ConfigStatus;
    type InitFn = InitFn;
    type Module = PyHandle;

    fn new_config(&self) -> PyConfigBox {
        // Every PyConfig field is an integer, pointer or list of those.
        let mut config = PyConfigBox(Box::new(unsafe { std::mem::zeroed() }));
        unsafe { ffi::PyConfig_InitPythonConfig(config.as_mut_ptr()) };
        config
    }

    fn set_program_name(
        &self,
        config: &mut PyConfigBox,
        program: &OsStr,
    ) -> ConfigResult<ConfigStatus> {
        let program = config_bytes(program)?;
        let config = config.as_mut_ptr();
        check(unsafe {
            ffi::PyConfig_SetBytesString(
                config,
                addr_of_mut!((*config).program_name),
                program.as_ptr(),
            )
        })
    }

    fn set_argv(&self, config: &mut PyConfigBox, args: &[OsString]) -> ConfigResult<ConfigStatus> {
        // Decoded by the runtime with its own locale rules.
        let args = args
            .iter()
            .map(|arg| config_bytes(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let mut argv = args.iter().map(|arg| arg.as_ptr()).collect::<Vec<_>>();
        check(unsafe {
            ffi::PyConfig_SetBytesArgv(
                config.as_mut_ptr(),
                argv.len() as ffi::Py_ssize_t,
                argv.as_mut_ptr() as _,
            )
        })
    }

    fn read_config(&self, config: &mut PyConfigBox) -> ConfigResult<ConfigStatus> {
        check(unsafe { ffi::PyConfig_Read(config.as_mut_ptr()) })
    }

    fn set_run_module(&self, config: &mut PyConfigBox, module: &str) -> ConfigResult<ConfigStatus> {
        let module = config_text(module)?;
        let config = config.as_mut_ptr();
        check(unsafe {
            ffi::PyConfig_SetBytesString(
                config,
                addr_of_mut!((*config).run_module),
                module.as_ptr(),
            )
        })
    }

    fn register_loader_module(
        &self,
        name: &'static str,
        registry: StaticExtensionRegistry<InitFn>,
    ) -> Result<(), PythonError> {
        let name = CString::new(name)
            .map_err(|_| PythonError::message("loader module name contains a NUL byte"))?;
        install_registry(registry)
            .map_err(|_| PythonError::message("static extension registry is already installed"))?;
        // The inittab keeps the name pointer for the life of the process.
        let status = unsafe {
            ffi::PyImport_AppendInittab(name.into_raw(), Some(PyInit__static_extension_utils))
        };
        if status != 0 {
            return Err(PythonError::message(
                "cannot extend the built-in module table",
            ));
        }
        Ok(())
    }

    fn initialize(&self, config: &PyConfigBox) -> ConfigResult<ConfigStatus> {
        check(unsafe { ffi::Py_InitializeFromConfig(&*config.0) })
    }

    fn import_module(&self, name: &str) -> Result<PyHandle, PythonError> {
        let name = CString::new(name)
            .map_err(|_| PythonError::message("module name contains a NUL byte"))?;
        unsafe { PyHandle::owned_or_err(ffi::PyImport_ImportModule(name.as_ptr())) }
    }

    fn call_attr(
        &self,
        module: &PyHandle,
        attr: &'static str,
    ) -> Result<(), FinderError<PythonError>> {
        unsafe {
            let callable = super::object::new_text(attr)
                .and_then(|name| {
                    PyHandle::owned_or_err(ffi::PyObject_GetAttr(module.as_ptr(), name.as_ptr()))
                })
                .map_err(|source| FinderError::MissingAttribute { attr, source })?;
            if ffi::PyCallable_Check(callable.as_ptr()) == 0 {
                return Err(FinderError::NotCallable { attr });
            }
            PyHandle::owned_or_err(ffi::PyObject_CallObject(callable.as_ptr(), ptr::null_mut()))
                .map(drop)
                .map_err(|source| FinderError::CallFailed { attr, source })
        }
    }

    fn run_main(&self) -> i32 {
        unsafe { ffi::Py_RunMain() }
    }

    fn exit_with_status(&self, status: ConfigStatus) -> ! {
        unsafe { ffi::Py_ExitStatusException(status.0) }
    }
}
