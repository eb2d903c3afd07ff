//! Loader-facing CPython operations.

use super::object::{new_text, text_of, PyHandle, PythonError};
use pyo3::ffi;
use staticpy_core::{HostRuntime, InitResult, ModuleSpec, PackageContextSlot};
use std::ffi::{c_char, c_int, CString};
use std::marker::PhantomData;
use std::ptr::{self, addr_of_mut, NonNull};

/// Signature of a native extension's `PyInit_*` symbol.
pub type InitFn = unsafe extern "C" fn() -> *mut ffi::PyObject;

#[cfg(not(Py_3_12))]
extern "C" {
    static mut _Py_PackageContext: *const c_char;
}

#[cfg(Py_3_12)]
extern "C" {
    fn _PyImport_SwapPackageContext(newcontext: *const c_char) -> *const c_char;
}

// Single-phase extension cache shared with dynamically loaded extensions.
extern "C" {
    fn _PyImport_FindExtensionObject(
        name: *mut ffi::PyObject,
        filename: *mut ffi::PyObject,
    ) -> *mut ffi::PyObject;
    fn _PyImport_FixupExtensionObject(
        module: *mut ffi::PyObject,
        name: *mut ffi::PyObject,
        filename: *mut ffi::PyObject,
        modules: *mut ffi::PyObject,
    ) -> c_int;
}

unsafe fn swap_package_context(next: *const c_char) -> *const c_char {
    #[cfg(Py_3_12)]
    {
        _PyImport_SwapPackageContext(next)
    }
    #[cfg(not(Py_3_12))]
    {
        ptr::replace(addr_of_mut!(_Py_PackageContext), next)
    }
}

/// Module definition living in an extension's static data.
#[derive(Clone, Copy)]
pub struct ModuleDefPtr(NonNull<ffi::PyModuleDef>);

impl ModuleDefPtr {
    pub fn as_ptr(self) -> *mut ffi::PyModuleDef {
        self.0.as_ptr()
    }
}

/// Package context slot state saved across one init call.
pub struct SavedContext {
    previous: *const c_char,
    // Backs the pointer currently in the slot.
    _current: Option<CString>,
}

/// Interpreter access for the duration of one loader call.
///
/// Not `Send`: it stands for the GIL held by the creating thread.
pub struct CPythonRuntime {
    _gil: PhantomData<*mut ()>,
}

impl CPythonRuntime {
    /// # Safety
    /// The calling thread must hold the GIL while the value is alive.
    pub unsafe fn assume_gil() -> Self {
        Self { _gil: PhantomData }
    }
}

impl PackageContextSlot for CPythonRuntime {
    type Saved = SavedContext;

    fn swap_in(&self, name: &str) -> SavedContext {
        let current = CString::new(name).ok();
        let next = current.as_ref().map_or(ptr::null(), |name| name.as_ptr());
        let previous = unsafe { swap_package_context(next) };
        SavedContext {
            previous,
            _current: current,
        }
    }

    fn restore(&self, saved: SavedContext) {
        unsafe {
            swap_package_context(saved.previous);
        }
    }
}

impl HostRuntime for CPythonRuntime {
    type Object = PyHandle;
    type Definition = ModuleDefPtr;
    type InitFn = InitFn;
    type Error = PythonError;

    fn read_spec(&self, spec: &PyHandle) -> Result<ModuleSpec, PythonError> {
        unsafe {
            let name = PyHandle::owned_or_err(ffi::PyObject_GetAttrString(
                spec.as_ptr(),
                c"name".as_ptr(),
            ))?;
            let Some(name) = text_of(name.as_ptr()) else {
                return Err(PythonError::raise(
                    ffi::PyExc_TypeError,
                    "module spec name must be a str",
                ));
            };

            let origin = match PyHandle::from_owned(ffi::PyObject_GetAttrString(
                spec.as_ptr(),
                c"origin".as_ptr(),
            )) {
                Some(origin) => text_of(origin.as_ptr()),
                None => {
                    ffi::PyErr_Clear();
                    None
                }
            };
            Ok(ModuleSpec::new(name, origin))
        }
    }

    fn find_cached_extension(&self, name: &str) -> Result<Option<PyHandle>, PythonError> {
        unsafe {
            // Static extensions are keyed by their own name in both slots.
            let key = new_text(name)?;
            let found = _PyImport_FindExtensionObject(key.as_ptr(), key.as_ptr());
            if found.is_null() {
                if !ffi::PyErr_Occurred().is_null() {
                    return Err(PythonError::fetch());
                }
                return Ok(None);
            }
            // Borrowed on older runtimes; sys.modules holds the module either way.
            Ok(PyHandle::from_borrowed(found))
        }
    }

    fn call_init(&self, init: InitFn) -> Result<InitResult<PyHandle, ModuleDefPtr>, PythonError> {
        unsafe {
            let result = init();
            if result.is_null() {
                return Err(PythonError::fetch());
            }
            if ffi::PyObject_TypeCheck(result, addr_of_mut!(ffi::PyModuleDef_Type)) != 0 {
                // PyModuleDef_Init hands back the static definition itself.
                return Ok(InitResult::Definition(ModuleDefPtr(NonNull::new_unchecked(
                    result.cast(),
                ))));
            }
            Ok(InitResult::Legacy(PyHandle::owned_or_err(result)?))
        }
    }

    fn materialize(
        &self,
        definition: &ModuleDefPtr,
        spec: &PyHandle,
    ) -> Result<PyHandle, PythonError> {
        unsafe {
            PyHandle::owned_or_err(ffi::PyModule_FromDefAndSpec(
                definition.as_ptr(),
                spec.as_ptr(),
            ))
        }
    }

    fn set_file_attr(&self, module: &PyHandle, origin: &str) -> Result<(), PythonError> {
        unsafe {
            let origin = new_text(origin)?;
            if ffi::PyObject_SetAttrString(module.as_ptr(), c"__file__".as_ptr(), origin.as_ptr())
                != 0
            {
                return Err(PythonError::fetch());
            }
            Ok(())
        }
    }

    fn module_definition(&self, module: &PyHandle) -> Option<ModuleDefPtr> {
        unsafe {
            if ffi::PyModule_Check(module.as_ptr()) == 0 {
                return None;
            }
            NonNull::new(ffi::PyModule_GetDef(module.as_ptr())).map(ModuleDefPtr)
        }
    }

    fn set_base_init(&self, definition: &ModuleDefPtr, init: InitFn) {
        unsafe {
            // Read by the extension cache when the module has no copied state.
            (*definition.as_ptr()).m_base.m_init = Some(std::mem::transmute(init));
        }
    }

    fn cache_extension(&self, name: &str, module: &PyHandle) -> Result<(), PythonError> {
        unsafe {
            let key = new_text(name)?;
            // Also stores the module in sys.modules and snapshots its dict.
            let status = _PyImport_FixupExtensionObject(
                module.as_ptr(),
                key.as_ptr(),
                key.as_ptr(),
                ffi::PyImport_GetModuleDict(),
            );
            if status != 0 {
                return Err(PythonError::fetch());
            }
            Ok(())
        }
    }

    fn is_module(&self, value: &PyHandle) -> bool {
        unsafe { ffi::PyModule_Check(value.as_ptr()) != 0 }
    }

    fn exec_definition(
        &self,
        module: &PyHandle,
        definition: &ModuleDefPtr,
    ) -> Result<(), PythonError> {
        unsafe {
            if ffi::PyModule_ExecDef(module.as_ptr(), definition.as_ptr()) != 0 {
                return Err(PythonError::fetch());
            }
            Ok(())
        }
    }

    fn text_value(&self, value: &PyHandle) -> Option<String> {
        unsafe { text_of(value.as_ptr()) }
    }
}
