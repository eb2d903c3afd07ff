//! Owned object references and captured interpreter errors.
//!
//! Everything here assumes the calling thread holds the GIL.

use pyo3::ffi;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::ptr::{self, NonNull};

/// Strong reference to an interpreter object, released on drop.
pub struct PyHandle(NonNull<ffi::PyObject>);

impl PyHandle {
    /// Takes ownership of a new reference. `None` for null.
    ///
    /// # Safety
    /// The GIL must be held and `ptr` must be a new reference or null.
    pub unsafe fn from_owned(ptr: *mut ffi::PyObject) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Adds a reference to a borrowed object. `None` for null.
    ///
    /// # Safety
    /// The GIL must be held and `ptr` must be a live object or null.
    pub unsafe fn from_borrowed(ptr: *mut ffi::PyObject) -> Option<Self> {
        let handle = NonNull::new(ptr)?;
        ffi::Py_INCREF(handle.as_ptr());
        Some(Self(handle))
    }

    /// Like [`PyHandle::from_owned`], turning null into the pending error.
    ///
    /// # Safety
    /// Same as [`PyHandle::from_owned`].
    pub unsafe fn owned_or_err(ptr: *mut ffi::PyObject) -> Result<Self, PythonError> {
        match Self::from_owned(ptr) {
            Some(handle) => Ok(handle),
            None => Err(PythonError::fetch()),
        }
    }

    pub fn as_ptr(&self) -> *mut ffi::PyObject {
        self.0.as_ptr()
    }

    /// Hands the reference to the caller.
    pub fn into_ptr(self) -> *mut ffi::PyObject {
        let ptr = self.0.as_ptr();
        std::mem::forget(self);
        ptr
    }
}

impl Drop for PyHandle {
    fn drop(&mut self) {
        unsafe { ffi::Py_DECREF(self.0.as_ptr()) }
    }
}

/// New `str` object holding `text`.
///
/// # Safety
/// The GIL must be held.
pub unsafe fn new_text(text: &str) -> Result<PyHandle, PythonError> {
    PyHandle::owned_or_err(ffi::PyUnicode_FromStringAndSize(
        text.as_ptr().cast(),
        text.len() as ffi::Py_ssize_t,
    ))
}

/// Contents of a `str` object, `None` for any other type.
///
/// Text that is not valid UTF-8 (lone surrogates) is returned lossily.
///
/// # Safety
/// The GIL must be held and `obj` must be a live object.
pub unsafe fn text_of(obj: *mut ffi::PyObject) -> Option<String> {
    if ffi::PyUnicode_Check(obj) == 0 {
        return None;
    }
    let mut size: ffi::Py_ssize_t = 0;
    let data = ffi::PyUnicode_AsUTF8AndSize(obj, &mut size);
    if !data.is_null() {
        let bytes = std::slice::from_raw_parts(data.cast::<u8>(), size as usize);
        return Some(String::from_utf8_lossy(bytes).into_owned());
    }
    ffi::PyErr_Clear();
    let Some(encoded) = PyHandle::from_owned(ffi::PyUnicode_AsEncodedString(
        obj,
        c"utf-8".as_ptr(),
        c"surrogatepass".as_ptr(),
    )) else {
        ffi::PyErr_Clear();
        return Some(String::new());
    };
    let data = ffi::PyBytes_AsString(encoded.as_ptr());
    let size = ffi::PyBytes_Size(encoded.as_ptr());
    let bytes = std::slice::from_raw_parts(data.cast::<u8>(), size as usize);
    Some(String::from_utf8_lossy(bytes).into_owned())
}

/// `str(obj)`, or `None` if that raises.
unsafe fn display_of(obj: *mut ffi::PyObject) -> Option<String> {
    match PyHandle::from_owned(ffi::PyObject_Str(obj)) {
        Some(text) => text_of(text.as_ptr()),
        None => {
            ffi::PyErr_Clear();
            None
        }
    }
}

/// Exception taken out of the interpreter's error indicator.
///
/// Errors raised before the interpreter exists carry only a message and are
/// re-raised as `RuntimeError`.
pub struct PythonError {
    ptype: *mut ffi::PyObject,
    pvalue: *mut ffi::PyObject,
    ptraceback: *mut ffi::PyObject,
    message: String,
}

impl PythonError {
    /// Takes the pending exception.
    ///
    /// # Safety
    /// The GIL must be held.
    pub unsafe fn fetch() -> Self {
        let mut ptype = ptr::null_mut();
        let mut pvalue = ptr::null_mut();
        let mut ptraceback = ptr::null_mut();
        #[allow(deprecated)]
        ffi::PyErr_Fetch(&mut ptype, &mut pvalue, &mut ptraceback);
        if ptype.is_null() {
            return Self::raise(
                ffi::PyExc_SystemError,
                "runtime call failed without setting an exception",
            );
        }
        #[allow(deprecated)]
        ffi::PyErr_NormalizeException(&mut ptype, &mut pvalue, &mut ptraceback);

        let type_name = PyHandle::from_owned(ffi::PyObject_GetAttrString(
            ptype,
            c"__name__".as_ptr(),
        ))
        .and_then(|name| text_of(name.as_ptr()));
        if type_name.is_none() {
            ffi::PyErr_Clear();
        }
        let type_name = type_name.unwrap_or_else(|| "Exception".to_string());
        let detail = if pvalue.is_null() {
            None
        } else {
            display_of(pvalue)
        };
        let message = match detail {
            Some(detail) if !detail.is_empty() => format!("{type_name}: {detail}"),
            _ => type_name,
        };

        Self {
            ptype,
            pvalue,
            ptraceback,
            message,
        }
    }

    /// Raises `exception` with `message` and captures it.
    ///
    /// # Safety
    /// The GIL must be held and `exception` must be an exception type.
    pub unsafe fn raise(exception: *mut ffi::PyObject, message: &str) -> Self {
        match new_text(message) {
            Ok(text) => ffi::PyErr_SetObject(exception, text.as_ptr()),
            Err(err) => return err,
        }
        Self::fetch()
    }

    /// Error that never reached the interpreter.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            ptype: ptr::null_mut(),
            pvalue: ptr::null_mut(),
            ptraceback: ptr::null_mut(),
            message: message.into(),
        }
    }

    /// Puts the exception back into the interpreter's error indicator.
    ///
    /// # Safety
    /// The GIL must be held.
    pub unsafe fn restore(mut self) {
        if self.ptype.is_null() {
            if let Ok(text) = new_text(&self.message) {
                ffi::PyErr_SetObject(ffi::PyExc_RuntimeError, text.as_ptr());
            }
            return;
        }
        let ptype = std::mem::replace(&mut self.ptype, ptr::null_mut());
        let pvalue = std::mem::replace(&mut self.pvalue, ptr::null_mut());
        let ptraceback = std::mem::replace(&mut self.ptraceback, ptr::null_mut());
        ffi::PyErr_Restore(ptype, pvalue, ptraceback);
    }
}

impl Drop for PythonError {
    fn drop(&mut self) {
        unsafe {
            ffi::Py_XDECREF(self.ptype);
            ffi::Py_XDECREF(self.pvalue);
            ffi::Py_XDECREF(self.ptraceback);
        }
    }
}

impl Display for PythonError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Debug for PythonError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PythonError")
            .field("message", &self.message)
            .field("captured", &!self.ptype.is_null())
            .finish()
    }
}

impl Error for PythonError {}
