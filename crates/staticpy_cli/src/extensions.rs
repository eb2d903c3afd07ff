//! Extensions linked into this executable.
//!
//! Add one `"dotted.name" => PyInit_symbol` entry per extension object handed
//! to the linker.

staticpy_ffi::declare_static_extensions! {
    pub static STATIC_EXTENSIONS = {};
}
