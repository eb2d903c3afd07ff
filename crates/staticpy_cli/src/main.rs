//! Interpreter launcher with statically linked extensions.
//!
//! # Responsibility
//! - Stand in for the stock interpreter executable.
//! - Hand the extension table linked into this binary to the loader.
//!
//! Set `STATICPY_LOG_DIR` for rolling launcher logs and
//! `STATICPY_FINDER_ARCHIVE` to expose an archive to the finder import.

mod extensions;

fn main() {
    let code = staticpy_ffi::cpython::launch(extensions::STATIC_EXTENSIONS);
    std::process::exit(code);
}
