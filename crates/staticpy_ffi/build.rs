fn main() {
    // Emits `Py_3_x` cfgs for the interpreter being linked.
    #[cfg(feature = "cpython")]
    pyo3_build_config::use_pyo3_cfgs();
}
