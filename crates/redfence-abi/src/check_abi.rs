//! The instrumentation check entry point and runtime lifecycle symbols.

use std::ffi::{c_int, c_void};

use redfence_core::Verdict;
use redfence_core::facade;

/// Classifies an access of `access_size` bytes at `addr` before the
/// instrumented load or store executes.
///
/// Returns 0 when the access is addressable, 1 when it touches a guard
/// band, and −1 on an internal error (null address, missing back-end, or
/// an uninitialised runtime). `access_size` values below 1 are treated as
/// a single byte. Safe to call on any address the program is about to
/// dereference, wild pointers included.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rf_check_access(addr: *const c_void, access_size: c_int) -> c_int {
    let outcome = facade::with_runtime(|rt| rt.check(addr as usize, access_size));
    match outcome {
        Some(Ok(Verdict::Addressable)) => 0,
        Some(Ok(Verdict::Forbidden)) => 1,
        Some(Err(_)) | None => -1,
    }
}

/// Forces runtime initialisation ahead of the first allocator call.
/// Returns 0 when the runtime is usable, 1 otherwise.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rf_init() -> c_int {
    if facade::init() { 0 } else { 1 }
}

/// Tears the runtime down: registry state is dropped and any shadow
/// reservation is unmapped. All later entry points no-op. Returns 0 when a
/// live runtime was shut down, 1 when there was none.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rf_shutdown() -> c_int {
    if facade::shutdown() { 0 } else { 1 }
}
