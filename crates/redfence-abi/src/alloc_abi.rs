//! Interposed allocator symbols.
//!
//! Each wrapper has the platform signature of the function it replaces,
//! extended only in that returned pointers refer to the middle of a
//! band-padded region. With the runtime unavailable every wrapper returns
//! null (or silently drops the free), keeping the host process alive.

use std::ffi::c_void;
use std::ptr;

use redfence_core::facade;

/// Interposed `malloc`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rf_malloc(size: usize) -> *mut c_void {
    facade::with_runtime(|rt| rt.malloc(size))
        .unwrap_or(ptr::null_mut())
        .cast()
}

/// Interposed `calloc`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rf_calloc(nmemb: usize, size: usize) -> *mut c_void {
    facade::with_runtime(|rt| rt.calloc(nmemb, size))
        .unwrap_or(ptr::null_mut())
        .cast()
}

/// Interposed `realloc`.
///
/// # Safety
///
/// `ptr` must be null or a pointer previously returned by one of the
/// `rf_` allocator wrappers.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rf_realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    facade::with_runtime(|rt| rt.realloc(ptr.cast(), size))
        .unwrap_or(ptr::null_mut())
        .cast()
}

/// Interposed `free`. Null is a no-op.
///
/// # Safety
///
/// `ptr` must be null or a live pointer previously returned by one of the
/// `rf_` allocator wrappers.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rf_free(ptr: *mut c_void) {
    facade::with_runtime(|rt| rt.free(ptr.cast()));
}

/// Interposed `memalign`/`aligned_alloc`.
///
/// Errors (null) when the size-class allocator is enabled: pooled blocks
/// have fixed placement and cannot honour caller alignment.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rf_memalign(alignment: usize, size: usize) -> *mut c_void {
    facade::with_runtime(|rt| rt.memalign(alignment, size))
        .unwrap_or(ptr::null_mut())
        .cast()
}
