//! Thin wrappers over the platform's memory primitives.
//!
//! Everything the runtime needs from the OS funnels through here: the page
//! size, anonymous mappings for size-class regions, the fixed no-reserve
//! reservation backing the shadow map, and passthrough to the native
//! allocator for the interposed wrappers.

use std::ffi::c_void;
use std::ptr;

use crate::error::PlatformError;

/// Page exponent assumed when the runtime page-size query fails.
const FALLBACK_PAGE_EXPONENT: u32 = 12;

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// System page size in bytes. Falls back to 4096 when the query fails.
#[must_use]
pub fn page_size() -> usize {
    // SAFETY: sysconf has no memory preconditions.
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if raw > 0 {
        raw as usize
    } else {
        1 << FALLBACK_PAGE_EXPONENT
    }
}

/// log2 of the page size; pages are always powers of two.
#[must_use]
pub fn page_exponent() -> u32 {
    page_size().trailing_zeros()
}

/// Maps `len` bytes of zero-filled anonymous read+write memory.
pub fn map_anonymous(len: usize) -> Result<*mut u8, PlatformError> {
    // SAFETY: a NULL hint with MAP_PRIVATE|MAP_ANONYMOUS has no
    // preconditions; the kernel picks the placement.
    let mapped = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if mapped == libc::MAP_FAILED {
        return Err(PlatformError::MapFailed {
            len,
            errno: last_errno(),
        });
    }
    Ok(mapped.cast())
}

/// Reserves `len` bytes of demand-paged anonymous memory at exactly `base`.
///
/// Uses `MAP_NORESERVE` so multi-terabyte reservations commit no swap, and
/// `MAP_FIXED_NOREPLACE` so an occupied range fails instead of being
/// clobbered. Kernels that treat the fixed hint as advisory are detected by
/// comparing the returned address.
pub fn map_fixed_noreserve(base: usize, len: usize) -> Result<*mut u8, PlatformError> {
    // SAFETY: MAP_FIXED_NOREPLACE never unmaps existing ranges; failure is
    // reported through MAP_FAILED or a relocated address.
    let mapped = unsafe {
        libc::mmap(
            base as *mut c_void,
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE | libc::MAP_FIXED_NOREPLACE,
            -1,
            0,
        )
    };
    if mapped == libc::MAP_FAILED {
        return Err(PlatformError::FixedMapFailed {
            base,
            len,
            errno: last_errno(),
        });
    }
    if mapped as usize != base {
        // Old-kernel fallback path: the hint was not honoured.
        // SAFETY: `mapped` is the mapping obtained above.
        unsafe { libc::munmap(mapped, len) };
        return Err(PlatformError::FixedMapFailed {
            base,
            len,
            errno: libc::EEXIST,
        });
    }
    Ok(mapped.cast())
}

/// Releases a mapping created by [`map_anonymous`] or [`map_fixed_noreserve`].
pub fn unmap(addr: *mut u8, len: usize) -> Result<(), PlatformError> {
    // SAFETY: caller passes a mapping produced by this module.
    let rc = unsafe { libc::munmap(addr.cast(), len) };
    if rc != 0 {
        return Err(PlatformError::UnmapFailed {
            addr: addr as usize,
            len,
            errno: last_errno(),
        });
    }
    Ok(())
}

/// Passthrough to the native allocator.
///
/// # Safety
///
/// Standard `malloc` contract; the caller must release with [`native_free`].
#[must_use]
pub unsafe fn native_alloc(size: usize) -> *mut u8 {
    // SAFETY: direct call to the platform allocator.
    unsafe { libc::malloc(size.max(1)).cast() }
}

/// Passthrough to the native `free`.
///
/// # Safety
///
/// `ptr` must be null or a pointer obtained from [`native_alloc`] /
/// [`native_aligned_alloc`] and not yet freed.
pub unsafe fn native_free(ptr: *mut u8) {
    // SAFETY: direct call to the platform allocator.
    unsafe { libc::free(ptr.cast()) }
}

/// Aligned allocation through `posix_memalign`.
///
/// Returns null when the alignment is rejected or memory is exhausted.
///
/// # Safety
///
/// The caller must release the returned pointer with [`native_free`].
#[must_use]
pub unsafe fn native_aligned_alloc(alignment: usize, size: usize) -> *mut u8 {
    let mut out: *mut c_void = ptr::null_mut();
    // SAFETY: `out` is a valid out-pointer for the duration of the call.
    let rc = unsafe { libc::posix_memalign(&mut out, alignment, size.max(1)) };
    if rc != 0 { ptr::null_mut() } else { out.cast() }
}

/// Usable size of a native allocation (at least the requested size; may
/// include allocator padding).
///
/// # Safety
///
/// `ptr` must be a live pointer obtained from [`native_alloc`] /
/// [`native_aligned_alloc`].
#[must_use]
pub unsafe fn native_usable_size(ptr: *mut u8) -> usize {
    // SAFETY: forwarded to the platform allocator under the same contract.
    unsafe { libc::malloc_usable_size(ptr.cast()) }
}
