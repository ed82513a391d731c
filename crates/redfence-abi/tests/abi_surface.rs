//! The symbol surface as the instrumentation pass uses it: raw calls
//! through the `extern "C"` wrappers against the process-wide runtime.

use std::ffi::c_void;
use std::ptr;

use redfence_abi::{
    rf_calloc, rf_check_access, rf_free, rf_init, rf_malloc, rf_memalign, rf_realloc,
};

fn check(addr: *const u8, size: i32) -> i32 {
    // SAFETY: probes target a live band-padded allocation or its bands.
    unsafe { rf_check_access(addr.cast::<c_void>(), size) }
}

#[test]
fn malloc_check_free_round_trip() {
    // SAFETY: standard use of the exported allocator surface.
    unsafe {
        assert_eq!(rf_init(), 0);
        let p = rf_malloc(16).cast::<u8>();
        assert!(!p.is_null());

        assert_eq!(check(p, 1), 0);
        assert_eq!(check(p.add(15), 1), 0);
        assert_eq!(check(p.add(16), 1), 1);
        assert_eq!(check(p.sub(1), 1), 1);
        // Wide access straddling into the right band.
        assert_eq!(check(p.add(14), 4), 1);
        assert_eq!(check(p.add(14), 2), 0);

        rf_free(p.cast());
    }
}

#[test]
fn calloc_zeroes_and_realloc_preserves() {
    // SAFETY: standard use of the exported allocator surface.
    unsafe {
        let p = rf_calloc(4, 8).cast::<u8>();
        assert!(!p.is_null());
        for i in 0..32 {
            assert_eq!(p.add(i).read(), 0, "byte {i}");
        }
        p.write(0x5A);

        let q = rf_realloc(p.cast(), 64).cast::<u8>();
        assert!(!q.is_null());
        assert_eq!(q.read(), 0x5A);
        assert_eq!(check(q.add(64), 1), 1);
        rf_free(q.cast());
    }
}

#[test]
fn null_and_invalid_inputs_degrade_gracefully() {
    // SAFETY: null probes and frees are defined no-ops at this surface.
    unsafe {
        assert_eq!(rf_check_access(ptr::null(), 1), -1);
        rf_free(ptr::null_mut());
        assert!(rf_malloc(0).is_null());
        // Alignment that is not a power of two.
        assert!(rf_memalign(24, 64).is_null());
    }
}

#[test]
fn memalign_pads_like_malloc() {
    // SAFETY: standard use of the exported allocator surface.
    unsafe {
        let p = rf_memalign(32, 64).cast::<u8>();
        assert!(!p.is_null());
        assert_eq!(p as usize % 32, 0);
        assert_eq!(check(p, 1), 0);
        assert_eq!(check(p.sub(32), 1), 1);
        assert_eq!(check(p.add(65), 1), 1);
        rf_free(p.cast());
    }
}
