//! Lifecycle of the process-wide runtime handle.
//!
//! Kept in its own test binary: once shut down, the handle stays down for
//! the rest of the process.

use redfence_core::facade;

#[test]
fn init_serve_shutdown_noop() {
    assert!(facade::init());
    let verdict = facade::with_runtime(|rt| {
        let alloc = rt.alloc_guarded(16).expect("alloc");
        alloc.check(16, 1)
    });
    assert!(matches!(
        verdict,
        Some(Ok(redfence_core::Verdict::Forbidden))
    ));

    assert!(facade::shutdown());
    // Entry points no-op from here on.
    assert!(!facade::init());
    assert_eq!(facade::with_runtime(|rt| rt.band()), None);
    assert!(!facade::shutdown());
}
