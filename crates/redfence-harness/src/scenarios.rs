//! The scenario catalogue.
//!
//! Scenarios use class-exact (power-of-two) sizes where the size-class
//! allocator could otherwise move the right band to the class boundary, so
//! one script holds for every backend/mode combination it applies to.

use redfence_core::{Runtime, config};

use crate::{StepReport, SuiteOptions, condition, step};

/// A runnable scenario: a name, the red-zone scale it needs, a mode filter,
/// and the probe script itself.
pub struct Scenario {
    pub name: &'static str,
    pub scale: usize,
    pub applies: fn(&SuiteOptions) -> bool,
    pub run: fn(&Runtime, &mut Vec<StepReport>),
}

fn always(_: &SuiteOptions) -> bool {
    true
}

/// The full catalogue, in execution order.
#[must_use]
pub fn catalogue() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "small_object_edges",
            scale: config::DEFAULT_SCALE,
            applies: always,
            run: small_object_edges,
        },
        Scenario {
            name: "wide_band_object",
            scale: 7,
            applies: always,
            run: wide_band_object,
        },
        Scenario {
            name: "straddling_accesses",
            scale: config::DEFAULT_SCALE,
            applies: always,
            run: straddling_accesses,
        },
        Scenario {
            name: "aligned_allocation",
            scale: config::DEFAULT_SCALE,
            applies: always,
            run: aligned_allocation,
        },
        Scenario {
            name: "calloc_zeroed_array",
            scale: config::DEFAULT_SCALE,
            applies: always,
            run: calloc_zeroed_array,
        },
        Scenario {
            name: "poison_lookalike_data",
            scale: config::DEFAULT_SCALE,
            applies: always,
            run: poison_lookalike_data,
        },
        Scenario {
            name: "page_straddling_object",
            scale: config::DEFAULT_SCALE,
            applies: always,
            run: page_straddling_object,
        },
        Scenario {
            name: "use_after_free_shadow",
            scale: config::DEFAULT_SCALE,
            // Freed-state detection lives in shadow bytes; the fast path
            // reads real memory and cannot see it.
            applies: |options| {
                options.backend == redfence_core::BackendKind::Shadow && !options.fast_check
            },
            run: use_after_free_shadow,
        },
    ]
}

fn small_object_edges(rt: &Runtime, steps: &mut Vec<StepReport>) {
    let Some(alloc) = rt.alloc_guarded(16) else {
        condition(steps, "malloc(16) succeeds", false);
        return;
    };
    step(steps, "p+0", 1, 0, alloc.check(0, 1));
    step(steps, "p+15", 1, 0, alloc.check(15, 1));
    step(steps, "p+16", 1, 1, alloc.check(16, 1));
    step(steps, "p-1", 1, 1, alloc.check(-1, 1));
    let band = rt.band() as isize;
    step(steps, "p-band", 1, 1, alloc.check(-band, 1));
    step(steps, "p-band-1", 1, 0, alloc.check(-band - 1, 1));
}

fn wide_band_object(rt: &Runtime, steps: &mut Vec<StepReport>) {
    let Some(alloc) = rt.alloc_guarded(64) else {
        condition(steps, "malloc(64) succeeds", false);
        return;
    };
    let band = rt.band() as isize;
    step(steps, "p+63", 1, 0, alloc.check(63, 1));
    step(steps, "p+64", 1, 1, alloc.check(64, 1));
    step(steps, "p+64+band-1", 1, 1, alloc.check(63 + band, 1));
    step(steps, "p+64+band", 1, 0, alloc.check(64 + band, 1));
}

fn straddling_accesses(rt: &Runtime, steps: &mut Vec<StepReport>) {
    let Some(alloc) = rt.alloc_guarded(16) else {
        condition(steps, "malloc(16) succeeds", false);
        return;
    };
    step(steps, "p+14 x4", 4, 1, alloc.check(14, 4));
    step(steps, "p+14 x2", 2, 0, alloc.check(14, 2));
    step(steps, "p+13 x8", 8, 1, alloc.check(13, 8));
    step(steps, "p+0 x16", 16, 0, alloc.check(0, 16));
    step(steps, "p+0 x17", 17, 1, alloc.check(0, 17));
}

fn aligned_allocation(rt: &Runtime, steps: &mut Vec<StepReport>) {
    let aligned = rt.memalign_guarded(32, 64);
    if rt.config().use_free_lists {
        // Aligned allocation and the size-class pools are mutually
        // exclusive; the entry point must refuse.
        condition(steps, "memalign refused in free-list mode", aligned.is_none());
        return;
    }
    let Some(alloc) = aligned else {
        condition(steps, "memalign(32, 64) succeeds", false);
        return;
    };
    condition(steps, "pointer is 32-byte aligned", alloc.addr() % 32 == 0);
    step(steps, "p+0", 1, 0, alloc.check(0, 1));
    let band = rt.band() as isize;
    step(steps, "p-band", 1, 1, alloc.check(-band, 1));
    step(steps, "p+65", 1, 1, alloc.check(65, 1));
}

fn calloc_zeroed_array(rt: &Runtime, steps: &mut Vec<StepReport>) {
    let Some(alloc) = rt.calloc_guarded(4, 32) else {
        condition(steps, "calloc(4, 32) succeeds", false);
        return;
    };
    let zeroed = (0..128).all(|offset| alloc.read(offset) == Some(0));
    condition(steps, "all 128 bytes zeroed", zeroed);
    step(steps, "p+127", 1, 0, alloc.check(127, 1));
    step(steps, "p+128", 1, 1, alloc.check(128, 1));
}

fn poison_lookalike_data(rt: &Runtime, steps: &mut Vec<StepReport>) {
    let Some(mut alloc) = rt.alloc_guarded(32) else {
        condition(steps, "malloc(32) succeeds", false);
        return;
    };
    alloc.fill(rt.config().poison);
    // In-bounds data that equals the poison byte must not trip the check;
    // the slow path tells a band from a coincidence.
    step(steps, "p+0 (poison-valued)", 1, 0, alloc.check(0, 1));
    step(steps, "p+31 (poison-valued)", 1, 0, alloc.check(31, 1));
    step(steps, "p+32", 1, 1, alloc.check(32, 1));
}

fn page_straddling_object(rt: &Runtime, steps: &mut Vec<StepReport>) {
    // Large enough that the two bands land on different pages (and, on the
    // bucket backend, usually in different buckets).
    let Some(alloc) = rt.alloc_guarded(8192) else {
        condition(steps, "malloc(8192) succeeds", false);
        return;
    };
    step(steps, "p+0", 1, 0, alloc.check(0, 1));
    step(steps, "p+8191", 1, 0, alloc.check(8191, 1));
    step(steps, "p+8192", 1, 1, alloc.check(8192, 1));
    step(steps, "p-1", 1, 1, alloc.check(-1, 1));
}

fn use_after_free_shadow(rt: &Runtime, steps: &mut Vec<StepReport>) {
    let Some(alloc) = rt.alloc_guarded(32) else {
        condition(steps, "malloc(32) succeeds", false);
        return;
    };
    let addr = alloc.addr();
    step(steps, "p+0 before free", 1, 0, alloc.check(0, 1));
    drop(alloc);
    step(steps, "p+0 after free", 1, 1, rt.check(addr, 1));
    step(steps, "p+31 after free", 1, 1, rt.check(addr + 31, 1));
}
