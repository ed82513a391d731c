//! # redfence-abi
//!
//! The stable symbol surface the compile-time instrumentation pass links
//! against. Every exported symbol carries the fixed `rf_` prefix so the
//! pass can redirect allocator calls and insert access checks without
//! ambiguity:
//!
//! ```text
//! instrumented load/store -> rf_check_access(ptr, size)
//! malloc/calloc/realloc/free/memalign -> rf_malloc / rf_calloc / ...
//! ```
//!
//! All entry points run against the process-wide runtime, which comes up
//! via a first-call guard; when initialisation fails (for example because
//! the shadow reservation is unavailable) the allocator wrappers return
//! null and the check reports an internal error, never panicking into the
//! host process.

#![allow(clippy::missing_safety_doc)]

mod alloc_abi;
mod check_abi;

pub use alloc_abi::{rf_calloc, rf_free, rf_malloc, rf_memalign, rf_realloc};
pub use check_abi::{rf_check_access, rf_init, rf_shutdown};
