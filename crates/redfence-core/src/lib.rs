//! # redfence-core
//!
//! Runtime half of a heap memory-safety sanitizer. Every user allocation is
//! widened by two poisoned guard bands (red-zones); instrumented loads and
//! stores call into [`facade::Runtime::check`], which classifies the access
//! as addressable or forbidden in constant or near-constant time.
//!
//! Two interchangeable registry back-ends track the guard bands:
//!
//! - [`registry::buckets::BucketIndex`] — a 4096-bucket address index with
//!   sorted per-bucket record lists, partitioned under two mutexes;
//! - [`registry::shadow::ShadowMap`] — a demand-paged 2^44-byte shadow
//!   reservation encoding per-8-byte-word addressability.
//!
//! The [`classalloc`] module adds an optional pre-allocated size-class
//! allocator on top of the shadow back-end. The [`facade`] module ties the
//! pieces together behind `malloc`/`calloc`/`realloc`/`free`/`memalign`
//! semantics and a process-wide runtime handle; the stable `extern "C"`
//! surface lives in the companion `redfence-abi` crate.

pub mod check;
pub mod classalloc;
pub mod config;
pub mod error;
pub mod facade;
pub mod platform;
pub mod redzone;
pub mod registry;

pub use config::{BackendKind, RuntimeConfig, ShadowEncoding};
pub use error::{CheckError, ConfigError, InitError, PlatformError, RegistryError};
pub use facade::Runtime;
pub use registry::Verdict;
