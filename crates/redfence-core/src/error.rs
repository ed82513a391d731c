//! Error types shared across the runtime.

use thiserror::Error;

/// Configuration rejected at runtime construction.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("red-zone scale {0} outside supported range [3, 10]")]
    ScaleOutOfRange(usize),
    #[error("size-class allocator requires the shadow back-end")]
    FreeListsNeedShadow,
}

/// Failure of a platform memory primitive.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PlatformError {
    #[error("anonymous mapping of {len} bytes failed (errno {errno})")]
    MapFailed { len: usize, errno: i32 },
    #[error("fixed reservation of {len} bytes at {base:#x} failed (errno {errno})")]
    FixedMapFailed { base: usize, len: usize, errno: i32 },
    #[error("unmapping {len} bytes at {addr:#x} failed (errno {errno})")]
    UnmapFailed { addr: usize, len: usize, errno: i32 },
}

/// Inconsistency reported by a registry back-end.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// A record with an equal endpoint already exists in the bucket.
    #[error("guard band with endpoint {addr:#x} already registered")]
    AlreadyRegistered { addr: usize },
    /// No record with the given left-band address exists.
    #[error("no guard band registered for left band {addr:#x}")]
    NotRegistered { addr: usize },
    /// The second half of a cross-bucket insertion failed and the first half
    /// could not be undone.
    #[error("rollback of partial cross-bucket registration failed")]
    RollbackFailed,
}

/// Failure to bring up the runtime.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Internal failure of the access check; surfaced as −1 at the ABI.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CheckError {
    #[error("access check invoked with a null address")]
    NullAddress,
    #[error("registration is enabled but no back-end is available")]
    BackendUnavailable,
}
