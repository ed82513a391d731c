//! Build-time configuration.
//!
//! All knobs are compile-time constants with cargo features flipping the
//! defaults; a [`RuntimeConfig`] value snapshots them so tests and the
//! harness can construct runtimes with explicit settings.

use crate::error::ConfigError;

/// Smallest supported red-zone scale (8-byte bands).
pub const MIN_SCALE: usize = 3;
/// Largest supported red-zone scale (1024-byte bands).
pub const MAX_SCALE: usize = 10;
/// Default red-zone scale: 2^5 = 32-byte bands. 7 (128 bytes) is the
/// recommended setting for wide-stride overflow detection.
pub const DEFAULT_SCALE: usize = 5;

/// Poison byte written into explicitly painted guard bands. Must be a single
/// byte; 0x2A is the documented alternative.
pub const POISON_BYTE: u8 = 0xFF;

/// User address space width the shadow reservation must cover.
pub const ADDRESS_SPACE_BITS: u32 = 47;

/// Fixed base of the shadow reservation. Every shadow lookup computes
/// `base + (addr >> 3)`, so the base is baked into the check hot path.
pub const SHADOW_BASE: usize = 0x66_0000_0000;

/// Which guard-band registry backs the slow check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Back-end A: bucketed address index (4096 sorted bucket lists).
    Buckets,
    /// Back-end B: shadow-memory bitmap (O(1) byte lookups).
    Shadow,
}

/// Per-word encoding used by the shadow back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowEncoding {
    /// ASAN-style: 0 = word addressable, 1..7 = first N bytes addressable,
    /// 0xFF = red-zone, 0x40 = freed.
    Word,
    /// One bit per user byte; a set bit forbids the byte.
    Bit,
}

/// Snapshot of the sanitizer's build-time configuration.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Red-zone scale; band width is `1 << scale` bytes.
    pub scale: usize,
    /// Poison byte for explicitly painted bands.
    pub poison: u8,
    /// Paint bands and run the constant-time byte compare before any
    /// registry consultation.
    pub fast_check: bool,
    /// Mirror allocations into the registry back-end. When off, only the
    /// fast check detects errors (false positives accepted).
    pub registration: bool,
    /// Active registry back-end.
    pub backend: BackendKind,
    /// Shadow encoding (ignored by the bucketed back-end).
    pub encoding: ShadowEncoding,
    /// Serve small allocations from the pre-allocated size-class allocator.
    /// Requires the shadow back-end and makes aligned allocation an error.
    pub use_free_lists: bool,
    /// Address-space width covered by the shadow reservation.
    pub address_space_bits: u32,
    /// Base address of the shadow reservation.
    pub shadow_base: usize,
}

impl RuntimeConfig {
    /// Configuration with the bucketed index back-end.
    #[must_use]
    pub const fn buckets() -> Self {
        Self {
            scale: DEFAULT_SCALE,
            poison: POISON_BYTE,
            fast_check: true,
            registration: true,
            backend: BackendKind::Buckets,
            encoding: ShadowEncoding::Word,
            use_free_lists: false,
            address_space_bits: ADDRESS_SPACE_BITS,
            shadow_base: SHADOW_BASE,
        }
    }

    /// Configuration with the shadow-memory back-end.
    #[must_use]
    pub const fn shadow() -> Self {
        Self {
            backend: BackendKind::Shadow,
            ..Self::buckets()
        }
    }

    /// Checks the invariants the rest of the runtime assumes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scale < MIN_SCALE || self.scale > MAX_SCALE {
            return Err(ConfigError::ScaleOutOfRange(self.scale));
        }
        if self.use_free_lists && (self.backend != BackendKind::Shadow || !self.registration) {
            return Err(ConfigError::FreeListsNeedShadow);
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    /// Defaults follow the crate's cargo features.
    fn default() -> Self {
        let backend = if cfg!(feature = "shadow-backend") {
            BackendKind::Shadow
        } else {
            BackendKind::Buckets
        };
        let encoding = if cfg!(feature = "bit-granularity") {
            ShadowEncoding::Bit
        } else {
            ShadowEncoding::Word
        };
        Self {
            fast_check: cfg!(feature = "fast-check"),
            registration: cfg!(feature = "registration"),
            backend,
            encoding,
            use_free_lists: cfg!(feature = "free-lists"),
            ..Self::buckets()
        }
    }
}
