//! Allocator facade and the process-wide runtime handle.
//!
//! Every wrapper widens the request by two guard bands, paints them when the
//! fast check is active, mirrors the pair into the registry back-end, and
//! hands the caller a pointer into the middle of the padded region. `free`
//! walks the same steps backwards: the left band is recovered by
//! subtracting the band width from the user pointer, the registration is
//! undone, and the raw region goes back to its allocator.

use std::ptr;
use std::sync::OnceLock;

use parking_lot::{Mutex, RwLock};

use crate::check;
use crate::classalloc::{self, SizeClassAllocator};
use crate::config::{BackendKind, RuntimeConfig};
use crate::error::{CheckError, InitError};
use crate::platform;
use crate::redzone::RedZone;
use crate::registry::buckets::BucketIndex;
use crate::registry::shadow::ShadowMap;
use crate::registry::{Backend, Verdict};

/// The assembled sanitizer runtime: configuration, red-zone encoder, the
/// active registry back-end, and (optionally) the size-class allocator.
pub struct Runtime {
    config: RuntimeConfig,
    zone: RedZone,
    backend: Option<Backend>,
    classes: Option<Mutex<SizeClassAllocator>>,
}

impl Runtime {
    /// Builds a runtime from a validated configuration. Shadow-backed
    /// configurations reserve the shadow region here; a failed reservation
    /// fails the whole runtime.
    pub fn new(config: RuntimeConfig) -> Result<Self, InitError> {
        config.validate()?;
        let zone = RedZone::new(config.scale, config.poison)?;

        let backend = if config.registration {
            Some(match config.backend {
                BackendKind::Buckets => Backend::Buckets(BucketIndex::new(zone.band())),
                BackendKind::Shadow => Backend::Shadow(ShadowMap::map(
                    zone.band(),
                    config.encoding,
                    config.address_space_bits,
                    config.shadow_base,
                )?),
            })
        } else {
            None
        };

        let mut config = config;
        let classes = if config.use_free_lists {
            // Pooled blocks carry live size prefixes inside their left
            // bands, so explicit poisoning (and with it the fast check) is
            // off in this mode; shadow state does the detecting.
            config.fast_check = false;
            Some(Mutex::new(SizeClassAllocator::new(zone.band())))
        } else {
            None
        };

        Ok(Self {
            config,
            zone,
            backend,
            classes,
        })
    }

    /// The effective configuration (after mode reconciliation).
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Guard-band width in bytes.
    #[must_use]
    pub fn band(&self) -> usize {
        self.zone.band()
    }

    /// Contended bucket-lock acquisitions so far (0 for other back-ends).
    #[must_use]
    pub fn lock_contention(&self) -> u64 {
        match &self.backend {
            Some(Backend::Buckets(index)) => index.lock_contention(),
            _ => 0,
        }
    }

    /// Interposed `malloc`: pads, paints, registers, and returns the
    /// pointer offset past the left band. Zero-byte requests return null.
    #[must_use]
    pub fn malloc(&self, size: usize) -> *mut u8 {
        if size == 0 {
            return ptr::null_mut();
        }
        if let Some(classes) = &self.classes {
            let Some(Backend::Shadow(shadow)) = &self.backend else {
                return ptr::null_mut();
            };
            return match classes.lock().allocate(size, shadow) {
                Some(user) => user as *mut u8,
                None => ptr::null_mut(),
            };
        }
        let Some(total) = size.checked_add(2 * self.zone.band()) else {
            return ptr::null_mut();
        };
        // SAFETY: passthrough allocation, released again in `free`.
        let raw = unsafe { platform::native_alloc(total) };
        if raw.is_null() {
            return ptr::null_mut();
        }
        self.finish_wrapped(raw, size)
    }

    /// Paints and registers the bands of a freshly allocated raw region and
    /// returns the user pointer. Rolls the allocation back when the
    /// registration is refused.
    fn finish_wrapped(&self, raw: *mut u8, size: usize) -> *mut u8 {
        let band = self.zone.band();
        if self.config.fast_check {
            // SAFETY: `raw` spans `size + 2 * band` writable bytes.
            unsafe {
                self.zone.paint(raw, 0);
                self.zone.paint(raw.add(band + size), 0);
            }
        }
        if let Some(backend) = &self.backend {
            let left = raw as usize;
            if backend.register(left, left + band + size).is_err() {
                // SAFETY: allocated above and never published.
                unsafe { platform::native_free(raw) };
                return ptr::null_mut();
            }
        }
        // SAFETY: the user region starts one band past the raw base.
        unsafe { raw.add(band) }
    }

    /// Interposed `free`. Null is a no-op. Size-class blocks return to
    /// their pool; native blocks are deregistered and released.
    pub fn free(&self, user: *mut u8) {
        if user.is_null() {
            return;
        }
        if let Some(classes) = &self.classes {
            if let Some(Backend::Shadow(shadow)) = &self.backend {
                let _ = classes.lock().deallocate(user as usize, shadow);
            }
            return;
        }
        let band = self.zone.band();
        // SAFETY: `user` came out of this facade, so the raw region starts
        // exactly one band earlier.
        let raw = unsafe { user.sub(band) };
        match &self.backend {
            Some(Backend::Buckets(index)) => {
                // A missing record means a foreign or already-freed
                // pointer; the release still happens, matching the
                // underlying allocator's tolerance.
                let _ = index.deregister(raw as usize);
            }
            Some(Backend::Shadow(shadow)) => {
                // SAFETY: live pointer from the native allocator.
                let usable = unsafe { platform::native_usable_size(raw) };
                if usable >= 2 * band {
                    let left = raw as usize;
                    // Allocator padding past the right band is swept into
                    // the freed span; over-poisoning spare bytes is
                    // harmless.
                    shadow.deregister(left, left + usable - band);
                }
            }
            None => {}
        }
        // SAFETY: `raw` came from the native allocator.
        unsafe { platform::native_free(raw) };
    }

    /// Interposed `calloc`: overflow-checked multiply, then a zeroed
    /// allocation.
    #[must_use]
    pub fn calloc(&self, count: usize, size: usize) -> *mut u8 {
        if count == 0 || size == 0 {
            return ptr::null_mut();
        }
        let Some(total) = count.checked_mul(size) else {
            return ptr::null_mut();
        };
        let user = self.malloc(total);
        if !user.is_null() {
            // SAFETY: `user` spans `total` writable bytes.
            unsafe { ptr::write_bytes(user, 0, total) };
        }
        user
    }

    /// Interposed `realloc`.
    ///
    /// Null pointer delegates to `malloc`; a zero size with a live pointer
    /// frees it and returns null (the documented resolution of otherwise
    /// unspecified behaviour). Otherwise: allocate fresh, copy
    /// `min(old, new)` bytes, free the old block. On allocation failure the
    /// old block is left untouched.
    #[must_use]
    pub fn realloc(&self, user: *mut u8, new_size: usize) -> *mut u8 {
        if user.is_null() {
            return if new_size == 0 {
                ptr::null_mut()
            } else {
                self.malloc(new_size)
            };
        }
        if new_size == 0 {
            self.free(user);
            return ptr::null_mut();
        }
        let fresh = self.malloc(new_size);
        if fresh.is_null() {
            return ptr::null_mut();
        }
        let old_size = self.user_size(user);
        if old_size == 0 {
            self.free(fresh);
            return ptr::null_mut();
        }
        // SAFETY: both regions are live and disjoint; the count is bounded
        // by the smaller of the two.
        unsafe { ptr::copy_nonoverlapping(user, fresh, old_size.min(new_size)) };
        self.free(user);
        fresh
    }

    /// Interposed aligned allocation. Unsupported (null) while the
    /// size-class allocator is active; the two modes are mutually exclusive
    /// for this entry point.
    #[must_use]
    pub fn memalign(&self, alignment: usize, size: usize) -> *mut u8 {
        if self.classes.is_some() {
            return ptr::null_mut();
        }
        if size == 0
            || !alignment.is_power_of_two()
            || alignment % std::mem::size_of::<usize>() != 0
        {
            return ptr::null_mut();
        }
        let Some(total) = size.checked_add(2 * self.zone.band()) else {
            return ptr::null_mut();
        };
        // SAFETY: passthrough aligned allocation, released in `free`.
        let raw = unsafe { platform::native_aligned_alloc(alignment, total) };
        if raw.is_null() {
            return ptr::null_mut();
        }
        self.finish_wrapped(raw, size)
    }

    /// User-visible size of a live allocation: the raw chunk's usable size
    /// minus both bands, or the prefix word in size-class mode.
    fn user_size(&self, user: *mut u8) -> usize {
        if self.classes.is_some() {
            // SAFETY: size-class blocks keep their request in the prefix.
            return unsafe { classalloc::read_size_prefix(user as usize) };
        }
        let band = self.zone.band();
        // SAFETY: the raw chunk begins one band before the user pointer.
        let usable = unsafe { platform::native_usable_size(user.sub(band)) };
        usable.saturating_sub(2 * band)
    }

    /// Classifies an access of `access_size` bytes at `addr`.
    ///
    /// Safe to call on any address the instrumented program is about to
    /// dereference, wild pointers included: the check only reads bytes the
    /// host access would touch anyway, then consults the back-end.
    pub fn check(&self, addr: usize, access_size: i32) -> Result<Verdict, CheckError> {
        check::classify(
            self.zone.poison(),
            self.config.fast_check,
            self.config.registration,
            self.backend.as_ref(),
            addr,
            access_size,
        )
    }

    /// Allocates through the facade and wraps the result for bounds-checked
    /// probing; the allocation is freed on drop.
    #[must_use]
    pub fn alloc_guarded(&self, len: usize) -> Option<GuardedAlloc<'_>> {
        let user = self.malloc(len);
        (!user.is_null()).then(|| GuardedAlloc {
            runtime: self,
            user: user as usize,
            len,
        })
    }

    /// Zeroed variant of [`Runtime::alloc_guarded`].
    #[must_use]
    pub fn calloc_guarded(&self, count: usize, size: usize) -> Option<GuardedAlloc<'_>> {
        let user = self.calloc(count, size);
        (!user.is_null()).then(|| GuardedAlloc {
            runtime: self,
            user: user as usize,
            len: count * size,
        })
    }

    /// Aligned variant of [`Runtime::alloc_guarded`].
    #[must_use]
    pub fn memalign_guarded(&self, alignment: usize, len: usize) -> Option<GuardedAlloc<'_>> {
        let user = self.memalign(alignment, len);
        (!user.is_null()).then(|| GuardedAlloc {
            runtime: self,
            user: user as usize,
            len,
        })
    }
}

/// A facade allocation with bounds-checked reads and writes, freed on drop.
/// Probing relative offsets — including offsets that deliberately land in
/// the guard bands — goes through [`GuardedAlloc::check`].
pub struct GuardedAlloc<'rt> {
    runtime: &'rt Runtime,
    user: usize,
    len: usize,
}

impl GuardedAlloc<'_> {
    /// User-region address.
    #[must_use]
    pub fn addr(&self) -> usize {
        self.user
    }

    /// User-region length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte at `offset`, when in bounds.
    #[must_use]
    pub fn read(&self, offset: usize) -> Option<u8> {
        if offset >= self.len {
            return None;
        }
        // SAFETY: in-bounds read of the live user region.
        Some(unsafe { ((self.user + offset) as *const u8).read() })
    }

    /// Writes a byte at `offset`; false when out of bounds.
    pub fn write(&mut self, offset: usize, byte: u8) -> bool {
        if offset >= self.len {
            return false;
        }
        // SAFETY: in-bounds write to the live user region.
        unsafe { ((self.user + offset) as *mut u8).write(byte) };
        true
    }

    /// Fills the user region with `byte`.
    pub fn fill(&mut self, byte: u8) {
        // SAFETY: the user region is `len` writable bytes.
        unsafe { ptr::write_bytes(self.user as *mut u8, byte, self.len) };
    }

    /// Classifies an access at a signed offset from the user pointer.
    pub fn check(&self, offset: isize, access_size: i32) -> Result<Verdict, CheckError> {
        self.runtime
            .check(self.user.wrapping_add_signed(offset), access_size)
    }
}

impl Drop for GuardedAlloc<'_> {
    fn drop(&mut self) {
        self.runtime.free(self.user as *mut u8);
    }
}

static RUNTIME: OnceLock<RwLock<Option<Runtime>>> = OnceLock::new();

fn handle() -> &'static RwLock<Option<Runtime>> {
    RUNTIME.get_or_init(|| RwLock::new(Runtime::new(RuntimeConfig::default()).ok()))
}

/// Runs `f` against the process-wide runtime. `None` after a failed
/// initialisation or an explicit [`shutdown`]; entry points then no-op.
pub fn with_runtime<T>(f: impl FnOnce(&Runtime) -> T) -> Option<T> {
    handle().read().as_ref().map(f)
}

/// First-call initialisation guard. True when the runtime is usable.
pub fn init() -> bool {
    handle().read().is_some()
}

/// Tears down the process-wide runtime, dropping registry state and
/// unmapping any shadow reservation. Subsequent entry points no-op.
pub fn shutdown() -> bool {
    handle().write().take().is_some()
}
