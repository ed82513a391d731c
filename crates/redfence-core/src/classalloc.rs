//! Pre-allocated size-class allocator.
//!
//! An array of free-lists indexed by `log2(size) − 3` after the size is
//! padded to a multiple of 8 and rounded to a power of two, so requests of
//! 1, 2 and 4 bytes all share the 8-byte class. The first allocation of a
//! class maps one contiguous region and carves it into ten equal blocks
//! whose guard bands abut: the right band of block k doubles as the left
//! band of block k+1, which is why a region of N blocks needs only N+1
//! bands. The class size is stashed in the 8 bytes immediately preceding
//! each user region (inside the left band), so deallocation recovers the
//! class without a per-block map.
//!
//! Only meaningful on top of the shadow back-end; pooled blocks keep their
//! bands poisoned in shadow while they wait on a free-list.

use crate::error::PlatformError;
use crate::platform;
use crate::registry::shadow::ShadowMap;

/// Number of size classes (class 0 is 8 bytes, class 47 is 2^50).
pub const CLASS_COUNT: usize = 48;

/// Blocks carved per freshly mapped region.
pub const BLOCKS_PER_REGION: usize = 10;

/// Width of the size prefix stored before each user region.
const SIZE_PREFIX: usize = 8;

/// A pooled block. The position in the class's stack is the list link.
#[derive(Debug, Clone, Copy)]
struct FreeBlock {
    region: usize,
    left_band: usize,
    right_band: usize,
}

/// One free-list.
#[derive(Debug, Default)]
struct SizeClass {
    free: Vec<FreeBlock>,
    size: usize,
}

/// Size rounded up to a multiple of 8 and then to a power of two.
#[must_use]
pub fn normalized_size(size: usize) -> Option<usize> {
    let padded = size.checked_add(7)? & !7;
    padded.checked_next_power_of_two()
}

/// Free-list index for a request, when one of the 48 classes covers it.
#[must_use]
pub fn class_index(size: usize) -> Option<usize> {
    let normalized = normalized_size(size)?;
    let index = (normalized.trailing_zeros() as usize).checked_sub(3)?;
    (index < CLASS_COUNT).then_some(index)
}

/// Reads back the request size stashed before a user region.
///
/// # Safety
///
/// `user` must be the region address of a block previously handed out by
/// [`SizeClassAllocator::allocate`].
#[must_use]
pub unsafe fn read_size_prefix(user: usize) -> usize {
    // SAFETY: the prefix word occupies the last 8 bytes of the left band.
    unsafe { ((user - SIZE_PREFIX) as *const usize).read() }
}

/// The size-class allocator state. Callers serialise access through one
/// process-wide mutex in the facade.
pub struct SizeClassAllocator {
    classes: Vec<SizeClass>,
    band: usize,
}

impl SizeClassAllocator {
    #[must_use]
    pub fn new(band: usize) -> Self {
        let classes = (0..CLASS_COUNT).map(|_| SizeClass::default()).collect();
        Self { classes, band }
    }

    /// Pops a block for `size` bytes, mapping a fresh region for the class
    /// if its list is empty. The block's bands are registered with the
    /// shadow map and the original request size is written to the prefix.
    /// Returns the user-region address.
    pub fn allocate(&mut self, size: usize, shadow: &ShadowMap) -> Option<usize> {
        let class_size = normalized_size(size)?;
        let index = class_index(size)?;
        if self.classes[index].free.is_empty() {
            self.refill(index, class_size, shadow).ok()?;
        }
        let block = self.classes[index].free.pop()?;
        shadow.register(block.left_band, block.right_band);
        // SAFETY: the prefix word lies inside the mapped left band.
        unsafe { ((block.region - SIZE_PREFIX) as *mut usize).write(size) };
        Some(block.region)
    }

    /// Returns a block to its free-list and re-poisons its whole span in
    /// shadow. Returns the recovered request size, or `None` when the
    /// prefix does not name a known class.
    pub fn deallocate(&mut self, user: usize, shadow: &ShadowMap) -> Option<usize> {
        // SAFETY: `user` came from `allocate`; the prefix is intact because
        // pooled blocks are never poisoned in real memory, only in shadow.
        let requested = unsafe { read_size_prefix(user) };
        let index = class_index(requested)?;
        let class_size = normalized_size(requested)?;
        let left_band = user - self.band;
        let right_band = user + class_size;
        shadow.deregister(left_band, right_band);
        self.classes[index].free.push(FreeBlock {
            region: user,
            left_band,
            right_band,
        });
        Some(requested)
    }

    /// Blocks currently pooled for class `index`.
    #[must_use]
    pub fn pooled(&self, index: usize) -> usize {
        self.classes.get(index).map_or(0, |class| class.free.len())
    }

    /// Block size served by class `index`; 0 before its first refill.
    #[must_use]
    pub fn class_size(&self, index: usize) -> usize {
        self.classes.get(index).map_or(0, |class| class.size)
    }

    fn refill(
        &mut self,
        index: usize,
        class_size: usize,
        shadow: &ShadowMap,
    ) -> Result<(), PlatformError> {
        let len = BLOCKS_PER_REGION * (class_size + self.band) + self.band;
        let start = platform::map_anonymous(len)? as usize;
        self.classes[index].size = class_size;

        let mut region = start + self.band;
        for _ in 0..BLOCKS_PER_REGION {
            let left_band = region - self.band;
            let right_band = region + class_size;
            shadow.poison_band(left_band);
            shadow.poison_band(right_band);
            // SAFETY: the prefix word lies inside the freshly mapped region.
            unsafe { ((region - SIZE_PREFIX) as *mut usize).write(class_size) };
            self.classes[index].free.push(FreeBlock {
                region,
                left_band,
                right_band,
            });
            region = right_band + self.band;
        }
        Ok(())
    }
}
