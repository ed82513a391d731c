//! Red-zone sizing and poison painting.

use crate::config::{MAX_SCALE, MIN_SCALE};
use crate::error::ConfigError;

/// Band width for a scale value: `2^scale` bytes, scale ∈ [3, 10].
pub fn size_for_scale(scale: usize) -> Result<usize, ConfigError> {
    if !(MIN_SCALE..=MAX_SCALE).contains(&scale) {
        return Err(ConfigError::ScaleOutOfRange(scale));
    }
    Ok(1 << scale)
}

/// Paints guard bands with the configured poison byte.
#[derive(Debug, Clone, Copy)]
pub struct RedZone {
    band: usize,
    poison: u8,
}

impl RedZone {
    pub fn new(scale: usize, poison: u8) -> Result<Self, ConfigError> {
        Ok(Self {
            band: size_for_scale(scale)?,
            poison,
        })
    }

    /// Band width in bytes.
    #[must_use]
    pub fn band(&self) -> usize {
        self.band
    }

    /// The poison byte.
    #[must_use]
    pub fn poison(&self) -> u8 {
        self.poison
    }

    /// Fills a band with the poison byte.
    ///
    /// An explicit `len` is honoured only when it is a non-zero multiple of
    /// 8 (non-heap objects may carry custom band widths); any other value is
    /// coerced to the configured band width.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of the effective length.
    pub unsafe fn paint(&self, ptr: *mut u8, len: usize) {
        let amount = if len == 0 || len % 8 != 0 {
            self.band
        } else {
            len
        };
        // SAFETY: caller guarantees the range is writable.
        unsafe { std::ptr::write_bytes(ptr, self.poison, amount) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_to_size() {
        assert_eq!(size_for_scale(3), Ok(8));
        assert_eq!(size_for_scale(5), Ok(32));
        assert_eq!(size_for_scale(7), Ok(128));
        assert_eq!(size_for_scale(10), Ok(1024));
        assert_eq!(size_for_scale(2), Err(ConfigError::ScaleOutOfRange(2)));
        assert_eq!(size_for_scale(11), Err(ConfigError::ScaleOutOfRange(11)));
    }

    #[test]
    fn paint_writes_exactly_one_band() {
        let zone = RedZone::new(3, 0x2A).expect("zone");
        let mut buf = [0u8; 16];
        // SAFETY: buf is 16 bytes, band is 8.
        unsafe { zone.paint(buf.as_mut_ptr(), 0) };
        assert_eq!(&buf[..8], &[0x2A; 8]);
        assert_eq!(&buf[8..], &[0u8; 8]);
    }

    #[test]
    fn paint_coerces_unaligned_lengths() {
        let zone = RedZone::new(3, 0xFF).expect("zone");
        let mut buf = [0u8; 24];
        // 13 is not a multiple of 8: coerced to the 8-byte band.
        // SAFETY: buf is large enough for either length.
        unsafe { zone.paint(buf.as_mut_ptr(), 13) };
        assert_eq!(&buf[..8], &[0xFF; 8]);
        assert_eq!(buf[8], 0);
        // 16 is honoured as given.
        buf.fill(0);
        // SAFETY: as above.
        unsafe { zone.paint(buf.as_mut_ptr(), 16) };
        assert_eq!(&buf[..16], &[0xFF; 16]);
        assert_eq!(buf[16], 0);
    }
}
