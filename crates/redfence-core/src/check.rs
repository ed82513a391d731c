//! The interposed access check: fast path plus slow path.
//!
//! The fast path compares the first and last byte of the access against the
//! poison byte — two reads and two compares, which is what absorbs the
//! per-access cost in the common case. Only when a byte happens to equal
//! the poison value does the slow path consult the registry back-end to
//! tell a real guard-band hit from a coincidental match in user data.

use crate::error::CheckError;
use crate::registry::{Backend, Verdict};

/// Classifies an access of `access_size` bytes at `addr`.
///
/// `access_size` values of zero or below are treated as one byte. A null
/// address is an internal error (the instrumentation never emits one for a
/// reachable access). The check never blocks and has no side effects; two
/// consecutive calls with the same arguments return the same verdict.
///
/// The byte reads are volatile and touch only addresses the instrumented
/// program is about to dereference itself, so the check introduces no
/// access the host was not already making.
pub(crate) fn classify(
    poison: u8,
    fast_check: bool,
    registration: bool,
    backend: Option<&Backend>,
    addr: usize,
    access_size: i32,
) -> Result<Verdict, CheckError> {
    if addr == 0 {
        return Err(CheckError::NullAddress);
    }
    let access = if access_size <= 0 {
        1
    } else {
        access_size as usize
    };
    let ptr = addr as *const u8;

    if registration {
        let backend = backend.ok_or(CheckError::BackendUnavailable)?;
        if fast_check {
            // SAFETY: single-byte volatile reads of the access's endpoints;
            // see the function contract above.
            let (first, last) = unsafe { (ptr.read_volatile(), ptr.add(access - 1).read_volatile()) };
            if first != poison && last != poison {
                return Ok(Verdict::Addressable);
            }
        }
        return Ok(backend.query(addr, access));
    }

    if !fast_check {
        // Nothing to consult: the runtime is configured as a no-op.
        return Ok(Verdict::Addressable);
    }

    // Fast-only mode: a poison match is reported without corroboration.
    // False positives on user data that equals the poison byte are the
    // documented cost of running without a back-end.
    // SAFETY: as above.
    let (first, last) = unsafe { (ptr.read_volatile(), ptr.add(access - 1).read_volatile()) };
    if first == poison || last == poison {
        Ok(Verdict::Forbidden)
    } else {
        Ok(Verdict::Addressable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::buckets::BucketIndex;

    #[test]
    fn null_address_is_an_internal_error() {
        assert_eq!(
            classify(0xFF, true, false, None, 0, 1),
            Err(CheckError::NullAddress)
        );
    }

    #[test]
    fn registration_without_backend_is_an_internal_error() {
        let buf = [0u8; 8];
        assert_eq!(
            classify(0xFF, true, true, None, buf.as_ptr() as usize, 1),
            Err(CheckError::BackendUnavailable)
        );
    }

    #[test]
    fn fast_only_mode_flags_poison_bytes() {
        let buf = [0x11u8, 0x22, 0xFF, 0x44];
        let base = buf.as_ptr() as usize;
        assert_eq!(
            classify(0xFF, true, false, None, base, 1),
            Ok(Verdict::Addressable)
        );
        assert_eq!(
            classify(0xFF, true, false, None, base + 2, 1),
            Ok(Verdict::Forbidden)
        );
        // Either endpoint matching is enough.
        assert_eq!(
            classify(0xFF, true, false, None, base, 3),
            Ok(Verdict::Forbidden)
        );
        assert_eq!(
            classify(0xFF, true, false, None, base, 2),
            Ok(Verdict::Addressable)
        );
    }

    #[test]
    fn slow_path_rescues_coincidental_matches() {
        let backend = Backend::Buckets(BucketIndex::new(32));
        // User data that happens to contain the poison byte, with nothing
        // registered: the fast path trips, the back-end overrules it.
        let buf = [0xFFu8; 16];
        let verdict = classify(
            0xFF,
            true,
            true,
            Some(&backend),
            buf.as_ptr() as usize,
            4,
        );
        assert_eq!(verdict, Ok(Verdict::Addressable));
    }

    #[test]
    fn disabled_runtime_always_answers_addressable() {
        let buf = [0xFFu8; 4];
        assert_eq!(
            classify(0xFF, false, false, None, buf.as_ptr() as usize, 4),
            Ok(Verdict::Addressable)
        );
    }
}
