//! Guard-band registries.
//!
//! Two interchangeable back-ends answer the same question — does an address
//! fall inside a live guard band? — with opposite trade-offs: the bucketed
//! index ([`buckets`]) keeps exact per-allocation records behind two mutexes,
//! the shadow map ([`shadow`]) trades a 2^44-byte virtual reservation for
//! lock-free O(1) lookups.

pub mod buckets;
pub mod shadow;

use crate::error::RegistryError;

/// Outcome of an addressability query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The access touches no registered guard band.
    Addressable,
    /// At least one endpoint of the access falls in a guard band.
    Forbidden,
}

impl Verdict {
    /// True for [`Verdict::Forbidden`].
    #[must_use]
    pub fn is_forbidden(self) -> bool {
        matches!(self, Self::Forbidden)
    }
}

/// The active registry back-end.
pub enum Backend {
    Buckets(buckets::BucketIndex),
    Shadow(shadow::ShadowMap),
}

impl Backend {
    /// Records the guard-band pair `(left, right)`.
    pub fn register(&self, left: usize, right: usize) -> Result<(), RegistryError> {
        match self {
            Self::Buckets(index) => index.register(left, right),
            Self::Shadow(map) => {
                map.register(left, right);
                Ok(())
            }
        }
    }

    /// Classifies an access of `access` bytes starting at `addr`.
    #[must_use]
    pub fn query(&self, addr: usize, access: usize) -> Verdict {
        match self {
            Self::Buckets(index) => index.query(addr, access),
            Self::Shadow(map) => map.query(addr, access),
        }
    }
}
