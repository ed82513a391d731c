//! Back-end A: bucketed guard-band index.
//!
//! Addresses hash to one of 4096 buckets by folding their page number; each
//! bucket holds a singly-linked list of guard-band records sorted by
//! left-band address. Records live in a per-half slab (`Vec` plus free list)
//! and link by index, so no heap node is ever shared between two bucket
//! lists: an allocation whose bands hash to different buckets gets two
//! records with identical payload, and splicing one list can never corrupt
//! the other.
//!
//! The bucket space is partitioned under exactly two mutexes — buckets
//! [0, 2048) under lock 0, [2048, 4096) under lock 1 — and a cross-bucket
//! operation that spans both halves acquires them strictly one at a time
//! (left half first, then right, with rollback on failure). Queries for a
//! bucket hold that bucket's lock and tolerate the narrow window in which
//! only one half of a cross-bucket registration is visible.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::error::RegistryError;
use crate::platform;
use crate::registry::Verdict;

/// Number of hash buckets.
pub const BUCKET_COUNT: usize = 4096;

/// Number of mutexes partitioning the bucket space.
pub const LOCK_COUNT: usize = 2;

const BUCKETS_PER_LOCK: usize = BUCKET_COUNT / LOCK_COUNT;

/// One guard-band pair. `next` is an index into the owning half's slab.
#[derive(Debug, Clone, Copy)]
struct Record {
    left: usize,
    right: usize,
    next: Option<u32>,
}

/// List head/tail plus length for one bucket.
#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    head: Option<u32>,
    tail: Option<u32>,
}

impl Bucket {
    const EMPTY: Self = Self {
        count: 0,
        head: None,
        tail: None,
    };
}

/// Half of the bucket table together with the record slab it owns.
struct Half {
    buckets: Vec<Bucket>,
    records: Vec<Record>,
    free: Vec<u32>,
}

impl Half {
    fn new() -> Self {
        Self {
            buckets: vec![Bucket::EMPTY; BUCKETS_PER_LOCK],
            records: Vec::new(),
            free: Vec::new(),
        }
    }

    fn take_slot(&mut self, left: usize, right: usize) -> u32 {
        let record = Record {
            left,
            right,
            next: None,
        };
        if let Some(idx) = self.free.pop() {
            self.records[idx as usize] = record;
            idx
        } else {
            self.records.push(record);
            (self.records.len() - 1) as u32
        }
    }

    /// Inserts `(left, right)` into the bucket at `local`, keeping the list
    /// sorted by left-band address. Heap addresses grow mostly
    /// monotonically, so a new record usually lands past the current tail
    /// and appends in O(1).
    fn insert(&mut self, local: usize, left: usize, right: usize) -> Result<(), RegistryError> {
        let mut bucket = self.buckets[local];

        let position = match (bucket.head, bucket.tail) {
            (None, _) => Position::First,
            (Some(_), Some(tail)) if self.records[tail as usize].right < left => {
                Position::AfterTail(tail)
            }
            (Some(head), Some(_)) => {
                let mut prev: Option<u32> = None;
                let mut cursor = Some(head);
                let mut found = None;
                while let Some(idx) = cursor {
                    let current = self.records[idx as usize];
                    if current.left == left || current.right == right {
                        return Err(RegistryError::AlreadyRegistered { addr: left });
                    }
                    if right < current.left {
                        found = Some((prev, idx));
                        break;
                    }
                    prev = Some(idx);
                    cursor = current.next;
                }
                match found {
                    Some((None, at)) => Position::BeforeHead(at),
                    Some((Some(before), at)) => Position::Between(before, at),
                    // Overlapping but not duplicate: keep it reachable at
                    // the end of the list.
                    None => match bucket.tail {
                        Some(tail) => Position::AfterTail(tail),
                        None => Position::First,
                    },
                }
            }
            _ => Position::First,
        };

        let idx = self.take_slot(left, right);
        match position {
            Position::First => {
                bucket.head = Some(idx);
                bucket.tail = Some(idx);
            }
            Position::AfterTail(tail) => {
                self.records[tail as usize].next = Some(idx);
                bucket.tail = Some(idx);
            }
            Position::BeforeHead(at) => {
                self.records[idx as usize].next = Some(at);
                bucket.head = Some(idx);
            }
            Position::Between(before, at) => {
                self.records[idx as usize].next = Some(at);
                self.records[before as usize].next = Some(idx);
            }
        }
        bucket.count += 1;
        self.buckets[local] = bucket;
        Ok(())
    }

    /// Splices out the record matching `left` (or the optional `right`, for
    /// cross-bucket twins) and returns its payload.
    fn remove(
        &mut self,
        local: usize,
        left: usize,
        right: Option<usize>,
    ) -> Result<(usize, usize), RegistryError> {
        let mut bucket = self.buckets[local];
        if bucket.count == 0 {
            return Err(RegistryError::NotRegistered { addr: left });
        }

        let mut prev: Option<u32> = None;
        let mut cursor = bucket.head;
        while let Some(idx) = cursor {
            let current = self.records[idx as usize];
            let matches = current.left == left || right.is_some_and(|r| current.right == r);
            if matches {
                match prev {
                    None => bucket.head = current.next,
                    Some(before) => self.records[before as usize].next = current.next,
                }
                if bucket.tail == Some(idx) {
                    bucket.tail = prev;
                }
                bucket.count -= 1;
                if bucket.count == 0 {
                    bucket.head = None;
                    bucket.tail = None;
                }
                self.free.push(idx);
                self.buckets[local] = bucket;
                return Ok((current.left, current.right));
            }
            prev = Some(idx);
            cursor = current.next;
        }
        Err(RegistryError::NotRegistered { addr: left })
    }
}

enum Position {
    First,
    AfterTail(u32),
    BeforeHead(u32),
    Between(u32, u32),
}

/// The bucketed guard-band index.
pub struct BucketIndex {
    halves: [Mutex<Half>; LOCK_COUNT],
    exponent: u32,
    band: usize,
    contended: AtomicU64,
}

impl BucketIndex {
    /// Creates an empty index for bands of `band` bytes. The page exponent
    /// used by the address hash is queried from the platform once.
    #[must_use]
    pub fn new(band: usize) -> Self {
        Self {
            halves: [Mutex::new(Half::new()), Mutex::new(Half::new())],
            exponent: platform::page_exponent(),
            band,
            contended: AtomicU64::new(0),
        }
    }

    /// Bucket for an address: fold the page number by XOR and mask.
    /// Deterministic and side-effect free.
    #[must_use]
    pub fn bucket_of(&self, addr: usize) -> usize {
        let page = addr >> self.exponent;
        let folded = page ^ (page >> 8) ^ (page >> 16) ^ (page >> 24);
        folded & (BUCKET_COUNT - 1)
    }

    fn lock_index(bucket: usize) -> usize {
        bucket / BUCKETS_PER_LOCK
    }

    fn local_index(bucket: usize) -> usize {
        bucket % BUCKETS_PER_LOCK
    }

    fn lock_half(&self, which: usize) -> MutexGuard<'_, Half> {
        if let Some(guard) = self.halves[which].try_lock() {
            return guard;
        }
        self.contended.fetch_add(1, Ordering::Relaxed);
        self.halves[which].lock()
    }

    /// Times a bucket lock was found held by another thread.
    #[must_use]
    pub fn lock_contention(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }

    /// Number of records currently listed in `bucket`.
    #[must_use]
    pub fn bucket_len(&self, bucket: usize) -> usize {
        let guard = self.lock_half(Self::lock_index(bucket));
        guard.buckets[Self::local_index(bucket)].count as usize
    }

    /// Registers the guard-band pair `(left, right)`.
    ///
    /// When the two bands hash to different buckets, two records with
    /// identical payload are inserted, one per bucket. The two halves are
    /// never locked simultaneously: the left insertion completes and
    /// releases its lock before the right insertion starts, and a failure
    /// on the right side reacquires the left lock to undo the first
    /// insertion.
    pub fn register(&self, left: usize, right: usize) -> Result<(), RegistryError> {
        debug_assert!(right > left + self.band, "user region must be non-empty");
        let left_bucket = self.bucket_of(left);
        let right_bucket = self.bucket_of(right);

        if left_bucket == right_bucket {
            let mut half = self.lock_half(Self::lock_index(left_bucket));
            return half.insert(Self::local_index(left_bucket), left, right);
        }

        let left_lock = Self::lock_index(left_bucket);
        let right_lock = Self::lock_index(right_bucket);

        if left_lock == right_lock {
            let mut half = self.lock_half(left_lock);
            half.insert(Self::local_index(left_bucket), left, right)?;
            if let Err(err) = half.insert(Self::local_index(right_bucket), left, right) {
                half.remove(Self::local_index(left_bucket), left, Some(right))
                    .map_err(|_| RegistryError::RollbackFailed)?;
                return Err(err);
            }
            return Ok(());
        }

        {
            let mut first = self.lock_half(left_lock);
            first.insert(Self::local_index(left_bucket), left, right)?;
        }
        let second_result = {
            let mut second = self.lock_half(right_lock);
            second.insert(Self::local_index(right_bucket), left, right)
        };
        if let Err(err) = second_result {
            let mut first = self.lock_half(left_lock);
            first
                .remove(Self::local_index(left_bucket), left, Some(right))
                .map_err(|_| RegistryError::RollbackFailed)?;
            return Err(err);
        }
        Ok(())
    }

    /// Deregisters the pair whose left band starts at `left`.
    ///
    /// Only the left band is recoverable from a free (user pointer minus the
    /// band width); the right band is read back from the record, and its
    /// twin — if the pair was cross-bucket — is spliced out of the second
    /// bucket afterwards.
    pub fn deregister(&self, left: usize) -> Result<(), RegistryError> {
        let left_bucket = self.bucket_of(left);
        let left_lock = Self::lock_index(left_bucket);

        let mut guard = self.lock_half(left_lock);
        let (_, right) = guard.remove(Self::local_index(left_bucket), left, None)?;

        let right_bucket = self.bucket_of(right);
        if right_bucket == left_bucket {
            return Ok(());
        }

        if Self::lock_index(right_bucket) == left_lock {
            guard
                .remove(Self::local_index(right_bucket), left, Some(right))
                .map(|_| ())
        } else {
            drop(guard);
            let mut other = self.lock_half(Self::lock_index(right_bucket));
            other
                .remove(Self::local_index(right_bucket), left, Some(right))
                .map(|_| ())
        }
    }

    /// Classifies an access of `access` bytes (clamped to ≥ 1) at `addr`.
    ///
    /// An address below the bucket's first left band or at/after
    /// `tail.right + band` lies outside everything the bucket tracks and is
    /// reported addressable: the index deliberately has no visibility
    /// beyond its recorded ranges.
    #[must_use]
    pub fn query(&self, addr: usize, access: usize) -> Verdict {
        let access = access.max(1);
        let bucket_idx = self.bucket_of(addr);
        let guard = self.lock_half(Self::lock_index(bucket_idx));
        let bucket = guard.buckets[Self::local_index(bucket_idx)];

        let (Some(head), Some(tail)) = (bucket.head, bucket.tail) else {
            return Verdict::Addressable;
        };
        if addr < guard.records[head as usize].left {
            return Verdict::Addressable;
        }
        if addr >= guard.records[tail as usize].right + self.band {
            return Verdict::Addressable;
        }

        let last = addr + (access - 1);
        let mut cursor = Some(head);
        while let Some(idx) = cursor {
            let record = guard.records[idx as usize];
            if self.in_band(addr, record) || self.in_band(last, record) {
                return Verdict::Forbidden;
            }
            cursor = record.next;
        }
        Verdict::Addressable
    }

    fn in_band(&self, addr: usize, record: Record) -> bool {
        (record.left..record.left + self.band).contains(&addr)
            || (record.right..record.right + self.band).contains(&addr)
    }

    #[cfg(test)]
    fn bucket_records(&self, bucket: usize) -> Vec<(usize, usize)> {
        let guard = self.lock_half(Self::lock_index(bucket));
        let mut out = Vec::new();
        let mut cursor = guard.buckets[Self::local_index(bucket)].head;
        while let Some(idx) = cursor {
            let record = guard.records[idx as usize];
            out.push((record.left, record.right));
            cursor = record.next;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::page_size;

    const BAND: usize = 32;

    fn index() -> BucketIndex {
        BucketIndex::new(BAND)
    }

    /// A synthetic pair entirely inside one page: both bands share a bucket.
    fn same_page_pair(page: usize, offset: usize, user: usize) -> (usize, usize) {
        let left = page * page_size() + offset;
        (left, left + BAND + user)
    }

    #[test]
    fn bucket_mapping_is_deterministic_and_in_range() {
        let idx = index();
        for addr in [0usize, 0x1000, 0xdead_b000, usize::MAX / 3] {
            let bucket = idx.bucket_of(addr);
            assert!(bucket < BUCKET_COUNT);
            assert_eq!(bucket, idx.bucket_of(addr));
        }
        // Addresses within one page always share a bucket.
        let base = 77 * page_size();
        assert_eq!(idx.bucket_of(base), idx.bucket_of(base + page_size() - 1));
    }

    #[test]
    fn register_query_deregister_same_bucket() {
        let idx = index();
        let (left, right) = same_page_pair(3, 64, 100);
        idx.register(left, right).expect("register");

        let user = left + BAND;
        assert_eq!(idx.query(user, 1), Verdict::Addressable);
        assert_eq!(idx.query(user + 99, 1), Verdict::Addressable);
        assert_eq!(idx.query(left, 1), Verdict::Forbidden);
        assert_eq!(idx.query(left + BAND - 1, 1), Verdict::Forbidden);
        assert_eq!(idx.query(right, 1), Verdict::Forbidden);
        assert_eq!(idx.query(right + BAND - 1, 1), Verdict::Forbidden);
        // Beyond the bucket's active range on either side.
        assert_eq!(idx.query(left.wrapping_sub(1), 1), Verdict::Addressable);
        assert_eq!(idx.query(right + BAND, 1), Verdict::Addressable);

        idx.deregister(left).expect("deregister");
        assert_eq!(idx.query(left, 1), Verdict::Addressable);
        assert_eq!(idx.bucket_len(idx.bucket_of(left)), 0);
    }

    #[test]
    fn wide_access_is_forbidden_when_either_endpoint_lands_in_a_band() {
        let idx = index();
        let (left, right) = same_page_pair(9, 128, 16);
        idx.register(left, right).expect("register");
        let user = left + BAND;

        // Last byte slips into the right band.
        assert_eq!(idx.query(user + 14, 4), Verdict::Forbidden);
        assert_eq!(idx.query(user + 14, 2), Verdict::Addressable);
        assert_eq!(idx.query(user + 13, 8), Verdict::Forbidden);
        // Non-positive access sizes are clamped to one byte.
        assert_eq!(idx.query(user + 15, 0), Verdict::Addressable);
    }

    #[test]
    fn duplicate_endpoints_are_rejected() {
        let idx = index();
        let (left, right) = same_page_pair(5, 512, 64);
        idx.register(left, right).expect("first register");
        assert_eq!(
            idx.register(left, right),
            Err(RegistryError::AlreadyRegistered { addr: left })
        );
        // Sharing only one endpoint is enough to reject.
        assert_eq!(
            idx.register(left, right + 8),
            Err(RegistryError::AlreadyRegistered { addr: left })
        );
        assert_eq!(idx.bucket_len(idx.bucket_of(left)), 1);
    }

    #[test]
    fn lists_stay_sorted_under_out_of_order_insertion() {
        let idx = index();
        let page = 21;
        let (a_left, a_right) = same_page_pair(page, 1024, 32);
        let (b_left, b_right) = same_page_pair(page, 256, 32);
        let (c_left, c_right) = same_page_pair(page, 2048, 32);

        idx.register(a_left, a_right).expect("a");
        idx.register(b_left, b_right).expect("b");
        idx.register(c_left, c_right).expect("c");

        let bucket = idx.bucket_of(a_left);
        assert_eq!(
            idx.bucket_records(bucket),
            vec![(b_left, b_right), (a_left, a_right), (c_left, c_right)]
        );

        idx.deregister(a_left).expect("middle removal");
        assert_eq!(
            idx.bucket_records(bucket),
            vec![(b_left, b_right), (c_left, c_right)]
        );
    }

    #[test]
    fn cross_bucket_pairs_materialise_two_records() {
        let idx = index();
        // Left band at the end of page 0, right band in page 1.
        let left = page_size() - BAND;
        let right = left + BAND + 64;
        let left_bucket = idx.bucket_of(left);
        let right_bucket = idx.bucket_of(right);
        assert_ne!(left_bucket, right_bucket);

        idx.register(left, right).expect("register");
        assert_eq!(idx.bucket_len(left_bucket), 1);
        assert_eq!(idx.bucket_len(right_bucket), 1);
        assert_eq!(idx.query(left, 1), Verdict::Forbidden);
        assert_eq!(idx.query(right, 1), Verdict::Forbidden);

        idx.deregister(left).expect("deregister");
        assert_eq!(idx.bucket_len(left_bucket), 0);
        assert_eq!(idx.bucket_len(right_bucket), 0);
    }

    #[test]
    fn failed_cross_bucket_insert_rolls_back_the_first_half() {
        let idx = index();
        let left = page_size() - BAND;
        let right = left + BAND + 64;
        idx.register(left, right).expect("first pair");

        // A different left band, same right band: the second insertion hits
        // the duplicate and the first one must be undone.
        let other_left = 3 * page_size() - BAND;
        let other_left_bucket = idx.bucket_of(other_left);
        assert_ne!(other_left_bucket, idx.bucket_of(right));
        let before = idx.bucket_len(other_left_bucket);

        assert_eq!(
            idx.register(other_left, right),
            Err(RegistryError::AlreadyRegistered { addr: other_left })
        );
        assert_eq!(idx.bucket_len(other_left_bucket), before);
        assert_eq!(idx.bucket_len(idx.bucket_of(right)), 1);
    }

    #[test]
    fn rollback_spanning_both_locks_reacquires_the_first() {
        let idx = index();
        let left = page_size() - BAND;
        let right = left + BAND + 64;
        idx.register(left, right).expect("first pair");

        // Page 2048 folds into the upper half of the bucket space, so this
        // left band sits under the other mutex than `right`.
        let far_left = 2048 * page_size();
        let far_bucket = idx.bucket_of(far_left);
        assert_ne!(
            BucketIndex::lock_index(far_bucket),
            BucketIndex::lock_index(idx.bucket_of(right))
        );

        assert_eq!(
            idx.register(far_left, right),
            Err(RegistryError::AlreadyRegistered { addr: far_left })
        );
        assert_eq!(idx.bucket_len(far_bucket), 0);
        assert_eq!(idx.bucket_len(idx.bucket_of(right)), 1);
    }

    #[test]
    fn deregistering_unknown_band_fails() {
        let idx = index();
        let (left, right) = same_page_pair(2, 96, 48);
        idx.register(left, right).expect("register");
        assert_eq!(
            idx.deregister(left + 8),
            Err(RegistryError::NotRegistered { addr: left + 8 })
        );
        idx.deregister(left).expect("deregister");
        assert_eq!(
            idx.deregister(left),
            Err(RegistryError::NotRegistered { addr: left })
        );
    }

    #[test]
    fn record_count_tracks_live_pairs_and_twins() {
        let idx = index();
        let mut pairs = Vec::new();
        for i in 0..16 {
            let (left, right) = same_page_pair(40, 64 + i * 128, 64);
            idx.register(left, right).expect("register");
            pairs.push(left);
        }
        let bucket = idx.bucket_of(pairs[0]);
        assert_eq!(idx.bucket_len(bucket), 16);
        for left in pairs {
            idx.deregister(left).expect("deregister");
        }
        assert_eq!(idx.bucket_len(bucket), 0);
    }
}
