//! Primary index
//!
//! The unique `_key` to storage-location map every collection carries.
//! Entries live in a fixed set of hash buckets; slots are append-only
//! within a bucket and removal leaves a hole, so an in-flight cursor
//! position stays valid across concurrent-looking mutations between
//! cursor batches.
//!
//! Scans:
//! - sequential: bucket-major slot order, visits each slot once
//! - reverse: the exact reverse of sequential order
//! - random: a fixed coprime stride over the slot space, visiting
//!   every slot exactly once per full cycle

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::error::{StorageError, StorageResult};
use crate::index::secondary::DocumentLocation;

const NR_BUCKETS: usize = 8;

/// Resumable cursor position within the primary index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketPosition {
    pub bucket: usize,
    pub slot: usize,
}

impl BucketPosition {
    /// Start-of-scan position for forward scans
    pub fn start() -> Self {
        BucketPosition { bucket: 0, slot: 0 }
    }

    /// Not-yet-positioned marker for reverse and random scans
    pub fn uninitialized() -> Self {
        BucketPosition {
            bucket: usize::MAX,
            slot: 0,
        }
    }

    fn finished() -> Self {
        BucketPosition {
            bucket: usize::MAX,
            slot: usize::MAX,
        }
    }
}

impl Default for BucketPosition {
    fn default() -> Self {
        BucketPosition::start()
    }
}

struct Slot {
    key: String,
    location: DocumentLocation,
}

pub struct PrimaryIndex {
    buckets: [Vec<Option<Slot>>; NR_BUCKETS],
    free_slots: [Vec<usize>; NR_BUCKETS],
    positions: HashMap<String, BucketPosition>,
    count: usize,
}

impl PrimaryIndex {
    pub fn new() -> Self {
        PrimaryIndex {
            buckets: std::array::from_fn(|_| Vec::new()),
            free_slots: std::array::from_fn(|_| Vec::new()),
            positions: HashMap::new(),
            count: 0,
        }
    }

    fn bucket_for(key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % NR_BUCKETS as u64) as usize
    }

    /// Location of the live revision under `key`
    pub fn lookup(&self, key: &str) -> Option<&DocumentLocation> {
        let pos = self.positions.get(key)?;
        self.buckets[pos.bucket][pos.slot]
            .as_ref()
            .map(|slot| &slot.location)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }

    /// Insert a new key. A key already present is a conflict.
    pub fn insert(&mut self, key: &str, location: DocumentLocation) -> StorageResult<()> {
        if self.positions.contains_key(key) {
            return Err(StorageError::conflict("unique constraint violated"));
        }
        let bucket = Self::bucket_for(key);
        let slot = Slot {
            key: key.to_string(),
            location,
        };
        let index = match self.free_slots[bucket].pop() {
            Some(index) => {
                self.buckets[bucket][index] = Some(slot);
                index
            }
            None => {
                self.buckets[bucket].push(Some(slot));
                self.buckets[bucket].len() - 1
            }
        };
        self.positions
            .insert(key.to_string(), BucketPosition { bucket, slot: index });
        self.count += 1;
        Ok(())
    }

    /// Point the key at a newer revision in place
    pub fn update_location(&mut self, key: &str, location: DocumentLocation) -> StorageResult<()> {
        let pos = self
            .positions
            .get(key)
            .ok_or_else(|| StorageError::document_not_found(key))?;
        match self.buckets[pos.bucket][pos.slot].as_mut() {
            Some(slot) => {
                slot.location = location;
                Ok(())
            }
            None => Err(StorageError::internal("primary slot out of sync")),
        }
    }

    /// Remove the key, returning its last location. Idempotent.
    pub fn remove(&mut self, key: &str) -> Option<DocumentLocation> {
        let pos = self.positions.remove(key)?;
        let slot = self.buckets[pos.bucket][pos.slot].take()?;
        self.free_slots[pos.bucket].push(pos.slot);
        self.count -= 1;
        Some(slot.location)
    }

    /// Number of live entries
    pub fn size(&self) -> usize {
        self.count
    }

    fn total_slots(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    fn flat_to_position(&self, mut flat: usize) -> BucketPosition {
        for (bucket, slots) in self.buckets.iter().enumerate() {
            if flat < slots.len() {
                return BucketPosition { bucket, slot: flat };
            }
            flat -= slots.len();
        }
        BucketPosition::finished()
    }

    fn position_to_flat(&self, position: BucketPosition) -> usize {
        self.buckets[..position.bucket]
            .iter()
            .map(Vec::len)
            .sum::<usize>()
            + position.slot
    }

    fn slot_at(&self, position: BucketPosition) -> Option<&Slot> {
        self.buckets
            .get(position.bucket)?
            .get(position.slot)?
            .as_ref()
    }

    /// Advance a forward scan by one live entry.
    ///
    /// `position` starts at [`BucketPosition::start`]; `total` counts
    /// slots examined so callers can tell a completed pass. Returns
    /// `None` once every slot has been visited.
    pub fn lookup_sequential(
        &self,
        position: &mut BucketPosition,
        total: &mut u64,
    ) -> Option<(&str, &DocumentLocation)> {
        loop {
            if position.bucket >= NR_BUCKETS {
                return None;
            }
            let slots = &self.buckets[position.bucket];
            if position.slot >= slots.len() {
                position.bucket += 1;
                position.slot = 0;
                continue;
            }
            let slot = position.slot;
            position.slot += 1;
            *total += 1;
            if let Some(entry) = &slots[slot] {
                return Some((&entry.key, &entry.location));
            }
        }
    }

    /// Advance a reverse scan by one live entry.
    ///
    /// `position` starts at [`BucketPosition::uninitialized`]. Yields
    /// entries in the exact reverse of sequential order.
    pub fn lookup_sequential_reverse(
        &self,
        position: &mut BucketPosition,
    ) -> Option<(&str, &DocumentLocation)> {
        if *position == BucketPosition::finished() {
            return None;
        }
        let mut flat = if *position == BucketPosition::uninitialized() {
            self.total_slots()
        } else {
            self.position_to_flat(*position)
        };
        while flat > 0 {
            flat -= 1;
            let pos = self.flat_to_position(flat);
            if let Some(entry) = self.slot_at(pos) {
                *position = pos;
                return Some((&entry.key, &entry.location));
            }
        }
        *position = BucketPosition::finished();
        None
    }

    /// Advance a pseudo-random scan by one live entry.
    ///
    /// The scan walks the slot space with a fixed stride coprime to the
    /// slot count captured on the first call, so every slot is visited
    /// exactly once per cycle. `initial` and `step` start at
    /// [`BucketPosition::uninitialized`] and 0; `total` receives the
    /// captured slot count.
    pub fn lookup_random(
        &self,
        initial: &mut BucketPosition,
        position: &mut BucketPosition,
        step: &mut u64,
        total: &mut u64,
    ) -> Option<(&str, &DocumentLocation)> {
        if *step == 0 {
            let slots = self.total_slots();
            if slots == 0 {
                return None;
            }
            *total = slots as u64;
            *initial = self.flat_to_position(self.count % slots);
        }
        let start = self.position_to_flat(*initial) as u64;
        let stride = coprime_stride(*total);
        while *step < *total {
            let flat = (start + *step * stride) % *total;
            *step += 1;
            let pos = self.flat_to_position(flat as usize);
            if let Some(entry) = self.slot_at(pos) {
                *position = pos;
                return Some((&entry.key, &entry.location));
            }
        }
        None
    }
}

impl Default for PrimaryIndex {
    fn default() -> Self {
        PrimaryIndex::new()
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

fn coprime_stride(n: u64) -> u64 {
    if n <= 2 {
        return 1;
    }
    let mut stride = n / 2 + 1;
    while gcd(stride, n) != 1 {
        stride += 1;
    }
    stride
}
