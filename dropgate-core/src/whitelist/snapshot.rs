//! Immutable whitelist tables.
//!
//! A snapshot is a fixed number of slots. Keys land in a slot by the sum of
//! their bytes; keys sharing a slot are chained in that slot's bucket, up to a
//! bounded depth. The total number of entries never exceeds the slot count.
//! Once built, a snapshot is never mutated; refreshes build a new one.

use crate::whitelist::permitted::PermittedServers;

/// Slot index for `key` in a table of `capacity` slots.
///
/// `capacity` must be non-zero.
pub fn slot_for(key: &str, capacity: usize) -> usize {
    key.bytes()
        .fold(0usize, |sum, byte| sum.wrapping_add(usize::from(byte)))
        % capacity
}

/// One published key and its permitted servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistEntry {
    key: String,
    permitted: PermittedServers,
}

impl WhitelistEntry {
    /// The canonical request key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The servers allowed to handle it.
    pub fn permitted(&self) -> &PermittedServers {
        &self.permitted
    }
}

/// Why a row did not make it into a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The table already held `capacity` entries.
    CapacityExceeded,
    /// The key's slot already chained `max_bucket_depth` other keys.
    Collision,
    /// The key was longer than the configured limit.
    KeyTooLong,
}

/// What happened to a row accepted by [`SnapshotBuilder::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    /// A new entry was added.
    New,
    /// An earlier row with the same key was overwritten.
    Replaced,
}

/// A complete, read-only whitelist table.
#[derive(Debug)]
pub struct WhitelistSnapshot {
    buckets: Box<[Vec<WhitelistEntry>]>,
    count: usize,
    generation: u64,
}

impl WhitelistSnapshot {
    /// A table with `capacity` slots and no entries.
    pub fn empty(capacity: usize) -> Self {
        SnapshotBuilder::new(capacity, 1).build(0)
    }

    /// Permitted servers for `key`, if the key has an entry.
    pub fn get(&self, key: &str) -> Option<&PermittedServers> {
        if self.buckets.is_empty() {
            return None;
        }
        self.buckets[slot_for(key, self.buckets.len())]
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.permitted)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of slots, which bounds the number of entries.
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Which refresh produced this table; the initial empty table is 0.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Every entry with its slot index, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &WhitelistEntry)> + '_ {
        self.buckets
            .iter()
            .enumerate()
            .flat_map(|(slot, bucket)| bucket.iter().map(move |entry| (slot, entry)))
    }
}

/// Accumulates rows for one refresh pass.
#[derive(Debug)]
pub struct SnapshotBuilder {
    buckets: Vec<Vec<WhitelistEntry>>,
    count: usize,
    max_bucket_depth: usize,
}

impl SnapshotBuilder {
    /// Start an empty table of `capacity` slots, each chaining at most
    /// `max_bucket_depth` keys.
    pub fn new(capacity: usize, max_bucket_depth: usize) -> Self {
        Self {
            buckets: vec![Vec::new(); capacity],
            count: 0,
            max_bucket_depth,
        }
    }

    /// Add a row. A repeated key overwrites the earlier row's servers.
    pub fn insert(
        &mut self,
        key: String,
        permitted: PermittedServers,
    ) -> Result<Inserted, DropReason> {
        let capacity = self.buckets.len();
        if capacity == 0 {
            return Err(DropReason::CapacityExceeded);
        }

        let bucket = &mut self.buckets[slot_for(&key, capacity)];

        if let Some(existing) = bucket.iter_mut().find(|entry| entry.key == key) {
            existing.permitted = permitted;
            return Ok(Inserted::Replaced);
        }
        if bucket.len() >= self.max_bucket_depth {
            return Err(DropReason::Collision);
        }
        if self.count >= capacity {
            return Err(DropReason::CapacityExceeded);
        }

        bucket.push(WhitelistEntry { key, permitted });
        self.count += 1;
        Ok(Inserted::New)
    }

    /// Entries accepted so far.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether nothing has been accepted yet.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Freeze the table.
    pub fn build(self, generation: u64) -> WhitelistSnapshot {
        WhitelistSnapshot {
            buckets: self.buckets.into_boxed_slice(),
            count: self.count,
            generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servers(raw: &str) -> PermittedServers {
        PermittedServers::parse(raw).unwrap()
    }

    #[test]
    fn slot_is_byte_sum_modulo_capacity() {
        // 'a' + 'b' = 97 + 98 = 195
        assert_eq!(slot_for("ab", 50), 195 % 50);
        assert_eq!(slot_for("ba", 50), slot_for("ab", 50));
        assert_eq!(slot_for("", 7), 0);
    }

    #[test]
    fn later_row_wins_for_same_key() {
        let mut builder = SnapshotBuilder::new(8, 2);
        assert_eq!(builder.insert("GET/x".into(), servers("1")), Ok(Inserted::New));
        assert_eq!(
            builder.insert("GET/x".into(), servers("23")),
            Ok(Inserted::Replaced)
        );
        let snapshot = builder.build(1);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("GET/x"), Some(&servers("23")));
    }

    #[test]
    fn anagram_keys_chain_in_one_slot() {
        let mut builder = SnapshotBuilder::new(8, 2);
        builder.insert("ab".into(), servers("1")).unwrap();
        builder.insert("ba".into(), servers("2")).unwrap();
        assert_eq!(
            builder.insert("ab\0".into(), servers("3")),
            Err(DropReason::Collision)
        );

        let snapshot = builder.build(1);
        assert_eq!(snapshot.get("ab"), Some(&servers("1")));
        assert_eq!(snapshot.get("ba"), Some(&servers("2")));
        assert_eq!(snapshot.get("ab\0"), None);
    }

    #[test]
    fn capacity_bounds_entry_count() {
        let mut builder = SnapshotBuilder::new(2, 4);
        builder.insert("a".into(), servers("1")).unwrap();
        builder.insert("b".into(), servers("1")).unwrap();
        assert_eq!(
            builder.insert("c".into(), servers("1")),
            Err(DropReason::CapacityExceeded)
        );
        // Overwriting an existing key is still allowed on a full table.
        assert_eq!(builder.insert("a".into(), servers("2")), Ok(Inserted::Replaced));

        let snapshot = builder.build(3);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.capacity(), 2);
        assert_eq!(snapshot.generation(), 3);
    }

    #[test]
    fn iter_visits_every_entry_with_its_slot() {
        let mut builder = SnapshotBuilder::new(10, 2);
        builder.insert("ab".into(), servers("1")).unwrap();
        builder.insert("c".into(), servers("2")).unwrap();
        let snapshot = builder.build(1);

        let mut seen: Vec<_> = snapshot
            .iter()
            .map(|(slot, entry)| (slot, entry.key().to_string()))
            .collect();
        seen.sort();
        assert_eq!(seen, vec![(5, "ab".to_string()), (9, "c".to_string())]);
    }

    #[test]
    fn empty_snapshot_misses_everything() {
        let snapshot = WhitelistSnapshot::empty(50);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.get("GET/NULL"), None);
    }
}
