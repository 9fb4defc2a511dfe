//! Tuple-space search wildcard table
//!
//! Rules under different masks cannot share one hash table because masking
//! happens before hashing. Each distinct mask therefore gets its own
//! [`Tuple`], and a lookup searches every occupied tuple with `key & mask`.
//! Lookup cost scales with the number of masks in use, not with rule count.
//!
//! # Tie-break
//!
//! Among matching rules the greatest `priority` wins. Equal priorities are
//! resolved in favour of the tuple whose mask has more bits set, then the
//! tuple whose mask bytes compare lower. The result never depends on
//! insertion order or tuple slot, so a restored snapshot behaves identically.
//!
//! # Concurrency
//!
//! The whole [`TupleSpace`] is published through `ArcSwap`; each tuple sits
//! behind its own `Arc`, so a write copies only the tuple it touches.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use parking_lot::Mutex;

use sase_common::{check_gate, GateId, SaseError, SaseResult};

use crate::key::{key_map, Key, KeyMap};
use crate::stage::{Hit, MAX_BULK};

/// Maximum distinct masks per table
pub const MAX_TUPLES: usize = 16;

/// Upper bound on the per-tuple pre-allocation
const TUPLE_PRESIZE_LIMIT: usize = 4096;

/// Stored result of a wildcard rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WildcardEntry {
    /// Larger wins
    pub priority: i32,
    /// Output gate
    pub gate: GateId,
    /// Value written back into matching packets
    pub action: Key,
}

/// One mask and the rules stored under it
#[derive(Debug, Clone)]
pub struct Tuple {
    mask: Key,
    specificity: u32,
    rules: KeyMap<WildcardEntry>,
}

impl Tuple {
    fn new(mask: Key, capacity: usize) -> Self {
        Self {
            mask,
            specificity: mask.count_ones(),
            rules: key_map(capacity.min(TUPLE_PRESIZE_LIMIT)),
        }
    }

    /// The tuple's mask
    pub fn mask(&self) -> &Key {
        &self.mask
    }

    /// Look up with `key & mask`
    #[inline(always)]
    pub fn get(&self, key: &Key) -> Option<&WildcardEntry> {
        self.rules.get(&key.masked(&self.mask))
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the tuple holds no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// `(masked key, entry)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &WildcardEntry)> {
        self.rules.iter()
    }

    fn insert(&mut self, key: &Key, entry: WildcardEntry) -> SaseResult<()> {
        let masked = key.masked(&self.mask);
        if self.rules.contains_key(&masked) {
            return Err(SaseError::DuplicateRule);
        }
        self.rules.insert(masked, entry);
        Ok(())
    }

    /// Whether `(self, entry)` should replace the current best `(other, best)`
    #[inline(always)]
    fn outranks(&self, entry: &WildcardEntry, other: &Tuple, best: &WildcardEntry) -> bool {
        match (entry.priority, self.specificity).cmp(&(best.priority, other.specificity)) {
            CmpOrdering::Greater => true,
            CmpOrdering::Less => false,
            CmpOrdering::Equal => self.mask < other.mask,
        }
    }
}

/// Fixed set of tuple slots; the unit published to readers
#[derive(Debug, Clone, Default)]
pub struct TupleSpace {
    slots: [Option<Arc<Tuple>>; MAX_TUPLES],
}

impl TupleSpace {
    /// Slot holding exactly `mask`
    pub fn find_tuple(&self, mask: &Key) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|t| t.mask == *mask))
    }

    /// Existing tuple for `mask`, or a new one in the first free slot.
    pub fn find_or_create_tuple(&mut self, mask: &Key, capacity: usize) -> SaseResult<&mut Tuple> {
        let idx = self
            .find_tuple(mask)
            .or_else(|| self.slots.iter().position(Option::is_none))
            .ok_or_else(|| {
                SaseError::CapacityExceeded(format!("at most {MAX_TUPLES} distinct masks"))
            })?;
        let tuple = self.slots[idx].get_or_insert_with(|| Arc::new(Tuple::new(*mask, capacity)));
        Ok(Arc::make_mut(tuple))
    }

    fn remove(&mut self, key: &Key, mask: &Key) -> SaseResult<WildcardEntry> {
        let idx = self.find_tuple(mask).ok_or(SaseError::NotFound)?;
        let slot = &mut self.slots[idx];
        let Some(tuple) = slot.as_mut() else {
            return Err(SaseError::NotFound);
        };
        if tuple.get(key).is_none() {
            return Err(SaseError::NotFound);
        }

        let tuple = Arc::make_mut(tuple);
        let entry = tuple
            .rules
            .remove(&key.masked(mask))
            .ok_or(SaseError::NotFound)?;
        if tuple.is_empty() {
            *slot = None;
        }
        Ok(entry)
    }

    /// Occupied tuples in slot order
    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.slots.iter().flatten().map(|t| &**t)
    }

    /// Highest-ranked rule matching `key`
    #[inline]
    pub fn lookup(&self, key: &Key) -> Option<&WildcardEntry> {
        let mut best: Option<(&Tuple, &WildcardEntry)> = None;
        for tuple in self.tuples() {
            if let Some(entry) = tuple.get(key) {
                if best.map_or(true, |(bt, be)| tuple.outranks(entry, bt, be)) {
                    best = Some((tuple, entry));
                }
            }
        }
        best.map(|(_, entry)| entry)
    }

    /// Look up to [`MAX_BULK`] keys, tuple by tuple; bit `i` of the result is
    /// set when `results[i]` holds a hit. Same answers as calling
    /// [`lookup`](Self::lookup) per key.
    ///
    /// # Panics
    /// If more than `MAX_BULK` keys are passed or `results` is shorter
    /// than `keys`.
    #[inline]
    pub fn lookup_bulk<'a>(&'a self, keys: &[Key], results: &mut [Option<Hit<'a>>]) -> u64 {
        assert!(keys.len() <= MAX_BULK, "bulk lookup of {} keys", keys.len());
        assert!(results.len() >= keys.len());

        let mut best: [Option<(&Tuple, &WildcardEntry)>; MAX_BULK] = [None; MAX_BULK];
        for tuple in self.tuples() {
            for (key, best) in keys.iter().zip(best.iter_mut()) {
                if let Some(entry) = tuple.get(key) {
                    if best.map_or(true, |(bt, be)| tuple.outranks(entry, bt, be)) {
                        *best = Some((tuple, entry));
                    }
                }
            }
        }

        let mut hit_mask = 0u64;
        for (i, (best, slot)) in best.iter().zip(results.iter_mut()).take(keys.len()).enumerate() {
            *slot = best.map(|(_, e)| Hit { gate: e.gate, action: &e.action });
            if slot.is_some() {
                hit_mask |= 1 << i;
            }
        }
        hit_mask
    }

    /// Total rules across tuples
    pub fn len(&self) -> usize {
        self.tuples().map(Tuple::len).sum()
    }

    /// Whether no rules are installed
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Occupied tuple count
    pub fn num_tuples(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// `(mask, masked key, entry)` for every rule
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Key, &WildcardEntry)> {
        self.tuples()
            .flat_map(|t| t.iter().map(move |(k, e)| (&t.mask, k, e)))
    }
}

/// Wildcard (tuple-space search) table
pub struct WildcardMatchTable {
    space: ArcSwap<TupleSpace>,
    writer: Mutex<()>,
    version: AtomicU64,
    capacity: usize,
}

impl WildcardMatchTable {
    /// Empty table; `capacity` pre-sizes each new tuple
    pub fn new(capacity: usize) -> Self {
        Self {
            space: ArcSwap::from_pointee(TupleSpace::default()),
            writer: Mutex::new(()),
            version: AtomicU64::new(0),
            capacity,
        }
    }

    /// Pin the current tuple space
    #[inline(always)]
    pub fn snapshot(&self) -> Guard<Arc<TupleSpace>> {
        self.space.load()
    }

    /// Publish counter, bumped on every successful mutation
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn update<R>(&self, f: impl FnOnce(&mut TupleSpace) -> SaseResult<R>) -> SaseResult<R> {
        let _guard = self.writer.lock();
        let mut next = TupleSpace::clone(&self.space.load());
        let out = f(&mut next)?;
        self.space.store(Arc::new(next));
        self.version.fetch_add(1, Ordering::Release);
        Ok(out)
    }

    /// Insert `key & mask` into the tuple for `mask`.
    pub fn add_rule(
        &self,
        key: &Key,
        mask: &Key,
        priority: i32,
        gate: GateId,
        action: Key,
    ) -> SaseResult<()> {
        check_gate(gate)?;
        let capacity = self.capacity;
        self.update(|space| {
            let tuple = space.find_or_create_tuple(mask, capacity).map_err(|e| {
                tracing::warn!(?mask, "wildcard table out of tuple slots");
                e
            })?;
            tuple.insert(key, WildcardEntry { priority, gate, action })
        })
    }

    /// Replace every rule with `rules` (`key, mask, priority, gate, action`),
    /// publishing once.
    ///
    /// Stops at the first failing rule; the rules before it are still
    /// published and the error is returned. Returns the number installed.
    pub fn load<I>(&self, rules: I) -> SaseResult<usize>
    where
        I: IntoIterator<Item = SaseResult<(Key, Key, i32, GateId, Key)>>,
    {
        let capacity = self.capacity;
        let _guard = self.writer.lock();
        let mut next = TupleSpace::default();
        let result = rules.into_iter().try_for_each(|rule| {
            let (key, mask, priority, gate, action) = rule?;
            check_gate(gate)?;
            let tuple = next.find_or_create_tuple(&mask, capacity)?;
            tuple.insert(&key, WildcardEntry { priority, gate, action })
        });

        let loaded = next.len();
        self.space.store(Arc::new(next));
        self.version.fetch_add(1, Ordering::Release);
        result.map(|()| loaded)
    }

    /// Remove the rule stored at `key & mask` in the tuple whose mask is
    /// exactly `mask`; an emptied tuple frees its slot.
    pub fn delete_rule(&self, key: &Key, mask: &Key) -> SaseResult<()> {
        self.update(|space| space.remove(key, mask).map(|_| ()))
    }

    /// Single-key lookup against the current snapshot
    pub fn lookup(&self, key: &Key) -> Option<WildcardEntry> {
        self.snapshot().lookup(key).copied()
    }

    /// Remove every rule and tuple
    pub fn clear(&self) {
        let _guard = self.writer.lock();
        self.space.store(Arc::new(TupleSpace::default()));
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether no rules are installed
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Occupied tuple count
    pub fn num_tuples(&self) -> usize {
        self.snapshot().num_tuples()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(b: &[u8]) -> Key {
        Key::from_prefix(b)
    }

    #[test]
    fn test_masked_insert_and_lookup() {
        let t = WildcardMatchTable::new(16);
        t.add_rule(&k(&[10, 0, 0, 7]), &k(&[0xFF, 0, 0, 0]), 1, 2, Key::ZERO)
            .unwrap();

        assert_eq!(t.lookup(&k(&[10, 9, 9, 9])).map(|e| e.gate), Some(2));
        assert!(t.lookup(&k(&[11, 0, 0, 7])).is_none());
        assert_eq!(t.num_tuples(), 1);
    }

    #[test]
    fn test_priority_resolution() {
        let t = WildcardMatchTable::new(16);
        t.add_rule(&k(&[1]), &k(&[0xFF]), 5, 2, Key::ZERO).unwrap();
        t.add_rule(&k(&[1, 2]), &k(&[0xFF, 0xFF]), 10, 1, Key::ZERO).unwrap();

        assert_eq!(t.lookup(&k(&[1, 2])).map(|e| e.gate), Some(1));
        assert_eq!(t.lookup(&k(&[1, 3])).map(|e| e.gate), Some(2));

        // Lower priority on the more specific mask loses.
        let t = WildcardMatchTable::new(16);
        t.add_rule(&k(&[1, 2]), &k(&[0xFF, 0xFF]), 5, 1, Key::ZERO).unwrap();
        t.add_rule(&k(&[1]), &k(&[0xFF]), 10, 2, Key::ZERO).unwrap();
        assert_eq!(t.lookup(&k(&[1, 2])).map(|e| e.gate), Some(2));
    }

    #[test]
    fn test_equal_priority_tie_break() {
        let wide = k(&[0xFF]);
        let narrow = k(&[0xFF, 0xFF]);
        let other = k(&[0x00, 0xFF]);

        for order in [[wide, narrow], [narrow, wide]] {
            let t = WildcardMatchTable::new(16);
            for (gate, mask) in order.iter().enumerate() {
                let gate = if *mask == narrow { 7 } else { gate as GateId };
                t.add_rule(&k(&[1, 2]), mask, 3, gate, Key::ZERO).unwrap();
            }
            // More specific mask wins regardless of insertion order.
            assert_eq!(t.lookup(&k(&[1, 2])).map(|e| e.gate), Some(7));
        }

        // Same popcount: lower mask bytes win.
        for masks in [[wide, other], [other, wide]] {
            let t = WildcardMatchTable::new(16);
            for mask in masks {
                let gate = if mask == other { 4 } else { 5 };
                t.add_rule(&k(&[1, 2]), &mask, 0, gate, Key::ZERO).unwrap();
            }
            assert_eq!(t.lookup(&k(&[1, 2])).map(|e| e.gate), Some(4));
        }
    }

    #[test]
    fn test_duplicate_within_tuple() {
        let t = WildcardMatchTable::new(16);
        let mask = k(&[0xF0]);
        t.add_rule(&k(&[0x12]), &mask, 1, 1, Key::ZERO).unwrap();
        assert!(matches!(
            t.add_rule(&k(&[0x1F]), &mask, 2, 2, Key::ZERO),
            Err(SaseError::DuplicateRule)
        ));
        // Same key under another mask is a different rule.
        t.add_rule(&k(&[0x12]), &k(&[0xFF]), 2, 2, Key::ZERO).unwrap();
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_tuple_capacity_and_reuse() {
        let t = WildcardMatchTable::new(16);
        for i in 0..MAX_TUPLES {
            let mut mask = Key::ZERO;
            mask.as_bytes_mut()[i] = 0xFF;
            t.add_rule(&Key::ZERO, &mask, 0, 1, Key::ZERO).unwrap();
        }
        assert_eq!(t.num_tuples(), MAX_TUPLES);

        let mut extra = Key::ZERO;
        extra.as_bytes_mut()[MAX_TUPLES] = 0xFF;
        assert!(matches!(
            t.add_rule(&Key::ZERO, &extra, 0, 1, Key::ZERO),
            Err(SaseError::CapacityExceeded(_))
        ));

        let mut first = Key::ZERO;
        first.as_bytes_mut()[0] = 0xFF;
        t.delete_rule(&Key::ZERO, &first).unwrap();
        assert_eq!(t.num_tuples(), MAX_TUPLES - 1);

        t.add_rule(&Key::ZERO, &extra, 0, 1, Key::ZERO).unwrap();
        assert_eq!(t.num_tuples(), MAX_TUPLES);
    }

    #[test]
    fn test_delete_requires_exact_mask() {
        let t = WildcardMatchTable::new(16);
        t.add_rule(&k(&[1, 2]), &k(&[0xFF, 0xFF]), 0, 1, Key::ZERO).unwrap();

        assert!(matches!(
            t.delete_rule(&k(&[1, 2]), &k(&[0xFF])),
            Err(SaseError::NotFound)
        ));
        assert!(matches!(
            t.delete_rule(&k(&[1, 3]), &k(&[0xFF, 0xFF])),
            Err(SaseError::NotFound)
        ));
        t.delete_rule(&k(&[1, 2]), &k(&[0xFF, 0xFF])).unwrap();
        assert!(t.lookup(&k(&[1, 2])).is_none());
        assert_eq!(t.num_tuples(), 0);
    }

    #[test]
    fn test_write_copies_only_touched_tuple() {
        let t = WildcardMatchTable::new(16);
        t.add_rule(&k(&[1]), &k(&[0xFF]), 0, 1, Key::ZERO).unwrap();
        t.add_rule(&k(&[0, 1]), &k(&[0, 0xFF]), 0, 1, Key::ZERO).unwrap();
        let before = t.snapshot();

        t.add_rule(&k(&[2]), &k(&[0xFF]), 0, 1, Key::ZERO).unwrap();
        let after = t.snapshot();

        assert!(Arc::ptr_eq(
            before.slots[1].as_ref().unwrap(),
            after.slots[1].as_ref().unwrap()
        ));
        assert!(!Arc::ptr_eq(
            before.slots[0].as_ref().unwrap(),
            after.slots[0].as_ref().unwrap()
        ));
        assert_eq!(before.len(), 2);
        assert_eq!(after.len(), 3);
    }

    #[test]
    fn test_lookup_bulk_matches_single() {
        let t = WildcardMatchTable::new(16);
        t.add_rule(&k(&[1]), &k(&[0xFF]), 1, 1, Key::ZERO).unwrap();
        t.add_rule(&k(&[1, 5]), &k(&[0xFF, 0xFF]), 2, 2, Key::ZERO).unwrap();
        t.add_rule(&k(&[0, 0, 9]), &k(&[0, 0, 0xFF]), 3, 3, Key::ZERO).unwrap();

        let keys = [k(&[1, 5, 9]), k(&[1, 4]), k(&[2, 2, 9]), k(&[7])];
        let space = t.snapshot();
        let mut results = [None; MAX_BULK];
        let mask = space.lookup_bulk(&keys, &mut results);

        assert_eq!(mask, 0b0111);
        for (key, result) in keys.iter().zip(results.iter()) {
            assert_eq!(result.map(|h| h.gate), space.lookup(key).map(|e| e.gate));
        }
        assert_eq!(results[0].map(|h| h.gate), Some(3));
    }

    #[test]
    fn test_load_builds_fresh_space() {
        let t = WildcardMatchTable::new(16);
        t.add_rule(&k(&[9]), &k(&[0xFF]), 0, 1, Key::ZERO).unwrap();

        let masks = [k(&[0xFF]), k(&[0xFF, 0xFF]), k(&[0, 0xFF])];
        let rules = (0..4000u32).map(|i| {
            let [a, b] = (i as u16).to_be_bytes();
            Ok((k(&[a, b]), masks[i as usize % 3], i as i32, 2, Key::ZERO))
        });
        // Rules collapsing onto an existing masked key stop the load.
        let err = t.load(rules).unwrap_err();
        assert!(matches!(err, SaseError::DuplicateRule));
        assert_eq!(t.len(), 3);
        assert_eq!(t.num_tuples(), 3);
        assert!(t.lookup(&k(&[9])).is_none());

        let rules = (0..4000u32).map(|i| {
            let [a, b] = (i as u16).to_be_bytes();
            Ok((k(&[a, b]), k(&[0xFF, 0xFF]), 0, 3, Key::ZERO))
        });
        assert_eq!(t.load(rules).unwrap(), 4000);
        assert_eq!(t.num_tuples(), 1);
        assert_eq!(t.lookup(&k(&[0x0F, 0x9F])).map(|e| e.gate), Some(3));
    }

    #[test]
    fn test_load_respects_tuple_limit() {
        let t = WildcardMatchTable::new(16);
        let rules = (0..=MAX_TUPLES).map(|i| {
            let mut mask = Key::ZERO;
            mask.as_bytes_mut()[i] = 0xFF;
            Ok((Key::ZERO, mask, 0, 1, Key::ZERO))
        });
        assert!(matches!(t.load(rules), Err(SaseError::CapacityExceeded(_))));
        assert_eq!(t.num_tuples(), MAX_TUPLES);
        assert_eq!(t.version(), 1);
    }

    #[test]
    fn test_clear() {
        let t = WildcardMatchTable::new(16);
        t.add_rule(&k(&[1]), &k(&[0xFF]), 0, 1, Key::ZERO).unwrap();
        t.clear();
        assert!(t.is_empty());
        assert_eq!(t.num_tuples(), 0);
        assert_eq!(t.version(), 2);
    }
}
