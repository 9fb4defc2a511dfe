//! Exact-match table
//!
//! A single hash map from masked key to (gate, action). The configured
//! per-field masks are applied to rule keys on insert and to lookup keys
//! before hashing, so only masked-in bits decide a match.
//!
//! Rules are published as an immutable [`ExactRules`] snapshot through
//! `ArcSwap`: readers never block and never see a half-written rule, writers
//! copy, modify and swap under a mutex.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use parking_lot::Mutex;

use sase_common::{check_gate, GateId, SaseError, SaseResult};

use crate::field::{FieldData, FieldLayout, FieldSpec};
use crate::key::{key_map, Key, KeyMap};
use crate::packet::AttributeRegistry;
use crate::stage::{Hit, MAX_BULK};

/// Stored result of an exact rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExactEntry {
    /// Output gate
    pub gate: GateId,
    /// Value written back into matching packets
    pub action: Key,
}

/// Immutable view of an exact table's rules
#[derive(Debug, Clone)]
pub struct ExactRules {
    mask: Key,
    map: KeyMap<ExactEntry>,
}

impl ExactRules {
    fn new(mask: Key, capacity: usize) -> Self {
        Self { mask, map: key_map(capacity) }
    }

    fn insert(&mut self, key: &Key, entry: ExactEntry) -> SaseResult<()> {
        check_gate(entry.gate)?;
        let masked = key.masked(&self.mask);
        if self.map.contains_key(&masked) {
            return Err(SaseError::DuplicateRule);
        }
        self.map.insert(masked, entry);
        Ok(())
    }

    /// Single-key lookup
    #[inline]
    pub fn find(&self, key: &Key) -> Option<&ExactEntry> {
        self.map.get(&key.masked(&self.mask))
    }

    /// Look up to [`MAX_BULK`] keys; bit `i` of the result is set when
    /// `results[i]` holds a hit.
    ///
    /// # Panics
    /// If more than `MAX_BULK` keys are passed or `results` is shorter
    /// than `keys`.
    #[inline]
    pub fn find_bulk<'a>(&'a self, keys: &[Key], results: &mut [Option<Hit<'a>>]) -> u64 {
        assert!(keys.len() <= MAX_BULK, "bulk lookup of {} keys", keys.len());
        assert!(results.len() >= keys.len());

        let mut hit_mask = 0u64;
        for (i, (key, slot)) in keys.iter().zip(results.iter_mut()).enumerate() {
            *slot = self.find(key).map(|e| Hit { gate: e.gate, action: &e.action });
            if slot.is_some() {
                hit_mask |= 1 << i;
            }
        }
        hit_mask
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no rules are installed
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// All `(masked key, entry)` pairs, unordered
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &ExactEntry)> {
        self.map.iter()
    }
}

/// Exact-match table
pub struct ExactMatchTable {
    layout: FieldLayout,
    rules: ArcSwap<ExactRules>,
    writer: Mutex<()>,
    version: AtomicU64,
    capacity: usize,
}

impl ExactMatchTable {
    /// Empty table with no fields; `capacity` pre-sizes the rule map
    pub fn new(capacity: usize) -> Self {
        Self {
            layout: FieldLayout::new(),
            rules: ArcSwap::from_pointee(ExactRules::new(Key::ZERO, capacity)),
            writer: Mutex::new(()),
            version: AtomicU64::new(0),
            capacity,
        }
    }

    /// Append a match field. Only allowed while the table holds no rules.
    pub fn add_field(
        &mut self,
        spec: &FieldSpec,
        mask: Option<&FieldData>,
        registry: &dyn AttributeRegistry,
    ) -> SaseResult<()> {
        if !self.is_empty() {
            return Err(SaseError::invalid("cannot add fields to a table with rules"));
        }
        self.layout.add(spec, mask, registry)?;
        self.rules
            .store(Arc::new(ExactRules::new(*self.layout.mask(), self.capacity)));
        Ok(())
    }

    /// Key layout
    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    /// Pin the current rule set
    #[inline(always)]
    pub fn snapshot(&self) -> Guard<Arc<ExactRules>> {
        self.rules.load()
    }

    /// Publish counter, bumped on every successful mutation
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn update<R>(&self, f: impl FnOnce(&mut ExactRules) -> SaseResult<R>) -> SaseResult<R> {
        let _guard = self.writer.lock();
        let mut next = ExactRules::clone(&self.rules.load());
        let out = f(&mut next)?;
        self.rules.store(Arc::new(next));
        self.version.fetch_add(1, Ordering::Release);
        Ok(out)
    }

    /// Insert a rule; `key` is masked first.
    pub fn add_rule(&self, key: &Key, gate: GateId, action: Key) -> SaseResult<()> {
        check_gate(gate)?;
        self.update(|rules| rules.insert(key, ExactEntry { gate, action }))
    }

    /// Replace every rule with `rules`, publishing once.
    ///
    /// Stops at the first failing rule; the rules before it are still
    /// published and the error is returned. Returns the number installed.
    pub fn load<I>(&self, rules: I) -> SaseResult<usize>
    where
        I: IntoIterator<Item = SaseResult<(Key, GateId, Key)>>,
    {
        let _guard = self.writer.lock();
        let mut next = ExactRules::new(*self.layout.mask(), self.capacity);
        let result = rules.into_iter().try_for_each(|rule| {
            let (key, gate, action) = rule?;
            next.insert(&key, ExactEntry { gate, action })
        });

        let loaded = next.len();
        self.rules.store(Arc::new(next));
        self.version.fetch_add(1, Ordering::Release);
        result.map(|()| loaded)
    }

    /// Remove the rule whose masked key equals `key & mask`.
    pub fn delete_rule(&self, key: &Key) -> SaseResult<()> {
        let masked = key.masked(self.layout.mask());
        self.update(|rules| rules.map.remove(&masked).map(|_| ()).ok_or(SaseError::NotFound))
    }

    /// Single-key lookup against the current snapshot
    pub fn find(&self, key: &Key) -> Option<ExactEntry> {
        self.snapshot().find(key).copied()
    }

    /// Remove every rule; fields are kept.
    pub fn clear(&self) {
        let _guard = self.writer.lock();
        self.rules
            .store(Arc::new(ExactRules::new(*self.layout.mask(), self.capacity)));
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
}
