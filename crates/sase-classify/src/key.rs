//! Fixed-width match keys
//!
//! Every key that enters a table obeys one contract: the bytes past the
//! layout's total size are zero, and the table's mask is applied before the
//! key is hashed or compared. Hashing and equality then work word-at-a-time
//! over the whole buffer, which is identical to comparing only the meaningful
//! byte range rounded up to whole words.

use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasherDefault, Hash, Hasher};

/// Maximum number of fields in a key (or values in an action)
pub const MAX_FIELDS: usize = 8;

/// Maximum width of one field in bytes
pub const MAX_FIELD_SIZE: usize = 8;

/// Key buffer capacity in bytes
pub const HASH_KEY_SIZE: usize = MAX_FIELDS * MAX_FIELD_SIZE;

const WORD: usize = std::mem::size_of::<u64>();

/// Fixed-width binary key (also used for action values)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(C, align(64))]
pub struct Key {
    bytes: [u8; HASH_KEY_SIZE],
}

impl Key {
    /// All-zero key
    pub const ZERO: Key = Key { bytes: [0; HASH_KEY_SIZE] };

    /// Key whose leading bytes are `prefix`, rest zero
    pub fn from_prefix(prefix: &[u8]) -> Self {
        assert!(prefix.len() <= HASH_KEY_SIZE, "key prefix longer than {HASH_KEY_SIZE} bytes");
        let mut key = Self::ZERO;
        key.bytes[..prefix.len()].copy_from_slice(prefix);
        key
    }

    /// Raw bytes
    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8; HASH_KEY_SIZE] {
        &self.bytes
    }

    /// Mutable raw bytes
    #[inline(always)]
    pub fn as_bytes_mut(&mut self) -> &mut [u8; HASH_KEY_SIZE] {
        &mut self.bytes
    }

    /// The key as native-endian 64-bit words
    #[inline(always)]
    pub fn words(&self) -> impl Iterator<Item = u64> + '_ {
        self.bytes
            .chunks_exact(WORD)
            .map(|w| u64::from_ne_bytes([w[0], w[1], w[2], w[3], w[4], w[5], w[6], w[7]]))
    }

    /// `self & mask`
    #[inline(always)]
    pub fn masked(&self, mask: &Key) -> Key {
        let mut out = *self;
        out.mask_with(mask);
        out
    }

    /// In-place `self &= mask`
    #[inline(always)]
    pub fn mask_with(&mut self, mask: &Key) {
        for (b, m) in self.bytes.iter_mut().zip(mask.bytes.iter()) {
            *b &= *m;
        }
    }

    /// Number of set bits (mask specificity)
    pub fn count_ones(&self) -> u32 {
        self.words().map(u64::count_ones).sum()
    }

    /// Write `size` bytes of `value` (little-endian packed) at `pos`
    #[inline]
    pub(crate) fn put(&mut self, pos: usize, size: usize, value: u64) {
        self.bytes[pos..pos + size].copy_from_slice(&value.to_le_bytes()[..size]);
    }

    /// Read `size` bytes at `pos` packed little-endian into a u64
    #[inline]
    pub(crate) fn get(&self, pos: usize, size: usize) -> u64 {
        let mut buf = [0u8; WORD];
        buf[..size].copy_from_slice(&self.bytes[pos..pos + size]);
        u64::from_le_bytes(buf)
    }
}

impl Default for Key {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Hash for Key {
    #[inline(always)]
    fn hash<H: Hasher>(&self, state: &mut H) {
        for word in self.words() {
            state.write_u64(word);
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Trailing zero words carry no information.
        let used = self
            .bytes
            .chunks_exact(WORD)
            .rposition(|w| w.iter().any(|b| *b != 0))
            .map_or(WORD, |i| (i + 1) * WORD);
        write!(f, "Key(")?;
        for b in &self.bytes[..used] {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

/// Word-at-a-time multiplicative hasher for [`Key`]
///
/// FxHash mixing: cheap, and good enough for keys that are already
/// high-entropy packet header bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyHasher {
    hash: u64,
}

const SEED: u64 = 0x517c_c1b7_2722_0a95;

impl Hasher for KeyHasher {
    #[inline(always)]
    fn write_u64(&mut self, word: u64) {
        self.hash = (self.hash.rotate_left(5) ^ word).wrapping_mul(SEED);
    }

    fn write(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks(WORD) {
            let mut buf = [0u8; WORD];
            buf[..chunk.len()].copy_from_slice(chunk);
            self.write_u64(u64::from_le_bytes(buf));
        }
    }

    #[inline(always)]
    fn finish(&self) -> u64 {
        self.hash
    }
}

/// Builder for [`KeyHasher`]
pub type BuildKeyHasher = BuildHasherDefault<KeyHasher>;

/// Hash map keyed by masked [`Key`]s, shared by both table kinds
pub type KeyMap<V> = HashMap<Key, V, BuildKeyHasher>;

/// Empty [`KeyMap`] sized for `capacity` entries
pub(crate) fn key_map<V>(capacity: usize) -> KeyMap<V> {
    HashMap::with_capacity_and_hasher(capacity, BuildKeyHasher::default())
}
