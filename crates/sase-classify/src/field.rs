//! Field specs, field layouts and the key builder
//!
//! A [`FieldLayout`] is an ordered list of fields packed back to back into a
//! [`Key`]. The same type describes both the match key of a table and the
//! action value written back into matching packets.

use serde::{Deserialize, Serialize};

use sase_common::{SaseError, SaseResult};

use crate::key::{Key, HASH_KEY_SIZE, MAX_FIELDS, MAX_FIELD_SIZE};
use crate::packet::{AttrSlot, AttributeRegistry, Packet};

/// Operator-facing description of one field
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Metadata attribute name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr_name: Option<String>,
    /// Byte offset from the start of packet data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    /// Width in bytes, 1..=8
    pub num_bytes: u8,
}

impl FieldSpec {
    /// Offset-based field
    pub fn offset(offset: u32, num_bytes: u8) -> Self {
        Self { attr_name: None, offset: Some(offset), num_bytes }
    }

    /// Attribute-based field
    pub fn attr(name: impl Into<String>, num_bytes: u8) -> Self {
        Self { attr_name: Some(name.into()), offset: None, num_bytes }
    }
}

/// One mask, key or action value as supplied by the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldData {
    /// Integer form
    ValueInt(u64),
    /// Raw bytes, exactly `num_bytes` long
    ValueBin(Vec<u8>),
}

impl FieldData {
    fn bin_bytes(&self) -> &[u8] {
        match self {
            Self::ValueBin(b) => b,
            Self::ValueInt(_) => &[],
        }
    }

    /// Ordering used for deterministic snapshots: raw bytes first, ints after.
    pub(crate) fn sort_cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (Self::ValueInt(a), Self::ValueInt(b)) => a.cmp(b),
            (Self::ValueInt(_), Self::ValueBin(_)) => std::cmp::Ordering::Greater,
            (Self::ValueBin(_), Self::ValueInt(_)) => std::cmp::Ordering::Less,
            _ => self.bin_bytes().cmp(other.bin_bytes()),
        }
    }

    /// Element-wise [`sort_cmp`](Self::sort_cmp) over two lists
    pub(crate) fn sort_cmp_list(a: &[Self], b: &[Self]) -> std::cmp::Ordering {
        a.iter()
            .zip(b)
            .map(|(x, y)| x.sort_cmp(y))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len()))
    }
}

/// Where a field's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// Packet data at a fixed offset
    Offset(u32),
    /// Metadata attribute, resolved once at configuration time
    Attribute {
        /// Name kept for reconstructing the init argument
        name: String,
        /// Cached slot
        slot: AttrSlot,
    },
}

/// A resolved field positioned inside a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Byte source
    pub source: FieldSource,
    /// Position inside the key
    pub pos: usize,
    /// Width in bytes
    pub size: usize,
    /// Mask, little-endian packed in key byte order
    pub mask: u64,
}

#[inline(always)]
fn full_mask(size: usize) -> u64 {
    if size >= 8 {
        u64::MAX
    } else {
        (1u64 << (size * 8)) - 1
    }
}

/// Resolve a spec to its source and width.
pub fn resolve(
    spec: &FieldSpec,
    registry: &dyn AttributeRegistry,
    idx: usize,
) -> SaseResult<(FieldSource, usize)> {
    let size = spec.num_bytes as usize;
    if !(1..=MAX_FIELD_SIZE).contains(&size) {
        return Err(SaseError::invalid(format!(
            "idx {idx}: 'num_bytes' must be 1-{MAX_FIELD_SIZE}"
        )));
    }

    match (&spec.attr_name, spec.offset) {
        (Some(name), None) => {
            let slot = registry
                .resolve(name)
                .ok_or_else(|| SaseError::Unresolved(name.clone()))?;
            if size > slot.size as usize {
                return Err(SaseError::invalid(format!(
                    "idx {idx}: attribute '{name}' is {} bytes, field wants {size}",
                    slot.size
                )));
            }
            Ok((FieldSource::Attribute { name: name.clone(), slot }, size))
        }
        (None, Some(offset)) => Ok((FieldSource::Offset(offset), size)),
        _ => Err(SaseError::invalid(format!(
            "idx {idx}: must specify exactly one of 'offset' or 'attr_name'"
        ))),
    }
}

impl Field {
    /// Copy this field's bytes out of `pkt` into `dst` (`dst.len() == size`).
    ///
    /// Bytes past the end of the packet read as zero.
    #[inline(always)]
    pub fn read_into<P: Packet + ?Sized>(&self, pkt: &P, dst: &mut [u8]) {
        match &self.source {
            FieldSource::Offset(offset) => {
                let data = pkt.data();
                let start = *offset as usize;
                if start < data.len() {
                    let n = self.size.min(data.len() - start);
                    dst[..n].copy_from_slice(&data[start..start + n]);
                }
            }
            FieldSource::Attribute { slot, .. } => {
                if let Some(src) = pkt.metadata().get(slot.range(self.size)) {
                    dst.copy_from_slice(src);
                }
            }
        }
    }

    /// Write `src` (`src.len() == size`) into this field's location.
    ///
    /// A field that does not fit inside the packet is not written at all.
    #[inline(always)]
    pub fn write_from<P: Packet + ?Sized>(&self, pkt: &mut P, src: &[u8]) {
        let dst = match &self.source {
            FieldSource::Offset(offset) => {
                let start = *offset as usize;
                pkt.data_mut().get_mut(start..start + self.size)
            }
            FieldSource::Attribute { slot, .. } => {
                pkt.metadata_mut().get_mut(slot.range(self.size))
            }
        };
        if let Some(dst) = dst {
            dst.copy_from_slice(src);
        }
    }

    /// Normalise operator data to key byte order.
    ///
    /// Integers are network order for packet offsets and host order for
    /// metadata attributes. Raw bytes are taken verbatim.
    pub fn normalize(&self, data: &FieldData, idx: usize) -> SaseResult<u64> {
        match data {
            FieldData::ValueBin(bytes) => {
                if bytes.len() != self.size {
                    return Err(SaseError::invalid(format!(
                        "idx {idx}: field size {}, expect {}",
                        bytes.len(),
                        self.size
                    )));
                }
                let mut buf = [0u8; 8];
                buf[..self.size].copy_from_slice(bytes);
                Ok(u64::from_le_bytes(buf))
            }
            FieldData::ValueInt(v) => {
                if *v & !full_mask(self.size) != 0 {
                    return Err(SaseError::invalid(format!(
                        "idx {idx}: not a correct {}-byte value",
                        self.size
                    )));
                }
                match self.source {
                    FieldSource::Offset(_) => {
                        let mut buf = [0u8; 8];
                        buf[..self.size].copy_from_slice(&v.to_be_bytes()[8 - self.size..]);
                        Ok(u64::from_le_bytes(buf))
                    }
                    FieldSource::Attribute { .. } => Ok(*v),
                }
            }
        }
    }

    /// Key-ordered bytes as `value_bin`
    pub fn to_data(&self, value: u64) -> FieldData {
        FieldData::ValueBin(value.to_le_bytes()[..self.size].to_vec())
    }

    /// The spec this field was built from
    pub fn spec(&self) -> FieldSpec {
        match &self.source {
            FieldSource::Offset(offset) => FieldSpec::offset(*offset, self.size as u8),
            FieldSource::Attribute { name, .. } => FieldSpec::attr(name.clone(), self.size as u8),
        }
    }
}

/// Ordered fields packed into a key, with their combined mask
#[derive(Debug, Clone, Default)]
pub struct FieldLayout {
    fields: Vec<Field>,
    total_size: usize,
    mask: Key,
}

impl FieldLayout {
    /// Empty layout
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `spec` and append it.
    ///
    /// An absent or zero mask selects every bit of the field.
    pub fn add(
        &mut self,
        spec: &FieldSpec,
        mask: Option<&FieldData>,
        registry: &dyn AttributeRegistry,
    ) -> SaseResult<()> {
        let idx = self.fields.len();
        let (source, size) = resolve(spec, registry, idx)?;
        let mut field = Field { source, pos: self.total_size, size, mask: full_mask(size) };
        if let Some(mask) = mask {
            let m = field.normalize(mask, idx)?;
            if m != 0 {
                field.mask = m;
            }
        }
        self.push(field)
    }

    /// Append an already resolved field at the end of the layout.
    pub fn push(&mut self, mut field: Field) -> SaseResult<()> {
        if self.fields.len() >= MAX_FIELDS {
            return Err(SaseError::CapacityExceeded(format!(
                "at most {MAX_FIELDS} fields per key"
            )));
        }
        if self.total_size + field.size > HASH_KEY_SIZE {
            return Err(SaseError::CapacityExceeded(format!(
                "key wider than {HASH_KEY_SIZE} bytes"
            )));
        }
        field.pos = self.total_size;
        self.mask.put(field.pos, field.size, field.mask);
        self.total_size += field.size;
        self.fields.push(field);
        Ok(())
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the layout has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in key order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Meaningful key bytes
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Combined mask of every field
    pub fn mask(&self) -> &Key {
        &self.mask
    }

    /// Build a key from operator data; `what` names the list in errors.
    pub fn key_from(&self, data: &[FieldData], what: &str) -> SaseResult<Key> {
        if data.len() != self.fields.len() {
            return Err(SaseError::invalid(format!(
                "rule has incorrect number of {what}. Need {}, has {}",
                self.fields.len(),
                data.len()
            )));
        }
        let mut key = Key::ZERO;
        for (idx, (field, d)) in self.fields.iter().zip(data).enumerate() {
            key.put(field.pos, field.size, field.normalize(d, idx)?);
        }
        Ok(key)
    }

    /// Split a key back into per-field `value_bin` data
    pub fn to_data(&self, key: &Key) -> Vec<FieldData> {
        self.fields
            .iter()
            .map(|f| f.to_data(key.get(f.pos, f.size)))
            .collect()
    }

    /// Specs that would rebuild this layout
    pub fn specs(&self) -> Vec<FieldSpec> {
        self.fields.iter().map(Field::spec).collect()
    }

    /// Per-field masks as `value_bin`
    pub fn masks(&self) -> Vec<FieldData> {
        self.fields.iter().map(|f| f.to_data(f.mask)).collect()
    }

    /// Extract this layout's key from one packet (no masking).
    #[inline]
    pub fn build_key<P: Packet + ?Sized>(&self, pkt: &P) -> Key {
        let mut key = Key::ZERO;
        let bytes = key.as_bytes_mut();
        for f in &self.fields {
            f.read_into(pkt, &mut bytes[f.pos..f.pos + f.size]);
        }
        key
    }

    /// Extract keys for a run of packets, in order.
    #[inline]
    pub fn build_keys<P: Packet>(&self, pkts: &[P], keys: &mut [Key]) {
        for (pkt, key) in pkts.iter().zip(keys.iter_mut()) {
            *key = self.build_key(pkt);
        }
    }

    /// Write every field of `action` back into `pkt`.
    #[inline]
    pub fn apply<P: Packet + ?Sized>(&self, pkt: &mut P, action: &Key) {
        let bytes = action.as_bytes();
        for f in &self.fields {
            f.write_from(pkt, &bytes[f.pos..f.pos + f.size]);
        }
    }
}
