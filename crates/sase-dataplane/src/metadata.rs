//! Metadata Attributes
//!
//! Named, fixed-width slots inside each buffer's metadata area. Stages
//! register the attributes they use at configuration time; classifiers
//! resolve names to slots once and keep the slot.

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use sase_classify::{AttrId, AttrSlot, AttributeRegistry, MAX_FIELD_SIZE};
use sase_common::{SaseError, SaseResult};

use crate::buffer::METADATA_SIZE;

#[derive(Debug, Default)]
struct Allocator {
    next_id: AttrId,
    next_offset: usize,
}

/// Attribute name → slot registry
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    slots: DashMap<String, AttrSlot>,
    alloc: Mutex<Allocator>,
}

impl MetadataRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` with `size` bytes, or return its slot if it already
    /// exists with the same size.
    pub fn register(&self, name: &str, size: u8) -> SaseResult<AttrSlot> {
        if size == 0 || size as usize > MAX_FIELD_SIZE {
            return Err(SaseError::invalid(format!(
                "attribute '{name}': size must be 1-{MAX_FIELD_SIZE}"
            )));
        }

        let mut alloc = self.alloc.lock();
        if let Some(slot) = self.slots.get(name) {
            if slot.size != size {
                return Err(SaseError::invalid(format!(
                    "attribute '{name}' already registered with size {}",
                    slot.size
                )));
            }
            return Ok(*slot);
        }

        if alloc.next_offset + size as usize > METADATA_SIZE {
            return Err(SaseError::CapacityExceeded(format!(
                "metadata area full ({METADATA_SIZE} bytes)"
            )));
        }

        let slot = AttrSlot { id: alloc.next_id, offset: alloc.next_offset as u16, size };
        alloc.next_id += 1;
        alloc.next_offset += size as usize;
        self.slots.insert(name.to_string(), slot);

        debug!(name, id = slot.id, offset = slot.offset, size, "metadata attribute registered");
        Ok(slot)
    }

    /// Number of registered attributes
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Metadata bytes in use
    pub fn used(&self) -> usize {
        self.alloc.lock().next_offset
    }
}

impl AttributeRegistry for MetadataRegistry {
    fn resolve(&self, name: &str) -> Option<AttrSlot> {
        self.slots.get(name).map(|s| *s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let reg = MetadataRegistry::new();
        let vlan = reg.register("vlan", 2).unwrap();
        let port = reg.register("in_port", 4).unwrap();

        assert_eq!(vlan, AttrSlot { id: 0, offset: 0, size: 2 });
        assert_eq!(port, AttrSlot { id: 1, offset: 2, size: 4 });
        assert_eq!(reg.resolve("in_port"), Some(port));
        assert_eq!(reg.resolve("missing"), None);
        assert_eq!(reg.used(), 6);
    }

    #[test]
    fn test_register_is_idempotent() {
        let reg = MetadataRegistry::new();
        let a = reg.register("tag", 4).unwrap();
        assert_eq!(reg.register("tag", 4).unwrap(), a);
        assert!(matches!(reg.register("tag", 2), Err(SaseError::InvalidArgument(_))));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_metadata_area_limit() {
        let reg = MetadataRegistry::new();
        for i in 0..METADATA_SIZE / 8 {
            reg.register(&format!("a{i}"), 8).unwrap();
        }
        assert!(matches!(reg.register("one_more", 1), Err(SaseError::CapacityExceeded(_))));
        assert!(matches!(reg.register("zero", 0), Err(SaseError::InvalidArgument(_))));
    }
}
