//! Packet and metadata capabilities
//!
//! The classifier never owns packets. It only needs to read and write raw
//! bytes at a data offset or inside a metadata slot, and to resolve metadata
//! attribute names once at configuration time.

/// Stable identifier of a registered metadata attribute
pub type AttrId = u16;

/// Where an attribute lives inside a packet's metadata area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttrSlot {
    /// Registry id
    pub id: AttrId,
    /// Byte offset into the metadata area
    pub offset: u16,
    /// Registered width in bytes
    pub size: u8,
}

impl AttrSlot {
    #[inline(always)]
    pub(crate) fn range(&self, len: usize) -> std::ops::Range<usize> {
        let start = self.offset as usize;
        start..start + len
    }
}

/// Byte access to a packet being classified
pub trait Packet {
    /// Packet data starting at the head
    fn data(&self) -> &[u8];
    /// Mutable packet data
    fn data_mut(&mut self) -> &mut [u8];
    /// Per-packet metadata area
    fn metadata(&self) -> &[u8];
    /// Mutable metadata area
    fn metadata_mut(&mut self) -> &mut [u8];
}

impl<P: Packet + ?Sized> Packet for &mut P {
    #[inline(always)]
    fn data(&self) -> &[u8] {
        (**self).data()
    }

    #[inline(always)]
    fn data_mut(&mut self) -> &mut [u8] {
        (**self).data_mut()
    }

    #[inline(always)]
    fn metadata(&self) -> &[u8] {
        (**self).metadata()
    }

    #[inline(always)]
    fn metadata_mut(&mut self) -> &mut [u8] {
        (**self).metadata_mut()
    }
}

/// Resolves metadata attribute names to slots.
pub trait AttributeRegistry: Send + Sync {
    /// Slot for `name`, if registered
    fn resolve(&self, name: &str) -> Option<AttrSlot>;
}
