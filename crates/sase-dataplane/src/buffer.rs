//! Packet Buffers
//!
//! Fixed-size packet buffer with reserved headroom and a per-packet
//! metadata area that classifier attributes are read from and written to.

use sase_classify::Packet;

/// Buffer size including headroom
pub const BUFFER_SIZE: usize = 2048;

/// Default headroom reserved for encapsulation
pub const DEFAULT_HEADROOM: u16 = 128;

/// Per-packet metadata area
pub const METADATA_SIZE: usize = 128;

/// Packet buffer
#[repr(C, align(64))]
#[derive(Clone)]
pub struct PacketBuffer {
    /// Data length
    data_len: u16,
    /// Attribute storage
    metadata: [u8; METADATA_SIZE],
    /// Packet data, starting after `DEFAULT_HEADROOM`
    data: [u8; BUFFER_SIZE],
}

impl PacketBuffer {
    /// Empty buffer with zeroed metadata
    pub fn new() -> Self {
        Self { data_len: 0, metadata: [0; METADATA_SIZE], data: [0; BUFFER_SIZE] }
    }

    /// Buffer holding a copy of `bytes`, or `None` if it does not fit
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let len = u16::try_from(bytes.len()).ok()?;
        let mut buf = Self::new();
        buf.append(len)?.copy_from_slice(bytes);
        Some(buf)
    }

    /// Get packet data slice
    #[inline(always)]
    pub fn data(&self) -> &[u8] {
        let start = DEFAULT_HEADROOM as usize;
        &self.data[start..start + self.data_len as usize]
    }

    /// Get mutable packet data
    #[inline(always)]
    pub fn data_mut(&mut self) -> &mut [u8] {
        let start = DEFAULT_HEADROOM as usize;
        &mut self.data[start..start + self.data_len as usize]
    }

    /// Metadata area
    #[inline(always)]
    pub fn metadata(&self) -> &[u8; METADATA_SIZE] {
        &self.metadata
    }

    /// Mutable metadata area
    #[inline(always)]
    pub fn metadata_mut(&mut self) -> &mut [u8; METADATA_SIZE] {
        &mut self.metadata
    }

    /// Get data length
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data_len as usize
    }

    /// Check if empty
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data_len == 0
    }

    /// Extend the data by `len` bytes at the tail
    #[inline]
    pub fn append(&mut self, len: u16) -> Option<&mut [u8]> {
        let start = DEFAULT_HEADROOM as usize + self.data_len as usize;
        if BUFFER_SIZE - start < len as usize {
            return None;
        }
        self.data_len += len;
        Some(&mut self.data[start..start + len as usize])
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PacketBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketBuffer")
            .field("len", &self.data_len)
            .finish_non_exhaustive()
    }
}

impl Packet for PacketBuffer {
    #[inline(always)]
    fn data(&self) -> &[u8] {
        PacketBuffer::data(self)
    }

    #[inline(always)]
    fn data_mut(&mut self) -> &mut [u8] {
        PacketBuffer::data_mut(self)
    }

    #[inline(always)]
    fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    #[inline(always)]
    fn metadata_mut(&mut self) -> &mut [u8] {
        &mut self.metadata
    }
}

/// Packet batch for batch processing
pub struct PacketBatch<'a> {
    buffers: Vec<&'a mut PacketBuffer>,
}

impl<'a> PacketBatch<'a> {
    /// Get batch length
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Buffers in batch order
    pub fn as_mut_slice(&mut self) -> &mut [&'a mut PacketBuffer] {
        &mut self.buffers
    }
}

impl<'a> FromIterator<&'a mut PacketBuffer> for PacketBatch<'a> {
    fn from_iter<I: IntoIterator<Item = &'a mut PacketBuffer>>(iter: I) -> Self {
        Self { buffers: iter.into_iter().collect() }
    }
}
