//! Input byte acquisition.
//!
//! The whole input is exposed as one immutable byte view, either a
//! memory-mapped file or an owned buffer. Owned buffers over-allocate by
//! [`SIMD_PADDING`] readable bytes past the logical end so 64-byte block
//! loads never touch unowned memory; the scanners themselves only issue
//! full-block loads inside the logical length, so mapped files need no
//! padding.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use velocsv_core::errors::Result;

/// Guaranteed readable slack beyond the logical end of an owned buffer.
pub const SIMD_PADDING: usize = 64;

/// Owned input buffer with trailing SIMD slack.
pub struct AlignedBuffer {
    data: Vec<u8>,
    len: usize,
}

impl AlignedBuffer {
    pub fn from_vec(mut data: Vec<u8>) -> Self {
        let len = data.len();
        data.reserve_exact(SIMD_PADDING);
        data.resize(len + SIMD_PADDING, 0);
        Self { data, len }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The input byte range: mapped file or owned buffer.
pub enum ByteSource {
    Mapped(Mmap),
    Owned(AlignedBuffer),
}

impl ByteSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let meta = file.metadata()?;
        if meta.len() == 0 {
            // Zero-length mappings are rejected by the OS.
            return Ok(ByteSource::Owned(AlignedBuffer::from_vec(Vec::new())));
        }
        // SAFETY: the mapping is read-only and lives as long as this value;
        // concurrent truncation of the underlying file is outside the
        // library's contract, as with any mmap-based reader.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(ByteSource::Mapped(mmap))
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        ByteSource::Owned(AlignedBuffer::from_vec(data))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ByteSource::Mapped(m) => m,
            ByteSource::Owned(b) => b.as_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
