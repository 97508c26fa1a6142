//! Flat byte-addressable memory.
//!
//! Multi-byte values are stored big-endian. Every access is bounds checked:
//! reads and writes outside the buffer fail with [`VmError::OutOfBounds`]
//! rather than touching memory the VM does not own.

use crate::errors::VmError;
use std::ops::Range;

/// Default working-memory size in bytes (64 KiB).
pub const DEFAULT_MEMORY_SIZE: usize = 64 * 1024;

/// Fixed-size, zero-initialized byte buffer.
///
/// Two independent instances exist at runtime: the program image produced by
/// the assembler and the working memory owned by the interpreter.
#[derive(Clone, Debug)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Creates a zeroed memory of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    /// Wraps an existing buffer without copying.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Size of the buffer in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Full contents, for inspection by a presentation layer.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the memory, returning the underlying buffer.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Validates that `[addr, addr + len)` lies inside the buffer.
    fn span(&self, addr: u32, len: usize) -> Result<Range<usize>, VmError> {
        let start = addr as usize;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(VmError::OutOfBounds {
                addr,
                len,
                size: self.data.len(),
            })?;
        Ok(start..end)
    }

    /// Reads one byte at `addr`.
    pub fn read8(&self, addr: u32) -> Result<u8, VmError> {
        let span = self.span(addr, 1)?;
        Ok(self.data[span.start])
    }

    /// Reads a big-endian 16-bit value at `addr`.
    pub fn read16(&self, addr: u32) -> Result<u16, VmError> {
        let b = &self.data[self.span(addr, 2)?];
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Reads a big-endian 32-bit value at `addr`.
    pub fn read32(&self, addr: u32) -> Result<u32, VmError> {
        let b = &self.data[self.span(addr, 4)?];
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Returns an owned copy of `len` bytes starting at `addr`.
    pub fn read(&self, addr: u32, len: usize) -> Result<Vec<u8>, VmError> {
        let span = self.span(addr, len)?;
        Ok(self.data[span].to_vec())
    }

    /// Writes one byte at `addr`, returning the number of bytes written.
    pub fn write8(&mut self, addr: u32, value: u8) -> Result<usize, VmError> {
        let span = self.span(addr, 1)?;
        self.data[span.start] = value;
        Ok(1)
    }

    /// Writes a big-endian 16-bit value at `addr`.
    pub fn write16(&mut self, addr: u32, value: u16) -> Result<usize, VmError> {
        let span = self.span(addr, 2)?;
        self.data[span].copy_from_slice(&value.to_be_bytes());
        Ok(2)
    }

    /// Writes a big-endian 32-bit value at `addr`.
    pub fn write32(&mut self, addr: u32, value: u32) -> Result<usize, VmError> {
        let span = self.span(addr, 4)?;
        self.data[span].copy_from_slice(&value.to_be_bytes());
        Ok(4)
    }

    /// Copies `data` into memory starting at `addr`.
    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<usize, VmError> {
        let span = self.span(addr, data.len())?;
        self.data[span].copy_from_slice(data);
        Ok(data.len())
    }
}
