//! Sparse memory model for snapshot targets.
//!
//! Loaded sections hold the captured image. Writes land in 4KB pages laid
//! over the sections, so a call setup can be applied without copying the
//! image. A byte that is in neither layer is unreadable.

use framewalk_core::{Error, Memory, Result, WritableMemory};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Page size for written memory (4KB).
const PAGE_SIZE: u64 = 4096;
const PAGE_MASK: u64 = PAGE_SIZE - 1;

/// A page of written bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct MemoryPage {
    bytes: Vec<Option<u8>>,
}

impl Default for MemoryPage {
    fn default() -> Self {
        Self {
            bytes: vec![None; PAGE_SIZE as usize],
        }
    }
}

impl MemoryPage {
    fn get(&self, offset: usize) -> Option<u8> {
        self.bytes[offset]
    }

    fn set(&mut self, offset: usize, value: u8) {
        self.bytes[offset] = Some(value);
    }
}

/// A contiguous block of captured memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// First address of the block.
    pub address: u64,
    /// Captured contents.
    pub bytes: Vec<u8>,
}

impl Section {
    fn byte_at(&self, address: u64) -> Option<u8> {
        let offset = address.checked_sub(self.address)?;
        self.bytes.get(usize::try_from(offset).ok()?).copied()
    }
}

/// Sparse memory that only allocates pages when written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseMemory {
    /// Captured sections, in load order.
    #[serde(default)]
    sections: Vec<Section>,
    /// Written pages indexed by page number (address >> 12).
    #[serde(default)]
    pages: HashMap<u64, MemoryPage>,
}

impl SparseMemory {
    /// Create a new empty sparse memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a captured section.
    pub fn load_section(&mut self, address: u64, data: &[u8]) {
        self.sections.push(Section {
            address,
            bytes: data.to_vec(),
        });
    }

    /// Load a section of 32-bit words in the given byte order.
    pub fn load_words(&mut self, address: u64, words: &[u32], order: framewalk_core::Endianness) {
        let bytes: Vec<u8> = words
            .iter()
            .flat_map(|&w| order.write(u64::from(w), 4))
            .collect();
        self.load_section(address, &bytes);
    }

    /// Load a section of 16-bit halfwords in the given byte order.
    pub fn load_halfwords(&mut self, address: u64, halves: &[u16], order: framewalk_core::Endianness) {
        let bytes: Vec<u8> = halves
            .iter()
            .flat_map(|&h| order.write(u64::from(h), 2))
            .collect();
        self.load_section(address, &bytes);
    }

    /// Read a single byte, or `None` if nothing is mapped there.
    pub fn read_byte(&self, address: u64) -> Option<u8> {
        let page_num = address >> 12;
        let page_offset = (address & PAGE_MASK) as usize;

        if let Some(value) = self.pages.get(&page_num).and_then(|p| p.get(page_offset)) {
            return Some(value);
        }

        // Later sections shadow earlier ones.
        self.sections.iter().rev().find_map(|s| s.byte_at(address))
    }

    /// Write a single byte.
    pub fn write_byte(&mut self, address: u64, value: u8) {
        let page_num = address >> 12;
        let page_offset = (address & PAGE_MASK) as usize;

        let page = self.pages.entry(page_num).or_default();
        page.set(page_offset, value);
    }

    /// Check if an address is readable.
    pub fn is_mapped(&self, address: u64) -> bool {
        self.read_byte(address).is_some()
    }

    /// Captured sections.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Discard all writes, keeping the captured sections.
    pub fn clear_writes(&mut self) {
        self.pages.clear();
    }

    /// Get number of written pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl Memory for SparseMemory {
    fn read(&self, address: u64, length: usize) -> Result<Vec<u8>> {
        (0..length as u64)
            .map(|i| {
                address
                    .checked_add(i)
                    .and_then(|a| self.read_byte(a))
                    .ok_or(Error::unreadable(address, length))
            })
            .collect()
    }
}

impl WritableMemory for SparseMemory {
    fn write(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        if address.checked_add(bytes.len() as u64).is_none() {
            return Err(Error::unreadable(address, bytes.len()));
        }
        for (i, &b) in bytes.iter().enumerate() {
            self.write_byte(address + i as u64, b);
        }
        Ok(())
    }
}
