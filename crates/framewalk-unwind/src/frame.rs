//! Frame descriptors.
//!
//! A [`FrameDescriptor`] records what the prologue scanner learned about one
//! activation record: where the frame is anchored, which registers were
//! spilled to memory and where. It is built once and then shared read-only.

use std::collections::BTreeMap;

use framewalk_core::{mips, RawRegister};
use serde::Serialize;

/// Where a register's value for the caller can be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SavedLocation {
    /// The register was not touched; its value is in the callee's register.
    Unchanged,
    /// The register was saved at this address.
    SavedInMemory(u64),
    /// The register's value is this literal.
    SavedValue(u64),
}

/// What is known about one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameDescriptor {
    base_address: u64,
    entry_pc: u64,
    frame_register: RawRegister,
    frame_size: u64,
    saved: BTreeMap<RawRegister, u64>,
    complete: bool,
}

impl FrameDescriptor {
    /// An empty descriptor for the function entered at `entry_pc`.
    pub fn new(entry_pc: u64) -> Self {
        Self {
            base_address: 0,
            entry_pc,
            frame_register: RawRegister(mips::SP),
            frame_size: 0,
            saved: BTreeMap::new(),
            complete: true,
        }
    }

    /// The frame base: the caller's stack pointer. Zero when unknown.
    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    /// Entry address of the function, with its mode bit.
    pub fn entry_pc(&self) -> u64 {
        self.entry_pc
    }

    /// Register the base is computed from.
    pub fn frame_register(&self) -> RawRegister {
        self.frame_register
    }

    /// Bytes allocated by the prologue.
    pub fn frame_size(&self) -> u64 {
        self.frame_size
    }

    /// False when the descriptor was built from partial information.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// True when there is no caller to unwind to.
    pub fn is_outermost(&self) -> bool {
        self.base_address == 0
    }

    /// Where the caller's value of `reg` lives.
    ///
    /// The stack pointer is always the frame base. The program counter shares
    /// the return-address register's location; when that is `Unchanged`, the
    /// caller's PC is this frame's live `ra`.
    pub fn register_location(&self, reg: RawRegister) -> SavedLocation {
        match reg.0 {
            mips::SP => SavedLocation::SavedValue(self.base_address),
            mips::PC => self.memory_location(RawRegister(mips::RA)),
            _ => self.memory_location(reg),
        }
    }

    fn memory_location(&self, reg: RawRegister) -> SavedLocation {
        self.saved
            .get(&reg)
            .map_or(SavedLocation::Unchanged, |&addr| SavedLocation::SavedInMemory(addr))
    }

    /// Registers saved to memory and their slots, in register order.
    pub fn saved_registers(&self) -> impl Iterator<Item = (RawRegister, u64)> + '_ {
        self.saved.iter().map(|(&r, &a)| (r, a))
    }

    /// Number of registers saved to memory.
    pub fn saved_count(&self) -> usize {
        self.saved.len()
    }

    /// True when nothing was learned from the prologue.
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty() && self.frame_size == 0
    }

    // Construction, used by the scanners and the unwinder only.

    /// Records a save. The first save of a register wins.
    pub(crate) fn record_save(&mut self, reg: u16, address: u64) -> bool {
        match self.saved.entry(RawRegister(reg)) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(address);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub(crate) fn set_base(&mut self, base: u64) {
        self.base_address = base;
    }

    pub(crate) fn set_frame(&mut self, register: u16, size: u64) {
        self.frame_register = RawRegister(register);
        self.frame_size = size;
    }

    pub(crate) fn mark_incomplete(&mut self) {
        self.complete = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_save_wins() {
        let mut d = FrameDescriptor::new(0x400000);
        assert!(d.record_save(mips::RA, 0x7fff_001c));
        assert!(!d.record_save(mips::RA, 0x7fff_0010));
        assert_eq!(
            d.register_location(RawRegister(mips::RA)),
            SavedLocation::SavedInMemory(0x7fff_001c)
        );
    }

    #[test]
    fn test_pc_aliases_ra() {
        let mut d = FrameDescriptor::new(0x400000);
        assert_eq!(d.register_location(RawRegister(mips::PC)), SavedLocation::Unchanged);
        d.record_save(mips::RA, 0x1000);
        assert_eq!(
            d.register_location(RawRegister(mips::PC)),
            SavedLocation::SavedInMemory(0x1000)
        );
    }

    #[test]
    fn test_sp_is_base() {
        let mut d = FrameDescriptor::new(0x400000);
        assert!(d.is_outermost());
        d.set_base(0x7fff_0020);
        assert!(!d.is_outermost());
        assert_eq!(
            d.register_location(RawRegister(mips::SP)),
            SavedLocation::SavedValue(0x7fff_0020)
        );
        assert_eq!(d.register_location(RawRegister(mips::S0)), SavedLocation::Unchanged);
    }

    #[test]
    fn test_empty() {
        let mut d = FrameDescriptor::new(0x400000);
        assert!(d.is_empty());
        d.set_frame(mips::SP, 32);
        assert!(!d.is_empty());
        assert_eq!(d.saved_count(), 0);
    }
}
