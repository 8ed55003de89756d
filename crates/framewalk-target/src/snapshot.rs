//! Captured target state.
//!
//! A snapshot bundles the registers of the innermost frame, the memory
//! that was captured around it and the function symbols of the image.
//! Snapshots round-trip through JSON so that unwinding scenarios can be
//! replayed from fixtures.

use std::path::Path;

use framewalk_core::{
    Architecture, Endianness, Memory, RegisterAccess, RegisterProfile, SymbolLookup, SymbolTable,
    WritableMemory,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{RegisterFile, SparseMemory};

/// Errors from loading or saving snapshots.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The JSON document is malformed.
    #[error("invalid snapshot: {0}")]
    Json(#[from] serde_json::Error),

    /// The snapshot file could not be read or written.
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The ABI register width is neither 4 nor 8.
    #[error("unsupported ABI register size {0}")]
    RegisterSize(usize),
}

/// A replayable target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSnapshot {
    /// Register width used by the program's ABI.
    pub abi_register_size: usize,
    /// Whether the target only transfers the low 32 bits of registers.
    #[serde(default)]
    pub legacy_transfers: bool,
    /// Registers of the innermost frame.
    pub registers: RegisterFile,
    /// Captured memory.
    #[serde(default)]
    pub memory: SparseMemory,
    /// Function symbols.
    #[serde(default)]
    pub symbols: SymbolTable,
}

impl TargetSnapshot {
    /// Create an empty snapshot.
    pub fn new(architecture: Architecture, endianness: Endianness, abi_register_size: usize) -> Self {
        Self {
            abi_register_size,
            legacy_transfers: false,
            registers: RegisterFile::new(architecture, endianness),
            memory: SparseMemory::new(),
            symbols: SymbolTable::new(),
        }
    }

    /// Parse a snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(json)?;
        if !matches!(snapshot.abi_register_size, 4 | 8) {
            return Err(SnapshotError::RegisterSize(snapshot.abi_register_size));
        }
        debug!(
            sections = snapshot.memory.sections().len(),
            symbols = snapshot.symbols.symbols().len(),
            "loaded snapshot"
        );
        Ok(snapshot)
    }

    /// Serialize the snapshot to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a snapshot file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Save the snapshot to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Architecture of the captured target.
    pub fn architecture(&self) -> Architecture {
        self.registers.architecture()
    }

    /// Byte order of the captured target.
    pub fn endianness(&self) -> Endianness {
        self.registers.endianness()
    }

    /// Build the register profile for this target.
    pub fn profile(&self) -> RegisterProfile {
        RegisterProfile::new(self.architecture(), self.abi_register_size, self.endianness())
            .with_legacy_transfers(self.legacy_transfers)
    }

    /// Split the snapshot into the collaborator views the unwinder takes.
    pub fn parts(&self) -> (&dyn Memory, &dyn RegisterAccess, &dyn SymbolLookup) {
        (&self.memory, &self.registers, &self.symbols)
    }

    /// Mutable views for applying a call setup.
    pub fn parts_mut(&mut self) -> (&mut dyn WritableMemory, &mut dyn RegisterAccess) {
        (&mut self.memory, &mut self.registers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framewalk_core::{mips, Symbol};

    #[test]
    fn test_json_round_trip() {
        let mut snap = TargetSnapshot::new(Architecture::Mips32, Endianness::Big, 4);
        snap.registers.set(mips::SP, 0x7fff_0000);
        snap.registers.set(mips::PC, 0x400010);
        snap.memory.load_words(0x400000, &[0x27bdffe0, 0xafbf001c], Endianness::Big);
        snap.symbols.insert(Symbol::function("main", 0x400000, 0x40));

        let json = snap.to_json().unwrap();
        let back = TargetSnapshot::from_json(&json).unwrap();

        assert_eq!(back.registers, snap.registers);
        assert_eq!(back.memory.read(0x400000, 8).unwrap(), snap.memory.read(0x400000, 8).unwrap());
        assert_eq!(back.symbols.function_bounds(0x400010), Some((0x400000, 0x400040)));
    }

    #[test]
    fn test_rejects_bad_register_size() {
        let snap = TargetSnapshot::new(Architecture::Mips32, Endianness::Big, 4);
        let json = snap.to_json().unwrap().replace("\"abi_register_size\": 4", "\"abi_register_size\": 6");
        assert!(matches!(
            TargetSnapshot::from_json(&json),
            Err(SnapshotError::RegisterSize(6))
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            TargetSnapshot::from_json("{ not json"),
            Err(SnapshotError::Json(_))
        ));
    }

    #[test]
    fn test_profile_follows_snapshot() {
        let mut snap = TargetSnapshot::new(Architecture::Mips64, Endianness::Little, 4);
        snap.legacy_transfers = true;
        let profile = snap.profile();
        assert_eq!(profile.abi_register_size(), 4);
        assert_eq!(profile.endianness(), Endianness::Little);
        assert_eq!(profile.narrow_read(), framewalk_core::NarrowRead::Legacy);
    }
}
