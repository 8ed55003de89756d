//! # framewalk-target
//!
//! A replayable target for the framewalk unwinder. [`TargetSnapshot`]
//! holds captured registers, memory and symbols, implements the
//! collaborator traits from `framewalk-core`, and loads from JSON.
//!
//! # Example
//!
//! ```
//! use framewalk_core::{mips, Architecture, Endianness, Memory};
//! use framewalk_target::TargetSnapshot;
//!
//! let mut snap = TargetSnapshot::new(Architecture::Mips32, Endianness::Big, 4);
//! snap.registers.set(mips::SP, 0x7fff_0000);
//! snap.memory.load_words(0x400000, &[0x27bdffe0], Endianness::Big);
//!
//! assert_eq!(snap.memory.read_u32(0x400000, Endianness::Big).unwrap(), 0x27bdffe0);
//! ```

pub mod memory;
pub mod snapshot;
pub mod state;

pub use memory::{Section, SparseMemory};
pub use snapshot::{SnapshotError, TargetSnapshot};
pub use state::RegisterFile;
