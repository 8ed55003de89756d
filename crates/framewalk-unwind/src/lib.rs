//! # framewalk-unwind
//!
//! Frame analysis for MIPS targets.
//!
//! This crate provides:
//! - Prologue scanning for full-width and compact code ([`scan_prologue`])
//! - A bounded backward search for function entries ([`find_function_start`])
//! - Epilogue detection and stepping through call stubs
//! - A per-stop frame cache and the [`Unwinder`] built on it
//! - Detection of load-linked/store-conditional regions for stepping
//!
//! # Example
//!
//! ```
//! use framewalk_core::{mips, Architecture, Endianness, Symbol};
//! use framewalk_target::TargetSnapshot;
//! use framewalk_unwind::Unwinder;
//!
//! let mut snap = TargetSnapshot::new(Architecture::Mips32, Endianness::Big, 4);
//! // addiu sp,sp,-32; sw ra,28(sp); <body>
//! snap.memory.load_words(0x400000, &[0x27bdffe0, 0xafbf001c, 0x00851021], Endianness::Big);
//! snap.memory.load_words(0x7fff_001c, &[0], Endianness::Big);
//! snap.symbols.insert(Symbol::function("f", 0x400000, 12));
//! snap.registers.set(mips::PC, 0x400008);
//! snap.registers.set(mips::SP, 0x7fff_0000);
//!
//! let profile = snap.profile();
//! let (memory, registers, symbols) = snap.parts();
//! let unwinder = Unwinder::new(memory, registers, symbols, &profile);
//!
//! let backtrace = unwinder.backtrace(64);
//! assert_eq!(backtrace.frames.len(), 1);
//! assert_eq!(backtrace.frames[0].base, 0x7fff_0020);
//! ```

pub mod atomic;
pub mod cache;
pub mod config;
pub mod epilogue;
pub mod frame;
pub mod heuristic;
pub mod prologue;
pub mod unwinder;

pub use atomic::{detect as detect_atomic_region, AtomicRegion};
pub use cache::{Begin, CacheState, CacheStats, FrameCache, FrameHandle, FrameKey};
pub use config::UnwindConfig;
pub use epilogue::in_epilogue;
pub use frame::{FrameDescriptor, SavedLocation};
pub use heuristic::find_function_start;
pub use prologue::{
    scan_prologue, skip_prologue, skip_trampoline, BulkSaveEncoding, BulkSaveTable, PrologueScan, ScanContext, ScanStop,
    BULK_SAVE_ENCODINGS, MAX_SCAN_ATTEMPTS,
};
pub use unwinder::{Backtrace, BacktraceStop, Frame, FrameInfo, FrameRegisters, Unwinder};
