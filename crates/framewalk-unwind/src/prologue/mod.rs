//! Prologue analysis.
//!
//! A prologue scan walks forward from a function's entry, classifying each
//! instruction as a stack adjustment, a register save, a frame-pointer
//! setup, or something else. The first "something else" ends the prologue.
//! What was learned is collected in a [`FrameDescriptor`].
//!
//! There is one scanner per instruction encoding; [`scan_prologue`] picks
//! the right one from the mode bit of the start address.

mod bulk;
mod compact;
mod standard;
mod trampoline;

pub use bulk::{BulkSaveEncoding, BulkSaveTable, BULK_SAVE_ENCODINGS};
pub use trampoline::skip_trampoline;

use framewalk_core::{
    strip_mode_bit, Architecture, InstructionWidth, Interrupt, Memory, RawRegister, RegisterAccess,
    RegisterProfile, SymbolLookup,
};
use serde::Serialize;
use tracing::debug;

use crate::{FrameDescriptor, UnwindConfig};

/// Number of passes a scan may make. The second pass only happens when a
/// frame pointer shows that the stack moved after the prologue ran.
pub const MAX_SCAN_ATTEMPTS: u32 = 2;

/// Why a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanStop {
    /// An instruction that is not part of a prologue.
    Unrecognized,
    /// The scan limit was reached.
    Limit,
    /// A positive stack adjustment, i.e. epilogue code.
    EpilogueAdjust,
    /// The delay slot of a jump or branch was processed.
    DelaySlot,
    /// Code could not be read.
    Unreadable { address: u64 },
    /// The user interrupted the scan.
    Interrupted,
}

/// Outcome of a prologue scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrologueScan {
    /// What the prologue revealed.
    pub descriptor: FrameDescriptor,
    /// First address that is not part of the prologue, with the mode bit.
    pub end_of_prologue: u64,
    /// Number of passes made (1 or 2).
    pub attempts: u32,
    /// Why the scan stopped.
    pub stop: ScanStop,
}

impl PrologueScan {
    /// True if the user interrupted the scan. Such a result must not be cached.
    pub fn is_interrupted(&self) -> bool {
        self.stop == ScanStop::Interrupted
    }
}

/// Everything a scanner reads besides the live registers.
#[derive(Clone, Copy)]
pub struct ScanContext<'a> {
    /// Target memory.
    pub memory: &'a dyn Memory,
    /// Register layout and byte order.
    pub profile: &'a RegisterProfile,
    /// Scan limits.
    pub config: &'a UnwindConfig,
    /// Cancellation flag.
    pub interrupt: &'a Interrupt,
    /// Argument and static register counts for SAVE instructions.
    pub bulk_saves: &'a BulkSaveTable,
}

impl<'a> ScanContext<'a> {
    /// Creates a context using the standard SAVE encoding table.
    pub fn new(
        memory: &'a dyn Memory,
        profile: &'a RegisterProfile,
        config: &'a UnwindConfig,
        interrupt: &'a Interrupt,
    ) -> Self {
        Self {
            memory,
            profile,
            config,
            interrupt,
            bulk_saves: &BULK_SAVE_ENCODINGS,
        }
    }

    /// Replaces the SAVE encoding table.
    pub fn with_bulk_saves(mut self, table: &'a BulkSaveTable) -> Self {
        self.bulk_saves = table;
        self
    }

    /// Keeps an address within the ISA width.
    pub(crate) fn wrap(&self, address: u64) -> u64 {
        match self.profile.architecture() {
            Architecture::Mips32 => address & 0xffff_ffff,
            Architecture::Mips64 => address,
        }
    }

    /// Reads a live register as an address, or `None` if unavailable.
    pub(crate) fn live_value(&self, live: &dyn RegisterAccess, reg: u16) -> Option<u64> {
        self.profile
            .read_signed(live, RawRegister(reg))
            .ok()
            .map(|v| self.wrap(v as u64))
    }

    /// Adds a signed offset to an address.
    pub(crate) fn offset(&self, address: u64, offset: i64) -> u64 {
        self.wrap(address.wrapping_add(offset as u64))
    }

    /// Signed distance from `from` to `to`, in the ISA width.
    pub(crate) fn distance(&self, to: u64, from: u64) -> i64 {
        let delta = to.wrapping_sub(from);
        match self.profile.architecture() {
            Architecture::Mips32 => delta as u32 as i32 as i64,
            Architecture::Mips64 => delta as i64,
        }
    }
}

/// Scans the prologue of the function starting at `start_pc`.
///
/// Instructions at or beyond `limit_pc` are not examined. `live` holds the
/// registers of the frame being unwound; without it only offsets relative
/// to the entry stack pointer are computed and the base address is 0.
pub fn scan_prologue(
    ctx: &ScanContext<'_>,
    start_pc: u64,
    limit_pc: u64,
    live: Option<&dyn RegisterAccess>,
) -> PrologueScan {
    let scan = match InstructionWidth::of_address(start_pc) {
        InstructionWidth::Full => standard::scan(ctx, start_pc, limit_pc, live),
        InstructionWidth::Compact => compact::scan(ctx, start_pc, limit_pc, live),
    };
    debug!(
        start = format_args!("{:#x}", start_pc),
        end = format_args!("{:#x}", scan.end_of_prologue),
        frame_size = scan.descriptor.frame_size(),
        saved = scan.descriptor.saved_count(),
        stop = ?scan.stop,
        attempts = scan.attempts,
        "prologue scanned"
    );
    scan
}

/// Returns the first address after the prologue of the function at `pc`.
///
/// A post-prologue address from line information is authoritative. Without
/// one, the prologue is scanned up to the function end, or a fixed distance
/// when the end is unknown.
pub fn skip_prologue(ctx: &ScanContext<'_>, symbols: &dyn SymbolLookup, pc: u64) -> u64 {
    let stripped = strip_mode_bit(pc);
    let bounds = symbols.function_bounds(stripped);

    if let Some((start, _)) = bounds {
        if let Some(hint) = symbols.post_prologue_hint(start) {
            return pc.max(hint);
        }
    }

    let limit = match bounds {
        Some((_, end)) if end > stripped => end,
        _ => stripped.saturating_add(ctx.config.fallback_limit_bytes),
    };
    let scan = scan_prologue(ctx, pc, limit, None);
    scan.end_of_prologue
}
