//! Finding a function's entry without symbols.
//!
//! Walks backward from the PC looking for the end of the previous function
//! or an instruction that typically opens a function. The search is bounded
//! by a fence so a wild PC cannot trigger an unbounded memory walk.

use framewalk_core::{mips, strip_mode_bit, InstructionWidth, Opcode, Result};
use framewalk_disasm::{Decoder, Mips32Decoder};
use tracing::{debug, warn};

use crate::ScanContext;

/// Compact `jr ra`.
const JR_RA: u16 = 0xe820;
/// Compact `jrc ra`.
const JRC_RA: u16 = 0xe8a0;

/// Searches backward from `pc` for the start of its function.
///
/// Returns `Ok(None)` when the fence is reached or the search was
/// interrupted; callers treat that as "cannot unwind further". The result
/// carries the mode bit of `pc`.
pub fn find_function_start(ctx: &ScanContext<'_>, pc: u64) -> Result<Option<u64>> {
    let width = InstructionWidth::of_address(pc);
    let pc = strip_mode_bit(pc);
    if pc == 0 {
        return Ok(None);
    }
    let fence = pc
        .saturating_sub(ctx.config.heuristic_fence_post)
        .max(ctx.config.min_text_address);

    let start = match width {
        InstructionWidth::Full => search_full(ctx, pc, fence)?,
        InstructionWidth::Compact => search_compact(ctx, pc, fence)?,
    };

    match start {
        Some(start) => {
            let start = width.tag_address(start);
            debug!(
                pc = format_args!("{:#x}", pc),
                start = format_args!("{:#x}", start),
                "heuristic function start"
            );
            Ok(Some(start))
        }
        None => Ok(None),
    }
}

fn search_full(ctx: &ScanContext<'_>, pc: u64, fence: u64) -> Result<Option<u64>> {
    let endianness = ctx.profile.endianness();
    let decoder = Mips32Decoder::new(endianness);
    let mut addr = pc;

    loop {
        addr = match addr.checked_sub(4) {
            Some(a) if a >= fence => a,
            _ => return Ok(fence_reached(pc)),
        };
        if ctx.interrupt.is_set() {
            return Ok(None);
        }
        let insn = decoder.fetch(ctx.memory, addr)?;
        if insn.opcode == Opcode::Jr && insn.reg(0) == Some(mips::RA) {
            // Skip the return and its delay slot, then any alignment padding.
            let mut start = addr + 8;
            while start < pc && ctx.memory.read_u32(start, endianness).ok() == Some(0) {
                start += 4;
            }
            return Ok(Some(start));
        }
    }
}

fn search_compact(ctx: &ScanContext<'_>, pc: u64, fence: u64) -> Result<Option<u64>> {
    let endianness = ctx.profile.endianness();
    let mut seen_adjust = false;
    let mut addr = pc;

    loop {
        addr = match addr.checked_sub(2) {
            Some(a) if a >= fence => a,
            _ => return Ok(fence_reached(pc)),
        };
        if ctx.interrupt.is_set() {
            return Ok(None);
        }
        let half = ctx.memory.read_u16(addr, endianness)?;

        if half & 0xff80 == 0x6480 {
            // save, possibly extended
            if addr >= fence + 2 {
                let prev = ctx.memory.read_u16(addr - 2, endianness)?;
                if prev & 0xf800 == 0xf000 {
                    return Ok(Some(addr - 2));
                }
            }
            return Ok(Some(addr));
        }
        let is_entry = half & 0xf81f == 0xe809 && half & 0x700 != 0x700;
        let negative_adjust = half & 0xff80 == 0x6380 || half & 0xff80 == 0xfb80;
        let negative_extend = half & 0xf810 == 0xf010 && seen_adjust;
        if is_entry || negative_adjust || negative_extend {
            return Ok(Some(addr));
        }
        match half {
            JR_RA => return Ok(Some(addr + 4).filter(|&s| s <= pc)),
            JRC_RA => return Ok(Some(addr + 2)),
            _ => {}
        }
        seen_adjust = half & 0xff00 == 0x6300 || half & 0xff00 == 0xfb00;
    }
}

fn fence_reached(pc: u64) -> Option<u64> {
    warn!(
        pc = format_args!("{:#x}", pc),
        "cannot find the start of the function; the heuristic fence may be too close"
    );
    None
}
