//! Compiler-generated stubs between a caller and its real target.
//!
//! Two families are recognized. Compact-code call and return helpers
//! (`__mips16_ret_*`, `__mips16_call_stub_*`) keep the destination in a
//! register. Non-PIC to PIC stubs (`.pic.<name>`) load `t9` and jump, or sit
//! directly in front of the function they set `t9` up for.

use framewalk_core::{mips, strip_mode_bit, RegisterAccess, SymbolLookup};
use tracing::trace;

use super::ScanContext;

/// Instructions examined when looking for the address load in a `__fn_stub_`.
const FN_STUB_SCAN_LIMIT: u64 = 20;

/// Returns where control ends up when `pc` is inside a recognized stub.
///
/// `live` holds the registers of the frame stopped at `pc`.
pub fn skip_trampoline(
    ctx: &ScanContext<'_>,
    symbols: &dyn SymbolLookup,
    live: &dyn RegisterAccess,
    pc: u64,
) -> Option<u64> {
    let target = compact_stub_target(ctx, symbols, live, pc).or_else(|| pic_stub_target(ctx, symbols, pc));
    if let Some(target) = target {
        trace!(pc = format_args!("{:#x}", pc), target = format_args!("{:#x}", target), "trampoline");
    }
    target
}

fn compact_stub_target(
    ctx: &ScanContext<'_>,
    symbols: &dyn SymbolLookup,
    live: &dyn RegisterAccess,
    pc: u64,
) -> Option<u64> {
    let stripped = strip_mode_bit(pc);
    let name = symbols.function_name(stripped)?;

    if name == "__mips16_ret_sf" || name == "__mips16_ret_df" {
        return ctx.live_value(live, mips::RA);
    }

    let suffix = name.strip_prefix("__mips16_call_stub_")?;
    match suffix.bytes().next()? {
        b'0'..=b'9' => ctx.live_value(live, mips::V0),
        b's' | b'd' => {
            let start = symbols.function_bounds(stripped).map(|(start, _)| start);
            if start == Some(stripped) {
                // before the call: the destination is in v0
                let target = ctx.live_value(live, mips::V0)?;
                Some(fn_stub_destination(ctx, symbols, target).unwrap_or(target))
            } else {
                // after the call: returning through s2
                ctx.live_value(live, mips::S2)
            }
        }
        _ => None,
    }
}

/// Follows a `__fn_stub_` to the function its `lui/addiu $at` pair loads.
fn fn_stub_destination(ctx: &ScanContext<'_>, symbols: &dyn SymbolLookup, stub: u64) -> Option<u64> {
    let name = symbols.function_name(stub)?;
    if !(name.starts_with("__fn_stub_") || name == "etext" || name == "_etext") {
        return None;
    }

    let order = ctx.profile.endianness();
    let mut high = None;
    for i in 0..FN_STUB_SCAN_LIMIT {
        let word = ctx.memory.read_u32(stub + 4 * i, order).ok()?;
        match word & 0xffff_0000 {
            0x3c01_0000 => high = Some(word & 0xffff), // lui at
            0x2421_0000 => return high.map(|hi| address_from_pair(ctx, hi, word)), // addiu at,at
            _ => {}
        }
    }
    None
}

fn pic_stub_target(ctx: &ScanContext<'_>, symbols: &dyn SymbolLookup, pc: u64) -> Option<u64> {
    let (start, end) = symbols.function_bounds(pc)?;
    if start != pc || !symbols.function_name(pc)?.starts_with(".pic.") {
        return None;
    }

    match end - start {
        // header in front of the function proper
        8 => Some(pc + 8),
        16 => {
            let order = ctx.profile.endianness();
            let mut words = [0u32; 4];
            for (i, word) in words.iter_mut().enumerate() {
                *word = ctx.memory.read_u32(pc + 4 * i as u64, order).ok()?;
            }
            // lui t9,%hi; j target; addiu t9,t9,%lo; nop
            let stub = words[0] & 0xffff_0000 == 0x3c19_0000
                && words[1] & 0xfc00_0000 == 0x0800_0000
                && words[2] & 0xffff_0000 == 0x2739_0000
                && words[3] == 0;
            stub.then(|| address_from_pair(ctx, words[0] & 0xffff, words[2]))
        }
        _ => None,
    }
}

/// Address built by `lui reg,hi` followed by `addiu reg,reg,lo`.
fn address_from_pair(ctx: &ScanContext<'_>, hi: u32, addiu: u32) -> u64 {
    let upper = (hi << 16) as i32 as i64;
    let lower = addiu as u16 as i16 as i64;
    ctx.wrap(upper.wrapping_add(lower) as u64)
}
