//! Epilogue detection.
//!
//! Once a function has started tearing down its frame, the saved-register
//! slots found by the prologue scan may already be released. A debugger
//! uses this check to avoid trusting frame information there.

use framewalk_core::{mips, strip_mode_bit, Endianness, InstructionWidth, Memory, Opcode, Result, SymbolLookup};
use framewalk_disasm::{Decoder, Mips32Decoder};

/// Longest epilogue the compilers emit, in bytes.
const MAX_EPILOGUE_BYTES: u64 = 12;

/// Returns true if `pc` is inside the epilogue of its function.
///
/// Requires the function bounds from `symbols`; without them the answer is
/// always false.
pub fn in_epilogue(
    memory: &dyn Memory,
    symbols: &dyn SymbolLookup,
    endianness: Endianness,
    pc: u64,
) -> Result<bool> {
    let address = strip_mode_bit(pc);
    let Some((start, end)) = symbols.function_bounds(address) else {
        return Ok(false);
    };

    let first = end.saturating_sub(MAX_EPILOGUE_BYTES).max(start + 4);
    if address < first {
        return Ok(false);
    }

    let compact =
        InstructionWidth::of_address(pc) == InstructionWidth::Compact || symbols.is_compact_function(address);
    if compact {
        compact_tail(memory, endianness, address, end)
    } else {
        full_tail(memory, endianness, address, end)
    }
}

fn full_tail(memory: &dyn Memory, endianness: Endianness, mut pc: u64, end: u64) -> Result<bool> {
    let decoder = Mips32Decoder::new(endianness);
    while pc < end {
        let insn = decoder.fetch(memory, pc)?;
        let allowed = match insn.opcode {
            Opcode::Addiu | Opcode::Daddiu => insn.reg(0) == Some(mips::SP) && insn.reg(1) == Some(mips::SP),
            Opcode::Jr => insn.reg(0) == Some(mips::RA),
            Opcode::Nop => true,
            _ => false,
        };
        if !allowed {
            return Ok(false);
        }
        pc += 4;
    }
    Ok(true)
}

fn compact_tail(memory: &dyn Memory, endianness: Endianness, mut pc: u64, end: u64) -> Result<bool> {
    while pc < end {
        let half = memory.read_u16(pc, endianness)?;
        let allowed = half & 0xf800 == 0xf000 // extend
            || half & 0xff00 == 0x6300 // adjsp
            || half & 0xff00 == 0xfb00 // dadjsp
            || half == 0xe820 // jr ra
            || half == 0xe8a0 // jrc ra
            || half == 0x6500; // nop
        if !allowed {
            return Ok(false);
        }
        pc += 2;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use framewalk_core::{Symbol, SymbolTable};
    use framewalk_target::SparseMemory;

    const F: u64 = 0x400000;

    fn setup() -> (SparseMemory, SymbolTable) {
        let mut memory = SparseMemory::new();
        // addiu sp,-32; sw ra,28(sp); addu v0,a0,a1; lw ra,28(sp); jr ra; addiu sp,32
        memory.load_words(
            F,
            &[0x27bdffe0, 0xafbf001c, 0x00851021, 0x8fbf001c, 0x03e00008, 0x27bd0020],
            Endianness::Big,
        );
        // compact: addiu sp,-32; addu; jr ra; addiu sp,32
        memory.load_halfwords(0x400100, &[0x63fc, 0xe049, 0xe820, 0x6304], Endianness::Big);
        let symbols = [
            Symbol::function("f", F, 24),
            Symbol::function("g", 0x400100, 8).with_compact(true),
        ]
        .into_iter()
        .collect();
        (memory, symbols)
    }

    #[test]
    fn test_full_epilogue() {
        let (mem, syms) = setup();
        assert!(in_epilogue(&mem, &syms, Endianness::Big, F + 16).unwrap());
        assert!(in_epilogue(&mem, &syms, Endianness::Big, F + 20).unwrap());
    }

    #[test]
    fn test_full_not_epilogue() {
        let (mem, syms) = setup();
        // lw ra is inside the window but is not a teardown instruction
        assert!(!in_epilogue(&mem, &syms, Endianness::Big, F + 12).unwrap());
        assert!(!in_epilogue(&mem, &syms, Endianness::Big, F + 4).unwrap());
    }

    #[test]
    fn test_compact_epilogue() {
        let (mem, syms) = setup();
        assert!(in_epilogue(&mem, &syms, Endianness::Big, 0x400104 | 1).unwrap());
        assert!(!in_epilogue(&mem, &syms, Endianness::Big, 0x400102 | 1).unwrap());
    }

    #[test]
    fn test_no_symbol() {
        let (mem, _) = setup();
        assert!(!in_epilogue(&mem, &framewalk_core::NoSymbols, Endianness::Big, F + 20).unwrap());
    }
}
