//! Atomic-region detection for single-stepping.
//!
//! A load-linked/store-conditional sequence fails if a breakpoint trap lands
//! between the two, so stepping into one would loop forever. The debugger
//! instead steps over the whole region: it places breakpoints after the
//! store-conditional and on the one branch that may leave the region, then
//! resumes.

use framewalk_core::{Endianness, InstructionWidth, Interrupt, Memory, Opcode, Result};
use framewalk_disasm::{Decoder, Mips32Decoder};
use serde::Serialize;
use tracing::{debug, trace};

use crate::UnwindConfig;

/// A load-linked/store-conditional sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AtomicRegion {
    /// Address of the load-linked.
    pub start_address: u64,
    /// First address after the store-conditional.
    pub end_address: u64,
    /// Target of the branch inside the region, if there is one.
    pub branch_target: Option<u64>,
}

impl AtomicRegion {
    /// Addresses to break at so the region runs uninterrupted.
    ///
    /// A branch target inside the region, such as the retry branch back to
    /// the load-linked, gets no breakpoint: a trap there would clear the link
    /// and the store-conditional would never succeed.
    pub fn breakpoints(&self) -> Vec<u64> {
        let mut out = vec![self.end_address];
        if let Some(target) = self.branch_target {
            if !(self.start_address..=self.end_address).contains(&target) {
                out.push(target);
            }
        }
        out
    }
}

fn is_relative_branch(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::Beq
            | Opcode::Bne
            | Opcode::Blez
            | Opcode::Bgtz
            | Opcode::Beql
            | Opcode::Bnel
            | Opcode::Blezl
            | Opcode::Bgtzl
            | Opcode::Bltz
            | Opcode::Bgez
            | Opcode::Bltzl
            | Opcode::Bgezl
            | Opcode::Bltzal
            | Opcode::Bgezal
            | Opcode::Bltzall
            | Opcode::Bgezall
            | Opcode::Bc1f
            | Opcode::Bc1t
            | Opcode::Bc1fl
            | Opcode::Bc1tl
            | Opcode::CopBranch
    )
}

/// Recognizes an atomic sequence starting at `pc`.
///
/// Returns `Ok(None)` when `pc` is not a load-linked, when the sequence
/// contains a jump or more than one branch, or when no store-conditional is
/// found within the configured length. Compact code never has one.
pub fn detect(
    memory: &dyn Memory,
    endianness: Endianness,
    config: &UnwindConfig,
    interrupt: &Interrupt,
    pc: u64,
) -> Result<Option<AtomicRegion>> {
    if InstructionWidth::of_address(pc) == InstructionWidth::Compact {
        return Ok(None);
    }
    let decoder = Mips32Decoder::new(endianness);

    let first = decoder.fetch(memory, pc)?;
    if !matches!(first.opcode, Opcode::Ll | Opcode::Lld) {
        return Ok(None);
    }

    let mut loc = pc.wrapping_add(4);
    let mut branch_target = None;
    let mut closed = false;

    for _ in 0..config.atomic_sequence_length {
        interrupt.check()?;
        let insn = decoder.fetch(memory, loc)?;
        trace!(insn = %insn, "atomic sequence");
        loc = loc.wrapping_add(4);

        match insn.opcode {
            Opcode::J | Opcode::Jal | Opcode::Jalx | Opcode::Jr | Opcode::Jalr => return Ok(None),
            Opcode::Sc | Opcode::Scd => {
                closed = true;
                break;
            }
            op if is_relative_branch(op) => {
                if branch_target.is_some() {
                    return Ok(None);
                }
                branch_target = insn.target();
            }
            _ => {}
        }
    }

    if !closed {
        return Ok(None);
    }
    let region = AtomicRegion {
        start_address: pc,
        end_address: loc,
        branch_target,
    };
    debug!(
        start = format_args!("{:#x}", region.start_address),
        end = format_args!("{:#x}", region.end_address),
        "atomic sequence"
    );
    Ok(Some(region))
}
