//! Prologue scanner for compact (MIPS16) code.
//!
//! Besides plain stack adjustments and stores, compact prologues may use
//! ENTRY or SAVE, which allocate the frame and spill several registers in
//! one instruction. Their slots are relative to the caller's stack pointer,
//! which is only known once the whole frame size is, so they are expanded
//! after the main loop.

use framewalk_core::{mips, Instruction, InstructionWidth, Opcode, RegisterAccess};
use framewalk_disasm::mips::{BulkSaveFields, EntryFields};
use framewalk_disasm::{Decoder, Mips16Decoder};
use tracing::{debug, trace};

use super::{PrologueScan, ScanContext, ScanStop};
use crate::FrameDescriptor;

struct CompactPass<'c, 'a> {
    ctx: &'c ScanContext<'a>,
    descriptor: FrameDescriptor,
    sp: u64,
    frame_offset: i64,
    frame_adjust: i64,
    frame_register: u16,
    frame_address: Option<u64>,
    entry: Option<EntryFields>,
    save: Option<BulkSaveFields>,
}

enum Applied {
    Continue,
    EpilogueAdjust,
    End,
}

impl<'c, 'a> CompactPass<'c, 'a> {
    fn apply(&mut self, insn: &Instruction) -> Applied {
        let ctx = self.ctx;
        let imm = insn.immediate.unwrap_or(0);

        match insn.opcode {
            Opcode::Addiu | Opcode::Daddiu if insn.reg(0) == Some(mips::SP) && insn.reg(1) == Some(mips::SP) => {
                if imm >= 0 {
                    return Applied::EpilogueAdjust;
                }
                self.frame_offset -= imm;
            }
            Opcode::Addiu if insn.reg(0) == Some(mips::S1) && insn.reg(1) == Some(mips::SP) => {
                self.frame_address = Some(ctx.offset(self.sp, imm));
                self.frame_register = mips::S1;
                self.frame_adjust = imm;
            }
            Opcode::Sw | Opcode::Sd => {
                let (Some(reg), Some(mem)) = (insn.reg(0), insn.memory()) else {
                    return Applied::End;
                };
                match mem.base.0 {
                    mips::SP => {
                        self.descriptor.record_save(reg, ctx.offset(self.sp, mem.offset));
                    }
                    mips::S1 => {
                        if let Some(base) = self.frame_address {
                            self.descriptor.record_save(reg, ctx.offset(base, mem.offset));
                        }
                    }
                    _ => return Applied::End,
                }
            }
            Opcode::Move => match (insn.reg(0), insn.reg(1)) {
                (Some(mips::S1), Some(mips::SP)) => {
                    self.frame_address = Some(self.sp);
                    self.frame_register = mips::S1;
                }
                (Some(_), Some(mips::A0..=mips::A3)) => {}
                _ => return Applied::End,
            },
            Opcode::Entry => self.entry = EntryFields::from_instruction(insn),
            Opcode::Save => self.save = BulkSaveFields::from_instruction(insn),
            Opcode::Jal | Opcode::Jalx => {}
            _ => return Applied::End,
        }
        Applied::Continue
    }

    /// Expands ENTRY and SAVE once the frame size is known.
    fn expand_bulk_saves(&mut self) {
        let ctx = self.ctx;
        let regsize = ctx.profile.abi_register_size() as i64;

        if let Some(entry) = self.entry {
            self.frame_offset += 32;
            let base = ctx.offset(self.sp, self.frame_offset);

            for (i, reg) in (mips::A0..=mips::A3).take(entry.aregs as usize).enumerate() {
                self.descriptor.record_save(reg, ctx.offset(base, i as i64 * regsize));
            }
            let mut offset = -4;
            if entry.ra {
                self.descriptor.record_save(mips::RA, ctx.offset(base, offset));
                offset -= regsize;
            }
            for reg in (mips::S0..).take(entry.sregs as usize) {
                self.descriptor.record_save(reg, ctx.offset(base, offset));
                offset -= regsize;
            }
        }

        // SAVE always stores 32-bit registers.
        let Some(save) = self.save.filter(|_| regsize == 4) else {
            return;
        };
        let counts = ctx.bulk_saves.lookup(save.aregs);
        self.frame_offset += save.frame_size as i64;
        let base = ctx.offset(self.sp, self.frame_offset);

        for (i, reg) in (mips::A0..=mips::A3).take(counts.arguments as usize).enumerate() {
            self.descriptor.record_save(reg, ctx.offset(base, i as i64 * regsize));
        }

        let mut slots = Vec::new();
        if save.ra {
            slots.push(mips::RA);
        }
        let mut xsregs = save.xsregs as u16;
        if xsregs > 6 {
            slots.push(mips::S8);
            xsregs -= 1;
        }
        slots.extend((mips::S2..mips::S2 + xsregs).rev());
        if save.s1 {
            slots.push(mips::S1);
        }
        if save.s0 {
            slots.push(mips::S0);
        }
        slots.extend((mips::A0..=mips::A3).rev().take(counts.statics as usize));

        let mut offset = -4;
        for reg in slots {
            self.descriptor.record_save(reg, ctx.offset(base, offset));
            offset -= regsize;
        }
    }
}

/// Scans a compact prologue. Addresses carry the mode bit.
pub(super) fn scan(
    ctx: &ScanContext<'_>,
    start_pc: u64,
    limit_pc: u64,
    live: Option<&dyn RegisterAccess>,
) -> PrologueScan {
    let start = start_pc & !1;
    let limit = (limit_pc & !1).min(start.saturating_add(ctx.config.max_prologue_bytes));
    let live_sp = live.map(|regs| ctx.live_value(regs, mips::SP));

    let mut pass = CompactPass {
        ctx,
        descriptor: FrameDescriptor::new(start_pc),
        sp: live_sp.flatten().unwrap_or(0),
        frame_offset: 0,
        frame_adjust: 0,
        frame_register: mips::SP,
        frame_address: None,
        entry: None,
        save: None,
    };
    if matches!(live_sp, Some(None)) {
        pass.descriptor.mark_incomplete();
    }

    let decoder = Mips16Decoder::new(ctx.profile.endianness());
    let mut pc = start;
    let stop = loop {
        if pc >= limit {
            break ScanStop::Limit;
        }
        if ctx.interrupt.is_set() {
            break ScanStop::Interrupted;
        }
        let insn = match decoder.fetch(ctx.memory, pc) {
            Ok(insn) => insn,
            Err(e) => {
                debug!(error = %e, "compact prologue scan stopped at unreadable code");
                break ScanStop::Unreadable { address: pc };
            }
        };
        trace!(insn = %insn, "compact prologue");

        match pass.apply(&insn) {
            Applied::Continue => pc = insn.end_address(),
            Applied::EpilogueAdjust => break ScanStop::EpilogueAdjust,
            Applied::End => break ScanStop::Unrecognized,
        }
    };

    pass.expand_bulk_saves();

    if matches!(stop, ScanStop::Unreadable { .. } | ScanStop::Interrupted) {
        pass.descriptor.mark_incomplete();
    }
    if let Some(regs) = live {
        match ctx.live_value(regs, pass.frame_register) {
            Some(value) => pass
                .descriptor
                .set_base(ctx.offset(value, pass.frame_offset - pass.frame_adjust)),
            None => pass.descriptor.mark_incomplete(),
        }
    }
    pass.descriptor
        .set_frame(pass.frame_register, pass.frame_offset.max(0) as u64);

    PrologueScan {
        descriptor: pass.descriptor,
        end_of_prologue: InstructionWidth::Compact.tag_address(pc),
        attempts: 1,
        stop,
    }
}
