//! Prologue scanner for full-width code.

use framewalk_core::{mips, Instruction, Opcode, RegisterAccess};
use framewalk_disasm::{Decoder, Mips32Decoder};
use tracing::{debug, trace};

use super::{PrologueScan, ScanContext, ScanStop, MAX_SCAN_ATTEMPTS};
use crate::FrameDescriptor;

/// What one instruction contributes to the prologue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// `addiu sp,sp,imm`
    StackAdjust(i64),
    /// `sw/sd reg,offset(sp)`
    SaveOffSp { reg: u16, offset: i64 },
    /// `addiu s8,sp,imm`
    FrameFromSp(i64),
    /// `move s8,sp`
    MoveFrameFromSp,
    /// `sw/sd reg,offset(s8)`
    SaveOffFrame { reg: u16, offset: i64 },
    /// Harmless instruction compilers mix into prologues.
    Tolerated,
    /// `lui/ori` building a large frame size in at or t0.
    LoadImmediate,
    Other,
}

fn classify(insn: &Instruction, register_size: usize) -> Step {
    let save = if register_size == 8 { Opcode::Sd } else { Opcode::Sw };

    match insn.opcode {
        Opcode::Addiu | Opcode::Addi | Opcode::Daddiu => {
            let imm = insn.immediate.unwrap_or(0);
            match (insn.reg(0), insn.reg(1)) {
                (Some(mips::SP), Some(mips::SP)) => Step::StackAdjust(imm),
                (Some(mips::S8), Some(mips::SP)) if insn.opcode != Opcode::Addi => Step::FrameFromSp(imm),
                (Some(mips::GP), Some(mips::GP)) => Step::Tolerated,
                _ => Step::Other,
            }
        }
        Opcode::Sb | Opcode::Sh | Opcode::Swl | Opcode::Sw | Opcode::Sd => {
            let (Some(reg), Some(mem)) = (insn.reg(0), insn.memory()) else {
                return Step::Other;
            };
            match mem.base.0 {
                mips::SP if insn.opcode == save => Step::SaveOffSp {
                    reg,
                    offset: mem.offset,
                },
                mips::S8 if insn.opcode == save => Step::SaveOffFrame {
                    reg,
                    offset: mem.offset,
                },
                mips::S8 if insn.opcode != Opcode::Sd => Step::Tolerated,
                _ => Step::Other,
            }
        }
        Opcode::Swc1 if insn.memory().is_some_and(|m| m.base.0 == mips::SP) => Step::Tolerated,
        Opcode::Addu | Opcode::Or | Opcode::Daddu => match (insn.reg(0), insn.reg(1), insn.reg(2)) {
            (Some(mips::S8), Some(mips::SP), Some(mips::ZERO)) => Step::MoveFrameFromSp,
            (Some(_), Some(mips::A0..=mips::A3), Some(mips::ZERO)) => Step::Tolerated,
            (Some(mips::GP), Some(mips::GP), Some(mips::T9))
            | (Some(mips::GP), Some(mips::T9), Some(mips::GP))
                if insn.opcode != Opcode::Or =>
            {
                Step::Tolerated
            }
            _ => Step::Other,
        },
        Opcode::Lui => match insn.reg(0) {
            Some(mips::GP) => Step::Tolerated,
            Some(mips::AT | mips::T0) => Step::LoadImmediate,
            _ => Step::Other,
        },
        Opcode::Ori => match (insn.reg(0), insn.reg(1)) {
            (Some(mips::AT), Some(mips::AT | mips::ZERO)) | (Some(mips::T0), Some(mips::T0 | mips::ZERO)) => {
                Step::LoadImmediate
            }
            _ => Step::Other,
        },
        _ => Step::Other,
    }
}

enum Applied {
    Continue,
    Restart(u64),
    EpilogueAdjust,
    End,
}

enum Outcome {
    Restart(u64),
    Stopped { end: u64, stop: ScanStop },
}

/// State of one pass over the prologue.
struct FullPass<'c, 'a> {
    ctx: &'c ScanContext<'a>,
    live: Option<&'c dyn RegisterAccess>,
    descriptor: FrameDescriptor,
    /// Stack pointer the saves are relative to.
    sp: u64,
    /// Offset from the frame register to the frame base.
    frame_offset: i64,
    /// Bytes allocated by stack adjustments.
    allocated: u64,
    frame_register: u16,
    frame_address: Option<u64>,
    seen_sp_adjust: bool,
    load_immediate_bytes: u64,
}

impl<'c, 'a> FullPass<'c, 'a> {
    fn new(ctx: &'c ScanContext<'a>, live: Option<&'c dyn RegisterAccess>, start_pc: u64, sp: u64) -> Self {
        Self {
            ctx,
            live,
            descriptor: FrameDescriptor::new(start_pc),
            sp,
            frame_offset: 0,
            allocated: 0,
            frame_register: mips::SP,
            frame_address: None,
            seen_sp_adjust: false,
            load_immediate_bytes: 0,
        }
    }

    fn run(&mut self, start_pc: u64, limit_pc: u64, may_restart: bool) -> Outcome {
        let decoder = Mips32Decoder::new(self.ctx.profile.endianness());
        let mut pc = start_pc;

        while pc < limit_pc {
            if self.ctx.interrupt.is_set() {
                return Outcome::Stopped {
                    end: pc,
                    stop: ScanStop::Interrupted,
                };
            }
            let insn = match decoder.fetch(self.ctx.memory, pc) {
                Ok(insn) => insn,
                Err(e) => {
                    debug!(error = %e, "prologue scan stopped at unreadable code");
                    return Outcome::Stopped {
                        end: pc,
                        stop: ScanStop::Unreadable { address: pc },
                    };
                }
            };
            trace!(insn = %insn, "prologue");

            match self.apply(&insn, may_restart) {
                Applied::Continue => {}
                Applied::Restart(sp) => return Outcome::Restart(sp),
                Applied::EpilogueAdjust => {
                    return Outcome::Stopped {
                        end: pc,
                        stop: ScanStop::EpilogueAdjust,
                    }
                }
                Applied::End if insn.opcode == Opcode::Jr => {
                    // The delay slot runs before the jump lands.
                    let slot = pc.wrapping_add(4);
                    if slot < limit_pc {
                        if let Ok(next) = decoder.fetch(self.ctx.memory, slot) {
                            if let Applied::Restart(sp) = self.apply(&next, may_restart) {
                                return Outcome::Restart(sp);
                            }
                        }
                    }
                    return Outcome::Stopped {
                        end: pc,
                        stop: ScanStop::DelaySlot,
                    };
                }
                Applied::End => {
                    return Outcome::Stopped {
                        end: pc,
                        stop: ScanStop::Unrecognized,
                    }
                }
            }
            pc = pc.wrapping_add(4);
        }

        Outcome::Stopped {
            end: pc,
            stop: ScanStop::Limit,
        }
    }

    fn apply(&mut self, insn: &Instruction, may_restart: bool) -> Applied {
        let ctx = self.ctx;
        match classify(insn, ctx.profile.abi_register_size()) {
            Step::StackAdjust(imm) if imm < 0 => {
                self.frame_offset += -imm;
                self.allocated += imm.unsigned_abs();
                self.seen_sp_adjust = true;
            }
            Step::StackAdjust(_) => return Applied::EpilogueAdjust,
            Step::SaveOffSp { reg, offset } => {
                self.descriptor.record_save(reg, ctx.offset(self.sp, offset));
            }
            Step::FrameFromSp(n) if n != self.frame_offset => {
                self.frame_address = Some(ctx.offset(self.sp, n));
            }
            Step::FrameFromSp(n) => return self.establish_frame(n, true, may_restart),
            Step::MoveFrameFromSp => return self.establish_frame(0, false, may_restart),
            Step::SaveOffFrame { reg, offset } => {
                if let Some(base) = self.frame_address {
                    self.descriptor.record_save(reg, ctx.offset(base, offset));
                }
            }
            Step::Tolerated => {}
            Step::LoadImmediate if !self.seen_sp_adjust => {
                self.load_immediate_bytes += 4;
            }
            Step::LoadImmediate | Step::Other => return Applied::End,
        }
        Applied::Continue
    }

    /// Switches the frame register to s8, which holds `sp + n`.
    ///
    /// With live registers, a frame pointer above `sp + n` means the stack
    /// pointer moved after the prologue ran, so the saves recorded so far
    /// are relative to the wrong baseline.
    fn establish_frame(&mut self, n: i64, resets_offset: bool, may_restart: bool) -> Applied {
        let ctx = self.ctx;
        let expected = ctx.offset(self.sp, n);

        let Some(live) = self.live else {
            self.frame_address = Some(expected);
            return Applied::Continue;
        };
        if self.frame_register != mips::SP {
            return Applied::Continue;
        }

        self.frame_register = mips::S8;
        if resets_offset {
            self.frame_offset = 0;
        }
        let Some(fp) = ctx.live_value(live, mips::S8) else {
            self.frame_address = None;
            self.descriptor.mark_incomplete();
            return Applied::Continue;
        };
        self.frame_address = Some(fp);

        let adjust = ctx.distance(fp, expected);
        if adjust > 0 && may_restart {
            return Applied::Restart(ctx.offset(self.sp, adjust));
        }
        Applied::Continue
    }

    fn finish(mut self, start_pc: u64, end: u64, stop: ScanStop, attempts: u32) -> PrologueScan {
        let ctx = self.ctx;
        let mut end = end;
        if self.load_immediate_bytes > 0 && !self.seen_sp_adjust {
            end = end.saturating_sub(self.load_immediate_bytes).max(start_pc);
        }

        if matches!(stop, ScanStop::Unreadable { .. } | ScanStop::Interrupted) {
            self.descriptor.mark_incomplete();
        }
        if let Some(live) = self.live {
            match ctx.live_value(live, self.frame_register) {
                Some(value) => self.descriptor.set_base(ctx.offset(value, self.frame_offset)),
                None => self.descriptor.mark_incomplete(),
            }
        }
        self.descriptor.set_frame(self.frame_register, self.allocated);

        PrologueScan {
            descriptor: self.descriptor,
            end_of_prologue: end,
            attempts,
            stop,
        }
    }
}

/// Scans a full-width prologue.
pub(super) fn scan(
    ctx: &ScanContext<'_>,
    start_pc: u64,
    limit_pc: u64,
    live: Option<&dyn RegisterAccess>,
) -> PrologueScan {
    let limit = limit_pc.min(start_pc.saturating_add(ctx.config.max_prologue_bytes));
    let live_sp = live.map(|regs| ctx.live_value(regs, mips::SP));
    let mut sp = live_sp.flatten().unwrap_or(0);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let mut pass = FullPass::new(ctx, live, start_pc, sp);
        if matches!(live_sp, Some(None)) {
            pass.descriptor.mark_incomplete();
        }
        match pass.run(start_pc, limit, attempts < MAX_SCAN_ATTEMPTS) {
            Outcome::Restart(corrected) => {
                debug!(
                    sp = format_args!("{:#x}", sp),
                    corrected = format_args!("{:#x}", corrected),
                    "frame pointer shows a dynamic allocation, rescanning"
                );
                sp = corrected;
            }
            Outcome::Stopped { end, stop } => return pass.finish(start_pc, end, stop, attempts),
        }
    }
}
