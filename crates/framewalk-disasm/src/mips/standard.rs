//! Full-width (32-bit word) MIPS decoder.
//!
//! Covers the MIPS I-IV integer set plus the coprocessor branches and
//! FP loads/stores. Decoding never fails: reserved encodings come back as
//! `Opcode::Unrecognized`.

use crate::{DecodeError, DecodedInstruction, Decoder};
use framewalk_core::{
    mips, ControlFlow, Endianness, Instruction, InstructionWidth, Memory, Opcode, Operand,
};

// Major opcodes (bits 31:26)
const OP_SPECIAL: u32 = 0x00;
const OP_REGIMM: u32 = 0x01;
const OP_J: u32 = 0x02;
const OP_JAL: u32 = 0x03;
const OP_BEQ: u32 = 0x04;
const OP_BNE: u32 = 0x05;
const OP_BLEZ: u32 = 0x06;
const OP_BGTZ: u32 = 0x07;
const OP_ADDI: u32 = 0x08;
const OP_ADDIU: u32 = 0x09;
const OP_SLTI: u32 = 0x0a;
const OP_SLTIU: u32 = 0x0b;
const OP_ANDI: u32 = 0x0c;
const OP_ORI: u32 = 0x0d;
const OP_XORI: u32 = 0x0e;
const OP_LUI: u32 = 0x0f;
const OP_COP0: u32 = 0x10;
const OP_COP1: u32 = 0x11;
const OP_COP2: u32 = 0x12;
const OP_COP3: u32 = 0x13;
const OP_BEQL: u32 = 0x14;
const OP_BNEL: u32 = 0x15;
const OP_BLEZL: u32 = 0x16;
const OP_BGTZL: u32 = 0x17;
const OP_DADDI: u32 = 0x18;
const OP_DADDIU: u32 = 0x19;
const OP_LDL: u32 = 0x1a;
const OP_LDR: u32 = 0x1b;
const OP_JALX: u32 = 0x1d;
const OP_LB: u32 = 0x20;
const OP_LH: u32 = 0x21;
const OP_LWL: u32 = 0x22;
const OP_LW: u32 = 0x23;
const OP_LBU: u32 = 0x24;
const OP_LHU: u32 = 0x25;
const OP_LWR: u32 = 0x26;
const OP_LWU: u32 = 0x27;
const OP_SB: u32 = 0x28;
const OP_SH: u32 = 0x29;
const OP_SWL: u32 = 0x2a;
const OP_SW: u32 = 0x2b;
const OP_SDL: u32 = 0x2c;
const OP_SDR: u32 = 0x2d;
const OP_SWR: u32 = 0x2e;
const OP_CACHE: u32 = 0x2f;
const OP_LL: u32 = 0x30;
const OP_LWC1: u32 = 0x31;
const OP_PREF: u32 = 0x33;
const OP_LLD: u32 = 0x34;
const OP_LDC1: u32 = 0x35;
const OP_LD: u32 = 0x37;
const OP_SC: u32 = 0x38;
const OP_SWC1: u32 = 0x39;
const OP_SCD: u32 = 0x3c;
const OP_SDC1: u32 = 0x3d;
const OP_SD: u32 = 0x3f;

// Coprocessor branch format (rs field)
const COP_BC: u32 = 0x08;

/// Extract the major opcode (bits 31:26).
#[inline]
fn op(insn: u32) -> u32 {
    insn >> 26
}

/// Extract rs (bits 25:21).
#[inline]
fn rs(insn: u32) -> u16 {
    ((insn >> 21) & 0x1f) as u16
}

/// Extract rt (bits 20:16).
#[inline]
fn rt(insn: u32) -> u16 {
    ((insn >> 16) & 0x1f) as u16
}

/// Extract rd (bits 15:11).
#[inline]
fn rd(insn: u32) -> u16 {
    ((insn >> 11) & 0x1f) as u16
}

/// Extract the shift amount (bits 10:6).
#[inline]
fn sa(insn: u32) -> i64 {
    ((insn >> 6) & 0x1f) as i64
}

/// Extract funct (bits 5:0).
#[inline]
fn funct(insn: u32) -> u32 {
    insn & 0x3f
}

/// Extract the sign-extended 16-bit immediate.
#[inline]
fn simm16(insn: u32) -> i64 {
    (insn as u16) as i16 as i64
}

/// Extract the zero-extended 16-bit immediate.
#[inline]
fn uimm16(insn: u32) -> i64 {
    (insn & 0xffff) as i64
}

/// Extract the 26-bit jump index.
#[inline]
fn jump_index(insn: u32) -> u64 {
    (insn & 0x03ff_ffff) as u64
}

/// Compute the target of a PC-relative branch.
#[inline]
pub(crate) fn branch_target(address: u64, insn: u32) -> u64 {
    address
        .wrapping_add(4)
        .wrapping_add((simm16(insn) << 2) as u64)
}

/// MIPS32/MIPS64 decoder for 4-byte instruction words.
#[derive(Debug, Clone, Copy)]
pub struct Mips32Decoder {
    endianness: Endianness,
}

impl Mips32Decoder {
    /// Creates a decoder reading words in the given byte order.
    pub fn new(endianness: Endianness) -> Self {
        Self { endianness }
    }

    fn base(&self, insn: u32, address: u64, opcode: Opcode) -> Instruction {
        Instruction::new(address, 4, InstructionWidth::Full, insn, opcode)
    }

    fn decode_word(&self, insn: u32, address: u64) -> Instruction {
        match op(insn) {
            OP_SPECIAL => self.decode_special(insn, address),
            OP_REGIMM => self.decode_regimm(insn, address),
            OP_J => self.decode_jump(insn, address, Opcode::J),
            OP_JAL => self.decode_jump(insn, address, Opcode::Jal),
            OP_JALX => self.decode_jump(insn, address, Opcode::Jalx),
            OP_BEQ => self.decode_branch(insn, address, Opcode::Beq, true),
            OP_BNE => self.decode_branch(insn, address, Opcode::Bne, true),
            OP_BLEZ => self.decode_branch(insn, address, Opcode::Blez, false),
            OP_BGTZ => self.decode_branch(insn, address, Opcode::Bgtz, false),
            OP_BEQL => self.decode_branch(insn, address, Opcode::Beql, true),
            OP_BNEL => self.decode_branch(insn, address, Opcode::Bnel, true),
            OP_BLEZL => self.decode_branch(insn, address, Opcode::Blezl, false),
            OP_BGTZL => self.decode_branch(insn, address, Opcode::Bgtzl, false),
            OP_ADDI => self.decode_imm(insn, address, Opcode::Addi, simm16(insn)),
            OP_ADDIU => self.decode_imm(insn, address, Opcode::Addiu, simm16(insn)),
            OP_SLTI => self.decode_imm(insn, address, Opcode::Slti, simm16(insn)),
            OP_SLTIU => self.decode_imm(insn, address, Opcode::Sltiu, simm16(insn)),
            OP_ANDI => self.decode_imm(insn, address, Opcode::Andi, uimm16(insn)),
            OP_ORI => self.decode_imm(insn, address, Opcode::Ori, uimm16(insn)),
            OP_XORI => self.decode_imm(insn, address, Opcode::Xori, uimm16(insn)),
            OP_DADDI => self.decode_imm(insn, address, Opcode::Daddi, simm16(insn)),
            OP_DADDIU => self.decode_imm(insn, address, Opcode::Daddiu, simm16(insn)),
            OP_LUI => {
                let value = ((insn & 0xffff) << 16) as i32 as i64;
                self.base(insn, address, Opcode::Lui)
                    .with_operands(vec![Operand::reg(rt(insn)), Operand::imm(uimm16(insn))])
                    .with_immediate(value)
            }
            OP_COP0 => self.base(insn, address, Opcode::Cop0),
            OP_COP1 => self.decode_cop1(insn, address),
            OP_COP2 | OP_COP3 => {
                if (insn >> 21) & 0x1f == COP_BC {
                    self.decode_cop_branch(insn, address, Opcode::CopBranch)
                } else if op(insn) == OP_COP2 {
                    self.base(insn, address, Opcode::Cop2)
                } else {
                    self.base(insn, address, Opcode::Cop3)
                }
            }
            OP_LB => self.decode_mem(insn, address, Opcode::Lb),
            OP_LH => self.decode_mem(insn, address, Opcode::Lh),
            OP_LWL => self.decode_mem(insn, address, Opcode::Lwl),
            OP_LW => self.decode_mem(insn, address, Opcode::Lw),
            OP_LBU => self.decode_mem(insn, address, Opcode::Lbu),
            OP_LHU => self.decode_mem(insn, address, Opcode::Lhu),
            OP_LWR => self.decode_mem(insn, address, Opcode::Lwr),
            OP_LWU => self.decode_mem(insn, address, Opcode::Lwu),
            OP_LDL => self.decode_mem(insn, address, Opcode::Ldl),
            OP_LDR => self.decode_mem(insn, address, Opcode::Ldr),
            OP_LD => self.decode_mem(insn, address, Opcode::Ld),
            OP_SB => self.decode_mem(insn, address, Opcode::Sb),
            OP_SH => self.decode_mem(insn, address, Opcode::Sh),
            OP_SWL => self.decode_mem(insn, address, Opcode::Swl),
            OP_SW => self.decode_mem(insn, address, Opcode::Sw),
            OP_SDL => self.decode_mem(insn, address, Opcode::Sdl),
            OP_SDR => self.decode_mem(insn, address, Opcode::Sdr),
            OP_SWR => self.decode_mem(insn, address, Opcode::Swr),
            OP_SD => self.decode_mem(insn, address, Opcode::Sd),
            OP_CACHE => self.decode_mem(insn, address, Opcode::Cache),
            OP_PREF => self.decode_mem(insn, address, Opcode::Pref),
            OP_LL => self.decode_mem(insn, address, Opcode::Ll),
            OP_LLD => self.decode_mem(insn, address, Opcode::Lld),
            OP_SC => self.decode_mem(insn, address, Opcode::Sc),
            OP_SCD => self.decode_mem(insn, address, Opcode::Scd),
            OP_LWC1 => self.decode_fp_mem(insn, address, Opcode::Lwc1),
            OP_LDC1 => self.decode_fp_mem(insn, address, Opcode::Ldc1),
            OP_SWC1 => self.decode_fp_mem(insn, address, Opcode::Swc1),
            OP_SDC1 => self.decode_fp_mem(insn, address, Opcode::Sdc1),
            _ => self.base(insn, address, Opcode::Unrecognized),
        }
    }

    fn decode_special(&self, insn: u32, address: u64) -> Instruction {
        let three = |opcode| {
            self.base(insn, address, opcode).with_operands(vec![
                Operand::reg(rd(insn)),
                Operand::reg(rs(insn)),
                Operand::reg(rt(insn)),
            ])
        };
        let shift = |opcode| {
            self.base(insn, address, opcode)
                .with_operands(vec![
                    Operand::reg(rd(insn)),
                    Operand::reg(rt(insn)),
                    Operand::imm(sa(insn)),
                ])
                .with_immediate(sa(insn))
        };
        let hilo = |opcode| {
            self.base(insn, address, opcode)
                .with_operands(vec![Operand::reg(rs(insn)), Operand::reg(rt(insn))])
        };

        match funct(insn) {
            0x00 if insn == 0 => self.base(insn, address, Opcode::Nop),
            0x00 => shift(Opcode::Sll),
            0x02 => shift(Opcode::Srl),
            0x03 => shift(Opcode::Sra),
            0x04 => three(Opcode::Sllv),
            0x06 => three(Opcode::Srlv),
            0x07 => three(Opcode::Srav),
            0x08 => {
                let cf = if rs(insn) == mips::RA {
                    ControlFlow::Return
                } else {
                    ControlFlow::IndirectBranch
                };
                self.base(insn, address, Opcode::Jr)
                    .with_operands(vec![Operand::reg(rs(insn))])
                    .with_control_flow(cf)
            }
            0x09 => self
                .base(insn, address, Opcode::Jalr)
                .with_operands(vec![Operand::reg(rd(insn)), Operand::reg(rs(insn))])
                .with_control_flow(ControlFlow::IndirectCall {
                    return_addr: address.wrapping_add(8),
                }),
            0x0a => three(Opcode::Movz),
            0x0b => three(Opcode::Movn),
            0x0c => self
                .base(insn, address, Opcode::Syscall)
                .with_control_flow(ControlFlow::Syscall),
            0x0d => self
                .base(insn, address, Opcode::Break)
                .with_control_flow(ControlFlow::Halt),
            0x0f => self.base(insn, address, Opcode::Sync),
            0x10 => self
                .base(insn, address, Opcode::Mfhi)
                .with_operands(vec![Operand::reg(rd(insn))]),
            0x11 => self
                .base(insn, address, Opcode::Mthi)
                .with_operands(vec![Operand::reg(rs(insn))]),
            0x12 => self
                .base(insn, address, Opcode::Mflo)
                .with_operands(vec![Operand::reg(rd(insn))]),
            0x13 => self
                .base(insn, address, Opcode::Mtlo)
                .with_operands(vec![Operand::reg(rs(insn))]),
            0x18 => hilo(Opcode::Mult),
            0x19 => hilo(Opcode::Multu),
            0x1a => hilo(Opcode::Div),
            0x1b => hilo(Opcode::Divu),
            0x1c => hilo(Opcode::Dmult),
            0x1d => hilo(Opcode::Dmultu),
            0x1e => hilo(Opcode::Ddiv),
            0x1f => hilo(Opcode::Ddivu),
            0x20 => three(Opcode::Add),
            0x21 => three(Opcode::Addu),
            0x22 => three(Opcode::Sub),
            0x23 => three(Opcode::Subu),
            0x24 => three(Opcode::And),
            0x25 => three(Opcode::Or),
            0x26 => three(Opcode::Xor),
            0x27 => three(Opcode::Nor),
            0x2a => three(Opcode::Slt),
            0x2b => three(Opcode::Sltu),
            0x2c => three(Opcode::Dadd),
            0x2d => three(Opcode::Daddu),
            0x2e => three(Opcode::Dsub),
            0x2f => three(Opcode::Dsubu),
            0x30..=0x36 => self
                .base(insn, address, Opcode::Trap)
                .with_operands(vec![Operand::reg(rs(insn)), Operand::reg(rt(insn))])
                .with_control_flow(ControlFlow::Halt),
            0x38 => shift(Opcode::Dsll),
            0x3a => shift(Opcode::Dsrl),
            0x3b => shift(Opcode::Dsra),
            0x3c => shift(Opcode::Dsll32),
            0x3e => shift(Opcode::Dsrl32),
            0x3f => shift(Opcode::Dsra32),
            _ => self.base(insn, address, Opcode::Unrecognized),
        }
    }

    fn decode_regimm(&self, insn: u32, address: u64) -> Instruction {
        let opcode = match rt(insn) {
            0x00 => Opcode::Bltz,
            0x01 => Opcode::Bgez,
            0x02 => Opcode::Bltzl,
            0x03 => Opcode::Bgezl,
            0x10 => Opcode::Bltzal,
            0x11 => Opcode::Bgezal,
            0x12 => Opcode::Bltzall,
            0x13 => Opcode::Bgezall,
            0x08..=0x0c | 0x0e => {
                return self
                    .base(insn, address, Opcode::TrapImmediate)
                    .with_operands(vec![Operand::reg(rs(insn)), Operand::imm(simm16(insn))])
                    .with_immediate(simm16(insn))
                    .with_control_flow(ControlFlow::Halt);
            }
            _ => return self.base(insn, address, Opcode::Unrecognized),
        };
        self.decode_branch(insn, address, opcode, false)
    }

    fn decode_jump(&self, insn: u32, address: u64, opcode: Opcode) -> Instruction {
        let region = address.wrapping_add(4) & !0x0fff_ffff;
        let mut target = region | (jump_index(insn) << 2);
        if opcode == Opcode::Jalx {
            target = InstructionWidth::Compact.tag_address(target);
        }
        let cf = match opcode {
            Opcode::J => ControlFlow::UnconditionalBranch { target },
            _ => ControlFlow::Call {
                target,
                return_addr: address.wrapping_add(8),
            },
        };
        self.base(insn, address, opcode)
            .with_operands(vec![Operand::Target(target)])
            .with_control_flow(cf)
    }

    fn decode_branch(&self, insn: u32, address: u64, opcode: Opcode, two_regs: bool) -> Instruction {
        let target = branch_target(address, insn);
        let mut ops = vec![Operand::reg(rs(insn))];
        if two_regs {
            ops.push(Operand::reg(rt(insn)));
        }
        ops.push(Operand::Target(target));
        self.base(insn, address, opcode)
            .with_operands(ops)
            .with_immediate(simm16(insn) << 2)
            .with_control_flow(ControlFlow::ConditionalBranch {
                target,
                fallthrough: address.wrapping_add(8),
            })
    }

    fn decode_imm(&self, insn: u32, address: u64, opcode: Opcode, imm: i64) -> Instruction {
        self.base(insn, address, opcode)
            .with_operands(vec![
                Operand::reg(rt(insn)),
                Operand::reg(rs(insn)),
                Operand::imm(imm),
            ])
            .with_immediate(imm)
    }

    fn decode_mem(&self, insn: u32, address: u64, opcode: Opcode) -> Instruction {
        self.base(insn, address, opcode)
            .with_operands(vec![
                Operand::reg(rt(insn)),
                Operand::mem(rs(insn), simm16(insn)),
            ])
            .with_immediate(simm16(insn))
    }

    fn decode_fp_mem(&self, insn: u32, address: u64, opcode: Opcode) -> Instruction {
        self.base(insn, address, opcode)
            .with_operands(vec![
                Operand::reg(mips::FP0 + rt(insn)),
                Operand::mem(rs(insn), simm16(insn)),
            ])
            .with_immediate(simm16(insn))
    }

    fn decode_cop1(&self, insn: u32, address: u64) -> Instruction {
        if (insn >> 21) & 0x1f != COP_BC {
            return self.base(insn, address, Opcode::Cop1);
        }
        // rt bit 0 selects true/false, bit 1 selects the likely form
        let opcode = match rt(insn) & 0x3 {
            0 => Opcode::Bc1f,
            1 => Opcode::Bc1t,
            2 => Opcode::Bc1fl,
            _ => Opcode::Bc1tl,
        };
        self.decode_cop_branch(insn, address, opcode)
    }

    fn decode_cop_branch(&self, insn: u32, address: u64, opcode: Opcode) -> Instruction {
        let target = branch_target(address, insn);
        self.base(insn, address, opcode)
            .with_operands(vec![Operand::imm(((insn >> 18) & 0x7) as i64), Operand::Target(target)])
            .with_immediate(simm16(insn) << 2)
            .with_control_flow(ControlFlow::ConditionalBranch {
                target,
                fallthrough: address.wrapping_add(8),
            })
    }
}

impl Default for Mips32Decoder {
    fn default() -> Self {
        Self::new(Endianness::Big)
    }
}

impl Decoder for Mips32Decoder {
    fn decode(&self, word: u32, address: u64) -> Instruction {
        self.decode_word(word, address)
    }

    fn decode_instruction(&self, bytes: &[u8], address: u64) -> Result<DecodedInstruction, DecodeError> {
        if address & 3 != 0 {
            return Err(DecodeError::misaligned(address, 4));
        }
        if bytes.len() < 4 {
            return Err(DecodeError::truncated(address, 4, bytes.len()));
        }
        let arr = [bytes[0], bytes[1], bytes[2], bytes[3]];
        let word = match self.endianness {
            Endianness::Big => u32::from_be_bytes(arr),
            Endianness::Little => u32::from_le_bytes(arr),
        };
        Ok(DecodedInstruction {
            instruction: self.decode_word(word, address),
            size: 4,
        })
    }

    fn fetch(&self, memory: &dyn Memory, address: u64) -> framewalk_core::Result<Instruction> {
        let word = memory.read_u32(address, self.endianness)?;
        Ok(self.decode_word(word, address))
    }

    fn width(&self) -> InstructionWidth {
        InstructionWidth::Full
    }

    fn endianness(&self) -> Endianness {
        self.endianness
    }
}
