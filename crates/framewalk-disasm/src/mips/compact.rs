//! MIPS16 decoder.
//!
//! MIPS16 instructions are 16 bits wide. Two prefixes make a 32-bit
//! instruction: EXTEND widens the immediate of the next instruction, and
//! JAL/JALX carries the low 16 bits of its target in a second halfword.
//! [`Mips16Decoder::fetch`] fuses both into a single 4-byte instruction with
//! the prefix in the upper half of `raw`.

use crate::{DecodeError, DecodedInstruction, Decoder};
use framewalk_core::{
    mips, ControlFlow, Endianness, Instruction, InstructionWidth, Memory, Opcode, Operand,
};

// Major opcodes (bits 15:11)
const OP_ADDIUSP: u16 = 0x00;
const OP_ADDIUPC: u16 = 0x01;
const OP_B: u16 = 0x02;
const OP_JAL: u16 = 0x03;
const OP_BEQZ: u16 = 0x04;
const OP_BNEZ: u16 = 0x05;
const OP_SHIFT: u16 = 0x06;
const OP_LD: u16 = 0x07;
const OP_RRIA: u16 = 0x08;
const OP_ADDIU8: u16 = 0x09;
const OP_SLTI: u16 = 0x0a;
const OP_SLTIU: u16 = 0x0b;
const OP_I8: u16 = 0x0c;
const OP_LI: u16 = 0x0d;
const OP_CMPI: u16 = 0x0e;
const OP_SD: u16 = 0x0f;
const OP_LB: u16 = 0x10;
const OP_LH: u16 = 0x11;
const OP_LWSP: u16 = 0x12;
const OP_LW: u16 = 0x13;
const OP_LBU: u16 = 0x14;
const OP_LHU: u16 = 0x15;
const OP_LWPC: u16 = 0x16;
const OP_LWU: u16 = 0x17;
const OP_SB: u16 = 0x18;
const OP_SH: u16 = 0x19;
const OP_SWSP: u16 = 0x1a;
const OP_SW: u16 = 0x1b;
const OP_RRR: u16 = 0x1c;
const OP_RR: u16 = 0x1d;
const OP_EXTEND: u16 = 0x1e;
const OP_I64: u16 = 0x1f;

/// Returns true if `half` is an EXTEND prefix.
pub fn is_extend(half: u16) -> bool {
    half & 0xf800 == 0xf000
}

/// Returns true if `half` is the first half of a JAL or JALX.
pub fn is_jal_prefix(half: u16) -> bool {
    half & 0xf800 == 0x1800
}

/// Returns true if `half` must be followed by a second halfword.
pub fn needs_continuation(half: u16) -> bool {
    is_extend(half) || is_jal_prefix(half)
}

/// Immediate assembled from an EXTEND prefix and the instruction's low bits.
pub fn extended_immediate(ext: u16, insn: u16) -> i64 {
    let value = (((ext & 0x1f) as u32) << 11) | (ext & 0x7e0) as u32 | (insn & 0x1f) as u32;
    value as u16 as i16 as i64
}

/// Major opcode (bits 15:11).
#[inline]
fn major(insn: u16) -> u16 {
    insn >> 11
}

/// rx field, mapped to a full register number.
#[inline]
fn rx(insn: u16) -> u16 {
    mips::MIPS16_TO_32[((insn >> 8) & 7) as usize]
}

/// ry field, mapped to a full register number.
#[inline]
fn ry(insn: u16) -> u16 {
    mips::MIPS16_TO_32[((insn >> 5) & 7) as usize]
}

/// rz field, mapped to a full register number.
#[inline]
fn rz(insn: u16) -> u16 {
    mips::MIPS16_TO_32[((insn >> 2) & 7) as usize]
}

/// Non-extended immediate: low `bits` bits, optionally sign-extended, scaled.
#[inline]
fn field_imm(insn: u16, bits: u32, scale: i64, signed: bool) -> i64 {
    let mask = (1u32 << bits) - 1;
    let raw = (insn as u32) & mask;
    let value = if signed && raw & (1 << (bits - 1)) != 0 {
        raw as i64 - (1i64 << bits)
    } else {
        raw as i64
    };
    value * scale
}

/// Fields of a SAVE or RESTORE instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkSaveFields {
    /// Argument-register encoding (0-15), zero when not extended.
    pub aregs: u8,
    /// Number of extra static registers s2..s8, zero when not extended.
    pub xsregs: u8,
    /// Frame size in bytes.
    pub frame_size: u64,
    /// Whether ra is saved.
    pub ra: bool,
    /// Whether s0 is saved.
    pub s0: bool,
    /// Whether s1 is saved.
    pub s1: bool,
}

impl BulkSaveFields {
    /// Extracts the fields of a decoded SAVE or RESTORE.
    pub fn from_instruction(insn: &Instruction) -> Option<Self> {
        if !matches!(insn.opcode, Opcode::Save | Opcode::Restore) {
            return None;
        }
        let word = insn.raw;
        let low = (word & 0xffff) as u16;
        let (aregs, xsregs, size_units) = if insn.extended {
            let ext = (word >> 16) as u16;
            let units = ((ext & 0xf0) | (low & 0xf)) as u64;
            ((ext & 0xf) as u8, ((ext >> 8) & 7) as u8, units)
        } else {
            let units = (low & 0xf) as u64;
            (0, 0, if units == 0 { 16 } else { units })
        };
        Some(Self {
            aregs,
            xsregs,
            frame_size: size_units * 8,
            ra: low & 0x40 != 0,
            s0: low & 0x20 != 0,
            s1: low & 0x10 != 0,
        })
    }
}

/// Fields of an ENTRY instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryFields {
    /// Number of argument registers saved (a0 upward).
    pub aregs: u8,
    /// Number of static registers saved (s0, s1).
    pub sregs: u8,
    /// Whether ra is saved.
    pub ra: bool,
}

impl EntryFields {
    /// Extracts the fields of a decoded ENTRY.
    pub fn from_instruction(insn: &Instruction) -> Option<Self> {
        if insn.opcode != Opcode::Entry {
            return None;
        }
        let half = insn.raw as u16;
        Some(Self {
            aregs: ((half >> 8) & 7) as u8,
            sregs: ((half >> 6) & 3) as u8,
            ra: half & 0x20 != 0,
        })
    }
}

/// MIPS16 decoder.
#[derive(Debug, Clone, Copy)]
pub struct Mips16Decoder {
    endianness: Endianness,
}

impl Mips16Decoder {
    /// Creates a decoder reading halfwords in the given byte order.
    pub fn new(endianness: Endianness) -> Self {
        Self { endianness }
    }

    fn base(&self, raw: u32, address: u64, size: usize, opcode: Opcode) -> Instruction {
        Instruction::new(address, size, InstructionWidth::Compact, raw, opcode)
    }

    fn decode_word(&self, word: u32, address: u64) -> Instruction {
        let address = address & !1;
        let hi = (word >> 16) as u16;
        let lo = word as u16;

        if hi != 0 && is_extend(hi) {
            if needs_continuation(lo) {
                return self.base(word, address, 4, Opcode::Unrecognized).with_extend();
            }
            return self.decode_half(lo, Some(hi), address).with_extend();
        }
        if hi != 0 && is_jal_prefix(hi) {
            return self.decode_jal(hi, lo, address);
        }
        self.decode_half(lo, None, address)
    }

    fn decode_jal(&self, first: u16, second: u16, address: u64) -> Instruction {
        let raw = ((first as u32) << 16) | second as u32;
        let index = (((first & 0x1f) as u64) << 21) | ((((first >> 5) & 0x1f) as u64) << 16) | second as u64;
        let region = address.wrapping_add(4) & !0x0fff_ffff;
        let plain = region | (index << 2);
        let exchange = first & 0x0400 != 0;
        let (opcode, target) = if exchange {
            (Opcode::Jalx, InstructionWidth::Full.tag_address(plain))
        } else {
            (Opcode::Jal, InstructionWidth::Compact.tag_address(plain))
        };
        self.base(raw, address, 4, opcode)
            .with_operands(vec![Operand::Target(target)])
            .with_control_flow(ControlFlow::Call {
                target,
                return_addr: address.wrapping_add(6) | 1,
            })
    }

    /// Decodes one halfword, optionally carrying an EXTEND prefix.
    fn decode_half(&self, insn: u16, ext: Option<u16>, address: u64) -> Instruction {
        let size = if ext.is_some() { 4 } else { 2 };
        let raw = match ext {
            Some(e) => ((e as u32) << 16) | insn as u32,
            None => insn as u32,
        };
        let imm = |bits: u32, scale: i64, signed: bool| match ext {
            Some(e) => extended_immediate(e, insn),
            None => field_imm(insn, bits, scale, signed),
        };
        let base = |opcode| self.base(raw, address, size, opcode);
        let load_store = |opcode, reg: u16, basereg: u16, offset: i64| {
            base(opcode)
                .with_operands(vec![Operand::reg(reg), Operand::mem(basereg, offset)])
                .with_immediate(offset)
        };
        let branch = |opcode, regs: Vec<Operand>, offset: i64| {
            let target = address.wrapping_add(size as u64).wrapping_add(offset as u64);
            let mut ops = regs;
            ops.push(Operand::Target(target));
            base(opcode)
                .with_operands(ops)
                .with_immediate(offset)
                .with_control_flow(ControlFlow::ConditionalBranch {
                    target,
                    fallthrough: address.wrapping_add(size as u64),
                })
        };

        match major(insn) {
            OP_ADDIUSP => {
                let off = imm(8, 4, false);
                base(Opcode::Addiu)
                    .with_operands(vec![Operand::reg(rx(insn)), Operand::reg(mips::SP), Operand::imm(off)])
                    .with_immediate(off)
            }
            OP_ADDIUPC => {
                let off = imm(8, 4, false);
                base(Opcode::Addiu)
                    .with_operands(vec![Operand::reg(rx(insn)), Operand::reg(mips::PC), Operand::imm(off)])
                    .with_immediate(off)
            }
            OP_B => {
                let off = match ext {
                    Some(e) => extended_immediate(e, insn) << 1,
                    None => field_imm(insn, 11, 2, true),
                };
                let target = address.wrapping_add(size as u64).wrapping_add(off as u64);
                base(Opcode::B)
                    .with_operands(vec![Operand::Target(target)])
                    .with_immediate(off)
                    .with_control_flow(ControlFlow::UnconditionalBranch { target })
            }
            OP_JAL => base(Opcode::Jal),
            OP_BEQZ | OP_BNEZ => {
                let opcode = if major(insn) == OP_BEQZ { Opcode::Beqz } else { Opcode::Bnez };
                let off = match ext {
                    Some(e) => extended_immediate(e, insn) << 1,
                    None => field_imm(insn, 8, 2, true),
                };
                branch(opcode, vec![Operand::reg(rx(insn))], off)
            }
            OP_SHIFT => {
                let amount = match ext {
                    Some(e) => ((e >> 6) & 0x1f) as i64 | (((e >> 5) & 1) as i64) << 5,
                    None => match (insn >> 2) & 7 {
                        0 => 8,
                        n => n as i64,
                    },
                };
                let opcode = match insn & 3 {
                    0 => Opcode::Sll,
                    1 => Opcode::Dsll,
                    2 => Opcode::Srl,
                    _ => Opcode::Sra,
                };
                base(opcode)
                    .with_operands(vec![Operand::reg(rx(insn)), Operand::reg(ry(insn)), Operand::imm(amount)])
                    .with_immediate(amount)
            }
            OP_LD => load_store(Opcode::Ld, ry(insn), rx(insn), imm(5, 8, false)),
            OP_RRIA => {
                let opcode = if insn & 0x10 != 0 { Opcode::Daddiu } else { Opcode::Addiu };
                let off = match ext {
                    Some(e) => {
                        // 15-bit immediate: ext 3:0 -> 14:11, ext 10:4 -> 10:4, insn 3:0
                        let v = (((e & 0xf) as u32) << 11) | (e & 0x7f0) as u32 | (insn & 0xf) as u32;
                        ((v << 17) as i32 >> 17) as i64
                    }
                    None => field_imm(insn, 4, 1, true),
                };
                base(opcode)
                    .with_operands(vec![Operand::reg(ry(insn)), Operand::reg(rx(insn)), Operand::imm(off)])
                    .with_immediate(off)
            }
            OP_ADDIU8 | OP_SLTI | OP_SLTIU | OP_CMPI | OP_LI => {
                let (opcode, signed) = match major(insn) {
                    OP_ADDIU8 => (Opcode::Addiu, true),
                    OP_SLTI => (Opcode::Slti, false),
                    OP_SLTIU => (Opcode::Sltiu, false),
                    OP_CMPI => (Opcode::Cmpi, false),
                    _ => (Opcode::Li, false),
                };
                let value = imm(8, 1, signed);
                let mut ops = vec![Operand::reg(rx(insn))];
                if opcode == Opcode::Addiu {
                    ops.push(Operand::reg(rx(insn)));
                }
                ops.push(Operand::imm(value));
                base(opcode).with_operands(ops).with_immediate(value)
            }
            OP_I8 => self.decode_i8(insn, ext, address, raw, size),
            OP_SD => load_store(Opcode::Sd, ry(insn), rx(insn), imm(5, 8, false)),
            OP_LB => load_store(Opcode::Lb, ry(insn), rx(insn), imm(5, 1, false)),
            OP_LH => load_store(Opcode::Lh, ry(insn), rx(insn), imm(5, 2, false)),
            OP_LWSP => load_store(Opcode::Lw, rx(insn), mips::SP, imm(8, 4, false)),
            OP_LW => load_store(Opcode::Lw, ry(insn), rx(insn), imm(5, 4, false)),
            OP_LBU => load_store(Opcode::Lbu, ry(insn), rx(insn), imm(5, 1, false)),
            OP_LHU => load_store(Opcode::Lhu, ry(insn), rx(insn), imm(5, 2, false)),
            OP_LWPC => load_store(Opcode::Lw, rx(insn), mips::PC, imm(8, 4, false)),
            OP_LWU => load_store(Opcode::Lwu, ry(insn), rx(insn), imm(5, 4, false)),
            OP_SB => load_store(Opcode::Sb, ry(insn), rx(insn), imm(5, 1, false)),
            OP_SH => load_store(Opcode::Sh, ry(insn), rx(insn), imm(5, 2, false)),
            OP_SWSP => load_store(Opcode::Sw, rx(insn), mips::SP, imm(8, 4, false)),
            OP_SW => load_store(Opcode::Sw, ry(insn), rx(insn), imm(5, 4, false)),
            OP_RRR => {
                let opcode = match insn & 3 {
                    0 => Opcode::Daddu,
                    1 => Opcode::Addu,
                    2 => Opcode::Dsubu,
                    _ => Opcode::Subu,
                };
                base(opcode).with_operands(vec![
                    Operand::reg(rz(insn)),
                    Operand::reg(rx(insn)),
                    Operand::reg(ry(insn)),
                ])
            }
            OP_RR => self.decode_rr(insn, address, raw, size),
            OP_EXTEND => base(Opcode::Extend).with_immediate((insn & 0x7ff) as i64),
            OP_I64 => self.decode_i64(insn, ext, address, raw, size),
            _ => base(Opcode::Unrecognized),
        }
    }

    fn decode_i8(&self, insn: u16, ext: Option<u16>, address: u64, raw: u32, size: usize) -> Instruction {
        let base = |opcode| self.base(raw, address, size, opcode);
        let imm = |bits: u32, scale: i64, signed: bool| match ext {
            Some(e) => extended_immediate(e, insn),
            None => field_imm(insn, bits, scale, signed),
        };
        match (insn >> 8) & 7 {
            0 | 1 => {
                let opcode = if (insn >> 8) & 7 == 0 { Opcode::Bteqz } else { Opcode::Btnez };
                let off = match ext {
                    Some(e) => extended_immediate(e, insn) << 1,
                    None => field_imm(insn, 8, 2, true),
                };
                let target = address.wrapping_add(size as u64).wrapping_add(off as u64);
                base(opcode)
                    .with_operands(vec![Operand::Target(target)])
                    .with_immediate(off)
                    .with_control_flow(ControlFlow::ConditionalBranch {
                        target,
                        fallthrough: address.wrapping_add(size as u64),
                    })
            }
            2 => {
                let off = imm(8, 4, false);
                base(Opcode::Sw)
                    .with_operands(vec![Operand::reg(mips::RA), Operand::mem(mips::SP, off)])
                    .with_immediate(off)
            }
            3 => {
                let off = imm(8, 8, true);
                base(Opcode::Addiu)
                    .with_operands(vec![Operand::reg(mips::SP), Operand::reg(mips::SP), Operand::imm(off)])
                    .with_immediate(off)
            }
            4 => {
                let opcode = if insn & 0x80 != 0 { Opcode::Save } else { Opcode::Restore };
                let mut insn = base(opcode);
                if ext.is_some() {
                    insn = insn.with_extend();
                }
                let frame = BulkSaveFields::from_instruction(&insn).map_or(0, |f| f.frame_size as i64);
                insn.with_immediate(frame)
            }
            5 => {
                // move r32, rz; the 5-bit r32 field is stored rotated
                let field = (insn >> 3) & 0x1f;
                let r32 = ((field & 3) << 3) | (field >> 2);
                let opcode = if insn == 0x6500 { Opcode::Nop } else { Opcode::Move };
                base(opcode).with_operands(vec![Operand::reg(r32), Operand::reg(rz(insn))])
            }
            7 => base(Opcode::Move).with_operands(vec![Operand::reg(ry(insn)), Operand::reg(insn & 0x1f)]),
            _ => base(Opcode::Unrecognized),
        }
    }

    fn decode_i64(&self, insn: u16, ext: Option<u16>, address: u64, raw: u32, size: usize) -> Instruction {
        let base = |opcode| self.base(raw, address, size, opcode);
        let imm = |bits: u32, scale: i64, signed: bool| match ext {
            Some(e) => extended_immediate(e, insn),
            None => field_imm(insn, bits, scale, signed),
        };
        let store = |opcode, reg: u16, basereg: u16, off: i64| {
            base(opcode)
                .with_operands(vec![Operand::reg(reg), Operand::mem(basereg, off)])
                .with_immediate(off)
        };
        match (insn >> 8) & 7 {
            0 => store(Opcode::Ld, ry(insn), mips::SP, imm(5, 8, false)),
            1 => store(Opcode::Sd, ry(insn), mips::SP, imm(5, 8, false)),
            2 => store(Opcode::Sd, mips::RA, mips::SP, imm(8, 8, false)),
            3 => {
                let off = imm(8, 8, true);
                base(Opcode::Daddiu)
                    .with_operands(vec![Operand::reg(mips::SP), Operand::reg(mips::SP), Operand::imm(off)])
                    .with_immediate(off)
            }
            4 => store(Opcode::Ld, ry(insn), mips::PC, imm(5, 8, false)),
            5 => {
                let off = imm(5, 1, true);
                base(Opcode::Daddiu)
                    .with_operands(vec![Operand::reg(ry(insn)), Operand::reg(ry(insn)), Operand::imm(off)])
                    .with_immediate(off)
            }
            n => {
                let basereg = if n == 6 { mips::PC } else { mips::SP };
                let off = imm(5, 4, false);
                base(Opcode::Daddiu)
                    .with_operands(vec![Operand::reg(ry(insn)), Operand::reg(basereg), Operand::imm(off)])
                    .with_immediate(off)
            }
        }
    }

    fn decode_rr(&self, insn: u16, address: u64, raw: u32, size: usize) -> Instruction {
        let base = |opcode| self.base(raw, address, size, opcode);
        let two = |opcode| base(opcode).with_operands(vec![Operand::reg(rx(insn)), Operand::reg(ry(insn))]);
        match insn & 0x1f {
            0x00 => {
                let link = insn & 0x40 != 0;
                let compact = insn & 0x80 != 0;
                let via_ra = insn & 0x20 != 0 && !link;
                let reg = if via_ra { mips::RA } else { rx(insn) };
                let delay = if compact { 0 } else { 2 };
                let opcode = match (link, compact) {
                    (false, false) => Opcode::Jr,
                    (false, true) => Opcode::Jrc,
                    (true, false) => Opcode::Jalr,
                    (true, true) => Opcode::Jalrc,
                };
                let cf = if link {
                    ControlFlow::IndirectCall {
                        return_addr: address.wrapping_add(2 + delay) | 1,
                    }
                } else if reg == mips::RA {
                    ControlFlow::Return
                } else {
                    ControlFlow::IndirectBranch
                };
                base(opcode)
                    .with_operands(vec![Operand::reg(reg)])
                    .with_control_flow(cf)
            }
            0x01 => base(Opcode::Sdbbp).with_control_flow(ControlFlow::Halt),
            0x02 => two(Opcode::Slt),
            0x03 => two(Opcode::Sltu),
            0x04 => two(Opcode::Sllv),
            0x05 => base(Opcode::Break).with_control_flow(ControlFlow::Halt),
            0x06 => two(Opcode::Srlv),
            0x07 => two(Opcode::Srav),
            0x09 if insn & 0x700 == 0x700 => base(Opcode::Exit).with_control_flow(ControlFlow::Return),
            0x09 => base(Opcode::Entry),
            0x0a => two(Opcode::Cmp),
            0x0b => two(Opcode::Neg),
            0x0c => two(Opcode::And),
            0x0d => two(Opcode::Or),
            0x0e => two(Opcode::Xor),
            0x0f => two(Opcode::Not),
            0x10 => base(Opcode::Mfhi).with_operands(vec![Operand::reg(rx(insn))]),
            0x12 => base(Opcode::Mflo).with_operands(vec![Operand::reg(rx(insn))]),
            0x18 => two(Opcode::Mult),
            0x19 => two(Opcode::Multu),
            0x1a => two(Opcode::Div),
            0x1b => two(Opcode::Divu),
            0x1c => two(Opcode::Dmult),
            0x1d => two(Opcode::Dmultu),
            0x1e => two(Opcode::Ddiv),
            0x1f => two(Opcode::Ddivu),
            _ => base(Opcode::Unrecognized),
        }
    }

    fn read_half(&self, bytes: &[u8]) -> u16 {
        let arr = [bytes[0], bytes[1]];
        match self.endianness {
            Endianness::Big => u16::from_be_bytes(arr),
            Endianness::Little => u16::from_le_bytes(arr),
        }
    }
}

impl Default for Mips16Decoder {
    fn default() -> Self {
        Self::new(Endianness::Big)
    }
}

impl Decoder for Mips16Decoder {
    fn decode(&self, word: u32, address: u64) -> Instruction {
        self.decode_word(word, address)
    }

    fn decode_instruction(&self, bytes: &[u8], address: u64) -> Result<DecodedInstruction, DecodeError> {
        if bytes.len() < 2 {
            return Err(DecodeError::truncated(address, 2, bytes.len()));
        }
        let first = self.read_half(bytes);
        let word = if needs_continuation(first) {
            if bytes.len() < 4 {
                return Err(DecodeError::truncated(address, 4, bytes.len()));
            }
            ((first as u32) << 16) | self.read_half(&bytes[2..]) as u32
        } else {
            first as u32
        };
        let instruction = self.decode_word(word, address);
        let size = instruction.size;
        Ok(DecodedInstruction { instruction, size })
    }

    fn fetch(&self, memory: &dyn Memory, address: u64) -> framewalk_core::Result<Instruction> {
        let address = address & !1;
        let first = memory.read_u16(address, self.endianness)?;
        let word = if needs_continuation(first) {
            let second = memory.read_u16(address + 2, self.endianness)?;
            ((first as u32) << 16) | second as u32
        } else {
            first as u32
        };
        Ok(self.decode_word(word, address))
    }

    fn width(&self) -> InstructionWidth {
        InstructionWidth::Compact
    }

    fn endianness(&self) -> Endianness {
        self.endianness
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(word: u32) -> Instruction {
        Mips16Decoder::default().decode(word, 0x400101)
    }

    #[test]
    fn test_adjsp() {
        // addiu $sp, -32 (imm8 = -4, scaled by 8)
        let insn = decode(0x63fc);
        assert_eq!(insn.opcode, Opcode::Addiu);
        assert_eq!(insn.reg(0), Some(mips::SP));
        assert_eq!(insn.immediate, Some(-32));
        assert_eq!(insn.size, 2);
        assert_eq!(insn.address, 0x400100);
    }

    #[test]
    fn test_extended_adjsp() {
        // extend 0x7ff / addiu $sp, ... => -1024
        let ext = 0xf000u32 | (0x1f << 0) | (0x20 << 5);
        let word = (ext << 16) | 0x6300;
        let insn = decode(word);
        assert!(insn.extended);
        assert_eq!(insn.size, 4);
        assert_eq!(insn.opcode, Opcode::Addiu);
        assert_eq!(insn.immediate, Some(extended_immediate(ext as u16, 0x6300)));
        assert!(insn.immediate.unwrap() < 0);
    }

    #[test]
    fn test_extended_immediate_layout() {
        // ext bits 4:0 -> imm 15:11, ext bits 10:5 -> imm 10:5, insn bits 4:0 -> imm 4:0
        assert_eq!(extended_immediate(0xf000 | 0x01, 0x0000), 0x0800);
        assert_eq!(extended_immediate(0xf000 | 0x20, 0x0000), 0x0020);
        assert_eq!(extended_immediate(0xf000, 0x0003), 3);
        assert_eq!(extended_immediate(0xf000 | 0x10, 0), -32768);
    }

    #[test]
    fn test_sw_sp_and_ra() {
        // sw $s0, 24($sp): SWSP rx=0 (s0), imm 6
        let insn = decode(0xd006);
        assert_eq!(insn.opcode, Opcode::Sw);
        assert_eq!(insn.reg(0), Some(mips::S0));
        assert_eq!(insn.memory().unwrap().offset, 24);

        // sw $ra, 28($sp): I8 funct 2, imm 7
        let insn = decode(0x6207);
        assert_eq!(insn.opcode, Opcode::Sw);
        assert_eq!(insn.reg(0), Some(mips::RA));
        assert_eq!(insn.memory().unwrap().offset, 28);
    }

    #[test]
    fn test_sd_forms() {
        // sd $v0, 16($sp): I64 funct 1, ry=2 (v0), imm 2
        let insn = decode(0xf942);
        assert_eq!(insn.opcode, Opcode::Sd);
        assert_eq!(insn.reg(0), Some(mips::V0));
        assert_eq!(insn.memory().unwrap().offset, 16);

        // sd $ra, 8($sp)
        let insn = decode(0xfa01);
        assert_eq!(insn.reg(0), Some(mips::RA));
        assert_eq!(insn.memory().unwrap().offset, 8);
    }

    #[test]
    fn test_moves() {
        let insn = decode(0x673d);
        assert_eq!(insn.opcode, Opcode::Move);
        assert_eq!(insn.reg(0), Some(mips::S1));
        assert_eq!(insn.reg(1), Some(mips::SP));

        assert_eq!(decode(0x6500).opcode, Opcode::Nop);
    }

    #[test]
    fn test_returns() {
        let insn = decode(0xe820);
        assert_eq!(insn.opcode, Opcode::Jr);
        assert!(insn.is_return());
        let insn = decode(0xe8a0);
        assert_eq!(insn.opcode, Opcode::Jrc);
        assert!(insn.is_return());
    }

    #[test]
    fn test_save_fields() {
        // save $ra, $s0, 32: s=1, ra=1, s0=1, framesize 4
        let insn = decode(0x64e4);
        assert_eq!(insn.opcode, Opcode::Save);
        let f = BulkSaveFields::from_instruction(&insn).unwrap();
        assert!(f.ra && f.s0 && !f.s1);
        assert_eq!(f.frame_size, 32);
        assert_eq!(f.aregs, 0);

        // framesize 0 means 128 bytes
        let f = BulkSaveFields::from_instruction(&decode(0x64c0)).unwrap();
        assert_eq!(f.frame_size, 128);

        // extended: aregs 4, xsregs 2, frame (0x1 << 4 | 0) * 8
        let ext = 0xf000u32 | (2 << 8) | 0x10 | 4;
        let insn = decode((ext << 16) | 0x64c0);
        let f = BulkSaveFields::from_instruction(&insn).unwrap();
        assert_eq!(f.aregs, 4);
        assert_eq!(f.xsregs, 2);
        assert_eq!(f.frame_size, 128);
    }

    #[test]
    fn test_entry_exit() {
        // entry $a0-$a1, $s0-$s1, $ra
        let insn = decode(0xe8a9 | 0x0200 | 0x0080);
        assert_eq!(insn.opcode, Opcode::Entry);
        let f = EntryFields::from_instruction(&insn).unwrap();
        assert_eq!(f.aregs, 2);
        assert_eq!(f.sregs, 2);
        assert!(f.ra);

        assert_eq!(decode(0xef09).opcode, Opcode::Exit);
    }

    #[test]
    fn test_jal_pair() {
        // jal 0x400200 stays in compact mode
        let index = 0x400200u32 >> 2;
        let first = 0x1800 | ((index >> 21) & 0x1f) | (((index >> 16) & 0x1f) << 5);
        let word = (first << 16) | (index & 0xffff);
        let insn = decode(word);
        assert_eq!(insn.opcode, Opcode::Jal);
        assert_eq!(insn.size, 4);
        assert_eq!(insn.target(), Some(0x400201));
    }

    #[test]
    fn test_lone_extend() {
        let insn = decode(0xf123);
        assert_eq!(insn.opcode, Opcode::Extend);
        assert_eq!(insn.size, 2);
    }

    #[test]
    fn test_decode_bytes_needs_continuation() {
        let d = Mips16Decoder::new(Endianness::Little);
        assert!(d.decode_instruction(&[0x00, 0xf0], 0x1000).is_err());
        let r = d.decode_instruction(&[0x00, 0xf0, 0x00, 0x63], 0x1000).unwrap();
        assert_eq!(r.size, 4);
        assert_eq!(r.instruction.opcode, Opcode::Addiu);
    }
}
