//! Decoded instruction representation.

use crate::{InstructionWidth, MemoryRef, Operand};

/// A decoded instruction.
///
/// Instructions are immutable once decoded. `raw` keeps the original bit
/// pattern; for a compact instruction fused with an EXTEND prefix or a
/// JAL pair, the prefix halfword sits in the upper 16 bits.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    /// Address the instruction was read from (mode bit stripped).
    pub address: u64,
    /// Size in bytes (2 or 4).
    pub size: usize,
    /// Encoding the instruction was decoded with.
    pub width: InstructionWidth,
    /// Raw bit pattern.
    pub raw: u32,
    /// Whether a compact instruction carries an EXTEND prefix.
    pub extended: bool,
    /// Opcode class.
    pub opcode: Opcode,
    /// Up to four operands, destination first.
    pub operands: Vec<Operand>,
    /// Decoded immediate, sign-extended and scaled.
    pub immediate: Option<i64>,
    /// Control flow information.
    pub control_flow: ControlFlow,
}

impl Instruction {
    /// Creates a new instruction with minimal fields.
    pub fn new(address: u64, size: usize, width: InstructionWidth, raw: u32, opcode: Opcode) -> Self {
        Self {
            address,
            size,
            width,
            raw,
            extended: false,
            opcode,
            operands: Vec::new(),
            immediate: None,
            control_flow: ControlFlow::Sequential,
        }
    }

    /// Sets operands.
    pub fn with_operands(mut self, ops: Vec<Operand>) -> Self {
        debug_assert!(ops.len() <= 4);
        self.operands = ops;
        self
    }

    /// Sets the immediate.
    pub fn with_immediate(mut self, imm: i64) -> Self {
        self.immediate = Some(imm);
        self
    }

    /// Sets the control flow.
    pub fn with_control_flow(mut self, cf: ControlFlow) -> Self {
        self.control_flow = cf;
        self
    }

    /// Marks the instruction as carrying an EXTEND prefix.
    pub fn with_extend(mut self) -> Self {
        self.extended = true;
        self
    }

    /// Returns the end address (address + size).
    pub fn end_address(&self) -> u64 {
        self.address + self.size as u64
    }

    /// Returns the register number of operand `index`, if it is a register.
    pub fn reg(&self, index: usize) -> Option<u16> {
        self.operands
            .get(index)
            .and_then(Operand::as_register)
            .map(|r| r.0)
    }

    /// Returns the first memory operand.
    pub fn memory(&self) -> Option<MemoryRef> {
        self.operands.iter().find_map(Operand::as_memory)
    }

    /// Returns the branch target, if any.
    pub fn target(&self) -> Option<u64> {
        self.operands.iter().find_map(|op| match op {
            Operand::Target(t) => Some(*t),
            _ => None,
        })
    }

    /// Returns true if the opcode was not recognized.
    pub fn is_unrecognized(&self) -> bool {
        self.opcode == Opcode::Unrecognized
    }

    /// Returns true if this is a conditional branch.
    pub fn is_conditional_branch(&self) -> bool {
        matches!(self.control_flow, ControlFlow::ConditionalBranch { .. })
    }

    /// Returns true if this instruction is a call.
    pub fn is_call(&self) -> bool {
        matches!(
            self.control_flow,
            ControlFlow::Call { .. } | ControlFlow::IndirectCall { .. }
        )
    }

    /// Returns true if this instruction is a return.
    pub fn is_return(&self) -> bool {
        matches!(self.control_flow, ControlFlow::Return)
    }
}

/// Opcode classes for both encodings.
///
/// Compact instructions reuse the full-width class when the operation is
/// the same (`addiu`, `sw`, `jr`...). Classes only found in MIPS16 are
/// grouped at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Opcode {
    // SPECIAL
    Nop,
    Sll,
    Srl,
    Sra,
    Sllv,
    Srlv,
    Srav,
    Jr,
    Jalr,
    Movz,
    Movn,
    Syscall,
    Break,
    Sync,
    Mfhi,
    Mthi,
    Mflo,
    Mtlo,
    Mult,
    Multu,
    Div,
    Divu,
    Dmult,
    Dmultu,
    Ddiv,
    Ddivu,
    Add,
    Addu,
    Sub,
    Subu,
    And,
    Or,
    Xor,
    Nor,
    Slt,
    Sltu,
    Dadd,
    Daddu,
    Dsub,
    Dsubu,
    Dsll,
    Dsrl,
    Dsra,
    Dsll32,
    Dsrl32,
    Dsra32,
    Trap,

    // REGIMM
    Bltz,
    Bgez,
    Bltzl,
    Bgezl,
    Bltzal,
    Bgezal,
    Bltzall,
    Bgezall,
    TrapImmediate,

    // Jumps and branches
    J,
    Jal,
    Jalx,
    Beq,
    Bne,
    Blez,
    Bgtz,
    Beql,
    Bnel,
    Blezl,
    Bgtzl,

    // Immediate arithmetic
    Addi,
    Addiu,
    Slti,
    Sltiu,
    Andi,
    Ori,
    Xori,
    Lui,
    Daddi,
    Daddiu,

    // Coprocessors
    Cop0,
    Cop1,
    Cop2,
    Cop3,
    Bc1f,
    Bc1t,
    Bc1fl,
    Bc1tl,
    CopBranch,

    // Loads and stores
    Lb,
    Lh,
    Lwl,
    Lw,
    Lbu,
    Lhu,
    Lwr,
    Lwu,
    Ldl,
    Ldr,
    Ld,
    Sb,
    Sh,
    Swl,
    Sw,
    Sdl,
    Sdr,
    Swr,
    Sd,
    Ll,
    Lld,
    Sc,
    Scd,
    Lwc1,
    Ldc1,
    Swc1,
    Sdc1,
    Cache,
    Pref,

    // MIPS16 only
    Extend,
    B,
    Beqz,
    Bnez,
    Bteqz,
    Btnez,
    Cmp,
    Cmpi,
    Li,
    Neg,
    Not,
    Move,
    Jrc,
    Jalrc,
    Save,
    Restore,
    Entry,
    Exit,
    Sdbbp,

    /// Reserved or unsupported encoding.
    Unrecognized,
}

impl Opcode {
    /// Returns the assembler mnemonic.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Sll => "sll",
            Self::Srl => "srl",
            Self::Sra => "sra",
            Self::Sllv => "sllv",
            Self::Srlv => "srlv",
            Self::Srav => "srav",
            Self::Jr => "jr",
            Self::Jalr => "jalr",
            Self::Movz => "movz",
            Self::Movn => "movn",
            Self::Syscall => "syscall",
            Self::Break => "break",
            Self::Sync => "sync",
            Self::Mfhi => "mfhi",
            Self::Mthi => "mthi",
            Self::Mflo => "mflo",
            Self::Mtlo => "mtlo",
            Self::Mult => "mult",
            Self::Multu => "multu",
            Self::Div => "div",
            Self::Divu => "divu",
            Self::Dmult => "dmult",
            Self::Dmultu => "dmultu",
            Self::Ddiv => "ddiv",
            Self::Ddivu => "ddivu",
            Self::Add => "add",
            Self::Addu => "addu",
            Self::Sub => "sub",
            Self::Subu => "subu",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Nor => "nor",
            Self::Slt => "slt",
            Self::Sltu => "sltu",
            Self::Dadd => "dadd",
            Self::Daddu => "daddu",
            Self::Dsub => "dsub",
            Self::Dsubu => "dsubu",
            Self::Dsll => "dsll",
            Self::Dsrl => "dsrl",
            Self::Dsra => "dsra",
            Self::Dsll32 => "dsll32",
            Self::Dsrl32 => "dsrl32",
            Self::Dsra32 => "dsra32",
            Self::Trap => "trap",
            Self::Bltz => "bltz",
            Self::Bgez => "bgez",
            Self::Bltzl => "bltzl",
            Self::Bgezl => "bgezl",
            Self::Bltzal => "bltzal",
            Self::Bgezal => "bgezal",
            Self::Bltzall => "bltzall",
            Self::Bgezall => "bgezall",
            Self::TrapImmediate => "trapi",
            Self::J => "j",
            Self::Jal => "jal",
            Self::Jalx => "jalx",
            Self::Beq => "beq",
            Self::Bne => "bne",
            Self::Blez => "blez",
            Self::Bgtz => "bgtz",
            Self::Beql => "beql",
            Self::Bnel => "bnel",
            Self::Blezl => "blezl",
            Self::Bgtzl => "bgtzl",
            Self::Addi => "addi",
            Self::Addiu => "addiu",
            Self::Slti => "slti",
            Self::Sltiu => "sltiu",
            Self::Andi => "andi",
            Self::Ori => "ori",
            Self::Xori => "xori",
            Self::Lui => "lui",
            Self::Daddi => "daddi",
            Self::Daddiu => "daddiu",
            Self::Cop0 => "cop0",
            Self::Cop1 => "cop1",
            Self::Cop2 => "cop2",
            Self::Cop3 => "cop3",
            Self::Bc1f => "bc1f",
            Self::Bc1t => "bc1t",
            Self::Bc1fl => "bc1fl",
            Self::Bc1tl => "bc1tl",
            Self::CopBranch => "bcz",
            Self::Lb => "lb",
            Self::Lh => "lh",
            Self::Lwl => "lwl",
            Self::Lw => "lw",
            Self::Lbu => "lbu",
            Self::Lhu => "lhu",
            Self::Lwr => "lwr",
            Self::Lwu => "lwu",
            Self::Ldl => "ldl",
            Self::Ldr => "ldr",
            Self::Ld => "ld",
            Self::Sb => "sb",
            Self::Sh => "sh",
            Self::Swl => "swl",
            Self::Sw => "sw",
            Self::Sdl => "sdl",
            Self::Sdr => "sdr",
            Self::Swr => "swr",
            Self::Sd => "sd",
            Self::Ll => "ll",
            Self::Lld => "lld",
            Self::Sc => "sc",
            Self::Scd => "scd",
            Self::Lwc1 => "lwc1",
            Self::Ldc1 => "ldc1",
            Self::Swc1 => "swc1",
            Self::Sdc1 => "sdc1",
            Self::Cache => "cache",
            Self::Pref => "pref",
            Self::Extend => "extend",
            Self::B => "b",
            Self::Beqz => "beqz",
            Self::Bnez => "bnez",
            Self::Bteqz => "bteqz",
            Self::Btnez => "btnez",
            Self::Cmp => "cmp",
            Self::Cmpi => "cmpi",
            Self::Li => "li",
            Self::Neg => "neg",
            Self::Not => "not",
            Self::Move => "move",
            Self::Jrc => "jrc",
            Self::Jalrc => "jalrc",
            Self::Save => "save",
            Self::Restore => "restore",
            Self::Entry => "entry",
            Self::Exit => "exit",
            Self::Sdbbp => "sdbbp",
            Self::Unrecognized => "(unrecognized)",
        }
    }

    /// Returns true for stores of a general purpose register.
    pub fn is_integer_store(&self) -> bool {
        matches!(
            self,
            Self::Sb | Self::Sh | Self::Sw | Self::Sd | Self::Swl | Self::Swr | Self::Sdl | Self::Sdr
        )
    }

    /// Returns true for the load-linked family.
    pub fn is_load_linked(&self) -> bool {
        matches!(self, Self::Ll | Self::Lld)
    }

    /// Returns true for the store-conditional family.
    pub fn is_store_conditional(&self) -> bool {
        matches!(self, Self::Sc | Self::Scd)
    }
}

/// Control flow classification.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlFlow {
    /// Falls through to the next instruction.
    Sequential,

    /// Unconditional branch to a known address.
    UnconditionalBranch { target: u64 },

    /// Conditional branch; may fall through or jump.
    ConditionalBranch { target: u64, fallthrough: u64 },

    /// Jump through a register.
    IndirectBranch,

    /// Call to a known address.
    Call { target: u64, return_addr: u64 },

    /// Call through a register.
    IndirectCall { return_addr: u64 },

    /// Return from function (`jr $ra`).
    Return,

    /// System call.
    Syscall,

    /// Trap or breakpoint.
    Halt,
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}:  ", self.address)?;
        match self.size {
            2 => write!(f, "{:04x}      ", self.raw & 0xffff)?,
            _ => write!(f, "{:08x}  ", self.raw)?,
        }
        write!(f, "{}", self.opcode.mnemonic())?;
        for (i, op) in self.operands.iter().enumerate() {
            if i == 0 {
                write!(f, " {}", op)?;
            } else {
                write!(f, ", {}", op)?;
            }
        }
        Ok(())
    }
}
