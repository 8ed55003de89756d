//! Instruction operand types.

use crate::RawRegister;

/// An instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operand {
    /// Register operand.
    Register(RawRegister),
    /// Immediate value, already scaled and sign-extended.
    Immediate(i64),
    /// Memory reference `offset(base)`.
    Memory(MemoryRef),
    /// Resolved branch or jump target.
    Target(u64),
}

impl Operand {
    /// Creates a register operand.
    pub fn reg(number: u16) -> Self {
        Self::Register(RawRegister(number))
    }

    /// Creates an immediate operand.
    pub fn imm(value: i64) -> Self {
        Self::Immediate(value)
    }

    /// Creates a memory operand.
    pub fn mem(base: u16, offset: i64) -> Self {
        Self::Memory(MemoryRef {
            base: RawRegister(base),
            offset,
        })
    }

    /// Returns the register if this is a register operand.
    pub fn as_register(&self) -> Option<RawRegister> {
        match self {
            Self::Register(r) => Some(*r),
            _ => None,
        }
    }

    /// Returns the memory reference if this is a memory operand.
    pub fn as_memory(&self) -> Option<MemoryRef> {
        match self {
            Self::Memory(m) => Some(*m),
            _ => None,
        }
    }
}

/// Base-plus-displacement memory reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryRef {
    /// Base register.
    pub base: RawRegister,
    /// Signed byte displacement.
    pub offset: i64,
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register(r) => write!(f, "${}", crate::register::mips::name(r.0)),
            Self::Immediate(v) => write!(f, "{}", v),
            Self::Memory(m) => write!(f, "{}(${})", m.offset, crate::register::mips::name(m.base.0)),
            Self::Target(t) => write!(f, "{:#x}", t),
        }
    }
}
