//! # framewalk-core
//!
//! Core abstractions for the framewalk unwinder. This crate defines the
//! decoded instruction model, the register profile with its numbering
//! translations, function symbols, and the traits through which the
//! debugger's collaborators (memory, registers, symbols) are reached.

pub mod arch;
pub mod error;
pub mod instruction;
pub mod operand;
pub mod register;
pub mod symbol;
pub mod target;

pub use arch::{strip_mode_bit, Architecture, Endianness, InstructionWidth};
pub use error::{Error, Result};
pub use instruction::{ControlFlow, Instruction, Opcode};
pub use operand::{MemoryRef, Operand};
pub use register::{
    mips, CookedRegister, NarrowRead, NarrowWrite, NumberingScheme, RawRegister,
    RegisterDescriptor, RegisterKind, RegisterProfile,
};
pub use symbol::{Symbol, SymbolTable};
pub use target::{Interrupt, Memory, NoSymbols, RegisterAccess, SymbolLookup, WritableMemory};
