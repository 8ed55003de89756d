//! Decoder traits.

use crate::DecodeError;
use framewalk_core::{Endianness, Instruction, InstructionWidth, Memory};

/// Result of decoding an instruction from a byte buffer.
#[derive(Debug, Clone)]
pub struct DecodedInstruction {
    /// The decoded instruction.
    pub instruction: Instruction,
    /// Number of bytes consumed.
    pub size: usize,
}

/// Trait for width-specific instruction decoders.
pub trait Decoder {
    /// Decodes one instruction word.
    ///
    /// Total: every bit pattern yields an instruction, possibly of class
    /// `Opcode::Unrecognized`.
    fn decode(&self, word: u32, address: u64) -> Instruction;

    /// Decodes a single instruction from the start of `bytes`.
    fn decode_instruction(&self, bytes: &[u8], address: u64) -> Result<DecodedInstruction, DecodeError>;

    /// Reads and decodes the instruction at `address` in target memory.
    ///
    /// Unreadable memory is propagated; no bytes are ever invented.
    fn fetch(&self, memory: &dyn Memory, address: u64) -> framewalk_core::Result<Instruction>;

    /// Returns the encoding this decoder handles.
    fn width(&self) -> InstructionWidth;

    /// Returns the byte order instruction words are read in.
    fn endianness(&self) -> Endianness;
}
