//! MIPS instruction decoders.
//!
//! Two encodings share one address space: 32-bit MIPS words and 16-bit
//! MIPS16 halfwords. The low bit of a code address selects between them,
//! so callers normally go through [`decoder_for`] or [`fetch_instruction`].

pub mod compact;
pub mod standard;

pub use compact::{BulkSaveFields, EntryFields, Mips16Decoder};
pub use standard::Mips32Decoder;

use crate::Decoder;
use framewalk_core::{Endianness, Instruction, InstructionWidth, Memory};

/// Returns the decoder for an encoding.
pub fn decoder_for(width: InstructionWidth, endianness: Endianness) -> Box<dyn Decoder> {
    match width {
        InstructionWidth::Full => Box::new(Mips32Decoder::new(endianness)),
        InstructionWidth::Compact => Box::new(Mips16Decoder::new(endianness)),
    }
}

/// Reads and decodes the instruction at a tagged code address.
///
/// An odd address is decoded as MIPS16; the returned instruction's
/// `address` has the mode bit stripped.
pub fn fetch_instruction(
    memory: &dyn Memory,
    address: u64,
    endianness: Endianness,
) -> framewalk_core::Result<Instruction> {
    decoder_for(InstructionWidth::of_address(address), endianness).fetch(memory, address)
}
