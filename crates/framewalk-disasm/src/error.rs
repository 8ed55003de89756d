//! Decoding error types.

use thiserror::Error;

/// Error type for decoding instructions from a byte buffer.
///
/// Unrecognized encodings are not errors; they decode to
/// `Opcode::Unrecognized`. Only the shape of the input can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Instruction was truncated (not enough bytes).
    #[error("truncated instruction at {address:#x}: need {needed} bytes, have {available}")]
    Truncated {
        address: u64,
        needed: usize,
        available: usize,
    },

    /// Address does not match the decoder's instruction width.
    #[error("misaligned instruction address {address:#x} for {width}-byte instructions")]
    Misaligned { address: u64, width: usize },
}

impl DecodeError {
    /// Creates a new Truncated error.
    pub fn truncated(address: u64, needed: usize, available: usize) -> Self {
        Self::Truncated {
            address,
            needed,
            available,
        }
    }

    /// Creates a new Misaligned error.
    pub fn misaligned(address: u64, width: usize) -> Self {
        Self::Misaligned { address, width }
    }
}
