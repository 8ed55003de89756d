//! Error types shared by every framewalk crate.

use thiserror::Error;

/// Core error type.
///
/// An unrecognized instruction is not an error: it decodes to
/// [`Opcode::Unrecognized`](crate::Opcode::Unrecognized) and ends a scan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Target memory could not be read.
    #[error("cannot read {length} bytes of target memory at {address:#x}")]
    Unreadable { address: u64, length: usize },

    /// A register value is not known for the frame being examined.
    #[error("register {register} is unavailable")]
    Unavailable { register: u16 },

    /// No ABI descriptor matches the requested configuration.
    #[error("no ABI matches: {0}")]
    BadAbi(String),

    /// A scan was cancelled by a user interrupt.
    #[error("interrupted")]
    Interrupted,

    /// A register number outside the profile.
    #[error("invalid register number {0}")]
    InvalidRegister(u16),

    /// A write to a read-only register.
    #[error("register {0} is read-only")]
    ReadOnlyRegister(u16),

    /// A by-reference argument has no address in target memory.
    #[error("argument {index} must live in target memory to be passed by reference")]
    NotAddressable { index: usize },
}

impl Error {
    /// Creates an unreadable-memory error.
    pub fn unreadable(address: u64, length: usize) -> Self {
        Self::Unreadable { address, length }
    }

    /// Creates an unavailable-register error.
    pub fn unavailable(register: u16) -> Self {
        Self::Unavailable { register }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
