//! # framewalk-disasm
//!
//! Instruction decoders for framewalk.
//!
//! This crate provides two decoders sharing the [`Decoder`] trait:
//! - MIPS32/MIPS64 4-byte instruction words
//! - MIPS16 2-byte instructions, with EXTEND and JAL pairs fused
//!
//! Decoding is total. Unknown encodings decode to
//! `Opcode::Unrecognized`, which scanners treat as a stop signal.

pub mod error;
pub mod mips;
pub mod traits;

pub use error::DecodeError;
pub use mips::{decoder_for, fetch_instruction, Mips16Decoder, Mips32Decoder};
pub use traits::{DecodedInstruction, Decoder};
