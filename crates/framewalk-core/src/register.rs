//! Register numbering and the register profile.
//!
//! Raw numbers name hardware registers. Cooked numbers live in a space
//! twice as large: the lower half mirrors the raw registers and the upper
//! half holds one pseudo register per raw register, sized for the ABI in
//! effect. Debug info uses three other numbering schemes which
//! [`RegisterProfile::to_internal`] translates.

use crate::{Architecture, Endianness, Error, RegisterAccess, Result};

/// A hardware register number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawRegister(pub u16);

/// An ABI-visible register number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CookedRegister(pub u16);

impl CookedRegister {
    /// Returns true if this names a pseudo register.
    pub fn is_pseudo(&self) -> bool {
        self.0 >= mips::NUM_RAW
    }
}

/// Register class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegisterKind {
    /// General purpose and special integer registers.
    Integer,
    /// Floating point data registers.
    Float,
    /// Floating point control and implementation registers.
    Control,
}

/// One register as seen through the profile.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RegisterDescriptor {
    /// Hardware register number.
    pub raw: RawRegister,
    /// Pseudo register number for the ABI view.
    pub cooked: CookedRegister,
    /// Size of the cooked view in bytes.
    pub byte_size: usize,
    /// Size of the hardware register in bytes.
    pub raw_size: usize,
    /// Register class.
    pub kind: RegisterKind,
    /// Whether writes are permitted.
    pub writable: bool,
    /// Canonical name.
    pub name: &'static str,
}

/// External register numbering schemes found in debug info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NumberingScheme {
    /// Stabs debug info.
    Stabs,
    /// DWARF and DWARF2.
    Dwarf,
    /// ECOFF symbol tables.
    Ecoff,
}

/// How a narrow pseudo register is read from a wider raw register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NarrowRead {
    /// Take the first four transferred bytes unchanged.
    Legacy,
    /// Take the raw value as a signed integer and truncate it to 32 bits.
    Truncate,
}

/// How a narrow pseudo register is written back to a wider raw register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NarrowWrite {
    /// Replace the first four bytes, preserving the rest.
    Legacy,
    /// Sign-extend the 32-bit value to the raw width.
    SignExtend,
}

/// The register set for one architecture variant and ABI.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RegisterProfile {
    architecture: Architecture,
    abi_register_size: usize,
    endianness: Endianness,
    narrow_read: NarrowRead,
    narrow_write: NarrowWrite,
    transfers_32bit: bool,
    descriptors: Vec<RegisterDescriptor>,
}

impl RegisterProfile {
    /// Builds the profile for an ISA and ABI register width.
    pub fn new(architecture: Architecture, abi_register_size: usize, endianness: Endianness) -> Self {
        let mut profile = Self {
            architecture,
            abi_register_size: abi_register_size.min(architecture.register_size()),
            endianness,
            narrow_read: NarrowRead::Truncate,
            narrow_write: NarrowWrite::SignExtend,
            transfers_32bit: false,
            descriptors: Vec::new(),
        };
        profile.rebuild();
        profile
    }

    /// Selects the legacy 32-bit transfer paths for both reads and writes.
    ///
    /// Targets with this flag only exchange the low 32 bits of each
    /// integer register, so every integer pseudo register shrinks to 4 bytes.
    pub fn with_legacy_transfers(mut self, legacy: bool) -> Self {
        self.transfers_32bit = legacy;
        if legacy {
            self.narrow_read = NarrowRead::Legacy;
            self.narrow_write = NarrowWrite::Legacy;
        } else {
            self.narrow_read = NarrowRead::Truncate;
            self.narrow_write = NarrowWrite::SignExtend;
        }
        self.rebuild();
        self
    }

    /// Overrides the narrow read path.
    pub fn with_narrow_read(mut self, read: NarrowRead) -> Self {
        self.narrow_read = read;
        self
    }

    /// Overrides the narrow write path.
    pub fn with_narrow_write(mut self, write: NarrowWrite) -> Self {
        self.narrow_write = write;
        self
    }

    fn rebuild(&mut self) {
        let isa = self.architecture.register_size();
        self.descriptors = (0..mips::NUM_RAW)
            .map(|raw| {
                let kind = mips::kind(raw);
                let byte_size = match kind {
                    RegisterKind::Float => isa,
                    RegisterKind::Control => 4,
                    RegisterKind::Integer if self.transfers_32bit => 4,
                    RegisterKind::Integer => self.abi_register_size,
                };
                RegisterDescriptor {
                    raw: RawRegister(raw),
                    cooked: CookedRegister(raw + mips::NUM_RAW),
                    byte_size,
                    raw_size: isa,
                    kind,
                    writable: !matches!(
                        raw,
                        mips::ZERO | mips::BADVADDR | mips::CAUSE | mips::FIR
                    ),
                    name: mips::name(raw),
                }
            })
            .collect();
    }

    /// Returns the architecture.
    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Returns the byte order of the target.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Returns the ABI register width in bytes.
    pub fn abi_register_size(&self) -> usize {
        self.abi_register_size
    }

    /// Returns the narrow read path in effect.
    pub fn narrow_read(&self) -> NarrowRead {
        self.narrow_read
    }

    /// Returns the narrow write path in effect.
    pub fn narrow_write(&self) -> NarrowWrite {
        self.narrow_write
    }

    /// Number of raw registers.
    pub fn num_raw(&self) -> u16 {
        mips::NUM_RAW
    }

    /// Number of cooked registers (raw plus pseudo).
    pub fn num_cooked(&self) -> u16 {
        2 * mips::NUM_RAW
    }

    /// All register descriptors, indexed by raw number.
    pub fn descriptors(&self) -> &[RegisterDescriptor] {
        &self.descriptors
    }

    /// Returns the descriptor for a raw register.
    pub fn descriptor(&self, raw: RawRegister) -> Option<&RegisterDescriptor> {
        self.descriptors.get(raw.0 as usize)
    }

    /// Translates an external debug-info register number.
    ///
    /// Returns the pseudo register so the value is seen with ABI width.
    pub fn to_internal(&self, scheme: NumberingScheme, number: u32) -> Option<CookedRegister> {
        let raw = match (scheme, number) {
            (_, 0..=31) => number as u16,
            (NumberingScheme::Stabs, 38..=69) => mips::FP0 + (number - 38) as u16,
            (NumberingScheme::Stabs, 70) => mips::HI,
            (NumberingScheme::Stabs, 71) => mips::LO,
            (NumberingScheme::Dwarf | NumberingScheme::Ecoff, 32..=63) => {
                mips::FP0 + (number - 32) as u16
            }
            (NumberingScheme::Dwarf | NumberingScheme::Ecoff, 64) => mips::HI,
            (NumberingScheme::Dwarf | NumberingScheme::Ecoff, 65) => mips::LO,
            _ => return None,
        };
        Some(self.cooked_for_raw(RawRegister(raw)))
    }

    /// Maps a cooked number to the raw register it views.
    pub fn raw_for_cooked(&self, cooked: CookedRegister) -> Result<RawRegister> {
        if cooked.0 >= self.num_cooked() {
            return Err(Error::InvalidRegister(cooked.0));
        }
        Ok(RawRegister(cooked.0 % mips::NUM_RAW))
    }

    /// Maps a raw register to its pseudo view.
    pub fn cooked_for_raw(&self, raw: RawRegister) -> CookedRegister {
        CookedRegister(raw.0 + mips::NUM_RAW)
    }

    /// Size in bytes of a register in the combined cooked space.
    pub fn size(&self, number: CookedRegister) -> Result<usize> {
        let raw = self.raw_for_cooked(number)?;
        let desc = self
            .descriptor(raw)
            .ok_or(Error::InvalidRegister(number.0))?;
        Ok(if number.is_pseudo() {
            desc.byte_size
        } else {
            desc.raw_size
        })
    }

    /// Size in bytes of a raw register.
    pub fn raw_size(&self, raw: RawRegister) -> Result<usize> {
        self.descriptor(raw)
            .map(|d| d.raw_size)
            .ok_or(Error::InvalidRegister(raw.0))
    }

    /// Reads a cooked register.
    pub fn read_cooked(&self, regs: &dyn RegisterAccess, cooked: CookedRegister) -> Result<Vec<u8>> {
        let raw = self.raw_for_cooked(cooked)?;
        let raw_bytes = regs.read_register(raw)?;
        let size = self.size(cooked)?;
        if !cooked.is_pseudo() || raw_bytes.len() <= size {
            return Ok(raw_bytes);
        }
        Ok(match self.narrow_read {
            NarrowRead::Legacy => raw_bytes[..size].to_vec(),
            NarrowRead::Truncate => {
                let value = self.endianness.read_signed(&raw_bytes);
                self.endianness.write(value as u64, size)
            }
        })
    }

    /// Writes a cooked register.
    pub fn write_cooked(
        &self,
        regs: &mut dyn RegisterAccess,
        cooked: CookedRegister,
        bytes: &[u8],
    ) -> Result<()> {
        let raw = self.raw_for_cooked(cooked)?;
        let desc = self.descriptor(raw).ok_or(Error::InvalidRegister(cooked.0))?;
        if !desc.writable {
            return Err(Error::ReadOnlyRegister(raw.0));
        }
        if !cooked.is_pseudo() || bytes.len() >= desc.raw_size {
            return regs.write_register(raw, bytes);
        }
        match self.narrow_write {
            NarrowWrite::Legacy => {
                let mut current = regs.read_register(raw)?;
                current.resize(desc.raw_size, 0);
                current[..bytes.len()].copy_from_slice(bytes);
                regs.write_register(raw, &current)
            }
            NarrowWrite::SignExtend => {
                let value = self.endianness.read_signed(bytes);
                let wide = self.endianness.write_signed(value, desc.raw_size);
                regs.write_register(raw, &wide)
            }
        }
    }

    /// Reads a raw register as a sign-extended integer.
    pub fn read_signed(&self, regs: &dyn RegisterAccess, raw: RawRegister) -> Result<i64> {
        let bytes = regs.read_register(raw)?;
        Ok(self.endianness.read_signed(&bytes))
    }

    /// Reads a raw register as an unsigned integer.
    pub fn read_unsigned(&self, regs: &dyn RegisterAccess, raw: RawRegister) -> Result<u64> {
        let bytes = regs.read_register(raw)?;
        Ok(self.endianness.read_unsigned(&bytes))
    }

    /// Encodes an integer for a raw register of this profile.
    pub fn encode_raw(&self, value: u64) -> Vec<u8> {
        self.endianness
            .write_signed(value as i64, self.architecture.register_size())
    }

    /// Strips bits that are not part of a code address.
    ///
    /// The compact-mode bit is always removed. With `mask_address`, a 64-bit
    /// value whose upper half is all ones is truncated to 32 bits.
    pub fn remove_address_bits(&self, address: u64, mask_address: bool) -> u64 {
        let address = address & !1;
        if mask_address && (address >> 32) == 0xffff_ffff {
            address & 0xffff_ffff
        } else {
            address
        }
    }
}

/// MIPS raw register numbers.
pub mod mips {
    use super::RegisterKind;

    pub const ZERO: u16 = 0;
    pub const AT: u16 = 1;
    pub const V0: u16 = 2;
    pub const V1: u16 = 3;
    pub const A0: u16 = 4;
    pub const A1: u16 = 5;
    pub const A2: u16 = 6;
    pub const A3: u16 = 7;
    pub const T0: u16 = 8;
    pub const S0: u16 = 16;
    pub const S1: u16 = 17;
    pub const S2: u16 = 18;
    pub const T9: u16 = 25;
    pub const GP: u16 = 28;
    pub const SP: u16 = 29;
    pub const S8: u16 = 30; // also fp
    pub const RA: u16 = 31;

    pub const STATUS: u16 = 32;
    pub const LO: u16 = 33;
    pub const HI: u16 = 34;
    pub const BADVADDR: u16 = 35;
    pub const CAUSE: u16 = 36;
    pub const PC: u16 = 37;
    pub const FP0: u16 = 38;
    pub const FCSR: u16 = 70;
    pub const FIR: u16 = 71;

    /// Number of raw registers.
    pub const NUM_RAW: u16 = 72;

    /// Maps the 3-bit MIPS16 register field to a full register number.
    pub const MIPS16_TO_32: [u16; 8] = [16, 17, 2, 3, 4, 5, 6, 7];

    const GPR_NAMES: [&str; 32] = [
        "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5",
        "t6", "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1",
        "gp", "sp", "s8", "ra",
    ];

    const FPR_NAMES: [&str; 32] = [
        "f0", "f1", "f2", "f3", "f4", "f5", "f6", "f7", "f8", "f9", "f10", "f11", "f12", "f13",
        "f14", "f15", "f16", "f17", "f18", "f19", "f20", "f21", "f22", "f23", "f24", "f25",
        "f26", "f27", "f28", "f29", "f30", "f31",
    ];

    /// Returns the name of a raw register.
    pub fn name(raw: u16) -> &'static str {
        match raw {
            0..=31 => GPR_NAMES[raw as usize],
            STATUS => "sr",
            LO => "lo",
            HI => "hi",
            BADVADDR => "bad",
            CAUSE => "cause",
            PC => "pc",
            FP0..=69 => FPR_NAMES[(raw - FP0) as usize],
            FCSR => "fsr",
            FIR => "fir",
            _ => "unknown",
        }
    }

    /// Returns the class of a raw register.
    pub fn kind(raw: u16) -> RegisterKind {
        match raw {
            FP0..=69 => RegisterKind::Float,
            FCSR | FIR => RegisterKind::Control,
            _ => RegisterKind::Integer,
        }
    }
}
