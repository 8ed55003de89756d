//! Architecture identification and properties.

/// Supported ISA variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Architecture {
    /// MIPS with 32-bit general purpose registers.
    Mips32,
    /// MIPS with 64-bit general purpose registers.
    Mips64,
}

impl Architecture {
    /// Returns the width of a hardware general purpose register in bytes.
    pub fn register_size(&self) -> usize {
        match self {
            Self::Mips32 => 4,
            Self::Mips64 => 8,
        }
    }

    /// Returns whether this is a 64-bit architecture.
    pub fn is_64bit(&self) -> bool {
        matches!(self, Self::Mips64)
    }

    /// Returns the name of this architecture.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mips32 => "mips",
            Self::Mips64 => "mips64",
        }
    }
}

/// Byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// Decodes an unsigned integer of up to eight bytes.
    pub fn read_unsigned(&self, bytes: &[u8]) -> u64 {
        let mut value = 0u64;
        match self {
            Self::Big => {
                for &b in bytes.iter().take(8) {
                    value = (value << 8) | b as u64;
                }
            }
            Self::Little => {
                for &b in bytes.iter().take(8).rev() {
                    value = (value << 8) | b as u64;
                }
            }
        }
        value
    }

    /// Decodes a sign-extended integer of up to eight bytes.
    pub fn read_signed(&self, bytes: &[u8]) -> i64 {
        let len = bytes.len().min(8);
        if len == 0 {
            return 0;
        }
        let raw = self.read_unsigned(bytes);
        let shift = 64 - 8 * len as u32;
        ((raw << shift) as i64) >> shift
    }

    /// Encodes the low `len` bytes of `value`.
    pub fn write(&self, value: u64, len: usize) -> Vec<u8> {
        let mut out: Vec<u8> = (0..len)
            .map(|i| if i < 8 { (value >> (8 * i)) as u8 } else { 0 })
            .collect();
        if *self == Self::Big {
            out.reverse();
        }
        out
    }

    /// Encodes `value` sign-extended to `len` bytes.
    pub fn write_signed(&self, value: i64, len: usize) -> Vec<u8> {
        let mut out = self.write(value as u64, len.min(8));
        if len > 8 {
            let fill = if value < 0 { 0xff } else { 0 };
            let pad = vec![fill; len - 8];
            match self {
                Self::Little => out.extend(pad),
                Self::Big => {
                    let mut wide = pad;
                    wide.extend(out);
                    out = wide;
                }
            }
        }
        out
    }
}

/// Instruction encoding selected by an address.
///
/// The active width is a property of the code address: an odd program
/// counter selects the compact (MIPS16) encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InstructionWidth {
    /// 32-bit MIPS instructions.
    Full,
    /// 16-bit MIPS16 instructions, optionally extended to 32 bits.
    Compact,
}

impl InstructionWidth {
    /// Selects the encoding for a code address.
    pub fn of_address(address: u64) -> Self {
        if address & 1 != 0 {
            Self::Compact
        } else {
            Self::Full
        }
    }

    /// Size of one basic instruction unit in bytes.
    pub fn unit_size(&self) -> u64 {
        match self {
            Self::Full => 4,
            Self::Compact => 2,
        }
    }

    /// Marks a code address with this encoding.
    pub fn tag_address(&self, address: u64) -> u64 {
        match self {
            Self::Full => address & !1,
            Self::Compact => address | 1,
        }
    }
}

/// Strips the compact-mode marker from a code address.
pub fn strip_mode_bit(address: u64) -> u64 {
    address & !1
}
