//! Register state for snapshot targets.
//!
//! Values are kept as integers and handed out as raw register bytes in
//! target order. A register that was never captured is unavailable.

use framewalk_core::{mips, Architecture, Endianness, Error, RawRegister, RegisterAccess, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Captured raw registers for the innermost frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterFile {
    architecture: Architecture,
    endianness: Endianness,
    /// Register values by raw number.
    #[serde(default)]
    values: BTreeMap<u16, u64>,
}

impl RegisterFile {
    /// Create an empty register file.
    pub fn new(architecture: Architecture, endianness: Endianness) -> Self {
        Self {
            architecture,
            endianness,
            values: BTreeMap::new(),
        }
    }

    /// Set a register, truncated to the hardware width.
    pub fn set(&mut self, raw: u16, value: u64) {
        self.values.insert(raw, self.truncate(value));
    }

    /// Builder form of [`RegisterFile::set`].
    pub fn with(mut self, raw: u16, value: u64) -> Self {
        self.set(raw, value);
        self
    }

    /// Get a register value.
    pub fn get(&self, raw: u16) -> Option<u64> {
        self.values.get(&raw).copied()
    }

    /// Forget a register.
    pub fn remove(&mut self, raw: u16) -> Option<u64> {
        self.values.remove(&raw)
    }

    /// Program counter.
    pub fn pc(&self) -> Option<u64> {
        self.get(mips::PC)
    }

    /// Stack pointer.
    pub fn sp(&self) -> Option<u64> {
        self.get(mips::SP)
    }

    /// Byte order of the register contents.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Architecture the registers belong to.
    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Captured registers in raw order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, u64)> + '_ {
        self.values.iter().map(|(&r, &v)| (r, v))
    }

    fn width(&self) -> usize {
        self.architecture.register_size()
    }

    fn truncate(&self, value: u64) -> u64 {
        match self.width() {
            4 => value & 0xffff_ffff,
            _ => value,
        }
    }
}

impl RegisterAccess for RegisterFile {
    fn read_register(&self, raw: RawRegister) -> Result<Vec<u8>> {
        if raw.0 == mips::ZERO {
            return Ok(vec![0; self.width()]);
        }
        let value = self.get(raw.0).ok_or(Error::unavailable(raw.0))?;
        Ok(self.endianness.write(value, self.width()))
    }

    fn write_register(&mut self, raw: RawRegister, bytes: &[u8]) -> Result<()> {
        if raw.0 >= mips::NUM_RAW {
            return Err(Error::InvalidRegister(raw.0));
        }
        let value = self.endianness.read_unsigned(bytes);
        self.set(raw.0, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_register() {
        let regs = RegisterFile::new(Architecture::Mips32, Endianness::Big);
        assert_eq!(
            regs.read_register(RawRegister(mips::SP)),
            Err(Error::unavailable(mips::SP))
        );
        assert_eq!(regs.read_register(RawRegister(mips::ZERO)).unwrap(), vec![0; 4]);
    }

    #[test]
    fn test_read_in_target_order() {
        let regs = RegisterFile::new(Architecture::Mips64, Endianness::Little).with(mips::RA, 0x400123);
        assert_eq!(
            regs.read_register(RawRegister(mips::RA)).unwrap(),
            vec![0x23, 0x01, 0x40, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_write_register() {
        let mut regs = RegisterFile::new(Architecture::Mips32, Endianness::Big);
        regs.write_register(RawRegister(mips::A0), &[0, 0, 0x12, 0x34]).unwrap();
        assert_eq!(regs.get(mips::A0), Some(0x1234));
        assert!(regs.write_register(RawRegister(200), &[0; 4]).is_err());
    }

    #[test]
    fn test_truncates_to_width() {
        let regs = RegisterFile::new(Architecture::Mips32, Endianness::Big).with(mips::SP, 0x1_7fff_0000);
        assert_eq!(regs.sp(), Some(0x7fff_0000));
    }
}
