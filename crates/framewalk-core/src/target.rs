//! Interfaces to the debugger's collaborators.
//!
//! The unwinder never talks to a target directly. Memory, registers and
//! symbols come in through these traits; a remote stub, a core file or a
//! captured snapshot can sit behind them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{Endianness, Error, RawRegister, Result};

/// Read access to target memory.
pub trait Memory {
    /// Reads `length` bytes at `address`.
    ///
    /// Fails with [`Error::Unreadable`]; implementations must never fill
    /// gaps with zero bytes.
    fn read(&self, address: u64, length: usize) -> Result<Vec<u8>>;

    /// Reads a 16-bit halfword in target byte order.
    fn read_u16(&self, address: u64, order: Endianness) -> Result<u16> {
        let bytes = self.read(address, 2)?;
        if bytes.len() < 2 {
            return Err(Error::unreadable(address, 2));
        }
        let arr = [bytes[0], bytes[1]];
        Ok(if order == Endianness::Big {
            u16::from_be_bytes(arr)
        } else {
            u16::from_le_bytes(arr)
        })
    }

    /// Reads a 32-bit word in target byte order.
    fn read_u32(&self, address: u64, order: Endianness) -> Result<u32> {
        let bytes = self.read(address, 4)?;
        if bytes.len() < 4 {
            return Err(Error::unreadable(address, 4));
        }
        let arr = [bytes[0], bytes[1], bytes[2], bytes[3]];
        Ok(if order == Endianness::Big {
            u32::from_be_bytes(arr)
        } else {
            u32::from_le_bytes(arr)
        })
    }
}

/// Write access to target memory.
pub trait WritableMemory: Memory {
    /// Writes `bytes` at `address`.
    fn write(&mut self, address: u64, bytes: &[u8]) -> Result<()>;
}

/// Access to the registers of one frame.
///
/// Values are raw register contents in target byte order.
pub trait RegisterAccess {
    /// Reads a raw register, or fails with [`Error::Unavailable`].
    fn read_register(&self, raw: RawRegister) -> Result<Vec<u8>>;

    /// Writes a raw register.
    fn write_register(&mut self, raw: RawRegister, bytes: &[u8]) -> Result<()>;
}

/// Symbol and line information.
pub trait SymbolLookup {
    /// Returns `(start, end)` of the function containing `pc`.
    fn function_bounds(&self, pc: u64) -> Option<(u64, u64)>;

    /// Returns the first address after the prologue of the function at
    /// `start`, when line information provides one.
    fn post_prologue_hint(&self, _start: u64) -> Option<u64> {
        None
    }

    /// Returns true if the function containing `pc` is compact (MIPS16) code.
    fn is_compact_function(&self, _pc: u64) -> bool {
        false
    }

    /// Name of the function containing `pc`.
    fn function_name(&self, _pc: u64) -> Option<&str> {
        None
    }
}

/// A symbol source that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSymbols;

impl SymbolLookup for NoSymbols {
    fn function_bounds(&self, _pc: u64) -> Option<(u64, u64)> {
        None
    }
}

/// User interrupt flag, checked by every scanning loop.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    /// Creates a cleared flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clears a previous request.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Fails with [`Error::Interrupted`] if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_set() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flat(Vec<u8>);

    impl Memory for Flat {
        fn read(&self, address: u64, length: usize) -> Result<Vec<u8>> {
            let start = address as usize;
            self.0
                .get(start..start + length)
                .map(<[u8]>::to_vec)
                .ok_or(Error::unreadable(address, length))
        }
    }

    #[test]
    fn test_read_words() {
        let mem = Flat(vec![0x27, 0xbd, 0xff, 0xe0]);
        assert_eq!(mem.read_u32(0, Endianness::Big).unwrap(), 0x27bdffe0);
        assert_eq!(mem.read_u32(0, Endianness::Little).unwrap(), 0xe0ffbd27);
        assert_eq!(mem.read_u16(2, Endianness::Big).unwrap(), 0xffe0);
        assert_eq!(
            mem.read_u32(2, Endianness::Big),
            Err(Error::Unreadable { address: 2, length: 4 })
        );
    }

    #[test]
    fn test_interrupt_shared_between_clones() {
        let flag = Interrupt::new();
        let handler = flag.clone();
        assert!(flag.check().is_ok());
        handler.set();
        assert!(flag.is_set());
        assert_eq!(flag.check(), Err(Error::Interrupted));
        flag.clear();
        assert!(!handler.is_set());
    }
}
