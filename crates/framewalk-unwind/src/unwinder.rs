//! Stack unwinding.
//!
//! The [`Unwinder`] turns the registers of the stopped thread into a chain
//! of [`Frame`]s. Each frame's descriptor comes from a prologue scan of its
//! function; the caller's registers are then recovered from the slots the
//! descriptor records, falling back to the callee's value for registers the
//! function never saved.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use framewalk_core::{
    mips, strip_mode_bit, Error, InstructionWidth, Interrupt, Memory, RawRegister, RegisterAccess,
    RegisterProfile, Result, SymbolLookup,
};
use serde::Serialize;
use tracing::debug;

use crate::cache::{Begin, CacheStats, FrameCache, FrameKey};
use crate::heuristic::find_function_start;
use crate::prologue::{self, BulkSaveTable, ScanContext, BULK_SAVE_ENCODINGS};
use crate::{epilogue, FrameDescriptor, SavedLocation, UnwindConfig};

/// One activation record.
///
/// Frames hold a link to the frame they called, which is how registers of
/// outer frames are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 0 for the innermost frame.
    pub level: usize,
    /// Resume address, with the mode bit.
    pub pc: u64,
    /// Stack pointer.
    pub sp: u64,
    callee: Option<Rc<Frame>>,
}

impl Frame {
    /// The frame this one called, if any.
    pub fn callee(&self) -> Option<&Frame> {
        self.callee.as_deref()
    }

    fn key(&self) -> FrameKey {
        FrameKey::new(self.pc, self.sp)
    }
}

/// Summary of one frame in a [`Backtrace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameInfo {
    pub level: usize,
    pub pc: u64,
    pub sp: u64,
    pub base: u64,
    pub complete: bool,
}

/// Why a backtrace ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BacktraceStop {
    /// The last frame has no caller.
    Outermost,
    /// The requested number of frames was produced.
    Limit,
    /// Unwinding failed. Frames collected so far are still valid.
    Error(Error),
}

/// Result of [`Unwinder::backtrace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backtrace {
    pub frames: Vec<FrameInfo>,
    pub stop: BacktraceStop,
}

/// Unwinds the stack of a stopped target.
pub struct Unwinder<'a> {
    memory: &'a dyn Memory,
    registers: &'a dyn RegisterAccess,
    symbols: &'a dyn SymbolLookup,
    profile: &'a RegisterProfile,
    config: UnwindConfig,
    interrupt: Interrupt,
    bulk_saves: &'a BulkSaveTable,
    cache: RefCell<FrameCache>,
}

impl<'a> Unwinder<'a> {
    /// Creates an unwinder over the live registers of the stopped thread.
    pub fn new(
        memory: &'a dyn Memory,
        registers: &'a dyn RegisterAccess,
        symbols: &'a dyn SymbolLookup,
        profile: &'a RegisterProfile,
    ) -> Self {
        Self {
            memory,
            registers,
            symbols,
            profile,
            config: UnwindConfig::default(),
            interrupt: Interrupt::new(),
            bulk_saves: &BULK_SAVE_ENCODINGS,
            cache: RefCell::new(FrameCache::new()),
        }
    }

    pub fn with_config(mut self, config: UnwindConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares a cancellation flag, typically with a signal handler.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_bulk_saves(mut self, table: &'a BulkSaveTable) -> Self {
        self.bulk_saves = table;
        self
    }

    pub fn config(&self) -> &UnwindConfig {
        &self.config
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    fn context(&self) -> ScanContext<'_> {
        ScanContext::new(self.memory, self.profile, &self.config, &self.interrupt).with_bulk_saves(self.bulk_saves)
    }

    /// The frame of the stopped thread.
    pub fn innermost(&self) -> Result<Frame> {
        let ctx = self.context();
        let pc = ctx.live_value(self.registers, mips::PC).ok_or(Error::unavailable(mips::PC))?;
        let sp = ctx.live_value(self.registers, mips::SP).ok_or(Error::unavailable(mips::SP))?;
        Ok(Frame {
            level: 0,
            pc,
            sp,
            callee: None,
        })
    }

    /// Returns the descriptor of `frame`, computing it on first use.
    ///
    /// Fails only with [`Error::Interrupted`]; every other problem degrades
    /// to an incomplete descriptor.
    pub fn frame_descriptor(&self, frame: &Frame) -> Result<Arc<FrameDescriptor>> {
        let key = frame.key();
        let begin = self.cache.borrow_mut().begin(key, FrameDescriptor::new(frame.pc));
        let handle = match begin {
            Begin::Ready(descriptor) | Begin::InProgress(descriptor) => return Ok(descriptor),
            Begin::Started(handle) => handle,
        };

        let descriptor = match self.compute_descriptor(frame) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                self.cache.borrow_mut().abandon(handle);
                return Err(e);
            }
        };
        let published = self.cache.borrow_mut().publish(handle, descriptor.clone());
        Ok(published.unwrap_or_else(|| Arc::new(descriptor)))
    }

    fn compute_descriptor(&self, frame: &Frame) -> Result<FrameDescriptor> {
        let ctx = self.context();
        let width = InstructionWidth::of_address(frame.pc);
        let address = strip_mode_bit(frame.pc);

        if self.memory.read(address, width.unit_size() as usize).is_err() {
            return Ok(self.stub_descriptor(frame));
        }

        let start = match self.symbols.function_bounds(address) {
            Some((start, _)) => {
                let compact = width == InstructionWidth::Compact || self.symbols.is_compact_function(start);
                Some(if compact { start | 1 } else { start })
            }
            None => find_function_start(&ctx, frame.pc).unwrap_or_else(|e| {
                debug!(error = %e, "function start search failed");
                None
            }),
        };
        self.interrupt.check()?;

        let Some(start) = start else {
            debug!(pc = format_args!("{:#x}", frame.pc), "no function start, treating frame as outermost");
            let mut descriptor = FrameDescriptor::new(frame.pc);
            descriptor.mark_incomplete();
            return Ok(descriptor);
        };

        let live = FrameRegisters { unwinder: self, frame };
        let scan = prologue::scan_prologue(&ctx, start, frame.pc, Some(&live));
        if scan.is_interrupted() {
            return Err(Error::Interrupted);
        }
        Ok(scan.descriptor)
    }

    /// Descriptor for a frame whose code cannot be read: the frame is
    /// assumed to own nothing, so the caller resumes at RA with the same SP.
    fn stub_descriptor(&self, frame: &Frame) -> FrameDescriptor {
        debug!(pc = format_args!("{:#x}", frame.pc), "code unreadable, using stub frame");
        let mut descriptor = FrameDescriptor::new(frame.pc);
        descriptor.set_base(frame.sp);
        descriptor.mark_incomplete();
        descriptor
    }

    /// Value of a register as it was in `frame`.
    pub fn register_value(&self, frame: &Frame, raw: RawRegister) -> Result<u64> {
        let ctx = self.context();
        let Some(callee) = frame.callee() else {
            return ctx.live_value(self.registers, raw.0).ok_or(Error::unavailable(raw.0));
        };

        let descriptor = self.frame_descriptor(callee)?;
        match descriptor.register_location(raw) {
            SavedLocation::SavedValue(value) => Ok(value),
            SavedLocation::SavedInMemory(address) => self.read_saved(address),
            SavedLocation::Unchanged if raw.0 == mips::PC => self.register_value(callee, RawRegister(mips::RA)),
            SavedLocation::Unchanged => self.register_value(callee, raw),
        }
    }

    fn read_saved(&self, address: u64) -> Result<u64> {
        let size = self.profile.abi_register_size();
        let bytes = self.memory.read(address, size)?;
        if bytes.len() < size {
            return Err(Error::unreadable(address, size));
        }
        let value = self.profile.endianness().read_signed(&bytes) as u64;
        Ok(self.context().wrap(value))
    }

    /// The frame that called `frame`, or `None` at the end of the chain.
    pub fn caller(&self, frame: &Frame) -> Result<Option<Frame>> {
        let descriptor = self.frame_descriptor(frame)?;
        if descriptor.is_outermost() {
            return Ok(None);
        }

        let mut caller = Frame {
            level: frame.level + 1,
            pc: 0,
            sp: 0,
            callee: Some(Rc::new(frame.clone())),
        };
        let raw_pc = self.register_value(&caller, RawRegister(mips::PC))?;
        caller.sp = self.register_value(&caller, RawRegister(mips::SP))?;
        caller.pc = self.profile.remove_address_bits(raw_pc, self.config.mask_address) | (raw_pc & 1);

        if strip_mode_bit(caller.pc) == 0 {
            return Ok(None);
        }
        if caller.pc == frame.pc && caller.sp == frame.sp {
            debug!(pc = format_args!("{:#x}", frame.pc), "unwinding made no progress");
            return Ok(None);
        }
        Ok(Some(caller))
    }

    /// Walks up to `max_frames` frames from the innermost one.
    pub fn backtrace(&self, max_frames: usize) -> Backtrace {
        let mut frames = Vec::new();
        let mut frame = match self.innermost() {
            Ok(frame) => frame,
            Err(e) => {
                return Backtrace {
                    frames,
                    stop: BacktraceStop::Error(e),
                }
            }
        };

        let stop = loop {
            if frames.len() >= max_frames {
                break BacktraceStop::Limit;
            }
            let descriptor = match self.frame_descriptor(&frame) {
                Ok(descriptor) => descriptor,
                Err(e) => break BacktraceStop::Error(e),
            };
            frames.push(FrameInfo {
                level: frame.level,
                pc: frame.pc,
                sp: frame.sp,
                base: descriptor.base_address(),
                complete: descriptor.is_complete(),
            });
            match self.caller(&frame) {
                Ok(Some(caller)) => frame = caller,
                Ok(None) => break BacktraceStop::Outermost,
                Err(e) => break BacktraceStop::Error(e),
            }
        };

        Backtrace { frames, stop }
    }

    /// First address after the prologue of the function containing `pc`.
    pub fn skip_prologue(&self, pc: u64) -> u64 {
        prologue::skip_prologue(&self.context(), self.symbols, pc)
    }

    /// Destination of the call stub the stopped thread is in, if it is in one.
    pub fn skip_trampoline(&self, pc: u64) -> Option<u64> {
        prologue::skip_trampoline(&self.context(), self.symbols, self.registers, pc)
    }

    /// Returns true if `pc` is in the epilogue of its function.
    pub fn in_epilogue(&self, pc: u64) -> Result<bool> {
        epilogue::in_epilogue(self.memory, self.symbols, self.profile.endianness(), pc)
    }

    /// Forgets every frame. Call when the target resumes.
    pub fn resume(&self) {
        self.cache.borrow_mut().invalidate();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.borrow().stats()
    }
}

/// Read-only register view of an outer frame.
pub struct FrameRegisters<'u, 'a> {
    unwinder: &'u Unwinder<'a>,
    frame: &'u Frame,
}

impl<'u, 'a> FrameRegisters<'u, 'a> {
    pub fn new(unwinder: &'u Unwinder<'a>, frame: &'u Frame) -> Self {
        Self { unwinder, frame }
    }
}

impl RegisterAccess for FrameRegisters<'_, '_> {
    fn read_register(&self, raw: RawRegister) -> Result<Vec<u8>> {
        let value = self.unwinder.register_value(self.frame, raw)?;
        Ok(self.unwinder.profile.encode_raw(value))
    }

    fn write_register(&mut self, raw: RawRegister, _bytes: &[u8]) -> Result<()> {
        Err(Error::ReadOnlyRegister(raw.0))
    }
}
