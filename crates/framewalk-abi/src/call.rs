//! Inferior function call setup.
//!
//! [`prepare_call`] computes every register and memory write needed to
//! call a function in the target with the given arguments, without
//! touching the target. [`CallSetup::apply`] performs them.

use framewalk_core::{mips, Endianness, Error, RawRegister, RegisterAccess, RegisterProfile, Result, WritableMemory};
use serde::Serialize;
use tracing::{debug, trace};

use crate::{AbiContext, AbiKind, FloatArgumentRule, FpuKind, TypeCode, Value, ValueType};

fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

fn align_down(value: u64, align: u64) -> u64 {
    value & !(align - 1)
}

/// A call to make in the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    /// Entry address of the callee.
    pub function: u64,
    /// Where the callee returns to; normally a breakpoint.
    pub return_address: u64,
    /// Stack pointer before the call.
    pub sp: u64,
    pub args: Vec<Value>,
    /// Buffer for a value returned in memory.
    pub struct_return: Option<u64>,
}

impl CallRequest {
    pub fn new(function: u64, return_address: u64, sp: u64) -> Self {
        Self {
            function,
            return_address,
            sp,
            args: Vec::new(),
            struct_return: None,
        }
    }

    /// Appends an argument.
    pub fn arg(mut self, value: Value) -> Self {
        self.args.push(value);
        self
    }

    /// Passes a hidden pointer to a buffer for the return value.
    pub fn with_struct_return(mut self, address: u64) -> Self {
        self.struct_return = Some(address);
        self
    }
}

/// A value for a register, in target byte order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterWrite {
    pub register: RawRegister,
    pub bytes: Vec<u8>,
}

/// Bytes to store in target memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryWrite {
    pub address: u64,
    pub bytes: Vec<u8>,
}

/// Everything a call needs written to the target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallSetup {
    /// Register values, in the order they are to be written.
    pub register_writes: Vec<RegisterWrite>,
    pub memory_writes: Vec<MemoryWrite>,
    /// Stack pointer at the call.
    pub stack_pointer: u64,
}

impl CallSetup {
    /// Returns the last value written to a register.
    pub fn register(&self, raw: u16) -> Option<&[u8]> {
        self.register_writes
            .iter()
            .rev()
            .find(|w| w.register.0 == raw)
            .map(|w| w.bytes.as_slice())
    }

    /// Returns the bytes stored at an address, if one write covers them.
    pub fn memory_at(&self, address: u64) -> Option<&[u8]> {
        self.memory_writes
            .iter()
            .rev()
            .find(|w| w.address == address)
            .map(|w| w.bytes.as_slice())
    }

    /// Writes the argument area, then the registers.
    ///
    /// Register values go through the profile's pseudo registers, so narrow
    /// ABI values are widened the way the profile widens them.
    pub fn apply(
        &self,
        memory: &mut dyn WritableMemory,
        regs: &mut dyn RegisterAccess,
        profile: &RegisterProfile,
    ) -> Result<()> {
        for write in &self.memory_writes {
            memory.write(write.address, &write.bytes)?;
        }
        for write in &self.register_writes {
            profile.write_cooked(regs, profile.cooked_for_raw(write.register), &write.bytes)?;
        }
        Ok(())
    }
}

/// Computes the register and memory writes for a call.
///
/// The stack pointer is aligned down and space for every argument is
/// reserved below it. Arguments then go to float registers, integer
/// registers and the stack as the ABI in `ctx` dictates.
///
/// Fails with [`Error::NotAddressable`] when an ABI passes an argument by
/// reference and the value has no address.
pub fn prepare_call(ctx: &AbiContext, call: &CallRequest) -> Result<CallSetup> {
    let d = ctx.descriptor();
    let regsize = d.register_byte_size as u64;
    let align = d.stack_alignment;

    // the hidden return pointer owns a home slot
    let mut len = if call.struct_return.is_some() && d.flags.reserve_home_slots {
        regsize
    } else {
        0
    };
    for arg in &call.args {
        if d.flags.double_align_aggregates && arg.ty.needs_double_align() {
            len = align_up(len, 2 * regsize);
        }
        len += align_up(arg.ty.size() as u64, regsize);
    }
    let sp = align_down(call.sp, align).wrapping_sub(align_up(len, align));
    debug!(
        abi = %ctx.kind,
        sp = format_args!("{:#x}", sp),
        allocated = align_up(len, align),
        "preparing call"
    );

    let mut placer = Placer::new(ctx, sp);
    placer.write_int(mips::T9, call.function);
    placer.write_int(mips::RA, call.return_address);

    if let Some(address) = call.struct_return {
        let address = align_down(address, align);
        trace!(reg = placer.argreg, address = format_args!("{:#x}", address), "struct return");
        placer.write_int(placer.argreg, address);
        placer.argreg += 1;
        if d.flags.reserve_home_slots {
            placer.stack_offset += regsize;
        }
    }

    for (index, arg) in call.args.iter().enumerate() {
        placer.place(index, arg)?;
    }

    placer.write_int(mips::SP, sp);
    Ok(placer.setup)
}

struct Placer<'c> {
    ctx: &'c AbiContext,
    sp: u64,
    argreg: u16,
    float_argreg: u16,
    stack_offset: u64,
    setup: CallSetup,
}

impl<'c> Placer<'c> {
    fn new(ctx: &'c AbiContext, sp: u64) -> Self {
        let d = ctx.descriptor();
        Self {
            ctx,
            sp,
            argreg: d.argument_registers.first,
            float_argreg: d.float_argument_registers.first,
            stack_offset: 0,
            setup: CallSetup {
                stack_pointer: sp,
                ..CallSetup::default()
            },
        }
    }

    fn endianness(&self) -> Endianness {
        self.ctx.endianness
    }

    fn regsize(&self) -> usize {
        self.ctx.register_size()
    }

    fn last_arg(&self) -> u16 {
        self.ctx.descriptor().argument_registers.last
    }

    fn last_float_arg(&self) -> u16 {
        self.ctx.descriptor().float_argument_registers.last
    }

    fn write_int(&mut self, reg: u16, value: u64) {
        let bytes = self.endianness().write(value, self.regsize());
        self.setup.register_writes.push(RegisterWrite {
            register: RawRegister(reg),
            bytes,
        });
    }

    fn write_float(&mut self, reg: u16, value: u64) {
        let bytes = self.endianness().write(value, self.ctx.float_register_size);
        self.setup.register_writes.push(RegisterWrite {
            register: RawRegister(reg),
            bytes,
        });
    }

    /// Copy of a float argument in its integer register.
    fn write_shadow(&mut self, reg: u16, value: u64) {
        if reg <= self.last_arg() {
            self.write_int(reg, value);
        }
    }

    fn write_stack(&mut self, offset: u64, bytes: &[u8]) {
        let address = self.sp.wrapping_add(offset);
        trace!(address = format_args!("{:#x}", address), len = bytes.len(), "stack argument");
        self.setup.memory_writes.push(MemoryWrite {
            address,
            bytes: bytes.to_vec(),
        });
    }

    fn float_eligible(&self, code: TypeCode, ty: &ValueType) -> bool {
        if self.ctx.fpu == FpuKind::None {
            return false;
        }
        match self.ctx.descriptor().float_argument_rule {
            FloatArgumentRule::Scalar => code == TypeCode::Float,
            FloatArgumentRule::ScalarOrSingleFieldAggregate => {
                code == TypeCode::Float
                    || (matches!(code, TypeCode::Struct | TypeCode::Union) && ty.is_single_float_aggregate())
            }
        }
    }

    fn float_register_is_odd(&self) -> bool {
        (self.float_argreg - mips::FP0) & 1 == 1
    }

    /// Integer value of one register-sized piece.
    fn extract(&self, code: TypeCode, ty: &ValueType, piece: &[u8]) -> u64 {
        let e = self.endianness();
        let signed = match self.ctx.kind {
            // pointers, words and narrow signed integers are sign-extended
            AbiKind::N32 | AbiKind::N64 => {
                (piece.len() == 4 && matches!(code, TypeCode::Pointer | TypeCode::Int))
                    || (piece.len() < 4 && code == TypeCode::Int && ty.is_signed())
            }
            AbiKind::O32 | AbiKind::O64 | AbiKind::Eabi32 | AbiKind::Eabi64 => true,
        };
        if signed {
            e.read_signed(piece) as u64
        } else {
            e.read_unsigned(piece)
        }
    }

    /// Where a short value sits inside its big-endian stack slot.
    fn stack_slot_offset(&self, code: TypeCode, ty: &ValueType, remaining: usize) -> u64 {
        if self.endianness() != Endianness::Big {
            return 0;
        }
        let regsize = self.regsize();
        let scalar = matches!(code, TypeCode::Int | TypeCode::Pointer | TypeCode::Float);
        let offset = match self.ctx.kind {
            AbiKind::O32 => 0,
            AbiKind::O64 if scalar && remaining <= 4 => 8 - remaining,
            AbiKind::O64 => 0,
            AbiKind::N32 | AbiKind::N64
                if matches!(code, TypeCode::Int | TypeCode::Pointer) && remaining <= 4 =>
            {
                8 - remaining
            }
            AbiKind::N32 | AbiKind::N64 => 0,
            AbiKind::Eabi32 | AbiKind::Eabi64 if regsize == 8 && scalar && remaining <= 4 => {
                regsize - remaining
            }
            AbiKind::Eabi32 | AbiKind::Eabi64
                if matches!(code, TypeCode::Struct | TypeCode::Union) && ty.size() < regsize =>
            {
                regsize - remaining
            }
            AbiKind::Eabi32 | AbiKind::Eabi64 => 0,
        };
        offset as u64
    }

    fn place(&mut self, index: usize, arg: &Value) -> Result<()> {
        let flags = self.ctx.descriptor().flags;
        let e = self.endianness();
        let regsize = self.regsize();

        let mut code = arg.ty.code();
        let mut val = arg.bytes.clone();
        val.resize(arg.ty.size(), 0);

        if flags.large_aggregates_by_reference
            && val.len() > regsize
            && matches!(code, TypeCode::Struct | TypeCode::Union)
        {
            let address = arg.address.ok_or(Error::NotAddressable { index })?;
            val = e.write(address, regsize);
            code = TypeCode::Pointer;
        }

        let len = val.len();
        // only the N ABIs split wide floats over a register pair
        let fp = self.float_eligible(code, &arg.ty) && (flags.lockstep_registers || len <= 8);
        trace!(index, len, ?code, fp, "argument");

        if fp && self.float_register_is_odd() {
            if flags.lockstep_registers && len == 16 {
                self.float_argreg += 1;
                self.argreg += 1;
            } else if flags.even_float_registers {
                self.float_argreg += 1;
            }
        }

        let float_fits = if flags.lockstep_registers {
            self.argreg <= self.last_arg()
        } else {
            self.float_argreg <= self.last_float_arg()
        };
        if fp && float_fits {
            self.place_float(&val, flags.lockstep_registers, flags.shadow_float_in_integer);
            if flags.reserve_home_slots {
                self.stack_offset += align_up(len as u64, regsize as u64);
            }
            return Ok(());
        }

        // Floats that miss the float registers go only to memory unless the
        // ABI mirrors them in integer registers.
        let stack_only = fp && !flags.shadow_float_in_integer;
        let odd_sized = !flags.lockstep_registers && len > regsize && len % regsize != 0;

        if flags.double_align_aggregates && arg.ty.needs_double_align() && (self.argreg - mips::A0) & 1 == 1 {
            self.argreg += 1;
            self.stack_offset += regsize as u64;
        }

        let mut offset = 0;
        while offset < len {
            let remaining = len - offset;
            let partial = remaining.min(regsize);
            let piece = &val[offset..offset + partial];

            let stack_used = self.argreg > self.last_arg() || odd_sized || stack_only;
            if stack_used {
                let slot = self.stack_slot_offset(code, &arg.ty, remaining);
                self.write_stack(self.stack_offset + slot, piece);
            }

            if self.argreg <= self.last_arg() && !stack_only {
                let mut value = self.extract(code, &arg.ty, piece);
                if e == Endianness::Big
                    && partial < regsize
                    && matches!(code, TypeCode::Struct | TypeCode::Union)
                {
                    value <<= 8 * (regsize - partial);
                }
                self.write_int(self.argreg, value);

                if flags.float_chunks_in_aggregates {
                    if self.ctx.fpu == FpuKind::Double && arg.ty.has_double_at(offset) {
                        self.write_float(self.float_argreg, value);
                    }
                    self.float_argreg += 1;
                }
                if flags.integer_blocks_float {
                    self.float_argreg = self.last_float_arg() + 1;
                }
                self.argreg += 1;
            }

            offset += partial;
            if stack_used || flags.reserve_home_slots {
                self.stack_offset += align_up(partial as u64, regsize as u64);
            }
        }
        Ok(())
    }

    fn place_float(&mut self, val: &[u8], lockstep: bool, shadow: bool) {
        let e = self.endianness();

        if lockstep {
            // one register, or an even/odd pair for 16-byte values
            for chunk in val.chunks(8) {
                let value = e.read_unsigned(chunk);
                self.write_float(self.float_argreg, value);
                self.write_shadow(self.argreg, value);
                self.float_argreg += 1;
                self.argreg += 1;
            }
            return;
        }

        let signed = match self.ctx.kind {
            AbiKind::Eabi32 | AbiKind::Eabi64 => true,
            AbiKind::O32 | AbiKind::O64 | AbiKind::N32 | AbiKind::N64 => false,
        };
        let read = |bytes: &[u8]| {
            if signed {
                e.read_signed(bytes) as u64
            } else {
                e.read_unsigned(bytes)
            }
        };
        let split = val.len() == 8
            && match self.ctx.kind {
                AbiKind::Eabi32 => true,
                _ => self.ctx.float_register_size < 8,
            };

        if split {
            // the even register takes the low word
            let low = if e == Endianness::Big { 4 } else { 0 };
            for half in [low, 4 - low] {
                let value = read(&val[half..half + 4]);
                self.write_float(self.float_argreg, value);
                self.float_argreg += 1;
                if shadow {
                    self.write_shadow(self.argreg, value);
                    self.argreg += 1;
                }
            }
        } else {
            let value = read(val);
            self.write_float(self.float_argreg, value);
            self.float_argreg += 1;
            if shadow {
                self.write_shadow(self.argreg, value);
                self.argreg += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Field;
    use framewalk_core::{Architecture, Memory};
    use framewalk_target::{RegisterFile, SparseMemory};

    const FUNC: u64 = 0x400100;
    const BP: u64 = 0x400000;
    const SP: u64 = 0x7fff_1008;
    const FA0: u16 = mips::FP0 + 12;

    fn ctx(kind: AbiKind, e: Endianness) -> AbiContext {
        AbiContext::new(kind, FpuKind::Double, e)
    }

    fn int(size: usize, value: i64, e: Endianness) -> Value {
        Value::new(ValueType::int(size), e.write_signed(value, size))
    }

    fn double(value: f64, e: Endianness) -> Value {
        Value::new(ValueType::float(8), e.write(value.to_bits(), 8))
    }

    fn float(value: f32, e: Endianness) -> Value {
        Value::new(ValueType::float(4), e.write(u64::from(value.to_bits()), 4))
    }

    fn reg(setup: &CallSetup, raw: u16, e: Endianness) -> Option<u64> {
        setup.register(raw).map(|b| e.read_unsigned(b))
    }

    // =========================================================================
    // Common setup
    // =========================================================================

    #[test]
    fn test_common_registers_and_alignment() {
        let e = Endianness::Big;
        let setup = prepare_call(&ctx(AbiKind::O32, e), &CallRequest::new(FUNC, BP, SP)).unwrap();
        assert_eq!(setup.stack_pointer, 0x7fff_1000);
        assert_eq!(reg(&setup, mips::T9, e), Some(FUNC));
        assert_eq!(reg(&setup, mips::RA, e), Some(BP));
        assert_eq!(reg(&setup, mips::SP, e), Some(0x7fff_1000));
        assert!(setup.memory_writes.is_empty());
    }

    #[test]
    fn test_stack_reservation() {
        let e = Endianness::Big;
        // o32: int, then a double aligned to 8: 4 + 4 pad + 8
        let call = CallRequest::new(FUNC, BP, SP).arg(int(4, 1, e)).arg(double(1.0, e));
        let setup = prepare_call(&ctx(AbiKind::O32, e), &call).unwrap();
        assert_eq!(setup.stack_pointer, 0x7fff_1000 - 16);

        // n64: three words round up to 32
        let call = CallRequest::new(FUNC, BP, SP)
            .arg(int(4, 1, e))
            .arg(int(4, 2, e))
            .arg(int(4, 3, e));
        let setup = prepare_call(&ctx(AbiKind::N64, e), &call).unwrap();
        assert_eq!(setup.stack_pointer, 0x7fff_1000 - 32);
    }

    // =========================================================================
    // O32
    // =========================================================================

    #[test]
    fn test_o32_integer_blocks_float() {
        let e = Endianness::Big;
        let call = CallRequest::new(FUNC, BP, SP).arg(int(4, -5, e)).arg(double(2.0, e));
        let setup = prepare_call(&ctx(AbiKind::O32, e), &call).unwrap();

        assert_eq!(reg(&setup, mips::A0, e), Some(0xffff_fffb));
        // the double skips a1 to start on an even register, in integer registers
        assert_eq!(reg(&setup, mips::A1, e), None);
        assert_eq!(reg(&setup, mips::A2, e), Some(0x4000_0000));
        assert_eq!(reg(&setup, mips::A3, e), Some(0));
        assert_eq!(reg(&setup, FA0, e), None);
        assert_eq!(reg(&setup, FA0 + 2, e), None);
    }

    #[test]
    fn test_o32_doubles_in_register_pairs() {
        let e = Endianness::Big;
        let call = CallRequest::new(FUNC, BP, SP).arg(double(2.0, e)).arg(double(-1.0, e));
        let setup = prepare_call(&ctx(AbiKind::O32, e), &call).unwrap();

        // even register gets the low word; integer registers mirror them
        assert_eq!(reg(&setup, FA0, e), Some(0));
        assert_eq!(reg(&setup, FA0 + 1, e), Some(0x4000_0000));
        assert_eq!(reg(&setup, mips::A0, e), Some(0));
        assert_eq!(reg(&setup, mips::A1, e), Some(0x4000_0000));
        assert_eq!(reg(&setup, FA0 + 2, e), Some(0));
        assert_eq!(reg(&setup, FA0 + 3, e), Some(0xbff0_0000));
        assert_eq!(reg(&setup, mips::A3, e), Some(0xbff0_0000));
    }

    #[test]
    fn test_o32_floats_round_to_even() {
        let e = Endianness::Little;
        let call = CallRequest::new(FUNC, BP, SP).arg(float(1.0, e)).arg(float(2.0, e));
        let setup = prepare_call(&ctx(AbiKind::O32, e), &call).unwrap();

        assert_eq!(reg(&setup, FA0, e), Some(0x3f80_0000));
        assert_eq!(reg(&setup, FA0 + 1, e), None);
        assert_eq!(reg(&setup, FA0 + 2, e), Some(0x4000_0000));
        assert_eq!(reg(&setup, mips::A0, e), Some(0x3f80_0000));
        assert_eq!(reg(&setup, mips::A1, e), Some(0x4000_0000));
    }

    #[test]
    fn test_o32_without_fpu() {
        let e = Endianness::Big;
        let ctx = AbiContext::new(AbiKind::O32, FpuKind::None, e);
        let call = CallRequest::new(FUNC, BP, SP).arg(float(1.0, e));
        let setup = prepare_call(&ctx, &call).unwrap();
        assert_eq!(reg(&setup, mips::A0, e), Some(0x3f80_0000));
        assert_eq!(reg(&setup, FA0, e), None);
    }

    #[test]
    fn test_o32_small_struct_is_left_justified() {
        let e = Endianness::Big;
        let ty = ValueType::structure(3, vec![Field::new(0, ValueType::uint(1))]);
        let call = CallRequest::new(FUNC, BP, SP).arg(Value::new(ty, vec![0x11, 0x22, 0x33]));
        let setup = prepare_call(&ctx(AbiKind::O32, e), &call).unwrap();
        assert_eq!(reg(&setup, mips::A0, e), Some(0x1122_3300));
    }

    #[test]
    fn test_o32_odd_struct_goes_to_both() {
        let e = Endianness::Big;
        let ty = ValueType::structure(6, vec![Field::new(0, ValueType::uint(2))]);
        let call = CallRequest::new(FUNC, BP, SP).arg(Value::new(ty, vec![1, 2, 3, 4, 5, 6]));
        let setup = prepare_call(&ctx(AbiKind::O32, e), &call).unwrap();
        let sp = setup.stack_pointer;

        assert_eq!(reg(&setup, mips::A0, e), Some(0x0102_0304));
        assert_eq!(reg(&setup, mips::A1, e), Some(0x0506_0000));
        assert_eq!(setup.memory_at(sp), Some(&[1, 2, 3, 4][..]));
        assert_eq!(setup.memory_at(sp + 4), Some(&[5, 6][..]));
    }

    #[test]
    fn test_o32_overflow_uses_home_offsets() {
        let e = Endianness::Big;
        let mut call = CallRequest::new(FUNC, BP, SP);
        for i in 0..5 {
            call = call.arg(int(4, i, e));
        }
        let setup = prepare_call(&ctx(AbiKind::O32, e), &call).unwrap();
        assert_eq!(reg(&setup, mips::A3, e), Some(3));
        // the fifth word lands after the four home slots
        assert_eq!(setup.memory_at(setup.stack_pointer + 16), Some(&[0, 0, 0, 4][..]));
        assert_eq!(setup.memory_writes.len(), 1);
    }

    #[test]
    fn test_o32_struct_return() {
        let e = Endianness::Big;
        let call = CallRequest::new(FUNC, BP, SP)
            .with_struct_return(0x7fff_2009)
            .arg(int(4, 7, e))
            .arg(int(4, 8, e))
            .arg(int(4, 9, e))
            .arg(int(4, 10, e));
        let setup = prepare_call(&ctx(AbiKind::O32, e), &call).unwrap();
        assert_eq!(reg(&setup, mips::A0, e), Some(0x7fff_2000));
        assert_eq!(reg(&setup, mips::A1, e), Some(7));
        assert_eq!(reg(&setup, mips::A3, e), Some(9));
        // the hidden pointer took a home slot as well
        assert_eq!(setup.memory_at(setup.stack_pointer + 16), Some(&[0, 0, 0, 10][..]));
    }

    // =========================================================================
    // O64
    // =========================================================================

    #[test]
    fn test_o64_short_stack_values_are_right_justified() {
        let e = Endianness::Big;
        let mut call = CallRequest::new(FUNC, BP, SP);
        for i in 0..5 {
            call = call.arg(int(4, i, e));
        }
        let setup = prepare_call(&ctx(AbiKind::O64, e), &call).unwrap();
        assert_eq!(reg(&setup, mips::A0, e), Some(0));
        assert_eq!(setup.memory_at(setup.stack_pointer + 32 + 4), Some(&[0, 0, 0, 4][..]));
    }

    #[test]
    fn test_o64_double_in_one_register() {
        let e = Endianness::Little;
        let call = CallRequest::new(FUNC, BP, SP).arg(double(1.0, e));
        let setup = prepare_call(&ctx(AbiKind::O64, e), &call).unwrap();
        assert_eq!(reg(&setup, FA0, e), Some(0x3ff0_0000_0000_0000));
        assert_eq!(reg(&setup, mips::A0, e), Some(0x3ff0_0000_0000_0000));
    }

    #[test]
    fn test_o64_long_double_in_integer_registers() {
        let e = Endianness::Big;
        let bytes: Vec<u8> = (1..=16).collect();
        let call = CallRequest::new(FUNC, BP, SP).arg(Value::new(ValueType::float(16), bytes));
        let setup = prepare_call(&ctx(AbiKind::O64, e), &call).unwrap();

        assert_eq!(reg(&setup, mips::A0, e), Some(0x0102_0304_0506_0708));
        assert_eq!(reg(&setup, mips::A1, e), Some(0x090a_0b0c_0d0e_0f10));
        assert_eq!(reg(&setup, FA0, e), None);
    }

    // =========================================================================
    // N32 / N64
    // =========================================================================

    #[test]
    fn test_n64_registers_advance_in_lockstep() {
        let e = Endianness::Big;
        let call = CallRequest::new(FUNC, BP, SP).arg(int(4, -1, e)).arg(double(1.0, e));
        let setup = prepare_call(&ctx(AbiKind::N64, e), &call).unwrap();
        assert_eq!(reg(&setup, mips::A0, e), Some(u64::MAX));
        assert_eq!(reg(&setup, FA0, e), None);
        assert_eq!(reg(&setup, FA0 + 1, e), Some(0x3ff0_0000_0000_0000));
        assert_eq!(reg(&setup, mips::A1, e), Some(0x3ff0_0000_0000_0000));
    }

    #[test]
    fn test_n64_unsigned_short_is_zero_extended() {
        let e = Endianness::Little;
        let arg = Value::new(ValueType::uint(2), vec![0xff, 0xff]);
        let setup = prepare_call(&ctx(AbiKind::N64, e), &CallRequest::new(FUNC, BP, SP).arg(arg)).unwrap();
        assert_eq!(reg(&setup, mips::A0, e), Some(0xffff));
    }

    #[test]
    fn test_n64_long_double_takes_even_pair() {
        let e = Endianness::Big;
        let bytes: Vec<u8> = (1..=16).collect();
        let call = CallRequest::new(FUNC, BP, SP)
            .arg(int(8, 1, e))
            .arg(Value::new(ValueType::float(16), bytes));
        let setup = prepare_call(&ctx(AbiKind::N64, e), &call).unwrap();

        assert_eq!(reg(&setup, FA0 + 1, e), None);
        assert_eq!(reg(&setup, mips::A1, e), None);
        assert_eq!(reg(&setup, FA0 + 2, e), Some(0x0102_0304_0506_0708));
        assert_eq!(reg(&setup, mips::A2, e), Some(0x0102_0304_0506_0708));
        assert_eq!(reg(&setup, FA0 + 3, e), Some(0x090a_0b0c_0d0e_0f10));
        assert_eq!(reg(&setup, mips::A3, e), Some(0x090a_0b0c_0d0e_0f10));
    }

    #[test]
    fn test_n64_struct_double_chunk() {
        let e = Endianness::Big;
        let ty = ValueType::structure(16, vec![Field::new(0, ValueType::int(8)), Field::new(8, ValueType::float(8))]);
        let mut bytes = e.write(5, 8);
        bytes.extend(e.write(2.5f64.to_bits(), 8));
        let setup = prepare_call(&ctx(AbiKind::N64, e), &CallRequest::new(FUNC, BP, SP).arg(Value::new(ty, bytes))).unwrap();

        assert_eq!(reg(&setup, mips::A0, e), Some(5));
        assert_eq!(reg(&setup, FA0, e), None);
        assert_eq!(reg(&setup, mips::A1, e), Some(2.5f64.to_bits()));
        assert_eq!(reg(&setup, FA0 + 1, e), Some(2.5f64.to_bits()));
    }

    #[test]
    fn test_n32_overflow_only_advances_used_stack() {
        let e = Endianness::Big;
        let mut call = CallRequest::new(FUNC, BP, SP);
        for i in 0..10 {
            call = call.arg(int(4, i, e));
        }
        let setup = prepare_call(&ctx(AbiKind::N32, e), &call).unwrap();
        let sp = setup.stack_pointer;
        assert_eq!(reg(&setup, mips::A0 + 7, e), Some(7));
        assert_eq!(setup.memory_at(sp + 4), Some(&[0, 0, 0, 8][..]));
        assert_eq!(setup.memory_at(sp + 12), Some(&[0, 0, 0, 9][..]));
    }

    // =========================================================================
    // EABI
    // =========================================================================

    #[test]
    fn test_eabi_large_struct_by_reference() {
        let e = Endianness::Big;
        let ty = ValueType::structure(12, vec![Field::new(0, ValueType::int(4))]);
        let arg = Value::new(ty.clone(), vec![0; 12]).at(0x1000_0040);
        let setup = prepare_call(&ctx(AbiKind::Eabi32, e), &CallRequest::new(FUNC, BP, SP).arg(arg)).unwrap();
        assert_eq!(reg(&setup, mips::A0, e), Some(0x1000_0040));
        assert!(setup.memory_writes.is_empty());

        let call = CallRequest::new(FUNC, BP, SP)
            .arg(int(4, 1, e))
            .arg(Value::new(ty, vec![0; 12]));
        assert_eq!(
            prepare_call(&ctx(AbiKind::Eabi32, e), &call),
            Err(Error::NotAddressable { index: 1 })
        );
    }

    #[test]
    fn test_eabi_single_float_struct_uses_float_register() {
        let e = Endianness::Little;
        let ty = ValueType::structure(4, vec![Field::new(0, ValueType::float(4))]);
        let arg = Value::new(ty, e.write(u64::from(1.5f32.to_bits()), 4));
        let setup = prepare_call(&ctx(AbiKind::Eabi64, e), &CallRequest::new(FUNC, BP, SP).arg(arg)).unwrap();
        assert_eq!(reg(&setup, FA0, e), Some(u64::from(1.5f32.to_bits())));
        // no shadow copy
        assert_eq!(reg(&setup, mips::A0, e), None);
    }

    #[test]
    fn test_eabi_float_overflow_goes_to_stack_only() {
        let e = Endianness::Big;
        let mut call = CallRequest::new(FUNC, BP, SP);
        for i in 0..9 {
            call = call.arg(double(f64::from(i), e));
        }
        call = call.arg(int(8, 42, e));
        let setup = prepare_call(&ctx(AbiKind::Eabi64, e), &call).unwrap();

        assert_eq!(reg(&setup, FA0 + 7, e), Some(7.0f64.to_bits()));
        assert_eq!(setup.memory_at(setup.stack_pointer), Some(&e.write(8.0f64.to_bits(), 8)[..]));
        // integer registers are still free
        assert_eq!(reg(&setup, mips::A0, e), Some(42));
    }

    #[test]
    fn test_eabi64_long_double_keeps_both_halves() {
        let e = Endianness::Little;
        let bytes: Vec<u8> = (1..=16).collect();
        let call = CallRequest::new(FUNC, BP, SP).arg(Value::new(ValueType::float(16), bytes.clone()));
        let setup = prepare_call(&ctx(AbiKind::Eabi64, e), &call).unwrap();

        assert_eq!(setup.register(mips::A0), Some(&bytes[..8]));
        assert_eq!(setup.register(mips::A1), Some(&bytes[8..]));
        assert_eq!(reg(&setup, FA0, e), None);
    }

    #[test]
    fn test_eabi32_doubles_split_even_on_wide_registers() {
        let e = Endianness::Big;
        let mut ctx = ctx(AbiKind::Eabi32, e);
        ctx.float_register_size = 8;
        let call = CallRequest::new(FUNC, BP, SP).arg(float(1.0, e)).arg(double(-2.0, e));
        let setup = prepare_call(&ctx, &call).unwrap();
        assert_eq!(reg(&setup, FA0, e), Some(0x3f80_0000));
        assert_eq!(reg(&setup, FA0 + 2, e), Some(0));
        // high word is sign-extended into the wide register
        assert_eq!(reg(&setup, FA0 + 3, e), Some(0xffff_ffff_c000_0000));
    }

    // =========================================================================
    // Applying
    // =========================================================================

    #[test]
    fn test_apply_writes_target() {
        let e = Endianness::Big;
        let profile = RegisterProfile::new(Architecture::Mips64, 4, e);
        let mut regs = RegisterFile::new(Architecture::Mips64, e);
        let mut memory = SparseMemory::new();

        let mut call = CallRequest::new(FUNC, BP, SP);
        for i in 0..5 {
            call = call.arg(int(4, -i, e));
        }
        let setup = prepare_call(&AbiContext::for_profile(AbiKind::O32, FpuKind::Double, &profile), &call).unwrap();
        setup.apply(&mut memory, &mut regs, &profile).unwrap();

        // narrow values are sign-extended into the 64-bit registers
        assert_eq!(regs.get(mips::A1), Some(u64::MAX));
        assert_eq!(regs.get(mips::SP), Some(setup.stack_pointer));
        assert_eq!(regs.get(mips::T9), Some(FUNC));
        assert_eq!(
            memory.read(setup.stack_pointer + 16, 4).unwrap(),
            vec![0xff, 0xff, 0xff, 0xfc]
        );
    }
}
