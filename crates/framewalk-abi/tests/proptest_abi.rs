//! Property-based tests for the calling-convention engine.
//!
//! These tests verify invariants that should hold for every ABI variant:
//! - A scalar stored as a return value extracts to the same bytes
//! - A scalar argument reads back from its argument register
//! - A scalar passed through a call and returned keeps its bit pattern
//! - Call setup never panics and keeps the stack aligned

use proptest::prelude::*;

use framewalk_abi::{
    classify_return, extract_return, prepare_call, store_return, AbiContext, AbiKind, CallRequest, FpuKind,
    ReturnConvention, Value, ValueType,
};
use framewalk_core::{mips, Architecture, Endianness, Memory, RegisterProfile};
use framewalk_target::{RegisterFile, SparseMemory};

fn architecture(kind: AbiKind) -> Architecture {
    match kind.register_size() {
        4 => Architecture::Mips32,
        _ => Architecture::Mips64,
    }
}

fn abi() -> impl Strategy<Value = AbiKind> {
    prop::sample::select(AbiKind::ALL.to_vec())
}

fn endianness() -> impl Strategy<Value = Endianness> {
    prop_oneof![Just(Endianness::Big), Just(Endianness::Little)]
}

fn fpu() -> impl Strategy<Value = FpuKind> {
    prop_oneof![Just(FpuKind::None), Just(FpuKind::Single), Just(FpuKind::Double)]
}

fn scalar_types(kind: AbiKind) -> Vec<ValueType> {
    let mut types = vec![
        ValueType::int(1),
        ValueType::uint(1),
        ValueType::int(2),
        ValueType::int(4),
        ValueType::int(8),
        ValueType::float(4),
        ValueType::float(8),
    ];
    if matches!(kind, AbiKind::N32 | AbiKind::N64) {
        types.push(ValueType::float(16));
    }
    types
}

const FA0: u16 = mips::FP0 + 12;

/// Reassembles a lone scalar argument from the registers it was passed in.
fn argument_from_registers(ctx: &AbiContext, regs: &RegisterFile, ty: &ValueType) -> Vec<u8> {
    let e = ctx.endianness;
    let get = |raw: u16| regs.get(raw).unwrap();
    let size = ty.size();

    if ty.is_float() && ctx.fpu != FpuKind::None {
        if size == 8 && ctx.float_register_size == 4 {
            // the even register holds the low word
            let value = (get(FA0 + 1) << 32) | (get(FA0) & 0xffff_ffff);
            return e.write(value, 8);
        }
        return (0..size)
            .step_by(8)
            .flat_map(|offset| e.write(get(FA0 + (offset / 8) as u16), (size - offset).min(8)))
            .collect();
    }

    let regsize = ctx.register_size();
    if size <= regsize {
        return e.write(get(mips::A0), size);
    }
    (0..size)
        .step_by(regsize)
        .flat_map(|offset| e.write(get(mips::A0 + (offset / regsize) as u16), regsize))
        .collect()
}

fn simple_argument() -> impl Strategy<Value = ValueType> {
    prop_oneof![
        (1usize..=3).prop_map(|s| ValueType::int(1 << (s - 1))),
        Just(ValueType::uint(4)),
        Just(ValueType::int(8)),
        Just(ValueType::pointer(4)),
        Just(ValueType::float(4)),
        Just(ValueType::float(8)),
        (1usize..24).prop_map(|s| ValueType::structure(s, vec![])),
    ]
}

// =============================================================================
// Return Values
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10000))]

    /// Storing a scalar return value and extracting it gives the same bytes.
    #[test]
    fn scalar_return_round_trips(
        kind in abi(),
        e in endianness(),
        fpu in fpu(),
        pick in any::<prop::sample::Index>(),
        seed in prop::collection::vec(any::<u8>(), 16),
    ) {
        let arch = architecture(kind);
        let profile = RegisterProfile::new(arch, kind.register_size(), e);
        let ctx = AbiContext::for_profile(kind, fpu, &profile);
        let types = scalar_types(kind);
        let ty = pick.get(&types);
        let bytes = seed[..ty.size()].to_vec();

        let conv = classify_return(&ctx, ty);
        let ReturnConvention::Register(layout) = conv else {
            return Err(TestCaseError::fail(format!("{ty:?} returned in memory on {kind}")));
        };
        prop_assert_eq!(layout.size(), ty.size());

        let mut regs = RegisterFile::new(arch, e);
        store_return(&layout, &profile, &mut regs, &bytes).unwrap();
        prop_assert_eq!(extract_return(&layout, &profile, &regs).unwrap(), bytes);
    }
}

// =============================================================================
// Argument Placement
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10000))]

    /// A lone integer argument arrives in the first argument register.
    #[test]
    fn integer_argument_reads_back(
        kind in abi(),
        e in endianness(),
        size_log in 0u32..4,
        value in any::<i64>(),
    ) {
        let size = 1usize << size_log;
        prop_assume!(size <= kind.register_size());
        let ctx = AbiContext::new(kind, FpuKind::Double, e);
        let arg = Value::new(ValueType::int(size), e.write_signed(value, size));
        let expected = e.read_signed(&arg.bytes);

        let setup = prepare_call(&ctx, &CallRequest::new(0x400100, 0x400000, 0x7fff_0000).arg(arg)).unwrap();
        let a0 = setup.register(mips::A0).unwrap();
        prop_assert_eq!(a0.len(), kind.register_size());
        prop_assert_eq!(e.read_signed(a0), expected);
    }

    /// A lone float argument arrives in f12 whenever there is an FPU.
    #[test]
    fn float_argument_reads_back(kind in abi(), e in endianness(), bits in any::<u32>()) {
        let ctx = AbiContext::new(kind, FpuKind::Single, e);
        let arg = Value::new(ValueType::float(4), e.write(u64::from(bits), 4));

        let setup = prepare_call(&ctx, &CallRequest::new(0x400100, 0x400000, 0x7fff_0000).arg(arg)).unwrap();
        let f12 = setup.register(mips::FP0 + 12).unwrap();
        prop_assert_eq!(e.read_unsigned(f12) & 0xffff_ffff, u64::from(bits));
    }

    /// Arbitrary argument lists never panic and keep the stack aligned.
    #[test]
    fn call_setup_is_aligned(
        kind in abi(),
        e in endianness(),
        fpu in fpu(),
        sp in 0x1000u64..0x7fff_ffff,
        types in prop::collection::vec(simple_argument(), 0..12),
        struct_return in prop::option::of(0x1000u64..0x7fff_0000),
    ) {
        let ctx = AbiContext::new(kind, fpu, e);
        let mut call = CallRequest::new(0x400100, 0x400000, sp);
        call.struct_return = struct_return;
        for (i, ty) in types.iter().enumerate() {
            let bytes = vec![i as u8; ty.size()];
            call = call.arg(Value::new(ty.clone(), bytes).at(0x1000_0000 + 0x100 * i as u64));
        }

        let setup = prepare_call(&ctx, &call).unwrap();
        prop_assert_eq!(setup.stack_pointer % 16, 0);
        prop_assert!(setup.stack_pointer <= sp);
        for write in &setup.memory_writes {
            prop_assert!(write.address >= setup.stack_pointer);
            prop_assert!(write.address + write.bytes.len() as u64 <= sp);
        }
        for write in &setup.register_writes {
            prop_assert!(write.register.0 < mips::NUM_RAW);
        }
    }
}

// =============================================================================
// Call Round Trip
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10000))]

    /// A scalar of every supported size survives being passed to a call,
    /// in registers or on the stack, and being returned from it.
    #[test]
    fn scalar_survives_call_and_return(
        kind in abi(),
        e in endianness(),
        fpu in prop_oneof![Just(FpuKind::None), Just(FpuKind::Double)],
        pick in any::<prop::sample::Index>(),
        seed in prop::collection::vec(any::<u8>(), 16),
        overflow in any::<bool>(),
    ) {
        let arch = architecture(kind);
        let regsize = kind.register_size();
        let profile = RegisterProfile::new(arch, regsize, e);
        let ctx = AbiContext::for_profile(kind, fpu, &profile);
        let types = scalar_types(kind);
        let ty = pick.get(&types);
        let bytes = seed[..ty.size()].to_vec();

        // fillers use up every integer argument register
        let mut call = CallRequest::new(0x400100, 0x400000, 0x7fff_0000);
        if overflow {
            for i in 0..kind.descriptor().argument_registers.len() {
                call = call.arg(Value::from_integer(ValueType::int(regsize), i as u64, e));
            }
        }
        call = call.arg(Value::new(ty.clone(), bytes.clone()));

        let setup = prepare_call(&ctx, &call).unwrap();
        let mut memory = SparseMemory::new();
        let mut regs = RegisterFile::new(arch, e);
        setup.apply(&mut memory, &mut regs, &profile).unwrap();
        prop_assert_eq!(regs.get(mips::SP), Some(setup.stack_pointer));

        let passed = if setup.memory_writes.is_empty() {
            argument_from_registers(&ctx, &regs, ty)
        } else {
            let mut out = Vec::new();
            for write in &setup.memory_writes {
                prop_assert!(write.address >= setup.stack_pointer);
                prop_assert!(write.address + write.bytes.len() as u64 <= 0x7fff_0000);
                out.extend(memory.read(write.address, write.bytes.len()).unwrap());
            }
            out
        };
        prop_assert_eq!(&passed, &bytes);

        let ReturnConvention::Register(layout) = classify_return(&ctx, ty) else {
            return Err(TestCaseError::fail(format!("{ty:?} returned in memory on {kind}")));
        };
        store_return(&layout, &profile, &mut regs, &passed).unwrap();
        prop_assert_eq!(extract_return(&layout, &profile, &regs).unwrap(), bytes);
    }
}

#[test]
fn apply_then_read_back_argument_area() {
    let e = Endianness::Little;
    let profile = RegisterProfile::new(Architecture::Mips64, 8, e);
    let ctx = AbiContext::for_profile(AbiKind::N64, FpuKind::Double, &profile);
    let mut call = CallRequest::new(0x1_2000_0100, 0x1_2000_0000, 0x7fff_f008);
    for i in 0..10u64 {
        call = call.arg(Value::from_integer(ValueType::int(8), i * 0x1111, e));
    }
    let setup = prepare_call(&ctx, &call).unwrap();

    let mut memory = SparseMemory::new();
    let mut regs = RegisterFile::new(Architecture::Mips64, e);
    setup.apply(&mut memory, &mut regs, &profile).unwrap();

    assert_eq!(regs.get(mips::A0 + 7), Some(7 * 0x1111));
    assert_eq!(regs.get(mips::T9), Some(0x1_2000_0100));
    let sp = regs.get(mips::SP).unwrap();
    assert_eq!(sp, 0x7fff_f000 - 80);
    assert_eq!(memory.read_byte(sp), Some(0x88));
    assert_eq!(memory.read_byte(sp + 8), Some(0x99));
}
