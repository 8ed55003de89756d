//! Benchmarks for prologue scanning and unwinding.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use framewalk_core::{mips, Architecture, Endianness, Interrupt, RegisterProfile, Symbol};
use framewalk_target::{RegisterFile, SparseMemory, TargetSnapshot};
use framewalk_unwind::{find_function_start, scan_prologue, ScanContext, UnwindConfig, Unwinder};

/// A full-width prologue with a frame pointer.
const FULL_PROLOGUE: &[u32] = &[
    0x27bdffd8, // addiu sp, sp, -40
    0xafbf0024, // sw ra, 36(sp)
    0xafbe0020, // sw s8, 32(sp)
    0x03a0f021, // move s8, sp
    0xafb0001c, // sw s0, 28(sp)
    0xafb10018, // sw s1, 24(sp)
    0x00851021, // addu v0, a0, a1
];

/// A compact prologue using SAVE.
const COMPACT_PROLOGUE: &[u16] = &[
    0xf010, 0x64f0, // save ra, s0, s1, 128
    0x6207, // sw ra, 28(sp)
    0xe049, // addu v0, s0, v0
];

fn bench_scan(c: &mut Criterion) {
    let mut memory = SparseMemory::new();
    memory.load_words(0x400000, FULL_PROLOGUE, Endianness::Big);
    memory.load_halfwords(0x400100, COMPACT_PROLOGUE, Endianness::Big);
    let profile = RegisterProfile::new(Architecture::Mips32, 4, Endianness::Big);
    let config = UnwindConfig::default();
    let interrupt = Interrupt::new();
    let ctx = ScanContext::new(&memory, &profile, &config, &interrupt);
    let regs = RegisterFile::new(Architecture::Mips32, Endianness::Big)
        .with(mips::SP, 0x7fff_0000)
        .with(mips::S8, 0x7fff_0000);

    let mut group = c.benchmark_group("prologue");
    group.bench_function("full", |b| {
        b.iter(|| scan_prologue(&ctx, black_box(0x400000), 0x400100, Some(&regs)))
    });
    group.bench_function("compact", |b| {
        b.iter(|| scan_prologue(&ctx, black_box(0x400101), 0x400181, Some(&regs)))
    });
    group.bench_function("no_registers", |b| {
        b.iter(|| scan_prologue(&ctx, black_box(0x400000), 0x400100, None))
    });
    group.finish();
}

fn bench_heuristic(c: &mut Criterion) {
    // previous function's return, then 96 body instructions
    let mut words = vec![0x03e00008, 0x00000000];
    words.extend(FULL_PROLOGUE);
    words.extend(std::iter::repeat(0x00851021).take(96));
    let mut memory = SparseMemory::new();
    memory.load_words(0x400000, &words, Endianness::Big);
    let profile = RegisterProfile::new(Architecture::Mips32, 4, Endianness::Big);
    let config = UnwindConfig::default();
    let interrupt = Interrupt::new();
    let ctx = ScanContext::new(&memory, &profile, &config, &interrupt);
    let pc = 0x400000 + 4 * (words.len() as u64 - 1);

    c.bench_function("heuristic_start", |b| {
        b.iter(|| find_function_start(&ctx, black_box(pc)))
    });
}

fn bench_backtrace(c: &mut Criterion) {
    // A chain of identical frames: each call site returns into the same function.
    const DEPTH: u64 = 32;
    let mut snap = TargetSnapshot::new(Architecture::Mips32, Endianness::Big, 4);
    snap.memory.load_words(0x400000, FULL_PROLOGUE, Endianness::Big);
    snap.symbols.insert(Symbol::function("recurse", 0x400000, 0x40));

    let top = 0x7fff_0000u64;
    let mut stack = vec![0u32; (DEPTH as usize + 1) * 10];
    for level in 0..DEPTH {
        let sp = top + level * 40;
        let slot = |off: u64| ((sp + off - top) / 4) as usize;
        stack[slot(36)] = if level + 1 == DEPTH { 0 } else { 0x400018 };
        stack[slot(32)] = (sp + 40) as u32;
    }
    snap.memory.load_words(top, &stack, Endianness::Big);
    snap.registers.set(mips::PC, 0x400018);
    snap.registers.set(mips::SP, top);
    snap.registers.set(mips::S8, top);

    let profile = snap.profile();
    let (memory, registers, symbols) = snap.parts();

    c.bench_function("backtrace_32", |b| {
        b.iter(|| {
            let unwinder = Unwinder::new(memory, registers, symbols, &profile);
            black_box(unwinder.backtrace(64))
        })
    });
}

criterion_group!(benches, bench_scan, bench_heuristic, bench_backtrace);
criterion_main!(benches);
