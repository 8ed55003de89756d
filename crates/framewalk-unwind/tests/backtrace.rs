//! Unwinding a captured snapshot.
//!
//! The fixture stops in a full-width leaf called from a compact helper,
//! which was in turn called from `main` through `jalx`.

use framewalk_core::{mips, Error, RawRegister};
use framewalk_target::TargetSnapshot;
use framewalk_unwind::{BacktraceStop, SavedLocation, UnwindConfig, Unwinder};

const FIXTURE: &str = include_str!("fixtures/mixed_mode.json");

const LEAF_SP: u64 = 0x7fff_0f00;
const HELPER_SP: u64 = LEAF_SP + 40;
const MAIN_SP: u64 = HELPER_SP + 32;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn snapshot() -> TargetSnapshot {
    TargetSnapshot::from_json(FIXTURE).expect("fixture parses")
}

#[test]
fn backtrace_crosses_mode_switches() {
    init_tracing();
    let snap = snapshot();
    let profile = snap.profile();
    let (memory, registers, symbols) = snap.parts();
    let unwinder = Unwinder::new(memory, registers, symbols, &profile);

    let bt = unwinder.backtrace(32);
    assert_eq!(bt.stop, BacktraceStop::Outermost);

    let summary: Vec<_> = bt.frames.iter().map(|f| (f.pc, f.sp, f.base, f.complete)).collect();
    assert_eq!(
        summary,
        vec![
            (0x400214, LEAF_SP, HELPER_SP, true),
            (0x400109, HELPER_SP, MAIN_SP, true),
            (0x400010, MAIN_SP, MAIN_SP + 32, true),
        ]
    );
}

#[test]
fn registers_resolve_through_the_chain() {
    let snap = snapshot();
    let profile = snap.profile();
    let (memory, registers, symbols) = snap.parts();
    let unwinder = Unwinder::new(memory, registers, symbols, &profile);

    let leaf = unwinder.innermost().unwrap();
    let helper = unwinder.caller(&leaf).unwrap().unwrap();
    let main = unwinder.caller(&helper).unwrap().unwrap();
    assert_eq!(unwinder.caller(&main).unwrap(), None);

    let s0 = RawRegister(mips::S0);
    assert_eq!(unwinder.register_value(&leaf, s0).unwrap(), 0x33);
    assert_eq!(unwinder.register_value(&helper, s0).unwrap(), 0x11);
    assert_eq!(unwinder.register_value(&main, s0).unwrap(), 0x22);

    // s8 is only saved by the leaf, so main sees the same value as helper
    let s8 = RawRegister(mips::S8);
    assert_eq!(unwinder.register_value(&helper, s8).unwrap(), 0x7fff_0ff0);
    assert_eq!(unwinder.register_value(&main, s8).unwrap(), 0x7fff_0ff0);

    // a3 was never captured
    assert_eq!(
        unwinder.register_value(&main, RawRegister(mips::A3)),
        Err(Error::unavailable(mips::A3))
    );
}

#[test]
fn helper_frame_uses_bulk_save_slots() {
    let snap = snapshot();
    let profile = snap.profile();
    let (memory, registers, symbols) = snap.parts();
    let unwinder = Unwinder::new(memory, registers, symbols, &profile);

    let leaf = unwinder.innermost().unwrap();
    let helper = unwinder.caller(&leaf).unwrap().unwrap();
    let d = unwinder.frame_descriptor(&helper).unwrap();
    assert_eq!(d.entry_pc(), 0x400101);
    assert_eq!(d.frame_size(), 32);
    assert_eq!(
        d.register_location(RawRegister(mips::RA)),
        SavedLocation::SavedInMemory(HELPER_SP + 28)
    );
    assert_eq!(
        d.register_location(RawRegister(mips::S0)),
        SavedLocation::SavedInMemory(HELPER_SP + 24)
    );
}

#[test]
fn leaf_frame_uses_frame_pointer() {
    let snap = snapshot();
    let profile = snap.profile();
    let (memory, registers, symbols) = snap.parts();
    let unwinder = Unwinder::new(memory, registers, symbols, &profile);

    let leaf = unwinder.innermost().unwrap();
    let d = unwinder.frame_descriptor(&leaf).unwrap();
    assert_eq!(d.frame_register(), RawRegister(mips::S8));
    assert_eq!(d.base_address(), HELPER_SP);
    assert_eq!(d.saved_count(), 3);
}

#[test]
fn resume_forgets_frames() {
    let mut snap = snapshot();
    let profile = snap.profile();
    {
        let (memory, registers, symbols) = snap.parts();
        let unwinder = Unwinder::new(memory, registers, symbols, &profile);
        assert_eq!(unwinder.backtrace(32).frames.len(), 3);
        unwinder.resume();
        assert_eq!(unwinder.backtrace(32).frames.len(), 3);
        assert_eq!(unwinder.cache_stats().invalidations, 1);
    }

    // the thread moved into main's prologue: only one frame left
    snap.registers.set(mips::PC, 0x400004);
    snap.registers.set(mips::SP, MAIN_SP);
    snap.registers.set(mips::RA, 0);
    let (memory, registers, symbols) = snap.parts();
    let unwinder = Unwinder::new(memory, registers, symbols, &profile);
    let bt = unwinder.backtrace(32);
    assert_eq!(bt.frames.len(), 1);
    assert_eq!(bt.frames[0].base, MAIN_SP + 32);
}

#[test]
fn fence_config_round_trips_through_json() {
    let config: UnwindConfig = serde_json::from_str(r#"{"heuristic_fence_post": 64, "mask_address": true}"#).unwrap();
    let snap = snapshot();
    let profile = snap.profile();
    let (memory, registers, symbols) = snap.parts();
    let unwinder = Unwinder::new(memory, registers, symbols, &profile).with_config(config);
    assert_eq!(unwinder.config().heuristic_fence_post, 64);
    assert_eq!(unwinder.backtrace(32).frames.len(), 3);
}
