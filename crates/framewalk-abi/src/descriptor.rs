//! The MIPS ABI variants and their calling-convention parameters.
//!
//! # Variants
//!
//! ## O32
//! - Arguments: a0-a3 (4-byte registers), f12-f15 for floats
//! - Caller reserves a home slot on the stack for every argument word
//! - Doubles start on even registers; once an integer register is used,
//!   later floats stay out of float registers
//! - Every composite is returned in memory
//!
//! ## O64
//! - O32 rules with 8-byte registers and no double alignment
//!
//! ## N32 / N64
//! - Arguments: a0-a7 (8-byte registers), f12-f19, advanced in lockstep
//! - Aligned doubles inside structs also travel in float registers
//! - Values up to 16 bytes are returned in v0/v1 or f0/f2
//!
//! ## EABI32 / EABI64
//! - Arguments: a0-a7, f12-f19, allocated independently
//! - Aggregates wider than a register are passed by reference
//! - Values up to two registers wide are returned in registers

use framewalk_core::{mips, Architecture, Endianness, RawRegister, RegisterProfile};
use serde::{Deserialize, Serialize};

/// ABI variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbiKind {
    O32,
    O64,
    N32,
    N64,
    Eabi32,
    Eabi64,
}

impl AbiKind {
    /// Every variant, in table order.
    pub const ALL: [AbiKind; 6] = [
        AbiKind::O32,
        AbiKind::O64,
        AbiKind::N32,
        AbiKind::N64,
        AbiKind::Eabi32,
        AbiKind::Eabi64,
    ];

    /// Returns the static descriptor for this variant.
    pub fn descriptor(self) -> &'static AbiDescriptor {
        let index = match self {
            Self::O32 => 0,
            Self::O64 => 1,
            Self::N32 => 2,
            Self::N64 => 3,
            Self::Eabi32 => 4,
            Self::Eabi64 => 5,
        };
        &ABI_DESCRIPTORS[index]
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// Size of an integer argument register in bytes.
    pub fn register_size(self) -> usize {
        self.descriptor().register_byte_size
    }
}

impl std::fmt::Display for AbiKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Floating point unit present on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FpuKind {
    /// Soft float: floats travel in integer registers.
    None,
    /// Single precision only.
    Single,
    /// Single and double precision.
    #[default]
    Double,
}

/// Which arguments may travel in float registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatArgumentRule {
    /// Only float scalars.
    Scalar,
    /// Float scalars and structs or unions whose only member is a float.
    ScalarOrSingleFieldAggregate,
}

/// Which aggregates are returned in float registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatStructReturnRule {
    /// Aggregates never use float registers.
    Never,
    /// Structs of one or two float members, in f0 and f2.
    OneOrTwoFloatFields,
    /// Structs or unions of a single float member, from f0.
    SingleFloatField,
}

/// An inclusive range of raw register numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RegisterRange {
    pub first: u16,
    pub last: u16,
}

impl RegisterRange {
    pub const fn new(first: u16, last: u16) -> Self {
        Self { first, last }
    }

    pub fn contains(&self, raw: u16) -> bool {
        (self.first..=self.last).contains(&raw)
    }

    /// Number of registers; a range with `last < first` holds none.
    pub fn len(&self) -> usize {
        (usize::from(self.last) + 1).saturating_sub(usize::from(self.first))
    }

    pub fn is_empty(&self) -> bool {
        self.last < self.first
    }

    pub fn iter(&self) -> impl Iterator<Item = RawRegister> {
        (self.first..=self.last).map(RawRegister)
    }
}

/// Argument placement switches that tell the variants apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PlacementFlags {
    /// Float arguments are copied into the matching integer register.
    pub shadow_float_in_integer: bool,
    /// Stack space is reserved for register arguments too.
    pub reserve_home_slots: bool,
    /// Float arguments start on an even float register.
    pub even_float_registers: bool,
    /// Doubles and double-led aggregates start on an even integer register.
    pub double_align_aggregates: bool,
    /// Structs and unions wider than a register are passed by address.
    pub large_aggregates_by_reference: bool,
    /// Integer and float argument registers advance together.
    pub lockstep_registers: bool,
    /// Using an integer register ends float register allocation.
    pub integer_blocks_float: bool,
    /// Aligned doubles inside structs are also placed in float registers.
    pub float_chunks_in_aggregates: bool,
}

/// The calling-convention parameters of one ABI variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AbiDescriptor {
    pub kind: AbiKind,
    pub name: &'static str,
    pub argument_registers: RegisterRange,
    pub float_argument_registers: RegisterRange,
    /// Size of an integer argument register in bytes.
    pub register_byte_size: usize,
    pub stack_alignment: u64,
    /// Largest value returned in registers; zero means every composite is
    /// returned in memory.
    pub struct_return_threshold_bytes: usize,
    pub float_argument_rule: FloatArgumentRule,
    pub float_struct_return_rule: FloatStructReturnRule,
    pub flags: PlacementFlags,
}

const FA0: u16 = mips::FP0 + 12;

const O_FLAGS: PlacementFlags = PlacementFlags {
    shadow_float_in_integer: true,
    reserve_home_slots: true,
    even_float_registers: true,
    double_align_aggregates: true,
    large_aggregates_by_reference: false,
    lockstep_registers: false,
    integer_blocks_float: true,
    float_chunks_in_aggregates: false,
};

const N_FLAGS: PlacementFlags = PlacementFlags {
    shadow_float_in_integer: true,
    reserve_home_slots: false,
    even_float_registers: false,
    double_align_aggregates: false,
    large_aggregates_by_reference: false,
    lockstep_registers: true,
    integer_blocks_float: false,
    float_chunks_in_aggregates: true,
};

const EABI_FLAGS: PlacementFlags = PlacementFlags {
    shadow_float_in_integer: false,
    reserve_home_slots: false,
    even_float_registers: false,
    double_align_aggregates: false,
    large_aggregates_by_reference: true,
    lockstep_registers: false,
    integer_blocks_float: false,
    float_chunks_in_aggregates: false,
};

/// The six supported variants, indexed by [`AbiKind::descriptor`].
pub static ABI_DESCRIPTORS: [AbiDescriptor; 6] = [
    AbiDescriptor {
        kind: AbiKind::O32,
        name: "o32",
        argument_registers: RegisterRange::new(mips::A0, mips::A3),
        float_argument_registers: RegisterRange::new(FA0, FA0 + 3),
        register_byte_size: 4,
        stack_alignment: 16,
        struct_return_threshold_bytes: 0,
        float_argument_rule: FloatArgumentRule::Scalar,
        float_struct_return_rule: FloatStructReturnRule::Never,
        flags: O_FLAGS,
    },
    AbiDescriptor {
        kind: AbiKind::O64,
        name: "o64",
        argument_registers: RegisterRange::new(mips::A0, mips::A3),
        float_argument_registers: RegisterRange::new(FA0, FA0 + 3),
        register_byte_size: 8,
        stack_alignment: 16,
        struct_return_threshold_bytes: 0,
        float_argument_rule: FloatArgumentRule::Scalar,
        float_struct_return_rule: FloatStructReturnRule::Never,
        flags: PlacementFlags {
            even_float_registers: false,
            double_align_aggregates: false,
            ..O_FLAGS
        },
    },
    AbiDescriptor {
        kind: AbiKind::N32,
        name: "n32",
        argument_registers: RegisterRange::new(mips::A0, mips::A0 + 7),
        float_argument_registers: RegisterRange::new(FA0, FA0 + 7),
        register_byte_size: 8,
        stack_alignment: 16,
        struct_return_threshold_bytes: 16,
        float_argument_rule: FloatArgumentRule::Scalar,
        float_struct_return_rule: FloatStructReturnRule::OneOrTwoFloatFields,
        flags: N_FLAGS,
    },
    AbiDescriptor {
        kind: AbiKind::N64,
        name: "n64",
        argument_registers: RegisterRange::new(mips::A0, mips::A0 + 7),
        float_argument_registers: RegisterRange::new(FA0, FA0 + 7),
        register_byte_size: 8,
        stack_alignment: 16,
        struct_return_threshold_bytes: 16,
        float_argument_rule: FloatArgumentRule::Scalar,
        float_struct_return_rule: FloatStructReturnRule::OneOrTwoFloatFields,
        flags: N_FLAGS,
    },
    AbiDescriptor {
        kind: AbiKind::Eabi32,
        name: "eabi32",
        argument_registers: RegisterRange::new(mips::A0, mips::A0 + 7),
        float_argument_registers: RegisterRange::new(FA0, FA0 + 7),
        register_byte_size: 4,
        stack_alignment: 16,
        struct_return_threshold_bytes: 8,
        float_argument_rule: FloatArgumentRule::ScalarOrSingleFieldAggregate,
        float_struct_return_rule: FloatStructReturnRule::SingleFloatField,
        flags: PlacementFlags {
            even_float_registers: true,
            ..EABI_FLAGS
        },
    },
    AbiDescriptor {
        kind: AbiKind::Eabi64,
        name: "eabi64",
        argument_registers: RegisterRange::new(mips::A0, mips::A0 + 7),
        float_argument_registers: RegisterRange::new(FA0, FA0 + 7),
        register_byte_size: 8,
        stack_alignment: 16,
        struct_return_threshold_bytes: 16,
        float_argument_rule: FloatArgumentRule::ScalarOrSingleFieldAggregate,
        float_struct_return_rule: FloatStructReturnRule::SingleFloatField,
        flags: EABI_FLAGS,
    },
];

/// The ABI in effect for one program image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiContext {
    pub kind: AbiKind,
    pub fpu: FpuKind,
    pub endianness: Endianness,
    /// Width of a float register in bytes.
    pub float_register_size: usize,
}

impl AbiContext {
    /// Creates a context whose float registers match the ABI's register size.
    pub fn new(kind: AbiKind, fpu: FpuKind, endianness: Endianness) -> Self {
        Self {
            kind,
            fpu,
            endianness,
            float_register_size: kind.register_size(),
        }
    }

    /// Creates a context for a register profile; float registers take the
    /// ISA width.
    pub fn for_profile(kind: AbiKind, fpu: FpuKind, profile: &RegisterProfile) -> Self {
        Self {
            kind,
            fpu,
            endianness: profile.endianness(),
            float_register_size: profile.architecture().register_size(),
        }
    }

    pub fn descriptor(&self) -> &'static AbiDescriptor {
        self.kind.descriptor()
    }

    pub fn register_size(&self) -> usize {
        self.kind.register_size()
    }

    pub fn has_fpu(&self) -> bool {
        self.fpu != FpuKind::None
    }

    /// Architecture whose registers can hold this ABI's arguments.
    pub fn minimum_architecture(&self) -> Architecture {
        match self.register_size().max(self.float_register_size) {
            4 => Architecture::Mips32,
            _ => Architecture::Mips64,
        }
    }
}
