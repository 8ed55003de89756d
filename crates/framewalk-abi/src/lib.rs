//! # framewalk-abi
//!
//! MIPS calling conventions for inferior calls and `finish`.
//!
//! This crate provides:
//! - A static descriptor for each of the six ABI variants ([`ABI_DESCRIPTORS`])
//! - ABI selection from ELF header flags and marker sections ([`select_abi`])
//! - Argument placement for calling a function in the target ([`prepare_call`])
//! - Return-value classification and transfer ([`classify_return`])
//!
//! # Example
//!
//! ```
//! use framewalk_abi::{classify_return, prepare_call, AbiContext, AbiKind, CallRequest, FpuKind, Value, ValueType};
//! use framewalk_core::{mips, Endianness};
//!
//! let ctx = AbiContext::new(AbiKind::O32, FpuKind::Double, Endianness::Big);
//! let call = CallRequest::new(0x400100, 0x400000, 0x7fff_1000)
//!     .arg(Value::from_integer(ValueType::int(4), 42, Endianness::Big));
//!
//! let setup = prepare_call(&ctx, &call).unwrap();
//! assert_eq!(setup.register(mips::A0), Some(&[0, 0, 0, 42][..]));
//! assert_eq!(setup.stack_pointer, 0x7fff_0ff0);
//!
//! let ret = classify_return(&ctx, &ValueType::int(4));
//! assert!(!ret.is_memory());
//! ```

pub mod call;
pub mod descriptor;
pub mod returns;
pub mod select;
pub mod types;

pub use call::{prepare_call, CallRequest, CallSetup, MemoryWrite, RegisterWrite};
pub use descriptor::{
    AbiContext, AbiDescriptor, AbiKind, FloatArgumentRule, FloatStructReturnRule, FpuKind,
    PlacementFlags, RegisterRange, ABI_DESCRIPTORS,
};
pub use returns::{classify_return, extract_return, store_return, ReturnConvention, ReturnLayout, ReturnPiece};
pub use select::{select_abi, ObjectInfo};
pub use types::{Aggregate, Field, TypeCode, Value, ValueType};
