//! Where return values live and how to move them.
//!
//! [`classify_return`] decides whether a value comes back in registers and,
//! if so, which byte range of which register holds each part of it.
//! [`extract_return`] and [`store_return`] then read or write the value
//! through the register profile's pseudo registers.

use framewalk_core::{mips, CookedRegister, Endianness, Error, RegisterAccess, RegisterProfile, Result};
use serde::Serialize;
use tracing::trace;

use crate::{AbiContext, AbiKind, FloatStructReturnRule, FpuKind, ValueType};

/// One register's share of a return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReturnPiece {
    /// Pseudo register holding the bytes.
    pub register: CookedRegister,
    /// Number of bytes.
    pub length: usize,
    /// Offset of the bytes within the register.
    pub register_offset: usize,
    /// Offset of the bytes within the value.
    pub buffer_offset: usize,
}

/// How a register-returned value is spread over registers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReturnLayout {
    pub pieces: Vec<ReturnPiece>,
}

impl ReturnLayout {
    /// Size of the value covered by the pieces.
    pub fn size(&self) -> usize {
        self.pieces
            .iter()
            .map(|p| p.buffer_offset + p.length)
            .max()
            .unwrap_or(0)
    }

    pub fn registers(&self) -> impl Iterator<Item = CookedRegister> + '_ {
        self.pieces.iter().map(|p| p.register)
    }
}

/// Where a function leaves its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReturnConvention {
    /// In registers, as laid out.
    Register(ReturnLayout),
    /// In a caller-supplied buffer whose address is passed as a hidden
    /// first argument.
    Memory,
}

impl ReturnConvention {
    pub fn layout(&self) -> Option<&ReturnLayout> {
        match self {
            Self::Register(layout) => Some(layout),
            Self::Memory => None,
        }
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

#[derive(Clone, Copy)]
enum Justify {
    /// Least significant end in target byte order.
    ByteOrder,
    /// Lowest register bytes regardless of byte order.
    Left,
}

struct LayoutBuilder<'c> {
    ctx: &'c AbiContext,
    pieces: Vec<ReturnPiece>,
}

impl<'c> LayoutBuilder<'c> {
    fn new(ctx: &'c AbiContext) -> Self {
        Self {
            ctx,
            pieces: Vec::new(),
        }
    }

    fn register_size(&self, raw: u16) -> usize {
        if (mips::FP0..mips::FP0 + 32).contains(&raw) {
            self.ctx.float_register_size
        } else {
            self.ctx.register_size()
        }
    }

    fn piece(&mut self, raw: u16, length: usize, buffer_offset: usize, justify: Justify) {
        let register_offset = match (justify, self.ctx.endianness) {
            (Justify::ByteOrder, Endianness::Big) => self.register_size(raw).saturating_sub(length),
            (Justify::ByteOrder, Endianness::Little) | (Justify::Left, _) => 0,
        };
        self.pieces.push(ReturnPiece {
            register: CookedRegister(raw + mips::NUM_RAW),
            length,
            register_offset,
            buffer_offset,
        });
    }

    /// Spreads `size` bytes over consecutive registers from `first`.
    fn spread(&mut self, first: u16, size: usize, step: usize, justify: Justify) {
        let mut offset = 0;
        let mut raw = first;
        while offset < size {
            let length = step.min(size - offset);
            self.piece(raw, length, offset, justify);
            offset += step;
            raw += 1;
        }
    }

    fn finish(self) -> ReturnConvention {
        ReturnConvention::Register(ReturnLayout { pieces: self.pieces })
    }
}

/// Decides how a value of type `ty` is returned.
pub fn classify_return(ctx: &AbiContext, ty: &ValueType) -> ReturnConvention {
    let d = ctx.descriptor();
    let size = ty.size();
    let fpu = ctx.fpu != FpuKind::None;
    let regsize = ctx.register_size();
    let f0 = mips::FP0;
    let mut b = LayoutBuilder::new(ctx);

    match ctx.kind {
        AbiKind::O32 => {
            if ty.is_composite() || size > 8 {
                return ReturnConvention::Memory;
            }
            match (ty.is_float() && fpu, size) {
                (true, 4) => b.piece(f0, 4, 0, Justify::ByteOrder),
                // most significant word in f1
                (true, 8) => match ctx.endianness {
                    Endianness::Little => {
                        b.piece(f0, 4, 0, Justify::ByteOrder);
                        b.piece(f0 + 1, 4, 4, Justify::ByteOrder);
                    }
                    Endianness::Big => {
                        b.piece(f0 + 1, 4, 0, Justify::ByteOrder);
                        b.piece(f0, 4, 4, Justify::ByteOrder);
                    }
                },
                _ => b.spread(mips::V0, size, 4, Justify::ByteOrder),
            }
        }
        AbiKind::O64 => {
            if ty.is_composite() || size > 8 {
                return ReturnConvention::Memory;
            }
            if ty.is_float() && fpu {
                b.piece(f0, size, 0, Justify::ByteOrder);
            } else {
                b.spread(mips::V0, size, 8, Justify::ByteOrder);
            }
        }
        AbiKind::N32 | AbiKind::N64 => {
            if size > d.struct_return_threshold_bytes {
                return ReturnConvention::Memory;
            }
            let float_struct = fpu
                && d.float_struct_return_rule == FloatStructReturnRule::OneOrTwoFloatFields
                && ty.is_float_pair_struct();
            if ty.is_float() && fpu && size == 16 {
                // memory order: the lower eight bytes in f0
                b.piece(f0, 8, 0, Justify::ByteOrder);
                b.piece(f0 + 2, 8, 8, Justify::ByteOrder);
            } else if ty.is_float() && fpu {
                b.piece(f0, size, 0, Justify::ByteOrder);
            } else if float_struct {
                for (i, field) in ty.fields().iter().enumerate() {
                    let raw = f0 + 2 * i as u16;
                    if field.ty.size() == 16 {
                        b.piece(raw, 8, field.offset, Justify::ByteOrder);
                        b.piece(raw + 1, 8, field.offset + 8, Justify::ByteOrder);
                    } else {
                        b.piece(raw, field.ty.size(), field.offset, Justify::ByteOrder);
                    }
                }
            } else if ty.is_composite() {
                b.spread(mips::V0, size, regsize, Justify::Left);
            } else {
                b.spread(mips::V0, size, regsize, Justify::ByteOrder);
            }
        }
        AbiKind::Eabi32 | AbiKind::Eabi64 => {
            if size > d.struct_return_threshold_bytes {
                return ReturnConvention::Memory;
            }
            let in_float = fpu
                && (ty.is_float()
                    || (d.float_struct_return_rule == FloatStructReturnRule::SingleFloatField
                        && ty.is_single_float_aggregate()));
            let first = if in_float { f0 } else { mips::V0 };
            b.spread(first, size, regsize, Justify::ByteOrder);
        }
    }
    let convention = b.finish();
    trace!(abi = %ctx.kind, size, ?convention, "return convention");
    convention
}

/// Reads a register-returned value.
pub fn extract_return(layout: &ReturnLayout, profile: &RegisterProfile, regs: &dyn RegisterAccess) -> Result<Vec<u8>> {
    let mut out = vec![0; layout.size()];
    for piece in &layout.pieces {
        let bytes = profile.read_cooked(regs, piece.register)?;
        let src = bytes
            .get(piece.register_offset..piece.register_offset + piece.length)
            .ok_or(Error::InvalidRegister(piece.register.0))?;
        out[piece.buffer_offset..piece.buffer_offset + piece.length].copy_from_slice(src);
    }
    Ok(out)
}

/// Writes a value where the callee would have returned it.
///
/// Register bytes outside the pieces keep their current contents; an
/// unavailable register starts out as zero. A short `bytes` is zero-filled.
pub fn store_return(
    layout: &ReturnLayout,
    profile: &RegisterProfile,
    regs: &mut dyn RegisterAccess,
    bytes: &[u8],
) -> Result<()> {
    let mut value = bytes.to_vec();
    value.resize(value.len().max(layout.size()), 0);

    for piece in &layout.pieces {
        let size = profile.size(piece.register)?;
        let mut current = match profile.read_cooked(regs, piece.register) {
            Ok(current) => current,
            Err(Error::Unavailable { .. }) => vec![0; size],
            Err(err) => return Err(err),
        };
        current.resize(size, 0);
        let dst = current
            .get_mut(piece.register_offset..piece.register_offset + piece.length)
            .ok_or(Error::InvalidRegister(piece.register.0))?;
        dst.copy_from_slice(&value[piece.buffer_offset..piece.buffer_offset + piece.length]);
        profile.write_cooked(regs, piece.register, &current)?;
    }
    Ok(())
}
