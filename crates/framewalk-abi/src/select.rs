//! Choosing the ABI of a program image.

use framewalk_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::AbiKind;

/// ABI field of the ELF header flags.
pub const EF_MIPS_ABI: u32 = 0x0000_f000;
/// New 32-bit ABI flag, used by N32 objects.
pub const EF_MIPS_ABI2: u32 = 0x0000_0020;
pub const E_MIPS_ABI_O32: u32 = 0x0000_1000;
pub const E_MIPS_ABI_O64: u32 = 0x0000_2000;
pub const E_MIPS_ABI_EABI32: u32 = 0x0000_3000;
pub const E_MIPS_ABI_EABI64: u32 = 0x0000_4000;

/// What the selector needs to know about an object file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// The object is ELFCLASS64.
    pub elf_class64: bool,
    /// `e_flags` from the ELF header.
    pub e_flags: u32,
    /// Section names, in file order.
    #[serde(default)]
    pub section_names: Vec<String>,
}

fn from_flags(e_flags: u32) -> Option<AbiKind> {
    match e_flags & EF_MIPS_ABI {
        E_MIPS_ABI_O32 => Some(AbiKind::O32),
        E_MIPS_ABI_O64 => Some(AbiKind::O64),
        E_MIPS_ABI_EABI32 => Some(AbiKind::Eabi32),
        E_MIPS_ABI_EABI64 => Some(AbiKind::Eabi64),
        _ if e_flags & EF_MIPS_ABI2 != 0 => Some(AbiKind::N32),
        _ => None,
    }
}

/// GCC names the ABI in an empty `.mdebug.<abi>` section.
fn from_sections(names: &[String]) -> Option<AbiKind> {
    for name in names {
        let Some(suffix) = name.strip_prefix(".mdebug.") else {
            continue;
        };
        match suffix {
            "abi32" => return Some(AbiKind::O32),
            "abiN32" => return Some(AbiKind::N32),
            "abi64" => return Some(AbiKind::N64),
            "abiO64" => return Some(AbiKind::O64),
            "eabi32" => return Some(AbiKind::Eabi32),
            "eabi64" => return Some(AbiKind::Eabi64),
            other => warn!(abi = other, "unsupported ABI section"),
        }
    }
    None
}

/// Picks the ABI for an object.
///
/// Header flags take precedence over `.mdebug` marker sections. An ELF64
/// object with neither is N64. Anything else is an error.
pub fn select_abi(info: &ObjectInfo) -> Result<AbiKind> {
    let kind = from_flags(info.e_flags)
        .or_else(|| from_sections(&info.section_names))
        .or(info.elf_class64.then_some(AbiKind::N64))
        .ok_or_else(|| {
            Error::BadAbi(format!(
                "e_flags {:#x} name no ABI and no .mdebug section is present",
                info.e_flags
            ))
        })?;
    debug!(abi = %kind, e_flags = format_args!("{:#x}", info.e_flags), "selected ABI");
    Ok(kind)
}
