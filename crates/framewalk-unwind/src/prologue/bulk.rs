//! Argument and static register counts for the compact SAVE instruction.
//!
//! The 4-bit `aregs` field of an extended SAVE packs two counts: how many
//! argument registers (from a0 upward) are stored into the caller's
//! argument area, and how many (from a3 downward) are treated as statics
//! and stored below the return address.

use tracing::warn;

/// Decoded meaning of one `aregs` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkSaveEncoding {
    /// Argument registers stored upward from the frame base.
    pub arguments: u8,
    /// Argument registers stored downward as statics.
    pub statics: u8,
}

/// Lookup table indexed by the `aregs` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkSaveTable {
    entries: [Option<BulkSaveEncoding>; 16],
}

const fn enc(arguments: u8, statics: u8) -> Option<BulkSaveEncoding> {
    Some(BulkSaveEncoding { arguments, statics })
}

/// The architectural encoding. Value 15 is reserved.
pub static BULK_SAVE_ENCODINGS: BulkSaveTable = BulkSaveTable::new([
    enc(0, 0),
    enc(0, 1),
    enc(0, 2),
    enc(0, 3),
    enc(1, 0),
    enc(1, 1),
    enc(1, 2),
    enc(1, 3),
    enc(2, 0),
    enc(2, 1),
    enc(2, 2),
    enc(0, 4),
    enc(3, 0),
    enc(3, 1),
    enc(4, 0),
    None,
]);

impl BulkSaveTable {
    /// Builds a table from its sixteen entries.
    pub const fn new(entries: [Option<BulkSaveEncoding>; 16]) -> Self {
        Self { entries }
    }

    /// Returns the counts for `code`. Reserved or out-of-range codes are
    /// reported and treated as saving nothing.
    pub fn lookup(&self, code: u8) -> BulkSaveEncoding {
        match self.entries.get(code as usize).copied().flatten() {
            Some(encoding) => encoding,
            None => {
                warn!(code, "invalid argument register count in save instruction");
                BulkSaveEncoding {
                    arguments: 0,
                    statics: 0,
                }
            }
        }
    }

    /// Iterates over the defined encodings with their codes.
    pub fn iter(&self) -> impl Iterator<Item = (u8, BulkSaveEncoding)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(code, e)| e.map(|e| (code as u8, e)))
    }
}
