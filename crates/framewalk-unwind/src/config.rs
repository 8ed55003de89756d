//! Unwinder settings.

use serde::{Deserialize, Serialize};

/// Tunable limits for the scanners and heuristics.
///
/// Every field has a default, so a JSON document only needs to name the
/// settings it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnwindConfig {
    /// How far back the function-start heuristic may search, in bytes.
    pub heuristic_fence_post: u64,
    /// Upper bound on the number of prologue bytes examined.
    pub max_prologue_bytes: u64,
    /// Scan limit used by prologue skipping when the function end is unknown.
    pub fallback_limit_bytes: u64,
    /// Maximum number of instructions in an atomic sequence.
    pub atomic_sequence_length: usize,
    /// Lowest address the heuristic will consider as code.
    pub min_text_address: u64,
    /// Truncate sign-extended 32-bit addresses on 64-bit targets.
    pub mask_address: bool,
}

impl Default for UnwindConfig {
    fn default() -> Self {
        Self {
            heuristic_fence_post: 400,
            max_prologue_bytes: 200,
            fallback_limit_bytes: 100,
            atomic_sequence_length: 16,
            min_text_address: 0x40_0000,
            mask_address: false,
        }
    }
}

impl UnwindConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the heuristic fence distance.
    pub fn with_fence_post(mut self, bytes: u64) -> Self {
        self.heuristic_fence_post = bytes;
        self
    }

    /// Set the prologue scan bound.
    pub fn with_max_prologue_bytes(mut self, bytes: u64) -> Self {
        self.max_prologue_bytes = bytes;
        self
    }

    /// Set the prologue skipping fallback bound.
    pub fn with_fallback_limit(mut self, bytes: u64) -> Self {
        self.fallback_limit_bytes = bytes;
        self
    }

    /// Set the maximum atomic sequence length.
    pub fn with_atomic_sequence_length(mut self, instructions: usize) -> Self {
        self.atomic_sequence_length = instructions;
        self
    }

    /// Set the lowest text address.
    pub fn with_min_text_address(mut self, address: u64) -> Self {
        self.min_text_address = address;
        self
    }

    /// Enable or disable 32-bit address masking.
    pub fn with_mask_address(mut self, mask: bool) -> Self {
        self.mask_address = mask;
        self
    }
}
