//! Function symbols.

use crate::SymbolLookup;

/// A function symbol known to the debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Symbol {
    /// Symbol name (may be empty).
    pub name: String,
    /// Entry address, without the compact-mode bit.
    pub address: u64,
    /// Size of the function in bytes (0 if unknown).
    pub size: u64,
    /// Whether the function is compact (MIPS16) code.
    #[cfg_attr(feature = "serde", serde(default))]
    pub compact: bool,
    /// First address after the prologue, from line information.
    #[cfg_attr(feature = "serde", serde(default))]
    pub post_prologue: Option<u64>,
}

impl Symbol {
    /// Creates a function symbol.
    pub fn function(name: impl Into<String>, address: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            address,
            size,
            compact: false,
            post_prologue: None,
        }
    }

    /// Marks the function as compact code.
    pub fn with_compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Sets the post-prologue address.
    pub fn with_post_prologue(mut self, pc: u64) -> Self {
        self.post_prologue = Some(pc);
        self
    }

    /// Returns the end address (exclusive).
    pub fn end(&self) -> u64 {
        self.address + self.size
    }

    /// Returns true if `pc` is inside the function.
    pub fn contains(&self, pc: u64) -> bool {
        let pc = pc & !1;
        pc >= self.address && (pc < self.end() || (self.size == 0 && pc == self.address))
    }
}

/// Function symbols sorted by address.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "Vec<Symbol>", into = "Vec<Symbol>"))]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a symbol, keeping the table sorted.
    pub fn insert(&mut self, symbol: Symbol) {
        let pos = self
            .symbols
            .partition_point(|s| s.address <= symbol.address);
        self.symbols.insert(pos, symbol);
    }

    /// Finds the function containing `pc`.
    pub fn lookup(&self, pc: u64) -> Option<&Symbol> {
        let pc = pc & !1;
        let idx = self.symbols.partition_point(|s| s.address <= pc);
        self.symbols[..idx].iter().rev().find(|s| s.contains(pc))
    }

    /// Finds a function by name.
    pub fn by_name(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    /// Returns all symbols.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }
}

impl FromIterator<Symbol> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = Symbol>>(iter: I) -> Self {
        let mut table = Self::new();
        for sym in iter {
            table.insert(sym);
        }
        table
    }
}

impl From<Vec<Symbol>> for SymbolTable {
    fn from(symbols: Vec<Symbol>) -> Self {
        symbols.into_iter().collect()
    }
}

impl From<SymbolTable> for Vec<Symbol> {
    fn from(table: SymbolTable) -> Self {
        table.symbols
    }
}

impl SymbolLookup for SymbolTable {
    fn function_bounds(&self, pc: u64) -> Option<(u64, u64)> {
        self.lookup(pc)
            .filter(|s| s.size > 0)
            .map(|s| (s.address, s.end()))
    }

    fn post_prologue_hint(&self, start: u64) -> Option<u64> {
        self.lookup(start)
            .filter(|s| s.address == start & !1)
            .and_then(|s| s.post_prologue)
    }

    fn is_compact_function(&self, pc: u64) -> bool {
        self.lookup(pc).is_some_and(|s| s.compact)
    }

    fn function_name(&self, pc: u64) -> Option<&str> {
        self.lookup(pc).map(|s| s.name.as_str())
    }
}
