use super::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Code,
    Data,
    Extern,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub address: u16,
    /// `None` while the symbol has only been announced by `.entry`.
    pub kind: Option<SymbolKind>,
    pub is_entry: bool,
    pub is_extern: bool,
    /// Line of the definition, or of the `.entry` that announced it.
    pub line: usize,
}

impl Symbol {
    pub fn defined(name: &str, kind: SymbolKind, address: u16, line: usize) -> Self {
        Symbol {
            name: name.to_owned(),
            address,
            kind: Some(kind),
            is_entry: false,
            is_extern: kind == SymbolKind::Extern,
            line,
        }
    }

    pub fn entry(name: &str, line: usize) -> Self {
        Symbol {
            name: name.to_owned(),
            address: 0,
            kind: None,
            is_entry: true,
            is_extern: false,
            line,
        }
    }

    /// Defined in this file, as code or data.
    pub fn is_local(&self) -> bool {
        matches!(self.kind, Some(SymbolKind::Code | SymbolKind::Data))
    }
}

pub type SymbolTable = Table<Symbol>;
