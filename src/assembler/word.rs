//! 10-bit machine words and their base-4 rendering.
//!
//! Bit 0 is the least significant bit. Every word carries its relocation
//! class in bits 0-1; the remaining eight bits depend on what the word holds.

use std::fmt;

use modular_bitfield::prelude::*;

pub const WORD_BITS: u32 = 10;
pub const WORD_MASK: u16 = (1 << WORD_BITS) - 1;

const GLYPHS: [char; 4] = ['a', 'b', 'c', 'd'];

/// Relocation class stored in bits 0-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Are {
    Absolute = 0,
    External = 1,
    Relocatable = 2,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Word(u16);

impl Word {
    pub const ZERO: Word = Word(0);

    /// Keeps the low ten bits, so negative values wrap to two's complement.
    pub fn new(raw: i32) -> Self {
        Word((raw as u16) & WORD_MASK)
    }

    #[cfg(test)]
    pub fn raw(self) -> u16 {
        self.0
    }

    /// Bits `lo..=hi`, shifted down to bit 0.
    #[cfg(test)]
    pub fn field(self, lo: u32, hi: u32) -> u16 {
        debug_assert!(lo <= hi && hi < WORD_BITS);
        let width = hi - lo + 1;
        (self.0 >> lo) & ((1 << width) - 1)
    }

    /// Overwrites bits `lo..=hi` with the low bits of `value`.
    pub fn set_field(&mut self, lo: u32, hi: u32, value: u16) {
        debug_assert!(lo <= hi && hi < WORD_BITS);
        let mask = ((1u16 << (hi - lo + 1)) - 1) << lo;
        self.0 = (self.0 & !mask) | ((value << lo) & mask);
    }

    /// Five base-4 glyphs, most significant first.
    pub fn to_base4(self) -> String {
        base4(self.0, 5)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base4())
    }
}

/// Renders `value` as exactly `digits` base-4 glyphs.
pub fn base4(value: u16, digits: usize) -> String {
    (0..digits)
        .rev()
        .map(|i| GLYPHS[((value >> (2 * i)) & 0b11) as usize])
        .collect()
}

/// Renders `value` with as few glyphs as possible (at least one).
pub fn base4_min(value: u16) -> String {
    let mut digits = 1;
    while digits < 8 && value >> (2 * digits) != 0 {
        digits += 1;
    }
    base4(value, digits)
}

/// Four-glyph base-4 address.
pub fn address(value: u16) -> String {
    base4(value, 4)
}

/// First word of every instruction.
#[bitfield]
#[derive(Clone, Copy)]
pub struct OpcodeWord {
    #[skip(getters)]
    pub are: B2,
    #[skip(getters)]
    pub dest: B2,
    #[skip(getters)]
    pub source: B2,
    #[skip(getters)]
    pub opcode: B4,
    #[skip]
    __: B6,
}

/// Immediate values and resolved label addresses.
#[bitfield]
#[derive(Clone, Copy)]
pub struct OperandWord {
    #[skip(getters)]
    pub are: B2,
    #[skip(getters)]
    pub value: B8,
    #[skip]
    __: B6,
}

/// Register numbers, as well as the row/column registers of a matrix access.
#[bitfield]
#[derive(Clone, Copy)]
pub struct RegisterWord {
    #[skip(getters)]
    pub are: B2,
    #[skip(getters)]
    pub dest: B4,
    #[skip(getters)]
    pub source: B4,
    #[skip]
    __: B6,
}

macro_rules! word_layout {
    ($($layout:ident),* $(,)?) => {
        $(
            impl From<$layout> for Word {
                fn from(layout: $layout) -> Self {
                    Word(u16::from_le_bytes(layout.into_bytes()) & WORD_MASK)
                }
            }
        )*
    };
}

word_layout!(OpcodeWord, OperandWord, RegisterWord);
