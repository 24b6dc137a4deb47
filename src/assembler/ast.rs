//! In-memory form of parsed statements.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use lazy_regex::regex_is_match;
use phf::{phf_map, Map};

use crate::diagnostic::Code;

pub const MACRO_START: &str = "mcro";
pub const MACRO_END: &str = "mcroend";

pub const MAX_LABEL_LEN: usize = 31;

static MNEMONICS: Map<&'static str, Opcode> = phf_map! {
    "mov" => Opcode::Mov,
    "cmp" => Opcode::Cmp,
    "add" => Opcode::Add,
    "sub" => Opcode::Sub,
    "lea" => Opcode::Lea,
    "clr" => Opcode::Clr,
    "not" => Opcode::Not,
    "inc" => Opcode::Inc,
    "dec" => Opcode::Dec,
    "jmp" => Opcode::Jmp,
    "bne" => Opcode::Bne,
    "red" => Opcode::Red,
    "prn" => Opcode::Prn,
    "jsr" => Opcode::Jsr,
    "rts" => Opcode::Rts,
    "stop" => Opcode::Stop,
};

const DIRECTIVE_NAMES: [&str; 5] = ["data", "string", "mat", "entry", "extern"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Mov = 0,
    Cmp = 1,
    Add = 2,
    Sub = 3,
    Lea = 4,
    Clr = 5,
    Not = 6,
    Inc = 7,
    Dec = 8,
    Jmp = 9,
    Bne = 10,
    Red = 11,
    Prn = 12,
    Jsr = 13,
    Rts = 14,
    Stop = 15,
}

impl Opcode {
    pub const ALL: [Opcode; 16] = [
        Opcode::Mov,
        Opcode::Cmp,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Lea,
        Opcode::Clr,
        Opcode::Not,
        Opcode::Inc,
        Opcode::Dec,
        Opcode::Jmp,
        Opcode::Bne,
        Opcode::Red,
        Opcode::Prn,
        Opcode::Jsr,
        Opcode::Rts,
        Opcode::Stop,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Mov => "mov",
            Opcode::Cmp => "cmp",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Lea => "lea",
            Opcode::Clr => "clr",
            Opcode::Not => "not",
            Opcode::Inc => "inc",
            Opcode::Dec => "dec",
            Opcode::Jmp => "jmp",
            Opcode::Bne => "bne",
            Opcode::Red => "red",
            Opcode::Prn => "prn",
            Opcode::Jsr => "jsr",
            Opcode::Rts => "rts",
            Opcode::Stop => "stop",
        }
    }

    /// Number of operands the instruction takes.
    pub fn arity(self) -> usize {
        use Opcode as O;
        match self {
            O::Mov | O::Cmp | O::Add | O::Sub | O::Lea => 2,
            O::Rts | O::Stop => 0,
            _ => 1,
        }
    }

    /// Addressing modes accepted as `(source, destination)`.
    ///
    /// A single operand always sits in the destination slot.
    pub fn legal_modes(self) -> (Modes, Modes) {
        match self.arity() {
            2 => (Modes::all(), Modes::DESTINATION),
            1 => (Modes::empty(), Modes::DESTINATION),
            _ => (Modes::empty(), Modes::empty()),
        }
    }
}

impl FromStr for Opcode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MNEMONICS.get(s).copied().ok_or(())
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modes: u8 {
        const IMMEDIATE = 1 << 0;
        const DIRECT = 1 << 1;
        const REGISTER = 1 << 2;
        const MATRIX = 1 << 3;

        const DESTINATION = Self::DIRECT.bits() | Self::REGISTER.bits() | Self::MATRIX.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AddressingMode {
    Immediate = 0,
    Direct = 1,
    Register = 2,
    Matrix = 3,
}

impl AddressingMode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn flag(self) -> Modes {
        match self {
            AddressingMode::Immediate => Modes::IMMEDIATE,
            AddressingMode::Direct => Modes::DIRECT,
            AddressingMode::Register => Modes::REGISTER,
            AddressingMode::Matrix => Modes::MATRIX,
        }
    }

    /// Words this mode adds after the opcode word.
    pub fn extra_words(self) -> usize {
        match self {
            AddressingMode::Matrix => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressingMode::Immediate => write!(f, "immediate"),
            AddressingMode::Direct => write!(f, "direct"),
            AddressingMode::Register => write!(f, "register"),
            AddressingMode::Matrix => write!(f, "matrix"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Immediate(i16),
    Direct(String),
    Register(u8),
    Matrix { label: String, row: u8, col: u8 },
}

impl Operand {
    pub fn mode(&self) -> AddressingMode {
        match self {
            Operand::Immediate(_) => AddressingMode::Immediate,
            Operand::Direct(_) => AddressingMode::Direct,
            Operand::Register(_) => AddressingMode::Register,
            Operand::Matrix { .. } => AddressingMode::Matrix,
        }
    }

    /// The label whose address this operand needs, if any.
    pub fn label(&self) -> Option<&str> {
        match self {
            Operand::Direct(label) | Operand::Matrix { label, .. } => Some(label),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub source: Option<Operand>,
    pub dest: Option<Operand>,
}

impl Instruction {
    pub fn operands(&self) -> impl Iterator<Item = &Operand> {
        self.source.iter().chain(self.dest.iter())
    }

    /// Total machine words, opcode word included.
    pub fn word_count(&self) -> usize {
        let extra: usize = self.operands().map(|op| op.mode().extra_words()).sum();
        match (&self.source, &self.dest) {
            (Some(Operand::Register(_)), Some(Operand::Register(_))) => extra,
            _ => 1 + extra,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Data(Vec<i16>),
    String(String),
    Matrix { rows: u16, cols: u16, values: Vec<i16> },
    Entry(String),
    Extern(String),
}

impl Directive {
    pub fn keyword(&self) -> &'static str {
        match self {
            Directive::Data(_) => ".data",
            Directive::String(_) => ".string",
            Directive::Matrix { .. } => ".mat",
            Directive::Entry(_) => ".entry",
            Directive::Extern(_) => ".extern",
        }
    }

    /// Words reserved in the data segment.
    pub fn data_words(&self) -> usize {
        match self {
            Directive::Data(values) => values.len(),
            Directive::String(text) => text.chars().count() + 1,
            Directive::Matrix { values, .. } => values.len(),
            Directive::Entry(_) | Directive::Extern(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Instruction(Instruction),
    Directive(Directive),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub line: usize,
    pub label: Option<String>,
    pub body: Body,
}

pub fn is_register(word: &str) -> bool {
    regex_is_match!(r"^r[0-7]$", word)
}

/// Mnemonics, directive names, registers and macro keywords.
pub fn is_reserved(word: &str) -> bool {
    MNEMONICS.contains_key(word)
        || DIRECTIVE_NAMES.contains(&word)
        || is_register(word)
        || word == MACRO_START
        || word == MACRO_END
}

/// Checks a label name (without its trailing `:`).
pub fn check_label(name: &str) -> Result<(), Code> {
    if !regex_is_match!(r"^[A-Za-z][A-Za-z0-9_]*$", name) || name.len() > MAX_LABEL_LEN {
        Err(Code::LabelInvalid)
    } else if is_reserved(name) {
        Err(Code::LabelReserved)
    } else {
        Ok(())
    }
}

pub fn is_valid_label(name: &str) -> bool {
    check_label(name).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        for name in ["MAIN", "x", "loop_2", "A1234567890123456789012345678"] {
            assert!(is_valid_label(name), "{name}");
        }
        assert!(is_valid_label(&"L".repeat(31)));

        assert_eq!(check_label(&"L".repeat(32)), Err(Code::LabelInvalid));
        assert_eq!(check_label("1abc"), Err(Code::LabelInvalid));
        assert_eq!(check_label("_abc"), Err(Code::LabelInvalid));
        assert_eq!(check_label("ab-c"), Err(Code::LabelInvalid));
        assert_eq!(check_label(""), Err(Code::LabelInvalid));
        assert_eq!(check_label("mov"), Err(Code::LabelReserved));
        assert_eq!(check_label("r3"), Err(Code::LabelReserved));
        assert_eq!(check_label("mcroend"), Err(Code::LabelReserved));
        assert_eq!(check_label("data"), Err(Code::LabelReserved));
        assert!(is_valid_label("r8"));
    }

    #[test]
    fn opcode_table() {
        for (i, opcode) in Opcode::ALL.iter().enumerate() {
            assert_eq!(opcode.code() as usize, i);
            assert_eq!(opcode.mnemonic().parse::<Opcode>(), Ok(*opcode));
        }
        assert_eq!("MOV".parse::<Opcode>(), Err(()));
        assert_eq!(Opcode::Lea.arity(), 2);
        assert_eq!(Opcode::Prn.arity(), 1);
        assert_eq!(Opcode::Stop.arity(), 0);
    }

    #[test]
    fn immediate_never_a_destination() {
        for opcode in Opcode::ALL {
            let (_, dest) = opcode.legal_modes();
            assert!(!dest.contains(Modes::IMMEDIATE));
        }
        assert!(Opcode::Cmp.legal_modes().0.contains(Modes::IMMEDIATE));
    }

    #[test]
    fn word_counts() {
        let direct = || Operand::Direct("X".to_owned());
        let matrix = || Operand::Matrix {
            label: "M".to_owned(),
            row: 1,
            col: 2,
        };
        let operands = [
            Operand::Immediate(3),
            direct(),
            Operand::Register(1),
            matrix(),
        ];

        for source in &operands {
            for dest in &operands {
                let inst = Instruction {
                    opcode: Opcode::Mov,
                    source: Some(source.clone()),
                    dest: Some(dest.clone()),
                };
                let both_registers = matches!(
                    (source, dest),
                    (Operand::Register(_), Operand::Register(_))
                );
                let expected = 1 + source.mode().extra_words() + dest.mode().extra_words()
                    - both_registers as usize;
                assert_eq!(inst.word_count(), expected);
            }
        }

        let stop = Instruction {
            opcode: Opcode::Stop,
            source: None,
            dest: None,
        };
        assert_eq!(stop.word_count(), 1);
    }

    #[test]
    fn directive_sizes() {
        assert_eq!(Directive::String("abcd".to_owned()).data_words(), 5);
        assert_eq!(Directive::Data(vec![1, 2, 3]).data_words(), 3);
        assert_eq!(Directive::Entry("X".to_owned()).data_words(), 0);
    }
}
