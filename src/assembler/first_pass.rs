//! Builds statements, the symbol table and provisional encodings.
//!
//! Instructions are laid out from the configured base on the instruction counter,
//! data on its own counter starting at zero. Words that need a label address
//! are left [`Slot::Pending`](super::encode::Slot) for the second pass.

use std::iter;
use std::ops::RangeInclusive;

use lazy_regex::{regex_captures, regex_is_match};

use super::ast::{
    check_label, is_valid_label, Body, Directive, Instruction, Opcode, Operand, Statement,
};
use super::encode::{encode_instruction, EncodedLine};
use super::lex::tokenize;
use super::macros::Line;
use super::symbol::{Symbol, SymbolKind, SymbolTable};
use super::word::Word;
use super::Config;
use crate::diagnostic;
use crate::diagnostic::{Code, Diagnostic, Diagnostics};

/// Values that fit a signed 10-bit word.
const VALUE_RANGE: RangeInclusive<i64> = -512..=511;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    /// Address of the first instruction word.
    pub base: u16,
    pub statements: Vec<Statement>,
    pub code: Vec<EncodedLine>,
    pub data: Vec<Word>,
    pub symbols: SymbolTable,
}

impl Program {
    pub fn code_words(&self) -> usize {
        self.code.iter().map(EncodedLine::len).sum()
    }

    pub fn data_words(&self) -> usize {
        self.data.len()
    }

    /// Final instruction counter: one past the last instruction word.
    pub fn icf(&self) -> u16 {
        self.base.saturating_add(self.code_words() as u16)
    }
}

pub fn first_pass<'a, I>(lines: I, config: &Config, diagnostics: &mut Diagnostics) -> Program
where
    I: IntoIterator<Item = &'a Line>,
{
    let mut parser = Parser {
        program: Program {
            base: config.code_base,
            ..Program::default()
        },
        ic: config.code_base,
        dc: 0,
        memory_words: config.memory_words,
        diagnostics,
    };

    for line in lines {
        parser.line(line);
    }

    log::debug!(
        "first pass: {} statement(s), {} code word(s), {} data word(s), {} symbol(s)",
        parser.program.statements.len(),
        parser.program.code_words(),
        parser.program.data_words(),
        parser.program.symbols.len()
    );

    parser.program
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Number {
    Integer(i64),
    OutOfRange,
    Float,
    Invalid,
}

fn parse_number(text: &str) -> Number {
    if regex_is_match!(r"^[+-]?[0-9]+$", text) {
        text.parse().map_or(Number::OutOfRange, Number::Integer)
    } else if regex_is_match!(r"^[+-]?([0-9]+\.[0-9]*|\.[0-9]+)$", text) {
        Number::Float
    } else {
        Number::Invalid
    }
}

/// Text following the first occurrence of `token`.
fn after<'t>(text: &'t str, token: &str) -> &'t str {
    match text.find(token) {
        Some(at) => &text[at + token.len()..],
        None => "",
    }
}

fn strip_comment(text: &str) -> &str {
    match text.find(';') {
        Some(at) => &text[..at],
        None => text,
    }
}

fn register_number(text: &str) -> Option<&str> {
    regex_captures!(r"^r([0-9]+)$", text).map(|(_, digits)| digits)
}

fn label_diagnostic(code: Code, name: &str, line: usize) -> Diagnostic {
    match code {
        Code::LabelReserved => diagnostic!(
            code,
            line,
            "`{name}` is a reserved word and cannot be used as a label"
        ),
        _ => diagnostic!(code, line, "invalid label `{name}`").with_help(
            "labels start with a letter, continue with letters, digits or `_`, \
             and are at most 31 characters long",
        ),
    }
}

fn attach<'t>(groups: &mut Vec<Vec<&'t str>>, token: &'t str) {
    match groups.last_mut() {
        Some(group) => group.push(token),
        None => groups.push(vec![token]),
    }
}

/// Splits operand tokens into one group per operand.
///
/// Brackets glue onto the token before them, so `M[r1][r2]` stays together.
fn group_operands(tokens: &[String]) -> Vec<Vec<&str>> {
    let mut groups = Vec::new();
    let mut depth = 0usize;

    for token in tokens {
        let token = token.as_str();
        match token {
            "[" => {
                depth += 1;
                attach(&mut groups, token);
            }
            "]" => {
                depth = depth.saturating_sub(1);
                attach(&mut groups, token);
            }
            _ if depth > 0 => attach(&mut groups, token),
            _ => groups.push(vec![token]),
        }
    }

    groups
}

struct Parser<'d> {
    program: Program,
    ic: u16,
    dc: u16,
    memory_words: usize,
    diagnostics: &'d mut Diagnostics,
}

impl Parser<'_> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    fn line(&mut self, line: &Line) {
        let number = line.number;
        let tokens = tokenize(&line.text);
        let code = tokens.code();
        let Some(first) = code.first() else {
            return;
        };

        let mut rest = code;
        let mut text = line.text.as_str();
        let mut label = None;

        if let Some(name) = first.strip_suffix(':') {
            rest = &code[1..];
            text = after(text, first);
            match check_label(name) {
                Ok(()) => label = Some(name),
                Err(err) => self.report(label_diagnostic(err, name, number)),
            }
        }

        let Some(leader) = rest.first() else {
            self.report(diagnostic!(
                Code::InstructionUnknown,
                number,
                "expected an instruction or directive after `{first}`"
            ));
            return;
        };

        if let Ok(opcode) = leader.parse::<Opcode>() {
            self.instruction(number, label, opcode, &rest[1..]);
        } else if let Some(keyword) = leader.strip_prefix('.') {
            self.directive(number, label, keyword, after(text, leader), &rest[1..]);
        } else {
            let mut diagnostic = diagnostic!(
                Code::InstructionUnknown,
                number,
                "unknown instruction `{leader}`"
            );
            if leader.to_lowercase().parse::<Opcode>().is_ok() {
                diagnostic = diagnostic.with_help("mnemonics are lowercase");
            } else {
                let known: Vec<&str> = Opcode::ALL.iter().map(|op| op.mnemonic()).collect();
                diagnostic =
                    diagnostic.with_help(format!("known instructions: {}", known.join(", ")));
            }
            self.report(diagnostic);
        }
    }

    /// Records a label definition at the current counter for `kind`.
    fn define(&mut self, label: Option<&str>, kind: SymbolKind, number: usize) {
        let Some(name) = label else {
            return;
        };
        let address = match kind {
            SymbolKind::Code => self.ic,
            SymbolKind::Data => self.dc,
            SymbolKind::Extern => 0,
        };

        if !self.program.symbols.contains(name) {
            log::trace!("line {number}: `{name}` defined at {address}");
            let _ = self
                .program
                .symbols
                .insert(name, Symbol::defined(name, kind, address, number));
            return;
        }

        let conflict = match self.program.symbols.get_mut(name) {
            // announced by `.entry`, defined now
            Some(symbol) if symbol.kind.is_none() => {
                symbol.kind = Some(kind);
                symbol.address = address;
                symbol.line = number;
                None
            }
            Some(symbol) if symbol.is_extern => Some(diagnostic!(
                Code::LabelRedefined,
                number,
                "`{name}` is declared `.extern` on line {} and cannot be defined here",
                symbol.line
            )),
            Some(symbol) => Some(diagnostic!(
                Code::LabelRedefined,
                number,
                "label `{name}` is already defined on line {}",
                symbol.line
            )),
            None => None,
        };

        if let Some(diagnostic) = conflict {
            self.report(diagnostic);
        }
    }

    fn instruction(
        &mut self,
        number: usize,
        label: Option<&str>,
        opcode: Opcode,
        tokens: &[String],
    ) {
        self.define(label, SymbolKind::Code, number);

        let groups = group_operands(tokens);
        let arity = opcode.arity();
        if groups.len() != arity {
            let relation = if groups.len() > arity {
                "too many"
            } else {
                "too few"
            };
            self.report(diagnostic!(
                Code::InstructionOperandCount,
                number,
                "{relation} operands: `{opcode}` takes {arity}, found {}",
                groups.len()
            ));
            return;
        }

        let parsed: Vec<Option<Operand>> = groups
            .iter()
            .map(|group| self.operand(group, number))
            .collect();
        let Some(mut operands) = parsed.into_iter().collect::<Option<Vec<_>>>() else {
            return;
        };

        let dest = operands.pop();
        let source = operands.pop();

        let (source_modes, dest_modes) = opcode.legal_modes();
        let mut legal = true;
        for (operand, modes, role) in [
            (&source, source_modes, "source"),
            (&dest, dest_modes, "destination"),
        ] {
            if let Some(operand) = operand {
                if !modes.contains(operand.mode().flag()) {
                    self.report(diagnostic!(
                        Code::InstructionAddressingMode,
                        number,
                        "`{opcode}` does not accept {} addressing for its {role} operand",
                        operand.mode()
                    ));
                    legal = false;
                }
            }
        }
        if !legal {
            return;
        }

        let instruction = Instruction {
            opcode,
            source,
            dest,
        };
        let slots = encode_instruction(&instruction);
        debug_assert_eq!(slots.len(), instruction.word_count());
        let address = self.ic;
        self.ic = self.ic.saturating_add(slots.len() as u16);

        self.program.code.push(EncodedLine {
            statement: self.program.statements.len(),
            address,
            slots,
        });
        self.program.statements.push(Statement {
            line: number,
            label: label.map(str::to_owned),
            body: Body::Instruction(instruction),
        });
    }

    fn operand(&mut self, group: &[&str], number: usize) -> Option<Operand> {
        let head = group[0];

        if group.len() > 1 || head == "[" || head == "]" {
            return self.matrix(group, number);
        }

        if let Some(value) = head.strip_prefix('#') {
            return self.immediate(value, number);
        }

        if let Some(digits) = register_number(head) {
            return match digits.parse::<u8>() {
                Ok(register) if register <= 7 => Some(Operand::Register(register)),
                _ => {
                    self.report(
                        diagnostic!(
                            Code::RegisterOutOfRange,
                            number,
                            "register `{head}` does not exist"
                        )
                        .with_help("registers are `r0` through `r7`"),
                    );
                    None
                }
            };
        }

        if !is_valid_label(head) {
            self.report(diagnostic!(
                Code::OperandUnrecognized,
                number,
                "`{head}` is not a recognizable operand, treating it as a label"
            ));
        }
        Some(Operand::Direct(head.to_owned()))
    }

    fn immediate(&mut self, value: &str, number: usize) -> Option<Operand> {
        let diagnostic = match parse_number(value) {
            Number::Integer(n) if VALUE_RANGE.contains(&n) => {
                return Some(Operand::Immediate(n as i16));
            }
            Number::Integer(_) | Number::OutOfRange => diagnostic!(
                Code::ImmediateOutOfRange,
                number,
                "immediate `#{value}` does not fit in a word"
            )
            .with_help("immediates must be between -512 and 511"),
            Number::Float => diagnostic!(
                Code::ImmediateFloat,
                number,
                "immediate `#{value}` is not an integer"
            ),
            Number::Invalid => diagnostic!(
                Code::ImmediateInvalid,
                number,
                "invalid immediate `#{value}`"
            ),
        };

        self.report(diagnostic);
        None
    }

    fn matrix(&mut self, group: &[&str], number: usize) -> Option<Operand> {
        let text = group.concat();
        let [label, "[", row, "]", "[", col, "]"] = group else {
            self.report(
                diagnostic!(
                    Code::MatrixIndexInvalid,
                    number,
                    "malformed matrix access `{text}`"
                )
                .with_help("matrix operands are written `label[rX][rY]`"),
            );
            return None;
        };

        let mut valid = true;
        if let Err(code) = check_label(label) {
            self.report(label_diagnostic(code, label, number));
            valid = false;
        }
        let row = self.index_register(row, &text, number);
        let col = self.index_register(col, &text, number);

        match (row, col) {
            (Some(row), Some(col)) if valid => Some(Operand::Matrix {
                label: (*label).to_owned(),
                row,
                col,
            }),
            _ => None,
        }
    }

    fn index_register(&mut self, index: &str, operand: &str, number: usize) -> Option<u8> {
        let Some(digits) = register_number(index) else {
            self.report(diagnostic!(
                Code::RegisterInvalid,
                number,
                "matrix index `{index}` in `{operand}` must be a register"
            ));
            return None;
        };

        match digits.parse::<u8>() {
            Ok(register) if register <= 7 => Some(register),
            _ => {
                self.report(
                    diagnostic!(
                        Code::MatrixIndexOutOfRange,
                        number,
                        "matrix index `{index}` in `{operand}` does not exist"
                    )
                    .with_help("indices are registers `r0` through `r7`"),
                );
                None
            }
        }
    }

    fn directive(
        &mut self,
        number: usize,
        label: Option<&str>,
        keyword: &str,
        text: &str,
        tokens: &[String],
    ) {
        let parsed = match keyword {
            "data" => {
                self.define(label, SymbolKind::Data, number);
                self.values(".data", text, false, number).map(Directive::Data)
            }
            "string" => {
                self.define(label, SymbolKind::Data, number);
                self.string(text, number).map(Directive::String)
            }
            "mat" => {
                self.define(label, SymbolKind::Data, number);
                self.mat(text, number)
            }
            "entry" | "extern" => {
                if let Some(label) = label {
                    self.report(diagnostic!(
                        Code::LabelOnEntryOrExtern,
                        number,
                        "label `{label}` on a `.{keyword}` line is ignored"
                    ));
                }
                self.linkage(keyword == "entry", tokens, number);
                return;
            }
            _ => {
                self.report(diagnostic!(
                    Code::DirectiveUnknown,
                    number,
                    "unknown directive `.{keyword}`"
                ));
                return;
            }
        };

        if let Some(directive) = parsed {
            self.reserve(number, label, directive);
        }
    }

    /// Appends the directive's words to the data image.
    fn reserve(&mut self, number: usize, label: Option<&str>, directive: Directive) {
        let words: Vec<Word> = match &directive {
            Directive::Data(values) | Directive::Matrix { values, .. } => {
                values.iter().map(|&value| Word::new(value.into())).collect()
            }
            Directive::String(text) => text
                .chars()
                .map(|c| Word::new(c as i32))
                .chain(iter::once(Word::ZERO))
                .collect(),
            Directive::Entry(_) | Directive::Extern(_) => Vec::new(),
        };
        debug_assert_eq!(words.len(), directive.data_words());
        log::trace!(
            "line {number}: `{}` reserves {} word(s) at {}",
            directive.keyword(),
            words.len(),
            self.dc
        );

        self.dc = self.dc.saturating_add(words.len() as u16);
        self.program.data.extend(words);
        self.program.statements.push(Statement {
            line: number,
            label: label.map(str::to_owned),
            body: Body::Directive(directive),
        });
    }

    /// Comma separated integers. `allow_empty` permits an empty list.
    fn values(
        &mut self,
        keyword: &str,
        text: &str,
        allow_empty: bool,
        number: usize,
    ) -> Option<Vec<i16>> {
        let text = strip_comment(text).trim();
        if text.is_empty() {
            if allow_empty {
                return Some(Vec::new());
            }
            self.report(diagnostic!(
                Code::DirectiveMissingOperand,
                number,
                "`{keyword}` expects at least one value"
            ));
            return None;
        }

        let mut values = Vec::new();
        let mut valid = true;
        for item in text.split(',').map(str::trim) {
            let diagnostic = match parse_number(item) {
                Number::Integer(n) if VALUE_RANGE.contains(&n) => {
                    values.push(n as i16);
                    continue;
                }
                _ if item.is_empty() => diagnostic!(
                    Code::DataMissingValue,
                    number,
                    "missing value in `{keyword}` list"
                )
                .with_help("remove the extra comma"),
                Number::Integer(_) | Number::OutOfRange => diagnostic!(
                    Code::DataOutOfRange,
                    number,
                    "`{item}` does not fit in a word"
                )
                .with_help("values must be between -512 and 511"),
                Number::Float => diagnostic!(
                    Code::DataInvalidValue,
                    number,
                    "`{item}` is not an integer"
                ),
                Number::Invalid if item.contains(char::is_whitespace) => diagnostic!(
                    Code::DataInvalidValue,
                    number,
                    "invalid value `{item}`"
                )
                .with_help("separate values with commas"),
                Number::Invalid => diagnostic!(
                    Code::DataInvalidValue,
                    number,
                    "invalid value `{item}`"
                ),
            };

            self.report(diagnostic);
            valid = false;
        }

        valid.then_some(values)
    }

    fn string(&mut self, text: &str, number: usize) -> Option<String> {
        let text = text.trim();
        if text.is_empty() || text.starts_with(';') {
            self.report(diagnostic!(
                Code::DirectiveMissingOperand,
                number,
                "`.string` expects a quoted string"
            ));
            return None;
        }

        let Some((content, rest)) = text
            .strip_prefix('"')
            .and_then(|body| body.split_once('"'))
        else {
            self.report(
                diagnostic!(
                    Code::StringUnterminated,
                    number,
                    "`{text}` is not a terminated string"
                )
                .with_help("strings are enclosed in double quotes"),
            );
            return None;
        };

        let rest = rest.trim();
        if !rest.is_empty() && !rest.starts_with(';') {
            self.report(diagnostic!(
                Code::InstructionTrailing,
                number,
                "unexpected `{rest}` after string"
            ));
            return None;
        }

        if let Some(c) = content.chars().find(|c| !(' '..='~').contains(c)) {
            self.report(
                diagnostic!(
                    Code::StringInvalidChar,
                    number,
                    "{c:?} cannot be stored in a string"
                )
                .with_help("strings may only hold printable ASCII characters"),
            );
            return None;
        }

        Some(content.to_owned())
    }

    fn mat(&mut self, text: &str, number: usize) -> Option<Directive> {
        let text = strip_comment(text);
        let Some((_, rows, cols, rest)) = regex_captures!(
            r"^\s*\[\s*([0-9]+)\s*\]\s*\[\s*([0-9]+)\s*\](.*)$",
            text
        ) else {
            self.report(
                diagnostic!(
                    Code::MatrixDimensions,
                    number,
                    "`.mat` is missing its dimensions"
                )
                .with_help("declare matrices as `.mat [rows][cols] values...`"),
            );
            return None;
        };

        let (Ok(rows), Ok(cols)) = (rows.parse::<u16>(), cols.parse::<u16>()) else {
            self.report(diagnostic!(
                Code::MatrixDimensions,
                number,
                "matrix dimensions [{rows}][{cols}] are too large"
            ));
            return None;
        };
        if rows == 0 || cols == 0 {
            self.report(diagnostic!(
                Code::MatrixDimensions,
                number,
                "matrix dimensions must be positive, found [{rows}][{cols}]"
            ));
            return None;
        }

        let cells = usize::from(rows) * usize::from(cols);
        if cells > self.memory_words {
            self.report(
                diagnostic!(
                    Code::MatrixDimensions,
                    number,
                    "matrix [{rows}][{cols}] needs {cells} words but memory holds {}",
                    self.memory_words
                )
                .with_help("reduce the number of rows or columns"),
            );
            return None;
        }

        let mut values = self.values(".mat", rest, true, number)?;
        if values.len() < cells {
            self.report(diagnostic!(
                Code::MatrixUnderInitialized,
                number,
                "matrix has {cells} cells but only {} value(s), the rest are zero",
                values.len()
            ));
            values.resize(cells, 0);
        } else if values.len() > cells {
            self.report(diagnostic!(
                Code::MatrixOverInitialized,
                number,
                "matrix has {cells} cells but {} values, the extra values are ignored",
                values.len()
            ));
            values.truncate(cells);
        }

        Some(Directive::Matrix { rows, cols, values })
    }

    fn linkage(&mut self, is_entry: bool, tokens: &[String], number: usize) {
        let keyword = if is_entry { ".entry" } else { ".extern" };
        let Some(name) = tokens.first() else {
            self.report(diagnostic!(
                Code::DirectiveMissingOperand,
                number,
                "`{keyword}` expects a label"
            ));
            return;
        };

        if tokens.len() > 1 {
            self.report(diagnostic!(
                Code::InstructionTrailing,
                number,
                "unexpected `{}` after `{keyword} {name}`",
                tokens[1..].join(" ")
            ));
        }

        if let Err(code) = check_label(name) {
            self.report(label_diagnostic(code, name, number));
            return;
        }

        if is_entry {
            self.entry(name, number);
        } else {
            self.external(name, number);
        }

        let directive = if is_entry {
            Directive::Entry(name.clone())
        } else {
            Directive::Extern(name.clone())
        };
        self.program.statements.push(Statement {
            line: number,
            label: None,
            body: Body::Directive(directive),
        });
    }

    fn entry(&mut self, name: &str, number: usize) {
        if !self.program.symbols.contains(name) {
            let _ = self.program.symbols.insert(name, Symbol::entry(name, number));
            return;
        }

        let conflict = match self.program.symbols.get_mut(name) {
            Some(symbol) if symbol.is_extern => Some(diagnostic!(
                Code::LabelEntryAndExtern,
                number,
                "`{name}` is declared `.extern` on line {} and cannot be an entry",
                symbol.line
            )),
            Some(symbol) if symbol.is_entry => Some(diagnostic!(
                Code::LabelEntryRepeated,
                number,
                "`{name}` is already declared `.entry`"
            )),
            Some(symbol) => {
                symbol.is_entry = true;
                None
            }
            None => None,
        };

        if let Some(diagnostic) = conflict {
            self.report(diagnostic);
        }
    }

    fn external(&mut self, name: &str, number: usize) {
        if !self.program.symbols.contains(name) {
            let _ = self.program.symbols.insert(
                name,
                Symbol::defined(name, SymbolKind::Extern, 0, number),
            );
            return;
        }

        let diagnostic = match self.program.symbols.get(name) {
            Some(symbol) if symbol.is_entry => diagnostic!(
                Code::LabelEntryAndExtern,
                number,
                "`{name}` is declared `.entry` on line {} and cannot be external",
                symbol.line
            ),
            Some(symbol) if symbol.is_extern => diagnostic!(
                Code::LabelExternRepeated,
                number,
                "`{name}` is already declared `.extern`"
            ),
            Some(symbol) => diagnostic!(
                Code::LabelRedefined,
                number,
                "`{name}` is defined on line {} and cannot also be external",
                symbol.line
            ),
            None => return,
        };

        self.report(diagnostic);
    }
}
