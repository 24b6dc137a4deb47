//! Resolves pending label words against the finished symbol table.

use std::collections::HashSet;

use super::ast::{Body, Operand};
use super::encode::Slot;
use super::first_pass::Program;
use super::symbol::{Symbol, SymbolKind};
use super::word::{Are, Word};
use super::Config;
use crate::diagnostic;
use crate::diagnostic::{Code, Diagnostics};

/// An instruction word that refers to an external symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternRef {
    pub label: String,
    /// Address of the referencing word.
    pub address: u16,
}

/// Widest address an operand word can hold.
const MAX_OPERAND_ADDRESS: u16 = u8::MAX as u16;

/// Word for a resolved label reference, or `None` if the address does not
/// fit the eight-bit operand field.
fn label_word(symbol: &Symbol, kind: SymbolKind) -> Option<Word> {
    let (are, address) = match kind {
        SymbolKind::Extern => (Are::External, 0),
        SymbolKind::Code | SymbolKind::Data => (Are::Relocatable, symbol.address),
    };
    if address > MAX_OPERAND_ADDRESS {
        return None;
    }

    let mut word = Word::ZERO;
    word.set_field(0, 1, are as u16);
    word.set_field(2, 9, address);
    Some(word)
}

pub fn second_pass(
    program: &mut Program,
    config: &Config,
    diagnostics: &mut Diagnostics,
) -> Vec<ExternRef> {
    let icf = program.icf();
    for symbol in program.symbols.values_mut() {
        if symbol.kind == Some(SymbolKind::Data) {
            symbol.address = symbol.address.saturating_add(icf);
        }
    }

    // Data ends right below `icf + data_words`, which must stay inside memory.
    let end = usize::from(icf) + program.data_words();
    if end > config.memory_words {
        diagnostics.push(
            diagnostic!(
                Code::MemoryWordLimit,
                0,
                "program ends at address {end} but memory holds {} words",
                config.memory_words
            )
            .with_help(format!(
                "{} instruction word(s) from address {} and {} data word(s)",
                program.code_words(),
                program.base,
                program.data_words()
            )),
        );
    }

    let mut externals = Vec::new();
    let mut referenced = HashSet::new();

    for line in &mut program.code {
        let Some(statement) = program.statements.get(line.statement) else {
            continue;
        };
        let Body::Instruction(instruction) = &statement.body else {
            continue;
        };

        // Direct and matrix operands leave exactly one pending word each.
        let pending: Vec<usize> = line.pending().collect();
        let labels = instruction.operands().filter_map(Operand::label);

        for (slot, label) in pending.into_iter().zip(labels) {
            referenced.insert(label.to_owned());

            let resolved = program
                .symbols
                .get(label)
                .and_then(|symbol| symbol.kind.map(|kind| (symbol, kind)));

            let Some((symbol, kind)) = resolved else {
                diagnostics.push(diagnostic!(
                    Code::LabelUndefined,
                    statement.line,
                    "undefined label `{label}`"
                ));
                continue;
            };

            let Some(word) = label_word(symbol, kind) else {
                diagnostics.push(diagnostic!(
                    Code::MemoryWordLimit,
                    statement.line,
                    "address {} of `{label}` does not fit an operand word",
                    symbol.address
                ));
                continue;
            };
            line.slots[slot] = Slot::Ready(word);

            if kind == SymbolKind::Extern {
                externals.push(ExternRef {
                    label: label.to_owned(),
                    address: line.address + slot as u16,
                });
            }
        }
    }

    for symbol in program.symbols.values() {
        if symbol.is_entry && symbol.kind.is_none() {
            diagnostics.push(diagnostic!(
                Code::LabelEntryNotFound,
                symbol.line,
                "`{}` is declared `.entry` but never defined",
                symbol.name
            ));
        } else if symbol.is_local() && !symbol.is_entry && !referenced.contains(&symbol.name) {
            diagnostics.push(diagnostic!(
                Code::LabelUnused,
                symbol.line,
                "label `{}` is never used",
                symbol.name
            ));
        }
    }

    log::debug!(
        "second pass: ICF {icf}, {} external reference(s)",
        externals.len()
    );

    externals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::first_pass::first_pass;
    use crate::assembler::macros::Line;

    fn run(source: &str) -> (Program, Vec<ExternRef>, Diagnostics) {
        let lines: Vec<Line> = source
            .lines()
            .enumerate()
            .map(|(i, text)| Line::new(i + 1, text))
            .collect();
        let config = Config::default();
        let mut diagnostics = Diagnostics::new();
        let mut program = first_pass(&lines, &config, &mut diagnostics);
        let externals = second_pass(&mut program, &config, &mut diagnostics);
        (program, externals, diagnostics)
    }

    fn slot(program: &Program, line: usize, index: usize) -> Slot {
        program.code[line].slots[index]
    }

    #[test]
    fn data_labels_follow_code() {
        let (program, _, diagnostics) = run("mov LEN, r1\nstop\nLEN: .data 4");
        assert!(diagnostics.is_empty());

        // four instruction words, so data starts at 104
        let len = program.symbols.get("LEN").expect("LEN is defined");
        assert_eq!(len.address, 104);
        assert_eq!(
            slot(&program, 0, 1),
            Slot::Ready(Word::new((104 << 2) | Are::Relocatable as i32))
        );
    }

    #[test]
    fn external_references() {
        let (program, externals, diagnostics) = run(".extern W\njmp W\ninc r1\nbne W");
        assert!(diagnostics.is_empty());

        assert_eq!(slot(&program, 0, 1), Slot::Ready(Word::new(1)));
        assert_eq!(
            externals,
            vec![
                ExternRef {
                    label: "W".to_owned(),
                    address: 101
                },
                ExternRef {
                    label: "W".to_owned(),
                    address: 105
                },
            ]
        );
    }

    #[test]
    fn matrix_base_is_resolved() {
        let (program, externals, diagnostics) = run("mov M[r1][r2], r3\nstop\nM: .mat [1][1] 9");
        assert!(diagnostics.is_empty());
        assert!(externals.is_empty());

        // mov (4 words) + stop (1 word)
        assert_eq!(
            slot(&program, 0, 1),
            Slot::Ready(Word::new((105 << 2) | Are::Relocatable as i32))
        );
        assert!(program.code.iter().all(|line| line.pending().next().is_none()));
    }

    #[test]
    fn undefined_labels_are_all_reported() {
        let (program, _, diagnostics) = run("jmp NOWHERE\ninc ALSO\nstop");
        assert_eq!(
            diagnostics.codes(),
            vec![Code::LabelUndefined, Code::LabelUndefined]
        );
        let lines: Vec<usize> = diagnostics.iter().map(|d| d.line()).collect();
        assert_eq!(lines, vec![1, 2]);

        assert!(slot(&program, 0, 1).is_pending());
        assert_eq!(slot(&program, 0, 1).word(), Word::ZERO);
    }

    #[test]
    fn entry_without_definition() {
        let (_, _, diagnostics) = run(".entry GHOST\nstop");
        assert_eq!(diagnostics.codes(), vec![Code::LabelEntryNotFound]);
        assert_eq!(diagnostics.iter().next().map(|d| d.line()), Some(1));

        // an entry-only symbol cannot be referenced either
        let (_, _, diagnostics) = run(".entry GHOST\njmp GHOST");
        assert_eq!(
            diagnostics.codes(),
            vec![Code::LabelUndefined, Code::LabelEntryNotFound]
        );
    }

    #[test]
    fn unused_labels_warn() {
        let (_, _, diagnostics) = run("MAIN: stop\nX: .data 1\n.entry MAIN");
        assert_eq!(diagnostics.codes(), vec![Code::LabelUnused]);
        assert!(!diagnostics.has_errors());
        assert_eq!(diagnostics.iter().next().map(|d| d.line()), Some(2));
    }

    #[test]
    fn self_reference() {
        let (program, externals, diagnostics) = run("LOOP: jmp LOOP");
        assert!(diagnostics.is_empty());
        assert!(externals.is_empty());

        let word = slot(&program, 0, 1).word();
        assert_eq!(word.field(2, 9), 100);
        assert_eq!(word.field(0, 1), Are::Relocatable as u16);
    }

    /// `stop` followed by `data` zero words, so memory is used up to `101 + data`.
    fn filled(data: usize) -> String {
        format!("stop\n.data {}", vec!["0"; data].join(", "))
    }

    #[test]
    fn memory_limit() {
        // 156 words from address 100 end exactly at the top of memory
        let (_, _, diagnostics) = run(&filled(155));
        assert!(diagnostics.is_empty());

        let (_, _, diagnostics) = run(&filled(156));
        assert_eq!(diagnostics.codes(), vec![Code::MemoryWordLimit]);
        assert_eq!(diagnostics.iter().next().map(|d| d.line()), Some(0));
    }

    #[test]
    fn addresses_past_memory_are_not_wrapped() {
        let source = format!(
            "jmp FAR\n{}.data {}\nFAR: .data 9",
            "stop\n".repeat(150),
            vec!["1"; 8].join(", ")
        );
        let (program, _, diagnostics) = run(&source);

        // FAR lands at 102 + 150 + 8 = 260
        assert_eq!(program.symbols.get("FAR").map(|s| s.address), Some(260));
        assert_eq!(
            diagnostics.codes(),
            vec![Code::MemoryWordLimit, Code::MemoryWordLimit]
        );
        let lines: Vec<usize> = diagnostics.iter().map(|d| d.line()).collect();
        assert_eq!(lines, vec![0, 1]);
        assert!(slot(&program, 0, 1).is_pending());
    }
}
