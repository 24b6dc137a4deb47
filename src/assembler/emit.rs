//! Renders the object, entry and external listings.

use std::fmt::Write;

use super::first_pass::Program;
use super::second_pass::ExternRef;
use super::word::{address, base4_min};

/// Text of the three output files. Empty listings are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectFiles {
    pub object: String,
    pub entries: String,
    pub externals: String,
}

pub fn emit(program: &Program, externals: &[ExternRef]) -> ObjectFiles {
    ObjectFiles {
        object: object(program),
        entries: entries(program),
        externals: extern_listing(externals),
    }
}

/// Header with the word counts, then one `address<TAB>word` line per word.
///
/// Unresolved words come out as zero.
pub fn object(program: &Program) -> String {
    let mut out = format!(
        "{} {}\n",
        base4_min(program.code_words() as u16),
        base4_min(program.data_words() as u16)
    );

    let words = program
        .code
        .iter()
        .flat_map(|line| line.words())
        .chain(program.data.iter().copied());

    for (offset, word) in words.enumerate() {
        let at = program.base.saturating_add(offset as u16);
        let _ = writeln!(out, "{}\t{word}", address(at));
    }

    out
}

pub fn entries(program: &Program) -> String {
    let mut out = String::new();
    for (name, symbol) in program.symbols.iter() {
        if symbol.is_entry && symbol.is_local() {
            let _ = writeln!(out, "{name}\t{}", address(symbol.address));
        }
    }
    out
}

pub fn extern_listing(externals: &[ExternRef]) -> String {
    let mut out = String::new();
    for reference in externals {
        let _ = writeln!(out, "{}\t{}", reference.label, address(reference.address));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::first_pass::first_pass;
    use crate::assembler::macros::Line;
    use crate::assembler::second_pass::second_pass;
    use crate::assembler::Config;
    use crate::diagnostic::Diagnostics;

    fn assemble(source: &str) -> (ObjectFiles, Diagnostics) {
        let lines: Vec<Line> = source
            .lines()
            .enumerate()
            .map(|(i, text)| Line::new(i + 1, text))
            .collect();
        let config = Config::default();
        let mut diagnostics = Diagnostics::new();
        let mut program = first_pass(&lines, &config, &mut diagnostics);
        let externals = second_pass(&mut program, &config, &mut diagnostics);
        (emit(&program, &externals), diagnostics)
    }

    #[test]
    fn object_listing() {
        let (files, diagnostics) = assemble("MAIN: mov #5, r2\nstop\n.entry MAIN\n.data 1");
        assert!(diagnostics.is_empty());

        // 4 code words (b a), 1 data word (b)
        assert_eq!(
            files.object,
            "ba b\n\
             bcba\taaaca\n\
             bcbb\taabba\n\
             bcbc\taaaca\n\
             bcbd\tddaaa\n\
             bcca\taaaab\n"
        );
        assert_eq!(files.entries, "MAIN\tbcba\n");
        assert!(files.externals.is_empty());
    }

    #[test]
    fn extern_listing_in_program_order() {
        let (files, diagnostics) = assemble(".extern K\n.extern W\njsr W\ninc K\nstop");
        assert!(diagnostics.is_empty());
        assert_eq!(files.externals, "W\tbcbb\nK\tbcbd\n");
        assert!(files.entries.is_empty());
        // external words carry only the relocation class
        assert!(files.object.contains("bcbb\taaaab\n"));
    }

    #[test]
    fn unresolved_words_are_zero() {
        let (files, diagnostics) = assemble("jmp NOWHERE");
        assert!(diagnostics.has_errors());
        assert_eq!(files.object, "c a\nbcba\tcbaba\nbcbb\taaaaa\n");
    }
}
