//! Macro expansion.
//!
//! ```text
//! mcro swap
//!     mov r1, r3
//!     mov r2, r1
//!     mov r3, r2
//! mcroend
//! ```
//!
//! Definitions are removed from the output and each later line that starts
//! with a macro's name is replaced by the macro body. Macros take no
//! parameters and cannot be nested.

use std::fmt;

use super::ast::{is_reserved, MACRO_END, MACRO_START};
use super::lex::{tokenize, Limits};
use super::table::Table;
use crate::diagnostic;
use crate::diagnostic::{Code, Diagnostics};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    pub name: String,
    pub body: Vec<String>,
}

/// A line of expanded source, tagged with the source line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub number: usize,
    pub text: String,
}

impl Line {
    pub fn new<S: Into<String>>(number: usize, text: S) -> Self {
        Line {
            number,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expanded {
    pub lines: Vec<Line>,
}

impl fmt::Display for Expanded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line.text)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
enum State {
    Idle,
    CollectingBody {
        name: String,
        header: usize,
        body: Vec<String>,
    },
}

struct Expander<'d> {
    limits: Limits,
    macros: Table<Macro>,
    state: State,
    output: Vec<Line>,
    diagnostics: &'d mut Diagnostics,
}

pub fn expand<'a, I>(source: I, limits: &Limits, diagnostics: &mut Diagnostics) -> Expanded
where
    I: IntoIterator<Item = &'a str>,
{
    let mut expander = Expander {
        limits: *limits,
        macros: Table::new(),
        state: State::Idle,
        output: Vec::new(),
        diagnostics,
    };

    for (index, text) in source.into_iter().enumerate() {
        expander.line(index + 1, text);
    }

    if let State::CollectingBody { name, header, .. } = &expander.state {
        expander.diagnostics.push(
            diagnostic!(Code::MacroUnclosed, *header, "macro `{name}` is never closed")
                .with_help(format!("add `{MACRO_END}` after the macro body")),
        );
    }

    log::debug!(
        "expanded {} macro(s) into {} line(s)",
        expander.macros.len(),
        expander.output.len()
    );

    Expanded {
        lines: expander.output,
    }
}

impl Expander<'_> {
    fn line(&mut self, number: usize, text: &str) {
        let text = text.trim_end_matches(['\r', '\n']);
        let tokens = tokenize(text);
        self.diagnostics
            .extend(self.limits.check(text, &tokens, number));

        if matches!(self.state, State::Idle) {
            self.idle(number, text, tokens.code());
        } else {
            self.collect(number, text, tokens.code());
        }
    }

    fn idle(&mut self, number: usize, text: &str, tokens: &[String]) {
        let Some(first) = tokens.first() else {
            // blank lines and comments pass through
            self.output.push(Line::new(number, text));
            return;
        };

        if first == MACRO_START {
            self.header(number, text, tokens);
        } else if first == MACRO_END {
            self.diagnostics.push(diagnostic!(
                Code::MacroUnexpectedEnd,
                number,
                "`{MACRO_END}` without a matching `{MACRO_START}`"
            ));
            self.output.push(Line::new(number, text));
        } else if let Some(mac) = self.macros.get(first) {
            if tokens.len() > 1 {
                self.diagnostics.push(diagnostic!(
                    Code::InstructionTrailing,
                    number,
                    "macro `{}` takes no arguments, found `{}`",
                    mac.name,
                    tokens[1..].join(" ")
                ));
            }
            log::trace!("line {number}: expanding `{}`", mac.name);
            self.output
                .extend(mac.body.iter().map(|body| Line::new(number, body.as_str())));
        } else {
            self.output.push(Line::new(number, text));
        }
    }

    fn header(&mut self, number: usize, text: &str, tokens: &[String]) {
        let name = match tokens.get(1) {
            None => None,
            Some(name) if name == MACRO_END => None,
            Some(name) => Some(name),
        };

        let Some(name) = name else {
            self.diagnostics.push(diagnostic!(
                Code::MacroUnnamed,
                number,
                "`{MACRO_START}` is missing a macro name"
            ));
            self.output.push(Line::new(number, text));
            return;
        };

        if is_reserved(name) {
            self.diagnostics.push(diagnostic!(
                Code::MacroReserved,
                number,
                "`{name}` is a reserved word and cannot name a macro"
            ));
            self.output.push(Line::new(number, text));
            return;
        }

        if tokens.len() > 2 {
            self.diagnostics.push(diagnostic!(
                Code::InstructionTrailing,
                number,
                "unexpected `{}` after macro name",
                tokens[2..].join(" ")
            ));
        }

        self.state = State::CollectingBody {
            name: name.to_owned(),
            header: number,
            body: Vec::new(),
        };
    }

    fn collect(&mut self, number: usize, text: &str, tokens: &[String]) {
        let State::CollectingBody { name, header, body } = &mut self.state else {
            return;
        };

        match tokens.first() {
            Some(first) if first == MACRO_END => {
                if tokens.len() > 1 {
                    self.diagnostics.push(diagnostic!(
                        Code::InstructionTrailing,
                        number,
                        "unexpected `{}` after `{MACRO_END}`",
                        tokens[1..].join(" ")
                    ));
                }

                let mac = Macro {
                    name: std::mem::take(name),
                    body: std::mem::take(body),
                };
                let header = *header;
                self.state = State::Idle;
                self.close(header, mac);
            }
            Some(first) if first == MACRO_START => {
                self.diagnostics.push(
                    diagnostic!(
                        Code::MacroNested,
                        number,
                        "`{MACRO_START}` inside the definition of `{name}`"
                    )
                    .with_help("macro definitions cannot be nested"),
                );
                body.push(text.to_owned());
            }
            _ => body.push(text.to_owned()),
        }
    }

    fn close(&mut self, header: usize, mac: Macro) {
        if mac.body.iter().all(|line| line.trim().is_empty()) {
            self.diagnostics.push(diagnostic!(
                Code::MacroEmpty,
                header,
                "macro `{}` has an empty body",
                mac.name
            ));
        }

        let name = mac.name.clone();
        if self.macros.replace(name.as_str(), mac).is_some() {
            self.diagnostics.push(
                diagnostic!(Code::MacroRedefined, header, "macro `{name}` is redefined")
                    .with_help("the last definition is used"),
            );
        }
    }
}
