use std::ops::Deref;

use logos::Logos;

use crate::diagnostic;
use crate::diagnostic::{Code, Diagnostic};

/// Structural pieces of a single source line.
///
/// Commas are separators only and never survive as tokens.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n\f,]+")]
enum Lexeme {
    #[regex(r";[^\r\n]*")]
    Comment,

    #[token("[")]
    #[token("]")]
    #[token("(")]
    #[token(")")]
    Bracket,

    #[regex(r"[^ \t\r\n\f,;\[\]()]+")]
    Word,
}

/// Owned tokens of one line, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tokens(Vec<String>);

impl Tokens {
    /// Tokens up to (not including) a trailing comment.
    pub fn code(&self) -> &[String] {
        match self.0.last() {
            Some(last) if last.starts_with(';') => &self.0[..self.0.len() - 1],
            _ => &self.0,
        }
    }
}

impl Deref for Tokens {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub fn tokenize(line: &str) -> Tokens {
    let mut tokens = Vec::new();

    for (lexeme, span) in Lexeme::lexer(line).spanned() {
        // Every character is covered by a rule, so errors cannot occur in practice.
        if lexeme.is_ok() {
            tokens.push(line[span].to_owned());
        }
    }

    Tokens(tokens)
}

/// Capacity bounds for raw source lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_line_len: usize,
    pub max_tokens: usize,
    pub max_token_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_line_len: 80,
            max_tokens: 64,
            max_token_len: 64,
        }
    }
}

impl Limits {
    pub fn check(&self, line: &str, tokens: &Tokens, number: usize) -> Vec<Diagnostic> {
        let mut found = Vec::new();

        let len = line.trim_end_matches(['\r', '\n']).chars().count();
        if len > self.max_line_len {
            found.push(
                diagnostic!(
                    Code::MemoryLineLength,
                    number,
                    "line is {len} characters long, the limit is {}",
                    self.max_line_len
                )
                .with_help("split the statement or shorten its comment"),
            );
        }

        if tokens.len() > self.max_tokens {
            found.push(diagnostic!(
                Code::MemoryTokenCount,
                number,
                "line has {} tokens, the limit is {}",
                tokens.len(),
                self.max_tokens
            ));
        }

        if let Some(long) = tokens
            .code()
            .iter()
            .find(|tok| tok.chars().count() > self.max_token_len)
        {
            found.push(diagnostic!(
                Code::MemoryTokenLength,
                number,
                "token `{long}` is longer than {} characters",
                self.max_token_len
            ));
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(line: &str) -> Vec<String> {
        tokenize(line).to_vec()
    }

    #[test]
    fn commas_and_whitespace() {
        assert_eq!(words("  mov  #5,r2 "), vec!["mov", "#5", "r2"]);
        assert_eq!(words("MAIN: add r1 ,, r2"), vec!["MAIN:", "add", "r1", "r2"]);
    }

    #[test]
    fn empty_line() {
        assert!(tokenize("").is_empty());
        assert!(tokenize(" \t , ").is_empty());
    }

    #[test]
    fn comment_swallows_rest() {
        let tokens = tokenize("stop ; done, [really]");
        assert_eq!(&*tokens, &["stop".to_owned(), "; done, [really]".to_owned()]);
        assert_eq!(tokens.code(), &["stop".to_owned()]);
        assert_eq!(tokenize("; only a comment").code(), &[] as &[String]);
    }

    #[test]
    fn brackets_are_single_tokens() {
        assert_eq!(
            words("lea M1[r2][r7], r3"),
            vec!["lea", "M1", "[", "r2", "]", "[", "r7", "]", "r3"]
        );
        assert_eq!(words("jmp (x)"), vec!["jmp", "(", "x", ")"]);
    }

    #[test]
    fn limits() {
        let limits = Limits::default();
        let long = format!("stop ;{}", "x".repeat(80));
        let codes: Vec<Code> = limits
            .check(&long, &tokenize(&long), 3)
            .iter()
            .map(Diagnostic::code)
            .collect();
        assert_eq!(codes, vec![Code::MemoryLineLength]);

        let many = "a ".repeat(65);
        let codes: Vec<Code> = Limits {
            max_line_len: 500,
            ..limits
        }
        .check(&many, &tokenize(&many), 1)
        .iter()
        .map(Diagnostic::code)
        .collect();
        assert_eq!(codes, vec![Code::MemoryTokenCount]);

        assert!(limits.check("stop", &tokenize("stop"), 1).is_empty());
    }
}
