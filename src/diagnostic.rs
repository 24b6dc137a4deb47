//! Accumulated assembler diagnostics.
//!
//! Every stage appends to a [`Diagnostics`] log instead of bailing out,
//! so a single run surfaces every problem in the file.
//! Stages only stop the pipeline at their boundaries, and only for errors.

use std::fmt;

use colored::Colorize;
use once_cell::sync::OnceCell;
use thiserror::Error;

/// How much [`Diagnostic::emit`] prints. Set once by `main`.
pub static VERBOSITY: OnceCell<Verbosity> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Silent,
    Error,
    Warning,
    Info,
}

impl From<Option<log::Level>> for Verbosity {
    fn from(level: Option<log::Level>) -> Self {
        match level {
            None => Verbosity::Silent,
            Some(log::Level::Error) => Verbosity::Error,
            Some(log::Level::Warn) => Verbosity::Warning,
            Some(_) => Verbosity::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Catalogue of everything the assembler can complain about.
///
/// Numbering is grouped by family: 4xx macros, 5xx labels,
/// 6xx instructions/operands/directives and 7xx memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[repr(u16)]
pub enum Code {
    #[error("nested macro definition")]
    MacroNested = 401,
    #[error("macro has no name")]
    MacroUnnamed = 402,
    #[error("macro redefined")]
    MacroRedefined = 403,
    #[error("empty macro")]
    MacroEmpty = 404,
    #[error("unexpected end of macro")]
    MacroUnexpectedEnd = 405,
    #[error("unclosed macro")]
    MacroUnclosed = 406,
    #[error("reserved macro name")]
    MacroReserved = 407,

    #[error("invalid label")]
    LabelInvalid = 500,
    #[error("reserved label")]
    LabelReserved = 501,
    #[error("label redefined")]
    LabelRedefined = 502,
    #[error("undefined label")]
    LabelUndefined = 503,
    #[error("entry without definition")]
    LabelEntryNotFound = 505,
    #[error("label is both entry and extern")]
    LabelEntryAndExtern = 506,
    #[error("label ignored")]
    LabelOnEntryOrExtern = 507,
    #[error("unused label")]
    LabelUnused = 508,
    #[error("repeated entry")]
    LabelEntryRepeated = 509,
    #[error("repeated extern")]
    LabelExternRepeated = 510,

    #[error("unknown statement")]
    InstructionUnknown = 600,
    #[error("wrong operand count")]
    InstructionOperandCount = 601,
    #[error("trailing characters")]
    InstructionTrailing = 602,
    #[error("illegal addressing mode")]
    InstructionAddressingMode = 603,
    #[error("invalid immediate")]
    ImmediateInvalid = 610,
    #[error("immediate out of range")]
    ImmediateOutOfRange = 611,
    #[error("floating point immediate")]
    ImmediateFloat = 612,
    #[error("invalid register")]
    RegisterInvalid = 613,
    #[error("register out of range")]
    RegisterOutOfRange = 614,
    #[error("malformed matrix access")]
    MatrixIndexInvalid = 615,
    #[error("matrix index out of range")]
    MatrixIndexOutOfRange = 616,
    #[error("matrix under-initialized")]
    MatrixUnderInitialized = 617,
    #[error("matrix over-initialized")]
    MatrixOverInitialized = 618,
    #[error("unrecognized operand")]
    OperandUnrecognized = 619,
    #[error("unknown directive")]
    DirectiveUnknown = 620,
    #[error("missing value")]
    DataMissingValue = 621,
    #[error("invalid value")]
    DataInvalidValue = 622,
    #[error("unterminated string")]
    StringUnterminated = 623,
    #[error("invalid matrix dimensions")]
    MatrixDimensions = 624,
    #[error("value out of range")]
    DataOutOfRange = 625,
    #[error("missing operand")]
    DirectiveMissingOperand = 626,
    #[error("invalid character")]
    StringInvalidChar = 627,

    #[error("program too large")]
    MemoryWordLimit = 700,
    #[error("line too long")]
    MemoryLineLength = 701,
    #[error("too many tokens")]
    MemoryTokenCount = 702,
    #[error("token too long")]
    MemoryTokenLength = 703,
}

impl Code {
    pub fn number(self) -> u16 {
        self as u16
    }

    pub fn severity(self) -> Severity {
        use Code as C;
        match self {
            C::MacroUnnamed
            | C::MacroRedefined
            | C::MacroEmpty
            | C::LabelOnEntryOrExtern
            | C::LabelUnused
            | C::LabelExternRepeated
            | C::MatrixUnderInitialized
            | C::MatrixOverInitialized
            | C::OperandUnrecognized => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    code: Code,
    severity: Severity,
    line: usize,
    message: String,
    help: Option<String>,
}

impl Diagnostic {
    /// Line `0` marks a diagnostic about the file as a whole.
    pub fn new<S: Into<String>>(code: Code, line: usize, message: S) -> Self {
        Diagnostic {
            code,
            severity: code.severity(),
            line,
            message: message.into(),
            help: None,
        }
    }

    pub fn with_help<S: Into<String>>(mut self, help: S) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Short identifier such as `E503` or `W507`.
    pub fn id(&self) -> String {
        let prefix = match self.severity {
            Severity::Error => 'E',
            Severity::Warning => 'W',
        };
        format!("{prefix}{:03}", self.code.number())
    }

    /// Prints the diagnostic to stderr, respecting [`VERBOSITY`].
    pub fn emit(&self, source: &str) {
        let verbosity = *VERBOSITY.get().unwrap_or(&Verbosity::Warning);
        let required = match self.severity {
            Severity::Error => Verbosity::Error,
            Severity::Warning => Verbosity::Warning,
        };

        if verbosity >= required {
            eprint!("{}", self.render(source));
        }
    }

    fn render(&self, source: &str) -> String {
        let header = match self.severity {
            Severity::Error => format!("error[{}]", self.id()).red().bold(),
            Severity::Warning => format!("warning[{}]", self.id()).yellow().bold(),
        };
        let arrow = "-->".blue().bold();

        let mut out = format!("{header}{} {}\n", ":".bold(), self.message.bold());
        if self.line == 0 {
            out += &format!("  {arrow} {source}\n");
        } else {
            out += &format!("  {arrow} {source}:{}\n", self.line);
        }
        if let Some(help) = &self.help {
            out += &format!("  {} {help}\n", "= help:".bold());
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {} ({})", self.severity, self.id(), self.message, self.code)?;
        if self.line != 0 {
            write!(f, " on line {}", self.line)?;
        }
        Ok(())
    }
}

/// Builds a [`Diagnostic`] with a formatted message.
///
/// ```ignore
/// diagnostic!(Code::LabelUndefined, 12, "undefined label `{name}`")
/// ```
#[macro_export]
macro_rules! diagnostic {
    ($code:expr, $line:expr, $($arg:tt)+) => {
        $crate::diagnostic::Diagnostic::new($code, $line, format!($($arg)+))
    };
}

/// Ordered, append-only log of everything reported during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::trace!("{diagnostic}");
        self.records.push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.records.iter()
    }

    pub fn error_count(&self) -> usize {
        self.records.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.records.len() - self.error_count()
    }

    pub fn has_errors(&self) -> bool {
        self.records.iter().any(Diagnostic::is_error)
    }

    /// Position to pass to [`Diagnostics::errors_since`] at a stage boundary.
    pub fn mark(&self) -> usize {
        self.records.len()
    }

    pub fn errors_since(&self, mark: usize) -> usize {
        self.records[mark.min(self.records.len())..]
            .iter()
            .filter(|d| d.is_error())
            .count()
    }

    pub fn codes(&self) -> Vec<Code> {
        self.records.iter().map(Diagnostic::code).collect()
    }

    pub fn emit(&self, source: &str) {
        for diagnostic in &self.records {
            diagnostic.emit(source);
        }
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        for diagnostic in iter {
            self.push(diagnostic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_follows_code() {
        assert_eq!(Code::MacroEmpty.severity(), Severity::Warning);
        assert_eq!(Code::LabelUndefined.severity(), Severity::Error);
        assert_eq!(Code::MemoryWordLimit.number(), 700);
    }

    #[test]
    fn id_is_prefixed_by_severity() {
        let warning = Diagnostic::new(Code::LabelOnEntryOrExtern, 3, "label ignored");
        let error = diagnostic!(Code::LabelUndefined, 7, "undefined label `{}`", "X");

        assert_eq!(warning.id(), "W507");
        assert_eq!(error.id(), "E503");
        assert_eq!(error.message(), "undefined label `X`");
        assert_eq!(error.line(), 7);
    }

    #[test]
    fn errors_since_mark() {
        let mut log = Diagnostics::new();
        log.push(Diagnostic::new(Code::LabelInvalid, 1, "bad"));
        let mark = log.mark();
        log.push(Diagnostic::new(Code::MacroEmpty, 2, "empty"));

        assert_eq!(log.errors_since(mark), 0);
        assert_eq!(log.error_count(), 1);
        assert_eq!(log.warning_count(), 1);

        log.push(Diagnostic::new(Code::LabelUndefined, 3, "missing"));
        assert_eq!(log.errors_since(mark), 1);
        assert_eq!(log.codes(), vec![Code::LabelInvalid, Code::MacroEmpty, Code::LabelUndefined]);
    }

    #[test]
    fn display_mentions_line() {
        let diagnostic = Diagnostic::new(Code::LabelUndefined, 4, "undefined label `X`");
        assert_eq!(
            diagnostic.to_string(),
            "error[E503]: undefined label `X` (undefined label) on line 4"
        );
    }
}
