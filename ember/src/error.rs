//! Result, errors and compile diagnostics.
use std::{
    fmt::{self, Display, Formatter, Write as _},
    io,
    string::FromUtf8Error,
};

use crate::lex::Span;

pub type EmberResult<T> = std::result::Result<T, EmberError>;

#[derive(Debug)]
pub enum EmberError {
    /// Source failed to lex, parse or pass analysis.
    Compile(Diagnostics),
    /// VM error during interpreter loop.
    Runtime { message: String, line: u32 },
    /// Value stack capacity exceeded.
    StackOverflow,
    /// Call frame capacity exceeded.
    FrameOverflow,
    /// Global table capacity exceeded.
    GlobalOverflow,
    /// Malformed serialized chunk.
    Bytecode(String),
    Io(io::Error),
    Utf8(FromUtf8Error),
    Fmt(fmt::Error),
}

impl EmberError {
    pub fn runtime(message: impl ToString, line: u32) -> Self {
        Self::Runtime {
            message: message.to_string(),
            line,
        }
    }

    pub fn bytecode(message: impl ToString) -> Self {
        Self::Bytecode(message.to_string())
    }
}

impl Display for EmberError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile(diagnostics) => {
                write!(f, "compile failed with {} error(s)", diagnostics.error_count())?;
                for diagnostic in diagnostics.iter() {
                    write!(f, "\n{diagnostic}")?;
                }
                Ok(())
            }
            Self::Runtime { message, line } => write!(f, "[line {line}] runtime error: {message}"),
            Self::StackOverflow => write!(f, "stack overflow"),
            Self::FrameOverflow => write!(f, "call frame overflow"),
            Self::GlobalOverflow => write!(f, "too many globals"),
            Self::Bytecode(msg) => write!(f, "malformed bytecode: {msg}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::Utf8(err) => write!(f, "{err}"),
            Self::Fmt(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for EmberError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Utf8(err) => Some(err),
            Self::Fmt(err) => Some(err),
            _ => None,
        }
    }
}

impl From<Diagnostics> for EmberError {
    fn from(diagnostics: Diagnostics) -> Self {
        EmberError::Compile(diagnostics)
    }
}

impl From<io::Error> for EmberError {
    fn from(err: io::Error) -> Self {
        EmberError::Io(err)
    }
}

impl From<FromUtf8Error> for EmberError {
    fn from(err: FromUtf8Error) -> Self {
        EmberError::Utf8(err)
    }
}

impl From<fmt::Error> for EmberError {
    fn from(err: fmt::Error) -> Self {
        EmberError::Fmt(err)
    }
}

// ----------------------------------------------------------------------------
// Diagnostics

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    fn color(&self) -> &'static str {
        match self {
            Severity::Info => "\x1b[36m",
            Severity::Warn => "\x1b[33m",
            Severity::Error => "\x1b[31m",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warn => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexical,
    Syntax,
    Semantic,
    Type,
}

impl Display for DiagnosticKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::Lexical => write!(f, "lexical"),
            DiagnosticKind::Syntax => write!(f, "syntax"),
            DiagnosticKind::Semantic => write!(f, "semantic"),
            DiagnosticKind::Type => write!(f, "type"),
        }
    }
}

/// Message reported against a location in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, span: Span, message: impl ToString) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            message: message.to_string(),
            span,
        }
    }

    pub fn warn(kind: DiagnosticKind, span: Span, message: impl ToString) -> Self {
        Self {
            severity: Severity::Warn,
            kind,
            message: message.to_string(),
            span,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Write the diagnostic with a snippet of the offending line,
    /// and a caret under the column where it starts.
    pub fn render(&self, source: &str, color: bool, out: &mut impl fmt::Write) -> fmt::Result {
        const RESET: &str = "\x1b[0m";
        const BOLD: &str = "\x1b[1m";

        let (open, close, bold) = if color {
            (self.severity.color(), RESET, BOLD)
        } else {
            ("", "", "")
        };

        writeln!(
            out,
            "{bold}{open}{}[{}]{close}{bold}: {}{close}",
            self.severity, self.kind, self.message
        )?;
        writeln!(out, "  --> {}", self.span)?;

        let (line, _) = self.span.surrounding_line(source);
        let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
        let gutter = self.span.line.to_string();
        let pad = " ".repeat(gutter.len());
        let indent = " ".repeat(self.span.column.saturating_sub(1) as usize);
        let carets = "^".repeat((self.span.size as usize).clamp(1, line.len().max(1)));

        writeln!(out, "{pad} |")?;
        writeln!(out, "{gutter} | {line}")?;
        writeln!(out, "{pad} | {indent}{open}{carets}{close}")
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}[{}]: {}", self.span, self.severity, self.kind, self.message)
    }
}

/// Accumulated diagnostics of one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(diagnostics);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }

    /// Render every diagnostic against the source it was reported on.
    pub fn render(&self, source: &str, color: bool) -> String {
        let mut buf = String::new();
        for diagnostic in &self.items {
            // Writing into a String can't fail.
            let _ = diagnostic.render(source, color, &mut buf);
            let _ = writeln!(buf);
        }
        buf
    }
}

impl From<Vec<Diagnostic>> for Diagnostics {
    fn from(items: Vec<Diagnostic>) -> Self {
        Self { items }
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_render_caret_under_column() {
        const CODE: &str = "let a = 1;\nlet b = ;\n";
        let span = Span {
            index: 19,
            size: 1,
            line: 2,
            column: 9,
        };
        let diagnostic = Diagnostic::error(DiagnosticKind::Syntax, span, "expected expression");

        let mut out = String::new();
        diagnostic.render(CODE, false, &mut out).unwrap();
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[0], "error[syntax]: expected expression");
        assert_eq!(lines[1], "  --> 2:9");
        assert_eq!(lines[3], "2 | let b = ;");
        assert_eq!(lines[4], format!("  | {}^", " ".repeat(8)));
    }

    #[test]
    fn test_only_errors_block() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::warn(DiagnosticKind::Type, Span::default(), "unused"));
        assert!(!diagnostics.has_errors());

        diagnostics.push(Diagnostic::error(DiagnosticKind::Semantic, Span::default(), "undefined"));
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.error_count(), 1);
    }
}
