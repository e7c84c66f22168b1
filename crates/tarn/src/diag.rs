//! Diagnostics are values routed through a console sink, never control
//! flow. The exit status of a compilation is the maximum severity seen.

use crate::ast::Pos;
use std::fmt;

/// Diagnostic severity, in ascending order. `Bug` marks a broken internal
/// invariant and must never fire on valid input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Detail,
    Info,
    Warning,
    Error,
    Bug,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: &'static str,
    pub filename: String,
    pub pos: Pos,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        code: &'static str,
        filename: &str,
        pos: Pos,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            code,
            filename: filename.to_owned(),
            pos,
            message: message.into(),
        }
    }

    pub fn error(code: &'static str, filename: &str, pos: Pos, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, filename, pos, message)
    }

    pub fn warning(
        code: &'static str,
        filename: &str,
        pos: Pos,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Warning, code, filename, pos, message)
    }

    pub fn info(code: &'static str, filename: &str, pos: Pos, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, code, filename, pos, message)
    }

    pub fn detail(
        code: &'static str,
        filename: &str,
        pos: Pos,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Detail, code, filename, pos, message)
    }

    pub fn bug(code: &'static str, filename: &str, pos: Pos, message: impl Into<String>) -> Self {
        Self::new(Severity::Bug, code, filename, pos, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} [{}] {}", self.severity, self.code, self.message)?;
        if self.pos != Pos::NONE {
            write!(
                f,
                " ({}:{}:{})",
                self.filename, self.pos.line, self.pos.column
            )?;
        }
        Ok(())
    }
}

/// The sink diagnostics are reported to. Implemented by the host tool;
/// the compilation stages only ever call `report`.
pub trait Console {
    fn report(&mut self, diagnostic: Diagnostic);

    /// The highest severity reported so far, if any.
    fn max_severity(&self) -> Option<Severity>;

    /// Whether compilation must stop before the next stage.
    fn aborted(&self) -> bool {
        self.max_severity() >= Some(Severity::Error)
    }
}

/// A console that retains every diagnostic, mainly for tests and batch
/// drivers that print after the fact.
#[derive(Debug, Default)]
pub struct ConsoleBuffer {
    pub diagnostics: Vec<Diagnostic>,
    max_severity: Option<Severity>,
}

impl ConsoleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn codes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.diagnostics.iter().map(|d| d.code)
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.diagnostics.iter().any(|d| d.code == code)
    }
}

impl Console for ConsoleBuffer {
    fn report(&mut self, diagnostic: Diagnostic) {
        tracing::debug!(
            code = diagnostic.code,
            severity = ?diagnostic.severity,
            "{}",
            diagnostic.message
        );
        self.max_severity = self.max_severity.max(Some(diagnostic.severity));
        self.diagnostics.push(diagnostic);
    }

    fn max_severity(&self) -> Option<Severity> {
        self.max_severity
    }
}
