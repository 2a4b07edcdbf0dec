//! Diagnostics emitted by analysis and compile-time execution.

use std::fmt;
use std::sync::Mutex;

use crate::span::Span;
use crate::vm::TrapKind;

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// Error taxonomy of the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed AST shape; the parser contract was broken.
    Internal,
    /// Mismatch, unknown type, invalid conversion.
    Type,
    /// Undeclared identifier, redeclaration, ambiguous or missing overload.
    Resolution,
    /// Circular dependency between analysis tasks.
    Dependency,
    /// Fault detected while executing code at compile time.
    Trap(TrapKind),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Internal => write!(f, "internal"),
            ErrorKind::Type => write!(f, "type"),
            ErrorKind::Resolution => write!(f, "resolution"),
            ErrorKind::Dependency => write!(f, "dependency"),
            ErrorKind::Trap(kind) => write!(f, "trap({kind})"),
        }
    }
}

/// Secondary location attached to a diagnostic, e.g. an overload candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub message: String,
    pub span: Option<Span>,
}

/// A single diagnostic message.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: ErrorKind,
    pub message: String,
    pub span: Option<Span>,
    pub notes: Vec<Note>,
}

impl Diagnostic {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    pub fn warning(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(kind, message)
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_note(mut self, message: impl Into<String>, span: Option<Span>) -> Self {
        self.notes.push(Note {
            message: message.into(),
            span,
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        write!(f, "{level}[{}]: {}", self.kind, self.message)?;
        if let Some(span) = self.span {
            write!(f, " at {span}")?;
        }
        for note in &self.notes {
            write!(f, "\n  note: {}", note.message)?;
            if let Some(span) = note.span {
                write!(f, " at {span}")?;
            }
        }
        Ok(())
    }
}

/// Append-only diagnostic sink shared by every task of a session.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, diagnostic: Diagnostic) {
        log::debug!("diagnostic: {diagnostic}");
        self.lock().push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.lock().iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.lock().iter().filter(|d| d.is_error()).count()
    }

    /// Snapshot of every diagnostic, ordered by location.
    pub fn to_vec(&self) -> Vec<Diagnostic> {
        let mut all = self.lock().clone();
        all.sort_by_key(|d| (d.span, d.severity));
        all
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        let mut all = match self.entries.into_inner() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        all.sort_by_key(|d| (d.span, d.severity));
        all
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Diagnostic>> {
        // A panic while holding the lock cannot leave a half-pushed entry.
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
