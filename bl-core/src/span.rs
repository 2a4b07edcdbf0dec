//! Source locations.
//!
//! The core never reads source text itself; spans are produced by the
//! (external) parser and carried through AST, MIR and diagnostics so that
//! every error can point back at the code that caused it.

use std::fmt;

/// Identifier of a source file within one compilation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FileId(pub u32);

/// Byte range in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Span {
    pub file: FileId,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(file: FileId, start: u32, end: u32) -> Self {
        Span { file, start, end }
    }

    /// A span for compiler-generated nodes with no source counterpart.
    pub fn dummy() -> Self {
        Span::default()
    }

    /// Smallest span covering both `self` and `other`.
    ///
    /// Spans from different files do not merge; `self` wins.
    pub fn to(self, other: Span) -> Span {
        if self.file != other.file {
            return self;
        }
        Span {
            file: self.file,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file#{}:{}..{}", self.file.0, self.start, self.end)
    }
}
