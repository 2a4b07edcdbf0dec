use thiserror::Error;

use crate::ast::AstId;
use crate::diagnostic::Diagnostic;
use crate::vm::Trap;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed AST node {node:?}: {message}")]
    MalformedAst { node: AstId, message: String },
    #[error("compilation failed with {} error(s)", count_errors(.0))]
    CompilationFailed(Vec<Diagnostic>),
    #[error("compile-time execution trapped: {0}")]
    Trap(Trap),
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Diagnostics carried by a failed compilation, empty for other variants.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CoreError::CompilationFailed(diags) => diags,
            _ => &[],
        }
    }
}

fn count_errors(diags: &[Diagnostic]) -> usize {
    diags.iter().filter(|d| d.is_error()).count()
}
