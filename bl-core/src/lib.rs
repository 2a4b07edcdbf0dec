//! Core of the BL compiler: semantic analysis and compile-time execution.
//!
//! The pipeline is roughly:
//!
//!   parsed AST (one [`ast::Unit`] per file)
//!     -> scope graph       (symbols declared at first sight)
//!     -> scheduler + MIR builder (types, overloads, specialization)
//!     -> VM                (comptime expressions, static asserts)
//!     -> [`compiler::Program`] for a code generator
//!
//! Lexing, parsing and machine code generation live in other crates and
//! talk to this one through the AST and MIR types.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod diagnostic;
pub mod error;

// ---------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------

pub mod arena;
pub mod ast;
pub mod types;
pub mod value;
pub mod scope;
pub mod mir;

// ---------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------

pub mod scheduler;
mod builder;

// ---------------------------------------------------------------------
// Compile-time execution
// ---------------------------------------------------------------------

pub mod fold;
pub mod native;
pub mod vm;

// ---------------------------------------------------------------------
// Session orchestration
// ---------------------------------------------------------------------

pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{Program, Session, SessionConfig, TestCase, TestReport};
pub use diagnostic::{Diagnostic, ErrorKind, Severity};
pub use error::CoreError;
pub use value::ConstValue;
pub use vm::{Trap, TrapKind, VmConfig};
