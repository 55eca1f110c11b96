//! MBASIC parser
//!
//! Turns program text into the [`Program`] AST consumed by the analyzer.

pub mod ast;
pub mod parser;
pub mod visit;

// Re-export diagnostics from the diagnostics crate
pub use diagnostics::*;

pub use ast::*;
pub use parser::{parse_program, PResult};
pub use visit::{walk_expr, walk_lvalue, walk_program, walk_statement, Visitor};
