//! Source-dialect front end for the bb pool.
//!
//! Hand-written indentation-aware lexer and recursive descent parser with
//! precedence climbing for expressions, producing an owned AST with no
//! source locations. The [`unparse`] module serializes a tree back to one
//! deterministic textual form, which is what the pool hashes.
//!
//! The dialect is the Python subset a pool unit can contain: imports plus
//! one (possibly async) function definition. f-strings are not part of
//! the dialect and fail to lex.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;
pub mod unparse;

pub use ast::Module;
pub use lexer::tokenize;
pub use parser::parse_module;
pub use unparse::unparse;
