//! gnovm
//!
//! Interpreter for gno, a Go dialect. Source files are parsed into an
//! arena-backed tree, preprocessed once into a resolved form (static
//! blocks, value paths, folded constants, cached types) and then executed
//! by an op-stack machine.

pub mod ast;
pub mod error;
pub mod filetest;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod preprocess;
pub mod repl;
pub mod runtime;
pub mod scope;
pub mod stdlibs;
pub mod store;
pub mod transcribe;
pub mod types;
pub mod uverse;
pub mod values;

pub use ast::Span;
pub use error::{CompileError, Result};
pub use runtime::{Runtime, RuntimeOptions, run_source};
