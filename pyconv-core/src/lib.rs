//! Core of the pyconv converter.
//!
//! Translates a restricted subset of Python into C or C++ source text.
//! The pipeline is roughly:
//!
//!   source .py
//!     -> lexer      (tokens)
//!     -> parser     (syntax tree, unsupported shapes included)
//!     -> typecheck  (scopes + types, HIR and diagnostics)
//!     -> codegen    (shared emitter driving codegen_c / codegen_cpp)
//!
//! Transports (CLI, JSON) should depend on this crate rather than
//! reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod diagnostic;
pub mod error;

// ---------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------

pub mod options;
pub mod stack;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod lexer;
pub mod parser;
pub mod ast;

// ---------------------------------------------------------------------
// Semantic layers: types, scopes, type checking, HIR
// ---------------------------------------------------------------------

pub mod types;
pub mod scope;
pub mod typecheck;
pub mod hir;

// ---------------------------------------------------------------------
// Builtins
// ---------------------------------------------------------------------

pub mod builtins;

// ---------------------------------------------------------------------
// Back-end: code generation and compiler orchestration
// ---------------------------------------------------------------------

pub mod codegen;
pub mod codegen_c;
pub mod codegen_cpp;
pub mod compiler;
pub mod wire;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{Conversion, ConversionResult, convert, try_convert};
pub use diagnostic::{Diagnostic, Severity};
pub use error::CoreError;
pub use options::{ConvertOptions, Target};
