#![forbid(unsafe_code)]
//! Mug Programming Language Compiler
//!
//! Mug is a small statically typed systems language. This crate provides the compiler: the frontend
//! (types, symbol table, import resolution) on top of the `mug_syntax` crate, the backend (semantic
//! emission into an in-memory module and the native toolchain driver) and the `mugc` CLI.
//!
//! ## Panic Policy
//!
//! This codebase follows explicit error handling:
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module
//!   enforces `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.

pub mod backend;
pub mod cli;
pub mod frontend;

pub use frontend::ast;
pub use frontend::diagnostics;
pub use frontend::lexer;
pub use frontend::parser;
pub use frontend::symbols;
pub use frontend::types;

pub use backend::{BackendModule, IRGenerator, Session, UnitRole};
