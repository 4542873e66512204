//! Mug compiler frontend
//!
//! - `lexer`, `parser`, `ast`, `diagnostics`: provided by the `mug_syntax` crate
//! - `types`: the value types of the language
//! - `symbols`: symbol table and overload resolution
//! - `resolver`: import resolution for multi-file programs

pub use mug_syntax::{ast, diagnostics, lexer, parser};

pub mod resolver;
pub mod symbols;
pub mod types;
