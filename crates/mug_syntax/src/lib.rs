//! Syntax frontend for the Mug language: lexer, parser, AST and diagnostics.
//!
//! This crate is syntax-only: it does not resolve names, check types or emit code. The compiler
//! proper (`mugc`) consumes the [`ast::NamespaceNode`] produced here.
//!
//! ## Examples
//! ```rust,no_run
//! use mug_syntax::{lexer, parser};
//!
//! let tokens = lexer::lex("func main() { }").unwrap();
//! let unit = parser::parse(&tokens, "main").unwrap();
//! assert_eq!(unit.members.len(), 1);
//! ```

pub mod ast;
pub mod diagnostics;
pub mod lexer;
pub mod parser;
