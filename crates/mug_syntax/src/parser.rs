//! Parser for the Mug programming language
//!
//! Converts a token stream into a [`NamespaceNode`]: a hand-written recursive-descent parser with
//! one function per precedence tier and a few narrowly scoped speculative sub-parses.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use mug_syntax::{lexer, parser};
//!
//! let source = "func main() { return; }";
//! let tokens = lexer::lex(source).unwrap();
//! let ast = parser::parse(&tokens, "main").unwrap();
//! assert_eq!(ast.members.len(), 1);
//! ```

use crate::ast::*;
use crate::diagnostics::{CompileError, errors};
use crate::lexer::{Token, TokenKind};

// NOTE: This module is split across multiple files using `include!` to keep all parser
// methods in the same Rust module (preserving privacy + call patterns) while avoiding
// a single large source file.

include!("parser/core.rs");
include!("parser/helpers.rs");
include!("parser/decl.rs");
include!("parser/types.rs");
include!("parser/stmts.rs");
include!("parser/expr.rs");
include!("parser/api.rs");
include!("parser/tests.rs");
