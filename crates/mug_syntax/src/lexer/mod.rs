//! Lexer for the Mug programming language
//!
//! Handles tokenization including:
//! - Keywords, primitive type names and identifiers (plain and backtick-quoted)
//! - Numeric, string, char and boolean constants
//! - Single and double character operators, `@[` pragma openers
//! - `#` line comments and `#[ ... ]#` block comments
//!
//! Lexical errors abort tokenization immediately: the first one is returned.
//!
//! ## Module Structure
//!
//! - `tokens` - Token types (TokenKind, Token) and the keyword table
//! - `strings` - String/char/backtick scanning and escapes
//! - `numbers` - Numeric literal scanning

mod numbers;
mod strings;
pub mod tokens;

pub use tokens::{Token, TokenKind, keyword_kind};

use crate::ast::Span;
use crate::diagnostics::CompileError;

/// Lexer for Mug source code.
///
/// A single forward pass over the source. Once [`Lexer::tokenize`] has consumed the input, the lexer
/// must be [`reset`](Lexer::reset) before it can produce the token stream again.
pub struct Lexer<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    /// 0-based line of `current_pos`
    line: usize,
    /// 0-based line where the token being scanned starts
    start_line: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            line: 0,
            start_line: 0,
            tokens: Vec::new(),
        }
    }

    /// Rewind to the start of the source.
    pub fn reset(&mut self) {
        self.chars = self.source.char_indices().peekable();
        self.current_pos = 0;
        self.line = 0;
        self.start_line = 0;
        self.tokens.clear();
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Tokenize the remaining source.
    ///
    /// The token stream always ends with an `Eof` token spanning `len..len + 1`.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, CompileError> {
        while !self.is_at_end() {
            self.scan_token()?;
        }

        let len = self.source.len();
        self.tokens
            .push(Token::new(TokenKind::Eof, "<EOF>", Span::new(len, len + 1), self.line));

        Ok(std::mem::take(&mut self.tokens))
    }

    // ========================================================================
    // Core character handling
    // ========================================================================

    fn is_at_end(&mut self) -> bool {
        self.chars.peek().is_none()
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.source[self.current_pos..].chars();
        iter.next();
        iter.next()
    }

    fn advance(&mut self) -> Option<char> {
        if let Some((pos, c)) = self.chars.next() {
            self.current_pos = pos + c.len_utf8();
            if c == '\n' {
                self.line += 1;
            }
            Some(c)
        } else {
            None
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    // ========================================================================
    // Main scanning dispatch
    // ========================================================================

    fn scan_token(&mut self) -> Result<(), CompileError> {
        let start = self.current_pos;
        self.start_line = self.line;

        let Some(c) = self.advance() else {
            return Ok(());
        };

        match c {
            _ if c.is_whitespace() || c.is_control() => {}

            '#' => {
                if self.match_char('[') {
                    self.skip_block_comment();
                } else {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
            }

            '@' => {
                if self.match_char('[') {
                    self.add_token(TokenKind::PragmaOpen, start);
                } else {
                    self.add_token(TokenKind::At, start);
                }
            }

            '(' => self.add_token(TokenKind::OpenPar, start),
            ')' => self.add_token(TokenKind::ClosePar, start),
            '[' => self.add_token(TokenKind::OpenBracket, start),
            ']' => self.add_token(TokenKind::CloseBracket, start),
            '{' => self.add_token(TokenKind::OpenBrace, start),
            '}' => self.add_token(TokenKind::CloseBrace, start),
            ',' => self.add_token(TokenKind::Comma, start),
            ':' => self.add_token(TokenKind::Colon, start),
            ';' => self.add_token(TokenKind::Semicolon, start),
            '&' => self.add_token(TokenKind::Ampersand, start),
            '|' => self.add_token(TokenKind::Pipe, start),

            '=' => self.operator(start, TokenKind::Equal, &[('=', TokenKind::BooleanEQ)]),
            '!' => self.operator(start, TokenKind::Negation, &[('=', TokenKind::BooleanNEQ)]),
            '<' => self.operator(start, TokenKind::BooleanMinor, &[('=', TokenKind::BooleanLEQ)]),
            '>' => self.operator(start, TokenKind::BooleanMajor, &[('=', TokenKind::BooleanGEQ)]),
            '+' => self.operator(
                start,
                TokenKind::Plus,
                &[('+', TokenKind::OperatorIncrement), ('=', TokenKind::AddAssignment)],
            ),
            '-' => self.operator(
                start,
                TokenKind::Minus,
                &[('-', TokenKind::OperatorDecrement), ('=', TokenKind::SubAssignment)],
            ),
            '*' => self.operator(start, TokenKind::Star, &[('=', TokenKind::MulAssignment)]),
            '/' => self.operator(start, TokenKind::Slash, &[('=', TokenKind::DivAssignment)]),

            '.' => {
                if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    // `.5` is read as `0.5`
                    self.scan_number(start, c)?;
                } else {
                    self.operator(start, TokenKind::Dot, &[('.', TokenKind::RangeDots)]);
                }
            }

            '"' => self.scan_string(start)?,
            '\'' => self.scan_char(start)?,
            '`' => self.scan_backtick(start)?,

            '0'..='9' => self.scan_number(start, c)?,

            _ if is_ident_start(c) => self.scan_identifier(start),

            _ => {
                return Err(CompileError::lexical(
                    format!("Invalid character `{}`", c),
                    Span::new(start, self.current_pos),
                ));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Token helpers
    // ========================================================================

    fn add_token(&mut self, kind: TokenKind, start: usize) {
        let value = self.source[start..self.current_pos].to_string();
        self.add_token_with_value(kind, value, start);
    }

    fn add_token_with_value(&mut self, kind: TokenKind, value: String, start: usize) {
        self.tokens.push(Token::new(
            kind,
            value,
            Span::new(start, self.current_pos),
            self.start_line,
        ));
    }

    /// Try to match a double-character operator, fallback to the single one.
    fn operator(&mut self, start: usize, simple: TokenKind, compounds: &[(char, TokenKind)]) {
        for (c, kind) in compounds {
            if self.match_char(*c) {
                self.add_token(*kind, start);
                return;
            }
        }
        self.add_token(simple, start);
    }

    /// Skip a `#[ ... ]#` comment. The first `]#` closes it; nesting is not tracked.
    fn skip_block_comment(&mut self) {
        while let Some(c) = self.advance() {
            if c == ']' && self.match_char('#') {
                return;
            }
        }
    }

    // ========================================================================
    // Identifier scanning
    // ========================================================================

    fn scan_identifier(&mut self, start: usize) {
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                self.advance();
            } else {
                break;
            }
        }

        let spelling = &self.source[start..self.current_pos];

        if spelling == "true" || spelling == "false" {
            self.add_token(TokenKind::ConstantBoolean, start);
        } else if let Some(kind) = keyword_kind(spelling) {
            self.add_token(kind, start);
        } else {
            self.add_token(TokenKind::Identifier, start);
        }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Check if a character can start an identifier.
fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

/// Check if a character can continue an identifier.
fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Convenience function to lex a source string.
///
/// This is a shorthand for `Lexer::new(source).tokenize()`.
#[tracing::instrument(skip_all, fields(source_len = source.len()))]
pub fn lex(source: &str) -> Result<Vec<Token>, CompileError> {
    Lexer::new(source).tokenize()
}
