//! Number scanning for the Mug lexer
//!
//! Integers and floats share one scanner: the lexeme is an integer constant unless it contains a
//! fractional part (`1.5`, `.5`) or carries the `f` suffix (`3f`).

use super::Lexer;
use super::tokens::TokenKind;
use crate::ast::Span;
use crate::diagnostics::CompileError;

/// Lexemes this long cannot fit any integer type.
const MAX_CONSTANT_LEN: usize = 21;

impl<'a> Lexer<'a> {
    pub(super) fn scan_number(&mut self, start: usize, first: char) -> Result<(), CompileError> {
        let mut value = String::new();
        let mut is_float = false;

        if first == '.' {
            value.push_str("0.");
            is_float = true;
        } else {
            value.push(first);
        }

        self.scan_digits(&mut value);

        // Fractional part, but not a `..` range
        if !is_float && self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            value.push('.');
            self.advance();
            self.scan_digits(&mut value);
        }

        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            return Err(CompileError::lexical(
                "Invalid dot here",
                Span::new(self.current_pos - 1, self.current_pos),
            ));
        }

        if self.match_char('f') {
            is_float = true;
        }

        if value.len() >= MAX_CONSTANT_LEN {
            return Err(CompileError::lexical(
                "Constant overflow",
                Span::new(start, self.current_pos),
            ));
        }

        let kind = if is_float {
            TokenKind::ConstantFloatDigit
        } else {
            TokenKind::ConstantDigit
        };
        self.add_token_with_value(kind, value, start);
        Ok(())
    }

    /// Consume digits and `_` separators, keeping only the digits.
    fn scan_digits(&mut self, value: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                if c != '_' {
                    value.push(c);
                }
                self.advance();
            } else {
                break;
            }
        }
    }
}
