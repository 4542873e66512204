//! String, char and backtick scanning for the Mug lexer

use super::Lexer;
use super::tokens::{TokenKind, keyword_kind};
use crate::ast::Span;
use crate::diagnostics::CompileError;

/// Characters allowed in a backtick-quoted operator name.
const BACKTICK_OPERATOR_CHARS: &[char] = &['[', ']', '!', '-', '+', '*', '/', '='];

impl<'a> Lexer<'a> {
    /// Scan a `"..."` literal. The opening quote is already consumed.
    pub(super) fn scan_string(&mut self, start: usize) -> Result<(), CompileError> {
        let value = self.scan_quoted(start, '"', "String")?;
        self.add_token_with_value(TokenKind::ConstantString, value, start);
        Ok(())
    }

    /// Scan a `'c'` literal, which must decode to exactly one character.
    pub(super) fn scan_char(&mut self, start: usize) -> Result<(), CompileError> {
        let value = self.scan_quoted(start, '\'', "Char")?;
        let span = Span::new(start, self.current_pos);

        match value.chars().count() {
            1 => {}
            0 => return Err(CompileError::lexical("Not enough characters in const char", span)),
            _ => return Err(CompileError::lexical("Too many characters in const char", span)),
        }

        self.add_token_with_value(TokenKind::ConstantChar, value, start);
        Ok(())
    }

    /// Scan a backtick-quoted identifier: an operator spelling or a keyword.
    pub(super) fn scan_backtick(&mut self, start: usize) -> Result<(), CompileError> {
        let mut raw = String::new();
        loop {
            match self.advance() {
                Some('`') => break,
                Some(c) => raw.push(c),
                None => {
                    return Err(CompileError::lexical(
                        "Backtick sequence has not been correctly enclosed",
                        Span::new(start, self.current_pos),
                    ));
                }
            }
        }

        let span = Span::new(start, self.current_pos);
        let sequence: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

        if sequence.is_empty() {
            return Err(CompileError::lexical(
                "Not enough characters in backtick sequence",
                span,
            ));
        }

        let is_operator = sequence.chars().all(|c| BACKTICK_OPERATOR_CHARS.contains(&c));
        if !is_operator && keyword_kind(&sequence).is_none() {
            return Err(CompileError::lexical("Invalid backtick sequence", span));
        }

        self.add_token_with_value(TokenKind::Identifier, sequence, start);
        Ok(())
    }

    /// Collect characters up to `quote`, decoding escapes.
    fn scan_quoted(&mut self, start: usize, quote: char, what: &str) -> Result<String, CompileError> {
        let mut value = String::new();

        loop {
            match self.advance() {
                Some(c) if c == quote => return Ok(value),
                Some('\\') => {
                    let escape_start = self.current_pos - 1;
                    let escaped = self.advance().and_then(decode_escape).ok_or_else(|| {
                        CompileError::lexical(
                            "Unable to recognize escaped char",
                            Span::new(escape_start, self.current_pos),
                        )
                    })?;
                    value.push(escaped);
                }
                Some(c) => value.push(c),
                None => {
                    return Err(CompileError::lexical(
                        format!("{} has not been correctly enclosed", what),
                        Span::new(start, self.current_pos),
                    ));
                }
            }
        }
    }
}

fn decode_escape(c: char) -> Option<char> {
    match c {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        '0' => Some('\0'),
        '\'' | '"' | '\\' => Some(c),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::Span;
    use crate::lexer::{TokenKind, lex};

    #[test]
    fn test_string_with_escapes() {
        let tokens = lex(r#""a\n\t\"b\\""#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::ConstantString);
        assert_eq!(tokens[0].value, "a\n\t\"b\\");
        assert_eq!(tokens[0].span, Span::new(0, 12));
    }

    #[test]
    fn test_unterminated_string() {
        let err = lex("var s = \"abc").unwrap_err();
        assert_eq!(err.message, "String has not been correctly enclosed");
        assert_eq!(err.span, Some(Span::new(8, 12)));
    }

    #[test]
    fn test_unknown_escape() {
        let err = lex(r#""\q""#).unwrap_err();
        assert_eq!(err.message, "Unable to recognize escaped char");
    }

    #[test]
    fn test_char_literals() {
        let tokens = lex(r"'a' '\n'").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::ConstantChar);
        assert_eq!(tokens[0].value, "a");
        assert_eq!(tokens[1].value, "\n");

        assert_eq!(lex("'ab'").unwrap_err().message, "Too many characters in const char");
        assert_eq!(lex("''").unwrap_err().message, "Not enough characters in const char");
        assert_eq!(lex("'a").unwrap_err().message, "Char has not been correctly enclosed");
    }

    #[test]
    fn test_backticks() {
        let tokens = lex("`+` `==` `as`").unwrap();
        assert!(tokens[..3].iter().all(|t| t.kind == TokenKind::Identifier));
        assert_eq!(tokens[0].value, "+");
        assert_eq!(tokens[1].value, "==");
        assert_eq!(tokens[2].value, "as");

        assert_eq!(lex("`foo`").unwrap_err().message, "Invalid backtick sequence");
        assert_eq!(lex("``").unwrap_err().message, "Not enough characters in backtick sequence");
    }
}
