/// Token-stream helpers.
///
/// This chunk contains the low-level primitives used throughout parsing:
/// - Peeking/consuming tokens (`peek`, `advance`)
/// - Matching / expecting token kinds
/// - Speculative parsing with rollback (`speculate`)
impl<'a> Parser<'a> {
    // ========================================================================
    // Helpers
    // ========================================================================

    /// Return `true` if the current token is [`TokenKind::Eof`].
    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    /// Return the current token without consuming it.
    fn peek(&self) -> &'a Token {
        let tokens = self.tokens;
        &tokens[self.pos.min(tokens.len() - 1)]
    }

    /// Return the token after the current token without consuming it.
    fn peek_next(&self) -> &'a Token {
        let tokens = self.tokens;
        &tokens[(self.pos + 1).min(tokens.len() - 1)]
    }

    /// The most recently consumed token (or the first token at the start).
    fn previous(&self) -> &'a Token {
        let tokens = self.tokens;
        &tokens[self.pos.saturating_sub(1)]
    }

    /// Advance to the next token and return the token we just consumed.
    fn advance(&mut self) -> &'a Token {
        let token = self.peek();
        if !self.is_at_end() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn check_any(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.peek().kind)
    }

    /// If the current token matches `kind`, consume it and return `true`.
    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume and return the current token if it is one of `kinds`.
    fn match_any(&mut self, kinds: &[TokenKind]) -> Option<&'a Token> {
        if self.check_any(kinds) {
            Some(self.advance())
        } else {
            None
        }
    }

    /// Consume a token of `kind` or fail with "Expected `kind`, found `value`".
    fn expect(&mut self, kind: TokenKind, context: &str) -> PResult<&'a Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_expected(&kind.to_string(), context))
        }
    }

    fn expect_any(&mut self, kinds: &[TokenKind], context: &str) -> PResult<&'a Token> {
        if let Some(token) = self.match_any(kinds) {
            return Ok(token);
        }
        let expected = kinds.iter().map(|k| k.to_string()).collect::<Vec<_>>().join("`, `");
        Err(self.error_expected(&expected, context))
    }

    fn expect_identifier(&mut self, context: &str) -> PResult<Spanned<Ident>> {
        let token = self.expect(TokenKind::Identifier, context)?;
        Ok(Spanned::new(token.value.clone(), token.span))
    }

    /// Build the mismatch diagnostic for the current token.
    ///
    /// At end of stream the distinguished "Unexpected <EOF>" diagnostic is anchored at the last real
    /// token instead.
    fn error_expected(&self, expected: &str, context: &str) -> CompileError {
        let current = self.peek();
        if current.kind == TokenKind::Eof {
            errors::unexpected_eof(context, self.previous().span)
        } else {
            errors::expected_token(expected, &current.value, context, current.span)
        }
    }

    /// A custom syntax error at the current token, or the end-of-file diagnostic.
    fn error_here(&self, message: &str) -> CompileError {
        let current = self.peek();
        if current.kind == TokenKind::Eof {
            errors::unexpected_eof(message, self.previous().span)
        } else {
            CompileError::syntax(message, current.span)
        }
    }

    /// Run `production`; on failure restore the cursor and return `None`.
    fn speculate<T>(&mut self, production: impl FnOnce(&mut Self) -> PResult<T>) -> Option<T> {
        let snapshot = self.pos;
        match production(self) {
            Ok(value) => Some(value),
            Err(_) => {
                self.pos = snapshot;
                None
            }
        }
    }

    fn span_from(&self, start: Span) -> Span {
        start.merge(self.previous().span)
    }
}
