/// Type-expression parsing methods.
///
/// This chunk parses syntactic type annotations:
/// - Primitive keywords (`i32`, `str`, `u1`, ...)
/// - User types with optional generic arguments (`Point`, `Box<i32>`)
/// - Arrays (`[i32]`) and pointers (`*chr`)
impl<'a> Parser<'a> {
    // ========================================================================
    // Types
    // ========================================================================

    fn parse_type(&mut self) -> PResult<Spanned<Type>> {
        let start = self.peek().span;

        if self.match_token(TokenKind::OpenBracket) {
            let elem = self.parse_type()?;
            self.expect(TokenKind::CloseBracket, "array types must be closed by `]`")?;
            return Ok(Spanned::new(Type::Array(Box::new(elem)), self.span_from(start)));
        }

        if self.match_token(TokenKind::Star) {
            let elem = self.parse_type()?;
            return Ok(Spanned::new(Type::Pointer(Box::new(elem)), self.span_from(start)));
        }

        if let Some(primitive) = primitive_type(self.peek().kind) {
            self.advance();
            return Ok(Spanned::new(Type::Primitive(primitive), start));
        }

        if self.check(TokenKind::Identifier) {
            let name = self.advance().value.clone();
            let args = if self.check(TokenKind::BooleanMinor) {
                self.type_args()?
            } else {
                Vec::new()
            };
            return Ok(Spanned::new(Type::Named(name, args), self.span_from(start)));
        }

        Err(self.error_expected("Identifier", "expected a type"))
    }

    /// `<T, U>` following a type name or a generic call.
    fn type_args(&mut self) -> PResult<Vec<Spanned<Type>>> {
        self.expect(TokenKind::BooleanMinor, "")?;
        let mut args = Vec::new();
        loop {
            args.push(self.parse_type()?);
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::BooleanMajor, "generic arguments must be closed by `>`")?;
        Ok(args)
    }
}

fn primitive_type(kind: TokenKind) -> Option<PrimitiveType> {
    let primitive = match kind {
        TokenKind::KeyTstr => PrimitiveType::Str,
        TokenKind::KeyTchr => PrimitiveType::Chr,
        TokenKind::KeyTbool => PrimitiveType::U1,
        TokenKind::KeyTi8 => PrimitiveType::U8,
        TokenKind::KeyTi32 => PrimitiveType::I32,
        TokenKind::KeyTi64 => PrimitiveType::I64,
        TokenKind::KeyTu32 => PrimitiveType::U32,
        TokenKind::KeyTu64 => PrimitiveType::U64,
        TokenKind::KeyTVoid => PrimitiveType::Void,
        TokenKind::KeyTunknown => PrimitiveType::Unknown,
        _ => return None,
    };
    Some(primitive)
}
