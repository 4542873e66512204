/// Expression parsing methods.
///
/// One method per precedence tier, lowest first:
/// - `expression`: inline `if`, `new` allocations, then logical
/// - `logical` (`&`, `|`) and `relational` (`==`, `<`, ...): the right operand recurses into the
///   same tier, so chains lean right
/// - `additive` (`+`, `-`) and `multiplicative` (`*`, `/`, `..`): iterative left folds
/// - `prefix` (`-`, `+`, `!`, `&`, `*`, `++`, `--`)
/// - `cast` (`expr as T`)
/// - `postfix`: `.member`, `[index]`, `(args)` and `<T>(args)`, built left to right
/// - `primary`: constants, identifiers and parenthesized expressions
impl<'a> Parser<'a> {
    // ========================================================================
    // Expressions
    // ========================================================================

    fn expression(&mut self) -> PResult<Spanned<Expr>> {
        match self.peek().kind {
            TokenKind::KeyIf => self.inline_if(),
            TokenKind::KeyNew => self.allocation(),
            _ => self.logical(),
        }
    }

    /// `if cond { a } else { b }`
    fn inline_if(&mut self) -> PResult<Spanned<Expr>> {
        let start = self.expect(TokenKind::KeyIf, "")?.span;
        let condition = self.expression()?;

        self.expect(TokenKind::OpenBrace, "the inline condition body must be enclosed in `{}`")?;
        let then_value = self.expression()?;
        self.expect(TokenKind::CloseBrace, "")?;

        self.expect(TokenKind::KeyElse, "in inline conditions there must be the else body")?;
        self.expect(TokenKind::OpenBrace, "the inline else body must be enclosed in `{}`")?;
        let else_value = self.expression()?;
        self.expect(TokenKind::CloseBrace, "")?;

        Ok(Spanned::new(
            Expr::InlineIf(Box::new(condition), Box::new(then_value), Box::new(else_value)),
            self.span_from(start),
        ))
    }

    /// `new Type{ field: value, ... }` or `new [Type, size]{ elements }`
    fn allocation(&mut self) -> PResult<Spanned<Expr>> {
        let start = self.expect(TokenKind::KeyNew, "")?.span;

        if self.match_token(TokenKind::OpenBracket) {
            let elem_type = self.parse_type()?;
            self.expect(TokenKind::Comma, "expected array size after its type")?;
            let size = self.expression()?;
            self.expect(TokenKind::CloseBracket, "expected `]` and the array body")?;

            self.expect(
                TokenKind::OpenBrace,
                "expected the array body, empty (`{}`) to instance it with default values",
            )?;
            let mut elements = Vec::new();
            if !self.check(TokenKind::CloseBrace) {
                loop {
                    elements.push(self.expression()?);
                    if !self.match_token(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::CloseBrace, "")?;

            return Ok(Spanned::new(
                Expr::ArrayAllocation(ArrayAllocation {
                    elem_type,
                    size: Box::new(size),
                    elements,
                }),
                self.span_from(start),
            ));
        }

        let ty = self.parse_type()?;
        self.expect(TokenKind::OpenBrace, "type allocation requires `{}`")?;
        let mut fields = Vec::new();
        if !self.check(TokenKind::CloseBrace) {
            loop {
                let name = self.expect_identifier("expected field assign")?;
                self.expect(TokenKind::Colon, "required `:` after field name")?;
                let value = self.expression()?;
                let span = name.span.merge(value.span);
                fields.push(Spanned::new(FieldInit { name: name.node, value }, span));
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::CloseBrace, "")?;

        Ok(Spanned::new(
            Expr::StructAllocation(StructAllocation { ty, fields }),
            self.span_from(start),
        ))
    }

    fn logical(&mut self) -> PResult<Spanned<Expr>> {
        let left = self.relational()?;
        let op = match self.peek().kind {
            TokenKind::Ampersand => BinaryOp::And,
            TokenKind::Pipe => BinaryOp::Or,
            _ => return Ok(left),
        };
        let op_span = self.advance().span;
        let right = self.logical()?;
        Ok(binary(Spanned::new(op, op_span), left, right))
    }

    fn relational(&mut self) -> PResult<Spanned<Expr>> {
        let left = self.additive()?;
        let op = match self.peek().kind {
            TokenKind::BooleanEQ => BinaryOp::Eq,
            TokenKind::BooleanNEQ => BinaryOp::NotEq,
            TokenKind::BooleanMinor => BinaryOp::Lt,
            TokenKind::BooleanMajor => BinaryOp::Gt,
            TokenKind::BooleanLEQ => BinaryOp::LtEq,
            TokenKind::BooleanGEQ => BinaryOp::GtEq,
            _ => return Ok(left),
        };
        let op_span = self.advance().span;
        let right = self.relational()?;
        Ok(binary(Spanned::new(op, op_span), left, right))
    }

    fn additive(&mut self) -> PResult<Spanned<Expr>> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let op_span = self.advance().span;
            let right = self.multiplicative()?;
            left = binary(Spanned::new(op, op_span), left, right);
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> PResult<Spanned<Expr>> {
        let mut left = self.prefix()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::RangeDots => BinaryOp::Range,
                _ => break,
            };
            let op_span = self.advance().span;
            let right = self.prefix()?;
            left = binary(Spanned::new(op, op_span), left, right);
        }
        Ok(left)
    }

    fn prefix(&mut self) -> PResult<Spanned<Expr>> {
        let op = match self.peek().kind {
            TokenKind::Minus => PrefixOp::Neg,
            TokenKind::Plus => PrefixOp::Plus,
            TokenKind::Negation => PrefixOp::Not,
            TokenKind::Ampersand => PrefixOp::AddressOf,
            TokenKind::Star => PrefixOp::Deref,
            TokenKind::OperatorIncrement => PrefixOp::Increment,
            TokenKind::OperatorDecrement => PrefixOp::Decrement,
            _ => return self.cast(),
        };
        let start = self.advance().span;
        let operand = self.prefix()?;
        let span = start.merge(operand.span);
        Ok(Spanned::new(Expr::Prefix(op, Box::new(operand)), span))
    }

    fn cast(&mut self) -> PResult<Spanned<Expr>> {
        let mut expr = self.postfix()?;
        while self.match_token(TokenKind::KeyAs) {
            let ty = self.parse_type()?;
            let span = expr.span.merge(ty.span);
            expr = Spanned::new(Expr::Cast(Box::new(expr), ty), span);
        }
        Ok(expr)
    }

    fn postfix(&mut self) -> PResult<Spanned<Expr>> {
        let mut expr = self.primary()?;

        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let member = self.expect_identifier("expected member, after `.`")?;
                    let span = expr.span.merge(member.span);
                    expr = Spanned::new(Expr::Member(Box::new(expr), member), span);
                }
                TokenKind::OpenBracket => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(TokenKind::CloseBracket, "")?;
                    let span = self.span_from(expr.span);
                    expr = Spanned::new(Expr::Index(Box::new(expr), Box::new(index)), span);
                }
                TokenKind::OpenPar => {
                    expr = self.call(expr, Vec::new())?;
                }
                TokenKind::BooleanMinor if is_callable(&expr.node) => {
                    // `f<T>(...)` versus `f < x`
                    let generics = self.speculate(|p| {
                        let args = p.type_args()?;
                        if !p.check(TokenKind::OpenPar) {
                            return Err(p.error_expected("OpenPar", ""));
                        }
                        Ok(args)
                    });
                    match generics {
                        Some(generics) => expr = self.call(expr, generics)?,
                        None => break,
                    }
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn call(&mut self, callee: Spanned<Expr>, generics: Vec<Spanned<Type>>) -> PResult<Spanned<Expr>> {
        self.expect(TokenKind::OpenPar, "")?;
        let mut args = Vec::new();
        if !self.check(TokenKind::ClosePar) {
            loop {
                args.push(self.expression()?);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::ClosePar, "arguments must be separated by a comma")?;

        let span = self.span_from(callee.span);
        Ok(Spanned::new(
            Expr::Call(CallExpr {
                callee: Box::new(callee),
                generics,
                args,
            }),
            span,
        ))
    }

    fn primary(&mut self) -> PResult<Spanned<Expr>> {
        let token = self.peek();

        if token.kind.is_constant() {
            let literal = self.constant("")?;
            return Ok(Spanned::new(Expr::Literal(literal.node), literal.span));
        }

        match token.kind {
            TokenKind::Identifier => {
                self.advance();
                Ok(Spanned::new(Expr::Identifier(token.value.clone()), token.span))
            }
            TokenKind::OpenPar => {
                self.advance();
                let inner = self.expression()?;
                self.expect(TokenKind::ClosePar, "")?;
                Ok(Spanned::new(inner.node, self.span_from(token.span)))
            }
            TokenKind::Eof => Err(self.error_here("")),
            _ => Err(CompileError::syntax(
                format!("Missing expression: `{}` is not a valid symbol in expression", token.value),
                token.span,
            )),
        }
    }

    /// A constant token, with an optional leading `-` on integers.
    fn constant(&mut self, context: &str) -> PResult<Spanned<Literal>> {
        let negative = self.check(TokenKind::Minus) && self.peek_next().kind == TokenKind::ConstantDigit;
        let start = if negative { Some(self.advance().span) } else { None };

        let token = self.expect_any(
            &[
                TokenKind::ConstantDigit,
                TokenKind::ConstantFloatDigit,
                TokenKind::ConstantString,
                TokenKind::ConstantChar,
                TokenKind::ConstantBoolean,
            ],
            context,
        )?;
        let span = start.map_or(token.span, |s| s.merge(token.span));

        let literal = match token.kind {
            TokenKind::ConstantDigit => {
                let digits = if negative {
                    format!("-{}", token.value)
                } else {
                    token.value.clone()
                };
                let value = digits
                    .parse::<i64>()
                    .map_err(|_| CompileError::syntax("Constant overflow", span))?;
                Literal::Int(value)
            }
            TokenKind::ConstantFloatDigit => {
                let value = token
                    .value
                    .parse::<f64>()
                    .map_err(|_| CompileError::syntax("Invalid float constant", span))?;
                Literal::Float(value)
            }
            TokenKind::ConstantString => Literal::Str(token.value.clone()),
            TokenKind::ConstantChar => match token.value.chars().next() {
                Some(c) => Literal::Char(c),
                None => return Err(CompileError::syntax("Empty char constant", span)),
            },
            _ => Literal::Bool(token.value == "true"),
        };

        Ok(Spanned::new(literal, span))
    }
}

fn binary(op: Spanned<BinaryOp>, left: Spanned<Expr>, right: Spanned<Expr>) -> Spanned<Expr> {
    let span = left.span.merge(right.span);
    Spanned::new(Expr::Binary(op, Box::new(left), Box::new(right)), span)
}

/// Only named functions can take generic arguments.
fn is_callable(expr: &Expr) -> bool {
    matches!(expr, Expr::Identifier(_) | Expr::Member(..))
}
