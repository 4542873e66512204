/// Statement parsing methods.
///
/// This chunk parses `{ ... }` blocks and the local statement forms: declarations, `return`,
/// conditionals, loops, loop control, assignments and call statements.
///
/// ## Notes
/// - Assignment is statement-level only: the left-hand factor is parsed first, then an assignment
///   operator is looked for.
/// - A factor that is not followed by an assignment operator must be a call.
impl<'a> Parser<'a> {
    // ========================================================================
    // Statements
    // ========================================================================

    fn block(&mut self) -> PResult<Block> {
        self.expect(TokenKind::OpenBrace, "a block statement must start by `{`")?;

        let mut statements = Vec::new();
        while !self.check(TokenKind::CloseBrace) {
            if self.is_at_end() {
                return Err(self.error_expected("CloseBrace", "a block statement must end with `}`"));
            }
            statements.push(self.statement()?);
        }

        self.expect(TokenKind::CloseBrace, "")?;
        Ok(statements)
    }

    fn statement(&mut self) -> PResult<Spanned<Statement>> {
        let start = self.peek().span;

        let statement = match self.peek().kind {
            TokenKind::KeyVar => {
                let decl = self.variable_decl()?;
                self.expect(TokenKind::Semicolon, "")?;
                Statement::Variable(decl)
            }
            TokenKind::KeyConst => self.constant_decl()?,
            TokenKind::KeyReturn => self.return_stmt()?,
            TokenKind::KeyIf => Statement::Conditional(self.conditional()?),
            TokenKind::KeyElif | TokenKind::KeyElse => {
                return Err(self.error_here("The 'elif' and 'else' conditions shall be referenced to an 'if' block"));
            }
            TokenKind::KeyWhile => {
                self.advance();
                let condition = self.expression()?;
                let body = self.block()?;
                Statement::While(WhileLoop { condition, body })
            }
            TokenKind::KeyFor => self.for_loop()?,
            TokenKind::KeyBreak | TokenKind::KeyContinue => {
                let keyword = self.advance();
                self.expect(TokenKind::Semicolon, "")?;
                if keyword.kind == TokenKind::KeyBreak {
                    Statement::Break
                } else {
                    Statement::Continue
                }
            }
            _ => {
                let statement = self.assignment_or_call()?;
                self.expect(TokenKind::Semicolon, "")?;
                statement
            }
        };

        Ok(Spanned::new(statement, self.span_from(start)))
    }

    /// `var name (: type)? (= expr)?` without the trailing `;`.
    fn variable_decl(&mut self) -> PResult<VariableDecl> {
        self.expect(TokenKind::KeyVar, "")?;
        let name = self.expect_identifier("expected the variable id")?;
        let ty = if self.match_token(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let value = if self.match_token(TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        Ok(VariableDecl { name, ty, value })
    }

    fn constant_decl(&mut self) -> PResult<Statement> {
        self.expect(TokenKind::KeyConst, "")?;
        let name = self.expect_identifier("expected the constant id")?;
        let ty = if self.match_token(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        if self.check(TokenKind::Semicolon) {
            return Err(self.error_here("A constant cannot be declared without a body"));
        }
        self.expect(TokenKind::Equal, "to define the value of a constant must open the body with `=`")?;
        let value = Some(self.expression()?);
        self.expect(TokenKind::Semicolon, "")?;
        Ok(Statement::Constant(VariableDecl { name, ty, value }))
    }

    fn return_stmt(&mut self) -> PResult<Statement> {
        self.expect(TokenKind::KeyReturn, "")?;

        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            match self.speculate(|p| p.expression()) {
                Some(expr) => Some(expr),
                // Re-parse for the real diagnostic
                None => Some(self.expression()?),
            }
        };

        self.expect(TokenKind::Semicolon, "")?;
        Ok(Statement::Return(value))
    }

    /// `if cond { } (elif cond { })* (else { })?`
    fn conditional(&mut self) -> PResult<Conditional> {
        self.expect_any(&[TokenKind::KeyIf, TokenKind::KeyElif], "")?;
        let condition = self.expression()?;
        let body = self.block()?;

        let else_branch = if self.check(TokenKind::KeyElif) {
            let start = self.peek().span;
            let elif = self.conditional()?;
            Some(Box::new(Spanned::new(ElseBranch::Elif(elif), self.span_from(start))))
        } else if self.check(TokenKind::KeyElse) {
            let start = self.advance().span;
            let block = self.block()?;
            Some(Box::new(Spanned::new(ElseBranch::Else(block), self.span_from(start))))
        } else {
            None
        };

        Ok(Conditional {
            condition,
            body,
            else_branch,
        })
    }

    /// `for left?, condition?, right? { body }`
    fn for_loop(&mut self) -> PResult<Statement> {
        self.expect(TokenKind::KeyFor, "")?;

        let left = if self.check(TokenKind::Comma) {
            None
        } else {
            let start = self.peek().span;
            let statement = if self.check(TokenKind::KeyVar) {
                Statement::Variable(self.variable_decl()?)
            } else {
                self.assignment()?
            };
            Some(Box::new(Spanned::new(statement, self.span_from(start))))
        };
        self.expect(TokenKind::Comma, "the for statement clauses are separated by `,`")?;

        let condition = if self.check(TokenKind::Comma) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::Comma, "the for statement clauses are separated by `,`")?;

        let right = if self.check(TokenKind::OpenBrace) {
            None
        } else {
            let start = self.peek().span;
            let statement = self.assignment()?;
            Some(Box::new(Spanned::new(statement, self.span_from(start))))
        };

        let body = self.block()?;
        Ok(Statement::For(ForLoop {
            left,
            condition,
            right,
            body,
        }))
    }

    /// An assignment whose operator is mandatory.
    fn assignment(&mut self) -> PResult<Statement> {
        let target = self.prefix()?;
        match self.assignment_tail(target)? {
            Ok(statement) => Ok(statement),
            Err(target) => Err(CompileError::syntax(
                "Expected an assignment operator after the assigned value",
                target.span,
            )),
        }
    }

    /// `target op value`, `target++` or a call, without the trailing `;`.
    fn assignment_or_call(&mut self) -> PResult<Statement> {
        let factor = self.prefix()?;
        match self.assignment_tail(factor)? {
            Ok(statement) => Ok(statement),
            Err(factor) if matches!(factor.node, Expr::Call(_)) => Ok(Statement::Expr(factor)),
            Err(factor) => Err(CompileError::syntax(
                "In the current local context, this is not a valid imperative statement",
                factor.span,
            )),
        }
    }

    /// Look for an assignment operator after `target`; hands the factor back when there is none.
    fn assignment_tail(&mut self, target: Spanned<Expr>) -> PResult<Result<Statement, Spanned<Expr>>> {
        let op = match self.peek().kind {
            TokenKind::Equal => AssignOp::Assign,
            TokenKind::AddAssignment => AssignOp::AddAssign,
            TokenKind::SubAssignment => AssignOp::SubAssign,
            TokenKind::MulAssignment => AssignOp::MulAssign,
            TokenKind::DivAssignment => AssignOp::DivAssign,
            TokenKind::OperatorIncrement => AssignOp::Increment,
            TokenKind::OperatorDecrement => AssignOp::Decrement,
            _ => return Ok(Err(target)),
        };
        self.advance();

        if !is_assignable(&target.node) {
            return Err(CompileError::syntax(
                format!("Cannot apply `{}` to this expression", op),
                target.span,
            ));
        }

        let value = match op {
            AssignOp::Increment | AssignOp::Decrement => None,
            _ => Some(self.expression()?),
        };

        Ok(Ok(Statement::Assignment(Assignment { target, op, value })))
    }
}

/// Identifiers, member and index accesses and dereferences can be stored to.
fn is_assignable(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Identifier(_) | Expr::Member(..) | Expr::Index(..) | Expr::Prefix(PrefixOp::Deref, _)
    )
}
