/// Global member parsing.
///
/// Members are dispatched on their leading keyword in a fixed priority: functions, types, enums,
/// error sets, variables, then directives (`import`, `use`, `declare`, `when`).
impl<'a> Parser<'a> {
    fn member(&mut self) -> PResult<Spanned<Member>> {
        let start = self.peek().span;

        let pragmas = if self.match_token(TokenKind::PragmaOpen) {
            Some(self.pragmas()?)
        } else {
            None
        };

        let visibility = match self.match_any(&[TokenKind::KeyPub, TokenKind::KeyPriv]) {
            Some(t) if t.kind == TokenKind::KeyPub => Some(Visibility::Public),
            Some(_) => Some(Visibility::Private),
            None => None,
        };

        let member = match self.peek().kind {
            TokenKind::KeyFunc => {
                let mut func = self.function()?;
                func.visibility = visibility.unwrap_or_default();
                func.pragmas = pragmas.unwrap_or_default();
                Member::Function(func)
            }
            TokenKind::KeyType => {
                let mut decl = self.struct_decl()?;
                decl.visibility = visibility.unwrap_or_default();
                decl.pragmas = pragmas.unwrap_or_default();
                Member::Struct(decl)
            }
            TokenKind::KeyEnum => {
                let mut decl = self.enum_decl()?;
                decl.visibility = visibility.unwrap_or_default();
                decl.pragmas = pragmas.unwrap_or_default();
                Member::Enum(decl)
            }
            TokenKind::KeyError if pragmas.is_none() => {
                let mut decl = self.error_set_decl()?;
                decl.visibility = visibility.unwrap_or_default();
                Member::ErrorSet(decl)
            }
            _ if pragmas.is_some() || visibility.is_some() => {
                return Err(self.error_here("Modifiers and pragmas only apply to functions, types and enums"));
            }
            TokenKind::KeyVar => {
                let decl = self.variable_decl()?;
                self.expect(TokenKind::Semicolon, "")?;
                Member::Variable(decl)
            }
            TokenKind::KeyImport => Member::Import(self.import_directive()?),
            TokenKind::KeyUse => Member::Use(self.use_directive()?),
            TokenKind::KeyDeclare => {
                self.advance();
                let symbol = self.expect_identifier("expected the compiler symbol to declare")?;
                self.expect(TokenKind::Semicolon, "")?;
                Member::Declare(symbol)
            }
            TokenKind::KeyWhen => Member::When(self.when_block()?),
            _ => {
                return Err(self.error_here("In the current global context, this is not a valid global statement"));
            }
        };

        Ok(Spanned::new(member, self.span_from(start)))
    }

    // ========================================================================
    // Pragmas
    // ========================================================================

    /// Parse `name: constant, ...]` after `@[`.
    fn pragmas(&mut self) -> PResult<Pragmas> {
        let mut pragmas = Pragmas::default();

        loop {
            let name = self.expect_identifier("expected a pragma name")?;
            self.expect(TokenKind::Colon, "expected `:` after the pragma name")?;
            let value = self.expect_any(
                &[TokenKind::ConstantString, TokenKind::ConstantBoolean],
                "a pragma value must be a string or boolean constant",
            )?;

            if !Pragmas::NAMES.contains(&name.node.as_str()) {
                return Err(CompileError::syntax("Unknown pragma", name.span));
            }

            if name.node == "inline" {
                if value.kind != TokenKind::ConstantBoolean {
                    return Err(CompileError::syntax(
                        "Pragma 'inline' expects a boolean constant",
                        value.span,
                    ));
                }
                pragmas.inline = value.value == "true";
            } else {
                if value.kind != TokenKind::ConstantString {
                    return Err(CompileError::syntax(
                        format!("Pragma '{}' expects a string constant", name.node),
                        value.span,
                    ));
                }
                let slot = match name.node.as_str() {
                    "header" => &mut pragmas.header,
                    "code" => &mut pragmas.code,
                    "dynamiclib" => &mut pragmas.dynamiclib,
                    "export" => &mut pragmas.export,
                    _ => &mut pragmas.extern_name,
                };
                if slot.is_some() {
                    return Err(CompileError::syntax("Pragma already set", name.span));
                }
                *slot = Some(Spanned::new(value.value.clone(), value.span));
            }

            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::CloseBracket, "pragmas must be closed by `]`")?;
        Ok(pragmas)
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// `func [(self: T)] name[type T, ...](params): type { body }` or a `;`-terminated prototype.
    fn function(&mut self) -> PResult<FunctionDecl> {
        self.expect(TokenKind::KeyFunc, "")?;

        let receiver = if self.check(TokenKind::OpenPar) {
            let start = self.advance().span;
            let param = self.param()?;
            self.expect(TokenKind::ClosePar, "a receiver declares exactly one parameter")?;
            Some(Spanned::new(param.node, self.span_from(start)))
        } else {
            None
        };

        let name = self.expect_identifier("in function definition must specify the name")?;
        let generics = self.generic_params()?;
        let params = self.param_list()?;

        let return_type = if self.match_token(TokenKind::Colon) {
            self.parse_type()?
        } else {
            Spanned::new(Type::Primitive(PrimitiveType::Void), name.span)
        };

        let body = if self.check(TokenKind::OpenBrace) {
            Some(self.block()?)
        } else {
            self.expect(TokenKind::Semicolon, "expected a function body or `;` for a prototype")?;
            None
        };

        let mut func = FunctionDecl::new(name, params, return_type, body);
        func.receiver = receiver;
        func.generics = generics;
        Ok(func)
    }

    fn param_list(&mut self) -> PResult<Vec<Spanned<Param>>> {
        self.expect(
            TokenKind::OpenPar,
            "in function definition you must open a parenthesis to declare parameters",
        )?;

        let mut params = Vec::new();
        if !self.check(TokenKind::ClosePar) {
            loop {
                params.push(self.param()?);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::ClosePar, "parameters must be separated by a comma")?;
        Ok(params)
    }

    fn param(&mut self) -> PResult<Spanned<Param>> {
        let name = self.expect_identifier("in parameter declaration must specify the param name")?;
        self.expect(TokenKind::Colon, "in parameter declaration must specify the param type")?;
        let ty = self.parse_type()?;
        let span = name.span.merge(ty.span);
        Ok(Spanned::new(Param { name: name.node, ty }, span))
    }

    /// `[type T, type U]` after a function or type name.
    fn generic_params(&mut self) -> PResult<Vec<Spanned<Ident>>> {
        let mut generics = Vec::new();
        if !self.match_token(TokenKind::OpenBracket) {
            return Ok(generics);
        }

        loop {
            self.expect(TokenKind::KeyType, "invalid token in generic type definition")?;
            generics.push(self.expect_identifier("in generic type definition, expected ident after `type` keyword")?);
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::CloseBracket, "generic parameters must be closed by `]`")?;
        Ok(generics)
    }

    // ========================================================================
    // Types, enums, error sets
    // ========================================================================

    /// `type Name[type T] { field: T, ... }`
    fn struct_decl(&mut self) -> PResult<StructDecl> {
        self.expect(TokenKind::KeyType, "")?;
        let name = self.expect_identifier("expected the type name after `type` keyword")?;
        let generics = self.generic_params()?;

        self.expect(TokenKind::OpenBrace, "")?;
        let mut fields = Vec::new();
        loop {
            let field_name = self.expect_identifier("expected field name")?;
            self.expect(TokenKind::Colon, "expected `:` after field name, then the field type")?;
            let ty = self.parse_type()?;
            let span = field_name.span.merge(ty.span);
            fields.push(Spanned::new(
                Field {
                    name: field_name.node,
                    ty,
                },
                span,
            ));
            // trailing commas are not allowed
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::CloseBrace, "")?;

        Ok(StructDecl {
            visibility: Visibility::Private,
            pragmas: Pragmas::default(),
            name,
            generics,
            fields,
        })
    }

    /// `enum Name: base { A: const, ... }`
    fn enum_decl(&mut self) -> PResult<EnumDecl> {
        self.expect(TokenKind::KeyEnum, "")?;
        let name = self.expect_identifier("expected the enum name after `enum` keyword")?;
        self.expect(TokenKind::Colon, "an enum must declare its base type")?;
        let base_type = self.parse_type()?;

        self.expect(TokenKind::OpenBrace, "")?;
        let mut members = Vec::new();
        loop {
            let member_name = self.expect_identifier("expected enum member name")?;
            self.expect(TokenKind::Colon, "expected `:` after the member name, then its value")?;
            let value = self.constant("enum member values must be constants")?;
            let span = member_name.span.merge(value.span);
            members.push(Spanned::new(
                EnumMember {
                    name: member_name.node,
                    value,
                },
                span,
            ));
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::CloseBrace, "")?;

        Ok(EnumDecl {
            visibility: Visibility::Private,
            pragmas: Pragmas::default(),
            name,
            base_type,
            members,
        })
    }

    /// `error Name { A, B }`
    fn error_set_decl(&mut self) -> PResult<ErrorSetDecl> {
        self.expect(TokenKind::KeyError, "")?;
        let name = self.expect_identifier("expected the error set name after `error` keyword")?;

        self.expect(TokenKind::OpenBrace, "")?;
        let mut members = Vec::new();
        loop {
            members.push(self.expect_identifier("expected error member name")?);
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::CloseBrace, "")?;

        Ok(ErrorSetDecl {
            visibility: Visibility::Private,
            name,
            members,
        })
    }

    // ========================================================================
    // Directives
    // ========================================================================

    /// `import "path";` or `import package;`
    fn import_directive(&mut self) -> PResult<ImportDirective> {
        self.expect(TokenKind::KeyImport, "")?;
        let member = self.expect_any(
            &[TokenKind::ConstantString, TokenKind::Identifier],
            "expected a file path or a package name",
        )?;
        let directive = if member.kind == TokenKind::ConstantString {
            ImportDirective::Local(Spanned::new(member.value.clone(), member.span))
        } else {
            ImportDirective::Package(Spanned::new(member.value.clone(), member.span))
        };
        self.expect(TokenKind::Semicolon, "expected `;`, at the end of an import directive")?;
        Ok(directive)
    }

    /// `use path as alias;`
    fn use_directive(&mut self) -> PResult<UseDirective> {
        self.expect(TokenKind::KeyUse, "")?;
        let path = self.expect_identifier("")?;
        self.expect(TokenKind::KeyAs, "allowed only alias declaration with use directive")?;
        let alias = self.expect_identifier("expected the use path alias, after `as` in a use directive")?;
        self.expect(TokenKind::Semicolon, "expected `;`, at the end of a use directive")?;
        Ok(UseDirective { path, alias })
    }

    /// `when [!]symbol { members }`
    fn when_block(&mut self) -> PResult<WhenBlock> {
        self.expect(TokenKind::KeyWhen, "")?;
        let negated = self.match_token(TokenKind::Negation);
        let symbol = self.expect_identifier("expected a compiler symbol after `when`")?;

        self.expect(TokenKind::OpenBrace, "")?;
        let mut members = Vec::new();
        while !self.check(TokenKind::CloseBrace) {
            if self.is_at_end() {
                return Err(self.error_expected("CloseBrace", ""));
            }
            members.push(self.member()?);
        }
        self.expect(TokenKind::CloseBrace, "")?;

        Ok(WhenBlock {
            negated,
            symbol,
            members,
        })
    }
}
