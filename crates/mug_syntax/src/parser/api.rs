/// Parse a token stream into a [`NamespaceNode`] named `module_name`.
///
/// This is the main public entrypoint for parsing.
///
/// ## Parameters
/// - `tokens`: Token stream produced by `mug_syntax::lexer`, ending with `Eof`.
/// - `module_name`: Name of the compilation unit, used by diagnostics and imports.
///
/// ## Errors
/// Returns the first syntax error; parsing never recovers.
#[tracing::instrument(skip_all, fields(module = module_name, token_count = tokens.len()))]
pub fn parse(tokens: &[Token], module_name: &str) -> Result<NamespaceNode, CompileError> {
    if tokens.is_empty() {
        return Ok(NamespaceNode {
            name: module_name.to_string(),
            members: Vec::new(),
        });
    }
    Parser::new(tokens, module_name).parse()
}

/// Lex and parse `source` in one step.
pub fn parse_source(source: &str, module_name: &str) -> Result<NamespaceNode, CompileError> {
    let tokens = crate::lexer::lex(source)?;
    parse(&tokens, module_name)
}
