/// Parser core types and entrypoint.
///
/// This chunk defines the [`Parser`] type and its top-level `parse()` entrypoint.
///
/// ## Notes
/// - This file is `include!`'d into `crate::parser` to keep all parser methods in a
///   single module while avoiding a single “god file”.
/// - The first syntax error aborts the unit: there is no recovery.
type PResult<T> = Result<T, CompileError>;

/// Parser state.
pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    module_name: String,
}

impl<'a> Parser<'a> {
    /// Create a new parser for a token stream.
    ///
    /// ## Parameters
    /// - `tokens`: Token stream produced by `mug_syntax::lexer`, ending with `Eof`.
    /// - `module_name`: Name recorded on the resulting [`NamespaceNode`].
    pub fn new(tokens: &'a [Token], module_name: impl Into<String>) -> Self {
        Self {
            tokens,
            pos: 0,
            module_name: module_name.into(),
        }
    }

    /// Parse the entire token stream into a [`NamespaceNode`].
    pub fn parse(mut self) -> PResult<NamespaceNode> {
        let mut members = Vec::new();

        while !self.is_at_end() {
            members.push(self.member()?);
        }

        Ok(NamespaceNode {
            name: self.module_name,
            members,
        })
    }
}
