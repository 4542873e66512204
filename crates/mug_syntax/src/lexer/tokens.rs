//! Token types for the Mug lexer.
//!
//! Tokens carry their kind, the raw (escape-decoded) lexeme, the byte range they span and the
//! 0-based line they start on.

use std::fmt;

use crate::ast::Span;

/// Kind of token produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // ========== Identifiers and constants ==========
    Identifier,
    ConstantDigit,
    ConstantFloatDigit,
    ConstantString,
    ConstantChar,
    ConstantBoolean,

    // ========== Keywords ==========
    KeyReturn,
    KeyContinue,
    KeyBreak,
    KeyWhile,
    KeyPub,
    KeyPriv,
    KeyUse,
    KeyImport,
    KeyNew,
    KeyFor,
    KeyType,
    KeyEnum,
    KeyAs,
    KeyIn,
    KeyTo,
    KeyIf,
    KeyElif,
    KeyElse,
    KeyFunc,
    KeyVar,
    KeyConst,
    KeyWhen,
    KeyDeclare,
    KeyCatch,
    KeyError,

    // ========== Primitive type keywords ==========
    KeyTstr,
    KeyTchr,
    KeyTbool,
    KeyTi8,
    KeyTi32,
    KeyTi64,
    KeyTu32,
    KeyTu64,
    KeyTVoid,
    KeyTunknown,

    // ========== Punctuation ==========
    OpenPar,
    ClosePar,
    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
    Comma,
    Colon,
    Dot,
    Semicolon,
    At,
    /// `@[`
    PragmaOpen,

    // ========== Operators ==========
    Equal,
    Negation,
    Ampersand,
    Pipe,
    Plus,
    Minus,
    Star,
    Slash,
    BooleanEQ,
    BooleanNEQ,
    BooleanMinor,
    BooleanMajor,
    BooleanLEQ,
    BooleanGEQ,
    OperatorIncrement,
    OperatorDecrement,
    AddAssignment,
    SubAssignment,
    MulAssignment,
    DivAssignment,
    RangeDots,

    Eof,
}

impl TokenKind {
    /// True for the primitive type keywords (`i32`, `str`, ...).
    pub fn is_primitive_type(self) -> bool {
        matches!(
            self,
            TokenKind::KeyTstr
                | TokenKind::KeyTchr
                | TokenKind::KeyTbool
                | TokenKind::KeyTi8
                | TokenKind::KeyTi32
                | TokenKind::KeyTi64
                | TokenKind::KeyTu32
                | TokenKind::KeyTu64
                | TokenKind::KeyTVoid
                | TokenKind::KeyTunknown
        )
    }

    pub fn is_constant(self) -> bool {
        matches!(
            self,
            TokenKind::ConstantDigit
                | TokenKind::ConstantFloatDigit
                | TokenKind::ConstantString
                | TokenKind::ConstantChar
                | TokenKind::ConstantBoolean
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Debug spelling matches the names users see in "Expected `X`" diagnostics
        write!(f, "{:?}", self)
    }
}

/// A token with its kind, lexeme and source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub span: Span,
    /// 0-based line of `span.start`
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, span: Span, line: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            span,
            line,
        }
    }
}

/// Keyword table, consulted after numeric and boolean classification.
pub fn keyword_kind(spelling: &str) -> Option<TokenKind> {
    let kind = match spelling {
        "return" => TokenKind::KeyReturn,
        "continue" => TokenKind::KeyContinue,
        "break" => TokenKind::KeyBreak,
        "while" => TokenKind::KeyWhile,
        "pub" => TokenKind::KeyPub,
        "priv" => TokenKind::KeyPriv,
        "use" => TokenKind::KeyUse,
        "import" => TokenKind::KeyImport,
        "new" => TokenKind::KeyNew,
        "for" => TokenKind::KeyFor,
        "type" => TokenKind::KeyType,
        "enum" => TokenKind::KeyEnum,
        "as" => TokenKind::KeyAs,
        "in" => TokenKind::KeyIn,
        "to" => TokenKind::KeyTo,
        "if" => TokenKind::KeyIf,
        "elif" => TokenKind::KeyElif,
        "else" => TokenKind::KeyElse,
        "func" => TokenKind::KeyFunc,
        "var" => TokenKind::KeyVar,
        "const" => TokenKind::KeyConst,
        "when" => TokenKind::KeyWhen,
        "declare" => TokenKind::KeyDeclare,
        "catch" => TokenKind::KeyCatch,
        "error" => TokenKind::KeyError,
        "str" => TokenKind::KeyTstr,
        "chr" => TokenKind::KeyTchr,
        "u1" => TokenKind::KeyTbool,
        "u8" => TokenKind::KeyTi8,
        "i32" => TokenKind::KeyTi32,
        "i64" => TokenKind::KeyTi64,
        "u32" => TokenKind::KeyTu32,
        "u64" => TokenKind::KeyTu64,
        "void" => TokenKind::KeyTVoid,
        "unknown" => TokenKind::KeyTunknown,
        _ => return None,
    };
    Some(kind)
}
