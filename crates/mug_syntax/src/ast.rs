//! Abstract Syntax Tree definitions for Mug
//!
//! Every node is a closed enum or struct carrying its source [`Span`], so the parser and each
//! emission phase pattern-match exhaustively.

use std::fmt;

/// Source location span (byte offsets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(range: std::ops::Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

/// A node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

pub type Ident = String;

/// A statement list delimited by `{` and `}`.
pub type Block = Vec<Spanned<Statement>>;

/// Root of a compilation unit: the module name and its global members in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceNode {
    pub name: Ident,
    pub members: Vec<Spanned<Member>>,
}

/// Global members
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Function(FunctionDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    ErrorSet(ErrorSetDecl),
    Variable(VariableDecl),
    Import(ImportDirective),
    Use(UseDirective),
    Declare(Spanned<Ident>),
    When(WhenBlock),
}

impl Member {
    /// Short description used in logs and diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            Member::Function(f) if f.is_prototype() => "function prototype",
            Member::Function(_) => "function",
            Member::Struct(_) => "type",
            Member::Enum(_) => "enum",
            Member::ErrorSet(_) => "error set",
            Member::Variable(_) => "global variable",
            Member::Import(_) => "import directive",
            Member::Use(_) => "use directive",
            Member::Declare(_) => "declare directive",
            Member::When(_) => "when block",
        }
    }
}

/// Visibility modifier for global members.
///
/// Only `pub` members of an imported unit are merged into the importer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

// ============================================================================
// Pragmas
// ============================================================================

/// `@[name: value, ...]` attached to a function, type or enum.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pragmas {
    pub inline: bool,
    pub header: Option<Spanned<String>>,
    pub code: Option<Spanned<String>>,
    pub dynamiclib: Option<Spanned<String>>,
    pub export: Option<Spanned<String>>,
    pub extern_name: Option<Spanned<String>>,
}

impl Pragmas {
    pub const NAMES: &'static [&'static str] = &["inline", "header", "code", "dynamiclib", "export", "extern"];

    pub fn is_empty(&self) -> bool {
        *self == Pragmas::default()
    }
}

// ============================================================================
// Functions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub visibility: Visibility,
    pub pragmas: Pragmas,
    pub name: Spanned<Ident>,
    /// Overload-qualified name, written once when the signature is declared.
    mangled_name: Option<String>,
    pub receiver: Option<Spanned<Param>>,
    pub generics: Vec<Spanned<Ident>>,
    pub params: Vec<Spanned<Param>>,
    pub return_type: Spanned<Type>,
    /// `None` for prototypes (`func f(): i32;`)
    pub body: Option<Block>,
}

impl FunctionDecl {
    pub fn new(
        name: Spanned<Ident>,
        params: Vec<Spanned<Param>>,
        return_type: Spanned<Type>,
        body: Option<Block>,
    ) -> Self {
        Self {
            visibility: Visibility::Private,
            pragmas: Pragmas::default(),
            name,
            mangled_name: None,
            receiver: None,
            generics: Vec::new(),
            params,
            return_type,
            body,
        }
    }

    pub fn is_prototype(&self) -> bool {
        self.body.is_none()
    }

    /// The mangled name if the signature was already declared, else the source name.
    pub fn display_name(&self) -> &str {
        self.mangled_name.as_deref().unwrap_or(&self.name.node)
    }

    pub fn mangled_name(&self) -> Option<&str> {
        self.mangled_name.as_deref()
    }

    /// Record the overload-qualified name. Returns `false` if one was already recorded.
    pub fn set_mangled_name(&mut self, mangled: String) -> bool {
        if self.mangled_name.is_some() {
            return false;
        }
        self.mangled_name = Some(mangled);
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: Spanned<Type>,
}

// ============================================================================
// Types, enums, error sets
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub visibility: Visibility,
    pub pragmas: Pragmas,
    pub name: Spanned<Ident>,
    pub generics: Vec<Spanned<Ident>>,
    pub fields: Vec<Spanned<Field>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: Ident,
    pub ty: Spanned<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub visibility: Visibility,
    pub pragmas: Pragmas,
    pub name: Spanned<Ident>,
    pub base_type: Spanned<Type>,
    pub members: Vec<Spanned<EnumMember>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    pub name: Ident,
    pub value: Spanned<Literal>,
}

/// `error Name { A, B }`: an enumeration of error tags.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorSetDecl {
    pub visibility: Visibility,
    pub name: Spanned<Ident>,
    pub members: Vec<Spanned<Ident>>,
}

// ============================================================================
// Directives
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ImportDirective {
    /// `import "path/to/file.mug";`
    Local(Spanned<String>),
    /// `import name;`, resolved against the package include directory
    Package(Spanned<Ident>),
}

/// `use path as alias;`
#[derive(Debug, Clone, PartialEq)]
pub struct UseDirective {
    pub path: Spanned<Ident>,
    pub alias: Spanned<Ident>,
}

/// `when [!]symbol { members }`, evaluated against the declared compiler symbols.
#[derive(Debug, Clone, PartialEq)]
pub struct WhenBlock {
    pub negated: bool,
    pub symbol: Spanned<Ident>,
    pub members: Vec<Spanned<Member>>,
}

// ============================================================================
// Type expressions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Str,
    Chr,
    U1,
    U8,
    I32,
    I64,
    U32,
    U64,
    Void,
    Unknown,
}

impl PrimitiveType {
    pub fn as_str(self) -> &'static str {
        match self {
            PrimitiveType::Str => "str",
            PrimitiveType::Chr => "chr",
            PrimitiveType::U1 => "u1",
            PrimitiveType::U8 => "u8",
            PrimitiveType::I32 => "i32",
            PrimitiveType::I64 => "i64",
            PrimitiveType::U32 => "u32",
            PrimitiveType::U64 => "u64",
            PrimitiveType::Void => "void",
            PrimitiveType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Primitive(PrimitiveType),
    /// User type, optionally with generic arguments: `Point`, `Box<i32>`
    Named(Ident, Vec<Spanned<Type>>),
    /// `[T]`
    Array(Box<Spanned<Type>>),
    /// `*T`
    Pointer(Box<Spanned<Type>>),
}

impl Type {
    pub fn is_void(&self) -> bool {
        matches!(self, Type::Primitive(PrimitiveType::Void))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(p) => write!(f, "{}", p.as_str()),
            Type::Named(name, args) => {
                write!(f, "{}", name)?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg.node)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            Type::Array(elem) => write!(f, "[{}]", elem.node),
            Type::Pointer(elem) => write!(f, "*{}", elem.node),
        }
    }
}

// ============================================================================
// Statements
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `var x: T = value;`
    Variable(VariableDecl),
    /// `const x = value;`
    Constant(VariableDecl),
    Return(Option<Spanned<Expr>>),
    /// `if`, with chained `elif`/`else`
    Conditional(Conditional),
    While(WhileLoop),
    For(ForLoop),
    Break,
    Continue,
    /// `target op value;`, `target++;`
    Assignment(Assignment),
    /// Expression statement (calls)
    Expr(Spanned<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: Spanned<Ident>,
    pub ty: Option<Spanned<Type>>,
    pub value: Option<Spanned<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub condition: Spanned<Expr>,
    pub body: Block,
    pub else_branch: Option<Box<Spanned<ElseBranch>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElseBranch {
    Elif(Conditional),
    Else(Block),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileLoop {
    pub condition: Spanned<Expr>,
    pub body: Block,
}

/// `for left, condition, right { body }` where every clause is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub left: Option<Box<Spanned<Statement>>>,
    pub condition: Option<Spanned<Expr>>,
    pub right: Option<Box<Spanned<Statement>>>,
    pub body: Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    Increment,
    Decrement,
}

impl AssignOp {
    /// Arithmetic operator applied before the store, if any.
    pub fn binary_op(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign | AssignOp::Increment => Some(BinaryOp::Add),
            AssignOp::SubAssign | AssignOp::Decrement => Some(BinaryOp::Sub),
            AssignOp::MulAssign => Some(BinaryOp::Mul),
            AssignOp::DivAssign => Some(BinaryOp::Div),
        }
    }
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssignOp::Assign => "=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
            AssignOp::MulAssign => "*=",
            AssignOp::DivAssign => "/=",
            AssignOp::Increment => "++",
            AssignOp::Decrement => "--",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub target: Spanned<Expr>,
    pub op: AssignOp,
    /// `None` for `++` and `--`
    pub value: Option<Spanned<Expr>>,
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Identifier(Ident),
    /// The operator keeps its own span for operand-type diagnostics
    Binary(Spanned<BinaryOp>, Box<Spanned<Expr>>, Box<Spanned<Expr>>),
    Prefix(PrefixOp, Box<Spanned<Expr>>),
    /// `expr as Type`
    Cast(Box<Spanned<Expr>>, Spanned<Type>),
    Call(CallExpr),
    /// `base.member`
    Member(Box<Spanned<Expr>>, Spanned<Ident>),
    /// `base[index]`
    Index(Box<Spanned<Expr>>, Box<Spanned<Expr>>),
    /// `new Type{ field: value, ... }`
    StructAllocation(StructAllocation),
    /// `new [Type, size]{ elements }`
    ArrayAllocation(ArrayAllocation),
    /// `if cond { a } else { b }` in expression position
    InlineIf(Box<Spanned<Expr>>, Box<Spanned<Expr>>, Box<Spanned<Expr>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Char(char),
    Bool(bool),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::Str(s) => write!(f, "{:?}", s),
            Literal::Char(c) => write!(f, "{:?}", c),
            Literal::Bool(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub callee: Box<Spanned<Expr>>,
    pub generics: Vec<Spanned<Type>>,
    pub args: Vec<Spanned<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructAllocation {
    pub ty: Spanned<Type>,
    pub fields: Vec<Spanned<FieldInit>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInit {
    pub name: Ident,
    pub value: Spanned<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayAllocation {
    pub elem_type: Spanned<Type>,
    pub size: Box<Spanned<Expr>>,
    pub elements: Vec<Spanned<Expr>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Range,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Mul => write!(f, "*"),
            BinaryOp::Div => write!(f, "/"),
            BinaryOp::Range => write!(f, ".."),
            BinaryOp::Eq => write!(f, "=="),
            BinaryOp::NotEq => write!(f, "!="),
            BinaryOp::Lt => write!(f, "<"),
            BinaryOp::Gt => write!(f, ">"),
            BinaryOp::LtEq => write!(f, "<="),
            BinaryOp::GtEq => write!(f, ">="),
            BinaryOp::And => write!(f, "&"),
            BinaryOp::Or => write!(f, "|"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Neg,
    Plus,
    Not,
    /// `&x`
    AddressOf,
    /// `*p`
    Deref,
    Increment,
    Decrement,
}

impl fmt::Display for PrefixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrefixOp::Neg => "-",
            PrefixOp::Plus => "+",
            PrefixOp::Not => "!",
            PrefixOp::AddressOf => "&",
            PrefixOp::Deref => "*",
            PrefixOp::Increment => "++",
            PrefixOp::Decrement => "--",
        };
        write!(f, "{}", s)
    }
}
