//! Symbol table and overload resolution for Mug
//!
//! Functions and types are stored as ordered overload sets keyed by their declared name. Resolution
//! is a linear search by structural signature equality in insertion order.
//!
//! A function identity moves through three stages:
//! - [`FunctionIdentity::Prototype`]: forward-declared, backed by its AST signature
//! - [`FunctionIdentity::Defined`]: signature resolved, no backend body (generic functions)
//! - [`FunctionIdentity::Concrete`]: return type and backend callable bound

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use mug_syntax::ast::{FunctionDecl, Span, Spanned, Type};
use mug_syntax::diagnostics::{CompileError, DiagnosticBag, ErrorKind, errors};

use crate::frontend::types::{MugValueType, join_types};

/// Name of the program entry point.
pub const ENTRY_POINT: &str = "main";

/// Name of user-defined cast operators (`func as(p: Point): i32`).
pub const CAST_OPERATOR: &str = "as";

/// Structural signature used to tell overloads apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub receiver: Option<MugValueType>,
    pub generic_arity: usize,
    pub params: Vec<MugValueType>,
    /// Cast operators overload on their target type as well
    pub cast_target: Option<MugValueType>,
}

impl Signature {
    pub fn new(params: Vec<MugValueType>) -> Self {
        Self {
            receiver: None,
            generic_arity: 0,
            params,
            cast_target: None,
        }
    }

    /// Zero parameters, no receiver, no generics.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_receiver(mut self, receiver: MugValueType) -> Self {
        self.receiver = Some(receiver);
        self
    }

    /// Mangled overload-qualified name.
    ///
    /// - `name(a, b)` in general
    /// - `T.name(a, b)` for member functions
    /// - `as(a): r` for cast operators
    pub fn mangle(&self, name: &str) -> String {
        let params = join_types(&self.params);
        match (&self.receiver, &self.cast_target) {
            (_, Some(target)) => format!("{}({}): {}", name, params, target),
            (Some(receiver), None) => format!("{}.{}({})", receiver, name, params),
            (None, None) => format!("{}({})", name, params),
        }
    }
}

/// AST-backed signature of a forward-declared function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionPrototype {
    pub receiver: Option<Spanned<Type>>,
    pub generics: Vec<String>,
    pub params: Vec<Spanned<Type>>,
    pub return_type: Spanned<Type>,
    pub is_cast: bool,
}

impl FunctionPrototype {
    pub fn of(decl: &FunctionDecl) -> Self {
        Self {
            receiver: decl.receiver.as_ref().map(|r| r.node.ty.clone()),
            generics: decl.generics.iter().map(|g| g.node.clone()).collect(),
            params: decl.params.iter().map(|p| p.node.ty.clone()).collect(),
            return_type: decl.return_type.clone(),
            is_cast: decl.name.node == CAST_OPERATOR,
        }
    }
}

/// A resolved function with its backend symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcreteFunction {
    pub signature: Signature,
    pub return_type: MugValueType,
    /// Name of the function in the backend module
    pub backend_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionIdentity {
    Prototype(FunctionPrototype),
    Defined(Signature),
    Concrete(ConcreteFunction),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionEntry {
    pub identity: FunctionIdentity,
    pub span: Span,
    pub public: bool,
}

/// A declared type: its generic arity and, once declared, its value type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeEntry {
    pub generic_arity: usize,
    pub value: Option<MugValueType>,
    pub span: Span,
    pub public: bool,
}

/// A global variable bound in the backend module.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalEntry {
    pub ty: MugValueType,
    pub backend_name: String,
    pub span: Span,
    pub public: bool,
}

/// Symbol table of one compilation unit.
#[derive(Debug, Default)]
pub struct SymbolTable {
    functions: HashMap<String, Vec<FunctionEntry>>,
    types: HashMap<String, Vec<TypeEntry>>,
    globals: HashMap<String, GlobalEntry>,
    aliases: HashMap<String, String>,
    compiler_symbols: Vec<String>,
    include_guards: HashSet<PathBuf>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The name `name` stands for after `use` aliases.
    pub fn unalias<'n>(&'n self, name: &'n str) -> &'n str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// Derive the structural signature of an identity; prototypes resolve their AST types.
    pub fn signature_of(&self, identity: &FunctionIdentity) -> Option<Signature> {
        match identity {
            FunctionIdentity::Prototype(proto) => self.prototype_signature(proto).ok(),
            FunctionIdentity::Defined(signature) => Some(signature.clone()),
            FunctionIdentity::Concrete(concrete) => Some(concrete.signature.clone()),
        }
    }

    pub fn prototype_signature(&self, proto: &FunctionPrototype) -> Result<Signature, CompileError> {
        let receiver = match &proto.receiver {
            Some(ty) => Some(self.resolve_type_in(ty, &proto.generics)?),
            None => None,
        };
        let params = proto
            .params
            .iter()
            .map(|p| self.resolve_type_in(p, &proto.generics))
            .collect::<Result<Vec<_>, _>>()?;
        let cast_target = if proto.is_cast {
            Some(self.resolve_type_in(&proto.return_type, &proto.generics)?)
        } else {
            None
        };
        Ok(Signature {
            receiver,
            generic_arity: proto.generics.len(),
            params,
            cast_target,
        })
    }

    /// Add `identity` to the overload set of `name`.
    ///
    /// A structurally equal overload already in the set is reported as "already declared" and the
    /// new identity is dropped; scanning continues. Returns the index of the new overload.
    pub fn declare_function(
        &mut self,
        name: &str,
        identity: FunctionIdentity,
        span: Span,
        public: bool,
        diagnostics: &mut DiagnosticBag,
    ) -> Option<usize> {
        let entry = FunctionEntry {
            identity,
            span,
            public,
        };

        if !self.functions.contains_key(name) {
            self.functions.insert(name.to_string(), vec![entry]);
            return Some(0);
        }

        let new_signature = self.signature_of(&entry.identity);
        let overloads = &self.functions[name];
        let duplicate = new_signature.is_some_and(|signature| {
            overloads
                .iter()
                .any(|existing| self.signature_of(&existing.identity).as_ref() == Some(&signature))
        });

        if duplicate {
            diagnostics.report(errors::already_declared("Function", name, span));
            return None;
        }

        let overloads = self.functions.entry(name.to_string()).or_default();
        overloads.push(entry);
        Some(overloads.len() - 1)
    }

    /// Promote the prototype at `index` of `name` to `identity`.
    ///
    /// Only prototypes are promoted; returns `false` when the entry is missing or already resolved.
    pub fn define_function(&mut self, name: &str, index: usize, identity: FunctionIdentity) -> bool {
        match self.functions.get_mut(name).and_then(|o| o.get_mut(index)) {
            Some(entry) if matches!(entry.identity, FunctionIdentity::Prototype(_)) => {
                entry.identity = identity;
                true
            }
            _ => false,
        }
    }

    /// The overload at `index` of `name`.
    pub fn function_entry(&self, name: &str, index: usize) -> Option<&FunctionEntry> {
        self.functions.get(name).and_then(|o| o.get(index))
    }

    /// Find the overload of `name` whose signature equals `signature`.
    pub fn resolve_function(&self, name: &str, signature: &Signature, span: Span) -> Result<&FunctionEntry, CompileError> {
        let key = self.unalias(name);
        let Some(overloads) = self.functions.get(key) else {
            return Err(errors::undeclared_function(name, span));
        };

        overloads
            .iter()
            .find(|entry| self.signature_of(&entry.identity).as_ref() == Some(signature))
            .ok_or_else(|| {
                errors::no_matching_overload(name, span)
                    .with_note(format!("no overload accepts ({})", join_types(&signature.params)))
            })
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(self.unalias(name))
    }

    /// Resolve the zero-argument `main` through the regular overload machinery.
    pub fn entry_point(&self) -> Result<&FunctionEntry, CompileError> {
        self.resolve_function(ENTRY_POINT, &Signature::empty(), Span::default())
            .map_err(|_| CompileError::positionless(ErrorKind::Semantic, "No entry point declared"))
    }

    pub fn function_overloads(&self) -> impl Iterator<Item = (&String, &Vec<FunctionEntry>)> {
        self.functions.iter()
    }

    // ========================================================================
    // Types
    // ========================================================================

    /// Add a type overload keyed by generic arity; duplicates are reported and dropped.
    pub fn declare_type(
        &mut self,
        name: &str,
        entry: TypeEntry,
        diagnostics: &mut DiagnosticBag,
    ) -> bool {
        let overloads = self.types.entry(name.to_string()).or_default();
        if overloads.iter().any(|e| e.generic_arity == entry.generic_arity) {
            diagnostics.report(errors::already_declared("Type", name, entry.span));
            return false;
        }
        overloads.push(entry);
        true
    }

    /// Bind the value type of a previously declared type.
    pub fn define_type(&mut self, name: &str, generic_arity: usize, value: MugValueType) {
        if let Some(entry) = self
            .types
            .get_mut(name)
            .and_then(|o| o.iter_mut().find(|e| e.generic_arity == generic_arity))
        {
            entry.value = Some(value);
        }
    }

    pub fn lookup_type(&self, name: &str, generic_arity: usize) -> Option<&TypeEntry> {
        self.types
            .get(self.unalias(name))
            .and_then(|o| o.iter().find(|e| e.generic_arity == generic_arity))
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(self.unalias(name))
    }

    /// Resolve a syntactic type annotation.
    pub fn resolve_type(&self, ty: &Spanned<Type>) -> Result<MugValueType, CompileError> {
        self.resolve_type_in(ty, &[])
    }

    /// Resolve a type annotation where `generics` name generic parameters in scope.
    pub fn resolve_type_in(&self, ty: &Spanned<Type>, generics: &[String]) -> Result<MugValueType, CompileError> {
        match &ty.node {
            Type::Primitive(p) => Ok(MugValueType::from_primitive(*p)),
            Type::Array(elem) => Ok(MugValueType::Array(Box::new(self.resolve_type_in(elem, generics)?))),
            Type::Pointer(elem) => Ok(MugValueType::Pointer(Box::new(self.resolve_type_in(elem, generics)?))),
            Type::Named(name, args) => {
                if args.is_empty() && generics.contains(name) {
                    return Ok(MugValueType::Unknown);
                }
                let key = self.unalias(name);
                let Some(overloads) = self.types.get(key) else {
                    return Err(errors::undeclared_type(name, ty.span));
                };
                let Some(entry) = overloads.iter().find(|e| e.generic_arity == args.len()) else {
                    return Err(errors::no_matching_type_overload(name, ty.span));
                };
                if entry.generic_arity > 0 {
                    return Err(errors::not_supported("Generic instantiation", ty.span));
                }
                entry
                    .value
                    .clone()
                    .ok_or_else(|| errors::undeclared_type(name, ty.span))
            }
        }
    }

    pub fn type_overloads(&self) -> impl Iterator<Item = (&String, &Vec<TypeEntry>)> {
        self.types.iter()
    }

    // ========================================================================
    // Globals, aliases, compiler symbols, include guards
    // ========================================================================

    pub fn declare_global(&mut self, name: &str, entry: GlobalEntry, diagnostics: &mut DiagnosticBag) -> bool {
        if self.globals.contains_key(name) {
            diagnostics.report(errors::already_declared("Variable", name, entry.span));
            return false;
        }
        self.globals.insert(name.to_string(), entry);
        true
    }

    pub fn global(&self, name: &str) -> Option<&GlobalEntry> {
        self.globals.get(self.unalias(name))
    }

    pub fn globals(&self) -> impl Iterator<Item = (&String, &GlobalEntry)> {
        self.globals.iter()
    }

    /// `use path as alias;`
    pub fn add_alias(&mut self, alias: &str, path: &str, span: Span, diagnostics: &mut DiagnosticBag) {
        if self.aliases.contains_key(alias) {
            diagnostics.report(errors::already_declared("Alias", alias, span));
            return;
        }
        self.aliases.insert(alias.to_string(), path.to_string());
    }

    pub fn declare_compiler_symbol(&mut self, name: &str, span: Span, diagnostics: &mut DiagnosticBag) -> bool {
        if self.is_compiler_symbol(name) {
            diagnostics.report(CompileError::semantic(
                format!("Compiler symbol '{}' is already declared", name),
                span,
            ));
            return false;
        }
        self.compiler_symbols.push(name.to_string());
        true
    }

    pub fn is_compiler_symbol(&self, name: &str) -> bool {
        self.compiler_symbols.iter().any(|s| s == name)
    }

    /// Mark `path` as processed. Returns `false` if it already was.
    pub fn mark_included(&mut self, path: &Path) -> bool {
        self.include_guards.insert(path.to_path_buf())
    }

    pub fn is_included(&self, path: &Path) -> bool {
        self.include_guards.contains(path)
    }

    // ========================================================================
    // Imports
    // ========================================================================

    /// Merge the public symbols of an imported unit. Merged symbols are private to this unit.
    pub fn merge_public(&mut self, other: &SymbolTable, diagnostics: &mut DiagnosticBag) {
        for (name, overloads) in &other.types {
            for entry in overloads.iter().filter(|e| e.public) {
                let entry = TypeEntry {
                    public: false,
                    ..entry.clone()
                };
                self.declare_type(name, entry, diagnostics);
            }
        }
        for (name, overloads) in &other.functions {
            for entry in overloads.iter().filter(|e| e.public) {
                self.declare_function(name, entry.identity.clone(), entry.span, false, diagnostics);
            }
        }
        for (name, global) in other.globals.iter().filter(|(_, g)| g.public) {
            let entry = GlobalEntry {
                public: false,
                ..global.clone()
            };
            self.declare_global(name, entry, diagnostics);
        }
    }
}
