//! Phase 2: signature declaration

use std::fs;

use mug_syntax::ast::{Expr, FunctionDecl, Literal, Member, Pragmas, PrefixOp, Span, Spanned, VariableDecl, Visibility};
use mug_syntax::diagnostics::{CompileError, errors};

use super::{IRGenerator, PendingBody, Phase, UnitRole};
use crate::backend::local::{char_code, int_literal_type};
use crate::backend::module::{IrType, Value};
use crate::backend::toolchain::ToolchainError;
use crate::frontend::symbols::{
    CAST_OPERATOR, ConcreteFunction, ENTRY_POINT, FunctionIdentity, FunctionPrototype, GlobalEntry, Signature,
};
use crate::frontend::types::MugValueType;

/// A phase 2 member after the forward sweep.
enum Forwarded {
    /// A function and its overload index, `None` when it duplicated an earlier overload
    Function(FunctionDecl, Option<usize>),
    Global(VariableDecl),
}

impl IRGenerator<'_, '_> {
    /// Forward-declare every function as a prototype, then resolve functions and globals in source
    /// order, promoting each prototype once its backend stub exists. Functions with a body are
    /// queued for phase 3.
    pub(super) fn declare_signatures(&mut self, members: Vec<Spanned<Member>>) -> Phase<()> {
        let mut forwarded = Vec::with_capacity(members.len());
        for member in members {
            match member.node {
                Member::Function(decl) => {
                    let index = self.forward_declare(&decl);
                    forwarded.push(Forwarded::Function(decl, index));
                }
                Member::Variable(decl) => forwarded.push(Forwarded::Global(decl)),
                _ => {}
            }
        }

        for item in forwarded {
            match item {
                Forwarded::Function(decl, Some(index)) if decl.is_prototype() => self.declare_prototype(decl, index)?,
                Forwarded::Function(decl, Some(index)) => self.declare_function(decl, index)?,
                Forwarded::Function(_, None) => {}
                Forwarded::Global(decl) => self.declare_global(decl)?,
            }
        }
        Ok(())
    }

    fn forward_declare(&mut self, decl: &FunctionDecl) -> Option<usize> {
        self.symbols.declare_function(
            &decl.name.node,
            FunctionIdentity::Prototype(FunctionPrototype::of(decl)),
            decl.name.span,
            decl.visibility == Visibility::Public,
            &mut self.diagnostics,
        )
    }

    fn promote(&mut self, decl: &FunctionDecl, index: usize, identity: FunctionIdentity) {
        let promoted = self.symbols.define_function(&decl.name.node, index, identity);
        debug_assert!(promoted, "function '{}' promoted twice", decl.name.node);
    }

    /// Receiver, parameters and return type of `decl`, with the cast target of `as` operators.
    fn signature(&mut self, decl: &FunctionDecl) -> Phase<(Signature, MugValueType)> {
        let (receiver, params, return_type) = self
            .resolve_signature_types(decl)
            .map_err(|e| self.diagnostics.throw(e))?;

        if let Some(void) = decl.params.iter().zip(&params).find(|(_, ty)| ty.is_void()) {
            return Err(self.fail(CompileError::semantic("Expected a non-void type", void.0.node.ty.span)));
        }

        let is_cast = decl.name.node == CAST_OPERATOR;
        if is_cast && (params.len() != 1 || receiver.is_some()) {
            return Err(self.fail(CompileError::semantic(
                "Cast operators take exactly one parameter",
                decl.name.span,
            )));
        }

        let signature = Signature {
            receiver,
            generic_arity: 0,
            params,
            cast_target: is_cast.then(|| return_type.clone()),
        };
        Ok((signature, return_type))
    }

    #[allow(clippy::type_complexity)]
    fn resolve_signature_types(
        &self,
        decl: &FunctionDecl,
    ) -> Result<(Option<MugValueType>, Vec<MugValueType>, MugValueType), CompileError> {
        let receiver = match &decl.receiver {
            Some(receiver) => Some(self.symbols.resolve_type(&receiver.node.ty)?),
            None => None,
        };
        let params = decl
            .params
            .iter()
            .map(|p| self.symbols.resolve_type(&p.node.ty))
            .collect::<Result<Vec<_>, _>>()?;
        let return_type = self.symbols.resolve_type(&decl.return_type)?;
        Ok((receiver, params, return_type))
    }

    /// Backend parameter list: the receiver first, then the parameters.
    fn backend_params(signature: &Signature) -> Vec<IrType> {
        signature
            .receiver
            .iter()
            .chain(&signature.params)
            .map(MugValueType::ir_type)
            .collect()
    }

    // ========================================================================
    // Functions
    // ========================================================================

    fn declare_function(&mut self, mut decl: FunctionDecl, index: usize) -> Phase<()> {
        if !decl.generics.is_empty() {
            let signature = self
                .symbols
                .prototype_signature(&FunctionPrototype::of(&decl))
                .map_err(|e| self.diagnostics.throw(e))?;
            self.promote(&decl, index, FunctionIdentity::Defined(signature));
            return Ok(());
        }

        let (signature, return_type) = self.signature(&decl)?;
        let backend_name = self.backend_name(&decl, &signature);
        let function = self.session.module.declare_function(
            &backend_name,
            Self::backend_params(&signature),
            return_type.ir_type(),
        );
        self.promote(
            &decl,
            index,
            FunctionIdentity::Concrete(ConcreteFunction {
                signature: signature.clone(),
                return_type: return_type.clone(),
                backend_name: backend_name.clone(),
            }),
        );

        decl.set_mangled_name(backend_name);
        self.bodies.push(PendingBody {
            decl,
            function,
            signature,
            return_type,
        });
        Ok(())
    }

    /// `main` for the root entry point, the `export` pragma when given, else the mangled signature.
    fn backend_name(&mut self, decl: &FunctionDecl, signature: &Signature) -> String {
        if let Some(export) = &decl.pragmas.export {
            return export.node.clone();
        }
        let is_root = matches!(self.role, UnitRole::Root { .. });
        let base = if is_root && decl.name.node == ENTRY_POINT && *signature == Signature::empty() {
            ENTRY_POINT.to_string()
        } else {
            signature.mangle(&decl.name.node)
        };
        self.session.reserve_backend_name(base)
    }

    // ========================================================================
    // Prototypes
    // ========================================================================

    fn declare_prototype(&mut self, decl: FunctionDecl, index: usize) -> Phase<()> {
        if !decl.generics.is_empty() {
            return Err(self.fail(CompileError::semantic(
                "Function prototypes cannot have generic parameters",
                decl.name.span,
            )));
        }
        self.include_pragmas(&decl.pragmas)?;

        let (signature, return_type) = self.signature(&decl)?;
        let backend_name = decl
            .pragmas
            .extern_name
            .as_ref()
            .map(|name| name.node.clone())
            .unwrap_or_else(|| decl.name.node.clone());

        self.session.module.declare_function(
            &backend_name,
            Self::backend_params(&signature),
            return_type.ir_type(),
        );
        self.promote(
            &decl,
            index,
            FunctionIdentity::Concrete(ConcreteFunction {
                signature,
                return_type,
                backend_name,
            }),
        );
        Ok(())
    }

    /// Compile the C code a prototype's pragmas point at.
    fn include_pragmas(&mut self, pragmas: &Pragmas) -> Phase<()> {
        if let Some(code) = &pragmas.code {
            if pragmas.header.is_some() {
                return Err(self.fail(CompileError::semantic(
                    "Pragma 'code' is in conflict with 'header'",
                    code.span,
                )));
            }
            let written = self.session.artifacts.fresh("c").and_then(|path| match fs::write(&path, &code.node) {
                Ok(()) => Ok(path),
                Err(e) => Err(ToolchainError::io(path, e)),
            });
            let path = written.map_err(|e| self.diagnostics.throw(e.into()))?;
            self.compile_native(&path).map_err(|e| self.diagnostics.throw(e))?;
        }

        if let Some(header) = &pragmas.header {
            let path = fs::canonicalize(self.dir.join(&header.node))
                .ok()
                .filter(|p| p.is_file())
                .ok_or_else(|| {
                    CompileError::semantic(format!("Unable to open source file '{}'", header.node), header.span)
                })
                .map_err(|e| self.diagnostics.throw(e))?;
            self.compile_native(&path).map_err(|e| self.diagnostics.throw(e))?;
        }

        if let Some(library) = &pragmas.dynamiclib {
            self.session.module.link(&library.node);
        }
        Ok(())
    }

    // ========================================================================
    // Globals
    // ========================================================================

    fn declare_global(&mut self, decl: VariableDecl) -> Phase<()> {
        let declared = match &decl.ty {
            Some(ty) => Some(self.symbols.resolve_type(ty).map_err(|e| self.diagnostics.throw(e))?),
            None => None,
        };

        let (ty, init) = match (&decl.value, declared) {
            (None, None) => {
                return Err(self.fail(CompileError::semantic(
                    "Unable to allocate a new variable without a type or a value",
                    decl.name.span,
                )));
            }
            (None, Some(ty)) => (ty, Value::Zero),
            (Some(value), declared) => {
                let (ty, init) = self.global_constant(value, declared.as_ref())?;
                if let Some(declared) = declared {
                    if declared != ty {
                        let error = errors::type_mismatch(&declared.to_string(), &ty.to_string(), value.span);
                        return Err(self.fail(error));
                    }
                }
                (ty, init)
            }
        };
        if ty.is_void() {
            return Err(self.fail(CompileError::semantic("Expected a non-void type", decl.name.span)));
        }

        let backend_name = self.session.reserve_backend_name(decl.name.node.clone());
        let entry = GlobalEntry {
            ty: ty.clone(),
            backend_name: backend_name.clone(),
            span: decl.name.span,
            public: false,
        };
        if self.symbols.declare_global(&decl.name.node, entry, &mut self.diagnostics) {
            self.session.module.add_global(backend_name, ty.ir_type(), init);
        }
        Ok(())
    }

    /// Type and backend initializer of a global's constant initializer.
    fn global_constant(
        &mut self,
        value: &Spanned<Expr>,
        hint: Option<&MugValueType>,
    ) -> Phase<(MugValueType, Value)> {
        let (literal, negate) = match &value.node {
            Expr::Literal(literal) => (literal, false),
            Expr::Prefix(PrefixOp::Neg, inner) => match &inner.node {
                Expr::Literal(literal @ Literal::Int(_)) => (literal, true),
                _ => return Err(self.fail(non_constant(value.span))),
            },
            _ => return Err(self.fail(non_constant(value.span))),
        };

        let constant = match literal {
            Literal::Int(v) => {
                let v = if negate { -*v } else { *v };
                (int_literal_type(v, hint), Value::Int(v))
            }
            Literal::Bool(b) => (MugValueType::Bool, Value::Int(i64::from(*b))),
            Literal::Char(c) => {
                let code = char_code(*c, value.span).map_err(|e| self.diagnostics.throw(e))?;
                (MugValueType::Char, Value::Int(code))
            }
            Literal::Str(s) => (MugValueType::String, self.session.module.add_string(s)),
            Literal::Float(_) => {
                return Err(self.fail(errors::not_supported("Floating point constants", value.span)));
            }
        };
        Ok(constant)
    }
}

fn non_constant(span: Span) -> CompileError {
    errors::not_supported("Non-constant global initializers", span)
}
