//! Phase 1: structural declaration

use std::path::Path;
use std::rc::Rc;

use mug_syntax::ast::{
    EnumDecl, ErrorSetDecl, ImportDirective, Literal, Member, Span, Spanned, StructDecl, Type, Visibility,
};
use mug_syntax::diagnostics::{CompileError, SourceFile, errors};

use super::{IRGenerator, Phase, UnitRole};
use crate::backend::local::{fits, int_literal_type};
use crate::frontend::resolver::{self, ImportKind};
use crate::frontend::symbols::{SymbolTable, TypeEntry};
use crate::frontend::types::{EnumInfo, MugValueType, StructInfo};

/// Names, types and positions of a struct's fields.
type Fields = (Vec<String>, Vec<MugValueType>, Vec<Span>);

impl IRGenerator<'_, '_> {
    /// Aliases and imports first, so that types may refer to imported declarations; then enums and
    /// error sets; then structs, each emitted once its field types are.
    pub(super) fn declare_structure(&mut self, members: &[Spanned<Member>]) -> Phase<()> {
        for member in members {
            match &member.node {
                Member::Use(directive) => self.symbols.add_alias(
                    &directive.alias.node,
                    &directive.path.node,
                    directive.alias.span,
                    &mut self.diagnostics,
                ),
                Member::Import(directive) => self.import(directive)?,
                _ => {}
            }
        }

        let mut order = Vec::new();
        for member in members {
            match &member.node {
                Member::Enum(decl) => self.declare_enum(decl)?,
                Member::ErrorSet(decl) => self.declare_error_set(decl)?,
                Member::Struct(decl) => {
                    if self.predeclare_struct(decl) {
                        order.push(decl.name.node.clone());
                    }
                }
                _ => {}
            }
        }

        for name in order {
            self.emit_struct(&name)?;
        }
        Ok(())
    }

    // ========================================================================
    // Imports
    // ========================================================================

    fn import(&mut self, directive: &ImportDirective) -> Phase<()> {
        let span = match directive {
            ImportDirective::Local(path) => path.span,
            ImportDirective::Package(name) => name.span,
        };
        let resolved = self
            .session
            .resolver
            .resolve(directive, &self.dir)
            .map_err(|e| self.diagnostics.throw(e))?;

        if !self.symbols.mark_included(&resolved.path) {
            tracing::debug!(path = %resolved.path.display(), "already included");
            return Ok(());
        }
        tracing::debug!(path = %resolved.path.display(), kind = ?resolved.kind, "importing");

        match resolved.kind {
            ImportKind::Mug => {
                let exports = self.import_unit(&resolved.path, span)?;
                self.symbols.merge_public(&exports, &mut self.diagnostics);
            }
            ImportKind::C => self.compile_native(&resolved.path).map_err(|e| self.diagnostics.throw(e))?,
            ImportKind::Bitcode => self.session.module.link(&resolved.path),
        }
        Ok(())
    }

    /// Compile an imported `.mug` unit into the shared module, once per session.
    fn import_unit(&mut self, path: &Path, span: Span) -> Phase<Rc<SymbolTable>> {
        if let Some(exports) = self.session.units.get(path) {
            return Ok(Rc::clone(exports));
        }
        if self.session.compiling.iter().any(|p| p == path) {
            let name = resolver::module_name(path);
            return Err(self.fail(CompileError::semantic(format!("Circular import of '{}'", name), span)));
        }

        let text = resolver::read_source(path, span).map_err(|e| self.diagnostics.throw(e))?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let file = SourceFile::new(resolver::module_name(path), text);

        let exports = self
            .session
            .compile_unit(file, dir, Some(path.to_path_buf()), UnitRole::Import)
            .map_err(|nested| self.diagnostics.abort(nested))?;
        let exports = Rc::new(exports);
        self.session.units.insert(path.to_path_buf(), Rc::clone(&exports));
        Ok(exports)
    }

    /// Compile a C translation unit and record the artifact, once per canonical path.
    pub(super) fn compile_native(&mut self, path: &Path) -> Result<(), CompileError> {
        if !self.session.native_units.insert(path.to_path_buf()) {
            return Ok(());
        }
        let output = self.session.artifacts.fresh("bc")?;
        self.session.toolchain.compile_c(path, &output)?;
        self.session.module.link(&output);
        Ok(())
    }

    // ========================================================================
    // Enums and error sets
    // ========================================================================

    fn declare_enum(&mut self, decl: &EnumDecl) -> Phase<()> {
        let base = self
            .symbols
            .resolve_type(&decl.base_type)
            .map_err(|e| self.diagnostics.throw(e))?;
        match &base {
            MugValueType::Void => {
                return Err(self.fail(CompileError::semantic(
                    "Enum base type must be a non-void type",
                    decl.base_type.span,
                )));
            }
            base if base.is_int() || matches!(base, MugValueType::Char | MugValueType::Bool) => {}
            _ => {
                return Err(self.fail(CompileError::semantic("Invalid enum base type", decl.base_type.span)));
            }
        }

        let mut members: Vec<(String, i64)> = Vec::with_capacity(decl.members.len());
        for member in &decl.members {
            let value = self.enum_constant(&base, &member.node.value)?;
            if members.iter().any(|(name, _)| *name == member.node.name) {
                return Err(self.fail(CompileError::semantic("Member already declared", member.span)));
            }
            members.push((member.node.name.clone(), value));
        }

        let info = EnumInfo {
            id: self.session.fresh_decl_id(),
            name: decl.name.node.clone(),
            base,
            members,
            is_error_set: false,
        };
        self.declare_enum_type(&decl.name, decl.visibility, info);
        Ok(())
    }

    fn enum_constant(&mut self, base: &MugValueType, constant: &Spanned<Literal>) -> Phase<i64> {
        let value = match (&constant.node, base) {
            (Literal::Int(v), base) if base.is_int() && fits(*v, base) => Some(*v),
            (Literal::Char(c), MugValueType::Char) => Some(i64::from(u32::from(*c))),
            (Literal::Bool(b), MugValueType::Bool) => Some(i64::from(*b)),
            _ => None,
        };
        value.ok_or_else(|| {
            let found = match &constant.node {
                Literal::Int(v) => int_literal_type(*v, None).to_string(),
                Literal::Float(_) => "float".to_string(),
                Literal::Str(_) => MugValueType::String.to_string(),
                Literal::Char(_) => MugValueType::Char.to_string(),
                Literal::Bool(_) => MugValueType::Bool.to_string(),
            };
            self.fail(errors::type_mismatch(&base.to_string(), &found, constant.span))
        })
    }

    /// `error Name { A, B }`: an enum over `u8` numbered from 0.
    fn declare_error_set(&mut self, decl: &ErrorSetDecl) -> Phase<()> {
        let mut members: Vec<(String, i64)> = Vec::with_capacity(decl.members.len());
        for (value, member) in (0i64..).zip(&decl.members) {
            if members.iter().any(|(name, _)| *name == member.node) {
                return Err(self.fail(CompileError::semantic("Member already declared", member.span)));
            }
            members.push((member.node.clone(), value));
        }

        let info = EnumInfo {
            id: self.session.fresh_decl_id(),
            name: decl.name.node.clone(),
            base: MugValueType::Int8,
            members,
            is_error_set: true,
        };
        self.declare_enum_type(&decl.name, decl.visibility, info);
        Ok(())
    }

    fn declare_enum_type(&mut self, name: &Spanned<String>, visibility: Visibility, info: EnumInfo) {
        let entry = TypeEntry {
            generic_arity: 0,
            value: Some(MugValueType::Enum(Rc::new(info))),
            span: name.span,
            public: visibility == Visibility::Public,
        };
        if self.symbols.declare_type(&name.node, entry, &mut self.diagnostics) {
            tracing::debug!(name = %name.node, "enum declared");
        }
    }

    // ========================================================================
    // Structs
    // ========================================================================

    /// Register the name and arity of a struct. Returns whether its fields should be emitted.
    fn predeclare_struct(&mut self, decl: &StructDecl) -> bool {
        let entry = TypeEntry {
            generic_arity: decl.generics.len(),
            value: None,
            span: decl.name.span,
            public: decl.visibility == Visibility::Public,
        };
        if !self.symbols.declare_type(&decl.name.node, entry, &mut self.diagnostics) {
            return false;
        }
        if !decl.generics.is_empty() {
            return false;
        }
        self.structs.insert(decl.name.node.clone(), decl.clone());
        true
    }

    /// Emit the struct `name` unless it already is, emitting the structs its fields name first.
    fn emit_struct(&mut self, name: &str) -> Phase<()> {
        if self.symbols.lookup_type(name, 0).is_some_and(|entry| entry.value.is_some()) {
            return Ok(());
        }
        let Some(decl) = self.structs.get(name).cloned() else {
            return Ok(());
        };

        self.declaring.push(name.to_string());
        let fields = self.struct_fields(&decl);
        self.declaring.pop();
        let (field_names, field_types, field_positions) = fields?;

        let info = StructInfo {
            id: self.session.fresh_decl_id(),
            name: name.to_string(),
            field_names,
            field_types,
            field_positions,
        };
        self.session.module.define_struct(
            info.ir_name(),
            info.field_types.iter().map(MugValueType::ir_type).collect(),
        );
        self.symbols.define_type(name, 0, MugValueType::Struct(Rc::new(info)));
        tracing::debug!(name, "struct declared");
        Ok(())
    }

    fn struct_fields(&mut self, decl: &StructDecl) -> Phase<Fields> {
        let mut names: Vec<String> = Vec::with_capacity(decl.fields.len());
        let mut types = Vec::with_capacity(decl.fields.len());
        let mut positions = Vec::with_capacity(decl.fields.len());

        for field in &decl.fields {
            if names.contains(&field.node.name) {
                self.diagnostics
                    .report(errors::already_declared("Field", &field.node.name, field.span));
                continue;
            }
            self.emit_field_types(&field.node.name, &field.node.ty)?;
            let ty = self
                .symbols
                .resolve_type(&field.node.ty)
                .map_err(|e| self.diagnostics.throw(e))?;
            if ty.is_void() {
                return Err(self.fail(CompileError::semantic("Expected a non-void type", field.node.ty.span)));
            }
            names.push(field.node.name.clone());
            types.push(ty);
            positions.push(field.span);
        }
        Ok((names, types, positions))
    }

    /// Force-emit the structs named by the type of `field`.
    ///
    /// Naming a struct whose fields are still being resolved is recursion: illegal for the struct
    /// being declared and the one that led to it, a cycle for anything further out. Either error is
    /// anchored at the offending field's type annotation.
    fn emit_field_types(&mut self, field: &str, ty: &Spanned<Type>) -> Phase<()> {
        match &ty.node {
            Type::Primitive(_) => Ok(()),
            Type::Array(elem) | Type::Pointer(elem) => self.emit_field_types(field, elem),
            Type::Named(name, args) => {
                for arg in args {
                    self.emit_field_types(field, arg)?;
                }
                let name = self.symbols.unalias(name).to_string();
                if let Some(depth) = self.declaring.iter().rposition(|declaring| *declaring == name) {
                    let innermost = self.declaring.len() - 1;
                    let error = if depth + 1 >= innermost {
                        errors::illegal_recursion(field, &name, ty.span)
                    } else {
                        CompileError::semantic(
                            format!("Type '{}' is part of a recursive type cycle through its fields", name),
                            ty.span,
                        )
                    };
                    return Err(self.fail(error));
                }
                self.emit_struct(&name)
            }
        }
    }
}
