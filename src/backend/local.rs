//! Function body generation
//!
//! A [`LocalGenerator`] walks one function body against the fully declared symbol table and lowers
//! it through an [`Emitter`]. Locals live in lexical scopes on top of the global symbols; every
//! operator and assignment requires exactly equal operand types.

use std::collections::HashMap;

use mug_syntax::ast::{
    ArrayAllocation, Assignment, Block, BinaryOp, CallExpr, Conditional, ElseBranch, Expr,
    ForLoop, Literal, PrefixOp, Span, Spanned, Statement, StructAllocation, Type, VariableDecl, WhileLoop,
};
use mug_syntax::diagnostics::{CompileError, errors};

use crate::backend::emitter::{Emitter, MugValue};
use crate::backend::module::{self, BlockRef, CastOp, Predicate, Value};
use crate::frontend::symbols::{CAST_OPERATOR, FunctionIdentity, Signature, SymbolTable};
use crate::frontend::types::MugValueType;

type GenResult<T> = Result<T, CompileError>;

#[derive(Debug, Clone)]
struct Local {
    ptr: Value,
    ty: MugValueType,
    is_const: bool,
}

#[derive(Debug, Clone, Copy)]
struct LoopTargets {
    continue_to: BlockRef,
    break_to: BlockRef,
}

pub struct LocalGenerator<'a, 'm> {
    symbols: &'a SymbolTable,
    emitter: Emitter<'m>,
    scopes: Vec<HashMap<String, Local>>,
    loops: Vec<LoopTargets>,
    return_type: MugValueType,
}

impl<'a, 'm> LocalGenerator<'a, 'm> {
    pub fn new(symbols: &'a SymbolTable, emitter: Emitter<'m>, return_type: MugValueType) -> Self {
        Self {
            symbols,
            emitter,
            scopes: vec![HashMap::new()],
            loops: Vec::new(),
            return_type,
        }
    }

    /// Spill parameter `index` into a local slot named `name`.
    pub fn declare_parameter(&mut self, name: &str, ty: MugValueType, index: usize, span: Span) -> GenResult<()> {
        let function = self.emitter.function();
        let param = self.emitter.module().function(function).param(index);
        let ptr = self.emitter.alloca(&ty);
        self.emitter.load(MugValue::new(ty.clone(), param));
        self.emitter.store(ptr.clone());
        self.bind(name, Local { ptr, ty, is_const: false }, span)
    }

    /// Lower `body`. Void functions get an implicit `ret void`; a non-void function falling off its
    /// end is left unterminated for backend verification to report.
    pub fn generate(mut self, body: &Block) -> GenResult<()> {
        self.statements(body)?;
        if self.return_type.is_void() && !self.emitter.is_terminated() {
            self.emitter.ret_void();
        }
        self.emitter.finish();
        Ok(())
    }

    // ========================================================================
    // Scopes
    // ========================================================================

    fn lookup(&self, name: &str) -> Option<&Local> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn bind(&mut self, name: &str, local: Local, span: Span) -> GenResult<()> {
        if self.lookup(name).is_some() {
            return Err(errors::already_declared("Variable", name, span));
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), local);
        }
        Ok(())
    }

    fn scoped_block(&mut self, body: &Block) -> GenResult<()> {
        self.scopes.push(HashMap::new());
        let result = self.statements(body);
        self.scopes.pop();
        result
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn statements(&mut self, body: &Block) -> GenResult<()> {
        for statement in body {
            self.statement(statement)?;
        }
        Ok(())
    }

    fn statement(&mut self, statement: &Spanned<Statement>) -> GenResult<()> {
        self.emitter.ensure_open();
        match &statement.node {
            Statement::Variable(decl) => self.variable(decl, false, statement.span),
            Statement::Constant(decl) => self.variable(decl, true, statement.span),
            Statement::Return(value) => self.return_statement(value.as_ref(), statement.span),
            Statement::Conditional(conditional) => {
                let mut end = None;
                self.conditional(conditional, &mut end)?;
                if let Some(end) = end {
                    self.emitter.position_at(end);
                }
                Ok(())
            }
            Statement::While(w) => self.while_loop(w),
            Statement::For(f) => self.for_loop(f),
            Statement::Break | Statement::Continue => {
                let Some(targets) = self.loops.last().copied() else {
                    return Err(CompileError::semantic(
                        "Loop management statements only allowed inside cycle's bodies",
                        statement.span,
                    ));
                };
                let target = if matches!(statement.node, Statement::Break) {
                    targets.break_to
                } else {
                    targets.continue_to
                };
                self.emitter.jump(target);
                Ok(())
            }
            Statement::Assignment(assignment) => self.assignment(assignment),
            Statement::Expr(expr) => {
                let depth = self.emitter.depth();
                match &expr.node {
                    Expr::Call(call) => {
                        self.call(call, expr.span, false)?;
                    }
                    _ => {
                        self.expression(expr, None)?;
                    }
                }
                // results of expression statements are discarded
                while self.emitter.depth() > depth {
                    self.emitter.pop();
                }
                Ok(())
            }
        }
    }

    fn variable(&mut self, decl: &VariableDecl, is_const: bool, span: Span) -> GenResult<()> {
        let declared = decl.ty.as_ref().map(|ty| self.symbols.resolve_type(ty)).transpose()?;

        let ty = match (&decl.value, declared) {
            (Some(value), declared) => {
                let found = self.expression(value, declared.as_ref())?;
                if let Some(declared) = declared {
                    expect_type(&declared, &found, value.span)?;
                }
                expect_non_void(&found, value.span)?;
                found
            }
            (None, Some(declared)) => {
                expect_non_void(&declared, span)?;
                self.emitter.const_zero(declared.clone());
                declared
            }
            (None, None) => {
                return Err(CompileError::semantic(
                    "Unable to allocate a new variable without a type or a value",
                    span,
                ));
            }
        };

        let ptr = self.emitter.alloca(&ty);
        self.emitter.store(ptr.clone());
        self.bind(&decl.name.node, Local { ptr, ty, is_const }, decl.name.span)
    }

    fn return_statement(&mut self, value: Option<&Spanned<Expr>>, span: Span) -> GenResult<()> {
        match value {
            None => {
                if !self.return_type.is_void() {
                    return Err(errors::type_mismatch(&self.return_type.to_string(), "void", span));
                }
                self.emitter.ret_void();
            }
            Some(value) => {
                let expected = self.return_type.clone();
                let found = self.expression(value, Some(&expected))?;
                expect_type(&expected, &found, value.span)?;
                self.emitter.ret();
            }
        }
        Ok(())
    }

    fn condition(&mut self, condition: &Spanned<Expr>) -> GenResult<()> {
        let ty = self.expression(condition, Some(&MugValueType::Bool))?;
        expect_type(&MugValueType::Bool, &ty, condition.span)
    }

    fn end_block(&mut self, end: &mut Option<BlockRef>) -> BlockRef {
        match end {
            Some(block) => *block,
            None => {
                let block = self.emitter.new_block("if.end");
                *end = Some(block);
                block
            }
        }
    }

    /// An `if` chain; the shared end block is only created once some branch falls through.
    fn conditional(&mut self, conditional: &Conditional, end: &mut Option<BlockRef>) -> GenResult<()> {
        self.condition(&conditional.condition)?;

        let then_block = self.emitter.new_block("if.then");
        let else_block = match &conditional.else_branch {
            Some(_) => self.emitter.new_block("if.else"),
            None => self.end_block(end),
        };
        self.emitter.compare_jump(then_block, else_block);

        self.emitter.position_at(then_block);
        self.scoped_block(&conditional.body)?;
        if !self.emitter.is_terminated() {
            let end = self.end_block(end);
            self.emitter.jump(end);
        }

        let Some(branch) = &conditional.else_branch else {
            return Ok(());
        };
        self.emitter.position_at(else_block);
        match &branch.node {
            ElseBranch::Elif(elif) => self.conditional(elif, end),
            ElseBranch::Else(body) => {
                self.scoped_block(body)?;
                if !self.emitter.is_terminated() {
                    let end = self.end_block(end);
                    self.emitter.jump(end);
                }
                Ok(())
            }
        }
    }

    fn while_loop(&mut self, w: &WhileLoop) -> GenResult<()> {
        let cond_block = self.emitter.new_block("while.cond");
        let body_block = self.emitter.new_block("while.body");
        let end_block = self.emitter.new_block("while.end");

        self.emitter.jump(cond_block);
        self.emitter.position_at(cond_block);
        self.condition(&w.condition)?;
        self.emitter.compare_jump(body_block, end_block);

        self.emitter.position_at(body_block);
        self.loop_body(&w.body, cond_block, end_block)?;
        self.emitter.jump(cond_block);

        self.emitter.position_at(end_block);
        Ok(())
    }

    fn for_loop(&mut self, f: &ForLoop) -> GenResult<()> {
        self.scopes.push(HashMap::new());
        let result = self.for_loop_scoped(f);
        self.scopes.pop();
        result
    }

    fn for_loop_scoped(&mut self, f: &ForLoop) -> GenResult<()> {
        if let Some(left) = &f.left {
            self.statement(left)?;
        }

        let cond_block = self.emitter.new_block("for.cond");
        let body_block = self.emitter.new_block("for.body");
        let step_block = self.emitter.new_block("for.step");
        let end_block = self.emitter.new_block("for.end");

        self.emitter.jump(cond_block);
        self.emitter.position_at(cond_block);
        match &f.condition {
            Some(condition) => {
                self.condition(condition)?;
                self.emitter.compare_jump(body_block, end_block);
            }
            None => self.emitter.jump(body_block),
        }

        self.emitter.position_at(body_block);
        self.loop_body(&f.body, step_block, end_block)?;
        self.emitter.jump(step_block);

        self.emitter.position_at(step_block);
        if let Some(right) = &f.right {
            self.statement(right)?;
        }
        self.emitter.jump(cond_block);

        self.emitter.position_at(end_block);
        Ok(())
    }

    fn loop_body(&mut self, body: &Block, continue_to: BlockRef, break_to: BlockRef) -> GenResult<()> {
        self.loops.push(LoopTargets { continue_to, break_to });
        let result = self.scoped_block(body);
        self.loops.pop();
        result
    }

    fn assignment(&mut self, assignment: &Assignment) -> GenResult<()> {
        self.expect_mutable(&assignment.target)?;
        let (ptr, ty) = self.address_of(&assignment.target)?;

        let Some(op) = assignment.op.binary_op() else {
            let value = assignment
                .value
                .as_ref()
                .ok_or_else(|| CompileError::semantic("Missing assigned value", assignment.target.span))?;
            let found = self.expression(value, Some(&ty))?;
            expect_type(&ty, &found, value.span)?;
            self.emitter.store(ptr);
            return Ok(());
        };

        self.emitter.load_from(ptr.clone(), ty.clone());
        match &assignment.value {
            Some(value) => {
                let found = self.expression(value, Some(&ty))?;
                expect_type(&ty, &found, value.span)?;
            }
            None if ty.is_int() => self.emitter.const_int(ty.clone(), 1),
            None => {
                return Err(CompileError::semantic(
                    format!("Cannot apply `{}` to a value of type '{}'", assignment.op, ty),
                    assignment.target.span,
                ));
            }
        }

        let span = assignment.target.span;
        let result = self.apply_operator(op, &ty, &ty, span)?;
        expect_type(&ty, &result, span)?;
        self.emitter.store(ptr);
        Ok(())
    }

    /// `const` bindings, and fields reached through them, cannot be written.
    fn expect_mutable(&self, target: &Spanned<Expr>) -> GenResult<()> {
        let mut root = target;
        while let Expr::Member(base, _) = &root.node {
            root = base;
        }
        match &root.node {
            Expr::Identifier(name) if self.lookup(name).is_some_and(|local| local.is_const) => {
                Err(CompileError::semantic("Unable to change a constant value", target.span))
            }
            _ => Ok(()),
        }
    }

    // ========================================================================
    // Addresses
    // ========================================================================

    /// Address and type of an assignable expression.
    fn address_of(&mut self, expr: &Spanned<Expr>) -> GenResult<(Value, MugValueType)> {
        match &expr.node {
            Expr::Identifier(name) => self.variable_address(name, expr.span),
            Expr::Member(base, field) => {
                let (ptr, ty) = self.address_or_spill(base)?;
                let (ptr, ty) = self.auto_deref(ptr, ty);
                let Some(info) = ty.as_struct().cloned() else {
                    return Err(CompileError::semantic(
                        format!("Type '{}' has no fields", ty),
                        base.span,
                    ));
                };
                let Some(index) = info.field_index(&field.node) else {
                    return Err(CompileError::semantic(format!("Undeclared field `{}`", field.node), field.span));
                };
                let addr = self.emitter.field_addr(ptr, &ty, index);
                Ok((addr, info.field_types[index].clone()))
            }
            Expr::Index(base, index) => {
                let base_ty = self.expression(base, None)?;
                let Some(elem) = base_ty.element_type() else {
                    return Err(CompileError::semantic(
                        format!("Unable to index a value of type '{}'", base_ty),
                        base.span,
                    ));
                };
                let buffer = self.emitter.pop();
                let index_ty = self.expression(index, Some(&MugValueType::Int32))?;
                expect_int(&index_ty, index.span)?;
                let addr = self.emitter.element_addr(buffer.value, &elem);
                Ok((addr, elem))
            }
            Expr::Prefix(PrefixOp::Deref, inner) => self.pointer_target(inner),
            _ => Err(CompileError::semantic(
                "Unable to take the address of a constant value",
                expr.span,
            )),
        }
    }

    /// Evaluate a pointer and return the address it holds.
    fn pointer_target(&mut self, pointer: &Spanned<Expr>) -> GenResult<(Value, MugValueType)> {
        let ty = self.expression(pointer, None)?;
        let Some(pointee) = ty.pointee().cloned() else {
            return Err(CompileError::semantic("Expected a pointer", pointer.span));
        };
        Ok((self.emitter.pop().value, pointee))
    }

    /// Like [`Self::address_of`], but rvalues are stored into a temporary slot first.
    fn address_or_spill(&mut self, expr: &Spanned<Expr>) -> GenResult<(Value, MugValueType)> {
        match &expr.node {
            Expr::Identifier(name) if self.lookup(name).is_some() || self.symbols.global(name).is_some() => {
                self.address_of(expr)
            }
            Expr::Member(..) | Expr::Index(..) | Expr::Prefix(PrefixOp::Deref, _) => self.address_of(expr),
            _ => {
                let ty = self.expression(expr, None)?;
                let slot = self.emitter.alloca(&ty);
                self.emitter.store(slot.clone());
                Ok((slot, ty))
            }
        }
    }

    /// Field access through a pointer to a struct reads the pointer first.
    fn auto_deref(&mut self, ptr: Value, ty: MugValueType) -> (Value, MugValueType) {
        match ty.pointee() {
            Some(inner) if inner.as_struct().is_some() => {
                let inner = inner.clone();
                self.emitter.load_from(ptr, ty);
                (self.emitter.pop().value, inner)
            }
            _ => (ptr, ty),
        }
    }

    fn variable_address(&self, name: &str, span: Span) -> GenResult<(Value, MugValueType)> {
        if let Some(local) = self.lookup(name) {
            return Ok((local.ptr.clone(), local.ty.clone()));
        }
        if let Some(global) = self.symbols.global(name) {
            return Ok((Value::Global(global.backend_name.clone()), global.ty.clone()));
        }
        Err(errors::undeclared_variable(name, span))
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Evaluate `expr`, push its value and return its type. `hint` sizes integer constants.
    fn expression(&mut self, expr: &Spanned<Expr>, hint: Option<&MugValueType>) -> GenResult<MugValueType> {
        match &expr.node {
            Expr::Literal(literal) => self.literal(literal, hint, expr.span),
            Expr::Identifier(name) => {
                let (ptr, ty) = self.variable_address(name, expr.span)?;
                self.emitter.load_from(ptr, ty.clone());
                Ok(ty)
            }
            Expr::Binary(op, lhs, rhs) => self.binary(op, lhs, rhs, hint),
            Expr::Prefix(op, operand) => self.prefix(*op, operand, hint),
            Expr::Cast(value, ty) => self.cast(value, ty),
            Expr::Call(call) => self.call(call, expr.span, true),
            Expr::Member(base, member) => {
                if let Some(ty) = self.enum_member(base, member)? {
                    return Ok(ty);
                }
                let (ptr, ty) = self.address_of(expr)?;
                self.emitter.load_from(ptr, ty.clone());
                Ok(ty)
            }
            Expr::Index(..) => {
                let (ptr, ty) = self.address_of(expr)?;
                self.emitter.load_from(ptr, ty.clone());
                Ok(ty)
            }
            Expr::StructAllocation(allocation) => self.struct_allocation(allocation),
            Expr::ArrayAllocation(allocation) => self.array_allocation(allocation),
            Expr::InlineIf(condition, then_value, else_value) => self.inline_if(condition, then_value, else_value, hint),
        }
    }

    fn literal(&mut self, literal: &Literal, hint: Option<&MugValueType>, span: Span) -> GenResult<MugValueType> {
        let ty = match literal {
            Literal::Int(value) => {
                let ty = int_literal_type(*value, hint);
                self.emitter.const_int(ty.clone(), *value);
                ty
            }
            Literal::Bool(value) => {
                self.emitter.const_bool(*value);
                MugValueType::Bool
            }
            Literal::Char(c) => {
                self.emitter.const_int(MugValueType::Char, char_code(*c, span)?);
                MugValueType::Char
            }
            Literal::Str(s) => {
                self.emitter.const_string(s);
                MugValueType::String
            }
            Literal::Float(_) => return Err(errors::not_supported("Floating point constants", span)),
        };
        Ok(ty)
    }

    /// `Enum.Member` when `base` names an enum type rather than a value.
    fn enum_member(&mut self, base: &Spanned<Expr>, member: &Spanned<String>) -> GenResult<Option<MugValueType>> {
        let Expr::Identifier(name) = &base.node else {
            return Ok(None);
        };
        if self.lookup(name).is_some() || self.symbols.global(name).is_some() {
            return Ok(None);
        }
        let Some(ty) = self.symbols.lookup_type(name, 0).and_then(|entry| entry.value.clone()) else {
            return Ok(None);
        };
        let Some(info) = ty.as_enum() else {
            return Err(CompileError::semantic(format!("'{}' is not an enum", name), base.span));
        };
        let Some(value) = info.member(&member.node) else {
            return Err(CompileError::semantic(
                format!("Enum '{}' does not declare member '{}'", name, member.node),
                member.span,
            ));
        };
        self.emitter.const_int(ty.clone(), value);
        Ok(Some(ty))
    }

    fn binary(
        &mut self,
        op: &Spanned<BinaryOp>,
        lhs: &Spanned<Expr>,
        rhs: &Spanned<Expr>,
        hint: Option<&MugValueType>,
    ) -> GenResult<MugValueType> {
        let operand_hint = if op.node.is_comparison() || op.node.is_logical() { None } else { hint };

        // a constant on the left takes its size from the right operand
        let (lt, rt) = if is_int_constant(lhs) && !is_int_constant(rhs) {
            let rt = self.expression(rhs, operand_hint)?;
            let lt = self.expression(lhs, Some(&rt))?;
            self.emitter.swap();
            (lt, rt)
        } else {
            let lt = self.expression(lhs, operand_hint)?;
            let rt = self.expression(rhs, Some(&lt))?;
            (lt, rt)
        };

        if lt != rt {
            return Err(errors::type_mismatch(&lt.to_string(), &rt.to_string(), op.span));
        }
        self.apply_operator(op.node, &lt, &rt, op.span)
    }

    /// Apply `op` to the two operands on top of the stack.
    fn apply_operator(&mut self, op: BinaryOp, lt: &MugValueType, rt: &MugValueType, span: Span) -> GenResult<MugValueType> {
        let arithmetic = match op {
            BinaryOp::Add => Some(module::BinaryOp::Add),
            BinaryOp::Sub => Some(module::BinaryOp::Sub),
            BinaryOp::Mul => Some(module::BinaryOp::Mul),
            BinaryOp::Div => Some(module::BinaryOp::SDiv),
            _ => None,
        };
        if let (Some(arithmetic), true) = (arithmetic, lt.is_int()) {
            self.emitter.binary(arithmetic);
            return Ok(lt.clone());
        }

        let predicate = match op {
            BinaryOp::Eq => Some(Predicate::Eq),
            BinaryOp::NotEq => Some(Predicate::Ne),
            BinaryOp::Lt => Some(Predicate::Slt),
            BinaryOp::Gt => Some(Predicate::Sgt),
            BinaryOp::LtEq => Some(Predicate::Sle),
            BinaryOp::GtEq => Some(Predicate::Sge),
            _ => None,
        };
        if let Some(predicate) = predicate {
            let intrinsic = lt.is_int()
                || matches!(lt, MugValueType::Char)
                || (matches!(lt, MugValueType::Bool | MugValueType::Enum(_))
                    && matches!(predicate, Predicate::Eq | Predicate::Ne));
            if intrinsic {
                self.emitter.compare(predicate);
                return Ok(MugValueType::Bool);
            }
        }

        match op {
            BinaryOp::And | BinaryOp::Or if lt.is_bool() => {
                let op = if op == BinaryOp::And { module::BinaryOp::And } else { module::BinaryOp::Or };
                self.emitter.binary(op);
                Ok(MugValueType::Bool)
            }
            BinaryOp::Range => Err(errors::not_supported("Range operator", span)),
            _ => self.user_operator(&op.to_string(), lt, rt, span),
        }
    }

    /// Operators over user types call the function named by the operator (`` func `+`(...) ``).
    fn user_operator(&mut self, op: &str, lt: &MugValueType, rt: &MugValueType, span: Span) -> GenResult<MugValueType> {
        let signature = Signature::new(vec![lt.clone(), rt.clone()]);
        let (callee, ret) = self.concrete(op, &signature, span)?;
        expect_non_void(&ret, span)?;
        self.emitter.call(&callee, 2, ret.clone());
        Ok(ret)
    }

    fn prefix(&mut self, op: PrefixOp, operand: &Spanned<Expr>, hint: Option<&MugValueType>) -> GenResult<MugValueType> {
        match op {
            PrefixOp::Neg | PrefixOp::Plus => {
                let ty = self.expression(operand, hint)?;
                expect_int(&ty, operand.span)?;
                if op == PrefixOp::Neg {
                    self.emitter.neg_int();
                }
                Ok(ty)
            }
            PrefixOp::Not => {
                let ty = self.expression(operand, Some(&MugValueType::Bool))?;
                expect_type(&MugValueType::Bool, &ty, operand.span)?;
                self.emitter.neg_bool();
                Ok(ty)
            }
            PrefixOp::AddressOf => {
                let (ptr, ty) = self.address_of(operand)?;
                let ty = MugValueType::Pointer(Box::new(ty));
                self.emitter.load(MugValue::new(ty.clone(), ptr));
                Ok(ty)
            }
            PrefixOp::Deref => {
                let (ptr, ty) = self.pointer_target(operand)?;
                self.emitter.load_from(ptr, ty.clone());
                Ok(ty)
            }
            PrefixOp::Increment | PrefixOp::Decrement => {
                self.expect_mutable(operand)?;
                let (ptr, ty) = self.address_of(operand)?;
                expect_int(&ty, operand.span)?;
                self.emitter.load_from(ptr.clone(), ty.clone());
                self.emitter.const_int(ty.clone(), 1);
                let op = if op == PrefixOp::Increment { module::BinaryOp::Add } else { module::BinaryOp::Sub };
                self.emitter.binary(op);
                let updated = self.emitter.pop();
                self.emitter.load(updated.clone());
                self.emitter.store(ptr);
                self.emitter.load(updated);
                Ok(ty)
            }
        }
    }

    fn cast(&mut self, value: &Spanned<Expr>, ty: &Spanned<Type>) -> GenResult<MugValueType> {
        let from = self.expression(value, None)?;
        let to = self.symbols.resolve_type(ty)?;

        if from == to {
            return Ok(to);
        }

        match (&from, &to) {
            (MugValueType::Enum(info), _) => {
                if info.base != to {
                    return Err(CompileError::semantic(
                        format!("Enum base type is incompatible with type `{}`", to),
                        ty.span,
                    ));
                }
                self.emitter.retype(to.clone());
            }
            (_, MugValueType::Enum(info)) => {
                if info.base != from {
                    return Err(CompileError::semantic(
                        format!("The base type of enum `{}` is incompatible with type `{}`", info.name, from),
                        ty.span,
                    ));
                }
                self.emitter.retype(to.clone());
            }
            (MugValueType::String, MugValueType::Array(elem)) if **elem == MugValueType::Char => {
                self.emitter.retype(to.clone());
            }
            _ if from.int_width().is_some() && to.int_width().is_some() => self.emitter.cast_int(to.clone()),
            (MugValueType::Pointer(_), MugValueType::Pointer(_)) => self.emitter.cast(CastOp::Bitcast, to.clone()),
            _ => {
                let signature = Signature {
                    cast_target: Some(to.clone()),
                    ..Signature::new(vec![from.clone()])
                };
                let (callee, ret) = self.concrete(CAST_OPERATOR, &signature, ty.span)?;
                self.emitter.call(&callee, 1, ret);
            }
        }
        Ok(to)
    }

    /// Evaluate a call. Results of void callees are only allowed in statement position.
    fn call(&mut self, call: &CallExpr, span: Span, value_expected: bool) -> GenResult<MugValueType> {
        if !call.generics.is_empty() {
            return Err(errors::not_supported("Generic instantiation", span));
        }

        let (name, name_span, receiver) = match &call.callee.node {
            Expr::Identifier(name) => (name.clone(), call.callee.span, None),
            Expr::Member(base, name) => {
                let receiver = self.expression(base, None)?;
                (name.node.clone(), name.span, Some(receiver))
            }
            _ => return Err(CompileError::semantic("This expression cannot be called", call.callee.span)),
        };

        let mut params = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            params.push(self.expression(arg, None)?);
        }
        let argc = params.len() + usize::from(receiver.is_some());

        let mut signature = Signature::new(params);
        signature.receiver = receiver;

        let (callee, ret) = self.concrete(&name, &signature, name_span)?;
        if value_expected {
            expect_non_void(&ret, span)?;
        }
        self.emitter.call(&callee, argc, ret.clone());
        Ok(ret)
    }

    /// Backend name and return type of the overload of `name` matching `signature`.
    fn concrete(&self, name: &str, signature: &Signature, span: Span) -> GenResult<(String, MugValueType)> {
        let entry = self.symbols.resolve_function(name, signature, span)?;
        match &entry.identity {
            FunctionIdentity::Concrete(concrete) => Ok((concrete.backend_name.clone(), concrete.return_type.clone())),
            FunctionIdentity::Defined(_) => Err(errors::not_supported("Generic instantiation", span)),
            FunctionIdentity::Prototype(_) => Err(CompileError::semantic(
                format!("Function '{}' has an unresolved signature", name),
                span,
            )),
        }
    }

    fn struct_allocation(&mut self, allocation: &StructAllocation) -> GenResult<MugValueType> {
        let ty = self.symbols.resolve_type(&allocation.ty)?;
        let Some(info) = ty.as_struct().cloned() else {
            return Err(CompileError::semantic(
                format!("Unable to allocate type {} with `new` operator", ty),
                allocation.ty.span,
            ));
        };

        let slot = self.emitter.alloca(&ty);
        self.emitter.const_zero(ty.clone());
        self.emitter.store(slot.clone());

        let mut assigned = vec![false; info.field_names.len()];
        for field in &allocation.fields {
            let Some(index) = info.field_index(&field.node.name) else {
                return Err(CompileError::semantic("Undeclared field", field.span));
            };
            if std::mem::replace(&mut assigned[index], true) {
                return Err(CompileError::semantic("Field reassignment in type allocation", field.span));
            }

            let expected = &info.field_types[index];
            let found = self.expression(&field.node.value, Some(expected))?;
            expect_type(expected, &found, field.node.value.span)?;
            let addr = self.emitter.field_addr(slot.clone(), &ty, index);
            self.emitter.store(addr);
        }

        self.emitter.load_from(slot, ty.clone());
        Ok(ty)
    }

    fn array_allocation(&mut self, allocation: &ArrayAllocation) -> GenResult<MugValueType> {
        let elem = self.symbols.resolve_type(&allocation.elem_type)?;
        expect_non_void(&elem, allocation.elem_type.span)?;

        if let Expr::Literal(Literal::Int(size)) = &allocation.size.node {
            if usize::try_from(*size).is_ok_and(|size| allocation.elements.len() > size) {
                return Err(CompileError::semantic(
                    format!("Too many elements for an array of size {}", size),
                    allocation.size.span,
                ));
            }
        }

        let size_ty = self.expression(&allocation.size, Some(&MugValueType::Int64))?;
        expect_int(&size_ty, allocation.size.span)?;
        self.emitter.cast_int(MugValueType::Int64);
        let buffer = self.emitter.malloc_array(&elem);

        for (i, element) in allocation.elements.iter().enumerate() {
            self.emitter.const_int(MugValueType::Int64, i as i64);
            let addr = self.emitter.element_addr(buffer.clone(), &elem);
            let found = self.expression(element, Some(&elem))?;
            expect_type(&elem, &found, element.span)?;
            self.emitter.store(addr);
        }

        let ty = MugValueType::Array(Box::new(elem));
        self.emitter.load(MugValue::new(ty.clone(), buffer));
        Ok(ty)
    }

    fn inline_if(
        &mut self,
        condition: &Spanned<Expr>,
        then_value: &Spanned<Expr>,
        else_value: &Spanned<Expr>,
        hint: Option<&MugValueType>,
    ) -> GenResult<MugValueType> {
        self.condition(condition)?;
        let then_block = self.emitter.new_block("select.then");
        let else_block = self.emitter.new_block("select.else");
        let end_block = self.emitter.new_block("select.end");
        self.emitter.compare_jump(then_block, else_block);

        self.emitter.position_at(then_block);
        let then_ty = self.expression(then_value, hint)?;
        let then_result = self.emitter.pop();
        let then_exit = self.emitter.current_block();
        self.emitter.jump(end_block);

        self.emitter.position_at(else_block);
        let else_ty = self.expression(else_value, Some(&then_ty))?;
        expect_type(&then_ty, &else_ty, else_value.span)?;
        let else_result = self.emitter.pop();
        let else_exit = self.emitter.current_block();
        self.emitter.jump(end_block);

        self.emitter.position_at(end_block);
        self.emitter.phi(
            then_ty.clone(),
            vec![(then_result.value, then_exit), (else_result.value, else_exit)],
        );
        Ok(then_ty)
    }
}

/// Code of a `chr` literal; only characters up to U+00FF fit its 8 bits.
pub(crate) fn char_code(c: char, span: Span) -> GenResult<i64> {
    u8::try_from(c)
        .map(i64::from)
        .map_err(|_| CompileError::semantic(format!("Character '{}' does not fit in type 'chr'", c), span))
}

fn expect_type(expected: &MugValueType, found: &MugValueType, span: Span) -> GenResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(errors::type_mismatch(&expected.to_string(), &found.to_string(), span))
    }
}

fn expect_int(ty: &MugValueType, span: Span) -> GenResult<()> {
    if ty.is_int() {
        Ok(())
    } else {
        Err(CompileError::semantic(
            format!("Expected 'u8', 'i32', 'i64' type, got '{}'", ty),
            span,
        ))
    }
}

fn expect_non_void(ty: &MugValueType, span: Span) -> GenResult<()> {
    if ty.is_void() {
        Err(CompileError::semantic("Expected a non-void type", span))
    } else {
        Ok(())
    }
}

fn is_int_constant(expr: &Spanned<Expr>) -> bool {
    match &expr.node {
        Expr::Literal(Literal::Int(_)) => true,
        Expr::Prefix(PrefixOp::Neg | PrefixOp::Plus, inner) => is_int_constant(inner),
        _ => false,
    }
}

/// Type of an integer literal: the hint when the value fits it, else `i32` or `i64`.
pub(crate) fn int_literal_type(value: i64, hint: Option<&MugValueType>) -> MugValueType {
    match hint {
        Some(hint) if hint.is_int() && fits(value, hint) => hint.clone(),
        _ if i32::try_from(value).is_ok() => MugValueType::Int32,
        _ => MugValueType::Int64,
    }
}

/// Whether `value` is representable in the integer type `ty` (sign is not tracked).
pub(crate) fn fits(value: i64, ty: &MugValueType) -> bool {
    match ty {
        MugValueType::Int8 => (-128..=255).contains(&value),
        MugValueType::Int32 => (i64::from(i32::MIN)..=i64::from(u32::MAX)).contains(&value),
        MugValueType::Int64 => true,
        _ => false,
    }
}
