//! Stack-discipline instruction emitter
//!
//! Expression evaluation pushes typed operands and pops them to apply operators, casts and calls.
//! One [`Emitter`] is created per function body and writes into the shared [`BackendModule`].

use std::collections::HashSet;

use crate::backend::module::{
    BackendModule, BinaryOp, BlockRef, CastOp, FunctionRef, Instruction, IrType, MALLOC, Predicate, Value,
};
use crate::frontend::types::MugValueType;

/// A typed backend value.
#[derive(Debug, Clone, PartialEq)]
pub struct MugValue {
    pub ty: MugValueType,
    pub value: Value,
}

impl MugValue {
    pub fn new(ty: MugValueType, value: Value) -> Self {
        Self { ty, value }
    }

    fn ir(&self) -> (IrType, Value) {
        (self.ty.ir_type(), self.value.clone())
    }
}

pub struct Emitter<'m> {
    module: &'m mut BackendModule,
    function: FunctionRef,
    block: BlockRef,
    stack: Vec<MugValue>,
    labels: usize,
    /// Blocks opened after a terminator; they have no predecessors
    dead: HashSet<BlockRef>,
}

impl<'m> Emitter<'m> {
    /// Start emitting the body of `function` at a fresh `entry` block.
    pub fn new(module: &'m mut BackendModule, function: FunctionRef) -> Self {
        let block = module.append_block(function, "entry");
        Self {
            module,
            function,
            block,
            stack: Vec::new(),
            labels: 0,
            dead: HashSet::new(),
        }
    }

    pub fn module(&mut self) -> &mut BackendModule {
        self.module
    }

    pub fn function(&self) -> FunctionRef {
        self.function
    }

    // ========================================================================
    // Stack
    // ========================================================================

    pub fn load(&mut self, value: MugValue) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> MugValue {
        debug_assert!(!self.stack.is_empty(), "emitter stack underflow");
        self.stack
            .pop()
            .unwrap_or_else(|| MugValue::new(MugValueType::Void, Value::Zero))
    }

    pub fn peek_type(&self) -> MugValueType {
        self.stack
            .last()
            .map(|v| v.ty.clone())
            .unwrap_or(MugValueType::Void)
    }

    pub fn swap(&mut self) {
        let len = self.stack.len();
        if len >= 2 {
            self.stack.swap(len - 1, len - 2);
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    // ========================================================================
    // Constants
    // ========================================================================

    pub fn const_int(&mut self, ty: MugValueType, value: i64) {
        self.load(MugValue::new(ty, Value::Int(value)));
    }

    pub fn const_bool(&mut self, value: bool) {
        self.const_int(MugValueType::Bool, value as i64);
    }

    pub fn const_string(&mut self, value: &str) {
        let global = self.module.add_string(value);
        self.load(MugValue::new(MugValueType::String, global));
    }

    pub fn const_zero(&mut self, ty: MugValueType) {
        let value = if ty.is_scalar() { Value::Int(0) } else { Value::Zero };
        self.load(MugValue::new(ty, value));
    }

    // ========================================================================
    // Memory
    // ========================================================================

    fn register(&mut self) -> u32 {
        self.module.next_register(self.function)
    }

    fn emit(&mut self, instruction: Instruction) {
        self.module.push(self.block, instruction);
    }

    /// Allocate a stack slot for one `ty`.
    pub fn alloca(&mut self, ty: &MugValueType) -> Value {
        let dest = self.register();
        self.emit(Instruction::Alloca {
            dest,
            ty: ty.ir_type(),
            count: None,
        });
        Value::Reg(dest)
    }

    /// Allocate a heap buffer of `count` elements, popping the `i64` count.
    pub fn malloc_array(&mut self, elem: &MugValueType) -> Value {
        let size = self.register();
        self.emit(Instruction::SizeOf {
            dest: size,
            ty: elem.ir_type(),
        });
        self.load(MugValue::new(MugValueType::Int64, Value::Reg(size)));
        self.binary(BinaryOp::Mul);

        self.module.declare_malloc();
        self.call(MALLOC, 1, MugValueType::Pointer(Box::new(MugValueType::Int8)));
        self.cast(CastOp::Bitcast, MugValueType::Array(Box::new(elem.clone())));
        self.pop().value
    }

    /// Pop a value and store it at `ptr`.
    pub fn store(&mut self, ptr: Value) {
        let value = self.pop();
        let ty = value.ty.ir_type();
        self.emit(Instruction::Store {
            ty,
            value: value.value,
            ptr,
        });
    }

    /// Push the `ty` value stored at `ptr`.
    pub fn load_from(&mut self, ptr: Value, ty: MugValueType) {
        let dest = self.register();
        self.emit(Instruction::Load {
            dest,
            ty: ty.ir_type(),
            ptr,
        });
        self.load(MugValue::new(ty, Value::Reg(dest)));
    }

    /// Address of field `index` of the struct of type `ty` at `ptr`.
    pub fn field_addr(&mut self, ptr: Value, ty: &MugValueType, index: usize) -> Value {
        let dest = self.register();
        self.emit(Instruction::FieldAddr {
            dest,
            ty: ty.ir_type(),
            ptr,
            index: index as u32,
        });
        Value::Reg(dest)
    }

    /// Address of an element of the buffer at `ptr`, popping the index.
    pub fn element_addr(&mut self, ptr: Value, elem: &MugValueType) -> Value {
        let index = self.pop();
        let dest = self.register();
        self.emit(Instruction::ElementAddr {
            dest,
            ty: elem.ir_type(),
            ptr,
            index: index.ir(),
        });
        Value::Reg(dest)
    }

    // ========================================================================
    // Operators
    // ========================================================================

    /// Pop two operands of the same type and push `lhs op rhs`.
    pub fn binary(&mut self, op: BinaryOp) {
        let rhs = self.pop();
        let lhs = self.pop();
        let dest = self.register();
        self.emit(Instruction::Binary {
            dest,
            op,
            ty: lhs.ty.ir_type(),
            lhs: lhs.value,
            rhs: rhs.value,
        });
        self.load(MugValue::new(lhs.ty, Value::Reg(dest)));
    }

    /// Pop two operands and push the `u1` result of comparing them.
    pub fn compare(&mut self, pred: Predicate) {
        let rhs = self.pop();
        let lhs = self.pop();
        let dest = self.register();
        self.emit(Instruction::Compare {
            dest,
            pred,
            ty: lhs.ty.ir_type(),
            lhs: lhs.value,
            rhs: rhs.value,
        });
        self.load(MugValue::new(MugValueType::Bool, Value::Reg(dest)));
    }

    pub fn neg_int(&mut self) {
        let ty = self.peek_type();
        self.const_int(ty, 0);
        self.swap();
        self.binary(BinaryOp::Sub);
    }

    pub fn neg_bool(&mut self) {
        self.const_bool(true);
        self.binary(BinaryOp::Xor);
    }

    /// Pop a value and push it converted to `to`.
    pub fn cast(&mut self, op: CastOp, to: MugValueType) {
        let value = self.pop();
        let dest = self.register();
        self.emit(Instruction::Cast {
            dest,
            op,
            from: value.ty.ir_type(),
            value: value.value,
            to: to.ir_type(),
        });
        self.load(MugValue::new(to, Value::Reg(dest)));
    }

    /// Integer resize between `u8`, `i32`, `i64`, `chr` and `u1`.
    pub fn cast_int(&mut self, to: MugValueType) {
        let from = self.peek_type().int_width().unwrap_or(0);
        let width = to.int_width().unwrap_or(0);
        if from == width {
            self.retype(to);
        } else if from < width {
            let op = if self.peek_type().is_bool() { CastOp::ZExt } else { CastOp::SExt };
            self.cast(op, to);
        } else {
            self.cast(CastOp::Trunc, to);
        }
    }

    /// Change the static type of the top value without emitting anything.
    pub fn retype(&mut self, to: MugValueType) {
        let value = self.pop();
        self.load(MugValue::new(to, value.value));
    }

    /// Pop `argc` arguments, call `callee` and push the result unless it is void.
    pub fn call(&mut self, callee: &str, argc: usize, ret: MugValueType) {
        let split = self.stack.len().saturating_sub(argc);
        let args = self.stack.split_off(split).iter().map(MugValue::ir).collect();
        let dest = if ret.is_void() { None } else { Some(self.register()) };
        self.emit(Instruction::Call {
            dest,
            ret: ret.ir_type(),
            callee: Value::Function(callee.to_string()),
            args,
        });
        if let Some(dest) = dest {
            self.load(MugValue::new(ret, Value::Reg(dest)));
        }
    }

    // ========================================================================
    // Control flow
    // ========================================================================

    /// Push the value of `ty` selected by whichever block branched here.
    pub fn phi(&mut self, ty: MugValueType, incoming: Vec<(Value, BlockRef)>) {
        let incoming = incoming
            .into_iter()
            .map(|(value, block)| (value, self.module.block(block).label.clone()))
            .collect();
        let dest = self.register();
        self.emit(Instruction::Phi {
            dest,
            ty: ty.ir_type(),
            incoming,
        });
        self.load(MugValue::new(ty, Value::Reg(dest)));
    }

    pub fn ret(&mut self) {
        let value = self.pop();
        self.emit(Instruction::Ret(Some(value.ir())));
    }

    pub fn ret_void(&mut self) {
        self.emit(Instruction::Ret(None));
    }

    /// Append a new block labelled `{prefix}.{n}`, without moving the insertion point.
    pub fn new_block(&mut self, prefix: &str) -> BlockRef {
        self.labels += 1;
        let label = format!("{}.{}", prefix, self.labels);
        self.module.append_block(self.function, label)
    }

    pub fn position_at(&mut self, block: BlockRef) {
        self.block = block;
    }

    pub fn current_block(&self) -> BlockRef {
        self.block
    }

    pub fn is_terminated(&self) -> bool {
        self.module.block(self.block).is_terminated()
    }

    pub fn jump(&mut self, target: BlockRef) {
        if !self.is_terminated() {
            let label = self.module.block(target).label.clone();
            self.emit(Instruction::Br(label));
        }
    }

    /// Pop a `u1` and branch on it.
    pub fn compare_jump(&mut self, then_block: BlockRef, else_block: BlockRef) {
        let cond = self.pop();
        let then_label = self.module.block(then_block).label.clone();
        let else_label = self.module.block(else_block).label.clone();
        self.emit(Instruction::CondBr {
            cond: cond.value,
            then_label,
            else_label,
        });
    }

    /// Move to a fresh unreachable block if the current one already ended.
    pub fn ensure_open(&mut self) {
        if self.is_terminated() {
            let block = self.new_block("dead");
            self.dead.insert(block);
            self.block = block;
        }
    }

    /// Close blocks that can never run.
    pub fn finish(self) {
        let mut dead: Vec<_> = self.dead.into_iter().collect();
        dead.sort_by_key(|b| self.module.block(*b).label.clone());
        for block in dead {
            if !self.module.block(block).is_terminated() {
                self.module.push(block, Instruction::Unreachable);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(module: &BackendModule, function: FunctionRef) -> Vec<String> {
        module.function(function).blocks[0]
            .instructions
            .iter()
            .map(|i| i.to_string())
            .collect()
    }

    #[test]
    fn test_binary_pops_two_pushes_one() {
        let mut module = BackendModule::new("t");
        let f = module.declare_function("f", vec![], IrType::Int(32));
        let mut emitter = Emitter::new(&mut module, f);

        emitter.const_int(MugValueType::Int32, 2);
        emitter.const_int(MugValueType::Int32, 3);
        emitter.binary(BinaryOp::Mul);
        assert_eq!(emitter.depth(), 1);
        emitter.ret();
        emitter.finish();

        assert_eq!(lines(&module, f), vec!["%0 = mul i32 2, 3", "ret i32 %0"]);
    }

    #[test]
    fn test_neg_is_zero_minus_value() {
        let mut module = BackendModule::new("t");
        let f = module.declare_function("f", vec![IrType::Int(64)], IrType::Int(64));
        let mut emitter = Emitter::new(&mut module, f);

        emitter.load(MugValue::new(MugValueType::Int64, Value::Reg(0)));
        emitter.neg_int();
        emitter.ret();
        emitter.finish();

        assert_eq!(lines(&module, f), vec!["%1 = sub i64 0, %0", "ret i64 %1"]);
    }

    #[test]
    fn test_call_consumes_exact_argument_count() {
        let mut module = BackendModule::new("t");
        let f = module.declare_function("f", vec![], IrType::Void);
        let mut emitter = Emitter::new(&mut module, f);

        emitter.const_int(MugValueType::Int32, 7);
        emitter.const_int(MugValueType::Int32, 1);
        emitter.const_int(MugValueType::Int32, 2);
        emitter.call("g(i32, i32)", 2, MugValueType::Void);
        assert_eq!(emitter.depth(), 1);
        assert_eq!(emitter.peek_type(), MugValueType::Int32);

        emitter.call("h(i32)", 1, MugValueType::Bool);
        assert_eq!(emitter.peek_type(), MugValueType::Bool);
    }

    #[test]
    fn test_malloc_array_yields_typed_buffer() {
        let mut module = BackendModule::new("t");
        let f = module.declare_function("f", vec![], IrType::Void);
        let mut emitter = Emitter::new(&mut module, f);

        emitter.const_int(MugValueType::Int64, 4);
        let buffer = emitter.malloc_array(&MugValueType::Int64);
        assert_eq!(buffer, Value::Reg(3));
        assert_eq!(emitter.depth(), 0);

        assert_eq!(
            lines(&module, f),
            vec![
                "%0 = ptrtoint i64* getelementptr (i64, i64* null, i32 1) to i64",
                "%1 = mul i64 4, %0",
                "%2 = call i8* @\"malloc\"(i64 %1)",
                "%3 = bitcast i8* %2 to i64*",
            ]
        );
        assert!(module.get_function(MALLOC).is_some());
    }

    #[test]
    fn test_cast_int_picks_direction() {
        let mut module = BackendModule::new("t");
        let f = module.declare_function("f", vec![], IrType::Void);
        let mut emitter = Emitter::new(&mut module, f);

        emitter.const_int(MugValueType::Int32, 1);
        emitter.cast_int(MugValueType::Int64);
        emitter.cast_int(MugValueType::Int8);
        emitter.cast_int(MugValueType::Char);
        assert_eq!(emitter.peek_type(), MugValueType::Char);
        emitter.pop();

        emitter.const_bool(true);
        emitter.cast_int(MugValueType::Int32);

        assert_eq!(
            lines(&module, f),
            vec!["%0 = sext i32 1 to i64", "%1 = trunc i64 %0 to i8", "%2 = zext i1 1 to i32"]
        );
    }

    #[test]
    fn test_dead_blocks_become_unreachable() {
        let mut module = BackendModule::new("t");
        let f = module.declare_function("f", vec![], IrType::Void);
        let mut emitter = Emitter::new(&mut module, f);

        emitter.ret_void();
        emitter.ensure_open();
        emitter.const_int(MugValueType::Int32, 1);
        emitter.pop();
        emitter.finish();

        assert!(module.verify().is_ok());
        let blocks = &module.function(f).blocks;
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].label, "dead.1");
    }

    #[test]
    fn test_jump_after_terminator_is_dropped() {
        let mut module = BackendModule::new("t");
        let f = module.declare_function("f", vec![], IrType::Void);
        let mut emitter = Emitter::new(&mut module, f);
        let exit = emitter.new_block("exit");

        emitter.ret_void();
        emitter.jump(exit);
        emitter.position_at(exit);
        emitter.ret_void();
        emitter.finish();

        assert_eq!(lines(&module, f), vec!["ret void"]);
    }
}
