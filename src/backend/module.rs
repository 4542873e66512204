//! In-memory backend module
//!
//! Stands in for the native code generator: global string constants, struct type definitions,
//! function declarations and bodies made of labelled basic blocks of typed instructions. The module
//! renders as LLVM-style textual IR and can verify that every basic block ends in a terminator.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Backend name of the heap allocator used for arrays.
pub const MALLOC: &str = "malloc";

/// Lowered value type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrType {
    Void,
    /// `iN`
    Int(u32),
    Pointer(Box<IrType>),
    /// A named struct type
    Named(String),
    Function(Vec<IrType>, Box<IrType>),
}

impl IrType {
    pub fn pointer_to(self) -> IrType {
        IrType::Pointer(Box::new(self))
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Int(bits) => write!(f, "i{}", bits),
            IrType::Pointer(elem) => write!(f, "{}*", elem),
            IrType::Named(name) => write!(f, "%\"{}\"", name),
            IrType::Function(params, ret) => write!(f, "{} ({})", ret, join(params)),
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

/// Operand of an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    /// Virtual register `%N`
    Reg(u32),
    Global(String),
    Function(String),
    Null,
    Zero,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Reg(r) => write!(f, "%{}", r),
            Value::Global(name) | Value::Function(name) => write!(f, "@\"{}\"", name),
            Value::Null => write!(f, "null"),
            Value::Zero => write!(f, "zeroinitializer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    SDiv,
    And,
    Or,
    Xor,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::SDiv => "sdiv",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Eq,
    Ne,
    Slt,
    Sgt,
    Sle,
    Sge,
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Predicate::Eq => "eq",
            Predicate::Ne => "ne",
            Predicate::Slt => "slt",
            Predicate::Sgt => "sgt",
            Predicate::Sle => "sle",
            Predicate::Sge => "sge",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    SExt,
    ZExt,
    Trunc,
    Bitcast,
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CastOp::SExt => "sext",
            CastOp::ZExt => "zext",
            CastOp::Trunc => "trunc",
            CastOp::Bitcast => "bitcast",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Alloca {
        dest: u32,
        ty: IrType,
        count: Option<(IrType, Value)>,
    },
    Load {
        dest: u32,
        ty: IrType,
        ptr: Value,
    },
    Store {
        ty: IrType,
        value: Value,
        ptr: Value,
    },
    Binary {
        dest: u32,
        op: BinaryOp,
        ty: IrType,
        lhs: Value,
        rhs: Value,
    },
    Compare {
        dest: u32,
        pred: Predicate,
        ty: IrType,
        lhs: Value,
        rhs: Value,
    },
    Call {
        dest: Option<u32>,
        ret: IrType,
        callee: Value,
        args: Vec<(IrType, Value)>,
    },
    /// Address of field `index` of the struct behind `ptr`
    FieldAddr {
        dest: u32,
        ty: IrType,
        ptr: Value,
        index: u32,
    },
    /// Address of element `index` of the buffer behind `ptr`
    ElementAddr {
        dest: u32,
        ty: IrType,
        ptr: Value,
        index: (IrType, Value),
    },
    Cast {
        dest: u32,
        op: CastOp,
        from: IrType,
        value: Value,
        to: IrType,
    },
    /// Allocation size of one `ty`, as an `i64`
    SizeOf {
        dest: u32,
        ty: IrType,
    },
    /// Value chosen by the predecessor block that branched here
    Phi {
        dest: u32,
        ty: IrType,
        incoming: Vec<(Value, String)>,
    },
    Ret(Option<(IrType, Value)>),
    Br(String),
    CondBr {
        cond: Value,
        then_label: String,
        else_label: String,
    },
    Unreachable,
}

impl Instruction {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Ret(_) | Instruction::Br(_) | Instruction::CondBr { .. } | Instruction::Unreachable
        )
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Alloca { dest, ty, count } => match count {
                Some((count_ty, count)) => write!(f, "%{} = alloca {}, {} {}", dest, ty, count_ty, count),
                None => write!(f, "%{} = alloca {}", dest, ty),
            },
            Instruction::Load { dest, ty, ptr } => write!(f, "%{} = load {}, {}* {}", dest, ty, ty, ptr),
            Instruction::Store { ty, value, ptr } => write!(f, "store {} {}, {}* {}", ty, value, ty, ptr),
            Instruction::Binary {
                dest,
                op,
                ty,
                lhs,
                rhs,
            } => write!(f, "%{} = {} {} {}, {}", dest, op, ty, lhs, rhs),
            Instruction::Compare {
                dest,
                pred,
                ty,
                lhs,
                rhs,
            } => write!(f, "%{} = icmp {} {} {}, {}", dest, pred, ty, lhs, rhs),
            Instruction::Call { dest, ret, callee, args } => {
                let args = args
                    .iter()
                    .map(|(ty, v)| format!("{} {}", ty, v))
                    .collect::<Vec<_>>()
                    .join(", ");
                match dest {
                    Some(dest) => write!(f, "%{} = call {} {}({})", dest, ret, callee, args),
                    None => write!(f, "call {} {}({})", ret, callee, args),
                }
            }
            Instruction::FieldAddr { dest, ty, ptr, index } => write!(
                f,
                "%{} = getelementptr inbounds {}, {}* {}, i32 0, i32 {}",
                dest, ty, ty, ptr, index
            ),
            Instruction::ElementAddr {
                dest,
                ty,
                ptr,
                index: (index_ty, index),
            } => write!(
                f,
                "%{} = getelementptr inbounds {}, {}* {}, {} {}",
                dest, ty, ty, ptr, index_ty, index
            ),
            Instruction::Cast {
                dest,
                op,
                from,
                value,
                to,
            } => write!(f, "%{} = {} {} {} to {}", dest, op, from, value, to),
            Instruction::SizeOf { dest, ty } => write!(
                f,
                "%{} = ptrtoint {}* getelementptr ({}, {}* null, i32 1) to i64",
                dest, ty, ty, ty
            ),
            Instruction::Phi { dest, ty, incoming } => {
                let incoming = incoming
                    .iter()
                    .map(|(value, label)| format!("[ {}, %{} ]", value, label))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "%{} = phi {} {}", dest, ty, incoming)
            }
            Instruction::Ret(Some((ty, value))) => write!(f, "ret {} {}", ty, value),
            Instruction::Ret(None) => write!(f, "ret void"),
            Instruction::Br(label) => write!(f, "br label %{}", label),
            Instruction::CondBr {
                cond,
                then_label,
                else_label,
            } => write!(f, "br i1 {}, label %{}, label %{}", cond, then_label, else_label),
            Instruction::Unreachable => write!(f, "unreachable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn is_terminated(&self) -> bool {
        self.instructions.last().is_some_and(Instruction::is_terminator)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<IrType>,
    pub ret: IrType,
    pub blocks: Vec<BasicBlock>,
    next_register: u32,
}

impl Function {
    /// A function without blocks is an external declaration.
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The value of parameter `index` inside the body.
    pub fn param(&self, index: usize) -> Value {
        Value::Reg(index as u32)
    }
}

/// Handle to a function of a [`BackendModule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionRef(usize);

/// Handle to a basic block of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    function: usize,
    block: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct StringConstant {
    name: String,
    bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
struct GlobalVariable {
    name: String,
    ty: IrType,
    init: Value,
}

/// A basic block that falls off its end.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("function '{function}': basic block '{block}' does not end with a terminator")]
pub struct VerifyError {
    pub function: String,
    pub block: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendModule {
    name: String,
    strings: Vec<StringConstant>,
    struct_types: Vec<(String, Vec<IrType>)>,
    globals: Vec<GlobalVariable>,
    functions: Vec<Function>,
    function_index: HashMap<String, usize>,
    linked: Vec<PathBuf>,
}

impl BackendModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strings: Vec::new(),
            struct_types: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            function_index: HashMap::new(),
            linked: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ========================================================================
    // Globals
    // ========================================================================

    /// Intern a string constant and return a pointer to its first byte.
    pub fn add_string(&mut self, value: &str) -> Value {
        if let Some(existing) = self.strings.iter().find(|s| s.bytes == value.as_bytes()) {
            return Value::Global(existing.name.clone());
        }
        let name = format!(".str.{}", self.strings.len());
        self.strings.push(StringConstant {
            name: name.clone(),
            bytes: value.as_bytes().to_vec(),
        });
        Value::Global(name)
    }

    pub fn define_struct(&mut self, name: impl Into<String>, fields: Vec<IrType>) {
        self.struct_types.push((name.into(), fields));
    }

    pub fn add_global(&mut self, name: impl Into<String>, ty: IrType, init: Value) -> Value {
        let name = name.into();
        self.globals.push(GlobalVariable {
            name: name.clone(),
            ty,
            init,
        });
        Value::Global(name)
    }

    /// Record a bitcode artifact for the final link.
    pub fn link(&mut self, artifact: impl AsRef<Path>) {
        let artifact = artifact.as_ref().to_path_buf();
        if !self.linked.contains(&artifact) {
            self.linked.push(artifact);
        }
    }

    pub fn linked(&self) -> &[PathBuf] {
        &self.linked
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// Declare a function, or return the existing one with the same backend name.
    pub fn declare_function(&mut self, name: &str, params: Vec<IrType>, ret: IrType) -> FunctionRef {
        if let Some(&index) = self.function_index.get(name) {
            return FunctionRef(index);
        }
        let index = self.functions.len();
        self.functions.push(Function {
            name: name.to_string(),
            next_register: params.len() as u32,
            params,
            ret,
            blocks: Vec::new(),
        });
        self.function_index.insert(name.to_string(), index);
        FunctionRef(index)
    }

    /// Declare the C allocator, `i8* malloc(i64)`.
    pub fn declare_malloc(&mut self) -> FunctionRef {
        self.declare_function(MALLOC, vec![IrType::Int(64)], IrType::Int(8).pointer_to())
    }

    pub fn get_function(&self, name: &str) -> Option<FunctionRef> {
        self.function_index.get(name).copied().map(FunctionRef)
    }

    pub fn function(&self, function: FunctionRef) -> &Function {
        &self.functions[function.0]
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }

    pub fn append_block(&mut self, function: FunctionRef, label: impl Into<String>) -> BlockRef {
        let blocks = &mut self.functions[function.0].blocks;
        blocks.push(BasicBlock {
            label: label.into(),
            instructions: Vec::new(),
        });
        BlockRef {
            function: function.0,
            block: blocks.len() - 1,
        }
    }

    pub fn block(&self, block: BlockRef) -> &BasicBlock {
        &self.functions[block.function].blocks[block.block]
    }

    pub fn push(&mut self, block: BlockRef, instruction: Instruction) {
        self.functions[block.function].blocks[block.block]
            .instructions
            .push(instruction);
    }

    pub fn next_register(&mut self, function: FunctionRef) -> u32 {
        let function = &mut self.functions[function.0];
        let reg = function.next_register;
        function.next_register += 1;
        reg
    }

    // ========================================================================
    // Verification and output
    // ========================================================================

    /// Report every basic block missing a terminator.
    pub fn verify(&self) -> Result<(), Vec<VerifyError>> {
        let errors: Vec<VerifyError> = self
            .functions
            .iter()
            .flat_map(|function| {
                function
                    .blocks
                    .iter()
                    .filter(|block| !block.is_terminated())
                    .map(|block| VerifyError {
                        function: function.name.clone(),
                        block: block.label.clone(),
                    })
            })
            .collect();

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Textual IR (`.ll`).
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BackendModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;

        if !self.struct_types.is_empty() {
            writeln!(f)?;
        }
        for (name, fields) in &self.struct_types {
            writeln!(f, "%\"{}\" = type {{ {} }}", name, join(fields))?;
        }

        if !self.strings.is_empty() || !self.globals.is_empty() {
            writeln!(f)?;
        }
        for constant in &self.strings {
            writeln!(
                f,
                "@\"{}\" = private unnamed_addr constant [{} x i8] c\"{}\\00\"",
                constant.name,
                constant.bytes.len() + 1,
                escape_bytes(&constant.bytes)
            )?;
        }
        for global in &self.globals {
            writeln!(f, "@\"{}\" = global {} {}", global.name, global.ty, global.init)?;
        }

        for function in &self.functions {
            writeln!(f)?;
            if function.is_declaration() {
                writeln!(
                    f,
                    "declare {} @\"{}\"({})",
                    function.ret,
                    function.name,
                    join(&function.params)
                )?;
                continue;
            }

            let params = function
                .params
                .iter()
                .enumerate()
                .map(|(i, ty)| format!("{} %{}", ty, i))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "define {} @\"{}\"({}) {{", function.ret, function.name, params)?;
            for (i, block) in function.blocks.iter().enumerate() {
                if i > 0 {
                    writeln!(f)?;
                }
                writeln!(f, "{}:", block.label)?;
                for instruction in &block.instructions {
                    writeln!(f, "  {}", instruction)?;
                }
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if (b.is_ascii_graphic() && b != b'"' && b != b'\\') || b == b' ' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\{:02X}", b));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_function_is_idempotent_by_name() {
        let mut module = BackendModule::new("m");
        let a = module.declare_function("f(i32)", vec![IrType::Int(32)], IrType::Void);
        let b = module.declare_function("f(i32)", vec![IrType::Int(32)], IrType::Void);
        assert_eq!(a, b);
        assert_eq!(module.functions().count(), 1);
    }

    #[test]
    fn test_registers_start_after_params() {
        let mut module = BackendModule::new("m");
        let f = module.declare_function("f", vec![IrType::Int(32), IrType::Int(8)], IrType::Void);
        assert_eq!(module.next_register(f), 2);
        assert_eq!(module.next_register(f), 3);
        assert_eq!(module.function(f).param(1), Value::Reg(1));
    }

    #[test]
    fn test_verify_reports_unterminated_blocks() {
        let mut module = BackendModule::new("m");
        let f = module.declare_function("f", vec![], IrType::Int(32));
        let entry = module.append_block(f, "entry");
        assert!(!module.block(entry).is_terminated());

        let errors = module.verify().unwrap_err();
        assert_eq!(
            errors,
            vec![VerifyError {
                function: "f".to_string(),
                block: "entry".to_string()
            }]
        );

        module.push(entry, Instruction::Ret(Some((IrType::Int(32), Value::Int(0)))));
        assert!(module.verify().is_ok());
    }

    #[test]
    fn test_malloc_is_declared_once() {
        let mut module = BackendModule::new("m");
        let a = module.declare_malloc();
        let b = module.declare_malloc();
        assert_eq!(a, b);
        assert!(module.function(a).is_declaration());
        assert!(module.render().contains("declare i8* @\"malloc\"(i64)"));
    }

    #[test]
    fn test_render_size_of() {
        let size = Instruction::SizeOf {
            dest: 3,
            ty: IrType::Named("Point.0".into()),
        };
        assert_eq!(
            size.to_string(),
            "%3 = ptrtoint %\"Point.0\"* getelementptr (%\"Point.0\", %\"Point.0\"* null, i32 1) to i64"
        );
    }

    #[test]
    fn test_strings_are_interned() {
        let mut module = BackendModule::new("m");
        let a = module.add_string("hi");
        let b = module.add_string("hi");
        let c = module.add_string("bye");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_render() {
        let mut module = BackendModule::new("main");
        module.define_struct("Point.0", vec![IrType::Int(32), IrType::Int(32)]);
        module.add_string("a\"b\n");
        module.declare_function("puts", vec![IrType::Int(8).pointer_to()], IrType::Int(32));
        let main = module.declare_function("main", vec![], IrType::Int(32));
        let entry = module.append_block(main, "entry");
        let slot = module.next_register(main);
        module.push(
            entry,
            Instruction::Alloca {
                dest: slot,
                ty: IrType::Int(32),
                count: None,
            },
        );
        module.push(
            entry,
            Instruction::Store {
                ty: IrType::Int(32),
                value: Value::Int(7),
                ptr: Value::Reg(slot),
            },
        );
        module.push(entry, Instruction::Ret(Some((IrType::Int(32), Value::Int(0)))));

        let expected = "; ModuleID = 'main'\n\
            \n\
            %\"Point.0\" = type { i32, i32 }\n\
            \n\
            @\".str.0\" = private unnamed_addr constant [5 x i8] c\"a\\22b\\0A\\00\"\n\
            \n\
            declare i32 @\"puts\"(i8*)\n\
            \n\
            define i32 @\"main\"() {\n\
            entry:\n  %0 = alloca i32\n  store i32 7, i32* %0\n  ret i32 0\n\
            }\n";
        assert_eq!(module.render(), expected);
    }
}
