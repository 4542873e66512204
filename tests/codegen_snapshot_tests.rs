//! Golden snapshot tests for the syntax tree and the textual IR
//!
//! Review changes: `cargo insta review`

use std::path::Path;

use mugc::ast::{ElseBranch, Expr, Member, NamespaceNode, Statement, Type};
use mugc::backend::Session;
use mugc::backend::toolchain::{ArtifactDir, LinkRequest, NativeToolchain, ToolchainError};
use mugc::frontend::parser;
use mugc::frontend::resolver::ImportResolver;

struct NoNativeCode;

impl NativeToolchain for NoNativeCode {
    fn compile_c(&self, source: &Path, _output: &Path) -> Result<(), ToolchainError> {
        panic!("unexpected native compilation of {}", source.display());
    }

    fn link(&self, _request: &LinkRequest<'_>) -> Result<(), ToolchainError> {
        Ok(())
    }
}

/// Textual IR of `source` compiled as the root unit `main`.
fn generate_ir(source: &str) -> String {
    let scratch = tempfile::tempdir().expect("scratch dir");
    let toolchain = NoNativeCode;
    let mut session = Session::new(
        "main",
        &toolchain,
        ImportResolver::new(scratch.path().join("include")),
        ArtifactDir::new(scratch.path().join("artifacts")),
    );
    session
        .compile_source("main", source, scratch.path(), true)
        .unwrap_or_else(|e| panic!("compilation failed:\n{}", e.render()));
    session
        .finish()
        .unwrap_or_else(|e| panic!("verification failed:\n{}", e.render()))
        .render()
}

// ============================================================================
// Syntax tree, as s-expressions
// ============================================================================

fn show_type(ty: &Type) -> String {
    ty.to_string()
}

fn show(expr: &Expr) -> String {
    match expr {
        Expr::Literal(literal) => literal.to_string(),
        Expr::Identifier(name) => name.clone(),
        Expr::Binary(op, lhs, rhs) => format!("({} {} {})", op.node, show(&lhs.node), show(&rhs.node)),
        Expr::Prefix(op, operand) => format!("({} {})", op, show(&operand.node)),
        Expr::Cast(value, ty) => format!("(as {} {})", show(&value.node), show_type(&ty.node)),
        Expr::Call(call) => {
            let mut out = String::from("(call");
            if !call.generics.is_empty() {
                let generics: Vec<_> = call.generics.iter().map(|g| show_type(&g.node)).collect();
                out.push_str(&format!("<{}>", generics.join(", ")));
            }
            out.push_str(&format!(" {}", show(&call.callee.node)));
            for arg in &call.args {
                out.push_str(&format!(" {}", show(&arg.node)));
            }
            out.push(')');
            out
        }
        Expr::Member(base, member) => format!("(. {} {})", show(&base.node), member.node),
        Expr::Index(base, index) => format!("([] {} {})", show(&base.node), show(&index.node)),
        Expr::StructAllocation(allocation) => {
            let mut out = format!("(new {}", show_type(&allocation.ty.node));
            for field in &allocation.fields {
                out.push_str(&format!(" ({} {})", field.node.name, show(&field.node.value.node)));
            }
            out.push(')');
            out
        }
        Expr::ArrayAllocation(allocation) => {
            let mut out = format!(
                "(new [{}; {}]",
                show_type(&allocation.elem_type.node),
                show(&allocation.size.node)
            );
            for element in &allocation.elements {
                out.push_str(&format!(" {}", show(&element.node)));
            }
            out.push(')');
            out
        }
        Expr::InlineIf(condition, then_value, else_value) => format!(
            "(if {} {} {})",
            show(&condition.node),
            show(&then_value.node),
            show(&else_value.node)
        ),
    }
}

fn show_statement(statement: &Statement, depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    match statement {
        Statement::Variable(decl) | Statement::Constant(decl) => {
            let keyword = if matches!(statement, Statement::Constant(_)) { "const" } else { "var" };
            let ty = decl.ty.as_ref().map(|t| format!(": {}", t.node)).unwrap_or_default();
            let value = decl.value.as_ref().map(|v| format!(" = {}", show(&v.node))).unwrap_or_default();
            out.push_str(&format!("{pad}{keyword} {}{ty}{value}\n", decl.name.node));
        }
        Statement::Return(value) => match value {
            Some(value) => out.push_str(&format!("{pad}return {}\n", show(&value.node))),
            None => out.push_str(&format!("{pad}return\n")),
        },
        Statement::Conditional(conditional) => {
            out.push_str(&format!("{pad}if {}\n", show(&conditional.condition.node)));
            show_block(&conditional.body, depth + 1, out);
            let mut next = conditional.else_branch.as_deref();
            while let Some(branch) = next {
                match &branch.node {
                    ElseBranch::Elif(elif) => {
                        out.push_str(&format!("{pad}elif {}\n", show(&elif.condition.node)));
                        show_block(&elif.body, depth + 1, out);
                        next = elif.else_branch.as_deref();
                    }
                    ElseBranch::Else(body) => {
                        out.push_str(&format!("{pad}else\n"));
                        show_block(body, depth + 1, out);
                        next = None;
                    }
                }
            }
        }
        Statement::While(while_loop) => {
            out.push_str(&format!("{pad}while {}\n", show(&while_loop.condition.node)));
            show_block(&while_loop.body, depth + 1, out);
        }
        Statement::For(for_loop) => {
            out.push_str(&format!("{pad}for\n"));
            if let Some(left) = &for_loop.left {
                show_statement(&left.node, depth + 1, out);
            }
            if let Some(condition) = &for_loop.condition {
                out.push_str(&format!("{pad}  ? {}\n", show(&condition.node)));
            }
            if let Some(right) = &for_loop.right {
                show_statement(&right.node, depth + 1, out);
            }
            show_block(&for_loop.body, depth + 1, out);
        }
        Statement::Break => out.push_str(&format!("{pad}break\n")),
        Statement::Continue => out.push_str(&format!("{pad}continue\n")),
        Statement::Assignment(assignment) => {
            let value = assignment
                .value
                .as_ref()
                .map(|v| format!(" {}", show(&v.node)))
                .unwrap_or_default();
            out.push_str(&format!(
                "{pad}{} {}{value}\n",
                show(&assignment.target.node),
                assignment.op
            ));
        }
        Statement::Expr(expr) => out.push_str(&format!("{pad}{}\n", show(&expr.node))),
    }
}

fn show_block(body: &[mugc::ast::Spanned<Statement>], depth: usize, out: &mut String) {
    for statement in body {
        show_statement(&statement.node, depth, out);
    }
}

fn show_unit(unit: &NamespaceNode) -> String {
    let mut out = String::new();
    for member in &unit.members {
        match &member.node {
            Member::Function(decl) => {
                let params: Vec<_> = decl
                    .params
                    .iter()
                    .map(|p| format!("{}: {}", p.node.name, p.node.ty.node))
                    .collect();
                out.push_str(&format!(
                    "func {}({}): {}\n",
                    decl.name.node,
                    params.join(", "),
                    decl.return_type.node
                ));
                if let Some(body) = &decl.body {
                    show_block(body, 1, &mut out);
                }
            }
            other => out.push_str(&format!("{}\n", other.describe())),
        }
    }
    out
}

fn parse(source: &str) -> String {
    let unit = parser::parse_source(source, "main").unwrap_or_else(|e| panic!("parse failed: {}", e.message));
    show_unit(&unit)
}

#[test]
fn test_expression_precedence_tree() {
    let tree = parse(
        "func f(): i32 {
            return 1 + 2 * 3 - 4;
            return a == b & c < d | e;
            return a < b < c;
            return -x as i64;
            return p.q[1](2);
            return id<i32>(x) < y;
            return if c { 1 } else { 2 };
            return new Point{ x: 1, y: a .. b };
            return new [i32, 3]{ 1, 2 };
        }",
    );
    insta::assert_snapshot!(tree, @r"
    func f(): i32
      return (- (+ 1 (* 2 3)) 4)
      return (& (== a b) (| (< c d) e))
      return (< a (< b c))
      return (- (as x i64))
      return (call ([] (. p q) 1) 2)
      return (< (call<i32> id x) y)
      return (if c 1 2)
      return (new Point (x 1) (y (.. a b)))
      return (new [i32; 3] 1 2)
    ");
}

#[test]
fn test_statement_tree() {
    let tree = parse(
        "use Number as int;
        func loop(n: int): void {
            var total: i64;
            const step = 2;
            for var i = 0, i < n, i += step {
                if i == 3 { continue; } elif i > 7 { break; } else { total++; }
            }
            while total > 0 { total -= 1; }
            print(total);
        }",
    );
    insta::assert_snapshot!(tree, @r"
    use directive
    func loop(n: int): void
      var total: i64
      const step = 2
      for
        var i = 0
        ? (< i n)
        i += step
        if (== i 3)
          continue
        elif (> i 7)
          break
        else
          total ++
      while (> total 0)
        total -= 1
      (call print total)
    ");
}

// ============================================================================
// Textual IR
// ============================================================================

#[test]
fn test_calls_and_parameters_ir() {
    let ir = generate_ir(
        "func add(a: i32, b: i32): i32 { return a + b; }
         func main(): i32 { return add(1, 2); }",
    );
    insta::assert_snapshot!(ir, @r#"
    ; ModuleID = 'main'

    define i32 @"add(i32, i32)"(i32 %0, i32 %1) {
    entry:
      %2 = alloca i32
      store i32 %0, i32* %2
      %3 = alloca i32
      store i32 %1, i32* %3
      %4 = load i32, i32* %2
      %5 = load i32, i32* %3
      %6 = add i32 %4, %5
      ret i32 %6
    }

    define i32 @"main"() {
    entry:
      %0 = call i32 @"add(i32, i32)"(i32 1, i32 2)
      ret i32 %0
    }
    "#);
}

#[test]
fn test_struct_allocation_ir() {
    let ir = generate_ir(
        "type Point { x: i32, y: i32 }
         func main(): i32 { var p = new Point{ x: 1, y: 2 }; return p.y; }",
    );
    insta::assert_snapshot!(ir, @r#"
    ; ModuleID = 'main'

    %"Point.0" = type { i32, i32 }

    define i32 @"main"() {
    entry:
      %0 = alloca %"Point.0"
      store %"Point.0" zeroinitializer, %"Point.0"* %0
      %1 = getelementptr inbounds %"Point.0", %"Point.0"* %0, i32 0, i32 0
      store i32 1, i32* %1
      %2 = getelementptr inbounds %"Point.0", %"Point.0"* %0, i32 0, i32 1
      store i32 2, i32* %2
      %3 = load %"Point.0", %"Point.0"* %0
      %4 = alloca %"Point.0"
      store %"Point.0" %3, %"Point.0"* %4
      %5 = getelementptr inbounds %"Point.0", %"Point.0"* %4, i32 0, i32 1
      %6 = load i32, i32* %5
      ret i32 %6
    }
    "#);
}

#[test]
fn test_globals_and_prototypes_ir() {
    let ir = generate_ir(
        "func puts(s: str): i32;
         var greeting = \"hi\";
         func main() { puts(greeting); }",
    );
    insta::assert_snapshot!(ir, @r#"
    ; ModuleID = 'main'

    @".str.0" = private unnamed_addr constant [3 x i8] c"hi\00"
    @"greeting" = global i8* @".str.0"

    declare i32 @"puts"(i8*)

    define void @"main"() {
    entry:
      %0 = load i8*, i8** @"greeting"
      %1 = call i32 @"puts"(i8* %0)
      ret void
    }
    "#);
}
