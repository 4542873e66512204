//! Semantic emission
//!
//! An [`IRGenerator`] turns one parsed unit into declarations and bodies of the shared
//! [`BackendModule`]. It runs in ordered phases, each a full walk over the unit's members:
//!
//! 0. directive evaluation: `declare` and `when` (spliced members join the unit)
//! 1. structural declaration: `use` aliases, imports, enums, error sets, structs
//! 2. signature declaration: prototypes, functions, globals
//! 3. body emission through [`LocalGenerator`](crate::backend::local::LocalGenerator)
//!
//! A phase completes before the next one starts, so bodies may reference anything declared anywhere
//! in the unit. State shared by every unit of one compilation (the backend module, the import cache,
//! the toolchain) lives in a [`Session`].

mod bodies;
mod signatures;
mod structs;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use mug_syntax::ast::{FunctionDecl, Member, NamespaceNode, Span, Spanned, StructDecl};
use mug_syntax::diagnostics::{CompileError, CompileErrors, DiagnosticBag, ErrorKind, SourceFile};
use mug_syntax::parser;

use crate::backend::module::{BackendModule, FunctionRef};
use crate::backend::toolchain::{ArtifactDir, NativeToolchain};
use crate::frontend::resolver::{self, ImportResolver};
use crate::frontend::symbols::{Signature, SymbolTable};
use crate::frontend::types::{DeclId, MugValueType};

type Phase<T> = Result<T, CompileErrors>;

/// How a unit entered the compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitRole {
    /// The file named on the command line
    Root { require_entry_point: bool },
    /// A `.mug` file reached through `import`
    Import,
}

/// State shared by every unit of one compilation.
pub struct Session<'t> {
    module: BackendModule,
    toolchain: &'t dyn NativeToolchain,
    resolver: ImportResolver,
    artifacts: ArtifactDir,
    compiler_symbols: Vec<String>,
    next_decl: DeclId,
    /// Exports of every compiled `.mug` unit, keyed by canonical path
    units: HashMap<PathBuf, Rc<SymbolTable>>,
    /// Units being compiled, outermost first
    compiling: Vec<PathBuf>,
    /// C translation units already compiled and linked
    native_units: HashSet<PathBuf>,
    /// Backend names handed out to functions and globals
    backend_names: HashSet<String>,
}

impl<'t> Session<'t> {
    pub fn new(
        module_name: impl Into<String>,
        toolchain: &'t dyn NativeToolchain,
        resolver: ImportResolver,
        artifacts: ArtifactDir,
    ) -> Self {
        Self {
            module: BackendModule::new(module_name),
            toolchain,
            resolver,
            artifacts,
            compiler_symbols: Vec::new(),
            next_decl: 0,
            units: HashMap::new(),
            compiling: Vec::new(),
            native_units: HashSet::new(),
            backend_names: HashSet::new(),
        }
    }

    /// Compiler symbols visible to `when` in every unit (mode, platform, target, `--dec`).
    pub fn with_compiler_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for symbol in symbols {
            let symbol = symbol.into();
            if !self.compiler_symbols.contains(&symbol) {
                self.compiler_symbols.push(symbol);
            }
        }
        self
    }

    pub fn compiler_symbols(&self) -> &[String] {
        &self.compiler_symbols
    }

    pub fn module(&self) -> &BackendModule {
        &self.module
    }

    /// Compile the root unit at `path`.
    pub fn compile_file(&mut self, path: &Path, require_entry_point: bool) -> Result<SymbolTable, CompileErrors> {
        let text = fs::read_to_string(path).map_err(|e| {
            CompileError::positionless(
                ErrorKind::Toolchain,
                format!("Unable to open source file '{}': {}", path.display(), e),
            )
        })?;
        let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let dir = canonical.parent().map(Path::to_path_buf).unwrap_or_default();
        let file = SourceFile::new(resolver::module_name(path), text);
        self.compile_unit(file, dir, Some(canonical), UnitRole::Root { require_entry_point })
    }

    /// Compile root source text whose imports resolve against `dir`.
    pub fn compile_source(
        &mut self,
        name: &str,
        text: &str,
        dir: &Path,
        require_entry_point: bool,
    ) -> Result<SymbolTable, CompileErrors> {
        let file = SourceFile::new(name, text);
        self.compile_unit(file, dir.to_path_buf(), None, UnitRole::Root { require_entry_point })
    }

    fn compile_unit(
        &mut self,
        file: Arc<SourceFile>,
        dir: PathBuf,
        path: Option<PathBuf>,
        role: UnitRole,
    ) -> Result<SymbolTable, CompileErrors> {
        let unit = parser::parse_source(&file.text, &file.name).map_err(|e| CompileErrors::single(e.in_source(&file)))?;

        let tracked = path.is_some();
        if let Some(path) = path {
            self.compiling.push(path);
        }
        let result = IRGenerator::new(self, Arc::clone(&file), dir, role).generate(unit);
        if tracked {
            self.compiling.pop();
        }
        result.map_err(|errors| errors.in_source(&file))
    }

    /// Verify the module and hand it over for output.
    pub fn finish(self) -> Result<BackendModule, CompileErrors> {
        self.finish_with_artifacts().map(|(module, _)| module)
    }

    /// [`finish`](Self::finish), keeping the scratch directory for the final native step.
    pub fn finish_with_artifacts(self) -> Result<(BackendModule, ArtifactDir), CompileErrors> {
        match self.module.verify() {
            Ok(()) => Ok((self.module, self.artifacts)),
            Err(failures) => Err(CompileErrors(
                failures
                    .into_iter()
                    .map(|failure| {
                        CompileError::positionless(ErrorKind::Toolchain, format!("External compiler error: {}", failure))
                    })
                    .collect(),
            )),
        }
    }

    fn fresh_decl_id(&mut self) -> DeclId {
        let id = self.next_decl;
        self.next_decl += 1;
        id
    }

    /// `base`, or `base.N` for the first free `N` if another unit already took `base`.
    fn reserve_backend_name(&mut self, base: String) -> String {
        if self.backend_names.insert(base.clone()) {
            return base;
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}.{}", base, n);
            if self.backend_names.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// A function whose signature is declared and whose body waits for phase 3.
#[derive(Debug)]
struct PendingBody {
    decl: FunctionDecl,
    function: FunctionRef,
    signature: Signature,
    return_type: MugValueType,
}

/// Emits one compilation unit into the session's module.
pub struct IRGenerator<'s, 't> {
    session: &'s mut Session<'t>,
    source: Arc<SourceFile>,
    /// Directory local imports and `header` pragmas resolve against
    dir: PathBuf,
    role: UnitRole,
    symbols: SymbolTable,
    diagnostics: DiagnosticBag,
    /// Non-generic struct declarations, emitted on first use
    structs: HashMap<String, StructDecl>,
    /// Structs whose fields are being resolved, innermost last
    declaring: Vec<String>,
    bodies: Vec<PendingBody>,
}

impl<'s, 't> IRGenerator<'s, 't> {
    pub fn new(session: &'s mut Session<'t>, source: Arc<SourceFile>, dir: PathBuf, role: UnitRole) -> Self {
        Self {
            session,
            source,
            dir,
            role,
            symbols: SymbolTable::new(),
            diagnostics: DiagnosticBag::new(),
            structs: HashMap::new(),
            declaring: Vec::new(),
            bodies: Vec::new(),
        }
    }

    /// Run every phase over `unit` and return its symbol table.
    ///
    /// Errors without an origin belong to this unit; the caller attaches it.
    #[tracing::instrument(skip_all, fields(unit = %unit.name))]
    pub fn generate(mut self, unit: NamespaceNode) -> Result<SymbolTable, CompileErrors> {
        for symbol in self.session.compiler_symbols.clone() {
            self.symbols.declare_compiler_symbol(&symbol, Span::default(), &mut self.diagnostics);
        }

        let mut members = Vec::with_capacity(unit.members.len());
        self.evaluate_directives(unit.members, &mut members);
        tracing::debug!(members = members.len(), "directives evaluated");

        self.declare_structure(&members)?;
        tracing::debug!("structural declaration done");

        self.declare_signatures(members)?;
        self.diagnostics.check_and_throw()?;
        tracing::debug!(bodies = self.bodies.len(), "signature declaration done");

        self.emit_bodies();
        if self.role == (UnitRole::Root { require_entry_point: true }) {
            if let Err(error) = self.symbols.entry_point() {
                self.diagnostics.report(error);
            }
        }
        self.diagnostics.check_and_throw()?;
        Ok(self.symbols)
    }

    /// Phase 0: declare compiler symbols and splice `when` blocks whose condition holds.
    fn evaluate_directives(&mut self, members: Vec<Spanned<Member>>, out: &mut Vec<Spanned<Member>>) {
        for member in members {
            match member.node {
                Member::Declare(symbol) => {
                    self.symbols
                        .declare_compiler_symbol(&symbol.node, symbol.span, &mut self.diagnostics);
                }
                Member::When(block) => {
                    if self.symbols.is_compiler_symbol(&block.symbol.node) != block.negated {
                        self.evaluate_directives(block.members, out);
                    }
                }
                node => out.push(Spanned::new(node, member.span)),
            }
        }
    }

    /// Abort the unit with `error` after everything accumulated so far.
    fn fail(&mut self, error: CompileError) -> CompileErrors {
        self.diagnostics.throw(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::toolchain::{LinkRequest, ToolchainError};
    use std::cell::RefCell;

    /// Records native compilations instead of running clang.
    #[derive(Default)]
    struct RecordingToolchain {
        compiled: RefCell<Vec<PathBuf>>,
    }

    impl NativeToolchain for RecordingToolchain {
        fn compile_c(&self, source: &Path, output: &Path) -> Result<(), ToolchainError> {
            self.compiled.borrow_mut().push(source.to_path_buf());
            fs::write(output, b"").map_err(|e| ToolchainError::io(output, e))
        }

        fn link(&self, _request: &LinkRequest<'_>) -> Result<(), ToolchainError> {
            Ok(())
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        toolchain: RecordingToolchain,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                toolchain: RecordingToolchain::default(),
            }
        }

        fn file(&self, name: &str, text: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::write(&path, text).unwrap();
            path
        }

        fn session(&self) -> Session<'_> {
            Session::new(
                "main",
                &self.toolchain,
                ImportResolver::new(self.dir.path().join("include")),
                ArtifactDir::new(self.dir.path().join("artifacts")),
            )
            .with_compiler_symbols(["debug", "exe"])
        }

        /// Compile `main.mug` and verify the module.
        fn build(&self, text: &str) -> Result<BackendModule, CompileErrors> {
            let path = self.file("main.mug", text);
            let mut session = self.session();
            session.compile_file(&path, true)?;
            session.finish()
        }
    }

    fn build(text: &str) -> Result<BackendModule, CompileErrors> {
        Fixture::new().build(text)
    }

    fn messages(errors: &CompileErrors) -> Vec<&str> {
        errors.iter().map(|e| e.message.as_str()).collect()
    }

    fn function_names(module: &BackendModule) -> Vec<&str> {
        module.functions().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_forward_references_and_mangling() {
        let module = build(
            "func main() { var x = add(1, 2); var y = add(x as i64, 3 as i64); }\n\
             func add(a: i32, b: i32): i32 { return a + b; }\n\
             func add(a: i64, b: i64): i64 { return a + b; }",
        )
        .unwrap();
        assert_eq!(function_names(&module), vec!["main", "add(i32, i32)", "add(i64, i64)"]);
        assert!(module.render().contains("call i32 @\"add(i32, i32)\"(i32 1, i32 2)"));
    }

    #[test]
    fn test_duplicate_signatures_accumulate() {
        let errors = build(
            "func f() { }\nfunc f() { }\nfunc g(a: i32) { }\nfunc g(b: i32) { }\nfunc main() { }",
        )
        .unwrap_err();
        assert_eq!(
            messages(&errors),
            vec!["Function 'f' already declared", "Function 'g' already declared"]
        );
        assert_eq!(errors.first().unwrap().span, Some(Span::new(18, 19)));
    }

    #[test]
    fn test_body_errors_of_siblings_are_all_reported() {
        let errors = build("func a() { x = 1; }\nfunc b() { return 1; }\nfunc main() { }").unwrap_err();
        assert_eq!(
            messages(&errors),
            vec!["Undeclared variable 'x'", "Expected 'void' type, got 'i32'"]
        );
        assert!(errors.render().starts_with("[main] semantic error: Undeclared variable 'x'"));
    }

    #[test]
    fn test_missing_entry_point() {
        let errors = build("func helper() { }").unwrap_err();
        assert_eq!(messages(&errors), vec!["No entry point declared"]);
        assert_eq!(errors.first().unwrap().span, None);
    }

    #[test]
    fn test_non_void_fall_through_fails_verification() {
        let errors = build("func f(): i32 { }\nfunc main() { }").unwrap_err();
        assert_eq!(
            messages(&errors),
            vec!["External compiler error: function 'f()': basic block 'entry' does not end with a terminator"]
        );
        assert_eq!(errors.first().unwrap().kind, ErrorKind::Toolchain);
    }

    #[test]
    fn test_structs_resolve_forward_references() {
        let module = build(
            "type Line { a: Point, b: Point }\n\
             type Point { x: i32, y: i32 }\n\
             func main() { var l = new Line{ a: new Point{ x: 1 } }; var y = l.a.y; }",
        )
        .unwrap();
        let ir = module.render();
        let point = ir.find("%\"Point.").unwrap();
        let line = ir.find("%\"Line.").unwrap();
        assert!(point < line, "Point must be emitted before the struct using it:\n{}", ir);
    }

    #[test]
    fn test_struct_recursion_is_illegal() {
        let errors = build("type Node { next: Node }\nfunc main() { }").unwrap_err();
        assert_eq!(messages(&errors), vec!["Field 'next' has illegal recursive type 'Node'"]);
        // anchored at the field's type annotation
        assert_eq!(errors.first().unwrap().span, Some(Span::new(18, 22)));

        let errors = build("type A { b: B }\ntype B { a: A }\nfunc main() { }").unwrap_err();
        assert_eq!(messages(&errors), vec!["Field 'a' has illegal recursive type 'A'"]);
        assert_eq!(errors.first().unwrap().span, Some(Span::new(28, 29)));
    }

    #[test]
    fn test_longer_struct_cycles_are_reported() {
        let errors = build("type A { b: B }\ntype B { c: C }\ntype C { a: A }\nfunc main() { }").unwrap_err();
        assert_eq!(
            messages(&errors),
            vec!["Type 'A' is part of a recursive type cycle through its fields"]
        );
    }

    #[test]
    fn test_enums_and_error_sets() {
        let module = build(
            "enum Color: u8 { Red: 1, Green: 2 }\n\
             error FileErr { NotFound, Denied }\n\
             func main() { var c = Color.Green; var b = c as u8; var e = FileErr.Denied as u8; }",
        )
        .unwrap();
        let ir = module.render();
        assert!(ir.contains("store i8 2"), "{}", ir);
        assert!(ir.contains("store i8 1"), "{}", ir);
    }

    #[test]
    fn test_enum_member_checks() {
        let errors = build("enum E: u8 { A: 'c' }\nfunc main() { }").unwrap_err();
        assert_eq!(messages(&errors), vec!["Expected 'u8' type, got 'chr'"]);

        let errors = build("enum E: i32 { A: 1, A: 2 }\nfunc main() { }").unwrap_err();
        assert_eq!(messages(&errors), vec!["Member already declared"]);

        let errors = build("enum E: void { A: 1 }\nfunc main() { }").unwrap_err();
        assert_eq!(messages(&errors), vec!["Enum base type must be a non-void type"]);

        let errors = build("enum E: str { A: \"a\" }\nfunc main() { }").unwrap_err();
        assert_eq!(messages(&errors), vec!["Invalid enum base type"]);
    }

    #[test]
    fn test_when_blocks_follow_compiler_symbols() {
        let module = build(
            "declare fast;\n\
             when fast { func a() { } }\n\
             when !fast { func b() { } }\n\
             when debug { when !release { func c() { } } }\n\
             func main() { a(); c(); }",
        )
        .unwrap();
        assert_eq!(function_names(&module), vec!["a()", "c()", "main"]);
    }

    #[test]
    fn test_redeclared_compiler_symbol() {
        let errors = build("declare debug;\nfunc main() { }").unwrap_err();
        assert_eq!(messages(&errors), vec!["Compiler symbol 'debug' is already declared"]);
    }

    #[test]
    fn test_mug_import_merges_only_public_members() {
        let fixture = Fixture::new();
        fixture.file("lib.mug", "pub func twice(x: i32): i32 { return helper(x); }\nfunc helper(x: i32): i32 { return x * 2; }");
        let module = fixture
            .build("import \"lib.mug\";\nimport \"lib.mug\";\nfunc main() { var y = twice(4); }")
            .unwrap();
        assert_eq!(function_names(&module), vec!["twice(i32)", "helper(i32)", "main"]);

        let errors = fixture
            .build("import \"lib.mug\";\nfunc main() { var y = helper(4); }")
            .unwrap_err();
        assert_eq!(messages(&errors), vec!["Undeclared function 'helper'"]);
    }

    #[test]
    fn test_errors_in_imported_units_keep_their_origin() {
        let fixture = Fixture::new();
        fixture.file("lib.mug", "pub func broken() { return 1; }");
        let errors = fixture.build("import \"lib.mug\";\nfunc main() { }").unwrap_err();
        let origin = errors.first().unwrap().origin.as_ref().unwrap();
        assert_eq!(origin.name, "lib");
    }

    #[test]
    fn test_circular_imports_are_rejected() {
        let fixture = Fixture::new();
        fixture.file("a.mug", "import \"main.mug\";");
        let errors = fixture.build("import \"a.mug\";\nfunc main() { }").unwrap_err();
        assert_eq!(messages(&errors), vec!["Circular import of 'main'"]);
    }

    #[test]
    fn test_package_imports_use_the_include_dir() {
        let fixture = Fixture::new();
        fs::create_dir(fixture.dir.path().join("include")).unwrap();
        fixture.file("include/io.mug", "pub func flush() { }");
        assert!(fixture.build("import io;\nfunc main() { flush(); }").is_ok());

        let errors = fixture.build("import net;\nfunc main() { }").unwrap_err();
        assert_eq!(messages(&errors), vec!["Unable to find package"]);
    }

    #[test]
    fn test_c_units_compile_once_per_path() {
        let fixture = Fixture::new();
        fixture.file("native.c", "int answer(void) { return 42; }");
        let module = fixture
            .build(
                "import \"native.c\";\n\
                 @[header: \"native.c\"] func answer(): i32;\n\
                 @[header: \"native.c\", extern: \"answer\"] func answer2(): i32;\n\
                 func main() { var a = answer(); }",
            )
            .unwrap();
        assert_eq!(fixture.toolchain.compiled.borrow().len(), 1);
        assert_eq!(module.linked().len(), 1);
        assert!(module.render().contains("declare i32 @\"answer\"()"));
    }

    #[test]
    fn test_code_pragma_compiles_inline_c() {
        let fixture = Fixture::new();
        let module = fixture
            .build("@[code: \"int one(void) { return 1; }\"] func one(): i32;\nfunc main() { var x = one(); }")
            .unwrap();
        let compiled = fixture.toolchain.compiled.borrow();
        assert_eq!(compiled.len(), 1);
        assert_eq!(fs::read_to_string(&compiled[0]).unwrap(), "int one(void) { return 1; }");
        assert_eq!(module.linked().len(), 1);
    }

    #[test]
    fn test_prototype_restrictions() {
        let errors = build("@[header: \"a.h\", code: \"\"] func f();\nfunc main() { }").unwrap_err();
        assert_eq!(messages(&errors), vec!["Pragma 'code' is in conflict with 'header'"]);

        let errors = build("func f[type T](x: T);\nfunc main() { }").unwrap_err();
        assert_eq!(messages(&errors), vec!["Function prototypes cannot have generic parameters"]);
    }

    #[test]
    fn test_generic_functions_are_declared_but_not_instantiated() {
        let errors = build("func id[type T](x: T): T { return x; }\nfunc main() { var y = id<i32>(1); }").unwrap_err();
        assert_eq!(messages(&errors), vec!["Generic instantiation not supported yet"]);
    }

    #[test]
    fn test_member_functions_and_cast_operators() {
        let module = build(
            "type Point { x: i32, y: i32 }\n\
             func (self: Point) sum(): i32 { return self.x + self.y; }\n\
             func `as`(p: Point): i32 { return p.sum(); }\n\
             func main() { var p = new Point{ x: 1, y: 2 }; var s = p as i32; }",
        )
        .unwrap();
        let names = function_names(&module);
        assert!(names.contains(&"Point.sum()"), "{:?}", names);
        assert!(names.contains(&"as(Point): i32"), "{:?}", names);
    }

    #[test]
    fn test_globals() {
        let module = build("var count: i64 = 3;\nvar name = \"mug\";\nfunc main() { count += 1 as i64; }").unwrap();
        let ir = module.render();
        assert!(ir.contains("@\"count\" = global i64 3"), "{}", ir);
        assert!(ir.contains("@\"name\" = global i8* @\".str.0\""), "{}", ir);
    }

    #[test]
    fn test_signature_phase_promotes_every_prototype() {
        use crate::frontend::symbols::FunctionIdentity;

        let fixture = Fixture::new();
        let mut session = fixture.session();
        let table = session
            .compile_source(
                "main",
                "func main() { }\nfunc id[type T](x: T): T { return x; }\nfunc puts(s: str): i32;",
                fixture.dir.path(),
                true,
            )
            .unwrap();

        let mut stages: Vec<_> = table
            .function_overloads()
            .flat_map(|(name, overloads)| overloads.iter().map(move |entry| (name.as_str(), &entry.identity)))
            .map(|(name, identity)| {
                let stage = match identity {
                    FunctionIdentity::Prototype(_) => "prototype",
                    FunctionIdentity::Defined(_) => "defined",
                    FunctionIdentity::Concrete(_) => "concrete",
                };
                (name, stage)
            })
            .collect();
        stages.sort();
        assert_eq!(stages, vec![("id", "defined"), ("main", "concrete"), ("puts", "concrete")]);
    }

    #[test]
    fn test_prototype_and_definition_share_one_overload_set() {
        let errors = build("func f(a: i32): i32;\nfunc f(b: i32): i32 { return b; }\nfunc main() { }").unwrap_err();
        assert_eq!(messages(&errors), vec!["Function 'f' already declared"]);
        assert_eq!(errors.first().unwrap().span, Some(Span::new(26, 27)));
    }

    #[test]
    fn test_global_chars_must_fit_chr() {
        let module = build("var ok = 'A';\nfunc main() { }").unwrap();
        assert!(module.render().contains("@\"ok\" = global i8 65"));

        let errors = build("var euro = '€';\nfunc main() { }").unwrap_err();
        assert_eq!(messages(&errors), vec!["Character '€' does not fit in type 'chr'"]);
        assert_eq!(errors.first().unwrap().span, Some(Span::new(11, 16)));
    }

    #[test]
    fn test_declarations_record_mangled_names() {
        let fixture = Fixture::new();
        let mut session = fixture.session();
        let table = session
            .compile_source("main", "func main() { }\nfunc f(a: u1) { }", fixture.dir.path(), true)
            .unwrap();
        let f = table
            .resolve_function("f", &Signature::new(vec![MugValueType::Bool]), Span::default())
            .unwrap();
        assert!(matches!(
            &f.identity,
            crate::frontend::symbols::FunctionIdentity::Concrete(c) if c.backend_name == "f(u1)"
        ));
    }
}
