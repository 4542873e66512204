//! Integration tests for the Mug compiler pipeline
//!
//! Every fixture goes through the whole front end: lexing, parsing, the emission phases and backend
//! verification, with a native toolchain that never runs an external process.

use std::fs;
use std::path::{Path, PathBuf};

use mugc::backend::toolchain::{ArtifactDir, LinkRequest, NativeToolchain, ToolchainError};
use mugc::backend::{BackendModule, Session};
use mugc::diagnostics::{CompileErrors, ErrorKind};
use mugc::frontend::resolver::ImportResolver;

/// Accepts every request and writes empty artifacts.
struct NullToolchain;

impl NativeToolchain for NullToolchain {
    fn compile_c(&self, _source: &Path, output: &Path) -> Result<(), ToolchainError> {
        fs::write(output, "").map_err(|e| ToolchainError::io(output, e))
    }

    fn link(&self, _request: &LinkRequest<'_>) -> Result<(), ToolchainError> {
        Ok(())
    }
}

/// Helper to run the full pipeline on a source file
fn compile_file(path: &Path) -> Result<BackendModule, CompileErrors> {
    let scratch = tempfile::tempdir().expect("scratch dir");
    let toolchain = NullToolchain;
    let mut session = Session::new(
        "main",
        &toolchain,
        ImportResolver::new(scratch.path().join("include")),
        ArtifactDir::new(scratch.path().join("artifacts")),
    )
    .with_compiler_symbols(["debug", std::env::consts::OS, "exe"]);
    session.compile_file(path, true)?;
    session.finish()
}

fn fixtures(kind: &str) -> Vec<PathBuf> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(kind);
    let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", dir.display(), e))
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|e| e == "mug"))
        .collect();
    paths.sort();
    paths
}

fn fixture(kind: &str, name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(kind)
        .join(name)
}

/// Test that all valid fixtures compile successfully
#[test]
fn test_valid_fixtures() {
    let paths = fixtures("valid");
    assert!(!paths.is_empty());
    for path in paths {
        let result = compile_file(&path);
        assert!(
            result.is_ok(),
            "Expected {} to compile successfully, got errors:\n{}",
            path.display(),
            result.unwrap_err().render()
        );
    }
}

/// Test that invalid fixtures produce errors
#[test]
fn test_invalid_fixtures() {
    for path in fixtures("invalid") {
        assert!(
            compile_file(&path).is_err(),
            "Expected {} to fail compilation",
            path.display()
        );
    }
}

fn first_message(name: &str) -> String {
    let errors = compile_file(&fixture("invalid", name)).unwrap_err();
    errors.first().unwrap().message.clone()
}

#[test]
fn test_invalid_fixture_messages() {
    assert_eq!(first_message("undeclared_variable.mug"), "Undeclared variable 'y'");
    assert!(first_message("type_mismatch.mug").starts_with("Expected 'u1' type"));
    assert_eq!(
        first_message("recursive_type.mug"),
        "Field 'next' has illegal recursive type 'Node'"
    );
    assert_eq!(first_message("missing_entry.mug"), "No entry point declared");
    assert_eq!(first_message("duplicate_function.mug"), "Function 'f' already declared");
}

#[test]
fn test_recursive_field_is_anchored_at_its_type() {
    let errors = compile_file(&fixture("invalid", "recursive_type.mug")).unwrap_err();
    let error = errors.first().unwrap();
    assert_eq!(error.span, Some(mugc::ast::Span::new(30, 34)));
    assert!(error.render().contains("type Node { value: i32, next: Node }"));
}

#[test]
fn test_diagnostics_point_into_their_unit() {
    let errors = compile_file(&fixture("invalid", "undeclared_variable.mug")).unwrap_err();
    let rendered = errors.render();
    assert!(rendered.starts_with("[undeclared_variable] semantic error: Undeclared variable 'y'"));
    assert!(rendered.contains(" 2 |     var x = y + 1;"), "{}", rendered);
}

#[test]
fn test_imported_units_share_one_module() {
    let module = compile_file(&fixture("valid", "shapes.mug")).unwrap();
    let names: Vec<&str> = module.functions().map(|f| f.name.as_str()).collect();
    assert!(names.contains(&"manhattan(Point)"), "{:?}", names);
    assert!(names.contains(&"abs(i32)"), "{:?}", names);
    assert!(names.contains(&"main"), "{:?}", names);
    // the struct is emitted once even though two units name it
    assert_eq!(module.render().matches("= type {").count(), 1);
}

#[test]
fn test_when_blocks_see_the_session_symbols() {
    let module = compile_file(&fixture("valid", "platform.mug")).unwrap();
    let ir = module.render();
    assert!(ir.contains("@\"verbose\" = global i1 1"), "{}", ir);
    assert!(ir.contains("ret i32 2"), "{}", ir);
    assert!(!ir.contains("ret i32 0"), "{}", ir);
}

#[test]
fn test_every_block_is_terminated() {
    for path in fixtures("valid") {
        let module = compile_file(&path).unwrap();
        assert!(module.verify().is_ok(), "{}", path.display());
        for function in module.functions() {
            for block in &function.blocks {
                assert!(block.is_terminated(), "{} / {}", function.name, block.label);
            }
        }
    }
}

#[test]
fn test_unreadable_root_is_a_positionless_error() {
    let errors = compile_file(Path::new("tests/fixtures/does_not_exist.mug")).unwrap_err();
    let error = errors.first().unwrap();
    assert_eq!(error.kind, ErrorKind::Toolchain);
    assert_eq!(error.span, None);
    assert!(error.message.starts_with("Unable to open source file"));
}
