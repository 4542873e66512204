//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::backend::toolchain::{ArtifactDir, Clang, LinkRequest, NativeToolchain, OutputKind, ToolchainError};
use crate::backend::{BackendModule, Session};
use crate::frontend::diagnostics::{CompileError, CompileErrors, SourceFile};
use crate::frontend::resolver::{self, ImportResolver};
use crate::frontend::{lexer, parser};

use super::{CliError, CliResult, CompilationFlags, ExitCode, Target};

/// Extension of Mug source files.
pub const SOURCE_EXTENSION: &str = "mug";

/// How diagnostics are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStyle {
    /// `[module] kind: message` with a caret line
    Plain,
    /// `miette` reports with labelled snippets
    Fancy,
}

impl ReportStyle {
    fn render(self, errors: &CompileErrors) -> String {
        match self {
            ReportStyle::Plain => errors.render(),
            ReportStyle::Fancy => errors
                .iter()
                .map(|e| format!("{:?}", e.to_miette_report()))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    fn failure(self, errors: impl Into<CompileErrors>) -> CliError {
        CliError::failure(self.render(&errors.into()).trim_end())
    }
}

// ============================================================================
// Source loading
// ============================================================================

/// Read a `.mug` source file, rejecting missing paths and unknown extensions.
pub fn read_source(path: &Path) -> CliResult<Arc<SourceFile>> {
    if !path.is_file() {
        return Err(CliError::failure(format!("Unable to find path '{}'", path.display())));
    }
    if path.extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION) {
        return Err(CliError::failure(format!(
            "Unable to recognize source file kind '{}'",
            path.display()
        )));
    }
    let text = fs::read_to_string(path)
        .map_err(|e| CliError::failure(format!("Unable to open source file '{}': {}", path.display(), e)))?;
    Ok(SourceFile::new(resolver::module_name(path), text))
}

fn write_output(path: &Path, contents: &str) -> CliResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| CliError::failure(format!("Unable to create '{}': {}", parent.display(), e)))?;
    }
    fs::write(path, contents).map_err(|e| CliError::failure(format!("Unable to write '{}': {}", path.display(), e)))
}

// ============================================================================
// Compilation
// ============================================================================

/// Compile the root unit at `path` and every unit it imports into one verified module.
fn compile(
    path: &Path,
    flags: &CompilationFlags,
    toolchain: &dyn NativeToolchain,
) -> Result<(BackendModule, ArtifactDir), CompileErrors> {
    let mut session = Session::new(
        resolver::module_name(path),
        toolchain,
        ImportResolver::from_env(),
        ArtifactDir::in_temp(),
    )
    .with_compiler_symbols(flags.compiler_symbols());
    session.compile_file(path, flags.target == Target::Exe)?;
    session.finish_with_artifacts()
}

/// Lower `module` through the native toolchain into `output`.
fn emit_native(
    module: &BackendModule,
    flags: &CompilationFlags,
    toolchain: &dyn NativeToolchain,
    artifacts: &mut ArtifactDir,
    output: &Path,
) -> Result<(), ToolchainError> {
    let kind = match flags.target {
        Target::Asm => OutputKind::Assembly,
        Target::Bc => OutputKind::Bitcode,
        _ => OutputKind::Executable,
    };
    let module_ir = artifacts.fresh("ll")?;
    fs::write(&module_ir, module.render()).map_err(|e| ToolchainError::io(&module_ir, e))?;
    toolchain.link(&LinkRequest {
        module_ir: &module_ir,
        linked: module.linked(),
        output,
        kind,
        optimization: flags.mode.optimization(),
    })
}

/// Build `path` for `flags.target` with `toolchain`; returns the output path.
pub fn build_with(
    path: &Path,
    flags: &CompilationFlags,
    toolchain: &dyn NativeToolchain,
    style: ReportStyle,
) -> CliResult<PathBuf> {
    let output = flags.output_path(path);
    tracing::debug!(source = %path.display(), output = %output.display(), target = flags.target.as_str(), "building");

    if flags.target == Target::Ast {
        let file = read_source(path)?;
        let unit =
            parser::parse_source(&file.text, &file.name).map_err(|e| style.failure(e.in_source(&file)))?;
        write_output(&output, &format!("{:#?}\n", unit))?;
        return Ok(output);
    }

    read_source(path)?;
    let (module, mut artifacts) = compile(path, flags, toolchain).map_err(|e| style.failure(e))?;

    if flags.target == Target::Ll {
        write_output(&output, &module.render())?;
        return Ok(output);
    }
    emit_native(&module, flags, toolchain, &mut artifacts, &output)
        .map_err(|e| style.failure(CompileError::from(e)))?;
    Ok(output)
}

/// Build a source file for the requested target.
pub fn build_file(path: &Path, flags: &CompilationFlags, style: ReportStyle) -> CliResult<ExitCode> {
    build_with(path, flags, &Clang::from_env(), style)?;
    Ok(ExitCode::SUCCESS)
}

/// Build an executable and run it, exiting with its status.
pub fn run_file(path: &Path, flags: &CompilationFlags, style: ReportStyle) -> CliResult<ExitCode> {
    if flags.target != Target::Exe {
        return Err(CliError::failure(
            "Unable to perform compilation action 'run' when target is not 'exe'",
        ));
    }
    let output = build_with(path, flags, &Clang::from_env(), style)?;
    let program = std::path::absolute(&output).unwrap_or(output);

    tracing::debug!(program = %program.display(), "running");
    let status = Command::new(&program)
        .status()
        .map_err(|e| CliError::failure(format!("Unable to run '{}': {}", program.display(), e)))?;
    Ok(ExitCode(status.code().unwrap_or(ExitCode::FAILURE.0)))
}

/// Run every compilation phase and verify the module, without producing output.
pub fn check_file(path: &Path, flags: &CompilationFlags, style: ReportStyle) -> CliResult<ExitCode> {
    read_source(path)?;
    compile(path, flags, &Clang::from_env()).map_err(|e| style.failure(e))?;
    println!("✓ {} checked", path.display());
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Debug dumps
// ============================================================================

/// Tokenize and display tokens.
pub fn lex_file(path: &Path, style: ReportStyle) -> CliResult<ExitCode> {
    let file = read_source(path)?;
    let tokens = lexer::lex(&file.text).map_err(|e| style.failure(e.in_source(&file)))?;
    for token in &tokens {
        println!("{:?}", token);
    }
    Ok(ExitCode::SUCCESS)
}

/// Parse and display the syntax tree.
pub fn parse_file(path: &Path, style: ReportStyle) -> CliResult<ExitCode> {
    let file = read_source(path)?;
    let unit = parser::parse_source(&file.text, &file.name).map_err(|e| style.failure(e.in_source(&file)))?;
    println!("{:#?}", unit);
    Ok(ExitCode::SUCCESS)
}
