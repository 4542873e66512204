//! Native toolchain collaborator
//!
//! Compiles C translation units to linkable bitcode and turns a finished backend module into an
//! executable, assembly or bitcode by driving an external `clang` process.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use mug_syntax::diagnostics::{CompileError, ErrorKind};
use thiserror::Error;

/// Environment variable overriding the native compiler executable.
pub const CC_ENV: &str = "MUG_CC";

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("Unable to access '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{tool} failed on '{}' ({status}):\n{stderr}", .path.display())]
    CompilerFailed {
        tool: String,
        path: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("Native compiler '{tool}' was not found, set MUG_CC to its path")]
    ToolNotFound { tool: String },
}

impl ToolchainError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ToolchainError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<ToolchainError> for CompileError {
    fn from(error: ToolchainError) -> Self {
        CompileError::positionless(ErrorKind::Toolchain, error.to_string())
    }
}

/// What the final link produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Executable,
    Assembly,
    Bitcode,
}

/// Options of the final native step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRequest<'a> {
    /// Textual IR of the finished module
    pub module_ir: &'a Path,
    /// Bitcode artifacts recorded on the module
    pub linked: &'a [PathBuf],
    pub output: &'a Path,
    pub kind: OutputKind,
    pub optimization: u8,
}

/// "Compile this path to a linkable artifact" and "link this module".
pub trait NativeToolchain {
    /// Compile the C unit at `source` into bitcode at `output`.
    fn compile_c(&self, source: &Path, output: &Path) -> Result<(), ToolchainError>;

    fn link(&self, request: &LinkRequest<'_>) -> Result<(), ToolchainError>;
}

/// `clang`, or whatever `MUG_CC` names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clang {
    program: String,
}

impl Clang {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    pub fn from_env() -> Self {
        Self::new(env::var(CC_ENV).unwrap_or_else(|_| "clang".to_string()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, args: &[&std::ffi::OsStr], subject: &Path) -> Result<(), ToolchainError> {
        tracing::debug!(tool = %self.program, subject = %subject.display(), "invoking native compiler");

        let output = Command::new(&self.program).args(args).output().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ToolchainError::ToolNotFound {
                    tool: self.program.clone(),
                }
            } else {
                ToolchainError::io(subject, e)
            }
        })?;

        if output.status.success() {
            return Ok(());
        }
        Err(ToolchainError::CompilerFailed {
            tool: self.program.clone(),
            path: subject.to_path_buf(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        })
    }
}

impl NativeToolchain for Clang {
    #[tracing::instrument(skip_all, fields(source = %source.display()))]
    fn compile_c(&self, source: &Path, output: &Path) -> Result<(), ToolchainError> {
        self.run(
            &[
                "-emit-llvm".as_ref(),
                "-c".as_ref(),
                source.as_os_str(),
                "-o".as_ref(),
                output.as_os_str(),
            ],
            source,
        )
    }

    #[tracing::instrument(skip_all, fields(output = %request.output.display(), kind = ?request.kind))]
    fn link(&self, request: &LinkRequest<'_>) -> Result<(), ToolchainError> {
        let optimization = format!("-O{}", request.optimization);
        let mut args: Vec<&std::ffi::OsStr> = Vec::new();
        match request.kind {
            OutputKind::Executable => {}
            OutputKind::Assembly => args.push("-S".as_ref()),
            OutputKind::Bitcode => {
                args.push("-c".as_ref());
                args.push("-emit-llvm".as_ref());
            }
        }
        args.push(optimization.as_ref());
        args.push(request.module_ir.as_os_str());
        // only the executable pulls in the linked units
        if request.kind == OutputKind::Executable {
            args.extend(request.linked.iter().map(|p| p.as_os_str()));
        }
        args.push("-o".as_ref());
        args.push(request.output.as_os_str());
        self.run(&args, request.module_ir)
    }
}

/// Scratch directory for intermediate artifacts of one compilation session.
#[derive(Debug)]
pub struct ArtifactDir {
    root: PathBuf,
    counter: usize,
}

impl ArtifactDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            counter: 0,
        }
    }

    /// `$TMPDIR/mug/<pid>`
    pub fn in_temp() -> Self {
        Self::new(env::temp_dir().join("mug").join(std::process::id().to_string()))
    }

    /// A fresh path `tmpN.<extension>`; the directory is created on demand.
    pub fn fresh(&mut self, extension: &str) -> Result<PathBuf, ToolchainError> {
        fs::create_dir_all(&self.root).map_err(|e| ToolchainError::io(&self.root, e))?;
        let path = self.root.join(format!("tmp{}.{}", self.counter, extension));
        self.counter += 1;
        Ok(path)
    }
}
