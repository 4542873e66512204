//! CLI module for the Mug compiler
//!
//! ## Commands
//!
//! - `build <file>` - Compile to an executable, assembly, bitcode, textual IR or an AST dump
//! - `run <file>` - Build an executable and run it
//! - `check <file>` - Run every compilation phase without touching the native toolchain's linker
//! - `lex <file>` / `parse <file>` - Debug dumps of the token stream and the syntax tree
//!
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

/// A user-facing message and the exit code to leave with.
#[derive(Debug)]
pub struct CliError {
    /// Already formatted for display
    pub message: String,
    pub exit_code: ExitCode,
}

impl CliError {
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }

    pub fn with_code(message: impl Into<String>, code: i32) -> Self {
        Self::new(message, ExitCode(code))
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub type CliResult<T> = Result<T, CliError>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// The Mug programming language compiler
#[derive(Parser, Debug)]
#[command(name = "mugc")]
#[command(version = VERSION)]
#[command(about = "The Mug programming language compiler", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Render diagnostics with labelled source snippets
    #[arg(long, global = true)]
    pub fancy: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a source file
    Build {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[command(flatten)]
        flags: CompilationFlags,
    },

    /// Build an executable and run it
    Run {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[command(flatten)]
        flags: CompilationFlags,
    },

    /// Compile a source file without producing output
    Check {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[command(flatten)]
        flags: CompilationFlags,
    },

    /// Tokenize only (debug)
    Lex {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Parse only (debug)
    Parse {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

/// Compilation mode; also declared as a compiler symbol.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Faster compilation, slower executable
    #[default]
    Debug,
    /// Optimized executable
    Release,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Debug => "debug",
            Mode::Release => "release",
        }
    }

    /// Optimization level handed to the native toolchain.
    pub fn optimization(self) -> u8 {
        match self {
            Mode::Debug => 0,
            Mode::Release => 3,
        }
    }
}

/// What `build` produces; also declared as a compiler symbol.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// Native executable
    #[default]
    Exe,
    /// Bitcode
    Bc,
    /// Native assembly
    Asm,
    /// Syntax tree dump
    Ast,
    /// Textual IR
    Ll,
}

impl Target {
    pub fn as_str(self) -> &'static str {
        match self {
            Target::Exe => "exe",
            Target::Bc => "bc",
            Target::Asm => "asm",
            Target::Ast => "ast",
            Target::Ll => "ll",
        }
    }

    /// Extension of the default output path; executables get none on unix.
    pub fn output_extension(self) -> &'static str {
        match self {
            Target::Exe if cfg!(windows) => "exe",
            Target::Exe => "",
            Target::Bc => "bc",
            Target::Asm => "s",
            Target::Ast => "ast",
            Target::Ll => "ll",
        }
    }
}

/// Options shared by the compiling subcommands.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilationFlags {
    #[arg(long, value_enum, default_value_t = Mode::Debug)]
    pub mode: Mode,

    #[arg(long, value_enum, default_value_t = Target::Exe)]
    pub target: Target,

    /// Output path (default: the source path with the target's extension)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Declare a compiler symbol for `when` blocks
    #[arg(long = "dec", value_name = "SYMBOL")]
    pub declared: Vec<String>,
}

impl CompilationFlags {
    /// Mode, platform and target symbols followed by the `--dec` ones.
    pub fn compiler_symbols(&self) -> Vec<String> {
        let mut symbols = vec![
            self.mode.as_str().to_string(),
            std::env::consts::OS.to_string(),
            self.target.as_str().to_string(),
        ];
        symbols.extend(self.declared.iter().cloned());
        symbols
    }

    pub fn output_path(&self, source: &Path) -> PathBuf {
        match &self.output {
            Some(output) => output.clone(),
            None => source.with_extension(self.target.output_extension()),
        }
    }
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

fn execute(cli: Cli) -> CliResult<ExitCode> {
    let style = if cli.fancy {
        commands::ReportStyle::Fancy
    } else {
        commands::ReportStyle::Plain
    };
    match cli.command {
        Command::Build { file, flags } => commands::build_file(&file, &flags, style),
        Command::Run { file, flags } => commands::run_file(&file, &flags, style),
        Command::Check { file, flags } => commands::check_file(&file, &flags, style),
        Command::Lex { file } => commands::lex_file(&file, style),
        Command::Parse { file } => commands::parse_file(&file, style),
    }
}

// ============================================================================
// Tests
// ============================================================================
