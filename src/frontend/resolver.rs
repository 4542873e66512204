//! Import resolution for Mug units
//!
//! Turns an `import` directive into a canonical path plus the kind of artifact behind it. Local
//! imports are relative to the directory of the importing unit; package imports live in the include
//! directory (`MUG_INCLUDE`, or `include/` next to the compiler executable).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use mug_syntax::ast::{ImportDirective, Span};
use mug_syntax::diagnostics::CompileError;

/// Environment variable overriding the package include directory.
pub const INCLUDE_ENV: &str = "MUG_INCLUDE";

/// What an import points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `.mug` source, compiled into the importing module
    Mug,
    /// `.c`/`.cpp` translation unit, compiled through the native toolchain
    C,
    /// `.bc` bitcode, linked as-is
    Bitcode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImport {
    /// Canonical path; used as the include guard key
    pub path: PathBuf,
    pub kind: ImportKind,
}

/// Resolves import directives against the filesystem.
#[derive(Debug, Clone)]
pub struct ImportResolver {
    include_dir: PathBuf,
}

impl ImportResolver {
    pub fn new(include_dir: impl Into<PathBuf>) -> Self {
        Self {
            include_dir: include_dir.into(),
        }
    }

    /// Include directory from `MUG_INCLUDE`, falling back to `include/` beside the executable.
    pub fn from_env() -> Self {
        let include_dir = env::var_os(INCLUDE_ENV)
            .map(PathBuf::from)
            .or_else(|| {
                env::current_exe()
                    .ok()
                    .and_then(|exe| exe.parent().map(|dir| dir.join("include")))
            })
            .unwrap_or_else(|| PathBuf::from("include"));
        Self::new(include_dir)
    }

    pub fn include_dir(&self) -> &Path {
        &self.include_dir
    }

    /// Resolve `directive`, written in a unit living in `importing_dir`.
    pub fn resolve(&self, directive: &ImportDirective, importing_dir: &Path) -> Result<ResolvedImport, CompileError> {
        match directive {
            ImportDirective::Package(name) => {
                let path = self.include_dir.join(format!("{}.mug", name.node));
                let path = canonical(&path).ok_or_else(|| CompileError::semantic("Unable to find package", name.span))?;
                Ok(ResolvedImport {
                    path,
                    kind: ImportKind::Mug,
                })
            }
            ImportDirective::Local(raw) => {
                let kind = file_kind(&raw.node, raw.span)?;
                let path = importing_dir.join(&raw.node);
                let path = canonical(&path).ok_or_else(|| {
                    CompileError::semantic(format!("Unable to open source file '{}'", raw.node), raw.span)
                })?;
                Ok(ResolvedImport { path, kind })
            }
        }
    }
}

/// Classify an import path by its extension.
fn file_kind(raw: &str, span: Span) -> Result<ImportKind, CompileError> {
    let extension = Path::new(raw).extension().and_then(|e| e.to_str()).unwrap_or("");
    match extension {
        "mug" => Ok(ImportKind::Mug),
        "c" | "cpp" => Ok(ImportKind::C),
        "bc" => Ok(ImportKind::Bitcode),
        "h" => Err(CompileError::semantic("Unrecognized file kind", extension_span(raw, extension, span))
            .with_hint("headers cannot be compiled on their own, import the '.c' file instead")),
        _ => Err(CompileError::semantic("Unrecognized file kind", extension_span(raw, extension, span))),
    }
}

/// Span of the extension inside a quoted path literal.
fn extension_span(raw: &str, extension: &str, literal: Span) -> Span {
    if extension.is_empty() {
        return literal;
    }
    // +1 skips the opening quote
    let end = literal.start + 1 + raw.len();
    Span::new(end - extension.len(), end)
}

fn canonical(path: &Path) -> Option<PathBuf> {
    fs::canonicalize(path).ok().filter(|p| p.is_file())
}

/// Read the source text of a resolved `.mug` unit.
pub fn read_source(path: &Path, span: Span) -> Result<String, CompileError> {
    fs::read_to_string(path)
        .map_err(|e| CompileError::semantic(format!("Unable to open source file '{}': {}", path.display(), e), span))
}

/// Module name of a unit: its file stem.
pub fn module_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("main")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mug_syntax::ast::Spanned;

    fn local(path: &str) -> ImportDirective {
        ImportDirective::Local(Spanned::new(path.to_string(), Span::new(7, 9 + path.len())))
    }

    #[test]
    fn test_local_import_is_relative_to_importer() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lib.mug"), "").unwrap();

        let resolver = ImportResolver::new(dir.path().join("include"));
        let resolved = resolver.resolve(&local("lib.mug"), dir.path()).unwrap();
        assert_eq!(resolved.kind, ImportKind::Mug);
        assert_eq!(resolved.path, fs::canonicalize(dir.path().join("lib.mug")).unwrap());
    }

    #[test]
    fn test_same_file_two_spellings_share_a_key() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("lib.mug"), "").unwrap();

        let resolver = ImportResolver::new(dir.path());
        let a = resolver.resolve(&local("lib.mug"), dir.path()).unwrap();
        let b = resolver.resolve(&local("../lib.mug"), &dir.path().join("sub")).unwrap();
        assert_eq!(a.path, b.path);
    }

    #[test]
    fn test_package_import_uses_include_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("io.mug"), "").unwrap();

        let resolver = ImportResolver::new(dir.path());
        let directive = ImportDirective::Package(Spanned::new("io".to_string(), Span::new(7, 9)));
        let resolved = resolver.resolve(&directive, Path::new("/nowhere")).unwrap();
        assert!(resolved.path.ends_with("io.mug"));

        let missing = ImportDirective::Package(Spanned::new("net".to_string(), Span::new(7, 10)));
        let err = resolver.resolve(&missing, Path::new("/nowhere")).unwrap_err();
        assert_eq!(err.message, "Unable to find package");
        assert_eq!(err.span, Some(Span::new(7, 10)));
    }

    #[test]
    fn test_file_kinds() {
        assert_eq!(file_kind("a.c", Span::default()).unwrap(), ImportKind::C);
        assert_eq!(file_kind("a.bc", Span::default()).unwrap(), ImportKind::Bitcode);

        let err = file_kind("a.txt", Span::new(7, 14)).unwrap_err();
        assert_eq!(err.message, "Unrecognized file kind");
        // `import "a.txt";` highlights `txt`
        assert_eq!(err.span, Some(Span::new(10, 13)));
    }

    #[test]
    fn test_missing_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ImportResolver::new(dir.path());
        let err = resolver.resolve(&local("gone.mug"), dir.path()).unwrap_err();
        assert_eq!(err.message, "Unable to open source file 'gone.mug'");
    }

    #[test]
    fn test_module_name_is_file_stem() {
        assert_eq!(module_name(Path::new("/a/b/shapes.mug")), "shapes");
    }
}
