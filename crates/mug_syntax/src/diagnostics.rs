//! Diagnostics and error reporting for Mug
//!
//! Every diagnostic carries a message, an [`ErrorKind`] and (usually) a byte range into the source it
//! came from. Two channels exist:
//!
//! - **immediate**: a `Result<_, CompileError>` returned by the lexer, the parser and most semantic
//!   checks. The first error aborts the enclosing compilation unit.
//! - **accumulating**: a [`DiagnosticBag`] that records errors (redeclarations, per-function body
//!   errors) so scanning can continue, flushed by [`DiagnosticBag::check_and_throw`].

use std::fmt;
use std::sync::Arc;

use crate::ast::Span;

/// The text of one compilation unit plus the module name it is reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            text: text.into(),
        })
    }
}

/// A compile-time error with location information
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
    /// `None` for positionless diagnostics (toolchain and I/O failures)
    pub span: Option<Span>,
    pub kind: ErrorKind,
    pub notes: Vec<String>,
    pub hints: Vec<String>,
    /// Unit the span points into; attached when the error leaves its unit.
    pub origin: Option<Arc<SourceFile>>,
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span: Some(span),
            kind,
            notes: Vec::new(),
            hints: Vec::new(),
            origin: None,
        }
    }

    pub fn lexical(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Lexical, message, span)
    }

    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Syntax, message, span)
    }

    pub fn semantic(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Semantic, message, span)
    }

    /// A diagnostic with no source position.
    pub fn positionless(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
            kind,
            notes: Vec::new(),
            hints: Vec::new(),
            origin: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    /// Attach the originating unit unless one is already attached.
    pub fn in_source(mut self, source: &Arc<SourceFile>) -> Self {
        if self.origin.is_none() {
            self.origin = Some(Arc::clone(source));
        }
        self
    }

    /// Render with the attached origin, or as a bare message when no origin is known.
    pub fn render(&self) -> String {
        match &self.origin {
            Some(file) => format_error(&file.name, &file.text, self),
            None => format_bare(self),
        }
    }

    /// Convert into a `miette` report (fancy rendering with labelled source span).
    pub fn to_miette_report(&self) -> miette::Report {
        let (source_code, label) = match (&self.origin, self.span) {
            (Some(file), Some(span)) => {
                let start = span.start.min(file.text.len());
                let len = span.end.min(file.text.len()).saturating_sub(start);
                (
                    Some(miette::NamedSource::new(file.name.clone(), file.text.clone())),
                    Some(miette::SourceSpan::new(start.into(), len)),
                )
            }
            _ => (None, None),
        };
        miette::Report::new(MietteDiagnostic {
            message: self.message.clone(),
            kind: self.kind,
            source_code,
            label,
            help: if self.hints.is_empty() {
                None
            } else {
                Some(self.hints.join("\n"))
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unterminated literal, invalid character or identifier
    Lexical,
    /// Expected-token mismatch, unexpected end of file
    Syntax,
    /// Undeclared symbol, no matching overload, type mismatch, illegal recursion, redeclaration
    Semantic,
    /// External compiler or link failure, I/O failure
    Toolchain,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Lexical => write!(f, "lexical error"),
            ErrorKind::Syntax => write!(f, "syntax error"),
            ErrorKind::Semantic => write!(f, "semantic error"),
            ErrorKind::Toolchain => write!(f, "toolchain error"),
        }
    }
}

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("{kind}: {message}")]
struct MietteDiagnostic {
    message: String,
    kind: ErrorKind,
    #[source_code]
    source_code: Option<miette::NamedSource<String>>,
    #[label("here")]
    label: Option<miette::SourceSpan>,
    #[help]
    help: Option<String>,
}

// ============================================================================
// Accumulating channel
// ============================================================================

/// Every diagnostic recorded while compiling one unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompileErrors(pub Vec<CompileError>);

impl CompileErrors {
    pub fn single(error: CompileError) -> Self {
        Self(vec![error])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CompileError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&CompileError> {
        self.0.first()
    }

    /// Attach `source` to every error that has no origin yet.
    pub fn in_source(self, source: &Arc<SourceFile>) -> Self {
        Self(self.0.into_iter().map(|e| e.in_source(source)).collect())
    }

    /// Render every diagnostic, separated by blank lines.
    pub fn render(&self) -> String {
        self.0.iter().map(CompileError::render).collect::<Vec<_>>().join("\n")
    }
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}: {}", e.kind, e.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileErrors {}

impl From<CompileError> for CompileErrors {
    fn from(error: CompileError) -> Self {
        Self::single(error)
    }
}

impl IntoIterator for CompileErrors {
    type Item = CompileError;
    type IntoIter = std::vec::IntoIter<CompileError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Records diagnostics that should not stop the current scan.
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    errors: Vec<CompileError>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, error: CompileError) {
        tracing::debug!(kind = %error.kind, message = %error.message, "diagnostic reported");
        self.errors.push(error);
    }

    pub fn extend(&mut self, errors: CompileErrors) {
        for e in errors {
            self.report(e);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    /// Fail with everything recorded so far, if anything was recorded.
    pub fn check_and_throw(&mut self) -> Result<(), CompileErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(CompileErrors(std::mem::take(&mut self.errors)))
        }
    }

    /// Abort with a fatal error, carrying every accumulated diagnostic along.
    pub fn throw(&mut self, error: CompileError) -> CompileErrors {
        let mut errors = std::mem::take(&mut self.errors);
        errors.push(error);
        CompileErrors(errors)
    }

    /// Abort with the errors of a nested compilation, after everything accumulated here.
    pub fn abort(&mut self, nested: CompileErrors) -> CompileErrors {
        let mut errors = std::mem::take(&mut self.errors);
        errors.extend(nested);
        CompileErrors(errors)
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Render a diagnostic as `[module] kind: message` followed by the offending line and a caret
/// highlight. Positionless diagnostics render as a bare message.
pub fn format_error(module_name: &str, source: &str, error: &CompileError) -> String {
    let Some(span) = error.span else {
        return format_bare(error);
    };

    let (line_num, col_num, line_text) = get_line_info(source, span.start);
    let gutter = format!("{}", line_num).len();

    let mut out = format!("[{}] {}: {}\n", module_name, error.kind, error.message);
    out.push_str(&format!(" {:>gutter$} |\n", ""));
    out.push_str(&format!(" {:>gutter$} | {}\n", line_num, line_text.trim_end_matches('\r')));

    // Only the part of the span on this line is highlighted; columns count characters
    let byte_col = (col_num - 1).min(line_text.len());
    let before = line_text.get(..byte_col).unwrap_or(line_text);
    let highlighted = line_text.get(byte_col..).unwrap_or("");
    let width = highlighted
        .char_indices()
        .take_while(|(i, _)| *i < span.len())
        .count()
        .max(1);
    out.push_str(&format!(
        " {:>gutter$} | {}^{}\n",
        "",
        " ".repeat(before.chars().count()),
        "~".repeat(width - 1)
    ));

    for note in &error.notes {
        out.push_str(&format!(" = note: {}\n", note));
    }
    for hint in &error.hints {
        out.push_str(&format!(" = hint: {}\n", hint));
    }
    out
}

fn format_bare(error: &CompileError) -> String {
    let mut out = format!("{}: {}\n", error.kind, error.message);
    for note in &error.notes {
        out.push_str(&format!(" = note: {}\n", note));
    }
    for hint in &error.hints {
        out.push_str(&format!(" = hint: {}\n", hint));
    }
    out
}

/// Print an error with source context and ANSI colors to stderr.
pub fn print_error(error: &CompileError) {
    let red = "\x1b[31m";
    let bold = "\x1b[1m";
    let reset = "\x1b[0m";

    let rendered = error.render();
    let mut lines = rendered.lines();
    if let Some(header) = lines.next() {
        eprintln!("{bold}{red}{header}{reset}");
    }
    for line in lines {
        eprintln!("{line}");
    }
}

/// 0-based line number of the byte at `offset`.
pub fn line_index(source: &str, offset: usize) -> usize {
    let offset = offset.min(source.len());
    source.as_bytes()[..offset].iter().filter(|b| **b == b'\n').count()
}

/// The single source line containing `offset`, without its newline.
pub fn line_at(source: &str, offset: usize) -> &str {
    get_line_info(source, offset).2
}

/// Get line number, column number (both 1-based) and line text for a byte offset
pub fn get_line_info(source: &str, offset: usize) -> (usize, usize, &str) {
    let offset = offset.min(source.len());
    let mut line_num = 1;
    let mut line_start = 0;

    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line_num += 1;
            line_start = i + 1;
        }
    }

    let line_end = source[line_start..]
        .find('\n')
        .map(|i| line_start + i)
        .unwrap_or(source.len());

    let line_text = &source[line_start..line_end];
    let col_num = offset - line_start + 1;

    (line_num, col_num, line_text)
}

// ============================================================================
// Error catalog
// ============================================================================

/// Constructors for the diagnostics shared by more than one stage.
pub mod errors {
    use super::*;

    pub fn expected_token(expected: &str, found: &str, context: &str, span: Span) -> CompileError {
        let message = if context.is_empty() {
            format!("Expected `{}`, found `{}`", expected, found)
        } else {
            format!("Expected `{}`, found `{}`: {}", expected, found, context)
        };
        CompileError::syntax(message, span)
    }

    pub fn unexpected_eof(context: &str, span: Span) -> CompileError {
        let message = if context.is_empty() {
            "Unexpected <EOF>".to_string()
        } else {
            format!("{}: Unexpected <EOF>", context)
        };
        CompileError::syntax(message, span)
    }

    pub fn undeclared_function(name: &str, span: Span) -> CompileError {
        CompileError::semantic(format!("Undeclared function '{}'", name), span)
    }

    pub fn no_matching_overload(name: &str, span: Span) -> CompileError {
        CompileError::semantic(format!("Cannot find a good overload for function '{}'", name), span)
    }

    pub fn undeclared_type(name: &str, span: Span) -> CompileError {
        CompileError::semantic(format!("Undeclared type '{}'", name), span)
    }

    pub fn no_matching_type_overload(name: &str, span: Span) -> CompileError {
        CompileError::semantic(format!("Cannot find a good overload for type '{}'", name), span)
    }

    pub fn undeclared_variable(name: &str, span: Span) -> CompileError {
        CompileError::semantic(format!("Undeclared variable '{}'", name), span)
    }

    pub fn already_declared(what: &str, name: &str, span: Span) -> CompileError {
        CompileError::semantic(format!("{} '{}' already declared", what, name), span)
    }

    pub fn type_mismatch(expected: &str, found: &str, span: Span) -> CompileError {
        CompileError::semantic(format!("Expected '{}' type, got '{}'", expected, found), span)
    }

    pub fn illegal_recursion(field: &str, ty: &str, span: Span) -> CompileError {
        CompileError::semantic(format!("Field '{}' has illegal recursive type '{}'", field, ty), span)
    }

    pub fn not_supported(what: &str, span: Span) -> CompileError {
        CompileError::semantic(format!("{} not supported yet", what), span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_line_info() {
        let source = "line 1\nline 2\nline 3";

        let (line, col, text) = get_line_info(source, 0);
        assert_eq!(line, 1);
        assert_eq!(col, 1);
        assert_eq!(text, "line 1");

        let (line, col, text) = get_line_info(source, 7);
        assert_eq!(line, 2);
        assert_eq!(col, 1);
        assert_eq!(text, "line 2");

        let (line, col, text) = get_line_info(source, 10);
        assert_eq!(line, 2);
        assert_eq!(col, 4);
        assert_eq!(text, "line 2");
    }

    #[test]
    fn test_line_index_is_zero_based() {
        let source = "a\nbb\nccc";
        assert_eq!(line_index(source, 0), 0);
        assert_eq!(line_index(source, 2), 1);
        assert_eq!(line_index(source, 6), 2);
        assert_eq!(line_index(source, 1000), 2);
        assert_eq!(line_at(source, 3), "bb");
    }

    #[test]
    fn test_format_error_caret() {
        let source = "func main() {\n  var x = y;\n}";
        let err = CompileError::semantic("Undeclared variable 'y'", Span::new(24, 25));
        let rendered = format_error("main", source, &err);
        assert_eq!(
            rendered,
            "[main] semantic error: Undeclared variable 'y'\n   |\n 2 |   var x = y;\n   |           ^\n"
        );
    }

    #[test]
    fn test_format_error_with_hint_snapshot() {
        let err = CompileError::semantic("Undeclared variable 'y'", Span::new(8, 9))
            .with_hint("declare it with `var` before use");
        let rendered = format_error("main", "var x = y;", &err);
        insta::assert_snapshot!(rendered, @r"
[main] semantic error: Undeclared variable 'y'
   |
 1 | var x = y;
   |         ^
 = hint: declare it with `var` before use
");
    }

    #[test]
    fn test_format_error_multichar_span() {
        let source = "var value = 0";
        let err = CompileError::syntax("Expected `Semicolon`, found `<EOF>`", Span::new(4, 9));
        let rendered = format_error("m", source, &err);
        assert!(rendered.contains(" 1 | var value = 0\n"));
        assert!(rendered.contains("   |     ^~~~~\n"));
    }

    #[test]
    fn test_format_error_counts_characters_before_the_caret() {
        // `é` and `€` are two and three bytes wide
        let source = "var s = \"é€\"; var t = y;";
        let offset = source.find('y').unwrap();
        let err = CompileError::semantic("Undeclared variable 'y'", Span::new(offset, offset + 1));
        let rendered = format_error("m", source, &err);
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines[2], " 1 | var s = \"é€\"; var t = y;");
        assert_eq!(lines[3], format!("   | {}^", " ".repeat(22)));

        let err = CompileError::lexical("Invalid character", Span::new(9, 14));
        let rendered = format_error("m", source, &err);
        assert!(rendered.contains(&format!("   | {}^~\n", " ".repeat(9))), "{}", rendered);
    }

    #[test]
    fn test_positionless_renders_bare() {
        let err = CompileError::positionless(ErrorKind::Toolchain, "clang exited with status 1");
        assert_eq!(err.render(), "toolchain error: clang exited with status 1\n");
        assert_eq!(format_error("m", "", &err), err.render());
    }

    #[test]
    fn test_render_uses_origin() {
        let file = SourceFile::new("lib", "var = 1;");
        let err = CompileError::syntax("Expected `Identifier`, found `=`", Span::new(4, 5)).in_source(&file);
        assert!(err.render().starts_with("[lib] syntax error:"));
    }

    #[test]
    fn test_bag_check_and_throw() {
        let mut bag = DiagnosticBag::new();
        assert!(bag.check_and_throw().is_ok());

        bag.report(errors::already_declared("Function", "f", Span::new(0, 1)));
        bag.report(errors::already_declared("Function", "g", Span::new(2, 3)));
        assert!(bag.has_errors());

        let errs = bag.check_and_throw().unwrap_err();
        assert_eq!(errs.len(), 2);
        assert!(!bag.has_errors());
    }

    #[test]
    fn test_bag_throw_carries_accumulated() {
        let mut bag = DiagnosticBag::new();
        bag.report(errors::already_declared("Type", "T", Span::new(0, 1)));
        let errs = bag.throw(errors::undeclared_type("U", Span::new(5, 6)));
        assert_eq!(errs.len(), 2);
        assert_eq!(errs.0[1].message, "Undeclared type 'U'");
    }

    #[test]
    fn test_miette_report_has_label() {
        let file = SourceFile::new("m", "var x = 0;");
        let err = CompileError::syntax("bad", Span::new(4, 5)).in_source(&file);
        let report = err.to_miette_report();
        let labels: Vec<_> = report.labels().map(|l| l.collect::<Vec<_>>()).unwrap_or_default();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].offset(), 4);
    }
}
