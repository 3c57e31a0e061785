//! Rendering of listing parse errors and analysis diagnostics

use crate::output::StyledOutput;
use codespan_reporting::diagnostic::{Diagnostic as CsDiagnostic, Label};
use codespan_reporting::files::SimpleFile;
use codespan_reporting::term;
use oolong_engine::ir::listing::ListingParseError;
use oolong_engine::{Diagnostics, Severity};
use std::path::Path;
use termcolor::{ColorChoice, StandardStream, WriteColor};

/// Byte range of the character at `offset`, empty at end of input or a line break
fn error_span(source: &str, offset: usize) -> std::ops::Range<usize> {
    let mut start = offset.min(source.len());
    while !source.is_char_boundary(start) {
        start -= 1;
    }
    let end = match source[start..].chars().next() {
        Some('\n') | None => start,
        Some(c) => start + c.len_utf8(),
    };
    start..end
}

/// Render a listing parse error with the offending source line
pub fn write_listing_error(
    writer: &mut dyn WriteColor,
    path: &Path,
    source: &str,
    error: &ListingParseError,
) -> Result<(), codespan_reporting::files::Error> {
    let file = SimpleFile::new(path.display().to_string(), source);
    let diagnostic = CsDiagnostic::error()
        .with_message("invalid listing")
        .with_labels(vec![Label::primary((), error_span(source, error.offset)).with_message(&error.message)]);
    term::emit(writer, &term::Config::default(), &file, &diagnostic)
}

/// [`write_listing_error`] to stderr
pub fn emit_listing_error(path: &Path, source: &str, error: &ListingParseError, color: ColorChoice) {
    let mut stderr = StandardStream::stderr(color);
    if write_listing_error(&mut stderr, path, source, error).is_err() {
        let (row, column) = error.position_in(source);
        eprintln!("error: {}:{}:{}: {}", path.display(), row, column, error.message);
    }
}

/// One line per diagnostic, `error[D001]: message at File.java:3`
pub fn write_diagnostics<W: WriteColor>(out: &mut StyledOutput<W>, diagnostics: &Diagnostics) {
    for diagnostic in diagnostics.iter() {
        match diagnostic.severity {
            Severity::Error => out.error("error"),
            Severity::Warning => out.warning("warning"),
        }
        if let Some(code) = &diagnostic.code {
            out.plain(&format!("[{}]", code.as_str()));
        }
        out.plain(&format!(": {}", diagnostic.render()));
        if let Some(location) = &diagnostic.location {
            out.info(&format!(" at {}", location));
        }
        out.newline();
    }
}
