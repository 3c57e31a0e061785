//! Analysis diagnostics
//!
//! Messages are templates with positional placeholders (`{0}`, `{1}`, ...) filled from
//! typed parameters when rendered.

use crate::ir::{FieldReference, MethodReference, TextLocation, ValueType};
use std::fmt;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    /// Reported, compilation continues
    Warning,
    /// Reported, compilation stops after analysis
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Stable identifier of a diagnostic kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagnosticCode(pub &'static str);

impl DiagnosticCode {
    /// A referenced class is not available
    pub const CLASS_NOT_FOUND: DiagnosticCode = DiagnosticCode("D001");
    /// A called method does not resolve
    pub const METHOD_NOT_FOUND: DiagnosticCode = DiagnosticCode("D002");
    /// An accessed field does not resolve
    pub const FIELD_NOT_FOUND: DiagnosticCode = DiagnosticCode("D003");
    /// An abstract method is called directly
    pub const ABSTRACT_CALL: DiagnosticCode = DiagnosticCode("D004");

    /// Code as printed, e.g. `D001`
    pub fn as_str(&self) -> &str {
        self.0
    }
}

/// Template parameter
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticParam {
    /// Class name
    Class(String),
    /// Method reference
    Method(MethodReference),
    /// Field reference
    Field(FieldReference),
    /// Value type, printed by class name for object types
    Type(ValueType),
    /// Source location
    Location(TextLocation),
    /// Free text
    Text(String),
}

impl fmt::Display for DiagnosticParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticParam::Class(name) => write!(f, "{}", name),
            DiagnosticParam::Method(method) => write!(f, "{}", method),
            DiagnosticParam::Field(field) => write!(f, "{}", field),
            DiagnosticParam::Type(ValueType::Object(name)) => write!(f, "{}", name),
            DiagnosticParam::Type(ty) => write!(f, "{}", ty),
            DiagnosticParam::Location(location) => write!(f, "{}", location),
            DiagnosticParam::Text(text) => write!(f, "{}", text),
        }
    }
}

/// A reported problem
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// How bad it is
    pub severity: Severity,
    /// Kind, when the diagnostic has one
    pub code: Option<DiagnosticCode>,
    /// Where in the source the problem was found
    pub location: Option<TextLocation>,
    /// Message with `{N}` placeholders
    pub template: &'static str,
    /// Values for the placeholders, in order
    pub params: Vec<DiagnosticParam>,
}

impl Diagnostic {
    /// Diagnostic without code, location or parameters
    pub fn new(severity: Severity, template: &'static str) -> Self {
        Self {
            severity,
            code: None,
            location: None,
            template,
            params: Vec::new(),
        }
    }

    /// Shorthand for an error
    pub fn error(template: &'static str) -> Self {
        Self::new(Severity::Error, template)
    }

    /// Shorthand for a warning
    pub fn warning(template: &'static str) -> Self {
        Self::new(Severity::Warning, template)
    }

    /// Set the code
    pub fn with_code(mut self, code: DiagnosticCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Set the location
    pub fn with_location(mut self, location: Option<TextLocation>) -> Self {
        self.location = location;
        self
    }

    /// Append the next placeholder value
    pub fn with_param(mut self, param: DiagnosticParam) -> Self {
        self.params.push(param);
        self
    }

    /// Message with placeholders substituted. A placeholder without a matching parameter
    /// is kept verbatim.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let param = after
                .find('}')
                .and_then(|close| after[..close].parse::<usize>().ok().map(|index| (index, close)))
                .and_then(|(index, close)| self.params.get(index).map(|param| (param, close)));
            match param {
                Some((param, close)) => {
                    out.push_str(&param.to_string());
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.severity)?;
        if let Some(code) = &self.code {
            write!(f, "[{}]", code.as_str())?;
        }
        write!(f, ": {}", self.render())?;
        if let Some(location) = &self.location {
            write!(f, " at {}", location)?;
        }
        Ok(())
    }
}

/// Ordered collection of diagnostics, without duplicates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic unless an identical one was already recorded
    pub fn report(&mut self, diagnostic: Diagnostic) {
        if !self.items.contains(&diagnostic) {
            self.items.push(diagnostic);
        }
    }

    /// Whether any error was reported
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Error)
    }

    /// Errors in report order
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.severity == Severity::Error)
    }

    /// Warnings in report order
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(|d| d.severity == Severity::Warning)
    }

    /// All diagnostics in report order
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    /// Number of distinct diagnostics
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing was reported
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
