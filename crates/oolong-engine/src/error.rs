//! Compilation errors

use crate::diagnostics::Diagnostics;
use crate::ir::{FieldReference, ListingParseError, MethodReference, ProgramError};
use thiserror::Error;

/// Result of a pipeline stage
pub type CompileResult<T> = Result<T, CompileError>;

/// Backend failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    /// Reachable method without code to emit
    #[error("Method {0} has neither a body nor an intrinsic")]
    MissingBody(MethodReference),

    /// Class referenced by emitted code but not provided
    #[error("Class {0} is not available to the code generator")]
    MissingClass(String),

    /// Intrinsic called with the wrong number of arguments
    #[error("Intrinsic {method} expects {expected} arguments, got {actual}")]
    IntrinsicArity {
        method: MethodReference,
        expected: usize,
        actual: usize,
    },

    /// Intrinsic called with an unexpected signature or operand
    #[error("Intrinsic {method} cannot be used here: {message}")]
    IntrinsicMismatch { method: MethodReference, message: String },

    /// Construct the backend cannot express
    #[error("Unsupported {what} in {method}")]
    Unsupported { method: MethodReference, what: String },

    /// Field access that no class declares
    #[error("Field {0} does not resolve to a declaration")]
    MissingField(FieldReference),

    /// Call to a function missing from the Wasm module
    #[error("Unknown function {0}")]
    UnknownFunction(String),

    /// Access to a global missing from the Wasm module
    #[error("Unknown global {0}")]
    UnknownGlobal(String),

    /// Branch to a label no enclosing block defines
    #[error("Branch to label {0} outside of its block")]
    UnknownLabel(u32),

    /// Entry point is an instance method
    #[error("Entry method {0} must be static")]
    InstanceEntry(MethodReference),

    /// Method body failed validation
    #[error("Invalid body of {method}: {source}")]
    InvalidProgram {
        method: MethodReference,
        #[source]
        source: ProgramError,
    },
}

/// Pipeline failures
#[derive(Debug, Error)]
pub enum CompileError {
    /// Analysis reported errors
    #[error("Dependency analysis failed with {} error(s)", .0.errors().count())]
    Analysis(Diagnostics),

    /// Code generation failed
    #[error(transparent)]
    Codegen(#[from] CodegenError),

    /// A listing did not parse
    #[error(transparent)]
    Listing(#[from] ListingParseError),

    /// A program failed validation
    #[error(transparent)]
    Program(#[from] ProgramError),

    /// Source map could not be written
    #[error("Source map serialization failed: {0}")]
    SourceMap(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostic;

    #[test]
    fn test_messages() {
        let method: MethodReference = "Foo.run()V".parse().expect("valid reference");
        assert_eq!(
            CodegenError::MissingBody(method.clone()).to_string(),
            "Method Foo.run()V has neither a body nor an intrinsic"
        );
        assert_eq!(
            CodegenError::IntrinsicArity {
                method,
                expected: 2,
                actual: 1
            }
            .to_string(),
            "Intrinsic Foo.run()V expects 2 arguments, got 1"
        );

        let mut diagnostics = Diagnostics::new();
        diagnostics.report(Diagnostic::error("first"));
        diagnostics.report(Diagnostic::warning("second"));
        diagnostics.report(Diagnostic::error("third"));
        assert_eq!(
            CompileError::Analysis(diagnostics).to_string(),
            "Dependency analysis failed with 2 error(s)"
        );
    }

    #[test]
    fn test_from_codegen() {
        let error: CompileError = CodegenError::UnknownFunction("f".into()).into();
        assert!(matches!(error, CompileError::Codegen(_)));
    }
}
