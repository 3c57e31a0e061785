//! Oolong Engine
//!
//! Whole-program compiler from a typed, SSA-form object IR to JavaScript and
//! WebAssembly:
//! - **IR**: programs, the text listing format and optimizations (`ir` module)
//! - **Analysis**: reachability and points-to types (`dependency` module)
//! - **Backends**: JavaScript and WebAssembly code generation (`backend` module)
//! - **Support**: growable byte buffers (`blob`) and source maps (`sourcemap`)
//!
//! # Example
//!
//! ```rust,ignore
//! use oolong_engine::{CompileOptions, Compiler, MemoryClassSource, Target};
//!
//! let classes: MemoryClassSource = load_classes();
//! let compiler = Compiler::new(&classes, CompileOptions::new(Target::Wasm));
//! let output = compiler.compile(&"Main.main()V".parse()?)?;
//! std::fs::write("classes.wasm", output.bytes())?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_arguments)]

// ============================================================================
// Core Modules
// ============================================================================

/// Growable byte buffer with LEB128 encoding and backpatching
pub mod blob;

/// Source map construction and serialization
pub mod sourcemap;

/// Intermediate representation, listing format and optimizations
pub mod ir;

/// Dependency and points-to analysis
pub mod dependency;

/// JavaScript and WebAssembly code generation
pub mod backend;

/// Analysis diagnostics
pub mod diagnostics;

/// Error types
pub mod error;

/// Compiler configuration
pub mod options;

/// Analysis, optimization and emission pipeline
pub mod compiler;

// ============================================================================
// Re-exports
// ============================================================================

pub use blob::{Blob, BlobReader, Marker};
pub use compiler::{CompiledOutput, Compiler};
pub use dependency::{
    ClassHolder, ClassSource, DependencyAnalyzer, DependencyInfo, FieldHolder, MemoryClassSource, MethodHolder,
    WorklistOrder,
};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::{CodegenError, CompileError, CompileResult};
pub use ir::listing::{parse as parse_listing, print as print_listing};
pub use ir::optimize::OptLevel;
pub use ir::{MethodDescriptor, MethodReference, Program, ValueType};
pub use options::{CompileOptions, JsOptions, Target, WasmOptions};
pub use sourcemap::{SourceMap, SourceMapBuilder};
