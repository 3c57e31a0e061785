//! Dependency and points-to analysis
//!
//! Finds the methods, classes and fields a program can reach from its entry points,
//! and for each variable the set of runtime types it may hold. The analysis is a
//! constraint-based fixpoint: nodes hold type sets, constraints move types between
//! them, and a worklist re-applies constraints whose input grew.
//!
//! # Structure
//!
//! - `classes`: class model, [`ClassSource`] oracle and hierarchy queries
//! - `node`: type interning and points-to nodes
//! - `constraint`: flow rules between nodes
//! - `analyzer`: the solver and body translation
//! - `info`: results detached from the solver
//!
//! # Example
//!
//! ```ignore
//! let mut analyzer = DependencyAnalyzer::new(&classes);
//! analyzer.add_entry_point(&main).propagate(1, "[Ljava/lang/String;");
//! let info = analyzer.finish();
//! for method in info.methods() {
//!     println!("{}", method.reference);
//! }
//! ```

mod analyzer;
mod classes;
mod constraint;
mod info;
mod node;

pub use analyzer::{AnalysisState, DependencyAnalyzer, EntryPoint, MethodState, WorklistOrder};
pub use classes::{
    ClassHierarchy, ClassHolder, ClassSource, FieldHolder, MemoryClassSource, MethodHolder, CLASS_CLASS,
    OBJECT_CLASS, STRING_CLASS, THROWABLE_CLASS,
};
pub use constraint::{CatchHandler, Constraint, ConstraintId, InvokeSite};
pub use info::{DependencyInfo, MethodInfo};
pub use node::{MethodId, Node, NodeId, NodeKind, TypeId, TypeTable};
