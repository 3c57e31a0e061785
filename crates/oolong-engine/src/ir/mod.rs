//! Intermediate Representation
//!
//! Method bodies as basic blocks over a flat variable array, in partial SSA form: merge
//! points use phis, but passes may reassign variables.
//!
//! # Structure
//!
//! - `types`: value types and member references
//! - `instr`: instruction kinds
//! - `block`: basic blocks, phis, try/catch regions
//! - `program`: variables and blocks of one method
//! - `builder`: construction helpers
//! - `inference`: per-variable representation types
//! - `listing`: round-trippable text format
//! - `optimize`: constant folding and dead code elimination

pub mod block;
pub mod builder;
pub mod inference;
pub mod instr;
pub mod listing;
pub mod optimize;
pub mod program;
pub mod types;

pub use block::{BasicBlock, BlockId, Incoming, Phi, TryCatch};
pub use builder::ProgramBuilder;
pub use inference::{infer, VariableType, VariableTypes};
pub use instr::{
    ArrayElementType, BinaryBranchCondition, BinaryOp, BranchCondition, Instruction, InstructionKind,
    IntegerSubtype, InvocationKind, NumericType, SwitchEntry, TextLocation,
};
pub use listing::ListingParseError;
pub use program::{Program, ProgramError, Variable, VariableId};
pub use types::{FieldReference, MethodDescriptor, MethodReference, PrimitiveType, TypeParseError, ValueType};
