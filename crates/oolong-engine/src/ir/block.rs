//! Basic Blocks
//!
//! A block is a straight-line instruction sequence whose last instruction transfers
//! control. Phis and the exception binding of a handler block are kept apart from the
//! instruction list, since they logically execute on block entry.

use super::instr::{Instruction, InstructionKind};
use super::program::VariableId;

/// Basic block identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    /// Id from a raw index
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw index
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Position in the program's block list
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// One incoming edge of a phi
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Incoming {
    /// Predecessor block
    pub source: BlockId,
    /// Value flowing in along that edge
    pub value: VariableId,
}

/// Merge of values from predecessor blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phi {
    /// Variable defined by the phi
    pub receiver: VariableId,
    /// One entry per predecessor
    pub incomings: Vec<Incoming>,
}

impl Phi {
    /// Incoming value for `source`, if any
    pub fn incoming_from(&self, source: BlockId) -> Option<VariableId> {
        self.incomings.iter().find(|i| i.source == source).map(|i| i.value)
    }
}

/// Exception handler covering a whole block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryCatch {
    /// Caught class, or `None` for catch-all
    pub exception_type: Option<String>,
    /// Block that receives the exception
    pub handler: BlockId,
}

/// A basic block
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// Unique identifier for this block
    pub id: BlockId,
    /// Optional label for listings
    pub label: Option<String>,
    /// Variable receiving the caught exception, for handler blocks
    pub exception_variable: Option<VariableId>,
    /// Phis, evaluated on entry before any instruction
    pub phis: Vec<Phi>,
    /// Instructions, ending with a control transfer
    pub instructions: Vec<Instruction>,
    /// Handlers in the order they are tried
    pub try_catches: Vec<TryCatch>,
}

impl BasicBlock {
    /// Create a new empty basic block
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            label: None,
            exception_variable: None,
            phis: Vec::new(),
            instructions: Vec::new(),
            try_catches: Vec::new(),
        }
    }

    /// Append an instruction
    pub fn push(&mut self, instruction: impl Into<Instruction>) {
        self.instructions.push(instruction.into());
    }

    /// Final control-transfer instruction, if the block has one
    pub fn terminator(&self) -> Option<&InstructionKind> {
        self.instructions.last().map(|i| &i.kind).filter(|k| k.is_terminator())
    }

    /// Normal-flow successors
    pub fn successors(&self) -> Vec<BlockId> {
        self.terminator().map(|t| t.successors()).unwrap_or_default()
    }

    /// Handler blocks reachable through exceptions
    pub fn handlers(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.try_catches.iter().map(|tc| tc.handler)
    }

    /// Whether the block contains nothing at all
    pub fn is_empty(&self) -> bool {
        self.phis.is_empty()
            && self.instructions.is_empty()
            && self.try_catches.is_empty()
            && self.exception_variable.is_none()
    }
}
