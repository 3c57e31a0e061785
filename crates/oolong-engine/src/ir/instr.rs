//! IR Instructions
//!
//! Every instruction is a variant of [`InstructionKind`] plus an optional source location.
//! Control transfers (`Jump`, `Branch`, `BinaryBranch`, `Switch`, `Exit`, `Raise`) are
//! ordinary instructions that must come last in their block.

use super::block::BlockId;
use super::program::VariableId;
use super::types::{FieldReference, MethodReference, ValueType};
use std::fmt;

/// Source location of an instruction (for mapping only)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextLocation {
    /// File name as recorded by the front end
    pub file: String,
    /// 1-based line
    pub line: u32,
}

impl TextLocation {
    /// Create a location
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for TextLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Operand type of arithmetic instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericType {
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
}

impl NumericType {
    /// Listing keyword
    pub fn name(self) -> &'static str {
        match self {
            NumericType::Int => "int",
            NumericType::Long => "long",
            NumericType::Float => "float",
            NumericType::Double => "double",
        }
    }

    /// Parse a listing keyword
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(NumericType::Int),
            "long" => Some(NumericType::Long),
            "float" => Some(NumericType::Float),
            "double" => Some(NumericType::Double),
            _ => None,
        }
    }
}

/// Narrow integer types reachable through `IntegerCast`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegerSubtype {
    /// Signed 8-bit
    Byte,
    /// Signed 16-bit
    Short,
    /// Unsigned 16-bit
    Char,
}

impl IntegerSubtype {
    /// Listing keyword
    pub fn name(self) -> &'static str {
        match self {
            IntegerSubtype::Byte => "byte",
            IntegerSubtype::Short => "short",
            IntegerSubtype::Char => "char",
        }
    }

    /// Parse a listing keyword
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "byte" => Some(IntegerSubtype::Byte),
            "short" => Some(IntegerSubtype::Short),
            "char" => Some(IntegerSubtype::Char),
            _ => None,
        }
    }
}

/// Binary arithmetic operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    Xor,
    /// `<<`
    ShiftLeft,
    /// `>>`, sign-extending
    ShiftRight,
    /// `>>>`, zero-filling
    ShiftRightUnsigned,
    /// Three-way comparison producing -1, 0, or 1
    Compare,
}

impl BinaryOp {
    /// All operations, in listing-token order
    pub const ALL: [BinaryOp; 12] = [
        BinaryOp::Add,
        BinaryOp::Subtract,
        BinaryOp::Multiply,
        BinaryOp::Divide,
        BinaryOp::Modulo,
        BinaryOp::And,
        BinaryOp::Or,
        BinaryOp::Xor,
        BinaryOp::ShiftLeft,
        BinaryOp::ShiftRight,
        BinaryOp::ShiftRightUnsigned,
        BinaryOp::Compare,
    ];

    /// Listing symbol
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
            BinaryOp::ShiftRightUnsigned => ">>>",
            BinaryOp::Compare => "compareTo",
        }
    }

    /// Whether the operation is only defined on integral operands
    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::And
                | BinaryOp::Or
                | BinaryOp::Xor
                | BinaryOp::ShiftLeft
                | BinaryOp::ShiftRight
                | BinaryOp::ShiftRightUnsigned
        )
    }
}

/// Condition of a single-operand branch, comparing against zero or null
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchCondition {
    /// Operand is zero
    Equal,
    /// Operand is not zero
    NotEqual,
    /// Operand is negative
    Less,
    /// Operand is zero or negative
    LessOrEqual,
    /// Operand is positive
    Greater,
    /// Operand is zero or positive
    GreaterOrEqual,
    /// Operand is `null`
    Null,
    /// Operand is not `null`
    NotNull,
}

impl BranchCondition {
    /// Negated condition
    pub fn negate(self) -> Self {
        match self {
            BranchCondition::Equal => BranchCondition::NotEqual,
            BranchCondition::NotEqual => BranchCondition::Equal,
            BranchCondition::Less => BranchCondition::GreaterOrEqual,
            BranchCondition::LessOrEqual => BranchCondition::Greater,
            BranchCondition::Greater => BranchCondition::LessOrEqual,
            BranchCondition::GreaterOrEqual => BranchCondition::Less,
            BranchCondition::Null => BranchCondition::NotNull,
            BranchCondition::NotNull => BranchCondition::Null,
        }
    }
}

/// Condition of a two-operand branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryBranchCondition {
    /// Integers are equal
    Equal,
    /// Integers differ
    NotEqual,
    /// Same object
    ReferenceEqual,
    /// Different objects
    ReferenceNotEqual,
}

impl BinaryBranchCondition {
    /// Listing symbol
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryBranchCondition::Equal => "==",
            BinaryBranchCondition::NotEqual => "!=",
            BinaryBranchCondition::ReferenceEqual => "===",
            BinaryBranchCondition::ReferenceNotEqual => "!==",
        }
    }
}

/// How an invocation selects its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvocationKind {
    /// No instance; target is the named method
    Static,
    /// Instance call bound to the named method (constructors, `super.m()`, private methods)
    Special,
    /// Instance call dispatched on the receiver's runtime class
    Virtual,
}

impl InvocationKind {
    /// Listing keyword
    pub fn keyword(self) -> &'static str {
        match self {
            InvocationKind::Static => "invokeStatic",
            InvocationKind::Special => "invoke",
            InvocationKind::Virtual => "invokeVirtual",
        }
    }
}

/// Element representation of array accesses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayElementType {
    /// Unsigned 16-bit
    Char,
    /// Signed 8-bit
    Byte,
    /// Signed 16-bit
    Short,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// Reference
    Object,
}

impl ArrayElementType {
    /// Listing keyword
    pub fn name(self) -> &'static str {
        match self {
            ArrayElementType::Char => "char",
            ArrayElementType::Byte => "byte",
            ArrayElementType::Short => "short",
            ArrayElementType::Int => "int",
            ArrayElementType::Long => "long",
            ArrayElementType::Float => "float",
            ArrayElementType::Double => "double",
            ArrayElementType::Object => "object",
        }
    }

    /// Parse a listing keyword
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "char" => Some(ArrayElementType::Char),
            "byte" => Some(ArrayElementType::Byte),
            "short" => Some(ArrayElementType::Short),
            "int" => Some(ArrayElementType::Int),
            "long" => Some(ArrayElementType::Long),
            "float" => Some(ArrayElementType::Float),
            "double" => Some(ArrayElementType::Double),
            "object" => Some(ArrayElementType::Object),
            _ => None,
        }
    }
}

/// One `case` of a switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwitchEntry {
    /// Value selecting this case
    pub condition: i32,
    /// Block to jump to
    pub target: BlockId,
}

/// Instruction payload
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionKind {
    /// Does nothing
    Nop,

    // Constants
    /// `receiver = class value`
    ClassConstant { receiver: VariableId, value: ValueType },
    /// `receiver = null`
    NullConstant { receiver: VariableId },
    /// `receiver = value` for `int`
    IntConstant { receiver: VariableId, value: i32 },
    /// `receiver = value` for `long`
    LongConstant { receiver: VariableId, value: i64 },
    /// `receiver = value` for `float`
    FloatConstant { receiver: VariableId, value: f32 },
    /// `receiver = value` for `double`
    DoubleConstant { receiver: VariableId, value: f64 },
    /// `receiver = value` for a string literal
    StringConstant { receiver: VariableId, value: String },

    // Arithmetic and conversions
    /// `receiver = assignee`
    Assign { receiver: VariableId, assignee: VariableId },
    /// `receiver = first op second`
    Binary {
        receiver: VariableId,
        op: BinaryOp,
        operand_type: NumericType,
        first: VariableId,
        second: VariableId,
    },
    /// `receiver = -operand`
    Negate { receiver: VariableId, operand_type: NumericType, operand: VariableId },
    /// Conversion between numeric types
    NumericCast { receiver: VariableId, value: VariableId, from: NumericType, to: NumericType },
    /// Truncation of an `int` to a narrower integer type
    IntegerCast { receiver: VariableId, value: VariableId, target: IntegerSubtype },
    /// Checked reference cast
    Cast { receiver: VariableId, value: VariableId, target: ValueType },
    /// `receiver = value instanceof target`
    IsInstance { receiver: VariableId, value: VariableId, target: ValueType },

    // Control flow
    /// Branch on one operand compared against zero or null
    Branch {
        condition: BranchCondition,
        operand: VariableId,
        consequent: BlockId,
        alternative: BlockId,
    },
    /// Branch on two operands
    BinaryBranch {
        condition: BinaryBranchCondition,
        first: VariableId,
        second: VariableId,
        consequent: BlockId,
        alternative: BlockId,
    },
    /// Unconditional jump
    Jump { target: BlockId },
    /// Jump to the entry matching `condition`, or to `default`
    Switch { condition: VariableId, entries: Vec<SwitchEntry>, default: BlockId },
    /// Return, with a value unless the method is void
    Exit { value: Option<VariableId> },
    /// Throw
    Raise { exception: VariableId },

    // Objects, fields, arrays
    /// Allocate an instance without running a constructor
    Construct { receiver: VariableId, class: String },
    /// Allocate an array
    ConstructArray { receiver: VariableId, item_type: ValueType, size: VariableId },
    /// Field read; `instance` is `None` for static fields
    GetField {
        receiver: VariableId,
        instance: Option<VariableId>,
        field: FieldReference,
        field_type: ValueType,
    },
    /// Field write; `instance` is `None` for static fields
    PutField {
        instance: Option<VariableId>,
        field: FieldReference,
        value: VariableId,
        field_type: ValueType,
    },
    /// Number of elements
    ArrayLength { receiver: VariableId, array: VariableId },
    /// Shallow copy of an array
    CloneArray { receiver: VariableId, array: VariableId },
    /// Raw element storage of an array, for element access
    UnwrapArray { receiver: VariableId, array: VariableId, element_type: ArrayElementType },
    /// Element read from unwrapped storage
    GetElement {
        receiver: VariableId,
        array: VariableId,
        index: VariableId,
        element_type: ArrayElementType,
    },
    /// Element write to unwrapped storage
    PutElement {
        array: VariableId,
        index: VariableId,
        value: VariableId,
        element_type: ArrayElementType,
    },

    // Calls and runtime
    /// Method call; `receiver` is `None` for void calls or discarded results
    Invoke {
        receiver: Option<VariableId>,
        instance: Option<VariableId>,
        method: MethodReference,
        arguments: Vec<VariableId>,
        kind: InvocationKind,
    },
    /// Run the static initializer of `class` if it has not run yet
    InitClass { class: String },
    /// `receiver = value`, throwing if `value` is `null`
    NullCheck { receiver: VariableId, value: VariableId },
    /// Acquire the monitor of `object`
    MonitorEnter { object: VariableId },
    /// Release the monitor of `object`
    MonitorExit { object: VariableId },
}

impl InstructionKind {
    /// Variable written by the instruction
    pub fn receiver(&self) -> Option<VariableId> {
        use InstructionKind::*;
        match self {
            ClassConstant { receiver, .. }
            | NullConstant { receiver }
            | IntConstant { receiver, .. }
            | LongConstant { receiver, .. }
            | FloatConstant { receiver, .. }
            | DoubleConstant { receiver, .. }
            | StringConstant { receiver, .. }
            | Assign { receiver, .. }
            | Binary { receiver, .. }
            | Negate { receiver, .. }
            | NumericCast { receiver, .. }
            | IntegerCast { receiver, .. }
            | Cast { receiver, .. }
            | IsInstance { receiver, .. }
            | Construct { receiver, .. }
            | ConstructArray { receiver, .. }
            | GetField { receiver, .. }
            | ArrayLength { receiver, .. }
            | CloneArray { receiver, .. }
            | UnwrapArray { receiver, .. }
            | GetElement { receiver, .. }
            | NullCheck { receiver, .. } => Some(*receiver),
            Invoke { receiver, .. } => *receiver,
            Nop
            | Branch { .. }
            | BinaryBranch { .. }
            | Jump { .. }
            | Switch { .. }
            | Exit { .. }
            | Raise { .. }
            | PutField { .. }
            | PutElement { .. }
            | InitClass { .. }
            | MonitorEnter { .. }
            | MonitorExit { .. } => None,
        }
    }

    /// Variables read by the instruction, in operand order
    pub fn uses(&self) -> Vec<VariableId> {
        use InstructionKind::*;
        match self {
            Nop
            | ClassConstant { .. }
            | NullConstant { .. }
            | IntConstant { .. }
            | LongConstant { .. }
            | FloatConstant { .. }
            | DoubleConstant { .. }
            | StringConstant { .. }
            | Jump { .. }
            | Construct { .. }
            | InitClass { .. } => Vec::new(),
            Assign { assignee, .. } => vec![*assignee],
            Binary { first, second, .. } => vec![*first, *second],
            Negate { operand, .. } => vec![*operand],
            NumericCast { value, .. }
            | IntegerCast { value, .. }
            | Cast { value, .. }
            | IsInstance { value, .. }
            | NullCheck { value, .. } => vec![*value],
            Branch { operand, .. } => vec![*operand],
            BinaryBranch { first, second, .. } => vec![*first, *second],
            Switch { condition, .. } => vec![*condition],
            Exit { value } => value.iter().copied().collect(),
            Raise { exception } => vec![*exception],
            ConstructArray { size, .. } => vec![*size],
            GetField { instance, .. } => instance.iter().copied().collect(),
            PutField { instance, value, .. } => instance.iter().copied().chain(Some(*value)).collect(),
            ArrayLength { array, .. } | CloneArray { array, .. } | UnwrapArray { array, .. } => vec![*array],
            GetElement { array, index, .. } => vec![*array, *index],
            PutElement { array, index, value, .. } => vec![*array, *index, *value],
            Invoke { instance, arguments, .. } => instance.iter().chain(arguments.iter()).copied().collect(),
            MonitorEnter { object } | MonitorExit { object } => vec![*object],
        }
    }

    /// Normal-flow successor blocks
    pub fn successors(&self) -> Vec<BlockId> {
        use InstructionKind::*;
        match self {
            Branch { consequent, alternative, .. } | BinaryBranch { consequent, alternative, .. } => {
                vec![*consequent, *alternative]
            }
            Jump { target } => vec![*target],
            Switch { entries, default, .. } => {
                entries.iter().map(|e| e.target).chain(std::iter::once(*default)).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Rewrite every block reference through `map`
    pub fn map_targets(&mut self, mut map: impl FnMut(BlockId) -> BlockId) {
        use InstructionKind::*;
        match self {
            Branch { consequent, alternative, .. } | BinaryBranch { consequent, alternative, .. } => {
                *consequent = map(*consequent);
                *alternative = map(*alternative);
            }
            Jump { target } => *target = map(*target),
            Switch { entries, default, .. } => {
                for entry in entries.iter_mut() {
                    entry.target = map(entry.target);
                }
                *default = map(*default);
            }
            _ => {}
        }
    }

    /// Whether control never falls through to a next instruction
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstructionKind::Branch { .. }
                | InstructionKind::BinaryBranch { .. }
                | InstructionKind::Jump { .. }
                | InstructionKind::Switch { .. }
                | InstructionKind::Exit { .. }
                | InstructionKind::Raise { .. }
        )
    }

    /// Whether removing the instruction is safe when its receiver is unused
    pub fn is_pure(&self) -> bool {
        use InstructionKind::*;
        match self {
            Nop
            | ClassConstant { .. }
            | NullConstant { .. }
            | IntConstant { .. }
            | LongConstant { .. }
            | FloatConstant { .. }
            | DoubleConstant { .. }
            | StringConstant { .. }
            | Assign { .. }
            | Negate { .. }
            | NumericCast { .. }
            | IntegerCast { .. }
            | IsInstance { .. } => true,
            // Integer division by zero throws
            Binary { op, operand_type, .. } => {
                !(matches!(op, BinaryOp::Divide | BinaryOp::Modulo)
                    && matches!(operand_type, NumericType::Int | NumericType::Long))
            }
            _ => false,
        }
    }

    /// Short name used in diagnostics
    pub fn name(&self) -> &'static str {
        use InstructionKind::*;
        match self {
            Nop => "nop",
            ClassConstant { .. } => "classOf",
            NullConstant { .. } => "null",
            IntConstant { .. } => "int constant",
            LongConstant { .. } => "long constant",
            FloatConstant { .. } => "float constant",
            DoubleConstant { .. } => "double constant",
            StringConstant { .. } => "string constant",
            Assign { .. } => "assign",
            Binary { .. } => "binary",
            Negate { .. } => "negate",
            NumericCast { .. } | IntegerCast { .. } | Cast { .. } => "cast",
            IsInstance { .. } => "instanceOf",
            Branch { .. } | BinaryBranch { .. } => "if",
            Jump { .. } => "goto",
            Switch { .. } => "switch",
            Exit { .. } => "return",
            Raise { .. } => "throw",
            Construct { .. } => "new",
            ConstructArray { .. } => "newArray",
            GetField { .. } | PutField { .. } => "field",
            ArrayLength { .. } => "lengthOf",
            CloneArray { .. } => "clone",
            UnwrapArray { .. } => "data",
            GetElement { .. } | PutElement { .. } => "element",
            Invoke { kind, .. } => kind.keyword(),
            InitClass { .. } => "initClass",
            NullCheck { .. } => "nullCheck",
            MonitorEnter { .. } => "monitorEnter",
            MonitorExit { .. } => "monitorExit",
        }
    }
}

/// An instruction with its source location
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// What the instruction does
    pub kind: InstructionKind,
    /// Where it came from
    pub location: Option<TextLocation>,
}

impl Instruction {
    /// Instruction without location
    pub fn new(kind: InstructionKind) -> Self {
        Self { kind, location: None }
    }

    /// Instruction at `location`
    pub fn at(kind: InstructionKind, location: Option<TextLocation>) -> Self {
        Self { kind, location }
    }

    /// See [`InstructionKind::receiver`]
    pub fn receiver(&self) -> Option<VariableId> {
        self.kind.receiver()
    }

    /// See [`InstructionKind::uses`]
    pub fn uses(&self) -> Vec<VariableId> {
        self.kind.uses()
    }
}

impl From<InstructionKind> for Instruction {
    fn from(kind: InstructionKind) -> Self {
        Instruction::new(kind)
    }
}
