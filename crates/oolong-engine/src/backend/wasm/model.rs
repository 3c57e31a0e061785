//! In-memory WebAssembly module
//!
//! Function bodies are trees of [`WasmExpression`]. Functions, imports and globals are
//! referred to by name; the renderer turns names into indices. Branch targets are
//! [`LabelId`]s and their depth is resolved when the body is rendered.

use crate::ir::TextLocation;
use rustc_hash::FxHashMap;

// ===== Types =====

/// Value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum WasmType {
    I32,
    I64,
    F32,
    F64,
}

impl WasmType {
    /// Value type byte in the binary format
    pub fn code(self) -> u8 {
        match self {
            WasmType::I32 => 0x7F,
            WasmType::I64 => 0x7E,
            WasmType::F32 => 0x7D,
            WasmType::F64 => 0x7C,
        }
    }
}

/// Function type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WasmSignature {
    /// Parameter types
    pub params: Vec<WasmType>,
    /// Result type, `None` for no result
    pub result: Option<WasmType>,
}

impl WasmSignature {
    /// Signature from parts
    pub fn new(params: Vec<WasmType>, result: Option<WasmType>) -> Self {
        Self { params, result }
    }
}

/// Branch target, unique within one function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

// ===== Operators =====

/// Operand type of integer instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum IntType {
    I32,
    I64,
}

/// Operand type of float instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum FloatType {
    F32,
    F64,
}

/// Integer instructions with two operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum IntBinaryOp {
    Add,
    Sub,
    Mul,
    DivSigned,
    DivUnsigned,
    RemSigned,
    RemUnsigned,
    And,
    Or,
    Xor,
    Shl,
    ShrSigned,
    ShrUnsigned,
    Eq,
    Ne,
    LtSigned,
    LtUnsigned,
    GtSigned,
    GtUnsigned,
    LeSigned,
    LeUnsigned,
    GeSigned,
    GeUnsigned,
}

impl IntBinaryOp {
    /// Opcode for operands of type `ty`
    pub fn opcode(self, ty: IntType) -> u8 {
        use IntBinaryOp::*;
        let (compare_base, arith_base) = match ty {
            IntType::I32 => (0x46, 0x6A),
            IntType::I64 => (0x51, 0x7C),
        };
        match self {
            Eq => compare_base,
            Ne => compare_base + 1,
            LtSigned => compare_base + 2,
            LtUnsigned => compare_base + 3,
            GtSigned => compare_base + 4,
            GtUnsigned => compare_base + 5,
            LeSigned => compare_base + 6,
            LeUnsigned => compare_base + 7,
            GeSigned => compare_base + 8,
            GeUnsigned => compare_base + 9,
            Add => arith_base,
            Sub => arith_base + 1,
            Mul => arith_base + 2,
            DivSigned => arith_base + 3,
            DivUnsigned => arith_base + 4,
            RemSigned => arith_base + 5,
            RemUnsigned => arith_base + 6,
            And => arith_base + 7,
            Or => arith_base + 8,
            Xor => arith_base + 9,
            Shl => arith_base + 10,
            ShrSigned => arith_base + 11,
            ShrUnsigned => arith_base + 12,
        }
    }

    /// Whether the result is an `i32` truth value
    pub fn is_comparison(self) -> bool {
        use IntBinaryOp::*;
        matches!(
            self,
            Eq | Ne | LtSigned | LtUnsigned | GtSigned | GtUnsigned | LeSigned | LeUnsigned | GeSigned | GeUnsigned
        )
    }
}

/// Float instructions with two operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum FloatBinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl FloatBinaryOp {
    /// Opcode for operands of type `ty`
    pub fn opcode(self, ty: FloatType) -> u8 {
        use FloatBinaryOp::*;
        let (compare_base, arith_base) = match ty {
            FloatType::F32 => (0x5B, 0x92),
            FloatType::F64 => (0x61, 0xA0),
        };
        match self {
            Eq => compare_base,
            Ne => compare_base + 1,
            Lt => compare_base + 2,
            Gt => compare_base + 3,
            Le => compare_base + 4,
            Ge => compare_base + 5,
            Add => arith_base,
            Sub => arith_base + 1,
            Mul => arith_base + 2,
            Div => arith_base + 3,
            Min => arith_base + 4,
            Max => arith_base + 5,
        }
    }
}

/// Integer instructions with one operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum IntUnaryOp {
    Eqz,
    Clz,
    Ctz,
    Popcnt,
}

impl IntUnaryOp {
    /// Opcode for an operand of type `ty`
    pub fn opcode(self, ty: IntType) -> u8 {
        match (self, ty) {
            (IntUnaryOp::Eqz, IntType::I32) => 0x45,
            (IntUnaryOp::Eqz, IntType::I64) => 0x50,
            (IntUnaryOp::Clz, IntType::I32) => 0x67,
            (IntUnaryOp::Ctz, IntType::I32) => 0x68,
            (IntUnaryOp::Popcnt, IntType::I32) => 0x69,
            (IntUnaryOp::Clz, IntType::I64) => 0x79,
            (IntUnaryOp::Ctz, IntType::I64) => 0x7A,
            (IntUnaryOp::Popcnt, IntType::I64) => 0x7B,
        }
    }
}

/// Float instructions with one operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum FloatUnaryOp {
    Abs,
    Neg,
    Ceil,
    Floor,
    Trunc,
    Nearest,
    Sqrt,
}

impl FloatUnaryOp {
    /// Opcode for an operand of type `ty`
    pub fn opcode(self, ty: FloatType) -> u8 {
        let base = match ty {
            FloatType::F32 => 0x8B,
            FloatType::F64 => 0x99,
        };
        base + self as u8
    }
}

/// Numeric conversions. Float to integer conversions saturate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Conversion {
    I32WrapI64,
    I64ExtendI32,
    I32TruncSatF32,
    I32TruncSatF64,
    I64TruncSatF32,
    I64TruncSatF64,
    F32ConvertI32,
    F32ConvertI64,
    F64ConvertI32,
    F64ConvertI64,
    F32DemoteF64,
    F64PromoteF32,
    I32Extend8,
    I32Extend16,
}

impl Conversion {
    /// Optional `0xFC` prefix and the opcode
    pub fn encoding(self) -> (Option<u8>, u8) {
        use Conversion::*;
        match self {
            I32WrapI64 => (None, 0xA7),
            I64ExtendI32 => (None, 0xAC),
            F32ConvertI32 => (None, 0xB2),
            F32ConvertI64 => (None, 0xB4),
            F32DemoteF64 => (None, 0xB6),
            F64ConvertI32 => (None, 0xB7),
            F64ConvertI64 => (None, 0xB9),
            F64PromoteF32 => (None, 0xBB),
            I32Extend8 => (None, 0xC0),
            I32Extend16 => (None, 0xC1),
            I32TruncSatF32 => (Some(0xFC), 0x00),
            I32TruncSatF64 => (Some(0xFC), 0x02),
            I64TruncSatF32 => (Some(0xFC), 0x04),
            I64TruncSatF64 => (Some(0xFC), 0x06),
        }
    }
}

/// Width and signedness of a memory access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    /// Signed byte
    Int8,
    /// Unsigned byte
    Uint8,
    /// Signed 16-bit
    Int16,
    /// Unsigned 16-bit
    Uint16,
    /// 32-bit integer
    Int32,
    /// 64-bit integer
    Int64,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
}

impl MemoryType {
    /// Load opcode, extending narrow values to `i32`
    pub fn load_opcode(self) -> u8 {
        match self {
            MemoryType::Int32 => 0x28,
            MemoryType::Int64 => 0x29,
            MemoryType::Float32 => 0x2A,
            MemoryType::Float64 => 0x2B,
            MemoryType::Int8 => 0x2C,
            MemoryType::Uint8 => 0x2D,
            MemoryType::Int16 => 0x2E,
            MemoryType::Uint16 => 0x2F,
        }
    }

    /// Store opcode, truncating to the access width
    pub fn store_opcode(self) -> u8 {
        match self {
            MemoryType::Int32 => 0x36,
            MemoryType::Int64 => 0x37,
            MemoryType::Float32 => 0x38,
            MemoryType::Float64 => 0x39,
            MemoryType::Int8 | MemoryType::Uint8 => 0x3A,
            MemoryType::Int16 | MemoryType::Uint16 => 0x3B,
        }
    }

    /// log2 of the natural alignment
    pub fn alignment(self) -> u32 {
        match self {
            MemoryType::Int8 | MemoryType::Uint8 => 0,
            MemoryType::Int16 | MemoryType::Uint16 => 1,
            MemoryType::Int32 | MemoryType::Float32 => 2,
            MemoryType::Int64 | MemoryType::Float64 => 3,
        }
    }
}

// ===== Expressions =====

/// Instruction tree; operands are nested rather than pushed
#[derive(Debug, Clone, PartialEq)]
pub enum WasmExpression {
    /// `i32.const`
    I32Const(i32),
    /// `i64.const`
    I64Const(i64),
    /// `f32.const`
    F32Const(f32),
    /// `f64.const`
    F64Const(f64),
    /// Read a local
    GetLocal(u32),
    /// Write a local
    SetLocal(u32, Box<WasmExpression>),
    /// Write a local and keep the value
    TeeLocal(u32, Box<WasmExpression>),
    /// Read a global by name
    GetGlobal(String),
    /// Write a global by name
    SetGlobal(String, Box<WasmExpression>),
    /// Integer operation on two operands
    IntBinary {
        op: IntBinaryOp,
        ty: IntType,
        first: Box<WasmExpression>,
        second: Box<WasmExpression>,
    },
    /// Float operation on two operands
    FloatBinary {
        op: FloatBinaryOp,
        ty: FloatType,
        first: Box<WasmExpression>,
        second: Box<WasmExpression>,
    },
    /// Integer operation on one operand
    IntUnary {
        op: IntUnaryOp,
        ty: IntType,
        operand: Box<WasmExpression>,
    },
    /// Float operation on one operand
    FloatUnary {
        op: FloatUnaryOp,
        ty: FloatType,
        operand: Box<WasmExpression>,
    },
    /// Numeric conversion
    Convert {
        conversion: Conversion,
        operand: Box<WasmExpression>,
    },
    /// Memory read at `address + offset`
    Load {
        memory: MemoryType,
        offset: u32,
        address: Box<WasmExpression>,
    },
    /// Memory write at `address + offset`
    Store {
        memory: MemoryType,
        offset: u32,
        address: Box<WasmExpression>,
        value: Box<WasmExpression>,
    },
    /// Call by function name
    Call {
        function: String,
        arguments: Vec<WasmExpression>,
    },
    /// Call through table entry `index`, typed by interned signature `type_index`
    CallIndirect {
        type_index: u32,
        index: Box<WasmExpression>,
        arguments: Vec<WasmExpression>,
    },
    /// `block`, or `loop` when `is_loop` is set
    Block {
        label: LabelId,
        is_loop: bool,
        result: Option<WasmType>,
        body: Vec<WasmExpression>,
    },
    /// `br`, or `br_if` with a condition
    Branch {
        target: LabelId,
        condition: Option<Box<WasmExpression>>,
    },
    /// `br_table`: `targets[selector]`, or `default` when out of range
    Switch {
        selector: Box<WasmExpression>,
        targets: Vec<LabelId>,
        default: LabelId,
    },
    /// `if` with optional `else`
    Conditional {
        condition: Box<WasmExpression>,
        result: Option<WasmType>,
        then_branch: Vec<WasmExpression>,
        else_branch: Vec<WasmExpression>,
    },
    /// Return from the function
    Return(Option<Box<WasmExpression>>),
    /// Evaluate and discard
    Drop(Box<WasmExpression>),
    /// Trap
    Unreachable,
    /// Code attributed to a source line
    Located(TextLocation, Box<WasmExpression>),
    /// Simultaneous `local[target] = local[source]` for every pair, staged on the
    /// operand stack
    ParallelCopy(Vec<(u32, u32)>),
}

impl WasmExpression {
    /// Read a local
    pub fn get_local(index: u32) -> Self {
        WasmExpression::GetLocal(index)
    }

    /// Write a local
    pub fn set_local(index: u32, value: WasmExpression) -> Self {
        WasmExpression::SetLocal(index, Box::new(value))
    }

    /// `i32` operation on two operands
    pub fn int(op: IntBinaryOp, first: WasmExpression, second: WasmExpression) -> Self {
        WasmExpression::IntBinary {
            op,
            ty: IntType::I32,
            first: Box::new(first),
            second: Box::new(second),
        }
    }

    /// Memory read
    pub fn load(memory: MemoryType, offset: u32, address: WasmExpression) -> Self {
        WasmExpression::Load {
            memory,
            offset,
            address: Box::new(address),
        }
    }

    /// Memory write
    pub fn store(memory: MemoryType, offset: u32, address: WasmExpression, value: WasmExpression) -> Self {
        WasmExpression::Store {
            memory,
            offset,
            address: Box::new(address),
            value: Box::new(value),
        }
    }

    /// Call by function name
    pub fn call(function: impl Into<String>, arguments: Vec<WasmExpression>) -> Self {
        WasmExpression::Call {
            function: function.into(),
            arguments,
        }
    }

    /// Unconditional branch
    pub fn branch(target: LabelId) -> Self {
        WasmExpression::Branch { target, condition: None }
    }

    /// Branch when `condition` is not zero
    pub fn branch_if(target: LabelId, condition: WasmExpression) -> Self {
        WasmExpression::Branch {
            target,
            condition: Some(Box::new(condition)),
        }
    }

    /// Plain block without result
    pub fn block(label: LabelId, body: Vec<WasmExpression>) -> Self {
        WasmExpression::Block {
            label,
            is_loop: false,
            result: None,
            body,
        }
    }

    /// `if` without `else` or result
    pub fn when(condition: WasmExpression, then_branch: Vec<WasmExpression>) -> Self {
        WasmExpression::Conditional {
            condition: Box::new(condition),
            result: None,
            then_branch,
            else_branch: Vec::new(),
        }
    }
}

// ===== Module =====

/// A defined function
#[derive(Debug, Clone, PartialEq)]
pub struct WasmFunction {
    /// Name calls and the table refer to
    pub name: String,
    /// Parameter types
    pub params: Vec<WasmType>,
    /// Result type
    pub result: Option<WasmType>,
    /// Locals after the parameters
    pub locals: Vec<WasmType>,
    /// Instructions
    pub body: Vec<WasmExpression>,
    /// Export name, if exported
    pub export_name: Option<String>,
    /// Method the function was generated from, for source maps
    pub method: Option<String>,
}

impl WasmFunction {
    /// Function with no locals and an empty body
    pub fn new(name: impl Into<String>, params: Vec<WasmType>, result: Option<WasmType>) -> Self {
        Self {
            name: name.into(),
            params,
            result,
            locals: Vec::new(),
            body: Vec::new(),
            export_name: None,
            method: None,
        }
    }

    /// Type of the function
    pub fn signature(&self) -> WasmSignature {
        WasmSignature::new(self.params.clone(), self.result)
    }

    /// Allocate a local, returning its index
    pub fn add_local(&mut self, ty: WasmType) -> u32 {
        self.locals.push(ty);
        (self.params.len() + self.locals.len() - 1) as u32
    }
}

/// An imported function
#[derive(Debug, Clone, PartialEq)]
pub struct WasmImport {
    /// Name calls refer to
    pub name: String,
    /// Import module name
    pub module: String,
    /// Import field name
    pub field: String,
    /// Type of the function
    pub signature: WasmSignature,
}

/// A global variable
#[derive(Debug, Clone, PartialEq)]
pub struct WasmGlobal {
    /// Name instructions refer to
    pub name: String,
    /// Value type
    pub ty: WasmType,
    /// Whether it can be written
    pub mutable: bool,
    /// Constant initializer
    pub initial: WasmExpression,
}

/// Bytes copied into memory at instantiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WasmDataSegment {
    /// Start address
    pub offset: u32,
    /// Contents
    pub data: Vec<u8>,
}

/// Everything rendered into one module binary
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WasmModule {
    types: Vec<WasmSignature>,
    type_index: FxHashMap<WasmSignature, u32>,
    /// Imported functions, in index order
    pub imports: Vec<WasmImport>,
    /// Defined functions, in index order after the imports
    pub functions: Vec<WasmFunction>,
    /// Function table contents by function name
    pub table: Vec<String>,
    /// Globals, in index order
    pub globals: Vec<WasmGlobal>,
    /// Initial memory size in 64 KiB pages
    pub memory_pages: u32,
    /// Export the memory as `memory`
    pub export_memory: bool,
    /// Initial memory contents
    pub data: Vec<WasmDataSegment>,
}

impl WasmModule {
    /// Empty module
    pub fn new(memory_pages: u32, export_memory: bool) -> Self {
        Self {
            memory_pages,
            export_memory,
            ..Self::default()
        }
    }

    /// Index of `signature` in the type section, adding it on first use
    pub fn intern(&mut self, signature: &WasmSignature) -> u32 {
        if let Some(&index) = self.type_index.get(signature) {
            return index;
        }
        let index = self.types.len() as u32;
        self.types.push(signature.clone());
        self.type_index.insert(signature.clone(), index);
        index
    }

    /// Interned signatures, in type index order
    pub fn types(&self) -> &[WasmSignature] {
        &self.types
    }

    /// Type index of an interned signature
    pub fn type_of(&self, signature: &WasmSignature) -> Option<u32> {
        self.type_index.get(signature).copied()
    }

    /// Add an import, interning its type
    pub fn add_import(&mut self, import: WasmImport) {
        self.intern(&import.signature);
        self.imports.push(import);
    }

    /// Add a function, interning its type
    pub fn add_function(&mut self, function: WasmFunction) {
        self.intern(&function.signature());
        self.functions.push(function);
    }

    /// Add a mutable global
    pub fn add_global(&mut self, name: impl Into<String>, ty: WasmType, initial: WasmExpression) {
        self.globals.push(WasmGlobal {
            name: name.into(),
            ty,
            mutable: true,
            initial,
        });
    }

    /// Function index space: imports first, then defined functions
    pub fn function_indices(&self) -> FxHashMap<&str, u32> {
        self.imports
            .iter()
            .map(|import| import.name.as_str())
            .chain(self.functions.iter().map(|function| function.name.as_str()))
            .enumerate()
            .map(|(index, name)| (name, index as u32))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcodes() {
        assert_eq!(IntBinaryOp::Add.opcode(IntType::I32), 0x6A);
        assert_eq!(IntBinaryOp::ShrUnsigned.opcode(IntType::I32), 0x76);
        assert_eq!(IntBinaryOp::GeUnsigned.opcode(IntType::I64), 0x5A);
        assert_eq!(IntBinaryOp::RemSigned.opcode(IntType::I64), 0x81);
        assert_eq!(FloatBinaryOp::Max.opcode(FloatType::F64), 0xA5);
        assert_eq!(FloatBinaryOp::Lt.opcode(FloatType::F32), 0x5D);
        assert_eq!(FloatUnaryOp::Neg.opcode(FloatType::F64), 0x9A);
        assert_eq!(FloatUnaryOp::Sqrt.opcode(FloatType::F32), 0x91);
        assert_eq!(Conversion::I64TruncSatF64.encoding(), (Some(0xFC), 0x06));
        assert!(IntBinaryOp::LtSigned.is_comparison());
        assert!(!IntBinaryOp::Xor.is_comparison());
    }

    #[test]
    fn test_signatures_are_interned() {
        let mut module = WasmModule::new(1, false);
        let a = module.intern(&WasmSignature::new(vec![WasmType::I32], None));
        let b = module.intern(&WasmSignature::new(vec![WasmType::I64], Some(WasmType::I32)));
        let c = module.intern(&WasmSignature::new(vec![WasmType::I32], None));
        assert_eq!((a, b, c), (0, 1, 0));
        module.add_function(WasmFunction::new("f", vec![WasmType::I32], None));
        assert_eq!(module.types().len(), 2);
    }

    #[test]
    fn test_function_indices_follow_imports() {
        let mut module = WasmModule::new(1, false);
        module.add_function(WasmFunction::new("main", Vec::new(), None));
        module.add_import(WasmImport {
            name: "alloc".into(),
            module: "oolong".into(),
            field: "allocate".into(),
            signature: WasmSignature::new(vec![WasmType::I32], Some(WasmType::I32)),
        });
        let indices = module.function_indices();
        assert_eq!(indices["alloc"], 0);
        assert_eq!(indices["main"], 1);
    }

    #[test]
    fn test_locals_follow_params() {
        let mut function = WasmFunction::new("f", vec![WasmType::I32, WasmType::I64], None);
        assert_eq!(function.add_local(WasmType::F64), 2);
        assert_eq!(function.add_local(WasmType::I32), 3);
    }
}
