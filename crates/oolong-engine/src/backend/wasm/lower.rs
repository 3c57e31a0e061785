//! Method body lowering
//!
//! Blocks are laid out in order inside a dispatch loop. Block `i` starts right after
//! the end of the `i`-th nested `block`, so a forward jump is a `br` to the target's
//! block and a backward jump stores the target position in the block pointer and
//! restarts the loop, whose `br_table` enters the right block:
//!
//! ```text
//! loop $dispatch
//!   block $b2
//!     block $b1
//!       block $b0
//!         br_table $b0 $b1 $b2 (local $p)
//!       end
//!       ;; block 0
//!     end
//!     ;; block 1
//!   end
//!   ;; block 2
//! end
//! ```
//!
//! A pending exception lives in a global. Every call is followed by a check that runs
//! the handlers of the current block, or returns a default value to propagate it.

use super::layout::{
    array_data_offset, element_access, memory_type, value_width, ARRAY_LENGTH_OFFSET, CLASS_OFFSET,
    CLASS_VTABLE_OFFSET,
};
use super::model::{
    Conversion, FloatBinaryOp, FloatType, FloatUnaryOp, IntBinaryOp, IntType, IntUnaryOp, LabelId, MemoryType,
    WasmExpression, WasmFunction, WasmSignature, WasmType,
};
use super::{
    function_name, initializer_name, WasmGenerator, EXCEPTION_GLOBAL, IMPORT_ALLOCATE, IMPORT_ALLOCATE_ARRAY,
    IMPORT_CLONE_ARRAY, IMPORT_FMOD, IMPORT_FMODF, IMPORT_STRING,
};
use crate::backend::common::IntrinsicCall;
use crate::error::CodegenError;
use crate::ir::{
    infer, BinaryBranchCondition, BinaryOp, BlockId, BranchCondition, FieldReference, Instruction, InstructionKind,
    IntegerSubtype, InvocationKind, MethodReference, NumericType, Program, ValueType, VariableId, VariableType,
    VariableTypes,
};
use std::mem;

/// Representation of a variable category
pub fn wasm_type(ty: VariableType) -> WasmType {
    match ty {
        VariableType::Int | VariableType::Object => WasmType::I32,
        VariableType::Long => WasmType::I64,
        VariableType::Float => WasmType::F32,
        VariableType::Double => WasmType::F64,
    }
}

/// Representation of a declared type, `None` for void
pub fn value_wasm_type(ty: &ValueType) -> Option<WasmType> {
    VariableType::of(ty).map(wasm_type)
}

/// Zero of `ty`
pub fn zero(ty: WasmType) -> WasmExpression {
    match ty {
        WasmType::I32 => WasmExpression::I32Const(0),
        WasmType::I64 => WasmExpression::I64Const(0),
        WasmType::F32 => WasmExpression::F32Const(0.0),
        WasmType::F64 => WasmExpression::F64Const(0.0),
    }
}

/// Function signature of `method`, with the receiver first for instance methods
pub fn method_signature(method: &MethodReference, is_static: bool) -> WasmSignature {
    let mut params = Vec::with_capacity(method.descriptor.parameter_count() + 1);
    if !is_static {
        params.push(WasmType::I32);
    }
    params.extend(method.descriptor.parameters.iter().filter_map(value_wasm_type));
    WasmSignature::new(params, value_wasm_type(&method.descriptor.result))
}

/// State of one function being built; also the interface intrinsics write through
pub struct WasmMethodContext<'g, 'a> {
    generator: &'g mut WasmGenerator<'a>,
    method: &'g MethodReference,
    program: &'a Program,
    types: VariableTypes,
    function: WasmFunction,
    locals: Vec<u32>,
    order: Vec<BlockId>,
    positions: Vec<Option<usize>>,
    exits: Vec<LabelId>,
    dispatch: Option<(LabelId, u32)>,
    next_label: u32,
    body: Vec<WasmExpression>,
}

impl<'g, 'a> WasmMethodContext<'g, 'a> {
    pub(super) fn new(
        generator: &'g mut WasmGenerator<'a>,
        method: &'g MethodReference,
        is_static: bool,
        program: &'a Program,
    ) -> Self {
        let types = infer(program, !is_static, &method.descriptor.parameters);
        let signature = method_signature(method, is_static);
        let mut function = WasmFunction::new(function_name(method), signature.params, signature.result);
        function.method = Some(method.to_string());

        let first_param = if is_static { 1 } else { 0 };
        let last_param = method.descriptor.parameter_count() as u32;
        let locals = (0..program.variable_count() as u32)
            .map(|v| {
                if v >= first_param && v <= last_param {
                    v - first_param
                } else {
                    function.add_local(wasm_type(types.get_or_int(VariableId::new(v))))
                }
            })
            .collect();

        let reachable = program.reachable_blocks();
        let order: Vec<BlockId> = program
            .blocks()
            .iter()
            .filter(|block| reachable[block.id.index()])
            .map(|block| block.id)
            .collect();
        let mut positions = vec![None; program.block_count()];
        for (position, block) in order.iter().enumerate() {
            positions[block.index()] = Some(position);
        }

        Self {
            generator,
            method,
            program,
            types,
            function,
            locals,
            order,
            positions,
            exits: Vec::new(),
            dispatch: None,
            next_label: 0,
            body: Vec::new(),
        }
    }

    // ===== Intrinsic interface =====

    /// Method being lowered
    pub fn method(&self) -> &MethodReference {
        self.method
    }

    /// Local index of a variable
    pub fn local(&self, variable: VariableId) -> u32 {
        self.locals[variable.index()]
    }

    /// Read a variable
    pub fn get(&self, variable: VariableId) -> WasmExpression {
        WasmExpression::GetLocal(self.local(variable))
    }

    /// Fresh local, never shared with a variable
    pub fn temp(&mut self, ty: WasmType) -> u32 {
        self.function.add_local(ty)
    }

    /// Fresh label, unique within the function
    pub fn label(&mut self) -> LabelId {
        let label = LabelId(self.next_label);
        self.next_label += 1;
        label
    }

    /// Append an instruction to the function body
    pub fn emit(&mut self, expression: WasmExpression) {
        self.body.push(expression);
    }

    /// Store `value` into a variable
    pub fn assign(&mut self, variable: VariableId, value: WasmExpression) {
        let local = self.local(variable);
        self.emit(WasmExpression::set_local(local, value));
    }

    /// Address of the class struct of `ty`
    pub fn class_address(&mut self, ty: &ValueType) -> u32 {
        self.generator.layout.class_address(ty)
    }

    /// Whether analysis reached `method`
    pub fn is_reachable(&self, method: &MethodReference) -> bool {
        self.generator.input.is_reachable(method)
    }

    // ===== Structure =====

    pub(super) fn lower(mut self) -> Result<WasmFunction, CodegenError> {
        let has_handlers = self.program.blocks().iter().any(|block| !block.try_catches.is_empty());
        let straight = self.order.len() == 1 && self.program.block(self.order[0]).successors().is_empty();
        if straight && !has_handlers {
            let code = self.lower_block(self.order[0])?;
            self.function.body = code;
        } else if !self.order.is_empty() {
            let pointer = self.temp(WasmType::I32);
            let dispatch = self.label();
            self.dispatch = Some((dispatch, pointer));
            let exits = (0..self.order.len()).map(|_| self.label()).collect();
            self.exits = exits;

            let mut nested = vec![WasmExpression::Switch {
                selector: Box::new(WasmExpression::get_local(pointer)),
                targets: self.exits.clone(),
                default: self.exits[0],
            }];
            for position in 0..self.order.len() {
                let code = self.lower_block(self.order[position])?;
                nested = vec![WasmExpression::block(self.exits[position], nested)];
                nested.extend(code);
            }
            self.function.body = vec![WasmExpression::Block {
                label: dispatch,
                is_loop: true,
                result: None,
                body: nested,
            }];
        }
        self.function.body.push(WasmExpression::Unreachable);
        Ok(self.function)
    }

    fn lower_block(&mut self, id: BlockId) -> Result<Vec<WasmExpression>, CodegenError> {
        let saved = mem::take(&mut self.body);
        let block = self.program.block(id);
        for instruction in &block.instructions {
            let start = self.body.len();
            self.lower_instruction(id, instruction)?;
            if let Some(location) = &instruction.location {
                for statement in &mut self.body[start..] {
                    let inner = mem::replace(statement, WasmExpression::Unreachable);
                    *statement = WasmExpression::Located(location.clone(), Box::new(inner));
                }
            }
        }
        Ok(mem::replace(&mut self.body, saved))
    }

    /// Statements written by `f`, collected apart from the current body
    fn nested(&mut self, f: impl FnOnce(&mut Self) -> Result<(), CodegenError>) -> Result<Vec<WasmExpression>, CodegenError> {
        let saved = mem::take(&mut self.body);
        let result = f(self);
        let nested = mem::replace(&mut self.body, saved);
        result.map(|()| nested)
    }

    fn goto(&mut self, from: BlockId, to: BlockId) {
        let copies: Vec<(u32, u32)> = self
            .program
            .block(to)
            .phis
            .iter()
            .filter_map(|phi| phi.incoming_from(from).map(|value| (self.local(phi.receiver), self.local(value))))
            .filter(|(target, source)| target != source)
            .collect();
        if !copies.is_empty() {
            self.emit(WasmExpression::ParallelCopy(copies));
        }
        let (Some(source), Some(target)) = (self.positions[from.index()], self.positions[to.index()]) else {
            self.emit(WasmExpression::Unreachable);
            return;
        };
        match self.dispatch {
            Some(_) if target > source => self.emit(WasmExpression::branch(self.exits[target])),
            Some((dispatch, pointer)) => {
                self.emit(WasmExpression::set_local(pointer, WasmExpression::I32Const(target as i32)));
                self.emit(WasmExpression::branch(dispatch));
            }
            None => self.emit(WasmExpression::Unreachable),
        }
    }

    fn default_return(&self) -> WasmExpression {
        WasmExpression::Return(self.function.result.map(|ty| Box::new(zero(ty))))
    }

    /// Route the pending exception to a handler of `block`, or propagate it
    fn handle_exception(&mut self, block: BlockId) -> Result<(), CodegenError> {
        let block = self.program.block(block);
        for try_catch in &block.try_catches {
            let handler = try_catch.handler;
            let action = self.nested(|context| {
                if let Some(variable) = context.program.block(handler).exception_variable {
                    context.assign(variable, WasmExpression::GetGlobal(EXCEPTION_GLOBAL.into()));
                }
                context.emit(WasmExpression::SetGlobal(
                    EXCEPTION_GLOBAL.into(),
                    Box::new(WasmExpression::I32Const(0)),
                ));
                context.goto(block.id, handler);
                Ok(())
            })?;
            match &try_catch.exception_type {
                None => {
                    self.body.extend(action);
                    return Ok(());
                }
                Some(class) => {
                    let check = self.instance_check(
                        WasmExpression::GetGlobal(EXCEPTION_GLOBAL.into()),
                        &ValueType::object(class.as_str()),
                    );
                    self.emit(WasmExpression::when(check, action));
                }
            }
        }
        let ret = self.default_return();
        self.emit(ret);
        Ok(())
    }

    fn check_exception(&mut self, block: BlockId) -> Result<(), CodegenError> {
        let handlers = self.nested(|context| context.handle_exception(block))?;
        self.emit(WasmExpression::when(WasmExpression::GetGlobal(EXCEPTION_GLOBAL.into()), handlers));
        Ok(())
    }

    /// Non-zero when the non-null object `value` is an instance of `target`
    fn instance_check(&mut self, value: WasmExpression, target: &ValueType) -> WasmExpression {
        self.generator.instance_check(value, target)
    }

    // ===== Instructions =====

    fn unsupported(&self, what: impl Into<String>) -> CodegenError {
        CodegenError::Unsupported {
            method: self.method.clone(),
            what: what.into(),
        }
    }

    fn lower_instruction(&mut self, block: BlockId, instruction: &Instruction) -> Result<(), CodegenError> {
        use InstructionKind::*;
        match &instruction.kind {
            Nop | MonitorEnter { .. } | MonitorExit { .. } => {}
            ClassConstant { receiver, value } => {
                let address = self.class_address(value);
                self.assign(*receiver, WasmExpression::I32Const(address as i32));
            }
            NullConstant { receiver } => self.assign(*receiver, WasmExpression::I32Const(0)),
            IntConstant { receiver, value } => self.assign(*receiver, WasmExpression::I32Const(*value)),
            LongConstant { receiver, value } => self.assign(*receiver, WasmExpression::I64Const(*value)),
            FloatConstant { receiver, value } => self.assign(*receiver, WasmExpression::F32Const(*value)),
            DoubleConstant { receiver, value } => self.assign(*receiver, WasmExpression::F64Const(*value)),
            StringConstant { receiver, value } => {
                let index = self.generator.string_constant(value);
                let call = WasmExpression::call(IMPORT_STRING, vec![WasmExpression::I32Const(index as i32)]);
                self.assign(*receiver, call);
            }
            Assign { receiver, assignee } => {
                let value = self.get(*assignee);
                self.assign(*receiver, value);
            }
            Binary {
                receiver,
                op,
                operand_type,
                first,
                second,
            } => {
                let value = self.binary(*op, *operand_type, *first, *second)?;
                self.assign(*receiver, value);
            }
            Negate {
                receiver,
                operand_type,
                operand,
            } => {
                let operand = Box::new(self.get(*operand));
                let value = match operand_type {
                    NumericType::Int => WasmExpression::IntBinary {
                        op: IntBinaryOp::Sub,
                        ty: IntType::I32,
                        first: Box::new(WasmExpression::I32Const(0)),
                        second: operand,
                    },
                    NumericType::Long => WasmExpression::IntBinary {
                        op: IntBinaryOp::Sub,
                        ty: IntType::I64,
                        first: Box::new(WasmExpression::I64Const(0)),
                        second: operand,
                    },
                    NumericType::Float | NumericType::Double => WasmExpression::FloatUnary {
                        op: FloatUnaryOp::Neg,
                        ty: float_type(*operand_type),
                        operand,
                    },
                };
                self.assign(*receiver, value);
            }
            NumericCast { receiver, value, from, to } => {
                let operand = self.get(*value);
                let converted = match numeric_conversion(*from, *to) {
                    Some(conversion) => WasmExpression::Convert {
                        conversion,
                        operand: Box::new(operand),
                    },
                    None => operand,
                };
                self.assign(*receiver, converted);
            }
            IntegerCast { receiver, value, target } => {
                let operand = Box::new(self.get(*value));
                let converted = match target {
                    IntegerSubtype::Byte => WasmExpression::Convert {
                        conversion: Conversion::I32Extend8,
                        operand,
                    },
                    IntegerSubtype::Short => WasmExpression::Convert {
                        conversion: Conversion::I32Extend16,
                        operand,
                    },
                    IntegerSubtype::Char => WasmExpression::int(IntBinaryOp::And, *operand, WasmExpression::I32Const(0xFFFF)),
                };
                self.assign(*receiver, converted);
            }
            // Unchecked: the analysis already filtered the types flowing through
            Cast { receiver, value, .. } => {
                let value = self.get(*value);
                self.assign(*receiver, value);
            }
            IsInstance { receiver, value, target } => {
                let check = self.instance_check(self.get(*value), target);
                let result = WasmExpression::Conditional {
                    condition: Box::new(self.get(*value)),
                    result: Some(WasmType::I32),
                    then_branch: vec![check],
                    else_branch: vec![WasmExpression::I32Const(0)],
                };
                self.assign(*receiver, result);
            }
            Branch {
                condition,
                operand,
                consequent,
                alternative,
            } => {
                let test = self.branch_condition(*condition, *operand);
                let taken = self.nested(|context| {
                    context.goto(block, *consequent);
                    Ok(())
                })?;
                self.emit(WasmExpression::when(test, taken));
                self.goto(block, *alternative);
            }
            BinaryBranch {
                condition,
                first,
                second,
                consequent,
                alternative,
            } => {
                let ty = if self.types.get(*first) == Some(VariableType::Long) {
                    IntType::I64
                } else {
                    IntType::I32
                };
                let op = match condition {
                    BinaryBranchCondition::Equal | BinaryBranchCondition::ReferenceEqual => IntBinaryOp::Eq,
                    BinaryBranchCondition::NotEqual | BinaryBranchCondition::ReferenceNotEqual => IntBinaryOp::Ne,
                };
                let test = WasmExpression::IntBinary {
                    op,
                    ty,
                    first: Box::new(self.get(*first)),
                    second: Box::new(self.get(*second)),
                };
                let taken = self.nested(|context| {
                    context.goto(block, *consequent);
                    Ok(())
                })?;
                self.emit(WasmExpression::when(test, taken));
                self.goto(block, *alternative);
            }
            Jump { target } => self.goto(block, *target),
            Switch {
                condition,
                entries,
                default,
            } => {
                for entry in entries {
                    let test = WasmExpression::int(
                        IntBinaryOp::Eq,
                        self.get(*condition),
                        WasmExpression::I32Const(entry.condition),
                    );
                    let taken = self.nested(|context| {
                        context.goto(block, entry.target);
                        Ok(())
                    })?;
                    self.emit(WasmExpression::when(test, taken));
                }
                self.goto(block, *default);
            }
            Exit { value } => {
                let value = value.map(|value| Box::new(self.get(value)));
                self.emit(WasmExpression::Return(value));
            }
            Raise { exception } => {
                let exception = self.get(*exception);
                self.emit(WasmExpression::SetGlobal(EXCEPTION_GLOBAL.into(), Box::new(exception)));
                self.handle_exception(block)?;
            }
            Construct { receiver, class } => {
                let address = self.class_address(&ValueType::object(class.as_str()));
                let size = self.generator.layout.instance_size(class);
                let call = WasmExpression::call(
                    IMPORT_ALLOCATE,
                    vec![WasmExpression::I32Const(address as i32), WasmExpression::I32Const(size as i32)],
                );
                self.assign(*receiver, call);
            }
            ConstructArray {
                receiver,
                item_type,
                size,
            } => {
                let address = self.class_address(&ValueType::array(item_type.clone()));
                let call = WasmExpression::call(
                    IMPORT_ALLOCATE_ARRAY,
                    vec![
                        WasmExpression::I32Const(address as i32),
                        WasmExpression::I32Const(value_width(item_type) as i32),
                        self.get(*size),
                    ],
                );
                self.assign(*receiver, call);
            }
            GetField {
                receiver,
                instance,
                field,
                field_type,
            } => {
                let (address, offset) = self.field_address(*instance, field)?;
                self.assign(*receiver, WasmExpression::load(memory_type(field_type), offset, address));
            }
            PutField {
                instance,
                field,
                value,
                field_type,
            } => {
                let (address, offset) = self.field_address(*instance, field)?;
                let value = self.get(*value);
                self.emit(WasmExpression::store(memory_type(field_type), offset, address, value));
            }
            ArrayLength { receiver, array } => {
                let length = WasmExpression::load(MemoryType::Int32, ARRAY_LENGTH_OFFSET, self.get(*array));
                self.assign(*receiver, length);
            }
            CloneArray { receiver, array } => {
                let call = WasmExpression::call(IMPORT_CLONE_ARRAY, vec![self.get(*array)]);
                self.assign(*receiver, call);
            }
            UnwrapArray { receiver, array, .. } => {
                let value = self.get(*array);
                self.assign(*receiver, value);
            }
            GetElement {
                receiver,
                array,
                index,
                element_type,
            } => {
                let (memory, shift) = element_access(*element_type);
                let address = self.element_address(*array, *index, shift);
                self.assign(*receiver, WasmExpression::load(memory, array_data_offset(1 << shift), address));
            }
            PutElement {
                array,
                index,
                value,
                element_type,
            } => {
                let (memory, shift) = element_access(*element_type);
                let address = self.element_address(*array, *index, shift);
                let value = self.get(*value);
                self.emit(WasmExpression::store(memory, array_data_offset(1 << shift), address, value));
            }
            Invoke {
                receiver,
                instance,
                method,
                arguments,
                kind,
            } => {
                let call = IntrinsicCall {
                    method,
                    receiver: *receiver,
                    instance: *instance,
                    arguments,
                    location: instruction.location.as_ref(),
                };
                if let Some(generator) = self.generator.intrinsics.find(method).copied() {
                    return generator(self, &call);
                }
                self.invoke(&call, *kind)?;
                self.check_exception(block)?;
            }
            InitClass { class } => {
                if self.generator.input.needs_initialization(class) {
                    self.emit(WasmExpression::call(initializer_name(class), Vec::new()));
                    self.check_exception(block)?;
                }
            }
            NullCheck { receiver, value } => {
                let test = WasmExpression::IntUnary {
                    op: IntUnaryOp::Eqz,
                    ty: IntType::I32,
                    operand: Box::new(self.get(*value)),
                };
                self.emit(WasmExpression::when(test, vec![WasmExpression::Unreachable]));
                let value = self.get(*value);
                self.assign(*receiver, value);
            }
        }
        Ok(())
    }

    fn binary(
        &self,
        op: BinaryOp,
        ty: NumericType,
        first: VariableId,
        second: VariableId,
    ) -> Result<WasmExpression, CodegenError> {
        let a = Box::new(self.get(first));
        let mut b = Box::new(self.get(second));
        match ty {
            NumericType::Int | NumericType::Long => {
                let int_type = if ty == NumericType::Int { IntType::I32 } else { IntType::I64 };
                if op == BinaryOp::Compare {
                    return Ok(compare(
                        WasmExpression::IntBinary {
                            op: IntBinaryOp::GtSigned,
                            ty: int_type,
                            first: a.clone(),
                            second: b.clone(),
                        },
                        WasmExpression::IntBinary {
                            op: IntBinaryOp::LtSigned,
                            ty: int_type,
                            first: a,
                            second: b,
                        },
                    ));
                }
                let is_shift = matches!(
                    op,
                    BinaryOp::ShiftLeft | BinaryOp::ShiftRight | BinaryOp::ShiftRightUnsigned
                );
                if int_type == IntType::I64 && is_shift && self.types.get(second) != Some(VariableType::Long) {
                    b = Box::new(WasmExpression::Convert {
                        conversion: Conversion::I64ExtendI32,
                        operand: b,
                    });
                }
                let op = match op {
                    BinaryOp::Add => IntBinaryOp::Add,
                    BinaryOp::Subtract => IntBinaryOp::Sub,
                    BinaryOp::Multiply => IntBinaryOp::Mul,
                    BinaryOp::Divide => IntBinaryOp::DivSigned,
                    BinaryOp::Modulo => IntBinaryOp::RemSigned,
                    BinaryOp::And => IntBinaryOp::And,
                    BinaryOp::Or => IntBinaryOp::Or,
                    BinaryOp::Xor => IntBinaryOp::Xor,
                    BinaryOp::ShiftLeft => IntBinaryOp::Shl,
                    BinaryOp::ShiftRight => IntBinaryOp::ShrSigned,
                    BinaryOp::ShiftRightUnsigned => IntBinaryOp::ShrUnsigned,
                    BinaryOp::Compare => IntBinaryOp::Sub,
                };
                Ok(WasmExpression::IntBinary {
                    op,
                    ty: int_type,
                    first: a,
                    second: b,
                })
            }
            NumericType::Float | NumericType::Double => {
                let float = float_type(ty);
                let op = match op {
                    BinaryOp::Add => FloatBinaryOp::Add,
                    BinaryOp::Subtract => FloatBinaryOp::Sub,
                    BinaryOp::Multiply => FloatBinaryOp::Mul,
                    BinaryOp::Divide => FloatBinaryOp::Div,
                    BinaryOp::Modulo => {
                        let function = if float == FloatType::F32 { IMPORT_FMODF } else { IMPORT_FMOD };
                        return Ok(WasmExpression::call(function, vec![*a, *b]));
                    }
                    BinaryOp::Compare => {
                        return Ok(compare(
                            WasmExpression::FloatBinary {
                                op: FloatBinaryOp::Gt,
                                ty: float,
                                first: a.clone(),
                                second: b.clone(),
                            },
                            WasmExpression::FloatBinary {
                                op: FloatBinaryOp::Lt,
                                ty: float,
                                first: a,
                                second: b,
                            },
                        ));
                    }
                    other => return Err(self.unsupported(format!("bitwise {} on {}", other.symbol(), ty.name()))),
                };
                Ok(WasmExpression::FloatBinary {
                    op,
                    ty: float,
                    first: a,
                    second: b,
                })
            }
        }
    }

    fn branch_condition(&self, condition: BranchCondition, operand: VariableId) -> WasmExpression {
        let ty = if self.types.get(operand) == Some(VariableType::Long) {
            IntType::I64
        } else {
            IntType::I32
        };
        let zero = match ty {
            IntType::I32 => WasmExpression::I32Const(0),
            IntType::I64 => WasmExpression::I64Const(0),
        };
        let op = match condition {
            BranchCondition::Equal | BranchCondition::Null => {
                return WasmExpression::IntUnary {
                    op: IntUnaryOp::Eqz,
                    ty,
                    operand: Box::new(self.get(operand)),
                };
            }
            BranchCondition::NotEqual | BranchCondition::NotNull => IntBinaryOp::Ne,
            BranchCondition::Less => IntBinaryOp::LtSigned,
            BranchCondition::LessOrEqual => IntBinaryOp::LeSigned,
            BranchCondition::Greater => IntBinaryOp::GtSigned,
            BranchCondition::GreaterOrEqual => IntBinaryOp::GeSigned,
        };
        WasmExpression::IntBinary {
            op,
            ty,
            first: Box::new(self.get(operand)),
            second: Box::new(zero),
        }
    }

    /// Base address and constant offset of a field
    fn field_address(
        &mut self,
        instance: Option<VariableId>,
        field: &FieldReference,
    ) -> Result<(WasmExpression, u32), CodegenError> {
        let (resolved, _) = self
            .generator
            .hierarchy
            .resolve_field(&field.class, &field.name)
            .ok_or_else(|| CodegenError::MissingField(field.clone()))?;
        let layout = &self.generator.layout;
        match instance {
            Some(instance) => {
                let offset = layout
                    .field_offset(&resolved)
                    .ok_or_else(|| CodegenError::MissingField(field.clone()))?;
                Ok((self.get(instance), offset))
            }
            None => {
                let address = layout
                    .static_address(&resolved)
                    .ok_or_else(|| CodegenError::MissingField(field.clone()))?;
                Ok((WasmExpression::I32Const(0), address))
            }
        }
    }

    fn element_address(&self, array: VariableId, index: VariableId, shift: u32) -> WasmExpression {
        let index = if shift == 0 {
            self.get(index)
        } else {
            WasmExpression::int(IntBinaryOp::Shl, self.get(index), WasmExpression::I32Const(shift as i32))
        };
        WasmExpression::int(IntBinaryOp::Add, self.get(array), index)
    }

    fn invoke(&mut self, call: &IntrinsicCall<'_>, kind: InvocationKind) -> Result<(), CodegenError> {
        let method = call.method;
        let mut arguments: Vec<WasmExpression> = Vec::with_capacity(call.arguments.len() + 1);
        if let Some(instance) = call.instance {
            arguments.push(self.get(instance));
        }
        arguments.extend(call.arguments.iter().map(|&argument| self.get(argument)));

        let expression = match kind {
            InvocationKind::Static | InvocationKind::Special => {
                let resolved = self
                    .generator
                    .hierarchy
                    .resolve_method(&method.class, &method.descriptor)
                    .ok_or_else(|| CodegenError::MissingBody(method.clone()))?;
                if self.generator.input.body(&resolved).is_none() {
                    return Err(CodegenError::MissingBody(resolved));
                }
                WasmExpression::call(function_name(&resolved), arguments)
            }
            InvocationKind::Virtual => {
                let instance = call
                    .instance
                    .ok_or_else(|| self.unsupported(format!("virtual call of {} without instance", method)))?;
                let slot = self
                    .generator
                    .layout
                    .slot(&method.descriptor)
                    .ok_or_else(|| self.unsupported(format!("virtual call of {} without a slot", method)))?;
                let type_index = self.generator.module.intern(&method_signature(method, false));
                let class = WasmExpression::load(MemoryType::Int32, CLASS_OFFSET, self.get(instance));
                WasmExpression::CallIndirect {
                    type_index,
                    index: Box::new(WasmExpression::load(MemoryType::Int32, CLASS_VTABLE_OFFSET + 4 * slot, class)),
                    arguments,
                }
            }
        };
        match call.receiver {
            Some(receiver) => self.assign(receiver, expression),
            None if method.descriptor.result != ValueType::Void => {
                self.emit(WasmExpression::Drop(Box::new(expression)))
            }
            None => self.emit(expression),
        }
        Ok(())
    }
}

fn float_type(ty: NumericType) -> FloatType {
    if ty == NumericType::Float {
        FloatType::F32
    } else {
        FloatType::F64
    }
}

/// `(greater) - (less)`, giving -1, 0 or 1
fn compare(greater: WasmExpression, less: WasmExpression) -> WasmExpression {
    WasmExpression::int(IntBinaryOp::Sub, greater, less)
}

fn numeric_conversion(from: NumericType, to: NumericType) -> Option<Conversion> {
    use NumericType::*;
    Some(match (from, to) {
        (Int, Int) | (Long, Long) | (Float, Float) | (Double, Double) => return None,
        (Int, Long) => Conversion::I64ExtendI32,
        (Int, Float) => Conversion::F32ConvertI32,
        (Int, Double) => Conversion::F64ConvertI32,
        (Long, Int) => Conversion::I32WrapI64,
        (Long, Float) => Conversion::F32ConvertI64,
        (Long, Double) => Conversion::F64ConvertI64,
        (Float, Int) => Conversion::I32TruncSatF32,
        (Float, Long) => Conversion::I64TruncSatF32,
        (Float, Double) => Conversion::F64PromoteF32,
        (Double, Int) => Conversion::I32TruncSatF64,
        (Double, Long) => Conversion::I64TruncSatF64,
        (Double, Float) => Conversion::F32DemoteF64,
    })
}
