//! Method body lowering
//!
//! A body with a single block and no handlers is written straight. Anything else becomes
//! a block-dispatch loop:
//!
//! ```text
//! var $p = 0;
//! main: while (true) {
//!     try {
//!         switch ($p) {
//!             case 0: ...
//!         }
//!     } catch ($e) {
//!         switch ($p) { ... }   // handlers of the block that threw
//!         throw $e;
//!     }
//! }
//! ```
//!
//! Phis are resolved on each edge as parallel copies, through temporaries when a copy
//! would clobber another copy's source.

use super::{JsGenerator, SourceWriter};
use crate::backend::common::IntrinsicCall;
use crate::error::CodegenError;
use crate::ir::{
    infer, BinaryBranchCondition, BinaryOp, BlockId, BranchCondition, FieldReference, Instruction, InstructionKind,
    IntegerSubtype, InvocationKind, MethodReference, NumericType, Program, ValueType, VariableId, VariableType,
    VariableTypes,
};

/// State of one method being written; also the interface intrinsics write through
pub struct MethodContext<'g, 'a> {
    generator: &'g mut JsGenerator<'a>,
    method: &'g MethodReference,
    program: &'a Program,
    is_static: bool,
    types: VariableTypes,
    order: Vec<BlockId>,
    temps: u32,
}

impl<'g, 'a> MethodContext<'g, 'a> {
    pub(super) fn new(
        generator: &'g mut JsGenerator<'a>,
        method: &'g MethodReference,
        is_static: bool,
        program: &'a Program,
    ) -> Self {
        let types = infer(program, !is_static, &method.descriptor.parameters);
        let reachable = program.reachable_blocks();
        let order = program
            .blocks()
            .iter()
            .filter(|block| reachable[block.id.index()])
            .map(|block| block.id)
            .collect();
        Self {
            generator,
            method,
            program,
            is_static,
            types,
            order,
            temps: 0,
        }
    }

    // ===== Intrinsic interface =====

    /// Method being lowered
    pub fn method(&self) -> &MethodReference {
        self.method
    }

    /// Script name of a variable
    pub fn var(&self, variable: VariableId) -> String {
        format!("${}", variable.as_u32())
    }

    /// A fresh temporary name, unique within the method
    pub fn temp(&mut self) -> String {
        let name = format!("$t{}", self.temps);
        self.temps += 1;
        name
    }

    /// Output for statements that need more than one line
    pub fn writer(&mut self) -> &mut SourceWriter {
        &mut self.generator.writer
    }

    /// Write one statement line
    pub fn statement(&mut self, text: &str) {
        self.generator.writer.line(text);
    }

    /// Whether analysis reached `method`
    pub fn is_reachable(&self, method: &MethodReference) -> bool {
        self.generator.input.is_reachable(method)
    }

    /// Global function of a method with a body
    pub fn function_name(&mut self, method: &MethodReference) -> String {
        self.generator.naming.method_name(method)
    }

    /// Expression evaluating to the runtime class of `ty`
    pub fn type_ref(&mut self, ty: &ValueType) -> String {
        self.generator.type_ref(ty)
    }

    // ===== Structure =====

    pub(super) fn lower(mut self) -> Result<(), CodegenError> {
        let name = self.generator.naming.method_name(self.method);
        let param_count = self.method.descriptor.parameter_count() as u32;
        let first = if self.is_static { 1 } else { 0 };
        let params: Vec<String> = (first..=param_count).map(|i| self.var(VariableId::new(i))).collect();
        let locals: Vec<String> = (0..self.program.variable_count() as u32)
            .filter(|&i| i > param_count || (self.is_static && i == 0))
            .map(|i| self.var(VariableId::new(i)))
            .collect();

        let writer = &mut self.generator.writer;
        writer.start_method(&self.method.to_string());
        writer.location(None);
        writer.open(&format!("function {}({})", name, params.join(", ")));
        if !locals.is_empty() {
            writer.line(&format!("var {};", locals.join(", ")));
        }

        let has_handlers = self.program.blocks().iter().any(|block| !block.try_catches.is_empty());
        let straight = self.order.len() == 1 && self.program.block(self.order[0]).successors().is_empty();
        if !straight || has_handlers {
            self.lower_dispatch(has_handlers)?;
        } else if let Some(&entry) = self.order.first() {
            self.lower_block(entry)?;
        }

        let writer = &mut self.generator.writer;
        writer.location(None);
        writer.close("");
        writer.end_method();
        Ok(())
    }

    fn lower_dispatch(&mut self, has_handlers: bool) -> Result<(), CodegenError> {
        self.statement("var $p = 0;");
        self.writer().open("main: while (true)");
        if has_handlers {
            self.writer().open("try");
        }
        self.writer().open("switch ($p)");
        for index in 0..self.order.len() {
            let block = self.order[index];
            self.writer().location(None);
            self.writer().line(&format!("case {}:", block.as_u32())).indent();
            self.lower_block(block)?;
            self.writer().outdent();
        }
        self.writer().close("");
        if has_handlers {
            self.writer().location(None);
            self.writer().outdent().line("} catch ($e) {").indent();
            self.lower_handlers();
            self.writer().close("");
        }
        self.writer().close("");
        Ok(())
    }

    /// Route a caught exception by the block that was executing
    fn lower_handlers(&mut self) {
        self.statement("$e = $rt_wrapException($e);");
        self.writer().open("switch ($p)");
        for index in 0..self.order.len() {
            let block = self.program.block(self.order[index]);
            if block.try_catches.is_empty() {
                continue;
            }
            self.statement(&format!("case {}:", block.id.as_u32()));
            self.writer().indent();
            let mut caught = false;
            for try_catch in &block.try_catches {
                if let Some(class) = &try_catch.exception_type {
                    let class = self.generator.naming.class_name(class);
                    self.writer().open(&format!("if ($rt_isInstance($e, {}))", class));
                }
                if let Some(variable) = self.program.block(try_catch.handler).exception_variable {
                    let line = format!("{} = $e;", self.var(variable));
                    self.statement(&line);
                }
                self.edge_copies(block.id, try_catch.handler);
                self.statement(&format!("$p = {}; continue main;", try_catch.handler.as_u32()));
                if try_catch.exception_type.is_some() {
                    self.writer().close("");
                } else {
                    caught = true;
                    break;
                }
            }
            if !caught {
                self.statement("break;");
            }
            self.writer().outdent();
        }
        self.writer().close("");
        self.statement("throw $e;");
    }

    fn lower_block(&mut self, id: BlockId) -> Result<(), CodegenError> {
        let block = self.program.block(id);
        for instruction in &block.instructions {
            self.generator.writer.location(instruction.location.as_ref());
            self.lower_instruction(id, instruction)?;
        }
        Ok(())
    }

    /// Transfer control to `to`. When `last` is set and `to` is the next case, fall
    /// through instead of restarting the loop.
    fn goto(&mut self, from: BlockId, to: BlockId, last: bool) {
        self.edge_copies(from, to);
        let next = self.order.iter().position(|&b| b == from).and_then(|i| self.order.get(i + 1));
        if last && next == Some(&to) {
            self.statement(&format!("$p = {};", to.as_u32()));
        } else {
            self.statement(&format!("$p = {}; continue main;", to.as_u32()));
        }
    }

    fn edge_copies(&mut self, from: BlockId, to: BlockId) {
        let copies: Vec<(VariableId, VariableId)> = self
            .program
            .block(to)
            .phis
            .iter()
            .filter_map(|phi| phi.incoming_from(from).map(|value| (phi.receiver, value)))
            .filter(|(receiver, value)| receiver != value)
            .collect();
        let clobbers = copies
            .iter()
            .any(|(receiver, _)| copies.iter().any(|(_, value)| value == receiver));
        if !clobbers {
            for (receiver, value) in copies {
                let line = format!("{} = {};", self.var(receiver), self.var(value));
                self.statement(&line);
            }
            return;
        }
        let mut staged = Vec::with_capacity(copies.len());
        for &(receiver, value) in &copies {
            let temp = self.temp();
            let line = format!("var {} = {};", temp, self.var(value));
            self.statement(&line);
            staged.push((receiver, temp));
        }
        for (receiver, temp) in staged {
            let line = format!("{} = {};", self.var(receiver), temp);
            self.statement(&line);
        }
    }

    // ===== Instructions =====

    fn assign(&mut self, receiver: VariableId, expression: &str) {
        let line = format!("{} = {};", self.var(receiver), expression);
        self.statement(&line);
    }

    fn unsupported(&self, what: impl Into<String>) -> CodegenError {
        CodegenError::Unsupported {
            method: self.method.clone(),
            what: what.into(),
        }
    }

    fn lower_instruction(&mut self, block: BlockId, instruction: &Instruction) -> Result<(), CodegenError> {
        use InstructionKind::*;
        match &instruction.kind {
            Nop => {}
            ClassConstant { receiver, value } => {
                let class = self.type_ref(value);
                self.assign(*receiver, &format!("$rt_cls({})", class));
            }
            NullConstant { receiver } => self.assign(*receiver, "null"),
            IntConstant { receiver, value } => self.assign(*receiver, &value.to_string()),
            LongConstant { receiver, value } => self.assign(*receiver, &long_literal(*value)),
            FloatConstant { receiver, value } => self.assign(*receiver, &number_literal(*value as f64)),
            DoubleConstant { receiver, value } => self.assign(*receiver, &number_literal(*value)),
            StringConstant { receiver, value } => {
                let index = self.generator.string_constant(value);
                self.assign(*receiver, &format!("$rt_s({})", index));
            }
            Assign { receiver, assignee } => {
                let value = self.var(*assignee);
                self.assign(*receiver, &value);
            }
            Binary {
                receiver,
                op,
                operand_type,
                first,
                second,
            } => {
                let expression = self.binary(*op, *operand_type, *first, *second)?;
                self.assign(*receiver, &expression);
            }
            Negate {
                receiver,
                operand_type,
                operand,
            } => {
                let value = self.var(*operand);
                let expression = match operand_type {
                    NumericType::Int => format!("-{} | 0", value),
                    NumericType::Long => format!("Long_neg({})", value),
                    NumericType::Float | NumericType::Double => format!("-{}", value),
                };
                self.assign(*receiver, &expression);
            }
            NumericCast { receiver, value, from, to } => {
                let expression = numeric_cast(&self.var(*value), *from, *to);
                self.assign(*receiver, &expression);
            }
            IntegerCast { receiver, value, target } => {
                let value = self.var(*value);
                let expression = match target {
                    IntegerSubtype::Byte => format!("{} << 24 >> 24", value),
                    IntegerSubtype::Short => format!("{} << 16 >> 16", value),
                    IntegerSubtype::Char => format!("{} & 65535", value),
                };
                self.assign(*receiver, &expression);
            }
            Cast { receiver, value, target } => {
                let value = self.var(*value);
                let expression = if target.is_reference() {
                    format!("$rt_cast({}, {})", value, self.type_ref(target))
                } else {
                    value
                };
                self.assign(*receiver, &expression);
            }
            IsInstance { receiver, value, target } => {
                let expression = format!("$rt_isInstance({}, {}) ? 1 : 0", self.var(*value), self.type_ref(target));
                self.assign(*receiver, &expression);
            }
            Branch {
                condition,
                operand,
                consequent,
                alternative,
            } => {
                let test = self.branch_condition(*condition, *operand);
                self.writer().open(&format!("if ({})", test));
                self.goto(block, *consequent, false);
                self.writer().close("");
                self.goto(block, *alternative, true);
            }
            BinaryBranch {
                condition,
                first,
                second,
                consequent,
                alternative,
            } => {
                let (a, b) = (self.var(*first), self.var(*second));
                let long = self.types.get(*first) == Some(VariableType::Long);
                let test = match (condition, long) {
                    (BinaryBranchCondition::Equal, true) => format!("Long_eq({}, {})", a, b),
                    (BinaryBranchCondition::NotEqual, true) => format!("Long_ne({}, {})", a, b),
                    (BinaryBranchCondition::Equal | BinaryBranchCondition::ReferenceEqual, _) => {
                        format!("{} === {}", a, b)
                    }
                    (BinaryBranchCondition::NotEqual | BinaryBranchCondition::ReferenceNotEqual, _) => {
                        format!("{} !== {}", a, b)
                    }
                };
                self.writer().open(&format!("if ({})", test));
                self.goto(block, *consequent, false);
                self.writer().close("");
                self.goto(block, *alternative, true);
            }
            Jump { target } => self.goto(block, *target, true),
            Switch {
                condition,
                entries,
                default,
            } => {
                let selector = self.var(*condition);
                self.writer().open(&format!("switch ({})", selector));
                for entry in entries {
                    self.statement(&format!("case {}:", entry.condition));
                    self.writer().indent();
                    self.goto(block, entry.target, false);
                    self.writer().outdent();
                }
                self.writer().close("");
                self.goto(block, *default, true);
            }
            Exit { value } => match value {
                Some(value) => {
                    let line = format!("return {};", self.var(*value));
                    self.statement(&line);
                }
                None => self.statement("return;"),
            },
            Raise { exception } => {
                let line = format!("throw {};", self.var(*exception));
                self.statement(&line);
            }
            Construct { receiver, class } => {
                let class = self.generator.naming.class_name(class);
                self.assign(*receiver, &format!("new {}()", class));
            }
            ConstructArray {
                receiver,
                item_type,
                size,
            } => {
                let size = self.var(*size);
                let expression = match item_type {
                    ValueType::Primitive(p) => format!("$rt_create{}Array({})", capitalize(p.name()), size),
                    other => format!("$rt_createArray({}, {})", self.type_ref(other), size),
                };
                self.assign(*receiver, &expression);
            }
            GetField {
                receiver,
                instance,
                field,
                ..
            } => {
                let access = self.field_access(*instance, field)?;
                self.assign(*receiver, &access);
            }
            PutField {
                instance, field, value, ..
            } => {
                let access = self.field_access(*instance, field)?;
                let line = format!("{} = {};", access, self.var(*value));
                self.statement(&line);
            }
            ArrayLength { receiver, array } => {
                let expression = format!("{}.data.length", self.var(*array));
                self.assign(*receiver, &expression);
            }
            CloneArray { receiver, array } => {
                let expression = format!("$rt_cloneArray({})", self.var(*array));
                self.assign(*receiver, &expression);
            }
            // Element accesses go through `.data` of the array itself
            UnwrapArray { receiver, array, .. } => {
                let value = self.var(*array);
                self.assign(*receiver, &value);
            }
            GetElement {
                receiver, array, index, ..
            } => {
                let expression = format!("{}.data[{}]", self.var(*array), self.var(*index));
                self.assign(*receiver, &expression);
            }
            PutElement {
                array, index, value, ..
            } => {
                let line = format!("{}.data[{}] = {};", self.var(*array), self.var(*index), self.var(*value));
                self.statement(&line);
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
                self.invoke(&call, *kind)?;
            }
            InitClass { class } => {
                if self.generator.input.needs_initialization(class) {
                    let init = self.generator.naming.initializer_name(class);
                    self.statement(&format!("{}();", init));
                }
            }
            NullCheck { receiver, value } => {
                let expression = format!("$rt_nullCheck({})", self.var(*value));
                self.assign(*receiver, &expression);
            }
            // Single-threaded target
            MonitorEnter { .. } | MonitorExit { .. } => {}
        }
        Ok(())
    }

    fn binary(&self, op: BinaryOp, ty: NumericType, first: VariableId, second: VariableId) -> Result<String, CodegenError> {
        let (a, b) = (self.var(first), self.var(second));
        Ok(match ty {
            NumericType::Int => match op {
                BinaryOp::Add | BinaryOp::Subtract => format!("{} {} {} | 0", a, op.symbol(), b),
                BinaryOp::Multiply => format!("Math.imul({}, {})", a, b),
                BinaryOp::Divide => format!("$rt_idiv({}, {})", a, b),
                BinaryOp::Modulo => format!("$rt_imod({}, {})", a, b),
                BinaryOp::ShiftRightUnsigned => format!("{} >>> {} | 0", a, b),
                BinaryOp::Compare => format!("$rt_compare({}, {})", a, b),
                BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::ShiftLeft | BinaryOp::ShiftRight => {
                    format!("{} {} {}", a, op.symbol(), b)
                }
            },
            NumericType::Long => format!("Long_{}({}, {})", long_function(op), a, b),
            NumericType::Float | NumericType::Double => {
                if op.is_bitwise() {
                    return Err(self.unsupported(format!("bitwise {} on {}", op.symbol(), ty.name())));
                }
                if op == BinaryOp::Compare {
                    return Ok(format!("$rt_compare({}, {})", a, b));
                }
                let plain = format!("{} {} {}", a, op.symbol(), b);
                if ty == NumericType::Float {
                    format!("Math.fround({})", plain)
                } else {
                    plain
                }
            }
        })
    }

    fn branch_condition(&self, condition: BranchCondition, operand: VariableId) -> String {
        let mut value = self.var(operand);
        if self.types.get(operand) == Some(VariableType::Long) {
            value = format!("Long_compare({}, Long_ZERO)", value);
        }
        match condition {
            BranchCondition::Equal => format!("{} === 0", value),
            BranchCondition::NotEqual => format!("{} !== 0", value),
            BranchCondition::Less => format!("{} < 0", value),
            BranchCondition::LessOrEqual => format!("{} <= 0", value),
            BranchCondition::Greater => format!("{} > 0", value),
            BranchCondition::GreaterOrEqual => format!("{} >= 0", value),
            BranchCondition::Null => format!("{} === null", value),
            BranchCondition::NotNull => format!("{} !== null", value),
        }
    }

    fn field_access(&mut self, instance: Option<VariableId>, field: &FieldReference) -> Result<String, CodegenError> {
        let (resolved, _) = self
            .generator
            .hierarchy
            .resolve_field(&field.class, &field.name)
            .ok_or_else(|| CodegenError::MissingField(field.clone()))?;
        Ok(match instance {
            Some(instance) => format!("{}.{}", self.var(instance), self.generator.naming.field_name(&resolved)),
            None => self.generator.naming.static_field_name(&resolved),
        })
    }

    fn invoke(&mut self, call: &IntrinsicCall<'_>, kind: InvocationKind) -> Result<(), CodegenError> {
        if let Some(generator) = self.generator.intrinsics.find(call.method).copied() {
            return generator(self, call);
        }
        let method = call.method;
        let mut arguments: Vec<String> = call.arguments.iter().map(|&a| self.var(a)).collect();
        let target = match kind {
            InvocationKind::Static | InvocationKind::Special => {
                let resolved = self
                    .generator
                    .hierarchy
                    .resolve_method(&method.class, &method.descriptor)
                    .ok_or_else(|| CodegenError::MissingBody(method.clone()))?;
                if let Some(instance) = call.instance {
                    arguments.insert(0, self.var(instance));
                }
                self.generator.naming.method_name(&resolved)
            }
            InvocationKind::Virtual => {
                let instance = call
                    .instance
                    .ok_or_else(|| self.unsupported(format!("virtual call of {} without instance", method)))?;
                let property = self.generator.naming.virtual_name(&method.descriptor);
                format!("{}.{}", self.var(instance), property)
            }
        };
        let expression = format!("{}({})", target, arguments.join(", "));
        match call.receiver {
            Some(receiver) => self.assign(receiver, &expression),
            None => self.statement(&format!("{};", expression)),
        }
        Ok(())
    }
}

fn long_function(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Subtract => "sub",
        BinaryOp::Multiply => "mul",
        BinaryOp::Divide => "div",
        BinaryOp::Modulo => "rem",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        BinaryOp::Xor => "xor",
        BinaryOp::ShiftLeft => "shl",
        BinaryOp::ShiftRight => "shr",
        BinaryOp::ShiftRightUnsigned => "shru",
        BinaryOp::Compare => "compare",
    }
}

fn numeric_cast(value: &str, from: NumericType, to: NumericType) -> String {
    use NumericType::*;
    match (from, to) {
        (Int, Int) | (Long, Long) | (Float, Float) | (Double, Double) | (Int, Double) | (Float, Double) => {
            value.to_string()
        }
        (Int, Long) => format!("Long_fromInt({})", value),
        (Int, Float) | (Double, Float) => format!("Math.fround({})", value),
        (Long, Int) => format!("Long_lo({})", value),
        (Long, Float) => format!("Math.fround(Long_toNumber({}))", value),
        (Long, Double) => format!("Long_toNumber({})", value),
        (Float | Double, Int) => format!("$rt_toInt({})", value),
        (Float | Double, Long) => format!("Long_fromNumber({})", value),
    }
}

fn long_literal(value: i64) -> String {
    if value == 0 {
        "Long_ZERO".to_string()
    } else if let Ok(small) = i32::try_from(value) {
        format!("Long_fromInt({})", small)
    } else {
        format!("Long_create({}, {})", value as i32, (value >> 32) as i32)
    }
}

fn number_literal(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if value == 0.0 && value.is_sign_negative() {
        "-0.0".to_string()
    } else {
        format!("{}", value)
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
