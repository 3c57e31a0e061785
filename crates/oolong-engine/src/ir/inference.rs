//! Variable type inference
//!
//! Assigns each variable the machine-level category of the values it holds. Definitions
//! give types directly; assignments and phis copy them, iterated to a fixpoint.

use super::instr::{ArrayElementType, BinaryOp, InstructionKind, NumericType};
use super::program::{Program, VariableId};
use super::types::{PrimitiveType, ValueType};

/// Representation category of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableType {
    /// 32-bit integer, including booleans, bytes, shorts and chars
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

impl VariableType {
    /// Category of values of `ty`, `None` for void
    pub fn of(ty: &ValueType) -> Option<Self> {
        match ty {
            ValueType::Primitive(p) => Some(match p {
                PrimitiveType::Long => VariableType::Long,
                PrimitiveType::Float => VariableType::Float,
                PrimitiveType::Double => VariableType::Double,
                _ => VariableType::Int,
            }),
            ValueType::Object(_) | ValueType::Array(_) => Some(VariableType::Object),
            ValueType::Void => None,
        }
    }

    fn of_numeric(ty: NumericType) -> Self {
        match ty {
            NumericType::Int => VariableType::Int,
            NumericType::Long => VariableType::Long,
            NumericType::Float => VariableType::Float,
            NumericType::Double => VariableType::Double,
        }
    }

    fn of_element(ty: ArrayElementType) -> Self {
        match ty {
            ArrayElementType::Long => VariableType::Long,
            ArrayElementType::Float => VariableType::Float,
            ArrayElementType::Double => VariableType::Double,
            ArrayElementType::Object => VariableType::Object,
            ArrayElementType::Char | ArrayElementType::Byte | ArrayElementType::Short | ArrayElementType::Int => {
                VariableType::Int
            }
        }
    }
}

/// Inferred types, indexed by variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableTypes {
    types: Vec<Option<VariableType>>,
}

impl VariableTypes {
    /// Type of `variable`, if any definition reaches it
    pub fn get(&self, variable: VariableId) -> Option<VariableType> {
        self.types.get(variable.index()).copied().flatten()
    }

    /// Type of `variable`, treating unknown as `Int`
    pub fn get_or_int(&self, variable: VariableId) -> VariableType {
        self.get(variable).unwrap_or(VariableType::Int)
    }

    /// Number of variables covered
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the program has no variables
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Infer variable types for a method body. `has_this` marks instance methods;
/// `parameters` are bound to variables `1..=n`.
pub fn infer(program: &Program, has_this: bool, parameters: &[ValueType]) -> VariableTypes {
    let mut types = vec![None; program.variable_count()];

    if has_this && !types.is_empty() {
        types[0] = Some(VariableType::Object);
    }
    for (index, param) in parameters.iter().enumerate() {
        set(&mut types, VariableId::new(index as u32 + 1), VariableType::of(param));
    }

    for block in program.blocks() {
        if let Some(exception) = block.exception_variable {
            set(&mut types, exception, Some(VariableType::Object));
        }
        for instruction in &block.instructions {
            let Some(receiver) = instruction.receiver() else {
                continue;
            };
            set(&mut types, receiver, defined_type(&instruction.kind));
        }
    }

    // Copies need their source typed first; iterate until nothing changes
    loop {
        let mut changed = false;
        for block in program.blocks() {
            for phi in &block.phis {
                let ty = phi.incomings.iter().find_map(|i| types.get(i.value.index()).copied().flatten());
                changed |= set(&mut types, phi.receiver, ty);
            }
            for instruction in &block.instructions {
                if let InstructionKind::Assign { receiver, assignee } = &instruction.kind {
                    let ty = types.get(assignee.index()).copied().flatten();
                    changed |= set(&mut types, *receiver, ty);
                }
            }
        }
        if !changed {
            break;
        }
    }

    VariableTypes { types }
}

/// First definition wins; returns whether `v` changed
fn set(types: &mut [Option<VariableType>], v: VariableId, ty: Option<VariableType>) -> bool {
    match (types.get(v.index()), ty) {
        (Some(None), Some(ty)) => {
            types[v.index()] = Some(ty);
            true
        }
        _ => false,
    }
}

/// Type produced by a defining instruction, `None` for copies
fn defined_type(kind: &InstructionKind) -> Option<VariableType> {
    use InstructionKind::*;
    match kind {
        IntConstant { .. } | IsInstance { .. } | ArrayLength { .. } | IntegerCast { .. } => Some(VariableType::Int),
        LongConstant { .. } => Some(VariableType::Long),
        FloatConstant { .. } => Some(VariableType::Float),
        DoubleConstant { .. } => Some(VariableType::Double),
        ClassConstant { .. }
        | NullConstant { .. }
        | StringConstant { .. }
        | Cast { .. }
        | Construct { .. }
        | ConstructArray { .. }
        | CloneArray { .. }
        | UnwrapArray { .. }
        | NullCheck { .. } => Some(VariableType::Object),
        Binary { op: BinaryOp::Compare, .. } => Some(VariableType::Int),
        Binary { operand_type, .. } | Negate { operand_type, .. } => Some(VariableType::of_numeric(*operand_type)),
        NumericCast { to, .. } => Some(VariableType::of_numeric(*to)),
        GetField { field_type, .. } => VariableType::of(field_type),
        GetElement { element_type, .. } => Some(VariableType::of_element(*element_type)),
        Invoke { method, .. } => VariableType::of(&method.descriptor.result),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::listing::parse;

    #[test]
    fn test_types_from_definitions_and_copies() {
        let program = parse(
            "\
var %0
var %1
var %2
var %3
var %4
var %5
var %6
var %7
$0
    %2 := 1L
    %3 := %2
    %4 := cast %3 from long to double
    %5 := %4 compareTo %4 as double
    %6 := 'name'
    goto $1
$1
    %7 := phi %3 from $0
    return %7
",
        )
        .expect("valid listing");
        let types = infer(&program, false, &[ValueType::INT]);
        let v = VariableId::new;
        assert_eq!(types.get(v(0)), None);
        assert_eq!(types.get(v(1)), Some(VariableType::Int));
        assert_eq!(types.get(v(3)), Some(VariableType::Long));
        assert_eq!(types.get(v(4)), Some(VariableType::Double));
        assert_eq!(types.get(v(5)), Some(VariableType::Int));
        assert_eq!(types.get(v(6)), Some(VariableType::Object));
        assert_eq!(types.get(v(7)), Some(VariableType::Long));
    }

    #[test]
    fn test_this_is_an_object() {
        let program = parse("var %0\nvar %1\n$0\n    %1 := %0\n    return %1\n").expect("valid listing");
        let types = infer(&program, true, &[]);
        assert_eq!(types.get(VariableId::new(1)), Some(VariableType::Object));
    }
}
