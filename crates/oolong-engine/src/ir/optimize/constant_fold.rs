//! Constant Folding Optimization
//!
//! Evaluates arithmetic on constant operands at compile time, with Java overflow,
//! shift and conversion semantics.

use crate::ir::instr::{BinaryOp, InstructionKind, IntegerSubtype, NumericType};
use crate::ir::{BasicBlock, Program, VariableId};
use rustc_hash::FxHashMap;

/// A known constant value
#[derive(Debug, Clone, Copy, PartialEq)]
enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Constant {
    fn of(kind: &InstructionKind) -> Option<Self> {
        match kind {
            InstructionKind::IntConstant { value, .. } => Some(Constant::Int(*value)),
            InstructionKind::LongConstant { value, .. } => Some(Constant::Long(*value)),
            InstructionKind::FloatConstant { value, .. } => Some(Constant::Float(*value)),
            InstructionKind::DoubleConstant { value, .. } => Some(Constant::Double(*value)),
            _ => None,
        }
    }

    fn into_instruction(self, receiver: VariableId) -> InstructionKind {
        match self {
            Constant::Int(value) => InstructionKind::IntConstant { receiver, value },
            Constant::Long(value) => InstructionKind::LongConstant { receiver, value },
            Constant::Float(value) => InstructionKind::FloatConstant { receiver, value },
            Constant::Double(value) => InstructionKind::DoubleConstant { receiver, value },
        }
    }

    fn matches(self, ty: NumericType) -> bool {
        matches!(
            (self, ty),
            (Constant::Int(_), NumericType::Int)
                | (Constant::Long(_), NumericType::Long)
                | (Constant::Float(_), NumericType::Float)
                | (Constant::Double(_), NumericType::Double)
        )
    }
}

/// Constant folding optimizer
pub struct ConstantFolder;

impl ConstantFolder {
    /// Create a new constant folder
    pub fn new() -> Self {
        Self
    }

    /// Fold constants in a program, returning the number of instructions replaced
    ///
    /// Each block gets its own fresh constants map. Constants are not propagated
    /// across block boundaries since variables may be reassigned along back edges.
    pub fn fold(&self, program: &mut Program) -> usize {
        let mut folded = 0;
        for block in program.blocks_mut() {
            let mut constants = FxHashMap::default();
            folded += self.fold_block(block, &mut constants);
        }
        folded
    }

    fn fold_block(&self, block: &mut BasicBlock, constants: &mut FxHashMap<VariableId, Constant>) -> usize {
        let mut folded = 0;
        for instruction in &mut block.instructions {
            let Some(receiver) = instruction.receiver() else {
                continue;
            };
            if let Some(value) = Constant::of(&instruction.kind) {
                constants.insert(receiver, value);
                continue;
            }
            match self.evaluate(&instruction.kind, constants) {
                Some(value) => {
                    instruction.kind = value.into_instruction(receiver);
                    constants.insert(receiver, value);
                    folded += 1;
                }
                None => {
                    // Redefined with an unknown value
                    constants.remove(&receiver);
                }
            }
        }
        folded
    }

    fn evaluate(&self, kind: &InstructionKind, constants: &FxHashMap<VariableId, Constant>) -> Option<Constant> {
        match kind {
            InstructionKind::Binary {
                op,
                operand_type,
                first,
                second,
                ..
            } => {
                let a = *constants.get(first)?;
                let b = *constants.get(second)?;
                if !a.matches(*operand_type) || !b.matches(*operand_type) {
                    return None;
                }
                self.eval_binary(*op, a, b)
            }
            InstructionKind::Negate { operand, operand_type, .. } => {
                let value = *constants.get(operand)?;
                if !value.matches(*operand_type) {
                    return None;
                }
                Some(match value {
                    Constant::Int(v) => Constant::Int(v.wrapping_neg()),
                    Constant::Long(v) => Constant::Long(v.wrapping_neg()),
                    Constant::Float(v) => Constant::Float(-v),
                    Constant::Double(v) => Constant::Double(-v),
                })
            }
            InstructionKind::NumericCast { value, from, to, .. } => {
                let value = *constants.get(value)?;
                if !value.matches(*from) {
                    return None;
                }
                Some(self.eval_cast(value, *to))
            }
            InstructionKind::IntegerCast { value, target, .. } => match *constants.get(value)? {
                Constant::Int(v) => Some(Constant::Int(match target {
                    IntegerSubtype::Byte => v as i8 as i32,
                    IntegerSubtype::Short => v as i16 as i32,
                    IntegerSubtype::Char => v as u16 as i32,
                })),
                _ => None,
            },
            InstructionKind::Assign { assignee, .. } => constants.get(assignee).copied(),
            _ => None,
        }
    }

    /// Evaluate a binary operation on constants of the same type
    fn eval_binary(&self, op: BinaryOp, left: Constant, right: Constant) -> Option<Constant> {
        match (left, right) {
            (Constant::Int(a), Constant::Int(b)) => Some(Constant::Int(match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Subtract => a.wrapping_sub(b),
                BinaryOp::Multiply => a.wrapping_mul(b),
                // Division by zero throws at run time
                BinaryOp::Divide if b != 0 => a.wrapping_div(b),
                BinaryOp::Modulo if b != 0 => a.wrapping_rem(b),
                BinaryOp::Divide | BinaryOp::Modulo => return None,
                BinaryOp::And => a & b,
                BinaryOp::Or => a | b,
                BinaryOp::Xor => a ^ b,
                BinaryOp::ShiftLeft => a.wrapping_shl(b as u32),
                BinaryOp::ShiftRight => a.wrapping_shr(b as u32),
                BinaryOp::ShiftRightUnsigned => (a as u32).wrapping_shr(b as u32) as i32,
                BinaryOp::Compare => a.cmp(&b) as i32,
            })),
            (Constant::Long(a), Constant::Long(b)) => {
                if op == BinaryOp::Compare {
                    return Some(Constant::Int(a.cmp(&b) as i32));
                }
                Some(Constant::Long(match op {
                    BinaryOp::Add => a.wrapping_add(b),
                    BinaryOp::Subtract => a.wrapping_sub(b),
                    BinaryOp::Multiply => a.wrapping_mul(b),
                    BinaryOp::Divide if b != 0 => a.wrapping_div(b),
                    BinaryOp::Modulo if b != 0 => a.wrapping_rem(b),
                    BinaryOp::Divide | BinaryOp::Modulo => return None,
                    BinaryOp::And => a & b,
                    BinaryOp::Or => a | b,
                    BinaryOp::Xor => a ^ b,
                    BinaryOp::ShiftLeft => a.wrapping_shl(b as u32),
                    BinaryOp::ShiftRight => a.wrapping_shr(b as u32),
                    BinaryOp::ShiftRightUnsigned => (a as u64).wrapping_shr(b as u32) as i64,
                    BinaryOp::Compare => return None,
                }))
            }
            (Constant::Float(a), Constant::Float(b)) => {
                if op == BinaryOp::Compare {
                    return compare_floats(a as f64, b as f64);
                }
                float_op(op, a as f64, b as f64).map(|v| Constant::Float(v as f32))
            }
            (Constant::Double(a), Constant::Double(b)) => {
                if op == BinaryOp::Compare {
                    return compare_floats(a, b);
                }
                float_op(op, a, b).map(Constant::Double)
            }
            _ => None,
        }
    }

    /// Java primitive widening and narrowing conversions
    fn eval_cast(&self, value: Constant, to: NumericType) -> Constant {
        match (value, to) {
            (Constant::Int(v), NumericType::Int) => Constant::Int(v),
            (Constant::Int(v), NumericType::Long) => Constant::Long(v as i64),
            (Constant::Int(v), NumericType::Float) => Constant::Float(v as f32),
            (Constant::Int(v), NumericType::Double) => Constant::Double(v as f64),
            (Constant::Long(v), NumericType::Int) => Constant::Int(v as i32),
            (Constant::Long(v), NumericType::Long) => Constant::Long(v),
            (Constant::Long(v), NumericType::Float) => Constant::Float(v as f32),
            (Constant::Long(v), NumericType::Double) => Constant::Double(v as f64),
            // `as` saturates and maps NaN to zero, as Java does
            (Constant::Float(v), NumericType::Int) => Constant::Int(v as i32),
            (Constant::Float(v), NumericType::Long) => Constant::Long(v as i64),
            (Constant::Float(v), NumericType::Float) => Constant::Float(v),
            (Constant::Float(v), NumericType::Double) => Constant::Double(v as f64),
            (Constant::Double(v), NumericType::Int) => Constant::Int(v as i32),
            (Constant::Double(v), NumericType::Long) => Constant::Long(v as i64),
            (Constant::Double(v), NumericType::Float) => Constant::Float(v as f32),
            (Constant::Double(v), NumericType::Double) => Constant::Double(v),
        }
    }
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> Option<f64> {
    match op {
        BinaryOp::Add => Some(a + b),
        BinaryOp::Subtract => Some(a - b),
        BinaryOp::Multiply => Some(a * b),
        BinaryOp::Divide => Some(a / b),
        BinaryOp::Modulo => Some(a % b),
        _ => None,
    }
}

/// NaN ordering depends on the comparison instruction the front end chose; leave it alone
fn compare_floats(a: f64, b: f64) -> Option<Constant> {
    a.partial_cmp(&b).map(|ordering| Constant::Int(ordering as i32))
}

impl Default for ConstantFolder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::listing::parse;
    use crate::ir::BlockId;

    fn fold_listing(source: &str) -> (Program, usize) {
        let mut program = parse(source).expect("valid listing");
        let folded = ConstantFolder::new().fold(&mut program);
        (program, folded)
    }

    fn kinds(program: &Program) -> Vec<InstructionKind> {
        program
            .block(BlockId::new(0))
            .instructions
            .iter()
            .map(|i| i.kind.clone())
            .collect()
    }

    #[test]
    fn test_fold_int_add() {
        let (program, folded) =
            fold_listing("$0\n    %a := 3\n    %b := 2\n    %c := %a + %b as int\n    return %c\n");
        assert_eq!(folded, 1);
        assert_eq!(
            kinds(&program)[2],
            InstructionKind::IntConstant {
                receiver: VariableId::new(2),
                value: 5
            }
        );
    }

    #[test]
    fn test_int_overflow_wraps() {
        let (program, _) =
            fold_listing("$0\n    %a := 2147483647\n    %b := 1\n    %c := %a + %b as int\n    return %c\n");
        assert!(matches!(kinds(&program)[2], InstructionKind::IntConstant { value: i32::MIN, .. }));
    }

    #[test]
    fn test_division_by_zero_is_kept() {
        let (program, folded) =
            fold_listing("$0\n    %a := 3\n    %b := 0\n    %c := %a / %b as int\n    return %c\n");
        assert_eq!(folded, 0);
        assert!(matches!(kinds(&program)[2], InstructionKind::Binary { .. }));
    }

    #[test]
    fn test_shift_distance_is_masked() {
        let (program, _) =
            fold_listing("$0\n    %a := 1\n    %b := 33\n    %c := %a << %b as int\n    return %c\n");
        assert!(matches!(kinds(&program)[2], InstructionKind::IntConstant { value: 2, .. }));
    }

    #[test]
    fn test_unsigned_shift() {
        let (program, _) =
            fold_listing("$0\n    %a := -1\n    %b := 28\n    %c := %a >>> %b as int\n    return %c\n");
        assert!(matches!(kinds(&program)[2], InstructionKind::IntConstant { value: 15, .. }));
    }

    #[test]
    fn test_casts() {
        let (program, folded) = fold_listing(
            "$0\n    %a := 300\n    %b := cast %a to byte\n    %c := 1.0E10\n    %d := cast %c from double to int\n    return\n",
        );
        assert_eq!(folded, 2);
        let kinds = kinds(&program);
        assert!(matches!(kinds[1], InstructionKind::IntConstant { value: 44, .. }));
        assert!(matches!(kinds[3], InstructionKind::IntConstant { value: i32::MAX, .. }));
    }

    #[test]
    fn test_long_compare() {
        let (program, _) =
            fold_listing("$0\n    %a := 1L\n    %b := 2L\n    %c := %a compareTo %b as long\n    return %c\n");
        assert!(matches!(kinds(&program)[2], InstructionKind::IntConstant { value: -1, .. }));
    }

    #[test]
    fn test_constants_do_not_cross_blocks() {
        let (program, folded) = fold_listing(
            "$0\n    %a := 1\n    goto $1\n$1\n    %b := %a + %a as int\n    return %b\n",
        );
        assert_eq!(folded, 0);
        assert!(matches!(
            program.block(BlockId::new(1)).instructions[0].kind,
            InstructionKind::Binary { .. }
        ));
    }

    #[test]
    fn test_redefinition_forgets_constant() {
        let (program, folded) = fold_listing(
            "var %a\nvar %b\nvar %c\nvar %x\n$0\n    %a := 1\n    %a := %x\n    %c := %a + %a as int\n    return %c\n",
        );
        assert_eq!(folded, 0);
        assert!(matches!(kinds(&program)[2], InstructionKind::Binary { .. }));
    }
}
