//! Listing printer

use super::is_plain_label;
use super::lexer::escape;
use crate::ir::block::{BasicBlock, BlockId};
use crate::ir::instr::{BranchCondition, InstructionKind, TextLocation};
use crate::ir::program::{Program, VariableId};
use crate::ir::types::ValueType;
use rustc_hash::FxHashSet;
use std::fmt::Write;

const INDENT: &str = "    ";

/// Render `program` as a listing
pub fn print(program: &Program) -> String {
    let printer = Printer::new(program);
    printer.render()
}

struct Printer<'a> {
    program: &'a Program,
    variable_names: Vec<String>,
    block_names: Vec<String>,
}

impl<'a> Printer<'a> {
    fn new(program: &'a Program) -> Self {
        let variable_names = unique_names(
            program
                .variables()
                .iter()
                .map(|v| v.label.as_deref()),
        );
        let block_names = unique_names(program.blocks().iter().map(|b| b.label.as_deref()));
        Self {
            program,
            variable_names,
            block_names,
        }
    }

    fn render(&self) -> String {
        let mut out = String::new();
        if self.needs_prologue() {
            for variable in self.program.variables() {
                let _ = write!(out, "var {}", self.var(variable.id));
                if let Some(name) = &variable.debug_name {
                    let _ = write!(out, " as {}", identifier(name));
                }
                out.push('\n');
            }
        }
        for block in self.program.blocks() {
            self.render_block(block, &mut out);
        }
        out
    }

    /// The parser numbers variables by first appearance. A prologue is needed whenever
    /// that would not reproduce the actual numbering, or to carry debug names.
    fn needs_prologue(&self) -> bool {
        let variables = self.program.variables();
        if variables.iter().any(|v| v.debug_name.is_some()) {
            return true;
        }
        let order = first_appearance_order(self.program);
        order.len() != variables.len() || order.iter().enumerate().any(|(i, v)| v.index() != i)
    }

    fn render_block(&self, block: &BasicBlock, out: &mut String) {
        let _ = writeln!(out, "{}", self.label(block.id));
        if let Some(exception) = block.exception_variable {
            let _ = writeln!(out, "{}{} := exception", INDENT, self.var(exception));
        }
        for phi in &block.phis {
            let incomings: Vec<String> = phi
                .incomings
                .iter()
                .map(|i| format!("{} from {}", self.var(i.value), self.label(i.source)))
                .collect();
            let _ = writeln!(out, "{}{} := phi {}", INDENT, self.var(phi.receiver), incomings.join(", "));
        }

        let mut location: Option<&TextLocation> = None;
        for instruction in &block.instructions {
            if instruction.location.as_ref() != location {
                match &instruction.location {
                    Some(loc) => {
                        let _ = writeln!(out, "{}at '{}' {}", INDENT, escape(&loc.file), loc.line);
                    }
                    None => {
                        let _ = writeln!(out, "{}at unknown location", INDENT);
                    }
                }
                location = instruction.location.as_ref();
            }
            let _ = writeln!(out, "{}{}", INDENT, self.instruction(&instruction.kind));
        }

        for tc in &block.try_catches {
            match &tc.exception_type {
                Some(ty) => {
                    let _ = writeln!(out, "{}catch {} goto {}", INDENT, identifier(ty), self.label(tc.handler));
                }
                None => {
                    let _ = writeln!(out, "{}catch goto {}", INDENT, self.label(tc.handler));
                }
            }
        }
    }

    fn var(&self, id: VariableId) -> String {
        match self.variable_names.get(id.index()) {
            Some(name) => format!("%{}", name),
            None => format!("%{}", id.as_u32()),
        }
    }

    fn label(&self, id: BlockId) -> String {
        match self.block_names.get(id.index()) {
            Some(name) => format!("${}", name),
            None => format!("${}", id.as_u32()),
        }
    }

    fn instruction(&self, kind: &InstructionKind) -> String {
        use InstructionKind::*;
        match kind {
            Nop => "nop".to_string(),
            ClassConstant { receiver, value } => format!("{} := classOf {}", self.var(*receiver), value_type(value)),
            NullConstant { receiver } => format!("{} := null", self.var(*receiver)),
            IntConstant { receiver, value } => format!("{} := {}", self.var(*receiver), value),
            LongConstant { receiver, value } => format!("{} := {}L", self.var(*receiver), value),
            FloatConstant { receiver, value } => format!("{} := {}", self.var(*receiver), float_literal(*value)),
            DoubleConstant { receiver, value } => format!("{} := {}", self.var(*receiver), double_literal(*value)),
            StringConstant { receiver, value } => format!("{} := '{}'", self.var(*receiver), escape(value)),
            Assign { receiver, assignee } => format!("{} := {}", self.var(*receiver), self.var(*assignee)),
            Binary {
                receiver,
                op,
                operand_type,
                first,
                second,
            } => format!(
                "{} := {} {} {} as {}",
                self.var(*receiver),
                self.var(*first),
                op.symbol(),
                self.var(*second),
                operand_type.name()
            ),
            Negate {
                receiver,
                operand_type,
                operand,
            } => format!("{} := - {} as {}", self.var(*receiver), self.var(*operand), operand_type.name()),
            NumericCast { receiver, value, from, to } => format!(
                "{} := cast {} from {} to {}",
                self.var(*receiver),
                self.var(*value),
                from.name(),
                to.name()
            ),
            IntegerCast { receiver, value, target } => {
                format!("{} := cast {} to {}", self.var(*receiver), self.var(*value), target.name())
            }
            Cast { receiver, value, target } => {
                format!("{} := cast {} to {}", self.var(*receiver), self.var(*value), value_type(target))
            }
            IsInstance { receiver, value, target } => {
                format!("{} := {} instanceOf {}", self.var(*receiver), self.var(*value), value_type(target))
            }
            Branch {
                condition,
                operand,
                consequent,
                alternative,
            } => format!(
                "if {} {} then goto {} else goto {}",
                self.var(*operand),
                branch_condition(*condition),
                self.label(*consequent),
                self.label(*alternative)
            ),
            BinaryBranch {
                condition,
                first,
                second,
                consequent,
                alternative,
            } => format!(
                "if {} {} {} then goto {} else goto {}",
                self.var(*first),
                condition.symbol(),
                self.var(*second),
                self.label(*consequent),
                self.label(*alternative)
            ),
            Jump { target } => format!("goto {}", self.label(*target)),
            Switch {
                condition,
                entries,
                default,
            } => {
                let mut text = format!("switch {}", self.var(*condition));
                for entry in entries {
                    let _ = write!(text, " case {} goto {}", entry.condition, self.label(entry.target));
                }
                let _ = write!(text, " else goto {}", self.label(*default));
                text
            }
            Exit { value: Some(value) } => format!("return {}", self.var(*value)),
            Exit { value: None } => "return".to_string(),
            Raise { exception } => format!("throw {}", self.var(*exception)),
            Construct { receiver, class } => format!("{} := new {}", self.var(*receiver), identifier(class)),
            ConstructArray {
                receiver,
                item_type,
                size,
            } => format!(
                "{} := newArray {}[{}]",
                self.var(*receiver),
                value_type(item_type),
                self.var(*size)
            ),
            GetField {
                receiver,
                instance,
                field,
                field_type,
            } => format!(
                "{} := field {}{} as {}",
                self.var(*receiver),
                identifier(&field.to_string()),
                self.optional_var(*instance),
                value_type(field_type)
            ),
            PutField {
                instance,
                field,
                value,
                field_type,
            } => format!(
                "field {}{} := {} as {}",
                identifier(&field.to_string()),
                self.optional_var(*instance),
                self.var(*value),
                value_type(field_type)
            ),
            ArrayLength { receiver, array } => format!("{} := lengthOf {}", self.var(*receiver), self.var(*array)),
            CloneArray { receiver, array } => format!("{} := clone {}", self.var(*receiver), self.var(*array)),
            UnwrapArray {
                receiver,
                array,
                element_type,
            } => format!(
                "{} := data {} as {}",
                self.var(*receiver),
                self.var(*array),
                element_type.name()
            ),
            GetElement {
                receiver,
                array,
                index,
                element_type,
            } => format!(
                "{} := {}[{}] as {}",
                self.var(*receiver),
                self.var(*array),
                self.var(*index),
                element_type.name()
            ),
            PutElement {
                array,
                index,
                value,
                element_type,
            } => format!(
                "{}[{}] := {} as {}",
                self.var(*array),
                self.var(*index),
                self.var(*value),
                element_type.name()
            ),
            Invoke {
                receiver,
                instance,
                method,
                arguments,
                kind,
            } => {
                let mut text = String::new();
                if let Some(receiver) = receiver {
                    let _ = write!(text, "{} := ", self.var(*receiver));
                }
                let _ = write!(text, "{} {}", kind.keyword(), identifier(&method.to_string()));
                let operands: Vec<String> = instance.iter().chain(arguments.iter()).map(|v| self.var(*v)).collect();
                if !operands.is_empty() {
                    let _ = write!(text, " {}", operands.join(", "));
                }
                text
            }
            InitClass { class } => format!("initClass {}", identifier(class)),
            NullCheck { receiver, value } => format!("{} := nullCheck {}", self.var(*receiver), self.var(*value)),
            MonitorEnter { object } => format!("monitorEnter {}", self.var(*object)),
            MonitorExit { object } => format!("monitorExit {}", self.var(*object)),
        }
    }

    fn optional_var(&self, id: Option<VariableId>) -> String {
        id.map(|v| format!(" {}", self.var(v))).unwrap_or_default()
    }
}

/// Variables in the order a reader of the listing first sees them
fn first_appearance_order(program: &Program) -> Vec<VariableId> {
    let mut seen = FxHashSet::default();
    let mut order = Vec::new();
    let mut visit = |v: VariableId| {
        if seen.insert(v) {
            order.push(v);
        }
    };
    for block in program.blocks() {
        if let Some(exception) = block.exception_variable {
            visit(exception);
        }
        for phi in &block.phis {
            visit(phi.receiver);
            for incoming in &phi.incomings {
                visit(incoming.value);
            }
        }
        for instruction in &block.instructions {
            if let Some(receiver) = instruction.receiver() {
                visit(receiver);
            }
            for used in instruction.uses() {
                visit(used);
            }
        }
    }
    order
}

/// Printable names for a list of optional labels, falling back to the index and
/// suffixing duplicates with `_1`, `_2`, ...
fn unique_names<'l>(labels: impl Iterator<Item = Option<&'l str>>) -> Vec<String> {
    let mut used = FxHashSet::default();
    let mut names = Vec::new();
    for (index, label) in labels.enumerate() {
        let base = match label {
            Some(label) if is_plain_label(label) => label.to_string(),
            _ => index.to_string(),
        };
        let mut name = base.clone();
        let mut suffix = 1;
        while used.contains(&name) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        used.insert(name.clone());
        names.push(name);
    }
    names
}

/// Identifier token text, escaped in backticks when it has unusual characters
fn identifier(name: &str) -> String {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$')
        }
        _ => false,
    };
    if plain {
        name.to_string()
    } else {
        format!("`{}`", name)
    }
}

fn value_type(ty: &ValueType) -> String {
    identifier(&ty.to_string())
}

fn branch_condition(condition: BranchCondition) -> &'static str {
    match condition {
        BranchCondition::Equal => "== 0",
        BranchCondition::NotEqual => "!= 0",
        BranchCondition::Less => "< 0",
        BranchCondition::LessOrEqual => "<= 0",
        BranchCondition::Greater => "> 0",
        BranchCondition::GreaterOrEqual => ">= 0",
        BranchCondition::Null => "=== null",
        BranchCondition::NotNull => "!== null",
    }
}

fn double_literal(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        format!("{:?}", value)
    }
}

fn float_literal(value: f32) -> String {
    if value.is_nan() {
        "NaNF".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "InfinityF" } else { "-InfinityF" }.to_string()
    } else {
        format!("{:?}F", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instr::{BinaryOp, NumericType};

    fn constant_add() -> Program {
        let mut program = Program::new();
        let block = program.create_block();
        let a = program.create_variable();
        let b = program.create_variable();
        let c = program.create_variable();
        for (v, name) in [(a, "a"), (b, "b"), (c, "c")] {
            program.variable_mut(v).label = Some(name.to_string());
        }
        let body = program.block_mut(block);
        body.push(InstructionKind::IntConstant { receiver: a, value: 3 });
        body.push(InstructionKind::IntConstant { receiver: b, value: 2 });
        body.push(InstructionKind::Binary {
            receiver: c,
            op: BinaryOp::Add,
            operand_type: NumericType::Int,
            first: a,
            second: b,
        });
        body.push(InstructionKind::Exit { value: Some(c) });
        program
    }

    #[test]
    fn test_print_simple_block() {
        assert_eq!(
            print(&constant_add()),
            "$0\n    %a := 3\n    %b := 2\n    %c := %a + %b as int\n    return %c\n"
        );
    }

    #[test]
    fn test_prologue_for_unused_variable() {
        let mut program = constant_add();
        program.create_variable();
        let text = print(&program);
        assert!(text.starts_with("var %a\nvar %b\nvar %c\nvar %3\n$0\n"));
    }

    #[test]
    fn test_duplicate_labels_get_suffixes() {
        let names = unique_names([Some("x"), Some("x"), None, Some("a.b")].into_iter());
        assert_eq!(names, vec!["x", "x_1", "2", "3"]);
    }

    #[test]
    fn test_literals() {
        assert_eq!(double_literal(1.0), "1.0");
        assert_eq!(double_literal(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(float_literal(0.5), "0.5F");
        assert_eq!(identifier("java.lang.String"), "java.lang.String");
        assert_eq!(identifier("[I"), "`[I`");
    }

    #[test]
    fn test_location_lines() {
        let mut program = constant_add();
        let block = program.block_mut(BlockId::new(0));
        block.instructions[1].location = Some(TextLocation::new("Foo.java", 3));
        block.instructions[2].location = Some(TextLocation::new("Foo.java", 3));
        let text = print(&program);
        assert!(text.contains("    %a := 3\n    at 'Foo.java' 3\n    %b := 2\n    %c :="));
        assert!(text.contains("    at unknown location\n    return %c\n"));
    }
}
