//! Listing format and optimizer fixtures
//!
//! Each `tests/fixtures/<name>.original.txt` is parsed, optimized at the basic level and
//! printed; the result must match `<name>.expected.txt` after both are normalized
//! through parse and print.
//!
//! Run with: cargo test -p oolong-engine --test listing

use oolong_engine::ir::listing::{parse, print};
use oolong_engine::ir::optimize::Optimizer;
use oolong_engine::ir::{
    ArrayElementType, BinaryBranchCondition, BinaryOp, BlockId, BranchCondition, FieldReference, Incoming,
    Instruction, InstructionKind, IntegerSubtype, InvocationKind, MethodReference, NumericType, Phi, PrimitiveType,
    Program, SwitchEntry, TextLocation, TryCatch, ValueType, VariableId,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::path::PathBuf;

fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("cannot read {}: {}", path.display(), e))
}

fn normalize(text: &str) -> String {
    print(&parse(text).expect("valid listing"))
}

fn check_fixture(name: &str) {
    let original = fixture(&format!("{}.original.txt", name));
    let expected = fixture(&format!("{}.expected.txt", name));
    let mut program = parse(&original).expect("valid original listing");
    Optimizer::basic().optimize(&mut program);
    assert_eq!(normalize(&print(&program)), normalize(&expected), "fixture {}", name);
}

// =============================================================================
// OPTIMIZER FIXTURES
// =============================================================================

#[test]
fn test_constant_add() {
    check_fixture("constant_add");
}

#[test]
fn test_constant_chain() {
    check_fixture("constant_chain");
}

#[test]
fn test_division_kept() {
    check_fixture("division_kept");
}

// =============================================================================
// ROUND TRIP
// =============================================================================

const LOOP: &str = "\
var %n as count
var %i
var %sum
var %one
var %next
var %total
$entry
    %i := 0
    %sum := 0
    goto $head
$head
    %total := phi %sum from $entry, %next from $body
    if %i >= 0 then goto $exit else goto $body
$body
    at 'Loop.java' 12
    %one := 1
    %next := %total + %one as int
    goto $head
$exit
    at unknown location
    return %total
";

const HANDLERS: &str = "\
var %0
var %1
var %2
var %3
$0
    %1 := new java.lang.Object
    %2 := invokeVirtual `java.lang.Object.hashCode()I` %1
    goto $2
    catch java.lang.RuntimeException goto $1
    catch goto $1
$1
    %3 := exception
    throw %3
$2
    return %2
";

#[test]
fn test_roundtrip_is_stable() {
    for source in [LOOP, HANDLERS] {
        let printed = print(&parse(source).expect("valid listing"));
        assert_eq!(print(&parse(&printed).expect("printed listing parses")), printed);
    }
}

#[test]
fn test_roundtrip_preserves_structure() {
    let program = parse(LOOP).expect("valid listing");
    let printed = print(&program);
    let reparsed = parse(&printed).expect("printed listing parses");
    assert_eq!(reparsed.block_count(), program.block_count());
    assert_eq!(reparsed.variable_count(), program.variable_count());
    for (a, b) in program.blocks().iter().zip(reparsed.blocks()) {
        assert_eq!(a.phis, b.phis);
        assert_eq!(a.instructions, b.instructions);
        assert_eq!(a.try_catches, b.try_catches);
    }
    assert!(printed.contains("var %n as count"));
    assert!(printed.contains("at 'Loop.java' 12"));
}

#[test]
fn test_parse_error_offset() {
    let source = "$0\n    %a := 1\n    %b := %a +\n    return\n";
    let error = parse(source).expect_err("missing operand");
    assert!(error.offset >= source.find("%b").expect("present"));
    assert!(error.offset <= source.len());
}

// ============================================================================
// Generated programs
// ============================================================================

fn variable(count: u32) -> impl Strategy<Value = VariableId> + Clone {
    (0..count).prop_map(VariableId::new)
}

fn block(count: u32) -> impl Strategy<Value = BlockId> + Clone {
    (0..count).prop_map(BlockId::new)
}

fn value_type() -> impl Strategy<Value = ValueType> {
    let leaf = prop_oneof![
        prop::sample::select(PrimitiveType::ALL.to_vec()).prop_map(ValueType::Primitive),
        prop::sample::select(vec!["java.lang.String", "Foo", "org.example.Widget"]).prop_map(|class| ValueType::object(class)),
    ];
    leaf.prop_recursive(2, 4, 1, |item| item.prop_map(ValueType::array))
}

fn method() -> impl Strategy<Value = MethodReference> {
    prop::sample::select(vec![
        "Util.max(II)I",
        "java.lang.Object.hashCode()I",
        "Foo.<init>(Ljava/lang/String;)V",
        "Foo.fill([JD)[Ljava/lang/Object;",
    ])
    .prop_map(|text| text.parse::<MethodReference>().expect("valid reference"))
}

fn numeric_type() -> impl Strategy<Value = NumericType> {
    prop::sample::select(vec![NumericType::Int, NumericType::Long, NumericType::Float, NumericType::Double])
}

fn element_type() -> impl Strategy<Value = ArrayElementType> {
    prop::sample::select(vec![
        ArrayElementType::Char,
        ArrayElementType::Byte,
        ArrayElementType::Short,
        ArrayElementType::Int,
        ArrayElementType::Long,
        ArrayElementType::Float,
        ArrayElementType::Double,
        ArrayElementType::Object,
    ])
}

fn field() -> impl Strategy<Value = (FieldReference, ValueType)> {
    prop::sample::select(vec![("Foo", "count", "I"), ("org.example.Widget", "parent", "Lorg/example/Widget;")])
        .prop_map(|(class, name, ty)| (FieldReference::new(class, name), ty.parse::<ValueType>().expect("valid type")))
}

/// NaN is left out since it never compares equal to itself
fn constant(r: VariableId) -> impl Strategy<Value = InstructionKind> {
    prop_oneof![
        prop_oneof![Just(i32::MIN), Just(i32::MAX), Just(0), any::<i32>()]
            .prop_map(move |value| InstructionKind::IntConstant { receiver: r, value }),
        prop_oneof![Just(i64::MIN), Just(i64::MAX), any::<i64>()]
            .prop_map(move |value| InstructionKind::LongConstant { receiver: r, value }),
        prop_oneof![
            Just(f32::MAX),
            Just(f32::MIN),
            Just(f32::MIN_POSITIVE),
            Just(f32::INFINITY),
            Just(f32::NEG_INFINITY),
            any::<f32>().prop_filter("not NaN", |v| !v.is_nan()),
        ]
        .prop_map(move |value| InstructionKind::FloatConstant { receiver: r, value }),
        prop_oneof![
            Just(f64::MAX),
            Just(f64::MIN_POSITIVE),
            Just(f64::NEG_INFINITY),
            Just(5e-324),
            any::<f64>().prop_filter("not NaN", |v| !v.is_nan()),
        ]
        .prop_map(move |value| InstructionKind::DoubleConstant { receiver: r, value }),
        any::<String>().prop_map(move |value| InstructionKind::StringConstant { receiver: r, value }),
        value_type().prop_map(move |value| InstructionKind::ClassConstant { receiver: r, value }),
        Just(InstructionKind::NullConstant { receiver: r }),
    ]
}

fn arithmetic(r: VariableId, v: impl Strategy<Value = VariableId> + Clone) -> impl Strategy<Value = InstructionKind> {
    prop_oneof![
        v.clone().prop_map(move |assignee| InstructionKind::Assign { receiver: r, assignee }),
        (prop::sample::select(BinaryOp::ALL.to_vec()), numeric_type(), v.clone(), v.clone()).prop_map(
            move |(op, operand_type, first, second)| InstructionKind::Binary {
                receiver: r,
                op,
                operand_type,
                first,
                second,
            }
        ),
        (numeric_type(), v.clone()).prop_map(move |(operand_type, operand)| InstructionKind::Negate {
            receiver: r,
            operand_type,
            operand,
        }),
        (v.clone(), numeric_type(), numeric_type())
            .prop_map(move |(value, from, to)| InstructionKind::NumericCast { receiver: r, value, from, to }),
        (
            v.clone(),
            prop::sample::select(vec![IntegerSubtype::Byte, IntegerSubtype::Short, IntegerSubtype::Char])
        )
            .prop_map(move |(value, target)| InstructionKind::IntegerCast { receiver: r, value, target }),
        (v.clone(), value_type()).prop_map(move |(value, target)| InstructionKind::Cast { receiver: r, value, target }),
        (v.clone(), value_type())
            .prop_map(move |(value, target)| InstructionKind::IsInstance { receiver: r, value, target }),
        v.prop_map(move |value| InstructionKind::NullCheck { receiver: r, value }),
    ]
}

fn control(v: impl Strategy<Value = VariableId> + Clone, b: impl Strategy<Value = BlockId> + Clone) -> impl Strategy<Value = InstructionKind> {
    let branch = prop::sample::select(vec![
        BranchCondition::Equal,
        BranchCondition::NotEqual,
        BranchCondition::Less,
        BranchCondition::LessOrEqual,
        BranchCondition::Greater,
        BranchCondition::GreaterOrEqual,
        BranchCondition::Null,
        BranchCondition::NotNull,
    ]);
    let binary_branch = prop::sample::select(vec![
        BinaryBranchCondition::Equal,
        BinaryBranchCondition::NotEqual,
        BinaryBranchCondition::ReferenceEqual,
        BinaryBranchCondition::ReferenceNotEqual,
    ]);
    prop_oneof![
        Just(InstructionKind::Nop),
        b.clone().prop_map(|target| InstructionKind::Jump { target }),
        (branch, v.clone(), b.clone(), b.clone()).prop_map(|(condition, operand, consequent, alternative)| {
            InstructionKind::Branch {
                condition,
                operand,
                consequent,
                alternative,
            }
        }),
        (binary_branch, v.clone(), v.clone(), b.clone(), b.clone()).prop_map(
            |(condition, first, second, consequent, alternative)| InstructionKind::BinaryBranch {
                condition,
                first,
                second,
                consequent,
                alternative,
            }
        ),
        (
            v.clone(),
            prop::collection::vec((any::<i32>(), b.clone()), 0..4),
            b
        )
            .prop_map(|(condition, cases, default)| InstructionKind::Switch {
                condition,
                entries: cases
                    .into_iter()
                    .map(|(condition, target)| SwitchEntry { condition, target })
                    .collect(),
                default,
            }),
        prop::option::of(v.clone()).prop_map(|value| InstructionKind::Exit { value }),
        v.clone().prop_map(|exception| InstructionKind::Raise { exception }),
        v.clone().prop_map(|object| InstructionKind::MonitorEnter { object }),
        v.prop_map(|object| InstructionKind::MonitorExit { object }),
    ]
}

fn objects(r: VariableId, v: impl Strategy<Value = VariableId> + Clone) -> impl Strategy<Value = InstructionKind> {
    let class = prop::sample::select(vec!["java.lang.Object", "Foo", "org.example.Widget"]).prop_map(String::from);
    prop_oneof![
        class.clone().prop_map(move |class| InstructionKind::Construct { receiver: r, class }),
        class.prop_map(|class| InstructionKind::InitClass { class }),
        (value_type(), v.clone())
            .prop_map(move |(item_type, size)| InstructionKind::ConstructArray { receiver: r, item_type, size }),
        (prop::option::of(v.clone()), field()).prop_map(move |(instance, (field, field_type))| {
            InstructionKind::GetField {
                receiver: r,
                instance,
                field,
                field_type,
            }
        }),
        (prop::option::of(v.clone()), field(), v.clone()).prop_map(|(instance, (field, field_type), value)| {
            InstructionKind::PutField {
                instance,
                field,
                value,
                field_type,
            }
        }),
        v.clone().prop_map(move |array| InstructionKind::ArrayLength { receiver: r, array }),
        v.clone().prop_map(move |array| InstructionKind::CloneArray { receiver: r, array }),
        (v.clone(), element_type()).prop_map(move |(array, element_type)| InstructionKind::UnwrapArray {
            receiver: r,
            array,
            element_type,
        }),
        (v.clone(), v.clone(), element_type()).prop_map(move |(array, index, element_type)| {
            InstructionKind::GetElement {
                receiver: r,
                array,
                index,
                element_type,
            }
        }),
        (v.clone(), v.clone(), v, element_type()).prop_map(|(array, index, value, element_type)| {
            InstructionKind::PutElement {
                array,
                index,
                value,
                element_type,
            }
        }),
    ]
}

fn invoke(r: VariableId, v: impl Strategy<Value = VariableId> + Clone) -> impl Strategy<Value = InstructionKind> {
    let kind = prop::sample::select(vec![InvocationKind::Static, InvocationKind::Special, InvocationKind::Virtual]);
    (kind, method(), any::<bool>(), v.clone(), prop::collection::vec(v, 0..3)).prop_map(
        move |(kind, method, has_receiver, instance, arguments)| InstructionKind::Invoke {
            receiver: has_receiver.then_some(r),
            instance: (kind != InvocationKind::Static).then_some(instance),
            method,
            arguments,
            kind,
        },
    )
}

fn instruction(variables: u32, blocks: u32) -> impl Strategy<Value = InstructionKind> {
    variable(variables).prop_flat_map(move |r| {
        let v = variable(variables);
        prop_oneof![
            constant(r),
            arithmetic(r, v.clone()),
            control(v.clone(), block(blocks)),
            objects(r, v.clone()),
            invoke(r, v),
        ]
    })
}

fn location() -> impl Strategy<Value = Option<TextLocation>> {
    prop::option::of(
        (prop::sample::select(vec!["Main.java", "src/it's here.java"]), 0u32..10_000)
            .prop_map(|(file, line)| TextLocation::new(file, line)),
    )
}

#[derive(Debug, Clone)]
struct BlockShape {
    labelled: bool,
    exception_variable: Option<VariableId>,
    phis: Vec<Phi>,
    instructions: Vec<Instruction>,
    try_catches: Vec<TryCatch>,
}

fn block_shape(variables: u32, blocks: u32) -> impl Strategy<Value = BlockShape> {
    let phi = (
        variable(variables),
        prop::collection::vec((block(blocks), variable(variables)), 1..3),
    )
        .prop_map(|(receiver, incomings)| Phi {
            receiver,
            incomings: incomings.into_iter().map(|(source, value)| Incoming { source, value }).collect(),
        });
    let try_catch = (
        prop::option::of(prop::sample::select(vec!["java.lang.Throwable", "Oops"]).prop_map(String::from)),
        block(blocks),
    )
        .prop_map(|(exception_type, handler)| TryCatch { exception_type, handler });
    (
        any::<bool>(),
        prop::option::of(variable(variables)),
        prop::collection::vec(phi, 0..2),
        prop::collection::vec((instruction(variables, blocks), location()), 0..8),
        prop::collection::vec(try_catch, 0..3),
    )
        .prop_map(|(labelled, exception_variable, phis, instructions, try_catches)| BlockShape {
            labelled,
            exception_variable,
            phis,
            instructions: instructions.into_iter().map(|(kind, at)| Instruction::at(kind, at)).collect(),
            try_catches,
        })
}

fn program() -> impl Strategy<Value = Program> {
    (1u32..10, 1u32..5).prop_flat_map(|(variables, blocks)| {
        (
            prop::collection::vec(
                (any::<bool>(), prop::option::of(prop::sample::select(vec!["count", "index", "loop counter"]))),
                variables as usize,
            ),
            prop::collection::vec(block_shape(variables, blocks), blocks as usize),
        )
            .prop_map(|(variable_names, shapes)| {
                let mut program = Program::new();
                for (index, (labelled, debug_name)) in variable_names.into_iter().enumerate() {
                    let id = program.create_variable();
                    let variable = program.variable_mut(id);
                    variable.label = labelled.then(|| format!("v{}", index));
                    variable.debug_name = debug_name.map(String::from);
                }
                for (index, shape) in shapes.into_iter().enumerate() {
                    let id = program.create_block();
                    let block = program.block_mut(id);
                    block.label = shape.labelled.then(|| format!("{}{}", ["loop", "handler", "exit"][index % 3], index));
                    block.exception_variable = shape.exception_variable;
                    block.phis = shape.phis;
                    block.instructions = shape.instructions;
                    block.try_catches = shape.try_catches;
                }
                program
            })
    })
}

proptest! {
    #[test]
    fn generated_program_roundtrips(program in program()) {
        let printed = print(&program);
        let reparsed = parse(&printed).map_err(|e| TestCaseError::fail(format!("{} in\n{}", e, printed)))?;
        prop_assert_eq!(&reparsed, &program, "listing:\n{}", printed);
        prop_assert_eq!(print(&reparsed), printed);
    }
}
