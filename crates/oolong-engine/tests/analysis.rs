//! Dependency analysis integration tests
//!
//! A small class zoo with interface dispatch, a branching factory and an unused
//! implementation. Checks reachability, type sets, monotonic node growth and that the
//! fixpoint does not depend on the worklist order.
//!
//! Run with: cargo test -p oolong-engine --test analysis

use oolong_engine::dependency::{
    ClassHolder, DependencyAnalyzer, DependencyInfo, MemoryClassSource, MethodHolder, WorklistOrder, OBJECT_CLASS,
};
use oolong_engine::ir::listing::parse;
use oolong_engine::ir::{MethodReference, VariableId};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

const SPEAK: &str = "speak()Ljava/lang/Object;";
const ENTRY: &str = "Main.main()V";

fn method(signature: &str, is_static: bool, listing: &str) -> MethodHolder {
    MethodHolder::new(
        signature.parse().expect("valid descriptor"),
        is_static,
        parse(listing).expect("valid listing"),
    )
}

fn speaker(name: &str, sound: &str) -> ClassHolder {
    ClassHolder::new(name).with_interface("Animal").with_method(method(
        SPEAK,
        false,
        &format!("var %0\nvar %1\n$0\n    %1 := new {}\n    return %1\n", sound),
    ))
}

fn zoo() -> MemoryClassSource {
    let animal = ClassHolder {
        is_interface: true,
        is_abstract: true,
        ..ClassHolder::new("Animal")
    }
    .with_method(MethodHolder::abstract_method(SPEAK.parse().expect("valid descriptor")));

    MemoryClassSource::new()
        .with(ClassHolder::new(OBJECT_CLASS))
        .with(animal)
        .with(ClassHolder::new("Bark"))
        .with(ClassHolder::new("Meow"))
        .with(ClassHolder::new("Blub"))
        .with(speaker("Dog", "Bark"))
        .with(speaker("Cat", "Meow"))
        .with(speaker("Fish", "Blub"))
        .with(ClassHolder::new("Zoo").with_method(method(
            "pick(I)LAnimal;",
            true,
            "\
var %0
var %1
var %2
var %3
var %4
$0
    if %1 == 0 then goto $dog else goto $cat
$dog
    %2 := new Dog
    goto $join
$cat
    %3 := new Cat
    goto $join
$join
    %4 := phi %2 from $dog, %3 from $cat
    return %4
",
        )))
        .with(ClassHolder::new("Main").with_method(method(
            "main()V",
            true,
            "\
var %0
var %1
var %2
var %3
$0
    %1 := 0
    %2 := invokeStatic `Zoo.pick(I)LAnimal;` %1
    %3 := invokeVirtual `Animal.speak()Ljava/lang/Object;` %2
    return
",
        )))
}

fn reference(text: &str) -> MethodReference {
    text.parse().expect("valid reference")
}

fn analyze(source: &MemoryClassSource, order: WorklistOrder) -> DependencyInfo {
    let mut analyzer = DependencyAnalyzer::with_order(source, order);
    analyzer.add_entry_point(&reference(ENTRY));
    analyzer.finish()
}

fn sorted(types: &[String]) -> Vec<String> {
    let mut types = types.to_vec();
    types.sort();
    types
}

/// Reachable methods with the sorted type set of every variable
fn summary(info: &DependencyInfo) -> BTreeMap<String, Vec<Vec<String>>> {
    info.methods()
        .iter()
        .map(|method| {
            let variables = method.variables.iter().map(|types| sorted(types)).collect();
            (method.reference.to_string(), variables)
        })
        .collect()
}

#[test]
fn test_interface_dispatch_reaches_instantiated_implementations() {
    let source = zoo();
    let info = analyze(&source, WorklistOrder::Fifo);
    assert!(!info.diagnostics().has_errors(), "{:?}", info.diagnostics());

    assert!(info.is_reachable(&reference("Dog.speak()Ljava/lang/Object;")));
    assert!(info.is_reachable(&reference("Cat.speak()Ljava/lang/Object;")));
    assert!(!info.is_reachable(&reference("Fish.speak()Ljava/lang/Object;")));
    assert!(!info.is_class_reachable("Fish"));
    assert!(!info.is_class_reachable("Blub"));
    assert!(info.is_virtually_called(&SPEAK.parse().expect("valid descriptor")));

    let main = info.method(&reference(ENTRY)).expect("entry reached");
    assert_eq!(sorted(main.variable_types(VariableId::new(2))), vec!["Cat", "Dog"]);
    assert_eq!(sorted(main.variable_types(VariableId::new(3))), vec!["Bark", "Meow"]);
    assert!(main.variable_types(VariableId::new(1)).is_empty());

    let pick = info.method(&reference("Zoo.pick(I)LAnimal;")).expect("factory reached");
    assert_eq!(sorted(&pick.result), vec!["Cat", "Dog"]);
}

#[test]
fn test_nodes_only_grow() {
    let source = zoo();
    let mut analyzer = DependencyAnalyzer::new(&source);
    analyzer.add_entry_point(&reference(ENTRY));

    let mut previous = analyzer.snapshot();
    let mut steps = 0;
    while analyzer.step() {
        let current = analyzer.snapshot();
        assert!(current.len() >= previous.len(), "node removed at step {}", steps);
        for (index, (before, after)) in previous.iter().zip(&current).enumerate() {
            assert!(after >= before, "node {} shrank at step {}", index, steps);
        }
        previous = current;
        steps += 1;
    }
    assert!(steps > 0);
    assert!(analyzer.is_reachable(&reference("Cat.speak()Ljava/lang/Object;")));
}

#[test]
fn test_worklist_order_does_not_change_fixpoint() {
    let source = zoo();
    let fifo = analyze(&source, WorklistOrder::Fifo);
    let lifo = analyze(&source, WorklistOrder::Lifo);

    assert_eq!(summary(&fifo), summary(&lifo));

    let mut fifo_classes = fifo.classes().to_vec();
    let mut lifo_classes = lifo.classes().to_vec();
    fifo_classes.sort();
    lifo_classes.sort();
    assert_eq!(fifo_classes, lifo_classes);
}

#[test]
fn test_unreached_entry_is_reported() {
    let source = zoo();
    let mut analyzer = DependencyAnalyzer::new(&source);
    let handle = analyzer.add_entry_point(&reference("Main.missing()V"));
    assert!(!handle.is_resolved());
    let info = analyzer.finish();
    assert!(info.diagnostics().has_errors());
    assert!(info.methods().is_empty());
}
