//! Analysis results
//!
//! [`DependencyInfo`] is detached from the analyzer: it names everything by method,
//! field and type names rather than arena ids, so results of different runs compare
//! directly.

use super::analyzer::{AnalysisState, MethodEntry, MethodState};
use super::node::NodeKind;
use crate::diagnostics::Diagnostics;
use crate::ir::{FieldReference, MethodDescriptor, MethodReference, VariableId};
use rustc_hash::FxHashMap;

/// Per-method results
#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    /// The method
    pub reference: MethodReference,
    /// How far processing got
    pub state: MethodState,
    /// Whether the method has an IR body
    pub has_body: bool,
    /// Type set of each variable, indexed by variable id
    pub variables: Vec<Vec<String>>,
    /// Types the method may return
    pub result: Vec<String>,
    /// Exception types escaping the method
    pub thrown: Vec<String>,
}

impl MethodInfo {
    /// Types of `variable`, empty if it never held a reference
    pub fn variable_types(&self, variable: VariableId) -> &[String] {
        self.variables.get(variable.index()).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Reachable program and its type sets
#[derive(Debug, Clone, Default)]
pub struct DependencyInfo {
    methods: Vec<MethodInfo>,
    method_index: FxHashMap<MethodReference, usize>,
    classes: Vec<String>,
    fields: FxHashMap<FieldReference, Vec<String>>,
    virtual_calls: Vec<MethodDescriptor>,
    diagnostics: Diagnostics,
}

impl DependencyInfo {
    pub(super) fn collect(
        methods: &[MethodEntry<'_>],
        state: &AnalysisState,
        classes: Vec<String>,
        virtual_calls: Vec<MethodDescriptor>,
        diagnostics: Diagnostics,
    ) -> Self {
        let mut infos: Vec<MethodInfo> = methods
            .iter()
            .map(|m| MethodInfo {
                reference: m.reference.clone(),
                state: m.state,
                has_body: m.holder.program.is_some(),
                variables: vec![Vec::new(); m.holder.program.as_ref().map_or(0, |p| p.variable_count())],
                result: Vec::new(),
                thrown: Vec::new(),
            })
            .collect();
        let mut fields: FxHashMap<FieldReference, Vec<String>> = FxHashMap::default();

        let types = state.types();
        for node in state.nodes() {
            let names = || node.types().iter().map(|&ty| types.name(ty).to_string());
            match &node.kind {
                NodeKind::Variable(method, variable) => {
                    let slots = &mut infos[method.index()].variables;
                    if slots.len() <= variable.index() {
                        slots.resize(variable.index() + 1, Vec::new());
                    }
                    slots[variable.index()] = names().collect();
                }
                NodeKind::Result(method) => infos[method.index()].result = names().collect(),
                NodeKind::Thrown(method) => infos[method.index()].thrown = names().collect(),
                NodeKind::InstanceField(_, field) | NodeKind::StaticField(field) => {
                    let entry = fields.entry(field.clone()).or_default();
                    for name in names() {
                        if !entry.contains(&name) {
                            entry.push(name);
                        }
                    }
                }
                NodeKind::CallExceptions(..) | NodeKind::ArrayElement(_) | NodeKind::Free(_) => {}
            }
        }

        let method_index = infos
            .iter()
            .enumerate()
            .map(|(index, info)| (info.reference.clone(), index))
            .collect();
        Self {
            methods: infos,
            method_index,
            classes,
            fields,
            virtual_calls,
            diagnostics,
        }
    }

    /// Reachable methods in discovery order
    pub fn methods(&self) -> &[MethodInfo] {
        &self.methods
    }

    /// Results of one method, if it was reached
    pub fn method(&self, reference: &MethodReference) -> Option<&MethodInfo> {
        self.method_index.get(reference).map(|&i| &self.methods[i])
    }

    /// Whether `reference` was reached
    pub fn is_reachable(&self, reference: &MethodReference) -> bool {
        self.method_index.contains_key(reference)
    }

    /// Linked classes and array types in link order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Whether `class` was linked
    pub fn is_class_reachable(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Types stored into `field`, across all receiver classes
    pub fn field_types(&self, field: &FieldReference) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Descriptors that appear at virtual call sites, in first-seen order
    pub fn virtual_calls(&self) -> &[MethodDescriptor] {
        &self.virtual_calls
    }

    /// Whether some virtual call site uses `descriptor`
    pub fn is_virtually_called(&self, descriptor: &MethodDescriptor) -> bool {
        self.virtual_calls.contains(descriptor)
    }

    /// Problems found during analysis
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{ClassHolder, DependencyAnalyzer, MemoryClassSource, MethodHolder};
    use crate::ir::listing::parse;
    use crate::ir::ValueType;

    #[test]
    fn test_collect_results() {
        let main = parse(
            "var %0\nvar %1\nvar %2\n$0\n    %1 := new Foo\n    field Foo.next %1 := %1 as `LFoo;`\n    %2 := invokeVirtual `Foo.self()LFoo;` %1\n    return\n",
        )
        .expect("valid listing");
        let this = parse("var %0\n$0\n    return %0\n").expect("valid listing");
        let source = MemoryClassSource::new()
            .with(ClassHolder::new("java.lang.Object"))
            .with(
                ClassHolder::new("Foo")
                    .with_field("next", ValueType::object("Foo"), false)
                    .with_method(MethodHolder::new("self()LFoo;".parse().expect("descriptor"), false, this)),
            )
            .with(ClassHolder::new("Main").with_method(MethodHolder::new("main()V".parse().expect("descriptor"), true, main)));

        let mut analyzer = DependencyAnalyzer::new(&source);
        analyzer.add_entry_point(&"Main.main()V".parse().expect("reference"));
        let info = analyzer.finish();

        let names: Vec<String> = info.methods().iter().map(|m| m.reference.to_string()).collect();
        assert_eq!(names, vec!["Main.main()V", "Foo.self()LFoo;"]);
        assert!(info.methods().iter().all(|m| m.state == MethodState::Stable));

        let main = info.method(&"Main.main()V".parse().expect("reference")).expect("reachable");
        assert_eq!(main.variable_types(VariableId::new(2)), &["Foo".to_string()]);
        assert_eq!(main.variable_types(VariableId::new(9)), &[] as &[String]);
        assert_eq!(info.field_types(&FieldReference::new("Foo", "next")), &["Foo".to_string()]);
        assert_eq!(info.classes(), &["Main", "java.lang.Object", "Foo"]);
        assert!(info.is_virtually_called(&"self()LFoo;".parse().expect("descriptor")));
        assert!(info.diagnostics().is_empty());
    }
}
