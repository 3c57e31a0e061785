//! Worklist solver
//!
//! # Structure
//!
//! - [`AnalysisState`]: node and constraint arenas plus the worklist
//! - [`DependencyAnalyzer`]: method reachability, class linking, body translation and
//!   constraint application on top of the state
//! - [`EntryPoint`]: handle for seeding argument types of an entry method

use super::classes::{ClassHierarchy, ClassSource, MethodHolder, CLASS_CLASS, OBJECT_CLASS, STRING_CLASS};
use super::constraint::{CatchHandler, Constraint, ConstraintEntry, ConstraintId, InvokeSite};
use super::info::DependencyInfo;
use super::node::{MethodId, Node, NodeId, NodeKind, TypeId, TypeTable};
use crate::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticParam, Diagnostics};
use crate::ir::{
    ArrayElementType, BasicBlock, FieldReference, InstructionKind, InvocationKind, MethodDescriptor,
    MethodReference, Program, TextLocation, ValueType, VariableId,
};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use std::collections::VecDeque;
use tracing::{debug, info, trace};

/// Order in which queued constraints are taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorklistOrder {
    /// Oldest constraint first
    #[default]
    Fifo,
    /// Newest constraint first
    Lifo,
}

/// Progress of a reached method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodState {
    /// Reached, body not translated yet
    Reached,
    /// Body translated into constraints
    ConstraintsGenerated,
    /// Fixpoint reached with all its constraints applied
    Stable,
}

// ============================================================================
// Analysis state
// ============================================================================

/// Node and constraint arenas of one analysis run
#[derive(Debug, Default)]
pub struct AnalysisState {
    types: TypeTable,
    nodes: Vec<Node>,
    node_index: FxHashMap<NodeKind, NodeId>,
    constraints: Vec<ConstraintEntry>,
    worklist: VecDeque<ConstraintId>,
    copy_edges: FxHashSet<(NodeId, NodeId)>,
    free_nodes: u32,
}

impl AnalysisState {
    /// Empty arenas and worklist
    pub fn new() -> Self {
        Self::default()
    }

    /// Interned type names
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Id for a type name, interning it on first use
    pub fn intern_type(&mut self, name: &str) -> TypeId {
        self.types.intern(name)
    }

    /// Node for `kind`, created on first request
    pub fn node(&mut self, kind: NodeKind) -> NodeId {
        if let Some(&id) = self.node_index.get(&kind) {
            return id;
        }
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(Node::new(kind.clone()));
        self.node_index.insert(kind, id);
        id
    }

    /// Node not tied to any program element
    pub fn create_node(&mut self) -> NodeId {
        let kind = NodeKind::Free(self.free_nodes);
        self.free_nodes += 1;
        self.node(kind)
    }

    /// Existing node for `kind`
    pub fn find_node(&self, kind: &NodeKind) -> Option<NodeId> {
        self.node_index.get(kind).copied()
    }

    /// Node by id.
    ///
    /// # Panics
    ///
    /// If the id did not come from this state.
    pub fn get(&self, node: NodeId) -> &Node {
        &self.nodes[node.index()]
    }

    /// All nodes, indexed by [`NodeId`]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of registered constraints
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Add `ty` to `node`, queueing its readers if the set grew
    pub fn add_type(&mut self, node: NodeId, ty: TypeId) -> bool {
        let target = &mut self.nodes[node.index()];
        if !target.insert(ty) {
            return false;
        }
        let consumers = target.consumers.clone();
        for consumer in consumers {
            self.enqueue(ConstraintId::new(consumer as u32));
        }
        true
    }

    /// Register a constraint and queue it
    pub fn add_constraint(&mut self, constraint: Constraint, location: Option<TextLocation>) -> ConstraintId {
        let id = ConstraintId::new(self.constraints.len() as u32);
        if let Some(input) = constraint.input() {
            self.nodes[input.index()].consumers.push(id.index());
        }
        self.constraints.push(ConstraintEntry::new(constraint, location));
        self.enqueue(id);
        id
    }

    /// Copy edge `source -> target`, added at most once
    pub fn copy(&mut self, source: NodeId, target: NodeId) {
        if source != target && self.copy_edges.insert((source, target)) {
            self.add_constraint(Constraint::Copy { source, target }, None);
        }
    }

    fn enqueue(&mut self, id: ConstraintId) {
        let entry = &mut self.constraints[id.index()];
        if !entry.queued {
            entry.queued = true;
            self.worklist.push_back(id);
        }
    }

    fn pop(&mut self, order: WorklistOrder) -> Option<ConstraintId> {
        let id = match order {
            WorklistOrder::Fifo => self.worklist.pop_front(),
            WorklistOrder::Lifo => self.worklist.pop_back(),
        }?;
        self.constraints[id.index()].queued = false;
        Some(id)
    }

    /// Number of queued constraints
    pub fn pending(&self) -> usize {
        self.worklist.len()
    }

    /// Size of every node, indexed by node id
    pub fn snapshot(&self) -> Vec<usize> {
        self.nodes.iter().map(Node::len).collect()
    }
}

// ============================================================================
// Analyzer
// ============================================================================

pub(super) struct MethodEntry<'a> {
    pub reference: MethodReference,
    pub holder: &'a MethodHolder,
    pub state: MethodState,
}

/// Whole-program reachability and points-to analysis
pub struct DependencyAnalyzer<'a> {
    hierarchy: ClassHierarchy<'a>,
    state: AnalysisState,
    order: WorklistOrder,
    methods: Vec<MethodEntry<'a>>,
    method_index: FxHashMap<MethodReference, MethodId>,
    pending_methods: VecDeque<MethodId>,
    classes: Vec<String>,
    linked: FxHashSet<String>,
    missing: FxHashSet<String>,
    virtual_calls: Vec<MethodDescriptor>,
    virtual_call_set: FxHashSet<MethodDescriptor>,
    diagnostics: Diagnostics,
}

impl<'a> DependencyAnalyzer<'a> {
    /// Analyzer over `classes` with FIFO order
    pub fn new(classes: &'a dyn ClassSource) -> Self {
        Self::with_order(classes, WorklistOrder::Fifo)
    }

    /// Analyzer over `classes` taking queued constraints in `order`
    pub fn with_order(classes: &'a dyn ClassSource, order: WorklistOrder) -> Self {
        Self {
            hierarchy: ClassHierarchy::new(classes),
            state: AnalysisState::new(),
            order,
            methods: Vec::new(),
            method_index: FxHashMap::default(),
            pending_methods: VecDeque::new(),
            classes: Vec::new(),
            linked: FxHashSet::default(),
            missing: FxHashSet::default(),
            virtual_calls: Vec::new(),
            virtual_call_set: FxHashSet::default(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Worklist order in use
    pub fn order(&self) -> WorklistOrder {
        self.order
    }

    /// Nodes, constraints and interned types built so far
    pub fn state(&self) -> &AnalysisState {
        &self.state
    }

    /// Problems found so far
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    // ===== Public API =====

    /// Reach `method` as an entry point. A missing method is reported and yields a
    /// handle whose [`EntryPoint::propagate`] does nothing.
    pub fn add_entry_point(&mut self, method: &MethodReference) -> EntryPoint<'_, 'a> {
        info!("Entry point {}", method);
        let id = self.reach_method(method, None);
        EntryPoint { analyzer: self, method: id }
    }

    /// Register an extra constraint
    pub fn add_constraint(&mut self, constraint: Constraint) -> ConstraintId {
        self.state.add_constraint(constraint, None)
    }

    /// Node not tied to any program element
    pub fn create_node(&mut self) -> NodeId {
        self.state.create_node()
    }

    /// Id for a type name, interning it on first use
    pub fn intern_type(&mut self, name: &str) -> TypeId {
        self.state.intern_type(name)
    }

    /// Node of variable `variable` in a reached method
    pub fn variable_node(&mut self, method: MethodId, variable: VariableId) -> NodeId {
        self.state.node(NodeKind::Variable(method, variable))
    }

    /// Node of the values `method` returns
    pub fn result_node(&mut self, method: MethodId) -> NodeId {
        self.state.node(NodeKind::Result(method))
    }

    /// Node of the exceptions escaping `method`
    pub fn thrown_node(&mut self, method: MethodId) -> NodeId {
        self.state.node(NodeKind::Thrown(method))
    }

    /// Type names in `node`, in arrival order
    pub fn node_types(&self, node: NodeId) -> Vec<&str> {
        let types = self.state.types();
        self.state.get(node).types().iter().map(|&ty| types.name(ty)).collect()
    }

    /// Id of a reached method
    pub fn method_id(&self, method: &MethodReference) -> Option<MethodId> {
        self.method_index.get(method).copied()
    }

    /// Progress of a reached method
    pub fn method_state(&self, method: &MethodReference) -> Option<MethodState> {
        self.method_id(method).map(|id| self.methods[id.index()].state)
    }

    /// Whether `method` was reached
    pub fn is_reachable(&self, method: &MethodReference) -> bool {
        self.method_index.contains_key(method)
    }

    /// Reached methods in discovery order
    pub fn reachable_methods(&self) -> impl Iterator<Item = &MethodReference> {
        self.methods.iter().map(|m| &m.reference)
    }

    /// Whether `class` was linked
    pub fn is_class_linked(&self, class: &str) -> bool {
        self.linked.contains(class)
    }

    /// Size of every node, indexed by node id
    pub fn snapshot(&self) -> Vec<usize> {
        self.state.snapshot()
    }

    /// Translate one pending method body or apply one queued constraint. Returns
    /// `false` when there was nothing to do.
    pub fn step(&mut self) -> bool {
        if let Some(method) = self.pending_methods.pop_front() {
            self.translate(method);
            return true;
        }
        match self.state.pop(self.order) {
            Some(constraint) => {
                self.apply(constraint);
                true
            }
            None => false,
        }
    }

    /// Step until the fixpoint, then mark all translated methods stable
    pub fn run(&mut self) {
        let mut steps = 0usize;
        while self.step() {
            steps += 1;
        }
        for method in &mut self.methods {
            if method.state == MethodState::ConstraintsGenerated {
                method.state = MethodState::Stable;
            }
        }
        info!(
            "Dependency analysis reached fixpoint after {} steps: {} methods, {} classes, {} nodes, {} constraints",
            steps,
            self.methods.len(),
            self.classes.len(),
            self.state.nodes().len(),
            self.state.constraint_count()
        );
    }

    /// Run to the fixpoint and collect the results
    pub fn finish(mut self) -> DependencyInfo {
        self.run();
        DependencyInfo::collect(
            &self.methods,
            &self.state,
            self.classes,
            self.virtual_calls,
            self.diagnostics,
        )
    }

    // ===== Reachability =====

    fn reach_method(&mut self, reference: &MethodReference, location: Option<TextLocation>) -> Option<MethodId> {
        if let Some(&id) = self.method_index.get(reference) {
            return Some(id);
        }
        let Some(holder) = self.hierarchy.method(reference) else {
            self.method_not_found(reference.clone(), location);
            return None;
        };
        let id = MethodId::new(self.methods.len() as u32);
        debug!("Reached method {}", reference);
        self.methods.push(MethodEntry {
            reference: reference.clone(),
            holder,
            state: MethodState::Reached,
        });
        self.method_index.insert(reference.clone(), id);
        self.pending_methods.push_back(id);
        self.link_class(&reference.class, location);
        Some(id)
    }

    /// Mark a class (or array type) as used, linking its supertypes and reaching its
    /// initializer
    fn link_class(&mut self, name: &str, location: Option<TextLocation>) {
        if self.linked.contains(name) || self.missing.contains(name) {
            return;
        }
        if name.starts_with('[') {
            self.linked.insert(name.to_string());
            self.classes.push(name.to_string());
            let mut ty = ValueType::from_class_name(name).ok();
            while let Some(ValueType::Array(item)) = ty {
                ty = Some(*item);
            }
            if let Some(ValueType::Object(item)) = ty {
                self.link_class(&item, location);
            }
            return;
        }

        let Some(holder) = self.hierarchy.get(name) else {
            self.missing.insert(name.to_string());
            self.diagnostics.report(
                Diagnostic::error("Class {0} was not found")
                    .with_code(DiagnosticCode::CLASS_NOT_FOUND)
                    .with_location(location)
                    .with_param(DiagnosticParam::Class(name.to_string())),
            );
            return;
        };
        debug!("Linked class {}", name);
        self.linked.insert(name.to_string());
        self.classes.push(name.to_string());

        if let Some(parent) = &holder.parent {
            self.link_class(parent, None);
        }
        for interface in &holder.interfaces {
            self.link_class(interface, None);
        }
        let initializer = MethodDescriptor::new("<clinit>", Vec::new(), ValueType::Void);
        if holder.method(&initializer).is_some() {
            self.reach_method(&MethodReference::new(name, initializer), None);
        }
    }

    fn method_not_found(&mut self, method: MethodReference, location: Option<TextLocation>) {
        self.diagnostics.report(
            Diagnostic::error("Method {0} was not found")
                .with_code(DiagnosticCode::METHOD_NOT_FOUND)
                .with_location(location)
                .with_param(DiagnosticParam::Method(method)),
        );
    }

    fn field_not_found(&mut self, field: FieldReference, location: Option<TextLocation>) {
        self.diagnostics.report(
            Diagnostic::error("Field {0} was not found")
                .with_code(DiagnosticCode::FIELD_NOT_FOUND)
                .with_location(location)
                .with_param(DiagnosticParam::Field(field)),
        );
    }

    // ===== Body translation =====

    fn translate(&mut self, method: MethodId) {
        let entry = &self.methods[method.index()];
        let holder = entry.holder;
        trace!("Translating {}", entry.reference);
        if let Some(program) = &holder.program {
            for block in program.blocks() {
                self.translate_block(method, program, block);
            }
        }
        self.methods[method.index()].state = MethodState::ConstraintsGenerated;
    }

    fn var(&mut self, method: MethodId, variable: VariableId) -> NodeId {
        self.state.node(NodeKind::Variable(method, variable))
    }

    fn copy_var(&mut self, method: MethodId, source: VariableId, target: VariableId) {
        let source = self.var(method, source);
        let target = self.var(method, target);
        self.state.copy(source, target);
    }

    fn allocate(&mut self, method: MethodId, class: &str, receiver: VariableId, location: Option<TextLocation>) {
        let ty = self.state.intern_type(class);
        let target = self.var(method, receiver);
        self.state.add_constraint(Constraint::Allocate { ty, target }, location);
    }

    fn translate_block(&mut self, method: MethodId, program: &'a Program, block: &'a BasicBlock) {
        for phi in &block.phis {
            for incoming in &phi.incomings {
                self.copy_var(method, incoming.value, phi.receiver);
            }
        }

        // Nodes whose values may leave the block as exceptions
        let mut throw_sites = Vec::new();

        for (index, instruction) in block.instructions.iter().enumerate() {
            let location = instruction.location.clone();
            match &instruction.kind {
                InstructionKind::ClassConstant { receiver, value } => {
                    let target = self.var(method, *receiver);
                    self.state.add_constraint(
                        Constraint::ClassConstant {
                            class: value.class_name(),
                            target,
                        },
                        location,
                    );
                }
                InstructionKind::StringConstant { receiver, .. } => {
                    self.allocate(method, STRING_CLASS, *receiver, location);
                }
                InstructionKind::Assign { receiver, assignee } => self.copy_var(method, *assignee, *receiver),
                InstructionKind::Cast { receiver, value, target } => {
                    if target.is_reference() {
                        let class = target.class_name();
                        self.link_class(&class, location.clone());
                        let source = self.var(method, *value);
                        let target = self.var(method, *receiver);
                        self.state
                            .add_constraint(Constraint::IsSubtype { source, target, class }, location);
                    }
                }
                InstructionKind::IsInstance { target, .. } => {
                    if target.is_reference() {
                        self.link_class(&target.class_name(), location);
                    }
                }
                InstructionKind::Exit { value: Some(value) } => {
                    let source = self.var(method, *value);
                    let result = self.state.node(NodeKind::Result(method));
                    self.state.copy(source, result);
                }
                InstructionKind::Raise { exception } => {
                    throw_sites.push(self.var(method, *exception));
                }
                InstructionKind::Construct { receiver, class } => {
                    self.link_class(class, location.clone());
                    self.allocate(method, class, *receiver, location);
                }
                InstructionKind::ConstructArray { receiver, item_type, .. } => {
                    let class = ValueType::array(item_type.clone()).class_name();
                    self.link_class(&class, location.clone());
                    self.allocate(method, &class, *receiver, location);
                }
                InstructionKind::GetField {
                    receiver,
                    instance,
                    field,
                    ..
                } => {
                    let instance = instance.map(|v| self.var(method, v));
                    let target = self.var(method, *receiver);
                    self.state.add_constraint(
                        Constraint::FieldGet {
                            instance,
                            field: field.clone(),
                            target,
                        },
                        location,
                    );
                }
                InstructionKind::PutField {
                    instance, field, value, ..
                } => {
                    let instance = instance.map(|v| self.var(method, v));
                    let value = self.var(method, *value);
                    self.state.add_constraint(
                        Constraint::FieldSet {
                            instance,
                            field: field.clone(),
                            value,
                        },
                        location,
                    );
                }
                InstructionKind::CloneArray { receiver, array }
                | InstructionKind::UnwrapArray { receiver, array, .. } => self.copy_var(method, *array, *receiver),
                InstructionKind::GetElement {
                    receiver,
                    array,
                    element_type: ArrayElementType::Object,
                    ..
                } => {
                    let array = self.var(method, *array);
                    let target = self.var(method, *receiver);
                    self.state.add_constraint(Constraint::ArrayGet { array, target }, location);
                }
                InstructionKind::PutElement {
                    array,
                    value,
                    element_type: ArrayElementType::Object,
                    ..
                } => {
                    let array = self.var(method, *array);
                    let value = self.var(method, *value);
                    self.state.add_constraint(Constraint::ArraySet { array, value }, location);
                }
                InstructionKind::Invoke {
                    receiver,
                    instance,
                    method: callee,
                    arguments,
                    kind,
                } => {
                    if *kind == InvocationKind::Virtual && self.virtual_call_set.insert(callee.descriptor.clone()) {
                        self.virtual_calls.push(callee.descriptor.clone());
                    }
                    let exceptions = self.state.node(NodeKind::CallExceptions(method, block.id, index));
                    throw_sites.push(exceptions);
                    let site = InvokeSite {
                        kind: *kind,
                        method: callee.clone(),
                        caller: Some(method),
                        instance: instance.map(|v| self.var(method, v)),
                        arguments: arguments.iter().map(|&v| self.var(method, v)).collect(),
                        result: receiver.map(|v| self.var(method, v)),
                        exceptions: Some(exceptions),
                    };
                    self.state.add_constraint(Constraint::Invoke(site), location);
                }
                InstructionKind::InitClass { class } => self.link_class(class, location),
                InstructionKind::NullCheck { receiver, value } => self.copy_var(method, *value, *receiver),
                _ => {}
            }
        }

        self.route_exceptions(method, program, block, &throw_sites);
    }

    /// Route throw sites to the block's handlers, first match wins; uncaught types
    /// escape to the method's thrown node
    fn route_exceptions(&mut self, method: MethodId, program: &'a Program, block: &'a BasicBlock, sites: &[NodeId]) {
        if sites.is_empty() {
            return;
        }
        let thrown = self.state.node(NodeKind::Thrown(method));
        if block.try_catches.is_empty() {
            for &site in sites {
                self.state.copy(site, thrown);
            }
            return;
        }
        let mut handlers = Vec::with_capacity(block.try_catches.len());
        for try_catch in &block.try_catches {
            if let Some(class) = &try_catch.exception_type {
                self.link_class(class, None);
            }
            let handler = program.block(try_catch.handler);
            handlers.push(CatchHandler {
                class: try_catch.exception_type.clone(),
                target: handler.exception_variable.map(|v| self.var(method, v)),
            });
        }
        for &site in sites {
            self.state.add_constraint(
                Constraint::Catch {
                    source: site,
                    handlers: handlers.clone(),
                    thrown,
                },
                None,
            );
        }
    }

    // ===== Constraint application =====

    fn apply(&mut self, id: ConstraintId) {
        let entry = &self.state.constraints[id.index()];
        let constraint = entry.constraint.clone();
        let location = entry.location.clone();
        let progress = entry.progress;
        trace!("Applying {} #{}", constraint.name(), id.index());

        match constraint.input() {
            None => {
                if progress == 0 {
                    self.state.constraints[id.index()].progress = 1;
                    self.apply_once(&constraint, location);
                }
            }
            Some(input) => {
                let fresh: Vec<TypeId> = self.state.get(input).types()[progress..].to_vec();
                self.state.constraints[id.index()].progress = progress + fresh.len();
                for ty in fresh {
                    self.apply_type(&constraint, ty, &location);
                }
            }
        }
    }

    /// Constraints without an input node
    fn apply_once(&mut self, constraint: &Constraint, location: Option<TextLocation>) {
        match constraint {
            Constraint::Allocate { ty, target } => {
                self.state.add_type(*target, *ty);
            }
            Constraint::ClassConstant { class, target } => {
                let ty = self.state.intern_type(CLASS_CLASS);
                self.state.add_type(*target, ty);
                self.link_class(class, location);
            }
            Constraint::FieldGet {
                instance: None,
                field,
                target,
            } => {
                if let Some(node) = self.static_field(field, location) {
                    self.state.copy(node, *target);
                }
            }
            Constraint::FieldSet {
                instance: None,
                field,
                value,
            } => {
                if let Some(node) = self.static_field(field, location) {
                    self.state.copy(*value, node);
                }
            }
            Constraint::Invoke(site) if site.kind != InvocationKind::Virtual => {
                self.invoke_direct(site, location);
            }
            _ => {}
        }
    }

    /// Constraints reacting to a new type `ty` in their input node
    fn apply_type(&mut self, constraint: &Constraint, ty: TypeId, location: &Option<TextLocation>) {
        match constraint {
            Constraint::Copy { target, .. } => {
                self.state.add_type(*target, ty);
            }
            Constraint::IsSubtype { target, class, .. } => {
                let name = self.state.types().name(ty).to_string();
                if self.hierarchy.is_super_type(class, &name) {
                    self.state.add_type(*target, ty);
                }
            }
            Constraint::FieldGet { field, target, .. } => {
                if let Some(node) = self.instance_field(ty, field, location) {
                    self.state.copy(node, *target);
                }
            }
            Constraint::FieldSet { field, value, .. } => {
                if let Some(node) = self.instance_field(ty, field, location) {
                    self.state.copy(*value, node);
                }
            }
            Constraint::ArrayGet { target, .. } => {
                if self.state.types().name(ty).starts_with('[') {
                    let element = self.state.node(NodeKind::ArrayElement(ty));
                    self.state.copy(element, *target);
                }
            }
            Constraint::ArraySet { value, .. } => {
                if self.state.types().name(ty).starts_with('[') {
                    let element = self.state.node(NodeKind::ArrayElement(ty));
                    self.state.copy(*value, element);
                }
            }
            Constraint::Invoke(site) => self.invoke_virtual(site, ty, location),
            Constraint::Catch { handlers, thrown, .. } => self.catch(handlers, *thrown, ty),
            Constraint::Allocate { .. } | Constraint::ClassConstant { .. } => {}
        }
    }

    fn catch(&mut self, handlers: &[CatchHandler], thrown: NodeId, ty: TypeId) {
        let name = self.state.types().name(ty).to_string();
        for handler in handlers {
            let accepts = match &handler.class {
                None => true,
                Some(class) => self.hierarchy.is_super_type(class, &name),
            };
            if accepts {
                if let Some(target) = handler.target {
                    self.state.add_type(target, ty);
                }
                return;
            }
        }
        self.state.add_type(thrown, ty);
    }

    fn static_field(&mut self, field: &FieldReference, location: Option<TextLocation>) -> Option<NodeId> {
        match self.hierarchy.resolve_field(&field.class, &field.name) {
            Some((resolved, _)) => {
                self.link_class(&resolved.class, location);
                Some(self.state.node(NodeKind::StaticField(resolved)))
            }
            None => {
                self.field_not_found(field.clone(), location);
                None
            }
        }
    }

    fn instance_field(&mut self, ty: TypeId, field: &FieldReference, location: &Option<TextLocation>) -> Option<NodeId> {
        let class = self.state.types().name(ty).to_string();
        if class.starts_with('[') {
            return None;
        }
        match self.hierarchy.resolve_field(&class, &field.name) {
            Some((resolved, _)) => Some(self.state.node(NodeKind::InstanceField(ty, resolved))),
            None => {
                self.field_not_found(FieldReference::new(class, field.name.clone()), location.clone());
                None
            }
        }
    }

    fn invoke_direct(&mut self, site: &InvokeSite, location: Option<TextLocation>) {
        let Some(callee) = self.hierarchy.resolve_method(&site.method.class, &site.method.descriptor) else {
            self.method_not_found(site.method.clone(), location);
            return;
        };
        if self.hierarchy.method(&callee).is_some_and(|m| m.is_abstract) {
            self.diagnostics.report(
                Diagnostic::error("Abstract method {0} cannot be called directly")
                    .with_code(DiagnosticCode::ABSTRACT_CALL)
                    .with_location(location)
                    .with_param(DiagnosticParam::Method(callee)),
            );
            return;
        }
        let Some(callee) = self.reach_method(&callee, location) else {
            return;
        };
        if let (Some(instance), InvocationKind::Special) = (site.instance, site.kind) {
            let this = self.var(callee, VariableId::new(0));
            self.state.copy(instance, this);
        }
        self.connect(site, callee);
    }

    fn invoke_virtual(&mut self, site: &InvokeSite, ty: TypeId, location: &Option<TextLocation>) {
        let type_name = self.state.types().name(ty).to_string();
        // Types outside the declared class cannot be receivers of this call
        if !self.hierarchy.is_super_type(&site.method.class, &type_name) {
            trace!("Skipping {} at call to {}", type_name, site.method);
            return;
        }
        let class = if type_name.starts_with('[') {
            OBJECT_CLASS.to_string()
        } else {
            type_name
        };
        let Some(callee) = self.hierarchy.resolve_implementation(&class, &site.method.descriptor) else {
            self.method_not_found(site.method.with_class(class), location.clone());
            return;
        };
        let Some(callee) = self.reach_method(&callee, location.clone()) else {
            return;
        };
        // Only the dispatching type reaches `this`
        let this = self.var(callee, VariableId::new(0));
        self.state.add_type(this, ty);
        self.connect(site, callee);
    }

    /// Wire arguments, result and exceptions between a call site and a callee
    fn connect(&mut self, site: &InvokeSite, callee: MethodId) {
        for (index, &argument) in site.arguments.iter().enumerate() {
            let parameter = self.var(callee, VariableId::new(index as u32 + 1));
            self.state.copy(argument, parameter);
        }
        if let Some(result) = site.result {
            let source = self.state.node(NodeKind::Result(callee));
            self.state.copy(source, result);
        }
        if let Some(exceptions) = site.exceptions {
            let source = self.state.node(NodeKind::Thrown(callee));
            self.state.copy(source, exceptions);
        }
    }
}

/// Entry method handle returned by [`DependencyAnalyzer::add_entry_point`]
pub struct EntryPoint<'b, 'a> {
    analyzer: &'b mut DependencyAnalyzer<'a>,
    method: Option<MethodId>,
}

impl EntryPoint<'_, '_> {
    /// Whether the entry method exists
    pub fn is_resolved(&self) -> bool {
        self.method.is_some()
    }

    /// Id of the entry method, if it resolved
    pub fn method_id(&self) -> Option<MethodId> {
        self.method
    }

    /// Seed variable `param` (0 is `this`, parameters start at 1) with an instance of
    /// `class`
    pub fn propagate(&mut self, param: u32, class: &str) -> &mut Self {
        if let Some(method) = self.method {
            self.analyzer.link_class(class, None);
            let ty = self.analyzer.state.intern_type(class);
            let node = self.analyzer.var(method, VariableId::new(param));
            self.analyzer.state.add_type(node, ty);
        }
        self
    }
}
