//! Constraints between nodes
//!
//! Every constraint reads at most one node. Applying it handles only the types that
//! arrived in that node since the previous application, so re-application is harmless.

use super::node::{MethodId, NodeId, TypeId};
use crate::ir::{FieldReference, InvocationKind, MethodReference, TextLocation};

/// Constraint handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(pub u32);

impl ConstraintId {
    /// Handle from a raw index
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Position in the constraint arena
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Flow rule between nodes
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// `target` may hold a fresh instance of `ty`
    Allocate { ty: TypeId, target: NodeId },
    /// Everything in `source` flows into `target`
    Copy { source: NodeId, target: NodeId },
    /// Types of `source` assignable to `class` flow into `target`
    IsSubtype { source: NodeId, target: NodeId, class: String },
    /// Read of a field; `instance` is `None` for static fields
    FieldGet {
        instance: Option<NodeId>,
        field: FieldReference,
        target: NodeId,
    },
    /// Write of a field; `instance` is `None` for static fields
    FieldSet {
        instance: Option<NodeId>,
        field: FieldReference,
        value: NodeId,
    },
    /// Elements of the arrays in `array` flow into `target`
    ArrayGet { array: NodeId, target: NodeId },
    /// `value` flows into the elements of the arrays in `array`
    ArraySet { array: NodeId, value: NodeId },
    /// Method call
    Invoke(InvokeSite),
    /// `target` receives a `java.lang.Class`, and `class` gets linked
    ClassConstant { class: String, target: NodeId },
    /// Each type of `source` goes to the first handler that accepts it, or to `thrown`
    /// when none does
    Catch {
        source: NodeId,
        handlers: Vec<CatchHandler>,
        thrown: NodeId,
    },
}

/// One handler of a [`Constraint::Catch`], in try/catch order
#[derive(Debug, Clone, PartialEq)]
pub struct CatchHandler {
    /// Caught class; `None` catches everything
    pub class: Option<String>,
    /// Exception variable of the handler block, if it binds one
    pub target: Option<NodeId>,
}

/// Call site of an `Invoke` constraint
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeSite {
    /// Static, special or virtual dispatch
    pub kind: InvocationKind,
    /// Declared target
    pub method: MethodReference,
    /// Method containing the call
    pub caller: Option<MethodId>,
    /// Receiver, absent for static calls
    pub instance: Option<NodeId>,
    /// One node per declared parameter
    pub arguments: Vec<NodeId>,
    /// Receives the returned values
    pub result: Option<NodeId>,
    /// Receives exceptions escaping the callee
    pub exceptions: Option<NodeId>,
}

impl Constraint {
    /// Node whose growth re-triggers this constraint
    pub fn input(&self) -> Option<NodeId> {
        match self {
            Constraint::Allocate { .. } | Constraint::ClassConstant { .. } => None,
            Constraint::Copy { source, .. }
            | Constraint::IsSubtype { source, .. }
            | Constraint::Catch { source, .. } => Some(*source),
            Constraint::FieldGet { instance, .. } | Constraint::FieldSet { instance, .. } => *instance,
            Constraint::ArrayGet { array, .. } | Constraint::ArraySet { array, .. } => Some(*array),
            Constraint::Invoke(site) => match site.kind {
                InvocationKind::Virtual => site.instance,
                InvocationKind::Static | InvocationKind::Special => None,
            },
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Constraint::Allocate { .. } => "allocate",
            Constraint::Copy { .. } => "copy",
            Constraint::IsSubtype { .. } => "isSubtype",
            Constraint::FieldGet { .. } => "fieldGet",
            Constraint::FieldSet { .. } => "fieldSet",
            Constraint::ArrayGet { .. } => "arrayGet",
            Constraint::ArraySet { .. } => "arraySet",
            Constraint::Invoke(_) => "invoke",
            Constraint::ClassConstant { .. } => "classConstant",
            Constraint::Catch { .. } => "catch",
        }
    }
}

/// Arena entry: the constraint plus solver bookkeeping
#[derive(Debug, Clone)]
pub(crate) struct ConstraintEntry {
    pub constraint: Constraint,
    pub location: Option<TextLocation>,
    /// Types of the input node already handled; for input-less constraints, 1 once
    /// applied
    pub progress: usize,
    pub queued: bool,
}

impl ConstraintEntry {
    pub fn new(constraint: Constraint, location: Option<TextLocation>) -> Self {
        Self {
            constraint,
            location,
            progress: 0,
            queued: false,
        }
    }
}
