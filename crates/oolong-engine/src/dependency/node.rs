//! Points-to nodes
//!
//! A node is a set of runtime types some value may have. Sets only grow, and keep the
//! order in which types arrived so consumers can resume where they stopped.

use crate::ir::{BlockId, FieldReference, VariableId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;

/// Interned type name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    /// Id from a raw index
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw index
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Position in the type table
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Interning table for type names
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    names: Vec<String>,
    index: FxHashMap<String, TypeId>,
}

impl TypeTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `name`, allocating one on first use
    pub fn intern(&mut self, name: &str) -> TypeId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = TypeId::new(self.names.len() as u32);
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        id
    }

    /// Id for `name` if it was interned
    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.index.get(name).copied()
    }

    /// Name of an interned type.
    ///
    /// # Panics
    ///
    /// If the id did not come from this table.
    pub fn name(&self, id: TypeId) -> &str {
        &self.names[id.index()]
    }

    /// Number of interned names
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether nothing was interned
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Index of a reached method inside one analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u32);

impl MethodId {
    /// Id from a raw index
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Position in the method list
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Node handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Id from a raw index
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw index
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Position in the node arena
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// What a node stands for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Local variable of a method (`this` is variable 0 for instance methods)
    Variable(MethodId, VariableId),
    /// Values returned by a method
    Result(MethodId),
    /// Exceptions escaping a method
    Thrown(MethodId),
    /// Exceptions raised by one call site, the `index`th instruction of `block`
    CallExceptions(MethodId, BlockId, usize),
    /// Instance field of objects whose runtime class is the given type
    InstanceField(TypeId, FieldReference),
    /// Static field
    StaticField(FieldReference),
    /// Elements of arrays of the given runtime type
    ArrayElement(TypeId),
    /// Node created through the public API
    Free(u32),
}

/// A type set plus the constraints that read it
#[derive(Debug, Clone)]
pub struct Node {
    /// What the node stands for
    pub kind: NodeKind,
    types: Vec<TypeId>,
    members: FxHashSet<TypeId>,
    pub(crate) consumers: Vec<usize>,
}

impl Node {
    /// Empty node
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            types: Vec::new(),
            members: FxHashSet::default(),
            consumers: Vec::new(),
        }
    }

    /// Types in arrival order
    pub fn types(&self) -> &[TypeId] {
        &self.types
    }

    /// Whether `ty` is in the set
    pub fn contains(&self, ty: TypeId) -> bool {
        self.members.contains(&ty)
    }

    /// Number of types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Add a type, returning whether the set grew
    pub fn insert(&mut self, ty: TypeId) -> bool {
        if self.members.insert(ty) {
            self.types.push(ty);
            true
        } else {
            false
        }
    }
}
