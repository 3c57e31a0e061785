//! Class model and hierarchy queries
//!
//! The analyzer sees classes only through [`ClassSource`]. Anything not returned by the
//! source is treated as missing and reported, never invented.

use crate::ir::{FieldReference, MethodDescriptor, MethodReference, Program, ValueType};
use rustc_hash::{FxHashMap, FxHashSet};

/// Root of the class hierarchy
pub const OBJECT_CLASS: &str = "java.lang.Object";
/// Common supertype of all exceptions
pub const THROWABLE_CLASS: &str = "java.lang.Throwable";
/// Type of string constants
pub const STRING_CLASS: &str = "java.lang.String";
/// Type of class constants
pub const CLASS_CLASS: &str = "java.lang.Class";

/// A declared field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldHolder {
    /// Simple name
    pub name: String,
    /// Declared type
    pub field_type: ValueType,
    /// Whether the field belongs to the class rather than instances
    pub is_static: bool,
}

/// A declared method, with its body if it has one
#[derive(Debug, Clone, PartialEq)]
pub struct MethodHolder {
    /// Name and signature
    pub descriptor: MethodDescriptor,
    /// Whether the method takes no `this`
    pub is_static: bool,
    /// Whether the method has no implementation
    pub is_abstract: bool,
    /// Body, absent for abstract and native methods
    pub program: Option<Program>,
}

impl MethodHolder {
    /// A method with a body
    pub fn new(descriptor: MethodDescriptor, is_static: bool, program: Program) -> Self {
        Self {
            descriptor,
            is_static,
            is_abstract: false,
            program: Some(program),
        }
    }

    /// An abstract method
    pub fn abstract_method(descriptor: MethodDescriptor) -> Self {
        Self {
            descriptor,
            is_static: false,
            is_abstract: true,
            program: None,
        }
    }

    /// A method implemented outside the IR (the backend supplies it)
    pub fn native(descriptor: MethodDescriptor, is_static: bool) -> Self {
        Self {
            descriptor,
            is_static,
            is_abstract: false,
            program: None,
        }
    }
}

/// A declared class or interface
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassHolder {
    /// Dotted class name
    pub name: String,
    /// Superclass; `None` only for `java.lang.Object`
    pub parent: Option<String>,
    /// Directly implemented interfaces
    pub interfaces: Vec<String>,
    /// Whether this is an interface
    pub is_interface: bool,
    /// Whether the class cannot be instantiated
    pub is_abstract: bool,
    /// Declared fields
    pub fields: Vec<FieldHolder>,
    /// Declared methods
    pub methods: Vec<MethodHolder>,
}

impl ClassHolder {
    /// Class extending `java.lang.Object`, or the root itself
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let parent = (name != OBJECT_CLASS).then(|| OBJECT_CLASS.to_string());
        Self {
            name,
            parent,
            ..Self::default()
        }
    }

    /// Set the superclass
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Add an implemented interface
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Declare a field
    pub fn with_field(mut self, name: impl Into<String>, field_type: ValueType, is_static: bool) -> Self {
        self.fields.push(FieldHolder {
            name: name.into(),
            field_type,
            is_static,
        });
        self
    }

    /// Declare a method
    pub fn with_method(mut self, method: MethodHolder) -> Self {
        self.methods.push(method);
        self
    }

    /// Declared method with exactly this descriptor
    pub fn method(&self, descriptor: &MethodDescriptor) -> Option<&MethodHolder> {
        self.methods.iter().find(|m| &m.descriptor == descriptor)
    }

    /// Declared field by name
    pub fn field(&self, name: &str) -> Option<&FieldHolder> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Resolution oracle: class name to declaration
pub trait ClassSource {
    /// Class by dotted name, `None` if it does not exist
    fn get(&self, name: &str) -> Option<&ClassHolder>;
}

/// In-memory class source
#[derive(Debug, Clone, Default)]
pub struct MemoryClassSource {
    classes: FxHashMap<String, ClassHolder>,
}

impl MemoryClassSource {
    /// Source without classes
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a class
    pub fn add(&mut self, class: ClassHolder) {
        self.classes.insert(class.name.clone(), class);
    }

    /// Builder-style [`add`](Self::add)
    pub fn with(mut self, class: ClassHolder) -> Self {
        self.add(class);
        self
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether the source holds no class
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class names in unspecified order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }
}

impl ClassSource for MemoryClassSource {
    fn get(&self, name: &str) -> Option<&ClassHolder> {
        self.classes.get(name)
    }
}

/// Hierarchy queries over a [`ClassSource`], with a subtype cache
pub struct ClassHierarchy<'a> {
    source: &'a dyn ClassSource,
    subtype_cache: FxHashMap<(String, String), bool>,
}

impl<'a> ClassHierarchy<'a> {
    /// Hierarchy over `source` with an empty cache
    pub fn new(source: &'a dyn ClassSource) -> Self {
        Self {
            source,
            subtype_cache: FxHashMap::default(),
        }
    }

    /// Class by name
    pub fn get(&self, name: &str) -> Option<&'a ClassHolder> {
        self.source.get(name)
    }

    /// Method declaration named by `reference`, without inheritance
    pub fn method(&self, reference: &MethodReference) -> Option<&'a MethodHolder> {
        self.get(&reference.class)?.method(&reference.descriptor)
    }

    /// Whether values of type `sub` can be stored in a location of type `sup`. Both
    /// names follow [`ValueType::class_name`].
    pub fn is_super_type(&mut self, sup: &str, sub: &str) -> bool {
        if sup == sub || sup == OBJECT_CLASS {
            return true;
        }
        let key = (sup.to_string(), sub.to_string());
        if let Some(&cached) = self.subtype_cache.get(&key) {
            return cached;
        }
        let result = self.compute_super_type(sup, sub);
        self.subtype_cache.insert(key, result);
        result
    }

    fn compute_super_type(&mut self, sup: &str, sub: &str) -> bool {
        if let Some(sub_item) = sub.strip_prefix('[') {
            if sup == "java.lang.Cloneable" || sup == "java.io.Serializable" {
                return true;
            }
            let Some(sup_item) = sup.strip_prefix('[') else {
                return false;
            };
            // Only reference items are covariant
            return match (ValueType::from_class_name(sup), ValueType::from_class_name(sub)) {
                (Ok(ValueType::Array(sup_item_type)), Ok(ValueType::Array(sub_item_type)))
                    if sup_item_type.is_reference() && sub_item_type.is_reference() =>
                {
                    self.is_super_type(&sup_item_type.class_name(), &sub_item_type.class_name())
                }
                _ => sup_item == sub_item,
            };
        }

        let mut visited = FxHashSet::default();
        let mut stack = vec![sub.to_string()];
        while let Some(name) = stack.pop() {
            if name == sup {
                return true;
            }
            if !visited.insert(name.clone()) {
                continue;
            }
            if let Some(class) = self.get(&name) {
                stack.extend(class.parent.iter().cloned());
                stack.extend(class.interfaces.iter().cloned());
            }
        }
        false
    }

    /// Method declaration visible in `class` with `descriptor`: the class and its
    /// superclasses first, then all superinterfaces
    pub fn resolve_method(&self, class: &str, descriptor: &MethodDescriptor) -> Option<MethodReference> {
        self.find_method(class, descriptor, false)
    }

    /// Concrete method a virtual call dispatches to for a receiver of runtime class
    /// `class`. Abstract declarations are skipped.
    pub fn resolve_implementation(&self, class: &str, descriptor: &MethodDescriptor) -> Option<MethodReference> {
        self.find_method(class, descriptor, true)
    }

    fn find_method(&self, class: &str, descriptor: &MethodDescriptor, concrete_only: bool) -> Option<MethodReference> {
        let accept = |m: &MethodHolder| !concrete_only || !m.is_abstract;

        let mut interfaces = Vec::new();
        let mut current = Some(class.to_string());
        while let Some(name) = current {
            let holder = self.get(&name)?;
            if let Some(method) = holder.method(descriptor) {
                if accept(method) {
                    return Some(MethodReference::new(name, descriptor.clone()));
                }
            }
            interfaces.extend(holder.interfaces.iter().cloned());
            current = holder.parent.clone();
        }

        let mut visited = FxHashSet::default();
        while !interfaces.is_empty() {
            let name = interfaces.remove(0);
            if !visited.insert(name.clone()) {
                continue;
            }
            let Some(holder) = self.get(&name) else {
                continue;
            };
            if let Some(method) = holder.method(descriptor) {
                if accept(method) {
                    return Some(MethodReference::new(name, descriptor.clone()));
                }
            }
            interfaces.extend(holder.interfaces.iter().cloned());
        }
        None
    }

    /// Field declaration visible in `class`, searching superclasses then interfaces
    pub fn resolve_field(&self, class: &str, name: &str) -> Option<(FieldReference, &'a FieldHolder)> {
        let mut pending = vec![class.to_string()];
        let mut visited = FxHashSet::default();
        while !pending.is_empty() {
            let current = pending.remove(0);
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(holder) = self.get(&current) else {
                continue;
            };
            if let Some(field) = holder.field(name) {
                return Some((FieldReference::new(current, name), field));
            }
            pending.extend(holder.parent.iter().cloned());
            pending.extend(holder.interfaces.iter().cloned());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{PrimitiveType, ProgramBuilder};

    fn descriptor(text: &str) -> MethodDescriptor {
        text.parse().expect("valid descriptor")
    }

    fn body() -> Program {
        let mut b = ProgramBuilder::for_method(0);
        b.exit(None);
        b.build()
    }

    fn source() -> MemoryClassSource {
        MemoryClassSource::new()
            .with(ClassHolder::new(OBJECT_CLASS).with_method(MethodHolder::new(descriptor("hashCode()I"), false, body())))
            .with(ClassHolder {
                is_interface: true,
                ..ClassHolder::new("Shape")
            }
            .with_method(MethodHolder::abstract_method(descriptor("area()D")))
            .with_method(MethodHolder::new(descriptor("describe()V"), false, body())))
            .with(
                ClassHolder::new("Base")
                    .with_interface("Shape")
                    .with_field("size", ValueType::INT, false),
            )
            .with(
                ClassHolder::new("Square")
                    .with_parent("Base")
                    .with_method(MethodHolder::new(descriptor("area()D"), false, body())),
            )
    }

    #[test]
    fn test_is_super_type() {
        let source = source();
        let mut hierarchy = ClassHierarchy::new(&source);
        assert!(hierarchy.is_super_type("Base", "Square"));
        assert!(hierarchy.is_super_type("Shape", "Square"));
        assert!(!hierarchy.is_super_type("Square", "Base"));
        assert!(hierarchy.is_super_type(OBJECT_CLASS, "Missing"));
        // cached answer agrees
        assert!(hierarchy.is_super_type("Shape", "Square"));
    }

    #[test]
    fn test_array_subtyping() {
        let source = source();
        let mut hierarchy = ClassHierarchy::new(&source);
        let squares = ValueType::array(ValueType::object("Square")).class_name();
        let shapes = ValueType::array(ValueType::object("Shape")).class_name();
        let ints = ValueType::array(ValueType::Primitive(PrimitiveType::Int)).class_name();
        assert!(hierarchy.is_super_type(&shapes, &squares));
        assert!(!hierarchy.is_super_type(&squares, &shapes));
        assert!(hierarchy.is_super_type(OBJECT_CLASS, &ints));
        assert!(hierarchy.is_super_type("java.lang.Cloneable", &ints));
        assert!(!hierarchy.is_super_type(&shapes, &ints));
    }

    #[test]
    fn test_resolve_method_walks_parents_then_interfaces() {
        let source = source();
        let hierarchy = ClassHierarchy::new(&source);
        assert_eq!(
            hierarchy.resolve_method("Square", &descriptor("hashCode()I")),
            Some(MethodReference::new(OBJECT_CLASS, descriptor("hashCode()I")))
        );
        assert_eq!(
            hierarchy.resolve_method("Base", &descriptor("area()D")),
            Some(MethodReference::new("Shape", descriptor("area()D")))
        );
        assert_eq!(hierarchy.resolve_implementation("Base", &descriptor("area()D")), None);
        assert_eq!(
            hierarchy.resolve_implementation("Square", &descriptor("describe()V")),
            Some(MethodReference::new("Shape", descriptor("describe()V")))
        );
        assert_eq!(hierarchy.resolve_method("Nowhere", &descriptor("area()D")), None);
    }

    #[test]
    fn test_resolve_field() {
        let source = source();
        let hierarchy = ClassHierarchy::new(&source);
        let (reference, holder) = hierarchy.resolve_field("Square", "size").expect("inherited field");
        assert_eq!(reference, FieldReference::new("Base", "size"));
        assert!(!holder.is_static);
        assert!(hierarchy.resolve_field("Square", "missing").is_none());
    }
}
