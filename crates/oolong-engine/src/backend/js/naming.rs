//! JavaScript identifiers for classes, methods and fields
//!
//! Classes get a short package prefix (`java.lang.Object` becomes `jl_Object`). Global
//! functions and static fields are prefixed with their class name. Every name is
//! allocated once and remembered, so the same member always maps to the same
//! identifier and collisions are resolved with a `$n` suffix.

use crate::ir::{FieldReference, MethodDescriptor, MethodReference, ValueType};
use rustc_hash::{FxHashMap, FxHashSet};

/// Words that cannot be used as bare identifiers
const RESERVED: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete",
    "do", "else", "enum", "eval", "export", "extends", "false", "finally", "for", "function", "if", "implements",
    "import", "in", "instanceof", "interface", "let", "new", "null", "package", "private", "protected", "public",
    "return", "static", "super", "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with",
    "yield", "main", "Object", "Math", "Long",
];

/// Assigns script identifiers to classes, methods and fields
///
/// Names are stable: asking twice for the same member returns the same name, and no
/// two members of one namespace share a name.
#[derive(Debug, Default)]
pub struct Naming {
    globals: FxHashSet<String>,
    classes: FxHashMap<String, String>,
    methods: FxHashMap<MethodReference, String>,
    static_fields: FxHashMap<FieldReference, String>,
    members: FxHashSet<String>,
    virtual_methods: FxHashMap<MethodDescriptor, String>,
    instance_fields: FxHashMap<FieldReference, String>,
}

impl Naming {
    /// No names assigned
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructor function name of `class`
    pub fn class_name(&mut self, class: &str) -> String {
        if let Some(name) = self.classes.get(class) {
            return name.clone();
        }
        let mut short = String::new();
        let mut segments = class.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_some() {
                short.extend(segment.chars().next());
            } else {
                if !short.is_empty() {
                    short.push('_');
                }
                short.push_str(segment);
            }
        }
        let name = unique(&mut self.globals, &sanitize(&short));
        self.classes.insert(class.to_string(), name.clone());
        name
    }

    /// Global function implementing `method`
    pub fn method_name(&mut self, method: &MethodReference) -> String {
        if let Some(name) = self.methods.get(method) {
            return name.clone();
        }
        let class = self.class_name(&method.class);
        let name = unique(&mut self.globals, &format!("{}_{}", class, member_part(method.name())));
        self.methods.insert(method.clone(), name.clone());
        name
    }

    /// Global variable holding a static field
    pub fn static_field_name(&mut self, field: &FieldReference) -> String {
        if let Some(name) = self.static_fields.get(field) {
            return name.clone();
        }
        let class = self.class_name(&field.class);
        let name = unique(&mut self.globals, &format!("{}_{}", class, sanitize(&field.name)));
        self.static_fields.insert(field.clone(), name.clone());
        name
    }

    /// Global function running the initializers of `class` once
    pub fn initializer_name(&mut self, class: &str) -> String {
        let class_name = self.class_name(class);
        let key = MethodReference::new(class, MethodDescriptor::new("$callClinit", Vec::new(), ValueType::Void));
        if let Some(name) = self.methods.get(&key) {
            return name.clone();
        }
        let name = unique(&mut self.globals, &format!("{}_$callClinit", class_name));
        self.methods.insert(key, name.clone());
        name
    }

    /// Prototype property dispatching `descriptor`
    pub fn virtual_name(&mut self, descriptor: &MethodDescriptor) -> String {
        if let Some(name) = self.virtual_methods.get(descriptor) {
            return name.clone();
        }
        let name = unique(&mut self.members, &format!("m_{}", member_part(&descriptor.name)));
        self.virtual_methods.insert(descriptor.clone(), name.clone());
        name
    }

    /// Object property of an instance field, keyed by its declaring class
    pub fn field_name(&mut self, field: &FieldReference) -> String {
        if let Some(name) = self.instance_fields.get(field) {
            return name.clone();
        }
        let name = unique(&mut self.members, &format!("${}", sanitize(&field.name)));
        self.instance_fields.insert(field.clone(), name.clone());
        name
    }
}

fn member_part(name: &str) -> String {
    match name {
        "<init>" => "_init_".to_string(),
        "<clinit>" => "_clinit_".to_string(),
        other => sanitize(other),
    }
}

fn sanitize(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

fn unique(used: &mut FxHashSet<String>, base: &str) -> String {
    let mut candidate = base.to_string();
    let mut counter = 1;
    while RESERVED.contains(&candidate.as_str()) || used.contains(&candidate) {
        candidate = format!("{}${}", base, counter);
        counter += 1;
    }
    used.insert(candidate.clone());
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_names() {
        let mut naming = Naming::new();
        assert_eq!(naming.class_name("java.lang.Object"), "jl_Object");
        assert_eq!(naming.class_name("Main"), "Main");
        assert_eq!(naming.class_name("java.lang.Object"), "jl_Object");
        // Different class, same short form
        assert_eq!(naming.class_name("java.lib.Object"), "jl_Object$1");
    }

    #[test]
    fn test_overloads_get_distinct_names() {
        let mut naming = Naming::new();
        let int: MethodReference = "Foo.run(I)V".parse().expect("reference");
        let long: MethodReference = "Foo.run(J)V".parse().expect("reference");
        let init: MethodReference = "Foo.<init>()V".parse().expect("reference");
        assert_eq!(naming.method_name(&int), "Foo_run");
        assert_eq!(naming.method_name(&long), "Foo_run$1");
        assert_eq!(naming.method_name(&int), "Foo_run");
        assert_eq!(naming.method_name(&init), "Foo__init_");
        assert_eq!(naming.virtual_name(&int.descriptor), "m_run");
        assert_eq!(naming.virtual_name(&long.descriptor), "m_run$1");
    }

    #[test]
    fn test_fields_and_reserved_words() {
        let mut naming = Naming::new();
        assert_eq!(naming.field_name(&FieldReference::new("Foo", "value")), "$value");
        assert_eq!(naming.field_name(&FieldReference::new("Bar", "value")), "$value$1");
        assert_eq!(naming.class_name("function"), "function$1");
        assert_eq!(naming.static_field_name(&FieldReference::new("Main", "cache")), "Main_cache");
        assert_eq!(naming.initializer_name("Main"), "Main_$callClinit");
        assert_eq!(naming.initializer_name("Main"), "Main_$callClinit");
    }
}
