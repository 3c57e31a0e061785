//! JavaScript backend
//!
//! Emits one script: a constructor function per linked class with a prototype chain,
//! a global function per reachable method, prototype delegates for methods that are
//! called virtually, lazy class initializers, the string pool and finally `main`.
//!
//! Runtime support (`$rt_*` and `Long_*` helpers) is provided by the host page and is
//! not part of the output.
//!
//! # Structure
//!
//! - `writer`: indenting writer with source map positions
//! - `naming`: identifier allocation
//! - `lower`: method bodies
//! - `intrinsics`: generators for reflective array access and identity hashes

mod intrinsics;
mod lower;
mod naming;
mod writer;

pub use lower::MethodContext;
pub use naming::Naming;
pub use writer::SourceWriter;

use super::common::{IntrinsicCall, IntrinsicRegistry};
use super::CodegenInput;
use crate::dependency::{ClassHierarchy, ClassHolder};
use crate::error::CodegenError;
use crate::ir::{FieldReference, MethodDescriptor, MethodReference, PrimitiveType, ValueType};
use crate::options::JsOptions;
use crate::sourcemap::{SourceMap, SourceMapBuilder};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

/// Intrinsic generator: writes statements for one call site
pub type JsIntrinsic = fn(&mut MethodContext<'_, '_>, &IntrinsicCall<'_>) -> Result<(), CodegenError>;

/// Generated script
#[derive(Debug, Clone, PartialEq)]
pub struct JsOutput {
    /// Script text
    pub code: String,
    /// Mappings from script positions to source lines
    pub source_map: Option<SourceMap>,
}

/// Generate a script for `input`
pub fn generate(input: CodegenInput<'_>, options: &JsOptions, source_maps: bool) -> Result<JsOutput, CodegenError> {
    JsGenerator::new(input, options, source_maps).generate()
}

/// Writes one script holding the reachable part of a program
pub struct JsGenerator<'a> {
    input: CodegenInput<'a>,
    hierarchy: ClassHierarchy<'a>,
    naming: Naming,
    writer: SourceWriter,
    intrinsics: IntrinsicRegistry<JsIntrinsic>,
    strings: Vec<String>,
    string_index: FxHashMap<String, usize>,
}

impl<'a> JsGenerator<'a> {
    /// Generator with the built-in intrinsics
    pub fn new(input: CodegenInput<'a>, options: &JsOptions, source_maps: bool) -> Self {
        let mut writer = SourceWriter::new(options.indent);
        if source_maps {
            writer = writer.with_source_map(SourceMapBuilder::new().with_file("classes.js"));
        }
        Self {
            input,
            hierarchy: ClassHierarchy::new(input.classes),
            naming: Naming::new(),
            writer,
            intrinsics: intrinsics::registry(),
            strings: Vec::new(),
            string_index: FxHashMap::default(),
        }
    }

    /// Emit the runtime, classes and methods, then the entry call
    pub fn generate(mut self) -> Result<JsOutput, CodegenError> {
        self.input.entry_method()?;
        info!("Generating JavaScript for {}", self.input.entry);
        self.writer.line("\"use strict\";");

        let mut emitted = FxHashSet::default();
        let classes: Vec<&'a str> = self.input.reachable_classes().collect();
        for class in &classes {
            self.emit_class(class, &mut emitted)?;
        }

        let methods: Vec<MethodReference> = self
            .input
            .dependencies
            .methods()
            .iter()
            .map(|info| info.reference.clone())
            .collect();
        let mut count = 0;
        for method in &methods {
            if self.intrinsics.find(method).is_some() {
                continue;
            }
            self.emit_method(method)?;
            count += 1;
        }

        for class in &classes {
            if self.input.needs_initialization(class) {
                self.emit_initializer(class);
            }
        }
        self.emit_string_pool();
        self.emit_entry();

        info!(
            "Generated {} classes, {} methods, {} strings",
            emitted.len(),
            count,
            self.strings.len()
        );
        let (code, source_map) = self.writer.finish();
        Ok(JsOutput { code, source_map })
    }

    // ===== Classes =====

    /// Emit `class` after its superclass, so prototype chains can be set up in order
    fn emit_class(&mut self, class: &str, emitted: &mut FxHashSet<String>) -> Result<(), CodegenError> {
        if !emitted.insert(class.to_string()) {
            return Ok(());
        }
        let holder = self.input.class(class)?;
        let parent = holder
            .parent
            .as_deref()
            .filter(|parent| self.input.dependencies.is_class_reachable(parent));
        if let Some(parent) = parent {
            self.emit_class(parent, emitted)?;
        }
        debug!("Emitting class {}", class);

        let name = self.naming.class_name(class);
        self.writer.location(None);
        self.writer.open(&format!("function {}()", name));
        if let Some(parent) = parent {
            let parent = self.naming.class_name(parent);
            self.writer.line(&format!("{}.call(this);", parent));
        }
        for field in holder.fields.iter().filter(|f| !f.is_static) {
            let property = self.naming.field_name(&FieldReference::new(class, field.name.clone()));
            self.writer
                .line(&format!("this.{} = {};", property, default_value(&field.field_type)));
        }
        self.writer.close("");

        if let Some(parent) = parent {
            let parent = self.naming.class_name(parent);
            self.writer
                .line(&format!("{}.prototype = Object.create({}.prototype);", name, parent))
                .line(&format!("{}.prototype.constructor = {};", name, name));
        }
        self.emit_metadata(class, holder, parent);

        for field in holder.fields.iter().filter(|f| f.is_static) {
            let global = self
                .naming
                .static_field_name(&FieldReference::new(class, field.name.clone()));
            self.writer
                .line(&format!("var {} = {};", global, default_value(&field.field_type)));
        }
        self.emit_delegates(class, holder);
        Ok(())
    }

    fn emit_metadata(&mut self, class: &str, holder: &ClassHolder, parent: Option<&str>) {
        let name = self.naming.class_name(class);
        let superclass = match parent {
            Some(parent) => self.naming.class_name(parent),
            None => "null".to_string(),
        };
        let dependencies = self.input.dependencies;
        let interfaces: Vec<String> = holder
            .interfaces
            .iter()
            .filter(|i| dependencies.is_class_reachable(i))
            .map(|i| self.naming.class_name(i))
            .collect();
        let flags = (holder.is_interface as u32) | ((holder.is_abstract as u32) << 1);
        self.writer.line(&format!(
            "{}.$meta = {{ name: {}, superclass: {}, interfaces: [{}], flags: {} }};",
            name,
            string_literal(class),
            superclass,
            interfaces.join(", "),
            flags
        ));
    }

    /// Prototype properties forwarding virtual calls to the global functions
    fn emit_delegates(&mut self, class: &str, holder: &ClassHolder) {
        let name = self.naming.class_name(class);
        for method in &holder.methods {
            let descriptor = &method.descriptor;
            if method.is_static || descriptor.is_constructor() || descriptor.is_class_initializer() {
                continue;
            }
            let reference = MethodReference::new(class, descriptor.clone());
            if !self.input.is_reachable(&reference) || !self.input.dependencies.is_virtually_called(descriptor) {
                continue;
            }
            let params: Vec<String> = (0..descriptor.parameter_count()).map(|i| format!("a{}", i)).collect();
            let mut args = vec!["this".to_string()];
            args.extend(params.iter().cloned());
            let function = self.naming.method_name(&reference);
            let property = self.naming.virtual_name(descriptor);
            self.writer.line(&format!(
                "{}.prototype.{} = function({}) {{ return {}({}); }};",
                name,
                property,
                params.join(", "),
                function,
                args.join(", ")
            ));
        }
    }

    /// `Foo_$callClinit`: runs the superclass initializer, then the class's own, and
    /// replaces itself with a no-op on first call
    fn emit_initializer(&mut self, class: &str) {
        let name = self.naming.initializer_name(class);
        self.writer.location(None);
        self.writer.open(&format!("function {}()", name));
        self.writer.line(&format!("{} = function() {{}};", name));
        let parent = self.input.classes.get(class).and_then(|holder| holder.parent.clone());
        if let Some(parent) = parent.filter(|p| self.input.needs_initialization(p)) {
            let parent_init = self.naming.initializer_name(&parent);
            self.writer.line(&format!("{}();", parent_init));
        }
        let clinit = MethodReference::new(class, MethodDescriptor::new("<clinit>", Vec::new(), ValueType::Void));
        if self.input.is_reachable(&clinit) {
            let function = self.naming.method_name(&clinit);
            self.writer.line(&format!("{}();", function));
        }
        self.writer.close("");
    }

    // ===== Methods =====

    fn emit_method(&mut self, method: &MethodReference) -> Result<(), CodegenError> {
        let holder = self
            .input
            .method(method)
            .ok_or_else(|| CodegenError::MissingBody(method.clone()))?;
        let program = self
            .input
            .body(method)
            .ok_or_else(|| CodegenError::MissingBody(method.clone()))?;
        program.validate().map_err(|source| CodegenError::InvalidProgram {
            method: method.clone(),
            source,
        })?;
        debug!("Emitting method {}", method);
        MethodContext::new(self, method, holder.is_static, program).lower()
    }

    // ===== Module-level data =====

    pub(super) fn string_constant(&mut self, value: &str) -> usize {
        if let Some(&index) = self.string_index.get(value) {
            return index;
        }
        let index = self.strings.len();
        self.strings.push(value.to_string());
        self.string_index.insert(value.to_string(), index);
        index
    }

    fn emit_string_pool(&mut self) {
        if self.strings.is_empty() {
            return;
        }
        self.writer.location(None);
        let literals: Vec<String> = self.strings.iter().map(|s| string_literal(s)).collect();
        self.writer.line(&format!("$rt_stringPool([{}]);", literals.join(", ")));
    }

    fn emit_entry(&mut self) {
        let entry = self.input.entry;
        let function = self.naming.method_name(entry);
        self.writer.location(None);
        if self.input.needs_initialization(&entry.class) {
            let init = self.naming.initializer_name(&entry.class);
            self.writer
                .open("function main()")
                .line(&format!("{}();", init))
                .line(&format!("return {}.apply(null, arguments);", function))
                .close("");
        } else {
            self.writer.line(&format!("var main = {};", function));
        }
    }

    /// Constructor or class reference for a type, as used by casts and class constants
    pub(super) fn type_ref(&mut self, ty: &ValueType) -> String {
        match ty {
            ValueType::Primitive(p) => format!("$rt_{}cls()", p.name()),
            ValueType::Void => "$rt_voidcls()".to_string(),
            ValueType::Object(class) => self.naming.class_name(class),
            ValueType::Array(item) => format!("$rt_arraycls({})", self.type_ref(item)),
        }
    }
}

/// Initial value of a field of type `ty`
fn default_value(ty: &ValueType) -> &'static str {
    match ty {
        ValueType::Primitive(PrimitiveType::Long) => "Long_ZERO",
        ValueType::Primitive(_) => "0",
        _ => "null",
    }
}

/// JSON string syntax is valid JavaScript string syntax
pub(super) fn string_literal(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{DependencyAnalyzer, DependencyInfo, MemoryClassSource, MethodHolder};
    use crate::ir::listing::parse;
    use crate::ir::Program;

    fn body(text: &str) -> Program {
        parse(text).expect("valid listing")
    }

    fn compile(source: &MemoryClassSource, entry: &str) -> Result<JsOutput, CodegenError> {
        let entry: MethodReference = entry.parse().expect("reference");
        let mut analyzer = DependencyAnalyzer::new(source);
        analyzer.add_entry_point(&entry);
        let info: DependencyInfo = analyzer.finish();
        let bodies = FxHashMap::default();
        let input = CodegenInput {
            classes: source,
            dependencies: &info,
            bodies: &bodies,
            entry: &entry,
        };
        generate(input, &JsOptions::default(), false)
    }

    fn hierarchy() -> MemoryClassSource {
        MemoryClassSource::new()
            .with(ClassHolder::new("java.lang.Object").with_method(MethodHolder::new(
                "<init>()V".parse().expect("descriptor"),
                false,
                body("var %0\n$0\n    return\n"),
            )))
            .with(
                ClassHolder::new("Shape")
                    .with_field("id", ValueType::INT, false)
                    .with_field("count", ValueType::INT, true)
                    .with_method(MethodHolder::new("area()I".parse().expect("descriptor"), false, body("var %0\nvar %1\n$0\n    %1 := 1\n    return %1\n")))
                    .with_method(MethodHolder::new("<clinit>()V".parse().expect("descriptor"), true, body("$0\n    return\n"))),
            )
            .with(
                ClassHolder::new("Square")
                    .with_parent("Shape")
                    .with_method(MethodHolder::new("area()I".parse().expect("descriptor"), false, body("var %0\nvar %1\n$0\n    %1 := 4\n    return %1\n"))),
            )
            .with(ClassHolder::new("Main").with_method(MethodHolder::new(
                "main()I".parse().expect("descriptor"),
                true,
                body(
                    "var %0\nvar %1\nvar %2\n$0\n    %1 := new Square\n    %2 := invokeVirtual `Shape.area()I` %1\n    return %2\n",
                ),
            )))
    }

    #[test]
    fn test_class_layout() {
        let output = compile(&hierarchy(), "Main.main()I").expect("generates");
        let code = output.code;

        let shape = code.find("function Shape()").expect("Shape emitted");
        let square = code.find("function Square()").expect("Square emitted");
        assert!(shape < square, "superclass first");
        assert!(code.contains("    Shape.call(this);\n"));
        assert!(code.contains("    this.$id = 0;\n"));
        assert!(code.contains("Square.prototype = Object.create(Shape.prototype);"));
        assert!(code.contains("var Shape_count = 0;"));
        assert!(code.contains("Square.prototype.m_area = function() { return Square_area(this); };"));
        assert!(code.contains("Shape_$callClinit = function() {};"));
        assert!(code.contains("var main = Main_main;"));
        assert!(output.source_map.is_none());
    }

    #[test]
    fn test_instance_entry_rejected() {
        let source = MemoryClassSource::new()
            .with(ClassHolder::new("java.lang.Object"))
            .with(ClassHolder::new("Main").with_method(MethodHolder::new(
                "run()V".parse().expect("descriptor"),
                false,
                body("var %0\n$0\n    return\n"),
            )));
        assert!(matches!(compile(&source, "Main.run()V"), Err(CodegenError::InstanceEntry(_))));
    }

    #[test]
    fn test_string_literal_escaping() {
        assert_eq!(string_literal("a\"b\n"), "\"a\\\"b\\n\"");
    }
}
