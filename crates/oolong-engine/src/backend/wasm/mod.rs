//! WebAssembly backend
//!
//! Emits one module with a linear memory holding the class structs laid out by
//! [`layout`], one function per reachable method, a function table for virtual calls,
//! lazy class initializers and an exported `main`.
//!
//! The host supplies allocation, strings and type tests through imports from the
//! `oolong` module:
//!
//! | Import          | Signature                      |
//! |-----------------|--------------------------------|
//! | `allocate`      | `(class, size) -> object`      |
//! | `allocateArray` | `(class, width, length) -> array` |
//! | `cloneArray`    | `(array) -> array`             |
//! | `string`        | `(index) -> object`            |
//! | `isSupertype`   | `(class, class) -> i32`        |
//! | `fmod`, `fmodf` | floating point remainder       |
//!
//! String literals are returned alongside the binary and materialized by `string`.
//!
//! # Structure
//!
//! - `model`: instructions, functions and the module under construction
//! - `render`: binary encoding with source map positions
//! - `layout`: object, class struct and static field layout
//! - `lower`: method bodies
//! - `intrinsics`: generators for reflective array access and identity hashes

mod intrinsics;
mod lower;

pub mod layout;
pub mod model;
pub mod render;

pub use lower::WasmMethodContext;
pub use render::{render, RenderedModule};

use self::layout::{Layout, CLASS_OFFSET};
use self::lower::{method_signature, zero};
use self::model::{
    IntBinaryOp, MemoryType, WasmExpression, WasmFunction, WasmImport, WasmModule, WasmSignature, WasmType,
};
use super::common::{IntrinsicCall, IntrinsicRegistry};
use super::CodegenInput;
use crate::dependency::{ClassHierarchy, OBJECT_CLASS};
use crate::error::CodegenError;
use crate::ir::{MethodDescriptor, MethodReference, ValueType};
use crate::options::WasmOptions;
use crate::sourcemap::SourceMap;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

/// Intrinsic generator: appends instructions for one call site
pub type WasmIntrinsic = fn(&mut WasmMethodContext<'_, '_>, &IntrinsicCall<'_>) -> Result<(), CodegenError>;

/// Module the runtime imports come from
pub const RUNTIME_MODULE: &str = "oolong";

pub(crate) const IMPORT_ALLOCATE: &str = "$rt_allocate";
pub(crate) const IMPORT_ALLOCATE_ARRAY: &str = "$rt_allocateArray";
pub(crate) const IMPORT_CLONE_ARRAY: &str = "$rt_cloneArray";
pub(crate) const IMPORT_STRING: &str = "$rt_string";
pub(crate) const IMPORT_IS_SUPERTYPE: &str = "$rt_isSupertype";
pub(crate) const IMPORT_FMOD: &str = "$rt_fmod";
pub(crate) const IMPORT_FMODF: &str = "$rt_fmodf";

/// Exception thrown and not yet caught, or 0
pub(crate) const EXCEPTION_GLOBAL: &str = "$exception";
pub(crate) const HASH_COUNTER_GLOBAL: &str = "$hashCounter";
const TRAP_FUNCTION: &str = "$rt_trap";

const PAGE_SIZE: u32 = 65536;

/// Generated module
#[derive(Debug, Clone, PartialEq)]
pub struct WasmOutput {
    /// Module binary
    pub binary: Vec<u8>,
    /// String literals, indexed by the argument of the `string` import
    pub strings: Vec<String>,
    /// Mappings from code offsets to source lines
    pub source_map: Option<SourceMap>,
}

/// Generate a module for `input`
pub fn generate(input: CodegenInput<'_>, options: &WasmOptions, source_maps: bool) -> Result<WasmOutput, CodegenError> {
    let generator = WasmGenerator::new(input, options)?;
    let (module, strings) = generator.generate()?;
    let rendered = render(&module, source_maps)?;
    Ok(WasmOutput {
        binary: rendered.binary,
        strings,
        source_map: rendered.source_map,
    })
}

/// Function name of a method; also its name in the source map
pub fn function_name(method: &MethodReference) -> String {
    method.to_string()
}

pub(crate) fn initializer_name(class: &str) -> String {
    format!("{}$init", class)
}

fn initialized_flag(class: &str) -> String {
    format!("{}$initialized", class)
}

/// Builds the module model for the reachable part of a program
pub struct WasmGenerator<'a> {
    input: CodegenInput<'a>,
    hierarchy: ClassHierarchy<'a>,
    layout: Layout,
    module: WasmModule,
    intrinsics: IntrinsicRegistry<WasmIntrinsic>,
    strings: Vec<String>,
    string_index: FxHashMap<String, u32>,
    implementors: FxHashMap<String, Vec<u32>>,
}

impl<'a> WasmGenerator<'a> {
    /// Generator with memory laid out for the linked classes
    pub fn new(input: CodegenInput<'a>, options: &WasmOptions) -> Result<Self, CodegenError> {
        let hierarchy = ClassHierarchy::new(input.classes);
        let layout = Layout::new(&input, &hierarchy)?;
        let mut generator = Self {
            input,
            hierarchy,
            layout,
            module: WasmModule::new(options.memory_pages, options.export_memory),
            intrinsics: intrinsics::registry(),
            strings: Vec::new(),
            string_index: FxHashMap::default(),
            implementors: FxHashMap::default(),
        };
        generator.add_runtime();
        Ok(generator)
    }

    fn add_runtime(&mut self) {
        use WasmType::*;
        let imports: [(&str, &str, Vec<WasmType>, Option<WasmType>); 7] = [
            (IMPORT_ALLOCATE, "allocate", vec![I32, I32], Some(I32)),
            (IMPORT_ALLOCATE_ARRAY, "allocateArray", vec![I32, I32, I32], Some(I32)),
            (IMPORT_CLONE_ARRAY, "cloneArray", vec![I32], Some(I32)),
            (IMPORT_STRING, "string", vec![I32], Some(I32)),
            (IMPORT_IS_SUPERTYPE, "isSupertype", vec![I32, I32], Some(I32)),
            (IMPORT_FMOD, "fmod", vec![F64, F64], Some(F64)),
            (IMPORT_FMODF, "fmodf", vec![F32, F32], Some(F32)),
        ];
        for (name, field, params, result) in imports {
            self.module.add_import(WasmImport {
                name: name.to_string(),
                module: RUNTIME_MODULE.to_string(),
                field: field.to_string(),
                signature: WasmSignature::new(params, result),
            });
        }
        self.module.add_global(EXCEPTION_GLOBAL, I32, WasmExpression::I32Const(0));
        self.module.add_global(HASH_COUNTER_GLOBAL, I32, WasmExpression::I32Const(0));

        let mut trap = WasmFunction::new(TRAP_FUNCTION, Vec::new(), None);
        trap.body.push(WasmExpression::Unreachable);
        self.module.add_function(trap);
    }

    /// Build the module; strings are returned in pool order
    pub fn generate(mut self) -> Result<(WasmModule, Vec<String>), CodegenError> {
        self.input.entry_method()?;
        info!("Generating WebAssembly for {}", self.input.entry);

        let methods: Vec<MethodReference> = self
            .input
            .dependencies
            .methods()
            .iter()
            .map(|info| info.reference.clone())
            .filter(|method| self.intrinsics.find(method).is_none())
            .collect();
        for method in &methods {
            let function = self.lower_method(method)?;
            self.module.add_function(function);
        }

        let classes: Vec<&'a str> = self.input.reachable_classes().collect();
        for class in classes {
            if self.input.needs_initialization(class) {
                self.add_initializer(class);
            }
        }
        self.add_entry();
        self.add_table();

        let heap_base = self.layout.heap_base();
        let mut heap = WasmFunction::new("$rt_heapBase", Vec::new(), Some(WasmType::I32));
        heap.body.push(WasmExpression::I32Const(heap_base as i32));
        heap.export_name = Some("heapBase".to_string());
        self.module.add_function(heap);
        self.module.memory_pages = self.module.memory_pages.max(heap_base / PAGE_SIZE + 1);

        info!(
            "Generated {} functions, {} strings, static data up to {}",
            self.module.functions.len(),
            self.strings.len(),
            heap_base
        );
        Ok((self.module, self.strings))
    }

    fn lower_method(&mut self, method: &MethodReference) -> Result<WasmFunction, CodegenError> {
        let input = self.input;
        let holder = input
            .method(method)
            .ok_or_else(|| CodegenError::MissingBody(method.clone()))?;
        let program = input
            .body(method)
            .ok_or_else(|| CodegenError::MissingBody(method.clone()))?;
        program.validate().map_err(|source| CodegenError::InvalidProgram {
            method: method.clone(),
            source,
        })?;
        debug!("Emitting method {}", method);
        WasmMethodContext::new(self, method, holder.is_static, program).lower()
    }

    /// `Foo$init`: guarded by a flag, runs the superclass initializer, then `<clinit>`
    fn add_initializer(&mut self, class: &str) {
        let flag = initialized_flag(class);
        self.module.add_global(flag.as_str(), WasmType::I32, WasmExpression::I32Const(0));

        let mut function = WasmFunction::new(initializer_name(class), Vec::new(), None);
        function.body.push(WasmExpression::when(
            WasmExpression::GetGlobal(flag.clone()),
            vec![WasmExpression::Return(None)],
        ));
        function
            .body
            .push(WasmExpression::SetGlobal(flag, Box::new(WasmExpression::I32Const(1))));
        let parent = self.input.classes.get(class).and_then(|holder| holder.parent.as_deref());
        if let Some(parent) = parent.filter(|parent| self.input.needs_initialization(parent)) {
            function
                .body
                .push(WasmExpression::call(initializer_name(parent), Vec::new()));
            function.body.push(WasmExpression::when(
                WasmExpression::GetGlobal(EXCEPTION_GLOBAL.into()),
                vec![WasmExpression::Return(None)],
            ));
        }
        let clinit = MethodReference::new(class, MethodDescriptor::new("<clinit>", Vec::new(), ValueType::Void));
        if self.input.is_reachable(&clinit) {
            function.body.push(WasmExpression::call(function_name(&clinit), Vec::new()));
        }
        self.module.add_function(function);
    }

    /// Export the entry as `main`, through a wrapper running its class initializer if needed
    fn add_entry(&mut self) {
        let entry = self.input.entry;
        let name = function_name(entry);
        if !self.input.needs_initialization(&entry.class) {
            if let Some(function) = self.module.functions.iter_mut().find(|f| f.name == name) {
                function.export_name = Some("main".to_string());
            }
            return;
        }
        let signature = method_signature(entry, true);
        let arguments = (0..signature.params.len() as u32).map(WasmExpression::get_local).collect();
        let call = WasmExpression::call(name, arguments);
        let mut wrapper = WasmFunction::new("$main", signature.params, signature.result);
        wrapper.body.push(WasmExpression::call(initializer_name(&entry.class), Vec::new()));
        wrapper.body.push(WasmExpression::when(
            WasmExpression::GetGlobal(EXCEPTION_GLOBAL.into()),
            vec![WasmExpression::Return(signature.result.map(|ty| Box::new(zero(ty))))],
        ));
        match signature.result {
            Some(_) => wrapper.body.push(WasmExpression::Return(Some(Box::new(call)))),
            None => wrapper.body.push(call),
        }
        wrapper.export_name = Some("main".to_string());
        self.module.add_function(wrapper);
    }

    /// Table slot 0 traps; every virtual target gets a slot after it
    fn add_table(&mut self) {
        let mut slots: FxHashMap<MethodReference, u32> = FxHashMap::default();
        let mut table = vec![TRAP_FUNCTION.to_string()];
        for method in self.layout.virtual_targets() {
            if slots.contains_key(method) || self.intrinsics.find(method).is_some() {
                continue;
            }
            slots.insert(method.clone(), table.len() as u32);
            table.push(function_name(method));
        }
        self.module.data = self.layout.data(|method| slots.get(method).copied().unwrap_or(0));
        self.module.table = table;
    }

    // ===== Shared with method lowering =====

    pub(crate) fn string_constant(&mut self, value: &str) -> u32 {
        if let Some(&index) = self.string_index.get(value) {
            return index;
        }
        let index = self.strings.len() as u32;
        self.strings.push(value.to_string());
        self.string_index.insert(value.to_string(), index);
        index
    }

    /// Non-zero when the non-null object `value` is an instance of `target`.
    ///
    /// Interfaces compare against every reachable implementor; classes and arrays ask
    /// the runtime to walk the parent chain of the object's class.
    pub(crate) fn instance_check(&mut self, value: WasmExpression, target: &ValueType) -> WasmExpression {
        let class_of = |value: WasmExpression| WasmExpression::load(MemoryType::Int32, CLASS_OFFSET, value);
        match target {
            ValueType::Object(name) if name == OBJECT_CLASS => WasmExpression::I32Const(1),
            ValueType::Object(name) if self.input.classes.get(name).is_some_and(|holder| holder.is_interface) => {
                let implementors = self.implementors(name);
                implementors
                    .into_iter()
                    .map(|address| {
                        WasmExpression::int(
                            IntBinaryOp::Eq,
                            class_of(value.clone()),
                            WasmExpression::I32Const(address as i32),
                        )
                    })
                    .reduce(|first, second| WasmExpression::int(IntBinaryOp::Or, first, second))
                    .unwrap_or(WasmExpression::I32Const(0))
            }
            ValueType::Object(_) | ValueType::Array(_) => {
                let address = self.layout.class_address(target);
                WasmExpression::call(
                    IMPORT_IS_SUPERTYPE,
                    vec![WasmExpression::I32Const(address as i32), class_of(value)],
                )
            }
            ValueType::Primitive(_) | ValueType::Void => WasmExpression::I32Const(0),
        }
    }

    fn implementors(&mut self, interface: &str) -> Vec<u32> {
        if let Some(addresses) = self.implementors.get(interface) {
            return addresses.clone();
        }
        let mut addresses = Vec::new();
        let classes: Vec<&'a str> = self.input.reachable_classes().collect();
        for class in classes {
            let concrete = self.input.classes.get(class).is_some_and(|holder| !holder.is_interface);
            if concrete && self.hierarchy.is_super_type(interface, class) {
                addresses.push(self.layout.class_address(&ValueType::object(class)));
            }
        }
        self.implementors.insert(interface.to_string(), addresses.clone());
        addresses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{ClassHolder, DependencyAnalyzer, MemoryClassSource, MethodHolder};
    use crate::ir::listing::parse;
    use crate::ir::Program;

    fn body(text: &str) -> Program {
        parse(text).expect("valid listing")
    }

    fn build(source: &MemoryClassSource, entry: &str) -> Result<(WasmModule, Vec<String>), CodegenError> {
        let entry: MethodReference = entry.parse().expect("reference");
        let mut analyzer = DependencyAnalyzer::new(source);
        analyzer.add_entry_point(&entry);
        let info = analyzer.finish();
        let bodies = FxHashMap::default();
        let input = CodegenInput {
            classes: source,
            dependencies: &info,
            bodies: &bodies,
            entry: &entry,
        };
        WasmGenerator::new(input, &WasmOptions::default())?.generate()
    }

    fn shapes() -> MemoryClassSource {
        MemoryClassSource::new()
            .with(ClassHolder::new(OBJECT_CLASS).with_method(MethodHolder::new(
                "<init>()V".parse().expect("descriptor"),
                false,
                body("var %0\n$0\n    return\n"),
            )))
            .with(
                ClassHolder::new("Shape")
                    .with_field("count", ValueType::INT, true)
                    .with_method(MethodHolder::new(
                        "area()I".parse().expect("descriptor"),
                        false,
                        body("var %0\nvar %1\n$0\n    %1 := 1\n    return %1\n"),
                    ))
                    .with_method(MethodHolder::new(
                        "<clinit>()V".parse().expect("descriptor"),
                        true,
                        body("var %0\n$0\n    %0 := 5\n    field `Shape.count` := %0 as I\n    return\n"),
                    )),
            )
            .with(
                ClassHolder::new("Square").with_parent("Shape").with_method(MethodHolder::new(
                    "area()I".parse().expect("descriptor"),
                    false,
                    body("var %0\nvar %1\n$0\n    %1 := 4\n    return %1\n"),
                )),
            )
            .with(ClassHolder::new("Main").with_method(MethodHolder::new(
                "main()I".parse().expect("descriptor"),
                true,
                body("var %0\nvar %1\nvar %2\n$0\n    %1 := new Square\n    %2 := invokeVirtual `Shape.area()I` %1\n    initClass Shape\n    %0 := 'done'\n    return %2\n"),
            )))
    }

    #[test]
    fn test_module_contents() {
        let (module, strings) = build(&shapes(), "Main.main()I").expect("generates");
        assert_eq!(strings, vec!["done".to_string()]);
        assert_eq!(module.imports.len(), 7);
        assert!(module.imports.iter().all(|import| import.module == RUNTIME_MODULE));

        let names: Vec<&str> = module.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names[0], TRAP_FUNCTION);
        assert!(names.contains(&"Main.main()I"));
        assert!(names.contains(&"Square.area()I"));
        assert!(names.contains(&"Shape$init"));

        let main = module
            .functions
            .iter()
            .find(|f| f.export_name.as_deref() == Some("main"))
            .expect("main exported");
        assert_eq!(main.name, "Main.main()I");

        assert_eq!(module.table[0], TRAP_FUNCTION);
        assert!(module.table.contains(&"Square.area()I".to_string()));
        assert!(module.globals.iter().any(|g| g.name == "Shape$initialized"));
        assert_eq!(module.data.len(), 1);
    }

    #[test]
    fn test_entry_wrapper_runs_initializer() {
        let source = MemoryClassSource::new()
            .with(ClassHolder::new(OBJECT_CLASS))
            .with(
                ClassHolder::new("Main")
                    .with_method(MethodHolder::new(
                        "<clinit>()V".parse().expect("descriptor"),
                        true,
                        body("$0\n    return\n"),
                    ))
                    .with_method(MethodHolder::new(
                        "main(I)I".parse().expect("descriptor"),
                        true,
                        body("var %0\nvar %1\n$0\n    return %1\n"),
                    )),
            );
        let (module, _) = build(&source, "Main.main(I)I").expect("generates");
        let wrapper = module
            .functions
            .iter()
            .find(|f| f.export_name.as_deref() == Some("main"))
            .expect("main exported");
        assert_eq!(wrapper.name, "$main");
        assert_eq!(wrapper.params, vec![WasmType::I32]);
        assert_eq!(
            wrapper.body[0],
            WasmExpression::call("Main$init", Vec::new())
        );
    }

    #[test]
    fn test_generate_renders() {
        let source = shapes();
        let entry: MethodReference = "Main.main()I".parse().expect("reference");
        let mut analyzer = DependencyAnalyzer::new(&source);
        analyzer.add_entry_point(&entry);
        let info = analyzer.finish();
        let bodies = FxHashMap::default();
        let input = CodegenInput {
            classes: &source,
            dependencies: &info,
            bodies: &bodies,
            entry: &entry,
        };
        let output = generate(input, &WasmOptions::default(), true).expect("renders");
        assert_eq!(&output.binary[..4], b"\0asm");
        assert_eq!(output.strings.len(), 1);
        let map = output.source_map.expect("source map requested");
        assert_eq!(map.file.as_deref(), Some("classes.wasm"));
    }
}
