//! Compilation pipeline
//!
//! `analyze -> optimize -> emit`, each phase in its own tracing span. Bodies are
//! optimized on copies, the class source is never modified.

use crate::backend::{js, wasm, CodegenInput};
use crate::dependency::{ClassSource, DependencyAnalyzer, DependencyInfo};
use crate::error::{CompileError, CompileResult};
use crate::ir::optimize::{OptStats, Optimizer};
use crate::ir::{MethodReference, Program};
use crate::options::{CompileOptions, Target};
use crate::sourcemap::SourceMap;
use rustc_hash::FxHashMap;
use tracing::{debug, info, info_span};

/// Result of a successful compilation
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledOutput {
    /// Generated JavaScript text
    JavaScript {
        code: String,
        source_map: Option<SourceMap>,
    },
    /// Generated WebAssembly module
    WebAssembly {
        binary: Vec<u8>,
        /// String literals referenced by index from the module
        strings: Vec<String>,
        source_map: Option<SourceMap>,
    },
}

impl CompiledOutput {
    /// Source map of either output, if one was generated
    pub fn source_map(&self) -> Option<&SourceMap> {
        match self {
            CompiledOutput::JavaScript { source_map, .. } | CompiledOutput::WebAssembly { source_map, .. } => {
                source_map.as_ref()
            }
        }
    }

    /// Source map as JSON, if one was generated
    pub fn source_map_json(&self) -> CompileResult<Option<String>> {
        self.source_map().map(|map| map.to_json()).transpose().map_err(CompileError::from)
    }

    /// Bytes to write for the main output file
    pub fn bytes(&self) -> &[u8] {
        match self {
            CompiledOutput::JavaScript { code, .. } => code.as_bytes(),
            CompiledOutput::WebAssembly { binary, .. } => binary,
        }
    }
}

/// Whole-program compiler over a fixed set of classes
pub struct Compiler<'a> {
    classes: &'a dyn ClassSource,
    options: CompileOptions,
}

impl<'a> Compiler<'a> {
    /// Create a compiler reading classes from `classes`
    pub fn new(classes: &'a dyn ClassSource, options: CompileOptions) -> Self {
        Self { classes, options }
    }

    /// Options the compiler was created with
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Run the dependency analysis from `entry`. Reference-typed parameters of the entry
    /// receive their declared type.
    pub fn analyze(&self, entry: &MethodReference) -> DependencyInfo {
        let _span = info_span!("analyze", entry = %entry).entered();
        let mut analyzer = DependencyAnalyzer::with_order(self.classes, self.options.worklist_order);
        {
            let mut entry_point = analyzer.add_entry_point(entry);
            for (index, parameter) in entry.descriptor.parameters.iter().enumerate() {
                if parameter.is_reference() {
                    entry_point.propagate(index as u32 + 1, &parameter.class_name());
                }
            }
        }
        let info = analyzer.finish();
        info!(
            "Analysis reached {} methods and {} classes",
            info.methods().len(),
            info.classes().len()
        );
        info
    }

    /// Optimized copies of every reachable body
    pub fn optimize(&self, dependencies: &DependencyInfo) -> (FxHashMap<MethodReference, Program>, OptStats) {
        let _span = info_span!("optimize", level = ?self.options.optimization).entered();
        let optimizer = Optimizer::new(self.options.optimization);
        let mut total = OptStats::default();
        let mut bodies = FxHashMap::default();
        for method in dependencies.methods() {
            let reference = &method.reference;
            let Some(program) = self
                .classes
                .get(&reference.class)
                .and_then(|class| class.method(&reference.descriptor))
                .and_then(|holder| holder.program.as_ref())
            else {
                continue;
            };
            let mut program = program.clone();
            let stats = optimizer.optimize(&mut program);
            if stats != OptStats::default() {
                debug!("Optimized {}: {:?}", reference, stats);
            }
            total.constants_folded += stats.constants_folded;
            total.dead_instructions_removed += stats.dead_instructions_removed;
            total.unreachable_blocks_removed += stats.unreachable_blocks_removed;
            bodies.insert(reference.clone(), program);
        }
        info!("Optimized {} bodies: {:?}", bodies.len(), total);
        (bodies, total)
    }

    /// Compile the program reachable from `entry`
    pub fn compile(&self, entry: &MethodReference) -> CompileResult<CompiledOutput> {
        let dependencies = self.analyze(entry);
        if dependencies.diagnostics().has_errors() {
            return Err(CompileError::Analysis(dependencies.diagnostics().clone()));
        }
        let (bodies, _) = self.optimize(&dependencies);

        let _span = info_span!("emit", target = ?self.options.target).entered();
        let input = CodegenInput {
            classes: self.classes,
            dependencies: &dependencies,
            bodies: &bodies,
            entry,
        };
        let output = match self.options.target {
            Target::Js => {
                let output = js::generate(input, &self.options.js, self.options.source_maps)?;
                CompiledOutput::JavaScript {
                    code: output.code,
                    source_map: output.source_map,
                }
            }
            Target::Wasm => {
                let output = wasm::generate(input, &self.options.wasm, self.options.source_maps)?;
                CompiledOutput::WebAssembly {
                    binary: output.binary,
                    strings: output.strings,
                    source_map: output.source_map,
                }
            }
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{ClassHolder, MemoryClassSource, MethodHolder, OBJECT_CLASS};
    use crate::ir::listing::parse;
    use crate::ir::optimize::OptLevel;

    fn source() -> MemoryClassSource {
        MemoryClassSource::new().with(ClassHolder::new(OBJECT_CLASS)).with(
            ClassHolder::new("Main")
                .with_method(MethodHolder::new(
                    "main()I".parse().expect("descriptor"),
                    true,
                    parse("var %0\nvar %1\nvar %2\nvar %3\n$0\n    %1 := 2\n    %2 := 3\n    %3 := %1 + %2 as int\n    return %3\n")
                        .expect("valid listing"),
                ))
                .with_method(MethodHolder::new(
                    "broken()V".parse().expect("descriptor"),
                    true,
                    parse("$0\n    invokeStatic `Missing.run()V`\n    return\n").expect("valid listing"),
                )),
        )
    }

    #[test]
    fn test_compile_js() {
        let source = source();
        let compiler = Compiler::new(&source, CompileOptions::new(Target::Js));
        let entry: MethodReference = "Main.main()I".parse().expect("reference");
        let output = compiler.compile(&entry).expect("compiles");
        let CompiledOutput::JavaScript { code, source_map } = output else {
            panic!("expected JavaScript output");
        };
        // 2 + 3 folded by the basic optimizer
        assert!(code.contains("= 5;"), "{}", code);
        assert!(code.contains("var main = Main_main;"));
        assert!(source_map.is_none());
    }

    #[test]
    fn test_compile_wasm_with_source_map() {
        let source = source();
        let options = CompileOptions::new(Target::Wasm).with_source_maps(true);
        let compiler = Compiler::new(&source, options);
        let entry: MethodReference = "Main.main()I".parse().expect("reference");
        let output = compiler.compile(&entry).expect("compiles");
        assert_eq!(&output.bytes()[..4], b"\0asm");
        let json = output.source_map_json().expect("serializes").expect("present");
        assert!(json.contains("\"version\":3"));
    }

    #[test]
    fn test_analysis_errors_stop_compilation() {
        let source = source();
        let compiler = Compiler::new(&source, CompileOptions::default());
        let entry: MethodReference = "Main.broken()V".parse().expect("reference");
        let error = compiler.compile(&entry).expect_err("missing callee");
        assert!(matches!(error, CompileError::Analysis(ref diagnostics) if diagnostics.has_errors()));
    }

    #[test]
    fn test_optimize_keeps_sources() {
        let source = source();
        let options = CompileOptions::default().with_optimization(OptLevel::Full);
        let compiler = Compiler::new(&source, options);
        let entry: MethodReference = "Main.main()I".parse().expect("reference");
        let info = compiler.analyze(&entry);
        let (bodies, stats) = compiler.optimize(&info);
        assert_eq!(bodies.len(), 1);
        assert!(stats.constants_folded > 0);
        let original = source
            .get("Main")
            .and_then(|class| class.method(&entry.descriptor))
            .and_then(|holder| holder.program.as_ref())
            .expect("body");
        assert_eq!(original.block(crate::ir::BlockId::new(0)).instructions.len(), 4);
    }
}
