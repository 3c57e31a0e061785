//! Compiler configuration
//!
//! Every field has a default, so a partial `[options]` table deserializes cleanly.

use crate::dependency::WorklistOrder;
use crate::ir::optimize::OptLevel;
use serde::Deserialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// JavaScript text
    #[default]
    Js,
    /// WebAssembly binary module
    Wasm,
}

impl std::str::FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "js" => Ok(Target::Js),
            "wasm" => Ok(Target::Wasm),
            other => Err(format!("unknown target '{}', expected 'js' or 'wasm'", other)),
        }
    }
}

/// JavaScript backend settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JsOptions {
    /// Spaces per indentation level
    pub indent: usize,
}

impl Default for JsOptions {
    fn default() -> Self {
        Self { indent: 4 }
    }
}

/// WebAssembly backend settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WasmOptions {
    /// Initial memory size in 64 KiB pages
    pub memory_pages: u32,
    /// Export the memory as `memory`
    pub export_memory: bool,
}

impl Default for WasmOptions {
    fn default() -> Self {
        Self {
            memory_pages: 16,
            export_memory: true,
        }
    }
}

/// Options for a whole compilation
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Output format
    pub target: Target,
    /// Emit a source map next to the output
    pub source_maps: bool,
    /// Passes to run on reachable bodies
    pub optimization: OptLevel,
    /// Order in which the analysis processes pending work
    pub worklist_order: WorklistOrder,
    /// Settings for the JavaScript backend
    pub js: JsOptions,
    /// Settings for the WebAssembly backend
    pub wasm: WasmOptions,
}

impl CompileOptions {
    /// Defaults for `target`
    pub fn new(target: Target) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }

    /// Enable or disable source maps
    pub fn with_source_maps(mut self, enabled: bool) -> Self {
        self.source_maps = enabled;
        self
    }

    /// Set the optimization level
    pub fn with_optimization(mut self, level: OptLevel) -> Self {
        self.optimization = level;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CompileOptions::default();
        assert_eq!(options.target, Target::Js);
        assert!(!options.source_maps);
        assert_eq!(options.optimization, OptLevel::Basic);
        assert_eq!(options.worklist_order, WorklistOrder::Fifo);
        assert_eq!(options.js.indent, 4);
        assert_eq!(options.wasm.memory_pages, 16);
    }

    #[test]
    fn test_partial_json() {
        let options: CompileOptions =
            serde_json::from_str(r#"{"target": "wasm", "worklist_order": "lifo", "wasm": {"memory_pages": 2}}"#)
                .expect("valid options");
        assert_eq!(options.target, Target::Wasm);
        assert_eq!(options.worklist_order, WorklistOrder::Lifo);
        assert_eq!(options.wasm.memory_pages, 2);
        assert!(options.wasm.export_memory);
        assert_eq!(options.optimization, OptLevel::Basic);
    }

    #[test]
    fn test_target_from_str() {
        assert_eq!("wasm".parse::<Target>(), Ok(Target::Wasm));
        assert!("jvm".parse::<Target>().is_err());
    }
}
