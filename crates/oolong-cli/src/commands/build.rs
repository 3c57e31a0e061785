//! `oolong build`: compile a project to JavaScript or WebAssembly.

use crate::manifest;
use crate::output::StyledOutput;
use crate::report;
use anyhow::{anyhow, Context};
use oolong_engine::{CompileError, CompileOptions, CompiledOutput, Compiler, OptLevel, Target};
use std::path::{Path, PathBuf};
use termcolor::ColorChoice;
use tracing::info;

/// Command-line settings that take precedence over the manifest `[options]`
#[derive(Debug, Default)]
pub struct BuildOverrides {
    pub output: Option<PathBuf>,
    pub target: Option<String>,
    pub source_map: bool,
    pub optimization: Option<String>,
}

impl BuildOverrides {
    fn apply(&self, options: &mut CompileOptions) -> anyhow::Result<()> {
        if let Some(target) = &self.target {
            options.target = target.parse::<Target>().map_err(|e| anyhow!(e))?;
        }
        if self.source_map {
            options.source_maps = true;
        }
        if let Some(level) = &self.optimization {
            options.optimization = match level.as_str() {
                "none" => OptLevel::None,
                "basic" => OptLevel::Basic,
                "full" => OptLevel::Full,
                other => return Err(anyhow!("unknown optimization level '{}'", other)),
            };
        }
        Ok(())
    }
}

/// Default output file for `target`
fn default_output(target: Target) -> PathBuf {
    match target {
        Target::Js => PathBuf::from("classes.js"),
        Target::Wasm => PathBuf::from("classes.wasm"),
    }
}

/// `path` with `suffix` appended to its file name
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

pub fn execute(path: &Path, overrides: BuildOverrides, color: ColorChoice) -> anyhow::Result<bool> {
    let project = manifest::load(path, color)?;
    let mut options = project.options.clone();
    overrides.apply(&mut options)?;
    let output_path = overrides.output.clone().unwrap_or_else(|| default_output(options.target));

    let compiler = Compiler::new(&project.classes, options);
    let output = match compiler.compile(&project.entry) {
        Ok(output) => output,
        Err(CompileError::Analysis(diagnostics)) => {
            let mut out = StyledOutput::stdout(color);
            report::write_diagnostics(&mut out, &diagnostics);
            return Ok(false);
        }
        Err(error) => return Err(anyhow::Error::new(error).context(format!("cannot compile {}", project.entry))),
    };

    let written = write_output(&output, &output_path)?;
    info!("Wrote {} files", written.len());

    let mut out = StyledOutput::stdout(color);
    for file in written {
        out.success("wrote");
        out.plain(&format!(" {}", file.display()));
        out.newline();
    }
    Ok(true)
}

/// Write the main output, then `<out>.map` and, for WebAssembly with string literals,
/// `<out>.strings.json`. Returns the files written.
pub fn write_output(output: &CompiledOutput, path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let mut written = Vec::new();

    let mut main = output.bytes().to_vec();
    let source_map = output.source_map_json()?;
    let map_path = sibling(path, ".map");
    if source_map.is_some() {
        if let (CompiledOutput::JavaScript { .. }, Some(name)) = (output, map_path.file_name()) {
            main.extend_from_slice(format!("//# sourceMappingURL={}\n", name.to_string_lossy()).as_bytes());
        }
    }
    std::fs::write(path, &main).with_context(|| format!("cannot write {}", path.display()))?;
    written.push(path.to_path_buf());

    if let Some(json) = source_map {
        std::fs::write(&map_path, json).with_context(|| format!("cannot write {}", map_path.display()))?;
        written.push(map_path);
    }

    if let CompiledOutput::WebAssembly { strings, .. } = output {
        if !strings.is_empty() {
            let strings_path = sibling(path, ".strings.json");
            let json = serde_json::to_string_pretty(strings)?;
            std::fs::write(&strings_path, json)
                .with_context(|| format!("cannot write {}", strings_path.display()))?;
            written.push(strings_path);
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oolong_engine::SourceMapBuilder;

    #[test]
    fn test_overrides() {
        let mut options = CompileOptions::default();
        let overrides = BuildOverrides {
            target: Some("wasm".to_string()),
            source_map: true,
            optimization: Some("none".to_string()),
            ..BuildOverrides::default()
        };
        overrides.apply(&mut options).expect("valid overrides");
        assert_eq!(options.target, Target::Wasm);
        assert!(options.source_maps);
        assert_eq!(options.optimization, OptLevel::None);

        let bad = BuildOverrides {
            target: Some("jvm".to_string()),
            ..BuildOverrides::default()
        };
        assert!(bad.apply(&mut options).is_err());
    }

    #[test]
    fn test_sibling_paths() {
        assert_eq!(sibling(Path::new("out/app.js"), ".map"), PathBuf::from("out/app.js.map"));
        assert_eq!(default_output(Target::Wasm), PathBuf::from("classes.wasm"));
    }

    #[test]
    fn test_write_output_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("dist/app.js");
        let output = CompiledOutput::JavaScript {
            code: "var main = Main_main;\n".to_string(),
            source_map: Some(SourceMapBuilder::new().build()),
        };
        let written = write_output(&output, &path).expect("writes");
        assert_eq!(written, vec![path.clone(), dir.path().join("dist/app.js.map")]);
        let code = std::fs::read_to_string(&path).expect("output");
        assert!(code.ends_with("//# sourceMappingURL=app.js.map\n"));

        let wasm = CompiledOutput::WebAssembly {
            binary: b"\0asm\x01\0\0\0".to_vec(),
            strings: vec!["hello".to_string()],
            source_map: None,
        };
        let path = dir.path().join("app.wasm");
        let written = write_output(&wasm, &path).expect("writes");
        assert_eq!(written.len(), 2);
        let strings: Vec<String> =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("app.wasm.strings.json")).expect("strings"))
                .expect("json");
        assert_eq!(strings, vec!["hello".to_string()]);
    }
}
