//! Project manifest (`oolong.toml`)
//!
//! ```toml
//! entry = "Main.main()V"
//!
//! [options]
//! target = "wasm"
//!
//! [[class]]
//! name = "Main"
//! fields = [{ name = "count", type = "I", flags = ["static"] }]
//!
//! [[class.method]]
//! signature = "main()V"
//! flags = ["static"]
//! body = "main.txt"
//! ```
//!
//! Listing paths are relative to the manifest. `java.lang.Object` is added when the
//! manifest does not declare it.

use crate::report;
use anyhow::{anyhow, bail, Context};
use oolong_engine::dependency::OBJECT_CLASS;
use oolong_engine::ir::listing::parse;
use oolong_engine::{ClassHolder, CompileOptions, MemoryClassSource, MethodHolder, MethodReference, ValueType};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use termcolor::ColorChoice;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    entry: String,
    #[serde(default)]
    options: CompileOptions,
    #[serde(default, rename = "class")]
    classes: Vec<ClassEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassEntry {
    name: String,
    parent: Option<String>,
    #[serde(default)]
    interfaces: Vec<String>,
    #[serde(default)]
    flags: Vec<ClassFlag>,
    #[serde(default)]
    fields: Vec<FieldEntry>,
    #[serde(default, rename = "method")]
    methods: Vec<MethodEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ClassFlag {
    Interface,
    Abstract,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldEntry {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    flags: Vec<MemberFlag>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MethodEntry {
    signature: String,
    #[serde(default)]
    flags: Vec<MemberFlag>,
    body: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MemberFlag {
    Static,
    Abstract,
    Native,
}

/// A loaded project
#[derive(Debug)]
pub struct Project {
    pub entry: MethodReference,
    pub options: CompileOptions,
    pub classes: MemoryClassSource,
    /// Directory containing the manifest
    pub root: PathBuf,
}

/// Read and resolve a manifest. Listing errors are reported on stderr before the
/// error is returned.
pub fn load(path: &Path, color: ColorChoice) -> anyhow::Result<Project> {
    let text = std::fs::read_to_string(path).with_context(|| format!("cannot read manifest {}", path.display()))?;
    let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
    from_str(&text, &root, color).with_context(|| format!("invalid manifest {}", path.display()))
}

fn from_str(text: &str, root: &Path, color: ColorChoice) -> anyhow::Result<Project> {
    let manifest: ManifestFile = toml::from_str(text)?;
    let entry: MethodReference = manifest
        .entry
        .parse()
        .map_err(|e| anyhow!("bad entry '{}': {}", manifest.entry, e))?;

    let mut classes = MemoryClassSource::new();
    let mut has_object = false;
    for class in manifest.classes {
        has_object |= class.name == OBJECT_CLASS;
        let holder = class_holder(class, root, color)?;
        debug!("Loaded class {} with {} methods", holder.name, holder.methods.len());
        classes.add(holder);
    }
    if !has_object {
        classes.add(ClassHolder::new(OBJECT_CLASS));
    }

    Ok(Project {
        entry,
        options: manifest.options,
        classes,
        root: root.to_path_buf(),
    })
}

fn class_holder(entry: ClassEntry, root: &Path, color: ColorChoice) -> anyhow::Result<ClassHolder> {
    let mut holder = ClassHolder::new(entry.name.as_str());
    if let Some(parent) = entry.parent {
        holder = holder.with_parent(parent);
    }
    for interface in entry.interfaces {
        holder = holder.with_interface(interface);
    }
    holder.is_interface = entry.flags.contains(&ClassFlag::Interface);
    holder.is_abstract = holder.is_interface || entry.flags.contains(&ClassFlag::Abstract);

    for field in entry.fields {
        let field_type: ValueType = field
            .field_type
            .parse()
            .map_err(|e| anyhow!("field {}.{}: {}", entry.name, field.name, e))?;
        holder = holder.with_field(field.name, field_type, field.flags.contains(&MemberFlag::Static));
    }

    for method in entry.methods {
        let descriptor = method
            .signature
            .parse()
            .map_err(|e| anyhow!("method {}.{}: {}", entry.name, method.signature, e))?;
        let is_static = method.flags.contains(&MemberFlag::Static);
        let holder_method = match (&method.body, method.flags.contains(&MemberFlag::Abstract)) {
            (Some(_), true) => bail!("abstract method {}.{} has a body", entry.name, method.signature),
            (None, true) => MethodHolder::abstract_method(descriptor),
            (Some(body), false) => MethodHolder::new(descriptor, is_static, load_listing(&root.join(body), color)?),
            (None, false) if method.flags.contains(&MemberFlag::Native) => MethodHolder::native(descriptor, is_static),
            (None, false) => bail!("method {}.{} needs a body or the native flag", entry.name, method.signature),
        };
        holder = holder.with_method(holder_method);
    }
    Ok(holder)
}

fn load_listing(path: &Path, color: ColorChoice) -> anyhow::Result<oolong_engine::Program> {
    let source = std::fs::read_to_string(path).with_context(|| format!("cannot read listing {}", path.display()))?;
    parse(&source).map_err(|error| {
        report::emit_listing_error(path, &source, &error, color);
        anyhow!("invalid listing {}", path.display())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use oolong_engine::{ClassSource, Target};
    use std::fs;

    const MANIFEST: &str = r#"
entry = "Main.main()V"

[options]
target = "wasm"
source_maps = true

[[class]]
name = "Animal"
flags = ["interface"]

[[class.method]]
signature = "speak()I"
flags = ["abstract"]

[[class]]
name = "Main"
interfaces = ["Animal"]
fields = [{ name = "count", type = "I", flags = ["static"] }]

[[class.method]]
signature = "main()V"
flags = ["static"]
body = "listings/main.txt"

[[class.method]]
signature = "now()J"
flags = ["static", "native"]
"#;

    fn project_dir(manifest: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::create_dir(dir.path().join("listings")).expect("listings dir");
        fs::write(dir.path().join("listings/main.txt"), "$0\n    return\n").expect("write listing");
        fs::write(dir.path().join("oolong.toml"), manifest).expect("write manifest");
        dir
    }

    #[test]
    fn test_load_manifest() {
        let dir = project_dir(MANIFEST);
        let project = load(&dir.path().join("oolong.toml"), ColorChoice::Never).expect("loads");

        assert_eq!(project.entry.to_string(), "Main.main()V");
        assert_eq!(project.options.target, Target::Wasm);
        assert!(project.options.source_maps);
        assert_eq!(project.root, dir.path());

        let animal = project.classes.get("Animal").expect("declared");
        assert!(animal.is_interface && animal.is_abstract);
        let main = project.classes.get("Main").expect("declared");
        assert_eq!(main.interfaces, vec!["Animal".to_string()]);
        assert!(main.field("count").is_some_and(|f| f.is_static));
        let body = main.method(&"main()V".parse().expect("descriptor")).expect("method");
        assert!(body.is_static && body.program.is_some());
        let native = main.method(&"now()J".parse().expect("descriptor")).expect("method");
        assert!(native.program.is_none());
        assert!(project.classes.get(OBJECT_CLASS).is_some());
    }

    #[test]
    fn test_missing_listing() {
        let dir = project_dir(&MANIFEST.replace("listings/main.txt", "listings/gone.txt"));
        let error = load(&dir.path().join("oolong.toml"), ColorChoice::Never).expect_err("missing file");
        assert!(format!("{:#}", error).contains("cannot read listing"), "{:#}", error);
    }

    #[test]
    fn test_bad_listing() {
        let dir = project_dir(MANIFEST);
        fs::write(dir.path().join("listings/main.txt"), "$0\n    jump\n").expect("write listing");
        let error = load(&dir.path().join("oolong.toml"), ColorChoice::Never).expect_err("invalid listing");
        assert!(format!("{:#}", error).contains("invalid listing"));
    }

    #[test]
    fn test_method_without_body_rejected() {
        let manifest = "entry = \"A.f()V\"\n[[class]]\nname = \"A\"\n[[class.method]]\nsignature = \"f()V\"\n";
        let error = from_str(manifest, Path::new("."), ColorChoice::Never).expect_err("no body");
        assert!(error.to_string().contains("needs a body"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let error = from_str("entry = \"A.f()V\"\nbogus = 1\n", Path::new("."), ColorChoice::Never)
            .expect_err("unknown key");
        assert!(error.to_string().contains("bogus"));
    }
}
