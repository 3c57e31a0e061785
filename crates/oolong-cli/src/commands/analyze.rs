//! `oolong analyze`: print the methods reachable from the entry point.

use crate::manifest;
use crate::output::StyledOutput;
use crate::report;
use oolong_engine::ir::VariableId;
use oolong_engine::{Compiler, DependencyInfo};
use std::path::Path;
use termcolor::{ColorChoice, WriteColor};

pub fn execute(path: &Path, types: bool, color: ColorChoice) -> anyhow::Result<bool> {
    let project = manifest::load(path, color)?;
    let compiler = Compiler::new(&project.classes, project.options.clone());
    let info = compiler.analyze(&project.entry);

    let mut out = StyledOutput::stdout(color);
    write_summary(&mut out, &info, types);
    Ok(!info.diagnostics().has_errors())
}

/// Reachable methods in discovery order, optionally with variable type sets, then the
/// diagnostics
pub fn write_summary<W: WriteColor>(out: &mut StyledOutput<W>, info: &DependencyInfo, types: bool) {
    for method in info.methods() {
        out.bold(&method.reference.to_string());
        if !method.has_body {
            out.plain(" (no body)");
        }
        out.newline();
        if !types {
            continue;
        }
        for index in 0..method.variables.len() {
            let variable_types = method.variable_types(VariableId::new(index as u32));
            if variable_types.is_empty() {
                continue;
            }
            out.plain(&format!("    %{}: ", index));
            out.info(&variable_types.join(", "));
            out.newline();
        }
        if !method.result.is_empty() {
            out.plain("    result: ");
            out.info(&method.result.join(", "));
            out.newline();
        }
    }
    report::write_diagnostics(out, info.diagnostics());
    out.plain(&format!(
        "{} methods, {} classes, {} virtual call sites\n",
        info.methods().len(),
        info.classes().len(),
        info.virtual_calls().len()
    ));
}
