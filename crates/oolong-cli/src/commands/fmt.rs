//! `oolong fmt`: parse a listing and print it in canonical form.

use crate::output::StyledOutput;
use crate::report;
use anyhow::Context;
use oolong_engine::ir::listing::{parse, print};
use std::path::Path;
use termcolor::ColorChoice;

pub fn execute(path: &Path, check: bool, write: bool, color: ColorChoice) -> anyhow::Result<bool> {
    let source = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let program = match parse(&source) {
        Ok(program) => program,
        Err(error) => {
            report::emit_listing_error(path, &source, &error, color);
            return Ok(false);
        }
    };
    let formatted = print(&program);

    if check {
        if formatted == source {
            return Ok(true);
        }
        let mut out = StyledOutput::stdout(color);
        out.warning("not formatted");
        out.plain(&format!(": {}", path.display()));
        out.newline();
        return Ok(false);
    }
    if write {
        if formatted != source {
            std::fs::write(path, &formatted).with_context(|| format!("cannot write {}", path.display()))?;
        }
        return Ok(true);
    }
    print!("{}", formatted);
    Ok(true)
}
