//! Indenting text writer with position tracking
//!
//! Columns are counted in UTF-16 code units, which is what source map consumers in
//! browsers expect.

use crate::ir::TextLocation;
use crate::sourcemap::{GeneratedPosition, SourceMap, SourceMapBuilder};

/// Script text under construction
#[derive(Debug)]
pub struct SourceWriter {
    out: String,
    indent_unit: usize,
    level: usize,
    line: u32,
    column: u32,
    at_line_start: bool,
    source_map: Option<SourceMapBuilder>,
}

impl SourceWriter {
    /// Empty writer indenting by `indent_unit` spaces per level
    pub fn new(indent_unit: usize) -> Self {
        Self {
            out: String::new(),
            indent_unit,
            level: 0,
            line: 0,
            column: 0,
            at_line_start: true,
            source_map: None,
        }
    }

    /// Record mappings while writing
    pub fn with_source_map(mut self, builder: SourceMapBuilder) -> Self {
        self.source_map = Some(builder);
        self
    }

    /// Write `text`, indenting first if at the start of a line
    pub fn append(&mut self, text: &str) -> &mut Self {
        if text.is_empty() {
            return self;
        }
        if self.at_line_start {
            self.at_line_start = false;
            let width = self.level * self.indent_unit;
            self.out.extend(std::iter::repeat(' ').take(width));
            self.column += width as u32;
        }
        if let Some(builder) = &mut self.source_map {
            builder.advance(GeneratedPosition::new(self.line, self.column));
        }
        for c in text.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += c.len_utf16() as u32;
            }
        }
        self.out.push_str(text);
        self
    }

    /// End the current line
    pub fn newline(&mut self) -> &mut Self {
        self.out.push('\n');
        self.line += 1;
        self.column = 0;
        self.at_line_start = true;
        self
    }

    /// Write `text` as a complete line
    pub fn line(&mut self, text: &str) -> &mut Self {
        self.append(text).newline()
    }

    /// Increase the indentation level
    pub fn indent(&mut self) -> &mut Self {
        self.level += 1;
        self
    }

    /// Decrease the indentation level
    pub fn outdent(&mut self) -> &mut Self {
        self.level = self.level.saturating_sub(1);
        self
    }

    /// Open a `{` block: writes `header {` and indents
    pub fn open(&mut self, header: &str) -> &mut Self {
        self.append(header).append(" {").newline().indent()
    }

    /// Close a block opened with [`open`](Self::open), followed by `suffix`
    pub fn close(&mut self, suffix: &str) -> &mut Self {
        self.outdent().append("}").append(suffix).newline()
    }

    /// Attribute the following code to `location`, or to nothing
    pub fn location(&mut self, location: Option<&TextLocation>) {
        if let Some(builder) = &mut self.source_map {
            match location {
                Some(location) => builder.location(&location.file, location.line),
                None => builder.empty_location(),
            }
        }
    }

    /// Enter code generated for `method`
    pub fn start_method(&mut self, method: &str) {
        if let Some(builder) = &mut self.source_map {
            builder.start(method);
        }
    }

    /// Leave the current method
    pub fn end_method(&mut self) {
        if let Some(builder) = &mut self.source_map {
            builder.end();
        }
    }

    /// Current output position
    pub fn position(&self) -> GeneratedPosition {
        GeneratedPosition::new(self.line, self.column)
    }

    /// Text written so far
    pub fn text(&self) -> &str {
        &self.out
    }

    /// Text and source map, if one was recorded
    pub fn finish(self) -> (String, Option<SourceMap>) {
        let map = self.source_map.map(|builder| builder.build());
        (self.out, map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_indentation() {
        let mut writer = SourceWriter::new(2);
        writer.open("function f()").line("return 1;").close("");
        assert_eq!(writer.text(), "function f() {\n  return 1;\n}\n");
        assert_eq!(writer.position(), GeneratedPosition::new(3, 0));
    }

    #[test]
    fn test_columns_count_utf16_units() {
        let mut writer = SourceWriter::new(4);
        writer.append("'\u{1F600}'");
        assert_eq!(writer.position(), GeneratedPosition::new(0, 4));
    }

    #[test]
    fn test_mappings_follow_locations() {
        let mut writer = SourceWriter::new(4).with_source_map(SourceMapBuilder::new());
        writer.location(Some(&TextLocation::new("Main.java", 3)));
        writer.line("a();");
        writer.line("b();");
        writer.location(Some(&TextLocation::new("Main.java", 4)));
        writer.line("c();");
        writer.location(None);
        writer.line("d();");

        let (_, map) = writer.finish();
        let map = map.expect("source map enabled");
        let entries = map.entries().expect("valid mappings");
        let lines: Vec<(u32, Option<u32>)> = entries
            .iter()
            .map(|(generated, source)| (generated.line, source.as_ref().map(|(_, line)| *line)))
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].0, 0);
        assert_eq!(lines[1].0, 2);
        assert_eq!(lines[2].0, 3);
    }
}
