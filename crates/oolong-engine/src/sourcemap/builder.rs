//! Incremental source map construction
//!
//! Emitters report the source location of the code they are about to write with
//! [`SourceMapBuilder::location`] / [`SourceMapBuilder::empty_location`], and call
//! [`SourceMapBuilder::advance`] with the generated position before writing it. A mapping
//! is recorded only when the location differs from the last one written, so a run of
//! instructions from the same line produces a single segment.

use super::vlq;
use super::{GeneratedPosition, SourceMap, IGNORED_SOURCE};
use rustc_hash::FxHashMap;

/// Source attribution of a generated range
#[derive(Debug, Clone, PartialEq, Eq)]
enum Attribution {
    /// Deliberately unattributed; mapped to [`IGNORED_SOURCE`]
    Ignored,
    At { file: String, line: u32 },
}

#[derive(Debug, Clone)]
struct Mapping {
    generated: GeneratedPosition,
    attribution: Attribution,
}

/// An inlining frame opened by [`SourceMapBuilder::start`]
#[derive(Debug, Clone)]
struct Frame {
    method: String,
    saved: Attribution,
}

/// Accumulates generated-position to source-line mappings
#[derive(Debug, Clone)]
pub struct SourceMapBuilder {
    file: Option<String>,
    current: Attribution,
    last_written: Option<Attribution>,
    last_position: Option<GeneratedPosition>,
    frames: Vec<Frame>,
    mappings: Vec<Mapping>,
}

impl SourceMapBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self {
            file: None,
            current: Attribution::Ignored,
            last_written: None,
            last_position: None,
            frames: Vec::new(),
            mappings: Vec::new(),
        }
    }

    /// Set the name of the generated file recorded in the map
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Mark `file:line` as the location of the code that follows
    pub fn location(&mut self, file: &str, line: u32) {
        self.current = Attribution::At {
            file: file.to_string(),
            line,
        };
    }

    /// Mark the code that follows as unattributed
    pub fn empty_location(&mut self) {
        self.current = Attribution::Ignored;
    }

    /// Record that generated code is about to be written at `position`.
    ///
    /// # Panics
    ///
    /// If `position` is before a position passed earlier.
    pub fn advance(&mut self, position: GeneratedPosition) {
        if let Some(last) = self.last_position {
            assert!(
                position >= last,
                "source map position moved backward from {} to {}",
                last,
                position
            );
        }
        self.last_position = Some(position);

        if self.last_written.as_ref() == Some(&self.current) {
            return;
        }

        match self.mappings.last_mut() {
            Some(last) if last.generated == position => {
                // Nothing was emitted under the previous location; replace it.
                last.attribution = self.current.clone();
                let len = self.mappings.len();
                if len >= 2 && self.mappings[len - 2].attribution == self.current {
                    self.mappings.pop();
                }
            }
            _ => self.mappings.push(Mapping {
                generated: position,
                attribution: self.current.clone(),
            }),
        }
        self.last_written = Some(self.current.clone());
    }

    /// Enter code inlined from `method`
    pub fn start(&mut self, method: impl Into<String>) {
        self.frames.push(Frame {
            method: method.into(),
            saved: self.current.clone(),
        });
    }

    /// Leave the innermost inlined method, restoring the caller's location.
    ///
    /// # Panics
    ///
    /// If there is no matching [`start`](Self::start).
    pub fn end(&mut self) {
        let frame = self.frames.pop().unwrap_or_else(|| panic!("source map end() without start()"));
        self.current = frame.saved;
    }

    /// Method currently being inlined, if any
    pub fn current_method(&self) -> Option<&str> {
        self.frames.last().map(|frame| frame.method.as_str())
    }

    /// Number of recorded segments
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Whether no segment has been recorded
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Serialize the collected mappings
    pub fn build(&self) -> SourceMap {
        let mut sources: Vec<String> = Vec::new();
        let mut indices: FxHashMap<String, u32> = FxHashMap::default();
        let mut ignored_index = None;

        let mut resolved = Vec::with_capacity(self.mappings.len());
        for mapping in &self.mappings {
            let (name, line) = match &mapping.attribution {
                Attribution::Ignored => (IGNORED_SOURCE, 0),
                Attribution::At { file, line } => (file.as_str(), line.saturating_sub(1)),
            };
            let source = match indices.get(name) {
                Some(&index) => index,
                None => {
                    let index = sources.len() as u32;
                    sources.push(name.to_string());
                    indices.insert(name.to_string(), index);
                    index
                }
            };
            if mapping.attribution == Attribution::Ignored {
                ignored_index = Some(source);
            }
            resolved.push((mapping.generated, source, line));
        }

        let source_root = common_root(sources.iter().filter(|s| s.as_str() != IGNORED_SOURCE));
        if let Some(root) = &source_root {
            for source in sources.iter_mut().filter(|s| s.as_str() != IGNORED_SOURCE) {
                *source = source[root.len()..].to_string();
            }
        }

        SourceMap {
            version: 3,
            file: self.file.clone(),
            source_root,
            sources,
            names: Vec::new(),
            mappings: encode_mappings(&resolved),
            ignore_list: ignored_index.map(|index| vec![index]),
        }
    }
}

impl Default for SourceMapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Longest directory prefix shared by every path, including the trailing `/`.
fn common_root<'a>(mut paths: impl Iterator<Item = &'a String>) -> Option<String> {
    let first = paths.next()?;
    let mut prefix: &str = match first.rfind('/') {
        Some(end) => &first[..=end],
        None => return None,
    };
    for path in paths {
        while !path.starts_with(prefix) {
            let trimmed = &prefix[..prefix.len() - 1];
            match trimmed.rfind('/') {
                Some(end) => prefix = &prefix[..=end],
                None => return None,
            }
        }
    }
    Some(prefix.to_string())
}

fn encode_mappings(resolved: &[(GeneratedPosition, u32, u32)]) -> String {
    let mut out = String::new();
    let mut line = 0u32;
    let mut previous_column = 0i64;
    let mut previous_source = 0i64;
    let mut previous_line = 0i64;
    let mut first_in_line = true;

    for &(generated, source, source_line) in resolved {
        while line < generated.line {
            out.push(';');
            line += 1;
            previous_column = 0;
            first_in_line = true;
        }
        if !first_in_line {
            out.push(',');
        }
        first_in_line = false;

        vlq::encode(i64::from(generated.column) - previous_column, &mut out);
        vlq::encode(i64::from(source) - previous_source, &mut out);
        vlq::encode(i64::from(source_line) - previous_line, &mut out);
        vlq::encode(0, &mut out);

        previous_column = i64::from(generated.column);
        previous_source = i64::from(source);
        previous_line = i64::from(source_line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(line: u32, column: u32) -> GeneratedPosition {
        GeneratedPosition { line, column }
    }

    #[test]
    fn test_same_location_is_coalesced() {
        let mut builder = SourceMapBuilder::new();
        builder.location("src/Foo.java", 3);
        builder.advance(pos(0, 0));
        builder.advance(pos(0, 10));
        builder.location("src/Foo.java", 3);
        builder.advance(pos(0, 20));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_unset_location_maps_to_ignored_source() {
        let mut builder = SourceMapBuilder::new();
        builder.advance(pos(0, 0));
        builder.location("Foo.java", 1);
        builder.advance(pos(0, 4));
        let map = builder.build();
        assert_eq!(map.sources, vec![IGNORED_SOURCE.to_string(), "Foo.java".to_string()]);
        assert_eq!(map.ignore_list, Some(vec![0]));
        assert_eq!(map.mappings, "AAAA,ICAA");
    }

    #[test]
    fn test_location_change_without_output_replaces_segment() {
        let mut builder = SourceMapBuilder::new();
        builder.location("A.java", 1);
        builder.advance(pos(0, 0));
        builder.location("A.java", 2);
        builder.advance(pos(0, 0));
        let entries = builder.build().entries().expect("valid mappings");
        assert_eq!(entries, vec![(pos(0, 0), Some(("A.java".to_string(), 2)))]);
    }

    #[test]
    fn test_inlining_restores_caller_location() {
        let mut builder = SourceMapBuilder::new();
        builder.location("Caller.java", 10);
        builder.advance(pos(0, 0));
        builder.start("Callee.run()V");
        assert_eq!(builder.current_method(), Some("Callee.run()V"));
        builder.location("Callee.java", 4);
        builder.advance(pos(1, 0));
        builder.end();
        builder.advance(pos(2, 0));

        let entries = builder.build().entries().expect("valid mappings");
        assert_eq!(
            entries,
            vec![
                (pos(0, 0), Some(("Caller.java".to_string(), 10))),
                (pos(1, 0), Some(("Callee.java".to_string(), 4))),
                (pos(2, 0), Some(("Caller.java".to_string(), 10))),
            ]
        );
    }

    #[test]
    fn test_source_root_is_common_directory() {
        let mut builder = SourceMapBuilder::new();
        builder.location("src/main/java/a/Foo.java", 1);
        builder.advance(pos(0, 0));
        builder.location("src/main/java/b/Bar.java", 1);
        builder.advance(pos(0, 5));
        let map = builder.build();
        assert_eq!(map.source_root.as_deref(), Some("src/main/java/"));
        assert_eq!(map.sources, vec!["a/Foo.java", "b/Bar.java"]);
    }

    #[test]
    fn test_no_common_root() {
        let mut builder = SourceMapBuilder::new();
        builder.location("a/Foo.java", 1);
        builder.advance(pos(0, 0));
        builder.location("b/Bar.java", 1);
        builder.advance(pos(0, 5));
        assert_eq!(builder.build().source_root, None);
    }

    #[test]
    #[should_panic(expected = "moved backward")]
    fn test_advance_backward_panics() {
        let mut builder = SourceMapBuilder::new();
        builder.advance(pos(1, 0));
        builder.advance(pos(0, 3));
    }

    #[test]
    fn test_line_breaks_reset_column() {
        let mut builder = SourceMapBuilder::new();
        builder.location("A.java", 1);
        builder.advance(pos(0, 8));
        builder.location("A.java", 2);
        builder.advance(pos(2, 4));
        assert_eq!(builder.build().mappings, "QAAA;;IACA");
    }
}
