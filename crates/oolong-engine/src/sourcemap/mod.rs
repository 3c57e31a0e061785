//! Source maps (version 3)
//!
//! [`SourceMapBuilder`] records mappings while code is generated; [`SourceMap`] is the
//! serializable document. Text emitters use (line, column) positions; binary emitters use
//! line 0 with the byte offset as the column.

mod builder;
pub mod vlq;

pub use builder::SourceMapBuilder;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pseudo source name for code that has no source location
pub const IGNORED_SOURCE: &str = "oolong:unattributed";

/// Position in generated output (0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GeneratedPosition {
    /// Line, or 0 for binary output
    pub line: u32,
    /// Column, or byte offset for binary output
    pub column: u32,
}

impl GeneratedPosition {
    /// Create a position
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Position of a byte offset in binary output
    pub fn offset(offset: u32) -> Self {
        Self { line: 0, column: offset }
    }
}

impl fmt::Display for GeneratedPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A source map document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMap {
    /// Format version, always 3
    pub version: u32,
    /// Generated file name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Prefix shared by all sources
    #[serde(rename = "sourceRoot", default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    /// Source file names, relative to `source_root`
    pub sources: Vec<String>,
    /// Symbol names (unused)
    pub names: Vec<String>,
    /// Encoded segments
    pub mappings: String,
    /// Indices of sources debuggers should skip
    #[serde(rename = "x_google_ignoreList", default, skip_serializing_if = "Option::is_none")]
    pub ignore_list: Option<Vec<u32>>,
}

/// One decoded mapping segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedMapping {
    /// Start of the generated range
    pub generated: GeneratedPosition,
    /// Index into `sources`
    pub source: u32,
    /// 0-based source line
    pub source_line: u32,
}

impl SourceMap {
    /// Serialize to JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a JSON document
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Decode the `mappings` string into absolute segments
    pub fn decode(&self) -> Result<Vec<DecodedMapping>, vlq::VlqError> {
        let input = self.mappings.as_bytes();
        let mut result = Vec::new();
        let mut offset = 0;
        let mut line = 0u32;
        let mut column = 0i64;
        let mut source = 0i64;
        let mut source_line = 0i64;

        while offset < input.len() {
            match input[offset] {
                b';' => {
                    line += 1;
                    column = 0;
                    offset += 1;
                }
                b',' => offset += 1,
                _ => {
                    let start = offset;
                    column = accumulate(column, input, &mut offset)?;
                    source = accumulate(source, input, &mut offset)?;
                    source_line = accumulate(source_line, input, &mut offset)?;
                    vlq::decode(input, &mut offset)?;
                    result.push(DecodedMapping {
                        generated: GeneratedPosition::new(line, field(column, start)?),
                        source: field(source, start)?,
                        source_line: field(source_line, start)?,
                    });
                }
            }
        }
        Ok(result)
    }

    /// Decode into `(position, Some((full source path, 1-based line)))`, with `None` for
    /// ranges attributed to [`IGNORED_SOURCE`].
    pub fn entries(&self) -> Result<Vec<(GeneratedPosition, Option<(String, u32)>)>, vlq::VlqError> {
        let root = self.source_root.as_deref().unwrap_or("");
        self.decode()?
            .into_iter()
            .map(|mapping| {
                let name = self
                    .sources
                    .get(mapping.source as usize)
                    .ok_or(vlq::VlqError::UnknownSource {
                        index: mapping.source,
                        count: self.sources.len(),
                    })?;
                let source = if name == IGNORED_SOURCE {
                    None
                } else {
                    Some((format!("{}{}", root, name), mapping.source_line + 1))
                };
                Ok((mapping.generated, source))
            })
            .collect()
    }
}

/// Add the next delta to a running field value
fn accumulate(current: i64, input: &[u8], offset: &mut usize) -> Result<i64, vlq::VlqError> {
    let start = *offset;
    let delta = vlq::decode(input, offset)?;
    current.checked_add(delta).ok_or(vlq::VlqError::Overflow(start))
}

/// A field value as stored in a segment, which must fit `u32`
fn field(value: i64, offset: usize) -> Result<u32, vlq::VlqError> {
    u32::try_from(value).map_err(|_| vlq::VlqError::OutOfRange(offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_field_names() {
        let mut builder = SourceMapBuilder::new().with_file("classes.js");
        builder.advance(GeneratedPosition::new(0, 0));
        builder.location("src/Foo.java", 7);
        builder.advance(GeneratedPosition::new(1, 2));
        let json = builder.build().to_json().expect("serializable");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");

        assert_eq!(value["version"], 3);
        assert_eq!(value["file"], "classes.js");
        assert_eq!(value["sourceRoot"], "src/");
        assert_eq!(value["names"], serde_json::json!([]));
        assert_eq!(value["x_google_ignoreList"], serde_json::json!([0]));
        assert_eq!(value["sources"], serde_json::json!([IGNORED_SOURCE, "Foo.java"]));
    }

    #[test]
    fn test_json_roundtrip_and_entries() {
        let mut builder = SourceMapBuilder::new();
        builder.location("Foo.java", 7);
        builder.advance(GeneratedPosition::new(0, 3));
        builder.location("Bar.java", 2);
        builder.advance(GeneratedPosition::new(0, 9));

        let map = builder.build();
        let parsed = SourceMap::from_json(&map.to_json().expect("serializable")).expect("parses");
        assert_eq!(parsed, map);
        assert_eq!(parsed.ignore_list, None);
        assert_eq!(
            parsed.entries().expect("valid mappings"),
            vec![
                (GeneratedPosition::new(0, 3), Some(("Foo.java".to_string(), 7))),
                (GeneratedPosition::new(0, 9), Some(("Bar.java".to_string(), 2))),
            ]
        );
    }

    #[test]
    fn test_negative_field_is_rejected() {
        // column 0 then a column delta of -1
        let map = SourceMap {
            version: 3,
            file: None,
            source_root: None,
            sources: vec!["A.java".to_string()],
            names: Vec::new(),
            mappings: "AAAA,DAAA".to_string(),
            ignore_list: None,
        };
        assert_eq!(map.decode(), Err(vlq::VlqError::OutOfRange(5)));
    }

    #[test]
    fn test_unknown_source_is_rejected() {
        let json = r#"{"version":3,"sources":["A.java"],"names":[],"mappings":"AAAA,CCAA"}"#;
        let map = SourceMap::from_json(json).expect("parses");
        assert_eq!(
            map.entries(),
            Err(vlq::VlqError::UnknownSource { index: 1, count: 1 })
        );
    }
}
