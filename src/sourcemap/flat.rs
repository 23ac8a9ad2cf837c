//! A single, unsectioned source map: one generated stream mapped to zero or
//! more original sources via a list of mapping rows.

use std::collections::HashMap;

use super::{Bias, OriginalPosition, Position, SourceMapMetadata};

/// One generated-to-original position correspondence (spec glossary:
/// "mapping row").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRow {
    pub generated: Position,
    /// Index into `sources` naming which original source this row maps to.
    /// `None` for generated positions with no original counterpart.
    pub source_index: Option<usize>,
    pub original: Option<Position>,
    /// Index into `names`.
    pub name_index: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct FlatSourceMap {
    metadata: SourceMapMetadata,
    source_root: Option<String>,
    sources: Vec<String>,
    source_contents: Vec<Option<String>>,
    names: Vec<String>,
    has_names: bool,
    /// Mapping rows sorted by generated position, for binary search.
    by_generated: Vec<MappingRow>,
    /// Per-source, mapping rows sorted by original position.
    by_original: HashMap<String, Vec<MappingRow>>,
}

impl FlatSourceMap {
    pub fn new(
        metadata: SourceMapMetadata,
        source_root: Option<String>,
        sources: Vec<String>,
        source_contents: Vec<Option<String>>,
        names: Vec<String>,
        mut mappings: Vec<MappingRow>,
    ) -> Self {
        let has_names = !names.is_empty();
        mappings.sort_by_key(|m| m.generated);

        let mut by_original: HashMap<String, Vec<MappingRow>> = HashMap::new();
        for row in &mappings {
            if let (Some(idx), Some(orig)) = (row.source_index, row.original) {
                if let Some(url) = sources.get(idx) {
                    by_original
                        .entry(url.clone())
                        .or_default()
                        .push(MappingRow {
                            generated: row.generated,
                            source_index: row.source_index,
                            original: Some(orig),
                            name_index: row.name_index,
                        });
                }
            }
        }
        for rows in by_original.values_mut() {
            rows.sort_by_key(|r| r.original.unwrap());
        }

        Self {
            metadata,
            source_root,
            sources,
            source_contents,
            names,
            has_names,
            by_generated: mappings,
            by_original,
        }
    }

    pub fn metadata(&self) -> &SourceMapMetadata {
        &self.metadata
    }

    pub fn source_root(&self) -> Option<&str> {
        self.source_root.as_deref()
    }

    pub fn has_names(&self) -> bool {
        self.has_names
    }

    pub fn source_urls(&self) -> Vec<String> {
        self.sources.clone()
    }

    pub fn source_content(&self, url: &str) -> Option<&str> {
        let idx = self.sources.iter().position(|s| s == url)?;
        self.source_contents.get(idx).and_then(|c| c.as_deref())
    }

    pub fn find_original_position(&self, generated: Position) -> Option<OriginalPosition> {
        let row = nearest(&self.by_generated, generated, Bias::GreatestLower, |r| r.generated)?;
        let idx = row.source_index?;
        let original = row.original?;
        let source_url = self.sources.get(idx)?.clone();
        let name = row
            .name_index
            .and_then(|i| self.names.get(i))
            .cloned();
        Some(OriginalPosition {
            source_url,
            position: original,
            name,
        })
    }

    pub fn find_generated_position(
        &self,
        original_url: &str,
        position: Position,
        bias: Bias,
    ) -> Option<Position> {
        let rows = self.by_original.get(original_url)?;
        let row = nearest(rows, position, bias, |r| r.original.unwrap())?;
        Some(row.generated)
    }
}

/// Binary search `rows` (sorted ascending by `key`) for the row matching
/// `target` under `bias`: `LeastUpper` returns the first row with
/// `key(row) >= target`; `GreatestLower` returns the last row with
/// `key(row) <= target`.
fn nearest<'a, T>(
    rows: &'a [T],
    target: Position,
    bias: Bias,
    key: impl Fn(&T) -> Position,
) -> Option<&'a T> {
    if rows.is_empty() {
        return None;
    }
    match bias {
        Bias::LeastUpper => {
            let idx = rows.partition_point(|r| key(r) < target);
            rows.get(idx)
        }
        Bias::GreatestLower => {
            let idx = rows.partition_point(|r| key(r) <= target);
            if idx == 0 {
                None
            } else {
                rows.get(idx - 1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> SourceMapMetadata {
        SourceMapMetadata {
            source_map_url: "a.js.map".into(),
            compiled_path: "/w/out/a.js".into(),
            cache_key: "k".into(),
        }
    }

    fn sample_map() -> FlatSourceMap {
        FlatSourceMap::new(
            meta(),
            None,
            vec!["a.ts".into()],
            vec![Some("export const x = 1;".into())],
            vec!["x".into()],
            vec![
                MappingRow {
                    generated: Position::new(42, 10),
                    source_index: Some(0),
                    original: Some(Position::new(5, 1)),
                    name_index: Some(0),
                },
                MappingRow {
                    generated: Position::new(43, 0),
                    source_index: Some(0),
                    original: Some(Position::new(6, 0)),
                    name_index: None,
                },
            ],
        )
    }

    #[test]
    fn round_trips_generated_to_original_and_back() {
        let map = sample_map();
        let orig = map.find_original_position(Position::new(42, 10)).unwrap();
        assert_eq!(orig.source_url, "a.ts");
        assert_eq!(orig.position, Position::new(5, 1));
        assert_eq!(orig.name.as_deref(), Some("x"));

        let gen = map
            .find_generated_position("a.ts", Position::new(5, 1), Bias::LeastUpper)
            .unwrap();
        assert_eq!(gen, Position::new(42, 10));
    }

    #[test]
    fn greatest_lower_bias_returns_preceding_row() {
        let map = sample_map();
        let orig = map
            .find_original_position(Position::new(42, 99))
            .unwrap();
        assert_eq!(orig.position, Position::new(5, 1));
    }

    #[test]
    fn unmapped_generated_position_before_any_row_is_none() {
        let map = sample_map();
        assert!(map.find_original_position(Position::new(1, 0)).is_none());
    }

    #[test]
    fn source_content_is_queryable_by_url() {
        let map = sample_map();
        assert_eq!(map.source_content("a.ts"), Some("export const x = 1;"));
        assert_eq!(map.source_content("missing.ts"), None);
    }
}
