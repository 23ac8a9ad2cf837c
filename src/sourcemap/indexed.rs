//! Indexed (sectioned) source maps: several sub-maps, each offset by a
//! generated-position delta, composed into one queryable view.

use super::{Bias, OriginalPosition, Position, SourceMap, SourceMapMetadata};

#[derive(Debug, Clone)]
pub struct IndexedSourceMap {
    metadata: SourceMapMetadata,
    /// Sections sorted by their generated-position offset.
    sections: Vec<(Position, SourceMap)>,
    warnings: Vec<String>,
}

impl IndexedSourceMap {
    pub fn new(
        metadata: SourceMapMetadata,
        mut sections: Vec<(Position, SourceMap)>,
        warnings: Vec<String>,
    ) -> Self {
        sections.sort_by_key(|(offset, _)| *offset);
        Self {
            metadata,
            sections,
            warnings,
        }
    }

    pub fn metadata(&self) -> &SourceMapMetadata {
        &self.metadata
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn has_names(&self) -> bool {
        self.sections.iter().any(|(_, m)| m.has_names())
    }

    pub fn source_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .sections
            .iter()
            .flat_map(|(_, m)| m.source_urls())
            .collect();
        urls.sort();
        urls.dedup();
        urls
    }

    pub fn source_content(&self, url: &str) -> Option<&str> {
        self.sections
            .iter()
            .find_map(|(_, m)| m.source_content(url))
    }

    /// The section owning `generated`: the last section whose offset is
    /// `<= generated`.
    fn section_for_generated(&self, generated: Position) -> Option<(Position, &SourceMap)> {
        let idx = self
            .sections
            .partition_point(|(offset, _)| *offset <= generated);
        if idx == 0 {
            None
        } else {
            let (offset, map) = &self.sections[idx - 1];
            Some((*offset, map))
        }
    }

    pub fn find_original_position(&self, generated: Position) -> Option<OriginalPosition> {
        let (offset, map) = self.section_for_generated(generated)?;
        let local = Position::new(
            generated.line - offset.line,
            if generated.line == offset.line {
                generated.column.saturating_sub(offset.column)
            } else {
                generated.column
            },
        );
        map.find_original_position(local)
    }

    pub fn find_generated_position(
        &self,
        original_url: &str,
        position: Position,
        bias: Bias,
    ) -> Option<Position> {
        // Each section is tried; the first one that maps the original url
        // to a position wins (callers needing *all* candidates go through
        // `SourceContainer::raw_location`, which queries every compiled
        // source directly rather than through one indexed map).
        for (offset, map) in &self.sections {
            if let Some(local) = map.find_generated_position(original_url, position, bias) {
                let line = local.line + offset.line;
                let column = if local.line == 0 {
                    local.column + offset.column
                } else {
                    local.column
                };
                return Some(Position::new(line, column));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sourcemap::flat::{FlatSourceMap, MappingRow};

    fn flat_meta(path: &str) -> SourceMapMetadata {
        SourceMapMetadata {
            source_map_url: format!("{path}.map"),
            compiled_path: path.to_string(),
            cache_key: "k".into(),
        }
    }

    fn section(gen_line: u32, orig_url: &str) -> SourceMap {
        SourceMap::Flat(FlatSourceMap::new(
            flat_meta("bundle.js"),
            None,
            vec![orig_url.to_string()],
            vec![None],
            vec![],
            vec![MappingRow {
                generated: Position::new(gen_line, 0),
                source_index: Some(0),
                original: Some(Position::new(1, 0)),
                name_index: None,
            }],
        ))
    }

    #[test]
    fn aggregates_sections_by_generated_offset() {
        let indexed = SourceMap::indexed(
            flat_meta("bundle.js"),
            vec![
                (Position::new(0, 0), section(0, "a.ts")),
                (Position::new(100, 0), section(0, "b.ts")),
            ],
            vec![],
        );

        let a = indexed.find_original_position(Position::new(0, 0)).unwrap();
        assert_eq!(a.source_url, "a.ts");

        let b = indexed
            .find_original_position(Position::new(100, 0))
            .unwrap();
        assert_eq!(b.source_url, "b.ts");
    }

    #[test]
    fn partial_section_failure_is_recorded_as_a_warning_not_a_crash() {
        let indexed = SourceMap::indexed(
            flat_meta("bundle.js"),
            vec![(Position::new(0, 0), section(0, "a.ts"))],
            vec!["failed to fetch section map for chunk 2".into()],
        );
        assert_eq!(indexed.warnings().len(), 1);
        assert!(indexed
            .find_original_position(Position::new(0, 0))
            .is_some());
    }
}
