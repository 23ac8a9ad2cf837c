//! The `SourceMap` value: a parsed, queryable map between generated and
//! original positions.
//!
//! The crate never parses source-map JSON itself — that on-disk parser is
//! an external collaborator — it only consumes an already-parsed
//! [`SourceMap`], built from [`MappingRow`]s the caller decoded.
//!
//! Grounded on `atl-lang-atlas`'s `debugger::source_map::SourceMap`
//! (offset↔location bidirectional indexes), generalised from
//! instruction-offset↔location to generated-position↔original-position and
//! extended with indexed/sectioned maps.

mod flat;
mod indexed;

pub use flat::{FlatSourceMap, MappingRow};
pub use indexed::IndexedSourceMap;

use std::fmt;

/// Zero-based line/column pair, the coordinate space `SourceMap` itself
/// works in. UI-facing one-based [`crate::source_container::UiLocation`]
/// values are produced only at the `SourceContainer` boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Tie-breaking rule when a queried position falls between two mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    /// Prefer the mapping at or after the queried position.
    LeastUpper,
    /// Prefer the mapping at or before the queried position.
    GreatestLower,
}

/// An original position a generated position maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPosition {
    pub source_url: String,
    pub position: Position,
    pub name: Option<String>,
}

/// Metadata carried by a parsed map, independent of its mapping content.
#[derive(Debug, Clone)]
pub struct SourceMapMetadata {
    pub source_map_url: String,
    pub compiled_path: String,
    pub cache_key: String,
}

/// A parsed, immutable source map. Either a flat map or an indexed
/// (sectioned) map aggregating several flat maps over disjoint generated
/// offset ranges.
#[derive(Debug, Clone)]
pub enum SourceMap {
    Flat(FlatSourceMap),
    Indexed(IndexedSourceMap),
}

impl SourceMap {
    pub fn flat(
        metadata: SourceMapMetadata,
        source_root: Option<String>,
        sources: Vec<String>,
        source_contents: Vec<Option<String>>,
        names: Vec<String>,
        mappings: Vec<MappingRow>,
    ) -> Self {
        Self::Flat(FlatSourceMap::new(
            metadata,
            source_root,
            sources,
            source_contents,
            names,
            mappings,
        ))
    }

    pub fn indexed(
        metadata: SourceMapMetadata,
        sections: Vec<(Position, SourceMap)>,
        warnings: Vec<String>,
    ) -> Self {
        Self::Indexed(IndexedSourceMap::new(metadata, sections, warnings))
    }

    pub fn metadata(&self) -> &SourceMapMetadata {
        match self {
            Self::Flat(m) => m.metadata(),
            Self::Indexed(m) => m.metadata(),
        }
    }

    /// Maps an original `(url, line, column)` to a generated position.
    pub fn find_generated_position(
        &self,
        original_url: &str,
        position: Position,
        bias: Bias,
    ) -> Option<Position> {
        match self {
            Self::Flat(m) => m.find_generated_position(original_url, position, bias),
            Self::Indexed(m) => m.find_generated_position(original_url, position, bias),
        }
    }

    /// Maps a generated position to its original position.
    pub fn find_original_position(&self, generated: Position) -> Option<OriginalPosition> {
        match self {
            Self::Flat(m) => m.find_original_position(generated),
            Self::Indexed(m) => m.find_original_position(generated),
        }
    }

    pub fn source_urls(&self) -> Vec<String> {
        match self {
            Self::Flat(m) => m.source_urls(),
            Self::Indexed(m) => m.source_urls(),
        }
    }

    /// Inlined source content for `url`, if the map carries it.
    pub fn source_content(&self, url: &str) -> Option<&str> {
        match self {
            Self::Flat(m) => m.source_content(url),
            Self::Indexed(m) => m.source_content(url),
        }
    }

    pub fn has_names(&self) -> bool {
        match self {
            Self::Flat(m) => m.has_names(),
            Self::Indexed(m) => m.has_names(),
        }
    }

    /// Non-fatal warnings accumulated while resolving this map (e.g.
    /// section sub-maps that failed to load). The map still exposes
    /// whatever resolved.
    pub fn warnings(&self) -> &[String] {
        match self {
            Self::Flat(_) => &[],
            Self::Indexed(m) => m.warnings(),
        }
    }
}
