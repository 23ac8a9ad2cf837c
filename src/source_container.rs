//! C2: the registry of all live sources, owning the compiled↔original graph
//! derived from source maps and the UI-location↔raw-location translation
//! everyone else consults.
//!
//! Grounded on `atl-lang-atlas`'s `debugger::source_map` consumer side
//! (how a runtime script's source map is attached to its compiled source)
//! generalised to the full compiled/original source graph, plus the
//! arena-by-id design called for when source edges can form cycles under
//! chained maps.

use std::collections::{HashMap, HashSet};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::ids::{IdGenerator, SourceReference};
use crate::sourcemap::{Bias, OriginalPosition, Position, SourceMap};

/// Zero-based raw location as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLocation {
    pub source: SourceReference,
    pub position: Position,
}

/// One-based location as exposed to DebugProtocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiLocation {
    pub source: SourceReference,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineSourceRange {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

#[derive(Debug, Clone)]
pub struct ResolvedPath {
    pub absolute_path: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone)]
enum SourceKind {
    /// A compiled source with a loaded map. Keys are the original urls the
    /// map names; values are the corresponding original `Source`s.
    Compiled {
        map: Option<SourceMap>,
        children: HashMap<String, SourceReference>,
        blackboxed: bool,
    },
    /// A source produced from some compiled source's map.
    Original {
        compiled: HashSet<SourceReference>,
        inlined: bool,
        blackboxed: bool,
    },
}

#[derive(Debug, Clone)]
pub struct Source {
    pub source_reference: SourceReference,
    pub url: String,
    pub inline_source_range: Option<InlineSourceRange>,
    pub resolved_path: Option<ResolvedPath>,
    content: Option<String>,
    kind: SourceKind,
}

impl Source {
    pub fn is_compiled(&self) -> bool {
        matches!(self.kind, SourceKind::Compiled { .. })
    }

    pub fn source_map(&self) -> Option<&SourceMap> {
        match &self.kind {
            SourceKind::Compiled { map, .. } => map.as_ref(),
            SourceKind::Original { .. } => None,
        }
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn is_blackboxed(&self) -> bool {
        match self.kind {
            SourceKind::Original { blackboxed, .. } => blackboxed,
            SourceKind::Compiled { blackboxed, .. } => blackboxed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedSourceReason {
    New,
    Removed,
}

#[derive(Debug, Clone)]
pub struct LoadedSourceEvent {
    pub reason: LoadedSourceReason,
    pub source: SourceReference,
}

/// A freshly registered compiled source, before its map (if any) is known.
pub struct CompiledSourceDescriptor {
    pub url: String,
    pub resolved_path: Option<ResolvedPath>,
    pub inline_source_range: Option<InlineSourceRange>,
    pub content: Option<String>,
}

pub struct SourceContainer {
    ids: IdGenerator,
    sources: HashMap<SourceReference, Source>,
    by_url: HashMap<String, SourceReference>,
    blackbox_globs: GlobSet,
    pending_events: Vec<LoadedSourceEvent>,
}

impl SourceContainer {
    pub fn new(skip_file_globs: &[String]) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in skip_file_globs {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
        Self {
            ids: IdGenerator::new(),
            sources: HashMap::new(),
            by_url: HashMap::new(),
            blackbox_globs: builder.build().unwrap_or_else(|_| GlobSet::empty()),
            pending_events: Vec::new(),
        }
    }

    /// Drains events accumulated since the last call (`loadedSource`
    /// emission is the adapter's job; this just buffers what happened).
    pub fn drain_events(&mut self) -> Vec<LoadedSourceEvent> {
        std::mem::take(&mut self.pending_events)
    }

    pub fn get(&self, reference: SourceReference) -> Option<&Source> {
        self.sources.get(&reference)
    }

    pub fn find_by_url(&self, url: &str) -> Option<SourceReference> {
        self.by_url.get(url).copied()
    }

    /// Every source currently registered, compiled and original alike --
    /// what a `loadedSources` request reports in full.
    pub fn all(&self) -> impl Iterator<Item = &Source> {
        self.sources.values()
    }

    /// Registers a compiled source, optionally with its parsed map. One
    /// original `Source` is created per map source-url, reusing an
    /// existing original if another compiled source already named it.
    pub fn add_compiled_source(
        &mut self,
        descriptor: CompiledSourceDescriptor,
        map: Option<SourceMap>,
    ) -> SourceReference {
        let blackboxed_by_pattern = self.blackbox_globs.is_match(&descriptor.url);
        let reference = self.ids.mint_source_reference();
        let mut children = HashMap::new();

        if let Some(map) = &map {
            for url in map.source_urls() {
                let inlined = map.source_content(&url).is_some();
                let child_ref = self.register_original(
                    &url,
                    reference,
                    inlined,
                    blackboxed_by_pattern,
                    map.source_content(&url).map(str::to_string),
                );
                children.insert(url, child_ref);
            }
        }

        let source = Source {
            source_reference: reference,
            url: descriptor.url.clone(),
            inline_source_range: descriptor.inline_source_range,
            resolved_path: descriptor.resolved_path,
            content: descriptor.content,
            kind: SourceKind::Compiled { map, children, blackboxed: blackboxed_by_pattern },
        };
        self.by_url.insert(descriptor.url, reference);
        self.sources.insert(reference, source);
        self.pending_events.push(LoadedSourceEvent {
            reason: LoadedSourceReason::New,
            source: reference,
        });
        reference
    }

    fn register_original(
        &mut self,
        url: &str,
        compiled: SourceReference,
        inlined: bool,
        blackboxed: bool,
        content: Option<String>,
    ) -> SourceReference {
        if let Some(&existing) = self.by_url.get(url) {
            if let Some(Source {
                kind: SourceKind::Original { compiled: owners, .. },
                ..
            }) = self.sources.get_mut(&existing)
            {
                owners.insert(compiled);
                return existing;
            }
        }

        let reference = self.ids.mint_source_reference();
        let mut owners = HashSet::new();
        owners.insert(compiled);
        let source = Source {
            source_reference: reference,
            url: url.to_string(),
            inline_source_range: None,
            resolved_path: None,
            content,
            kind: SourceKind::Original {
                compiled: owners,
                inlined,
                blackboxed,
            },
        };
        self.by_url.insert(url.to_string(), reference);
        self.sources.insert(reference, source);
        self.pending_events.push(LoadedSourceEvent {
            reason: LoadedSourceReason::New,
            source: reference,
        });
        reference
    }

    /// Attaches a parsed map to a compiled source that was first registered
    /// without one -- the common case, since `scriptParsed` names a
    /// `sourceMapUrl` well before the map bytes are actually fetched.
    /// Re-derives the compiled source's originals the same way initial
    /// registration does; a no-op if `reference` isn't a compiled source.
    pub fn attach_source_map(&mut self, reference: SourceReference, map: SourceMap) {
        let Some(source) = self.sources.get(&reference) else {
            return;
        };
        if !matches!(source.kind, SourceKind::Compiled { .. }) {
            return;
        }
        let blackboxed_by_pattern = self.blackbox_globs.is_match(&source.url);
        let mut children = HashMap::new();
        for url in map.source_urls() {
            let inlined = map.source_content(&url).is_some();
            let content = map.source_content(&url).map(str::to_string);
            let child_ref = self.register_original(&url, reference, inlined, blackboxed_by_pattern, content);
            children.insert(url, child_ref);
        }
        if let Some(Source {
            kind: SourceKind::Compiled { map: slot, children: slot_children, .. },
            ..
        }) = self.sources.get_mut(&reference)
        {
            *slot = Some(map);
            *slot_children = children;
        }
    }

    /// Removes a compiled source and every original whose last owner this
    /// was.
    pub fn remove_source(&mut self, reference: SourceReference) {
        let Some(source) = self.sources.remove(&reference) else {
            return;
        };
        self.by_url.remove(&source.url);
        self.pending_events.push(LoadedSourceEvent {
            reason: LoadedSourceReason::Removed,
            source: reference,
        });

        if let SourceKind::Compiled { children, .. } = source.kind {
            for child_ref in children.into_values() {
                let mut drop_child = false;
                if let Some(Source {
                    kind: SourceKind::Original { compiled, .. },
                    ..
                }) = self.sources.get_mut(&child_ref)
                {
                    compiled.remove(&reference);
                    drop_child = compiled.is_empty();
                }
                if drop_child {
                    self.remove_source(child_ref);
                }
            }
        }
    }

    /// Translates a raw (zero-based) location into a one-based UI location,
    /// following the compiled source's map if it has one.
    pub fn ui_location(&self, raw: RawLocation) -> Option<UiLocation> {
        let source = self.sources.get(&raw.source)?;
        let mut position = raw.position;
        if let Some(range) = source.inline_source_range {
            if position.line == 0 {
                position.column = position.column.saturating_sub(range.start_column);
            }
            position.line = position.line.saturating_sub(range.start_line);
        }

        match source.source_map() {
            Some(map) => {
                let OriginalPosition {
                    source_url,
                    position,
                    ..
                } = map.find_original_position(position)?;
                let original_ref = self.by_url.get(&source_url)?;
                Some(UiLocation {
                    source: *original_ref,
                    line: position.line + 1,
                    column: position.column + 1,
                })
            }
            None => Some(UiLocation {
                source: raw.source,
                line: position.line + 1,
                column: position.column + 1,
            }),
        }
    }

    /// Inverse of [`Self::ui_location`]: every compiled position across
    /// every compiled source that maps this original, used by the
    /// breakpoint manager to set breakpoints on all matching scripts.
    pub fn raw_location(&self, source: SourceReference, line: u32, column: u32) -> Vec<RawLocation> {
        let Some(original) = self.sources.get(&source) else {
            return Vec::new();
        };

        let SourceKind::Original { compiled, .. } = &original.kind else {
            // Already a compiled/raw source: identity, zero-based.
            return vec![RawLocation {
                source,
                position: Position::new(line.saturating_sub(1), column.saturating_sub(1)),
            }];
        };

        let target = Position::new(line.saturating_sub(1), column.saturating_sub(1));
        compiled
            .iter()
            .filter_map(|&compiled_ref| {
                let compiled_source = self.sources.get(&compiled_ref)?;
                let map = compiled_source.source_map()?;
                let generated =
                    map.find_generated_position(&original.url, target, Bias::LeastUpper)?;
                Some(RawLocation {
                    source: compiled_ref,
                    position: generated,
                })
            })
            .collect()
    }

    /// Flips the blackbox flag on whichever source `reference` names,
    /// compiled or original alike.
    pub fn toggle_blackbox(&mut self, reference: SourceReference) -> bool {
        let Some(source) = self.sources.get_mut(&reference) else {
            return false;
        };
        match &mut source.kind {
            SourceKind::Original { blackboxed, .. } | SourceKind::Compiled { blackboxed, .. } => {
                *blackboxed = !*blackboxed;
                *blackboxed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sourcemap::{FlatSourceMap, MappingRow, SourceMapMetadata};

    fn meta() -> SourceMapMetadata {
        SourceMapMetadata {
            source_map_url: "a.js.map".into(),
            compiled_path: "/w/out/a.js".into(),
            cache_key: "k".into(),
        }
    }

    fn map() -> SourceMap {
        SourceMap::Flat(FlatSourceMap::new(
            meta(),
            None,
            vec!["a.ts".into()],
            vec![None],
            vec![],
            vec![MappingRow {
                generated: Position::new(41, 9),
                source_index: Some(0),
                original: Some(Position::new(4, 0)),
                name_index: None,
            }],
        ))
    }

    #[test]
    fn adding_a_compiled_source_with_a_map_creates_its_originals() {
        let mut container = SourceContainer::new(&[]);
        let compiled = container.add_compiled_source(
            CompiledSourceDescriptor {
                url: "a.js".into(),
                resolved_path: None,
                inline_source_range: None,
                content: None,
            },
            Some(map()),
        );
        let original = container.find_by_url("a.ts").unwrap();
        assert!(container.get(compiled).unwrap().is_compiled());
        assert!(!container.get(original).unwrap().is_compiled());
    }

    #[test]
    fn ui_location_round_trips_through_raw_location() {
        let mut container = SourceContainer::new(&[]);
        let compiled = container.add_compiled_source(
            CompiledSourceDescriptor {
                url: "a.js".into(),
                resolved_path: None,
                inline_source_range: None,
                content: None,
            },
            Some(map()),
        );

        let raw = RawLocation {
            source: compiled,
            position: Position::new(41, 9),
        };
        let ui = container.ui_location(raw).unwrap();
        assert_eq!((ui.line, ui.column), (5, 1));

        let back = container.raw_location(ui.source, ui.line, ui.column);
        assert!(back.iter().any(|r| r.source == compiled && r.position == Position::new(41, 9)));
    }

    #[test]
    fn removing_the_last_compiled_owner_drops_the_original() {
        let mut container = SourceContainer::new(&[]);
        let compiled = container.add_compiled_source(
            CompiledSourceDescriptor {
                url: "a.js".into(),
                resolved_path: None,
                inline_source_range: None,
                content: None,
            },
            Some(map()),
        );
        let original = container.find_by_url("a.ts").unwrap();
        container.remove_source(compiled);
        assert!(container.get(original).is_none());
    }

    #[test]
    fn skip_files_glob_blackboxes_sources_at_load() {
        let mut container = SourceContainer::new(&["**/node_modules/**".to_string()]);
        let compiled = container.add_compiled_source(
            CompiledSourceDescriptor {
                url: "/w/node_modules/lib/index.js".into(),
                resolved_path: None,
                inline_source_range: None,
                content: None,
            },
            Some(map()),
        );
        let original = container.find_by_url("a.ts").unwrap();
        assert!(container.get(original).unwrap().is_blackboxed());
        let _ = compiled;
    }

    #[test]
    fn skip_files_glob_blackboxes_a_mapless_compiled_source() {
        let mut container = SourceContainer::new(&["**/node_modules/**".to_string()]);
        let compiled = container.add_compiled_source(
            CompiledSourceDescriptor {
                url: "/w/node_modules/lib/index.js".into(),
                resolved_path: None,
                inline_source_range: None,
                content: None,
            },
            None,
        );
        assert!(container.get(compiled).unwrap().is_blackboxed());
    }

    #[test]
    fn toggle_blackbox_flips_a_compiled_source_directly() {
        let mut container = SourceContainer::new(&[]);
        let compiled = container.add_compiled_source(
            CompiledSourceDescriptor {
                url: "/w/app.js".into(),
                resolved_path: None,
                inline_source_range: None,
                content: None,
            },
            None,
        );
        assert!(!container.get(compiled).unwrap().is_blackboxed());
        assert!(container.toggle_blackbox(compiled));
        assert!(container.get(compiled).unwrap().is_blackboxed());
        assert!(!container.toggle_blackbox(compiled));
        assert!(!container.get(compiled).unwrap().is_blackboxed());
    }
}
