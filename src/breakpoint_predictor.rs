//! C4: off-thread scan of build output directories, predicting compiled
//! breakpoint positions for authored source lines before the runtime
//! attaches.
//!
//! Grounded on `atl-lang-atlas`'s `debugger::breakpoints::BreakpointManager`
//! filesystem/glob-driven scanning shape, generalised from "find
//! breakpoint-relevant files" to "build an authored→compiled prediction
//! index". `globset` backs `out_files` pattern matching (attested in-pack
//! via `atl-lang-atlas`'s `atlas-cli` dependency table); `rayon` fans the
//! scan out across discovered files the way the teacher's own workspace
//! tooling does for parallel directory walks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::sourcemap::{Bias, Position, SourceMap};

/// One resolved authored source discovered while scanning a compiled
/// file's map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredMetadata {
    pub resolved_path: String,
    pub source_url: String,
    pub source_map_url: String,
    pub compiled_path: String,
    pub mtime: u64,
}

/// A single file the `SourceMapRepository` collaborator reports.
#[derive(Debug, Clone)]
pub struct CompiledFileMetadata {
    pub compiled_path: String,
    pub source_map_url: String,
    pub mtime: u64,
}

/// Resolves a compiled file's already-fetched map metadata into a parsed
/// [`SourceMap`]; out of scope to implement (the on-disk map parser is an
/// external collaborator), but the predictor needs somewhere to call into.
pub trait MapLoader: Send + Sync {
    fn load(&self, metadata: &CompiledFileMetadata) -> Option<SourceMap>;
}

/// Resolves an original source url (relative to a compiled file) to an
/// absolute path, mirroring `SourcePathResolver::url_to_absolute_path` but
/// kept decoupled so the predictor can be tested without a resolver.
pub trait PathResolver: Send + Sync {
    fn resolve(&self, compiled_path: &str, source_url: &str) -> Option<String>;
}

const DEFAULT_LONG_SCAN_THRESHOLD: Duration = Duration::from_secs(10);

pub struct BreakpointPredictor {
    out_files: GlobSet,
    by_resolved_path: HashMap<String, Vec<DiscoveredMetadata>>,
    long_scan_threshold: Duration,
}

/// Fired when a scan exceeds [`BreakpointPredictor::long_scan_threshold`];
/// never aborts the scan.
#[derive(Debug, Clone, Copy)]
pub struct LongPredictionEvent {
    pub elapsed: Duration,
}

impl BreakpointPredictor {
    pub fn new(out_files: &[String]) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in out_files {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
        Self {
            out_files: builder.build().unwrap_or_else(|_| GlobSet::empty()),
            by_resolved_path: HashMap::new(),
            long_scan_threshold: DEFAULT_LONG_SCAN_THRESHOLD,
        }
    }

    #[cfg(test)]
    fn with_threshold(out_files: &[String], threshold: Duration) -> Self {
        let mut predictor = Self::new(out_files);
        predictor.long_scan_threshold = threshold;
        predictor
    }

    /// Resolves once the initial scan over `files` completes. Files are
    /// filtered by `out_files` globs and processed in parallel; a failed
    /// map load is skipped, not fatal. Returns a long-scan warning if the
    /// configured threshold was exceeded.
    pub fn prepare_to_predict(
        &mut self,
        files: Vec<CompiledFileMetadata>,
        loader: &dyn MapLoader,
        resolver: &dyn PathResolver,
    ) -> Option<LongPredictionEvent> {
        let started = Instant::now();
        let matching: Vec<_> = files
            .into_iter()
            .filter(|f| self.out_files.is_match(&f.compiled_path))
            .collect();

        let collected: Arc<Mutex<HashMap<String, Vec<DiscoveredMetadata>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        matching.par_iter().for_each(|file| {
            let Some(map) = loader.load(file) else {
                log::warn!("failed to load source map for {}", file.compiled_path);
                return;
            };
            let mut local = Vec::new();
            for source_url in map.source_urls() {
                let Some(resolved_path) = resolver.resolve(&file.compiled_path, &source_url)
                else {
                    continue;
                };
                local.push((
                    resolved_path,
                    DiscoveredMetadata {
                        resolved_path: String::new(),
                        source_url,
                        source_map_url: file.source_map_url.clone(),
                        compiled_path: file.compiled_path.clone(),
                        mtime: file.mtime,
                    },
                ));
            }
            if !local.is_empty() {
                let mut guard = collected.lock().expect("predictor scan mutex poisoned");
                for (resolved_path, mut entry) in local {
                    entry.resolved_path = resolved_path.clone();
                    guard.entry(resolved_path).or_default().push(entry);
                }
            }
        });

        self.by_resolved_path = Arc::try_unwrap(collected)
            .map(|m| m.into_inner().expect("predictor scan mutex poisoned"))
            .unwrap_or_default();

        let elapsed = started.elapsed();
        (elapsed > self.long_scan_threshold).then_some(LongPredictionEvent { elapsed })
    }

    pub fn get_prediction_for_source(&self, absolute_path: &str) -> Option<&[DiscoveredMetadata]> {
        self.by_resolved_path.get(absolute_path).map(Vec::as_slice)
    }

    /// For one authored breakpoint, computes the predicted compiled
    /// position in every compiled counterpart the scan discovered.
    pub fn predict_breakpoints(
        &self,
        absolute_path: &str,
        line: u32,
        column: u32,
        loader: &dyn MapLoader,
    ) -> Vec<PredictedLocation> {
        let Some(entries) = self.by_resolved_path.get(absolute_path) else {
            return Vec::new();
        };

        entries
            .iter()
            .filter_map(|entry| {
                let map = loader.load(&CompiledFileMetadata {
                    compiled_path: entry.compiled_path.clone(),
                    source_map_url: entry.source_map_url.clone(),
                    mtime: entry.mtime,
                })?;
                let generated = map.find_generated_position(
                    &entry.source_url,
                    Position::new(line.saturating_sub(1), column.saturating_sub(1)),
                    Bias::LeastUpper,
                )?;
                Some(PredictedLocation {
                    compiled_path: entry.compiled_path.clone(),
                    position: generated,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictedLocation {
    pub compiled_path: String,
    pub position: Position,
}

/// The persisted mtime-correlated cache file: one entry per compiled path,
/// valid only while its `correlation` matches the file's current mtime.
/// Writes are debounced (default 500ms) and best-effort — a write failure
/// is logged, never propagated.
pub struct PredictorCacheWriter {
    path: std::path::PathBuf,
    debounce: Duration,
    pending_since: Option<Instant>,
    pending: crate::config::PredictorCacheMap,
}

impl PredictorCacheWriter {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            path: path.into(),
            debounce: Duration::from_millis(500),
            pending_since: None,
            pending: HashMap::new(),
        }
    }

    pub fn load(path: &std::path::Path) -> crate::config::PredictorCacheMap {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Queues `entries` for `compiled_path`, starting the debounce window
    /// if one isn't already running.
    pub fn queue(&mut self, compiled_path: String, correlation: u64, entries: Vec<DiscoveredMetadata>) {
        self.pending.insert(
            compiled_path,
            crate::config::PredictorCacheEntry {
                correlation,
                value: entries,
            },
        );
        self.pending_since.get_or_insert_with(Instant::now);
    }

    /// Flushes to disk if the debounce window has elapsed. Best-effort: a
    /// failure to serialise or write is logged and the pending entries are
    /// kept for the next call.
    pub fn flush_if_due(&mut self, now: Instant) {
        let Some(since) = self.pending_since else {
            return;
        };
        if now.duration_since(since) < self.debounce {
            return;
        }
        match serde_json::to_string(&self.pending) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    log::warn!("failed to write predictor cache: {e}");
                }
            }
            Err(e) => log::warn!("failed to serialise predictor cache: {e}"),
        }
        self.pending_since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sourcemap::{FlatSourceMap, MappingRow, SourceMapMetadata};

    struct FixedLoader(SourceMap);
    impl MapLoader for FixedLoader {
        fn load(&self, _metadata: &CompiledFileMetadata) -> Option<SourceMap> {
            Some(self.0.clone())
        }
    }

    struct IdentityResolver;
    impl PathResolver for IdentityResolver {
        fn resolve(&self, _compiled_path: &str, source_url: &str) -> Option<String> {
            Some(format!("/w/src/{source_url}"))
        }
    }

    fn sample_map() -> SourceMap {
        SourceMap::Flat(FlatSourceMap::new(
            SourceMapMetadata {
                source_map_url: "a.js.map".into(),
                compiled_path: "/w/out/a.js".into(),
                cache_key: "k".into(),
            },
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
    fn scan_discovers_and_resolves_authored_sources() {
        let mut predictor = BreakpointPredictor::new(&["/w/out/**/*.js".to_string()]);
        let event = predictor.prepare_to_predict(
            vec![CompiledFileMetadata {
                compiled_path: "/w/out/a.js".into(),
                source_map_url: "a.js.map".into(),
                mtime: 1,
            }],
            &FixedLoader(sample_map()),
            &IdentityResolver,
        );
        assert!(event.is_none());
        assert!(predictor
            .get_prediction_for_source("/w/src/a.ts")
            .is_some());
    }

    #[test]
    fn non_matching_files_are_skipped_entirely() {
        let mut predictor = BreakpointPredictor::new(&["/w/out/**/*.js".to_string()]);
        predictor.prepare_to_predict(
            vec![CompiledFileMetadata {
                compiled_path: "/w/unrelated/a.js".into(),
                source_map_url: "a.js.map".into(),
                mtime: 1,
            }],
            &FixedLoader(sample_map()),
            &IdentityResolver,
        );
        assert!(predictor
            .get_prediction_for_source("/w/src/a.ts")
            .is_none());
    }

    #[test]
    fn predicts_compiled_position_for_an_authored_breakpoint() {
        let mut predictor = BreakpointPredictor::new(&["/w/out/**/*.js".to_string()]);
        predictor.prepare_to_predict(
            vec![CompiledFileMetadata {
                compiled_path: "/w/out/a.js".into(),
                source_map_url: "a.js.map".into(),
                mtime: 1,
            }],
            &FixedLoader(sample_map()),
            &IdentityResolver,
        );
        let predicted =
            predictor.predict_breakpoints("/w/src/a.ts", 5, 1, &FixedLoader(sample_map()));
        assert_eq!(predicted.len(), 1);
        assert_eq!(predicted[0].position, Position::new(41, 9));
    }

    #[test]
    fn long_scan_emits_a_warning_without_aborting() {
        let mut predictor =
            BreakpointPredictor::with_threshold(&["/w/out/**/*.js".to_string()], Duration::ZERO);
        let event = predictor.prepare_to_predict(
            vec![CompiledFileMetadata {
                compiled_path: "/w/out/a.js".into(),
                source_map_url: "a.js.map".into(),
                mtime: 1,
            }],
            &FixedLoader(sample_map()),
            &IdentityResolver,
        );
        assert!(event.is_some());
        assert!(predictor
            .get_prediction_for_source("/w/src/a.ts")
            .is_some());
    }
}
