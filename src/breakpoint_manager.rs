//! C9: `setBreakpoints` normalization and RP binding, keyed by source url.
//!
//! Grounded on `atl-lang-atlas`'s `debugger::breakpoints::BreakpointManager`
//! (condition/hit-count/log-point fields), generalized from a single VM's
//! instruction-offset index to RP's per-script `Debugger.setBreakpointByUrl`:
//! one request binds against every script CDP already knows with a matching
//! url *and* every later one it parses, so there is no manual "reissue on
//! scriptParsed" step here -- `breakpointResolved` simply fires again each
//! time a new script matches.
//!
//! A `setBreakpoints` call for a source replaces that source's breakpoint
//! set atomically: the previous generation's RP breakpoints are removed and
//! a new generation is stamped in, so a `breakpointResolved` event that was
//! already in flight for the superseded generation is dropped rather than
//! resurrecting a breakpoint the client just replaced.

use std::collections::HashMap;

use crate::dp;
use crate::error::AdapterResult;
use crate::ids::{BreakpointId, IdGenerator};
use crate::rp::debugger::{self, BreakpointResolvedEvent};
use crate::rp::{Call, CallResult, RuntimeAgent};
use crate::source_path_resolver::SourcePathResolver;
use crate::stack_trace::LOGPOINT_SYNTHETIC_URL;

struct Entry {
    id: BreakpointId,
    requested: dp::SourceBreakpoint,
    /// `(session_id, rp breakpoint id)` for every session this was bound on.
    rp_ids: Vec<(String, String)>,
    verified: bool,
    resolved_line: Option<i64>,
    resolved_column: Option<i64>,
}

impl Entry {
    fn to_dp(&self, source: &dp::Source) -> dp::Breakpoint {
        dp::Breakpoint {
            id: Some(self.id),
            verified: self.verified,
            message: None,
            source: Some(source.clone()),
            line: self.resolved_line.or(Some(self.requested.line)),
            column: self.resolved_column.or(self.requested.column),
        }
    }
}

struct UrlBreakpoints {
    generation: u64,
    entries: Vec<Entry>,
}

pub struct BreakpointManager {
    ids: IdGenerator,
    resolver: SourcePathResolver,
    by_url: HashMap<String, UrlBreakpoints>,
    /// RP breakpoint id -> (url, generation it was set under, our id), so a
    /// `breakpointResolved` event can find the entry it resolved without a
    /// linear scan.
    by_rp_id: HashMap<String, (String, u64, BreakpointId)>,
}

impl BreakpointManager {
    pub fn new(resolver: SourcePathResolver) -> Self {
        Self {
            ids: IdGenerator::new(),
            resolver,
            by_url: HashMap::new(),
            by_rp_id: HashMap::new(),
        }
    }

    fn resolve_url(&self, source: &dp::Source) -> String {
        if let Some(path) = &source.path {
            if let Some(url) = self.resolver.absolute_path_to_url(path) {
                return url;
            }
            return path.clone();
        }
        source.name.clone().unwrap_or_default()
    }

    /// Replaces every breakpoint previously set for this source, across
    /// every live session, with the requested set.
    pub fn set_breakpoints(
        &mut self,
        args: &dp::SetBreakpointsArguments,
        sessions: &[String],
        agent: &mut dyn RuntimeAgent,
    ) -> AdapterResult<dp::SetBreakpointsResponseBody> {
        let url = self.resolve_url(&args.source);
        let previous = self.by_url.remove(&url);
        let generation = previous.as_ref().map_or(0, |p| p.generation + 1);

        if let Some(previous) = previous {
            self.by_rp_id.retain(|_, (entry_url, ..)| entry_url != &url);
            for entry in &previous.entries {
                for (session_id, rp_id) in &entry.rp_ids {
                    // A detached session can no longer be told to remove
                    // anything; its breakpoints went away with it.
                    let _ = agent.call(
                        session_id,
                        Call::RemoveBreakpoint(debugger::RemoveBreakpointParams {
                            breakpoint_id: rp_id.clone(),
                        }),
                    );
                }
            }
        }

        let mut entries = Vec::with_capacity(args.breakpoints.len());
        for requested in &args.breakpoints {
            let id = self.ids.mint_breakpoint_id();
            let condition = compile_condition(id, requested);
            let mut rp_ids = Vec::new();
            let mut verified = false;
            let mut resolved_line = None;
            let mut resolved_column = None;

            for session_id in sessions {
                let result = agent.call(
                    session_id,
                    Call::SetBreakpointByUrl(debugger::SetBreakpointByUrlParams {
                        line_number: requested.line.saturating_sub(1),
                        url: Some(url.clone()),
                        script_hash: None,
                        column_number: requested.column.map(|c| c.saturating_sub(1)),
                        condition: condition.clone(),
                    }),
                )?;
                if let CallResult::SetBreakpointByUrl(result) = result {
                    self.by_rp_id
                        .insert(result.breakpoint_id.clone(), (url.clone(), generation, id));
                    if let Some(location) = result.locations.first() {
                        verified = true;
                        resolved_line = Some(location.line_number + 1);
                        resolved_column = location.column_number.map(|c| c + 1);
                    }
                    rp_ids.push((session_id.clone(), result.breakpoint_id));
                }
            }

            entries.push(Entry {
                id,
                requested: requested.clone(),
                rp_ids,
                verified,
                resolved_line,
                resolved_column,
            });
        }

        let breakpoints = entries.iter().map(|e| e.to_dp(&args.source)).collect();
        self.by_url.insert(url, UrlBreakpoints { generation, entries });
        Ok(dp::SetBreakpointsResponseBody { breakpoints })
    }

    /// A session that attached after breakpoints were already set needs
    /// them reissued explicitly: CDP's url-matching auto-resolve is scoped
    /// to the session a `setBreakpointByUrl` call was made on.
    pub fn attach_session(&mut self, session_id: &str, agent: &mut dyn RuntimeAgent) -> AdapterResult<()> {
        for (url, bucket) in self.by_url.iter_mut() {
            for entry in &mut bucket.entries {
                let condition = compile_condition(entry.id, &entry.requested);
                let result = agent.call(
                    session_id,
                    Call::SetBreakpointByUrl(debugger::SetBreakpointByUrlParams {
                        line_number: entry.requested.line.saturating_sub(1),
                        url: Some(url.clone()),
                        script_hash: None,
                        column_number: entry.requested.column.map(|c| c.saturating_sub(1)),
                        condition,
                    }),
                )?;
                if let CallResult::SetBreakpointByUrl(result) = result {
                    self.by_rp_id
                        .insert(result.breakpoint_id.clone(), (url.clone(), bucket.generation, entry.id));
                    if let Some(location) = result.locations.first() {
                        entry.verified = true;
                        entry.resolved_line = Some(location.line_number + 1);
                        entry.resolved_column = location.column_number.map(|c| c + 1);
                    }
                    entry.rp_ids.push((session_id.to_string(), result.breakpoint_id));
                }
            }
        }
        Ok(())
    }

    /// Resolves an RP `hitBreakpoints` entry (an RP breakpoint id) back to
    /// the `BreakpointId` the client was told about.
    pub fn resolve_rp_id(&self, rp_id: &str) -> Option<BreakpointId> {
        self.by_rp_id.get(rp_id).map(|(_, _, id)| *id)
    }

    /// `None` means the resolution belongs to a generation this source's
    /// breakpoints have since moved past. The returned url is the *compiled*
    /// script url the breakpoint was bound on, since `entry`'s line/column
    /// here are generated-position -- a caller with access to the source
    /// graph still needs it to translate back to an authored location when
    /// the source was set on a mapped original.
    pub fn on_breakpoint_resolved(&mut self, event: BreakpointResolvedEvent) -> Option<(String, dp::BreakpointEventBody)> {
        let (url, generation, id) = self.by_rp_id.get(&event.breakpoint_id)?.clone();
        let bucket = self.by_url.get_mut(&url)?;
        if bucket.generation != generation {
            return None;
        }
        let entry = bucket.entries.iter_mut().find(|e| e.id == id)?;
        entry.verified = true;
        entry.resolved_line = Some(event.location.line_number + 1);
        entry.resolved_column = event.location.column_number.map(|c| c + 1);

        Some((
            url,
            dp::BreakpointEventBody {
                reason: dp::BreakpointEventReason::Changed,
                breakpoint: dp::Breakpoint {
                    id: Some(entry.id),
                    verified: entry.verified,
                    message: None,
                    source: None,
                    line: entry.resolved_line,
                    column: entry.resolved_column,
                },
            },
        ))
    }
}

/// Log points win over plain conditions: a log message and a condition on
/// the same request doesn't make sense to express, and DP doesn't forbid
/// sending both, so log wins like the major implementations' behavior.
fn compile_condition(id: BreakpointId, bp: &dp::SourceBreakpoint) -> Option<String> {
    if let Some(log_message) = &bp.log_message {
        return Some(compile_log_point(log_message));
    }
    match (&bp.condition, &bp.hit_condition) {
        (None, None) => None,
        (Some(condition), None) => Some(condition.clone()),
        (None, Some(hit_condition)) => Some(compile_hit_condition(id, hit_condition)),
        (Some(condition), Some(hit_condition)) => Some(format!(
            "({condition}) && ({})",
            compile_hit_condition(id, hit_condition)
        )),
    }
}

/// `hitCondition` is a bare comparison (`> 5`, `5`, `% 3`) the host DP
/// client expects to compare against a running hit count; we keep that
/// count on `globalThis` keyed by breakpoint id, since RP conditions are
/// evaluated in the paused frame's scope, not ours.
fn compile_hit_condition(id: BreakpointId, expr: &str) -> String {
    let trimmed = expr.trim();
    let comparison = if trimmed.starts_with(|c: char| "<>=!".contains(c)) {
        format!("count {trimmed}")
    } else if let Some(rest) = trimmed.strip_prefix('%') {
        format!("count % ({rest}) === 0")
    } else {
        format!("count >= ({trimmed})")
    };
    let counters = format!("globalThis.__dapHitCounters{}", id.get());
    format!(
        "(({counters} = ({counters} || 0) + 1), (count => {comparison})({counters}))",
        counters = counters
    )
}

/// Compiles a DP log message (a string with `{expression}` interpolations)
/// into a `console.log` call tagged with the synthetic url that marks its
/// frame as one to drop from reported stack traces, so the expression
/// evaluating never shows up as a "real" pause or frame.
fn compile_log_point(message: &str) -> String {
    let mut args = Vec::new();
    let mut literal = String::new();
    let mut chars = message.chars();

    while let Some(c) = chars.next() {
        if c == '{' {
            if !literal.is_empty() {
                args.push(format!("{literal:?}"));
                literal.clear();
            }
            let mut expr = String::new();
            for c2 in chars.by_ref() {
                if c2 == '}' {
                    break;
                }
                expr.push(c2);
            }
            args.push(format!("({expr})"));
        } else {
            literal.push(c);
        }
    }
    if !literal.is_empty() {
        args.push(format!("{literal:?}"));
    }
    if args.is_empty() {
        args.push("\"\"".to_string());
    }

    format!(
        "console.log({args})\n//# sourceURL={LOGPOINT_SYNTHETIC_URL}",
        args = args.join(", ")
    )
}
