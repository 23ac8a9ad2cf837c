//! C6: synchronous + asynchronous call-frame stitching into the stack a
//! paused thread reports, with on-demand expansion of the async parent
//! chain and log-point frame filtering.
//!
//! Grounded on `albertleigh-boa`'s `dap::session.rs` stack frame assembly,
//! generalised from a single synchronous frame list to RP's
//! `asyncStackTrace` chain (an `StackTrace` can recursively name a
//! `parent`), expanded lazily rather than flattened eagerly.

use crate::dp;
use crate::ids::{FrameId, IdGenerator, SourceReference};
use crate::rp::debugger::{CallFrame, RuntimeCallFrame, StackTrace as RpStackTrace};
use crate::source_container::{RawLocation, SourceContainer};
use crate::sourcemap::Position;

/// The synthetic url log-point conditions are compiled against. Checked at
/// every site that turns an RP call frame into a [`StackFrame`]: neither
/// the synchronous frame list nor an expanded async parent may surface it.
pub const LOGPOINT_SYNTHETIC_URL: &str = "debugger://logpoint";

#[derive(Debug, Clone)]
pub struct StackFrame {
    pub id: FrameId,
    pub name: String,
    pub raw_location: RawLocation,
    /// `None` for frames synthesised from an async parent: they cannot be
    /// targeted by `evaluate` or `restartFrame`.
    pub call_frame_id: Option<String>,
    pub scope_chain: Vec<crate::rp::debugger::Scope>,
    pub is_async_separator: bool,
}

impl StackFrame {
    pub fn to_dp(&self, source_container: &SourceContainer) -> dp::StackFrame {
        if self.is_async_separator {
            return dp::StackFrame {
                id: self.id,
                name: self.name.clone(),
                source: None,
                line: 0,
                column: 0,
                can_restart: false,
                presentation_hint: Some(dp::StackFramePresentationHint::Label),
            };
        }

        let ui = source_container.ui_location(self.raw_location);
        let source = ui.and_then(|u| source_container.get(u.source)).map(|s| dp::Source {
            name: Some(s.url.clone()),
            path: s.resolved_path.as_ref().and_then(|p| p.absolute_path.clone()),
            source_reference: if s.resolved_path.as_ref().and_then(|p| p.absolute_path.as_ref()).is_some() {
                0
            } else {
                s.source_reference.get()
            },
            origin: None,
            sources: Vec::new(),
        });

        dp::StackFrame {
            id: self.id,
            name: self.name.clone(),
            source,
            line: ui.map(|u| u.line as i64).unwrap_or(1),
            column: ui.map(|u| u.column as i64).unwrap_or(1),
            can_restart: self.call_frame_id.is_some(),
            presentation_hint: None,
        }
    }
}

/// A not-yet-expanded async parent: the RP chain above the frames already
/// materialised, loaded one level at a time as the client asks for deeper
/// frames (`supportsDelayedStackTraceLoading`).
struct PendingAsyncParent {
    trace: RpStackTrace,
}

pub struct StackTrace {
    frames: Vec<StackFrame>,
    pending: Option<PendingAsyncParent>,
}

impl StackTrace {
    /// Builds the synchronous portion from RP `paused.callFrames`, keeping
    /// the `asyncStackTrace` (if any) unexpanded.
    pub fn from_paused(
        call_frames: &[CallFrame],
        async_stack_trace: Option<RpStackTrace>,
        ids: &mut IdGenerator,
        resolve_script: impl Fn(&str) -> Option<SourceReference>,
    ) -> Self {
        let frames = call_frames
            .iter()
            .filter(|f| f.url != LOGPOINT_SYNTHETIC_URL)
            .filter_map(|f| {
                let source = resolve_script(&f.location.script_id)?;
                Some(StackFrame {
                    id: ids.mint_frame_id(),
                    name: f.function_name.clone(),
                    raw_location: RawLocation {
                        source,
                        position: Position::new(
                            f.location.line_number.max(0) as u32,
                            f.location.column_number.unwrap_or(0).max(0) as u32,
                        ),
                    },
                    call_frame_id: Some(f.call_frame_id.clone()),
                    scope_chain: f.scope_chain.clone(),
                    is_async_separator: false,
                })
            })
            .collect();

        Self {
            frames,
            pending: async_stack_trace.map(|trace| PendingAsyncParent { trace }),
        }
    }

    pub fn total_frames(&self) -> i64 {
        self.frames.len() as i64 + if self.pending.is_some() { 1 } else { 0 }
    }

    pub fn loaded_len(&self) -> usize {
        self.frames.len()
    }

    pub fn cached_frames(&self) -> &[StackFrame] {
        &self.frames
    }

    /// Expands exactly as many async-parent levels as needed to have at
    /// least `needed` frames materialised, inserting one separator frame
    /// per level. A no-op once the chain is exhausted.
    pub fn ensure_loaded(&mut self, needed: usize, ids: &mut IdGenerator, resolve_script: impl Fn(&str) -> Option<SourceReference>) {
        while self.frames.len() < needed {
            let Some(pending) = self.pending.take() else {
                break;
            };

            self.frames.push(StackFrame {
                id: ids.mint_frame_id(),
                name: pending
                    .trace
                    .description
                    .clone()
                    .unwrap_or_else(|| "async".to_string()),
                raw_location: RawLocation {
                    source: SourceReference::from_raw(0),
                    position: Position::new(0, 0),
                },
                call_frame_id: None,
                scope_chain: Vec::new(),
                is_async_separator: true,
            });

            for frame in pending
                .trace
                .call_frames
                .iter()
                .filter(|f| f.url != LOGPOINT_SYNTHETIC_URL)
            {
                let Some(source) = resolve_script(&frame.script_id) else {
                    continue;
                };
                self.frames.push(runtime_call_frame_to_stack_frame(
                    frame,
                    source,
                    ids.mint_frame_id(),
                ));
            }

            self.pending = pending.trace.parent.map(|parent| PendingAsyncParent { trace: *parent });
        }
    }

    /// Window requested by a `stackTrace` DP request, expanding lazily as
    /// needed. `None` levels means "to the end of what is/can be loaded".
    pub fn window(
        &mut self,
        start_frame: i64,
        levels: Option<i64>,
        ids: &mut IdGenerator,
        resolve_script: impl Fn(&str) -> Option<SourceReference>,
    ) -> &[StackFrame] {
        let start = start_frame.max(0) as usize;
        let needed = match levels {
            Some(n) if n > 0 => start + n as usize,
            _ => usize::MAX,
        };
        if needed != usize::MAX {
            self.ensure_loaded(needed, ids, &resolve_script);
        } else {
            // Drain the whole async chain.
            loop {
                let before = self.frames.len();
                self.ensure_loaded(before + 1, ids, &resolve_script);
                if self.frames.len() == before {
                    break;
                }
            }
        }
        let end = needed.min(self.frames.len());
        if start >= self.frames.len() {
            &[]
        } else {
            &self.frames[start..end]
        }
    }
}

fn runtime_call_frame_to_stack_frame(
    frame: &RuntimeCallFrame,
    source: SourceReference,
    id: FrameId,
) -> StackFrame {
    StackFrame {
        id,
        name: frame.function_name.clone(),
        raw_location: RawLocation {
            source,
            position: Position::new(frame.line_number.max(0) as u32, frame.column_number.max(0) as u32),
        },
        call_frame_id: None,
        scope_chain: Vec::new(),
        is_async_separator: false,
    }
}
