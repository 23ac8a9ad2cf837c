//! C11: exception-breakpoint state (`setExceptionBreakpoints` -> RP
//! `setPauseOnExceptions`) and the static custom-breakpoint catalog
//! (DOMDebugger instrumentation/event-listener breakpoints).
//!
//! No direct teacher analogue -- boa has neither DOM events nor pause-on-
//! exception granularity. The catalog/descriptor/apply split is built from
//! spec.md's description directly, with entries drawn from CDP's own
//! DOMDebugger event-name vocabulary.

use std::collections::HashSet;

use crate::dp;
use crate::error::AdapterResult;
use crate::rp::debugger::{PauseOnExceptionsState, SetPauseOnExceptionsParams};
use crate::rp::dom_debugger;
use crate::rp::{Call, RuntimeAgent};

/// "caught" implies "uncaught" is also of interest: RP only has one
/// three-way dial, so the more permissive filter present wins.
pub fn filters_to_pause_state(filters: &[String]) -> PauseOnExceptionsState {
    if filters.iter().any(|f| f == "caught") {
        PauseOnExceptionsState::All
    } else if filters.iter().any(|f| f == "uncaught") {
        PauseOnExceptionsState::Uncaught
    } else {
        PauseOnExceptionsState::None
    }
}

pub fn apply_exception_filters(
    filters: &[String],
    agent: &mut dyn RuntimeAgent,
    session_id: &str,
) -> AdapterResult<()> {
    agent.call(
        session_id,
        Call::SetPauseOnExceptions(SetPauseOnExceptionsParams {
            state: filters_to_pause_state(filters),
        }),
    )?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomBreakpointGroup {
    Animation,
    Canvas,
    Timer,
    Mouse,
    Keyboard,
    DomMutation,
    Xhr,
    Media,
    Worker,
    WebAudio,
}

enum CustomBreakpointKind {
    Instrumentation { event_name: &'static str },
    EventListener { event_name: &'static str, target_name: Option<&'static str> },
}

pub struct CustomBreakpointDescriptor {
    pub id: &'static str,
    pub group: CustomBreakpointGroup,
    pub title: &'static str,
    kind: CustomBreakpointKind,
}

impl CustomBreakpointDescriptor {
    pub fn apply(&self, enabled: bool, agent: &mut dyn RuntimeAgent, session_id: &str) -> AdapterResult<()> {
        match &self.kind {
            CustomBreakpointKind::Instrumentation { event_name } => {
                let call = if enabled {
                    Call::SetInstrumentationBreakpoint(dom_debugger::SetInstrumentationBreakpointParams {
                        event_name: event_name.to_string(),
                    })
                } else {
                    Call::RemoveInstrumentationBreakpoint(dom_debugger::RemoveInstrumentationBreakpointParams {
                        event_name: event_name.to_string(),
                    })
                };
                agent.call(session_id, call)?;
            }
            CustomBreakpointKind::EventListener { event_name, target_name } => {
                let call = if enabled {
                    Call::SetEventListenerBreakpoint(dom_debugger::SetEventListenerBreakpointParams {
                        event_name: event_name.to_string(),
                        target_name: target_name.map(str::to_string),
                    })
                } else {
                    Call::RemoveEventListenerBreakpoint(dom_debugger::RemoveEventListenerBreakpointParams {
                        event_name: event_name.to_string(),
                        target_name: target_name.map(str::to_string),
                    })
                };
                agent.call(session_id, call)?;
            }
        }
        Ok(())
    }

    fn matches_event(&self, event_name: &str) -> bool {
        matches!(
            &self.kind,
            CustomBreakpointKind::EventListener { event_name: en, .. } if *en == event_name
        )
    }
}

macro_rules! instrumentation {
    ($id:expr, $group:expr, $title:expr, $event:expr) => {
        CustomBreakpointDescriptor {
            id: $id,
            group: $group,
            title: $title,
            kind: CustomBreakpointKind::Instrumentation { event_name: $event },
        }
    };
}

macro_rules! listener {
    ($id:expr, $group:expr, $title:expr, $event:expr) => {
        CustomBreakpointDescriptor {
            id: $id,
            group: $group,
            title: $title,
            kind: CustomBreakpointKind::EventListener { event_name: $event, target_name: None },
        }
    };
}

/// Fixed at build time, as spec.md requires: no runtime registration.
pub static CATALOG: &[CustomBreakpointDescriptor] = &[
    instrumentation!("instrumentation:setTimeout", CustomBreakpointGroup::Timer, "setTimeout", "setTimeout"),
    instrumentation!("instrumentation:setInterval", CustomBreakpointGroup::Timer, "setInterval", "setInterval"),
    instrumentation!(
        "instrumentation:requestAnimationFrame",
        CustomBreakpointGroup::Animation,
        "requestAnimationFrame",
        "requestAnimationFrame"
    ),
    instrumentation!(
        "instrumentation:canvasContextCreated",
        CustomBreakpointGroup::Canvas,
        "Canvas Context Created",
        "canvasContextCreated"
    ),
    instrumentation!(
        "instrumentation:webglErrorFired",
        CustomBreakpointGroup::Canvas,
        "WebGL Error Fired",
        "webglErrorFired"
    ),
    instrumentation!(
        "instrumentation:scriptFirstStatement",
        CustomBreakpointGroup::Worker,
        "Script First Statement",
        "scriptFirstStatement"
    ),
    instrumentation!(
        "instrumentation:audioContextCreated",
        CustomBreakpointGroup::WebAudio,
        "Audio Context Created",
        "audioContextCreated"
    ),
    listener!("listener:click", CustomBreakpointGroup::Mouse, "Click", "click"),
    listener!("listener:mousedown", CustomBreakpointGroup::Mouse, "Mouse Down", "mousedown"),
    listener!("listener:mouseup", CustomBreakpointGroup::Mouse, "Mouse Up", "mouseup"),
    listener!("listener:keydown", CustomBreakpointGroup::Keyboard, "Key Down", "keydown"),
    listener!("listener:keyup", CustomBreakpointGroup::Keyboard, "Key Up", "keyup"),
    listener!("listener:DOMContentLoaded", CustomBreakpointGroup::DomMutation, "DOMContentLoaded", "DOMContentLoaded"),
    listener!("listener:load", CustomBreakpointGroup::DomMutation, "Load", "load"),
    listener!("listener:readystatechange", CustomBreakpointGroup::Xhr, "XHR Ready State Change", "readystatechange"),
    listener!("listener:error", CustomBreakpointGroup::Xhr, "XHR Error", "error"),
    listener!("listener:message", CustomBreakpointGroup::Worker, "Worker Message", "message"),
    listener!("listener:play", CustomBreakpointGroup::Media, "Media Play", "play"),
    listener!("listener:pause", CustomBreakpointGroup::Media, "Media Pause", "pause"),
];

pub fn find(id: &str) -> Option<&'static CustomBreakpointDescriptor> {
    CATALOG.iter().find(|d| d.id == id)
}

/// Describes an `EventListener`-reason pause using RP's pause `data`
/// payload (`{eventName, targetName?}`), falling back to the raw event
/// name when it isn't one the catalog names.
pub fn describe_event_listener_pause(data: &serde_json::Value) -> (String, String) {
    let event_name = data.get("eventName").and_then(|v| v.as_str()).unwrap_or("unknown");
    let target_name = data.get("targetName").and_then(|v| v.as_str());

    if let Some(descriptor) = CATALOG.iter().find(|d| d.matches_event(event_name)) {
        return (descriptor.title.to_string(), format!("Paused on event listener '{}'", descriptor.title));
    }

    let text = match target_name {
        Some(target) => format!("Paused on event listener '{event_name}' on {target}"),
        None => format!("Paused on event listener '{event_name}'"),
    };
    (format!("Event Listener Breakpoint '{event_name}'"), text)
}

/// Per-session record of which catalog entries the client has enabled.
/// Reapplied (best-effort) whenever a thread enables its RP domains.
#[derive(Debug, Default)]
pub struct CustomBreakpointState {
    enabled: HashSet<String>,
}

impl CustomBreakpointState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, updates: &[dp::CustomBreakpointUpdate]) {
        for update in updates {
            if update.enabled {
                self.enabled.insert(update.id.clone());
            } else {
                self.enabled.remove(&update.id);
            }
        }
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.enabled.contains(id)
    }

    /// Applies every currently-enabled entry to a session; a failed apply
    /// is logged and does not stop the rest from being attempted.
    pub fn apply_all(&self, agent: &mut dyn RuntimeAgent, session_id: &str) {
        for id in &self.enabled {
            let Some(descriptor) = find(id) else { continue };
            if let Err(err) = descriptor.apply(true, agent, session_id) {
                log::warn!("custom breakpoint {id} failed to apply on {session_id}: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caught_filter_maps_to_pause_on_all_exceptions() {
        assert_eq!(filters_to_pause_state(&["caught".to_string()]), PauseOnExceptionsState::All);
    }

    #[test]
    fn uncaught_only_maps_to_pause_on_uncaught() {
        assert_eq!(filters_to_pause_state(&["uncaught".to_string()]), PauseOnExceptionsState::Uncaught);
    }

    #[test]
    fn no_filters_disables_pausing() {
        assert_eq!(filters_to_pause_state(&[]), PauseOnExceptionsState::None);
    }

    #[test]
    fn catalog_ids_are_unique() {
        let mut ids: Vec<&str> = CATALOG.iter().map(|d| d.id).collect();
        ids.sort_unstable();
        let mut deduped = ids.clone();
        deduped.dedup();
        assert_eq!(ids.len(), deduped.len());
    }

    #[test]
    fn known_event_listener_pause_uses_the_catalog_title() {
        let data = serde_json::json!({ "eventName": "click" });
        let (title, _) = describe_event_listener_pause(&data);
        assert_eq!(title, "Click");
    }

    #[test]
    fn unknown_event_listener_pause_falls_back_to_the_raw_name() {
        let data = serde_json::json!({ "eventName": "totallyUnknownEvent", "targetName": "button#go" });
        let (title, text) = describe_event_listener_pause(&data);
        assert_eq!(title, "Event Listener Breakpoint 'totallyUnknownEvent'");
        assert!(text.contains("button#go"));
    }

    #[test]
    fn updating_tracks_enabled_ids() {
        let mut state = CustomBreakpointState::new();
        state.update(&[dp::CustomBreakpointUpdate { id: "listener:click".into(), enabled: true }]);
        assert!(state.is_enabled("listener:click"));
        state.update(&[dp::CustomBreakpointUpdate { id: "listener:click".into(), enabled: false }]);
        assert!(!state.is_enabled("listener:click"));
    }
}
