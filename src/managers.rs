//! C8: `TargetManager` (target discovery, auto-attach) and `ThreadManager`
//! (the `Thread` registry every attached target session gets one of).
//!
//! Grounded on `albertleigh-boa`'s `dap::session.rs` session/thread
//! bookkeeping, extended with CDP's `Target` domain auto-attach flow, which
//! the teacher (a single embedded VM) has no counterpart for.

use std::collections::HashMap;

use crate::dp;
use crate::error::AdapterResult;
use crate::ids::{IdGenerator, TargetId, ThreadId};
use crate::rp::target::{self, TargetInfo};
use crate::rp::{Call, RuntimeAgent};
use crate::thread::Thread;

/// Tracks every target RP has told us about, whether or not we've attached.
pub struct TargetManager {
    targets: HashMap<TargetId, TargetInfo>,
}

impl TargetManager {
    pub fn new() -> Self {
        Self {
            targets: HashMap::new(),
        }
    }

    /// `Target.setDiscoverTargets` + `Target.setAutoAttach` with
    /// `flatten: true` and `waitForDebuggerOnStart: true`: every new target
    /// (iframe, worker, popup) is attached to automatically and held
    /// paused until this session explicitly resumes it.
    pub fn enable(&self, agent: &mut dyn RuntimeAgent, session_id: &str) -> AdapterResult<()> {
        agent.call(
            session_id,
            Call::SetDiscoverTargets(target::SetDiscoverTargetsParams { discover: true }),
        )?;
        agent.call(
            session_id,
            Call::SetAutoAttach(target::SetAutoAttachParams {
                auto_attach: true,
                wait_for_debugger_on_start: true,
                flatten: true,
            }),
        )?;
        Ok(())
    }

    pub fn on_target_created(&mut self, event: target::TargetCreatedEvent) {
        self.targets.insert(event.target_info.target_id, event.target_info);
    }

    pub fn on_target_info_changed(&mut self, event: target::TargetInfoChangedEvent) {
        self.targets.insert(event.target_info.target_id, event.target_info);
    }

    pub fn get(&self, id: TargetId) -> Option<&TargetInfo> {
        self.targets.get(&id)
    }

    /// Targets opened by `parent`, depth-first: the execution-context tree
    /// an iframe/worker hierarchy forms.
    pub fn children_of(&self, parent: TargetId) -> Vec<&TargetInfo> {
        self.targets
            .values()
            .filter(|t| t.opener_id == Some(parent))
            .collect()
    }

    pub fn roots(&self) -> Vec<&TargetInfo> {
        self.targets.values().filter(|t| t.opener_id.is_none()).collect()
    }
}

impl Default for TargetManager {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ThreadManager {
    ids: IdGenerator,
    threads: HashMap<ThreadId, Thread>,
    session_to_thread: HashMap<String, ThreadId>,
}

impl ThreadManager {
    pub fn new() -> Self {
        Self {
            ids: IdGenerator::new(),
            threads: HashMap::new(),
            session_to_thread: HashMap::new(),
        }
    }

    pub fn get(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.get(&id)
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        self.threads.get_mut(&id)
    }

    pub fn thread_for_session(&self, session_id: &str) -> Option<ThreadId> {
        self.session_to_thread.get(session_id).copied()
    }

    pub fn thread_for_session_mut(&mut self, session_id: &str) -> Option<&mut Thread> {
        let id = self.thread_for_session(session_id)?;
        self.threads.get_mut(&id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Thread> {
        self.threads.values()
    }

    pub fn to_dp_list(&self) -> Vec<dp::Thread> {
        self.threads.values().map(Thread::to_dp).collect()
    }

    /// A new target session attached (possibly still paused waiting for
    /// this session to resume it, per `waitForDebuggerOnStart`). Enables
    /// `Runtime`/`Debugger` on the new session and registers its `Thread`.
    pub fn on_attached_to_target(
        &mut self,
        event: target::AttachedToTargetEvent,
        agent: &mut dyn RuntimeAgent,
    ) -> AdapterResult<dp::ThreadEventBody> {
        let thread_id = self.ids.mint_thread_id();
        let thread = Thread::new(thread_id, event.session_id.clone(), event.target_info.title.clone());
        self.threads.insert(thread_id, thread);
        self.session_to_thread.insert(event.session_id.clone(), thread_id);

        agent.call(&event.session_id, Call::RuntimeEnable)?;
        agent.call(&event.session_id, Call::DebuggerEnable)?;
        if event.waiting_for_debugger {
            agent.call(&event.session_id, Call::Resume)?;
        }

        Ok(dp::ThreadEventBody {
            reason: dp::ThreadEventReason::Started,
            thread_id,
        })
    }

    pub fn on_detached_from_target(&mut self, event: target::DetachedFromTargetEvent) -> Option<dp::ThreadEventBody> {
        let thread_id = self.session_to_thread.remove(&event.session_id)?;
        if let Some(thread) = self.threads.get_mut(&thread_id) {
            thread.dispose();
        }
        Some(dp::ThreadEventBody {
            reason: dp::ThreadEventReason::Exited,
            thread_id,
        })
    }
}

impl Default for ThreadManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopAgent;
    impl RuntimeAgent for NoopAgent {
        fn call(&mut self, _session_id: &str, _call: Call) -> AdapterResult<crate::rp::CallResult> {
            Ok(crate::rp::CallResult::Empty)
        }
    }

    fn attach_event(session_id: &str, waiting: bool) -> target::AttachedToTargetEvent {
        target::AttachedToTargetEvent {
            session_id: session_id.to_string(),
            target_info: TargetInfo {
                target_id: crate::ids::IdGenerator::new().mint_target_id(),
                type_: target::TargetType::Page,
                title: "main".into(),
                url: "http://example.test".into(),
                attached: true,
                opener_id: None,
                browser_context_id: None,
            },
            waiting_for_debugger: waiting,
        }
    }

    #[test]
    fn target_manager_groups_children_by_opener() {
        let mut manager = TargetManager::new();
        let mut ids = crate::ids::IdGenerator::new();
        let parent = ids.mint_target_id();
        let child = ids.mint_target_id();
        manager.on_target_created(target::TargetCreatedEvent {
            target_info: TargetInfo {
                target_id: parent,
                type_: target::TargetType::Page,
                title: "top".into(),
                url: "http://example.test".into(),
                attached: true,
                opener_id: None,
                browser_context_id: None,
            },
        });
        manager.on_target_created(target::TargetCreatedEvent {
            target_info: TargetInfo {
                target_id: child,
                type_: target::TargetType::Iframe,
                title: "frame".into(),
                url: "http://example.test/frame".into(),
                attached: true,
                opener_id: Some(parent),
                browser_context_id: None,
            },
        });
        assert_eq!(manager.roots().len(), 1);
        assert_eq!(manager.children_of(parent).len(), 1);
    }

    #[test]
    fn attaching_registers_a_thread_and_maps_its_session() {
        let mut manager = ThreadManager::new();
        let mut agent = NoopAgent;
        let body = manager.on_attached_to_target(attach_event("s1", true), &mut agent).unwrap();
        assert_eq!(body.reason, dp::ThreadEventReason::Started);
        assert!(manager.thread_for_session("s1").is_some());
    }

    #[test]
    fn detaching_an_unknown_session_is_a_no_op() {
        let mut manager = ThreadManager::new();
        assert!(manager
            .on_detached_from_target(target::DetachedFromTargetEvent {
                session_id: "nope".into(),
                target_id: None,
            })
            .is_none());
    }

    #[test]
    fn detaching_disposes_the_thread() {
        let mut manager = ThreadManager::new();
        let mut agent = NoopAgent;
        manager.on_attached_to_target(attach_event("s1", false), &mut agent).unwrap();
        let thread_id = manager.thread_for_session("s1").unwrap();
        manager.on_detached_from_target(target::DetachedFromTargetEvent {
            session_id: "s1".into(),
            target_id: None,
        });
        assert_eq!(manager.get(thread_id).unwrap().lifecycle(), crate::thread::Lifecycle::Disposed);
    }
}
