//! Monotonic identifiers.
//!
//! Every id in the system is a small newtype over an integer plus a counter
//! that mints strictly increasing values, never zero, within a session.
//! Grounded on the teacher's `ScriptId`/`FrameId` newtypes
//! (`core/engine/src/debugger/mod.rs`).

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! monotonic_id {
    ($name:ident, $repr:ty) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            pub fn get(self) -> $repr {
                self.0
            }

            /// Wraps an id value received from a peer (e.g. a DP `threadId`
            /// argument referencing an id this session minted earlier).
            pub fn from_raw(value: $repr) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

monotonic_id!(ThreadId, i64);
monotonic_id!(SourceReference, i64);
monotonic_id!(FrameId, i64);
monotonic_id!(VariablesReference, i64);
monotonic_id!(BreakpointId, i64);
monotonic_id!(ContextId, i64);
monotonic_id!(TargetId, u64);

/// The ephemeral thread id the adapter reserves for `revealLocation`.
pub const REVEAL_THREAD_ID: i64 = 0xE8D4A50FFF;

/// A counter that mints strictly increasing ids starting at 1, wrapping
/// (while still skipping 0) at the given modulus. Variable ids wrap modulo
/// `0x7fff_fffe`; other id kinds use an effectively unbounded counter by
/// passing `i64::MAX`.
#[derive(Debug)]
pub struct IdGenerator {
    next: i64,
    modulus: i64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            next: 1,
            modulus: i64::MAX,
        }
    }

    pub fn with_modulus(modulus: i64) -> Self {
        Self { next: 1, modulus }
    }

    pub fn next_raw(&mut self) -> i64 {
        let id = self.next;
        self.next += 1;
        if self.next >= self.modulus {
            self.next = 1;
        }
        id
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! impl_mint {
    ($method:ident, $ty:ident) => {
        impl IdGenerator {
            pub fn $method(&mut self) -> $ty {
                $ty(self.next_raw())
            }
        }
    };
}

impl_mint!(mint_thread_id, ThreadId);
impl_mint!(mint_source_reference, SourceReference);
impl_mint!(mint_frame_id, FrameId);
impl_mint!(mint_variables_reference, VariablesReference);
impl_mint!(mint_breakpoint_id, BreakpointId);
impl_mint!(mint_context_id, ContextId);

impl IdGenerator {
    pub fn mint_target_id(&mut self) -> TargetId {
        TargetId(self.next_raw() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_never_zero() {
        let mut gen = IdGenerator::new();
        let a = gen.mint_thread_id();
        let b = gen.mint_thread_id();
        assert!(a.get() >= 1);
        assert!(b.get() > a.get());
    }

    #[test]
    fn variable_ids_wrap_modulo_configured_value_skipping_zero() {
        let mut gen = IdGenerator::with_modulus(3);
        let a = gen.mint_variables_reference();
        let b = gen.mint_variables_reference();
        let c = gen.mint_variables_reference();
        assert_eq!((a.get(), b.get(), c.get()), (1, 2, 1));
        assert_ne!(a.get(), 0);
    }
}
