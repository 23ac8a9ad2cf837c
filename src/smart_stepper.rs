//! C12: decides whether a `step` pause landed somewhere the user doesn't
//! want to see -- a position a source map can't account for, or a source
//! the user asked to skip over -- and if so drives another step instead of
//! surfacing a `stopped` event.
//!
//! No direct teacher analogue (the teacher's debugger has no source-map
//! concept to step around); built from the design notes' smart-step
//! threshold rule, consuming `source_container`'s blackbox/mapping state.

use crate::source_container::SourceContainer;
use crate::stack_trace::StackFrame;

/// Beyond this many consecutive smart-steps, give up and force a step-out
/// rather than single-step through what might be an entire unmapped
/// region forever.
const SMART_STEP_THRESHOLD: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepClassification {
    /// Land here; show the user a real stop.
    Continue,
    /// Keep stepping, this position isn't one the user should see.
    SmartStep,
    /// The smart-step budget for this step command is exhausted.
    ForceStepOut,
}

pub struct SmartStepper {
    consecutive: u32,
}

impl SmartStepper {
    pub fn new() -> Self {
        Self { consecutive: 0 }
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn classify(&mut self, frame: &StackFrame, source_container: &SourceContainer) -> StepClassification {
        if self.consecutive >= SMART_STEP_THRESHOLD {
            self.reset();
            return StepClassification::ForceStepOut;
        }

        let Some(source) = source_container.get(frame.raw_location.source) else {
            return StepClassification::Continue;
        };

        let missing_mapping = source.source_map().is_some()
            && source_container.ui_location(frame.raw_location).is_none();
        let blackboxed = source_container
            .ui_location(frame.raw_location)
            .and_then(|ui| source_container.get(ui.source))
            .map(|original| original.is_blackboxed())
            .unwrap_or(false);

        if missing_mapping || blackboxed {
            self.consecutive += 1;
            StepClassification::SmartStep
        } else {
            self.reset();
            StepClassification::Continue
        }
    }
}

impl Default for SmartStepper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SourceReference;
    use crate::sourcemap::Position;
    use crate::source_container::RawLocation;

    fn frame_at(source: SourceReference, line: u32) -> StackFrame {
        // Constructed only to drive classify(); fields irrelevant to it
        // are given innocuous defaults.
        StackFrame {
            id: crate::ids::IdGenerator::new().mint_frame_id(),
            name: "f".into(),
            raw_location: RawLocation {
                source,
                position: Position::new(line, 0),
            },
            call_frame_id: None,
            scope_chain: Vec::new(),
            is_async_separator: false,
        }
    }

    #[test]
    fn unknown_source_is_never_smart_stepped() {
        let container = SourceContainer::new(&[]);
        let mut stepper = SmartStepper::new();
        let frame = frame_at(SourceReference::from_raw(999), 1);
        assert_eq!(stepper.classify(&frame, &container), StepClassification::Continue);
    }

    #[test]
    fn a_mapless_compiled_source_matching_skip_files_is_smart_stepped() {
        use crate::source_container::CompiledSourceDescriptor;

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
        let mut stepper = SmartStepper::new();
        let frame = frame_at(compiled, 1);
        assert_eq!(stepper.classify(&frame, &container), StepClassification::SmartStep);
    }

    #[test]
    fn exhausting_the_threshold_forces_a_step_out() {
        let mut stepper = SmartStepper::new();
        for _ in 0..SMART_STEP_THRESHOLD {
            stepper.consecutive += 1;
        }
        let container = SourceContainer::new(&[]);
        let frame = frame_at(SourceReference::from_raw(1), 1);
        assert_eq!(stepper.classify(&frame, &container), StepClassification::ForceStepOut);
    }
}
