use crate::flows::engine::{LoopMachine, PhaseTransitionError};
use crate::flows::states::{LoopPhase, PhaseEvent, PhaseTransition};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const MAX_ITERATIONS_LIMIT: u32 = 20;

/// Per-task loop bookkeeping. Owned by exactly one controller run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopState {
    iteration: u32,
    max_iterations: u32,
    phase: LoopPhase,
    current_prompt: String,
}

impl LoopState {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            iteration: 0,
            max_iterations: max_iterations.clamp(1, MAX_ITERATIONS_LIMIT),
            phase: LoopMachine.initial_phase(),
            current_prompt: String::new(),
        }
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn current_prompt(&self) -> &str {
        &self.current_prompt
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn cap_reached(&self) -> bool {
        self.iteration >= self.max_iterations
    }

    pub fn apply(&mut self, event: PhaseEvent) -> Result<PhaseTransition, PhaseTransitionError> {
        let transition = LoopMachine.apply(self.phase, event)?;
        self.phase = transition.to;
        Ok(transition)
    }

    /// Resets the counter and seeds the prompt with the original instruction.
    pub fn begin_actions(&mut self, instruction: &str) {
        self.iteration = 0;
        self.current_prompt = instruction.to_owned();
    }

    /// Starts the next pass, or returns `None` once the cap has been used up.
    pub fn next_iteration(&mut self) -> Option<u32> {
        if self.cap_reached() {
            return None;
        }
        self.iteration += 1;
        Some(self.iteration)
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.current_prompt = prompt.into();
    }
}

impl Default for LoopState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITERATIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::{LoopState, DEFAULT_MAX_ITERATIONS, MAX_ITERATIONS_LIMIT};
    use crate::flows::states::{LoopPhase, PhaseEvent};

    #[test]
    fn iterations_stop_exactly_at_cap() {
        let mut state = LoopState::new(3);
        state.begin_actions("do it");

        assert_eq!(state.next_iteration(), Some(1));
        assert_eq!(state.next_iteration(), Some(2));
        assert_eq!(state.next_iteration(), Some(3));
        assert!(state.cap_reached());
        assert_eq!(state.next_iteration(), None);
        assert_eq!(state.iteration(), 3);
    }

    #[test]
    fn max_iterations_is_clamped_into_range() {
        assert_eq!(LoopState::new(0).max_iterations(), 1);
        assert_eq!(LoopState::new(99).max_iterations(), MAX_ITERATIONS_LIMIT);
        assert_eq!(LoopState::default().max_iterations(), DEFAULT_MAX_ITERATIONS);
    }

    #[test]
    fn apply_tracks_phase_and_rejects_invalid_events() {
        let mut state = LoopState::default();
        state.apply(PhaseEvent::TaskAccepted).expect("idle -> classifying");
        assert_eq!(state.phase(), LoopPhase::Classifying);

        assert!(state.apply(PhaseEvent::CommandAccepted).is_err());
        assert_eq!(state.phase(), LoopPhase::Classifying);
    }

    #[test]
    fn begin_actions_seeds_prompt() {
        let mut state = LoopState::default();
        state.begin_actions("navigate to about");
        assert_eq!(state.current_prompt(), "navigate to about");
        state.set_prompt("next");
        assert_eq!(state.current_prompt(), "next");
    }
}
