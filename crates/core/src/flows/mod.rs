pub mod engine;
pub mod loop_state;
pub mod states;

pub use engine::{LoopMachine, PhaseTransitionError};
pub use loop_state::{LoopState, DEFAULT_MAX_ITERATIONS, MAX_ITERATIONS_LIMIT};
pub use states::{LoopPhase, PhaseEvent, PhaseTransition, StepOutcome};
