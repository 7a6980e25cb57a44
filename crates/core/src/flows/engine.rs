use thiserror::Error;

use crate::flows::states::{LoopPhase, PhaseEvent, PhaseTransition};

/// Pure transition table for the task loop. Holds no state of its own.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoopMachine;

impl LoopMachine {
    pub fn initial_phase(&self) -> LoopPhase {
        LoopPhase::Idle
    }

    pub fn apply(
        &self,
        current: LoopPhase,
        event: PhaseEvent,
    ) -> Result<PhaseTransition, PhaseTransitionError> {
        transition(current, event)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PhaseTransitionError {
    #[error("loop already finished in {phase:?}; cannot apply {event:?}")]
    AlreadyTerminal { phase: LoopPhase, event: PhaseEvent },
    #[error("invalid loop transition from {phase:?} using event {event:?}")]
    InvalidTransition { phase: LoopPhase, event: PhaseEvent },
}

fn transition(
    current: LoopPhase,
    event: PhaseEvent,
) -> Result<PhaseTransition, PhaseTransitionError> {
    use LoopPhase::{
        AwaitingNextAction, Cancelled, Classifying, Executing, Failed, Idle, LowConfidence,
        MaxIterationsReached, NeedsActions, Parsing, TaskComplete,
    };
    use PhaseEvent::{
        ActionsRequired, CancelRequested, ClassificationSkipped, CommandAccepted,
        CompletionRequested, ConfidenceTooLow, DirectAnswerReturned, ExecutionFailed,
        ExecutionSucceeded, IterationCapReached, NextPromptReady, OracleFailed, ParseRejected,
        SessionOpened, TaskAccepted,
    };

    if current.is_terminal() {
        return Err(PhaseTransitionError::AlreadyTerminal { phase: current, event });
    }

    let to = match (current, event) {
        (Idle, TaskAccepted) => Classifying,
        (Idle, ClassificationSkipped) => NeedsActions,
        (Classifying, DirectAnswerReturned) => LoopPhase::Answered,
        (Classifying, ActionsRequired) => NeedsActions,
        (NeedsActions, SessionOpened) => Parsing,
        (Parsing, CommandAccepted) => Executing,
        (Parsing, CompletionRequested) => TaskComplete,
        (Parsing, ConfidenceTooLow) => LowConfidence,
        (LowConfidence, ParseRejected) => Failed,
        (Executing, ExecutionSucceeded) => AwaitingNextAction,
        (Executing, ExecutionFailed) => Failed,
        (AwaitingNextAction, NextPromptReady) => Parsing,
        (AwaitingNextAction, IterationCapReached) => MaxIterationsReached,
        (Idle, _) => {
            return Err(PhaseTransitionError::InvalidTransition { phase: current, event });
        }
        (_, OracleFailed) => Failed,
        (_, CancelRequested) => Cancelled,
        _ => {
            return Err(PhaseTransitionError::InvalidTransition { phase: current, event });
        }
    };

    Ok(PhaseTransition { from: current, to, event })
}
