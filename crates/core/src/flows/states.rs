use serde::{Deserialize, Serialize};

use crate::errors::FailureReason;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoopPhase {
    Idle,
    Classifying,
    Answered,
    NeedsActions,
    Parsing,
    TaskComplete,
    LowConfidence,
    Executing,
    AwaitingNextAction,
    MaxIterationsReached,
    Failed,
    Cancelled,
}

impl LoopPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Answered
                | Self::TaskComplete
                | Self::MaxIterationsReached
                | Self::Failed
                | Self::Cancelled
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseEvent {
    TaskAccepted,
    ClassificationSkipped,
    DirectAnswerReturned,
    ActionsRequired,
    SessionOpened,
    CommandAccepted,
    CompletionRequested,
    ConfidenceTooLow,
    ParseRejected,
    ExecutionSucceeded,
    ExecutionFailed,
    NextPromptReady,
    IterationCapReached,
    OracleFailed,
    CancelRequested,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: LoopPhase,
    pub to: LoopPhase,
    pub event: PhaseEvent,
}

/// Result of one parse/execute pass, consumed by the driving loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Continue { next_prompt: String },
    Complete { summary: String },
    Failed(FailureReason),
    CapReached,
    Cancelled,
}
