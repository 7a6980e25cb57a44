//! Core types and deterministic logic for the PagePilot task loop.
//!
//! Nothing in this crate performs I/O against an oracle or a page. It holds:
//! - the Action Catalog and the typed action parameter/payload unions (`catalog`, `domain`)
//! - the loop phase machine and per-task loop bookkeeping (`flows`)
//! - progress events and sinks (`progress`)
//! - layered configuration (`config`) and the failure taxonomy (`errors`)

pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod progress;

pub use catalog::{ActionCatalog, READ_ACTION};
pub use domain::action::{
    ActionDefinition, ActionKind, ActionParams, ActionPayload, ExecutionOutcome, ParamError,
    ParamKind, ParamSpec, ParsedCommand, ScrollDirection, CONFIDENCE_THRESHOLD, TASK_COMPLETE,
};
pub use domain::task::{ContextSnapshot, PageSection, Task, TaskId, TaskTarget};
pub use errors::{DomainError, FailureReason};
pub use flows::{LoopPhase, LoopState, PhaseEvent, StepOutcome};
pub use progress::{
    InMemoryProgressSink, NoopProgressSink, ProgressEvent, ProgressSink, ProgressStatus,
    SinkMessage,
};
