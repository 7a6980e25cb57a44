//! Agent runtime - the oracle-driven task loop
//!
//! This crate turns a natural-language instruction into a bounded sequence of page actions:
//! - Decides whether an instruction can be answered directly (`classifier`)
//! - Opens an oracle session seeded with the action catalog and page structure (`prompt`, `context`)
//! - Parses one structured command per iteration and gates it on confidence (`parser`)
//! - Validates and runs the command against a page (`executor`, `tools`, `page`)
//! - Reports progress and results to a sink (`sink`)
//!
//! # Architecture
//!
//! `IterationController` (see `controller`) owns the loop. Each pass resolves to a
//! `StepOutcome` value; nothing in the loop is signalled by unwinding. The oracle session
//! it opens is held by a `SessionGuard` and destroyed on every exit path.
//!
//! `TaskRunner` (see `runtime`) wraps a controller with a single-flight guard and a
//! cancel handle for the in-flight task.
//!
//! # Oracle backends
//!
//! `Oracle` and `OracleSession` are the only seams to the language model. `HttpOracle`
//! (see `llm`) speaks the Ollama and OpenAI-compatible chat APIs.

pub mod classifier;
pub mod context;
pub mod controller;
pub mod executor;
pub mod llm;
pub mod oracle;
pub mod page;
pub mod parser;
pub mod prompt;
pub mod runtime;
pub mod sink;
pub mod tools;

pub use classifier::{Classification, ClassifierGate};
pub use context::{
    ContextError, ContextLoader, ContextRepository, ContextStore, FileContextStore,
    InMemoryContextStore, StaticContextLoader,
};
pub use controller::{IterationController, LoopSettings, StepRecord, TaskOutcome, TaskReport};
pub use executor::ActionExecutor;
pub use llm::HttpOracle;
pub use oracle::{
    CancelHandle, CancelSignal, ChatMessage, ChatRole, Oracle, OracleError, OracleSession,
    SessionGuard, TextStream,
};
pub use page::StaticPage;
pub use parser::CommandParser;
pub use runtime::TaskRunner;
pub use sink::{FanoutSink, TracingProgressSink};
pub use tools::{Action, ActionRegistry, PageDriver};
