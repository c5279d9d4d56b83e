// ticketcore/src/flow/mod.rs

//! A small asynchronous step runner used to express the ticketing workflows.
//!
//! A `Flow<TData, Err>` is an ordered list of named steps. Each step can carry
//! `before`, `on` and `after` handlers that receive a shared `ContextData<TData>`
//! and return `FlowControl::Continue` or `FlowControl::Stop`. Steps may be
//! optional (no handler is fine) or skipped through a condition evaluated on
//! the context right before the step runs.

pub mod context_data;
pub mod control;
pub mod definition;
pub mod error;
pub mod execution;
pub mod hooks;
pub mod step;

pub use context_data::ContextData;
pub use control::{FlowControl, FlowOutcome};
pub use definition::{Flow, Handler};
pub use error::FlowError;
pub use step::{SkipCondition, StepDef};
