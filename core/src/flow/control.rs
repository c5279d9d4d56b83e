// ticketcore/src/flow/control.rs

//! Signals for controlling flow execution and the outcome of a run.

/// Returned by every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
  /// Keep going: remaining handlers of this step, then the next step.
  Continue,
  /// Halt the run. No further handlers or steps execute.
  Stop,
}

/// Outcome of a full flow run that did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
  /// Every step ran (or was skipped) to the end.
  Completed,
  /// A handler returned `FlowControl::Stop` while processing `step`.
  Stopped { step: String },
}
