// ticketcore/src/flow/error.rs

use thiserror::Error;

/// Failures raised by the flow runner itself, as opposed to its handlers.
#[derive(Debug, Error)]
pub enum FlowError {
  #[error("Handler missing for non-optional step '{step_name}' in flow '{flow}'")]
  HandlerMissing { flow: &'static str, step_name: String },

  #[error("Flow '{flow}' finished without producing {missing}")]
  IncompleteRun { flow: &'static str, missing: &'static str },
}
