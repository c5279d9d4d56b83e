// ticketcore/src/flow/execution.rs

//! `Flow::run`: walks the steps in order and drives each phase's handlers.

use super::definition::{Flow, Handler};
use super::error::FlowError;
use super::{ContextData, FlowControl, FlowOutcome};
use tracing::{event, instrument, span, Level};

#[derive(Clone, Copy)]
enum Phase {
  Before,
  On,
  After,
}

impl Phase {
  fn label(self) -> &'static str {
    match self {
      Phase::Before => "before",
      Phase::On => "on",
      Phase::After => "after",
    }
  }
}

impl<TData, Err> Flow<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Runs every step against `ctx_data`.
  ///
  /// Returns `FlowOutcome::Stopped` as soon as a handler asks to stop, and the
  /// handler's error as soon as one fails. A non-optional step without any
  /// handler is reported as `FlowError::HandlerMissing`.
  #[instrument(
    name = "Flow::run",
    skip_all,
    fields(flow = self.name, num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<FlowOutcome, Err> {
    event!(Level::DEBUG, "Flow run starting.");

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_name = step_def.name.as_str();
      let step_span = span!(Level::DEBUG, "flow_step", step_name, step_index = step_idx);

      if let Some(skip_if) = &step_def.skip_if {
        if skip_if(&ctx_data) {
          event!(parent: &step_span, Level::DEBUG, "Step skipped by condition.");
          continue;
        }
      }

      let registered = |phase: &std::collections::HashMap<String, Vec<Handler<TData, Err>>>| {
        phase.get(step_name).map_or(false, |v| !v.is_empty())
      };
      if !registered(&self.before) && !registered(&self.on) && !registered(&self.after) {
        if step_def.optional {
          event!(parent: &step_span, Level::DEBUG, "Optional step has no handlers, skipping.");
          continue;
        }
        event!(parent: &step_span, Level::ERROR, "Non-optional step has no handlers.");
        return Err(Err::from(FlowError::HandlerMissing {
          flow: self.name,
          step_name: step_def.name.clone(),
        }));
      }

      for (phase, handlers) in [
        (Phase::Before, self.before.get(step_name)),
        (Phase::On, self.on.get(step_name)),
        (Phase::After, self.after.get(step_name)),
      ] {
        let Some(handlers) = handlers else { continue };
        for handler_fn in handlers {
          match handler_fn(ctx_data.clone()).await {
            Ok(FlowControl::Continue) => {}
            Ok(FlowControl::Stop) => {
              event!(parent: &step_span, Level::DEBUG, phase = phase.label(), "Flow stopped by handler.");
              return Ok(FlowOutcome::Stopped {
                step: step_def.name.clone(),
              });
            }
            Err(e) => {
              event!(parent: &step_span, Level::WARN, phase = phase.label(), error = %e, "Handler failed.");
              return Err(e);
            }
          }
        }
      }
    }

    event!(Level::DEBUG, "Flow run completed.");
    Ok(FlowOutcome::Completed)
  }
}
