// ticketcore/src/redemption.rs

//! Door check-in.
//!
//! `RedemptionValidator::validate` walks the ticket through a fixed sequence
//! of checks expressed as a `Flow`; the first check that decides the outcome
//! stops the flow. Exactly one scan log entry is written per decided outcome,
//! after the flow returns. An unauthorized scanner gets an error and no entry.

use crate::access::effective_roles;
use crate::environment::Environment;
use crate::error::CoreError;
use crate::flow::{ContextData, Flow, FlowControl, FlowError};
use crate::model::{Event, EventId, IdentityId, ScanLogEntry, ScanOutcome, Ticket, TicketStatus};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// How much of an unknown token is kept in the log.
const PRESENTED_PREFIX_LEN: usize = 12;

pub const STEP_AUTHORIZE_SCANNER: &str = "authorize_scanner";
pub const STEP_RESOLVE_TICKET: &str = "resolve_ticket";
pub const STEP_MATCH_EVENT: &str = "match_event";
pub const STEP_CHECK_TERMINAL_STATUS: &str = "check_terminal_status";
pub const STEP_CHECK_PRIOR_REDEMPTION: &str = "check_prior_redemption";
pub const STEP_CHECK_EVENT_WINDOW: &str = "check_event_window";
pub const STEP_REDEEM: &str = "redeem";

/// Context of a single scan.
pub struct ScanContext {
  pub env: Arc<Environment>,
  pub event_id: EventId,
  pub presented_token: String,
  pub scanner: IdentityId,
  pub event: Option<Event>,
  pub ticket: Option<Ticket>,
  pub outcome: Option<ScanOutcome>,
}

impl ScanContext {
  fn decide(&mut self, outcome: ScanOutcome) -> FlowControl {
    self.outcome = Some(outcome);
    FlowControl::Stop
  }
}

pub struct RedemptionValidator {
  env: Arc<Environment>,
  flow: Flow<ScanContext, CoreError>,
}

impl RedemptionValidator {
  pub fn new(env: Arc<Environment>) -> Self {
    let mut flow: Flow<ScanContext, CoreError> = Flow::new(
      "ticket_redemption",
      &[
        (STEP_AUTHORIZE_SCANNER, false, None),
        (STEP_RESOLVE_TICKET, false, None),
        (STEP_MATCH_EVENT, false, None),
        (STEP_CHECK_TERMINAL_STATUS, false, None),
        (STEP_CHECK_PRIOR_REDEMPTION, false, None),
        (STEP_CHECK_EVENT_WINDOW, false, None),
        (STEP_REDEEM, false, None),
      ],
    );

    flow.on_step(STEP_AUTHORIZE_SCANNER, authorize_scanner);
    flow.on_step(STEP_RESOLVE_TICKET, resolve_ticket);
    flow.on_step(STEP_MATCH_EVENT, match_event);
    flow.on_step(STEP_CHECK_TERMINAL_STATUS, check_terminal_status);
    flow.on_step(STEP_CHECK_PRIOR_REDEMPTION, check_prior_redemption);
    flow.on_step(STEP_CHECK_EVENT_WINDOW, check_event_window);
    flow.on_step(STEP_REDEEM, redeem);

    Self { env, flow }
  }

  /// Access to the underlying flow, for adding hooks around individual checks.
  pub fn flow_mut(&mut self) -> &mut Flow<ScanContext, CoreError> {
    &mut self.flow
  }

  #[instrument(name = "RedemptionValidator::validate", skip(self, presented_token), fields(code = tracing::field::Empty))]
  pub async fn validate(
    &self,
    event_id: EventId,
    presented_token: &str,
    scanner: IdentityId,
  ) -> Result<ScanOutcome, CoreError> {
    let ctx = ContextData::new(ScanContext {
      env: self.env.clone(),
      event_id,
      presented_token: presented_token.to_string(),
      scanner,
      event: None,
      ticket: None,
      outcome: None,
    });

    self.flow.run(ctx.clone()).await?;

    let outcome = ctx.update(|c| c.outcome.take()).ok_or(FlowError::IncompleteRun {
      flow: self.flow.name(),
      missing: "a scan outcome",
    })?;
    tracing::Span::current().record("code", outcome.code().as_str());

    let entry = ScanLogEntry::record(event_id, scanner, &outcome, self.env.clock.now());
    if let Err(e) = self.env.scans.append(entry).await {
      warn!(error = %e, code = %outcome.code(), "Redemption: scan log append failed.");
      return Err(e.into());
    }

    info!(code = %outcome.code(), ticket_id = ?outcome.ticket_id(), "Redemption: scan recorded.");
    Ok(outcome)
  }

  /// The scan log of an event, oldest first. Restricted to identities that
  /// manage the event.
  #[instrument(name = "RedemptionValidator::scan_log", skip(self))]
  pub async fn scan_log(&self, event_id: EventId, requester: IdentityId) -> Result<Vec<ScanLogEntry>, CoreError> {
    let event = self
      .env
      .orders
      .event(event_id)
      .await?
      .ok_or_else(|| CoreError::not_found("event", event_id))?;
    let roles = effective_roles(self.env.access.as_ref(), requester, &event).await?;
    if !roles.can_export_scans() {
      return Err(CoreError::AuthorizationDenied {
        identity: requester,
        event_id,
        action: "export the scan log",
      });
    }
    Ok(self.env.scans.entries_for_event(event_id).await?)
  }
}

async fn authorize_scanner(ctx: ContextData<ScanContext>) -> Result<FlowControl, CoreError> {
  let (env, event_id, scanner) = ctx.with(|c| (c.env.clone(), c.event_id, c.scanner));

  let event = env
    .orders
    .event(event_id)
    .await?
    .ok_or_else(|| CoreError::not_found("event", event_id))?;
  let roles = effective_roles(env.access.as_ref(), scanner, &event).await?;
  if !roles.can_scan() {
    warn!(%scanner, %event_id, "Redemption: scanner not authorized for event.");
    return Err(CoreError::AuthorizationDenied {
      identity: scanner,
      event_id,
      action: "scan tickets",
    });
  }

  ctx.update(|c| c.event = Some(event));
  Ok(FlowControl::Continue)
}

async fn resolve_ticket(ctx: ContextData<ScanContext>) -> Result<FlowControl, CoreError> {
  let (env, token) = ctx.with(|c| (c.env.clone(), c.presented_token.trim().to_string()));

  let ticket = if token.is_empty() {
    None
  } else {
    env.tickets.ticket_by_token(&token).await?
  };

  Ok(ctx.update(|c| match ticket {
    Some(ticket) => {
      c.ticket = Some(ticket);
      FlowControl::Continue
    }
    None => c.decide(ScanOutcome::Invalid {
      presented_prefix: token.chars().take(PRESENTED_PREFIX_LEN).collect(),
    }),
  }))
}

/// Takes the resolved ticket out of the context; earlier steps guarantee it.
fn resolved_ticket(c: &ScanContext) -> Result<&Ticket, CoreError> {
  c.ticket.as_ref().ok_or_else(|| {
    CoreError::Workflow(FlowError::IncompleteRun {
      flow: "ticket_redemption",
      missing: "a resolved ticket",
    })
  })
}

async fn match_event(ctx: ContextData<ScanContext>) -> Result<FlowControl, CoreError> {
  ctx.update(|c| {
    let ticket = resolved_ticket(c)?;
    if ticket.event_id == c.event_id {
      return Ok(FlowControl::Continue);
    }
    let outcome = ScanOutcome::WrongEvent {
      ticket_id: ticket.id,
      ticket_event_id: ticket.event_id,
    };
    Ok(c.decide(outcome))
  })
}

async fn check_terminal_status(ctx: ContextData<ScanContext>) -> Result<FlowControl, CoreError> {
  ctx.update(|c| {
    let ticket = resolved_ticket(c)?;
    let outcome = match ticket.status {
      TicketStatus::Refunded => ScanOutcome::Refunded { ticket_id: ticket.id },
      TicketStatus::Void => ScanOutcome::Void { ticket_id: ticket.id },
      _ => return Ok(FlowControl::Continue),
    };
    Ok(c.decide(outcome))
  })
}

async fn check_prior_redemption(ctx: ContextData<ScanContext>) -> Result<FlowControl, CoreError> {
  ctx.update(|c| {
    let ticket = resolved_ticket(c)?;
    match ticket.redeemed_at {
      Some(original_redeemed_at) => {
        let outcome = ScanOutcome::Duplicate {
          ticket_id: ticket.id,
          original_redeemed_at,
        };
        Ok(c.decide(outcome))
      }
      None => Ok(FlowControl::Continue),
    }
  })
}

async fn check_event_window(ctx: ContextData<ScanContext>) -> Result<FlowControl, CoreError> {
  ctx.update(|c| {
    let ticket_id = resolved_ticket(c)?.id;
    let closes_at = match &c.event {
      Some(event) => event.closes_at(c.env.redemption_policy.default_event_duration),
      None => {
        return Err(CoreError::Workflow(FlowError::IncompleteRun {
          flow: "ticket_redemption",
          missing: "the scanned event",
        }))
      }
    };
    if c.env.clock.now() > closes_at {
      return Ok(c.decide(ScanOutcome::Expired {
        ticket_id,
        event_closed_at: closes_at,
      }));
    }
    Ok(FlowControl::Continue)
  })
}

async fn redeem(ctx: ContextData<ScanContext>) -> Result<FlowControl, CoreError> {
  let (env, ticket) = ctx.with(|c| (c.env.clone(), c.ticket.clone()));
  let ticket = match ticket {
    Some(ticket) => ticket,
    None => {
      return Err(CoreError::Workflow(FlowError::IncompleteRun {
        flow: "ticket_redemption",
        missing: "a resolved ticket",
      }))
    }
  };

  let at = env.clock.now();
  let outcome = if env.tickets.redeem_if_unredeemed(ticket.id, at).await? {
    ScanOutcome::Valid {
      ticket_id: ticket.id,
      tier_id: ticket.tier_id,
      attendee: ticket.holder_name.clone(),
      redeemed_at: at,
    }
  } else {
    debug!(ticket_id = %ticket.id, "Redemption: conditional update lost, re-reading ticket.");
    resolve_lost_redemption(&env, &ticket).await?
  };

  Ok(ctx.update(|c| c.decide(outcome)))
}

/// The conditional update changed nothing: someone else moved the ticket
/// between our checks and the write. Report what they left behind.
async fn resolve_lost_redemption(env: &Environment, ticket: &Ticket) -> Result<ScanOutcome, CoreError> {
  let current = match env.tickets.ticket(ticket.id).await? {
    Some(current) => current,
    None => {
      return Ok(ScanOutcome::Invalid {
        presented_prefix: ticket.token.chars().take(PRESENTED_PREFIX_LEN).collect(),
      })
    }
  };

  if let Some(original_redeemed_at) = current.redeemed_at {
    return Ok(ScanOutcome::Duplicate {
      ticket_id: current.id,
      original_redeemed_at,
    });
  }
  match current.status {
    TicketStatus::Refunded => Ok(ScanOutcome::Refunded { ticket_id: current.id }),
    TicketStatus::Void => Ok(ScanOutcome::Void { ticket_id: current.id }),
    _ => Err(crate::store::StoreError::Conflict {
      entity: "ticket",
      id: current.id.to_string(),
    }
    .into()),
  }
}
