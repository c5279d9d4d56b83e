// ticketcore/src/lib.rs

//! Ticketcore: the ticket lifecycle and financial integrity core of an event
//! ticketing platform.
//!
//!  - `pricing`: deterministic fee computation on exact decimals.
//!  - `redemption`: at-most-once door check-in with a complete scan log.
//!  - `eligibility`: the single refund eligibility rule set.
//!  - `refund`: direct refunds, reviewed refund requests, and the idempotent
//!    ledger reconciliation shared by the synchronous path, the processor
//!    webhook and the periodic sweep.
//!
//! Workflows are expressed on a small step runner (`flow`). Everything the
//! core talks to (datastore, payment processor, role lookup, clock) sits
//! behind a trait; `memory` provides in-process implementations.

pub mod access;
pub mod clock;
pub mod eligibility;
pub mod environment;
pub mod error;
pub mod flow;
pub mod memory;
pub mod model;
pub mod notify;
pub mod pricing;
pub mod processor;
pub mod redemption;
pub mod refund;
pub mod store;

// --- Re-exports for the Public API ---

pub use crate::access::{AccessControl, Role, RoleSet};
pub use crate::clock::{Clock, FixedClock, SystemClock};
pub use crate::eligibility::{evaluate, Eligibility, EligibilityInput, EligibilityReason, RefundPolicy};
pub use crate::environment::{Environment, RedemptionPolicy};
pub use crate::error::{CoreError, CoreResult, ErrorCode};
pub use crate::flow::{ContextData, Flow, FlowControl, FlowError, FlowOutcome};
pub use crate::notify::NotificationIntent;
pub use crate::pricing::{breakdown, platform_fee, processing_fee, quote, Currency, PriceBreakdown, Quote};
pub use crate::processor::{PaymentProcessor, ProcessorError, ProcessorRefund, ProcessorRefundStatus};
pub use crate::redemption::RedemptionValidator;
pub use crate::refund::{
  LedgerStatus, ReconciliationSweep, RefundOutcome, RefundProcessor, RefundReconciler, RefundReviewer, RequestLink,
  ReviewAction, ReviewOutcome, SweepReport,
};
pub use crate::store::{LedgerWrite, StoreError};
