// ticketcore/src/refund/mod.rs

//! Refund workflows.
//!
//! - `processing`: a manager-initiated refund of a whole order.
//! - `review`: buyer-submitted requests approved or declined by a manager.
//! - `reconcile`: the single ledger write shared by every path that learns
//!   about a completed processor refund.
//! - `sweep`: periodic backstop converging refunds the ledger never saw.

pub mod processing;
pub mod reconcile;
pub mod review;
pub mod sweep;

pub use processing::{LedgerStatus, RefundOutcome, RefundProcessor, RefundReceipt};
pub use reconcile::{ConfirmationKind, ConfirmationResult, LedgerWriteRequest, RefundConfirmation, RefundReconciler};
pub use review::{RefundReviewer, RequestLink, ReviewAction, ReviewOutcome};
pub use sweep::{ReconciliationSweep, SweepReport};
