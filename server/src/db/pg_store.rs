// ticketcore_server/src/db/pg_store.rs

use super::rows::{EventRow, LedgerRow, OrderRow, RefundRequestRow, ScanRow, TicketRow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use sqlx::PgPool;
use std::collections::HashMap;
use ticketcore::access::{AccessControl, Role, RoleSet};
use ticketcore::model::{
  Event, EventId, IdentityId, Order, OrderId, RefundLedgerEntry, RefundRequest, RefundRequestId, RefundRequestStatus,
  ScanLogEntry, Ticket, TicketId, TierId,
};
use ticketcore::store::{
  LedgerWrite, OrderStore, RefundLedgerStore, RefundRequestStore, RequestUpdate, ScanLogStore, TicketStore,
};
use ticketcore::StoreError;
use tracing::{debug, error, instrument};

const ORDER_COLUMNS: &str = "id, buyer_id, buyer_email, event_id, subtotal_cents, fees_cents, total_cents, currency, \
                             status, payment_reference, created_at";
const TICKET_COLUMNS: &str = "id, order_id, event_id, tier_id, owner_id, holder_name, token, status, redeemed_at";
const REQUEST_COLUMNS: &str = "id, order_id, requested_by, reason, detail, status, reviewer_id, review_note, \
                               reviewed_at, ledger_refund_id, created_at";
const LEDGER_COLUMNS: &str = "refund_id, order_id, amount_cents, currency, confirmation_id, reason, initiator, \
                              refund_type, processed_at";

fn unavailable(e: sqlx::Error) -> StoreError {
  error!("Database operation failed: {}", e);
  StoreError::Unavailable(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
  matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Every datastore seam of the core on PostgreSQL, using runtime queries.
#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub async fn insert_event(&self, event: &Event) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO events (id, owner_id, title, starts_at, ends_at) VALUES ($1, $2, $3, $4, $5)")
      .bind(event.id)
      .bind(event.owner_id)
      .bind(&event.title)
      .bind(event.starts_at)
      .bind(event.ends_at)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  pub async fn insert_tier(
    &self,
    tier_id: TierId,
    event_id: EventId,
    name: &str,
    price_cents: i64,
    capacity: i64,
  ) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO ticket_tiers (id, event_id, name, price_cents, capacity) VALUES ($1, $2, $3, $4, $5)")
      .bind(tier_id)
      .bind(event_id)
      .bind(name)
      .bind(price_cents)
      .bind(capacity)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  pub async fn insert_order(&self, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
      "INSERT INTO orders ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
      ORDER_COLUMNS
    ))
    .bind(order.id)
    .bind(order.buyer_id)
    .bind(&order.buyer_email)
    .bind(order.event_id)
    .bind(order.subtotal_cents)
    .bind(order.fees_cents)
    .bind(order.total_cents)
    .bind(order.currency.as_str())
    .bind(order.status.as_str())
    .bind(&order.payment_reference)
    .bind(order.created_at)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  /// Inserts a ticket and counts it against its tier in one transaction.
  pub async fn insert_ticket(&self, ticket: &Ticket) -> Result<(), sqlx::Error> {
    let mut tx = self.pool.begin().await?;
    sqlx::query(&format!(
      "INSERT INTO tickets ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
      TICKET_COLUMNS
    ))
    .bind(ticket.id)
    .bind(ticket.order_id)
    .bind(ticket.event_id)
    .bind(ticket.tier_id)
    .bind(ticket.owner_id)
    .bind(&ticket.holder_name)
    .bind(&ticket.token)
    .bind(ticket.status.as_str())
    .bind(ticket.redeemed_at)
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE ticket_tiers SET sold = sold + 1 WHERE id = $1")
      .bind(ticket.tier_id)
      .execute(&mut *tx)
      .await?;
    tx.commit().await
  }

  pub async fn grant_role(&self, identity: IdentityId, event_id: Option<EventId>, role: Role) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO role_grants (identity_id, event_id, role) VALUES ($1, $2, $3)")
      .bind(identity)
      .bind(event_id)
      .bind(role.as_str())
      .execute(&self.pool)
      .await?;
    Ok(())
  }
}

#[async_trait]
impl OrderStore for PgStore {
  async fn order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(unavailable)?;
    row.map(Order::try_from).transpose()
  }

  async fn event(&self, event_id: EventId) -> Result<Option<Event>, StoreError> {
    let row: Option<EventRow> =
      sqlx::query_as("SELECT id, owner_id, title, starts_at, ends_at FROM events WHERE id = $1")
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;
    Ok(row.map(Event::from))
  }

  async fn tickets_for_order(&self, order_id: OrderId) -> Result<Vec<Ticket>, StoreError> {
    let rows: Vec<TicketRow> = sqlx::query_as(&format!(
      "SELECT {} FROM tickets WHERE order_id = $1 ORDER BY id",
      TICKET_COLUMNS
    ))
    .bind(order_id)
    .fetch_all(&self.pool)
    .await
    .map_err(unavailable)?;
    rows.into_iter().map(Ticket::try_from).collect()
  }
}

#[async_trait]
impl TicketStore for PgStore {
  async fn ticket_by_token(&self, token: &str) -> Result<Option<Ticket>, StoreError> {
    let row: Option<TicketRow> = sqlx::query_as(&format!("SELECT {} FROM tickets WHERE token = $1", TICKET_COLUMNS))
      .bind(token)
      .fetch_optional(&self.pool)
      .await
      .map_err(unavailable)?;
    row.map(Ticket::try_from).transpose()
  }

  async fn ticket(&self, ticket_id: TicketId) -> Result<Option<Ticket>, StoreError> {
    let row: Option<TicketRow> = sqlx::query_as(&format!("SELECT {} FROM tickets WHERE id = $1", TICKET_COLUMNS))
      .bind(ticket_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(unavailable)?;
    row.map(Ticket::try_from).transpose()
  }

  #[instrument(name = "PgStore::redeem_if_unredeemed", skip(self))]
  async fn redeem_if_unredeemed(&self, ticket_id: TicketId, at: DateTime<Utc>) -> Result<bool, StoreError> {
    let result = sqlx::query(
      "UPDATE tickets SET status = 'redeemed', redeemed_at = $2 \
       WHERE id = $1 AND redeemed_at IS NULL AND status IN ('issued', 'transferred')",
    )
    .bind(ticket_id)
    .bind(at)
    .execute(&self.pool)
    .await
    .map_err(unavailable)?;
    Ok(result.rows_affected() == 1)
  }
}

#[async_trait]
impl ScanLogStore for PgStore {
  async fn append(&self, entry: ScanLogEntry) -> Result<(), StoreError> {
    let detail = entry.detail.to_detail_json().map_err(|e| StoreError::Corrupt {
      entity: "scan log entry",
      id: entry.id.to_string(),
      detail: e.to_string(),
    })?;
    sqlx::query(
      "INSERT INTO scan_log (id, event_id, ticket_id, scanner_id, code, detail, scanned_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(entry.id)
    .bind(entry.event_id)
    .bind(entry.ticket_id)
    .bind(entry.scanner_id)
    .bind(entry.code.as_str())
    .bind(detail)
    .bind(entry.scanned_at)
    .execute(&self.pool)
    .await
    .map_err(unavailable)?;
    Ok(())
  }

  async fn entries_for_event(&self, event_id: EventId) -> Result<Vec<ScanLogEntry>, StoreError> {
    let mut rows = sqlx::query_as::<_, ScanRow>(
      "SELECT id, event_id, ticket_id, scanner_id, code, detail, scanned_at \
       FROM scan_log WHERE event_id = $1 ORDER BY seq",
    )
    .bind(event_id)
    .fetch(&self.pool);

    let mut entries = Vec::new();
    while let Some(row) = rows.try_next().await.map_err(unavailable)? {
      entries.push(ScanLogEntry::try_from(row)?);
    }
    Ok(entries)
  }
}

#[async_trait]
impl RefundRequestStore for PgStore {
  async fn insert_if_none_open(&self, request: RefundRequest) -> Result<bool, StoreError> {
    // The partial unique index on open requests makes this a single conditional insert.
    let result = sqlx::query(
      "INSERT INTO refund_requests (id, order_id, requested_by, reason, detail, status, created_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(request.id)
    .bind(request.order_id)
    .bind(request.requested_by)
    .bind(request.reason.as_str())
    .bind(&request.detail)
    .bind(request.status.as_str())
    .bind(request.created_at)
    .execute(&self.pool)
    .await;

    match result {
      Ok(_) => Ok(true),
      Err(e) if is_unique_violation(&e) => {
        debug!(order_id = %request.order_id, "PgStore: open refund request already exists.");
        Ok(false)
      }
      Err(e) => Err(unavailable(e)),
    }
  }

  async fn request(&self, request_id: RefundRequestId) -> Result<Option<RefundRequest>, StoreError> {
    let row: Option<RefundRequestRow> =
      sqlx::query_as(&format!("SELECT {} FROM refund_requests WHERE id = $1", REQUEST_COLUMNS))
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;
    row.map(RefundRequest::try_from).transpose()
  }

  async fn open_request_for_order(&self, order_id: OrderId) -> Result<Option<RefundRequest>, StoreError> {
    let row: Option<RefundRequestRow> = sqlx::query_as(&format!(
      "SELECT {} FROM refund_requests WHERE order_id = $1 AND status IN ('pending', 'approved')",
      REQUEST_COLUMNS
    ))
    .bind(order_id)
    .fetch_optional(&self.pool)
    .await
    .map_err(unavailable)?;
    row.map(RefundRequest::try_from).transpose()
  }

  #[instrument(name = "PgStore::transition", skip(self, update), fields(to_status = %update.target_status()))]
  async fn transition(
    &self,
    request_id: RefundRequestId,
    expected: RefundRequestStatus,
    update: RequestUpdate,
  ) -> Result<bool, StoreError> {
    let target = update.target_status();
    let query = match &update {
      RequestUpdate::Claim { stamp, .. } => sqlx::query(
        "UPDATE refund_requests SET status = $3, reviewer_id = $4, review_note = $5, reviewed_at = $6 \
         WHERE id = $1 AND status = $2",
      )
      .bind(request_id)
      .bind(expected.as_str())
      .bind(target.as_str())
      .bind(stamp.reviewer_id)
      .bind(stamp.note.clone())
      .bind(stamp.reviewed_at),
      RequestUpdate::Release => sqlx::query(
        "UPDATE refund_requests SET status = $3, reviewer_id = NULL, review_note = NULL, reviewed_at = NULL \
         WHERE id = $1 AND status = $2",
      )
      .bind(request_id)
      .bind(expected.as_str())
      .bind(target.as_str()),
      RequestUpdate::Complete { ledger_refund_id } => sqlx::query(
        "UPDATE refund_requests SET status = $3, ledger_refund_id = $4 WHERE id = $1 AND status = $2",
      )
      .bind(request_id)
      .bind(expected.as_str())
      .bind(target.as_str())
      .bind(ledger_refund_id.clone()),
    };

    let result = query.execute(&self.pool).await.map_err(unavailable)?;
    Ok(result.rows_affected() == 1)
  }
}

#[async_trait]
impl RefundLedgerStore for PgStore {
  #[instrument(name = "PgStore::record_refund", skip(self, entry), fields(refund_id = %entry.refund_id, order_id = %entry.order_id))]
  async fn record_refund(&self, entry: RefundLedgerEntry) -> Result<LedgerWrite, StoreError> {
    let mut tx = self.pool.begin().await.map_err(unavailable)?;

    // Concurrent writers for the same refund id serialize on the primary key.
    let inserted = sqlx::query(&format!(
      "INSERT INTO refund_ledger ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
       ON CONFLICT (refund_id) DO NOTHING",
      LEDGER_COLUMNS
    ))
    .bind(&entry.refund_id)
    .bind(entry.order_id)
    .bind(entry.amount_cents)
    .bind(entry.currency.as_str())
    .bind(&entry.confirmation_id)
    .bind(entry.reason.as_str())
    .bind(entry.initiator)
    .bind(entry.refund_type.as_str())
    .bind(entry.processed_at)
    .execute(&mut *tx)
    .await
    .map_err(unavailable)?
    .rows_affected()
      == 1;

    if !inserted {
      let confirmed = match &entry.confirmation_id {
        Some(confirmation_id) => {
          sqlx::query(
            "UPDATE refund_ledger SET confirmation_id = $2 WHERE refund_id = $1 AND confirmation_id IS NULL",
          )
          .bind(&entry.refund_id)
          .bind(confirmation_id)
          .execute(&mut *tx)
          .await
          .map_err(unavailable)?
          .rows_affected()
            == 1
        }
        None => false,
      };
      tx.commit().await.map_err(unavailable)?;
      return Ok(if confirmed {
        LedgerWrite::Confirmed
      } else {
        LedgerWrite::AlreadyRecorded
      });
    }

    let released: Vec<(TierId,)> = sqlx::query_as(
      "UPDATE tickets SET status = 'refunded' \
       WHERE order_id = $1 AND status IN ('issued', 'transferred') RETURNING tier_id",
    )
    .bind(entry.order_id)
    .fetch_all(&mut *tx)
    .await
    .map_err(unavailable)?;

    let mut per_tier: HashMap<TierId, i64> = HashMap::new();
    for (tier_id,) in released {
      *per_tier.entry(tier_id).or_default() += 1;
    }
    for (tier_id, count) in &per_tier {
      sqlx::query("UPDATE ticket_tiers SET sold = GREATEST(sold - $2, 0) WHERE id = $1")
        .bind(tier_id)
        .bind(count)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;
    }

    sqlx::query("UPDATE orders SET status = 'refunded' WHERE id = $1 AND status = 'paid'")
      .bind(entry.order_id)
      .execute(&mut *tx)
      .await
      .map_err(unavailable)?;

    tx.commit().await.map_err(unavailable)?;
    debug!(tiers = per_tier.len(), "PgStore: refund recorded.");
    Ok(LedgerWrite::Applied)
  }

  async fn entry(&self, refund_id: &str) -> Result<Option<RefundLedgerEntry>, StoreError> {
    let row: Option<LedgerRow> =
      sqlx::query_as(&format!("SELECT {} FROM refund_ledger WHERE refund_id = $1", LEDGER_COLUMNS))
        .bind(refund_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;
    row.map(RefundLedgerEntry::try_from).transpose()
  }

  async fn entries_for_order(&self, order_id: OrderId) -> Result<Vec<RefundLedgerEntry>, StoreError> {
    let rows: Vec<LedgerRow> = sqlx::query_as(&format!(
      "SELECT {} FROM refund_ledger WHERE order_id = $1 ORDER BY processed_at, refund_id",
      LEDGER_COLUMNS
    ))
    .bind(order_id)
    .fetch_all(&self.pool)
    .await
    .map_err(unavailable)?;
    rows.into_iter().map(RefundLedgerEntry::try_from).collect()
  }
}

#[async_trait]
impl AccessControl for PgStore {
  async fn roles_for(&self, identity: IdentityId, event_id: EventId) -> Result<RoleSet, StoreError> {
    let rows: Vec<(String,)> = sqlx::query_as(
      "SELECT role FROM role_grants WHERE identity_id = $1 AND (event_id = $2 OR event_id IS NULL)",
    )
    .bind(identity)
    .bind(event_id)
    .fetch_all(&self.pool)
    .await
    .map_err(unavailable)?;

    rows
      .into_iter()
      .map(|(role,)| {
        role.parse::<Role>().map_err(|e| StoreError::Corrupt {
          entity: "role grant",
          id: identity.to_string(),
          detail: e.to_string(),
        })
      })
      .collect()
  }
}
