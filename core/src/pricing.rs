// ticketcore/src/pricing.rs

//! Fee computation for ticket sales.
//!
//! All arithmetic runs on `rust_decimal::Decimal`, in currency units, and is
//! rounded to whole cents only at the end (half away from zero). The same face
//! value therefore always yields the same breakdown, which checkout retries
//! depend on.

use crate::error::CoreError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Percentage of face value the platform keeps (6.6%).
const PLATFORM_RATE: Decimal = Decimal::from_parts(66, 0, 0, false, 3);
/// Flat platform amount per ticket, in currency units.
const PLATFORM_FLAT: Decimal = Decimal::from_parts(179, 0, 0, false, 2);
/// Processor percentage deducted from the gross charge (2.9%).
const PROCESSOR_RATE: Decimal = Decimal::from_parts(29, 0, 0, false, 3);
/// Processor flat amount per charge, in currency units.
const PROCESSOR_FLAT: Decimal = Decimal::from_parts(30, 0, 0, false, 2);

/// Three-letter, upper-case currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
  pub fn new(code: &str) -> Result<Self, CoreError> {
    let code = code.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
      return Err(CoreError::InvalidInput(format!("'{}' is not a three-letter currency code", code)));
    }
    Ok(Currency(code.to_ascii_uppercase()))
  }

  pub fn usd() -> Self {
    Currency("USD".to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Currency {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl TryFrom<String> for Currency {
  type Error = CoreError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Currency::new(&value)
  }
}

impl From<Currency> for String {
  fn from(value: Currency) -> Self {
    value.0
  }
}

/// Price of a single ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
  pub subtotal: i64,
  /// Everything the buyer pays on top of face value, processor gross-up included.
  pub fees: i64,
  pub total: i64,
  /// The platform's share of `fees`.
  pub platform_fee: i64,
  pub currency: Currency,
}

/// Price of a multi-ticket checkout; fees are computed per ticket and summed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
  pub lines: Vec<PriceBreakdown>,
  pub subtotal_cents: i64,
  pub fees_cents: i64,
  pub total_cents: i64,
  pub platform_fee_cents: i64,
  pub currency: Currency,
}

fn units(cents: i64) -> Decimal {
  Decimal::new(cents, 2)
}

fn to_cents(amount_units: Decimal) -> i64 {
  (amount_units * Decimal::ONE_HUNDRED)
    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
    .to_i64()
    .unwrap_or(i64::MAX)
}

fn platform_target(face: Decimal) -> Decimal {
  face * PLATFORM_RATE + PLATFORM_FLAT
}

/// Total buyer-side fee for one ticket, in cents.
pub fn processing_fee(face_value_cents: i64) -> i64 {
  if face_value_cents <= 0 {
    return 0;
  }
  let face = units(face_value_cents);
  let total_net = face + platform_target(face);
  let total_charge = (total_net + PROCESSOR_FLAT) / (Decimal::ONE - PROCESSOR_RATE);
  to_cents(total_charge - face)
}

/// The platform's net share for one ticket, in cents.
pub fn platform_fee(face_value_cents: i64) -> i64 {
  if face_value_cents <= 0 {
    return 0;
  }
  to_cents(platform_target(units(face_value_cents)))
}

pub fn breakdown(face_value_cents: i64, currency: &Currency) -> PriceBreakdown {
  let fees = processing_fee(face_value_cents);
  PriceBreakdown {
    subtotal: face_value_cents,
    fees,
    total: face_value_cents.saturating_add(fees),
    platform_fee: platform_fee(face_value_cents),
    currency: currency.clone(),
  }
}

/// Prices a checkout of several tickets. Negative face values are rejected;
/// free tickets are allowed and carry no fee.
pub fn quote(face_values_cents: &[i64], currency: Currency) -> Result<Quote, CoreError> {
  if let Some(bad) = face_values_cents.iter().find(|v| **v < 0) {
    return Err(CoreError::InvalidInput(format!("face value {} is negative", bad)));
  }

  let lines: Vec<PriceBreakdown> = face_values_cents.iter().map(|face| breakdown(*face, &currency)).collect();
  let sum = |f: fn(&PriceBreakdown) -> i64| lines.iter().map(f).fold(0i64, i64::saturating_add);

  Ok(Quote {
    subtotal_cents: sum(|l| l.subtotal),
    fees_cents: sum(|l| l.fees),
    total_cents: sum(|l| l.total),
    platform_fee_cents: sum(|l| l.platform_fee),
    currency,
    lines,
  })
}
