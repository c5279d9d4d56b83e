// ticketcore_server/src/services/signature.rs

//! `Processor-Signature` headers: `t=<unix seconds>,v1=<hex hmac-sha256>` over
//! `"<t>.<raw body>"`, keyed by the shared webhook secret.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Processor-Signature";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
  #[error("signature header is missing")]
  Missing,
  #[error("signature header is malformed")]
  Malformed,
  #[error("signature timestamp is outside the {tolerance_secs}s tolerance")]
  Stale { tolerance_secs: i64 },
  #[error("signature does not match the payload")]
  Mismatch,
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
  let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
  mac.update(timestamp.to_string().as_bytes());
  mac.update(b".");
  mac.update(payload);
  Ok(mac)
}

/// Builds the header value the processor would send for `payload` at `at`.
pub fn sign(secret: &str, payload: &[u8], at: DateTime<Utc>) -> Result<String, SignatureError> {
  let timestamp = at.timestamp();
  let mac = mac_for(secret, timestamp, payload)?;
  Ok(format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes())))
}

/// Accepts the header if any `v1` entry matches and its timestamp is within
/// `tolerance_secs` of `now` in either direction.
pub fn verify(
  secret: &str,
  header: Option<&str>,
  payload: &[u8],
  now: DateTime<Utc>,
  tolerance_secs: i64,
) -> Result<(), SignatureError> {
  let header = header.map(str::trim).filter(|h| !h.is_empty()).ok_or(SignatureError::Missing)?;

  let mut timestamp: Option<i64> = None;
  let mut candidates: Vec<Vec<u8>> = Vec::new();
  for part in header.split(',') {
    let (key, value) = part.trim().split_once('=').ok_or(SignatureError::Malformed)?;
    match key {
      "t" => timestamp = Some(value.parse().map_err(|_| SignatureError::Malformed)?),
      "v1" => candidates.push(hex::decode(value).map_err(|_| SignatureError::Malformed)?),
      // Other schemes may be present; ignore them.
      _ => {}
    }
  }
  let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
  if candidates.is_empty() {
    return Err(SignatureError::Malformed);
  }

  if (now.timestamp() - timestamp).abs() > tolerance_secs {
    return Err(SignatureError::Stale { tolerance_secs });
  }

  for candidate in &candidates {
    let mac = mac_for(secret, timestamp, payload)?;
    if mac.verify_slice(candidate).is_ok() {
      return Ok(());
    }
  }
  Err(SignatureError::Mismatch)
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, TimeZone};

  const SECRET: &str = "whsec_test123secret456";

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
  }

  #[test]
  fn accepts_a_fresh_signature() {
    let payload = br#"{"type":"refund.succeeded"}"#;
    let header = sign(SECRET, payload, now()).unwrap();
    assert_eq!(verify(SECRET, Some(&header), payload, now(), 300), Ok(()));
  }

  #[test]
  fn rejects_a_modified_payload() {
    let header = sign(SECRET, br#"{"amount_cents":100}"#, now()).unwrap();
    assert_eq!(
      verify(SECRET, Some(&header), br#"{"amount_cents":999}"#, now(), 300),
      Err(SignatureError::Mismatch)
    );
  }

  #[test]
  fn rejects_the_wrong_secret() {
    let payload = b"{}";
    let header = sign("whsec_other", payload, now()).unwrap();
    assert_eq!(verify(SECRET, Some(&header), payload, now(), 300), Err(SignatureError::Mismatch));
  }

  #[test]
  fn rejects_timestamps_outside_tolerance() {
    let payload = b"{}";
    let header = sign(SECRET, payload, now() - Duration::seconds(600)).unwrap();
    assert_eq!(
      verify(SECRET, Some(&header), payload, now(), 300),
      Err(SignatureError::Stale { tolerance_secs: 300 })
    );

    let edge = sign(SECRET, payload, now() - Duration::seconds(300)).unwrap();
    assert_eq!(verify(SECRET, Some(&edge), payload, now(), 300), Ok(()));
  }

  #[test]
  fn rejects_missing_and_malformed_headers() {
    assert_eq!(verify(SECRET, None, b"{}", now(), 300), Err(SignatureError::Missing));
    assert_eq!(verify(SECRET, Some(""), b"{}", now(), 300), Err(SignatureError::Missing));
    assert_eq!(verify(SECRET, Some("garbage"), b"{}", now(), 300), Err(SignatureError::Malformed));
    assert_eq!(
      verify(SECRET, Some("t=1780315200"), b"{}", now(), 300),
      Err(SignatureError::Malformed)
    );
    assert_eq!(
      verify(SECRET, Some("v1=abcd"), b"{}", now(), 300),
      Err(SignatureError::Malformed)
    );
  }

  #[test]
  fn any_matching_v1_entry_is_enough() {
    let payload = b"{}";
    let good = sign(SECRET, payload, now()).unwrap();
    let good_sig = good.split_once(",v1=").map(|(_, s)| s.to_string()).unwrap();
    let header = format!("t={},v1={},v1={}", now().timestamp(), "00".repeat(32), good_sig);
    assert_eq!(verify(SECRET, Some(&header), payload, now(), 300), Ok(()));
  }
}
