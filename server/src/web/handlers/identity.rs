// ticketcore_server/src/web/handlers/identity.rs

use actix_web::{FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use ticketcore::model::IdentityId;

pub const IDENTITY_HEADER: &str = "X-Identity";

/// The caller, as asserted by the authenticating gateway in front of this
/// service.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
  pub id: IdentityId,
}

impl FromRequest for Identity {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
    let parsed = req
      .headers()
      .get(IDENTITY_HEADER)
      .and_then(|value| value.to_str().ok())
      .and_then(|value| Uuid::parse_str(value.trim()).ok());

    ready(match parsed {
      Some(id) => Ok(Identity { id }),
      None => {
        warn!("Identity extractor: missing or invalid {} header.", IDENTITY_HEADER);
        Err(AppError::Auth(format!("Missing or invalid {} header.", IDENTITY_HEADER)))
      }
    })
  }
}
