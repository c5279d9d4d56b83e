// ticketcore/src/access.rs

//! Role lookup. The core asks an external identity service which roles an
//! identity holds for an event and derives every permission from that closed
//! set; nothing is cached between calls.

use crate::error::CoreError;
use crate::model::{text_enum, Event, EventId, IdentityId};
use crate::store::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  EventManager,
  Scanner,
  OrgAdmin,
  PlatformAdmin,
}

text_enum!(Role, "role", {
  EventManager => "event_manager",
  Scanner => "scanner",
  OrgAdmin => "org_admin",
  PlatformAdmin => "platform_admin",
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn with(mut self, role: Role) -> Self {
    self.0.insert(role);
    self
  }

  pub fn insert(&mut self, role: Role) {
    self.0.insert(role);
  }

  pub fn contains(&self, role: Role) -> bool {
    self.0.contains(&role)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Door staff: managers and explicitly enabled scanners.
  pub fn can_scan(&self) -> bool {
    self.contains(Role::EventManager) || self.contains(Role::Scanner)
  }

  /// May initiate refunds and review refund requests.
  pub fn can_manage_refunds(&self) -> bool {
    self.contains(Role::EventManager) || self.contains(Role::OrgAdmin) || self.contains(Role::PlatformAdmin)
  }

  pub fn can_export_scans(&self) -> bool {
    self.can_manage_refunds()
  }
}

impl FromIterator<Role> for RoleSet {
  fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
    RoleSet(iter.into_iter().collect())
  }
}

#[async_trait]
pub trait AccessControl: Send + Sync {
  async fn roles_for(&self, identity: IdentityId, event_id: EventId) -> Result<RoleSet, StoreError>;
}

/// Roles of `identity` for `event`, with the event owner always counted as a
/// manager.
pub async fn effective_roles(
  access: &dyn AccessControl,
  identity: IdentityId,
  event: &Event,
) -> Result<RoleSet, CoreError> {
  let mut roles = access.roles_for(identity, event.id).await?;
  if event.owner_id == identity {
    roles.insert(Role::EventManager);
  }
  Ok(roles)
}
