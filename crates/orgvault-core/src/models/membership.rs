//! Membership domain model.
//!
//! A membership grants a user read access to an OU, optionally narrowed
//! to one of its divisions. The two shapes are distinct variants so that
//! callers match on them instead of checking for a missing division.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{VaultError, VaultResult};
use crate::models::user::User;

/// Namespace for deterministic membership keys.
const MEMBERSHIP_NAMESPACE: Uuid = Uuid::from_u128(0x6f72_6776_6d65_6d62_6572_7368_6970_0001);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Membership {
    /// Member of an OU without a specific division.
    OuOnly {
        user_id: Uuid,
        ou_id: Uuid,
        assigned_at: DateTime<Utc>,
    },
    /// Member of a division. `ou_id` is always the division's owning OU.
    DivisionScoped {
        user_id: Uuid,
        ou_id: Uuid,
        division_id: Uuid,
        assigned_at: DateTime<Utc>,
    },
}

impl Membership {
    /// Rebuild a membership from its stored columns.
    pub fn from_parts(
        user_id: Uuid,
        ou_id: Uuid,
        division_id: Option<Uuid>,
        assigned_at: DateTime<Utc>,
    ) -> Self {
        match division_id {
            None => Membership::OuOnly {
                user_id,
                ou_id,
                assigned_at,
            },
            Some(division_id) => Membership::DivisionScoped {
                user_id,
                ou_id,
                division_id,
                assigned_at,
            },
        }
    }

    /// Check a division-scoped membership against the OU its division
    /// actually belongs to. OU-only memberships always pass.
    pub fn ensure_division_owner(&self, owner: Uuid) -> VaultResult<()> {
        match self {
            Membership::DivisionScoped {
                ou_id, division_id, ..
            } if *ou_id != owner => Err(VaultError::Internal(format!(
                "membership for division {division_id} records OU {ou_id} \
                 but the division belongs to {owner}"
            ))),
            _ => Ok(()),
        }
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            Membership::OuOnly { user_id, .. } | Membership::DivisionScoped { user_id, .. } => {
                *user_id
            }
        }
    }

    pub fn ou_id(&self) -> Uuid {
        match self {
            Membership::OuOnly { ou_id, .. } | Membership::DivisionScoped { ou_id, .. } => *ou_id,
        }
    }

    pub fn division_id(&self) -> Option<Uuid> {
        match self {
            Membership::OuOnly { .. } => None,
            Membership::DivisionScoped { division_id, .. } => Some(*division_id),
        }
    }

    pub fn assigned_at(&self) -> DateTime<Utc> {
        match self {
            Membership::OuOnly { assigned_at, .. }
            | Membership::DivisionScoped { assigned_at, .. } => *assigned_at,
        }
    }

    /// Storage key of this membership. See [`membership_key`].
    pub fn key(&self) -> Uuid {
        membership_key(self.user_id(), self.ou_id(), self.division_id())
    }
}

/// Deterministic key for the `(user, ou, division)` triple.
///
/// Two assignments of the same triple always map to the same key, which
/// lets the store reject the second insert atomically. OU-only rows use
/// no division component, so there is at most one per `(user, ou)`.
pub fn membership_key(user_id: Uuid, ou_id: Uuid, division_id: Option<Uuid>) -> Uuid {
    let name = match division_id {
        Some(division_id) => format!("{user_id}/{ou_id}/{division_id}"),
        None => format!("{user_id}/{ou_id}/-"),
    };
    Uuid::new_v5(&MEMBERSHIP_NAMESPACE, name.as_bytes())
}

/// A user together with everything they belong to and manage, for the
/// admin user listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOverview {
    pub user: User,
    pub memberships: Vec<MembershipDetail>,
    /// Names of the OUs in `user.managed_ous`, in the same order.
    pub managed_ou_names: Vec<String>,
}

/// A membership annotated with display data for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipDetail {
    pub membership: Membership,
    pub user_name: String,
    pub user_email: String,
    pub ou_name: String,
    pub division_name: Option<String>,
}
