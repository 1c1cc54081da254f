//! Access resolution.
//!
//! Pure functions of an [`Identity`] and that identity's membership rows.
//! Nothing here touches storage: callers load the memberships and hand
//! them in, so the same rules apply whichever repository backs them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{VaultError, VaultResult};
use crate::models::membership::Membership;
use crate::models::user::{Role, User};

/// A verified caller, as supplied by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
    pub managed_ous: BTreeSet<Uuid>,
    pub managed_divisions: BTreeSet<Uuid>,
}

impl Identity {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self {
            user_id,
            role,
            managed_ous: BTreeSet::new(),
            managed_divisions: BTreeSet::new(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            role: user.role,
            managed_ous: user.managed_ous.iter().copied().collect(),
            managed_divisions: user.managed_divisions.iter().copied().collect(),
        }
    }
}

/// The divisions and OUs a caller may read credentials from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadScope {
    Unrestricted,
    Restricted {
        division_ids: BTreeSet<Uuid>,
        ou_ids: BTreeSet<Uuid>,
    },
}

impl ReadScope {
    /// A credential filed under `(ou_id, division_id)` is visible when
    /// either its division or its OU is in scope.
    pub fn permits(&self, ou_id: Uuid, division_id: Uuid) -> bool {
        match self {
            ReadScope::Unrestricted => true,
            ReadScope::Restricted {
                division_ids,
                ou_ids,
            } => division_ids.contains(&division_id) || ou_ids.contains(&ou_id),
        }
    }

    pub fn contains_division(&self, division_id: Uuid) -> bool {
        match self {
            ReadScope::Unrestricted => true,
            ReadScope::Restricted { division_ids, .. } => division_ids.contains(&division_id),
        }
    }

    pub fn contains_ou(&self, ou_id: Uuid) -> bool {
        match self {
            ReadScope::Unrestricted => true,
            ReadScope::Restricted { ou_ids, .. } => ou_ids.contains(&ou_id),
        }
    }
}

/// Compute the read scope of `identity`.
///
/// Admins are unrestricted. Managers get their managed divisions and OUs
/// plus whatever their own memberships grant; plain users get only their
/// memberships. An empty result is [`VaultError::NoAccess`], never an
/// empty scope.
pub fn resolve_read_scope(
    identity: &Identity,
    memberships: &[Membership],
) -> VaultResult<ReadScope> {
    if identity.is_admin() {
        return Ok(ReadScope::Unrestricted);
    }

    let mut division_ids = BTreeSet::new();
    let mut ou_ids = BTreeSet::new();

    if identity.role == Role::Manager {
        division_ids.extend(identity.managed_divisions.iter().copied());
        ou_ids.extend(identity.managed_ous.iter().copied());
    }

    for membership in memberships
        .iter()
        .filter(|m| m.user_id() == identity.user_id)
    {
        ou_ids.insert(membership.ou_id());
        if let Some(division_id) = membership.division_id() {
            division_ids.insert(division_id);
        }
    }

    if division_ids.is_empty() && ou_ids.is_empty() {
        return Err(VaultError::NoAccess);
    }

    Ok(ReadScope::Restricted {
        division_ids,
        ou_ids,
    })
}

/// Placement of a credential, before and (optionally) after an update.
#[derive(Debug, Clone, Copy)]
pub struct CredentialPlacement {
    pub ou_id: Uuid,
    pub division_id: Uuid,
}

/// Check that `identity` may update a credential filed at `current` and,
/// if the update moves it, at `target`.
///
/// Only managers and admins may update. Admins skip the scope test;
/// managers must have every placement in their read scope.
pub fn authorize_credential_update(
    identity: &Identity,
    memberships: &[Membership],
    current: CredentialPlacement,
    target: Option<CredentialPlacement>,
) -> VaultResult<()> {
    match identity.role {
        Role::Admin => return Ok(()),
        Role::Manager => {}
        Role::User => {
            return Err(VaultError::denied(
                "only managers and admins may update credentials",
            ));
        }
    }

    let scope = match resolve_read_scope(identity, memberships) {
        Ok(scope) => scope,
        Err(VaultError::NoAccess) => {
            return Err(VaultError::denied("no managed or member scope"));
        }
        Err(other) => return Err(other),
    };

    for placement in std::iter::once(current).chain(target) {
        if !scope.permits(placement.ou_id, placement.division_id) {
            return Err(VaultError::denied(format!(
                "division {} of OU {} is outside your scope",
                placement.division_id, placement.ou_id
            )));
        }
    }

    Ok(())
}

/// Capability check for admin-only operations such as role assignment.
pub fn require_admin(identity: &Identity, action: &str) -> VaultResult<()> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(VaultError::denied(format!("{action} requires the admin role")))
    }
}

/// Capability check for operations open to managers and admins.
pub fn require_manager(identity: &Identity, action: &str) -> VaultResult<()> {
    match identity.role {
        Role::Admin | Role::Manager => Ok(()),
        Role::User => Err(VaultError::denied(format!(
            "{action} requires the manager or admin role"
        ))),
    }
}
