//! SurrealDB implementation of [`MembershipRepository`].
//!
//! Each membership row is stored under a deterministic record id derived
//! from its `(user, ou, division)` triple (see [`membership_key`]). A second
//! `CREATE` for the same triple fails inside SurrealDB, so concurrent
//! assignments can never leave two rows behind. When a `CREATE` fails the
//! key is re-read to tell a duplicate apart from a storage failure.
//!
//! Inserts run in a transaction that first bumps the parent OU or
//! division, so they serialize against a delete of that parent.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use orgvault_core::error::{VaultError, VaultResult};
use orgvault_core::models::membership::{
    Membership, MembershipDetail, UserOverview, membership_key,
};
use orgvault_core::models::user::User;
use orgvault_core::repository::MembershipRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::{debug, info};
use uuid::Uuid;

use super::division::fetch_division;
use super::user::UserRow;
use super::{GUARDED_WRITE_ATTEMPTS, guarded, names_of, parse_uuid, record_exists};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct MembershipRow {
    user_id: String,
    ou_id: String,
    division_id: Option<String>,
    assigned_at: DateTime<Utc>,
}

impl MembershipRow {
    fn try_into_membership(self) -> Result<Membership, DbError> {
        let division_id = self
            .division_id
            .map(|id| parse_uuid("division", &id))
            .transpose()?;
        Ok(Membership::from_parts(
            parse_uuid("user", &self.user_id)?,
            parse_uuid("ou", &self.ou_id)?,
            division_id,
            self.assigned_at,
        ))
    }
}

#[derive(Debug, SurrealValue)]
struct UserSummaryRow {
    record_id: String,
    first_name: String,
    last_name: String,
    email: String,
}

#[derive(Debug, SurrealValue)]
struct DivisionOwnerRow {
    record_id: String,
    name: String,
    ou_id: String,
}

/// Result of an insert-if-absent.
enum Inserted {
    Created(Membership),
    AlreadyPresent(Membership),
}

/// SurrealDB implementation of the Membership repository.
#[derive(Clone)]
pub struct SurrealMembershipRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealMembershipRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn ensure_exists(&self, table: &'static str, id: Uuid) -> VaultResult<()> {
        if record_exists(&self.db, table, id).await? {
            Ok(())
        } else {
            Err(DbError::not_found(table, id).into())
        }
    }

    async fn fetch(&self, key: Uuid) -> VaultResult<Option<Membership>> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('membership', $key)")
            .bind(("key", key.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<MembershipRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(row.try_into_membership()?)),
            None => Ok(None),
        }
    }

    /// Insert the membership for the triple unless it already exists.
    ///
    /// Fails with `NotFound` when the parent (the division, or the OU for
    /// an OU-only row) is deleted first.
    async fn insert(
        &self,
        user_id: Uuid,
        ou_id: Uuid,
        division_id: Option<Uuid>,
    ) -> VaultResult<Inserted> {
        let key = membership_key(user_id, ou_id, division_id);
        let (parent_table, parent_id) = match division_id {
            Some(division_id) => ("division", division_id),
            None => ("ou", ou_id),
        };
        let query = guarded(
            "CREATE type::record('membership', $key) SET \
             user_id = $user_id, ou_id = $ou_id, division_id = $division_id;",
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .db
                .query(query.as_str())
                .bind(("parent_table", parent_table))
                .bind(("parent", parent_id.to_string()))
                .bind(("key", key.to_string()))
                .bind(("user_id", user_id.to_string()))
                .bind(("ou_id", ou_id.to_string()))
                .bind(("division_id", division_id.map(|id| id.to_string())))
                .await
                .map_err(DbError::from)?;

            let error = match result.check() {
                Ok(_) => {
                    let membership = self
                        .fetch(key)
                        .await?
                        .ok_or_else(|| DbError::not_found("membership", key))?;
                    return Ok(Inserted::Created(membership));
                }
                Err(e) => e,
            };

            if let Some(existing) = self.fetch(key).await? {
                debug!(%user_id, %ou_id, ?division_id, "Membership already present");
                return Ok(Inserted::AlreadyPresent(existing));
            }
            self.ensure_exists(parent_table, parent_id).await?;
            if attempt >= GUARDED_WRITE_ATTEMPTS {
                return Err(DbError::Query(error.to_string()).into());
            }
            debug!(attempt, %error, "Membership insert conflicted, retrying");
        }
    }

    /// Attach display data to raw membership rows.
    ///
    /// A division-scoped row whose division now belongs to another OU
    /// fails the whole listing with `Internal`.
    async fn annotate(&self, memberships: Vec<Membership>) -> VaultResult<Vec<MembershipDetail>> {
        let ou_ids: Vec<String> = memberships.iter().map(|m| m.ou_id().to_string()).collect();
        let division_ids: Vec<String> = memberships
            .iter()
            .filter_map(|m| m.division_id().map(|id| id.to_string()))
            .collect();
        let user_ids: Vec<String> = memberships
            .iter()
            .map(|m| m.user_id().to_string())
            .collect();

        let ou_names = names_of(&self.db, "ou", ou_ids).await?;
        let divisions = self.division_owners(division_ids).await?;
        let users = self.user_summaries(user_ids).await?;

        memberships
            .into_iter()
            .map(|membership| {
                let division_name = match membership.division_id() {
                    Some(division_id) => match divisions.get(&division_id) {
                        Some((name, owner)) => {
                            membership.ensure_division_owner(*owner)?;
                            Some(name.clone())
                        }
                        None => None,
                    },
                    None => None,
                };
                let (user_name, user_email) = users
                    .get(&membership.user_id().to_string())
                    .cloned()
                    .unwrap_or_default();
                let ou_name = ou_names
                    .get(&membership.ou_id().to_string())
                    .cloned()
                    .unwrap_or_default();
                Ok(MembershipDetail {
                    membership,
                    user_name,
                    user_email,
                    ou_name,
                    division_name,
                })
            })
            .collect()
    }

    /// Name and owning OU of each division, keyed by division id.
    async fn division_owners(
        &self,
        ids: Vec<String>,
    ) -> Result<HashMap<Uuid, (String, Uuid)>, DbError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, name, ou_id FROM division \
                 WHERE meta::id(id) IN $ids",
            )
            .bind(("ids", ids))
            .await?;
        let rows: Vec<DivisionOwnerRow> = result.take(0)?;

        rows.into_iter()
            .map(|row| {
                Ok((
                    parse_uuid("division", &row.record_id)?,
                    (row.name, parse_uuid("ou", &row.ou_id)?),
                ))
            })
            .collect()
    }

    async fn user_summaries(
        &self,
        ids: Vec<String>,
    ) -> VaultResult<HashMap<String, (String, String)>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, first_name, last_name, email \
                 FROM user WHERE meta::id(id) IN $ids",
            )
            .bind(("ids", ids))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<UserSummaryRow> = result.take(0).map_err(DbError::from)?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.record_id,
                    (format!("{} {}", r.first_name, r.last_name), r.email),
                )
            })
            .collect())
    }

    /// Apply a single set expression to `managed_ous`.
    async fn update_managed_ous(&self, user_id: Uuid, ou_id: Uuid, expr: &str) -> VaultResult<User> {
        let query = format!(
            "UPDATE type::record('user', $id) SET managed_ous = {expr}, \
             updated_at = time::now()"
        );

        let result = self
            .db
            .query(query)
            .bind(("id", user_id.to_string()))
            .bind(("ou_id", ou_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("user", user_id))?;
        Ok(row.into_user(user_id)?)
    }

    async fn select_where(
        &self,
        query: &str,
        field: &'static str,
        value: impl Into<String>,
    ) -> VaultResult<Vec<Membership>> {
        let mut result = self
            .db
            .query(query)
            .bind((field, value.into()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<MembershipRow> = result.take(0).map_err(DbError::from)?;
        let memberships = rows
            .into_iter()
            .map(MembershipRow::try_into_membership)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(memberships)
    }
}

impl<C: Connection> MembershipRepository for SurrealMembershipRepository<C> {
    async fn assign_division(&self, user_id: Uuid, division_id: Uuid) -> VaultResult<Membership> {
        self.ensure_exists("user", user_id).await?;
        let division = fetch_division(&self.db, division_id)
            .await?
            .ok_or_else(|| DbError::not_found("division", division_id))?;

        match self
            .insert(user_id, division.ou_id, Some(division.id))
            .await?
        {
            Inserted::Created(membership) => {
                info!(%user_id, %division_id, ou_id = %division.ou_id, "User added to division");
                Ok(membership)
            }
            Inserted::AlreadyPresent(_) => Err(VaultError::DuplicateMembership {
                user_id: user_id.to_string(),
                target: format!("division {}", division.name),
            }),
        }
    }

    async fn revoke_division(&self, user_id: Uuid, division_id: Uuid) -> VaultResult<()> {
        let mut result = self
            .db
            .query(
                "DELETE membership WHERE \
                 user_id = $user_id AND division_id = $division_id \
                 RETURN BEFORE",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("division_id", division_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let removed: Vec<MembershipRow> = result.take(0).map_err(DbError::from)?;
        if removed.is_empty() {
            return Err(VaultError::not_found(
                "membership",
                format!("user={user_id} division={division_id}"),
            ));
        }

        info!(%user_id, %division_id, "User removed from division");
        Ok(())
    }

    async fn assign_manager(&self, user_id: Uuid, ou_id: Uuid) -> VaultResult<User> {
        self.ensure_exists("user", user_id).await?;

        // The OU row goes in first: once it exists the OU cannot be
        // deleted underneath the manager entry.
        if let Inserted::Created(_) = self.insert(user_id, ou_id, None).await? {
            debug!(%user_id, %ou_id, "OU membership added for manager");
        }

        let user = self
            .update_managed_ous(user_id, ou_id, "array::union(managed_ous, [$ou_id])")
            .await?;

        info!(%user_id, %ou_id, "OU manager assigned");
        Ok(user)
    }

    async fn revoke_manager(&self, user_id: Uuid, ou_id: Uuid) -> VaultResult<User> {
        self.ensure_exists("user", user_id).await?;

        // The OU-only membership row is left in place.
        let user = self
            .update_managed_ous(user_id, ou_id, "array::complement(managed_ous, [$ou_id])")
            .await?;

        info!(%user_id, %ou_id, "OU manager revoked");
        Ok(user)
    }

    async fn assign_ou_member(&self, user_id: Uuid, ou_id: Uuid) -> VaultResult<Membership> {
        self.ensure_exists("user", user_id).await?;

        match self.insert(user_id, ou_id, None).await? {
            Inserted::Created(membership) => {
                info!(%user_id, %ou_id, "User added as OU member");
                Ok(membership)
            }
            Inserted::AlreadyPresent(_) => Err(VaultError::DuplicateMembership {
                user_id: user_id.to_string(),
                target: format!("OU {ou_id}"),
            }),
        }
    }

    async fn revoke_ou_member(&self, user_id: Uuid, ou_id: Uuid) -> VaultResult<()> {
        let key = membership_key(user_id, ou_id, None);

        let mut result = self
            .db
            .query("DELETE type::record('membership', $key) RETURN BEFORE")
            .bind(("key", key.to_string()))
            .await
            .map_err(DbError::from)?;

        let removed: Vec<MembershipRow> = result.take(0).map_err(DbError::from)?;
        if removed.is_empty() {
            return Err(VaultError::not_found(
                "membership",
                format!("user={user_id} ou={ou_id}"),
            ));
        }

        info!(%user_id, %ou_id, "User removed as OU member");
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> VaultResult<Vec<Membership>> {
        self.select_where(
            "SELECT * FROM membership WHERE user_id = $user_id \
             ORDER BY assigned_at ASC",
            "user_id",
            user_id.to_string(),
        )
        .await
    }

    async fn memberships_of(&self, user_id: Uuid) -> VaultResult<Vec<MembershipDetail>> {
        let memberships = self.list_for_user(user_id).await?;
        self.annotate(memberships).await
    }

    async fn members_of(&self, division_id: Uuid) -> VaultResult<Vec<MembershipDetail>> {
        let memberships = self
            .select_where(
                "SELECT * FROM membership WHERE division_id = $division_id \
                 ORDER BY assigned_at ASC",
                "division_id",
                division_id.to_string(),
            )
            .await?;
        self.annotate(memberships).await
    }

    async fn user_overviews(&self, users: Vec<User>) -> VaultResult<Vec<UserOverview>> {
        if users.is_empty() {
            return Ok(Vec::new());
        }

        let user_ids: Vec<String> = users.iter().map(|u| u.id.to_string()).collect();
        let mut result = self
            .db
            .query(
                "SELECT * FROM membership WHERE user_id IN $user_ids \
                 ORDER BY assigned_at ASC",
            )
            .bind(("user_ids", user_ids))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<MembershipRow> = result.take(0).map_err(DbError::from)?;
        let memberships = rows
            .into_iter()
            .map(MembershipRow::try_into_membership)
            .collect::<Result<Vec<_>, DbError>>()?;

        let mut by_user: HashMap<Uuid, Vec<MembershipDetail>> = HashMap::new();
        for detail in self.annotate(memberships).await? {
            by_user
                .entry(detail.membership.user_id())
                .or_default()
                .push(detail);
        }

        let managed: Vec<String> = users
            .iter()
            .flat_map(|u| u.managed_ous.iter().map(Uuid::to_string))
            .collect();
        let ou_names = names_of(&self.db, "ou", managed).await?;

        Ok(users
            .into_iter()
            .map(|user| {
                let managed_ou_names = user
                    .managed_ous
                    .iter()
                    .filter_map(|id| ou_names.get(&id.to_string()).cloned())
                    .collect();
                UserOverview {
                    memberships: by_user.remove(&user.id).unwrap_or_default(),
                    managed_ou_names,
                    user,
                }
            })
            .collect())
    }
}
