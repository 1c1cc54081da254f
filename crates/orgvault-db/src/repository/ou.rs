//! SurrealDB implementation of [`OuRepository`].

use chrono::{DateTime, Utc};
use orgvault_core::error::{VaultError, VaultResult};
use orgvault_core::models::normalize_name;
use orgvault_core::models::ou::{CreateOrganisationalUnit, OrganisationalUnit};
use orgvault_core::repository::OuRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use uuid::Uuid;

use super::{CountRow, ManagerIndex, parse_uuid, total};
use crate::error::DbError;

/// Deletes an OU only while nothing refers to it, and drops it from every
/// manager list. Writers beneath the OU bump its `revision` in their own
/// transaction, so they conflict with this one instead of slipping past
/// the dependents check.
const DELETE_OU: &str = "\
BEGIN TRANSACTION;
LET $dependents = array::len((SELECT VALUE id FROM division WHERE ou_id = $id))
    + array::len((SELECT VALUE id FROM membership WHERE ou_id = $id))
    + array::len((SELECT VALUE id FROM credential WHERE ou_id = $id));
IF $dependents > 0 {
    THROW 'ou still has dependents';
};
DELETE type::record('ou', $id);
UPDATE user SET
    managed_ous = array::complement(managed_ous, [$id]),
    updated_at = time::now()
    WHERE managed_ous CONTAINS $id;
COMMIT TRANSACTION;
";

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct OuRow {
    name: String,
    normalized_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OuRow {
    fn into_ou(self, id: Uuid, managers: Vec<Uuid>) -> OrganisationalUnit {
        OrganisationalUnit {
            id,
            name: self.name,
            normalized_name: self.normalized_name,
            managers,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct OuRowWithId {
    record_id: String,
    name: String,
    normalized_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Fetch the stored row of an OU, if it exists.
pub(super) async fn fetch_ou<C: Connection>(
    db: &Surreal<C>,
    id: Uuid,
) -> Result<Option<OrganisationalUnit>, DbError> {
    let mut result = db
        .query("SELECT * FROM type::record('ou', $id)")
        .bind(("id", id.to_string()))
        .await?;
    let rows: Vec<OuRow> = result.take(0)?;
    Ok(rows.into_iter().next().map(|row| row.into_ou(id, Vec::new())))
}

/// SurrealDB implementation of the OU repository.
#[derive(Clone)]
pub struct SurrealOuRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealOuRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Describe what still refers to the OU, if anything does.
    async fn dependents(&self, id: &str) -> Result<Option<String>, DbError> {
        let mut counts = self
            .db
            .query(
                "SELECT count() AS total FROM division \
                 WHERE ou_id = $id GROUP ALL; \
                 SELECT count() AS total FROM membership \
                 WHERE ou_id = $id GROUP ALL; \
                 SELECT count() AS total FROM credential \
                 WHERE ou_id = $id GROUP ALL;",
            )
            .bind(("id", id.to_string()))
            .await?;

        let divisions = total(counts.take(0)?);
        let memberships = total(counts.take(1)?);
        let credentials = total(counts.take(2)?);

        Ok((divisions + memberships + credentials > 0).then(|| {
            format!(
                "{divisions} division(s), {memberships} membership(s), \
                 {credentials} credential(s)"
            )
        }))
    }

    async fn name_taken(&self, normalized_name: &str) -> Result<bool, DbError> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM ou \
                 WHERE normalized_name = $normalized_name GROUP ALL",
            )
            .bind(("normalized_name", normalized_name.to_string()))
            .await?;
        let rows: Vec<CountRow> = result.take(0)?;
        Ok(total(rows) > 0)
    }
}

impl<C: Connection> OuRepository for SurrealOuRepository<C> {
    async fn create(&self, input: CreateOrganisationalUnit) -> VaultResult<OrganisationalUnit> {
        let name = input.name.trim().to_string();
        let normalized_name = normalize_name(&name);
        if normalized_name.is_empty() {
            return Err(VaultError::validation("OU name is required"));
        }

        let duplicate = || VaultError::DuplicateName {
            entity: "OU".into(),
            name: name.clone(),
        };

        if self.name_taken(&normalized_name).await? {
            return Err(duplicate());
        }

        let id = Uuid::new_v4();
        let result = self
            .db
            .query(
                "CREATE type::record('ou', $id) SET \
                 name = $name, normalized_name = $normalized_name",
            )
            .bind(("id", id.to_string()))
            .bind(("name", name.clone()))
            .bind(("normalized_name", normalized_name.clone()))
            .await
            .map_err(DbError::from)?;

        // A concurrent create may win the unique index between the check
        // above and this insert.
        let mut result = match result.check() {
            Ok(result) => result,
            Err(e) => {
                if self.name_taken(&normalized_name).await? {
                    return Err(duplicate());
                }
                return Err(DbError::Query(e.to_string()).into());
            }
        };

        let rows: Vec<OuRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("ou", id))?;

        info!(ou_id = %id, name = %row.name, "OU created");
        Ok(row.into_ou(id, Vec::new()))
    }

    async fn get_by_id(&self, id: Uuid) -> VaultResult<OrganisationalUnit> {
        let mut ou = fetch_ou(&self.db, id)
            .await?
            .ok_or_else(|| DbError::not_found("ou", id))?;
        ou.managers = ManagerIndex::load(&self.db).await?.ou_managers(id);
        Ok(ou)
    }

    async fn list(&self) -> VaultResult<Vec<OrganisationalUnit>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM ou \
                 ORDER BY created_at ASC",
            )
            .await
            .map_err(DbError::from)?;
        let rows: Vec<OuRowWithId> = result.take(0).map_err(DbError::from)?;
        let managers = ManagerIndex::load(&self.db).await?;

        let ous = rows
            .into_iter()
            .map(|row| {
                let id = parse_uuid("ou", &row.record_id)?;
                Ok(OrganisationalUnit {
                    id,
                    name: row.name,
                    normalized_name: row.normalized_name,
                    managers: managers.ou_managers(id),
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                })
            })
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(ous)
    }

    async fn delete(&self, id: Uuid) -> VaultResult<()> {
        let id_str = id.to_string();

        if fetch_ou(&self.db, id).await?.is_none() {
            return Err(DbError::not_found("ou", id).into());
        }

        let result = self
            .db
            .query(DELETE_OU)
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        if let Err(e) = result.check() {
            if let Some(dependents) = self.dependents(&id_str).await? {
                return Err(VaultError::InUse {
                    entity: "OU".into(),
                    id: id_str,
                    dependents,
                });
            }
            if fetch_ou(&self.db, id).await?.is_none() {
                return Err(DbError::not_found("ou", id).into());
            }
            return Err(DbError::Query(e.to_string()).into());
        }

        info!(ou_id = %id, "OU deleted");
        Ok(())
    }
}
