//! SurrealDB implementation of [`DivisionRepository`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use orgvault_core::error::{VaultError, VaultResult};
use orgvault_core::models::division::{CreateDivision, Division};
use orgvault_core::models::normalize_name;
use orgvault_core::repository::DivisionRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::{debug, info};
use uuid::Uuid;

use super::ou::fetch_ou;
use super::{
    CountRow, GUARDED_WRITE_ATTEMPTS, ManagerIndex, guarded, names_of, parse_uuid, record_exists,
    total,
};
use crate::error::DbError;

/// Same contract as the OU delete: nothing may refer to the division, and
/// it leaves every `managed_divisions` list.
const DELETE_DIVISION: &str = "\
BEGIN TRANSACTION;
LET $dependents = array::len((SELECT VALUE id FROM membership WHERE division_id = $id))
    + array::len((SELECT VALUE id FROM credential WHERE division_id = $id));
IF $dependents > 0 {
    THROW 'division still has dependents';
};
DELETE type::record('division', $id);
UPDATE user SET
    managed_divisions = array::complement(managed_divisions, [$id]),
    updated_at = time::now()
    WHERE managed_divisions CONTAINS $id;
COMMIT TRANSACTION;
";

#[derive(Debug, SurrealValue)]
struct DivisionRow {
    ou_id: String,
    name: String,
    normalized_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DivisionRow {
    fn try_into_division(self, id: Uuid, ou_name: String) -> Result<Division, DbError> {
        Ok(Division {
            id,
            ou_id: parse_uuid("ou", &self.ou_id)?,
            ou_name,
            name: self.name,
            normalized_name: self.normalized_name,
            managers: Vec::new(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct DivisionRowWithId {
    record_id: String,
    ou_id: String,
    name: String,
    normalized_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Fetch a division joined with its OU name, if it exists.
pub(super) async fn fetch_division<C: Connection>(
    db: &Surreal<C>,
    id: Uuid,
) -> Result<Option<Division>, DbError> {
    let mut result = db
        .query("SELECT * FROM type::record('division', $id)")
        .bind(("id", id.to_string()))
        .await?;
    let rows: Vec<DivisionRow> = result.take(0)?;
    let Some(row) = rows.into_iter().next() else {
        return Ok(None);
    };

    let ou_name = names_of(db, "ou", vec![row.ou_id.clone()])
        .await?
        .remove(&row.ou_id)
        .unwrap_or_default();
    row.try_into_division(id, ou_name).map(Some)
}

/// SurrealDB implementation of the Division repository.
#[derive(Clone)]
pub struct SurrealDivisionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealDivisionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Describe what still refers to the division, if anything does.
    async fn dependents(&self, id: &str) -> Result<Option<String>, DbError> {
        let mut counts = self
            .db
            .query(
                "SELECT count() AS total FROM membership \
                 WHERE division_id = $id GROUP ALL; \
                 SELECT count() AS total FROM credential \
                 WHERE division_id = $id GROUP ALL;",
            )
            .bind(("id", id.to_string()))
            .await?;

        let memberships = total(counts.take(0)?);
        let credentials = total(counts.take(1)?);

        Ok((memberships + credentials > 0)
            .then(|| format!("{memberships} membership(s), {credentials} credential(s)")))
    }

    async fn name_taken(&self, ou_id: &str, normalized_name: &str) -> Result<bool, DbError> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM division \
                 WHERE ou_id = $ou_id AND normalized_name = $normalized_name \
                 GROUP ALL",
            )
            .bind(("ou_id", ou_id.to_string()))
            .bind(("normalized_name", normalized_name.to_string()))
            .await?;
        let rows: Vec<CountRow> = result.take(0)?;
        Ok(total(rows) > 0)
    }

    async fn list_where(&self, ou_id: Option<Uuid>) -> VaultResult<Vec<Division>> {
        let query = if ou_id.is_some() {
            "SELECT meta::id(id) AS record_id, * FROM division \
             WHERE ou_id = $ou_id ORDER BY created_at ASC"
        } else {
            "SELECT meta::id(id) AS record_id, * FROM division \
             ORDER BY created_at ASC"
        };

        let mut result = self
            .db
            .query(query)
            .bind(("ou_id", ou_id.map(|id| id.to_string())))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<DivisionRowWithId> = result.take(0).map_err(DbError::from)?;

        let ou_ids: Vec<String> = rows.iter().map(|r| r.ou_id.clone()).collect();
        let ou_names: HashMap<String, String> = names_of(&self.db, "ou", ou_ids).await?;
        let managers = ManagerIndex::load(&self.db).await?;

        let divisions = rows
            .into_iter()
            .map(|row| {
                let id = parse_uuid("division", &row.record_id)?;
                Ok(Division {
                    id,
                    ou_id: parse_uuid("ou", &row.ou_id)?,
                    ou_name: ou_names.get(&row.ou_id).cloned().unwrap_or_default(),
                    name: row.name,
                    normalized_name: row.normalized_name,
                    managers: managers.division_managers(id),
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                })
            })
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(divisions)
    }
}

impl<C: Connection> DivisionRepository for SurrealDivisionRepository<C> {
    async fn create(&self, input: CreateDivision) -> VaultResult<Division> {
        let name = input.name.trim().to_string();
        let normalized_name = normalize_name(&name);
        if normalized_name.is_empty() {
            return Err(VaultError::validation("division name is required"));
        }

        let ou = fetch_ou(&self.db, input.ou_id)
            .await?
            .ok_or_else(|| DbError::not_found("ou", input.ou_id))?;
        let ou_id_str = ou.id.to_string();

        let duplicate = || VaultError::DuplicateName {
            entity: "Division".into(),
            name: format!("{}/{}", ou.name, name),
        };

        if self.name_taken(&ou_id_str, &normalized_name).await? {
            return Err(duplicate());
        }

        let id = Uuid::new_v4();
        let query = guarded(
            "CREATE type::record('division', $id) SET \
             ou_id = $ou_id, name = $name, normalized_name = $normalized_name;",
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .db
                .query(query.as_str())
                .bind(("parent_table", "ou"))
                .bind(("parent", ou_id_str.clone()))
                .bind(("id", id.to_string()))
                .bind(("ou_id", ou_id_str.clone()))
                .bind(("name", name.clone()))
                .bind(("normalized_name", normalized_name.clone()))
                .await
                .map_err(DbError::from)?;

            let error = match result.check() {
                Ok(_) => {
                    let division = fetch_division(&self.db, id)
                        .await?
                        .ok_or_else(|| DbError::not_found("division", id))?;
                    info!(
                        division_id = %id,
                        ou_id = %ou.id,
                        name = %division.name,
                        "Division created"
                    );
                    return Ok(division);
                }
                Err(e) => e,
            };

            if self.name_taken(&ou_id_str, &normalized_name).await? {
                return Err(duplicate());
            }
            if !record_exists(&self.db, "ou", ou.id).await? {
                return Err(DbError::not_found("ou", ou.id).into());
            }
            if attempt >= GUARDED_WRITE_ATTEMPTS {
                return Err(DbError::Query(error.to_string()).into());
            }
            debug!(attempt, %error, "Division create conflicted, retrying");
        }
    }

    async fn get_by_id(&self, id: Uuid) -> VaultResult<Division> {
        let mut division = fetch_division(&self.db, id)
            .await?
            .ok_or_else(|| DbError::not_found("division", id))?;
        division.managers = ManagerIndex::load(&self.db)
            .await?
            .division_managers(id);
        Ok(division)
    }

    async fn list(&self) -> VaultResult<Vec<Division>> {
        self.list_where(None).await
    }

    async fn list_by_ou(&self, ou_id: Uuid) -> VaultResult<Vec<Division>> {
        self.list_where(Some(ou_id)).await
    }

    async fn delete(&self, id: Uuid) -> VaultResult<()> {
        let id_str = id.to_string();

        if fetch_division(&self.db, id).await?.is_none() {
            return Err(DbError::not_found("division", id).into());
        }

        let result = self
            .db
            .query(DELETE_DIVISION)
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        if let Err(e) = result.check() {
            if let Some(dependents) = self.dependents(&id_str).await? {
                return Err(VaultError::InUse {
                    entity: "Division".into(),
                    id: id_str,
                    dependents,
                });
            }
            if fetch_division(&self.db, id).await?.is_none() {
                return Err(DbError::not_found("division", id).into());
            }
            return Err(DbError::Query(e.to_string()).into());
        }

        info!(division_id = %id, "Division deleted");
        Ok(())
    }
}
