//! SurrealDB implementation of [`CredentialRepository`].

use chrono::{DateTime, Utc};
use orgvault_core::access::ReadScope;
use orgvault_core::error::{VaultError, VaultResult};
use orgvault_core::models::credential::{CreateCredential, Credential, UpdateCredential};
use orgvault_core::repository::CredentialRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::{debug, info};
use uuid::Uuid;

use super::division::fetch_division;
use super::{GUARDED_WRITE_ATTEMPTS, guarded, parse_uuid};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct CredentialRow {
    ou_id: String,
    division_id: String,
    name: String,
    username: String,
    secret: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CredentialRow {
    fn try_into_credential(self, id: Uuid) -> Result<Credential, DbError> {
        Ok(Credential {
            id,
            ou_id: parse_uuid("ou", &self.ou_id)?,
            division_id: parse_uuid("division", &self.division_id)?,
            name: self.name,
            username: self.username,
            secret: self.secret,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct CredentialRowWithId {
    record_id: String,
    ou_id: String,
    division_id: String,
    name: String,
    username: String,
    secret: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CredentialRowWithId {
    fn try_into_credential(self) -> Result<Credential, DbError> {
        let id = parse_uuid("credential", &self.record_id)?;
        CredentialRow {
            ou_id: self.ou_id,
            division_id: self.division_id,
            name: self.name,
            username: self.username,
            secret: self.secret,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .try_into_credential(id)
    }
}

/// SurrealDB implementation of the Credential repository.
#[derive(Clone)]
pub struct SurrealCredentialRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCredentialRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// The division must exist and belong to `ou_id`.
    async fn check_placement(&self, ou_id: Uuid, division_id: Uuid) -> VaultResult<()> {
        match fetch_division(&self.db, division_id).await? {
            Some(division) if division.ou_id == ou_id => Ok(()),
            Some(_) => Err(VaultError::validation(
                "division does not belong to the given OU",
            )),
            None => Err(VaultError::validation("division does not exist")),
        }
    }

    async fn fetch(&self, id: Uuid) -> VaultResult<Credential> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('credential', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CredentialRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("credential", id))?;
        Ok(row.try_into_credential(id)?)
    }
}

impl<C: Connection> CredentialRepository for SurrealCredentialRepository<C> {
    async fn create(&self, input: CreateCredential) -> VaultResult<Credential> {
        input.validate()?;
        self.check_placement(input.ou_id, input.division_id).await?;

        let id = Uuid::new_v4();
        let name = input.name.trim().to_string();
        let username = input.username.trim().to_string();
        let query = guarded(
            "CREATE type::record('credential', $id) SET \
             ou_id = $ou_id, division_id = $division_id, \
             name = $name, username = $username, \
             secret = $secret, notes = $notes;",
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .db
                .query(query.as_str())
                .bind(("parent_table", "division"))
                .bind(("parent", input.division_id.to_string()))
                .bind(("id", id.to_string()))
                .bind(("ou_id", input.ou_id.to_string()))
                .bind(("division_id", input.division_id.to_string()))
                .bind(("name", name.clone()))
                .bind(("username", username.clone()))
                .bind(("secret", input.secret.clone()))
                .bind(("notes", input.notes.clone()))
                .await
                .map_err(DbError::from)?;

            let error = match result.check() {
                Ok(_) => break,
                Err(e) => e,
            };

            self.check_placement(input.ou_id, input.division_id).await?;
            if attempt >= GUARDED_WRITE_ATTEMPTS {
                return Err(DbError::Query(error.to_string()).into());
            }
            debug!(attempt, %error, "Credential create conflicted, retrying");
        }

        info!(
            credential_id = %id,
            ou_id = %input.ou_id,
            division_id = %input.division_id,
            "Credential created"
        );
        self.fetch(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> VaultResult<Credential> {
        self.fetch(id).await
    }

    async fn update(&self, id: Uuid, input: UpdateCredential) -> VaultResult<Credential> {
        let input = input.normalized()?;
        let current = self.fetch(id).await?;

        let moves = input.moves();
        let target_ou = input.ou_id.unwrap_or(current.ou_id);
        let target_division = input.division_id.unwrap_or(current.division_id);
        if moves {
            self.check_placement(target_ou, target_division).await?;
        }

        let mut sets = Vec::new();
        if input.ou_id.is_some() {
            sets.push("ou_id = $ou_id");
        }
        if input.division_id.is_some() {
            sets.push("division_id = $division_id");
        }
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.username.is_some() {
            sets.push("username = $username");
        }
        if input.secret.is_some() {
            sets.push("secret = $secret");
        }
        match &input.notes {
            Some(Some(_)) => sets.push("notes = $notes"),
            Some(None) => sets.push("notes = NONE"),
            None => {}
        }
        sets.push("updated_at = time::now()");

        let body = format!(
            "UPDATE type::record('credential', $id) SET {};",
            sets.join(", ")
        );
        // A move lands beneath another division, so it is guarded like a
        // create.
        let query = if moves { guarded(&body) } else { body };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut builder = self.db.query(query.as_str()).bind(("id", id.to_string()));

            if moves {
                builder = builder
                    .bind(("parent_table", "division"))
                    .bind(("parent", target_division.to_string()));
            }
            if let Some(ou_id) = input.ou_id {
                builder = builder.bind(("ou_id", ou_id.to_string()));
            }
            if let Some(division_id) = input.division_id {
                builder = builder.bind(("division_id", division_id.to_string()));
            }
            if let Some(name) = &input.name {
                builder = builder.bind(("name", name.trim().to_string()));
            }
            if let Some(username) = &input.username {
                builder = builder.bind(("username", username.trim().to_string()));
            }
            if let Some(secret) = &input.secret {
                builder = builder.bind(("secret", secret.clone()));
            }
            if let Some(Some(notes)) = &input.notes {
                builder = builder.bind(("notes", notes.clone()));
            }

            let error = match builder.await.map_err(DbError::from)?.check() {
                Ok(_) => break,
                Err(e) => e,
            };

            if !moves || attempt >= GUARDED_WRITE_ATTEMPTS {
                return Err(DbError::Query(error.to_string()).into());
            }
            self.check_placement(target_ou, target_division).await?;
            debug!(attempt, %error, "Credential move conflicted, retrying");
        }

        info!(credential_id = %id, "Credential updated");
        self.fetch(id).await
    }

    async fn list(&self, scope: &ReadScope) -> VaultResult<Vec<Credential>> {
        let mut result = match scope {
            ReadScope::Unrestricted => self
                .db
                .query(
                    "SELECT meta::id(id) AS record_id, * FROM credential \
                     ORDER BY created_at ASC",
                )
                .await
                .map_err(DbError::from)?,
            ReadScope::Restricted {
                division_ids,
                ou_ids,
            } => {
                let division_ids: Vec<String> =
                    division_ids.iter().map(Uuid::to_string).collect();
                let ou_ids: Vec<String> = ou_ids.iter().map(Uuid::to_string).collect();
                self.db
                    .query(
                        "SELECT meta::id(id) AS record_id, * FROM credential \
                         WHERE division_id IN $division_ids OR ou_id IN $ou_ids \
                         ORDER BY created_at ASC",
                    )
                    .bind(("division_ids", division_ids))
                    .bind(("ou_ids", ou_ids))
                    .await
                    .map_err(DbError::from)?
            }
        };

        let rows: Vec<CredentialRowWithId> = result.take(0).map_err(DbError::from)?;
        let credentials = rows
            .into_iter()
            .map(|row| row.try_into_credential())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(credentials)
    }
}
