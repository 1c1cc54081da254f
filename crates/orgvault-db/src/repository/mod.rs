//! SurrealDB repository implementations.

mod credential;
mod division;
mod membership;
mod ou;
mod user;

use std::collections::HashMap;

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

pub use credential::SurrealCredentialRepository;
pub use division::SurrealDivisionRepository;
pub use membership::SurrealMembershipRepository;
pub use ou::SurrealOuRepository;
pub use user::SurrealUserRepository;

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn total(rows: Vec<CountRow>) -> u64 {
    rows.first().map(|r| r.total).unwrap_or(0)
}

/// Statement prefix for a write beneath `$parent_table:$parent`.
///
/// Aborts when the parent is gone and otherwise bumps its `revision`, so
/// the write and a concurrent delete of the parent touch the same row and
/// cannot both commit.
const GUARD_PARENT: &str = "\
BEGIN TRANSACTION;
IF array::len((SELECT VALUE id FROM type::record($parent_table, $parent))) = 0 {
    THROW 'parent record is gone';
};
UPDATE type::record($parent_table, $parent) SET revision += 1;
";

/// Tries for a guarded write. Writers under the same parent conflict on
/// its `revision` and the loser retries.
const GUARDED_WRITE_ATTEMPTS: u32 = 5;

/// Wrap `body` in a transaction guarded by [`GUARD_PARENT`].
fn guarded(body: &str) -> String {
    format!("{GUARD_PARENT}{body}\nCOMMIT TRANSACTION;")
}

async fn record_exists<C: Connection>(
    db: &Surreal<C>,
    table: &'static str,
    id: Uuid,
) -> Result<bool, DbError> {
    let mut result = db
        .query(
            "SELECT count() AS total FROM type::table($table) \
             WHERE id = type::record($table, $id) GROUP ALL",
        )
        .bind(("table", table))
        .bind(("id", id.to_string()))
        .await?;
    let rows: Vec<CountRow> = result.take(0)?;
    Ok(total(rows) > 0)
}

fn parse_uuid(what: &str, value: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::Decode(format!("invalid {what} UUID: {e}")))
}

fn parse_uuids(what: &str, values: &[String]) -> Result<Vec<Uuid>, DbError> {
    values.iter().map(|v| parse_uuid(what, v)).collect()
}

#[derive(Debug, SurrealValue)]
struct NameRow {
    record_id: String,
    name: String,
}

/// Display names of the given records of `table`, keyed by record id.
async fn names_of<C: Connection>(
    db: &Surreal<C>,
    table: &'static str,
    ids: Vec<String>,
) -> Result<HashMap<String, String>, DbError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut result = db
        .query(
            "SELECT meta::id(id) AS record_id, name FROM type::table($table) \
             WHERE meta::id(id) IN $ids",
        )
        .bind(("table", table))
        .bind(("ids", ids))
        .await?;

    let rows: Vec<NameRow> = result.take(0)?;
    Ok(rows.into_iter().map(|r| (r.record_id, r.name)).collect())
}

#[derive(Debug, SurrealValue)]
struct ManagerRow {
    record_id: String,
    managed_ous: Vec<String>,
    managed_divisions: Vec<String>,
}

/// Manager user ids per OU and per division, derived from users'
/// `managed_ous` / `managed_divisions`.
#[derive(Debug, Default)]
struct ManagerIndex {
    by_ou: HashMap<Uuid, Vec<Uuid>>,
    by_division: HashMap<Uuid, Vec<Uuid>>,
}

impl ManagerIndex {
    async fn load<C: Connection>(db: &Surreal<C>) -> Result<Self, DbError> {
        let mut result = db
            .query(
                "SELECT meta::id(id) AS record_id, managed_ous, managed_divisions \
                 FROM user \
                 WHERE array::len(managed_ous) > 0 \
                 OR array::len(managed_divisions) > 0",
            )
            .await?;
        let rows: Vec<ManagerRow> = result.take(0)?;

        let mut index = Self::default();
        for row in rows {
            let user_id = parse_uuid("user", &row.record_id)?;
            for ou_id in parse_uuids("managed OU", &row.managed_ous)? {
                index.by_ou.entry(ou_id).or_default().push(user_id);
            }
            for division_id in parse_uuids("managed division", &row.managed_divisions)? {
                index.by_division.entry(division_id).or_default().push(user_id);
            }
        }
        Ok(index)
    }

    fn ou_managers(&self, ou_id: Uuid) -> Vec<Uuid> {
        self.by_ou.get(&ou_id).cloned().unwrap_or_default()
    }

    fn division_managers(&self, division_id: Uuid) -> Vec<Uuid> {
        self.by_division
            .get(&division_id)
            .cloned()
            .unwrap_or_default()
    }
}
