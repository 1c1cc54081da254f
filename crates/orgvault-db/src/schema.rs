//! Schema definitions and migration runner for SurrealDB.
//!
//! All tables are SCHEMAFULL. UUIDs are stored as strings. Enums are
//! stored as strings with ASSERT constraints.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: SCHEMA_V1,
    },
    Migration {
        version: 2,
        name: "parent_revisions",
        sql: SCHEMA_V2,
    },
];

// -----------------------------------------------------------------------
// Schema v1
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Organisational Units
-- =======================================================================
DEFINE TABLE ou SCHEMAFULL;
DEFINE FIELD name ON TABLE ou TYPE string;
DEFINE FIELD normalized_name ON TABLE ou TYPE string;
DEFINE FIELD created_at ON TABLE ou TYPE datetime DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE ou TYPE datetime DEFAULT time::now();
DEFINE INDEX idx_ou_normalized_name ON TABLE ou \
    COLUMNS normalized_name UNIQUE;

-- =======================================================================
-- Divisions (scoped to an OU)
-- =======================================================================
DEFINE TABLE division SCHEMAFULL;
DEFINE FIELD ou_id ON TABLE division TYPE string;
DEFINE FIELD name ON TABLE division TYPE string;
DEFINE FIELD normalized_name ON TABLE division TYPE string;
DEFINE FIELD created_at ON TABLE division TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE division TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_division_ou_normalized_name ON TABLE division \
    COLUMNS ou_id, normalized_name UNIQUE;

-- =======================================================================
-- Users
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD first_name ON TABLE user TYPE string;
DEFINE FIELD last_name ON TABLE user TYPE string;
DEFINE FIELD email ON TABLE user TYPE string;
DEFINE FIELD password_hash ON TABLE user TYPE string;
DEFINE FIELD role ON TABLE user TYPE string \
    ASSERT $value IN ['user', 'manager', 'admin'];
DEFINE FIELD managed_ous ON TABLE user TYPE array DEFAULT [];
DEFINE FIELD managed_ous.* ON TABLE user TYPE string;
DEFINE FIELD managed_divisions ON TABLE user TYPE array DEFAULT [];
DEFINE FIELD managed_divisions.* ON TABLE user TYPE string;
DEFINE FIELD created_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_user_email ON TABLE user COLUMNS email UNIQUE;

-- =======================================================================
-- Memberships
-- Record id is a UUIDv5 of (user_id, ou_id, division_id), so a repeated
-- assignment collides on the id itself.
-- =======================================================================
DEFINE TABLE membership SCHEMAFULL;
DEFINE FIELD user_id ON TABLE membership TYPE string;
DEFINE FIELD ou_id ON TABLE membership TYPE string;
DEFINE FIELD division_id ON TABLE membership TYPE option<string>;
DEFINE FIELD assigned_at ON TABLE membership TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_membership_user ON TABLE membership COLUMNS user_id;
DEFINE INDEX idx_membership_division ON TABLE membership \
    COLUMNS division_id;
DEFINE INDEX idx_membership_ou ON TABLE membership COLUMNS ou_id;

-- =======================================================================
-- Credentials
-- =======================================================================
DEFINE TABLE credential SCHEMAFULL;
DEFINE FIELD ou_id ON TABLE credential TYPE string;
DEFINE FIELD division_id ON TABLE credential TYPE string;
DEFINE FIELD name ON TABLE credential TYPE string;
DEFINE FIELD username ON TABLE credential TYPE string;
DEFINE FIELD secret ON TABLE credential TYPE string;
DEFINE FIELD notes ON TABLE credential TYPE option<string>;
DEFINE FIELD created_at ON TABLE credential TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE credential TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_credential_division ON TABLE credential \
    COLUMNS division_id;
DEFINE INDEX idx_credential_ou ON TABLE credential COLUMNS ou_id;
";

// -----------------------------------------------------------------------
// Schema v2
// -----------------------------------------------------------------------

/// Write counters on the tables other records hang off. Inserting beneath
/// an OU or division bumps its `revision` in the same transaction, which
/// makes the insert conflict with a concurrent delete of that parent.
const SCHEMA_V2: &str = "\
DEFINE FIELD revision ON TABLE ou TYPE int DEFAULT 0;
DEFINE FIELD revision ON TABLE division TYPE int DEFAULT 0;
UPDATE ou SET revision = 0 WHERE revision = NONE;
UPDATE division SET revision = 0 WHERE revision = NONE;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let current_version = applied_version(db).await?;

    for migration in MIGRATIONS
        .iter()
        .filter(|m| m.version > current_version)
    {
        apply(db, migration).await?;
    }

    Ok(())
}

async fn applied_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    Ok(records.first().map(|m| m.version).unwrap_or(0))
}

/// Apply one migration and record it in the same transaction, so a failed
/// migration leaves neither its DDL nor its `_migration` row behind.
async fn apply<C: Connection>(db: &Surreal<C>, migration: &Migration) -> Result<(), DbError> {
    info!(
        version = migration.version,
        name = migration.name,
        "Applying migration"
    );

    let sql = format!(
        "BEGIN TRANSACTION;\n{}\n\
         CREATE _migration SET version = $version, name = $name;\n\
         COMMIT TRANSACTION;",
        migration.sql
    );

    db.query(sql)
        .bind(("version", migration.version))
        .bind(("name", migration.name))
        .await?
        .check()
        .map_err(|e| {
            DbError::Migration(format!(
                "v{} '{}': {e}",
                migration.version, migration.name
            ))
        })?;

    info!(version = migration.version, "Migration applied");
    Ok(())
}

/// Returns the raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}
