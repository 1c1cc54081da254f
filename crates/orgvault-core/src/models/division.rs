//! Division domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sub-grouping owned by exactly one OU. The owning OU never changes
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Division {
    pub id: Uuid,
    pub ou_id: Uuid,
    /// Display name of the owning OU, joined at read time.
    pub ou_name: String,
    pub name: String,
    /// Unique within the owning OU.
    pub normalized_name: String,
    /// Users whose `managed_divisions` contains this division.
    pub managers: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDivision {
    pub ou_id: Uuid,
    pub name: String,
}
