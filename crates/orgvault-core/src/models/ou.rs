//! Organisational Unit domain model.
//!
//! OUs are the top level of the hierarchy. Each one owns zero or more
//! divisions, and credentials are always filed under an OU + division pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganisationalUnit {
    pub id: Uuid,
    /// Display name as entered.
    pub name: String,
    /// Trimmed, lowercased name. Unique across all OUs.
    pub normalized_name: String,
    /// Users whose `managed_ous` contains this OU.
    pub managers: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganisationalUnit {
    pub name: String,
}
