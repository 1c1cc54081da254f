//! Credential domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{VaultError, VaultResult};

/// A shared login filed under an OU + division pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: Uuid,
    pub ou_id: Uuid,
    pub division_id: Uuid,
    /// Display name, e.g. the website or system the login belongs to.
    pub name: String,
    pub username: String,
    pub secret: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCredential {
    pub ou_id: Uuid,
    pub division_id: Uuid,
    pub name: String,
    pub username: String,
    pub secret: String,
    pub notes: Option<String>,
}

impl CreateCredential {
    /// All fields except notes are required and must not be blank.
    pub fn validate(&self) -> VaultResult<()> {
        if self.name.trim().is_empty()
            || self.username.trim().is_empty()
            || self.secret.trim().is_empty()
        {
            return Err(VaultError::validation(
                "all fields except notes are required",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateCredential {
    pub ou_id: Option<Uuid>,
    pub division_id: Option<Uuid>,
    pub name: Option<String>,
    pub username: Option<String>,
    /// `None` or blank keeps the stored secret.
    pub secret: Option<String>,
    /// `Some(Some(val))` = set, `Some(None)` = clear, `None` = no change.
    pub notes: Option<Option<String>>,
}

impl UpdateCredential {
    /// Drop a blank secret so it is treated as absent, and reject blank
    /// replacements for required fields.
    pub fn normalized(mut self) -> VaultResult<Self> {
        if self.secret.as_deref().is_some_and(|s| s.trim().is_empty()) {
            self.secret = None;
        }
        if self.name.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(VaultError::validation("credential name must not be blank"));
        }
        if self.username.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(VaultError::validation("username must not be blank"));
        }
        Ok(self)
    }

    /// Whether the update changes where the credential is filed.
    pub fn moves(&self) -> bool {
        self.ou_id.is_some() || self.division_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> CreateCredential {
        CreateCredential {
            ou_id: Uuid::new_v4(),
            division_id: Uuid::new_v4(),
            name: "Payroll portal".into(),
            username: "payroll".into(),
            secret: "abc123".into(),
            notes: None,
        }
    }

    #[test]
    fn notes_are_optional() {
        assert!(input().validate().is_ok());
    }

    #[test]
    fn blank_required_field_is_rejected() {
        let mut bad = input();
        bad.username = "   ".into();
        assert!(matches!(
            bad.validate(),
            Err(VaultError::Validation { .. })
        ));
    }

    #[test]
    fn blank_secret_on_update_means_keep() {
        let update = UpdateCredential {
            secret: Some("  ".into()),
            ..Default::default()
        }
        .normalized()
        .unwrap();
        assert!(update.secret.is_none());
    }

    #[test]
    fn blank_name_on_update_is_rejected() {
        let update = UpdateCredential {
            name: Some(String::new()),
            ..Default::default()
        };
        assert!(update.normalized().is_err());
    }
}
