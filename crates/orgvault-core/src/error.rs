//! Error types for the OrgVault system.
//!
//! Every failure surfaced to callers is a [`VaultError`]. Presentation
//! layers pick notice styling from [`VaultError::code`] and
//! [`VaultError::notice`] rather than from the message text.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("{entity} already exists: {name}")]
    DuplicateName { entity: String, name: String },

    #[error("User {user_id} is already assigned to {target}")]
    DuplicateMembership { user_id: String, target: String },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("{entity} {id} is still referenced by {dependents}")]
    InUse {
        entity: String,
        id: String,
        dependents: String,
    },

    #[error("You do not have access to any divisions or OUs")]
    NoAccess,

    #[error("Authorization denied: {reason}")]
    AuthorizationDenied { reason: String },

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Validation,
    DuplicateName,
    DuplicateMembership,
    NotFound,
    InUse,
    NoAccess,
    Forbidden,
    Unauthenticated,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::DuplicateName => "DUPLICATE_NAME",
            ErrorCode::DuplicateMembership => "DUPLICATE_MEMBERSHIP",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InUse => "IN_USE",
            ErrorCode::NoAccess => "NO_ACCESS",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// How a failure should be presented to the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Notice {
    /// The request was redundant; nothing is wrong with the data.
    Warning,
    /// The request was refused or failed.
    Blocking,
}

impl VaultError {
    pub fn validation(message: impl Into<String>) -> Self {
        VaultError::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        VaultError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        VaultError::AuthorizationDenied {
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            VaultError::Validation { .. } => ErrorCode::Validation,
            VaultError::DuplicateName { .. } => ErrorCode::DuplicateName,
            VaultError::DuplicateMembership { .. } => ErrorCode::DuplicateMembership,
            VaultError::NotFound { .. } => ErrorCode::NotFound,
            VaultError::InUse { .. } => ErrorCode::InUse,
            VaultError::NoAccess => ErrorCode::NoAccess,
            VaultError::AuthorizationDenied { .. } => ErrorCode::Forbidden,
            VaultError::AuthenticationFailed { .. } => ErrorCode::Unauthenticated,
            VaultError::Database(_) | VaultError::Crypto(_) | VaultError::Internal(_) => {
                ErrorCode::Internal
            }
        }
    }

    pub fn notice(&self) -> Notice {
        match self.code() {
            ErrorCode::DuplicateName | ErrorCode::DuplicateMembership => Notice::Warning,
            _ => Notice::Blocking,
        }
    }
}

pub type VaultResult<T> = Result<T, VaultError>;
