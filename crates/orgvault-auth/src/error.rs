//! Authentication error types.

use orgvault_core::error::VaultError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for VaultError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => VaultError::AuthenticationFailed {
                reason: err.to_string(),
            },
            AuthError::PasswordTooShort { .. } => VaultError::Validation {
                message: err.to_string(),
            },
            AuthError::Crypto(msg) => VaultError::Crypto(msg),
        }
    }
}
