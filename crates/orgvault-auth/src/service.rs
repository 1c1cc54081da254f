//! Authentication service: registration, password login, and identity
//! lookup.

use orgvault_core::access::Identity;
use orgvault_core::error::{VaultError, VaultResult};
use orgvault_core::models::user::{CreateUser, User};
use orgvault_core::repository::UserRepository;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::password;

/// Input for the login flow.
#[derive(Debug)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Authentication service.
///
/// Generic over the user repository so that the auth layer has no
/// dependency on the database crate.
pub struct AuthService<U: UserRepository> {
    user_repo: U,
    config: AuthConfig,
}

impl<U: UserRepository> AuthService<U> {
    pub fn new(user_repo: U, config: AuthConfig) -> Self {
        Self { user_repo, config }
    }

    /// Create a user with the default role after applying the password
    /// policy.
    pub async fn register(&self, input: CreateUser) -> VaultResult<User> {
        if input.password.chars().count() < self.config.min_password_length {
            return Err(AuthError::PasswordTooShort {
                min: self.config.min_password_length,
            }
            .into());
        }
        self.user_repo.create(input).await
    }

    /// Verify email + password and return the caller's identity.
    ///
    /// Unknown email and wrong password fail the same way.
    pub async fn login(&self, input: LoginInput) -> VaultResult<Identity> {
        let user = match self.user_repo.get_by_email(&input.email).await {
            Ok(user) => user,
            Err(VaultError::NotFound { .. }) => {
                warn!("Login attempt for unknown email");
                return Err(AuthError::InvalidCredentials.into());
            }
            Err(e) => return Err(e),
        };

        let valid = password::verify_password(
            &input.password,
            &user.password_hash,
            self.config.pepper.as_deref(),
        )?;

        if !valid {
            warn!(user_id = %user.id, "Login rejected: wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        info!(
            user_id = %user.id,
            name = %user.display_name(),
            role = %user.role,
            "User logged in"
        );
        Ok(Identity::from(&user))
    }

    /// Reload the identity of an already-authenticated user, picking up
    /// role and manager changes made since login.
    pub async fn identity(&self, user_id: Uuid) -> VaultResult<Identity> {
        let user = self.user_repo.get_by_id(user_id).await?;
        Ok(Identity::from(&user))
    }
}
