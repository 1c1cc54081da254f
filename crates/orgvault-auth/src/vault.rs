//! Credential access for an identified caller.

use orgvault_core::access::{
    CredentialPlacement, Identity, ReadScope, authorize_credential_update, resolve_read_scope,
};
use orgvault_core::error::{VaultError, VaultResult};
use orgvault_core::models::credential::{CreateCredential, Credential, UpdateCredential};
use orgvault_core::repository::{CredentialRepository, MembershipRepository};
use tracing::warn;
use uuid::Uuid;

/// Scope-filtered credential listing and scope-checked writes.
pub struct CredentialService<C: CredentialRepository, M: MembershipRepository> {
    credential_repo: C,
    membership_repo: M,
}

impl<C: CredentialRepository, M: MembershipRepository> CredentialService<C, M> {
    pub fn new(credential_repo: C, membership_repo: M) -> Self {
        Self {
            credential_repo,
            membership_repo,
        }
    }

    /// The divisions and OUs `identity` may read from.
    pub async fn read_scope(&self, identity: &Identity) -> VaultResult<ReadScope> {
        if identity.is_admin() {
            return Ok(ReadScope::Unrestricted);
        }

        let memberships = self.membership_repo.list_for_user(identity.user_id).await?;
        resolve_read_scope(identity, &memberships).inspect_err(|e| {
            if matches!(e, VaultError::NoAccess) {
                warn!(user_id = %identity.user_id, "No divisions or OUs in scope");
            }
        })
    }

    pub async fn list(&self, identity: &Identity) -> VaultResult<Vec<Credential>> {
        let scope = self.read_scope(identity).await?;
        self.credential_repo.list(&scope).await
    }

    /// File a new credential. Non-admins may only file into a placement
    /// they can read.
    pub async fn create(
        &self,
        identity: &Identity,
        input: CreateCredential,
    ) -> VaultResult<Credential> {
        let scope = self.read_scope(identity).await?;
        if !scope.permits(input.ou_id, input.division_id) {
            warn!(
                user_id = %identity.user_id,
                division_id = %input.division_id,
                "Credential create outside scope"
            );
            return Err(VaultError::denied(
                "target division is outside your scope",
            ));
        }
        self.credential_repo.create(input).await
    }

    pub async fn update(
        &self,
        identity: &Identity,
        id: Uuid,
        input: UpdateCredential,
    ) -> VaultResult<Credential> {
        let current = self.credential_repo.get_by_id(id).await?;
        let current_placement = CredentialPlacement {
            ou_id: current.ou_id,
            division_id: current.division_id,
        };
        let target = input.moves().then(|| CredentialPlacement {
            ou_id: input.ou_id.unwrap_or(current.ou_id),
            division_id: input.division_id.unwrap_or(current.division_id),
        });

        let memberships = if identity.is_admin() {
            Vec::new()
        } else {
            self.membership_repo.list_for_user(identity.user_id).await?
        };

        authorize_credential_update(identity, &memberships, current_placement, target)
            .inspect_err(|_| {
                warn!(
                    user_id = %identity.user_id,
                    credential_id = %id,
                    "Credential update refused"
                )
            })?;

        self.credential_repo.update(id, input).await
    }
}
