//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Implementations must enforce the
//! uniqueness rules at the storage layer (unique indexes or deterministic
//! record keys) rather than by reading first and writing second.

use uuid::Uuid;

use crate::access::ReadScope;
use crate::error::VaultResult;
use crate::models::{
    credential::{CreateCredential, Credential, UpdateCredential},
    division::{CreateDivision, Division},
    membership::{Membership, MembershipDetail, UserOverview},
    ou::{CreateOrganisationalUnit, OrganisationalUnit},
    user::{CreateUser, Role, User},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

pub trait OuRepository: Send + Sync {
    /// Fails with `DuplicateName` when the normalized name is taken.
    fn create(
        &self,
        input: CreateOrganisationalUnit,
    ) -> impl Future<Output = VaultResult<OrganisationalUnit>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = VaultResult<OrganisationalUnit>> + Send;
    fn list(&self) -> impl Future<Output = VaultResult<Vec<OrganisationalUnit>>> + Send;
    /// Fails with `InUse` while divisions, memberships or credentials
    /// still reference the OU.
    fn delete(&self, id: Uuid) -> impl Future<Output = VaultResult<()>> + Send;
}

pub trait DivisionRepository: Send + Sync {
    /// Fails with `NotFound` for an unknown OU and `DuplicateName` when the
    /// normalized name is taken within that OU.
    fn create(&self, input: CreateDivision) -> impl Future<Output = VaultResult<Division>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = VaultResult<Division>> + Send;
    fn list(&self) -> impl Future<Output = VaultResult<Vec<Division>>> + Send;
    fn list_by_ou(&self, ou_id: Uuid) -> impl Future<Output = VaultResult<Vec<Division>>> + Send;
    /// Fails with `InUse` while memberships or credentials still reference
    /// the division.
    fn delete(&self, id: Uuid) -> impl Future<Output = VaultResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = VaultResult<User>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = VaultResult<User>> + Send;
    fn get_by_email(&self, email: &str) -> impl Future<Output = VaultResult<User>> + Send;
    fn set_role(&self, id: Uuid, role: Role) -> impl Future<Output = VaultResult<User>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = VaultResult<PaginatedResult<User>>> + Send;
}

// ---------------------------------------------------------------------------
// Memberships
// ---------------------------------------------------------------------------

pub trait MembershipRepository: Send + Sync {
    /// Add a user to a division. The membership's OU is the division's
    /// owning OU. An existing assignment fails with `DuplicateMembership`.
    fn assign_division(
        &self,
        user_id: Uuid,
        division_id: Uuid,
    ) -> impl Future<Output = VaultResult<Membership>> + Send;

    /// Remove a division membership. Fails with `NotFound` if none exists.
    fn revoke_division(
        &self,
        user_id: Uuid,
        division_id: Uuid,
    ) -> impl Future<Output = VaultResult<()>> + Send;

    /// Make a user manager of an OU and ensure an OU-only membership.
    /// Both halves are silent when already in place.
    fn assign_manager(
        &self,
        user_id: Uuid,
        ou_id: Uuid,
    ) -> impl Future<Output = VaultResult<User>> + Send;

    /// Stop a user managing an OU. The OU-only membership is kept.
    fn revoke_manager(
        &self,
        user_id: Uuid,
        ou_id: Uuid,
    ) -> impl Future<Output = VaultResult<User>> + Send;

    /// Add an OU-only membership. An existing one fails with
    /// `DuplicateMembership`.
    fn assign_ou_member(
        &self,
        user_id: Uuid,
        ou_id: Uuid,
    ) -> impl Future<Output = VaultResult<Membership>> + Send;

    /// Remove the OU-only membership; division memberships in the same OU
    /// are untouched. Fails with `NotFound` if none exists.
    fn revoke_ou_member(
        &self,
        user_id: Uuid,
        ou_id: Uuid,
    ) -> impl Future<Output = VaultResult<()>> + Send;

    /// Raw membership rows of a user, as needed for access resolution.
    fn list_for_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = VaultResult<Vec<Membership>>> + Send;

    /// All memberships of a user, annotated with OU and division names.
    fn memberships_of(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = VaultResult<Vec<MembershipDetail>>> + Send;

    /// Division-scoped memberships of a division, annotated with user data.
    fn members_of(
        &self,
        division_id: Uuid,
    ) -> impl Future<Output = VaultResult<Vec<MembershipDetail>>> + Send;

    /// Pair each user with their annotated memberships and the names of
    /// the OUs they manage. Order of `users` is kept.
    fn user_overviews(
        &self,
        users: Vec<User>,
    ) -> impl Future<Output = VaultResult<Vec<UserOverview>>> + Send;
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

pub trait CredentialRepository: Send + Sync {
    /// Validates required fields and that the division belongs to the OU.
    fn create(
        &self,
        input: CreateCredential,
    ) -> impl Future<Output = VaultResult<Credential>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = VaultResult<Credential>> + Send;
    /// Overwrites present fields; an absent or blank secret is retained.
    /// Does not check the caller's scope.
    fn update(
        &self,
        id: Uuid,
        input: UpdateCredential,
    ) -> impl Future<Output = VaultResult<Credential>> + Send;
    /// Credentials whose division or OU is in `scope`, oldest first.
    fn list(&self, scope: &ReadScope) -> impl Future<Output = VaultResult<Vec<Credential>>> + Send;
}
