//! Directory services: the OU/Division hierarchy and the membership
//! registry, gated on the caller's role.
//!
//! Every mutation requires an admin. Reads of the hierarchy and of a
//! user's own memberships are open to any authenticated caller; listing
//! users or the members of a division needs at least the manager role.

use orgvault_core::access::{Identity, require_admin, require_manager};
use orgvault_core::error::VaultResult;
use orgvault_core::models::division::{CreateDivision, Division};
use orgvault_core::models::membership::{Membership, MembershipDetail, UserOverview};
use orgvault_core::models::ou::{CreateOrganisationalUnit, OrganisationalUnit};
use orgvault_core::models::user::{Role, User};
use orgvault_core::repository::{
    DivisionRepository, MembershipRepository, OuRepository, PaginatedResult, Pagination,
    UserRepository,
};
use tracing::warn;
use uuid::Uuid;

fn admin_only(actor: &Identity, action: &str) -> VaultResult<()> {
    require_admin(actor, action)
        .inspect_err(|_| warn!(actor = %actor.user_id, action, "Directory change refused"))
}

/// OU and Division management.
pub struct HierarchyService<O: OuRepository, D: DivisionRepository> {
    ou_repo: O,
    division_repo: D,
}

impl<O: OuRepository, D: DivisionRepository> HierarchyService<O, D> {
    pub fn new(ou_repo: O, division_repo: D) -> Self {
        Self {
            ou_repo,
            division_repo,
        }
    }

    pub async fn create_ou(
        &self,
        actor: &Identity,
        input: CreateOrganisationalUnit,
    ) -> VaultResult<OrganisationalUnit> {
        admin_only(actor, "creating an OU")?;
        self.ou_repo.create(input).await
    }

    pub async fn create_division(
        &self,
        actor: &Identity,
        input: CreateDivision,
    ) -> VaultResult<Division> {
        admin_only(actor, "creating a division")?;
        self.division_repo.create(input).await
    }

    /// Fails with `InUse` while the OU still has divisions, memberships
    /// or credentials.
    pub async fn delete_ou(&self, actor: &Identity, ou_id: Uuid) -> VaultResult<()> {
        admin_only(actor, "deleting an OU")?;
        self.ou_repo.delete(ou_id).await
    }

    pub async fn delete_division(&self, actor: &Identity, division_id: Uuid) -> VaultResult<()> {
        admin_only(actor, "deleting a division")?;
        self.division_repo.delete(division_id).await
    }

    pub async fn list_ous(&self) -> VaultResult<Vec<OrganisationalUnit>> {
        self.ou_repo.list().await
    }

    pub async fn list_divisions(&self) -> VaultResult<Vec<Division>> {
        self.division_repo.list().await
    }

    pub async fn divisions_of(&self, ou_id: Uuid) -> VaultResult<Vec<Division>> {
        self.division_repo.list_by_ou(ou_id).await
    }
}

/// Membership, manager and role administration.
pub struct MembershipService<U: UserRepository, M: MembershipRepository> {
    user_repo: U,
    membership_repo: M,
}

impl<U: UserRepository, M: MembershipRepository> MembershipService<U, M> {
    pub fn new(user_repo: U, membership_repo: M) -> Self {
        Self {
            user_repo,
            membership_repo,
        }
    }

    pub async fn assign_division(
        &self,
        actor: &Identity,
        user_id: Uuid,
        division_id: Uuid,
    ) -> VaultResult<Membership> {
        admin_only(actor, "assigning a division")?;
        self.membership_repo
            .assign_division(user_id, division_id)
            .await
    }

    pub async fn revoke_division(
        &self,
        actor: &Identity,
        user_id: Uuid,
        division_id: Uuid,
    ) -> VaultResult<()> {
        admin_only(actor, "revoking a division")?;
        self.membership_repo
            .revoke_division(user_id, division_id)
            .await
    }

    /// Idempotent: repeating the assignment changes nothing.
    pub async fn assign_manager(
        &self,
        actor: &Identity,
        user_id: Uuid,
        ou_id: Uuid,
    ) -> VaultResult<User> {
        admin_only(actor, "assigning an OU manager")?;
        self.membership_repo.assign_manager(user_id, ou_id).await
    }

    /// Removes the managerial assignment only; the user stays an OU member.
    pub async fn revoke_manager(
        &self,
        actor: &Identity,
        user_id: Uuid,
        ou_id: Uuid,
    ) -> VaultResult<User> {
        admin_only(actor, "revoking an OU manager")?;
        self.membership_repo.revoke_manager(user_id, ou_id).await
    }

    pub async fn assign_ou_member(
        &self,
        actor: &Identity,
        user_id: Uuid,
        ou_id: Uuid,
    ) -> VaultResult<Membership> {
        admin_only(actor, "assigning an OU member")?;
        self.membership_repo.assign_ou_member(user_id, ou_id).await
    }

    pub async fn revoke_ou_member(
        &self,
        actor: &Identity,
        user_id: Uuid,
        ou_id: Uuid,
    ) -> VaultResult<()> {
        admin_only(actor, "revoking an OU member")?;
        self.membership_repo.revoke_ou_member(user_id, ou_id).await
    }

    pub async fn set_role(&self, actor: &Identity, user_id: Uuid, role: Role) -> VaultResult<User> {
        admin_only(actor, "changing a role")?;
        self.user_repo.set_role(user_id, role).await
    }

    /// A page of users, each with their memberships and managed OUs.
    pub async fn list_users(
        &self,
        actor: &Identity,
        pagination: Pagination,
    ) -> VaultResult<PaginatedResult<UserOverview>> {
        require_manager(actor, "listing users")?;
        let page = self.user_repo.list(pagination).await?;
        let items = self.membership_repo.user_overviews(page.items).await?;
        Ok(PaginatedResult {
            items,
            total: page.total,
            offset: page.offset,
            limit: page.limit,
        })
    }

    pub async fn memberships_of(&self, user_id: Uuid) -> VaultResult<Vec<MembershipDetail>> {
        self.membership_repo.memberships_of(user_id).await
    }

    pub async fn members_of(
        &self,
        actor: &Identity,
        division_id: Uuid,
    ) -> VaultResult<Vec<MembershipDetail>> {
        require_manager(actor, "listing division members")?;
        self.membership_repo.members_of(division_id).await
    }
}
