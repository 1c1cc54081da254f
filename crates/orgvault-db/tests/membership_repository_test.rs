//! Integration tests for the Membership repository using in-memory SurrealDB.

use orgvault_core::error::VaultError;
use orgvault_core::models::division::CreateDivision;
use orgvault_core::models::membership::Membership;
use orgvault_core::models::ou::CreateOrganisationalUnit;
use orgvault_core::models::user::CreateUser;
use orgvault_core::repository::{
    DivisionRepository, MembershipRepository, OuRepository, UserRepository,
};
use orgvault_db::repository::{
    SurrealDivisionRepository, SurrealMembershipRepository, SurrealOuRepository,
    SurrealUserRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

struct Fixture {
    db: Surreal<Db>,
    user_id: Uuid,
    news_id: Uuid,
    software_id: Uuid,
    finance_id: Uuid,
    it_id: Uuid,
}

/// Helper: in-memory DB with one user, OUs News and Software, and
/// divisions News/Finance and News/IT.
async fn setup() -> Fixture {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    orgvault_db::run_migrations(&db).await.unwrap();

    let ous = SurrealOuRepository::new(db.clone());
    let news = ous
        .create(CreateOrganisationalUnit {
            name: "News".into(),
        })
        .await
        .unwrap();
    let software = ous
        .create(CreateOrganisationalUnit {
            name: "Software".into(),
        })
        .await
        .unwrap();

    let divisions = SurrealDivisionRepository::new(db.clone());
    let finance = divisions
        .create(CreateDivision {
            ou_id: news.id,
            name: "Finance".into(),
        })
        .await
        .unwrap();
    let it = divisions
        .create(CreateDivision {
            ou_id: news.id,
            name: "IT".into(),
        })
        .await
        .unwrap();

    let user = SurrealUserRepository::new(db.clone())
        .create(CreateUser {
            first_name: "Bob".into(),
            last_name: "Marsh".into(),
            email: "bob@example.com".into(),
            password: "hunter22".into(),
        })
        .await
        .unwrap();

    Fixture {
        db,
        user_id: user.id,
        news_id: news.id,
        software_id: software.id,
        finance_id: finance.id,
        it_id: it.id,
    }
}

#[tokio::test]
async fn assign_division_resolves_owning_ou() {
    let f = setup().await;
    let repo = SurrealMembershipRepository::new(f.db);

    let membership = repo.assign_division(f.user_id, f.finance_id).await.unwrap();
    match membership {
        Membership::DivisionScoped {
            user_id,
            ou_id,
            division_id,
            ..
        } => {
            assert_eq!(user_id, f.user_id);
            assert_eq!(ou_id, f.news_id);
            assert_eq!(division_id, f.finance_id);
        }
        other => panic!("expected division-scoped membership, got {other:?}"),
    }
}

#[tokio::test]
async fn repeated_division_assignment_signals_duplicate() {
    let f = setup().await;
    let repo = SurrealMembershipRepository::new(f.db);

    repo.assign_division(f.user_id, f.finance_id).await.unwrap();
    let err = repo
        .assign_division(f.user_id, f.finance_id)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::DuplicateMembership { .. }));

    assert_eq!(repo.list_for_user(f.user_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_duplicate_assignment_stores_one_row() {
    let f = setup().await;
    let repo = SurrealMembershipRepository::new(f.db);

    let (a, b) = tokio::join!(
        repo.assign_division(f.user_id, f.it_id),
        repo.assign_division(f.user_id, f.it_id),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(
        [a, b]
            .into_iter()
            .any(|r| matches!(r, Err(VaultError::DuplicateMembership { .. })))
    );
    assert_eq!(repo.list_for_user(f.user_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn assignment_to_unknown_targets_is_not_found() {
    let f = setup().await;
    let repo = SurrealMembershipRepository::new(f.db);

    let err = repo
        .assign_division(Uuid::new_v4(), f.finance_id)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFound { .. }));

    let err = repo
        .assign_division(f.user_id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFound { .. }));

    let err = repo
        .assign_ou_member(f.user_id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFound { .. }));
}

#[tokio::test]
async fn revoke_division_removes_row() {
    let f = setup().await;
    let repo = SurrealMembershipRepository::new(f.db);

    repo.assign_division(f.user_id, f.finance_id).await.unwrap();
    repo.revoke_division(f.user_id, f.finance_id).await.unwrap();
    assert!(repo.list_for_user(f.user_id).await.unwrap().is_empty());

    let err = repo
        .revoke_division(f.user_id, f.finance_id)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFound { .. }));
}

#[tokio::test]
async fn assign_manager_is_idempotent() {
    let f = setup().await;
    let repo = SurrealMembershipRepository::new(f.db);

    let first = repo.assign_manager(f.user_id, f.news_id).await.unwrap();
    let second = repo.assign_manager(f.user_id, f.news_id).await.unwrap();

    assert_eq!(first.managed_ous, vec![f.news_id]);
    assert_eq!(second.managed_ous, vec![f.news_id]);

    let rows = repo.list_for_user(f.user_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(matches!(rows[0], Membership::OuOnly { ou_id, .. } if ou_id == f.news_id));
}

#[tokio::test]
async fn assign_manager_to_unknown_user_is_not_found() {
    let f = setup().await;
    let repo = SurrealMembershipRepository::new(f.db);

    let err = repo
        .assign_manager(Uuid::new_v4(), f.news_id)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFound { .. }));
}

#[tokio::test]
async fn revoke_manager_keeps_ou_membership() {
    let f = setup().await;
    let repo = SurrealMembershipRepository::new(f.db);

    repo.assign_manager(f.user_id, f.news_id).await.unwrap();
    repo.assign_manager(f.user_id, f.software_id).await.unwrap();

    let user = repo.revoke_manager(f.user_id, f.news_id).await.unwrap();
    assert_eq!(user.managed_ous, vec![f.software_id]);

    let rows = repo.list_for_user(f.user_id).await.unwrap();
    assert!(rows.iter().any(|m| m.ou_id() == f.news_id));
}

#[tokio::test]
async fn revoke_manager_for_unknown_user_is_not_found() {
    let f = setup().await;
    let repo = SurrealMembershipRepository::new(f.db);

    let err = repo
        .revoke_manager(Uuid::new_v4(), f.news_id)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFound { .. }));
}

#[tokio::test]
async fn ou_member_and_division_member_coexist() {
    let f = setup().await;
    let repo = SurrealMembershipRepository::new(f.db);

    repo.assign_ou_member(f.user_id, f.news_id).await.unwrap();
    repo.assign_division(f.user_id, f.finance_id).await.unwrap();

    let err = repo
        .assign_ou_member(f.user_id, f.news_id)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::DuplicateMembership { .. }));

    assert_eq!(repo.list_for_user(f.user_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn revoke_ou_member_keeps_division_rows() {
    let f = setup().await;
    let repo = SurrealMembershipRepository::new(f.db);

    repo.assign_ou_member(f.user_id, f.news_id).await.unwrap();
    repo.assign_division(f.user_id, f.finance_id).await.unwrap();

    repo.revoke_ou_member(f.user_id, f.news_id).await.unwrap();

    let rows = repo.list_for_user(f.user_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].division_id(), Some(f.finance_id));

    let err = repo
        .revoke_ou_member(f.user_id, f.news_id)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFound { .. }));
}

#[tokio::test]
async fn memberships_are_annotated_with_names() {
    let f = setup().await;
    let repo = SurrealMembershipRepository::new(f.db);

    repo.assign_ou_member(f.user_id, f.software_id).await.unwrap();
    repo.assign_division(f.user_id, f.finance_id).await.unwrap();

    let details = repo.memberships_of(f.user_id).await.unwrap();
    assert_eq!(details.len(), 2);

    let scoped = details
        .iter()
        .find(|d| d.membership.division_id() == Some(f.finance_id))
        .unwrap();
    assert_eq!(scoped.ou_name, "News");
    assert_eq!(scoped.division_name.as_deref(), Some("Finance"));

    let ou_only = details
        .iter()
        .find(|d| d.membership.division_id().is_none())
        .unwrap();
    assert_eq!(ou_only.ou_name, "Software");
    assert_eq!(ou_only.division_name, None);
}

#[tokio::test]
async fn members_of_lists_division_members_with_contact() {
    let f = setup().await;
    let repo = SurrealMembershipRepository::new(f.db);

    repo.assign_division(f.user_id, f.finance_id).await.unwrap();
    repo.assign_ou_member(f.user_id, f.news_id).await.unwrap();

    let members = repo.members_of(f.finance_id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_name, "Bob Marsh");
    assert_eq!(members[0].user_email, "bob@example.com");

    assert!(repo.members_of(f.it_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn division_pointing_at_another_ou_is_reported() {
    let f = setup().await;
    let repo = SurrealMembershipRepository::new(f.db.clone());

    repo.assign_division(f.user_id, f.finance_id).await.unwrap();

    // Re-home the division behind the repository's back.
    f.db.query("UPDATE type::record('division', $id) SET ou_id = $ou_id")
        .bind(("id", f.finance_id.to_string()))
        .bind(("ou_id", f.software_id.to_string()))
        .await
        .unwrap()
        .check()
        .unwrap();

    let err = repo.memberships_of(f.user_id).await.unwrap_err();
    assert!(matches!(err, VaultError::Internal(_)));
}

#[tokio::test]
async fn manager_assignment_to_unknown_ou_leaves_user_untouched() {
    let f = setup().await;
    let repo = SurrealMembershipRepository::new(f.db.clone());

    let err = repo
        .assign_manager(f.user_id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFound { .. }));

    let user = SurrealUserRepository::new(f.db)
        .get_by_id(f.user_id)
        .await
        .unwrap();
    assert!(user.managed_ous.is_empty());
}

#[tokio::test]
async fn user_overviews_collect_memberships_and_managed_ous() {
    let f = setup().await;
    let repo = SurrealMembershipRepository::new(f.db.clone());
    let users = SurrealUserRepository::new(f.db.clone());

    let idle = users
        .create(CreateUser {
            first_name: "Cleo".into(),
            last_name: "Park".into(),
            email: "cleo@example.com".into(),
            password: "hunter22".into(),
        })
        .await
        .unwrap();

    repo.assign_division(f.user_id, f.finance_id).await.unwrap();
    repo.assign_manager(f.user_id, f.software_id).await.unwrap();

    let bob = users.get_by_id(f.user_id).await.unwrap();
    let overviews = repo.user_overviews(vec![bob, idle]).await.unwrap();
    assert_eq!(overviews.len(), 2);

    let bob = &overviews[0];
    assert_eq!(bob.user.id, f.user_id);
    assert_eq!(bob.managed_ou_names, vec!["Software".to_string()]);
    assert_eq!(bob.memberships.len(), 2);
    assert!(
        bob.memberships
            .iter()
            .any(|d| d.division_name.as_deref() == Some("Finance"))
    );

    let cleo = &overviews[1];
    assert_eq!(cleo.user.email, "cleo@example.com");
    assert!(cleo.memberships.is_empty());
    assert!(cleo.managed_ou_names.is_empty());
}
