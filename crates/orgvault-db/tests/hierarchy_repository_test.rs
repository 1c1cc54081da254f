//! Integration tests for the OU and Division repositories using in-memory
//! SurrealDB.

use orgvault_core::access::ReadScope;
use orgvault_core::error::VaultError;
use orgvault_core::models::credential::CreateCredential;
use orgvault_core::models::division::CreateDivision;
use orgvault_core::models::ou::CreateOrganisationalUnit;
use orgvault_core::models::user::CreateUser;
use orgvault_core::repository::{
    CredentialRepository, DivisionRepository, MembershipRepository, OuRepository, UserRepository,
};
use orgvault_db::repository::{
    SurrealCredentialRepository, SurrealDivisionRepository, SurrealMembershipRepository,
    SurrealOuRepository, SurrealUserRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    orgvault_db::run_migrations(&db).await.unwrap();
    db
}

fn ou(name: &str) -> CreateOrganisationalUnit {
    CreateOrganisationalUnit { name: name.into() }
}

fn division(ou_id: Uuid, name: &str) -> CreateDivision {
    CreateDivision {
        ou_id,
        name: name.into(),
    }
}

#[tokio::test]
async fn create_and_get_ou() {
    let db = setup().await;
    let repo = SurrealOuRepository::new(db);

    let created = repo.create(ou("  News Management ")).await.unwrap();
    assert_eq!(created.name, "News Management");
    assert_eq!(created.normalized_name, "news management");
    assert!(created.managers.is_empty());

    let fetched = repo.get_by_id(created.id).await.unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.name, "News Management");
}

#[tokio::test]
async fn ou_names_are_unique_ignoring_case() {
    let db = setup().await;
    let repo = SurrealOuRepository::new(db);

    repo.create(ou("Hardware Reviews")).await.unwrap();
    let err = repo.create(ou("hardware reviews ")).await.unwrap_err();
    assert!(matches!(err, VaultError::DuplicateName { .. }));

    assert_eq!(repo.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn blank_ou_name_is_rejected() {
    let db = setup().await;
    let repo = SurrealOuRepository::new(db);

    let err = repo.create(ou("   ")).await.unwrap_err();
    assert!(matches!(err, VaultError::Validation { .. }));
}

#[tokio::test]
async fn get_missing_ou_is_not_found() {
    let db = setup().await;
    let repo = SurrealOuRepository::new(db);

    let err = repo.get_by_id(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, VaultError::NotFound { .. }));
}

#[tokio::test]
async fn division_names_are_unique_per_ou_only() {
    let db = setup().await;
    let ous = SurrealOuRepository::new(db.clone());
    let divisions = SurrealDivisionRepository::new(db);

    let news = ous.create(ou("News")).await.unwrap();
    let software = ous.create(ou("Software")).await.unwrap();

    let first = divisions.create(division(news.id, "Finance")).await.unwrap();
    assert_eq!(first.ou_id, news.id);
    assert_eq!(first.ou_name, "News");

    // Same name under another OU is allowed.
    divisions
        .create(division(software.id, "Finance"))
        .await
        .unwrap();

    let err = divisions
        .create(division(news.id, " FINANCE"))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::DuplicateName { .. }));

    assert_eq!(divisions.list().await.unwrap().len(), 2);
    assert_eq!(divisions.list_by_ou(news.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn division_under_unknown_ou_is_not_found() {
    let db = setup().await;
    let divisions = SurrealDivisionRepository::new(db);

    let err = divisions
        .create(division(Uuid::new_v4(), "Finance"))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::NotFound { .. }));
}

#[tokio::test]
async fn managers_are_derived_from_users() {
    let db = setup().await;
    let ous = SurrealOuRepository::new(db.clone());
    let users = SurrealUserRepository::new(db.clone());
    let memberships = SurrealMembershipRepository::new(db);

    let news = ous.create(ou("News")).await.unwrap();
    let alice = users
        .create(CreateUser {
            first_name: "Alice".into(),
            last_name: "Ng".into(),
            email: "alice@example.com".into(),
            password: "correct horse".into(),
        })
        .await
        .unwrap();

    memberships.assign_manager(alice.id, news.id).await.unwrap();

    let fetched = ous.get_by_id(news.id).await.unwrap();
    assert_eq!(fetched.managers, vec![alice.id]);

    let listed = ous.list().await.unwrap();
    assert_eq!(listed[0].managers, vec![alice.id]);
}

#[tokio::test]
async fn deleting_ou_with_divisions_is_rejected() {
    let db = setup().await;
    let ous = SurrealOuRepository::new(db.clone());
    let divisions = SurrealDivisionRepository::new(db);

    let news = ous.create(ou("News")).await.unwrap();
    divisions.create(division(news.id, "Finance")).await.unwrap();

    let err = ous.delete(news.id).await.unwrap_err();
    assert!(matches!(err, VaultError::InUse { .. }));
    assert!(ous.get_by_id(news.id).await.is_ok());
}

#[tokio::test]
async fn deleting_division_with_credentials_is_rejected() {
    let db = setup().await;
    let ous = SurrealOuRepository::new(db.clone());
    let divisions = SurrealDivisionRepository::new(db.clone());
    let credentials = SurrealCredentialRepository::new(db);

    let news = ous.create(ou("News")).await.unwrap();
    let finance = divisions.create(division(news.id, "Finance")).await.unwrap();
    credentials
        .create(CreateCredential {
            ou_id: news.id,
            division_id: finance.id,
            name: "Payroll".into(),
            username: "payroll".into(),
            secret: "s3cret".into(),
            notes: None,
        })
        .await
        .unwrap();

    let err = divisions.delete(finance.id).await.unwrap_err();
    assert!(matches!(err, VaultError::InUse { .. }));
}

#[tokio::test]
async fn deleting_empty_ou_clears_manager_references() {
    let db = setup().await;
    let ous = SurrealOuRepository::new(db.clone());
    let users = SurrealUserRepository::new(db.clone());
    let memberships = SurrealMembershipRepository::new(db);

    let news = ous.create(ou("News")).await.unwrap();
    let alice = users
        .create(CreateUser {
            first_name: "Alice".into(),
            last_name: "Ng".into(),
            email: "alice@example.com".into(),
            password: "correct horse".into(),
        })
        .await
        .unwrap();

    // Manager assignment leaves an OU-only row, which blocks deletion.
    memberships.assign_manager(alice.id, news.id).await.unwrap();
    assert!(matches!(
        ous.delete(news.id).await.unwrap_err(),
        VaultError::InUse { .. }
    ));

    memberships.revoke_ou_member(alice.id, news.id).await.unwrap();
    ous.delete(news.id).await.unwrap();

    assert!(matches!(
        ous.get_by_id(news.id).await.unwrap_err(),
        VaultError::NotFound { .. }
    ));
    let alice = users.get_by_id(alice.id).await.unwrap();
    assert!(alice.managed_ous.is_empty());
}

#[tokio::test]
async fn deleting_missing_division_is_not_found() {
    let db = setup().await;
    let divisions = SurrealDivisionRepository::new(db);

    let err = divisions.delete(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, VaultError::NotFound { .. }));
}

async fn member(db: &Surreal<Db>, email: &str) -> Uuid {
    SurrealUserRepository::new(db.clone())
        .create(CreateUser {
            first_name: "Dana".into(),
            last_name: "Holt".into(),
            email: email.into(),
            password: "correct horse".into(),
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn ou_delete_racing_a_new_member_leaves_no_orphan() {
    let db = setup().await;
    let ous = SurrealOuRepository::new(db.clone());
    let memberships = SurrealMembershipRepository::new(db.clone());

    let news = ous.create(ou("News")).await.unwrap();
    let dana = member(&db, "dana@example.com").await;

    let (deleted, assigned) = tokio::join!(
        ous.delete(news.id),
        memberships.assign_ou_member(dana, news.id),
    );

    assert!(!(deleted.is_ok() && assigned.is_ok()));
    match deleted {
        Ok(()) => {
            assert!(matches!(assigned, Err(VaultError::NotFound { .. })));
            assert!(memberships.list_for_user(dana).await.unwrap().is_empty());
        }
        Err(err) => {
            assert!(matches!(err, VaultError::InUse { .. }));
            assert!(assigned.is_ok());
            assert!(ous.get_by_id(news.id).await.is_ok());
        }
    }
}

#[tokio::test]
async fn division_delete_racing_a_credential_leaves_no_orphan() {
    let db = setup().await;
    let ous = SurrealOuRepository::new(db.clone());
    let divisions = SurrealDivisionRepository::new(db.clone());
    let credentials = SurrealCredentialRepository::new(db);

    let news = ous.create(ou("News")).await.unwrap();
    let finance = divisions.create(division(news.id, "Finance")).await.unwrap();

    let (deleted, created) = tokio::join!(
        divisions.delete(finance.id),
        credentials.create(CreateCredential {
            ou_id: news.id,
            division_id: finance.id,
            name: "Payroll".into(),
            username: "payroll".into(),
            secret: "s3cret".into(),
            notes: None,
        }),
    );

    assert!(!(deleted.is_ok() && created.is_ok()));
    if deleted.is_ok() {
        let all = credentials
            .list(&ReadScope::Unrestricted)
            .await
            .unwrap();
        assert!(all.is_empty());
    } else {
        assert!(matches!(deleted, Err(VaultError::InUse { .. })));
        assert!(divisions.get_by_id(finance.id).await.is_ok());
    }
}

#[tokio::test]
async fn division_create_racing_ou_delete_leaves_no_orphan() {
    let db = setup().await;
    let ous = SurrealOuRepository::new(db.clone());
    let divisions = SurrealDivisionRepository::new(db);

    let news = ous.create(ou("News")).await.unwrap();

    let (deleted, created) = tokio::join!(
        ous.delete(news.id),
        divisions.create(division(news.id, "Finance")),
    );

    assert!(!(deleted.is_ok() && created.is_ok()));
    if deleted.is_ok() {
        assert!(divisions.list_by_ou(news.id).await.unwrap().is_empty());
    } else {
        assert!(ous.get_by_id(news.id).await.is_ok());
    }
}

#[tokio::test]
async fn concurrent_members_of_one_ou_all_land() {
    let db = setup().await;
    let ous = SurrealOuRepository::new(db.clone());
    let memberships = SurrealMembershipRepository::new(db.clone());

    let news = ous.create(ou("News")).await.unwrap();
    let dana = member(&db, "dana@example.com").await;
    let eli = member(&db, "eli@example.com").await;
    let fay = member(&db, "fay@example.com").await;

    let (a, b, c) = tokio::join!(
        memberships.assign_ou_member(dana, news.id),
        memberships.assign_ou_member(eli, news.id),
        memberships.assign_ou_member(fay, news.id),
    );

    a.unwrap();
    b.unwrap();
    c.unwrap();
    for user in [dana, eli, fay] {
        assert_eq!(memberships.list_for_user(user).await.unwrap().len(), 1);
    }
}

#[tokio::test]
async fn deleting_ou_twice_reports_not_found() {
    let db = setup().await;
    let ous = SurrealOuRepository::new(db);

    let news = ous.create(ou("News")).await.unwrap();
    ous.delete(news.id).await.unwrap();

    let err = ous.delete(news.id).await.unwrap_err();
    assert!(matches!(err, VaultError::NotFound { .. }));
}
