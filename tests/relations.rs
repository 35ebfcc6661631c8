mod common;

use common::{admin, caller, database, owned_by};
use futures::StreamExt;
use rowguard::entities::role::USERS_JOIN;
use rowguard::entities::{Role, User};
use rowguard::storage::{DocumentBackend, FindOptions};
use rowguard::{DataStore, Document, Error, Model, RelationalDataStore};
use serde_json::json;

fn doc(value: serde_json::Value) -> Document {
    value.as_object().cloned().unwrap()
}

async fn join_records(backend: &dyn DocumentBackend) -> Vec<(String, String)> {
    let stream = backend
        .find(USERS_JOIN, Document::new(), FindOptions::default())
        .await
        .unwrap();
    stream
        .map(|d| {
            let d = d.unwrap();
            (
                d["relatedId"].as_str().unwrap().to_string(),
                d["owningId"].as_str().unwrap().to_string(),
            )
        })
        .collect()
        .await
}

#[tokio::test]
async fn test_single_member_scenario() {
    let (db, backend) = database();
    backend
        .insert_many("_Role", vec![doc(json!({"_id": "A", "name": "staff"}))])
        .await
        .unwrap();
    backend
        .insert_many("_User", vec![doc(json!({"_id": "B", "username": "bee"}))])
        .await
        .unwrap();
    let ds = admin(&db);

    let mut role = Role::with_id("A");
    role.users().add(&User::with_id("B"));
    ds.save_related_objects(role.users()).await.unwrap();
    assert!(!role.users().has_pending());

    assert_eq!(
        join_records(&*backend).await,
        vec![("B".to_string(), "A".to_string())]
    );

    let members: Vec<User> = role.users().find(&ds).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].object_id(), "B");
    assert_eq!(members[0].username, "bee");
}

#[tokio::test]
async fn test_add_then_remove_round_trip() {
    let (db, backend) = database();
    let ds = admin(&db);

    let mut role = Role::named("editors");
    role.save(&ds).await.unwrap();
    let mut x = User::default();
    x.set("Username", "x").unwrap();
    x.save(&ds).await.unwrap();
    let mut y = User::default();
    y.set("Username", "y").unwrap();
    y.save(&ds).await.unwrap();

    role.users().add(&x);
    role.users().add(&y);
    ds.save_related_objects(role.users()).await.unwrap();

    let mut records = join_records(&*backend).await;
    records.sort();
    let mut expected = vec![
        (x.object_id().to_string(), role.object_id().to_string()),
        (y.object_id().to_string(), role.object_id().to_string()),
    ];
    expected.sort();
    assert_eq!(records, expected);

    role.users().remove(&x);
    ds.save_related_objects(role.users()).await.unwrap();
    assert_eq!(
        join_records(&*backend).await,
        vec![(y.object_id().to_string(), role.object_id().to_string())]
    );

    let roles = Role::roles_for_user(&y, &ds).await.unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].name, "editors");
    assert!(Role::roles_for_user(&x, &ds).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unsaved_participants_are_rejected() {
    let (db, backend) = database();
    let ds = admin(&db);

    let mut unsaved = Role::named("ghost");
    unsaved.users().add(&User::with_id("u1"));
    assert!(matches!(
        ds.save_related_objects(unsaved.users()).await,
        Err(Error::UnsavedOwner)
    ));

    let mut role = Role::with_id("r1");
    role.users().add(&User::default());
    assert!(matches!(
        ds.save_related_objects(role.users()).await,
        Err(Error::UnsavedRelatedEntity)
    ));
    assert!(role.users().has_pending());
    assert!(join_records(&*backend).await.is_empty());
}

#[tokio::test]
async fn test_restricted_relation_write_requires_owner_grant() {
    let (db, backend) = database();
    let ds = admin(&db);

    let mut role = Role::named("ops");
    role.set_acl(owned_by(&["boss"]));
    role.save(&ds).await.unwrap();
    let member = User::with_id("m1");

    let intruder = caller(&db, "intruder", &[]);
    let mut handle = Role::with_id(role.object_id());
    assert!(matches!(
        intruder.fetch(&mut handle).await,
        Err(Error::NotFound(_))
    ));
    let mut handle = role.clone();
    handle.users().add(&member);
    assert!(intruder
        .save_related_objects(handle.users())
        .await
        .unwrap_err()
        .is_access_denied());

    let boss = caller(&db, "boss", &[]);
    boss.save_related_objects(handle.users()).await.unwrap();
    assert_eq!(join_records(&*backend).await.len(), 1);
}

#[tokio::test]
async fn test_large_relation_is_traversed_in_full() {
    let (db, backend) = database();
    let members = 1100;
    backend
        .insert_many("_Role", vec![doc(json!({"_id": "big", "name": "everyone"}))])
        .await
        .unwrap();
    backend
        .insert_many(
            "_User",
            (0..members)
                .map(|i| doc(json!({"_id": format!("u{}", i), "username": format!("user{}", i)})))
                .collect(),
        )
        .await
        .unwrap();
    backend
        .insert_many(
            USERS_JOIN,
            (0..members)
                .map(|i| doc(json!({"_id": format!("j{}", i), "relatedId": format!("u{}", i), "owningId": "big"})))
                .collect(),
        )
        .await
        .unwrap();
    let ds = admin(&db);

    let mut role = Role::with_id("big");
    let found: Vec<User> = role.users().find(&ds).await.unwrap();
    assert_eq!(found.len(), members);

    let mut owners = 0;
    ds.find_owning_objects(USERS_JOIN, &User::with_id("u1099"), |_: Role| {
        owners += 1;
        Ok(())
    })
    .await
    .unwrap();
    assert_eq!(owners, 1);
}
