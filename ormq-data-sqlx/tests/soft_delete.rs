mod common;

use common::{person, seed_people, setup, setup_with};
use ormq_data::{DataConfig, Filter, Predicate, Query, Record};

#[tokio::test]
async fn soft_deleted_rows_are_hidden_from_default_reads() {
    let db = setup().await;
    let people = db.people();
    let rows = seed_people(&db, 3).await;

    let affected = people
        .soft_delete(Predicate::eq("id", rows[1].id))
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let visible = people.select_all(Query::all()).await.unwrap();
    assert_eq!(visible.len(), 2);
    assert!(visible.iter().all(|p| p.id != rows[1].id));
    assert!(people.find_by_id(&rows[1].id).await.unwrap().is_none());
    assert_eq!(people.count(Filter::all()).await.unwrap(), 2);

    // Still physically present.
    let all = people.select_all(Query::all().include_deleted()).await.unwrap();
    assert_eq!(all.len(), 3);
    let deleted = all.iter().find(|p| p.id == rows[1].id).unwrap();
    assert!(deleted.is_deleted);
}

#[tokio::test]
async fn soft_delete_skips_rows_already_deleted() {
    let db = setup().await;
    let people = db.people();
    seed_people(&db, 2).await;

    assert_eq!(people.soft_delete(Filter::all()).await.unwrap(), 2);
    assert_eq!(people.soft_delete(Filter::all()).await.unwrap(), 0);
}

#[tokio::test]
async fn restore_brings_rows_back() {
    let db = setup().await;
    let people = db.people();
    let rows = seed_people(&db, 2).await;

    people.soft_delete(Predicate::eq("id", rows[0].id)).await.unwrap();
    assert_eq!(people.count(Filter::all()).await.unwrap(), 1);

    let restored = people.restore(Predicate::eq("id", rows[0].id)).await.unwrap();
    assert_eq!(restored, 1);
    assert_eq!(people.count(Filter::all()).await.unwrap(), 2);
    let back = people.find_by_id(&rows[0].id).await.unwrap().unwrap();
    assert!(!back.is_deleted);

    // Restoring an active row is a no-op.
    assert_eq!(people.restore(Predicate::eq("id", rows[1].id)).await.unwrap(), 0);
}

#[tokio::test]
async fn updates_skip_soft_deleted_rows_by_default() {
    let db = setup().await;
    let people = db.people();
    let rows = seed_people(&db, 3).await;
    people.soft_delete(Predicate::eq("id", rows[0].id)).await.unwrap();

    let affected = people
        .update(Record::new().set("country", "TR"), Filter::all())
        .await
        .unwrap();
    assert_eq!(affected, 2);

    let hidden = people
        .select_one(Query::filter(Filter::new(Predicate::eq("id", rows[0].id)).include_deleted()))
        .await
        .unwrap();
    assert_eq!(hidden.country, "AZ");
}

#[tokio::test]
async fn updates_include_soft_deleted_rows_when_asked() {
    let db = setup().await;
    let people = db.people();
    let rows = seed_people(&db, 3).await;
    people.soft_delete(Predicate::eq("id", rows[0].id)).await.unwrap();

    let affected = people
        .update(Record::new().set("country", "TR"), Filter::all().include_deleted())
        .await
        .unwrap();
    assert_eq!(affected, 3);
}

#[tokio::test]
async fn update_policy_follows_configuration() {
    let config = DataConfig::from_yaml_str("soft_delete:\n  include_in_updates: true\n").unwrap();
    let db = setup_with(config).await;
    let people = db.people();
    let rows = seed_people(&db, 3).await;
    people.soft_delete(Predicate::eq("id", rows[0].id)).await.unwrap();

    let affected = people
        .update(Record::new().set("country", "TR"), Filter::all())
        .await
        .unwrap();
    assert_eq!(affected, 3);

    // A per-call override still wins.
    let affected = people
        .update(Record::new().set("country", "GE"), Filter::all().exclude_deleted())
        .await
        .unwrap();
    assert_eq!(affected, 2);
}

#[tokio::test]
async fn delete_includes_soft_deleted_rows() {
    let db = setup().await;
    let people = db.people();
    let rows = seed_people(&db, 2).await;
    people.soft_delete(Predicate::eq("id", rows[0].id)).await.unwrap();

    assert_eq!(people.delete(Filter::all()).await.unwrap(), 2);
    assert_eq!(
        people.count(Filter::all().include_deleted()).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn create_defaults_flag_to_false_but_honours_explicit_value() {
    let db = setup().await;
    let people = db.people();

    let active = people.create(person("Amrah", "AZ")).await.unwrap();
    assert!(!active.is_deleted);

    let archived = people
        .create(person("Ulvi", "AZ").set("is_deleted", true))
        .await
        .unwrap();
    assert!(archived.is_deleted);
    assert_eq!(people.count(Filter::all()).await.unwrap(), 1);
}
