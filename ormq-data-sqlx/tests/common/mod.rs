#![allow(dead_code)]

use ormq_data_sqlx::prelude::*;
use chrono::{DateTime, Utc};
use ormq_data::{AuditLog, Operation};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool};
use tempfile::TempDir;

const PEOPLE_DDL: &str = r#"CREATE TABLE "people" (
    "id" INTEGER PRIMARY KEY AUTOINCREMENT,
    "country" TEXT NOT NULL,
    "name" TEXT NOT NULL,
    "email" TEXT NOT NULL UNIQUE,
    "is_deleted" BOOLEAN NOT NULL DEFAULT 0
)"#;

const TAGS_DDL: &str = r#"CREATE TABLE "tags" (
    "id" INTEGER PRIMARY KEY AUTOINCREMENT,
    "label" TEXT NOT NULL
)"#;

const MEMOS_DDL: &str = r#"CREATE TABLE "memos" (
    "id" INTEGER PRIMARY KEY AUTOINCREMENT,
    "body" TEXT NOT NULL,
    "created_at" TEXT NOT NULL,
    "updated_at" TEXT NOT NULL,
    "is_deleted" BOOLEAN NOT NULL DEFAULT 0
)"#;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Person {
    pub id: i64,
    pub country: String,
    pub name: String,
    pub email: String,
    pub is_deleted: bool,
}

impl Entity for Person {
    type Id = i64;

    fn table_name() -> &'static str {
        "people"
    }

    fn id_column() -> &'static str {
        "id"
    }

    fn columns() -> &'static [&'static str] {
        &["id", "country", "name", "email", "is_deleted"]
    }

    fn id(&self) -> &i64 {
        &self.id
    }
}

/// An entity without a soft-delete flag.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub label: String,
}

impl Entity for Tag {
    type Id = i64;

    fn table_name() -> &'static str {
        "tags"
    }

    fn id_column() -> &'static str {
        "id"
    }

    fn columns() -> &'static [&'static str] {
        &["id", "label"]
    }

    fn id(&self) -> &i64 {
        &self.id
    }

    fn soft_delete_column() -> Option<&'static str> {
        None
    }
}

/// An entity with creation and modification timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Memo {
    pub id: i64,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

impl Entity for Memo {
    type Id = i64;

    fn table_name() -> &'static str {
        "memos"
    }

    fn id_column() -> &'static str {
        "id"
    }

    fn columns() -> &'static [&'static str] {
        &["id", "body", "created_at", "updated_at", "is_deleted"]
    }

    fn id(&self) -> &i64 {
        &self.id
    }

    fn created_at_column() -> Option<&'static str> {
        Some("created_at")
    }

    fn updated_at_column() -> Option<&'static str> {
        Some("updated_at")
    }
}

#[derive(Deserialize, garde::Validate)]
#[serde(deny_unknown_fields)]
pub struct NewPerson {
    #[garde(length(min = 2, max = 2))]
    pub country: String,
    #[garde(length(min = 1, max = 100))]
    pub name: String,
    #[garde(email)]
    pub email: String,
}

#[derive(Deserialize, garde::Validate)]
#[serde(deny_unknown_fields)]
pub struct PersonPatch {
    #[garde(length(min = 2, max = 2))]
    pub country: Option<String>,
    #[garde(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[garde(email)]
    pub email: Option<String>,
    #[garde(skip)]
    pub is_deleted: Option<bool>,
}

pub struct TestDb {
    pub provider: SessionProvider<Sqlite>,
    pub pool: SqlitePool,
    _dir: TempDir,
}

impl TestDb {
    pub fn people(&self) -> CrudRepository<Person, Sqlite> {
        CrudRepository::new(self.provider.clone())
    }

    pub fn validated_people(&self) -> CrudRepository<Person, Sqlite> {
        self.people()
            .with_validator(Schema::<NewPerson>::new().with_updates::<PersonPatch>())
    }

    pub fn tags(&self) -> CrudRepository<Tag, Sqlite> {
        CrudRepository::new(self.provider.clone())
    }

    pub fn audit_logs(&self) -> CrudRepository<AuditLog, Sqlite> {
        CrudRepository::new(self.provider.clone())
    }

    pub async fn audit_rows(&self) -> Vec<AuditLog> {
        self.audit_logs().select_all(Query::all()).await.unwrap()
    }

    pub async fn audit_count(&self, operation: Operation) -> i64 {
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "audit_logs" WHERE "operation" = ?"#)
            .bind(operation.as_str())
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    pub fn memos(&self) -> CrudRepository<Memo, Sqlite> {
        CrudRepository::new(self.provider.clone())
    }
}

/// File-backed database in a temp dir; every pooled connection sees the
/// same data.
pub async fn open_pool(dir: &TempDir) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("ormq-test.db"))
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .unwrap()
}

pub async fn setup() -> TestDb {
    setup_with(DataConfig::default()).await
}

pub async fn setup_with(config: DataConfig) -> TestDb {
    let dir = tempfile::tempdir().unwrap();
    let pool = open_pool(&dir).await;
    sqlx::query(PEOPLE_DDL).execute(&pool).await.unwrap();
    sqlx::query(TAGS_DDL).execute(&pool).await.unwrap();
    sqlx::query(MEMOS_DDL).execute(&pool).await.unwrap();

    let provider = SessionProvider::with_pool(pool.clone(), &config);
    provider.install_audit_table().await.unwrap();
    TestDb {
        provider,
        pool,
        _dir: dir,
    }
}

pub fn person(name: &str, country: &str) -> Record {
    Record::new()
        .set("name", name)
        .set("country", country)
        .set("email", format!("{}@example.com", name.to_lowercase()))
}

/// Insert `n` people named `p1`..`pn`.
pub async fn seed_people(db: &TestDb, n: usize) -> Vec<Person> {
    let items = (1..=n).map(|i| person(&format!("p{i}"), "AZ")).collect();
    db.people().bulk_create(items).await.unwrap()
}
