use chrono::{DateTime, Utc};
use garde::Validate;
use ormq::Entity;
use serde::{Deserialize, Serialize};

pub const PEOPLE_DDL: &str = r#"CREATE TABLE IF NOT EXISTS "people" (
    "id" INTEGER PRIMARY KEY AUTOINCREMENT,
    "country" TEXT NOT NULL,
    "name" TEXT NOT NULL,
    "surname" TEXT NOT NULL,
    "is_deleted" BOOLEAN NOT NULL DEFAULT 0,
    "created_at" TEXT NOT NULL,
    "updated_at" TEXT NOT NULL
)"#;

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Person {
    pub id: i64,
    pub country: String,
    pub name: String,
    pub surname: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
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
        &[
            "id",
            "country",
            "name",
            "surname",
            "is_deleted",
            "created_at",
            "updated_at",
        ]
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

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreatePersonRequest {
    #[garde(length(min = 2, max = 2))]
    pub country: String,
    #[garde(length(min = 1, max = 100))]
    pub name: String,
    #[garde(length(min = 1, max = 100))]
    pub surname: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdatePersonRequest {
    #[garde(length(min = 2, max = 2))]
    pub country: Option<String>,
    #[garde(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[garde(length(min = 1, max = 100))]
    pub surname: Option<String>,
}
