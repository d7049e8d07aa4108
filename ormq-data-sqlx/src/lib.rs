//! # ormq-data-sqlx: SQLx backend for the ormq data layer
//!
//! This crate runs the statements rendered by [`ormq-data`](ormq_data) on a
//! real database through [SQLx](https://github.com/launchbadge/sqlx). It adds
//! the session provider, the CRUD façade, the audit write path and the
//! transaction wrapper.
//!
//! # What's in this crate
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SessionProvider`] | Pool holder injected once; hands out scoped sessions |
//! | [`Session`] | One transaction plus the audit entries flushed inside it |
//! | [`CrudRepository`] | CRUD façade: create, select, paginate, update, soft delete, delete, bulk variants |
//! | [`AuditTrail`] | Audit step called by every mutating façade path |
//! | [`Backend`] | Per-database binding and execution (`Sqlite`, `Postgres`) |
//! | [`SqlxErrorExt`] | Extension trait to convert `sqlx::Error` → `DataError` (`.into_data_error()`) |
//!
//! # Feature flags
//!
//! | Feature    | Driver |
//! |------------|--------|
//! | `sqlite`   | SQLite via `sqlx/sqlite` (default) |
//! | `postgres` | PostgreSQL via `sqlx/postgres` |
//!
//! # Quick start
//!
//! ```ignore
//! use ormq_data_sqlx::prelude::*;
//! use sqlx::Sqlite;
//!
//! let config = DataConfig::load("dev")?;
//! let provider = SessionProvider::<Sqlite>::connect(&config).await?;
//! provider.install_audit_table().await?;
//!
//! let people = CrudRepository::<Person, Sqlite>::new(provider.clone());
//! let amrah = people
//!     .create(Record::new().set("name", "Amrah").set("country", "AZ"))
//!     .await?;
//!
//! let page = people
//!     .select_with_pagination(1, 20, Predicate::eq("country", "AZ"))
//!     .await?;
//! ```
//!
//! # Transactions
//!
//! Every façade operation without the `_in` suffix runs in its own session
//! and commits it. To group several operations, run them inside
//! [`SessionProvider::transactional`] and use the `_in` variants; the whole
//! unit commits together or not at all, audit records included.
//!
//! # Error bridging
//!
//! Due to Rust's orphan rules, `From<sqlx::Error> for DataError` can't be
//! implemented here. Use the [`SqlxErrorExt`] trait instead:
//!
//! ```ignore
//! use ormq_data_sqlx::SqlxErrorExt;
//!
//! let pool = sqlx::SqlitePool::connect(url)
//!     .await
//!     .map_err(|e| e.into_data_error())?;
//! ```

pub mod audit;
pub mod backend;
pub mod error;
pub mod repository;
pub mod session;

pub use audit::AuditTrail;
pub use backend::Backend;
pub use error::{SqlxErrorExt, SqlxResult};
pub use repository::CrudRepository;
pub use session::{Session, SessionProvider};

/// Re-exports of the most commonly used types from both `ormq-data` and this crate.
pub mod prelude {
    pub use crate::{Backend, CrudRepository, Session, SessionProvider, SqlxErrorExt};
    pub use futures_util::FutureExt;
    pub use ormq_data::prelude::*;
}
