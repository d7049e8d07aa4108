//! ormq: an async ORM convenience layer over sqlx.
//!
//! This facade crate re-exports the ormq sub-crates through a single
//! dependency with feature flags. Import everything you need with:
//!
//! ```ignore
//! use ormq::prelude::*;
//! ```
//!
//! # Feature flags
//!
//! | Feature    | Default | Crate                        |
//! |------------|---------|------------------------------|
//! | `sqlite`   | **yes** | `ormq-data-sqlx/sqlite`      |
//! | `postgres` | no      | `ormq-data-sqlx/postgres`    |

// Re-export sub-crates as public modules so they're accessible as
// `ormq::ormq_data`, `ormq::ormq_data_sqlx` and `ormq::sqlx`.
pub use ormq_data;
pub use ormq_data_sqlx;
pub use sqlx;

pub use ormq_data::{
    AuditLog, DataConfig, DataError, Entity, FieldError, Filter, Operation, Page, PageRequest,
    Predicate, Query, Record, Repository, Schema, Validator, Value,
};
pub use ormq_data_sqlx::{Backend, CrudRepository, Session, SessionProvider, SqlxErrorExt};

/// Unified prelude: import everything with `use ormq::prelude::*`.
pub mod prelude {
    pub use ormq_data_sqlx::prelude::*;

    pub use ormq_data::{AuditLog, Operation};
}
