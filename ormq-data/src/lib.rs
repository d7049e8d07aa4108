pub mod audit;
pub mod config;
pub mod entity;
pub mod error;
pub mod page;
pub mod predicate;
pub mod query;
pub mod repository;
pub mod validation;
pub mod value;

pub use audit::{AuditEntry, AuditLog, Operation, PendingMutation, AUDIT_TABLE};
pub use config::{ConfigError, DataConfig};
pub use entity::{Entity, SOFT_DELETE_COLUMN};
pub use error::{DataError, FieldError};
pub use page::{Page, PageRequest};
pub use predicate::Predicate;
pub use query::{Dialect, Filter, Order, Query, SqlBuilder, Statement};
pub use repository::Repository;
pub use validation::{Schema, Validator};
pub use value::{Record, Value};

pub mod prelude {
    //! Re-exports of the most commonly used data types.
    pub use crate::{
        DataConfig, DataError, Entity, Filter, Page, PageRequest, Predicate, Query, Record,
        Repository, Schema, Value,
    };
}
