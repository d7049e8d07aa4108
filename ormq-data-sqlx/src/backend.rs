//! Driver seam: binds [`Value`]s and runs rendered [`Statement`]s on one
//! concrete `sqlx` database.
//!
//! `sqlx` executors are only usable through concrete connection types, so
//! each supported database implements [`Backend`] and the generic layers
//! above (`Session`, `CrudRepository`) only ever call through this trait.

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use ormq_data::{Dialect, Statement, Value};
use sqlx::types::Json;
use sqlx::{Arguments, Database, Encode, FromRow, Type};

pub trait Backend: Database + Sync {
    /// Placeholder style used when rendering statements for this database.
    const DIALECT: Dialect;

    /// `CREATE TABLE IF NOT EXISTS` for the audit table.
    const AUDIT_TABLE_DDL: &'static str;

    fn fetch_all<'c, T>(
        conn: &'c mut Self::Connection,
        stmt: Statement,
    ) -> BoxFuture<'c, Result<Vec<T>, sqlx::Error>>
    where
        T: for<'r> FromRow<'r, Self::Row> + Send + Unpin + 'static;

    /// Run a statement whose single result column is an integer count.
    fn fetch_count<'c>(
        conn: &'c mut Self::Connection,
        stmt: Statement,
    ) -> BoxFuture<'c, Result<i64, sqlx::Error>>;

    /// Run a statement and return the number of affected rows.
    fn execute<'c>(
        conn: &'c mut Self::Connection,
        stmt: Statement,
    ) -> BoxFuture<'c, Result<u64, sqlx::Error>>;
}

/// Bind every parameter in order.
///
/// `NULL` is bound as a nullable text value.
fn arguments<'q, DB>(params: Vec<Value>) -> Result<DB::Arguments<'q>, sqlx::Error>
where
    DB: Database,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
    Option<String>: Encode<'q, DB> + Type<DB>,
    DateTime<Utc>: Encode<'q, DB> + Type<DB>,
    Json<serde_json::Value>: Encode<'q, DB> + Type<DB>,
{
    let mut args = <DB::Arguments<'q> as Default>::default();
    for value in params {
        let bound = match value {
            Value::Null => args.add(Option::<String>::None),
            Value::Bool(v) => args.add(v),
            Value::Int(v) => args.add(v),
            Value::Float(v) => args.add(v),
            Value::Text(v) => args.add(v),
            Value::Timestamp(v) => args.add(v),
            Value::Json(v) => args.add(Json(v)),
        };
        bound.map_err(sqlx::Error::Encode)?;
    }
    Ok(args)
}

#[cfg(feature = "sqlite")]
impl Backend for sqlx::Sqlite {
    const DIALECT: Dialect = Dialect::Sqlite;

    const AUDIT_TABLE_DDL: &'static str = r#"CREATE TABLE IF NOT EXISTS "audit_logs" (
    "id" INTEGER PRIMARY KEY AUTOINCREMENT,
    "table_name" TEXT NOT NULL,
    "entity_id" TEXT NOT NULL,
    "operation" TEXT NOT NULL,
    "changes" TEXT NOT NULL,
    "recorded_at" TEXT NOT NULL
)"#;

    fn fetch_all<'c, T>(
        conn: &'c mut Self::Connection,
        stmt: Statement,
    ) -> BoxFuture<'c, Result<Vec<T>, sqlx::Error>>
    where
        T: for<'r> FromRow<'r, Self::Row> + Send + Unpin + 'static,
    {
        Box::pin(async move {
            let args = arguments::<sqlx::Sqlite>(stmt.params)?;
            sqlx::query_as_with::<_, T, _>(&stmt.sql, args)
                .fetch_all(conn)
                .await
        })
    }

    fn fetch_count<'c>(
        conn: &'c mut Self::Connection,
        stmt: Statement,
    ) -> BoxFuture<'c, Result<i64, sqlx::Error>> {
        Box::pin(async move {
            let args = arguments::<sqlx::Sqlite>(stmt.params)?;
            sqlx::query_scalar_with::<_, i64, _>(&stmt.sql, args)
                .fetch_one(conn)
                .await
        })
    }

    fn execute<'c>(
        conn: &'c mut Self::Connection,
        stmt: Statement,
    ) -> BoxFuture<'c, Result<u64, sqlx::Error>> {
        Box::pin(async move {
            let args = arguments::<sqlx::Sqlite>(stmt.params)?;
            let result = sqlx::query_with(&stmt.sql, args).execute(conn).await?;
            Ok(result.rows_affected())
        })
    }
}

#[cfg(feature = "postgres")]
impl Backend for sqlx::Postgres {
    const DIALECT: Dialect = Dialect::Postgres;

    const AUDIT_TABLE_DDL: &'static str = r#"CREATE TABLE IF NOT EXISTS "audit_logs" (
    "id" BIGSERIAL PRIMARY KEY,
    "table_name" TEXT NOT NULL,
    "entity_id" TEXT NOT NULL,
    "operation" TEXT NOT NULL,
    "changes" JSONB NOT NULL,
    "recorded_at" TIMESTAMPTZ NOT NULL
)"#;

    fn fetch_all<'c, T>(
        conn: &'c mut Self::Connection,
        stmt: Statement,
    ) -> BoxFuture<'c, Result<Vec<T>, sqlx::Error>>
    where
        T: for<'r> FromRow<'r, Self::Row> + Send + Unpin + 'static,
    {
        Box::pin(async move {
            let args = arguments::<sqlx::Postgres>(stmt.params)?;
            sqlx::query_as_with::<_, T, _>(&stmt.sql, args)
                .fetch_all(conn)
                .await
        })
    }

    fn fetch_count<'c>(
        conn: &'c mut Self::Connection,
        stmt: Statement,
    ) -> BoxFuture<'c, Result<i64, sqlx::Error>> {
        Box::pin(async move {
            let args = arguments::<sqlx::Postgres>(stmt.params)?;
            sqlx::query_scalar_with::<_, i64, _>(&stmt.sql, args)
                .fetch_one(conn)
                .await
        })
    }

    fn execute<'c>(
        conn: &'c mut Self::Connection,
        stmt: Statement,
    ) -> BoxFuture<'c, Result<u64, sqlx::Error>> {
        Box::pin(async move {
            let args = arguments::<sqlx::Postgres>(stmt.params)?;
            let result = sqlx::query_with(&stmt.sql, args).execute(conn).await?;
            Ok(result.rows_affected())
        })
    }
}
