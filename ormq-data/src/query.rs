use crate::predicate::Predicate;
use crate::value::{Record, Value};

/// SQL dialect; affects placeholder style and identifier quoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// SQLite-style `?` placeholders.
    Sqlite,
    /// Postgres-style `$1, $2, ...` placeholders.
    Postgres,
}

impl Dialect {
    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => "?".to_string(),
        }
    }

    fn quote_char(self) -> char {
        '"'
    }
}

/// A predicate plus the soft-delete visibility override for one call.
///
/// `include_deleted: None` defers to the repository's default for the
/// operation (reads exclude soft-deleted rows; updates follow the
/// `soft_delete.include_in_updates` setting; deletes include them).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub predicate: Predicate,
    pub include_deleted: Option<bool>,
}

impl Filter {
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            include_deleted: None,
        }
    }

    /// Match every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = Some(true);
        self
    }

    pub fn exclude_deleted(mut self) -> Self {
        self.include_deleted = Some(false);
        self
    }
}

impl From<Predicate> for Filter {
    fn from(predicate: Predicate) -> Self {
        Filter::new(predicate)
    }
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: true,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: false,
        }
    }

    /// Parse `"name"` (ascending) or `"-name"` (descending).
    pub fn parse(term: &str) -> Self {
        match term.strip_prefix('-') {
            Some(column) => Order::desc(column),
            None => Order::asc(term),
        }
    }
}

/// A read query: filter, ordering and window.
///
/// # Example
///
/// ```ignore
/// let q = Query::filter(Predicate::eq("country", "AZ"))
///     .order_by("-name")
///     .limit(10);
/// let people = repo.select_all(q).await?;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub order: Vec<Order>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(filter: impl Into<Filter>) -> Self {
        Self {
            filter: filter.into(),
            ..Self::default()
        }
    }

    /// Add an ordering term; a leading `-` sorts descending.
    pub fn order_by(mut self, term: &str) -> Self {
        self.order.push(Order::parse(term));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn include_deleted(mut self) -> Self {
        self.filter.include_deleted = Some(true);
        self
    }
}

impl From<Predicate> for Query {
    fn from(predicate: Predicate) -> Self {
        Query::filter(predicate)
    }
}

impl From<Filter> for Query {
    fn from(filter: Filter) -> Self {
        Query::filter(filter)
    }
}

/// A rendered statement: SQL text plus positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    /// A statement without parameters (DDL and the like).
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    InvalidIdentifier { kind: &'static str, ident: String },
    EmptyChangeSet,
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::InvalidIdentifier { kind, ident } => {
                write!(f, "Invalid {kind} identifier: {ident}")
            }
            QueryError::EmptyChangeSet => write!(f, "Update has no columns to set"),
        }
    }
}

impl std::error::Error for QueryError {}

/// Parameter accumulator shared by every clause of one statement, so
/// placeholder numbering stays consistent across `SET` and `WHERE`.
struct Params {
    dialect: Dialect,
    values: Vec<Value>,
}

impl Params {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            values: Vec::new(),
        }
    }

    fn push(&mut self, value: Value) -> String {
        self.values.push(value);
        self.dialect.placeholder(self.values.len())
    }
}

/// Renders statements for a single table.
///
/// Every identifier is validated against a conservative pattern and quoted
/// with the dialect's quoting style; values always travel as bound
/// parameters.
///
/// ```ignore
/// let stmt = SqlBuilder::new("people", Dialect::Postgres)
///     .select(&Predicate::eq("country", "AZ"), &[Order::asc("id")], Some(10), None)?;
/// assert_eq!(stmt.sql, r#"SELECT * FROM "people" WHERE "country" = $1 ORDER BY "id" ASC LIMIT 10"#);
/// ```
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    table: String,
    dialect: Dialect,
}

impl SqlBuilder {
    pub fn new(table: &str, dialect: Dialect) -> Self {
        Self {
            table: table.to_string(),
            dialect,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn select(
        &self,
        predicate: &Predicate,
        order: &[Order],
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Statement, QueryError> {
        let table = self.ident(&self.table, "table")?;
        let mut params = Params::new(self.dialect);
        let mut sql = format!("SELECT * FROM {table}");
        self.append_where(&mut sql, predicate, &mut params)?;
        self.append_order(&mut sql, order)?;
        append_limit_offset(&mut sql, self.dialect, limit, offset);
        Ok(Statement {
            sql,
            params: params.values,
        })
    }

    pub fn count(&self, predicate: &Predicate) -> Result<Statement, QueryError> {
        let table = self.ident(&self.table, "table")?;
        let mut params = Params::new(self.dialect);
        let mut sql = format!("SELECT COUNT(*) FROM {table}");
        self.append_where(&mut sql, predicate, &mut params)?;
        Ok(Statement {
            sql,
            params: params.values,
        })
    }

    /// `INSERT ... RETURNING *`, so generated columns come back with the row.
    pub fn insert(&self, values: &Record) -> Result<Statement, QueryError> {
        let table = self.ident(&self.table, "table")?;
        if values.is_empty() {
            return Ok(Statement::raw(format!(
                "INSERT INTO {table} DEFAULT VALUES RETURNING *"
            )));
        }
        let mut params = Params::new(self.dialect);
        let mut columns = Vec::with_capacity(values.len());
        let mut placeholders = Vec::with_capacity(values.len());
        for (column, value) in values.iter() {
            columns.push(self.ident(column, "column")?);
            placeholders.push(params.push(value.clone()));
        }
        Ok(Statement {
            sql: format!(
                "INSERT INTO {table} ({}) VALUES ({}) RETURNING *",
                columns.join(", "),
                placeholders.join(", ")
            ),
            params: params.values,
        })
    }

    /// `INSERT` without `RETURNING`, for append-only writes.
    pub fn append(&self, values: &Record) -> Result<Statement, QueryError> {
        let mut stmt = self.insert(values)?;
        if let Some(stripped) = stmt.sql.strip_suffix(" RETURNING *") {
            stmt.sql = stripped.to_string();
        }
        Ok(stmt)
    }

    pub fn update(&self, changes: &Record, predicate: &Predicate) -> Result<Statement, QueryError> {
        if changes.is_empty() {
            return Err(QueryError::EmptyChangeSet);
        }
        let table = self.ident(&self.table, "table")?;
        let mut params = Params::new(self.dialect);
        let mut assignments = Vec::with_capacity(changes.len());
        for (column, value) in changes.iter() {
            let column = self.ident(column, "column")?;
            let placeholder = params.push(value.clone());
            assignments.push(format!("{column} = {placeholder}"));
        }
        let mut sql = format!("UPDATE {table} SET {}", assignments.join(", "));
        self.append_where(&mut sql, predicate, &mut params)?;
        Ok(Statement {
            sql,
            params: params.values,
        })
    }

    /// `UPDATE ... RETURNING *`: the matched rows come back with their
    /// post-update values.
    pub fn update_returning(
        &self,
        changes: &Record,
        predicate: &Predicate,
    ) -> Result<Statement, QueryError> {
        let mut stmt = self.update(changes, predicate)?;
        stmt.sql.push_str(" RETURNING *");
        Ok(stmt)
    }

    /// `DELETE ... RETURNING *`: the removed rows come back as they were.
    pub fn delete_returning(&self, predicate: &Predicate) -> Result<Statement, QueryError> {
        let mut stmt = self.delete(predicate)?;
        stmt.sql.push_str(" RETURNING *");
        Ok(stmt)
    }

    pub fn delete(&self, predicate: &Predicate) -> Result<Statement, QueryError> {
        let table = self.ident(&self.table, "table")?;
        let mut params = Params::new(self.dialect);
        let mut sql = format!("DELETE FROM {table}");
        self.append_where(&mut sql, predicate, &mut params)?;
        Ok(Statement {
            sql,
            params: params.values,
        })
    }

    fn append_where(
        &self,
        sql: &mut String,
        predicate: &Predicate,
        params: &mut Params,
    ) -> Result<(), QueryError> {
        if predicate.is_trivial() {
            return Ok(());
        }
        sql.push_str(" WHERE ");
        let clause = self.render(predicate, params)?;
        sql.push_str(&clause);
        Ok(())
    }

    fn render(&self, predicate: &Predicate, params: &mut Params) -> Result<String, QueryError> {
        let rendered = match predicate {
            Predicate::Eq(col, Value::Null) => format!("{} IS NULL", self.ident(col, "column")?),
            Predicate::Ne(col, Value::Null) => {
                format!("{} IS NOT NULL", self.ident(col, "column")?)
            }
            Predicate::Eq(col, val) => self.compare(col, "=", val, params)?,
            Predicate::Ne(col, val) => self.compare(col, "!=", val, params)?,
            Predicate::Gt(col, val) => self.compare(col, ">", val, params)?,
            Predicate::Ge(col, val) => self.compare(col, ">=", val, params)?,
            Predicate::Lt(col, val) => self.compare(col, "<", val, params)?,
            Predicate::Le(col, val) => self.compare(col, "<=", val, params)?,
            Predicate::Like(col, pattern) => {
                self.compare(col, "LIKE", &Value::Text(pattern.clone()), params)?
            }
            Predicate::In(col, vals) => {
                let col = self.ident(col, "column")?;
                if vals.is_empty() {
                    "1 = 0".to_string()
                } else {
                    let placeholders: Vec<_> =
                        vals.iter().map(|v| params.push(v.clone())).collect();
                    format!("{col} IN ({})", placeholders.join(", "))
                }
            }
            Predicate::IsNull(col) => format!("{} IS NULL", self.ident(col, "column")?),
            Predicate::IsNotNull(col) => format!("{} IS NOT NULL", self.ident(col, "column")?),
            Predicate::And(parts) => self.join(parts, " AND ", "1 = 1", params)?,
            Predicate::Or(parts) => self.join(parts, " OR ", "1 = 0", params)?,
            Predicate::Not(inner) => format!("NOT ({})", self.render(inner, params)?),
        };
        Ok(rendered)
    }

    fn compare(
        &self,
        col: &str,
        op: &str,
        value: &Value,
        params: &mut Params,
    ) -> Result<String, QueryError> {
        let col = self.ident(col, "column")?;
        let placeholder = params.push(value.clone());
        Ok(format!("{col} {op} {placeholder}"))
    }

    fn join(
        &self,
        parts: &[Predicate],
        sep: &str,
        empty: &str,
        params: &mut Params,
    ) -> Result<String, QueryError> {
        match parts {
            [] => Ok(empty.to_string()),
            [single] => self.render(single, params),
            _ => {
                let mut rendered = Vec::with_capacity(parts.len());
                for part in parts {
                    rendered.push(self.render(part, params)?);
                }
                Ok(format!("({})", rendered.join(sep)))
            }
        }
    }

    fn append_order(&self, sql: &mut String, order: &[Order]) -> Result<(), QueryError> {
        if order.is_empty() {
            return Ok(());
        }
        sql.push_str(" ORDER BY ");
        let mut clauses = Vec::with_capacity(order.len());
        for term in order {
            let col = self.ident(&term.column, "column")?;
            if term.ascending {
                clauses.push(format!("{col} ASC"));
            } else {
                clauses.push(format!("{col} DESC"));
            }
        }
        sql.push_str(&clauses.join(", "));
        Ok(())
    }

    fn ident(&self, ident: &str, kind: &'static str) -> Result<String, QueryError> {
        if !is_valid_identifier(ident) {
            return Err(QueryError::InvalidIdentifier {
                kind,
                ident: ident.to_string(),
            });
        }
        Ok(quote_identifier(ident, self.dialect))
    }
}

fn append_limit_offset(sql: &mut String, dialect: Dialect, limit: Option<u64>, offset: Option<u64>) {
    match (limit, dialect) {
        (Some(limit), _) => sql.push_str(&format!(" LIMIT {limit}")),
        // SQLite only accepts OFFSET after a LIMIT clause.
        (None, Dialect::Sqlite) if offset.is_some() => sql.push_str(" LIMIT -1"),
        (None, _) => {}
    }
    if let Some(offset) = offset {
        sql.push_str(&format!(" OFFSET {offset}"));
    }
}

pub(crate) fn is_valid_identifier(ident: &str) -> bool {
    !ident.is_empty() && ident.split('.').all(is_valid_segment)
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote_identifier(ident: &str, dialect: Dialect) -> String {
    let quote = dialect.quote_char();
    ident
        .split('.')
        .map(|part| format!("{quote}{part}{quote}"))
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people(dialect: Dialect) -> SqlBuilder {
        SqlBuilder::new("people", dialect)
    }

    #[test]
    fn test_simple_select() {
        let stmt = people(Dialect::Sqlite)
            .select(&Predicate::all(), &[], None, None)
            .unwrap();
        assert_eq!(stmt.sql, r#"SELECT * FROM "people""#);
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_where_eq() {
        let stmt = people(Dialect::Sqlite)
            .select(&Predicate::eq("email", "a@b.com"), &[], None, None)
            .unwrap();
        assert_eq!(stmt.sql, r#"SELECT * FROM "people" WHERE "email" = ?"#);
        assert_eq!(stmt.params, vec![Value::Text("a@b.com".into())]);
    }

    #[test]
    fn test_complex_query() {
        let predicate = Predicate::eq("status", "active").and(Predicate::like("name", "%alice%"));
        let stmt = people(Dialect::Sqlite)
            .select(&predicate, &[Order::asc("id")], Some(10), Some(20))
            .unwrap();
        assert_eq!(
            stmt.sql,
            r#"SELECT * FROM "people" WHERE ("status" = ? AND "name" LIKE ?) ORDER BY "id" ASC LIMIT 10 OFFSET 20"#
        );
        assert_eq!(
            stmt.params,
            vec![Value::Text("active".into()), Value::Text("%alice%".into())]
        );
    }

    #[test]
    fn test_nested_or_and_not() {
        let predicate = Predicate::eq("country", "AZ")
            .or(Predicate::eq("country", "EN"))
            .and(Predicate::is_null("deleted_at").negate());
        let stmt = people(Dialect::Postgres)
            .count(&predicate)
            .unwrap();
        assert_eq!(
            stmt.sql,
            r#"SELECT COUNT(*) FROM "people" WHERE (("country" = $1 OR "country" = $2) AND NOT ("deleted_at" IS NULL))"#
        );
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn test_postgres_placeholders_span_set_and_where() {
        let changes = Record::new().set("name", "Ulvi").set("country", "AZ");
        let predicate = Predicate::eq("status", "active").and(Predicate::is_in("role", ["admin", "user"]));
        let stmt = people(Dialect::Postgres).update(&changes, &predicate).unwrap();
        assert_eq!(
            stmt.sql,
            r#"UPDATE "people" SET "country" = $1, "name" = $2 WHERE ("status" = $3 AND "role" IN ($4, $5))"#
        );
        assert_eq!(stmt.params.len(), 5);
    }

    #[test]
    fn test_update_and_delete_returning() {
        let predicate = Predicate::eq("country", "AZ");
        let changes = Record::new().set("country", "EN");
        let stmt = people(Dialect::Postgres)
            .update_returning(&changes, &predicate)
            .unwrap();
        assert_eq!(
            stmt.sql,
            r#"UPDATE "people" SET "country" = $1 WHERE "country" = $2 RETURNING *"#
        );

        let stmt = people(Dialect::Sqlite).delete_returning(&Predicate::all()).unwrap();
        assert_eq!(stmt.sql, r#"DELETE FROM "people" RETURNING *"#);
    }

    #[test]
    fn test_insert_returning() {
        let values = Record::new().set("name", "Amrah").set("is_deleted", false);
        let stmt = people(Dialect::Sqlite).insert(&values).unwrap();
        assert_eq!(
            stmt.sql,
            r#"INSERT INTO "people" ("is_deleted", "name") VALUES (?, ?) RETURNING *"#
        );
        assert_eq!(stmt.params, vec![Value::Bool(false), Value::Text("Amrah".into())]);

        let stmt = people(Dialect::Sqlite).append(&values).unwrap();
        assert!(!stmt.sql.contains("RETURNING"));
    }

    #[test]
    fn test_empty_insert_uses_default_values() {
        let stmt = people(Dialect::Postgres).insert(&Record::new()).unwrap();
        assert_eq!(stmt.sql, r#"INSERT INTO "people" DEFAULT VALUES RETURNING *"#);
    }

    #[test]
    fn test_empty_in_and_or_never_match() {
        let stmt = people(Dialect::Sqlite)
            .delete(&Predicate::In("id".into(), Vec::new()))
            .unwrap();
        assert_eq!(stmt.sql, r#"DELETE FROM "people" WHERE 1 = 0"#);

        let stmt = people(Dialect::Sqlite)
            .delete(&Predicate::Or(Vec::new()))
            .unwrap();
        assert_eq!(stmt.sql, r#"DELETE FROM "people" WHERE 1 = 0"#);
    }

    #[test]
    fn test_null_equality_renders_is_null() {
        let stmt = people(Dialect::Sqlite)
            .select(&Predicate::eq("email", Value::Null), &[], None, None)
            .unwrap();
        assert_eq!(stmt.sql, r#"SELECT * FROM "people" WHERE "email" IS NULL"#);
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_empty_update_rejected() {
        let err = people(Dialect::Sqlite)
            .update(&Record::new(), &Predicate::all())
            .unwrap_err();
        assert_eq!(err, QueryError::EmptyChangeSet);
    }

    #[test]
    fn test_invalid_identifier() {
        let err = SqlBuilder::new("people;drop", Dialect::Sqlite)
            .select(&Predicate::all(), &[], None, None)
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidIdentifier { kind: "table", .. }));

        let err = people(Dialect::Sqlite)
            .select(&Predicate::eq("name = 1 OR 1", 1), &[], None, None)
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidIdentifier { kind: "column", .. }));
    }

    #[test]
    fn test_offset_without_limit() {
        let stmt = people(Dialect::Sqlite)
            .select(&Predicate::all(), &[], None, Some(5))
            .unwrap();
        assert_eq!(stmt.sql, r#"SELECT * FROM "people" LIMIT -1 OFFSET 5"#);

        let stmt = people(Dialect::Postgres)
            .select(&Predicate::all(), &[], None, Some(5))
            .unwrap();
        assert_eq!(stmt.sql, r#"SELECT * FROM "people" OFFSET 5"#);
    }

    #[test]
    fn test_order_parse() {
        assert_eq!(Order::parse("-name"), Order::desc("name"));
        assert_eq!(Order::parse("name"), Order::asc("name"));
        let q = Query::all().order_by("-created_at").order_by("id");
        assert_eq!(q.order, vec![Order::desc("created_at"), Order::asc("id")]);
    }

    #[test]
    fn test_qualified_identifier_quoting() {
        let stmt = people(Dialect::Postgres)
            .select(&Predicate::eq("people.email", "a@b.com"), &[], None, None)
            .unwrap();
        assert_eq!(
            stmt.sql,
            r#"SELECT * FROM "people" WHERE "people"."email" = $1"#
        );
    }
}
