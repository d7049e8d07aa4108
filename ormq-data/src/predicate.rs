use crate::value::{Record, Value};

/// A composable boolean filter over entity fields.
///
/// Leaves compare a column with a value; `And` / `Or` / `Not` combine them.
/// Backends never see this tree directly: `SqlBuilder` renders it into a
/// parameterised `WHERE` clause.
///
/// ```ignore
/// let p = Predicate::eq("country", "AZ").and(Predicate::eq("name", "Amrah"));
/// let q = Predicate::eq("country", "EN").or(Predicate::is_in("country", ["RU", "AZ"]));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    Ne(String, Value),
    Gt(String, Value),
    Ge(String, Value),
    Lt(String, Value),
    Le(String, Value),
    Like(String, String),
    In(String, Vec<Value>),
    IsNull(String),
    IsNotNull(String),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Matches every row (an empty conjunction).
    pub fn all() -> Self {
        Predicate::And(Vec::new())
    }

    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Predicate::Eq(column.to_string(), value.into())
    }

    pub fn ne(column: &str, value: impl Into<Value>) -> Self {
        Predicate::Ne(column.to_string(), value.into())
    }

    pub fn gt(column: &str, value: impl Into<Value>) -> Self {
        Predicate::Gt(column.to_string(), value.into())
    }

    pub fn ge(column: &str, value: impl Into<Value>) -> Self {
        Predicate::Ge(column.to_string(), value.into())
    }

    pub fn lt(column: &str, value: impl Into<Value>) -> Self {
        Predicate::Lt(column.to_string(), value.into())
    }

    pub fn le(column: &str, value: impl Into<Value>) -> Self {
        Predicate::Le(column.to_string(), value.into())
    }

    pub fn like(column: &str, pattern: &str) -> Self {
        Predicate::Like(column.to_string(), pattern.to_string())
    }

    pub fn is_in<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::In(
            column.to_string(),
            values.into_iter().map(Into::into).collect(),
        )
    }

    pub fn is_null(column: &str) -> Self {
        Predicate::IsNull(column.to_string())
    }

    pub fn is_not_null(column: &str) -> Self {
        Predicate::IsNotNull(column.to_string())
    }

    /// Equality conjunction over every field of `record`.
    pub fn matching(record: &Record) -> Self {
        Predicate::And(
            record
                .iter()
                .map(|(col, val)| Predicate::Eq(col.to_string(), val.clone()))
                .collect(),
        )
    }

    /// Conjunction, flattening nested `And`s.
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::And(mut left), Predicate::And(right)) => {
                left.extend(right);
                Predicate::And(left)
            }
            (Predicate::And(mut left), other) => {
                left.push(other);
                Predicate::And(left)
            }
            (this, Predicate::And(mut right)) => {
                right.insert(0, this);
                Predicate::And(right)
            }
            (this, other) => Predicate::And(vec![this, other]),
        }
    }

    /// Disjunction, flattening nested `Or`s.
    pub fn or(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::Or(mut left), Predicate::Or(right)) => {
                left.extend(right);
                Predicate::Or(left)
            }
            (Predicate::Or(mut left), other) => {
                left.push(other);
                Predicate::Or(left)
            }
            (this, other) => Predicate::Or(vec![this, other]),
        }
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// True when the predicate accepts every row.
    pub fn is_trivial(&self) -> bool {
        match self {
            Predicate::And(parts) => parts.iter().all(Predicate::is_trivial),
            _ => false,
        }
    }

    /// Whether any leaf of the tree refers to `column`.
    pub fn references(&self, column: &str) -> bool {
        self.columns().any(|c| c == column)
    }

    /// All column names referenced by leaves, in tree order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out.into_iter()
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Eq(c, _)
            | Predicate::Ne(c, _)
            | Predicate::Gt(c, _)
            | Predicate::Ge(c, _)
            | Predicate::Lt(c, _)
            | Predicate::Le(c, _)
            | Predicate::Like(c, _)
            | Predicate::In(c, _)
            | Predicate::IsNull(c)
            | Predicate::IsNotNull(c) => out.push(c.as_str()),
            Predicate::And(parts) | Predicate::Or(parts) => {
                for part in parts {
                    part.collect_columns(out);
                }
            }
            Predicate::Not(inner) => inner.collect_columns(out),
        }
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Predicate::all()
    }
}
