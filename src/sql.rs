use std::fmt;

use crate::db::{TableSchema, Value};

/// Placeholder syntax of the target driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placeholder {
    /// `?` (MySQL, SQLite)
    QuestionMark,
    /// `$1`, `$2`, ... (PostgreSQL)
    Dollar,
}

impl Placeholder {
    /// PostgreSQL types every bound parameter, so text and NULL go inline as
    /// untyped literals and take the type of the column they meet.
    pub fn binds(self, value: &Value) -> bool {
        match self {
            Self::QuestionMark => true,
            Self::Dollar => !matches!(value, Value::Null | Value::Text(_)),
        }
    }
}

/// Standard SQL literal for values sent inline: single quotes, embedded
/// quotes doubled.
fn escaped_literal(value: &Value) -> String {
    match value {
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        other => other.literal(),
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Part {
    Sql(String),
    Param(Value),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Statement {
    parts: Vec<Part>,
}

impl Statement {
    /// Wraps SQL text that carries no bound values.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::Sql(sql.into())],
        }
    }

    fn push_sql(&mut self, sql: &str) -> &mut Self {
        match self.parts.last_mut() {
            Some(Part::Sql(s)) => s.push_str(sql),
            _ => self.parts.push(Part::Sql(sql.to_string())),
        }
        self
    }

    fn push_param(&mut self, value: Value) -> &mut Self {
        self.parts.push(Part::Param(value));
        self
    }

    /// SQL text with placeholders in the given style.
    pub fn sql(&self, style: Placeholder) -> String {
        let mut out = String::new();
        let mut n = 0;
        for part in &self.parts {
            match part {
                Part::Sql(s) => out.push_str(s),
                Part::Param(v) if !style.binds(v) => out.push_str(&escaped_literal(v)),
                Part::Param(_) => {
                    n += 1;
                    match style {
                        Placeholder::QuestionMark => out.push('?'),
                        Placeholder::Dollar => out.push_str(&format!("${}", n)),
                    }
                }
            }
        }
        out
    }

    pub fn params(&self) -> impl Iterator<Item = &Value> {
        self.parts.iter().filter_map(|p| match p {
            Part::Param(v) => Some(v),
            Part::Sql(_) => None,
        })
    }

    /// The values that stay placeholders in [`Statement::sql`] for `style`,
    /// in placeholder order.
    pub fn bound(&self, style: Placeholder) -> impl Iterator<Item = &Value> {
        self.params().filter(move |v| style.binds(v))
    }

    /// Inline form with every value spelled out via [`Value::literal`].
    pub fn render(&self) -> String {
        self.parts
            .iter()
            .map(|p| match p {
                Part::Sql(s) => s.clone(),
                Part::Param(v) => v.literal(),
            })
            .collect()
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Equality filter, AND-combined in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Condition(Vec<(String, Value)>);

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((column.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K, V> FromIterator<(K, V)> for Condition
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

fn push_where(statement: &mut Statement, condition: &Condition) {
    statement.push_sql(" WHERE ");
    for (i, (column, value)) in condition.iter().enumerate() {
        if i > 0 {
            statement.push_sql(" AND ");
        }
        statement.push_sql(&format!("{}=", column));
        statement.push_param(value.clone());
    }
}

pub fn create_table(table: &str, column_defs: &str) -> Statement {
    Statement::raw(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table, column_defs
    ))
}

pub fn drop_table(table: &str) -> Statement {
    Statement::raw(format!("DROP TABLE IF EXISTS {}", table))
}

pub fn insert(table: &str, values: &[Value]) -> Statement {
    let mut statement = Statement::raw(format!("INSERT INTO {} VALUES(", table));
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            statement.push_sql(",");
        }
        statement.push_param(value.clone());
    }
    statement.push_sql(")");
    statement
}

/// `UPDATE table SET c1=v1,c2=v2 WHERE ...`, pairing `values` with the
/// schema columns by position. Returns `None` when there are more values
/// than columns.
pub fn update(
    table: &str,
    schema: &TableSchema,
    values: &[Value],
    condition: &Condition,
) -> Option<Statement> {
    if values.len() > schema.len() {
        return None;
    }

    let mut statement = Statement::raw(format!("UPDATE {} SET ", table));
    for (i, (column, value)) in schema.columns().iter().zip(values).enumerate() {
        if i > 0 {
            statement.push_sql(",");
        }
        statement.push_sql(&format!("{}=", column));
        statement.push_param(value.clone());
    }
    push_where(&mut statement, condition);
    Some(statement)
}

pub fn delete(table: &str, condition: &Condition) -> Statement {
    let mut statement = Statement::raw(format!("DELETE FROM {}", table));
    push_where(&mut statement, condition);
    statement
}

pub fn select_all(table: &str) -> Statement {
    Statement::raw(format!("SELECT * FROM {}", table))
}

pub fn select(table: &str, condition: &Condition, fields: &str) -> Statement {
    let mut statement = Statement::raw(format!("SELECT {} FROM {}", fields, table));
    push_where(&mut statement, condition);
    statement
}
