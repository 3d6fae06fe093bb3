mod connection;

pub use connection::*;

use std::fmt;

/// A single cell, either bound into a statement or read back from a row.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Inline SQL form used when a statement is rendered for the log.
    ///
    /// Text is wrapped in double quotes verbatim, without escaping, so the
    /// result is not safe to execute.
    pub fn literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(v) => v.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => format!("{:?}", v),
            Self::Text(v) => format!("\"{}\"", v),
            Self::Bytes(v) => format!("X'{}'", hex::encode(v)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{}", v),
            Self::Bytes(v) => write!(f, "0x{}", hex::encode(v)),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Int(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Renders a row like a tuple, `(1, "a")`.
pub fn format_row(row: &[Value]) -> String {
    let cells: Vec<String> = row.iter().map(Value::literal).collect();
    format!("({})", cells.join(", "))
}

/// Result handle of the last executed statement.
///
/// Rows are buffered when the statement runs and handed out once: fetching
/// drains them, the column names stay.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cursor {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    rows_affected: u64,
}

impl Cursor {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let rows_affected = rows.len() as u64;
        Self {
            columns,
            rows,
            rows_affected,
        }
    }

    pub fn with_rows_affected(mut self, rows_affected: u64) -> Self {
        self.rows_affected = rows_affected;
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    pub fn fetch_all(&mut self) -> Vec<Vec<Value>> {
        std::mem::take(&mut self.rows)
    }
}

/// Header plus rows, as returned by `select` and `cursor_info`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Looks up a cell by row index and column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(idx)
    }
}

const CONSTRAINT_KEYWORDS: &[&str] = &[
    "PRIMARY",
    "UNIQUE",
    "KEY",
    "INDEX",
    "CONSTRAINT",
    "FOREIGN",
    "CHECK",
    "FULLTEXT",
    "SPATIAL",
];

/// Ordered column names of one table, used to place positional values in
/// `update`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<String>,
}

impl TableSchema {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Derives column names from the body of a `CREATE TABLE`, e.g.
    /// `id INT, name VARCHAR(20), PRIMARY KEY (id)` yields `[id, name]`.
    pub fn from_column_defs(defs: &str) -> Self {
        let columns = split_top_level(defs)
            .into_iter()
            .filter_map(|def| def.split_whitespace().next())
            .filter(|name| {
                !CONSTRAINT_KEYWORDS
                    .iter()
                    .any(|kw| name.eq_ignore_ascii_case(kw))
            })
            .map(|name| name.trim_matches(|c| c == '`' || c == '"').to_string())
            .collect();
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn split_top_level(defs: &str) -> Vec<&str> {
    let mut parts = vec![];
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in defs.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(defs[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(defs[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_quotes_text_verbatim() {
        assert_eq!(Value::from("bob").literal(), "\"bob\"");
        assert_eq!(Value::from("say \"hi\"").literal(), "\"say \"hi\"\"");
        assert_eq!(Value::from(2).literal(), "2");
        assert_eq!(Value::from(1.5).literal(), "1.5");
        assert_eq!(Value::from(2.0).literal(), "2.0");
        assert_eq!(Value::from(None::<i32>).literal(), "NULL");
        assert_eq!(Value::from(vec![0xde, 0xad]).literal(), "X'dead'");
    }

    #[test]
    fn row_formats_as_tuple() {
        let row = vec![Value::from(1), Value::from("a")];
        assert_eq!(format_row(&row), "(1, \"a\")");
    }

    #[test]
    fn schema_from_simple_defs() {
        let schema = TableSchema::from_column_defs("id INT, name VARCHAR(20)");
        assert_eq!(schema.columns(), ["id", "name"]);
    }

    #[test]
    fn schema_skips_type_arguments_and_constraints() {
        let schema = TableSchema::from_column_defs(
            "id INT PRIMARY KEY, price DECIMAL(10, 2) NOT NULL, `title` TEXT, PRIMARY KEY (id)",
        );
        assert_eq!(schema.columns(), ["id", "price", "title"]);
    }

    #[test]
    fn cursor_fetch_drains_rows() {
        let mut cursor = Cursor::new(vec!["id".into()], vec![vec![Value::Int(1)]]);
        assert_eq!(cursor.fetch_all().len(), 1);
        assert!(cursor.fetch_all().is_empty());
        assert_eq!(cursor.columns(), ["id"]);
    }

    #[test]
    fn query_result_lookup_by_column() {
        let result = QueryResult {
            columns: vec!["id".into(), "name".into()],
            rows: vec![vec![Value::Int(7), Value::from("x")]],
        };
        assert_eq!(result.get(0, "name"), Some(&Value::from("x")));
        assert_eq!(result.get(0, "missing"), None);
        assert_eq!(result.get(1, "id"), None);
    }
}
