use std::str::FromStr;

use anyhow::{Result, anyhow};
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{
    Column, ConnectOptions, Connection, Either, Executor, Row, Statement as _, TypeInfo, ValueRef,
};

use super::{Cursor, Value};
use crate::config::{ConnectionConfig, Driver};
use crate::sql::{Placeholder, Statement};

/// One live connection to one of the supported servers.
pub enum DatabaseConnection {
    Postgres(PgConnection),
    MySql(MySqlConnection),
    Sqlite(SqliteConnection),
}

macro_rules! bind_values {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for value in $params {
            query = match value {
                Value::Null => query.bind(None::<String>),
                Value::Bool(v) => query.bind(*v),
                Value::Int(v) => query.bind(*v),
                Value::Float(v) => query.bind(*v),
                Value::Text(v) => query.bind(v.as_str()),
                Value::Bytes(v) => query.bind(v.as_slice()),
            };
        }
        query
    }};
}

/// Runs `$statement` in its own transaction on `$conn`: commit on success,
/// rollback on failure. Every result set and rows-affected count the driver
/// streams back lands in the cursor; the header comes from the prepared
/// statement so an empty result still has one.
macro_rules! run_in_transaction {
    ($db:ty, $conn:expr, $statement:expr, $style:expr, $extract:path) => {{
        let statement: &Statement = $statement;
        let style: Placeholder = $style;
        let sql = statement.sql(style);
        let mut tx = $conn.begin().await?;

        let outcome = async {
            let columns: Vec<String> = (&mut *tx)
                .prepare(&sql)
                .await?
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect();

            let query = bind_values!(sqlx::query::<$db>(&sql), statement.bound(style));
            let mut results = (&mut *tx).fetch_many(query);
            let mut data: Vec<Vec<Value>> = Vec::new();
            let mut rows_affected = 0;
            while let Some(step) = results.try_next().await? {
                match step {
                    Either::Left(done) => rows_affected += done.rows_affected(),
                    Either::Right(row) => {
                        data.push((0..row.len()).map(|idx| $extract(&row, idx)).collect())
                    }
                }
            }
            drop(results);

            Ok::<Cursor, sqlx::Error>(Cursor::new(columns, data).with_rows_affected(rows_affected))
        }
        .await;

        match outcome {
            Ok(cursor) => {
                tx.commit().await?;
                Ok(cursor)
            }
            Err(e) => Err(rolled_back(e, tx.rollback().await)),
        }
    }};
}

/// The execute error, with the rollback error appended when that failed too.
fn rolled_back(error: sqlx::Error, rollback: Result<(), sqlx::Error>) -> anyhow::Error {
    match rollback {
        Ok(()) => error.into(),
        Err(r) => anyhow!("{}; rollback failed: {}", error, r),
    }
}

impl DatabaseConnection {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        match config.driver {
            Driver::Postgres => {
                let conn = PgConnectOptions::new()
                    .host(&config.host)
                    .port(config.port)
                    .username(&config.user)
                    .password(&config.password)
                    .database(&config.database)
                    .connect()
                    .await?;
                Ok(Self::Postgres(conn))
            }
            Driver::MySql => {
                let conn = MySqlConnectOptions::new()
                    .host(&config.host)
                    .port(config.port)
                    .username(&config.user)
                    .password(&config.password)
                    .database(&config.database)
                    .charset(&config.charset)
                    .connect()
                    .await?;
                Ok(Self::MySql(conn))
            }
            Driver::Sqlite => {
                let options = if config.is_memory() {
                    SqliteConnectOptions::from_str("sqlite::memory:")?
                } else {
                    SqliteConnectOptions::new()
                        .filename(&config.database)
                        .create_if_missing(true)
                };
                let conn = options.connect().await?;
                Ok(Self::Sqlite(conn))
            }
        }
    }

    pub fn placeholder(&self) -> Placeholder {
        match self {
            Self::Postgres(_) => Placeholder::Dollar,
            Self::MySql(_) | Self::Sqlite(_) => Placeholder::QuestionMark,
        }
    }

    pub async fn ping(&mut self) -> Result<()> {
        match self {
            Self::Postgres(conn) => conn.ping().await?,
            Self::MySql(conn) => conn.ping().await?,
            Self::Sqlite(conn) => conn.ping().await?,
        }
        Ok(())
    }

    /// Executes one statement and buffers whatever it returns.
    pub async fn execute(&mut self, statement: &Statement) -> Result<Cursor> {
        let style = self.placeholder();
        match self {
            Self::Postgres(conn) => run_in_transaction!(sqlx::Postgres, conn, statement, style, pg_value),
            Self::MySql(conn) => run_in_transaction!(sqlx::MySql, conn, statement, style, mysql_value),
            Self::Sqlite(conn) => run_in_transaction!(sqlx::Sqlite, conn, statement, style, sqlite_value),
        }
    }

    pub async fn close(self) -> Result<()> {
        match self {
            Self::Postgres(conn) => conn.close().await?,
            Self::MySql(conn) => conn.close().await?,
            Self::Sqlite(conn) => conn.close().await?,
        }
        Ok(())
    }
}

fn pg_value(row: &sqlx::postgres::PgRow, idx: usize) -> Value {
    let value_ref = row.try_get_raw(idx).ok();

    if let Some(vr) = value_ref {
        if vr.is_null() {
            return Value::Null;
        }

        let type_info = vr.type_info().clone();
        let type_name = type_info.name();

        match type_name {
            "BOOL" => {
                if let Ok(v) = row.try_get::<bool, _>(idx) {
                    return Value::Bool(v);
                }
            }
            "INT2" | "SMALLINT" | "SMALLSERIAL" => {
                if let Ok(v) = row.try_get::<i16, _>(idx) {
                    return v.into();
                }
            }
            "INT4" | "INT" | "INTEGER" | "SERIAL" => {
                if let Ok(v) = row.try_get::<i32, _>(idx) {
                    return v.into();
                }
            }
            "INT8" | "BIGINT" | "BIGSERIAL" => {
                if let Ok(v) = row.try_get::<i64, _>(idx) {
                    return v.into();
                }
            }
            "FLOAT4" | "REAL" => {
                if let Ok(v) = row.try_get::<f32, _>(idx) {
                    return v.into();
                }
            }
            "FLOAT8" | "DOUBLE PRECISION" => {
                if let Ok(v) = row.try_get::<f64, _>(idx) {
                    return v.into();
                }
            }
            "NUMERIC" | "DECIMAL" => {
                if let Ok(v) = row.try_get::<sqlx::types::BigDecimal, _>(idx) {
                    return Value::Text(v.to_string());
                }
            }
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" | "INET" | "CIDR" => {
                if let Ok(v) = row.try_get::<String, _>(idx) {
                    return Value::Text(v);
                }
            }
            "UUID" => {
                if let Ok(v) = row.try_get::<sqlx::types::Uuid, _>(idx) {
                    return Value::Text(v.to_string());
                }
            }
            "DATE" => {
                if let Ok(v) = row.try_get::<sqlx::types::chrono::NaiveDate, _>(idx) {
                    return Value::Text(v.to_string());
                }
            }
            "TIME" | "TIMETZ" => {
                if let Ok(v) = row.try_get::<sqlx::types::chrono::NaiveTime, _>(idx) {
                    return Value::Text(v.to_string());
                }
            }
            "TIMESTAMP" => {
                if let Ok(v) = row.try_get::<sqlx::types::chrono::NaiveDateTime, _>(idx) {
                    return Value::Text(v.to_string());
                }
            }
            "TIMESTAMPTZ" => {
                if let Ok(v) = row.try_get::<sqlx::types::chrono::DateTime<sqlx::types::chrono::Utc>, _>(idx) {
                    return Value::Text(v.to_string());
                }
            }
            "JSON" | "JSONB" => {
                if let Ok(v) = row.try_get::<sqlx::types::JsonValue, _>(idx) {
                    return Value::Text(v.to_string());
                }
            }
            "BYTEA" => {
                if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
                    return Value::Bytes(v);
                }
            }
            _ => {}
        }
    }

    row.try_get::<String, _>(idx)
        .map(Value::Text)
        .or_else(|_| row.try_get::<i64, _>(idx).map(Value::Int))
        .or_else(|_| row.try_get::<i32, _>(idx).map(Value::from))
        .or_else(|_| row.try_get::<f64, _>(idx).map(Value::Float))
        .or_else(|_| row.try_get::<bool, _>(idx).map(Value::Bool))
        .unwrap_or(Value::Null)
}

fn mysql_value(row: &sqlx::mysql::MySqlRow, idx: usize) -> Value {
    let value_ref = row.try_get_raw(idx).ok();

    if let Some(vr) = value_ref {
        if vr.is_null() {
            return Value::Null;
        }

        let type_info = vr.type_info().clone();
        let type_name = type_info.name();

        match type_name {
            "BOOLEAN" | "TINYINT(1)" => {
                if let Ok(v) = row.try_get::<bool, _>(idx) {
                    return Value::Bool(v);
                }
            }
            "TINYINT" => {
                if let Ok(v) = row.try_get::<i8, _>(idx) {
                    return v.into();
                }
            }
            "SMALLINT" => {
                if let Ok(v) = row.try_get::<i16, _>(idx) {
                    return v.into();
                }
            }
            "INT" | "MEDIUMINT" => {
                if let Ok(v) = row.try_get::<i32, _>(idx) {
                    return v.into();
                }
            }
            "BIGINT" => {
                if let Ok(v) = row.try_get::<i64, _>(idx) {
                    return v.into();
                }
            }
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED" => {
                if let Ok(v) = row.try_get::<u32, _>(idx) {
                    return v.into();
                }
            }
            "BIGINT UNSIGNED" => {
                if let Ok(v) = row.try_get::<u64, _>(idx) {
                    return i64::try_from(v)
                        .map(Value::Int)
                        .unwrap_or_else(|_| Value::Text(v.to_string()));
                }
            }
            "FLOAT" => {
                if let Ok(v) = row.try_get::<f32, _>(idx) {
                    return v.into();
                }
            }
            "DOUBLE" => {
                if let Ok(v) = row.try_get::<f64, _>(idx) {
                    return v.into();
                }
            }
            "DECIMAL" => {
                if let Ok(v) = row.try_get::<sqlx::types::BigDecimal, _>(idx) {
                    return Value::Text(v.to_string());
                }
            }
            "VARCHAR" | "CHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
                if let Ok(v) = row.try_get::<String, _>(idx) {
                    return Value::Text(v);
                }
            }
            "DATE" => {
                if let Ok(v) = row.try_get::<sqlx::types::chrono::NaiveDate, _>(idx) {
                    return Value::Text(v.to_string());
                }
            }
            "TIME" => {
                if let Ok(v) = row.try_get::<sqlx::types::chrono::NaiveTime, _>(idx) {
                    return Value::Text(v.to_string());
                }
            }
            "DATETIME" | "TIMESTAMP" => {
                if let Ok(v) = row.try_get::<sqlx::types::chrono::NaiveDateTime, _>(idx) {
                    return Value::Text(v.to_string());
                }
            }
            "JSON" => {
                if let Ok(v) = row.try_get::<sqlx::types::JsonValue, _>(idx) {
                    return Value::Text(v.to_string());
                }
            }
            "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
                if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
                    return Value::Bytes(v);
                }
            }
            _ => {}
        }
    }

    row.try_get::<String, _>(idx)
        .map(Value::Text)
        .or_else(|_| row.try_get::<i64, _>(idx).map(Value::Int))
        .or_else(|_| row.try_get::<i32, _>(idx).map(Value::from))
        .or_else(|_| row.try_get::<f64, _>(idx).map(Value::Float))
        .or_else(|_| row.try_get::<bool, _>(idx).map(Value::Bool))
        .unwrap_or(Value::Null)
}

fn sqlite_value(row: &sqlx::sqlite::SqliteRow, idx: usize) -> Value {
    let value_ref = row.try_get_raw(idx).ok();

    if let Some(vr) = value_ref {
        if vr.is_null() {
            return Value::Null;
        }

        let type_info = vr.type_info().clone();
        let type_name = type_info.name();

        match type_name {
            "INTEGER" => {
                if let Ok(v) = row.try_get::<i64, _>(idx) {
                    return Value::Int(v);
                }
            }
            "REAL" => {
                if let Ok(v) = row.try_get::<f64, _>(idx) {
                    return Value::Float(v);
                }
            }
            "TEXT" => {
                if let Ok(v) = row.try_get::<String, _>(idx) {
                    return Value::Text(v);
                }
            }
            "BLOB" => {
                if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
                    return Value::Bytes(v);
                }
            }
            "BOOLEAN" => {
                if let Ok(v) = row.try_get::<bool, _>(idx) {
                    return Value::Bool(v);
                }
            }
            _ => {}
        }
    }

    row.try_get::<String, _>(idx)
        .map(Value::Text)
        .or_else(|_| row.try_get::<i64, _>(idx).map(Value::Int))
        .or_else(|_| row.try_get::<f64, _>(idx).map(Value::Float))
        .or_else(|_| row.try_get::<bool, _>(idx).map(Value::Bool))
        .or_else(|_| row.try_get::<Vec<u8>, _>(idx).map(Value::Bytes))
        .unwrap_or(Value::Null)
}
