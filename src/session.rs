use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::ConnectionConfig;
use crate::db::{Cursor, DatabaseConnection, QueryResult, TableSchema, Value, format_row};
use crate::log::{Failure, LogEntry, LogSink, Tag, TracingSink};
use crate::sql::{self, Condition, Statement};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Executed,
    Failed,
    Skipped,
}

pub struct DatabaseSession {
    config: ConnectionConfig,
    connection: Option<DatabaseConnection>,
    cursor: Option<Cursor>,
    schemas: HashMap<String, TableSchema>,
    sink: Arc<dyn LogSink>,
    show_info: bool,
    #[cfg(test)]
    fail_next_ping: bool,
}

impl Default for DatabaseSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseSession {
    /// Session logging through `tracing`.
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        Self {
            config: ConnectionConfig::default(),
            connection: None,
            cursor: None,
            schemas: HashMap::new(),
            sink,
            show_info: true,
            #[cfg(test)]
            fail_next_ping: false,
        }
    }

    /// Toggles the console echo. The log sink always receives every entry.
    pub fn set_show_info(&mut self, show: bool) {
        self.show_info = show;
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn emit(&self, entry: LogEntry) {
        if self.show_info {
            println!("{}", entry.console_line());
        }
        self.sink.record(&entry);
    }

    fn entry(&self, tag: Tag, text: impl Into<String>) -> LogEntry {
        LogEntry::new(tag, &self.config.user, &self.config.database, text)
    }

    fn log(&self, tag: Tag, text: impl Into<String>) {
        self.emit(self.entry(tag, text));
    }

    /// Precondition failures are warnings, driver failures errors.
    fn log_failure(&self, failure: Failure, text: impl Into<String>) {
        let tag = match failure {
            Failure::Precondition => Tag::Warning,
            _ => Tag::Error,
        };
        self.emit(self.entry(tag, text).with_failure(failure));
    }

    // ============================================================================================
    // Connection
    // ============================================================================================

    /// Connects to MySQL on `localhost:3306`.
    pub async fn connect(&mut self, user: &str, password: &str, database: &str) -> bool {
        self.connect_with(ConnectionConfig::mysql(user, password, database))
            .await
    }

    /// Replaces the current connection, if any, with a new one.
    pub async fn connect_with(&mut self, config: ConnectionConfig) -> bool {
        if let Some(old) = self.connection.take() {
            let _ = old.close().await;
        }
        self.cursor = None;
        self.config = config;

        match DatabaseConnection::connect(&self.config).await {
            Ok(conn) => {
                self.connection = Some(conn);
                self.cursor = Some(Cursor::default());
                self.log(Tag::Trace, "Database connection successful");
                true
            }
            Err(e) => {
                self.log_failure(
                    Failure::Connect,
                    format!("DataBase connection failed {}", e),
                );
                false
            }
        }
    }

    pub async fn close(&mut self) -> bool {
        let Some(mut conn) = self.connection.take() else {
            self.log_failure(Failure::Close, "Database connection is not exist");
            return false;
        };
        self.cursor = None;

        if let Err(e) = conn.ping().await {
            self.log_failure(
                Failure::Close,
                format!("Database connection closed Failed : {}", e),
            );
            return false;
        }

        match conn.close().await {
            Ok(()) => {
                self.log(Tag::Trace, "Database connection closed successful");
                true
            }
            Err(e) => {
                self.log_failure(
                    Failure::Close,
                    format!("Database connection closed Failed : {}", e),
                );
                false
            }
        }
    }

    /// Pings the connection and reconnects once with the stored config if
    /// the ping fails. A failed reconnect leaves the session unconnected.
    async fn ensure_alive(&mut self) -> bool {
        let Some(conn) = self.connection.as_mut() else {
            return false;
        };
        let alive = conn.ping().await.is_ok();
        #[cfg(test)]
        let alive = alive && !std::mem::take(&mut self.fail_next_ping);
        if alive {
            return true;
        }

        match DatabaseConnection::connect(&self.config).await {
            Ok(conn) => {
                self.connection = Some(conn);
                self.log(Tag::Warning, "Database connection lost, reconnected");
                true
            }
            Err(e) => {
                self.connection = None;
                self.log_failure(
                    Failure::Ping,
                    format!("The database cannot connect : {}", e),
                );
                false
            }
        }
    }

    // ============================================================================================
    // Execution
    // ============================================================================================

    async fn run(&mut self, statement: &Statement) -> Outcome {
        if self.connection.is_none() {
            self.emit(
                self.entry(
                    Tag::Error,
                    "Database connection is not exist,please check the database",
                )
                .with_failure(Failure::Precondition),
            );
            return Outcome::Skipped;
        }
        if !self.ensure_alive().await {
            return Outcome::Skipped;
        }

        let rendered = statement.render();
        let Some(conn) = self.connection.as_mut() else {
            return Outcome::Skipped;
        };

        let result = conn.execute(statement).await;
        match result {
            Ok(cursor) => {
                self.cursor = Some(cursor);
                self.log(Tag::Trace, format!("SQL->[{}] execute successful", rendered));
                Outcome::Executed
            }
            Err(e) => {
                self.log_failure(
                    Failure::Execute,
                    format!("SQL->[{}] execute failed : {}", rendered, e),
                );
                Outcome::Failed
            }
        }
    }

    /// Runs raw SQL and returns the cursor. On failure the previous cursor
    /// is returned unchanged; `None` when not connected.
    pub async fn execute_sql(&mut self, sql: &str) -> Option<&Cursor> {
        self.execute(&Statement::raw(sql)).await
    }

    pub async fn execute(&mut self, statement: &Statement) -> Option<&Cursor> {
        self.run(statement).await;
        self.cursor.as_ref()
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        if self.cursor.is_none() {
            self.log(
                Tag::Warning,
                "The cursor is not exist,database may not connect",
            );
        }
        self.cursor.as_ref()
    }

    /// Drains the cursor into a header-plus-rows result, logging each row.
    pub fn cursor_info(&mut self) -> Option<QueryResult> {
        let Some(cursor) = self.cursor.as_mut() else {
            self.log(
                Tag::Warning,
                "The cursor is not exist,database may not connect",
            );
            return None;
        };
        let rows = cursor.fetch_all();
        let columns = cursor.columns().to_vec();

        if rows.is_empty() {
            self.log(Tag::Row, "No results");
        } else {
            for row in &rows {
                self.log(Tag::Row, format_row(row));
            }
        }

        Some(QueryResult { columns, rows })
    }

    // ============================================================================================
    // Tables
    // ============================================================================================

    pub fn schema(&self, table: &str) -> Option<&TableSchema> {
        self.schemas.get(table)
    }

    /// Declares the column order of a table this session did not create.
    pub fn register_schema<I, S>(&mut self, table: &str, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schemas
            .insert(table.to_string(), TableSchema::new(columns));
    }

    /// `CREATE TABLE IF NOT EXISTS table (column_defs)`; remembers the
    /// column order for later `update` calls on this table.
    pub async fn create_table(&mut self, table: &str, column_defs: &str) -> bool {
        if table.is_empty() {
            println!("the table name is empty!");
            return false;
        }

        let statement = sql::create_table(table, column_defs);
        self.schemas
            .insert(table.to_string(), TableSchema::from_column_defs(column_defs));
        if self.show_info {
            println!("Execute sql:[{}]", statement);
        }

        let executed = self.run(&statement).await == Outcome::Executed;
        println!("Create table [{}] successful!", table);
        executed
    }

    pub async fn drop_table(&mut self, table: &str) -> bool {
        let executed = self.run(&sql::drop_table(table)).await == Outcome::Executed;
        if executed {
            self.schemas.remove(table);
        }
        println!("Drop table [{}] successful!", table);
        executed
    }

    // ============================================================================================
    // Rows
    // ============================================================================================

    pub async fn insert(&mut self, table: &str, values: &[Value]) -> bool {
        if values.is_empty() {
            println!("nothing to insert");
            return false;
        }
        self.run(&sql::insert(table, values)).await == Outcome::Executed
    }

    /// Sets the table's columns, in schema order, to `values` on every row
    /// matching `condition`.
    pub async fn update(&mut self, table: &str, condition: &Condition, values: &[Value]) -> bool {
        if values.is_empty() {
            println!("nothing to update");
            return false;
        }
        if condition.is_empty() {
            self.log_failure(Failure::Precondition, "The update condition is empty");
            return false;
        }

        let Some(schema) = self.schemas.get(table) else {
            self.log_failure(
                Failure::Precondition,
                format!("No column schema for table [{}]", table),
            );
            return false;
        };
        let Some(statement) = sql::update(table, schema, values, condition) else {
            self.log_failure(
                Failure::Precondition,
                format!(
                    "Too many values for table [{}]: {} given, {} columns",
                    table,
                    values.len(),
                    schema.len()
                ),
            );
            return false;
        };

        self.run(&statement).await == Outcome::Executed
    }

    pub async fn delete(&mut self, table: &str, condition: &Condition) -> bool {
        if condition.is_empty() {
            self.log_failure(Failure::Precondition, "The delete condition is empty");
            return false;
        }
        self.run(&sql::delete(table, condition)).await == Outcome::Executed
    }

    /// `SELECT * FROM table`, rows only.
    pub async fn select_all(&mut self, table: &str) -> Vec<Vec<Value>> {
        if self.run(&sql::select_all(table)).await != Outcome::Executed {
            return vec![];
        }
        self.cursor
            .as_mut()
            .map(Cursor::fetch_all)
            .unwrap_or_default()
    }

    /// `SELECT fields FROM table WHERE ...`, header plus rows. An empty
    /// condition runs nothing.
    pub async fn select(
        &mut self,
        table: &str,
        condition: &Condition,
        fields: &str,
    ) -> Option<QueryResult> {
        if condition.is_empty() {
            self.log_failure(Failure::Precondition, "The query condition is empty");
            return None;
        }
        if self.run(&sql::select(table, condition, fields)).await != Outcome::Executed {
            return None;
        }
        self.cursor_info()
    }
}

impl Drop for DatabaseSession {
    fn drop(&mut self) {
        let Some(conn) = self.connection.take() else {
            return;
        };
        debug!(database = %self.config.database, "closing connection on drop");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = conn.close().await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemorySink;

    async fn file_session(path: &std::path::Path) -> (DatabaseSession, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let mut session = DatabaseSession::with_sink(sink.clone());
        session.set_show_info(false);
        let config = ConnectionConfig::sqlite(path.to_str().unwrap());
        assert!(session.connect_with(config).await);
        (session, sink)
    }

    #[tokio::test]
    async fn lost_connection_is_reopened_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, sink) = file_session(&dir.path().join("lib.db")).await;
        session.create_table("t", "id INT").await;

        session.fail_next_ping = true;
        assert!(session.insert("t", &[1.into()]).await);
        assert!(session.is_connected());

        let reconnected = sink
            .entries()
            .into_iter()
            .find(|e| e.text == "Database connection lost, reconnected")
            .unwrap();
        assert_eq!(reconnected.tag, Tag::Warning);
        assert_eq!(session.select_all("t").await, vec![vec![Value::Int(1)]]);
    }

    #[tokio::test]
    async fn failed_reconnect_skips_the_statement() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, sink) = file_session(&dir.path().join("lib.db")).await;
        session.create_table("t", "id INT").await;
        session.execute_sql("SELECT id FROM t").await;

        let unreachable = dir.path().join("missing").join("x.db");
        session.config.database = unreachable.to_str().unwrap().to_string();
        session.fail_next_ping = true;

        let before = sink.entries().len();
        let cursor = session.execute_sql("INSERT INTO t VALUES (1)").await.cloned();
        assert_eq!(cursor.unwrap().columns(), ["id"]);

        let entries = sink.entries();
        assert_eq!(entries.len(), before + 1);
        let last = &entries[before];
        assert_eq!(last.tag, Tag::Error);
        assert_eq!(last.failure, Some(Failure::Ping));
        assert!(last.text.starts_with("The database cannot connect : "));
        assert!(!session.is_connected());
    }
}
