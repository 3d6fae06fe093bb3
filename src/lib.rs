pub mod config;
pub mod db;
pub mod display;
pub mod log;
pub mod session;
pub mod sql;

pub use config::{ConnectionConfig, Driver};
pub use db::{Cursor, DatabaseConnection, QueryResult, TableSchema, Value};
pub use display::render_table;
pub use log::{
    FileSink, Failure, LogEntry, LogSink, MemorySink, Tag, TracingSink, default_log_path,
    init_tracing,
};
pub use session::DatabaseSession;
pub use sql::{Condition, Placeholder, Statement};
