use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_MYSQL_PORT: u16 = 3306;
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;
pub const DEFAULT_CHARSET: &str = "utf8mb4";

/// Prefix of the environment variables read by [`ConnectionConfig::from_env`].
pub const ENV_PREFIX: &str = "SQLSESSION_";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Driver {
    #[default]
    MySql,
    Postgres,
    Sqlite,
}

impl Driver {
    pub fn default_port(self) -> u16 {
        match self {
            Self::MySql => DEFAULT_MYSQL_PORT,
            Self::Postgres => DEFAULT_POSTGRES_PORT,
            Self::Sqlite => 0,
        }
    }
}

impl FromStr for Driver {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(anyhow::anyhow!("Unsupported database type: {}", other)),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MySql => write!(f, "MySQL"),
            Self::Postgres => write!(f, "PostgreSQL"),
            Self::Sqlite => write!(f, "SQLite"),
        }
    }
}

/// Everything needed to open one connection.
///
/// For SQLite, `database` is the file path (or `:memory:`) and the network
/// fields are ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub driver: Driver,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub charset: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            driver: Driver::MySql,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_MYSQL_PORT,
            user: String::new(),
            password: String::new(),
            database: String::new(),
            charset: DEFAULT_CHARSET.to_string(),
        }
    }
}

impl ConnectionConfig {
    pub fn mysql(user: &str, password: &str, database: &str) -> Self {
        Self {
            user: user.to_string(),
            password: password.to_string(),
            database: database.to_string(),
            ..Self::default()
        }
    }

    pub fn postgres(user: &str, password: &str, database: &str) -> Self {
        Self {
            driver: Driver::Postgres,
            port: DEFAULT_POSTGRES_PORT,
            ..Self::mysql(user, password, database)
        }
    }

    pub fn sqlite(path: &str) -> Self {
        Self {
            driver: Driver::Sqlite,
            host: String::new(),
            port: 0,
            database: path.to_string(),
            ..Self::default()
        }
    }

    pub fn sqlite_memory() -> Self {
        Self::sqlite(":memory:")
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_charset(mut self, charset: &str) -> Self {
        self.charset = charset.to_string();
        self
    }

    pub fn is_memory(&self) -> bool {
        self.driver == Driver::Sqlite && self.database == ":memory:"
    }

    /// Reads `SQLSESSION_DRIVER`, `SQLSESSION_HOST`, `SQLSESSION_PORT`,
    /// `SQLSESSION_USER`, `SQLSESSION_PASSWORD`, `SQLSESSION_DATABASE` and
    /// `SQLSESSION_CHARSET`. Missing keys fall back to the driver defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        let driver = match get("DRIVER") {
            Some(d) => d.parse()?,
            None => Driver::default(),
        };
        let port = match get("PORT") {
            Some(p) => p
                .parse()
                .with_context(|| format!("invalid {ENV_PREFIX}PORT: {p}"))?,
            None => driver.default_port(),
        };

        Ok(Self {
            driver,
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            user: get("USER").unwrap_or_default(),
            password: get("PASSWORD").unwrap_or_default(),
            database: get("DATABASE").unwrap_or_default(),
            charset: get("CHARSET").unwrap_or_else(|| DEFAULT_CHARSET.to_string()),
        })
    }

    /// Short human label, e.g. `MySQL: library@localhost`.
    pub fn display_name(&self) -> String {
        match self.driver {
            Driver::Sqlite => {
                let file = self.database.split('/').next_back().unwrap_or(&self.database);
                format!("{}: {}", self.driver, file)
            }
            _ => format!("{}: {}@{}", self.driver, self.database, self.host),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn mysql_defaults() {
        let config = ConnectionConfig::mysql("root", "secret", "library");
        assert_eq!(config.driver, Driver::MySql);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 3306);
        assert_eq!(config.charset, DEFAULT_CHARSET);
        assert_eq!(config.display_name(), "MySQL: library@localhost");
    }

    #[test]
    fn postgres_uses_its_own_port() {
        let config = ConnectionConfig::postgres("app", "pw", "books").with_host("db.internal");
        assert_eq!(config.port, 5432);
        assert_eq!(config.display_name(), "PostgreSQL: books@db.internal");
    }

    #[test]
    fn sqlite_display_name_keeps_file_only() {
        let config = ConnectionConfig::sqlite("/var/data/library.db");
        assert_eq!(config.display_name(), "SQLite: library.db");
        assert!(ConnectionConfig::sqlite_memory().is_memory());
    }

    #[test]
    fn lookup_reads_prefixed_keys() {
        let vars: HashMap<&str, &str> = [
            ("SQLSESSION_DRIVER", "postgresql"),
            ("SQLSESSION_USER", "reader"),
            ("SQLSESSION_DATABASE", "catalog"),
        ]
        .into_iter()
        .collect();

        let config =
            ConnectionConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.driver, Driver::Postgres);
        assert_eq!(config.port, 5432);
        assert_eq!(config.user, "reader");
        assert_eq!(config.database, "catalog");
        assert_eq!(config.host, "localhost");
    }

    #[test]
    fn lookup_rejects_bad_port_and_driver() {
        let bad_port = ConnectionConfig::from_lookup(|k| {
            (k == "SQLSESSION_PORT").then(|| "not-a-port".to_string())
        });
        assert!(bad_port.is_err());

        let bad_driver = ConnectionConfig::from_lookup(|k| {
            (k == "SQLSESSION_DRIVER").then(|| "oracle".to_string())
        });
        assert!(bad_driver.is_err());
    }
}
