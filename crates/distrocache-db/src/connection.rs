//! Database connection management.

use std::path::Path;

use diesel::{sql_query, Connection, ConnectionError, RunQueryDsl, SqliteConnection};

use crate::migration::apply_migrations;

/// Database connection wrapper with migration support.
pub struct DbConnection {
    conn: SqliteConnection,
}

impl DbConnection {
    /// Opens a database connection, enables foreign keys and runs migrations.
    ///
    /// Passing `:memory:` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or migrations fail.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConnectionError> {
        let path_str = path.as_ref().to_string_lossy();
        let mut conn = SqliteConnection::establish(&path_str)?;

        // Referential integrity between sets and repo states is declarative,
        // and SQLite leaves enforcement off unless asked per connection.
        for pragma in [
            "PRAGMA foreign_keys = ON;",
            "PRAGMA journal_mode = WAL;",
            "PRAGMA busy_timeout = 5000;",
        ] {
            sql_query(pragma)
                .execute(&mut conn)
                .map_err(|e| ConnectionError::BadConnection(e.to_string()))?;
        }

        apply_migrations(&mut conn).map_err(|e| ConnectionError::BadConnection(e.to_string()))?;

        Ok(Self { conn })
    }

    /// Opens a fresh in-memory database.
    pub fn open_in_memory() -> Result<Self, ConnectionError> {
        Self::open(":memory:")
    }

    /// Gets a mutable reference to the underlying connection.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}

impl std::ops::Deref for DbConnection {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl std::ops::DerefMut for DbConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}
