//! SQLite-based slot store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use hub_core::{now_millis, HubError, Result, SlotStore};

use crate::schema::{SCHEMA, SCHEMA_VERSION};

/// SQLite-backed durable slots.
///
/// Uses a blocking Mutex around a single connection; every operation is a
/// single short statement.
pub struct SqliteSlotStore {
    /// Connection wrapped in blocking Mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSlotStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| HubError::storage(format!("Failed to open state database: {}", e)))?;

        Self::init(conn, path)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            HubError::storage(format!("Failed to open in-memory database: {}", e))
        })?;

        Self::init(conn, Path::new(":memory:"))
    }

    /// Initialize the store with a connection.
    fn init(conn: Connection, path: &Path) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .map_err(|e| HubError::storage(format!("Failed to configure connection: {}", e)))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| HubError::storage(format!("Failed to initialize schema: {}", e)))?;

        conn.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )
        .map_err(|e| HubError::storage(format!("Failed to record schema version: {}", e)))?;

        info!("State database opened at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Stored schema version.
    pub fn schema_version(&self) -> Result<u32> {
        self.with_conn(|conn| {
            let version: String = conn
                .query_row(
                    "SELECT value FROM meta WHERE key = 'schema_version'",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| HubError::storage(e.to_string()))?;
            version
                .parse()
                .map_err(|_| HubError::storage(format!("corrupt schema version: {:?}", version)))
        })
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| HubError::storage(e.to_string()))?;
        f(&conn)
    }
}

impl SlotStore for SqliteSlotStore {
    fn load(&self, slot: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM slots WHERE key = ?1",
                params![slot],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| HubError::storage(format!("Failed to read slot {}: {}", slot, e)))
        })
    }

    fn save(&self, slot: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO slots (key, value, updated_at) VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                "#,
                params![slot, value, now_millis() as i64],
            )
            .map_err(|e| HubError::storage(format!("Failed to write slot {}: {}", slot, e)))?;

            debug!(slot, bytes = value.len(), "Saved slot");
            Ok(())
        })
    }

    fn clear(&self, slot: &str) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn
                .execute("DELETE FROM slots WHERE key = ?1", params![slot])
                .map_err(|e| HubError::storage(e.to_string()))?;

            debug!(slot, deleted, "Cleared slot");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory() {
        let store = SqliteSlotStore::open_memory().unwrap();
        assert_eq!(store.load("customRagPrompt").unwrap(), None);
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_slot_overwrite() {
        let store = SqliteSlotStore::open_memory().unwrap();

        store.save("customRagPrompt", "first {query}").unwrap();
        store.save("customRagPrompt", "second {query} {context}").unwrap();

        assert_eq!(
            store.load("customRagPrompt").unwrap().as_deref(),
            Some("second {query} {context}")
        );
    }

    #[test]
    fn test_clear_missing_slot_is_ok() {
        let store = SqliteSlotStore::open_memory().unwrap();
        store.clear("nothing-here").unwrap();

        store.save("a", "1").unwrap();
        store.clear("a").unwrap();
        assert_eq!(store.load("a").unwrap(), None);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");

        {
            let store = SqliteSlotStore::open(&path).unwrap();
            store.save("customRagPrompt", "Réponds: {query}\n{context}").unwrap();
        }

        let reopened = SqliteSlotStore::open(&path).unwrap();
        assert_eq!(
            reopened.load("customRagPrompt").unwrap().as_deref(),
            Some("Réponds: {query}\n{context}")
        );
    }
}
