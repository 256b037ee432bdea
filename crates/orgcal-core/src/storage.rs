//! Flat key-value persistence with JSON values.
//!
//! Callers treat the store as synchronous and always available. Every
//! `set` replaces the whole value for its key, so a single `set` is the
//! unit of atomicity.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StorageError;

/// String-keyed store of JSON values.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Typed helpers over any [`KeyValueStore`].
pub trait KeyValueStoreExt {
    /// Read and decode a value, `None` if the key is absent.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError>;

    /// Read and decode a value, falling back to `T::default()` when the key
    /// is absent or holds something that no longer decodes.
    fn get_json_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T;

    /// Encode and write a value.
    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.get(key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StorageError::Decode {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    fn get_json_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.get_json(key) {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(e) => {
                tracing::warn!("Ignoring unreadable value for {}: {}", key, e);
                T::default()
            }
        }
    }

    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value).map_err(|e| StorageError::Encode {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.set(key, value)
    }
}

/// In-memory store, used by tests and hosts that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// SQLite-backed store: one `kv` table, values stored as JSON text.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let conn = self.conn.lock();
        let text: Option<String> = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;

        match text {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| StorageError::Corruption(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let text = value.to_string();
        let now = chrono::Utc::now().timestamp_millis();

        self.conn.lock().execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, text, now],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.conn
            .lock()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    fn exercise(store: &dyn KeyValueStore) {
        assert!(store.get("missing").unwrap().is_none());

        let sample = Sample {
            name: "Team".into(),
            count: 2,
        };
        store.set_json("sample", &sample).unwrap();
        let back: Option<Sample> = store.get_json("sample").unwrap();
        assert_eq!(back, Some(sample));

        store.remove("sample").unwrap();
        assert!(store.get("sample").unwrap().is_none());
    }

    #[test]
    fn test_memory_store_roundtrip() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_sqlite_store_roundtrip() {
        exercise(&SqliteStore::in_memory().unwrap());
    }

    #[test]
    fn test_sqlite_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let store = SqliteStore::new(&path).unwrap();
            store.set_json("names", &vec!["A", "B"]).unwrap();
        }

        let store = SqliteStore::new(&path).unwrap();
        let names: Option<Vec<String>> = store.get_json("names").unwrap();
        assert_eq!(names, Some(vec!["A".to_string(), "B".to_string()]));
    }

    #[test]
    fn test_set_replaces_value() {
        let store = SqliteStore::in_memory().unwrap();
        store.set_json("k", &1).unwrap();
        store.set_json("k", &2).unwrap();
        assert_eq!(store.get_json::<i32>("k").unwrap(), Some(2));
    }

    #[test]
    fn test_get_json_or_default_ignores_bad_shape() {
        let store = MemoryStore::new();
        store.set("k", serde_json::json!({"not": "a list"})).unwrap();

        let list: Vec<String> = store.get_json_or_default("k");
        assert!(list.is_empty());

        let err = store.get_json::<Vec<String>>("k").unwrap_err();
        assert!(matches!(err, StorageError::Decode { .. }));
    }
}
