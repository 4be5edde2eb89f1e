//! Small SQLite-backed key-value store with JSON-encoded values.
//!
//! Used by the gateway for local state that must survive a restart, such as
//! write-backs that could not be delivered to a device.

mod async_kvdb;

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use async_kvdb::AsyncKVDb;

const TABLENAME: &str = "kvstore";
const KEY_FIELD: &str = "key";
const VALUE_FIELD: &str = "value";

#[derive(Error, Debug)]
pub enum KVStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("could not (de)serialize value: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    IOError(#[from] std::io::Error),
}

pub struct KVDb(Connection);

impl KVDb {
    /// Open (and create if needed) the store at `path`. `":memory:"` opens a
    /// private in-memory database.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, KVStoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let connection = Connection::open(path)?;
        connection.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS '{TABLENAME}' (
                {KEY_FIELD} TEXT PRIMARY KEY NOT NULL,
                {VALUE_FIELD} BLOB NOT NULL
                )"
            ),
            [],
        )?;
        log::debug!("Opened key-value store at {}", path.display());
        Ok(KVDb(connection))
    }

    fn select(&self, key: &str) -> Result<Option<Vec<u8>>, KVStoreError> {
        self.0
            .query_row(
                &format!("SELECT {VALUE_FIELD} FROM '{TABLENAME}' WHERE {KEY_FIELD} = ?1"),
                [key],
                |r| r.get::<_, Vec<u8>>(0),
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn get<T: DeserializeOwned>(&self, key: impl AsRef<str>) -> Result<Option<T>, KVStoreError> {
        self.select(key.as_ref())?
            .map(|v| serde_json::from_slice::<T>(&v))
            .transpose()
            .map_err(Into::into)
    }

    /// Store an already JSON-encoded value.
    pub fn set_raw(&self, key: &str, value_json: &str) -> Result<(), KVStoreError> {
        let mut stmt = self.0.prepare_cached(&format!(
            "INSERT INTO '{TABLENAME}' ({KEY_FIELD}, {VALUE_FIELD}) values (?1, ?2)
            ON CONFLICT({KEY_FIELD}) DO UPDATE SET {VALUE_FIELD}=?2",
        ))?;
        let res = stmt.execute(params![key, value_json.as_bytes()])?;
        log::trace!("Upserted key '{}' ({} row)", key, res);
        Ok(())
    }

    pub fn set<V: Serialize + ?Sized>(&self, key: impl AsRef<str>, value: &V) -> Result<(), KVStoreError> {
        self.set_raw(key.as_ref(), &serde_json::to_string(value)?)
    }

    /// Remove a key. Returns whether the key existed.
    pub fn delete(&self, key: impl AsRef<str>) -> Result<bool, KVStoreError> {
        let removed = self.0.execute(
            &format!("DELETE FROM '{TABLENAME}' WHERE {KEY_FIELD} = ?1"),
            [key.as_ref()],
        )?;
        Ok(removed > 0)
    }

    /// All entries whose key starts with `prefix`, ordered by key.
    pub fn entries_with_prefix<T: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, T)>, KVStoreError> {
        let mut stmt = self.0.prepare(&format!(
            "SELECT {KEY_FIELD}, {VALUE_FIELD} FROM '{TABLENAME}'
            WHERE substr({KEY_FIELD}, 1, length(?1)) = ?1 ORDER BY {KEY_FIELD}"
        ))?;
        let rows = stmt.query_map([prefix], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, Vec<u8>>(1)?))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (key, raw) = row?;
            entries.push((key, serde_json::from_slice::<T>(&raw)?));
        }
        Ok(entries)
    }
}
