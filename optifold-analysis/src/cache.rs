//! Cache
//! ---
//! Persists serialized values under string keys in a single sqlite file.
//! Values are bincode encoded and snappy compressed.  Entries are authoritative
//! once written: nothing here invalidates them, callers either pick keys that
//! change with their inputs or force a recompute.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// File used when no cache path is configured
pub const DEFAULT_CACHE_FILE: &str = "optifold_cache.db";

const CREATE_TABLE: &str = "create table if not exists cache (key TEXT primary key, value BLOB not null)";

/// Serializes and compresses a value for storage.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let raw = bincode::serialize(value)?;
    Ok(snap::raw::Encoder::new().compress_vec(&raw)?)
}

/// Inverse of `encode`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let raw = snap::raw::Decoder::new().decompress_vec(bytes)?;
    Ok(bincode::deserialize(&raw)?)
}

/// Composite key for whole-pipeline results over a named dataset.
///
/// ```rust
/// use optifold_analysis::cache::dataset_key;
///
/// assert_eq!(dataset_key("opticsanalysis", "attenuation_0.5"), "opticsanalysis/attenuation_0.5");
/// ```
pub fn dataset_key(domain: &str, dataset: &str) -> String {
    format!("{}/{}", domain, dataset)
}

/// Handle to a cache file.  Opening a `CacheSession` acquires the underlying
/// connection; several keys can then be read and written through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cache {
    path: PathBuf
}

impl Default for Cache {
    fn default() -> Self {
        Cache::new(DEFAULT_CACHE_FILE)
    }
}

impl Cache {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Cache { path: path.as_ref().to_path_buf() }
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a session.  The connection is released by `CacheSession::end`
    /// or when the session is dropped.
    pub fn begin(&self) -> Result<CacheSession> {
        debug!("Opening cache {}", self.path.display());
        let conn = Connection::open(&self.path)?;
        conn.execute(CREATE_TABLE, [])?;
        Ok(CacheSession { conn: conn })
    }

    /// Runs `f` inside a session, closing it afterwards whether or not `f` failed.
    pub fn with_session<T, F: FnOnce(&CacheSession) -> Result<T>>(&self, f: F) -> Result<T> {
        let session = self.begin()?;
        let out = f(&session)?;
        session.end()?;
        Ok(out)
    }

    /// Reads a single value.  Missing keys are `Error::NotFound`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.with_session(|s| s.get(key))
    }

    /// Writes a single value, replacing any existing entry.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.with_session(|s| s.set(key, value))
    }

    /// Returns the value stored under `key`, computing and storing it first
    /// when it is missing or `force` is set.
    ///
    /// ```rust
    /// use optifold_analysis::cache::Cache;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let cache = Cache::new(dir.path().join("cache.db"));
    /// let first: u64 = cache.cached_call("answer", false, || Ok(42)).unwrap();
    /// let second: u64 = cache.cached_call("answer", false, || Ok(0)).unwrap();
    /// assert_eq!((first, second), (42, 42));
    /// let forced: u64 = cache.cached_call("answer", true, || Ok(7)).unwrap();
    /// assert_eq!(forced, 7);
    /// ```
    pub fn cached_call<T, F>(&self, key: &str, force: bool, f: F) -> Result<T>
        where T: Serialize + DeserializeOwned,
              F: FnOnce() -> Result<T>
    {
        self.with_session(|session| {
            if !force {
                match session.get(key) {
                    Ok(value) => {
                        debug!("Cache hit: {}", key);
                        return Ok(value)
                    },
                    Err(Error::NotFound(_)) => debug!("Cache miss: {}", key),
                    Err(e) => warn!("Treating unreadable cache entry {} as a miss: {}", key, e)
                }
            }
            let value = f()?;
            session.set(key, &value)?;
            Ok(value)
        })
    }
}

/// An open connection to the cache file
pub struct CacheSession {
    conn: Connection
}

impl CacheSession {

    /// Raw stored bytes for `key`
    pub fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        self.conn.query_row("select value from cache where key = ?1", params![key], |row| row.get(0))
            .optional()?
            .ok_or_else(|| Error::NotFound(key.to_owned()))
    }

    pub fn set_bytes(&self, key: &str, value: &[u8]) -> Result<()> {
        self.conn.execute("insert or replace into cache (key, value) values (?1, ?2)", params![key, value])?;
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        decode(&self.get_bytes(key)?)
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set_bytes(key, &encode(value)?)
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        let found: Option<i64> = self.conn
            .query_row("select 1 from cache where key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Deletes an entry, returning whether it existed
    pub fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.conn.execute("delete from cache where key = ?1", params![key])? > 0)
    }

    /// Stored keys in sorted order
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("select key from cache order by key")?;
        let keys = stmt.query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    pub fn len(&self) -> Result<usize> {
        let n: i64 = self.conn.query_row("select count(*) from cache", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Closes the connection, reporting any failure to do so.
    pub fn end(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::Storage(e))
    }
}

#[cfg(test)]
mod cache_test {
    use super::*;
    use std::collections::BTreeMap;

    use serde_derive::{Deserialize, Serialize};

    use crate::selection::SelectionDefs;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Summary {
        name: String,
        counts: BTreeMap<String, u64>,
        weights: Vec<f64>
    }

    fn cache() -> (tempfile::TempDir, Cache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path().join("cache.db"));
        (dir, cache)
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let (_dir, cache) = cache();
        match cache.get::<u64>("nothing") {
            Err(Error::NotFound(k)) => assert_eq!(k, "nothing"),
            other => panic!("unexpected: {:?}", other)
        }
    }

    #[test]
    fn test_structured_round_trip() {
        let (_dir, cache) = cache();
        let mut counts = BTreeMap::new();
        counts.insert("IBD".to_owned(), 12);
        counts.insert("Background".to_owned(), 3);
        let value = Summary { name: "n9".into(), counts: counts, weights: vec![0.5, 1.5] };

        cache.set("summary", &value).unwrap();
        let back: Summary = cache.get("summary").unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_selection_round_trip_is_byte_identical() {
        let (_dir, cache) = cache();
        let nominal = SelectionDefs::nominal();
        cache.set("selection", &nominal).unwrap();
        let back: crate::selection::Selection = cache.get("selection").unwrap();
        assert_eq!(back, nominal);
        assert_eq!(encode(&back).unwrap(), encode(&nominal).unwrap());
    }

    #[test]
    fn test_session_shares_connection() {
        let (_dir, cache) = cache();
        let session = cache.begin().unwrap();
        session.set("a", &1u32).unwrap();
        session.set("b", &2u32).unwrap();
        session.set("a", &3u32).unwrap();
        assert!(session.contains("a").unwrap());
        assert_eq!(session.keys().unwrap(), vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(session.len().unwrap(), 2);
        assert!(session.remove("b").unwrap());
        assert!(!session.remove("b").unwrap());
        session.end().unwrap();

        assert_eq!(cache.get::<u32>("a").unwrap(), 3);
    }

    #[test]
    fn test_corrupt_entry_is_an_error() {
        let (_dir, cache) = cache();
        cache.with_session(|s| s.set_bytes("junk", b"not snappy")).unwrap();
        assert!(cache.get::<u64>("junk").is_err());

        // cached_call recovers by recomputing
        let v: u64 = cache.cached_call("junk", false, || Ok(5)).unwrap();
        assert_eq!(v, 5);
        assert_eq!(cache.get::<u64>("junk").unwrap(), 5);
    }

    #[test]
    fn test_with_session_propagates_errors() {
        let (_dir, cache) = cache();
        let res: Result<()> = cache.with_session(|_| Err(Error::Config("nope".into())));
        assert!(res.is_err());
        // store is still usable afterwards
        cache.set("k", "v").unwrap();
        assert_eq!(cache.get::<String>("k").unwrap(), "v");
    }
}
