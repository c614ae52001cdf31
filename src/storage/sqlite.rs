use rusqlite::{Connection, OptionalExtension, Result as SqliteResult};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::offline::{CacheOperationError, CacheStorage, StoredResponse};

/// SQLite storage for offline cache regions
/// Uses tokio::Mutex for async-friendly locking
pub struct SqliteCacheStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCacheStorage {
    /// Create a new SQLite storage instance
    pub async fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        // Handle SQLite URL format (sqlite:./path or sqlite://path)
        let path_str = db_path.as_ref().to_string_lossy();
        let clean_path: &str = if path_str.starts_with("sqlite:") {
            let mut cleaned = path_str.trim_start_matches("sqlite:");
            cleaned = cleaned.trim_start_matches("//");
            cleaned
        } else {
            path_str.as_ref()
        };

        let conn = Connection::open(clean_path)?;
        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Initialize database schema
    async fn init_schema(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().await;

        // Deleting a region cascades to its entries
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS cache_regions (
                name TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                region TEXT NOT NULL,
                url TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers_json TEXT NOT NULL,
                body BLOB NOT NULL,
                stored_at TEXT NOT NULL,
                PRIMARY KEY (region, url),
                FOREIGN KEY (region) REFERENCES cache_regions(name) ON DELETE CASCADE
            )
            "#,
            [],
        )?;

        Ok(())
    }

    fn ensure_region(conn: &Connection, region: &str) -> SqliteResult<()> {
        conn.execute(
            "INSERT OR IGNORE INTO cache_regions (name, created_at) VALUES (?1, ?2)",
            rusqlite::params![region, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn insert_entry(
        conn: &Connection,
        region: &str,
        url: &str,
        response: &StoredResponse,
    ) -> Result<(), CacheOperationError> {
        let headers_json = serde_json::to_string(&response.headers)?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO cache_entries
            (region, url, status, headers_json, body, stored_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            rusqlite::params![
                region,
                url,
                response.status,
                headers_json,
                response.body,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Number of entries stored in a region
    pub async fn entry_count(&self, region: &str) -> SqliteResult<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE region = ?1",
            rusqlite::params![region],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[async_trait::async_trait]
impl CacheStorage for SqliteCacheStorage {
    async fn keys(&self) -> Result<Vec<String>, CacheOperationError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT name FROM cache_regions ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    async fn open(&self, region: &str) -> Result<(), CacheOperationError> {
        let conn = self.conn.lock().await;
        Self::ensure_region(&conn, region)?;
        Ok(())
    }

    async fn match_entry(
        &self,
        region: &str,
        url: &str,
    ) -> Result<Option<StoredResponse>, CacheOperationError> {
        let conn = self.conn.lock().await;
        let found = conn
            .query_row(
                "SELECT status, headers_json, body FROM cache_entries WHERE region = ?1 AND url = ?2",
                rusqlite::params![region, url],
                |row| {
                    Ok((
                        row.get::<_, u16>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                },
            )
            .optional()?;

        match found {
            Some((status, headers_json, body)) => {
                let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)?;
                Ok(Some(StoredResponse {
                    status,
                    headers,
                    body,
                }))
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        region: &str,
        url: &str,
        response: &StoredResponse,
    ) -> Result<(), CacheOperationError> {
        let conn = self.conn.lock().await;
        Self::ensure_region(&conn, region)?;
        Self::insert_entry(&conn, region, url, response)
    }

    async fn put_all(
        &self,
        region: &str,
        entries: &[(String, StoredResponse)],
    ) -> Result<(), CacheOperationError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        Self::ensure_region(&tx, region)?;
        for (url, response) in entries {
            Self::insert_entry(&tx, region, url, response)?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn delete(&self, region: &str) -> Result<bool, CacheOperationError> {
        let conn = self.conn.lock().await;
        // entries go with the region through ON DELETE CASCADE
        let rows_affected = conn.execute(
            "DELETE FROM cache_regions WHERE name = ?1",
            rusqlite::params![region],
        )?;
        Ok(rows_affected > 0)
    }
}
