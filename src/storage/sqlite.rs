use super::{LocalLyricsRecord, LyricsRecord, Record, RecordStore, TranslationRecord};
use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{Connection, params};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex};

const LYRICS_TABLE: &str = "lyrics_cache";
const TRANSLATIONS_TABLE: &str = "translations";
const LOCAL_LYRICS_TABLE: &str = "local_lyrics";

/// Owner of the SQLite connection; hands out one typed store per table.
#[derive(Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }

        let conn = Connection::open(path).with_context(|| format!("open {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        let s = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        s.init_schema()?;
        Ok(s)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS lyrics_cache (
  key TEXT PRIMARY KEY,
  record_json TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS translations (
  key TEXT PRIMARY KEY,
  record_json TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS local_lyrics (
  key TEXT PRIMARY KEY,
  record_json TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);
"#,
        )
        .context("init schema")?;
        Ok(())
    }

    pub fn lyrics(&self) -> SqliteStore<LyricsRecord> {
        SqliteStore::new(self.conn.clone(), LYRICS_TABLE)
    }

    pub fn translations(&self) -> SqliteStore<TranslationRecord> {
        SqliteStore::new(self.conn.clone(), TRANSLATIONS_TABLE)
    }

    pub fn local_lyrics(&self) -> SqliteStore<LocalLyricsRecord> {
        SqliteStore::new(self.conn.clone(), LOCAL_LYRICS_TABLE)
    }
}

/// One table of JSON records keyed by [`Record::key`].
pub struct SqliteStore<R> {
    conn: Arc<Mutex<Connection>>,
    table: &'static str,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> SqliteStore<R> {
    fn new(conn: Arc<Mutex<Connection>>, table: &'static str) -> Self {
        Self {
            conn,
            table,
            _record: PhantomData,
        }
    }

    /// Run a blocking closure against the connection off the async runtime.
    async fn with_conn<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &'static str) -> anyhow::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        let table = self.table;
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&guard, table)
        })
        .await
        .context("join storage task")?
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for SqliteStore<R> {
    async fn get(&self, key: &str) -> anyhow::Result<Option<R>> {
        let key = key.to_string();
        self.with_conn(move |conn, table| {
            let mut stmt = conn
                .prepare(&format!("SELECT record_json FROM {table} WHERE key=?1"))
                .with_context(|| format!("prepare get {table}"))?;
            let mut rows = stmt.query(params![key]).with_context(|| format!("query {table}"))?;
            if let Some(row) = rows.next().with_context(|| format!("read {table} row"))? {
                let json: String = row.get(0)?;
                let record = serde_json::from_str(&json)
                    .with_context(|| format!("decode {table} record {key}"))?;
                Ok(Some(record))
            } else {
                Ok(None)
            }
        })
        .await
    }

    async fn set(&self, record: R) -> anyhow::Result<()> {
        let json = serde_json::to_string(&record).context("encode record")?;
        let key = record.key().to_string();
        let now = crate::util::now_ms();
        self.with_conn(move |conn, table| {
            conn.execute(
                &format!(
                    r#"
INSERT INTO {table}(key, record_json, updated_at)
VALUES(?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET
  record_json=excluded.record_json,
  updated_at=excluded.updated_at
"#
                ),
                params![key, json, now],
            )
            .with_context(|| format!("upsert {table}"))?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let key = key.to_string();
        self.with_conn(move |conn, table| {
            conn.execute(&format!("DELETE FROM {table} WHERE key=?1"), params![key])
                .with_context(|| format!("delete from {table}"))?;
            Ok(())
        })
        .await
    }

    async fn get_all(&self) -> anyhow::Result<Vec<R>> {
        self.with_conn(|conn, table| {
            let mut stmt = conn
                .prepare(&format!("SELECT key, record_json FROM {table} ORDER BY updated_at"))
                .with_context(|| format!("prepare scan {table}"))?;
            let rows = stmt.query_map([], |row| {
                let key: String = row.get(0)?;
                let json: String = row.get(1)?;
                Ok((key, json))
            })?;

            let mut records = Vec::new();
            for row in rows {
                let (key, json) = row.with_context(|| format!("read {table} row"))?;
                match serde_json::from_str::<R>(&json) {
                    Ok(record) => records.push(record),
                    Err(e) => tracing::warn!(table, key = %key, error = %e, "skipping undecodable record"),
                }
            }
            Ok(records)
        })
        .await
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.with_conn(|conn, table| {
            conn.execute(&format!("DELETE FROM {table}"), [])
                .with_context(|| format!("clear {table}"))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyrics::{LyricLine, LyricsPayload};

    fn record(key: &str, version: i64) -> LyricsRecord {
        LyricsRecord {
            key: key.to_string(),
            lyrics: LyricsPayload::from_lines(vec![LyricLine::new("hello")]),
            version,
            timestamp: version,
            duration: Some(200.0),
        }
    }

    #[tokio::test]
    async fn test_crud() {
        let storage = Storage::open_in_memory().unwrap();
        let store = storage.lyrics();

        assert!(store.get("a").await.unwrap().is_none());

        store.set(record("a", 1)).await.unwrap();
        store.set(record("a", 2)).await.unwrap();
        store.set(record("b", 3)).await.unwrap();

        assert_eq!(store.get("a").await.unwrap().unwrap().version, 2);
        assert_eq!(store.get_all().await.unwrap().len(), 2);

        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());

        store.clear().await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tables_are_independent() {
        let storage = Storage::open_in_memory().unwrap();
        storage.lyrics().set(record("same-key", 1)).await.unwrap();

        let translations = storage.translations();
        assert!(translations.get("same-key").await.unwrap().is_none());

        translations
            .set(TranslationRecord {
                key: "same-key".into(),
                translated_lyrics: LyricsPayload::default(),
                original_version: 1,
            })
            .await
            .unwrap();
        storage.lyrics().clear().await.unwrap();
        assert!(translations.get("same-key").await.unwrap().is_some());
    }
}
