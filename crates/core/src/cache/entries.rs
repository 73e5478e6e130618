//! Entry reads and writes inside a generation.

use super::connection::CacheDb;
use crate::Error;
use crate::keys;
use crate::network::Response;
use bytes::Bytes;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// How an entry got into its generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryOrigin {
    Precache,
    Runtime,
}

impl EntryOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryOrigin::Precache => "precache",
            EntryOrigin::Runtime => "runtime",
        }
    }

    fn parse(value: &str) -> Result<Self, Error> {
        match value {
            "precache" => Ok(EntryOrigin::Precache),
            "runtime" => Ok(EntryOrigin::Runtime),
            other => Err(Error::Serialization(format!("unknown entry origin: {other}"))),
        }
    }
}

/// A stored request/response pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry {
    pub cache_key: String,
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub origin: EntryOrigin,
    pub stored_at: String,
}

impl CachedEntry {
    pub fn from_response(cache_key: &str, response: &Response, origin: EntryOrigin) -> Self {
        Self {
            cache_key: cache_key.to_string(),
            url: response.url.clone(),
            status: response.status,
            content_type: response.content_type().map(str::to_string),
            headers: response.headers.clone(),
            body: response.body.clone(),
            origin,
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn to_response(&self) -> Response {
        Response { url: self.url.clone(), status: self.status, headers: self.headers.clone(), body: self.body.clone() }
    }
}

/// Whether a bulk population keeps or clears existing entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulateMode {
    /// Upsert into whatever the generation already holds.
    Merge,
    /// Drop existing entries first, in the same transaction.
    Replace,
}

const SELECT_ENTRY: &str = "SELECT cache_key, url, status, content_type, headers_json, body, origin, stored_at
    FROM entries";

const UPSERT_ENTRY: &str = "INSERT INTO entries (
        generation, cache_key, base_key, url, status, content_type, headers_json, body, origin, stored_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
    ON CONFLICT(generation, cache_key) DO UPDATE SET
        base_key = excluded.base_key,
        url = excluded.url,
        status = excluded.status,
        content_type = excluded.content_type,
        headers_json = excluded.headers_json,
        body = excluded.body,
        origin = excluded.origin,
        stored_at = excluded.stored_at";

struct RawEntry {
    cache_key: String,
    url: String,
    status: i64,
    content_type: Option<String>,
    headers_json: String,
    body: Vec<u8>,
    origin: String,
    stored_at: String,
}

impl RawEntry {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            cache_key: row.get(0)?,
            url: row.get(1)?,
            status: row.get(2)?,
            content_type: row.get(3)?,
            headers_json: row.get(4)?,
            body: row.get(5)?,
            origin: row.get(6)?,
            stored_at: row.get(7)?,
        })
    }

    fn decode(self) -> Result<CachedEntry, Error> {
        let status = u16::try_from(self.status)
            .map_err(|_| Error::Serialization(format!("stored status {} out of range", self.status)))?;
        Ok(CachedEntry {
            cache_key: self.cache_key,
            url: self.url,
            status,
            content_type: self.content_type,
            headers: serde_json::from_str(&self.headers_json)?,
            body: Bytes::from(self.body),
            origin: EntryOrigin::parse(&self.origin)?,
            stored_at: self.stored_at,
        })
    }
}

fn upsert(conn: &rusqlite::Connection, generation: &str, entry: &CachedEntry) -> Result<(), Error> {
    let headers_json = serde_json::to_string(&entry.headers)?;
    conn.execute(
        UPSERT_ENTRY,
        params![
            generation,
            &entry.cache_key,
            keys::base_key(&entry.cache_key),
            &entry.url,
            entry.status as i64,
            &entry.content_type,
            headers_json,
            &entry.body[..],
            entry.origin.as_str(),
            &entry.stored_at,
        ],
    )?;
    Ok(())
}

fn generation_exists(conn: &rusqlite::Connection, generation: &str) -> Result<bool, Error> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM generations WHERE name = ?1)",
        params![generation],
        |row| row.get(0),
    )?;
    Ok(exists)
}

impl CacheDb {
    /// Insert or overwrite one entry in an existing generation.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoActiveGeneration` if the generation does not exist;
    /// entries never create generations.
    pub async fn put_entry(&self, generation: &str, entry: &CachedEntry) -> Result<(), Error> {
        let generation = generation.to_string();
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                if !generation_exists(conn, &generation)? {
                    return Err(Error::NoActiveGeneration(generation));
                }
                upsert(conn, &generation, &entry)
            })
            .await
            .map_err(Error::from)
    }

    /// Create-if-absent and fill a generation in a single transaction.
    ///
    /// Either every entry is committed or nothing is, so a failed
    /// population can never leave a partial generation behind.
    /// Returns true if the generation was created by this call.
    pub async fn populate_generation(
        &self, generation: &str, entries: Vec<CachedEntry>, mode: PopulateMode,
    ) -> Result<bool, Error> {
        let generation = generation.to_string();
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                let created = tx.execute(
                    "INSERT OR IGNORE INTO generations (name, created_at) VALUES (?1, ?2)",
                    params![generation, created_at],
                )? > 0;

                if mode == PopulateMode::Replace {
                    tx.execute("DELETE FROM entries WHERE generation = ?1", params![generation])?;
                }

                for entry in &entries {
                    upsert(&tx, &generation, entry)?;
                }

                tx.commit()?;
                Ok(created)
            })
            .await
            .map_err(Error::from)
    }

    /// Look up an entry by normalized key.
    ///
    /// With `ignore_search`, an exact key hit is preferred, then the most
    /// recently stored entry whose key matches once queries are stripped.
    pub async fn match_entry(
        &self, generation: &str, cache_key: &str, ignore_search: bool,
    ) -> Result<Option<CachedEntry>, Error> {
        let generation = generation.to_string();
        let cache_key = cache_key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<RawEntry>, Error> {
                let exact = conn.query_row(
                    &format!("{SELECT_ENTRY} WHERE generation = ?1 AND cache_key = ?2"),
                    params![generation, cache_key],
                    RawEntry::from_row,
                );

                match exact {
                    Ok(raw) => return Ok(Some(raw)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => {}
                    Err(e) => return Err(e.into()),
                }

                if !ignore_search {
                    return Ok(None);
                }

                let fuzzy = conn.query_row(
                    &format!("{SELECT_ENTRY} WHERE generation = ?1 AND base_key = ?2 ORDER BY stored_at DESC LIMIT 1"),
                    params![generation, keys::base_key(&cache_key)],
                    RawEntry::from_row,
                );

                match fuzzy {
                    Ok(raw) => Ok(Some(raw)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?
            .map(RawEntry::decode)
            .transpose()
    }

    /// Keys stored in a generation, sorted.
    pub async fn entry_keys(&self, generation: &str) -> Result<Vec<String>, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT cache_key FROM entries WHERE generation = ?1 ORDER BY cache_key")?;
                let keys = stmt
                    .query_map(params![generation], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove one entry. Returns true if it existed.
    pub async fn delete_entry(&self, generation: &str, cache_key: &str) -> Result<bool, Error> {
        let generation = generation.to_string();
        let cache_key = cache_key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE generation = ?1 AND cache_key = ?2",
                    params![generation, cache_key],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, body: &str) -> CachedEntry {
        let response = Response::new(format!("https://example.com/{}", key.trim_start_matches("./")), 200, body.to_string())
            .with_header("Content-Type", "text/css");
        CachedEntry::from_response(key, &response, EntryOrigin::Runtime)
    }

    #[tokio::test]
    async fn test_put_requires_generation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let result = db.put_entry("v1", &entry("./a.css", "a{}")).await;
        assert!(matches!(result, Err(Error::NoActiveGeneration(name)) if name == "v1"));
        assert!(!db.has_generation("v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_generation("v1").await.unwrap();
        db.put_entry("v1", &entry("./a.css", "a{}")).await.unwrap();

        let hit = db.match_entry("v1", "./a.css", false).await.unwrap().unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(hit.content_type.as_deref(), Some("text/css"));
        assert_eq!(&hit.body[..], b"a{}");
        assert_eq!(hit.origin, EntryOrigin::Runtime);
        assert_eq!(hit.to_response().content_type(), Some("text/css"));
    }

    #[tokio::test]
    async fn test_unknown_origin_is_a_decode_error() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_generation("v1").await.unwrap();
        db.put_entry("v1", &entry("./a.css", "a{}")).await.unwrap();
        db.conn
            .call(|conn| conn.execute("UPDATE entries SET origin = 'bogus' WHERE cache_key = './a.css'", []))
            .await
            .unwrap();

        let result = db.match_entry("v1", "./a.css", false).await;
        assert!(matches!(result, Err(Error::Serialization(msg)) if msg.contains("bogus")));
    }

    #[test]
    fn test_origin_parse() {
        assert_eq!(EntryOrigin::parse("precache").unwrap(), EntryOrigin::Precache);
        assert_eq!(EntryOrigin::parse(EntryOrigin::Runtime.as_str()).unwrap(), EntryOrigin::Runtime);
        assert!(EntryOrigin::parse("").is_err());
    }

    #[tokio::test]
    async fn test_repeated_put_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_generation("v1").await.unwrap();
        db.put_entry("v1", &entry("./a.css", "old")).await.unwrap();
        db.put_entry("v1", &entry("./a.css", "new")).await.unwrap();

        assert_eq!(db.entry_keys("v1").await.unwrap(), vec!["./a.css"]);
        let hit = db.match_entry("v1", "./a.css", false).await.unwrap().unwrap();
        assert_eq!(&hit.body[..], b"new");
    }

    #[tokio::test]
    async fn test_match_ignoring_search() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_generation("v1").await.unwrap();
        db.put_entry("v1", &entry("./data.json", "{}")).await.unwrap();

        assert!(db.match_entry("v1", "./data.json?day=2", false).await.unwrap().is_none());
        let hit = db.match_entry("v1", "./data.json?day=2", true).await.unwrap().unwrap();
        assert_eq!(hit.cache_key, "./data.json");
    }

    #[tokio::test]
    async fn test_match_is_scoped_to_generation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_generation("v1").await.unwrap();
        db.open_generation("v2").await.unwrap();
        db.put_entry("v1", &entry("./a.css", "a{}")).await.unwrap();

        assert!(db.match_entry("v2", "./a.css", true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_populate_creates_and_replaces() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let created = db
            .populate_generation("v1", vec![entry("./a.css", "a"), entry("./b.css", "b")], PopulateMode::Merge)
            .await
            .unwrap();
        assert!(created);

        let created = db
            .populate_generation("v1", vec![entry("./c.css", "c")], PopulateMode::Replace)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(db.entry_keys("v1").await.unwrap(), vec!["./c.css"]);
    }

    #[tokio::test]
    async fn test_populate_merge_keeps_existing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.populate_generation("v1", vec![entry("./a.css", "a")], PopulateMode::Merge).await.unwrap();
        db.populate_generation("v1", vec![entry("./a.css", "a2"), entry("./b.css", "b")], PopulateMode::Merge)
            .await
            .unwrap();
        assert_eq!(db.entry_keys("v1").await.unwrap(), vec!["./a.css", "./b.css"]);
    }

    #[tokio::test]
    async fn test_delete_generation_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.populate_generation("v1", vec![entry("./a.css", "a")], PopulateMode::Merge).await.unwrap();
        db.delete_generation("v1").await.unwrap();
        db.open_generation("v1").await.unwrap();
        assert!(db.entry_keys("v1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.populate_generation("v1", vec![entry("./a.css", "a")], PopulateMode::Merge).await.unwrap();
        assert!(db.delete_entry("v1", "./a.css").await.unwrap());
        assert!(!db.delete_entry("v1", "./a.css").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_generations_counts_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.populate_generation("v1", vec![entry("./a.css", "abc"), entry("./b.css", "de")], PopulateMode::Merge)
            .await
            .unwrap();
        let infos = db.list_generations().await.unwrap();
        assert_eq!(infos[0].entries, 2);
        assert_eq!(infos[0].bytes, 5);
    }
}
