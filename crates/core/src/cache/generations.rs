//! Cache generation operations.
//!
//! A generation is a named bucket of cached responses. Buckets are created on
//! first open, written entry by entry (last writer wins per request key) and
//! deleted as a whole; there is no per-entry eviction.

use super::hash::compute_request_key;
use crate::Error;
use crate::model::format_timestamp;
use crate::store::{Store, timestamp_column};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, Row, Transaction};

/// A response captured into a cache generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
    /// Key this response is stored under.
    pub fn request_key(&self) -> String {
        compute_request_key(&self.method, &self.url)
    }
}

fn cached_from_row(row: &Row<'_>) -> rusqlite::Result<(CachedResponse, String)> {
    let headers_json: String = row.get(4)?;
    Ok((
        CachedResponse {
            method: row.get(0)?,
            url: row.get(1)?,
            status: row.get(2)?,
            headers: Vec::new(),
            body: row.get(3)?,
            cached_at: timestamp_column(row, 5)?,
        },
        headers_json,
    ))
}

fn decode(raw: (CachedResponse, String)) -> Result<CachedResponse, Error> {
    let (mut response, headers_json) = raw;
    response.headers = serde_json::from_str(&headers_json)?;
    Ok(response)
}

fn ensure_generation(tx: &Transaction<'_>, generation: &str) -> Result<(), Error> {
    tx.execute(
        "INSERT OR IGNORE INTO cache_generations (name, created_at) VALUES (?1, ?2)",
        params![generation, format_timestamp(&Utc::now())],
    )?;
    Ok(())
}

fn upsert_entry(tx: &Transaction<'_>, generation: &str, response: &CachedResponse) -> Result<(), Error> {
    let headers_json = serde_json::to_string(&response.headers)?;
    tx.execute(
        "INSERT INTO cache_entries (generation, request_key, method, url, status, headers_json, body, cached_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(generation, request_key) DO UPDATE SET
            method = excluded.method,
            url = excluded.url,
            status = excluded.status,
            headers_json = excluded.headers_json,
            body = excluded.body,
            cached_at = excluded.cached_at",
        params![
            generation,
            response.request_key(),
            &response.method,
            &response.url,
            response.status,
            headers_json,
            &response.body,
            format_timestamp(&response.cached_at),
        ],
    )?;
    Ok(())
}

impl Store {
    /// Create the generation if it does not exist yet.
    pub async fn open_generation(&self, generation: &str) -> Result<(), Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_generation(&tx, &generation)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Names of all existing generations, oldest first.
    pub async fn generation_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_generations ORDER BY created_at ASC, name ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a generation together with every entry in it.
    ///
    /// Returns whether the generation existed.
    pub async fn delete_generation(&self, generation: &str) -> Result<bool, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM cache_entries WHERE generation = ?1", params![generation])?;
                let count = tx.execute("DELETE FROM cache_generations WHERE name = ?1", params![generation])?;
                tx.commit()?;
                Ok(count == 1)
            })
            .await
            .map_err(Error::from)
    }

    /// Store one response in `generation`, replacing any entry for the same request.
    pub async fn put_response(&self, generation: &str, response: &CachedResponse) -> Result<(), Error> {
        self.put_responses(generation, std::slice::from_ref(response)).await
    }

    /// Store several responses in `generation` atomically: all are visible or none are.
    pub async fn put_responses(&self, generation: &str, responses: &[CachedResponse]) -> Result<(), Error> {
        let generation = generation.to_string();
        let responses = responses.to_vec();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_generation(&tx, &generation)?;
                for response in &responses {
                    upsert_entry(&tx, &generation, response)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up the cached response for `method url` in one generation.
    pub async fn match_response(
        &self, generation: &str, method: &str, url: &str,
    ) -> Result<Option<CachedResponse>, Error> {
        self.match_in(vec![generation.to_string()], method, url).await
    }

    /// Look up `method url` in each of `generations` in order, returning the first hit.
    pub async fn match_in(
        &self, generations: Vec<String>, method: &str, url: &str,
    ) -> Result<Option<CachedResponse>, Error> {
        let key = compute_request_key(method, url);
        self.conn
            .call(move |conn| -> Result<Option<CachedResponse>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, status, body, headers_json, cached_at
                     FROM cache_entries WHERE generation = ?1 AND request_key = ?2",
                )?;
                for generation in &generations {
                    if let Some(raw) = stmt.query_row(params![generation, &key], cached_from_row).optional()? {
                        return decode(raw).map(Some);
                    }
                }
                Ok(None)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in a generation.
    pub async fn count_entries(&self, generation: &str) -> Result<u64, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE generation = ?1",
                    params![generation],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
