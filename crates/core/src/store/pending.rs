//! Pending-writes queue.
//!
//! Every failure on this path propagates: a queued story is user content and
//! must never be dropped silently.

use super::connection::Store;
use super::timestamp_column;
use crate::Error;
use crate::model::{NewPendingWrite, PendingWrite, format_timestamp};
use chrono::Utc;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, Row};

fn pending_from_row(row: &Row<'_>) -> rusqlite::Result<PendingWrite> {
    Ok(PendingWrite {
        local_id: row.get(0)?,
        description: row.get(1)?,
        photo: row.get(2)?,
        photo_mime: row.get(3)?,
        photo_name: row.get(4)?,
        lat: row.get(5)?,
        lon: row.get(6)?,
        created_at: timestamp_column(row, 7)?,
        synced: row.get(8)?,
    })
}

impl Store {
    /// Queue a write for later upload with `synced = false`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for an unusable write and a store error
    /// if the row could not be persisted.
    pub async fn enqueue_pending_write(&self, write: &NewPendingWrite) -> Result<PendingWrite, Error> {
        write.validate()?;

        let mut write = write.clone();
        write.description = write.description.trim().to_string();
        let created_at = Utc::now();
        let stamp = format_timestamp(&created_at);

        let row = write.clone();
        let local_id = self
            .conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute(
                    "INSERT INTO pending_writes (description, photo, photo_mime, photo_name, lat, lon, created_at, synced)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
                    params![&row.description, &row.photo, &row.photo_mime, &row.photo_name, &row.lat, &row.lon, stamp],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)?;

        tracing::info!(local_id, "queued pending write");

        Ok(PendingWrite {
            local_id,
            description: write.description,
            photo: write.photo,
            photo_mime: write.photo_mime,
            photo_name: write.photo_name,
            lat: write.lat,
            lon: write.lon,
            created_at,
            synced: false,
        })
    }

    /// Fetch one queued write.
    pub async fn get_pending_write(&self, local_id: i64) -> Result<Option<PendingWrite>, Error> {
        self.conn
            .call(move |conn| -> Result<Option<PendingWrite>, Error> {
                let result = conn.query_row(
                    "SELECT local_id, description, photo, photo_mime, photo_name, lat, lon, created_at, synced
                     FROM pending_writes WHERE local_id = ?1",
                    params![local_id],
                    pending_from_row,
                );
                match result {
                    Ok(w) => Ok(Some(w)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// All queued writes in insertion order, synced or not.
    pub async fn list_pending_writes(&self) -> Result<Vec<PendingWrite>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<PendingWrite>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT local_id, description, photo, photo_mime, photo_name, lat, lon, created_at, synced
                     FROM pending_writes ORDER BY local_id ASC",
                )?;
                let writes = stmt
                    .query_map([], pending_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(writes)
            })
            .await
            .map_err(Error::from)
    }

    /// Count of writes still waiting for delivery.
    pub async fn count_unsynced(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM pending_writes WHERE synced = 0", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Flag a write as delivered.
    ///
    /// Only an unsynced row transitions; returns whether this call flipped it.
    pub async fn mark_synced(&self, local_id: i64) -> Result<bool, Error> {
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let changed = conn.execute(
                    "UPDATE pending_writes SET synced = 1 WHERE local_id = ?1 AND synced = 0",
                    params![local_id],
                )?;
                Ok(changed == 1)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every synced write. Unsynced rows are never touched.
    ///
    /// Returns the number of deleted rows.
    pub async fn purge_synced(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM pending_writes WHERE synced = 1", [])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Drop a queued write the user no longer wants delivered.
    ///
    /// Returns whether a row was removed.
    pub async fn discard_pending_write(&self, local_id: i64) -> Result<bool, Error> {
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM pending_writes WHERE local_id = ?1", params![local_id])?;
                Ok(count == 1)
            })
            .await
            .map_err(Error::from)
    }
}
