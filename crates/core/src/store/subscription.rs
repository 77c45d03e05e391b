//! Single-slot mirror of the device's push registration.

use super::connection::Store;
use super::timestamp_column;
use crate::Error;
use crate::model::{PushSubscription, format_timestamp};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, Row};

const SELECT_SUBSCRIPTION: &str =
    "SELECT endpoint, p256dh, auth, created_at, mirrored FROM push_subscription WHERE slot = 1";

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<PushSubscription> {
    Ok(PushSubscription {
        endpoint: row.get(0)?,
        p256dh: row.get(1)?,
        auth: row.get(2)?,
        created_at: timestamp_column(row, 3)?,
        mirrored: row.get(4)?,
    })
}

impl Store {
    /// The stored registration, if any.
    pub async fn current_subscription(&self) -> Result<Option<PushSubscription>, Error> {
        self.conn
            .call(|conn| -> Result<Option<PushSubscription>, Error> {
                Ok(conn.query_row(SELECT_SUBSCRIPTION, [], subscription_from_row).optional()?)
            })
            .await
            .map_err(Error::from)
    }

    /// Store `subscription`, replacing any previous registration.
    pub async fn save_subscription(&self, subscription: &PushSubscription) -> Result<(), Error> {
        let sub = subscription.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO push_subscription (slot, endpoint, p256dh, auth, created_at, mirrored)
                     VALUES (1, ?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(slot) DO UPDATE SET
                        endpoint = excluded.endpoint,
                        p256dh = excluded.p256dh,
                        auth = excluded.auth,
                        created_at = excluded.created_at,
                        mirrored = excluded.mirrored",
                    params![&sub.endpoint, &sub.p256dh, &sub.auth, format_timestamp(&sub.created_at), sub.mirrored],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Record that the server acknowledged the registration at `endpoint`.
    pub async fn mark_subscription_mirrored(&self, endpoint: &str) -> Result<bool, Error> {
        let endpoint = endpoint.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let changed = conn.execute(
                    "UPDATE push_subscription SET mirrored = 1 WHERE slot = 1 AND endpoint = ?1",
                    params![endpoint],
                )?;
                Ok(changed == 1)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove the stored registration, returning it if there was one.
    pub async fn clear_subscription(&self) -> Result<Option<PushSubscription>, Error> {
        self.conn
            .call(|conn| -> Result<Option<PushSubscription>, Error> {
                let tx = conn.transaction()?;
                let existing = tx.query_row(SELECT_SUBSCRIPTION, [], subscription_from_row).optional()?;
                tx.execute("DELETE FROM push_subscription WHERE slot = 1", [])?;
                tx.commit()?;
                Ok(existing)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn make_subscription(endpoint: &str) -> PushSubscription {
        PushSubscription {
            endpoint: endpoint.to_string(),
            p256dh: "p256dh-key".to_string(),
            auth: "auth-secret".to_string(),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            mirrored: false,
        }
    }

    #[tokio::test]
    async fn test_save_and_read_back() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(store.current_subscription().await.unwrap().is_none());

        let sub = make_subscription("https://push.example/1");
        store.save_subscription(&sub).await.unwrap();
        assert_eq!(store.current_subscription().await.unwrap(), Some(sub));
    }

    #[tokio::test]
    async fn test_single_slot_is_replaced() {
        let store = Store::open_in_memory().await.unwrap();
        store.save_subscription(&make_subscription("https://push.example/1")).await.unwrap();
        store.save_subscription(&make_subscription("https://push.example/2")).await.unwrap();

        let current = store.current_subscription().await.unwrap().unwrap();
        assert_eq!(current.endpoint, "https://push.example/2");
    }

    #[tokio::test]
    async fn test_mark_mirrored_matches_endpoint() {
        let store = Store::open_in_memory().await.unwrap();
        store.save_subscription(&make_subscription("https://push.example/1")).await.unwrap();

        assert!(!store.mark_subscription_mirrored("https://push.example/other").await.unwrap());
        assert!(store.mark_subscription_mirrored("https://push.example/1").await.unwrap());
        assert!(store.current_subscription().await.unwrap().unwrap().mirrored);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(store.clear_subscription().await.unwrap().is_none());

        store.save_subscription(&make_subscription("https://push.example/1")).await.unwrap();
        let removed = store.clear_subscription().await.unwrap();
        assert_eq!(removed.map(|s| s.endpoint), Some("https://push.example/1".to_string()));
        assert!(store.current_subscription().await.unwrap().is_none());
    }
}
