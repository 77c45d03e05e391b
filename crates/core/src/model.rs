//! Records owned by the persistent store.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// A story as served by the remote API. Never mutated locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub name: String,
    pub description: String,
    pub photo_url: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Local projection of a [`Story`] the user marked as favorite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    #[serde(flatten)]
    pub story: Story,
    pub favorited_at: DateTime<Utc>,
}

impl Favorite {
    pub fn id(&self) -> &str {
        &self.story.id
    }
}

/// Story authored on this device that has not been uploaded yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPendingWrite {
    pub description: String,
    pub photo: Vec<u8>,
    pub photo_mime: String,
    pub photo_name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl NewPendingWrite {
    /// Build a write for a JPEG photo with the default file name.
    pub fn new(description: impl Into<String>, photo: Vec<u8>) -> Self {
        Self {
            description: description.into(),
            photo,
            photo_mime: "image/jpeg".into(),
            photo_name: "photo.jpg".into(),
            lat: None,
            lon: None,
        }
    }

    pub fn with_location(mut self, lat: f64, lon: f64) -> Self {
        self.lat = Some(lat);
        self.lon = Some(lon);
        self
    }

    /// Reject writes the remote API would refuse anyway.
    pub fn validate(&self) -> Result<(), Error> {
        if self.description.trim().is_empty() {
            return Err(Error::InvalidInput("description cannot be empty".into()));
        }
        if self.photo.is_empty() {
            return Err(Error::InvalidInput("photo cannot be empty".into()));
        }
        if self.lat.is_some() != self.lon.is_some() {
            return Err(Error::InvalidInput("lat and lon must be given together".into()));
        }
        Ok(())
    }
}

/// A queued write as stored in `pending_writes`.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub local_id: i64,
    pub description: String,
    pub photo: Vec<u8>,
    pub photo_mime: String,
    pub photo_name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub synced: bool,
}

impl From<&PendingWrite> for NewPendingWrite {
    fn from(write: &PendingWrite) -> Self {
        Self {
            description: write.description.clone(),
            photo: write.photo.clone(),
            photo_mime: write.photo_mime.clone(),
            photo_name: write.photo_name.clone(),
            lat: write.lat,
            lon: write.lon,
        }
    }
}

/// Push endpoint registration mirrored in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub created_at: DateTime<Utc>,
    /// Whether the remote server acknowledged this registration.
    pub mirrored: bool,
}

/// Timestamps are stored as fixed-width RFC 3339 text so they sort lexically.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
