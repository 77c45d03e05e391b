//! Story API request and response types.
//!
//! Every response carries the `{ "error": bool, "message": string }` envelope;
//! payload fields sit next to it.

use serde::{Deserialize, Serialize};
use storyline_core::{Error, PushSubscription, Story};

/// Common response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    pub error: bool,
    #[serde(default)]
    pub message: String,
}

/// Account registration body.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("name cannot be empty".into()));
        }
        validate_credentials(&self.email, &self.password)
    }
}

/// Login body.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), Error> {
        validate_credentials(&self.email, &self.password)
    }
}

fn validate_credentials(email: &str, password: &str) -> Result<(), Error> {
    if !email.contains('@') {
        return Err(Error::InvalidInput(format!("invalid email: {email}")));
    }
    if password.len() < 8 {
        return Err(Error::InvalidInput("password must be at least 8 characters".into()));
    }
    Ok(())
}

/// Successful login payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub user_id: String,
    pub name: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginResponse {
    pub login_result: LoginResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoriesResponse {
    #[serde(default)]
    pub list_story: Vec<Story>,
}

/// Query parameters for listing stories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListStoriesQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    /// Only stories that carry a location.
    pub location: bool,
}

impl ListStoriesQuery {
    /// Query pairs in a stable order so equal queries share a cache key.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(size) = self.size {
            pairs.push(("size", size.to_string()));
        }
        if self.location {
            pairs.push(("location", "1".to_string()));
        }
        pairs
    }
}

/// Keys of a push registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Body of `POST /notifications/subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushSubscribeRequest {
    pub endpoint: String,
    pub keys: PushKeys,
}

impl From<&PushSubscription> for PushSubscribeRequest {
    fn from(sub: &PushSubscription) -> Self {
        Self { endpoint: sub.endpoint.clone(), keys: PushKeys { p256dh: sub.p256dh.clone(), auth: sub.auth.clone() } }
    }
}

/// Body of `DELETE /notifications/subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushUnsubscribeRequest {
    pub endpoint: String,
}
