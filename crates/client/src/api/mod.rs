//! Story API client.
//!
//! ### Endpoints
//!
//! - `POST /register`, `POST /login`: JSON bodies, no token.
//! - `GET /stories`: bearer token, read through the [`Network`] seam so it can
//!   be served by the cache router.
//! - `POST /stories`: bearer token, multipart form with `description`, `photo`
//!   and optional `lat`/`lon`.
//! - `POST|DELETE /notifications/subscribe`: bearer token, JSON body.
//!
//! The token is never read from ambient state: every authenticated call takes
//! an [`ApiSession`].

pub mod types;

pub use types::{
    ApiEnvelope, ListStoriesQuery, LoginRequest, LoginResult, PushKeys, PushSubscribeRequest, PushUnsubscribeRequest,
    RegisterRequest,
};

use crate::fetch::{HttpNetwork, Network, Request};
use crate::push::PushServer;
use crate::reconciler::StoryUploader;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use storyline_core::{Error, NewPendingWrite, PushSubscription, Story};
use types::{LoginResponse, StoriesResponse};

/// Bearer token for authenticated calls.
#[derive(Clone)]
pub struct ApiSession {
    token: String,
}

impl ApiSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn header(&self) -> Result<HeaderValue, Error> {
        HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| Error::InvalidInput("token contains invalid header characters".into()))
    }
}

impl fmt::Debug for ApiSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiSession").field("token", &"<redacted>").finish()
    }
}

impl From<LoginResult> for ApiSession {
    fn from(result: LoginResult) -> Self {
        Self::new(result.token)
    }
}

/// Decode an API response body.
///
/// `error: true` becomes `Error::Api` with the server's message. A body that is
/// not an envelope at all becomes `Error::HttpError` for non-success statuses.
pub(crate) fn decode_body<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, Error> {
    let envelope: ApiEnvelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(e) if status.is_success() => return Err(Error::Serialization(format!("unexpected API body: {e}"))),
        Err(_) => return Err(Error::HttpError(format!("status {}", status.as_u16()))),
    };

    if envelope.error {
        return Err(Error::Api(envelope.message));
    }
    if !status.is_success() {
        return Err(Error::HttpError(format!("status {}: {}", status.as_u16(), envelope.message)));
    }

    serde_json::from_slice(body).map_err(Error::from)
}

/// Story API client.
#[derive(Clone)]
pub struct StoryApi {
    http: Client,
    base_url: Url,
    reads: Arc<dyn Network>,
}

impl StoryApi {
    /// Create a client whose reads go straight to the network.
    pub fn new(network: &HttpNetwork, base_url: &str) -> Result<Self, Error> {
        let reads: Arc<dyn Network> = Arc::new(network.clone());
        Self::with_reads(network, base_url, reads)
    }

    /// Create a client whose `GET` calls go through `reads`, usually a cache router.
    pub fn with_reads(network: &HttpNetwork, base_url: &str, reads: Arc<dyn Network>) -> Result<Self, Error> {
        let base = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&base).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self { http: network.http().clone(), base_url, reads })
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base_url
            .join(path)
            .map_err(|e| Error::InvalidUrl(e.to_string()))
    }

    async fn send<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder, what: &str) -> Result<T, Error> {
        let start = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(format!("{what}: {e}")))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("{what}: failed to read response: {e}")))?;

        tracing::debug!("{what} -> {} in {:?}", status.as_u16(), start.elapsed());
        decode_body(status, &body)
    }

    async fn send_json<B: Serialize>(
        &self, method: reqwest::Method, path: &str, session: Option<&ApiSession>, body: &B,
    ) -> Result<ApiEnvelope, Error> {
        let url = self.endpoint(path)?;
        let what = format!("{method} {path}");
        let mut builder = self.http.request(method, url).json(body);
        if let Some(session) = session {
            builder = builder.header(AUTHORIZATION, session.header()?);
        }
        self.send(builder, &what).await
    }

    /// Create an account.
    pub async fn register(&self, request: &RegisterRequest) -> Result<ApiEnvelope, Error> {
        request.validate()?;
        self.send_json(reqwest::Method::POST, "register", None, request).await
    }

    /// Exchange credentials for a token.
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResult, Error> {
        request.validate()?;
        let url = self.endpoint("login")?;
        let response: LoginResponse = self.send(self.http.post(url).json(request), "POST login").await?;
        Ok(response.login_result)
    }

    /// List stories, newest first as the server orders them.
    pub async fn list_stories(&self, session: &ApiSession, query: &ListStoriesQuery) -> Result<Vec<Story>, Error> {
        let mut url = self.endpoint("stories")?;
        let pairs = query.pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }

        let request = Request::get(url).with_header(AUTHORIZATION, session.header()?);
        let response = self.reads.fetch(&request).await?;
        let parsed: StoriesResponse = decode_body(response.status, &response.body)?;
        Ok(parsed.list_story)
    }

    /// Upload a new story.
    pub async fn add_story(&self, session: &ApiSession, story: &NewPendingWrite) -> Result<ApiEnvelope, Error> {
        story.validate()?;

        let photo = Part::bytes(story.photo.clone())
            .file_name(story.photo_name.clone())
            .mime_str(&story.photo_mime)
            .map_err(|e| Error::InvalidInput(format!("bad photo mime {}: {e}", story.photo_mime)))?;
        let mut form = Form::new()
            .text("description", story.description.trim().to_string())
            .part("photo", photo);
        if let (Some(lat), Some(lon)) = (story.lat, story.lon) {
            form = form.text("lat", lat.to_string()).text("lon", lon.to_string());
        }

        let url = self.endpoint("stories")?;
        let builder = self
            .http
            .post(url)
            .header(AUTHORIZATION, session.header()?)
            .multipart(form);
        self.send(builder, "POST stories").await
    }

    /// Mirror a push registration to the server.
    pub async fn subscribe_push(
        &self, session: &ApiSession, subscription: &PushSubscription,
    ) -> Result<ApiEnvelope, Error> {
        let body = PushSubscribeRequest::from(subscription);
        self.send_json(reqwest::Method::POST, "notifications/subscribe", Some(session), &body)
            .await
    }

    /// Tell the server a push registration is gone.
    pub async fn unsubscribe_push(&self, session: &ApiSession, endpoint: &str) -> Result<ApiEnvelope, Error> {
        let body = PushUnsubscribeRequest { endpoint: endpoint.to_string() };
        self.send_json(reqwest::Method::DELETE, "notifications/subscribe", Some(session), &body)
            .await
    }

    /// Bind this client to a session for the reconciler and push lifecycle.
    pub fn authorized(&self, session: ApiSession) -> AuthorizedApi {
        AuthorizedApi { api: self.clone(), session }
    }
}

/// A [`StoryApi`] paired with the session it acts for.
#[derive(Clone)]
pub struct AuthorizedApi {
    api: StoryApi,
    session: ApiSession,
}

#[async_trait::async_trait]
impl StoryUploader for AuthorizedApi {
    async fn upload(&self, story: &NewPendingWrite) -> Result<(), Error> {
        self.api.add_story(&self.session, story).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl PushServer for AuthorizedApi {
    async fn register(&self, subscription: &PushSubscription) -> Result<(), Error> {
        self.api.subscribe_push(&self.session, subscription).await.map(|_| ())
    }

    async fn unregister(&self, endpoint: &str) -> Result<(), Error> {
        self.api.unsubscribe_push(&self.session, endpoint).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchConfig;
    use crate::testing::ScriptedNetwork;

    const STORIES_BODY: &[u8] = br#"{"error":false,"message":"ok","listStory":[
        {"id":"story-1","name":"Ann","description":"trip","photoUrl":"https://example.com/p.jpg",
         "createdAt":"2024-01-02T03:04:05.000Z","lat":-6.2,"lon":106.8}
    ]}"#;

    fn make_api(reads: Arc<dyn Network>) -> StoryApi {
        let network = HttpNetwork::new(FetchConfig::default()).unwrap();
        StoryApi::with_reads(&network, "https://story-api.dicoding.dev/v1", reads).unwrap()
    }

    #[test]
    fn test_decode_body_api_error() {
        let result: Result<ApiEnvelope, _> =
            decode_body(StatusCode::UNAUTHORIZED, br#"{"error":true,"message":"Missing authentication"}"#);
        assert!(matches!(result, Err(Error::Api(msg)) if msg == "Missing authentication"));
    }

    #[test]
    fn test_decode_body_non_json_error_status() {
        let result: Result<ApiEnvelope, _> = decode_body(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>");
        assert!(matches!(result, Err(Error::HttpError(_))));
    }

    #[test]
    fn test_decode_body_success() {
        let envelope: ApiEnvelope = decode_body(StatusCode::CREATED, br#"{"error":false,"message":"success"}"#).unwrap();
        assert!(!envelope.error);
        assert_eq!(envelope.message, "success");
    }

    #[test]
    fn test_session_debug_redacts_token() {
        let session = ApiSession::new("super-secret");
        assert!(!format!("{session:?}").contains("super-secret"));
        assert_eq!(session.token(), "super-secret");
    }

    #[tokio::test]
    async fn test_list_stories_through_reads() {
        let reads = Arc::new(ScriptedNetwork::new().route(
            "https://story-api.dicoding.dev/v1/stories?location=1",
            200,
            STORIES_BODY,
        ));
        let api = make_api(reads.clone());

        let query = ListStoriesQuery { location: true, ..Default::default() };
        let stories = api.list_stories(&ApiSession::new("t"), &query).await.unwrap();
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].lon, Some(106.8));
        assert_eq!(reads.calls(), 1);
    }

    #[tokio::test]
    async fn test_list_stories_offline_propagates() {
        let reads = Arc::new(ScriptedNetwork::new());
        reads.set_offline(true);
        let api = make_api(reads);

        let result = api.list_stories(&ApiSession::new("t"), &ListStoriesQuery::default()).await;
        assert!(result.unwrap_err().is_network());
    }

    #[tokio::test]
    async fn test_add_story_rejects_invalid_before_sending() {
        let api = make_api(Arc::new(ScriptedNetwork::new()));
        let result = api.add_story(&ApiSession::new("t"), &NewPendingWrite::new("", vec![1])).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
