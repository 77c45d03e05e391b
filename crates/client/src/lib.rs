//! Client side of the storyline offline core.
//!
//! This crate provides the HTTP fetch layer, the cache router and lifecycle
//! manager, the story API client, the write-queue reconciler and the push
//! subscription lifecycle. Storage lives in `storyline-core`.

pub mod api;
pub mod fetch;
pub mod lifecycle;
pub mod push;
pub mod reconciler;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiSession, AuthorizedApi, ListStoriesQuery, LoginRequest, LoginResult, RegisterRequest, StoryApi};
pub use fetch::{FetchConfig, HttpNetwork, Network, Request, Response};
pub use lifecycle::{LifecycleEvent, LifecycleManager, LifecycleState};
pub use push::{ProvidedEndpoint, PushEndpointProvider, PushRegistration, PushServer, SubscriptionManager, UnsubscribeOutcome};
pub use reconciler::{Reconciler, StoryUploader, SubmitOutcome, SweepReport, SyncHandle, sync_channel};
pub use router::{CacheRouter, CacheSource, Served};
