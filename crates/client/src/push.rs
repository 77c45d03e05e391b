//! Push subscription lifecycle.
//!
//! The store holds the single registration and is the source of truth for
//! "subscribed". Subscribing is idempotent; unsubscribing tears the local side
//! down first and only then tells the server, without rolling back if the
//! server call fails.
//!
//! The push service itself lives outside this crate. Embedders supply a
//! [`PushEndpointProvider`] for it; [`ProvidedEndpoint`] covers the case where
//! the endpoint was already issued elsewhere and is only handed in.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use std::sync::Arc;
use storyline_core::{Error, PushSubscription, Store};

/// Length of an uncompressed P-256 public key.
const VAPID_KEY_LEN: usize = 65;

/// Endpoint and keys handed out by the push service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRegistration {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

/// The device-side push service.
#[async_trait::async_trait]
pub trait PushEndpointProvider: Send + Sync {
    /// Create a registration bound to `application_server_key`.
    async fn subscribe(&self, application_server_key: &[u8]) -> Result<PushRegistration, Error>;

    /// Drop the registration at `endpoint`. Returns whether it existed.
    async fn unsubscribe(&self, endpoint: &str) -> Result<bool, Error>;
}

/// A registration issued outside this process, such as one copied from a
/// browser's `PushSubscription`.
#[derive(Debug, Clone, Default)]
pub struct ProvidedEndpoint {
    registration: Option<PushRegistration>,
}

impl ProvidedEndpoint {
    pub fn new(registration: PushRegistration) -> Self {
        Self { registration: Some(registration) }
    }

    /// A provider with nothing to hand out; enough for unsubscribing.
    pub fn none() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PushEndpointProvider for ProvidedEndpoint {
    async fn subscribe(&self, _application_server_key: &[u8]) -> Result<PushRegistration, Error> {
        self.registration
            .clone()
            .ok_or_else(|| Error::InvalidInput("no push endpoint was supplied".into()))
    }

    /// The issuer owns the endpoint, so there is nothing to drop here.
    async fn unsubscribe(&self, _endpoint: &str) -> Result<bool, Error> {
        Ok(false)
    }
}

/// The remote server that sends pushes to registered endpoints.
#[async_trait::async_trait]
pub trait PushServer: Send + Sync {
    async fn register(&self, subscription: &PushSubscription) -> Result<(), Error>;
    async fn unregister(&self, endpoint: &str) -> Result<(), Error>;
}

/// Result of [`SubscriptionManager::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubscribeOutcome {
    /// A registration existed and was removed locally.
    pub existed: bool,
    /// The server confirmed the removal.
    pub server_acknowledged: bool,
}

/// Decode a URL-safe base64 VAPID public key, padded or not.
pub fn decode_vapid_key(key: &str) -> Result<Vec<u8>, Error> {
    let trimmed = key.trim().trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed)
        .map_err(|e| Error::InvalidInput(format!("VAPID key is not URL-safe base64: {e}")))?;

    if bytes.len() != VAPID_KEY_LEN || bytes[0] != 0x04 {
        return Err(Error::InvalidInput(format!(
            "VAPID key must be an uncompressed P-256 point ({VAPID_KEY_LEN} bytes), got {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes)
}

pub struct SubscriptionManager {
    store: Store,
    provider: Arc<dyn PushEndpointProvider>,
    server: Arc<dyn PushServer>,
    application_server_key: Vec<u8>,
}

impl SubscriptionManager {
    pub fn new(
        store: Store, provider: Arc<dyn PushEndpointProvider>, server: Arc<dyn PushServer>, vapid_public_key: &str,
    ) -> Result<Self, Error> {
        let application_server_key = decode_vapid_key(vapid_public_key)?;
        Ok(Self { store, provider, server, application_server_key })
    }

    pub async fn is_subscribed(&self) -> Result<bool, Error> {
        Ok(self.store.current_subscription().await?.is_some())
    }

    /// Register this device for pushes, or return the existing registration.
    ///
    /// A registration the server never acknowledged is mirrored again.
    pub async fn subscribe(&self) -> Result<PushSubscription, Error> {
        if let Some(existing) = self.store.current_subscription().await? {
            if existing.mirrored {
                return Ok(existing);
            }
            return self.mirror(existing).await;
        }

        let registration = self.provider.subscribe(&self.application_server_key).await?;
        let subscription = PushSubscription {
            endpoint: registration.endpoint,
            p256dh: registration.p256dh,
            auth: registration.auth,
            created_at: Utc::now(),
            mirrored: false,
        };
        self.store.save_subscription(&subscription).await?;
        tracing::info!("registered push endpoint {}", subscription.endpoint);

        self.mirror(subscription).await
    }

    async fn mirror(&self, mut subscription: PushSubscription) -> Result<PushSubscription, Error> {
        match self.server.register(&subscription).await {
            Ok(()) => {
                subscription.mirrored = self.store.mark_subscription_mirrored(&subscription.endpoint).await?;
            }
            Err(e) => tracing::warn!("server did not accept push registration, will retry on next subscribe: {e}"),
        }
        Ok(subscription)
    }

    /// Remove the registration locally, then tell the server.
    pub async fn unsubscribe(&self) -> Result<UnsubscribeOutcome, Error> {
        let Some(existing) = self.store.current_subscription().await? else {
            return Ok(UnsubscribeOutcome { existed: false, server_acknowledged: false });
        };

        if !self.provider.unsubscribe(&existing.endpoint).await? {
            tracing::debug!("push service had already dropped {}", existing.endpoint);
        }
        self.store.clear_subscription().await?;

        let server_acknowledged = match self.server.unregister(&existing.endpoint).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("server did not confirm push removal: {e}");
                false
            }
        };

        Ok(UnsubscribeOutcome { existed: true, server_acknowledged })
    }

    /// Flip the subscription state. Returns whether the device is now subscribed.
    pub async fn toggle(&self) -> Result<bool, Error> {
        if self.is_subscribed().await? {
            self.unsubscribe().await?;
            Ok(false)
        } else {
            self.subscribe().await?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const VAPID: &str = "BCCs2eonMI-6H2ctvFaWg-UYdDv387Vno_bzUzALpB442r2lCnsHmtrx8biyPi_E-1fSGABK_Qs_GlvPoJJqxbk";

    #[derive(Default)]
    struct FakeProvider {
        issued: AtomicUsize,
        dropped: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl PushEndpointProvider for FakeProvider {
        async fn subscribe(&self, key: &[u8]) -> Result<PushRegistration, Error> {
            assert_eq!(key.len(), VAPID_KEY_LEN);
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(PushRegistration {
                endpoint: format!("https://push.example/{n}"),
                p256dh: "p256dh".into(),
                auth: "auth".into(),
            })
        }

        async fn unsubscribe(&self, endpoint: &str) -> Result<bool, Error> {
            self.dropped.lock().unwrap().push(endpoint.to_string());
            Ok(true)
        }
    }

    #[derive(Default)]
    struct FakeServer {
        down: AtomicBool,
        registered: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl PushServer for FakeServer {
        async fn register(&self, subscription: &PushSubscription) -> Result<(), Error> {
            if self.down.load(Ordering::SeqCst) {
                return Err(Error::Network("server unreachable".into()));
            }
            self.registered.lock().unwrap().push(subscription.endpoint.clone());
            Ok(())
        }

        async fn unregister(&self, endpoint: &str) -> Result<(), Error> {
            if self.down.load(Ordering::SeqCst) {
                return Err(Error::Network("server unreachable".into()));
            }
            self.registered.lock().unwrap().retain(|e| e != endpoint);
            Ok(())
        }
    }

    async fn make_manager() -> (SubscriptionManager, Arc<FakeProvider>, Arc<FakeServer>, Store) {
        let store = Store::open_in_memory().await.unwrap();
        let provider = Arc::new(FakeProvider::default());
        let server = Arc::new(FakeServer::default());
        let manager = SubscriptionManager::new(store.clone(), provider.clone(), server.clone(), VAPID).unwrap();
        (manager, provider, server, store)
    }

    #[test]
    fn test_decode_vapid_key() {
        let key = decode_vapid_key(VAPID).unwrap();
        assert_eq!(key.len(), VAPID_KEY_LEN);
        assert_eq!(key[0], 0x04);

        let padded = format!("{VAPID}=");
        assert_eq!(decode_vapid_key(&padded).unwrap(), key);

        assert!(decode_vapid_key("not+base64/url").is_err());
        assert!(decode_vapid_key("AAAA").is_err());
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let (manager, provider, server, _store) = make_manager().await;

        let first = manager.subscribe().await.unwrap();
        assert!(first.mirrored);
        let second = manager.subscribe().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.issued.load(Ordering::SeqCst), 1);
        assert_eq!(server.registered.lock().unwrap().len(), 1);
        assert!(manager.is_subscribed().await.unwrap());
    }

    #[tokio::test]
    async fn test_unmirrored_registration_is_retried() {
        let (manager, provider, server, store) = make_manager().await;
        server.down.store(true, Ordering::SeqCst);

        let sub = manager.subscribe().await.unwrap();
        assert!(!sub.mirrored);
        assert!(!store.current_subscription().await.unwrap().unwrap().mirrored);

        server.down.store(false, Ordering::SeqCst);
        let sub = manager.subscribe().await.unwrap();
        assert!(sub.mirrored);
        assert_eq!(provider.issued.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_local_first() {
        let (manager, provider, server, _store) = make_manager().await;
        manager.subscribe().await.unwrap();
        server.down.store(true, Ordering::SeqCst);

        let outcome = manager.unsubscribe().await.unwrap();
        assert_eq!(outcome, UnsubscribeOutcome { existed: true, server_acknowledged: false });
        assert!(!manager.is_subscribed().await.unwrap());
        assert_eq!(provider.dropped.lock().unwrap().as_slice(), ["https://push.example/1"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_without_registration() {
        let (manager, _provider, _server, _store) = make_manager().await;
        let outcome = manager.unsubscribe().await.unwrap();
        assert!(!outcome.existed);
    }

    #[tokio::test]
    async fn test_provided_endpoint_round_trip() {
        let store = Store::open_in_memory().await.unwrap();
        let server = Arc::new(FakeServer::default());
        let registration = PushRegistration {
            endpoint: "https://fcm.example/send/abc".into(),
            p256dh: "p256dh".into(),
            auth: "auth".into(),
        };
        let provider = Arc::new(ProvidedEndpoint::new(registration));
        let manager = SubscriptionManager::new(store.clone(), provider, server.clone(), VAPID).unwrap();

        let sub = manager.subscribe().await.unwrap();
        assert_eq!(sub.endpoint, "https://fcm.example/send/abc");
        assert!(sub.mirrored);

        let manager = SubscriptionManager::new(store, Arc::new(ProvidedEndpoint::none()), server.clone(), VAPID).unwrap();
        let outcome = manager.unsubscribe().await.unwrap();
        assert_eq!(outcome, UnsubscribeOutcome { existed: true, server_acknowledged: true });
        assert!(server.registered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_provider_cannot_subscribe() {
        let store = Store::open_in_memory().await.unwrap();
        let manager =
            SubscriptionManager::new(store, Arc::new(ProvidedEndpoint::none()), Arc::new(FakeServer::default()), VAPID)
                .unwrap();

        assert!(matches!(manager.subscribe().await, Err(Error::InvalidInput(_))));
        assert!(!manager.is_subscribed().await.unwrap());
    }

    #[tokio::test]
    async fn test_toggle() {
        let (manager, _provider, server, _store) = make_manager().await;

        assert!(manager.toggle().await.unwrap());
        assert_eq!(server.registered.lock().unwrap().len(), 1);
        assert!(!manager.toggle().await.unwrap());
        assert!(server.registered.lock().unwrap().is_empty());
    }
}
