//! Scripted network used by the router and lifecycle tests.

use crate::fetch::{Network, Request, Response};
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use storyline_core::Error;

#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, (u16, Bytes)>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: &str, status: u16, body: &'static [u8]) -> Self {
        self.set(url, status, body);
        self
    }

    pub fn set(&self, url: &str, status: u16, body: &'static [u8]) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, Bytes::from_static(body)));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {}", request.url)));
        }

        let routes = self.routes.lock().unwrap();
        let (status, body) = routes
            .get(request.url.as_str())
            .cloned()
            .unwrap_or((404, Bytes::from_static(b"not found")));

        Ok(Response {
            url: request.url.clone(),
            status: StatusCode::from_u16(status).unwrap(),
            headers: HeaderMap::new(),
            body,
        })
    }
}
