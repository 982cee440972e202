//! Response cache for idempotent reads, keyed per caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::{OriginalUri, Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use common::{Identity, ServiceError, UserId};
use sha2::{Digest, Sha256};
use tokio::time::Instant;

/// Header marking a response served from the cache.
pub const CACHE_HEADER: &str = "x-cache";

/// A keyed store with per-entry expiration.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, ServiceError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), ServiceError>;
}

/// Process-local cache store; expired entries are dropped on read.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: Mutex<HashMap<String, (Bytes, Instant)>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, ServiceError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((value, expires_at)) if Instant::now() < *expires_at => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), ServiceError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }
}

/// `cache:` + hex SHA-256 of the request URI, prefixed by the caller's id
/// when there is one, so two users never share an entry.
pub fn cache_key(uri: &str, user_id: Option<UserId>) -> String {
    let material = match user_id {
        Some(id) => format!("{id}:{uri}"),
        None => uri.to_string(),
    };
    format!("cache:{}", hex::encode(Sha256::digest(material.as_bytes())))
}

/// Cache store plus the expiration applied to new entries.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }
}

/// Serves GET requests from the cache and stores successful responses.
///
/// Only `200 OK` bodies are stored. Cache failures are logged and treated
/// as misses.
pub async fn cache_responses(
    State(cache): State<ResponseCache>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    // Nested routers see a stripped path; key on what the client sent.
    let uri = request
        .extensions()
        .get::<OriginalUri>()
        .map_or(request.uri(), |original| &original.0);
    let uri = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());
    let user_id = request.extensions().get::<Identity>().map(|i| i.user_id);
    let key = cache_key(&uri, user_id);

    match cache.store.get(&key).await {
        Ok(Some(body)) => {
            metrics::counter!("response_cache_hits_total").increment(1);
            tracing::debug!(%uri, "response cache hit");
            return cached_response(body);
        }
        Ok(None) => {}
        Err(err) => tracing::warn!(error = %err, "response cache read failed"),
    }
    metrics::counter!("response_cache_misses_total").increment(1);

    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "failed to buffer response for caching");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if let Err(err) = cache.store.set(&key, bytes.clone(), cache.ttl).await {
        tracing::warn!(error = %err, "response cache write failed");
    }
    Response::from_parts(parts, Body::from(bytes))
}

fn cached_response(body: Bytes) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    headers.insert(CACHE_HEADER, HeaderValue::from_static("HIT"));
    response
}
