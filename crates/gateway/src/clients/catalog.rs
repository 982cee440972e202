//! Public product listing, degraded to an empty list when the product
//! service cannot be reached.

use std::time::Duration;

use async_trait::async_trait;
use common::{Context, ServiceError, transport};
use order::{InMemoryProductAuthority, Product};
use resilience::{Failure, RetryPolicy};

use super::auth::network_error;

/// Lists the product catalogue.
#[async_trait]
pub trait ProductListing: Send + Sync {
    /// Returns the catalogue. Implementations may degrade to an empty list
    /// instead of failing; terminal and cancellation failures are errors.
    async fn list_products(&self, ctx: &Context) -> Result<Vec<Product>, ServiceError>;
}

/// Product service client over HTTP (`GET /api/products`).
///
/// Network errors and 5xx responses are retried with backoff; 4xx
/// responses and undecodable bodies stop immediately. Once every attempt
/// has failed the listing falls back to an empty catalogue.
#[derive(Debug, Clone)]
pub struct HttpProductCatalog {
    base_url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpProductCatalog {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            retry,
        })
    }
}

async fn fetch_products(http: &reqwest::Client, url: &str) -> Result<Vec<Product>, Failure> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| Failure::Retryable(network_error("product service", &e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let err = transport::from_http_status(status, &body);
        return Err(if status.is_server_error() {
            Failure::Retryable(err)
        } else {
            Failure::Terminal(err)
        });
    }

    response.json::<Vec<Product>>().await.map_err(|e| {
        Failure::Terminal(ServiceError::internal(format!(
            "failed to decode product list: {e}"
        )))
    })
}

#[async_trait]
impl ProductListing for HttpProductCatalog {
    #[tracing::instrument(skip(self, ctx))]
    async fn list_products(&self, ctx: &Context) -> Result<Vec<Product>, ServiceError> {
        let url = format!("{}/api/products", self.base_url);
        let http = &self.http;
        let url = url.as_str();
        resilience::retry_or_fallback(
            &self.retry,
            ctx,
            "list_products",
            move || fetch_products(http, url),
            Vec::new,
        )
        .await
    }
}

#[async_trait]
impl ProductListing for InMemoryProductAuthority {
    async fn list_products(&self, ctx: &Context) -> Result<Vec<Product>, ServiceError> {
        match ctx.err() {
            Some(err) => Err(err),
            None => Ok(self.products()),
        }
    }
}
