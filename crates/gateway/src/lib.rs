//! Backend-for-frontend gateway for the storefront.
//!
//! Serves the public HTTP API: authenticates callers, applies the edge
//! policies (rate limiting and response caching), forwards order commands
//! to the order saga and builds aggregated read views by fanning out to the
//! user, order and product services concurrently.

pub mod aggregate;
pub mod clients;
pub mod config;
pub mod error;
pub mod policies;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use common::{Context, Identity, ServiceError};
use metrics_exporter_prometheus::PrometheusHandle;
use order::{InMemoryOrderRepository, InMemoryProductAuthority, OrderSaga};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use aggregate::Aggregator;
use clients::{
    AuthAuthority, HttpAuthClient, HttpProductCatalog, InMemoryAuthAuthority,
    InMemoryUserAuthority, OrderBackend, ProductListing, UserAuthority,
};
use config::Config;
use policies::{
    InMemoryCacheStore, ResponseCache, TokenBucket, cache_responses, rate_limit, require_auth,
};

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn OrderBackend>,
    pub users: Arc<dyn UserAuthority>,
    pub auth: Arc<dyn AuthAuthority>,
    pub catalog: Arc<dyn ProductListing>,
    pub aggregator: Aggregator,
    pub cache: ResponseCache,
    pub limiter: Arc<TokenBucket>,
    pub request_timeout: Duration,
}

/// Handles to the in-memory adapters behind an [`AppState::in_memory`]
/// state, for seeding data and injecting failures.
#[derive(Clone)]
pub struct InMemoryBackends {
    pub users: InMemoryUserAuthority,
    pub products: InMemoryProductAuthority,
    pub orders: InMemoryOrderRepository,
    pub auth: Arc<InMemoryAuthAuthority>,
    pub cache: Arc<InMemoryCacheStore>,
}

impl AppState {
    /// Wires every downstream port to an in-process adapter.
    pub fn in_memory(config: &Config) -> (Self, InMemoryBackends) {
        let users = InMemoryUserAuthority::new();
        let products = InMemoryProductAuthority::new();
        let repository = InMemoryOrderRepository::new();
        let auth = Arc::new(InMemoryAuthAuthority::new(Arc::new(users.clone())));
        let cache = Arc::new(InMemoryCacheStore::new());

        let saga: Arc<dyn OrderBackend> = Arc::new(
            OrderSaga::new(products.clone(), repository.clone())
                .with_retry_policy(config.retry_policy()),
        );
        let user_port: Arc<dyn UserAuthority> = Arc::new(users.clone());

        let state = Self {
            aggregator: Aggregator::new(
                user_port.clone(),
                saga.clone(),
                Arc::new(products.clone()),
            ),
            orders: saga,
            users: user_port,
            auth: auth.clone(),
            catalog: Arc::new(products.clone()),
            cache: ResponseCache::new(cache.clone(), config.cache_ttl),
            limiter: Arc::new(TokenBucket::new(
                config.rate_limit_rps,
                config.rate_limit_burst,
            )),
            request_timeout: config.request_timeout,
        };

        let backends = InMemoryBackends {
            users,
            products,
            orders: repository,
            auth,
            cache,
        };
        (state, backends)
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthAuthority>) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ProductListing>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Call context for a request made on behalf of `identity`.
    pub fn context(&self, identity: &Identity) -> Context {
        Context::new()
            .with_identity(identity)
            .with_timeout(self.request_timeout)
    }

    /// Call context for a public request.
    pub fn anonymous_context(&self) -> Context {
        Context::new().with_timeout(self.request_timeout)
    }
}

/// Creates the application state used by the binary.
///
/// Users and orders are served in-process; authentication and the product
/// listing go to the services named in `config` over HTTP.
pub fn create_default_state(config: &Config) -> Result<AppState, ServiceError> {
    let auth = HttpAuthClient::new(&config.auth_service_url, config.http_client_timeout)?;
    let catalog = HttpProductCatalog::new(
        &config.product_service_url,
        config.http_client_timeout,
        config.retry_policy(),
    )?;

    let (state, _) = AppState::in_memory(config);
    Ok(state
        .with_auth(Arc::new(auth))
        .with_catalog(Arc::new(catalog)))
}

/// Creates the Axum application router with all routes and shared state.
///
/// The rate limiter wraps every route. Public GETs are cached under an
/// anonymous key; protected GETs are cached after authentication so the
/// key includes the caller.
pub fn create_app(state: AppState, metrics_handle: PrometheusHandle) -> Router {
    let public = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/products", get(routes::products::list))
        .route_layer(from_fn_with_state(state.cache.clone(), cache_responses));

    let protected = Router::new()
        .route(
            "/orders",
            post(routes::orders::create).get(routes::orders::list),
        )
        .route("/orders/stats", get(routes::orders::stats))
        .route(
            "/orders/{id}",
            get(routes::orders::get).patch(routes::orders::update_status),
        )
        .route("/orders/{id}/cancel", post(routes::orders::cancel))
        .route("/profile", get(routes::profile::get))
        .route_layer(from_fn_with_state(state.cache.clone(), cache_responses))
        .route_layer(from_fn_with_state(state.auth.clone(), require_auth));

    let metrics_router = Router::new()
        .route("/metrics", get(routes::health::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .nest("/api/v1", public.merge(protected))
        .with_state(state.clone())
        .merge(metrics_router)
        .layer(from_fn_with_state(state.limiter.clone(), rate_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
