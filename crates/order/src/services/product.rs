//! Product authority trait and in-memory implementation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{Context, ProductId, ServiceError};

use crate::model::Product;

/// The remote service that owns products and their stock levels.
#[async_trait]
pub trait ProductAuthority: Send + Sync {
    /// Fetches every known product among `ids`; unknown ids are simply absent.
    async fn get_products(
        &self,
        ctx: &Context,
        ids: &[ProductId],
    ) -> Result<Vec<Product>, ServiceError>;

    /// Applies a signed stock delta and returns the new stock level.
    ///
    /// Unknown products are `NotFound`; a delta that would drive stock
    /// below zero is `InvalidInput`.
    async fn update_stock(
        &self,
        ctx: &Context,
        product_id: ProductId,
        delta: i64,
    ) -> Result<i64, ServiceError>;
}

#[async_trait]
impl<T: ProductAuthority + ?Sized> ProductAuthority for Arc<T> {
    async fn get_products(
        &self,
        ctx: &Context,
        ids: &[ProductId],
    ) -> Result<Vec<Product>, ServiceError> {
        (**self).get_products(ctx, ids).await
    }

    async fn update_stock(
        &self,
        ctx: &Context,
        product_id: ProductId,
        delta: i64,
    ) -> Result<i64, ServiceError> {
        (**self).update_stock(ctx, product_id, delta).await
    }
}

#[derive(Debug, Default)]
struct InMemoryProductState {
    products: HashMap<ProductId, Product>,
    stock_calls: Vec<(ProductId, i64)>,
    get_calls: usize,
    fail_stock_updates: HashSet<ProductId>,
    fail_get_products: Option<ServiceError>,
    latency: Option<Duration>,
}

/// In-memory product authority for tests and local wiring.
///
/// Records every stock delta it is asked to apply, successful or not.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductAuthority {
    state: Arc<RwLock<InMemoryProductState>>,
}

impl InMemoryProductAuthority {
    /// Creates a new empty product authority.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an authority seeded with `products`.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let authority = Self::new();
        for product in products {
            authority.insert(product);
        }
        authority
    }

    pub fn insert(&self, product: Product) {
        self.state
            .write()
            .unwrap()
            .products
            .insert(product.id, product);
    }

    /// Forgets a product, as if it were deleted from the catalogue.
    pub fn remove(&self, product_id: ProductId) {
        self.state.write().unwrap().products.remove(&product_id);
    }

    /// Every known product, ordered by id.
    pub fn products(&self) -> Vec<Product> {
        let mut products: Vec<Product> =
            self.state.read().unwrap().products.values().cloned().collect();
        products.sort_by_key(|p| p.id);
        products
    }

    /// Current stock of a product, if known.
    pub fn stock_of(&self, product_id: ProductId) -> Option<i64> {
        self.state
            .read()
            .unwrap()
            .products
            .get(&product_id)
            .map(|p| p.stock)
    }

    /// Changes a product's price, as an administrator would after an order exists.
    pub fn set_price(&self, product_id: ProductId, price: common::Money) {
        if let Some(product) = self.state.write().unwrap().products.get_mut(&product_id) {
            product.price = price;
        }
    }

    /// Makes every stock update for `product_id` fail with `ServiceUnavailable`.
    pub fn set_fail_stock_update(&self, product_id: ProductId, fail: bool) {
        let mut state = self.state.write().unwrap();
        if fail {
            state.fail_stock_updates.insert(product_id);
        } else {
            state.fail_stock_updates.remove(&product_id);
        }
    }

    /// Makes `get_products` fail with the given error.
    pub fn set_fail_get_products(&self, error: Option<ServiceError>) {
        self.state.write().unwrap().fail_get_products = error;
    }

    /// Delays every call, honouring the caller's context.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.write().unwrap().latency = latency;
    }

    /// Every `(product, delta)` pair passed to `update_stock`, in call order.
    pub fn stock_calls(&self) -> Vec<(ProductId, i64)> {
        self.state.read().unwrap().stock_calls.clone()
    }

    /// Number of `get_products` calls received.
    pub fn get_products_calls(&self) -> usize {
        self.state.read().unwrap().get_calls
    }

    fn latency(&self) -> Option<Duration> {
        self.state.read().unwrap().latency
    }
}

async fn simulate_latency(latency: Option<Duration>) {
    if let Some(delay) = latency {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl ProductAuthority for InMemoryProductAuthority {
    async fn get_products(
        &self,
        ctx: &Context,
        ids: &[ProductId],
    ) -> Result<Vec<Product>, ServiceError> {
        let latency = self.latency();
        ctx.run(async {
            simulate_latency(latency).await;
            let mut state = self.state.write().unwrap();
            state.get_calls += 1;
            if let Some(err) = &state.fail_get_products {
                return Err(err.clone());
            }
            let mut seen = HashSet::new();
            Ok(ids
                .iter()
                .filter(|id| seen.insert(**id))
                .filter_map(|id| state.products.get(id).cloned())
                .collect())
        })
        .await
    }

    async fn update_stock(
        &self,
        ctx: &Context,
        product_id: ProductId,
        delta: i64,
    ) -> Result<i64, ServiceError> {
        let latency = self.latency();
        ctx.run(async {
            simulate_latency(latency).await;
            let mut state = self.state.write().unwrap();
            state.stock_calls.push((product_id, delta));
            if state.fail_stock_updates.contains(&product_id) {
                return Err(ServiceError::unavailable("product service unavailable"));
            }
            let product = state.products.get_mut(&product_id).ok_or_else(|| {
                ServiceError::not_found(format!("product {product_id} not found"))
            })?;
            let next = product.stock + delta;
            if next < 0 {
                return Err(ServiceError::invalid_input(format!(
                    "insufficient stock for product {product_id}: have {}, need {}",
                    product.stock, -delta
                )));
            }
            product.stock = next;
            Ok(next)
        })
        .await
    }
}
