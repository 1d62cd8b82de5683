//! Read-only catalog endpoints with a per-product TTL cache
//!
//! Products are owned by the remote catalog. Copies fetched by any query are
//! cached by id and expire after [`PRODUCT_CACHE_TTL`]; seller updates and
//! deletes invalidate the affected entry.

use std::time::Duration;

use mini_moka::sync::Cache;

use crate::Result;
use crate::model::{
    CategoriesEnvelope, Category, Product, ProductEnvelope, ProductQuery, ProductsEnvelope,
};
use crate::transport::TransportClient;

/// How long a fetched product copy stays fresh
pub const PRODUCT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Max cached product copies
const PRODUCT_CACHE_CAPACITY: u64 = 2048;

/// Client for the `/api/v1/products` endpoints
#[derive(Clone)]
pub struct CatalogApi {
    transport: TransportClient,
    products: Cache<i64, Product>,
}

impl CatalogApi {
    /// Create a catalog client with the default cache TTL
    #[must_use]
    pub fn new(transport: TransportClient) -> Self {
        Self::with_ttl(transport, PRODUCT_CACHE_TTL)
    }

    /// Create a catalog client with a custom cache TTL
    #[must_use]
    pub fn with_ttl(transport: TransportClient, ttl: Duration) -> Self {
        Self {
            transport,
            products: Cache::builder()
                .max_capacity(PRODUCT_CACHE_CAPACITY)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// List products matching `query`
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn products(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        let envelope: ProductsEnvelope = self
            .transport
            .get_with_query("/api/v1/products", &query.to_pairs())
            .await?;

        tracing::debug!(
            success = envelope.success,
            returned = envelope.products.len(),
            total_found = envelope.total_found,
            "product listing"
        );

        Ok(self.remember(envelope.products))
    }

    /// Product detail, served from cache while fresh
    ///
    /// # Errors
    ///
    /// Returns error if the product is not cached and the request fails
    pub async fn product(&self, id: i64) -> Result<Product> {
        if let Some(product) = self.products.get(&id) {
            tracing::trace!(id, "product cache hit");
            return Ok(product);
        }

        let envelope: ProductEnvelope = self
            .transport
            .get(&format!("/api/v1/products/{id}"))
            .await?;
        tracing::debug!(id, success = envelope.success, "product detail");

        self.products.insert(envelope.product.id, envelope.product.clone());
        Ok(envelope.product)
    }

    /// Featured products
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn featured(&self) -> Result<Vec<Product>> {
        let envelope: ProductsEnvelope = self.transport.get("/api/v1/products/featured").await?;
        Ok(self.remember(envelope.products))
    }

    /// Product categories
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn categories(&self) -> Result<Vec<Category>> {
        let envelope: CategoriesEnvelope =
            self.transport.get("/api/v1/products/categories").await?;
        tracing::debug!(success = envelope.success, count = envelope.categories.len(), "categories");
        Ok(envelope.categories)
    }

    /// Cached copy of a product, if fresh
    #[must_use]
    pub fn cached(&self, id: i64) -> Option<Product> {
        self.products.get(&id)
    }

    /// Drop the cached copy of a product
    pub fn invalidate(&self, id: i64) {
        self.products.invalidate(&id);
    }

    /// Record fetched products in the cache
    pub fn remember(&self, products: Vec<Product>) -> Vec<Product> {
        for product in &products {
            self.products.insert(product.id, product.clone());
        }
        products
    }
}

impl std::fmt::Debug for CatalogApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogApi")
            .field("cached_products", &self.products.entry_count())
            .finish_non_exhaustive()
    }
}
