//! Seller endpoints: listing analysis, product CRUD and analytics

use crate::api::CatalogApi;
use crate::model::{ImageAnalysis, Product, ProductDraft, ProductsEnvelope, User};
use crate::transport::TransportClient;
use crate::voice::VoiceRecording;
use crate::{Error, Result};

/// Client for the `/api/v1/seller` endpoints
///
/// Writes invalidate the catalog's cached copy of the affected product.
#[derive(Clone, Debug)]
pub struct SellerApi {
    transport: TransportClient,
    catalog: CatalogApi,
}

impl SellerApi {
    /// Create a seller client sharing `catalog`'s product cache
    #[must_use]
    pub const fn new(transport: TransportClient, catalog: CatalogApi) -> Self {
        Self { transport, catalog }
    }

    /// Stored user, required to hold the seller role
    fn seller(&self, action: &str) -> Result<User> {
        self.transport
            .context()
            .auth()
            .seller()
            .ok_or_else(|| Error::ClientInput(format!("only sellers can {action}")))
    }

    /// Ask the backend to draft a listing from a product photo
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientInput` if the stored user is not a seller, or a
    /// transport error if the upload fails
    pub async fn analyze_image(
        &self,
        image: Vec<u8>,
        file_name: &str,
        mime_type: &str,
    ) -> Result<ImageAnalysis> {
        let seller = self.seller("analyze images")?;

        let part = reqwest::multipart::Part::bytes(image)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(|e| Error::ClientInput(format!("invalid image type: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("seller_id", seller.id.to_string());

        self.transport
            .multipart("/api/v1/seller/analyze-image", form)
            .await
    }

    /// Create a product owned by the stored seller
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientInput` if the stored user is not a seller, or a
    /// transport error if the request fails
    pub async fn create_product(&self, draft: &ProductDraft) -> Result<Product> {
        let seller = self.seller("create products")?;

        let product: Product = self
            .transport
            .post(&format!("/api/v1/seller/products?seller_id={}", seller.id), draft)
            .await?;

        tracing::info!(id = product.id, seller_id = seller.id, "product created");
        Ok(product)
    }

    /// Update a product
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn update_product(&self, id: i64, draft: &ProductDraft) -> Result<Product> {
        self.catalog.invalidate(id);
        let product: Product = self
            .transport
            .put(&format!("/api/v1/seller/products/{id}"), draft)
            .await?;
        // a read racing the write may have cached the old copy
        self.catalog.invalidate(id);

        tracing::info!(id, "product updated");
        Ok(product)
    }

    /// Delete a product
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn delete_product(&self, id: i64) -> Result<()> {
        self.catalog.invalidate(id);
        self.transport
            .delete(&format!("/api/v1/seller/products/{id}"))
            .await?;
        self.catalog.invalidate(id);

        tracing::info!(id, "product deleted");
        Ok(())
    }

    /// Products of the authenticated seller
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn products(&self) -> Result<Vec<Product>> {
        let envelope: ProductsEnvelope = self.transport.get("/api/v1/seller/products").await?;
        Ok(envelope.products)
    }

    /// Update a product's price from a spoken instruction; the recording is consumed
    ///
    /// # Errors
    ///
    /// Returns error if the upload fails
    pub async fn update_price_with_voice(
        &self,
        recording: VoiceRecording,
        product_id: i64,
    ) -> Result<serde_json::Value> {
        self.catalog.invalidate(product_id);

        let form = reqwest::multipart::Form::new()
            .part("audio_file", recording.into_part()?)
            .text("product_id", product_id.to_string());

        let result = self
            .transport
            .multipart("/api/v1/seller/voice-price-update", form)
            .await?;
        self.catalog.invalidate(product_id);
        Ok(result)
    }

    /// Update any product field from a spoken instruction; the recording is consumed
    ///
    /// The instruction is tagged with the current session id so the assistant
    /// can keep context across several edits.
    ///
    /// # Errors
    ///
    /// Returns `Error::ClientInput` if the stored user is not a seller, or a
    /// transport error if the upload fails
    pub async fn update_product_with_voice(
        &self,
        recording: VoiceRecording,
        product_id: i64,
    ) -> Result<serde_json::Value> {
        let seller = self.seller("update products")?;
        self.catalog.invalidate(product_id);

        let session_id = self.transport.context().sessions().session_id();
        let form = reqwest::multipart::Form::new()
            .part("audio_data", recording.into_part()?)
            .text("session_id", session_id)
            .text("message_type", "product_management");

        let result = self
            .transport
            .multipart(
                &format!(
                    "/api/v1/seller/products/{product_id}/voice-update?seller_id={}",
                    seller.id
                ),
                form,
            )
            .await?;
        self.catalog.invalidate(product_id);

        tracing::info!(id = product_id, seller_id = seller.id, "product updated by voice");
        Ok(result)
    }

    /// Seller analytics, passed through as raw JSON
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn analytics(&self) -> Result<serde_json::Value> {
        self.transport.get("/api/v1/seller/analytics").await
    }
}
