use crate::client::{ApiClient, RequestConfig};
use crate::error::ClientError;
use crate::services::resource_path;
use apimart_core::{ApiListing, CreateApiRequest, ListQuery, Page, UpdateApiRequest, Validate};
use serde_json::json;
use tracing::info;

/// API listings: browsing for everyone, management for their owners
#[derive(Clone)]
pub struct ApiService {
    client: ApiClient,
}

impl ApiService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Browse the marketplace
    pub async fn list(&self, query: &ListQuery) -> Result<Page<ApiListing>, ClientError> {
        self.client
            .get_page("/apis", query, RequestConfig::default())
            .await
    }

    /// Listings owned by the signed-in user, in any status
    pub async fn list_mine(&self, query: &ListQuery) -> Result<Page<ApiListing>, ClientError> {
        self.client
            .get_page("/apis/mine", query, RequestConfig::default())
            .await
    }

    pub async fn get(&self, id: &str) -> Result<ApiListing, ClientError> {
        self.client
            .get(&resource_path(&["apis", id])?, RequestConfig::default())
            .await
    }

    pub async fn create(&self, request: &CreateApiRequest) -> Result<ApiListing, ClientError> {
        request.validate()?;
        let listing: ApiListing = self
            .client
            .post("/apis", request, RequestConfig::default())
            .await?;
        info!(id = %listing.id, name = %listing.name, "Created API listing");
        Ok(listing)
    }

    pub async fn update(
        &self,
        id: &str,
        request: &UpdateApiRequest,
    ) -> Result<ApiListing, ClientError> {
        request.validate()?;
        self.client
            .patch(&resource_path(&["apis", id])?, request, RequestConfig::default())
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ClientError> {
        self.client
            .delete(&resource_path(&["apis", id])?, RequestConfig::default())
            .await?;
        info!(id, "Deleted API listing");
        Ok(())
    }

    /// Move a draft or rejected listing into the review queue
    pub async fn submit_for_review(&self, id: &str) -> Result<ApiListing, ClientError> {
        self.client
            .post(
                &resource_path(&["apis", id, "submit"])?,
                &json!({}),
                RequestConfig::default(),
            )
            .await
    }
}
