use crate::client::{ApiClient, RequestConfig};
use crate::error::ClientError;
use crate::services::resource_path;
use apimart_core::{ApiListing, ApiStatus, ListQuery, Page, ReviewDecision, Validate};
use tracing::info;

/// Review queue for administrators.
///
/// Non-admin callers get [`ClientError::Forbidden`].
#[derive(Clone)]
pub struct AdminService {
    client: ApiClient,
}

impl AdminService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Listings waiting for review
    pub async fn list_pending(&self, query: &ListQuery) -> Result<Page<ApiListing>, ClientError> {
        let query = query.clone().status(ApiStatus::Pending);
        self.client
            .get_page("/apis", &query, RequestConfig::default())
            .await
    }

    pub async fn approve(&self, id: &str) -> Result<ApiListing, ClientError> {
        self.review(id, &ReviewDecision::approve()).await
    }

    pub async fn reject(&self, id: &str, reason: &str) -> Result<ApiListing, ClientError> {
        self.review(id, &ReviewDecision::reject(reason.trim())).await
    }

    async fn review(&self, id: &str, decision: &ReviewDecision) -> Result<ApiListing, ClientError> {
        decision.validate()?;
        let path = resource_path(&["apis", id, "status"])?;
        let listing: ApiListing = self
            .client
            .patch(&path, decision, RequestConfig::default())
            .await?;
        info!(id, status = %decision.status, "Reviewed API listing");
        Ok(listing)
    }
}
