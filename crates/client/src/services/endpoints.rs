use crate::client::{ApiClient, RequestConfig};
use crate::error::ClientError;
use crate::services::resource_path;
use apimart_core::{
    CreateEndpointRequest, Endpoint, ListQuery, Page, UpdateEndpointRequest, Validate,
};

/// Endpoints belonging to one API listing
#[derive(Clone)]
pub struct EndpointService {
    client: ApiClient,
}

impl EndpointService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, api_id: &str, query: &ListQuery) -> Result<Page<Endpoint>, ClientError> {
        self.client
            .get_page(&resource_path(&["apis", api_id, "endpoints"])?, query, RequestConfig::default())
            .await
    }

    pub async fn get(&self, api_id: &str, id: &str) -> Result<Endpoint, ClientError> {
        self.client
            .get(&resource_path(&["apis", api_id, "endpoints", id])?, RequestConfig::default())
            .await
    }

    pub async fn create(
        &self,
        api_id: &str,
        request: &CreateEndpointRequest,
    ) -> Result<Endpoint, ClientError> {
        request.validate()?;
        self.client
            .post(&resource_path(&["apis", api_id, "endpoints"])?, request, RequestConfig::default())
            .await
    }

    pub async fn update(
        &self,
        api_id: &str,
        id: &str,
        request: &UpdateEndpointRequest,
    ) -> Result<Endpoint, ClientError> {
        request.validate()?;
        self.client
            .patch(
                &resource_path(&["apis", api_id, "endpoints", id])?,
                request,
                RequestConfig::default(),
            )
            .await
    }

    pub async fn delete(&self, api_id: &str, id: &str) -> Result<(), ClientError> {
        self.client
            .delete(&resource_path(&["apis", api_id, "endpoints", id])?, RequestConfig::default())
            .await
    }
}
