use crate::client::{ApiClient, RequestConfig};
use crate::error::ClientError;
use crate::session::ME_PATH;
use apimart_core::{UpdateProfileRequest, User, Validate};

#[derive(Clone)]
pub struct UserService {
    client: ApiClient,
}

impl UserService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// The signed-in user, always fetched; see `SessionCache` for a cached read
    pub async fn me(&self) -> Result<User, ClientError> {
        self.client.get(ME_PATH, RequestConfig::default()).await
    }

    pub async fn update_profile(&self, request: &UpdateProfileRequest) -> Result<User, ClientError> {
        request.validate()?;
        self.client
            .patch(ME_PATH, request, RequestConfig::default())
            .await
    }
}
