use crate::client::{ApiClient, LOGIN_PATH, LOGOUT_PATH, RequestConfig};
use crate::error::ClientError;
use apimart_core::validation::validators::validate_not_empty;
use apimart_core::{TokenResponse, TokenSet, ValidationErrors};
use reqwest::Method;
use tracing::{info, warn};

/// Sign-in and sign-out
#[derive(Clone)]
pub struct AuthService {
    client: ApiClient,
}

impl AuthService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Exchange an identity-provider ID token for an apimart session
    pub async fn login(&self, id_token: &str) -> Result<TokenResponse, ClientError> {
        let mut errors = ValidationErrors::new();
        errors.check(validate_not_empty(id_token, "id_token"));
        errors.into_result()?;

        let envelope = self
            .client
            .request::<TokenResponse>(
                Method::POST,
                LOGIN_PATH,
                None,
                RequestConfig::default().bearer(id_token.trim()),
            )
            .await?;
        let response = envelope
            .data
            .ok_or_else(|| ClientError::UnexpectedResponse("login returned no tokens".into()))?;

        let tokens = response.clone().into_token_set();
        if tokens.refresh_token.is_empty() {
            warn!("Login response did not include a refresh token");
        }
        self.client.store_tokens(&tokens).await?;
        info!(
            user = response.user.as_ref().map(|u| u.email.as_str()),
            "Signed in"
        );
        Ok(response)
    }

    /// Tell the backend the session is over, then drop local tokens.
    ///
    /// Local tokens are cleared even when the backend call fails.
    pub async fn logout(&self) -> Result<(), ClientError> {
        if self.client.tokens().is_logged_in().await {
            let result = self
                .client
                .request::<serde_json::Value>(
                    Method::POST,
                    LOGOUT_PATH,
                    None,
                    RequestConfig::default().no_retry(),
                )
                .await;
            if let Err(e) = result {
                warn!(error = %e, "Backend logout failed, clearing local session anyway");
            }
        }

        self.client.clear_session().await?;
        info!("Signed out");
        Ok(())
    }

    /// Exchange the stored refresh token now
    pub async fn refresh(&self) -> Result<TokenSet, ClientError> {
        self.client.refresh_tokens().await
    }
}
