//! Authenticated HTTP client for the apimart backend

use crate::error::{ApiFailure, ClientError};
use crate::events::{AuthEvent, AuthEvents};
use crate::refresh::RefreshCoordinator;
use crate::token_store::{FileTokenStore, MemoryTokenStore, TokenStore, TokenWatch};
use apimart_core::{
    ClientSettings, Envelope, Language, ListQuery, Page, Pagination, RefreshTokenRequest,
    TokenResponse, TokenSet,
};
use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const API_PREFIX: &str = "/api/v1";
pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Login, refresh and logout never go through token refresh
pub fn is_auth_endpoint(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path).trim_end_matches('/');
    [LOGIN_PATH, REFRESH_PATH, LOGOUT_PATH]
        .iter()
        .any(|auth_path| path.ends_with(auth_path))
}

/// Per-request options
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    /// Aborts the request when cancelled
    pub cancel: Option<CancellationToken>,
    /// Whether a 401 may trigger a token refresh and one replay
    pub retry: bool,
    /// Overrides the client-wide timeout
    pub timeout: Option<Duration>,
    bearer: Option<String>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            headers: HeaderMap::new(),
            query: Vec::new(),
            cancel: None,
            retry: true,
            timeout: None,
            bearer: None,
        }
    }
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn list_query(mut self, query: &ListQuery) -> Self {
        self.query.extend(
            query
                .to_pairs()
                .into_iter()
                .map(|(key, value)| (key.to_string(), value)),
        );
        self
    }

    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Surface a 401 as-is instead of refreshing
    pub fn no_retry(mut self) -> Self {
        self.retry = false;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Send this credential instead of the stored access token. Requests
    /// with an explicit bearer never trigger a refresh.
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

struct Inner {
    http: Client,
    base_url: String,
    timeout: Duration,
    tokens: Arc<dyn TokenStore>,
    events: AuthEvents,
    refresh: RefreshCoordinator,
    language: Option<Language>,
    _watch: Option<TokenWatch>,
}

/// Apimart API client
///
/// Cheap to clone; clones share the token store, event bus and refresh state.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    /// Create a new client with an in-memory token store
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Builder preconfigured from settings, with tokens kept in the state directory
    pub fn from_settings(settings: &ClientSettings) -> ApiClientBuilder {
        Self::builder()
            .base_url(settings.api_base_url.clone())
            .timeout(settings.timeout())
            .user_agent(settings.user_agent.clone())
            .token_store(Arc::new(FileTokenStore::new(settings.token_file())))
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.inner.tokens
    }

    pub fn events(&self) -> &AuthEvents {
        &self.inner.events
    }

    /// Whether a refresh-token exchange is currently running
    pub fn is_refreshing(&self) -> bool {
        self.inner.refresh.is_refreshing()
    }

    pub(crate) fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.inner.refresh
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.inner.base_url, API_PREFIX, path)
    }

    /// Perform a request and return the parsed envelope.
    ///
    /// A 401 on a non-auth endpoint is handed to the refresh coordinator and
    /// the request is replayed once with the new access token. The timeout and
    /// cancel token cover the whole call, including the wait for the refresh.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
        config: RequestConfig,
    ) -> Result<Envelope<T>, ClientError> {
        let deadline = tokio::time::Instant::now() + config.timeout.unwrap_or(self.inner.timeout);
        let (authorization, generation) = match &config.bearer {
            Some(token) => (Some(format!("Bearer {token}")), None),
            None => {
                let generation = self.inner.refresh.generation();
                let stored = self.inner.tokens.load().await?;
                (stored.map(|t| t.authorization()), Some(generation))
            }
        };

        let result = self
            .send(&method, path, body.as_ref(), &config, authorization.as_deref())
            .await;

        match (result, generation) {
            (Err(err), Some(generation))
                if err.is_unauthorized() && config.retry && !is_auth_endpoint(path) =>
            {
                debug!(%method, path, "Access token rejected, waiting for refresh");
                let cancel = config.cancel.clone().unwrap_or_default();
                let tokens = tokio::select! {
                    outcome = self.inner.refresh.recover(self, generation) => outcome?,
                    () = tokio::time::sleep_until(deadline) => return Err(ClientError::Timeout),
                    () = cancel.cancelled() => return Err(ClientError::Cancelled),
                };
                // The replay only gets what is left of the original timeout
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                let replay = config.no_retry().timeout(remaining);
                match self
                    .send(&method, path, body.as_ref(), &replay, Some(&tokens.authorization()))
                    .await
                {
                    Err(err) if err.is_unauthorized() => {
                        warn!(%method, path, "Refreshed token rejected, clearing session");
                        if let Err(e) = self.clear_session().await {
                            warn!(error = %e, "Failed to clear tokens");
                        }
                        Err(ClientError::SessionExpired(format!(
                            "{path} rejected the refreshed token"
                        )))
                    }
                    other => other,
                }
            }
            (result, _) => result,
        }
    }

    /// GET returning the envelope's data
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        config: RequestConfig,
    ) -> Result<T, ClientError> {
        let envelope = self.request(Method::GET, path, None, config).await?;
        required(envelope, path)
    }

    /// GET one page of a paginated collection
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &ListQuery,
        config: RequestConfig,
    ) -> Result<Page<T>, ClientError> {
        let envelope: Envelope<Vec<T>> = self
            .request(Method::GET, path, None, config.list_query(query))
            .await?;
        let items = envelope.data.unwrap_or_default();
        let pagination = envelope
            .pagination
            .unwrap_or_else(|| Pagination::single_page(items.len()));
        Ok(Page { items, pagination })
    }

    pub async fn post<B, T>(&self, path: &str, body: &B, config: RequestConfig) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let envelope = self.request(Method::POST, path, Some(body), config).await?;
        required(envelope, path)
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B, config: RequestConfig) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let envelope = self.request(Method::PATCH, path, Some(body), config).await?;
        required(envelope, path)
    }

    /// DELETE; any data in the response is ignored
    pub async fn delete(&self, path: &str, config: RequestConfig) -> Result<(), ClientError> {
        self.request::<JsonValue>(Method::DELETE, path, None, config)
            .await
            .map(|_| ())
    }

    /// Fetch raw bytes from an absolute URL without credentials
    pub async fn download(&self, url: &str) -> Result<Bytes, ClientError> {
        let request = self.inner.http.get(url);
        let (status, bytes) = self.exchange(request, &RequestConfig::default()).await?;
        if status.is_success() {
            Ok(bytes)
        } else {
            Err(ClientError::from_status(status, failure_from_body(status, &bytes)))
        }
    }

    /// Exchange the stored refresh token now, joining any exchange in flight
    pub async fn refresh_tokens(&self) -> Result<TokenSet, ClientError> {
        self.inner.refresh.refresh_now(self).await
    }

    /// Store tokens and notify subscribers
    pub async fn store_tokens(&self, tokens: &TokenSet) -> Result<(), ClientError> {
        self.inner.tokens.save(tokens).await?;
        self.inner.events.publish(AuthEvent::TokensUpdated);
        Ok(())
    }

    /// Drop stored tokens and notify subscribers
    pub async fn clear_session(&self) -> Result<(), ClientError> {
        let result = self.inner.tokens.clear().await;
        self.inner.events.publish(AuthEvent::TokensCleared);
        result
    }

    /// One refresh-token exchange; callers go through the coordinator
    pub(crate) async fn exchange_refresh_token(&self) -> Result<TokenSet, ClientError> {
        let current = self
            .inner
            .tokens
            .load()
            .await?
            .filter(|tokens| !tokens.refresh_token.is_empty())
            .ok_or_else(|| ClientError::SessionExpired("no refresh token available".into()))?;

        let body = serde_json::to_value(RefreshTokenRequest {
            refresh_token: current.refresh_token.clone(),
        })?;
        let envelope: Envelope<TokenResponse> = self
            .send(
                &Method::POST,
                REFRESH_PATH,
                Some(&body),
                &RequestConfig::default().no_retry(),
                None,
            )
            .await?;

        let tokens = current.apply(required(envelope, REFRESH_PATH)?);
        self.store_tokens(&tokens).await?;
        Ok(tokens)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &Method,
        path: &str,
        body: Option<&JsonValue>,
        config: &RequestConfig,
        authorization: Option<&str>,
    ) -> Result<Envelope<T>, ClientError> {
        let mut request = self
            .inner
            .http
            .request(method.clone(), self.url(path))
            .headers(config.headers.clone());

        if !config.query.is_empty() {
            request = request.query(&config.query);
        }
        if let Some(authorization) = authorization {
            request = request.header(header::AUTHORIZATION, authorization);
        }
        if let Some(language) = self.inner.language {
            request = request.header(header::ACCEPT_LANGUAGE, language.accept_language());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let started = Instant::now();
        let result = self.exchange(request, config).await;
        match &result {
            Ok((status, _)) => debug!(
                %method,
                path,
                status = status.as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "API request completed"
            ),
            Err(err) => debug!(%method, path, error = %err, "API request failed"),
        }

        let (status, bytes) = result?;
        decode_envelope(status, &bytes)
    }

    /// Run the round trip racing the timeout and the caller's cancel token
    async fn exchange(
        &self,
        request: RequestBuilder,
        config: &RequestConfig,
    ) -> Result<(StatusCode, Bytes), ClientError> {
        let timeout = config.timeout.unwrap_or(self.inner.timeout);
        let cancel = config.cancel.clone().unwrap_or_default();

        let round_trip = async {
            let response = request.send().await?;
            let status = response.status();
            let bytes = response.bytes().await?;
            Ok::<_, ClientError>((status, bytes))
        };

        tokio::select! {
            result = round_trip => result,
            () = tokio::time::sleep(timeout) => Err(ClientError::Timeout),
            () = cancel.cancelled() => Err(ClientError::Cancelled),
        }
    }
}

fn required<T>(envelope: Envelope<T>, path: &str) -> Result<T, ClientError> {
    envelope
        .data
        .ok_or_else(|| ClientError::UnexpectedResponse(format!("{path} returned no data")))
}

fn reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string())
}

/// Parse a response body into an envelope, turning failures into errors
fn decode_envelope<T: DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
) -> Result<Envelope<T>, ClientError> {
    if !status.is_success() {
        return Err(ClientError::from_status(status, failure_from_body(status, body)));
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Envelope {
            success: true,
            code: None,
            message: None,
            data: None,
            pagination: None,
            details: None,
        });
    }

    let raw: Envelope<JsonValue> = serde_json::from_slice(body)?;
    if !raw.success {
        return Err(ClientError::Rejected(ApiFailure {
            code: raw.code,
            message: raw
                .message
                .unwrap_or_else(|| "request was not successful".to_string()),
            details: raw.details,
        }));
    }

    let data = raw
        .data
        .filter(|value| !value.is_null())
        .map(serde_json::from_value)
        .transpose()?;

    Ok(Envelope {
        success: true,
        code: raw.code,
        message: raw.message,
        data,
        pagination: raw.pagination,
        details: raw.details,
    })
}

/// Build `{code, message, details}` from an error body
fn failure_from_body(status: StatusCode, body: &[u8]) -> ApiFailure {
    match serde_json::from_slice::<Envelope<JsonValue>>(body) {
        Ok(envelope) => ApiFailure {
            code: envelope.code,
            message: envelope
                .message
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| reason(status)),
            details: envelope.details.or(envelope.data),
        },
        Err(_) => {
            let text = String::from_utf8_lossy(body).trim().to_string();
            ApiFailure::new(if text.is_empty() { reason(status) } else { text })
        }
    }
}

/// Builder for ApiClient
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    tokens: Option<Arc<dyn TokenStore>>,
    events: Option<AuthEvents>,
    language: Option<Language>,
}

impl ApiClientBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.tokens = Some(store);
        self
    }

    /// Share an event bus with other components
    pub fn events(mut self, events: AuthEvents) -> Self {
        self.events = Some(events);
        self
    }

    /// Send `Accept-Language` for this language
    pub fn language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;

        url::Url::parse(&base_url)
            .map_err(|e| ClientError::Configuration(format!("invalid base_url '{base_url}': {e}")))?;

        // Ensure base_url ends without a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut client_builder = ClientBuilder::new();
        client_builder = match self.user_agent {
            Some(user_agent) => client_builder.user_agent(user_agent),
            None => client_builder.user_agent(concat!("apimart-client/", env!("CARGO_PKG_VERSION"))),
        };
        let http = client_builder.build()?;

        let tokens = self
            .tokens
            .unwrap_or_else(|| Arc::new(MemoryTokenStore::new()));
        let events = self.events.unwrap_or_default();
        let watch = tokens.watch(&events).unwrap_or_else(|e| {
            warn!(error = %e, "Logouts from other processes will go unnoticed");
            None
        });

        Ok(ApiClient {
            inner: Arc::new(Inner {
                http,
                base_url,
                timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
                tokens,
                events,
                refresh: RefreshCoordinator::default(),
                language: self.language,
                _watch: watch,
            }),
        })
    }
}
