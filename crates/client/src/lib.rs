//! Client for the apimart API marketplace backend
//!
//! [`ApiClient`] executes requests against `/api/v1`, attaching the stored
//! access token and transparently refreshing it on 401. At most one refresh
//! runs at a time; requests that fail meanwhile wait for its outcome and are
//! replayed once. [`SessionCache`] keeps the signed-in user for a few minutes
//! and shares one `/users/me` request between concurrent callers.

pub mod client;
pub mod error;
pub mod events;
pub mod pagination;
mod refresh;
pub mod services;
pub mod session;
pub mod token_store;

pub use client::{ApiClient, ApiClientBuilder, RequestConfig, is_auth_endpoint};
pub use error::{ApiFailure, ClientError};
pub use events::{AuthEvent, AuthEvents};
pub use pagination::paginate;
pub use services::{AdminService, ApiService, AuthService, EndpointService, UserService};
pub use session::{SessionCache, UserCacheEntry};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore, TokenWatch};

pub use tokio_util::sync::CancellationToken;
