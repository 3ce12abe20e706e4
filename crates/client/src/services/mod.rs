//! Typed wrappers over the marketplace endpoints
//!
//! Every service is a thin, cloneable view of an [`ApiClient`], so all calls
//! share its token store and token refresh.

mod admin;
mod apis;
mod auth;
mod endpoints;
mod users;

pub use admin::AdminService;
pub use apis::ApiService;
pub use auth::AuthService;
pub use endpoints::EndpointService;
pub use users::UserService;

use crate::client::ApiClient;
use crate::error::ClientError;
use apimart_core::ValidationErrors;
use url::Url;

/// Build `/a/b/c` from path segments, percent-encoding each one so an id
/// cannot add segments, a query or a fragment.
pub(crate) fn resource_path(segments: &[&str]) -> Result<String, ClientError> {
    let mut errors = ValidationErrors::new();
    for segment in segments {
        if matches!(segment.trim(), "" | "." | "..") {
            errors.add("id", format!("'{segment}' is not a valid path segment"));
        }
    }
    errors.into_result()?;

    let mut url = Url::parse("http://apimart.invalid/")
        .map_err(|e| ClientError::Configuration(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| ClientError::Configuration("URL cannot hold a path".into()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.path().to_string())
}

impl ApiClient {
    pub fn auth(&self) -> AuthService {
        AuthService::new(self.clone())
    }

    pub fn apis(&self) -> ApiService {
        ApiService::new(self.clone())
    }

    pub fn endpoints(&self) -> EndpointService {
        EndpointService::new(self.clone())
    }

    pub fn users(&self) -> UserService {
        UserService::new(self.clone())
    }

    pub fn admin(&self) -> AdminService {
        AdminService::new(self.clone())
    }
}
