//! Request decorators for operators that require an API key.

mod api_key;
mod url_param;

pub use api_key::ApiKey;
pub use url_param::UrlParam;

use super::{BasicClient, HttpClient};
use crate::config::AuthConfig;

/// Builds the HTTP client stack for the configured credentials.
pub fn client_for(auth: Option<&AuthConfig>) -> anyhow::Result<Box<dyn HttpClient>> {
    let base = BasicClient::new();
    Ok(match auth {
        None => Box::new(base),
        Some(AuthConfig::Header { name, key }) => Box::new(ApiKey::new(base, name, key)?),
        Some(AuthConfig::Query { param, key }) => Box::new(UrlParam::new(base, param, key)),
    })
}
