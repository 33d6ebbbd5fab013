//! Remote endpoint description.

use url::Url;

use crate::{Error, Result, Secret};

/// How requests to an endpoint are authenticated.
#[derive(Debug, Clone)]
pub enum Auth {
    /// HTTP Basic with a username and password/API token.
    Basic { username: String, secret: Secret },
    /// `Authorization: Bearer <token>`.
    Bearer(Secret),
}

/// A remote HTTP system: base URL plus credentials. Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    base_url: String,
    auth: Auth,
}

impl RemoteEndpoint {
    /// Create an endpoint, validating the URL and stripping trailing slashes.
    pub fn new(base_url: &str, auth: Auth) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed = Url::parse(trimmed)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidInput(format!(
                "unsupported URL scheme '{}' in {}",
                parsed.scheme(),
                trimmed
            )));
        }

        Ok(Self {
            base_url: trimmed.to_string(),
            auth,
        })
    }

    /// Orchestrator endpoint using HTTP Basic authentication.
    pub fn basic(base_url: &str, username: impl Into<String>, secret: Secret) -> Result<Self> {
        Self::new(
            base_url,
            Auth::Basic {
                username: username.into(),
                secret,
            },
        )
    }

    /// Identity-provider endpoint using bearer authentication.
    pub fn bearer(base_url: &str, token: Secret) -> Result<Self> {
        Self::new(base_url, Auth::Bearer(token))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    /// Join a path (which may carry a query string) onto the base URL.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}
