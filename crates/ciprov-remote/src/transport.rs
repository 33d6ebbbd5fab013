//! Authenticated HTTP transport.
//!
//! A completed exchange with any status code is a [`Response`]; only failures to complete
//! the exchange (DNS, refused connection, timeout) are a [`TransportError`]. Callers branch
//! on status codes themselves.

use async_trait::async_trait;
use ciprov_core::{Auth, RemoteEndpoint};
use std::time::Duration;
use tracing::debug;

/// Timeout for read-only calls (probes, existence checks).
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for mutating calls; plugin installs and job creation can be slow to acknowledge.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request relative to the transport's endpoint.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Path plus optional query string, e.g. `/createItem?name=etl`.
    pub path: String,
    pub body: Option<String>,
    pub content_type: Option<&'static str>,
    pub timeout: Duration,
    /// Follow `3xx` responses to their final page instead of returning them.
    pub follow_redirects: bool,
}

impl Request {
    pub fn get(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            content_type: None,
            timeout,
            follow_redirects: false,
        }
    }

    pub fn post_xml(path: impl Into<String>, body: String, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            content_type: Some("application/xml"),
            timeout,
            follow_redirects: false,
        }
    }

    pub fn following_redirects(mut self) -> Self {
        self.follow_redirects = true;
        self
    }
}

/// Status code and body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// The exchange did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// Sends requests to one remote endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, TransportError>;
}

/// reqwest-backed transport.
///
/// By default redirects are not followed so that a `302` after a create call is visible to
/// the caller. Requests marked [`Request::following_redirects`] go through a second client
/// that follows them.
pub struct HttpTransport {
    client: reqwest::Client,
    redirecting_client: reqwest::Client,
    endpoint: RemoteEndpoint,
}

const USER_AGENT: &str = concat!("ciprov/", env!("CARGO_PKG_VERSION"));

impl HttpTransport {
    pub fn new(endpoint: RemoteEndpoint) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(USER_AGENT)
            .build()?;
        let redirecting_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            redirecting_client,
            endpoint,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let url = self.endpoint.url_for(&request.path);
        debug!(
            method = ?request.method,
            %url,
            follow_redirects = request.follow_redirects,
            "Sending request"
        );

        let client = if request.follow_redirects {
            &self.redirecting_client
        } else {
            &self.client
        };
        let mut builder = match request.method {
            Method::Get => client.get(&url),
            Method::Post => client.post(&url),
        };

        builder = match self.endpoint.auth() {
            Auth::Basic { username, secret } => builder.basic_auth(username, Some(secret.expose())),
            Auth::Bearer(token) => builder.bearer_auth(token.expose()),
        };

        if let Some(content_type) = request.content_type {
            builder = builder.header("Content-Type", content_type);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.timeout(request.timeout).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        debug!(%url, status, "Received response");
        Ok(Response { status, body })
    }
}
