//! Workspace token validation against the identity ("who am I") endpoint.

use ciprov_core::{RemoteEndpoint, Secret, excerpt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api;
use crate::transport::{HttpTransport, READ_TIMEOUT, Request, Transport, TransportError};

const UNKNOWN: &str = "Unknown";
const BODY_EXCERPT: usize = 200;

/// Who the token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_name: String,
    pub display_name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Valid(Identity),
    /// The identity endpoint answered 401.
    Invalid,
    /// Any other status, or no response at all.
    Indeterminate {
        status: Option<u16>,
        message: String,
    },
}

#[derive(Debug, Default, Deserialize)]
struct MeResponse {
    #[serde(rename = "userName")]
    user_name: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    id: Option<String>,
}

pub struct TokenValidator {
    transport: Arc<dyn Transport>,
}

impl TokenValidator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Validator for `host` authenticating with `token` as a bearer credential.
    pub fn for_host(host: &str, token: Secret) -> Result<Self, TransportError> {
        let endpoint = RemoteEndpoint::bearer(host, token)
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self::new(Arc::new(HttpTransport::new(endpoint)?)))
    }

    pub async fn validate(&self) -> TokenState {
        let response = match self
            .transport
            .send(Request::get(api::IDENTITY, READ_TIMEOUT).following_redirects())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Identity endpoint unreachable");
                return TokenState::Indeterminate {
                    status: None,
                    message: e.to_string(),
                };
            }
        };

        match response.status {
            200 => {
                let me: MeResponse = serde_json::from_str(&response.body).unwrap_or_else(|e| {
                    warn!(error = %e, "Identity response is not valid JSON");
                    MeResponse::default()
                });
                let identity = Identity {
                    user_name: me.user_name.unwrap_or_else(|| UNKNOWN.to_string()),
                    display_name: me.display_name.unwrap_or_else(|| UNKNOWN.to_string()),
                    id: me.id.unwrap_or_else(|| UNKNOWN.to_string()),
                };
                info!(user = %identity.user_name, "Token is valid");
                TokenState::Valid(identity)
            }
            401 => {
                warn!("Token rejected by identity endpoint");
                TokenState::Invalid
            }
            status => TokenState::Indeterminate {
                status: Some(status),
                message: excerpt(&response.body, BODY_EXCERPT),
            },
        }
    }
}
