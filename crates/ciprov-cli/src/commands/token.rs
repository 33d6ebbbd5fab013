//! Workspace token verification command.

use anyhow::{Context, Result};
use ciprov_core::Secret;
use ciprov_remote::{TokenState, TokenValidator};

use super::prompt_secret;
use crate::output;

pub async fn run(host: &str, token: Option<String>) -> Result<bool> {
    let token = match token {
        Some(token) => Secret::new(token),
        None => prompt_secret("Databricks token:")?,
    };

    output::print_header("Databricks Token Check", &[("Host", host)]);

    let validator = TokenValidator::for_host(host, token)
        .with_context(|| format!("Invalid workspace host: {}", host))?;

    match validator.validate().await {
        TokenState::Valid(identity) => {
            output::print_success("Token is valid!");
            println!("  User: {}", identity.user_name);
            println!("  Display Name: {}", identity.display_name);
            Ok(true)
        }
        TokenState::Invalid => {
            output::print_error("Token is invalid or expired (HTTP 401)");
            output::print_list(
                "To generate a new token:",
                &[
                    format!("Go to {}", host),
                    "Click your username → User Settings".to_string(),
                    "Open Developer → Access tokens".to_string(),
                    "Click 'Generate new token' and copy it".to_string(),
                ],
            );
            Ok(false)
        }
        TokenState::Indeterminate {
            status: Some(status),
            message,
        } => {
            output::print_error(&format!("Unexpected response (HTTP {})", status));
            println!("  Response: {}", message);
            Ok(false)
        }
        TokenState::Indeterminate {
            status: None,
            message,
        } => {
            output::print_error(&format!("Connection error: {}", message));
            Ok(false)
        }
    }
}
