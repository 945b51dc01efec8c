//! Entry point of the SDK. A [`Session`] wraps an [`ApiClient`]; the
//! operations on users, toasters and custom domains are implemented on it in
//! their own modules.

use std::sync::Arc;

use tracing::{error, info};

use crate::apiclient::ApiClient;
use crate::config::ClientConfig;
use crate::contract::Transport;
use crate::error::ToastateError;

/// Prefix of the only token kind the API accepts from SDK clients.
pub const SESSION_TOKEN_PREFIX: &str = "sess_";

#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) client: ApiClient,
}

impl Session {
    /// Session against the public API with default settings.
    pub fn new() -> Result<Self, ToastateError> {
        Self::from_config(ClientConfig::default())
    }

    pub fn from_config(config: ClientConfig) -> Result<Self, ToastateError> {
        check_token(config.auth_token.as_deref())?;
        config.trace_loaded();
        Ok(Self {
            client: ApiClient::new(config)?,
        })
    }

    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ToastateError> {
        check_token(config.auth_token.as_deref())?;
        Ok(Self {
            client: ApiClient::with_transport(config, transport),
        })
    }

    /// Authenticate later calls with a session token (`sess_...`). API keys
    /// are rejected.
    pub fn set_auth(&mut self, token: &str) -> Result<&mut Self, ToastateError> {
        check_token(Some(token))?;
        self.client.set_auth_token(token);
        info!("Session token set");
        Ok(self)
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.auth_token().is_some()
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

fn check_token(token: Option<&str>) -> Result<(), ToastateError> {
    match token {
        Some(token) if !token.starts_with(SESSION_TOKEN_PREFIX) => {
            error!("Rejected authentication token without the sess_ prefix");
            Err(ToastateError::InvalidAuth)
        }
        _ => Ok(()),
    }
}

/// Reject empty identifiers before they turn into a malformed path.
pub(crate) fn require_id(value: &str, what: &str) -> Result<(), ToastateError> {
    if value.is_empty() {
        return Err(ToastateError::InvalidInput(format!(
            "you did not provide the {what}"
        )));
    }
    Ok(())
}
