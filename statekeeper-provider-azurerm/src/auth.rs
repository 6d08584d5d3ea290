//! Credential acquisition for Azure Resource Manager

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use statekeeper_core::{ProviderError, ProviderResult};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::cloud::CloudEnvironment;
use crate::config::AzureRmBackend;

/// Supplies bearer tokens for management API calls
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Access token valid for the given OAuth2 scope
    async fn bearer_token(&self, scope: &str) -> ProviderResult<String>;
}

/// Pre-acquired token (e.g. from `az account get-access-token`)
pub struct StaticTokenAuthorizer {
    token: String,
}

impl StaticTokenAuthorizer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl Authorizer for StaticTokenAuthorizer {
    async fn bearer_token(&self, _scope: &str) -> ProviderResult<String> {
        Ok(self.token.clone())
    }
}

/// Refresh tokens this long before they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// OAuth2 client credentials flow against Microsoft Entra ID
pub struct ClientCredentialsAuthorizer {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<(String, Instant)>>,
}

impl ClientCredentialsAuthorizer {
    pub fn new(
        cloud: &CloudEnvironment,
        tenant_id: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: format!(
                "{}/{}/oauth2/v2.0/token",
                cloud.authority_host.trim_end_matches('/'),
                tenant_id
            ),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            cached: Mutex::new(None),
        }
    }

    async fn request_token(&self, scope: &str) -> ProviderResult<(String, Instant)> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", scope),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::new("Failed to request access token").with_cause(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::new(format!(
                "Token request failed with {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::new("Invalid token response").with_cause(e))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
        Ok((token.access_token, Instant::now() + lifetime))
    }
}

#[async_trait]
impl Authorizer for ClientCredentialsAuthorizer {
    async fn bearer_token(&self, scope: &str) -> ProviderResult<String> {
        let mut cached = self.cached.lock().await;
        if let Some((token, expires)) = cached.as_ref() {
            if Instant::now() < *expires {
                return Ok(token.clone());
            }
        }

        let (token, expires) = self.request_token(scope).await?;
        *cached = Some((token.clone(), expires));
        Ok(token)
    }
}

/// Environment variable holding a ready-made access token
pub const ACCESS_TOKEN_ENV: &str = "ARM_ACCESS_TOKEN";

/// Build an authorizer from the environment, falling back to backend config
///
/// `ARM_ACCESS_TOKEN` wins; otherwise client credentials are taken from
/// `ARM_TENANT_ID`, `ARM_CLIENT_ID` and `ARM_CLIENT_SECRET`, or the matching
/// backend settings.
pub fn authorizer_from_environment(
    backend: &AzureRmBackend,
    cloud: &CloudEnvironment,
) -> ProviderResult<Box<dyn Authorizer>> {
    if let Some(token) = env_non_empty(ACCESS_TOKEN_ENV) {
        return Ok(Box::new(StaticTokenAuthorizer::new(token)));
    }

    let tenant_id = env_or("ARM_TENANT_ID", &backend.tenant_id);
    let client_id = env_or("ARM_CLIENT_ID", &backend.client_id);
    let client_secret = env_or("ARM_CLIENT_SECRET", &backend.client_secret);

    match (tenant_id, client_id, client_secret) {
        (Some(tenant_id), Some(client_id), Some(client_secret)) => Ok(Box::new(
            ClientCredentialsAuthorizer::new(cloud, &tenant_id, client_id, client_secret),
        )),
        _ => Err(ProviderError::new(format!(
            "No Azure credentials found: set {} or ARM_TENANT_ID, ARM_CLIENT_ID and ARM_CLIENT_SECRET",
            ACCESS_TOKEN_ENV
        ))),
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_or(name: &str, fallback: &str) -> Option<String> {
    env_non_empty(name).or_else(|| (!fallback.is_empty()).then(|| fallback.to_string()))
}
