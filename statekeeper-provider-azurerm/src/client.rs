//! Azure Resource Manager client for storage accounts

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use statekeeper_core::{
    ConfigureResource, CreateResource, ProbeExistence, ProviderError, ProviderResult,
    ProvisioningConfig,
};

use crate::auth::{Authorizer, authorizer_from_environment};
use crate::cloud::CloudEnvironment;
use crate::config::{AzureRm, AzureRmBackend, AzureRmProvisioning};

/// Storage resource provider API version
pub const API_VERSION: &str = "2023-01-01";

const USER_AGENT: &str = concat!("statekeeper/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NameAvailability {
    name_available: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArmErrorBody {
    error: ArmError,
}

#[derive(Debug, Deserialize)]
struct ArmError {
    code: String,
    message: String,
}

/// Authenticated client for one subscription
pub struct AzureRmClient {
    http: reqwest::Client,
    authorizer: Box<dyn Authorizer>,
    cloud: CloudEnvironment,
    subscription_id: String,
}

impl AzureRmClient {
    /// Create a client using credentials from the environment
    pub fn from_backend(backend: &AzureRmBackend) -> ProviderResult<Self> {
        let cloud = CloudEnvironment::from_name(&backend.environment)?
            .with_resource_manager(&backend.endpoint);
        let authorizer = authorizer_from_environment(backend, &cloud)?;
        Self::with_authorizer(backend, cloud, authorizer)
    }

    /// Create a client with an explicit authorizer
    pub fn with_authorizer(
        backend: &AzureRmBackend,
        cloud: CloudEnvironment,
        authorizer: Box<dyn Authorizer>,
    ) -> ProviderResult<Self> {
        let subscription_id = if backend.subscription_id.is_empty() {
            std::env::var("ARM_SUBSCRIPTION_ID").unwrap_or_default()
        } else {
            backend.subscription_id.clone()
        };

        if subscription_id.is_empty() {
            return Err(ProviderError::new(
                "subscription_id is required (or set ARM_SUBSCRIPTION_ID)",
            ));
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::new("Failed to build HTTP client").with_cause(e))?;

        Ok(Self {
            http,
            authorizer,
            cloud,
            subscription_id,
        })
    }

    fn subscription_url(&self) -> String {
        format!(
            "{}/subscriptions/{}",
            self.cloud.resource_manager, self.subscription_id
        )
    }

    fn account_url(&self, backend: &AzureRmBackend) -> ProviderResult<String> {
        if backend.resource_group_name.is_empty() {
            return Err(ProviderError::new("resource_group_name is required")
                .for_resource(&backend.storage_account_name));
        }

        Ok(format!(
            "{}/resourceGroups/{}/providers/Microsoft.Storage/storageAccounts/{}",
            self.subscription_url(),
            backend.resource_group_name,
            backend.storage_account_name
        ))
    }

    fn blob_service_url(&self, backend: &AzureRmBackend) -> ProviderResult<String> {
        Ok(format!("{}/blobServices/default", self.account_url(backend)?))
    }

    /// Send a management request and return the JSON body, if any
    async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> ProviderResult<Value> {
        let token = self
            .authorizer
            .bearer_token(&self.cloud.token_scope())
            .await?;

        let mut request = self
            .http
            .request(method.clone(), url)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            ProviderError::new(format!("{} {} failed", method, url)).with_cause(e)
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::new("Failed to read response body").with_cause(e))?;

        if !status.is_success() {
            return Err(arm_error(status, &text));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ProviderError::new("Invalid JSON in response").with_cause(e))
    }
}

/// Convert an error response into a provider error
fn arm_error(status: StatusCode, body: &str) -> ProviderError {
    match serde_json::from_str::<ArmErrorBody>(body) {
        Ok(parsed) => ProviderError::new(format!(
            "{} {}: {}",
            status, parsed.error.code, parsed.error.message
        )),
        Err(_) => ProviderError::new(format!("{}: {}", status, body)),
    }
}

/// Request body for creating a storage account
pub fn create_account_body(provisioning: &AzureRmProvisioning) -> Value {
    json!({
        "location": provisioning.location,
        "sku": {"name": provisioning.sku},
        "kind": provisioning.kind,
        "tags": provisioning.tags,
        "properties": {
            "accessTier": provisioning.access_tier,
            "minimumTlsVersion": "TLS1_2",
            "supportsHttpsTrafficOnly": true,
            "allowBlobPublicAccess": false
        }
    })
}

/// Read `isVersioningEnabled` from a blob service properties response
fn versioning_from_properties(body: &Value) -> bool {
    body.pointer("/properties/isVersioningEnabled")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[async_trait]
impl ProbeExistence<AzureRm> for AzureRmClient {
    async fn is_name_available(&self, backend: &AzureRmBackend) -> ProviderResult<bool> {
        let url = format!(
            "{}/providers/Microsoft.Storage/checkNameAvailability",
            self.subscription_url()
        );
        let body = json!({
            "name": backend.storage_account_name,
            "type": "Microsoft.Storage/storageAccounts"
        });

        let response = self.send(Method::POST, &url, Some(&body)).await?;
        let result: NameAvailability = serde_json::from_value(response).map_err(|e| {
            ProviderError::new("Invalid name availability response")
                .for_resource(&backend.storage_account_name)
                .with_cause(e)
        })?;

        if !result.name_available {
            log::debug!(
                "Storage account name {} unavailable: {}",
                backend.storage_account_name,
                result.reason.as_deref().unwrap_or("unknown reason")
            );
        }

        Ok(result.name_available)
    }
}

#[async_trait]
impl CreateResource<AzureRm> for AzureRmClient {
    async fn create_resource(&self, config: &ProvisioningConfig<AzureRm>) -> ProviderResult<()> {
        let name = config.resource_name();
        if config.provisioning.location.is_empty() {
            return Err(
                ProviderError::new("location is required to create a storage account")
                    .for_resource(name),
            );
        }

        let url = self.account_url(&config.backend)?;
        let body = create_account_body(&config.provisioning);
        self.send(Method::PUT, &url, Some(&body))
            .await
            .map_err(|e| e.for_resource(name))?;

        log::info!(
            "Requested storage account {} in {}",
            name,
            config.provisioning.location
        );
        Ok(())
    }
}

#[async_trait]
impl ConfigureResource<AzureRm> for AzureRmClient {
    async fn versioning_enabled(&self, backend: &AzureRmBackend) -> ProviderResult<bool> {
        let url = self.blob_service_url(backend)?;
        let body = self
            .send(Method::GET, &url, None)
            .await
            .map_err(|e| e.for_resource(&backend.storage_account_name))?;
        Ok(versioning_from_properties(&body))
    }

    async fn enable_versioning(&self, backend: &AzureRmBackend) -> ProviderResult<()> {
        let url = self.blob_service_url(backend)?;
        let body = json!({"properties": {"isVersioningEnabled": true}});
        self.send(Method::PUT, &url, Some(&body))
            .await
            .map_err(|e| e.for_resource(&backend.storage_account_name))?;
        Ok(())
    }

    async fn apply_tags(
        &self,
        backend: &AzureRmBackend,
        tags: &BTreeMap<String, String>,
    ) -> ProviderResult<()> {
        let url = self.account_url(backend)?;
        let body = json!({ "tags": tags });
        self.send(Method::PATCH, &url, Some(&body))
            .await
            .map_err(|e| e.for_resource(&backend.storage_account_name))?;
        Ok(())
    }
}
