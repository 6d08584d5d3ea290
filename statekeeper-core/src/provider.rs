//! Provider - Capability traits for storage backends
//!
//! A provider supplies the typed configuration for one kind of remote state
//! backend (`BackendSchema`) and the three remote capabilities the engine
//! drives: probing existence, creating the storage resource, and configuring
//! it after creation.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::config::ProvisioningConfig;

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub resource: Option<String>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref resource) = self.resource {
            write!(f, "[{}] {}", resource, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource: None,
            cause: None,
        }
    }

    pub fn for_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Provisioning-only settings every provider exposes to the engine
pub trait ProvisioningOptions {
    /// Do not create the resource even if it is missing
    fn skip_create(&self) -> bool;

    /// Do not inspect or change versioning
    fn skip_versioning(&self) -> bool;

    /// Tags (labels) to apply to the resource
    fn tags(&self) -> &BTreeMap<String, String>;
}

/// Typed configuration of one remote state backend
///
/// Both associated types are decoded from the same flat configuration map
/// with serde. Unknown keys must be accepted, so neither type may use
/// `deny_unknown_fields`.
pub trait BackendSchema: Send + Sync + 'static {
    /// Backend type tag as recorded by the state-storage tool (e.g., "azurerm")
    const BACKEND_TYPE: &'static str;

    /// Keys consumed only by this engine, never forwarded to the backend
    const PROVIDER_ONLY_KEYS: &'static [&'static str];

    /// Configuration key of the resource identifier
    const REQUIRED_FIELD: &'static str;

    /// Fields the state-storage tool's native backend understands
    type Backend: DeserializeOwned + Debug + Send + Sync;

    /// Provisioning-only fields
    type Provisioning: DeserializeOwned + ProvisioningOptions + Debug + Send + Sync;

    /// Name of the storage resource (account, bucket, ...)
    fn resource_name(backend: &Self::Backend) -> &str;
}

/// Name-availability style existence query
#[async_trait]
pub trait ProbeExistence<S: BackendSchema>: Send + Sync {
    /// Returns true if the resource name is still available (nothing exists)
    async fn is_name_available(&self, backend: &S::Backend) -> ProviderResult<bool>;
}

/// Creation of the storage resource
#[async_trait]
pub trait CreateResource<S: BackendSchema>: Send + Sync {
    /// Issue the create call; visibility is awaited by the engine
    async fn create_resource(&self, config: &ProvisioningConfig<S>) -> ProviderResult<()>;
}

/// Post-create settings of the storage resource
#[async_trait]
pub trait ConfigureResource<S: BackendSchema>: Send + Sync {
    /// Whether versioning is currently enabled
    async fn versioning_enabled(&self, backend: &S::Backend) -> ProviderResult<bool>;

    /// Turn versioning on
    async fn enable_versioning(&self, backend: &S::Backend) -> ProviderResult<()>;

    /// Apply tags (labels) to the resource
    async fn apply_tags(
        &self,
        backend: &S::Backend,
        tags: &BTreeMap<String, String>,
    ) -> ProviderResult<()>;

    /// Bring access and encryption settings in line with the configuration
    ///
    /// Runs on every provisioning pass, after the resource is visible. Each
    /// setting must be read before it is changed. Returns true if anything
    /// was changed.
    async fn secure_resource(&self, _config: &ProvisioningConfig<S>) -> ProviderResult<bool> {
        Ok(false)
    }
}

/// A complete storage provider
pub trait StorageProvider<S: BackendSchema>:
    ProbeExistence<S> + CreateResource<S> + ConfigureResource<S>
{
}

impl<S, T> StorageProvider<S> for T
where
    S: BackendSchema,
    T: ProbeExistence<S> + CreateResource<S> + ConfigureResource<S>,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockProvider, MockSchema};

    #[test]
    fn provider_error_display_with_resource() {
        let error = ProviderError::new("not authorized").for_resource("acct1");
        assert_eq!(error.to_string(), "[acct1] not authorized");
    }

    #[test]
    fn provider_error_keeps_cause() {
        let io = std::io::Error::other("connection reset");
        let error = ProviderError::new("request failed").with_cause(io);
        let source = std::error::Error::source(&error).unwrap();
        assert_eq!(source.to_string(), "connection reset");
    }

    #[tokio::test]
    async fn mock_provider_reports_available_until_created() {
        let provider = MockProvider::absent();
        let backend = MockSchema::backend("acct1");
        assert!(provider.is_name_available(&backend).await.unwrap());

        let config = MockSchema::config("acct1");
        provider.create_resource(&config).await.unwrap();
        assert!(!provider.is_name_available(&backend).await.unwrap());
    }
}
