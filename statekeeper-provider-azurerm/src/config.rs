//! Typed configuration of the azurerm backend
//!
//! See: https://developer.hashicorp.com/terraform/language/settings/backends/azurerm

use std::collections::BTreeMap;

use serde::Deserialize;
use statekeeper_core::config::flexible_bool;
use statekeeper_core::{BackendSchema, ProvisioningOptions};

/// Schema of the azurerm remote state backend
#[derive(Debug)]
pub struct AzureRm;

/// Settings that appear in the remote state config but are only used to
/// provision the storage account, never forwarded to the backend
pub const AZURERM_ONLY_KEYS: &[&str] = &[
    "location",
    "tags",
    "sku",
    "kind",
    "access_tier",
    "skip_versioning",
    "skip_create",
    "skip_azure_rbac",
];

impl BackendSchema for AzureRm {
    const BACKEND_TYPE: &'static str = "azurerm";
    const PROVIDER_ONLY_KEYS: &'static [&'static str] = AZURERM_ONLY_KEYS;
    const REQUIRED_FIELD: &'static str = "storage_account_name";

    type Backend = AzureRmBackend;
    type Provisioning = AzureRmProvisioning;

    fn resource_name(backend: &AzureRmBackend) -> &str {
        &backend.storage_account_name
    }
}

/// Configuration options understood by the azurerm backend itself
///
/// Boolean options also accept string spellings such as `"true"` or `"1"`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AzureRmBackend {
    // Storage account, container and blob
    pub tenant_id: String,
    pub subscription_id: String,
    pub resource_group_name: String,
    pub storage_account_name: String,
    pub container_name: String,
    #[serde(deserialize_with = "flexible_bool")]
    pub snapshot: bool,
    pub key: String,

    // Authentication
    #[serde(deserialize_with = "flexible_bool")]
    pub use_msi: bool,
    pub msi_endpoint: String,
    #[serde(deserialize_with = "flexible_bool")]
    pub use_azuread_auth: bool,
    pub access_key: String,
    pub sas_token: String,
    pub client_id: String,
    pub client_secret: String,
    pub client_certificate_password: String,
    pub client_certificate_path: String,

    /// Set when using Azure Stack
    pub endpoint: String,
    /// Set when using a cloud other than "public"
    pub environment: String,
}

/// Provisioning-only settings of the storage account
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AzureRmProvisioning {
    pub location: String,
    pub tags: BTreeMap<String, String>,
    pub sku: String,
    pub kind: String,
    pub access_tier: String,
    pub skip_versioning: bool,
    pub skip_create: bool,
    /// Accepted for compatibility; role assignments are left to the operator
    pub skip_azure_rbac: bool,
}

impl AzureRmProvisioning {
    pub const DEFAULT_SKU: &'static str = "Standard_LRS";
    pub const DEFAULT_KIND: &'static str = "StorageV2";
    pub const DEFAULT_ACCESS_TIER: &'static str = "Hot";
}

impl Default for AzureRmProvisioning {
    fn default() -> Self {
        Self {
            location: String::new(),
            tags: BTreeMap::new(),
            sku: Self::DEFAULT_SKU.to_string(),
            kind: Self::DEFAULT_KIND.to_string(),
            access_tier: Self::DEFAULT_ACCESS_TIER.to_string(),
            skip_versioning: false,
            skip_create: false,
            skip_azure_rbac: false,
        }
    }
}

impl ProvisioningOptions for AzureRmProvisioning {
    fn skip_create(&self) -> bool {
        self.skip_create
    }

    fn skip_versioning(&self) -> bool {
        self.skip_versioning
    }

    fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }
}
