//! Structures of Terraform's local state metadata file

use serde::{Deserialize, Serialize};
use statekeeper_core::{BackendRecord, ConfigMap};

/// Contents of `.terraform/terraform.tfstate`
///
/// Only the fields needed to recover the backend declaration are modelled;
/// everything else in the file is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerraformMetadata {
    /// Metadata file format version
    #[serde(default)]
    pub version: u32,
    /// Monotonically increasing number for each modification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<u64>,
    /// Unique identifier for this state lineage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage: Option<String>,
    /// Backend the working directory was initialized with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendBlock>,
}

/// The `backend` block of the metadata file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendBlock {
    /// Backend type (e.g., "azurerm", "s3")
    #[serde(rename = "type")]
    pub backend_type: String,
    /// Configuration the backend was initialized with
    #[serde(default)]
    pub config: Option<ConfigMap>,
    /// Hash Terraform computed over the configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<u64>,
}

impl TerraformMetadata {
    /// Newest metadata format version this reader understands
    pub const CURRENT_VERSION: u32 = 3;

    /// The recorded backend declaration, if any
    ///
    /// A block with an empty type is treated as no backend.
    pub fn backend_record(&self) -> Option<BackendRecord> {
        let block = self.backend.as_ref()?;
        if block.backend_type.is_empty() {
            return None;
        }

        Some(BackendRecord::new(
            block.backend_type.clone(),
            block.config.clone().unwrap_or_default(),
        ))
    }
}
