//! Config - Remote state configuration and its typed projections

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{ReconcileError, ReconcileResult};
use crate::provider::BackendSchema;

/// Flat backend configuration as declared by the user
pub type ConfigMap = serde_json::Map<String, Value>;

/// The `remote_state` block of the surrounding tool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteState {
    /// Backend type (e.g., "azurerm", "s3")
    pub backend: String,
    /// Skip all initialization checks for this backend
    #[serde(default)]
    pub disable_init: bool,
    /// Backend configuration, including provisioning-only keys
    #[serde(default)]
    pub config: ConfigMap,
}

impl RemoteState {
    pub fn new(backend: impl Into<String>, config: ConfigMap) -> Self {
        Self {
            backend: backend.into(),
            disable_init: false,
            config,
        }
    }
}

/// Backend declaration recorded by a previous initialization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendRecord {
    /// Backend type tag
    #[serde(rename = "type")]
    pub backend_type: String,
    /// Configuration the backend was initialized with
    #[serde(default)]
    pub config: ConfigMap,
}

impl BackendRecord {
    pub fn new(backend_type: impl Into<String>, config: ConfigMap) -> Self {
        Self {
            backend_type: backend_type.into(),
            config,
        }
    }
}

/// Native backend fields and provisioning-only fields, held side by side
#[derive(Debug)]
pub struct ProvisioningConfig<S: BackendSchema> {
    pub backend: S::Backend,
    pub provisioning: S::Provisioning,
}

impl<S: BackendSchema> ProvisioningConfig<S> {
    /// Name of the storage resource
    pub fn resource_name(&self) -> &str {
        S::resource_name(&self.backend)
    }
}

/// Decode only the native backend fields
pub fn decode_backend<S: BackendSchema>(config: &ConfigMap) -> ReconcileResult<S::Backend> {
    decode(S::BACKEND_TYPE, config)
}

/// Decode the configuration into native and provisioning-only fields
pub fn normalize<S: BackendSchema>(config: &ConfigMap) -> ReconcileResult<ProvisioningConfig<S>> {
    Ok(ProvisioningConfig {
        backend: decode(S::BACKEND_TYPE, config)?,
        provisioning: decode(S::BACKEND_TYPE, config)?,
    })
}

fn decode<T: serde::de::DeserializeOwned>(
    backend: &'static str,
    config: &ConfigMap,
) -> ReconcileResult<T> {
    serde_json::from_value(Value::Object(config.clone()))
        .map_err(|source| ReconcileError::Decode { backend, source })
}

/// Copy of `config` without the given provisioning-only keys
pub fn filter_provider_only_keys(config: &ConfigMap, keys: &[&str]) -> ConfigMap {
    config
        .iter()
        .filter(|(key, _)| !keys.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Parse a boolean the way Terraform configuration strings spell it
///
/// Accepts `1`, `t`, `T`, `TRUE`, `true`, `True` and their false counterparts.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Deserialize a boolean written either natively or as a string
///
/// `null` decodes as `false`. Use with `#[serde(deserialize_with = ...)]`.
pub fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Bool(bool),
        Text(String),
    }

    match Option::<Repr>::deserialize(deserializer)? {
        None => Ok(false),
        Some(Repr::Bool(b)) => Ok(b),
        Some(Repr::Text(s)) => parse_bool(&s).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid boolean value {:?}", s))
        }),
    }
}
