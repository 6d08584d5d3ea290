//! Typed configuration of the s3 backend

use std::collections::BTreeMap;

use serde::Deserialize;
use statekeeper_core::{BackendSchema, ProvisioningOptions};

/// Schema of the s3 remote state backend
#[derive(Debug)]
pub struct S3;

/// Settings only used to provision the state bucket
pub const S3_ONLY_KEYS: &[&str] = &[
    "s3_bucket_tags",
    "skip_bucket_versioning",
    "skip_bucket_creation",
    "skip_bucket_ssencryption",
    "skip_bucket_public_access_blocking",
];

impl BackendSchema for S3 {
    const BACKEND_TYPE: &'static str = "s3";
    const PROVIDER_ONLY_KEYS: &'static [&'static str] = S3_ONLY_KEYS;
    const REQUIRED_FIELD: &'static str = "bucket";

    type Backend = S3Backend;
    type Provisioning = S3Provisioning;

    fn resource_name(backend: &S3Backend) -> &str {
        &backend.bucket
    }
}

/// Configuration options understood by the s3 backend itself
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct S3Backend {
    pub bucket: String,
    pub key: String,
    pub region: String,
    pub encrypt: bool,
    pub profile: String,
    pub endpoint: String,
    pub dynamodb_table: String,
    pub force_path_style: bool,
}

/// Provisioning-only settings of the state bucket
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct S3Provisioning {
    pub s3_bucket_tags: BTreeMap<String, String>,
    pub skip_bucket_versioning: bool,
    pub skip_bucket_creation: bool,
    pub skip_bucket_ssencryption: bool,
    pub skip_bucket_public_access_blocking: bool,
}

impl ProvisioningOptions for S3Provisioning {
    fn skip_create(&self) -> bool {
        self.skip_bucket_creation
    }

    fn skip_versioning(&self) -> bool {
        self.skip_bucket_versioning
    }

    fn tags(&self) -> &BTreeMap<String, String> {
        &self.s3_bucket_tags
    }
}

/// Convert region value from DSL format to AWS format
/// e.g., "aws.Region.ap_northeast_1" -> "ap-northeast-1"
pub fn convert_region_value(value: &str) -> String {
    match value.strip_prefix("aws.Region.") {
        Some(region) => region.replace('_', "-"),
        None => value.to_string(),
    }
}
