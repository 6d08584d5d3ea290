//! S3 provider for state buckets

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration,
    PublicAccessBlockConfiguration, ServerSideEncryption, ServerSideEncryptionByDefault,
    ServerSideEncryptionConfiguration, ServerSideEncryptionRule, Tag, Tagging,
    VersioningConfiguration,
};
use statekeeper_core::{
    ConfigureResource, CreateResource, ProbeExistence, ProviderError, ProviderResult,
    ProvisioningConfig,
};

use crate::config::{S3, S3Backend, convert_region_value};

/// Region that must not be sent as a location constraint
const DEFAULT_REGION: &str = "us-east-1";

const ENCRYPTION_NOT_FOUND: &str = "ServerSideEncryptionConfigurationNotFoundError";
const PUBLIC_ACCESS_BLOCK_NOT_FOUND: &str = "NoSuchPublicAccessBlockConfiguration";

/// S3-based storage provider
pub struct S3Provider {
    /// S3 client
    client: Client,
    /// AWS region
    region: String,
}

impl S3Provider {
    /// Create a new S3Provider from backend configuration
    pub async fn from_backend(backend: &S3Backend) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if !backend.region.is_empty() {
            loader = loader.region(aws_sdk_s3::config::Region::new(convert_region_value(
                &backend.region,
            )));
        }
        if !backend.profile.is_empty() {
            loader = loader.profile_name(&backend.profile);
        }
        if !backend.endpoint.is_empty() {
            loader = loader.endpoint_url(&backend.endpoint);
        }

        let sdk_config = loader.load().await;
        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(backend.force_path_style)
            .build();

        Self::new(Client::from_conf(s3_config), region)
    }

    /// Create a provider from an existing client
    pub fn new(client: Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }

    /// Whether default server-side encryption is configured
    async fn encryption_enabled(&self, bucket: &str) -> ProviderResult<bool> {
        match self.client.get_bucket_encryption().bucket(bucket).send().await {
            Ok(output) => Ok(output
                .server_side_encryption_configuration()
                .is_some_and(|config| {
                    config
                        .rules()
                        .iter()
                        .any(|rule| rule.apply_server_side_encryption_by_default().is_some())
                })),
            Err(err) if error_code(&err) == Some(ENCRYPTION_NOT_FOUND) => Ok(false),
            Err(err) => Err(ProviderError::new(format!(
                "Failed to read encryption settings: {}",
                err
            ))
            .for_resource(bucket)),
        }
    }

    /// Whether all four public access block settings are on
    async fn public_access_blocked(&self, bucket: &str) -> ProviderResult<bool> {
        match self.client.get_public_access_block().bucket(bucket).send().await {
            Ok(output) => Ok(output
                .public_access_block_configuration()
                .is_some_and(fully_blocked)),
            Err(err) if error_code(&err) == Some(PUBLIC_ACCESS_BLOCK_NOT_FOUND) => Ok(false),
            Err(err) => Err(ProviderError::new(format!(
                "Failed to read public access block: {}",
                err
            ))
            .for_resource(bucket)),
        }
    }

    async fn enable_encryption(&self, bucket: &str) -> ProviderResult<()> {
        let default = ServerSideEncryptionByDefault::builder()
            .sse_algorithm(ServerSideEncryption::Aes256)
            .build()
            .map_err(|e| ProviderError::new("Invalid encryption settings").with_cause(e))?;
        let rule = ServerSideEncryptionRule::builder()
            .apply_server_side_encryption_by_default(default)
            .build();
        let config = ServerSideEncryptionConfiguration::builder()
            .rules(rule)
            .build()
            .map_err(|e| ProviderError::new("Invalid encryption settings").with_cause(e))?;

        self.client
            .put_bucket_encryption()
            .bucket(bucket)
            .server_side_encryption_configuration(config)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to enable encryption: {}", e))
                    .for_resource(bucket)
            })?;

        Ok(())
    }

    async fn block_public_access(&self, bucket: &str) -> ProviderResult<()> {
        let public_access_block = PublicAccessBlockConfiguration::builder()
            .block_public_acls(true)
            .block_public_policy(true)
            .ignore_public_acls(true)
            .restrict_public_buckets(true)
            .build();

        self.client
            .put_public_access_block()
            .bucket(bucket)
            .public_access_block_configuration(public_access_block)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to block public access: {}", e))
                    .for_resource(bucket)
            })?;

        Ok(())
    }
}

#[async_trait]
impl ProbeExistence<S3> for S3Provider {
    async fn is_name_available(&self, backend: &S3Backend) -> ProviderResult<bool> {
        let result = self
            .client
            .head_bucket()
            .bucket(&backend.bucket)
            .send()
            .await;

        match result {
            Ok(_) => Ok(false),
            Err(err) => match status_code(&err) {
                Some(404) => Ok(true),
                // The bucket exists but belongs to someone else
                Some(403) => {
                    log::debug!("Bucket {} exists but is not accessible", backend.bucket);
                    Ok(false)
                }
                _ => Err(ProviderError::new(format!("HeadBucket failed: {}", err))
                    .for_resource(&backend.bucket)),
            },
        }
    }
}

#[async_trait]
impl CreateResource<S3> for S3Provider {
    async fn create_resource(&self, config: &ProvisioningConfig<S3>) -> ProviderResult<()> {
        let bucket = config.resource_name();

        // Create bucket with location constraint if not us-east-1
        let mut create_request = self.client.create_bucket().bucket(bucket);
        if self.region != DEFAULT_REGION {
            let constraint = BucketLocationConstraint::from(self.region.as_str());
            let bucket_config = CreateBucketConfiguration::builder()
                .location_constraint(constraint)
                .build();
            create_request = create_request.create_bucket_configuration(bucket_config);
        }

        create_request.send().await.map_err(|e| {
            ProviderError::new(format!("Failed to create bucket: {}", e)).for_resource(bucket)
        })?;
        log::info!("Created bucket {} in {}", bucket, self.region);

        Ok(())
    }
}

#[async_trait]
impl ConfigureResource<S3> for S3Provider {
    async fn versioning_enabled(&self, backend: &S3Backend) -> ProviderResult<bool> {
        let output = self
            .client
            .get_bucket_versioning()
            .bucket(&backend.bucket)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to read versioning: {}", e))
                    .for_resource(&backend.bucket)
            })?;

        Ok(output.status() == Some(&BucketVersioningStatus::Enabled))
    }

    async fn enable_versioning(&self, backend: &S3Backend) -> ProviderResult<()> {
        let versioning_config = VersioningConfiguration::builder()
            .status(BucketVersioningStatus::Enabled)
            .build();

        self.client
            .put_bucket_versioning()
            .bucket(&backend.bucket)
            .versioning_configuration(versioning_config)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to enable versioning: {}", e))
                    .for_resource(&backend.bucket)
            })?;

        Ok(())
    }

    async fn apply_tags(
        &self,
        backend: &S3Backend,
        tags: &BTreeMap<String, String>,
    ) -> ProviderResult<()> {
        let tagging = build_tagging(tags)?;

        self.client
            .put_bucket_tagging()
            .bucket(&backend.bucket)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to tag bucket: {}", e))
                    .for_resource(&backend.bucket)
            })?;

        Ok(())
    }

    async fn secure_resource(&self, config: &ProvisioningConfig<S3>) -> ProviderResult<bool> {
        let bucket = config.resource_name();
        let mut changed = false;

        if !config.provisioning.skip_bucket_ssencryption
            && !self.encryption_enabled(bucket).await?
        {
            log::info!("Enabling server-side encryption on bucket {}", bucket);
            self.enable_encryption(bucket).await?;
            changed = true;
        }

        if !config.provisioning.skip_bucket_public_access_blocking
            && !self.public_access_blocked(bucket).await?
        {
            log::info!("Blocking public access to bucket {}", bucket);
            self.block_public_access(bucket).await?;
            changed = true;
        }

        Ok(changed)
    }
}

/// Convert a tag map into an S3 tag set
fn build_tagging(tags: &BTreeMap<String, String>) -> ProviderResult<Tagging> {
    let tag_set = tags
        .iter()
        .map(|(key, value)| {
            Tag::builder()
                .key(key)
                .value(value)
                .build()
                .map_err(|e| ProviderError::new(format!("Invalid tag {}", key)).with_cause(e))
        })
        .collect::<ProviderResult<Vec<_>>>()?;

    Tagging::builder()
        .set_tag_set(Some(tag_set))
        .build()
        .map_err(|e| ProviderError::new("Invalid tag set").with_cause(e))
}

/// True if every public access block setting is enabled
fn fully_blocked(config: &PublicAccessBlockConfiguration) -> bool {
    [
        config.block_public_acls(),
        config.ignore_public_acls(),
        config.block_public_policy(),
        config.restrict_public_buckets(),
    ]
    .iter()
    .all(|setting| *setting == Some(true))
}

/// S3 error code of a failed call, if the service returned one
fn error_code<E: ProvideErrorMetadata>(err: &SdkError<E>) -> Option<&str> {
    err.as_service_error().and_then(|e| e.code())
}

/// HTTP status of a failed S3 call, if a response was received
fn status_code<E>(err: &SdkError<E>) -> Option<u16> {
    err.raw_response().map(|raw| raw.status().as_u16())
}
