//! Provisioner - Idempotent creation and configuration of the storage resource
//!
//! Every step checks its precondition first, so running the whole sequence
//! again after a partial failure only repeats the step that failed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::ProvisioningConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::prober::{Existence, probe_existence};
use crate::provider::{BackendSchema, ProvisioningOptions, StorageProvider};

/// Default number of existence checks after creating a resource
pub const DEFAULT_MAX_ATTEMPTS: u32 = 12;

/// Default delay between existence checks
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// How long to wait for a created resource to become visible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// What to do when versioning turns out to be disabled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersioningPolicy {
    /// Log a warning and leave the resource as it is
    #[default]
    Warn,
    /// Enable versioning
    Enforce,
}

/// Engine settings for a provisioning run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionOptions {
    pub wait: WaitPolicy,
    pub versioning: VersioningPolicy,
}

/// Versioning outcome of a provisioning run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersioningStatus {
    #[default]
    Skipped,
    AlreadyEnabled,
    Enabled,
    /// Disabled and left alone under `VersioningPolicy::Warn`
    Disabled,
}

/// What a provisioning run changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub created: bool,
    /// Access or encryption settings were changed
    pub secured: bool,
    pub versioning: VersioningStatus,
    pub labels_applied: bool,
}

/// Cancellation flag with an optional deadline
///
/// Checked between remote calls and between retry intervals, never while a
/// sleep is in progress.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with `Cancelled` if the token has fired
    pub fn check(&self, operation: &'static str) -> ReconcileResult<()> {
        if self.is_cancelled() {
            return Err(ReconcileError::Cancelled { operation });
        }
        Ok(())
    }
}

/// Run all provisioning steps in dependency order
pub async fn ensure_provisioned<S, P>(
    provider: &P,
    config: &ProvisioningConfig<S>,
    options: &ProvisionOptions,
    cancel: &CancelToken,
) -> ReconcileResult<ProvisionReport>
where
    S: BackendSchema,
    P: StorageProvider<S> + ?Sized,
{
    ensure_provisioned_from(provider, config, None, options, cancel).await
}

/// Run all provisioning steps, reusing an existence result if one is known
pub async fn ensure_provisioned_from<S, P>(
    provider: &P,
    config: &ProvisioningConfig<S>,
    known: Option<Existence>,
    options: &ProvisionOptions,
    cancel: &CancelToken,
) -> ReconcileResult<ProvisionReport>
where
    S: BackendSchema,
    P: StorageProvider<S> + ?Sized,
{
    cancel.check("provisioning")?;
    let created = create_if_absent(provider, config, known, &options.wait, cancel).await?;

    cancel.check("securing storage resource")?;
    let secured = apply_security_settings(provider, config).await?;

    cancel.check("checking versioning")?;
    let versioning = ensure_versioning(provider, config, options.versioning).await?;

    cancel.check("applying tags")?;
    let labels_applied = apply_labels(provider, config).await?;

    Ok(ProvisionReport {
        created,
        secured,
        versioning,
        labels_applied,
    })
}

/// Create the resource if it does not exist and wait until it is visible
///
/// Probes existence unless `known` already holds the answer. Returns true if
/// a create call was issued.
pub async fn create_if_absent<S, P>(
    provider: &P,
    config: &ProvisioningConfig<S>,
    known: Option<Existence>,
    wait: &WaitPolicy,
    cancel: &CancelToken,
) -> ReconcileResult<bool>
where
    S: BackendSchema,
    P: StorageProvider<S> + ?Sized,
{
    let name = config.resource_name();
    if config.provisioning.skip_create() || name.is_empty() {
        log::debug!("Skipping creation of {} storage resource", S::BACKEND_TYPE);
        return Ok(false);
    }

    let existence = match known {
        Some(existence) => existence,
        None => probe_existence::<S, P>(provider, &config.backend).await,
    };

    match existence {
        Existence::Present => {
            log::debug!("Storage resource {} already exists", name);
            Ok(false)
        }
        Existence::Ambiguous(source) => Err(ReconcileError::AmbiguousExistence {
            resource: name.to_string(),
            source,
        }),
        Existence::Absent => {
            log::info!("Storage resource {} does not exist, creating it", name);
            cancel.check("creating storage resource")?;
            provider
                .create_resource(config)
                .await
                .map_err(|e| ReconcileError::remote("create storage resource", e))?;

            wait_until_exists(provider, config, wait, cancel).await?;
            Ok(true)
        }
    }
}

/// Poll existence until the resource is visible or the attempts run out
///
/// Returns the number of attempts it took.
pub async fn wait_until_exists<S, P>(
    provider: &P,
    config: &ProvisioningConfig<S>,
    wait: &WaitPolicy,
    cancel: &CancelToken,
) -> ReconcileResult<u32>
where
    S: BackendSchema,
    P: StorageProvider<S> + ?Sized,
{
    let name = config.resource_name();

    for attempt in 1..=wait.max_attempts {
        cancel.check("waiting for storage resource")?;

        match probe_existence::<S, P>(provider, &config.backend).await {
            Existence::Present => {
                log::debug!("Storage resource {} visible after {} attempt(s)", name, attempt);
                return Ok(attempt);
            }
            Existence::Absent => {
                log::info!(
                    "Waiting for storage resource {} to become visible (attempt {}/{})",
                    name,
                    attempt,
                    wait.max_attempts
                );
            }
            Existence::Ambiguous(err) => {
                log::warn!(
                    "Existence check for {} failed (attempt {}/{}): {}",
                    name,
                    attempt,
                    wait.max_attempts,
                    err
                );
            }
        }

        tokio::time::sleep(wait.interval).await;
    }

    Err(ReconcileError::ConsistencyTimeout {
        resource: name.to_string(),
        attempts: wait.max_attempts,
        waited: wait.interval * wait.max_attempts,
    })
}

/// Check versioning and enable it or warn, depending on `policy`
pub async fn ensure_versioning<S, P>(
    provider: &P,
    config: &ProvisioningConfig<S>,
    policy: VersioningPolicy,
) -> ReconcileResult<VersioningStatus>
where
    S: BackendSchema,
    P: StorageProvider<S> + ?Sized,
{
    let name = config.resource_name();
    if config.provisioning.skip_versioning() || name.is_empty() {
        return Ok(VersioningStatus::Skipped);
    }

    let enabled = provider
        .versioning_enabled(&config.backend)
        .await
        .map_err(|e| ReconcileError::remote("read versioning", e))?;
    if enabled {
        return Ok(VersioningStatus::AlreadyEnabled);
    }

    match policy {
        VersioningPolicy::Enforce => {
            log::info!("Enabling versioning on storage resource {}", name);
            provider
                .enable_versioning(&config.backend)
                .await
                .map_err(|e| ReconcileError::remote("enable versioning", e))?;
            Ok(VersioningStatus::Enabled)
        }
        VersioningPolicy::Warn => {
            log::warn!(
                "Versioning is not enabled for the remote state storage resource {}. \
                 We recommend enabling it so previous versions of the state can be recovered.",
                name
            );
            Ok(VersioningStatus::Disabled)
        }
    }
}

/// Let the provider bring access and encryption settings in line
///
/// Returns true if the provider changed anything.
pub async fn apply_security_settings<S, P>(
    provider: &P,
    config: &ProvisioningConfig<S>,
) -> ReconcileResult<bool>
where
    S: BackendSchema,
    P: StorageProvider<S> + ?Sized,
{
    if config.resource_name().is_empty() {
        return Ok(false);
    }

    let changed = provider
        .secure_resource(config)
        .await
        .map_err(|e| ReconcileError::remote("secure storage resource", e))?;
    if changed {
        log::info!(
            "Updated security settings of storage resource {}",
            config.resource_name()
        );
    }

    Ok(changed)
}

/// Apply declared tags; returns true if tags were sent
pub async fn apply_labels<S, P>(
    provider: &P,
    config: &ProvisioningConfig<S>,
) -> ReconcileResult<bool>
where
    S: BackendSchema,
    P: StorageProvider<S> + ?Sized,
{
    let tags = config.provisioning.tags();
    if tags.is_empty() {
        return Ok(false);
    }

    log::debug!(
        "Applying {} tag(s) to storage resource {}",
        tags.len(),
        config.resource_name()
    );
    provider
        .apply_tags(&config.backend, tags)
        .await
        .map_err(|e| ReconcileError::remote("apply tags", e))?;

    Ok(true)
}
