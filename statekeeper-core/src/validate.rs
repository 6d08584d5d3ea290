//! Validation of a decoded configuration before any remote call

use crate::config::ProvisioningConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::provider::BackendSchema;

/// Check that the resource identifier is present
///
/// The identifier is the only mandatory field; everything else falls back to
/// provider defaults.
pub fn validate<S: BackendSchema>(config: &ProvisioningConfig<S>) -> ReconcileResult<()> {
    if config.resource_name().is_empty() {
        return Err(ReconcileError::missing(S::REQUIRED_FIELD));
    }

    Ok(())
}
