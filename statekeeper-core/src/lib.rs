//! Statekeeper Core
//!
//! Decides whether a remote state backend matches its declared configuration
//! and provisions the backing storage resource when it does not.
//!
//! # Overview
//!
//! - **config**: splits a flat configuration map into native backend fields and
//!   provisioning-only fields
//! - **validate**: fails fast when the resource identifier is missing
//! - **prober**: existence check that treats an unknown outcome as "exists"
//! - **differ**: drift detection between desired and recorded configuration
//! - **provisioner**: idempotent creation, security settings, versioning and
//!   tagging, with an eventual-consistency wait loop
//! - **reconciler**: runs the stages above in order for one provider
//!
//! Providers plug in by implementing [`provider::BackendSchema`] and the three
//! capability traits in [`provider`].

pub mod config;
pub mod differ;
pub mod error;
pub mod prober;
pub mod provider;
pub mod provisioner;
pub mod reconciler;
pub mod validate;

#[cfg(test)]
mod testing;

pub use config::{BackendRecord, ConfigMap, ProvisioningConfig, RemoteState};
pub use error::{ReconcileError, ReconcileResult};
pub use provider::{
    BackendSchema, ConfigureResource, CreateResource, ProbeExistence, ProviderError,
    ProviderResult, ProvisioningOptions, StorageProvider,
};
pub use provisioner::{
    CancelToken, ProvisionOptions, ProvisionReport, VersioningPolicy, VersioningStatus, WaitPolicy,
};
pub use reconciler::{Reconciler, Reconciliation};
