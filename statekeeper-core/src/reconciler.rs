//! Reconciler - Drives the full decision and provisioning pipeline
//!
//! Stages run in dependency order, each short-circuiting on failure:
//! normalize, validate, probe existence, detect drift, provision.

use std::marker::PhantomData;

use serde::Serialize;

use crate::config::{BackendRecord, ConfigMap, RemoteState, filter_provider_only_keys, normalize};
use crate::differ::needs_reinit;
use crate::error::ReconcileResult;
use crate::prober::{Existence, probe_existence};
use crate::provider::{BackendSchema, StorageProvider};
use crate::provisioner::{
    CancelToken, ProvisionOptions, ProvisionReport, ensure_provisioned, ensure_provisioned_from,
};
use crate::validate::validate;

/// Result of a full reconciliation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    /// Whether the state-storage tool must re-run its backend initialization
    pub needs_reinit: bool,
    /// What provisioning changed
    pub report: ProvisionReport,
    /// Configuration to hand to the state-storage tool
    pub init_args: ConfigMap,
}

/// Reconciliation engine for one backend schema and provider
pub struct Reconciler<S: BackendSchema, P> {
    provider: P,
    options: ProvisionOptions,
    cancel: CancelToken,
    _schema: PhantomData<fn() -> S>,
}

impl<S, P> Reconciler<S, P>
where
    S: BackendSchema,
    P: StorageProvider<S>,
{
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            options: ProvisionOptions::default(),
            cancel: CancelToken::new(),
            _schema: PhantomData,
        }
    }

    pub fn with_options(mut self, options: ProvisionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Configuration forwarded to the state-storage tool's own init
    pub fn backend_init_args(&self, config: &ConfigMap) -> ConfigMap {
        filter_provider_only_keys(config, S::PROVIDER_ONLY_KEYS)
    }

    /// Whether the desired configuration drifted from the recorded one
    pub fn has_drifted(&self, desired: &ConfigMap, existing: Option<&BackendRecord>) -> bool {
        needs_reinit(desired, existing, S::BACKEND_TYPE, S::PROVIDER_ONLY_KEYS)
    }

    /// Returns true if the backend needs initialization
    ///
    /// That is the case when the configuration drifted from the recorded
    /// backend or when the storage resource does not exist. The configuration
    /// is validated before any remote call.
    pub async fn needs_initialization(
        &self,
        remote_state: &RemoteState,
        existing: Option<&BackendRecord>,
    ) -> ReconcileResult<bool> {
        if remote_state.disable_init {
            return Ok(false);
        }

        let config = normalize::<S>(&remote_state.config)?;
        validate(&config)?;

        if self.has_drifted(&remote_state.config, existing) {
            return Ok(true);
        }

        let existence = probe_existence::<S, P>(&self.provider, &config.backend).await;
        let (exists, probe_error) = existence.into_result(config.resource_name());
        probe_error?;

        Ok(!exists)
    }

    /// Validate the configuration and provision the storage resource
    pub async fn initialize(&self, remote_state: &RemoteState) -> ReconcileResult<ProvisionReport> {
        let config = normalize::<S>(&remote_state.config)?;
        validate(&config)?;

        ensure_provisioned(&self.provider, &config, &self.options, &self.cancel).await
    }

    /// Run the whole pipeline against a remote state block
    pub async fn reconcile(
        &self,
        remote_state: &RemoteState,
        existing: Option<&BackendRecord>,
    ) -> ReconcileResult<Reconciliation> {
        let init_args = self.backend_init_args(&remote_state.config);

        if remote_state.disable_init {
            log::debug!("Initialization disabled for {} backend", S::BACKEND_TYPE);
            return Ok(Reconciliation {
                needs_reinit: false,
                report: ProvisionReport::default(),
                init_args,
            });
        }

        let config = normalize::<S>(&remote_state.config)?;
        validate(&config)?;

        self.cancel.check("checking storage resource")?;
        let existence = probe_existence::<S, P>(&self.provider, &config.backend).await;
        let (exists, probe_error) = existence.into_result(config.resource_name());
        probe_error?;

        let needs_reinit = !exists || self.has_drifted(&remote_state.config, existing);

        let known = if exists {
            Existence::Present
        } else {
            Existence::Absent
        };
        let report = ensure_provisioned_from(
            &self.provider,
            &config,
            Some(known),
            &self.options,
            &self.cancel,
        )
        .await?;

        Ok(Reconciliation {
            needs_reinit,
            report,
            init_args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconcileError;
    use crate::provisioner::{VersioningPolicy, VersioningStatus, WaitPolicy};
    use crate::testing::{MockProvider, MockSchema};
    use serde_json::{Value, json};
    use std::time::Duration;

    fn remote_state(config: Value) -> RemoteState {
        RemoteState::new("mock", config.as_object().cloned().unwrap())
    }

    fn record(config: Value) -> BackendRecord {
        BackendRecord::new("mock", config.as_object().cloned().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn new_backend_is_created_and_needs_reinit() {
        let reconciler = Reconciler::<MockSchema, _>::new(MockProvider::absent());
        let state = remote_state(json!({"name": "acct1"}));

        assert!(reconciler.needs_initialization(&state, None).await.unwrap());

        let result = reconciler.reconcile(&state, None).await.unwrap();
        assert!(result.needs_reinit);
        assert!(result.report.created);
        assert_eq!(result.init_args, state.config);
    }

    #[tokio::test(start_paused = true)]
    async fn resource_that_never_appears_times_out() {
        let provider = MockProvider::with(|s| s.invisible_probes = Some(u32::MAX));
        let reconciler = Reconciler::<MockSchema, _>::new(provider);

        let result = reconciler
            .reconcile(&remote_state(json!({"name": "acct1"})), None)
            .await;

        assert!(matches!(
            result,
            Err(ReconcileError::ConsistencyTimeout { attempts: 12, .. })
        ));
        reconciler
            .provider()
            .snapshot(|s| assert_eq!(s.create_calls, 1));
    }

    #[tokio::test]
    async fn matching_backend_with_tags_has_no_drift() {
        let reconciler = Reconciler::<MockSchema, _>::new(MockProvider::existing());
        let state = remote_state(json!({"name": "acct1", "tags": {"env": "prod"}}));
        let existing = record(json!({"name": "acct1"}));

        assert!(
            !reconciler
                .needs_initialization(&state, Some(&existing))
                .await
                .unwrap()
        );

        let result = reconciler.reconcile(&state, Some(&existing)).await.unwrap();
        assert!(!result.needs_reinit);
        assert!(!result.report.created);
        assert!(result.report.labels_applied);
        assert_eq!(result.init_args, record(json!({"name": "acct1"})).config);
    }

    #[tokio::test]
    async fn skip_create_never_calls_create() {
        let reconciler = Reconciler::<MockSchema, _>::new(MockProvider::absent());
        let state = remote_state(json!({"name": "acct1", "skip_create": true}));

        let result = reconciler.reconcile(&state, None).await.unwrap();
        assert!(!result.report.created);
        reconciler
            .provider()
            .snapshot(|s| assert_eq!(s.create_calls, 0));
    }

    #[tokio::test]
    async fn missing_identifier_fails_before_remote_calls() {
        let reconciler = Reconciler::<MockSchema, _>::new(MockProvider::absent());
        let state = remote_state(json!({"container": "tfstate"}));

        let result = reconciler.reconcile(&state, None).await;
        assert!(matches!(result, Err(ReconcileError::MissingRequiredConfig(_))));

        let result = reconciler.initialize(&state).await;
        assert!(matches!(result, Err(ReconcileError::MissingRequiredConfig(_))));

        reconciler
            .provider()
            .snapshot(|s| assert_eq!(s.probe_calls, 0));
    }

    #[tokio::test]
    async fn check_with_missing_identifier_fails_before_probing() {
        let reconciler = Reconciler::<MockSchema, _>::new(MockProvider::existing());
        let state = remote_state(json!({"container": "tfstate"}));
        let existing = record(json!({"container": "tfstate"}));

        let result = reconciler.needs_initialization(&state, Some(&existing)).await;
        match result {
            Err(ReconcileError::MissingRequiredConfig(field)) => assert_eq!(field, "name"),
            other => panic!("Expected MissingRequiredConfig, got {:?}", other),
        }
        reconciler
            .provider()
            .snapshot(|s| assert_eq!(s.probe_calls, 0));
    }

    #[tokio::test]
    async fn recorded_metadata_with_unset_attributes_is_up_to_date() {
        let reconciler = Reconciler::<MockSchema, _>::new(MockProvider::existing());
        let state = remote_state(json!({
            "name": "acct1",
            "container": "tfstate",
            "snapshot": true,
            "tags": {"env": "prod"}
        }));
        // Shape written by `terraform init`: unset attributes are null and
        // booleans may be strings
        let existing: BackendRecord = serde_json::from_value(json!({
            "type": "mock",
            "config": {
                "name": "acct1",
                "container": "tfstate",
                "snapshot": "true",
                "endpoint": null,
                "use_msi": null
            }
        }))
        .unwrap();

        assert!(!reconciler.has_drifted(&state.config, Some(&existing)));
        assert!(
            !reconciler
                .needs_initialization(&state, Some(&existing))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn reconcile_probes_existing_resource_once() {
        let reconciler = Reconciler::<MockSchema, _>::new(MockProvider::existing());
        let state = remote_state(json!({"name": "acct1"}));
        let existing = record(json!({"name": "acct1"}));

        let result = reconciler.reconcile(&state, Some(&existing)).await.unwrap();
        assert!(!result.needs_reinit);
        reconciler
            .provider()
            .snapshot(|s| assert_eq!(s.probe_calls, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_reuses_probe_before_creating() {
        let reconciler = Reconciler::<MockSchema, _>::new(MockProvider::absent());

        let result = reconciler
            .reconcile(&remote_state(json!({"name": "acct1"})), None)
            .await
            .unwrap();

        assert!(result.report.created);
        reconciler.provider().snapshot(|s| {
            assert_eq!(s.create_calls, 1);
            // one decision probe, one visibility check
            assert_eq!(s.probe_calls, 2);
        });
    }

    #[tokio::test]
    async fn decode_error_fails_before_remote_calls() {
        let reconciler = Reconciler::<MockSchema, _>::new(MockProvider::absent());
        let state = remote_state(json!({"name": "acct1", "snapshot": "true"}));

        let result = reconciler.needs_initialization(&state, None).await;
        assert!(matches!(result, Err(ReconcileError::Decode { .. })));
        reconciler
            .provider()
            .snapshot(|s| assert_eq!(s.probe_calls, 0));
    }

    #[tokio::test]
    async fn disable_init_short_circuits() {
        let reconciler = Reconciler::<MockSchema, _>::new(MockProvider::absent());
        let mut state = remote_state(json!({"name": "acct1", "tags": {"env": "prod"}}));
        state.disable_init = true;

        assert!(!reconciler.needs_initialization(&state, None).await.unwrap());

        let result = reconciler.reconcile(&state, None).await.unwrap();
        assert!(!result.needs_reinit);
        assert_eq!(result.report, ProvisionReport::default());
        assert!(!result.init_args.contains_key("tags"));
        reconciler
            .provider()
            .snapshot(|s| assert_eq!(s.probe_calls, 0));
    }

    #[tokio::test]
    async fn ambiguous_probe_is_reported() {
        let reconciler =
            Reconciler::<MockSchema, _>::new(MockProvider::with(|s| s.probe_fails = true));
        let state = remote_state(json!({"name": "acct1"}));
        let existing = record(json!({"name": "acct1"}));

        let result = reconciler.needs_initialization(&state, Some(&existing)).await;
        assert!(matches!(
            result,
            Err(ReconcileError::AmbiguousExistence { .. })
        ));

        let result = reconciler.reconcile(&state, Some(&existing)).await;
        assert!(matches!(
            result,
            Err(ReconcileError::AmbiguousExistence { .. })
        ));
        reconciler
            .provider()
            .snapshot(|s| assert_eq!(s.create_calls, 0));
    }

    #[tokio::test]
    async fn options_are_passed_to_provisioning() {
        let provider = MockProvider::with(|s| s.exists = true);
        let reconciler = Reconciler::<MockSchema, _>::new(provider).with_options(ProvisionOptions {
            wait: WaitPolicy {
                max_attempts: 1,
                interval: Duration::from_millis(10),
            },
            versioning: VersioningPolicy::Enforce,
        });

        let report = reconciler
            .initialize(&remote_state(json!({"name": "acct1"})))
            .await
            .unwrap();

        assert_eq!(report.versioning, VersioningStatus::Enabled);
    }

    #[test]
    fn provisioning_keys_do_not_affect_drift() {
        let reconciler = Reconciler::<MockSchema, _>::new(MockProvider::absent());
        let existing = record(json!({"name": "acct1"}));

        for key in MockSchema::PROVIDER_ONLY_KEYS {
            let mut desired = existing.config.clone();
            desired.insert(key.to_string(), json!("anything"));
            assert!(!reconciler.has_drifted(&desired, Some(&existing)), "{key}");
        }
    }
}
