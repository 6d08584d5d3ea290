//! In-memory provider used by the engine's tests

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ProvisioningConfig;
use crate::provider::{
    BackendSchema, ConfigureResource, CreateResource, ProbeExistence, ProviderError,
    ProviderResult, ProvisioningOptions,
};

#[derive(Debug)]
pub struct MockSchema;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MockBackend {
    pub name: String,
    pub container: String,
    pub snapshot: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MockProvisioning {
    pub tags: BTreeMap<String, String>,
    pub sku: String,
    pub skip_create: bool,
    pub skip_versioning: bool,
}

impl ProvisioningOptions for MockProvisioning {
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

impl BackendSchema for MockSchema {
    const BACKEND_TYPE: &'static str = "mock";
    const PROVIDER_ONLY_KEYS: &'static [&'static str] =
        &["tags", "sku", "skip_create", "skip_versioning"];
    const REQUIRED_FIELD: &'static str = "name";

    type Backend = MockBackend;
    type Provisioning = MockProvisioning;

    fn resource_name(backend: &MockBackend) -> &str {
        &backend.name
    }
}

impl MockSchema {
    pub fn backend(name: &str) -> MockBackend {
        MockBackend {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn config(name: &str) -> ProvisioningConfig<MockSchema> {
        ProvisioningConfig {
            backend: Self::backend(name),
            provisioning: MockProvisioning::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MockState {
    pub exists: bool,
    /// Probes that still report the resource missing after creation
    pub invisible_probes: Option<u32>,
    pub probe_fails: bool,
    pub create_fails: bool,
    pub versioning: bool,
    pub versioning_fails: bool,
    pub secured: bool,
    pub secure_fails: bool,
    pub tags: BTreeMap<String, String>,
    pub probe_calls: u32,
    pub create_calls: u32,
    pub enable_versioning_calls: u32,
    pub tag_calls: u32,
    pub secure_calls: u32,
}

/// Provider whose remote state lives in a mutex
#[derive(Debug, Default)]
pub struct MockProvider {
    pub state: Mutex<MockState>,
}

impl MockProvider {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn existing() -> Self {
        Self::with(|s| {
            s.exists = true;
            s.versioning = true;
        })
    }

    pub fn with(f: impl FnOnce(&mut MockState)) -> Self {
        let mut state = MockState::default();
        f(&mut state);
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot<T>(&self, f: impl FnOnce(&MockState) -> T) -> T {
        f(&self.state.lock().unwrap())
    }
}

#[async_trait]
impl ProbeExistence<MockSchema> for MockProvider {
    async fn is_name_available(&self, backend: &MockBackend) -> ProviderResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.probe_calls += 1;
        if state.probe_fails {
            return Err(ProviderError::new("name check failed").for_resource(&backend.name));
        }
        if !state.exists {
            return Ok(true);
        }
        match state.invisible_probes {
            Some(remaining) if remaining > 0 => {
                state.invisible_probes = Some(remaining - 1);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CreateResource<MockSchema> for MockProvider {
    async fn create_resource(&self, config: &ProvisioningConfig<MockSchema>) -> ProviderResult<()> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        if state.create_fails {
            return Err(ProviderError::new("create failed").for_resource(config.resource_name()));
        }
        state.exists = true;
        Ok(())
    }
}

#[async_trait]
impl ConfigureResource<MockSchema> for MockProvider {
    async fn versioning_enabled(&self, _backend: &MockBackend) -> ProviderResult<bool> {
        Ok(self.state.lock().unwrap().versioning)
    }

    async fn enable_versioning(&self, backend: &MockBackend) -> ProviderResult<()> {
        let mut state = self.state.lock().unwrap();
        state.enable_versioning_calls += 1;
        if state.versioning_fails {
            return Err(ProviderError::new("versioning failed").for_resource(&backend.name));
        }
        state.versioning = true;
        Ok(())
    }

    async fn apply_tags(
        &self,
        _backend: &MockBackend,
        tags: &BTreeMap<String, String>,
    ) -> ProviderResult<()> {
        let mut state = self.state.lock().unwrap();
        state.tag_calls += 1;
        state.tags = tags.clone();
        Ok(())
    }

    async fn secure_resource(
        &self,
        config: &ProvisioningConfig<MockSchema>,
    ) -> ProviderResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.secure_calls += 1;
        if state.secure_fails {
            return Err(ProviderError::new("security settings failed")
                .for_resource(config.resource_name()));
        }
        let changed = !state.secured;
        state.secured = true;
        Ok(changed)
    }
}
