//! Existence probe for the storage resource

use crate::error::ReconcileError;
use crate::provider::{BackendSchema, ProbeExistence, ProviderError};

/// Outcome of an existence probe
#[derive(Debug)]
pub enum Existence {
    /// The name is taken; the resource exists
    Present,
    /// The name is available; nothing exists yet
    Absent,
    /// The probe itself failed, so the true state is unknown
    Ambiguous(ProviderError),
}

impl Existence {
    /// Existence with unknown outcomes treated as present
    pub fn assume_exists(&self) -> bool {
        !matches!(self, Existence::Absent)
    }

    /// Split into the conservative existence flag and the probe error, if any
    pub fn into_result(self, resource: &str) -> (bool, Result<(), ReconcileError>) {
        let exists = self.assume_exists();
        match self {
            Existence::Ambiguous(source) => (
                exists,
                Err(ReconcileError::AmbiguousExistence {
                    resource: resource.to_string(),
                    source,
                }),
            ),
            Existence::Present | Existence::Absent => (exists, Ok(())),
        }
    }
}

/// Ask the provider whether the configured resource exists
pub async fn probe_existence<S, P>(provider: &P, backend: &S::Backend) -> Existence
where
    S: BackendSchema,
    P: ProbeExistence<S> + ?Sized,
{
    match provider.is_name_available(backend).await {
        Ok(true) => Existence::Absent,
        Ok(false) => Existence::Present,
        Err(err) => {
            log::debug!(
                "Existence check for {} failed, assuming it exists: {}",
                S::resource_name(backend),
                err
            );
            Existence::Ambiguous(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockProvider, MockSchema};

    #[tokio::test]
    async fn test_probe_absent_when_name_available() {
        let provider = MockProvider::absent();
        let existence =
            probe_existence::<MockSchema, _>(&provider, &MockSchema::backend("acct1")).await;
        assert!(matches!(existence, Existence::Absent));
        assert!(!existence.assume_exists());
    }

    #[tokio::test]
    async fn test_probe_present_when_name_taken() {
        let provider = MockProvider::existing();
        let existence =
            probe_existence::<MockSchema, _>(&provider, &MockSchema::backend("acct1")).await;
        assert!(matches!(existence, Existence::Present));
    }

    #[tokio::test]
    async fn test_probe_failure_assumes_existence_and_keeps_error() {
        let provider = MockProvider::with(|s| s.probe_fails = true);
        let existence =
            probe_existence::<MockSchema, _>(&provider, &MockSchema::backend("acct1")).await;
        assert!(existence.assume_exists());

        let (exists, result) = existence.into_result("acct1");
        assert!(exists);
        match result {
            Err(ReconcileError::AmbiguousExistence { resource, source }) => {
                assert_eq!(resource, "acct1");
                assert_eq!(source.message, "name check failed");
            }
            other => panic!("Expected AmbiguousExistence, got {:?}", other),
        }
    }
}
