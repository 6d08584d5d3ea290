//! Azure cloud environments

use statekeeper_core::{ProviderError, ProviderResult};

/// Endpoints of one Azure cloud
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEnvironment {
    pub name: &'static str,
    pub resource_manager: String,
    pub authority_host: String,
}

impl CloudEnvironment {
    /// Look up a cloud by the backend's `environment` value
    ///
    /// An empty name selects the public cloud.
    pub fn from_name(name: &str) -> ProviderResult<Self> {
        let (name, resource_manager, authority_host) = match name.to_lowercase().as_str() {
            "" | "public" | "azurecloud" => (
                "public",
                "https://management.azure.com",
                "https://login.microsoftonline.com",
            ),
            "usgovernment" | "azureusgovernmentcloud" => (
                "usgovernment",
                "https://management.usgovcloudapi.net",
                "https://login.microsoftonline.us",
            ),
            "china" | "azurechinacloud" => (
                "china",
                "https://management.chinacloudapi.cn",
                "https://login.chinacloudapi.cn",
            ),
            other => {
                return Err(ProviderError::new(format!(
                    "Unknown Azure environment: {}",
                    other
                )));
            }
        };

        Ok(Self {
            name,
            resource_manager: resource_manager.to_string(),
            authority_host: authority_host.to_string(),
        })
    }

    /// Override the resource manager endpoint (Azure Stack)
    pub fn with_resource_manager(mut self, endpoint: &str) -> Self {
        if !endpoint.is_empty() {
            self.resource_manager = endpoint.trim_end_matches('/').to_string();
        }
        self
    }

    /// OAuth2 scope for management API tokens
    pub fn token_scope(&self) -> String {
        format!("{}/.default", self.resource_manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_is_default() {
        let cloud = CloudEnvironment::from_name("").unwrap();
        assert_eq!(cloud.name, "public");
        assert_eq!(cloud.token_scope(), "https://management.azure.com/.default");
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let cloud = CloudEnvironment::from_name("AzureChinaCloud").unwrap();
        assert_eq!(cloud.name, "china");
    }

    #[test]
    fn test_unknown_environment() {
        let err = CloudEnvironment::from_name("mars").unwrap_err();
        assert_eq!(err.to_string(), "Unknown Azure environment: mars");
    }

    #[test]
    fn test_stack_endpoint_override() {
        let cloud = CloudEnvironment::from_name("public")
            .unwrap()
            .with_resource_manager("https://management.local.azurestack.external/");
        assert_eq!(
            cloud.resource_manager,
            "https://management.local.azurestack.external"
        );
    }
}
